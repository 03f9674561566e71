use axum::extract::{Extension, Path, Query, State};
use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use roadwatch_domain::{
    activity::{
        ActivityAppend, ActivityDraft, ActivityEntry, FeedPage, ReadMarkerStatus, RelatedEntity,
    },
    assignments::{
        Assignment, AssignmentSchedule, AssignmentService, AssignmentStatus, SegmentState,
    },
    error::DomainError,
    idempotency::BeginOutcome,
    identity::ActorIdentity,
    ports::idempotency::{IdempotencyKey, IdempotencyResponse},
    projects::{Project, ProjectCreate, ProjectMember, ProjectService, ProjectStatus},
    segments::{RoadSegment, SegmentCreate, SegmentService},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::middleware::AuthContext;
use crate::{error::ApiError, middleware as app_middleware, state::AppState, validation};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/projects", post(create_project).get(list_projects))
        .route("/v1/projects/:project_id", get(get_project))
        .route(
            "/v1/projects/:project_id/members",
            post(assign_member).get(list_members),
        )
        .route(
            "/v1/projects/:project_id/members/:user_id",
            delete(unassign_member),
        )
        .route(
            "/v1/projects/:project_id/segments",
            post(create_segment).get(list_segments),
        )
        .route(
            "/v1/projects/:project_id/segments/status",
            get(segment_status_board),
        )
        .route(
            "/v1/segments/:segment_id/assignments",
            post(schedule_assignment).get(list_assignments),
        )
        .route(
            "/v1/assignments/:assignment_id/status",
            post(update_assignment_status),
        )
        .route("/v1/projects/:project_id/activity", post(append_activity))
        .route(
            "/v1/projects/:project_id/activity/poll",
            get(poll_activity),
        )
        .route(
            "/v1/projects/:project_id/activity/read-marker",
            get(get_read_marker).post(mark_read),
        )
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ));

    if !state.config.app_env.eq_ignore_ascii_case("test") {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

#[derive(Debug, Deserialize, Validate)]
struct CreateProjectRequest {
    #[validate(length(min = 1, max = 160))]
    name: String,
    #[validate(length(min = 1, max = 64))]
    ward: String,
    status: Option<ProjectStatus>,
}

async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    require_admin(&auth)?;
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;

    let key = IdempotencyKey::new("project_create", actor.user_id.clone(), request_id);

    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let service =
                ProjectService::new(state.project_repo.clone(), state.membership_repo.clone());
            let input = ProjectCreate {
                name: payload.name,
                ward: payload.ward,
                status: payload.status,
            };

            let project = service
                .create(actor, input)
                .await
                .map_err(map_domain_error)?;

            let response = IdempotencyResponse {
                status_code: StatusCode::CREATED.as_u16(),
                body: serde_json::to_value(&project).map_err(|_| ApiError::Internal)?,
            };
            complete_idempotent(&state, &key, response).await
        }
    }
}

async fn list_projects(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Project>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let service = ProjectService::new(state.project_repo.clone(), state.membership_repo.clone());
    let projects = service
        .list_for(&auth.role, &actor.user_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(projects))
}

async fn get_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<String>,
) -> Result<Json<Project>, ApiError> {
    let actor = actor_identity(&auth)?;
    let service = ProjectService::new(state.project_repo.clone(), state.membership_repo.clone());
    let project = service
        .get_for(&auth.role, &actor.user_id, &project_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(project))
}

#[derive(Debug, Deserialize, Validate)]
struct AssignMemberRequest {
    #[validate(length(min = 1, max = 128))]
    user_id: String,
}

async fn assign_member(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<AssignMemberRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    require_admin(&auth)?;
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;

    let key = IdempotencyKey::new("member_assign", project_id.clone(), request_id);

    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let service =
                ProjectService::new(state.project_repo.clone(), state.membership_repo.clone());
            let member = service
                .assign_member(actor, &project_id, &payload.user_id)
                .await
                .map_err(map_domain_error)?;

            let response = IdempotencyResponse {
                status_code: StatusCode::OK.as_u16(),
                body: serde_json::to_value(&member).map_err(|_| ApiError::Internal)?,
            };
            complete_idempotent(&state, &key, response).await
        }
    }
}

async fn unassign_member(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(String, String)>,
    Extension(auth): Extension<AuthContext>,
) -> Result<StatusCode, ApiError> {
    require_admin(&auth)?;
    let service = ProjectService::new(state.project_repo.clone(), state.membership_repo.clone());
    service
        .unassign_member(&project_id, &user_id)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_members(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ProjectMember>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let service = ProjectService::new(state.project_repo.clone(), state.membership_repo.clone());
    let members = service
        .list_members(&auth.role, &actor.user_id, &project_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(members))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateSegmentRequest {
    #[validate(length(min = 1, max = 160))]
    name: String,
    geometry: Vec<roadwatch_domain::geometry::GeoPoint>,
    length_m: f64,
}

async fn create_segment(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateSegmentRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    require_admin(&auth)?;
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;

    let key = IdempotencyKey::new("segment_create", project_id.clone(), request_id);

    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let service = segment_service(&state);
            let input = SegmentCreate {
                name: payload.name,
                geometry: payload.geometry,
                length_m: payload.length_m,
            };

            let segment = service
                .create(actor, &project_id, input)
                .await
                .map_err(map_domain_error)?;

            let response = IdempotencyResponse {
                status_code: StatusCode::CREATED.as_u16(),
                body: serde_json::to_value(&segment).map_err(|_| ApiError::Internal)?,
            };
            complete_idempotent(&state, &key, response).await
        }
    }
}

async fn list_segments(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<RoadSegment>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let service = segment_service(&state);
    let segments = service
        .list_for_project(&auth.role, &actor.user_id, &project_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(segments))
}

#[derive(Debug, Deserialize)]
struct StatusBoardQuery {
    now_ms: Option<i64>,
}

#[derive(Serialize)]
struct SegmentStatusRow {
    segment_id: String,
    name: String,
    rendered_geometry: Vec<(f64, f64)>,
    status: SegmentState,
    length_m: f64,
    active_assignment: Option<Assignment>,
}

async fn segment_status_board(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<StatusBoardQuery>,
) -> Result<Json<Vec<SegmentStatusRow>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let service = segment_service(&state);
    let board = service
        .status_board(&auth.role, &actor.user_id, &project_id, query.now_ms)
        .await
        .map_err(map_domain_error)?;

    let rows = board
        .into_iter()
        .map(|view| {
            if !view.malformed_window_ids.is_empty() {
                tracing::warn!(
                    segment_id = %view.segment_id,
                    assignment_ids = ?view.malformed_window_ids,
                    "skipped assignments with malformed windows"
                );
            }
            SegmentStatusRow {
                segment_id: view.segment_id,
                name: view.name,
                rendered_geometry: view.rendered_geometry,
                status: view.status,
                length_m: view.length_m,
                active_assignment: view.active_assignment,
            }
        })
        .collect();
    Ok(Json(rows))
}

#[derive(Debug, Deserialize, Validate)]
struct ScheduleAssignmentRequest {
    #[validate(length(min = 1, max = 128))]
    contractor_id: String,
    starts_at_ms: i64,
    ends_at_ms: i64,
    #[validate(length(max = 1000))]
    notes: Option<String>,
}

async fn schedule_assignment(
    State(state): State<AppState>,
    Path(segment_id): Path<String>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ScheduleAssignmentRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    require_admin(&auth)?;
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers)?;

    let key = IdempotencyKey::new("assignment_schedule", segment_id.clone(), request_id.clone());

    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let service = AssignmentService::new(
                state.assignment_repo.clone(),
                state.segment_repo.clone(),
                state.membership_repo.clone(),
            );
            let input = AssignmentSchedule {
                contractor_id: payload.contractor_id,
                starts_at_ms: payload.starts_at_ms,
                ends_at_ms: payload.ends_at_ms,
                notes: payload.notes,
            };

            let assignment = service
                .schedule(actor.clone(), &segment_id, input)
                .await
                .map_err(map_domain_error)?;

            let segment = owning_segment(&state, &segment_id).await?;
            record_activity(
                &state,
                &segment.project_id,
                actor,
                format!(
                    "scheduled contractor {} on segment {}",
                    assignment.contractor_id, segment.name
                ),
                RelatedEntity {
                    kind: "assignment".to_string(),
                    entity_id: assignment.assignment_id.clone(),
                    label: Some(segment.name.clone()),
                },
                request_id,
                correlation_id,
            )
            .await?;

            let response = IdempotencyResponse {
                status_code: StatusCode::CREATED.as_u16(),
                body: serde_json::to_value(&assignment).map_err(|_| ApiError::Internal)?,
            };
            complete_idempotent(&state, &key, response).await
        }
    }
}

async fn list_assignments(
    State(state): State<AppState>,
    Path(segment_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let service = AssignmentService::new(
        state.assignment_repo.clone(),
        state.segment_repo.clone(),
        state.membership_repo.clone(),
    );
    let assignments = service
        .list_for_segment(&auth.role, &actor.user_id, &segment_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(assignments))
}

#[derive(Debug, Deserialize)]
struct UpdateAssignmentStatusRequest {
    status: AssignmentStatus,
}

async fn update_assignment_status(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<UpdateAssignmentStatusRequest>,
) -> Result<Response, ApiError> {
    require_admin(&auth)?;
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers)?;

    let key = IdempotencyKey::new(
        "assignment_status",
        assignment_id.clone(),
        request_id.clone(),
    );

    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let service = AssignmentService::new(
                state.assignment_repo.clone(),
                state.segment_repo.clone(),
                state.membership_repo.clone(),
            );
            let assignment = service
                .update_status(&assignment_id, payload.status)
                .await
                .map_err(map_domain_error)?;

            let segment = owning_segment(&state, &assignment.segment_id).await?;
            record_activity(
                &state,
                &segment.project_id,
                actor,
                format!(
                    "assignment on segment {} marked {}",
                    segment.name,
                    assignment.status.as_str()
                ),
                RelatedEntity {
                    kind: "assignment".to_string(),
                    entity_id: assignment.assignment_id.clone(),
                    label: Some(segment.name.clone()),
                },
                request_id,
                correlation_id,
            )
            .await?;

            let response = IdempotencyResponse {
                status_code: StatusCode::OK.as_u16(),
                body: serde_json::to_value(&assignment).map_err(|_| ApiError::Internal)?,
            };
            complete_idempotent(&state, &key, response).await
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct AppendActivityRequest {
    #[validate(length(min = 1, max = 500))]
    summary: String,
    related: Option<RelatedEntity>,
    payload: Option<Value>,
}

async fn append_activity(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<AppendActivityRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers)?;

    let key = IdempotencyKey::new("activity_append", project_id.clone(), request_id.clone());

    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let service = state.feed_service();
            let input = ActivityAppend {
                summary: payload.summary,
                related: payload.related,
                payload: payload.payload,
            };

            let entry = service
                .append(
                    &auth.role,
                    actor,
                    &project_id,
                    request_id,
                    correlation_id,
                    input,
                )
                .await
                .map_err(map_domain_error)?;

            let response = IdempotencyResponse {
                status_code: StatusCode::CREATED.as_u16(),
                body: serde_json::to_value(&entry).map_err(|_| ApiError::Internal)?,
            };
            complete_idempotent(&state, &key, response).await
        }
    }
}

#[derive(Debug, Deserialize)]
struct PollQuery {
    cursor_ms: Option<i64>,
}

async fn poll_activity(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PollQuery>,
) -> Result<Json<FeedPage>, ApiError> {
    let actor = actor_identity(&auth)?;
    let page = state
        .feed_service()
        .poll(&auth.role, &actor.user_id, &project_id, query.cursor_ms)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(page))
}

async fn get_read_marker(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ReadMarkerStatus>, ApiError> {
    let actor = actor_identity(&auth)?;
    let status = state
        .feed_service()
        .read_marker(&auth.role, &actor.user_id, &project_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(status))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let actor = actor_identity(&auth)?;
    let marker = state
        .feed_service()
        .mark_read(&auth.role, &actor.user_id, &project_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(marker).into_response())
}

fn segment_service(state: &AppState) -> SegmentService {
    SegmentService::new(
        state.segment_repo.clone(),
        state.project_repo.clone(),
        state.membership_repo.clone(),
        state.assignment_repo.clone(),
    )
}

async fn owning_segment(state: &AppState, segment_id: &str) -> Result<RoadSegment, ApiError> {
    state
        .segment_repo
        .get(segment_id)
        .await
        .map_err(map_domain_error)?
        .ok_or(ApiError::NotFound)
}

async fn record_activity(
    state: &AppState,
    project_id: &str,
    actor: ActorIdentity,
    summary: String,
    related: RelatedEntity,
    request_id: String,
    correlation_id: String,
) -> Result<ActivityEntry, ApiError> {
    let draft = ActivityDraft {
        project_id: project_id.to_string(),
        actor,
        summary,
        related: Some(related),
        payload: None,
        request_id,
        correlation_id,
    };
    state
        .activity_log
        .append(&draft)
        .await
        .map_err(map_domain_error)
}

async fn complete_idempotent(
    state: &AppState,
    key: &IdempotencyKey,
    response: IdempotencyResponse,
) -> Result<Response, ApiError> {
    state
        .idempotency
        .complete(key, response.clone())
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "idempotency complete failed");
            ApiError::Internal
        })?;
    Ok(to_response(response))
}

fn require_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn actor_identity(auth: &AuthContext) -> Result<ActorIdentity, ApiError> {
    let user_id = auth
        .user_id
        .as_ref()
        .filter(|user_id| !user_id.trim().is_empty())
        .ok_or(ApiError::Unauthorized)?;
    let username = auth
        .username
        .as_deref()
        .filter(|username| !username.trim().is_empty())
        .unwrap_or(user_id);
    Ok(ActorIdentity {
        user_id: user_id.to_string(),
        username: username.to_string(),
    })
}

fn request_id_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(std::string::ToString::to_string)
        .ok_or_else(|| ApiError::Validation("missing request id".into()))
}

fn correlation_id_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(app_middleware::CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(std::string::ToString::to_string)
        .ok_or_else(|| ApiError::Validation("missing correlation id".into()))
}

fn map_domain_error(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation(message) => ApiError::Validation(message),
        DomainError::Unauthenticated => ApiError::Unauthorized,
        DomainError::Forbidden(_) => ApiError::Forbidden,
        DomainError::NotFound => ApiError::NotFound,
        DomainError::Conflict => ApiError::Conflict,
        DomainError::InvalidGeometry(message) => ApiError::InvalidGeometry(message),
        DomainError::Unavailable(message) => {
            tracing::error!(error = %message, "storage unavailable");
            ApiError::Unavailable
        }
    }
}

fn to_response(response: IdempotencyResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}
