use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::assignments::{Assignment, SegmentState, segment_status_at};
use crate::auth::Role;
use crate::error::DomainError;
use crate::geometry::{GeoPoint, project_for_display, validate_polyline};
use crate::identity::ActorIdentity;
use crate::ports::assignments::AssignmentRepository;
use crate::ports::projects::{MembershipRepository, ProjectRepository};
use crate::ports::segments::SegmentRepository;
use crate::util::now_ms;

const MAX_NAME_LENGTH: usize = 160;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoadSegment {
    pub segment_id: String,
    pub project_id: String,
    pub name: String,
    pub geometry: Vec<GeoPoint>,
    pub length_m: f64,
    pub created_by: String,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct SegmentCreate {
    pub name: String,
    pub geometry: Vec<GeoPoint>,
    pub length_m: f64,
}

/// Per-segment status line as served to display clients. Geometry is
/// re-projected to (latitude, longitude) order on every request.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentStatusView {
    pub segment_id: String,
    pub name: String,
    pub rendered_geometry: Vec<(f64, f64)>,
    pub status: SegmentState,
    pub length_m: f64,
    pub active_assignment: Option<Assignment>,
    pub malformed_window_ids: Vec<String>,
}

#[derive(Clone)]
pub struct SegmentService {
    segments: Arc<dyn SegmentRepository>,
    projects: Arc<dyn ProjectRepository>,
    members: Arc<dyn MembershipRepository>,
    assignments: Arc<dyn AssignmentRepository>,
}

impl SegmentService {
    pub fn new(
        segments: Arc<dyn SegmentRepository>,
        projects: Arc<dyn ProjectRepository>,
        members: Arc<dyn MembershipRepository>,
        assignments: Arc<dyn AssignmentRepository>,
    ) -> Self {
        Self {
            segments,
            projects,
            members,
            assignments,
        }
    }

    pub async fn create(
        &self,
        actor: ActorIdentity,
        project_id: &str,
        input: SegmentCreate,
    ) -> DomainResult<RoadSegment> {
        let payload = validate_segment_create(&input)?;
        self.projects
            .get(project_id)
            .await?
            .ok_or(DomainError::NotFound)?;

        let segment = RoadSegment {
            segment_id: crate::util::uuid_v7_without_dashes(),
            project_id: project_id.to_string(),
            name: payload.name,
            geometry: payload.geometry,
            length_m: payload.length_m,
            created_by: actor.user_id,
            created_at_ms: now_ms(),
        };
        self.segments.create(&segment).await
    }

    pub async fn list_for_project(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
    ) -> DomainResult<Vec<RoadSegment>> {
        self.assert_project_access(role, user_id, project_id)
            .await?;
        self.segments.list_by_project(project_id).await
    }

    /// Status of every segment in the project at `at_ms` (the serving
    /// instant when absent). Nothing is cached; each call recomputes from
    /// the stored assignments.
    pub async fn status_board(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
        at_ms: Option<i64>,
    ) -> DomainResult<Vec<SegmentStatusView>> {
        self.assert_project_access(role, user_id, project_id)
            .await?;
        let now = at_ms.unwrap_or_else(now_ms);

        let segments = self.segments.list_by_project(project_id).await?;
        let mut board = Vec::with_capacity(segments.len());
        for segment in segments {
            let assignments = self.assignments.list_by_segment(&segment.segment_id).await?;
            let resolved = segment_status_at(&segment.segment_id, &assignments, now);
            let rendered_geometry = project_for_display(&segment.geometry)?;
            board.push(SegmentStatusView {
                segment_id: segment.segment_id,
                name: segment.name,
                rendered_geometry,
                status: resolved.status,
                length_m: segment.length_m,
                active_assignment: resolved.active_assignment,
                malformed_window_ids: resolved.malformed_window_ids,
            });
        }
        Ok(board)
    }

    async fn assert_project_access(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
    ) -> DomainResult<()> {
        if !role.is_admin() {
            let membership = self.members.get(project_id, user_id).await?;
            if membership.is_none() {
                return Err(DomainError::Forbidden(
                    "not a member of this project".into(),
                ));
            }
        }
        self.projects
            .get(project_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        Ok(())
    }
}

fn validate_segment_create(input: &SegmentCreate) -> DomainResult<SegmentCreate> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(DomainError::Validation("name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(DomainError::Validation(format!(
            "name exceeds max length of {MAX_NAME_LENGTH}"
        )));
    }

    validate_polyline(&input.geometry)?;

    if !input.length_m.is_finite() || input.length_m <= 0.0 {
        return Err(DomainError::Validation(
            "length_m must be a positive number".into(),
        ));
    }

    Ok(SegmentCreate {
        name,
        geometry: input.geometry.clone(),
        length_m: input.length_m,
    })
}
