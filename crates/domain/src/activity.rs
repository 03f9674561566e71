use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DomainResult;
use crate::access::AccessService;
use crate::auth::Role;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::activity::{ActivityLog, ReadMarkerRepository};
use crate::ports::projects::ProjectRepository;
use crate::util::now_ms;

const MAX_SUMMARY_LENGTH: usize = 500;
const MAX_RELATED_LABEL_LENGTH: usize = 160;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RelatedEntity {
    pub kind: String,
    pub entity_id: String,
    pub label: Option<String>,
}

/// One immutable audit record of a change to a project. Actor and related
/// display fields are denormalized at append time so readers never join.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    pub entry_id: String,
    pub project_id: String,
    pub actor_id: String,
    pub actor_username: String,
    pub summary: String,
    pub related: Option<RelatedEntity>,
    pub payload: Option<Value>,
    pub request_id: String,
    pub correlation_id: String,
    pub recorded_at_ms: i64,
    pub event_hash: String,
}

/// What callers hand to the log; the store assigns identity, timestamp and
/// the audit hash.
#[derive(Clone, Debug)]
pub struct ActivityDraft {
    pub project_id: String,
    pub actor: ActorIdentity,
    pub summary: String,
    pub related: Option<RelatedEntity>,
    pub payload: Option<Value>,
    pub request_id: String,
    pub correlation_id: String,
}

#[derive(Clone, Debug)]
pub struct ActivityAppend {
    pub summary: String,
    pub related: Option<RelatedEntity>,
    pub payload: Option<Value>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FeedPage {
    pub entries: Vec<ActivityEntry>,
    pub next_cursor_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeedReadMarker {
    pub project_id: String,
    pub user_id: String,
    pub last_seen_ms: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ReadMarkerStatus {
    pub last_seen_ms: i64,
    pub has_new_activity: bool,
}

#[derive(Clone, Serialize)]
struct ActivityAuditPayload {
    entry_id: String,
    project_id: String,
    actor_id: String,
    actor_username: String,
    summary: String,
    related: Option<RelatedEntity>,
    payload: Option<Value>,
    request_id: String,
    correlation_id: String,
    recorded_at_ms: i64,
}

/// Seals an entry once the store has assigned identity and timestamp.
pub fn apply_activity_audit(mut entry: ActivityEntry) -> DomainResult<ActivityEntry> {
    let payload = ActivityAuditPayload {
        entry_id: entry.entry_id.clone(),
        project_id: entry.project_id.clone(),
        actor_id: entry.actor_id.clone(),
        actor_username: entry.actor_username.clone(),
        summary: entry.summary.clone(),
        related: entry.related.clone(),
        payload: entry.payload.clone(),
        request_id: entry.request_id.clone(),
        correlation_id: entry.correlation_id.clone(),
        recorded_at_ms: entry.recorded_at_ms,
    };
    entry.event_hash = crate::util::immutable_event_hash(&payload)?;
    Ok(entry)
}

/// Incremental feed over the append-only activity log. Cursors are held by
/// the client; the service keeps no per-client state between polls.
#[derive(Clone)]
pub struct ActivityFeedService {
    log: Arc<dyn ActivityLog>,
    access: AccessService,
    projects: Arc<dyn ProjectRepository>,
    read_markers: Arc<dyn ReadMarkerRepository>,
    history_limit: usize,
}

impl ActivityFeedService {
    pub fn new(
        log: Arc<dyn ActivityLog>,
        access: AccessService,
        projects: Arc<dyn ProjectRepository>,
        read_markers: Arc<dyn ReadMarkerRepository>,
        history_limit: usize,
    ) -> Self {
        Self {
            log,
            access,
            projects,
            read_markers,
            history_limit,
        }
    }

    /// Membership is checked before existence, so a non-member learns
    /// nothing about whether the project is real; admins bypass the roster
    /// and get `NotFound` for a project that does not exist.
    async fn assert_feed_access(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
    ) -> DomainResult<()> {
        self.access
            .assert_can_read(role, user_id, project_id)
            .await?;
        self.projects
            .get(project_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        Ok(())
    }

    pub async fn append(
        &self,
        role: &Role,
        actor: ActorIdentity,
        project_id: &str,
        request_id: String,
        correlation_id: String,
        input: ActivityAppend,
    ) -> DomainResult<ActivityEntry> {
        self.assert_feed_access(role, &actor.user_id, project_id)
            .await?;
        let payload = validate_activity_append(&input)?;
        let draft = ActivityDraft {
            project_id: project_id.to_string(),
            actor,
            summary: payload.summary,
            related: payload.related,
            payload: payload.payload,
            request_id,
            correlation_id,
        };
        self.log.append(&draft).await
    }

    pub async fn poll(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
        cursor_ms: Option<i64>,
    ) -> DomainResult<FeedPage> {
        self.poll_at(role, user_id, project_id, cursor_ms, now_ms())
            .await
    }

    /// `poll` with the serving instant supplied by the caller.
    ///
    /// `next_cursor_ms` is that instant, captured before the store query,
    /// never the newest entry timestamp. An entry that commits while the
    /// response is being built therefore stays ahead of the returned cursor
    /// and is re-offered on the next poll; entries sharing the boundary
    /// timestamp may be delivered twice, and clients dedupe by `entry_id`.
    pub async fn poll_at(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
        cursor_ms: Option<i64>,
        snapshot_ms: i64,
    ) -> DomainResult<FeedPage> {
        self.assert_feed_access(role, user_id, project_id).await?;
        let after_ms = cursor_ms.unwrap_or(0);
        let entries = self
            .log
            .query_after(project_id, after_ms, self.history_limit)
            .await?;
        Ok(FeedPage {
            entries,
            next_cursor_ms: snapshot_ms,
        })
    }

    pub async fn read_marker(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
    ) -> DomainResult<ReadMarkerStatus> {
        self.assert_feed_access(role, user_id, project_id).await?;
        let last_seen_ms = self
            .read_markers
            .get(project_id, user_id)
            .await?
            .map(|marker| marker.last_seen_ms)
            .unwrap_or(0);
        let newer = self.log.query_after(project_id, last_seen_ms, 1).await?;
        Ok(ReadMarkerStatus {
            last_seen_ms,
            has_new_activity: !newer.is_empty(),
        })
    }

    pub async fn mark_read(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
    ) -> DomainResult<FeedReadMarker> {
        self.assert_feed_access(role, user_id, project_id).await?;
        let marker = FeedReadMarker {
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
            last_seen_ms: now_ms(),
        };
        self.read_markers.upsert(&marker).await
    }
}

fn validate_activity_append(input: &ActivityAppend) -> DomainResult<ActivityAppend> {
    let summary = input.summary.trim().to_string();
    if summary.is_empty() {
        return Err(DomainError::Validation("summary is required".into()));
    }
    if summary.chars().count() > MAX_SUMMARY_LENGTH {
        return Err(DomainError::Validation(format!(
            "summary exceeds max length of {MAX_SUMMARY_LENGTH}"
        )));
    }

    let related = match &input.related {
        Some(related) => {
            if related.kind.trim().is_empty() {
                return Err(DomainError::Validation(
                    "related.kind cannot be empty".into(),
                ));
            }
            if related.entity_id.trim().is_empty() {
                return Err(DomainError::Validation(
                    "related.entity_id cannot be empty".into(),
                ));
            }
            if let Some(label) = &related.label {
                if label.chars().count() > MAX_RELATED_LABEL_LENGTH {
                    return Err(DomainError::Validation(format!(
                        "related.label exceeds max length of {MAX_RELATED_LABEL_LENGTH}"
                    )));
                }
            }
            Some(related.clone())
        }
        None => None,
    };

    Ok(ActivityAppend {
        summary,
        related,
        payload: input.payload.clone(),
    })
}
