use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use roadwatch_domain::DomainResult;
use roadwatch_domain::activity::{
    ActivityDraft, ActivityEntry, FeedReadMarker, apply_activity_audit,
};
use roadwatch_domain::assignments::{Assignment, AssignmentStatus};
use roadwatch_domain::error::DomainError;
use roadwatch_domain::ports::BoxFuture;
use roadwatch_domain::ports::activity::{ActivityLog, ReadMarkerRepository};
use roadwatch_domain::ports::assignments::AssignmentRepository;
use roadwatch_domain::ports::projects::{MembershipRepository, ProjectRepository};
use roadwatch_domain::ports::segments::SegmentRepository;
use roadwatch_domain::projects::{Project, ProjectMember};
use roadwatch_domain::segments::RoadSegment;
use roadwatch_domain::util::{now_ms, uuid_v7_without_dashes};

#[derive(Default)]
pub struct InMemoryProjectRepository {
    by_id: Arc<RwLock<HashMap<String, Project>>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectRepository for InMemoryProjectRepository {
    fn create(&self, project: &Project) -> BoxFuture<'_, DomainResult<Project>> {
        let project = project.clone();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            if by_id.contains_key(&project.project_id) {
                return Err(DomainError::Conflict);
            }
            by_id.insert(project.project_id.clone(), project.clone());
            Ok(project)
        })
    }

    fn get(&self, project_id: &str) -> BoxFuture<'_, DomainResult<Option<Project>>> {
        let project_id = project_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move { Ok(by_id.read().await.get(&project_id).cloned()) })
    }

    fn list_all(&self) -> BoxFuture<'_, DomainResult<Vec<Project>>> {
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut projects: Vec<Project> = by_id.read().await.values().cloned().collect();
            projects.sort_by(|left, right| {
                right
                    .created_at_ms
                    .cmp(&left.created_at_ms)
                    .then_with(|| right.project_id.cmp(&left.project_id))
            });
            Ok(projects)
        })
    }
}

#[derive(Default)]
pub struct InMemoryMembershipRepository {
    by_pair: Arc<RwLock<HashMap<(String, String), ProjectMember>>>,
}

impl InMemoryMembershipRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MembershipRepository for InMemoryMembershipRepository {
    fn add(&self, member: &ProjectMember) -> BoxFuture<'_, DomainResult<ProjectMember>> {
        let member = member.clone();
        let by_pair = self.by_pair.clone();
        Box::pin(async move {
            let key = (member.project_id.clone(), member.user_id.clone());
            let mut by_pair = by_pair.write().await;
            if by_pair.contains_key(&key) {
                return Err(DomainError::Conflict);
            }
            by_pair.insert(key, member.clone());
            Ok(member)
        })
    }

    fn remove(&self, project_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let key = (project_id.to_string(), user_id.to_string());
        let by_pair = self.by_pair.clone();
        Box::pin(async move {
            by_pair
                .write()
                .await
                .remove(&key)
                .map(|_| ())
                .ok_or(DomainError::NotFound)
        })
    }

    fn get(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<ProjectMember>>> {
        let key = (project_id.to_string(), user_id.to_string());
        let by_pair = self.by_pair.clone();
        Box::pin(async move { Ok(by_pair.read().await.get(&key).cloned()) })
    }

    fn list_by_project(&self, project_id: &str) -> BoxFuture<'_, DomainResult<Vec<ProjectMember>>> {
        let project_id = project_id.to_string();
        let by_pair = self.by_pair.clone();
        Box::pin(async move {
            let mut members: Vec<ProjectMember> = by_pair
                .read()
                .await
                .values()
                .filter(|member| member.project_id == project_id)
                .cloned()
                .collect();
            members.sort_by(|left, right| {
                left.added_at_ms
                    .cmp(&right.added_at_ms)
                    .then_with(|| left.user_id.cmp(&right.user_id))
            });
            Ok(members)
        })
    }

    fn list_projects_for_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<String>>> {
        let user_id = user_id.to_string();
        let by_pair = self.by_pair.clone();
        Box::pin(async move {
            let mut project_ids: Vec<String> = by_pair
                .read()
                .await
                .values()
                .filter(|member| member.user_id == user_id)
                .map(|member| member.project_id.clone())
                .collect();
            project_ids.sort();
            Ok(project_ids)
        })
    }
}

#[derive(Default)]
pub struct InMemorySegmentRepository {
    by_id: Arc<RwLock<HashMap<String, RoadSegment>>>,
}

impl InMemorySegmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SegmentRepository for InMemorySegmentRepository {
    fn create(&self, segment: &RoadSegment) -> BoxFuture<'_, DomainResult<RoadSegment>> {
        let segment = segment.clone();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            if by_id.contains_key(&segment.segment_id) {
                return Err(DomainError::Conflict);
            }
            by_id.insert(segment.segment_id.clone(), segment.clone());
            Ok(segment)
        })
    }

    fn get(&self, segment_id: &str) -> BoxFuture<'_, DomainResult<Option<RoadSegment>>> {
        let segment_id = segment_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move { Ok(by_id.read().await.get(&segment_id).cloned()) })
    }

    fn list_by_project(&self, project_id: &str) -> BoxFuture<'_, DomainResult<Vec<RoadSegment>>> {
        let project_id = project_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut segments: Vec<RoadSegment> = by_id
                .read()
                .await
                .values()
                .filter(|segment| segment.project_id == project_id)
                .cloned()
                .collect();
            segments.sort_by(|left, right| {
                left.created_at_ms
                    .cmp(&right.created_at_ms)
                    .then_with(|| left.segment_id.cmp(&right.segment_id))
            });
            Ok(segments)
        })
    }
}

#[derive(Default)]
pub struct InMemoryAssignmentRepository {
    by_id: Arc<RwLock<HashMap<String, Assignment>>>,
}

impl InMemoryAssignmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssignmentRepository for InMemoryAssignmentRepository {
    fn create(&self, assignment: &Assignment) -> BoxFuture<'_, DomainResult<Assignment>> {
        let assignment = assignment.clone();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            if by_id.contains_key(&assignment.assignment_id) {
                return Err(DomainError::Conflict);
            }
            by_id.insert(assignment.assignment_id.clone(), assignment.clone());
            Ok(assignment)
        })
    }

    fn get(&self, assignment_id: &str) -> BoxFuture<'_, DomainResult<Option<Assignment>>> {
        let assignment_id = assignment_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move { Ok(by_id.read().await.get(&assignment_id).cloned()) })
    }

    fn update_status(
        &self,
        assignment_id: &str,
        status: AssignmentStatus,
        updated_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Assignment>> {
        let assignment_id = assignment_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            let assignment = by_id.get_mut(&assignment_id).ok_or(DomainError::NotFound)?;
            assignment.status = status;
            assignment.updated_at_ms = updated_at_ms;
            Ok(assignment.clone())
        })
    }

    fn list_by_segment(&self, segment_id: &str) -> BoxFuture<'_, DomainResult<Vec<Assignment>>> {
        let segment_id = segment_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut assignments: Vec<Assignment> = by_id
                .read()
                .await
                .values()
                .filter(|assignment| assignment.segment_id == segment_id)
                .cloned()
                .collect();
            assignments.sort_by(|left, right| {
                left.starts_at_ms
                    .cmp(&right.starts_at_ms)
                    .then_with(|| left.assignment_id.cmp(&right.assignment_id))
            });
            Ok(assignments)
        })
    }
}

#[derive(Default)]
struct ActivityLogState {
    by_project: HashMap<String, Vec<ActivityEntry>>,
    last_recorded_ms: i64,
}

/// Append-only log keeping one write lock across timestamp assignment and
/// insertion, so concurrent appends serialize and assigned timestamps never
/// move backwards even when the wall clock does.
pub struct InMemoryActivityLog {
    state: Arc<RwLock<ActivityLogState>>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(now_ms))
    }

    pub fn with_clock(clock: Arc<dyn Fn() -> i64 + Send + Sync>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ActivityLogState::default())),
            clock,
        }
    }
}

impl Default for InMemoryActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog for InMemoryActivityLog {
    fn append(&self, draft: &ActivityDraft) -> BoxFuture<'_, DomainResult<ActivityEntry>> {
        let draft = draft.clone();
        let state = self.state.clone();
        let clock = self.clock.clone();
        Box::pin(async move {
            let mut state = state.write().await;
            let recorded_at_ms = (clock)().max(state.last_recorded_ms);
            state.last_recorded_ms = recorded_at_ms;

            let entry = apply_activity_audit(ActivityEntry {
                entry_id: uuid_v7_without_dashes(),
                project_id: draft.project_id.clone(),
                actor_id: draft.actor.user_id,
                actor_username: draft.actor.username,
                summary: draft.summary,
                related: draft.related,
                payload: draft.payload,
                request_id: draft.request_id,
                correlation_id: draft.correlation_id,
                recorded_at_ms,
                event_hash: String::new(),
            })?;

            state
                .by_project
                .entry(draft.project_id)
                .or_default()
                .push(entry.clone());
            Ok(entry)
        })
    }

    fn query_after(
        &self,
        project_id: &str,
        after_ms: i64,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<ActivityEntry>>> {
        let project_id = project_id.to_string();
        let state = self.state.clone();
        Box::pin(async move {
            let state = state.read().await;
            let mut entries: Vec<ActivityEntry> = state
                .by_project
                .get(&project_id)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|entry| entry.recorded_at_ms > after_ms)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            entries.sort_by(|left, right| {
                right
                    .recorded_at_ms
                    .cmp(&left.recorded_at_ms)
                    .then_with(|| right.entry_id.cmp(&left.entry_id))
            });
            if limit > 0 {
                entries.truncate(limit);
            }
            Ok(entries)
        })
    }
}

#[derive(Default)]
pub struct InMemoryReadMarkerRepository {
    by_pair: Arc<RwLock<HashMap<(String, String), FeedReadMarker>>>,
}

impl InMemoryReadMarkerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadMarkerRepository for InMemoryReadMarkerRepository {
    fn upsert(&self, marker: &FeedReadMarker) -> BoxFuture<'_, DomainResult<FeedReadMarker>> {
        let marker = marker.clone();
        let by_pair = self.by_pair.clone();
        Box::pin(async move {
            by_pair.write().await.insert(
                (marker.project_id.clone(), marker.user_id.clone()),
                marker.clone(),
            );
            Ok(marker)
        })
    }

    fn get(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<FeedReadMarker>>> {
        let key = (project_id.to_string(), user_id.to_string());
        let by_pair = self.by_pair.clone();
        Box::pin(async move { Ok(by_pair.read().await.get(&key).cloned()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadwatch_domain::identity::ActorIdentity;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn draft(project_id: &str, summary: &str) -> ActivityDraft {
        ActivityDraft {
            project_id: project_id.to_string(),
            actor: ActorIdentity::new("user-1", "user-1-name"),
            summary: summary.to_string(),
            related: None,
            payload: None,
            request_id: format!("req-{summary}"),
            correlation_id: format!("corr-{summary}"),
        }
    }

    fn manual_clock(start_ms: i64) -> (Arc<AtomicI64>, Arc<dyn Fn() -> i64 + Send + Sync>) {
        let tick = Arc::new(AtomicI64::new(start_ms));
        let handle = tick.clone();
        let clock: Arc<dyn Fn() -> i64 + Send + Sync> =
            Arc::new(move || handle.load(Ordering::SeqCst));
        (tick, clock)
    }

    #[tokio::test]
    async fn append_timestamps_never_move_backwards() {
        let (tick, clock) = manual_clock(5_000);
        let log = InMemoryActivityLog::with_clock(clock);

        let first = log.append(&draft("project-1", "one")).await.unwrap();
        tick.store(3_000, Ordering::SeqCst);
        let second = log.append(&draft("project-1", "two")).await.unwrap();

        assert_eq!(first.recorded_at_ms, 5_000);
        assert_eq!(second.recorded_at_ms, 5_000);
    }

    #[tokio::test]
    async fn same_millisecond_appends_share_a_timestamp() {
        let (_tick, clock) = manual_clock(7_000);
        let log = InMemoryActivityLog::with_clock(clock);

        let first = log.append(&draft("project-1", "one")).await.unwrap();
        let second = log.append(&draft("project-1", "two")).await.unwrap();

        assert_eq!(first.recorded_at_ms, 7_000);
        assert_eq!(second.recorded_at_ms, 7_000);
        assert_ne!(first.entry_id, second.entry_id);
    }

    #[tokio::test]
    async fn query_after_is_strictly_greater_and_newest_first() {
        let (tick, clock) = manual_clock(1_000);
        let log = InMemoryActivityLog::with_clock(clock);

        log.append(&draft("project-1", "t1")).await.unwrap();
        tick.store(2_000, Ordering::SeqCst);
        log.append(&draft("project-1", "t2a")).await.unwrap();
        log.append(&draft("project-1", "t2b")).await.unwrap();
        tick.store(3_000, Ordering::SeqCst);
        log.append(&draft("project-1", "t3")).await.unwrap();

        let after_t1 = log.query_after("project-1", 1_000, 0).await.unwrap();
        let summaries: Vec<&str> = after_t1
            .iter()
            .map(|entry| entry.summary.as_str())
            .collect();
        assert_eq!(summaries, vec!["t3", "t2b", "t2a"]);

        let after_t3 = log.query_after("project-1", 3_000, 0).await.unwrap();
        assert!(after_t3.is_empty());
    }

    #[tokio::test]
    async fn query_after_respects_the_limit() {
        let (tick, clock) = manual_clock(1_000);
        let log = InMemoryActivityLog::with_clock(clock);
        for i in 0..5 {
            tick.store(1_000 + i, Ordering::SeqCst);
            log.append(&draft("project-1", &format!("n{i}"))).await.unwrap();
        }

        let limited = log.query_after("project-1", 0, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].summary, "n4");
        assert_eq!(limited[1].summary, "n3");
    }

    #[tokio::test]
    async fn projects_are_isolated() {
        let (_tick, clock) = manual_clock(1_000);
        let log = InMemoryActivityLog::with_clock(clock);
        log.append(&draft("project-1", "one")).await.unwrap();
        log.append(&draft("project-2", "other")).await.unwrap();

        let entries = log.query_after("project-1", 0, 0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary, "one");
    }

    #[tokio::test]
    async fn entries_carry_an_audit_hash() {
        let log = InMemoryActivityLog::new();
        let entry = log.append(&draft("project-1", "sealed")).await.unwrap();
        assert_eq!(entry.event_hash.len(), 64);
    }

    #[tokio::test]
    async fn duplicate_membership_rows_conflict() {
        let repo = InMemoryMembershipRepository::new();
        let member = ProjectMember {
            project_id: "project-1".to_string(),
            user_id: "user-1".to_string(),
            added_by: "admin-1".to_string(),
            added_at_ms: 0,
        };
        repo.add(&member).await.unwrap();
        let duplicate = repo.add(&member).await;
        assert!(matches!(duplicate, Err(DomainError::Conflict)));
    }

    #[tokio::test]
    async fn removing_an_absent_membership_is_not_found() {
        let repo = InMemoryMembershipRepository::new();
        let result = repo.remove("project-1", "user-1").await;
        assert!(matches!(result, Err(DomainError::NotFound)));
    }

    #[tokio::test]
    async fn assignment_status_updates_are_persisted() {
        let repo = InMemoryAssignmentRepository::new();
        let assignment = Assignment {
            assignment_id: "a1".to_string(),
            segment_id: "seg-1".to_string(),
            contractor_id: "contractor-1".to_string(),
            status: AssignmentStatus::Active,
            starts_at_ms: 0,
            ends_at_ms: 10,
            notes: None,
            created_by: "admin-1".to_string(),
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        repo.create(&assignment).await.unwrap();
        repo.update_status("a1", AssignmentStatus::Cancelled, 99)
            .await
            .unwrap();

        let stored = repo.get("a1").await.unwrap().expect("assignment");
        assert_eq!(stored.status, AssignmentStatus::Cancelled);
        assert_eq!(stored.updated_at_ms, 99);
    }
}
