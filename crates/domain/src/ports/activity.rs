use crate::activity::{ActivityDraft, ActivityEntry, FeedReadMarker};
use crate::ports::BoxFuture;

use crate::DomainResult;

/// Append-only log. Implementations assign entry identity and a creation
/// timestamp that never moves backwards for the same store instance.
pub trait ActivityLog: Send + Sync {
    fn append(&self, draft: &ActivityDraft) -> BoxFuture<'_, DomainResult<ActivityEntry>>;

    /// Entries for the project recorded strictly after `after_ms`, newest
    /// first. A `limit` of zero means unbounded.
    fn query_after(
        &self,
        project_id: &str,
        after_ms: i64,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<ActivityEntry>>>;
}

pub trait ReadMarkerRepository: Send + Sync {
    fn upsert(&self, marker: &FeedReadMarker) -> BoxFuture<'_, DomainResult<FeedReadMarker>>;

    fn get(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<FeedReadMarker>>>;
}
