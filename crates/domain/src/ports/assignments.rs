use crate::assignments::{Assignment, AssignmentStatus};
use crate::ports::BoxFuture;

use crate::DomainResult;

pub trait AssignmentRepository: Send + Sync {
    fn create(&self, assignment: &Assignment) -> BoxFuture<'_, DomainResult<Assignment>>;

    fn get(&self, assignment_id: &str) -> BoxFuture<'_, DomainResult<Option<Assignment>>>;

    fn update_status(
        &self,
        assignment_id: &str,
        status: AssignmentStatus,
        updated_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Assignment>>;

    fn list_by_segment(&self, segment_id: &str) -> BoxFuture<'_, DomainResult<Vec<Assignment>>>;
}
