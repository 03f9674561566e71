use crate::ports::BoxFuture;
use crate::segments::RoadSegment;

use crate::DomainResult;

pub trait SegmentRepository: Send + Sync {
    fn create(&self, segment: &RoadSegment) -> BoxFuture<'_, DomainResult<RoadSegment>>;

    fn get(&self, segment_id: &str) -> BoxFuture<'_, DomainResult<Option<RoadSegment>>>;

    fn list_by_project(&self, project_id: &str) -> BoxFuture<'_, DomainResult<Vec<RoadSegment>>>;
}
