use std::sync::Arc;

use roadwatch_domain::access::AccessService;
use roadwatch_domain::activity::ActivityFeedService;
use roadwatch_domain::idempotency::{
    IdempotencyConfig, IdempotencyService, InMemoryIdempotencyStore,
};
use roadwatch_domain::ports::activity::{ActivityLog, ReadMarkerRepository};
use roadwatch_domain::ports::assignments::AssignmentRepository;
use roadwatch_domain::ports::projects::{MembershipRepository, ProjectRepository};
use roadwatch_domain::ports::segments::SegmentRepository;
use roadwatch_infra::config::AppConfig;
use roadwatch_infra::repositories::{
    InMemoryActivityLog, InMemoryAssignmentRepository, InMemoryMembershipRepository,
    InMemoryProjectRepository, InMemoryReadMarkerRepository, InMemorySegmentRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub project_repo: Arc<dyn ProjectRepository>,
    pub membership_repo: Arc<dyn MembershipRepository>,
    pub segment_repo: Arc<dyn SegmentRepository>,
    pub assignment_repo: Arc<dyn AssignmentRepository>,
    pub activity_log: Arc<dyn ActivityLog>,
    pub read_marker_repo: Arc<dyn ReadMarkerRepository>,
    pub idempotency: IdempotencyService,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let store = InMemoryIdempotencyStore::new("roadwatch");
        let idempotency = IdempotencyService::new(Arc::new(store), IdempotencyConfig::default());
        Self {
            config,
            project_repo: Arc::new(InMemoryProjectRepository::new()),
            membership_repo: Arc::new(InMemoryMembershipRepository::new()),
            segment_repo: Arc::new(InMemorySegmentRepository::new()),
            assignment_repo: Arc::new(InMemoryAssignmentRepository::new()),
            activity_log: Arc::new(InMemoryActivityLog::new()),
            read_marker_repo: Arc::new(InMemoryReadMarkerRepository::new()),
            idempotency,
        }
    }

    pub fn access_service(&self) -> AccessService {
        AccessService::new(self.membership_repo.clone())
    }

    pub fn feed_service(&self) -> ActivityFeedService {
        ActivityFeedService::new(
            self.activity_log.clone(),
            self.access_service(),
            self.project_repo.clone(),
            self.read_marker_repo.clone(),
            self.config.activity_history_limit,
        )
    }
}
