use crate::ports::BoxFuture;
use crate::projects::{Project, ProjectMember};

use crate::DomainResult;

pub trait ProjectRepository: Send + Sync {
    fn create(&self, project: &Project) -> BoxFuture<'_, DomainResult<Project>>;

    fn get(&self, project_id: &str) -> BoxFuture<'_, DomainResult<Option<Project>>>;

    fn list_all(&self) -> BoxFuture<'_, DomainResult<Vec<Project>>>;
}

pub trait MembershipRepository: Send + Sync {
    fn add(&self, member: &ProjectMember) -> BoxFuture<'_, DomainResult<ProjectMember>>;

    fn remove(&self, project_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<()>>;

    fn get(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<ProjectMember>>>;

    fn list_by_project(&self, project_id: &str) -> BoxFuture<'_, DomainResult<Vec<ProjectMember>>>;

    fn list_projects_for_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<String>>>;
}
