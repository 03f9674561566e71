use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::auth::Role;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::projects::{MembershipRepository, ProjectRepository};
use crate::util::now_ms;

const MAX_NAME_LENGTH: usize = 160;
const MAX_WARD_LENGTH: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    Completed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub ward: String,
    pub status: ProjectStatus,
    pub created_by: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProjectMember {
    pub project_id: String,
    pub user_id: String,
    pub added_by: String,
    pub added_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct ProjectCreate {
    pub name: String,
    pub ward: String,
    pub status: Option<ProjectStatus>,
}

#[derive(Clone)]
pub struct ProjectService {
    projects: Arc<dyn ProjectRepository>,
    members: Arc<dyn MembershipRepository>,
}

impl ProjectService {
    pub fn new(projects: Arc<dyn ProjectRepository>, members: Arc<dyn MembershipRepository>) -> Self {
        Self { projects, members }
    }

    pub async fn create(&self, actor: ActorIdentity, input: ProjectCreate) -> DomainResult<Project> {
        let payload = validate_project_create(&input)?;
        let now = now_ms();
        let project = Project {
            project_id: crate::util::uuid_v7_without_dashes(),
            name: payload.name,
            ward: payload.ward,
            status: payload.status.unwrap_or(ProjectStatus::Planning),
            created_by: actor.user_id,
            created_at_ms: now,
            updated_at_ms: now,
        };
        self.projects.create(&project).await
    }

    /// Member-scoped lookup. Non-admin callers who are not on the roster get
    /// a forbidden error whether or not the project exists.
    pub async fn get_for(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
    ) -> DomainResult<Project> {
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
            .ok_or(DomainError::NotFound)
    }

    pub async fn list_for(&self, role: &Role, user_id: &str) -> DomainResult<Vec<Project>> {
        if role.is_admin() {
            return self.projects.list_all().await;
        }
        let project_ids = self.members.list_projects_for_user(user_id).await?;
        let mut projects = Vec::with_capacity(project_ids.len());
        for project_id in project_ids {
            if let Some(project) = self.projects.get(&project_id).await? {
                projects.push(project);
            }
        }
        projects.sort_by(|left, right| {
            right
                .created_at_ms
                .cmp(&left.created_at_ms)
                .then_with(|| right.project_id.cmp(&left.project_id))
        });
        Ok(projects)
    }

    /// Idempotent: re-assigning an existing member returns the existing row.
    pub async fn assign_member(
        &self,
        actor: ActorIdentity,
        project_id: &str,
        user_id: &str,
    ) -> DomainResult<ProjectMember> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(DomainError::Validation("user_id is required".into()));
        }
        self.projects
            .get(project_id)
            .await?
            .ok_or(DomainError::NotFound)?;

        if let Some(existing) = self.members.get(project_id, user_id).await? {
            return Ok(existing);
        }

        let member = ProjectMember {
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
            added_by: actor.user_id,
            added_at_ms: now_ms(),
        };
        self.members.add(&member).await
    }

    pub async fn unassign_member(&self, project_id: &str, user_id: &str) -> DomainResult<()> {
        self.projects
            .get(project_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        self.members.remove(project_id, user_id).await
    }

    pub async fn list_members(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
    ) -> DomainResult<Vec<ProjectMember>> {
        self.get_for(role, user_id, project_id).await?;
        self.members.list_by_project(project_id).await
    }
}

fn validate_project_create(input: &ProjectCreate) -> DomainResult<ProjectCreate> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(DomainError::Validation("name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(DomainError::Validation(format!(
            "name exceeds max length of {MAX_NAME_LENGTH}"
        )));
    }

    let ward = input.ward.trim().to_string();
    if ward.is_empty() {
        return Err(DomainError::Validation("ward is required".into()));
    }
    if ward.chars().count() > MAX_WARD_LENGTH {
        return Err(DomainError::Validation(format!(
            "ward exceeds max length of {MAX_WARD_LENGTH}"
        )));
    }

    Ok(ProjectCreate {
        name,
        ward,
        status: input.status.clone(),
    })
}
