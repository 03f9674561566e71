use std::sync::Arc;

use crate::DomainResult;
use crate::auth::Role;
use crate::error::DomainError;
use crate::ports::projects::MembershipRepository;

/// Read-access policy for a project's activity feed. Roster membership is
/// the only non-admin grant; nothing is inherited from roles or other
/// projects.
#[derive(Clone)]
pub struct AccessService {
    members: Arc<dyn MembershipRepository>,
}

impl AccessService {
    pub fn new(members: Arc<dyn MembershipRepository>) -> Self {
        Self { members }
    }

    /// Predicate over store state. Absence of a roster row is an ordinary
    /// negative answer, never an error, and the project's existence is not
    /// consulted at all.
    pub async fn can_read_activity(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
    ) -> DomainResult<bool> {
        if role.is_admin() {
            return Ok(true);
        }
        Ok(self.members.get(project_id, user_id).await?.is_some())
    }

    pub async fn assert_can_read(
        &self,
        role: &Role,
        user_id: &str,
        project_id: &str,
    ) -> DomainResult<()> {
        if self.can_read_activity(role, user_id, project_id).await? {
            Ok(())
        } else {
            Err(DomainError::Forbidden(
                "not a member of this project".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BoxFuture;
    use crate::projects::ProjectMember;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct MockMembershipRepo {
        members: Arc<RwLock<HashMap<(String, String), ProjectMember>>>,
    }

    impl MembershipRepository for MockMembershipRepo {
        fn add(&self, member: &ProjectMember) -> BoxFuture<'_, DomainResult<ProjectMember>> {
            let member = member.clone();
            let members = self.members.clone();
            Box::pin(async move {
                members.write().await.insert(
                    (member.project_id.clone(), member.user_id.clone()),
                    member.clone(),
                );
                Ok(member)
            })
        }

        fn remove(&self, project_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<()>> {
            let key = (project_id.to_string(), user_id.to_string());
            let members = self.members.clone();
            Box::pin(async move {
                members
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
            let members = self.members.clone();
            Box::pin(async move { Ok(members.read().await.get(&key).cloned()) })
        }

        fn list_by_project(
            &self,
            project_id: &str,
        ) -> BoxFuture<'_, DomainResult<Vec<ProjectMember>>> {
            let project_id = project_id.to_string();
            let members = self.members.clone();
            Box::pin(async move {
                Ok(members
                    .read()
                    .await
                    .values()
                    .filter(|member| member.project_id == project_id)
                    .cloned()
                    .collect())
            })
        }

        fn list_projects_for_user(
            &self,
            user_id: &str,
        ) -> BoxFuture<'_, DomainResult<Vec<String>>> {
            let user_id = user_id.to_string();
            let members = self.members.clone();
            Box::pin(async move {
                Ok(members
                    .read()
                    .await
                    .values()
                    .filter(|member| member.user_id == user_id)
                    .map(|member| member.project_id.clone())
                    .collect())
            })
        }
    }

    async fn service_with_member(project_id: &str, user_id: &str) -> AccessService {
        let repo = Arc::new(MockMembershipRepo::default());
        repo.add(&ProjectMember {
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
            added_by: "admin-1".to_string(),
            added_at_ms: 0,
        })
        .await
        .expect("seed member");
        AccessService::new(repo)
    }

    #[tokio::test]
    async fn admins_can_read_any_project_feed() {
        let service = AccessService::new(Arc::new(MockMembershipRepo::default()));
        let allowed = service
            .can_read_activity(&Role::Admin, "admin-1", "project-404")
            .await
            .expect("predicate");
        assert!(allowed);
    }

    #[tokio::test]
    async fn members_can_read_their_project_feed() {
        let service = service_with_member("project-1", "user-5").await;
        let allowed = service
            .can_read_activity(&Role::Contractor, "user-5", "project-1")
            .await
            .expect("predicate");
        assert!(allowed);
    }

    #[tokio::test]
    async fn absence_of_membership_is_a_negative_answer_not_an_error() {
        let service = service_with_member("project-1", "user-5").await;
        let allowed = service
            .can_read_activity(&Role::Contractor, "user-9", "project-1")
            .await
            .expect("predicate");
        assert!(!allowed);
    }

    #[tokio::test]
    async fn assert_maps_a_negative_answer_to_forbidden() {
        let service = service_with_member("project-1", "user-5").await;
        let result = service
            .assert_can_read(&Role::Inspector, "user-9", "project-1")
            .await;
        assert!(matches!(result, Err(DomainError::Forbidden(_))));
    }
}
