//! Identity manager: validation and caching over an `IdentityStore`.
//!
//! Reads listed in [`CachedOperation`] go through the cache. Every write
//! issued here invalidates the entries it can affect. Writes issued on the
//! store directly are not seen until [`IdentityManager::invalidate`] is
//! called or a later manager write touches the same entry.

use std::sync::Arc;
use validator::Validate;

use super::cache::Cache;
use super::error::{EntityKind, ServiceError};
use super::store::IdentityStore;
use super::token::{TokenFilter, TokenManager};
use crate::config::{CacheConfig, OsInheritConfig};
use crate::models::{
    CreateDomainRequest, CreateGroupRequest, CreateProjectRequest, CreateRoleRequest,
    CreateUserRequest, Domain, Group, Project, Role, UpdateDomainRequest, UpdateGroupRequest,
    UpdateProjectRequest, UpdateRoleRequest, UpdateUserRequest, User,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachedOperation {
    /// args: `[user_id]`
    GetUser,
    /// args: `[name, domain_id]`
    GetUserByName,
    /// args: `[group_id]`
    GetGroup,
    /// args: `[project_id]`
    GetProject,
    /// args: `[name, domain_id]`
    GetProjectByName,
    /// args: `[domain_id]`
    GetDomain,
    /// args: `[name]`
    GetDomainByName,
    /// args: `[role_id]`
    GetRole,
}

impl CachedOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachedOperation::GetUser => "get_user",
            CachedOperation::GetUserByName => "get_user_by_name",
            CachedOperation::GetGroup => "get_group",
            CachedOperation::GetProject => "get_project",
            CachedOperation::GetProjectByName => "get_project_by_name",
            CachedOperation::GetDomain => "get_domain",
            CachedOperation::GetDomainByName => "get_domain_by_name",
            CachedOperation::GetRole => "get_role",
        }
    }
}

pub struct IdentityManager {
    pub(super) store: Arc<dyn IdentityStore>,
    pub(super) cache: Cache,
    pub(super) inherit_enabled: bool,
    tokens: Option<Arc<TokenManager>>,
}

impl IdentityManager {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        cache: &CacheConfig,
        os_inherit: &OsInheritConfig,
    ) -> Self {
        Self {
            store,
            cache: Cache::new(cache),
            inherit_enabled: os_inherit.enabled,
            tokens: None,
        }
    }

    /// Revoke a user's tokens when the user is deleted, disabled, changes
    /// password or leaves a group.
    pub fn with_token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// The uncached store underneath.
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    pub fn invalidate(&self, operation: CachedOperation, args: &[&str]) {
        self.cache.invalidate(operation.as_str(), args);
    }

    pub(super) async fn revoke_tokens(
        &self,
        user_id: &str,
        filter: TokenFilter,
    ) -> Result<(), ServiceError> {
        if let Some(tokens) = &self.tokens {
            tokens.delete_tokens(user_id, &filter).await?;
        }
        Ok(())
    }

    async fn ensure_domain(&self, domain_id: &str) -> Result<(), ServiceError> {
        self.store.get_domain(domain_id).await.map(|_| ())
    }

    // Users

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User, ServiceError> {
        request.validate()?;
        self.ensure_domain(&request.domain_id).await?;
        let (user, password) = request.into_user();
        let user = self.store.create_user(user, password).await?;
        self.invalidate_user(&user);
        tracing::info!(user_id = %user.id, domain_id = %user.domain_id, "Created user");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, ServiceError> {
        self.cache
            .memoize(CachedOperation::GetUser.as_str(), &[user_id], || {
                self.store.get_user(user_id)
            })
            .await
    }

    pub async fn get_user_by_name(&self, name: &str, domain_id: &str) -> Result<User, ServiceError> {
        self.cache
            .memoize(
                CachedOperation::GetUserByName.as_str(),
                &[name, domain_id],
                || self.store.get_user_by_name(name, domain_id),
            )
            .await
    }

    pub async fn update_user(
        &self,
        user_id: &str,
        request: UpdateUserRequest,
    ) -> Result<User, ServiceError> {
        request.validate()?;
        if request.id.as_deref().is_some_and(|id| id != user_id) {
            return Err(ServiceError::validation("Cannot change user ID"));
        }
        let current = self.store.get_user(user_id).await?;
        let updated = request.apply(&current);
        if updated.domain_id != current.domain_id {
            self.ensure_domain(&updated.domain_id).await?;
        }
        let user = self
            .store
            .update_user(user_id, updated, request.password.clone())
            .await?;
        self.invalidate_user(&current);
        self.invalidate_user(&user);

        if (current.enabled && !user.enabled) || request.password.is_some() {
            self.revoke_tokens(user_id, TokenFilter::default()).await?;
        }
        Ok(user)
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), ServiceError> {
        let current = self.store.get_user(user_id).await?;
        self.store.delete_user(user_id).await?;
        self.invalidate_user(&current);
        self.revoke_tokens(user_id, TokenFilter::default()).await?;
        tracing::info!(user_id = %user_id, "Deleted user");
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        self.store.list_users().await
    }

    fn invalidate_user(&self, user: &User) {
        self.invalidate(CachedOperation::GetUser, &[user.id.as_str()]);
        self.invalidate(
            CachedOperation::GetUserByName,
            &[user.name.as_str(), user.domain_id.as_str()],
        );
    }

    // Groups

    pub async fn create_group(&self, request: CreateGroupRequest) -> Result<Group, ServiceError> {
        request.validate()?;
        self.ensure_domain(&request.domain_id).await?;
        let group = self.store.create_group(request.into_group()).await?;
        self.invalidate(CachedOperation::GetGroup, &[group.id.as_str()]);
        Ok(group)
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Group, ServiceError> {
        self.cache
            .memoize(CachedOperation::GetGroup.as_str(), &[group_id], || {
                self.store.get_group(group_id)
            })
            .await
    }

    pub async fn update_group(
        &self,
        group_id: &str,
        request: UpdateGroupRequest,
    ) -> Result<Group, ServiceError> {
        request.validate()?;
        let current = self.store.get_group(group_id).await?;
        let updated = request.apply(&current);
        if updated.domain_id != current.domain_id {
            self.ensure_domain(&updated.domain_id).await?;
        }
        let group = self.store.update_group(group_id, updated).await?;
        self.invalidate(CachedOperation::GetGroup, &[group_id]);
        Ok(group)
    }

    /// Former members lose their tokens, as with `remove_user_from_group`.
    pub async fn delete_group(&self, group_id: &str) -> Result<(), ServiceError> {
        let members = self.store.list_users_in_group(group_id).await?;
        self.store.delete_group(group_id).await?;
        self.invalidate(CachedOperation::GetGroup, &[group_id]);
        for member in &members {
            self.revoke_tokens(&member.id, TokenFilter::default()).await?;
        }
        tracing::info!(group_id = %group_id, members = members.len(), "Deleted group");
        Ok(())
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, ServiceError> {
        self.store.list_groups().await
    }

    pub async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<(), ServiceError> {
        self.store.add_user_to_group(user_id, group_id).await
    }

    pub async fn remove_user_from_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<(), ServiceError> {
        self.store.remove_user_from_group(user_id, group_id).await?;
        self.revoke_tokens(user_id, TokenFilter::default()).await
    }

    pub async fn check_user_in_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<(), ServiceError> {
        self.store.check_user_in_group(user_id, group_id).await
    }

    pub async fn list_users_in_group(&self, group_id: &str) -> Result<Vec<User>, ServiceError> {
        self.store.list_users_in_group(group_id).await
    }

    pub async fn list_groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, ServiceError> {
        self.store.list_groups_for_user(user_id).await
    }

    // Projects

    pub async fn create_project(
        &self,
        request: CreateProjectRequest,
    ) -> Result<Project, ServiceError> {
        request.validate()?;
        self.ensure_domain(&request.domain_id).await?;
        let project = self.store.create_project(request.into_project()).await?;
        self.invalidate_project(&project);
        Ok(project)
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project, ServiceError> {
        self.cache
            .memoize(CachedOperation::GetProject.as_str(), &[project_id], || {
                self.store.get_project(project_id)
            })
            .await
    }

    pub async fn get_project_by_name(
        &self,
        name: &str,
        domain_id: &str,
    ) -> Result<Project, ServiceError> {
        self.cache
            .memoize(
                CachedOperation::GetProjectByName.as_str(),
                &[name, domain_id],
                || self.store.get_project_by_name(name, domain_id),
            )
            .await
    }

    /// A differing `id` in the request is ignored.
    pub async fn update_project(
        &self,
        project_id: &str,
        request: UpdateProjectRequest,
    ) -> Result<Project, ServiceError> {
        request.validate()?;
        let current = self.store.get_project(project_id).await?;
        let updated = request.apply(&current);
        if updated.domain_id != current.domain_id {
            self.ensure_domain(&updated.domain_id).await?;
        }
        let project = self.store.update_project(project_id, updated).await?;
        self.invalidate_project(&current);
        self.invalidate_project(&project);
        Ok(project)
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<(), ServiceError> {
        let current = self.store.get_project(project_id).await?;
        self.store.delete_project(project_id).await?;
        self.invalidate_project(&current);
        Ok(())
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ServiceError> {
        self.store.list_projects().await
    }

    pub async fn list_projects_in_domain(&self, domain_id: &str) -> Result<Vec<Project>, ServiceError> {
        self.ensure_domain(domain_id).await?;
        self.store.list_projects_in_domain(domain_id).await
    }

    fn invalidate_project(&self, project: &Project) {
        self.invalidate(CachedOperation::GetProject, &[project.id.as_str()]);
        self.invalidate(
            CachedOperation::GetProjectByName,
            &[project.name.as_str(), project.domain_id.as_str()],
        );
    }

    // Domains

    pub async fn create_domain(&self, request: CreateDomainRequest) -> Result<Domain, ServiceError> {
        request.validate()?;
        let domain = self.store.create_domain(request.into_domain()).await?;
        self.invalidate_domain(&domain);
        Ok(domain)
    }

    pub async fn get_domain(&self, domain_id: &str) -> Result<Domain, ServiceError> {
        self.cache
            .memoize(CachedOperation::GetDomain.as_str(), &[domain_id], || {
                self.store.get_domain(domain_id)
            })
            .await
    }

    pub async fn get_domain_by_name(&self, name: &str) -> Result<Domain, ServiceError> {
        self.cache
            .memoize(CachedOperation::GetDomainByName.as_str(), &[name], || {
                self.store.get_domain_by_name(name)
            })
            .await
    }

    pub async fn update_domain(
        &self,
        domain_id: &str,
        request: UpdateDomainRequest,
    ) -> Result<Domain, ServiceError> {
        request.validate()?;
        let current = self.store.get_domain(domain_id).await?;
        let domain = self
            .store
            .update_domain(domain_id, request.apply(&current))
            .await?;
        self.invalidate_domain(&current);
        self.invalidate_domain(&domain);
        Ok(domain)
    }

    /// Refuses to delete a domain that still owns users, groups or projects.
    pub async fn delete_domain(&self, domain_id: &str) -> Result<(), ServiceError> {
        let current = self.store.get_domain(domain_id).await?;

        let owns_users = self
            .store
            .list_users()
            .await?
            .iter()
            .any(|u| u.domain_id == domain_id);
        let owns_groups = self
            .store
            .list_groups()
            .await?
            .iter()
            .any(|g| g.domain_id == domain_id);
        let owns_projects = !self
            .store
            .list_projects_in_domain(domain_id)
            .await?
            .is_empty();
        if owns_users || owns_groups || owns_projects {
            return Err(ServiceError::conflict(format!(
                "domain {} still owns users, groups or projects",
                domain_id
            )));
        }

        self.store.delete_domain(domain_id).await?;
        self.invalidate_domain(&current);
        tracing::info!(domain_id = %domain_id, "Deleted domain");
        Ok(())
    }

    pub async fn list_domains(&self) -> Result<Vec<Domain>, ServiceError> {
        self.store.list_domains().await
    }

    fn invalidate_domain(&self, domain: &Domain) {
        self.invalidate(CachedOperation::GetDomain, &[domain.id.as_str()]);
        self.invalidate(CachedOperation::GetDomainByName, &[domain.name.as_str()]);
    }

    // Roles

    pub async fn create_role(&self, request: CreateRoleRequest) -> Result<Role, ServiceError> {
        request.validate()?;
        let role = self.store.create_role(request.into_role()).await?;
        self.invalidate(CachedOperation::GetRole, &[role.id.as_str()]);
        Ok(role)
    }

    pub async fn get_role(&self, role_id: &str) -> Result<Role, ServiceError> {
        self.cache
            .memoize(CachedOperation::GetRole.as_str(), &[role_id], || {
                self.store.get_role(role_id)
            })
            .await
    }

    pub async fn update_role(
        &self,
        role_id: &str,
        request: UpdateRoleRequest,
    ) -> Result<Role, ServiceError> {
        request.validate()?;
        let current = self.store.get_role(role_id).await?;
        let role = self
            .store
            .update_role(role_id, request.apply(&current))
            .await?;
        self.invalidate(CachedOperation::GetRole, &[role_id]);
        Ok(role)
    }

    /// Deleting a role also removes every grant of it.
    pub async fn delete_role(&self, role_id: &str) -> Result<(), ServiceError> {
        self.store.delete_role(role_id).await?;
        self.invalidate(CachedOperation::GetRole, &[role_id]);
        Ok(())
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, ServiceError> {
        self.store.list_roles().await
    }

    pub(super) async fn ensure_exists(&self, kind: EntityKind, id: &str) -> Result<(), ServiceError> {
        match kind {
            EntityKind::User => self.store.get_user(id).await.map(|_| ()),
            EntityKind::Group => self.store.get_group(id).await.map(|_| ()),
            EntityKind::Project => self.store.get_project(id).await.map(|_| ()),
            EntityKind::Domain => self.store.get_domain(id).await.map(|_| ()),
            EntityKind::Role => self.store.get_role(id).await.map(|_| ()),
            other => Err(ServiceError::unexpected(format!(
                "existence check not supported for {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_DOMAIN_ID;
    use crate::services::memory::InMemoryIdentityStore;
    use crate::utils::parse_request;
    use serde_json::json;

    async fn manager() -> IdentityManager {
        let manager = IdentityManager::new(
            Arc::new(InMemoryIdentityStore::new()),
            &CacheConfig::default(),
            &OsInheritConfig::default(),
        );
        manager
            .create_domain(
                parse_request(json!({"id": DEFAULT_DOMAIN_ID, "name": "Default"})).unwrap(),
            )
            .await
            .unwrap();
        manager
    }

    #[tokio::test]
    async fn test_create_user_requires_domain() {
        let manager = manager().await;
        let err = manager
            .create_user(parse_request(json!({"name": "alice", "domain_id": "nowhere"})).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found_of(EntityKind::Domain));
    }

    #[tokio::test]
    async fn test_update_user_rejects_id_change() {
        let manager = manager().await;
        let user = manager
            .create_user(parse_request(json!({"name": "alice"})).unwrap())
            .await
            .unwrap();
        let err = manager
            .update_user(&user.id, parse_request(json!({"id": "other"})).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let same = manager
            .update_user(&user.id, parse_request(json!({"id": user.id})).unwrap())
            .await
            .unwrap();
        assert_eq!(same, user);
    }

    #[tokio::test]
    async fn test_rename_invalidates_old_name() {
        let manager = manager().await;
        let user = manager
            .create_user(parse_request(json!({"name": "alice"})).unwrap())
            .await
            .unwrap();
        manager
            .get_user_by_name("alice", DEFAULT_DOMAIN_ID)
            .await
            .unwrap();
        manager
            .update_user(&user.id, parse_request(json!({"name": "alicia"})).unwrap())
            .await
            .unwrap();
        assert!(manager
            .get_user_by_name("alice", DEFAULT_DOMAIN_ID)
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(
            manager
                .get_user_by_name("alicia", DEFAULT_DOMAIN_ID)
                .await
                .unwrap()
                .id,
            user.id
        );
    }

    #[tokio::test]
    async fn test_delete_non_empty_domain_conflicts() {
        let manager = manager().await;
        manager
            .create_project(parse_request(json!({"name": "alpha"})).unwrap())
            .await
            .unwrap();
        let err = manager.delete_domain(DEFAULT_DOMAIN_ID).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_empty_domain() {
        let manager = manager().await;
        let domain = manager
            .create_domain(parse_request(json!({"name": "empty"})).unwrap())
            .await
            .unwrap();
        manager.get_domain(&domain.id).await.unwrap();
        manager.delete_domain(&domain.id).await.unwrap();
        assert!(manager
            .get_domain(&domain.id)
            .await
            .unwrap_err()
            .is_not_found_of(EntityKind::Domain));
    }
}
