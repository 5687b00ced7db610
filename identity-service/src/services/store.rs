use async_trait::async_trait;

use super::error::ServiceError;
use crate::models::{Actor, Domain, GrantFilter, Group, Project, Role, RoleAssignment, Scope, User};

/// Raw identity and assignment storage. No caching and no cross-entity
/// validation happens at this layer; every missing entity is reported as
/// `ServiceError::NotFound` of its kind and uniqueness violations as
/// `ServiceError::Conflict`.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create_user(&self, user: User, password: Option<String>)
        -> Result<User, ServiceError>;
    async fn get_user(&self, user_id: &str) -> Result<User, ServiceError>;
    async fn get_user_by_name(&self, name: &str, domain_id: &str) -> Result<User, ServiceError>;
    /// `password: None` keeps the stored password.
    async fn update_user(
        &self,
        user_id: &str,
        user: User,
        password: Option<String>,
    ) -> Result<User, ServiceError>;
    /// Also drops the user's group memberships and user grants.
    async fn delete_user(&self, user_id: &str) -> Result<(), ServiceError>;
    async fn list_users(&self) -> Result<Vec<User>, ServiceError>;

    async fn create_group(&self, group: Group) -> Result<Group, ServiceError>;
    async fn get_group(&self, group_id: &str) -> Result<Group, ServiceError>;
    async fn update_group(&self, group_id: &str, group: Group) -> Result<Group, ServiceError>;
    /// Also drops the group's memberships and group grants.
    async fn delete_group(&self, group_id: &str) -> Result<(), ServiceError>;
    async fn list_groups(&self) -> Result<Vec<Group>, ServiceError>;

    async fn create_project(&self, project: Project) -> Result<Project, ServiceError>;
    async fn get_project(&self, project_id: &str) -> Result<Project, ServiceError>;
    async fn get_project_by_name(
        &self,
        name: &str,
        domain_id: &str,
    ) -> Result<Project, ServiceError>;
    async fn update_project(
        &self,
        project_id: &str,
        project: Project,
    ) -> Result<Project, ServiceError>;
    /// Also drops every grant scoped to the project.
    async fn delete_project(&self, project_id: &str) -> Result<(), ServiceError>;
    async fn list_projects(&self) -> Result<Vec<Project>, ServiceError>;
    async fn list_projects_in_domain(&self, domain_id: &str) -> Result<Vec<Project>, ServiceError>;

    async fn create_domain(&self, domain: Domain) -> Result<Domain, ServiceError>;
    async fn get_domain(&self, domain_id: &str) -> Result<Domain, ServiceError>;
    async fn get_domain_by_name(&self, name: &str) -> Result<Domain, ServiceError>;
    async fn update_domain(&self, domain_id: &str, domain: Domain) -> Result<Domain, ServiceError>;
    /// Also drops every grant scoped to the domain.
    async fn delete_domain(&self, domain_id: &str) -> Result<(), ServiceError>;
    async fn list_domains(&self) -> Result<Vec<Domain>, ServiceError>;

    async fn create_role(&self, role: Role) -> Result<Role, ServiceError>;
    async fn get_role(&self, role_id: &str) -> Result<Role, ServiceError>;
    async fn update_role(&self, role_id: &str, role: Role) -> Result<Role, ServiceError>;
    /// Also drops every grant of the role.
    async fn delete_role(&self, role_id: &str) -> Result<(), ServiceError>;
    async fn list_roles(&self) -> Result<Vec<Role>, ServiceError>;

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<(), ServiceError>;
    async fn remove_user_from_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<(), ServiceError>;
    async fn check_user_in_group(&self, user_id: &str, group_id: &str)
        -> Result<(), ServiceError>;
    async fn list_users_in_group(&self, group_id: &str) -> Result<Vec<User>, ServiceError>;
    async fn list_groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, ServiceError>;

    async fn create_grant(&self, grant: RoleAssignment) -> Result<RoleAssignment, ServiceError>;
    async fn delete_grant(
        &self,
        actor: &Actor,
        scope: &Scope,
        role_id: &str,
    ) -> Result<(), ServiceError>;
    /// Grants in insertion order.
    async fn list_grants(&self, filter: &GrantFilter) -> Result<Vec<RoleAssignment>, ServiceError>;
}
