//! In-process identity store.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use super::error::{EntityKind, ServiceError};
use super::store::IdentityStore;
use crate::models::{Actor, Domain, GrantFilter, Group, Project, Role, RoleAssignment, Scope, User};

#[derive(Default)]
struct State {
    users: BTreeMap<String, (User, Option<String>)>,
    groups: BTreeMap<String, Group>,
    projects: BTreeMap<String, Project>,
    domains: BTreeMap<String, Domain>,
    roles: BTreeMap<String, Role>,
    /// (group_id, user_id)
    memberships: BTreeSet<(String, String)>,
    grants: Vec<RoleAssignment>,
}

impl State {
    fn user(&self, user_id: &str) -> Result<&User, ServiceError> {
        self.users
            .get(user_id)
            .map(|(user, _)| user)
            .ok_or_else(|| ServiceError::not_found(EntityKind::User, user_id))
    }

    fn group(&self, group_id: &str) -> Result<&Group, ServiceError> {
        self.groups
            .get(group_id)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Group, group_id))
    }

    fn user_name_taken(&self, name: &str, domain_id: &str, except: &str) -> bool {
        self.users
            .values()
            .any(|(u, _)| u.id != except && u.name == name && u.domain_id == domain_id)
    }

    fn group_name_taken(&self, name: &str, domain_id: &str, except: &str) -> bool {
        self.groups
            .values()
            .any(|g| g.id != except && g.name == name && g.domain_id == domain_id)
    }

    fn project_name_taken(&self, name: &str, domain_id: &str, except: &str) -> bool {
        self.projects
            .values()
            .any(|p| p.id != except && p.name == name && p.domain_id == domain_id)
    }

    fn domain_name_taken(&self, name: &str, except: &str) -> bool {
        self.domains
            .values()
            .any(|d| d.id != except && d.name == name)
    }

    fn role_name_taken(&self, name: &str, except: &str) -> bool {
        self.roles.values().any(|r| r.id != except && r.name == name)
    }
}

fn duplicate(kind: EntityKind, field: &str, value: &str) -> ServiceError {
    ServiceError::conflict(format!("{} with {} {}", kind, field, value))
}

/// Reference store holding everything behind a single mutex.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    state: Mutex<State>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, ServiceError> {
        self.state
            .lock()
            .map_err(|e| ServiceError::unexpected(format!("Identity store mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn create_user(
        &self,
        user: User,
        password: Option<String>,
    ) -> Result<User, ServiceError> {
        let mut state = self.state()?;
        if state.users.contains_key(&user.id) {
            return Err(duplicate(EntityKind::User, "id", &user.id));
        }
        if state.user_name_taken(&user.name, &user.domain_id, &user.id) {
            return Err(duplicate(EntityKind::User, "name", &user.name));
        }
        state
            .users
            .insert(user.id.clone(), (user.clone(), password));
        Ok(user)
    }

    async fn get_user(&self, user_id: &str) -> Result<User, ServiceError> {
        self.state()?.user(user_id).cloned()
    }

    async fn get_user_by_name(&self, name: &str, domain_id: &str) -> Result<User, ServiceError> {
        self.state()?
            .users
            .values()
            .map(|(u, _)| u)
            .find(|u| u.name == name && u.domain_id == domain_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(EntityKind::User, name))
    }

    async fn update_user(
        &self,
        user_id: &str,
        user: User,
        password: Option<String>,
    ) -> Result<User, ServiceError> {
        let mut state = self.state()?;
        state.user(user_id)?;
        if state.user_name_taken(&user.name, &user.domain_id, user_id) {
            return Err(duplicate(EntityKind::User, "name", &user.name));
        }
        let updated = User {
            id: user_id.to_string(),
            ..user
        };
        if let Some(entry) = state.users.get_mut(user_id) {
            entry.0 = updated.clone();
            if password.is_some() {
                entry.1 = password;
            }
        }
        Ok(updated)
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        if state.users.remove(user_id).is_none() {
            return Err(ServiceError::not_found(EntityKind::User, user_id));
        }
        state.memberships.retain(|(_, member)| member != user_id);
        state
            .grants
            .retain(|g| !matches!(&g.actor, Actor::User(id) if id == user_id));
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        Ok(self
            .state()?
            .users
            .values()
            .map(|(u, _)| u.clone())
            .collect())
    }

    async fn create_group(&self, group: Group) -> Result<Group, ServiceError> {
        let mut state = self.state()?;
        if state.groups.contains_key(&group.id) {
            return Err(duplicate(EntityKind::Group, "id", &group.id));
        }
        if state.group_name_taken(&group.name, &group.domain_id, &group.id) {
            return Err(duplicate(EntityKind::Group, "name", &group.name));
        }
        state.groups.insert(group.id.clone(), group.clone());
        Ok(group)
    }

    async fn get_group(&self, group_id: &str) -> Result<Group, ServiceError> {
        self.state()?.group(group_id).cloned()
    }

    async fn update_group(&self, group_id: &str, group: Group) -> Result<Group, ServiceError> {
        let mut state = self.state()?;
        state.group(group_id)?;
        if state.group_name_taken(&group.name, &group.domain_id, group_id) {
            return Err(duplicate(EntityKind::Group, "name", &group.name));
        }
        let updated = Group {
            id: group_id.to_string(),
            ..group
        };
        state.groups.insert(group_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        if state.groups.remove(group_id).is_none() {
            return Err(ServiceError::not_found(EntityKind::Group, group_id));
        }
        state.memberships.retain(|(group, _)| group != group_id);
        state
            .grants
            .retain(|g| !matches!(&g.actor, Actor::Group(id) if id == group_id));
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, ServiceError> {
        Ok(self.state()?.groups.values().cloned().collect())
    }

    async fn create_project(&self, project: Project) -> Result<Project, ServiceError> {
        let mut state = self.state()?;
        if state.projects.contains_key(&project.id) {
            return Err(duplicate(EntityKind::Project, "id", &project.id));
        }
        if state.project_name_taken(&project.name, &project.domain_id, &project.id) {
            return Err(duplicate(EntityKind::Project, "name", &project.name));
        }
        state.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn get_project(&self, project_id: &str) -> Result<Project, ServiceError> {
        self.state()?
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(EntityKind::Project, project_id))
    }

    async fn get_project_by_name(
        &self,
        name: &str,
        domain_id: &str,
    ) -> Result<Project, ServiceError> {
        self.state()?
            .projects
            .values()
            .find(|p| p.name == name && p.domain_id == domain_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(EntityKind::Project, name))
    }

    async fn update_project(
        &self,
        project_id: &str,
        project: Project,
    ) -> Result<Project, ServiceError> {
        let mut state = self.state()?;
        if !state.projects.contains_key(project_id) {
            return Err(ServiceError::not_found(EntityKind::Project, project_id));
        }
        if state.project_name_taken(&project.name, &project.domain_id, project_id) {
            return Err(duplicate(EntityKind::Project, "name", &project.name));
        }
        let updated = Project {
            id: project_id.to_string(),
            ..project
        };
        state.projects.insert(project_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        if state.projects.remove(project_id).is_none() {
            return Err(ServiceError::not_found(EntityKind::Project, project_id));
        }
        state
            .grants
            .retain(|g| !matches!(&g.scope, Scope::Project(id) if id == project_id));
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, ServiceError> {
        Ok(self.state()?.projects.values().cloned().collect())
    }

    async fn list_projects_in_domain(&self, domain_id: &str) -> Result<Vec<Project>, ServiceError> {
        Ok(self
            .state()?
            .projects
            .values()
            .filter(|p| p.domain_id == domain_id)
            .cloned()
            .collect())
    }

    async fn create_domain(&self, domain: Domain) -> Result<Domain, ServiceError> {
        let mut state = self.state()?;
        if state.domains.contains_key(&domain.id) {
            return Err(duplicate(EntityKind::Domain, "id", &domain.id));
        }
        if state.domain_name_taken(&domain.name, &domain.id) {
            return Err(duplicate(EntityKind::Domain, "name", &domain.name));
        }
        state.domains.insert(domain.id.clone(), domain.clone());
        Ok(domain)
    }

    async fn get_domain(&self, domain_id: &str) -> Result<Domain, ServiceError> {
        self.state()?
            .domains
            .get(domain_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(EntityKind::Domain, domain_id))
    }

    async fn get_domain_by_name(&self, name: &str) -> Result<Domain, ServiceError> {
        self.state()?
            .domains
            .values()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(EntityKind::Domain, name))
    }

    async fn update_domain(&self, domain_id: &str, domain: Domain) -> Result<Domain, ServiceError> {
        let mut state = self.state()?;
        if !state.domains.contains_key(domain_id) {
            return Err(ServiceError::not_found(EntityKind::Domain, domain_id));
        }
        if state.domain_name_taken(&domain.name, domain_id) {
            return Err(duplicate(EntityKind::Domain, "name", &domain.name));
        }
        let updated = Domain {
            id: domain_id.to_string(),
            ..domain
        };
        state.domains.insert(domain_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete_domain(&self, domain_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        if state.domains.remove(domain_id).is_none() {
            return Err(ServiceError::not_found(EntityKind::Domain, domain_id));
        }
        state
            .grants
            .retain(|g| !matches!(&g.scope, Scope::Domain(id) if id == domain_id));
        Ok(())
    }

    async fn list_domains(&self) -> Result<Vec<Domain>, ServiceError> {
        Ok(self.state()?.domains.values().cloned().collect())
    }

    async fn create_role(&self, role: Role) -> Result<Role, ServiceError> {
        let mut state = self.state()?;
        if state.roles.contains_key(&role.id) {
            return Err(duplicate(EntityKind::Role, "id", &role.id));
        }
        if state.role_name_taken(&role.name, &role.id) {
            return Err(duplicate(EntityKind::Role, "name", &role.name));
        }
        state.roles.insert(role.id.clone(), role.clone());
        Ok(role)
    }

    async fn get_role(&self, role_id: &str) -> Result<Role, ServiceError> {
        self.state()?
            .roles
            .get(role_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(EntityKind::Role, role_id))
    }

    async fn update_role(&self, role_id: &str, role: Role) -> Result<Role, ServiceError> {
        let mut state = self.state()?;
        if !state.roles.contains_key(role_id) {
            return Err(ServiceError::not_found(EntityKind::Role, role_id));
        }
        if state.role_name_taken(&role.name, role_id) {
            return Err(duplicate(EntityKind::Role, "name", &role.name));
        }
        let updated = Role {
            id: role_id.to_string(),
            ..role
        };
        state.roles.insert(role_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete_role(&self, role_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        if state.roles.remove(role_id).is_none() {
            return Err(ServiceError::not_found(EntityKind::Role, role_id));
        }
        state.grants.retain(|g| g.role_id != role_id);
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, ServiceError> {
        Ok(self.state()?.roles.values().cloned().collect())
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        state.user(user_id)?;
        state.group(group_id)?;
        state
            .memberships
            .insert((group_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn remove_user_from_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        state.user(user_id)?;
        state.group(group_id)?;
        if !state
            .memberships
            .remove(&(group_id.to_string(), user_id.to_string()))
        {
            return Err(ServiceError::not_found(
                EntityKind::Membership,
                format!("{}/{}", group_id, user_id),
            ));
        }
        Ok(())
    }

    async fn check_user_in_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<(), ServiceError> {
        let state = self.state()?;
        state.user(user_id)?;
        state.group(group_id)?;
        if !state
            .memberships
            .contains(&(group_id.to_string(), user_id.to_string()))
        {
            return Err(ServiceError::not_found(
                EntityKind::Membership,
                format!("{}/{}", group_id, user_id),
            ));
        }
        Ok(())
    }

    async fn list_users_in_group(&self, group_id: &str) -> Result<Vec<User>, ServiceError> {
        let state = self.state()?;
        state.group(group_id)?;
        state
            .memberships
            .iter()
            .filter(|(group, _)| group == group_id)
            .map(|(_, user_id)| state.user(user_id).cloned())
            .collect()
    }

    async fn list_groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, ServiceError> {
        let state = self.state()?;
        state.user(user_id)?;
        state
            .memberships
            .iter()
            .filter(|(_, member)| member == user_id)
            .map(|(group_id, _)| state.group(group_id).cloned())
            .collect()
    }

    async fn create_grant(&self, grant: RoleAssignment) -> Result<RoleAssignment, ServiceError> {
        let mut state = self.state()?;
        if state.grants.iter().any(|g| g.key() == grant.key()) {
            return Err(ServiceError::conflict(grant.describe()));
        }
        state.grants.push(grant.clone());
        Ok(grant)
    }

    async fn delete_grant(
        &self,
        actor: &Actor,
        scope: &Scope,
        role_id: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        let before = state.grants.len();
        state
            .grants
            .retain(|g| g.key() != (actor, scope, role_id));
        if state.grants.len() == before {
            return Err(ServiceError::not_found(
                EntityKind::Grant,
                format!("{} on {} with role {}", actor, scope, role_id),
            ));
        }
        Ok(())
    }

    async fn list_grants(&self, filter: &GrantFilter) -> Result<Vec<RoleAssignment>, ServiceError> {
        Ok(self
            .state()?
            .grants
            .iter()
            .filter(|g| filter.matches(g))
            .cloned()
            .collect())
    }
}
