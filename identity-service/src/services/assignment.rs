//! Grant operations of the identity manager.
//!
//! `list_grants` and `list_role_assignments` return the stored rows as
//! asserted. `effective_roles` and `list_projects_for_user` fold group
//! membership and domain inheritance into a deduplicated answer.

use super::error::{EntityKind, ServiceError};
use super::identity::IdentityManager;
use super::resolution;
use super::token::TokenFilter;
use crate::models::{Actor, GrantFilter, Project, RoleAssignment, Scope};

impl IdentityManager {
    async fn ensure_actor(&self, actor: &Actor) -> Result<(), ServiceError> {
        match actor {
            Actor::User(id) => self.ensure_exists(EntityKind::User, id).await,
            Actor::Group(id) => self.ensure_exists(EntityKind::Group, id).await,
        }
    }

    async fn ensure_scope(&self, scope: &Scope) -> Result<(), ServiceError> {
        match scope {
            Scope::Project(id) => self.ensure_exists(EntityKind::Project, id).await,
            Scope::Domain(id) => self.ensure_exists(EntityKind::Domain, id).await,
        }
    }

    /// Grants held by the user directly and through each of its groups.
    async fn grants_for_user(&self, user_id: &str) -> Result<(Vec<Actor>, Vec<RoleAssignment>), ServiceError> {
        self.store.get_user(user_id).await?;
        let group_ids: Vec<String> = self
            .store
            .list_groups_for_user(user_id)
            .await?
            .into_iter()
            .map(|g| g.id)
            .collect();
        let actors = resolution::actors_for(user_id, &group_ids);

        let mut grants = Vec::new();
        for actor in &actors {
            grants.extend(
                self.store
                    .list_grants(&GrantFilter::default().actor(actor.clone()))
                    .await?,
            );
        }
        Ok((actors, grants))
    }

    pub async fn create_grant(&self, grant: RoleAssignment) -> Result<RoleAssignment, ServiceError> {
        if grant.inherited {
            if matches!(grant.scope, Scope::Project(_)) {
                return Err(ServiceError::validation(
                    "Inherited grants are only valid on a domain",
                ));
            }
            if !self.inherit_enabled {
                return Err(ServiceError::validation(
                    "Inherited grants are disabled by configuration",
                ));
            }
        }
        self.ensure_actor(&grant.actor).await?;
        self.ensure_scope(&grant.scope).await?;
        self.ensure_exists(EntityKind::Role, &grant.role_id).await?;

        let grant = self.store.create_grant(grant).await?;
        tracing::info!(
            actor = %grant.actor,
            scope = %grant.scope,
            role_id = %grant.role_id,
            inherited = grant.inherited,
            "Created grant"
        );
        Ok(grant)
    }

    pub async fn delete_grant(
        &self,
        actor: &Actor,
        scope: &Scope,
        role_id: &str,
    ) -> Result<(), ServiceError> {
        self.store.delete_grant(actor, scope, role_id).await?;
        if let (Actor::User(user_id), Scope::Project(project_id)) = (actor, scope) {
            self.revoke_tokens(user_id, TokenFilter::default().tenant(project_id.as_str()))
                .await?;
        }
        Ok(())
    }

    /// Stored grants of `actor` on `scope`, one row per assertion.
    pub async fn list_grants(
        &self,
        actor: &Actor,
        scope: &Scope,
    ) -> Result<Vec<RoleAssignment>, ServiceError> {
        self.ensure_actor(actor).await?;
        self.ensure_scope(scope).await?;
        self.store
            .list_grants(&GrantFilter::default().actor(actor.clone()).scope(scope.clone()))
            .await
    }

    /// Every grant in the system, optionally restricted to one role.
    pub async fn list_role_assignments(
        &self,
        role_id: Option<&str>,
    ) -> Result<Vec<RoleAssignment>, ServiceError> {
        let filter = match role_id {
            Some(role_id) => GrantFilter::default().role(role_id),
            None => GrantFilter::default(),
        };
        self.store.list_grants(&filter).await
    }

    /// Deduplicated, sorted role ids the user holds on `scope`.
    pub async fn effective_roles(
        &self,
        user_id: &str,
        scope: &Scope,
    ) -> Result<Vec<String>, ServiceError> {
        let (actors, grants) = self.grants_for_user(user_id).await?;
        let owning_domain = match scope {
            Scope::Project(id) => Some(self.store.get_project(id).await?.domain_id),
            Scope::Domain(id) => {
                self.store.get_domain(id).await?;
                None
            }
        };
        Ok(resolution::effective_roles(
            &actors,
            scope,
            owning_domain.as_deref(),
            &grants,
            self.inherit_enabled,
        ))
    }

    pub async fn get_roles_for_user_and_project(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        self.effective_roles(user_id, &Scope::Project(project_id.to_string()))
            .await
    }

    pub async fn get_roles_for_user_and_domain(
        &self,
        user_id: &str,
        domain_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        self.effective_roles(user_id, &Scope::Domain(domain_id.to_string()))
            .await
    }

    pub async fn list_projects_for_user(&self, user_id: &str) -> Result<Vec<Project>, ServiceError> {
        let (actors, grants) = self.grants_for_user(user_id).await?;
        let projects = self.store.list_projects().await?;
        Ok(resolution::projects_for_actors(
            &actors,
            &grants,
            &projects,
            self.inherit_enabled,
        ))
    }

    pub async fn list_user_ids_for_project(&self, project_id: &str) -> Result<Vec<String>, ServiceError> {
        let scope = Scope::Project(project_id.to_string());
        self.ensure_scope(&scope).await?;
        let grants = self
            .store
            .list_grants(&GrantFilter::default().scope(scope))
            .await?;
        Ok(resolution::user_ids_for_project(project_id, &grants))
    }

    pub async fn add_role_to_user_and_project(
        &self,
        user_id: &str,
        project_id: &str,
        role_id: &str,
    ) -> Result<RoleAssignment, ServiceError> {
        self.create_grant(RoleAssignment::new(
            Actor::User(user_id.to_string()),
            Scope::Project(project_id.to_string()),
            role_id,
        ))
        .await
    }

    pub async fn remove_role_from_user_and_project(
        &self,
        user_id: &str,
        project_id: &str,
        role_id: &str,
    ) -> Result<(), ServiceError> {
        self.delete_grant(
            &Actor::User(user_id.to_string()),
            &Scope::Project(project_id.to_string()),
            role_id,
        )
        .await
    }
}
