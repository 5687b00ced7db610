//! Grant resolution over already fetched rows.
//!
//! Nothing here touches a store. Callers collect the grants of a user and
//! the user's groups and hand them in; the functions decide which of them
//! apply to a scope.

use std::collections::BTreeSet;

use crate::models::{Actor, Project, RoleAssignment, Scope};

/// The user followed by each of its groups.
pub fn actors_for(user_id: &str, group_ids: &[String]) -> Vec<Actor> {
    std::iter::once(Actor::User(user_id.to_string()))
        .chain(group_ids.iter().cloned().map(Actor::Group))
        .collect()
}

/// Roles the actors hold on `scope` itself. Inherited domain grants never
/// count here.
pub fn direct_roles(actors: &[Actor], scope: &Scope, grants: &[RoleAssignment]) -> BTreeSet<String> {
    grants
        .iter()
        .filter(|g| !g.inherited && g.scope == *scope && actors.contains(&g.actor))
        .map(|g| g.role_id.clone())
        .collect()
}

/// Roles that flow from `domain_id` down to its projects.
pub fn inherited_roles(
    actors: &[Actor],
    domain_id: &str,
    grants: &[RoleAssignment],
) -> BTreeSet<String> {
    grants
        .iter()
        .filter(|g| {
            g.inherited
                && matches!(&g.scope, Scope::Domain(id) if id == domain_id)
                && actors.contains(&g.actor)
        })
        .map(|g| g.role_id.clone())
        .collect()
}

/// Deduplicated, sorted role ids for `scope`.
///
/// `owning_domain` is the domain of the project when `scope` is a project;
/// its inherited grants are added when `include_inherited` is set.
pub fn effective_roles(
    actors: &[Actor],
    scope: &Scope,
    owning_domain: Option<&str>,
    grants: &[RoleAssignment],
    include_inherited: bool,
) -> Vec<String> {
    let mut roles = direct_roles(actors, scope, grants);
    if let (Scope::Project(_), Some(domain_id), true) = (scope, owning_domain, include_inherited) {
        roles.extend(inherited_roles(actors, domain_id, grants));
    }
    roles.into_iter().collect()
}

/// Projects reachable by the actors: direct project grants plus every
/// project of a domain carrying an inherited grant. Sorted by id.
pub fn projects_for_actors(
    actors: &[Actor],
    grants: &[RoleAssignment],
    projects: &[Project],
    include_inherited: bool,
) -> Vec<Project> {
    let mut direct = BTreeSet::new();
    let mut domains = BTreeSet::new();
    for grant in grants.iter().filter(|g| actors.contains(&g.actor)) {
        match (&grant.scope, grant.inherited) {
            (Scope::Project(id), false) => {
                direct.insert(id.as_str());
            }
            (Scope::Domain(id), true) if include_inherited => {
                domains.insert(id.as_str());
            }
            _ => {}
        }
    }

    let mut reachable: Vec<Project> = projects
        .iter()
        .filter(|p| direct.contains(p.id.as_str()) || domains.contains(p.domain_id.as_str()))
        .cloned()
        .collect();
    reachable.sort_by(|a, b| a.id.cmp(&b.id));
    reachable.dedup_by(|a, b| a.id == b.id);
    reachable
}

/// Users holding a direct user grant on the project.
pub fn user_ids_for_project(project_id: &str, grants: &[RoleAssignment]) -> Vec<String> {
    grants
        .iter()
        .filter(|g| matches!(&g.scope, Scope::Project(id) if id == project_id))
        .filter_map(|g| match &g.actor {
            Actor::User(id) => Some(id.clone()),
            Actor::Group(_) => None,
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
