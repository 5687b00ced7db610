//! Role assignments (grants).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who holds a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Actor {
    User(String),
    Group(String),
}

/// Where a role is held.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Project(String),
    Domain(String),
}

impl Actor {
    pub fn id(&self) -> &str {
        match self {
            Actor::User(id) | Actor::Group(id) => id,
        }
    }
}

impl Scope {
    pub fn id(&self) -> &str {
        match self {
            Scope::Project(id) | Scope::Domain(id) => id,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user {}", id),
            Actor::Group(id) => write!(f, "group {}", id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Project(id) => write!(f, "project {}", id),
            Scope::Domain(id) => write!(f, "domain {}", id),
        }
    }
}

/// A single asserted grant. `inherited` only has meaning on a domain
/// scope, where it propagates the role to every project of the domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub actor: Actor,
    pub scope: Scope,
    pub role_id: String,
    #[serde(default)]
    pub inherited: bool,
}

impl RoleAssignment {
    pub fn new(actor: Actor, scope: Scope, role_id: impl Into<String>) -> Self {
        Self {
            actor,
            scope,
            role_id: role_id.into(),
            inherited: false,
        }
    }

    pub fn inherited(mut self) -> Self {
        self.inherited = true;
        self
    }

    /// Uniqueness key; `inherited` is not part of it.
    pub fn key(&self) -> (&Actor, &Scope, &str) {
        (&self.actor, &self.scope, self.role_id.as_str())
    }

    pub fn describe(&self) -> String {
        format!("{} on {} with role {}", self.actor, self.scope, self.role_id)
    }
}

/// Filter over grants; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantFilter {
    pub actor: Option<Actor>,
    pub scope: Option<Scope>,
    pub role_id: Option<String>,
    pub inherited: Option<bool>,
}

impl GrantFilter {
    pub fn actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn role(mut self, role_id: impl Into<String>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }

    pub fn inherited(mut self, inherited: bool) -> Self {
        self.inherited = Some(inherited);
        self
    }

    pub fn matches(&self, grant: &RoleAssignment) -> bool {
        self.actor.as_ref().is_none_or(|a| *a == grant.actor)
            && self.scope.as_ref().is_none_or(|s| *s == grant.scope)
            && self.role_id.as_ref().is_none_or(|r| *r == grant.role_id)
            && self.inherited.is_none_or(|i| i == grant.inherited)
    }
}
