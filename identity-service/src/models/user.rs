//! User model.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::domain::default_domain_id;
use crate::utils::validation::{default_enabled, present, truthy, truthy_opt};

/// User as returned by every read. The password is write-only and never
/// part of this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub domain_id: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[serde(default, deserialize_with = "present")]
    #[validate(length(min = 1, max = 64))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default = "default_domain_id")]
    pub domain_id: String,
    #[serde(default, deserialize_with = "present")]
    pub password: Option<String>,
    #[serde(default = "default_enabled", deserialize_with = "truthy")]
    pub enabled: bool,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    /// Must match the user being updated when given.
    #[serde(default, deserialize_with = "present")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "present")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub domain_id: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "truthy_opt")]
    pub enabled: Option<bool>,
}

impl CreateUserRequest {
    pub fn into_user(self) -> (User, Option<String>) {
        let user = User {
            id: self.id.unwrap_or_else(super::new_id),
            name: self.name,
            domain_id: self.domain_id,
            enabled: self.enabled,
        };
        (user, self.password)
    }
}

impl UpdateUserRequest {
    /// Apply the update on top of the current record.
    pub fn apply(&self, current: &User) -> User {
        User {
            id: current.id.clone(),
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            domain_id: self
                .domain_id
                .clone()
                .unwrap_or_else(|| current.domain_id.clone()),
            enabled: self.enabled.unwrap_or(current.enabled),
        }
    }
}
