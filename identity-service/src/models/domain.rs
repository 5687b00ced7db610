use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::validation::{default_enabled, present, truthy, truthy_opt};

/// Domain every entity lands in when the request names none.
pub const DEFAULT_DOMAIN_ID: &str = "default";

pub(crate) fn default_domain_id() -> String {
    DEFAULT_DOMAIN_ID.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDomainRequest {
    #[serde(default, deserialize_with = "present")]
    #[validate(length(min = 1, max = 64))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled", deserialize_with = "truthy")]
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateDomainRequest {
    #[serde(default, deserialize_with = "present")]
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "truthy_opt")]
    pub enabled: Option<bool>,
}

impl CreateDomainRequest {
    pub fn into_domain(self) -> Domain {
        Domain {
            id: self.id.unwrap_or_else(super::new_id),
            name: self.name,
            description: self.description,
            enabled: self.enabled,
        }
    }
}

impl UpdateDomainRequest {
    pub fn apply(&self, current: &Domain) -> Domain {
        Domain {
            id: current.id.clone(),
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            description: self
                .description
                .clone()
                .or_else(|| current.description.clone()),
            enabled: self.enabled.unwrap_or(current.enabled),
        }
    }
}
