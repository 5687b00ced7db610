use serde::{Deserialize, Serialize};
use validator::Validate;

use super::domain::default_domain_id;
use crate::utils::validation::present;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub domain_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[serde(default, deserialize_with = "present")]
    #[validate(length(min = 1, max = 64))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[serde(default = "default_domain_id")]
    pub domain_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateGroupRequest {
    #[serde(default, deserialize_with = "present")]
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateGroupRequest {
    pub fn into_group(self) -> Group {
        Group {
            id: self.id.unwrap_or_else(super::new_id),
            name: self.name,
            domain_id: self.domain_id,
            description: self.description,
        }
    }
}

impl UpdateGroupRequest {
    pub fn apply(&self, current: &Group) -> Group {
        Group {
            id: current.id.clone(),
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            domain_id: self
                .domain_id
                .clone()
                .unwrap_or_else(|| current.domain_id.clone()),
            description: self
                .description
                .clone()
                .or_else(|| current.description.clone()),
        }
    }
}
