use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::validation::present;

/// Role; the name is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[serde(default, deserialize_with = "present")]
    #[validate(length(min = 1, max = 64))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[serde(default, deserialize_with = "present")]
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
}

impl CreateRoleRequest {
    pub fn into_role(self) -> Role {
        Role {
            id: self.id.unwrap_or_else(super::new_id),
            name: self.name,
        }
    }
}

impl UpdateRoleRequest {
    pub fn apply(&self, current: &Role) -> Role {
        Role {
            id: current.id.clone(),
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
        }
    }
}
