//! Project (tenant) model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use super::domain::default_domain_id;
use crate::utils::validation::{default_enabled, present, truthy, truthy_opt};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub domain_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[serde(default, deserialize_with = "present")]
    #[validate(length(min = 1, max = 64))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[serde(default = "default_domain_id")]
    pub domain_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled", deserialize_with = "truthy")]
    pub enabled: bool,
}

/// Partial update. A differing `id` is accepted and ignored.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "truthy_opt")]
    pub enabled: Option<bool>,
}

impl CreateProjectRequest {
    pub fn into_project(self) -> Project {
        Project {
            id: self.id.unwrap_or_else(super::new_id),
            name: self.name,
            domain_id: self.domain_id,
            description: self.description,
            enabled: self.enabled,
        }
    }
}

impl UpdateProjectRequest {
    pub fn apply(&self, current: &Project) -> Project {
        Project {
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
            enabled: self.enabled.unwrap_or(current.enabled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_request;
    use serde_json::json;

    fn project() -> Project {
        Project {
            id: "p1".into(),
            name: "alpha".into(),
            domain_id: "default".into(),
            description: None,
            enabled: true,
        }
    }

    #[test]
    fn test_update_ignores_id() {
        let req: UpdateProjectRequest =
            parse_request(json!({"id": "something-else", "enabled": 0})).unwrap();
        let updated = req.apply(&project());
        assert_eq!(updated.id, "p1");
        assert!(!updated.enabled);
    }

    #[test]
    fn test_name_length_limit() {
        let long = "x".repeat(65);
        assert!(parse_request::<CreateProjectRequest>(json!({"name": long})).is_err());
        let ok = "x".repeat(64);
        assert!(parse_request::<CreateProjectRequest>(json!({"name": ok})).is_ok());
    }
}
