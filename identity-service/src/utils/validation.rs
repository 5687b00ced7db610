//! Request parsing helpers shared by the managers.
//!
//! Create and update payloads arrive as loosely typed JSON. They are
//! deserialized into typed requests and then run through `validator`;
//! both failure kinds surface as `ServiceError::Validation`.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use validator::Validate;

use crate::services::ServiceError;

/// Deserialize and validate a request body.
pub fn parse_request<T>(value: Value) -> Result<T, ServiceError>
where
    T: DeserializeOwned + Validate,
{
    let request: T = serde_json::from_value(value)
        .map_err(|e| ServiceError::validation(format!("Json parse error: {}", e)))?;
    request.validate()?;
    Ok(request)
}

/// Field that may be omitted but must not be `null` when given.
pub fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Boolean flag with truthiness rules: numbers, null, arrays and objects
/// are coerced, strings are rejected.
pub fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    coerce_truthy(&value).map_err(D::Error::custom)
}

/// Optional variant of [`truthy`]; absence leaves the flag untouched.
pub fn truthy_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    truthy(deserializer).map(Some)
}

fn coerce_truthy(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::Array(items) => Ok(!items.is_empty()),
        Value::Object(map) => Ok(!map.is_empty()),
        Value::String(s) => Err(format!(
            "Expected boolean value for 'enabled', got string {:?}",
            s
        )),
    }
}

pub fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, Validate)]
    struct SampleRequest {
        #[validate(length(min = 1, max = 8))]
        name: String,
        #[serde(default = "default_enabled", deserialize_with = "truthy")]
        enabled: bool,
        #[serde(default, deserialize_with = "present")]
        label: Option<String>,
    }

    #[test]
    fn test_numbers_are_coerced() {
        let p: SampleRequest = parse_request(json!({"name": "a", "enabled": 0})).unwrap();
        assert!(!p.enabled);
        let p: SampleRequest = parse_request(json!({"name": "a", "enabled": -42})).unwrap();
        assert!(p.enabled);
    }

    #[test]
    fn test_enabled_defaults_to_true() {
        let p: SampleRequest = parse_request(json!({"name": "a"})).unwrap();
        assert!(p.enabled);
    }

    #[test]
    fn test_string_enabled_rejected() {
        let err = parse_request::<SampleRequest>(json!({"name": "a", "enabled": "true"})).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_name_rules() {
        assert!(parse_request::<SampleRequest>(json!({"name": ""})).is_err());
        assert!(parse_request::<SampleRequest>(json!({"name": "abcdefghi"})).is_err());
        assert!(parse_request::<SampleRequest>(json!({"name": null})).is_err());
        assert!(parse_request::<SampleRequest>(json!({"name": 123})).is_err());
        assert!(parse_request::<SampleRequest>(json!({})).is_err());
    }

    #[test]
    fn test_present_rejects_null() {
        let p: SampleRequest = parse_request(json!({"name": "a"})).unwrap();
        assert!(p.label.is_none());
        assert!(parse_request::<SampleRequest>(json!({"name": "a", "label": null})).is_err());
    }
}
