//! Token payloads, the per-user token index and revocation entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::services::ServiceError;

pub const V2: &str = "v2.0";
pub const V3: &str = "v3.0";

/// Token record. A few fields are understood by the store, everything
/// else rides along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<TokenUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<TenantRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_version: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub token_data: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUser {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TokenPayload {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user: Some(TokenUser {
                id: user_id.into(),
                extra: Map::new(),
            }),
            ..Default::default()
        }
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant = Some(TenantRef {
            id: tenant_id.into(),
            name: None,
        });
        self
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant.as_ref().map(|t| t.id.as_str())
    }

    /// `user_id`, falling back to `user.id`.
    pub fn owner_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or_else(|| self.user.as_ref().map(|u| u.id.as_str()))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }

    /// Trustee of a trust-scoped token, located according to the token version.
    pub fn trustee_user_id(&self) -> Result<String, ServiceError> {
        let trust = match self.token_version.as_deref() {
            Some(V2) => self.token_data.pointer("/access/trust"),
            Some(V3) => self.token_data.get("OS-TRUST:trust"),
            other => {
                return Err(ServiceError::unexpected(format!(
                    "Unknown token version {}",
                    other.unwrap_or("None")
                )))
            }
        };
        trust
            .and_then(|t| t.get("trustee_user_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::unexpected("Trust token carries no trustee_user_id"))
    }

    /// OAuth consumer that obtained the token, if any.
    pub fn consumer_id(&self) -> Option<&str> {
        self.token_data
            .get("token")
            .and_then(|t| t.get("OS-OAUTH1"))
            .and_then(|o| o.get("consumer_id"))
            .and_then(Value::as_str)
    }
}

/// One entry of a user's token index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub token_id: String,
    pub expires: DateTime<Utc>,
}

/// Stored form of a user's token index.
///
/// Older deployments wrote a bare comma separated list of quoted ids with
/// no expiry. Both shapes are decoded; only `Current` is ever written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserTokenIndex {
    Legacy(Vec<String>),
    Current(Vec<IndexEntry>),
}

impl UserTokenIndex {
    /// Decode a stored index. `None` when the bytes are neither format.
    pub fn decode(raw: &str) -> Option<Self> {
        if let Ok(entries) = serde_json::from_str::<Vec<IndexEntry>>(raw) {
            return Some(Self::Current(entries));
        }
        serde_json::from_str::<Vec<String>>(&format!("[{}]", raw))
            .ok()
            .map(Self::Legacy)
    }

    /// Normalize to entries. Legacy ids get `legacy_expires`, since their
    /// real expiry is unknown.
    pub fn into_entries(self, legacy_expires: DateTime<Utc>) -> Vec<IndexEntry> {
        match self {
            Self::Current(entries) => entries,
            Self::Legacy(ids) => ids
                .into_iter()
                .map(|token_id| IndexEntry {
                    token_id,
                    expires: legacy_expires,
                })
                .collect(),
        }
    }

    pub fn encode(entries: &[IndexEntry]) -> Result<String, ServiceError> {
        serde_json::to_string(entries).map_err(|e| ServiceError::Unexpected(e.into()))
    }
}

/// Entry of the revocation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub id: String,
    pub expires: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_decode_legacy_index() {
        let raw = r#""a1","b2","c3""#;
        let decoded = UserTokenIndex::decode(raw).unwrap();
        assert_eq!(
            decoded,
            UserTokenIndex::Legacy(vec!["a1".into(), "b2".into(), "c3".into()])
        );
        let expiry = Utc::now() + Duration::hours(1);
        let entries = decoded.into_entries(expiry);
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.expires == expiry));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(UserTokenIndex::decode("invalid_json_list").is_none());
    }

    #[test]
    fn test_decode_current_index() {
        let entries = vec![IndexEntry {
            token_id: "t".into(),
            expires: Utc::now(),
        }];
        let raw = UserTokenIndex::encode(&entries).unwrap();
        assert_eq!(
            UserTokenIndex::decode(&raw),
            Some(UserTokenIndex::Current(entries))
        );
    }

    #[test]
    fn test_trustee_by_version() {
        let mut payload = TokenPayload::for_user("trustor");
        payload.token_version = Some(V2.into());
        payload.token_data = json!({"access": {"trust": {"trustee_user_id": "bob"}}});
        assert_eq!(payload.trustee_user_id().unwrap(), "bob");

        payload.token_version = Some(V3.into());
        payload.token_data = json!({"OS-TRUST:trust": {"trustee_user_id": "carol"}});
        assert_eq!(payload.trustee_user_id().unwrap(), "carol");

        payload.token_version = Some("v9".into());
        assert!(matches!(
            payload.trustee_user_id(),
            Err(ServiceError::Unexpected(_))
        ));
    }

    #[test]
    fn test_extra_fields_survive() {
        let payload: TokenPayload = serde_json::from_value(json!({
            "user": {"id": "u1", "name": "alice"},
            "a": "b",
        }))
        .unwrap();
        assert_eq!(payload.owner_id(), Some("u1"));
        assert_eq!(payload.extra["a"], "b");
        let back = serde_json::to_value(&payload).unwrap();
        assert_eq!(back["user"]["name"], "alice");
        assert_eq!(back["a"], "b");
    }
}
