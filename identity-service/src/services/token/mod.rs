//! Token persistence.
//!
//! `TokenDriver` is the storage capability; `KvTokenStore` keeps tokens in a
//! key-value backend with a per-user index, `InMemoryTokenStore` scans a
//! local map. `TokenManager` adds id hashing and caching on top of either.

mod kv;
mod manager;
mod memory;

pub use kv::KvTokenStore;
pub use manager::{unique_id, TokenManager};
pub use memory::InMemoryTokenStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::{EntityKind, ServiceError};
use crate::config::TokenConfig;
use crate::models::{RevocationEntry, TokenPayload};

/// Optional narrowing applied by `list_tokens` and `delete_tokens`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenFilter {
    pub tenant_id: Option<String>,
    pub trust_id: Option<String>,
    pub consumer_id: Option<String>,
}

impl TokenFilter {
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn trust(mut self, trust_id: impl Into<String>) -> Self {
        self.trust_id = Some(trust_id.into());
        self
    }

    pub fn consumer(mut self, consumer_id: impl Into<String>) -> Self {
        self.consumer_id = Some(consumer_id.into());
        self
    }

    pub fn matches(&self, payload: &TokenPayload) -> bool {
        if let Some(tenant_id) = &self.tenant_id {
            if payload.tenant_id() != Some(tenant_id.as_str()) {
                return false;
            }
        }
        if let Some(trust_id) = &self.trust_id {
            if payload.trust_id.as_deref() != Some(trust_id.as_str()) {
                return false;
            }
        }
        if let Some(consumer_id) = &self.consumer_id {
            if payload.consumer_id() != Some(consumer_id.as_str()) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait TokenDriver: Send + Sync {
    /// Store a token and return the stored copy.
    async fn create_token(
        &self,
        token_id: &str,
        payload: TokenPayload,
    ) -> Result<TokenPayload, ServiceError>;

    /// Fails with token NotFound when the id is empty, unknown or expired.
    async fn get_token(&self, token_id: &str) -> Result<TokenPayload, ServiceError>;

    /// Remove a token and record it as revoked.
    async fn delete_token(&self, token_id: &str) -> Result<(), ServiceError>;

    /// Ids of the live tokens of a user that pass the filter.
    async fn list_tokens(
        &self,
        user_id: &str,
        filter: &TokenFilter,
    ) -> Result<Vec<String>, ServiceError>;

    async fn list_revoked_tokens(&self) -> Result<Vec<RevocationEntry>, ServiceError>;

    async fn flush_expired_tokens(&self) -> Result<(), ServiceError>;

    /// Best-effort bulk delete; tokens that vanish concurrently are skipped.
    async fn delete_tokens(&self, user_id: &str, filter: &TokenFilter) -> Result<(), ServiceError> {
        for token_id in self.list_tokens(user_id, filter).await? {
            match self.delete_token(&token_id).await {
                Err(e) if e.is_not_found_of(EntityKind::Token) => continue,
                other => other?,
            }
        }
        Ok(())
    }
}

pub(crate) fn token_not_found(token_id: &str) -> ServiceError {
    ServiceError::not_found(EntityKind::Token, token_id)
}

/// Fill in the defaults every driver applies before storing a token.
pub(crate) fn prepare_payload(
    token_id: &str,
    mut payload: TokenPayload,
    config: &TokenConfig,
    now: DateTime<Utc>,
) -> Result<TokenPayload, ServiceError> {
    if payload.id.is_none() {
        payload.id = Some(token_id.to_string());
    }
    if payload.expires.is_none() {
        payload.expires = Some(config.expires_from(now)?);
    }
    if payload.user_id.is_none() {
        let owner = payload
            .user
            .as_ref()
            .map(|u| u.id.clone())
            .ok_or_else(|| ServiceError::validation("Token payload names no user"))?;
        payload.user_id = Some(owner);
    }
    Ok(payload)
}
