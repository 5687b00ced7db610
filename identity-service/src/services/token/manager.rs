use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::{token_not_found, TokenDriver, TokenFilter};
use crate::config::CacheConfig;
use crate::models::{RevocationEntry, TokenPayload};
use crate::services::cache::Cache;
use crate::services::error::{EntityKind, ServiceError};

const GET_TOKEN: &str = "get_token";
const LIST_REVOKED_TOKENS: &str = "list_revoked_tokens";

/// Prefix of DER encoded CMS tokens once base64 encoded.
const PKI_PREFIX: &str = "MII";
const MAX_RAW_ID_LEN: usize = 64;

/// Storage identity of a token: the id itself for short opaque ids, the
/// SHA-256 hex digest for PKI tokens and anything longer than 64 chars.
pub fn unique_id(token_id: &str) -> String {
    if token_id.starts_with(PKI_PREFIX) || token_id.len() > MAX_RAW_ID_LEN {
        let mut hasher = Sha256::new();
        hasher.update(token_id.as_bytes());
        hex::encode(hasher.finalize())
    } else {
        token_id.to_string()
    }
}

/// Caching front for a token driver.
pub struct TokenManager {
    driver: Arc<dyn TokenDriver>,
    cache: Cache,
}

impl TokenManager {
    pub fn new(driver: Arc<dyn TokenDriver>, cache: &CacheConfig) -> Self {
        Self {
            driver,
            cache: Cache::new(cache),
        }
    }

    pub fn driver(&self) -> &Arc<dyn TokenDriver> {
        &self.driver
    }

    pub async fn create_token(
        &self,
        token_id: &str,
        mut payload: TokenPayload,
    ) -> Result<TokenPayload, ServiceError> {
        let id = unique_id(token_id);
        payload.id = Some(id.clone());
        let stored = self.driver.create_token(&id, payload).await?;
        self.cache.invalidate(GET_TOKEN, &[id.as_str()]);
        Ok(stored)
    }

    /// Cached read. Expiry is checked on every call, so a cached token
    /// stops being served once it expires.
    pub async fn get_token(&self, token_id: &str) -> Result<TokenPayload, ServiceError> {
        if token_id.is_empty() {
            return Err(token_not_found(""));
        }
        let id = unique_id(token_id);
        let payload: TokenPayload = self
            .cache
            .memoize(GET_TOKEN, &[id.as_str()], || self.driver.get_token(&id))
            .await?;
        if payload.is_expired(Utc::now()) {
            return Err(token_not_found(token_id));
        }
        Ok(payload)
    }

    pub async fn delete_token(&self, token_id: &str) -> Result<(), ServiceError> {
        let id = unique_id(token_id);
        self.driver.delete_token(&id).await?;
        self.invalidate_token(token_id);
        self.invalidate_revocation_list();
        Ok(())
    }

    /// Delete every listed token of the user, skipping tokens that are
    /// already gone.
    pub async fn delete_tokens(
        &self,
        user_id: &str,
        filter: &TokenFilter,
    ) -> Result<(), ServiceError> {
        let token_ids = self.driver.list_tokens(user_id, filter).await?;
        for id in &token_ids {
            match self.driver.delete_token(id).await {
                Err(e) if e.is_not_found_of(EntityKind::Token) => {
                    tracing::debug!(token_id = %id, "Token already removed");
                }
                other => other?,
            }
            self.cache.invalidate(GET_TOKEN, &[id.as_str()]);
        }
        if !token_ids.is_empty() {
            tracing::info!(user_id = %user_id, count = token_ids.len(), "Deleted user tokens");
            self.invalidate_revocation_list();
        }
        Ok(())
    }

    pub async fn list_tokens(
        &self,
        user_id: &str,
        filter: &TokenFilter,
    ) -> Result<Vec<String>, ServiceError> {
        self.driver.list_tokens(user_id, filter).await
    }

    pub async fn list_revoked_tokens(&self) -> Result<Vec<RevocationEntry>, ServiceError> {
        self.cache
            .memoize(LIST_REVOKED_TOKENS, &[], || self.driver.list_revoked_tokens())
            .await
    }

    pub async fn flush_expired_tokens(&self) -> Result<(), ServiceError> {
        self.driver.flush_expired_tokens().await?;
        self.cache.invalidate_operation(GET_TOKEN);
        self.invalidate_revocation_list();
        Ok(())
    }

    pub fn invalidate_token(&self, token_id: &str) {
        self.cache.invalidate(GET_TOKEN, &[unique_id(token_id).as_str()]);
    }

    pub fn invalidate_revocation_list(&self) {
        self.cache.invalidate(LIST_REVOKED_TOKENS, &[]);
    }
}
