use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{prepare_payload, token_not_found, TokenDriver, TokenFilter};
use crate::config::{TokenConfig, TrustConfig};
use crate::models::{RevocationEntry, TokenPayload};
use crate::services::error::ServiceError;

#[derive(Default)]
struct State {
    tokens: BTreeMap<String, TokenPayload>,
    revoked: Vec<RevocationEntry>,
}

/// Token driver without a secondary index; listing scans every record.
pub struct InMemoryTokenStore {
    state: Mutex<State>,
    token: TokenConfig,
    trust_enabled: bool,
}

impl InMemoryTokenStore {
    pub fn new(token: &TokenConfig, trust: &TrustConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            token: token.clone(),
            trust_enabled: trust.enabled,
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, ServiceError> {
        self.state
            .lock()
            .map_err(|e| ServiceError::unexpected(format!("Token store mutex poisoned: {}", e)))
    }

    /// Stored record regardless of expiry.
    pub fn raw_token(&self, token_id: &str) -> Result<Option<TokenPayload>, ServiceError> {
        Ok(self.state()?.tokens.get(token_id).cloned())
    }

    fn belongs_to(&self, payload: &TokenPayload, user_id: &str) -> bool {
        if payload.owner_id() == Some(user_id) {
            return true;
        }
        self.trust_enabled
            && payload.trust_id.is_some()
            && payload
                .trustee_user_id()
                .is_ok_and(|trustee| trustee == user_id)
    }
}

#[async_trait]
impl TokenDriver for InMemoryTokenStore {
    async fn create_token(
        &self,
        token_id: &str,
        payload: TokenPayload,
    ) -> Result<TokenPayload, ServiceError> {
        let payload = prepare_payload(token_id, payload, &self.token, Utc::now())?;
        if self.trust_enabled && payload.trust_id.is_some() {
            payload.trustee_user_id()?;
        }
        self.state()?
            .tokens
            .insert(token_id.to_string(), payload.clone());
        Ok(payload)
    }

    async fn get_token(&self, token_id: &str) -> Result<TokenPayload, ServiceError> {
        if token_id.is_empty() {
            return Err(token_not_found(""));
        }
        match self.state()?.tokens.get(token_id) {
            Some(payload) if !payload.is_expired(Utc::now()) => Ok(payload.clone()),
            _ => Err(token_not_found(token_id)),
        }
    }

    async fn delete_token(&self, token_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state()?;
        let now = Utc::now();
        match state.tokens.get(token_id) {
            Some(payload) if !payload.is_expired(now) => {}
            _ => return Err(token_not_found(token_id)),
        }
        if let Some(payload) = state.tokens.remove(token_id) {
            state.revoked.push(RevocationEntry {
                id: token_id.to_string(),
                expires: payload.expires,
            });
        }
        Ok(())
    }

    async fn list_tokens(
        &self,
        user_id: &str,
        filter: &TokenFilter,
    ) -> Result<Vec<String>, ServiceError> {
        let now = Utc::now();
        Ok(self
            .state()?
            .tokens
            .iter()
            .filter(|(_, payload)| {
                !payload.is_expired(now) && self.belongs_to(payload, user_id) && filter.matches(payload)
            })
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn list_revoked_tokens(&self) -> Result<Vec<RevocationEntry>, ServiceError> {
        Ok(self.state()?.revoked.clone())
    }

    async fn flush_expired_tokens(&self) -> Result<(), ServiceError> {
        let now = Utc::now();
        let mut state = self.state()?;
        let before = state.tokens.len();
        state.tokens.retain(|_, payload| !payload.is_expired(now));
        state
            .revoked
            .retain(|entry| entry.expires.is_none_or(|expires| expires >= now));
        tracing::info!(flushed = before - state.tokens.len(), "Flushed expired tokens");
        Ok(())
    }
}
