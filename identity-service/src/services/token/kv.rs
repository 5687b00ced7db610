use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::{prepare_payload, token_not_found, TokenDriver, TokenFilter};
use crate::config::{KvConfig, TokenConfig, TrustConfig};
use crate::models::{IndexEntry, RevocationEntry, TokenPayload, UserTokenIndex};
use crate::services::error::ServiceError;
use crate::services::kv::KvBackend;

const REVOCATION_KEY: &str = "revocation-list";

/// Token driver over a memcache-style key-value backend.
///
/// Layout:
/// - `token-<id>` holds the JSON payload, with a backend TTL when the
///   expiry lies in the future;
/// - `usertokens-<user_id>` holds a JSON list of `(token_id, expires)`
///   entries, rewritten with compare-and-set;
/// - `revocation-list` holds comma separated JSON revocation entries.
pub struct KvTokenStore<K> {
    kv: K,
    token: TokenConfig,
    max_cas_attempts: u32,
    trust_enabled: bool,
}

impl<K: KvBackend> KvTokenStore<K> {
    pub fn new(kv: K, token: &TokenConfig, kv_config: &KvConfig, trust: &TrustConfig) -> Self {
        Self {
            kv,
            token: token.clone(),
            max_cas_attempts: kv_config.max_compare_and_set_retry.max(1),
            trust_enabled: trust.enabled,
        }
    }

    /// The wrapped backend, for inspection of raw records.
    pub fn backend(&self) -> &K {
        &self.kv
    }

    pub fn token_key(token_id: &str) -> String {
        format!("token-{}", token_id)
    }

    pub fn user_key(user_id: &str) -> String {
        format!("usertokens-{}", user_id)
    }

    fn ttl_until(&self, expires: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
        if !self.kv.expires_natively() {
            return None;
        }
        (expires - now).to_std().ok().filter(|ttl| !ttl.is_zero())
    }

    /// Decode a stored index ahead of a rewrite, dropping it when it is
    /// neither format.
    fn decode_index(&self, raw: &str, user_key: &str) -> UserTokenIndex {
        UserTokenIndex::decode(raw).unwrap_or_else(|| {
            tracing::info!(
                user_key = %user_key,
                "Unable to convert user-token-index to new format; clearing user token index record"
            );
            UserTokenIndex::Current(Vec::new())
        })
    }

    /// Append `entry` to the index at `user_key` with optimistic concurrency.
    ///
    /// Each attempt re-reads the index, prunes expired entries and writes
    /// back only if nobody else wrote in between.
    pub async fn update_user_index(
        &self,
        user_key: &str,
        entry: IndexEntry,
    ) -> Result<Vec<IndexEntry>, ServiceError> {
        let now = Utc::now();
        let legacy_expires = self.token.expires_from(now)?;

        for attempt in 1..=self.max_cas_attempts {
            let current = self.kv.gets(user_key).await?;
            let (mut entries, fingerprint) = match current {
                Some((raw, fingerprint)) => (
                    self.decode_index(&raw, user_key)
                        .into_entries(legacy_expires),
                    Some(fingerprint),
                ),
                None => (Vec::new(), None),
            };
            entries.retain(|e| e.expires >= now);
            entries.push(entry.clone());

            let encoded = UserTokenIndex::encode(&entries)?;
            if self
                .kv
                .cas(user_key, &encoded, fingerprint.as_ref(), None)
                .await?
            {
                tracing::debug!(
                    user_key = %user_key,
                    count = entries.len(),
                    "Successful set of token-index-list"
                );
                return Ok(entries);
            }

            tracing::debug!(
                user_key = %user_key,
                attempt = attempt,
                max_attempts = self.max_cas_attempts,
                "Failed to set token-index-list"
            );
        }

        tracing::error!(
            user_key = %user_key,
            attempts = self.max_cas_attempts,
            "Exhausted compare-and-set attempts on token-index-list"
        );
        Err(ServiceError::unexpected("Unable to add token user list"))
    }

    async fn add_to_revocation_list(&self, entry: &RevocationEntry) -> Result<(), ServiceError> {
        let json = serde_json::to_string(entry).map_err(|e| ServiceError::Unexpected(e.into()))?;
        let fragment = format!(",{}", json);

        if self.kv.append(REVOCATION_KEY, &fragment).await?
            || self.kv.add(REVOCATION_KEY, &json).await?
            || self.kv.append(REVOCATION_KEY, &fragment).await?
        {
            return Ok(());
        }

        tracing::error!(token_id = %entry.id, "Unable to add token to revocation list");
        Err(ServiceError::unexpected(
            "Unable to add token to revocation list.",
        ))
    }

    async fn load_token(&self, token_id: &str) -> Result<Option<TokenPayload>, ServiceError> {
        match self.kv.get(&Self::token_key(token_id)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| ServiceError::Unexpected(e.into())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<K: KvBackend> TokenDriver for KvTokenStore<K> {
    async fn create_token(
        &self,
        token_id: &str,
        payload: TokenPayload,
    ) -> Result<TokenPayload, ServiceError> {
        let now = Utc::now();
        let payload = prepare_payload(token_id, payload, &self.token, now)?;
        let expires = payload.expires.unwrap_or(now);

        let raw = serde_json::to_string(&payload).map_err(|e| ServiceError::Unexpected(e.into()))?;
        self.kv
            .set(&Self::token_key(token_id), &raw, self.ttl_until(expires, now))
            .await?;

        let entry = IndexEntry {
            token_id: token_id.to_string(),
            expires,
        };
        if let Some(user_id) = payload.user_id.as_deref() {
            self.update_user_index(&Self::user_key(user_id), entry.clone())
                .await?;
        }

        if self.trust_enabled && payload.trust_id.is_some() {
            let trustee_user_id = payload.trustee_user_id()?;
            self.update_user_index(&Self::user_key(&trustee_user_id), entry)
                .await?;
        }

        Ok(payload)
    }

    async fn get_token(&self, token_id: &str) -> Result<TokenPayload, ServiceError> {
        if token_id.is_empty() {
            return Err(token_not_found(""));
        }
        match self.load_token(token_id).await? {
            Some(payload) if !payload.is_expired(Utc::now()) => Ok(payload),
            _ => Err(token_not_found(token_id)),
        }
    }

    async fn delete_token(&self, token_id: &str) -> Result<(), ServiceError> {
        let payload = self.get_token(token_id).await?;
        self.kv.delete(&Self::token_key(token_id)).await?;
        self.add_to_revocation_list(&RevocationEntry {
            id: token_id.to_string(),
            expires: payload.expires,
        })
        .await
    }

    async fn list_tokens(
        &self,
        user_id: &str,
        filter: &TokenFilter,
    ) -> Result<Vec<String>, ServiceError> {
        let user_key = Self::user_key(user_id);
        let now = Utc::now();
        let raw = match self.kv.get(&user_key).await? {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };

        // Legacy entries carry no expiry; the primary record decides.
        let candidates: Vec<(String, Option<DateTime<Utc>>)> = match UserTokenIndex::decode(&raw) {
            Some(UserTokenIndex::Current(entries)) => entries
                .into_iter()
                .map(|e| (e.token_id, Some(e.expires)))
                .collect(),
            Some(UserTokenIndex::Legacy(ids)) => ids.into_iter().map(|id| (id, None)).collect(),
            None => {
                tracing::info!(
                    user_key = %user_key,
                    "Ignoring unreadable user-token-index record"
                );
                Vec::new()
            }
        };

        let mut tokens = Vec::new();
        for (token_id, indexed_expiry) in candidates {
            if indexed_expiry.is_some_and(|expires| expires < now) {
                continue;
            }
            let Some(payload) = self.load_token(&token_id).await? else {
                continue;
            };
            if payload.is_expired(now) || !filter.matches(&payload) {
                continue;
            }
            tokens.push(token_id);
        }
        Ok(tokens)
    }

    async fn list_revoked_tokens(&self) -> Result<Vec<RevocationEntry>, ServiceError> {
        match self.kv.get(REVOCATION_KEY).await? {
            Some(raw) if !raw.is_empty() => serde_json::from_str(&format!("[{}]", raw))
                .map_err(|e| ServiceError::Unexpected(e.into())),
            _ => Ok(Vec::new()),
        }
    }

    async fn flush_expired_tokens(&self) -> Result<(), ServiceError> {
        Err(ServiceError::NotImplemented(
            "flush_expired_tokens is not needed by a key-value token backend".to_string(),
        ))
    }
}
