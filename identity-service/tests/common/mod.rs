//! Shared fixtures for identity-service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use identity_service::config::{
    CacheConfig, KvConfig, OsInheritConfig, TokenConfig, TrustConfig,
};
use identity_service::models::{Domain, Group, Project, Role, User, DEFAULT_DOMAIN_ID};
use identity_service::services::{
    CasToken, IdentityManager, IdentityStore, InMemoryIdentityStore, KvBackend, KvTokenStore,
    MemoryKv, ServiceError, TokenManager,
};
use identity_service::utils::parse_request;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Manager plus direct access to the store beneath it.
pub struct TestIdentity {
    pub store: Arc<InMemoryIdentityStore>,
    pub manager: IdentityManager,
}

impl TestIdentity {
    pub async fn new(inherit_enabled: bool) -> Self {
        let store = Arc::new(InMemoryIdentityStore::new());
        let manager = IdentityManager::new(
            store.clone(),
            &CacheConfig::default(),
            &OsInheritConfig {
                enabled: inherit_enabled,
            },
        );
        manager
            .create_domain(
                parse_request(json!({"id": DEFAULT_DOMAIN_ID, "name": "Default"}))
                    .expect("valid domain request"),
            )
            .await
            .expect("default domain");
        Self { store, manager }
    }

    pub fn driver(&self) -> &dyn IdentityStore {
        self.store.as_ref()
    }

    pub async fn domain(&self, name: &str) -> Domain {
        self.manager
            .create_domain(parse_request(json!({ "name": name })).unwrap())
            .await
            .unwrap()
    }

    pub async fn project(&self, name: &str, domain_id: &str) -> Project {
        self.manager
            .create_project(parse_request(json!({ "name": name, "domain_id": domain_id })).unwrap())
            .await
            .unwrap()
    }

    pub async fn user(&self, name: &str, domain_id: &str) -> User {
        self.manager
            .create_user(
                parse_request(json!({
                    "name": name,
                    "domain_id": domain_id,
                    "password": "correct horse battery staple",
                }))
                .unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn group(&self, name: &str, domain_id: &str) -> Group {
        self.manager
            .create_group(parse_request(json!({ "name": name, "domain_id": domain_id })).unwrap())
            .await
            .unwrap()
    }

    pub async fn role(&self, name: &str) -> Role {
        self.manager
            .create_role(parse_request(json!({ "id": name, "name": name })).unwrap())
            .await
            .unwrap()
    }
}

/// Key-value backend that can refuse compare-and-set writes on demand.
#[derive(Default)]
pub struct ContendedKv {
    inner: MemoryKv,
    fail_next: AtomicU32,
    fail_always: AtomicBool,
    yield_after_gets: AtomicBool,
    cas_attempts: AtomicU32,
}

impl ContendedKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` compare-and-set calls.
    pub fn fail_next_cas(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn fail_every_cas(&self) {
        self.fail_always.store(true, Ordering::SeqCst);
    }

    /// Yield to the scheduler between `gets` and the following `cas`, so
    /// concurrent writers read the same version.
    pub fn interleave_reads(&self) {
        self.yield_after_gets.store(true, Ordering::SeqCst);
    }

    pub fn cas_attempts(&self) -> u32 {
        self.cas_attempts.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if self.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl KvBackend for ContendedKv {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), anyhow::Error> {
        self.inner.set(key, value, ttl).await
    }

    async fn add(&self, key: &str, value: &str) -> Result<bool, anyhow::Error> {
        self.inner.add(key, value).await
    }

    async fn append(&self, key: &str, fragment: &str) -> Result<bool, anyhow::Error> {
        self.inner.append(key, fragment).await
    }

    async fn gets(&self, key: &str) -> Result<Option<(String, CasToken)>, anyhow::Error> {
        let current = self.inner.gets(key).await;
        if self.yield_after_gets.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        current
    }

    async fn cas(
        &self,
        key: &str,
        value: &str,
        expected: Option<&CasToken>,
        ttl: Option<Duration>,
    ) -> Result<bool, anyhow::Error> {
        self.cas_attempts.fetch_add(1, Ordering::SeqCst);
        if self.should_fail() {
            return Ok(false);
        }
        self.inner.cas(key, value, expected, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error> {
        self.inner.delete(key).await
    }
}

pub fn kv_config(max_compare_and_set_retry: u32) -> KvConfig {
    KvConfig {
        url: None,
        max_compare_and_set_retry,
    }
}

pub fn kv_store<K: KvBackend>(kv: K, max_compare_and_set_retry: u32) -> KvTokenStore<K> {
    KvTokenStore::new(
        kv,
        &TokenConfig::default(),
        &kv_config(max_compare_and_set_retry),
        &TrustConfig::default(),
    )
}

pub fn token_manager(store: KvTokenStore<MemoryKv>) -> TokenManager {
    TokenManager::new(Arc::new(store), &CacheConfig::default())
}

pub fn assert_unexpected(err: &ServiceError) {
    assert!(
        matches!(err, ServiceError::Unexpected(_)),
        "expected Unexpected, got {:?}",
        err
    );
}
