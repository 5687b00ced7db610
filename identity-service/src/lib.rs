pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::IdentityConfig;
use crate::services::{
    IdentityManager, InMemoryIdentityStore, KvTokenStore, MemoryKv, RedisKv, TokenDriver,
    TokenManager,
};
use service_core::error::AppError;
use service_core::observability::init_tracing;

/// Wired managers sharing one configuration.
#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub identity: Arc<IdentityManager>,
    pub tokens: Arc<TokenManager>,
}

/// Load configuration from the environment, install logging and wire
/// the managers. Fails fast on invalid configuration.
pub async fn bootstrap() -> Result<AppState, AppError> {
    let config = IdentityConfig::from_env()?;
    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting identity service"
    );
    build_state(config).await
}

/// Build the token driver and managers described by `config`.
///
/// Tokens live in Redis when `kv.url` is set and in process memory
/// otherwise; both go through the indexed key-value driver.
pub async fn build_state(config: IdentityConfig) -> Result<AppState, AppError> {
    let driver: Arc<dyn TokenDriver> = match &config.kv.url {
        Some(url) => {
            let kv = RedisKv::new(url).await?;
            kv.health_check().await?;
            Arc::new(KvTokenStore::new(kv, &config.token, &config.kv, &config.trust))
        }
        None => {
            tracing::warn!("KV_URL not set; token store is process local");
            Arc::new(KvTokenStore::new(
                MemoryKv::new(),
                &config.token,
                &config.kv,
                &config.trust,
            ))
        }
    };

    let tokens = Arc::new(TokenManager::new(driver, &config.cache));
    let identity = Arc::new(
        IdentityManager::new(
            Arc::new(InMemoryIdentityStore::new()),
            &config.cache,
            &config.os_inherit,
        )
        .with_token_manager(tokens.clone()),
    );

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        trust_enabled = config.trust.enabled,
        os_inherit_enabled = config.os_inherit.enabled,
        "Identity services ready"
    );

    Ok(AppState {
        config,
        identity,
        tokens,
    })
}
