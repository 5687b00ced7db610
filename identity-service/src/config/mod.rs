use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::services::ServiceError;

/// Upper bound for `TOKEN_EXPIRATION_SECONDS`: 100 years.
pub const MAX_TOKEN_EXPIRATION_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub token: TokenConfig,
    pub kv: KvConfig,
    pub trust: TrustConfig,
    pub os_inherit: OsInheritConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Default lifetime of a token without an explicit expiry.
    pub expiration_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KvConfig {
    pub url: Option<String>,
    /// Total compare-and-set attempts before giving up on an index write.
    pub max_compare_and_set_retry: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrustConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsInheritConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub expiration_seconds: Option<u64>,
}

impl TokenConfig {
    /// `None` when the configured lifetime does not fit a `chrono::Duration`.
    pub fn expiration(&self) -> Option<chrono::Duration> {
        i64::try_from(self.expiration_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    /// Default expiry of a token issued at `now`.
    pub fn expires_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ServiceError> {
        self.expiration()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                ServiceError::unexpected(format!(
                    "Token expiration of {} seconds is out of range",
                    self.expiration_seconds
                ))
            })
    }
}

impl CacheConfig {
    pub fn expiration(&self) -> Option<Duration> {
        self.expiration_seconds.map(Duration::from_secs)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            expiration_seconds: 86400,
        }
    }
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_compare_and_set_retry: 16,
        }
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for OsInheritConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiration_seconds: None,
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let log_level = resolve_log_level(env::var("LOG_LEVEL").ok(), &common_config);

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            log_level,
            token: TokenConfig {
                expiration_seconds: parse_env("TOKEN_EXPIRATION_SECONDS", Some("86400"), is_prod)?,
            },
            kv: KvConfig {
                url: env::var("KV_URL").ok(),
                max_compare_and_set_retry: parse_env(
                    "KV_MAX_COMPARE_AND_SET_RETRY",
                    Some("16"),
                    is_prod,
                )?,
            },
            trust: TrustConfig {
                enabled: parse_env("TRUST_ENABLED", Some("true"), is_prod)?,
            },
            os_inherit: OsInheritConfig {
                enabled: parse_env("OS_INHERIT_ENABLED", Some("false"), is_prod)?,
            },
            cache: CacheConfig {
                enabled: parse_env("CACHE_ENABLED", Some("true"), is_prod)?,
                expiration_seconds: env::var("CACHE_EXPIRATION_SECONDS")
                    .ok()
                    .map(|v| {
                        v.parse().map_err(|e: std::num::ParseIntError| {
                            AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                        })
                    })
                    .transpose()?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.token.expiration_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_EXPIRATION_SECONDS must be greater than 0"
            )));
        }

        if self.token.expiration_seconds > MAX_TOKEN_EXPIRATION_SECONDS
            || self.token.expires_from(Utc::now()).is_err()
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_EXPIRATION_SECONDS must not exceed {}",
                MAX_TOKEN_EXPIRATION_SECONDS
            )));
        }

        if self.kv.max_compare_and_set_retry == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "KV_MAX_COMPARE_AND_SET_RETRY must be at least 1"
            )));
        }

        if self.cache.expiration_seconds == Some(0) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CACHE_EXPIRATION_SECONDS must be greater than 0"
            )));
        }

        if self.environment == Environment::Prod && self.kv.url.is_none() {
            tracing::warn!("KV_URL not set in production - tokens are held in process memory");
        }

        Ok(())
    }
}

/// `LOG_LEVEL` wins; otherwise the layered `APP__LOG_LEVEL` / configuration
/// file value applies.
fn resolve_log_level(explicit: Option<String>, common: &core_config::Config) -> String {
    explicit
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| common.log_level.clone())
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod && default.is_none() {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IdentityConfig {
        IdentityConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "identity-service".to_string(),
            log_level: "info".to_string(),
            token: TokenConfig::default(),
            kv: KvConfig::default(),
            trust: TrustConfig::default(),
            os_inherit: OsInheritConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(config().validate().is_ok());
        assert_eq!(config().kv.max_compare_and_set_retry, 16);
        assert_eq!(config().token.expiration(), Some(chrono::Duration::days(1)));
    }

    #[test]
    fn test_zero_retry_rejected() {
        let mut cfg = config();
        cfg.kv.max_compare_and_set_retry = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_token_expiration_bound() {
        let mut cfg = config();
        cfg.token.expiration_seconds = MAX_TOKEN_EXPIRATION_SECONDS;
        assert!(cfg.validate().is_ok());

        cfg.token.expiration_seconds = MAX_TOKEN_EXPIRATION_SECONDS + 1;
        assert!(cfg.validate().is_err());

        cfg.token.expiration_seconds = 20_000_000_000_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_out_of_range_expiration_does_not_panic() {
        let huge = TokenConfig {
            expiration_seconds: 100_000_000_000_000_000,
        };
        assert!(huge.expiration().is_none());
        assert!(huge.expires_from(Utc::now()).is_err());

        let overflowing = TokenConfig {
            expiration_seconds: 20_000_000_000_000,
        };
        assert!(overflowing.expiration().is_some());
        assert!(matches!(
            overflowing.expires_from(Utc::now()),
            Err(ServiceError::Unexpected(_))
        ));
    }

    #[test]
    fn test_zero_cache_expiration_rejected() {
        let mut cfg = config();
        cfg.cache.expiration_seconds = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_log_level_falls_back_to_layered_config() {
        let common = core_config::Config {
            log_level: "warn".to_string(),
        };
        assert_eq!(resolve_log_level(None, &common), "warn");
        assert_eq!(resolve_log_level(Some(String::new()), &common), "warn");
        assert_eq!(resolve_log_level(Some("debug".to_string()), &common), "debug");
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
    }
}
