use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, Script};
use std::time::Duration;

use super::kv::{CasToken, KvBackend};

const GETS_SCRIPT: &str = r#"
local value = redis.call('GET', KEYS[1])
if not value then
    return nil
end
return {value, redis.sha1hex(value)}
"#;

// ARGV[2] is the expected fingerprint, empty when the key must be absent.
// ARGV[3] is the TTL in seconds, 0 for none.
const CAS_SCRIPT: &str = r#"
local value = redis.call('GET', KEYS[1])
if ARGV[2] == '' then
    if value then
        return 0
    end
elseif not value or redis.sha1hex(value) ~= ARGV[2] then
    return 0
end
if tonumber(ARGV[3]) > 0 then
    redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
else
    redis.call('SET', KEYS[1], ARGV[1])
end
return 1
"#;

const APPEND_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('APPEND', KEYS[1], ARGV[1])
    return 1
end
return 0
"#;

/// Redis-backed key-value store. Compare-and-set fingerprints are the SHA-1
/// of the stored value, computed server side.
#[derive(Clone)]
pub struct RedisKv {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisKv {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url)?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }

    pub async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

fn ttl_seconds(ttl: Option<Duration>) -> u64 {
    // Redis rejects EX 0. Partial seconds round up so a record never
    // expires before its token does.
    ttl.map(|ttl| {
        let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        secs.max(1)
    })
    .unwrap_or(0)
}

#[async_trait]
impl KvBackend for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get {}: {}", key, e))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if ttl.is_some() {
            cmd.arg("EX").arg(ttl_seconds(ttl));
        }
        cmd.query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set {}: {}", key, e))
    }

    async fn add(&self, key: &str, value: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let stored: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to add {}: {}", key, e))?;
        Ok(stored.is_some())
    }

    async fn append(&self, key: &str, fragment: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let appended: i64 = Script::new(APPEND_SCRIPT)
            .key(key)
            .arg(fragment)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to append to {}: {}", key, e))?;
        Ok(appended == 1)
    }

    async fn gets(&self, key: &str) -> Result<Option<(String, CasToken)>, anyhow::Error> {
        let mut conn = self.manager.clone();
        let found: Option<(String, String)> = Script::new(GETS_SCRIPT)
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to gets {}: {}", key, e))?;
        Ok(found.map(|(value, fingerprint)| (value, CasToken(fingerprint))))
    }

    async fn cas(
        &self,
        key: &str,
        value: &str,
        expected: Option<&CasToken>,
        ttl: Option<Duration>,
    ) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let swapped: i64 = Script::new(CAS_SCRIPT)
            .key(key)
            .arg(value)
            .arg(expected.map(|t| t.0.as_str()).unwrap_or(""))
            .arg(ttl_seconds(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to cas {}: {}", key, e))?;
        Ok(swapped == 1)
    }

    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete {}: {}", key, e))?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_seconds_rounds_up() {
        assert_eq!(ttl_seconds(None), 0);
        assert_eq!(ttl_seconds(Some(Duration::from_millis(200))), 1);
        assert_eq!(ttl_seconds(Some(Duration::from_secs(90))), 90);
        assert_eq!(ttl_seconds(Some(Duration::from_millis(1500))), 2);
        assert_eq!(ttl_seconds(Some(Duration::from_millis(59_001))), 60);
    }

    #[tokio::test]
    #[ignore] // Requires running Redis
    async fn test_redis_cas_round() {
        let url = std::env::var("KV_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let kv = RedisKv::new(&url).await.unwrap();
        let key = format!("test-cas-{}", uuid::Uuid::new_v4());

        assert!(kv.cas(&key, "v1", None, None).await.unwrap());
        let (value, token) = kv.gets(&key).await.unwrap().unwrap();
        assert_eq!(value, "v1");
        kv.set(&key, "v2", None).await.unwrap();
        assert!(!kv.cas(&key, "v3", Some(&token), None).await.unwrap());
        assert!(kv.append(&key, ",x").await.unwrap());
        assert_eq!(kv.get(&key).await.unwrap().as_deref(), Some("v2,x"));
        assert!(kv.delete(&key).await.unwrap());
    }
}
