//! Key-value backend capability used by the token store.
//!
//! The shape follows a memcache-style client: plain get/set, `add` that
//! only writes absent keys, `append` that only extends present keys, and a
//! `gets`/`cas` pair for optimistic concurrency.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Opaque fingerprint of a value returned by `gets`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CasToken(pub String);

#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> Result<(), anyhow::Error>;
    /// Store only if the key is absent. Returns whether the value was stored.
    async fn add(&self, key: &str, value: &str) -> Result<bool, anyhow::Error>;
    /// Extend an existing value. Returns false when the key is absent.
    async fn append(&self, key: &str, fragment: &str) -> Result<bool, anyhow::Error>;
    async fn gets(&self, key: &str) -> Result<Option<(String, CasToken)>, anyhow::Error>;
    /// Replace the value if it still matches `expected`. `None` means the key
    /// must still be absent.
    async fn cas(
        &self,
        key: &str,
        value: &str,
        expected: Option<&CasToken>,
        ttl: Option<Duration>,
    ) -> Result<bool, anyhow::Error>;
    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error>;

    /// Whether keys written with a TTL disappear on their own.
    fn expires_natively(&self) -> bool {
        true
    }
}

struct Slot {
    value: String,
    version: u64,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process backend. Values are copied in and out, fingerprints are
/// per-write version counters and TTLs expire lazily on access.
#[derive(Default)]
pub struct MemoryKv {
    slots: Mutex<HashMap<String, Slot>>,
    next_version: Mutex<u64>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) -> Result<u64, anyhow::Error> {
        let mut version = self
            .next_version
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory kv mutex poisoned: {}", e))?;
        *version += 1;
        Ok(*version)
    }

    fn with_slots<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Slot>) -> R,
    ) -> Result<R, anyhow::Error> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory kv mutex poisoned: {}", e))?;
        let now = Instant::now();
        slots.retain(|_, slot| slot.is_live(now));
        Ok(f(&mut slots))
    }

    fn slot(&self, value: &str, ttl: Option<Duration>) -> Result<Slot, anyhow::Error> {
        Ok(Slot {
            value: value.to_string(),
            version: self.bump()?,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        })
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        self.with_slots(|slots| slots.get(key).map(|slot| slot.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), anyhow::Error> {
        let slot = self.slot(value, ttl)?;
        self.with_slots(|slots| {
            slots.insert(key.to_string(), slot);
        })
    }

    async fn add(&self, key: &str, value: &str) -> Result<bool, anyhow::Error> {
        let slot = self.slot(value, None)?;
        self.with_slots(|slots| {
            if slots.contains_key(key) {
                return false;
            }
            slots.insert(key.to_string(), slot);
            true
        })
    }

    async fn append(&self, key: &str, fragment: &str) -> Result<bool, anyhow::Error> {
        let version = self.bump()?;
        self.with_slots(|slots| match slots.get_mut(key) {
            Some(slot) => {
                slot.value.push_str(fragment);
                slot.version = version;
                true
            }
            None => false,
        })
    }

    async fn gets(&self, key: &str) -> Result<Option<(String, CasToken)>, anyhow::Error> {
        self.with_slots(|slots| {
            slots
                .get(key)
                .map(|slot| (slot.value.clone(), CasToken(slot.version.to_string())))
        })
    }

    async fn cas(
        &self,
        key: &str,
        value: &str,
        expected: Option<&CasToken>,
        ttl: Option<Duration>,
    ) -> Result<bool, anyhow::Error> {
        let slot = self.slot(value, ttl)?;
        self.with_slots(|slots| {
            let current = slots.get(key).map(|s| CasToken(s.version.to_string()));
            if current.as_ref() != expected {
                return false;
            }
            slots.insert(key.to_string(), slot);
            true
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error> {
        self.with_slots(|slots| slots.remove(key).is_some())
    }
}
