//! Services layer for identity-service.
//!
//! Stores and drivers hold data; managers add validation, caching and
//! invalidation on top of them.

mod assignment;
pub mod cache;
pub mod error;
pub mod identity;
pub mod kv;
pub mod memory;
pub mod redis;
pub mod resolution;
pub mod store;
pub mod token;

pub use cache::{Cache, CacheKey};
pub use error::{EntityKind, ServiceError};
pub use identity::{CachedOperation, IdentityManager};
pub use kv::{CasToken, KvBackend, MemoryKv};
pub use memory::InMemoryIdentityStore;
pub use redis::RedisKv;
pub use store::IdentityStore;
pub use token::{
    unique_id, InMemoryTokenStore, KvTokenStore, TokenDriver, TokenFilter, TokenManager,
};
