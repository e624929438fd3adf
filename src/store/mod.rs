// src/store/mod.rs

//! Key-value state with per-key time-to-live.
//!
//! The same contract serves as the short-lived nonce cache (pending logins,
//! sessions) and as durable storage for registered consumers (no TTL).

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use self::redis::RedisStore;

use crate::error::{NilaLtiError, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Byte-oriented storage backend.
///
/// Implementations must make `get`/`set` atomic per key: a reader sees
/// either the previous value or the new one, never a partial write.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the value, or `StoreError::NotFound` if absent or expired.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Writes the value. A `ttl` of `None` or zero keeps it until deleted.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Removes the key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Drops every key.
    async fn reset(&self) -> Result<(), StoreError>;

    /// Releases backend resources.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Collapses a zero TTL into "no expiry".
pub(crate) fn effective_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|ttl| !ttl.is_zero())
}

/// Reads a JSON-encoded value.
pub(crate) async fn get_json<T: DeserializeOwned>(
    store: &dyn Store,
    key: &str,
) -> Result<T, NilaLtiError> {
    let raw = store.get(key).await?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Writes a value as JSON.
pub(crate) async fn set_json<T: Serialize + ?Sized>(
    store: &dyn Store,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), NilaLtiError> {
    let raw = serde_json::to_vec(value)?;
    store.set(key, Bytes::from(raw), ttl).await?;
    Ok(())
}
