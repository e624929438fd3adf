// src/store/memory.rs

//! In-memory store backed by a moka cache.
//!
//! Suitable for development, tests and single-instance deployments.
//! Data is lost on restart.

use super::{effective_ttl, Store};
use crate::cache::{PerEntryExpiry, TimeToLive};
use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
struct Entry {
    value: Bytes,
    ttl: Option<Duration>,
}

impl TimeToLive for Entry {
    fn time_to_live(&self) -> Option<Duration> {
        self.ttl
    }
}

/// In-memory [`Store`] where every key carries its own TTL.
///
/// The cache is unbounded: durable entries are never evicted for space.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, Entry>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().expire_after(PerEntryExpiry).build(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.entries
            .get(key)
            .await
            .map(|entry| entry.value)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        let ttl = effective_ttl(ttl);
        debug!(key = %key, ttl = ?ttl, "Storing value");
        self.entries.insert(key.to_string(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", Bytes::from_static(b"v"), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Bytes::from_static(b"v"));

        store.delete("k").await.unwrap();
        assert!(matches!(store.get("k").await, Err(StoreError::NotFound(k)) if k == "k"));
        // Deleting twice is fine.
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn entries_expire_after_their_own_ttl() {
        let store = MemoryStore::new();
        store
            .set("short", Bytes::from_static(b"1"), Some(Duration::from_millis(200)))
            .await
            .unwrap();
        store.set("durable", Bytes::from_static(b"2"), Some(Duration::ZERO)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(matches!(store.get("short").await, Err(StoreError::NotFound(_))));
        assert_eq!(store.get("durable").await.unwrap(), Bytes::from_static(b"2"));
    }

    #[tokio::test]
    async fn overwrite_replaces_value_and_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"old"), Some(Duration::from_millis(200)))
            .await
            .unwrap();
        store.set("k", Bytes::from_static(b"new"), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(store.get("k").await.unwrap(), Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn reset_drops_everything() {
        let store = MemoryStore::new();
        store.set("a", Bytes::from_static(b"1"), None).await.unwrap();
        store.set("b", Bytes::from_static(b"2"), Some(Duration::from_secs(60))).await.unwrap();
        store.reset().await.unwrap();
        assert!(store.get("a").await.is_err());
        assert!(store.get("b").await.is_err());
        store.close().await.unwrap();
    }
}
