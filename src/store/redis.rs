// src/store/redis.rs

//! Redis-backed store, shared by every instance pointing at the same database.

use super::{effective_ttl, Store};
use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// [`Store`] on top of a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

fn backend(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl RedisStore {
    /// Connects to the Redis server at `url` (e.g. `redis://localhost:6379`).
    #[instrument(skip(url), err)]
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let connection = client.get_multiplexed_async_connection().await.map_err(backend)?;
        info!("Connected to Redis state store");
        Ok(Self { connection })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(backend)?;
        value
            .map(Bytes::from)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        match effective_ttl(ttl) {
            Some(ttl) => {
                // PSETEX rejects 0, so sub-millisecond TTLs round up.
                let millis = (ttl.as_millis() as u64).max(1);
                debug!(key = %key, millis, "PSETEX");
                conn.pset_ex::<_, _, ()>(key, value.to_vec(), millis)
                    .await
                    .map_err(backend)
            }
            None => conn.set::<_, _, ()>(key, value.to_vec()).await.map_err(backend),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await.map_err(backend)
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("FLUSHDB").query_async::<()>(&mut conn).await.map_err(backend)
    }

    async fn close(&self) -> Result<(), StoreError> {
        // The multiplexed connection closes when its last clone drops.
        Ok(())
    }
}
