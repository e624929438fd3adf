// src/cache.rs

use moka::Expiry;
use std::time::{Duration, Instant};

/// A cached value that knows how long it may live.
pub(crate) trait TimeToLive {
    /// `None` keeps the entry until it is invalidated.
    fn time_to_live(&self) -> Option<Duration>;
}

/// Moka expiry policy that reads each entry's lifetime from the entry itself.
///
/// Overwriting an entry restarts its clock with the new value's lifetime.
pub(crate) struct PerEntryExpiry;

impl<K, V: TimeToLive> Expiry<K, V> for PerEntryExpiry {
    fn expire_after_create(&self, _key: &K, value: &V, _created_at: Instant) -> Option<Duration> {
        value.time_to_live()
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &V,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.time_to_live()
    }
}
