use crate::signals::{topics, Signal, SignalBus};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Per-key rate limiter: at most one acquisition per key within
/// `min_interval`.
#[derive(Debug)]
pub struct KeyedRateLimiter<K> {
    last: Mutex<HashMap<K, Instant>>,
    min_interval: Duration,
}

impl<K: Eq + Hash + Clone> KeyedRateLimiter<K> {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last: Mutex::new(HashMap::new()),
            min_interval,
        }
    }

    /// Returns `true` and records the attempt when `key` is outside its
    /// quiet period, `false` otherwise.
    pub fn try_acquire(&self, key: &K) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = last.get(key) {
            if now.saturating_duration_since(*previous) < self.min_interval {
                return false;
            }
        }
        last.insert(key.clone(), now);
        true
    }

    pub fn reset(&self, key: &K) {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Publishes rescan requests for devices, at most once per device per
/// quiet period.
#[derive(Debug)]
pub struct RescanRequester {
    entry_id: String,
    signals: Arc<SignalBus>,
    limiter: KeyedRateLimiter<u32>,
}

impl RescanRequester {
    pub fn new(entry_id: impl Into<String>, signals: Arc<SignalBus>, min_interval: Duration) -> Self {
        Self {
            entry_id: entry_id.into(),
            signals,
            limiter: KeyedRateLimiter::new(min_interval),
        }
    }

    /// Requests a rescan of `instance`. Returns whether the request was
    /// published or swallowed by the rate limit.
    pub fn request(&self, instance: u32) -> bool {
        if !self.limiter.try_acquire(&instance) {
            log::debug!("rescan of device {instance} suppressed by rate limit");
            return false;
        }
        self.signals.publish(
            &topics::rescan(&self.entry_id),
            Signal::RescanRequested { instance },
        );
        true
    }
}
