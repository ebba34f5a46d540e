//! In-process notification bus keyed by topic strings.
//!
//! Each topic owns a broadcast channel created on first use. Publishing to a
//! topic nobody listens on is not an error.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Prefix shared by every topic this crate publishes.
pub const DOMAIN: &str = "bacbridge";

/// Payload delivered to topic subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Cached points of a device changed.
    PointsChanged { device_id: String },
    /// Cached diagnostics of a device changed.
    DiagnosticsChanged { device_id: String },
    /// COV subscriptions of a device should be re-registered.
    Resubscribe { device_id: String },
    /// A device should be located again by targeted discovery.
    RescanRequested { instance: u32 },
    /// An I-Am was processed for a device.
    DeviceAnnounced { instance: u32, address: String },
}

#[derive(Debug, Default)]
pub struct SignalBus {
    channels: Mutex<HashMap<String, broadcast::Sender<Signal>>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `signal` on `topic`, returning how many subscribers got it.
    pub fn publish(&self, topic: &str, signal: Signal) -> usize {
        let sender = {
            let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            channels.get(topic).cloned()
        };
        let delivered = sender.map_or(0, |sender| sender.send(signal).unwrap_or(0));
        log::trace!("signal on {topic} reached {delivered} subscriber(s)");
        delivered
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Signal> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drops channels without subscribers.
    pub fn prune(&self) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.retain(|_, sender| sender.receiver_count() > 0);
    }
}

/// Device id used in cache keys and topics: `client_<instance>`.
pub fn device_id(instance: u32) -> String {
    format!("client_{instance}")
}

pub mod topics {
    use super::DOMAIN;

    pub fn points(entry_id: &str, device_id: &str) -> String {
        format!("{DOMAIN}_client_points_{entry_id}_{device_id}")
    }

    pub fn entry_points(entry_id: &str) -> String {
        format!("{DOMAIN}_client_points_{entry_id}")
    }

    pub fn diagnostics(entry_id: &str, device_id: &str) -> String {
        format!("{DOMAIN}_client_diag_{entry_id}_{device_id}")
    }

    pub fn cov(entry_id: &str, device_id: &str) -> String {
        format!("{DOMAIN}_client_cov_{entry_id}_{device_id}")
    }

    pub fn rescan(entry_id: &str) -> String {
        format!("{DOMAIN}_client_rescan_{entry_id}")
    }

    pub fn i_am(entry_id: &str) -> String {
        format!("{DOMAIN}_i_am_{entry_id}")
    }
}
