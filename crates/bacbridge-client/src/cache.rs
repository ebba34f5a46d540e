//! Shared per-device cache of diagnostics and imported points.
//!
//! Entries are keyed by `(entry_id, device_id)`. Every mutation publishes the
//! matching signal so consumers re-read what they need. A per-device async
//! lock serializes refreshes of the same device.

use crate::signals::{topics, Signal, SignalBus};
use bacbridge_core::Point;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

type DeviceKey = (String, String);

fn key(entry_id: &str, device_id: &str) -> DeviceKey {
    (entry_id.to_string(), device_id.to_string())
}

/// Replaces `slot` only when `newer` carries a value.
fn keep<T: Clone>(slot: &mut Option<T>, newer: &Option<T>) {
    if let Some(value) = newer {
        *slot = Some(value.clone());
    }
}

/// Properties of a remote device object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub object_identifier: Option<String>,
    pub object_name: Option<String>,
    pub description: Option<String>,
    pub model_name: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_identifier: Option<u32>,
    pub firmware_revision: Option<String>,
    pub application_software_version: Option<String>,
    pub serial_number: Option<String>,
    pub system_status: Option<String>,
}

impl DeviceInfo {
    pub fn merge_from(&mut self, newer: &Self) {
        keep(&mut self.object_identifier, &newer.object_identifier);
        keep(&mut self.object_name, &newer.object_name);
        keep(&mut self.description, &newer.description);
        keep(&mut self.model_name, &newer.model_name);
        keep(&mut self.vendor_name, &newer.vendor_name);
        keep(&mut self.vendor_identifier, &newer.vendor_identifier);
        keep(&mut self.firmware_revision, &newer.firmware_revision);
        keep(
            &mut self.application_software_version,
            &newer.application_software_version,
        );
        keep(&mut self.serial_number, &newer.serial_number);
        keep(&mut self.system_status, &newer.system_status);
    }
}

/// Properties of a remote network-port object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkInfo {
    pub object_identifier: Option<String>,
    pub ip_address: Option<String>,
    pub subnet_mask: Option<String>,
    pub udp_port: Option<u16>,
    pub mac_address: Option<String>,
}

impl NetworkInfo {
    pub fn merge_from(&mut self, newer: &Self) {
        keep(&mut self.object_identifier, &newer.object_identifier);
        keep(&mut self.ip_address, &newer.ip_address);
        keep(&mut self.subnet_mask, &newer.subnet_mask);
        keep(&mut self.udp_port, &newer.udp_port);
        keep(&mut self.mac_address, &newer.mac_address);
    }
}

/// Cached diagnostics of one remote device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEntry {
    pub instance: u32,
    pub address: String,
    pub name: String,
    pub online: bool,
    pub has_device_object: bool,
    pub has_network_object: bool,
    /// Network-port instance to read first on the next refresh.
    pub network_port_instance: Option<u32>,
    pub device: DeviceInfo,
    pub network: NetworkInfo,
    #[serde(skip)]
    pub last_refresh: Option<Instant>,
}

/// Host display name of a device that reports no object name.
pub fn display_name(instance: u32) -> String {
    format!("BACnet Client {instance}")
}

impl DeviceEntry {
    pub fn new(instance: u32, address: impl Into<String>) -> Self {
        Self {
            instance,
            address: address.into(),
            name: display_name(instance),
            online: false,
            has_device_object: false,
            has_network_object: false,
            network_port_instance: None,
            device: DeviceInfo::default(),
            network: NetworkInfo::default(),
            last_refresh: None,
        }
    }

    /// Folds a fresh snapshot into the previous entry.
    ///
    /// Fields the snapshot could not read keep their previous values, and
    /// `has_device_object`/`has_network_object` never fall back to `false`
    /// once the object was seen.
    pub fn merged(previous: Option<&Self>, current: Self) -> Self {
        let Some(previous) = previous else {
            return current;
        };
        let mut merged = previous.clone();
        merged.device.merge_from(&current.device);
        merged.network.merge_from(&current.network);
        merged.has_device_object = current.has_device_object
            || previous.has_device_object
            || previous.device.object_identifier.is_some();
        merged.has_network_object = current.has_network_object
            || previous.has_network_object
            || previous.network.object_identifier.is_some();
        if !current.address.is_empty() {
            merged.address = current.address;
        }
        merged.network_port_instance = current.network_port_instance.or(previous.network_port_instance);
        merged.name = merged
            .device
            .object_name
            .clone()
            .unwrap_or_else(|| display_name(merged.instance));
        merged.online = current.online;
        merged.last_refresh = current.last_refresh.or(previous.last_refresh);
        merged
    }
}

pub struct SharedCache {
    devices: RwLock<HashMap<DeviceKey, DeviceEntry>>,
    points: RwLock<HashMap<DeviceKey, BTreeMap<String, Point>>>,
    locks: Mutex<HashMap<DeviceKey, Arc<Mutex<()>>>>,
    signals: Arc<SignalBus>,
}

impl SharedCache {
    pub fn new(signals: Arc<SignalBus>) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            points: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            signals,
        }
    }

    pub fn signals(&self) -> &Arc<SignalBus> {
        &self.signals
    }

    /// Lock serializing refreshes of one device.
    pub async fn device_lock(&self, entry_id: &str, device_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key(entry_id, device_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn device(&self, entry_id: &str, device_id: &str) -> Option<DeviceEntry> {
        self.devices
            .read()
            .await
            .get(&key(entry_id, device_id))
            .cloned()
    }

    /// All devices of an entry, ordered by instance.
    pub async fn devices(&self, entry_id: &str) -> Vec<DeviceEntry> {
        let devices = self.devices.read().await;
        let mut found: Vec<DeviceEntry> = devices
            .iter()
            .filter(|((entry, _), _)| entry == entry_id)
            .map(|(_, device)| device.clone())
            .collect();
        found.sort_by_key(|device| device.instance);
        found
    }

    pub async fn store_device(&self, entry_id: &str, device_id: &str, device: DeviceEntry) {
        self.devices
            .write()
            .await
            .insert(key(entry_id, device_id), device);
        self.signals.publish(
            &topics::diagnostics(entry_id, device_id),
            Signal::DiagnosticsChanged {
                device_id: device_id.to_string(),
            },
        );
    }

    pub async fn points(&self, entry_id: &str, device_id: &str) -> BTreeMap<String, Point> {
        self.points
            .read()
            .await
            .get(&key(entry_id, device_id))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn point(&self, entry_id: &str, device_id: &str, point_key: &str) -> Option<Point> {
        self.points
            .read()
            .await
            .get(&key(entry_id, device_id))
            .and_then(|points| points.get(point_key))
            .cloned()
    }

    pub async fn point_keys(&self, entry_id: &str, device_id: &str) -> BTreeSet<String> {
        self.points
            .read()
            .await
            .get(&key(entry_id, device_id))
            .map(|points| points.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Inserts or replaces points by key. Returns how many were written.
    pub async fn upsert_points(
        &self,
        entry_id: &str,
        device_id: &str,
        payload: BTreeMap<String, Point>,
    ) -> usize {
        if payload.is_empty() {
            return 0;
        }
        let count = payload.len();
        {
            let mut points = self.points.write().await;
            points
                .entry(key(entry_id, device_id))
                .or_default()
                .extend(payload);
        }
        self.notify_points(entry_id, device_id);
        count
    }

    /// Mutates one cached point in place. `None` when the point is unknown;
    /// otherwise whether `update` reported a change (which is then published).
    pub async fn update_point<F>(
        &self,
        entry_id: &str,
        device_id: &str,
        point_key: &str,
        update: F,
    ) -> Option<bool>
    where
        F: FnOnce(&mut Point) -> bool,
    {
        let changed = {
            let mut points = self.points.write().await;
            let point = points
                .get_mut(&key(entry_id, device_id))?
                .get_mut(point_key)?;
            update(point)
        };
        if changed {
            self.notify_points(entry_id, device_id);
        }
        Some(changed)
    }

    /// Re-addresses every point of a device. Returns how many changed.
    pub async fn readdress_points(&self, entry_id: &str, device_id: &str, address: &str) -> usize {
        let changed = {
            let mut points = self.points.write().await;
            points
                .get_mut(&key(entry_id, device_id))
                .map(|points| {
                    points
                        .values_mut()
                        .filter_map(|point| point.readdress(address).then_some(()))
                        .count()
                })
                .unwrap_or(0)
        };
        if changed > 0 {
            self.notify_points(entry_id, device_id);
        }
        changed
    }

    /// Forgets every device and point of an entry.
    pub async fn clear_entry(&self, entry_id: &str) {
        self.devices
            .write()
            .await
            .retain(|(entry, _), _| entry != entry_id);
        self.points
            .write()
            .await
            .retain(|(entry, _), _| entry != entry_id);
        self.locks
            .lock()
            .await
            .retain(|(entry, _), _| entry != entry_id);
    }

    fn notify_points(&self, entry_id: &str, device_id: &str) {
        let signal = Signal::PointsChanged {
            device_id: device_id.to_string(),
        };
        self.signals
            .publish(&topics::points(entry_id, device_id), signal.clone());
        self.signals.publish(&topics::entry_points(entry_id), signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bacbridge_core::{BacnetValue, PointType};

    fn cache() -> SharedCache {
        SharedCache::new(Arc::new(SignalBus::new()))
    }

    #[test]
    fn merge_keeps_previous_values_and_sticky_flags() {
        let mut previous = DeviceEntry::new(1001, "10.0.0.5");
        previous.has_device_object = true;
        previous.device.firmware_revision = Some("2.1".into());
        previous.device.object_name = Some("AHU-1".into());
        previous.network.ip_address = Some("10.0.0.5".into());

        let mut failed = DeviceEntry::new(1001, "");
        failed.online = false;
        failed.device.model_name = Some("X200".into());

        let merged = DeviceEntry::merged(Some(&previous), failed);
        assert!(merged.has_device_object);
        assert!(!merged.online);
        assert_eq!(merged.device.firmware_revision.as_deref(), Some("2.1"));
        assert_eq!(merged.device.model_name.as_deref(), Some("X200"));
        assert_eq!(merged.network.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(merged.address, "10.0.0.5");
        assert_eq!(merged.name, "AHU-1");
    }

    #[test]
    fn name_falls_back_to_display_name() {
        let merged = DeviceEntry::merged(None, DeviceEntry::new(42, "a"));
        assert_eq!(merged.name, "BACnet Client 42");
    }

    #[tokio::test]
    async fn point_updates_publish_signals() {
        let cache = cache();
        let mut receiver = cache.signals().subscribe(&topics::points("e", "client_1"));
        let mut entry_receiver = cache.signals().subscribe(&topics::entry_points("e"));

        let point = Point::new(PointType::AnalogValue, 3, 1, "10.0.0.1");
        let mut payload = BTreeMap::new();
        payload.insert(point.key(), point);
        assert_eq!(cache.upsert_points("e", "client_1", payload).await, 1);
        assert!(receiver.try_recv().is_ok());
        assert!(entry_receiver.try_recv().is_ok());

        let changed = cache
            .update_point("e", "client_1", "av_3", |point| {
                point.apply_cov(
                    bacbridge_core::types::PropertyId::PresentValue,
                    &BacnetValue::Real(1.5),
                )
            })
            .await;
        assert_eq!(changed, Some(true));
        assert!(receiver.try_recv().is_ok());
        assert_eq!(cache.update_point("e", "client_1", "av_9", |_| true).await, None);

        assert_eq!(cache.readdress_points("e", "client_1", "10.0.0.2").await, 1);
        assert_eq!(cache.readdress_points("e", "client_1", "10.0.0.2").await, 0);
        assert_eq!(
            cache.point("e", "client_1", "av_3").await.map(|p| p.device_address),
            Some("10.0.0.2".to_string())
        );
    }

    #[tokio::test]
    async fn clearing_an_entry_leaves_other_entries() {
        let cache = cache();
        for entry in ["a", "b"] {
            cache
                .store_device(entry, "client_1", DeviceEntry::new(1, "10.0.0.1"))
                .await;
            let point = Point::new(PointType::BinaryValue, 2, 1, "10.0.0.1");
            let mut payload = BTreeMap::new();
            payload.insert(point.key(), point);
            cache.upsert_points(entry, "client_1", payload).await;
        }

        cache.clear_entry("a").await;
        assert!(cache.device("a", "client_1").await.is_none());
        assert!(cache.points("a", "client_1").await.is_empty());
        assert!(cache.device("b", "client_1").await.is_some());
        assert_eq!(cache.points("b", "client_1").await.len(), 1);
    }

    #[tokio::test]
    async fn device_lock_is_shared_per_device() {
        let cache = cache();
        let first = cache.device_lock("e", "client_1").await;
        let again = cache.device_lock("e", "client_1").await;
        let other = cache.device_lock("e", "client_2").await;
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
    }
}
