//! Timed property access on top of a [`BacnetApp`].

use crate::app::BacnetApp;
use crate::config::BridgeConfig;
use crate::BridgeError;
use bacbridge_core::types::{ObjectId, PropertyId};
use bacbridge_core::BacnetValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Wraps every BACnet request in a timeout and remembers when the engine
/// lacks ReadPropertyMultiple so later bulk reads go straight to single reads.
pub struct PropertyReader {
    app: Arc<dyn BacnetApp>,
    config: BridgeConfig,
    rpm_unsupported: AtomicBool,
}

impl PropertyReader {
    pub fn new(app: Arc<dyn BacnetApp>, config: BridgeConfig) -> Self {
        Self {
            app,
            config,
            rpm_unsupported: AtomicBool::new(false),
        }
    }

    pub fn app(&self) -> &Arc<dyn BacnetApp> {
        &self.app
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub async fn read(
        &self,
        address: &str,
        object_id: ObjectId,
        property_id: PropertyId,
    ) -> Result<BacnetValue, BridgeError> {
        self.read_with(address, object_id, property_id, None, self.config.read_timeout())
            .await
    }

    pub async fn read_with(
        &self,
        address: &str,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: Option<u32>,
        wait: Duration,
    ) -> Result<BacnetValue, BridgeError> {
        timeout(
            wait,
            self.app
                .read_property(address, object_id, property_id, array_index),
        )
        .await?
    }

    /// Reads a single property, folding every failure into `None`.
    pub async fn read_optional(
        &self,
        address: &str,
        object_id: ObjectId,
        property_id: PropertyId,
    ) -> Option<BacnetValue> {
        match self.read(address, object_id, property_id).await {
            Ok(value) if !value.is_null() => Some(value),
            Ok(_) => None,
            Err(err) => {
                log::debug!("read {object_id} {property_id} at {address} failed: {err}");
                None
            }
        }
    }

    /// Reads several properties of one object.
    ///
    /// Uses ReadPropertyMultiple when the engine supports it and falls back
    /// to one read per property for whatever the bulk read did not return.
    /// Unreadable properties are absent from the result.
    pub async fn read_many(
        &self,
        address: &str,
        object_id: ObjectId,
        properties: &[PropertyId],
    ) -> HashMap<PropertyId, BacnetValue> {
        let mut unique: Vec<PropertyId> = Vec::with_capacity(properties.len());
        for prop in properties {
            if !unique.contains(prop) {
                unique.push(*prop);
            }
        }

        let mut result = HashMap::new();
        let mut answered = Vec::new();
        if !self.rpm_unsupported.load(Ordering::Relaxed) {
            let bulk = timeout(
                self.config.bulk_read_timeout(),
                self.app.read_property_multiple(address, object_id, &unique),
            )
            .await
            .map_err(BridgeError::from)
            .and_then(|inner| inner);
            match bulk {
                Ok(values) => {
                    for (prop, value) in values {
                        if !unique.contains(&prop) {
                            continue;
                        }
                        answered.push(prop);
                        if !value.is_null() {
                            result.insert(prop, value);
                        }
                    }
                }
                Err(err) if err.is_capability_absence() => {
                    log::debug!("read-property-multiple unavailable, using single reads: {err}");
                    self.rpm_unsupported.store(true, Ordering::Relaxed);
                }
                Err(err) => {
                    log::debug!("read-property-multiple {object_id} at {address} failed: {err}");
                }
            }
        }

        for prop in unique {
            if answered.contains(&prop) {
                continue;
            }
            if let Some(value) = self.read_optional(address, object_id, prop).await {
                result.insert(prop, value);
            }
        }
        result
    }

    pub async fn write(
        &self,
        address: &str,
        object_id: ObjectId,
        property_id: PropertyId,
        value: BacnetValue,
        priority: Option<u8>,
    ) -> Result<(), BridgeError> {
        timeout(
            self.config.write_timeout(),
            self.app
                .write_property(address, object_id, property_id, value, priority),
        )
        .await?
    }
}
