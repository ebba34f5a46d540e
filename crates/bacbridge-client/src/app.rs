//! Boundary to the BACnet protocol engine.
//!
//! The bridge never encodes frames itself. Everything it needs from the
//! network goes through [`BacnetApp`], and every change-of-value
//! subscription is a [`CovContext`] that the bridge owns exclusively until it
//! calls [`CovContext::close`].

use crate::local_object::LocalObject;
use crate::BridgeError;
use async_trait::async_trait;
use bacbridge_core::types::object_id::MAX_INSTANCE;
use bacbridge_core::types::{ObjectId, ObjectType, PropertyId};
use bacbridge_core::BacnetValue;
use std::sync::Arc;
use std::time::Duration;

/// Scope of a Who-Is request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhoIsTarget {
    /// The engine's default (local) broadcast.
    Default,
    /// Global broadcast across all networks (`*:*`).
    GlobalBroadcast,
}

/// One I-Am response as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct IAm {
    /// Device identifier as decoded by the engine; usually an object id, but
    /// some stacks hand over text or bare numbers.
    pub device_identifier: BacnetValue,
    /// Source address of the response.
    pub source: Option<String>,
}

impl IAm {
    pub fn new(instance: u32, source: impl Into<String>) -> Self {
        Self {
            device_identifier: BacnetValue::ObjectId(ObjectId::device(instance)),
            source: Some(source.into()),
        }
    }

    pub fn device_instance(&self) -> Option<u32> {
        device_instance_from_identifier(&self.device_identifier)
    }
}

/// Extracts a device instance from the many shapes a device identifier
/// takes: an object id, `device,1001` / `device:1001` text, a bare number or a
/// `[type, instance]` pair.
pub fn device_instance_from_identifier(value: &BacnetValue) -> Option<u32> {
    let instance = match value {
        BacnetValue::ObjectId(id) if id.object_type() == ObjectType::Device => id.instance(),
        BacnetValue::Unsigned(instance) => *instance,
        BacnetValue::CharacterString(text) => {
            let text = text.trim();
            if let Ok(id) = text.parse::<ObjectId>() {
                return (id.object_type() == ObjectType::Device).then_some(id.instance());
            }
            let digits: String = text
                .chars()
                .rev()
                .take_while(char::is_ascii_digit)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let prefix = text[..text.len() - digits.len()].trim();
            let prefix_ok = prefix.is_empty()
                || prefix
                    .trim_end_matches([',', ':'])
                    .trim()
                    .eq_ignore_ascii_case("device");
            if !prefix_ok {
                return None;
            }
            digits.parse().ok()?
        }
        BacnetValue::List(items) if items.len() == 2 => items[1].as_u32()?,
        _ => return None,
    };
    (instance <= MAX_INSTANCE).then_some(instance)
}

/// Parameters of a SubscribeCOV request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovRequest {
    pub address: String,
    pub object_id: ObjectId,
    pub subscriber_process_id: u32,
    pub issue_confirmed: bool,
    pub lifetime_seconds: u32,
}

/// An open change-of-value subscription.
#[async_trait]
pub trait CovContext: Send {
    /// Waits for the next `(property, value)` notification. An error ends the
    /// subscription.
    async fn next_value(&mut self) -> Result<(PropertyId, BacnetValue), BridgeError>;

    /// Releases the subscription. Implementations must cancel every task,
    /// timer or handle they own before returning; calling `close` twice is
    /// allowed.
    async fn close(&mut self);
}

/// The BACnet protocol engine as seen by the bridge.
#[async_trait]
pub trait BacnetApp: Send + Sync {
    /// Broadcasts Who-Is and collects I-Am responses for `wait`.
    async fn who_is(&self, target: WhoIsTarget, wait: Duration) -> Result<Vec<IAm>, BridgeError>;

    async fn read_property(
        &self,
        address: &str,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: Option<u32>,
    ) -> Result<BacnetValue, BridgeError>;

    /// Reads several properties of one object. Properties the device answers
    /// with an error come back as [`BacnetValue::Null`].
    async fn read_property_multiple(
        &self,
        _address: &str,
        _object_id: ObjectId,
        _property_ids: &[PropertyId],
    ) -> Result<Vec<(PropertyId, BacnetValue)>, BridgeError> {
        Err(BridgeError::Unsupported("read-property-multiple"))
    }

    async fn write_property(
        &self,
        address: &str,
        object_id: ObjectId,
        property_id: PropertyId,
        value: BacnetValue,
        priority: Option<u8>,
    ) -> Result<(), BridgeError>;

    /// Opens a change-of-value subscription. Fails with
    /// [`BridgeError::ExistingContext`] when the engine already holds a
    /// context for the same process identifier and object.
    async fn subscribe_cov(&self, _request: CovRequest) -> Result<Box<dyn CovContext>, BridgeError> {
        Err(BridgeError::Unsupported("subscribe-cov"))
    }

    /// Registers a locally served object.
    fn add_object(&self, object: Arc<LocalObject>) -> Result<(), BridgeError>;
}

#[cfg(test)]
mod tests {
    use super::{device_instance_from_identifier, IAm};
    use bacbridge_core::types::{ObjectId, ObjectType};
    use bacbridge_core::BacnetValue;

    #[test]
    fn device_instances_from_various_shapes() {
        assert_eq!(IAm::new(1001, "10.0.0.5").device_instance(), Some(1001));
        assert_eq!(device_instance_from_identifier(&"device,77".into()), Some(77));
        assert_eq!(device_instance_from_identifier(&"Device: 78".into()), Some(78));
        assert_eq!(device_instance_from_identifier(&"79".into()), Some(79));
        assert_eq!(device_instance_from_identifier(&BacnetValue::Unsigned(80)), Some(80));
        assert_eq!(
            device_instance_from_identifier(&BacnetValue::List(vec![
                BacnetValue::Enumerated(8),
                BacnetValue::Unsigned(81),
            ])),
            Some(81)
        );
    }

    #[test]
    fn rejects_non_device_identifiers() {
        let analog = BacnetValue::ObjectId(ObjectId::new(ObjectType::AnalogInput, 5));
        assert_eq!(device_instance_from_identifier(&analog), None);
        assert_eq!(device_instance_from_identifier(&"analog-input,5".into()), None);
        assert_eq!(device_instance_from_identifier(&"garbage".into()), None);
        assert_eq!(device_instance_from_identifier(&BacnetValue::Null), None);
        assert_eq!(device_instance_from_identifier(&BacnetValue::Unsigned(5_000_000)), None);
    }
}
