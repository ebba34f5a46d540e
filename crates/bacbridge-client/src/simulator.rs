//! In-memory BACnet network.
//!
//! [`SimulatedNetwork`] implements [`BacnetApp`] over a set of simulated
//! devices. It answers Who-Is, ReadProperty, ReadPropertyMultiple,
//! WriteProperty and SubscribeCOV without any datalink, and exposes knobs
//! for the failure modes the bridge has to survive. Useful for tests and
//! for running the bridge without hardware.

use crate::app::{BacnetApp, CovContext, CovRequest, IAm, WhoIsTarget};
use crate::local_object::LocalObject;
use crate::BridgeError;
use async_trait::async_trait;
use bacbridge_core::types::{ObjectId, ObjectType, PropertyId};
use bacbridge_core::BacnetValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

type Properties = HashMap<PropertyId, BacnetValue>;
type Notification = Result<(PropertyId, BacnetValue), BridgeError>;

struct SimDevice {
    address: String,
    offline: bool,
    /// Objects in object-list order; the device object comes first.
    order: Vec<ObjectId>,
    objects: HashMap<ObjectId, Properties>,
}

impl SimDevice {
    fn object_list(&self) -> Vec<BacnetValue> {
        self.order.iter().copied().map(BacnetValue::ObjectId).collect()
    }
}

struct Subscriber {
    device: u32,
    object_id: ObjectId,
    process_id: u32,
    sender: mpsc::UnboundedSender<Notification>,
}

/// A recorded WriteProperty request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub address: String,
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub value: BacnetValue,
    pub priority: Option<u8>,
}

#[derive(Default)]
struct SimState {
    devices: BTreeMap<u32, SimDevice>,
    extra_i_ams: Vec<IAm>,
    drop_default_who_is: bool,
    fail_reads: bool,
    rpm_unsupported: bool,
    cov_unsupported: bool,
    subscribe_failures: usize,
    existing_context_failures: usize,
    subscribers: Vec<Subscriber>,
    writes: Vec<RecordedWrite>,
    published: Vec<Arc<LocalObject>>,
}

/// Simulated BACnet network reachable through [`BacnetApp`].
#[derive(Default)]
pub struct SimulatedNetwork {
    state: Mutex<SimState>,
    who_is_count: AtomicUsize,
    subscribe_count: AtomicUsize,
    live_contexts: Arc<AtomicUsize>,
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a device answering at `address`, with a populated device object.
    pub fn add_device(&self, instance: u32, address: impl Into<String>) {
        let device_id = ObjectId::device(instance);
        let properties: Properties = [
            (PropertyId::ObjectIdentifier, BacnetValue::ObjectId(device_id)),
            (
                PropertyId::ObjectName,
                BacnetValue::CharacterString(format!("SimDevice-{instance}")),
            ),
            (PropertyId::VendorName, BacnetValue::CharacterString("bacbridge".into())),
            (PropertyId::VendorIdentifier, BacnetValue::Unsigned(999)),
            (PropertyId::ModelName, BacnetValue::CharacterString("Simulated Controller".into())),
            (PropertyId::FirmwareRevision, BacnetValue::CharacterString("1.0".into())),
            (
                PropertyId::ApplicationSoftwareVersion,
                BacnetValue::CharacterString("sim".into()),
            ),
            (PropertyId::SystemStatus, BacnetValue::Enumerated(0)),
        ]
        .into_iter()
        .collect();
        self.state().devices.insert(
            instance,
            SimDevice {
                address: address.into(),
                offline: false,
                order: vec![device_id],
                objects: HashMap::from([(device_id, properties)]),
            },
        );
    }

    /// Adds (or replaces) an object on a device and appends it to the
    /// device's object list. Returns false when the device is unknown.
    pub fn insert_object(
        &self,
        device: u32,
        object_id: ObjectId,
        properties: impl IntoIterator<Item = (PropertyId, BacnetValue)>,
    ) -> bool {
        let mut state = self.state();
        let Some(sim) = state.devices.get_mut(&device) else {
            return false;
        };
        let mut properties: Properties = properties.into_iter().collect();
        properties
            .entry(PropertyId::ObjectIdentifier)
            .or_insert(BacnetValue::ObjectId(object_id));
        if !sim.order.contains(&object_id) {
            sim.order.push(object_id);
        }
        sim.objects.insert(object_id, properties);
        true
    }

    /// Adds a BACnet/IP network-port object.
    pub fn add_network_port(&self, device: u32, instance: u32, ip: [u8; 4], udp_port: u16) -> bool {
        self.insert_object(
            device,
            ObjectId::new(ObjectType::NetworkPort, instance),
            [
                (
                    PropertyId::ObjectName,
                    BacnetValue::CharacterString(format!("Port {instance}")),
                ),
                (PropertyId::IpAddress, BacnetValue::OctetString(ip.to_vec())),
                (
                    PropertyId::IpSubnetMask,
                    BacnetValue::OctetString(vec![255, 255, 255, 0]),
                ),
                (PropertyId::BacnetIpUdpPort, BacnetValue::Unsigned(u32::from(udp_port))),
            ],
        )
    }

    /// Makes the device report an empty object list while its objects stay
    /// readable, as some controllers do right after a restart.
    pub fn clear_object_list(&self, device: u32) -> bool {
        match self.state().devices.get_mut(&device) {
            Some(sim) => {
                sim.order.clear();
                true
            }
            None => false,
        }
    }

    pub fn set_property(&self, device: u32, object_id: ObjectId, property_id: PropertyId, value: BacnetValue) {
        if let Some(properties) = self
            .state()
            .devices
            .get_mut(&device)
            .and_then(|sim| sim.objects.get_mut(&object_id))
        {
            properties.insert(property_id, value);
        }
    }

    pub fn property(&self, device: u32, object_id: ObjectId, property_id: PropertyId) -> Option<BacnetValue> {
        self.state()
            .devices
            .get(&device)?
            .objects
            .get(&object_id)?
            .get(&property_id)
            .cloned()
    }

    /// Moves a device to a new address.
    pub fn set_address(&self, device: u32, address: impl Into<String>) {
        if let Some(sim) = self.state().devices.get_mut(&device) {
            sim.address = address.into();
        }
    }

    /// An offline device ignores Who-Is and times out every request.
    pub fn set_offline(&self, device: u32, offline: bool) {
        if let Some(sim) = self.state().devices.get_mut(&device) {
            sim.offline = offline;
        }
    }

    /// Makes the default Who-Is go unanswered, forcing the global fallback.
    pub fn set_drop_default_who_is(&self, drop: bool) {
        self.state().drop_default_who_is = drop;
    }

    /// Makes every ReadProperty and ReadPropertyMultiple time out.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    pub fn set_rpm_supported(&self, supported: bool) {
        self.state().rpm_unsupported = !supported;
    }

    pub fn set_cov_supported(&self, supported: bool) {
        self.state().cov_unsupported = !supported;
    }

    /// The next `count` SubscribeCOV requests time out.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.state().subscribe_failures = count;
    }

    /// The next `count` SubscribeCOV requests report an existing context.
    pub fn reject_next_subscribes_as_existing(&self, count: usize) {
        self.state().existing_context_failures = count;
    }

    /// Adds a raw I-Am to every Who-Is answer.
    pub fn inject_i_am(&self, i_am: IAm) {
        self.state().extra_i_ams.push(i_am);
    }

    /// Sends a COV notification to every open subscription of the object
    /// and stores the value. Returns how many subscriptions received it.
    pub fn notify(&self, device: u32, object_id: ObjectId, property_id: PropertyId, value: BacnetValue) -> usize {
        self.set_property(device, object_id, property_id, value.clone());
        let mut state = self.state();
        state.subscribers.retain(|sub| !sub.sender.is_closed());
        state
            .subscribers
            .iter()
            .filter(|sub| sub.device == device && sub.object_id == object_id)
            .filter(|sub| sub.sender.send(Ok((property_id, value.clone()))).is_ok())
            .count()
    }

    /// Breaks every open subscription of the object with `error`.
    pub fn fail_subscriptions(&self, device: u32, object_id: ObjectId, error: impl Fn() -> BridgeError) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|sub| !sub.sender.is_closed());
        state
            .subscribers
            .iter()
            .filter(|sub| sub.device == device && sub.object_id == object_id)
            .filter(|sub| sub.sender.send(Err(error())).is_ok())
            .count()
    }

    /// Process identifiers of the open subscriptions of an object.
    pub fn subscriber_process_ids(&self, device: u32, object_id: ObjectId) -> Vec<u32> {
        self.state()
            .subscribers
            .iter()
            .filter(|sub| !sub.sender.is_closed())
            .filter(|sub| sub.device == device && sub.object_id == object_id)
            .map(|sub| sub.process_id)
            .collect()
    }

    /// Contexts handed out and not yet closed.
    pub fn live_contexts(&self) -> usize {
        self.live_contexts.load(Ordering::SeqCst)
    }

    pub fn who_is_count(&self) -> usize {
        self.who_is_count.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state().writes.clone()
    }

    /// Objects registered through [`BacnetApp::add_object`].
    pub fn published(&self) -> Vec<Arc<LocalObject>> {
        self.state().published.clone()
    }

    pub fn published_object(&self, object_id: ObjectId) -> Option<Arc<LocalObject>> {
        self.state()
            .published
            .iter()
            .find(|object| object.object_id() == object_id)
            .cloned()
    }

    /// Simulates a remote client writing the present value of a published
    /// object. Returns false when no such object exists.
    pub fn remote_write(&self, object_id: ObjectId, value: BacnetValue) -> bool {
        let Some(object) = self.published_object(object_id) else {
            return false;
        };
        object.write_present_value(value);
        true
    }

    fn reachable<'a>(state: &'a SimState, address: &str, device: u32) -> Result<&'a SimDevice, BridgeError> {
        match state.devices.get(&device) {
            Some(sim) if !sim.offline && sim.address == address => Ok(sim),
            _ => Err(BridgeError::Timeout),
        }
    }

    fn read(
        state: &SimState,
        address: &str,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: Option<u32>,
    ) -> Result<BacnetValue, BridgeError> {
        if state.fail_reads {
            return Err(BridgeError::Timeout);
        }
        let device = owning_device(state, address, object_id)?;
        let sim = Self::reachable(state, address, device)?;
        let properties = sim
            .objects
            .get(&object_id)
            .ok_or_else(|| BridgeError::Remote("unknown-object".into()))?;

        if object_id.object_type() == ObjectType::Device && property_id == PropertyId::ObjectList {
            let list = sim.object_list();
            return match array_index {
                None => Ok(BacnetValue::List(list)),
                Some(0) => Ok(BacnetValue::Unsigned(list.len() as u32)),
                Some(index) => list
                    .get(index as usize - 1)
                    .cloned()
                    .ok_or_else(|| BridgeError::Remote("invalid-array-index".into())),
            };
        }
        let value = properties
            .get(&property_id)
            .cloned()
            .ok_or_else(|| BridgeError::Remote("unknown-property".into()))?;
        match (array_index, value) {
            (None, value) => Ok(value),
            (Some(0), BacnetValue::List(items)) => Ok(BacnetValue::Unsigned(items.len() as u32)),
            (Some(index), BacnetValue::List(items)) => items
                .get(index as usize - 1)
                .cloned()
                .ok_or_else(|| BridgeError::Remote("invalid-array-index".into())),
            (Some(_), _) => Err(BridgeError::Remote("property-is-not-an-array".into())),
        }
    }
}

/// Device instance owning `object_id` at `address`.
fn owning_device(state: &SimState, address: &str, object_id: ObjectId) -> Result<u32, BridgeError> {
    if object_id.object_type() == ObjectType::Device {
        return Ok(object_id.instance());
    }
    state
        .devices
        .iter()
        .find(|(_, sim)| sim.address == address)
        .map(|(instance, _)| *instance)
        .ok_or(BridgeError::Timeout)
}

#[async_trait]
impl BacnetApp for SimulatedNetwork {
    async fn who_is(&self, target: WhoIsTarget, _wait: Duration) -> Result<Vec<IAm>, BridgeError> {
        self.who_is_count.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        if target == WhoIsTarget::Default && state.drop_default_who_is {
            return Ok(Vec::new());
        }
        let mut answers: Vec<IAm> = state
            .devices
            .iter()
            .filter(|(_, sim)| !sim.offline)
            .map(|(instance, sim)| IAm::new(*instance, sim.address.clone()))
            .collect();
        answers.extend(state.extra_i_ams.iter().cloned());
        Ok(answers)
    }

    async fn read_property(
        &self,
        address: &str,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: Option<u32>,
    ) -> Result<BacnetValue, BridgeError> {
        Self::read(&self.state(), address, object_id, property_id, array_index)
    }

    async fn read_property_multiple(
        &self,
        address: &str,
        object_id: ObjectId,
        property_ids: &[PropertyId],
    ) -> Result<Vec<(PropertyId, BacnetValue)>, BridgeError> {
        let state = self.state();
        if state.rpm_unsupported {
            return Err(BridgeError::Unsupported("read-property-multiple"));
        }
        if state.fail_reads {
            return Err(BridgeError::Timeout);
        }
        let device = owning_device(&state, address, object_id)?;
        let sim = Self::reachable(&state, address, device)?;
        let properties = sim
            .objects
            .get(&object_id)
            .ok_or_else(|| BridgeError::Remote("unknown-object".into()))?;
        Ok(property_ids
            .iter()
            .map(|prop| (*prop, properties.get(prop).cloned().unwrap_or(BacnetValue::Null)))
            .collect())
    }

    async fn write_property(
        &self,
        address: &str,
        object_id: ObjectId,
        property_id: PropertyId,
        value: BacnetValue,
        priority: Option<u8>,
    ) -> Result<(), BridgeError> {
        let mut state = self.state();
        let device = owning_device(&state, address, object_id)?;
        Self::reachable(&state, address, device)?;
        let properties = state
            .devices
            .get_mut(&device)
            .and_then(|sim| sim.objects.get_mut(&object_id))
            .ok_or_else(|| BridgeError::Remote("unknown-object".into()))?;
        properties.insert(property_id, value.clone());
        state.writes.push(RecordedWrite {
            address: address.to_string(),
            object_id,
            property_id,
            value,
            priority,
        });
        Ok(())
    }

    async fn subscribe_cov(&self, request: CovRequest) -> Result<Box<dyn CovContext>, BridgeError> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if state.cov_unsupported {
            return Err(BridgeError::Unsupported("subscribe-cov"));
        }
        if state.existing_context_failures > 0 {
            state.existing_context_failures -= 1;
            return Err(BridgeError::ExistingContext);
        }
        if state.subscribe_failures > 0 {
            state.subscribe_failures -= 1;
            return Err(BridgeError::Timeout);
        }
        let device = owning_device(&state, &request.address, request.object_id)?;
        let sim = Self::reachable(&state, &request.address, device)?;
        if !sim.objects.contains_key(&request.object_id) {
            return Err(BridgeError::Remote("unknown-object".into()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscribers.push(Subscriber {
            device,
            object_id: request.object_id,
            process_id: request.subscriber_process_id,
            sender,
        });
        self.live_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedContext {
            receiver,
            live: Arc::clone(&self.live_contexts),
            closed: false,
        }))
    }

    fn add_object(&self, object: Arc<LocalObject>) -> Result<(), BridgeError> {
        let mut state = self.state();
        let object_id = object.object_id();
        if state.published.iter().any(|existing| existing.object_id() == object_id) {
            return Err(BridgeError::Remote(format!("{object_id} already exists")));
        }
        state.published.push(object);
        Ok(())
    }
}

struct SimulatedContext {
    receiver: mpsc::UnboundedReceiver<Notification>,
    live: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl CovContext for SimulatedContext {
    async fn next_value(&mut self) -> Result<(PropertyId, BacnetValue), BridgeError> {
        match self.receiver.recv().await {
            Some(notification) => notification,
            None => Err(BridgeError::Network("subscription closed".into())),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.receiver.close();
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::SimulatedNetwork;
    use crate::app::{BacnetApp, CovContext, CovRequest, WhoIsTarget};
    use crate::BridgeError;
    use bacbridge_core::types::{ObjectId, ObjectType, PropertyId};
    use bacbridge_core::BacnetValue;
    use std::time::Duration;

    fn network() -> SimulatedNetwork {
        let sim = SimulatedNetwork::new();
        sim.add_device(1001, "10.0.0.5");
        sim.insert_object(
            1001,
            ObjectId::new(ObjectType::AnalogInput, 5),
            [(PropertyId::PresentValue, BacnetValue::Real(72.3))],
        );
        sim
    }

    #[tokio::test]
    async fn object_list_is_an_array() {
        let sim = network();
        let device = ObjectId::device(1001);
        let len = sim
            .read_property("10.0.0.5", device, PropertyId::ObjectList, Some(0))
            .await
            .unwrap();
        assert_eq!(len, BacnetValue::Unsigned(2));
        let second = sim
            .read_property("10.0.0.5", device, PropertyId::ObjectList, Some(2))
            .await
            .unwrap();
        assert_eq!(second, BacnetValue::ObjectId(ObjectId::new(ObjectType::AnalogInput, 5)));
        assert!(sim
            .read_property("10.0.0.5", device, PropertyId::ObjectList, Some(3))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn wrong_address_times_out() {
        let sim = network();
        let err = sim
            .read_property("10.0.0.9", ObjectId::device(1001), PropertyId::ObjectName, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout));
    }

    #[tokio::test]
    async fn default_who_is_can_be_dropped() {
        let sim = network();
        sim.set_drop_default_who_is(true);
        let wait = Duration::from_millis(10);
        assert!(sim.who_is(WhoIsTarget::Default, wait).await.unwrap().is_empty());
        assert_eq!(sim.who_is(WhoIsTarget::GlobalBroadcast, wait).await.unwrap().len(), 1);
        assert_eq!(sim.who_is_count(), 2);
    }

    #[tokio::test]
    async fn contexts_count_until_closed() {
        let sim = network();
        let object_id = ObjectId::new(ObjectType::AnalogInput, 5);
        let mut context = sim
            .subscribe_cov(CovRequest {
                address: "10.0.0.5".into(),
                object_id,
                subscriber_process_id: 7,
                issue_confirmed: false,
                lifetime_seconds: 300,
            })
            .await
            .unwrap();
        assert_eq!(sim.live_contexts(), 1);
        assert_eq!(sim.subscriber_process_ids(1001, object_id), vec![7]);

        assert_eq!(sim.notify(1001, object_id, PropertyId::PresentValue, BacnetValue::Real(70.0)), 1);
        let (prop, value) = context.next_value().await.unwrap();
        assert_eq!(prop, PropertyId::PresentValue);
        assert_eq!(value, BacnetValue::Real(70.0));

        context.close().await;
        context.close().await;
        assert_eq!(sim.live_contexts(), 0);
        assert!(sim.subscriber_process_ids(1001, object_id).is_empty());
    }
}
