//! Locally served BACnet objects mirroring host entities.

use crate::mapping::{Mapping, PublishedType};
use bacbridge_core::codec::binary_present_value;
use bacbridge_core::types::units::default_cov_increment;
use bacbridge_core::types::{EngineeringUnits, ObjectId, ObjectType};
use bacbridge_core::BacnetValue;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback run after a present-value write that did not originate from the
/// host.
pub type PresentValueHook = Arc<dyn Fn(ObjectId, &BacnetValue) + Send + Sync>;

/// One object served by the local BACnet device.
///
/// Present-value writes from the network go through
/// [`write_present_value`](Self::write_present_value) and fire the hook;
/// host-originated updates go through [`apply_guarded`](Self::apply_guarded)
/// and never do.
pub struct LocalObject {
    object_id: ObjectId,
    object_name: String,
    description: Mutex<String>,
    units: Option<EngineeringUnits>,
    cov_increment: Option<f32>,
    state_text: Vec<String>,
    present_value: Mutex<BacnetValue>,
    guard: AtomicBool,
    host_writes: AtomicUsize,
    hook: Mutex<Option<PresentValueHook>>,
}

impl fmt::Debug for LocalObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalObject")
            .field("object_id", &self.object_id)
            .field("object_name", &self.object_name)
            .field("units", &self.units)
            .field("present_value", &self.present_value())
            .finish_non_exhaustive()
    }
}

impl LocalObject {
    pub fn new(object_id: ObjectId, object_name: impl Into<String>, present_value: BacnetValue) -> Self {
        Self {
            object_id,
            object_name: object_name.into(),
            description: Mutex::new(String::new()),
            units: None,
            cov_increment: None,
            state_text: Vec::new(),
            present_value: Mutex::new(present_value),
            guard: AtomicBool::new(false),
            host_writes: AtomicUsize::new(0),
            hook: Mutex::new(None),
        }
    }

    /// Builds the object for `mapping`.
    ///
    /// Analog objects take their units from the mapping, else from
    /// `host_uom` (the entity's unit of measurement), and a change-of-value
    /// increment from the mapping or a per-unit default. Multi-state objects
    /// serve the mapping's labels, at least `off`/`on`.
    pub fn from_mapping(mapping: &Mapping, host_uom: Option<&str>, description: impl Into<String>) -> Self {
        let object_id = ObjectId::new(mapping.object_type.object_type(), mapping.instance);
        let initial = match mapping.object_type {
            PublishedType::AnalogValue => BacnetValue::Real(0.0),
            PublishedType::BinaryValue => binary_present_value(false),
            PublishedType::MultiStateValue => BacnetValue::Unsigned(1),
        };
        let mut object = Self::new(object_id, mapping.object_name(), initial);
        object.description = Mutex::new(description.into());
        match mapping.object_type {
            PublishedType::AnalogValue => {
                let uom = mapping
                    .units
                    .as_deref()
                    .filter(|units| !units.trim().is_empty())
                    .or(host_uom);
                object.units = uom.and_then(EngineeringUnits::from_host_uom);
                if uom.is_some() && object.units.is_none() {
                    log::debug!("no engineering unit for {uom:?} on {}", object.object_name);
                }
                object.cov_increment = Some(mapping.cov_increment.unwrap_or_else(|| default_cov_increment(uom)));
            }
            PublishedType::MultiStateValue => object.state_text = mapping.state_labels(),
            PublishedType::BinaryValue => {}
        }
        object
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_id.object_type()
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn units(&self) -> Option<EngineeringUnits> {
        self.units
    }

    pub fn cov_increment(&self) -> Option<f32> {
        self.cov_increment
    }

    pub fn state_text(&self) -> &[String] {
        &self.state_text
    }

    pub fn number_of_states(&self) -> Option<u32> {
        (!self.state_text.is_empty()).then(|| self.state_text.len() as u32)
    }

    pub fn description(&self) -> String {
        self.description
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns whether the description changed.
    pub fn set_description(&self, description: &str) -> bool {
        let mut current = self.description.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == description {
            return false;
        }
        *current = description.to_string();
        true
    }

    pub fn present_value(&self) -> BacnetValue {
        self.present_value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_hook(&self, hook: PresentValueHook) {
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    pub fn clear_hook(&self) {
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Present-value write from the network. Runs the hook unless a host
    /// update is being applied at the same time.
    pub fn write_present_value(&self, value: BacnetValue) {
        *self.present_value.lock().unwrap_or_else(PoisonError::into_inner) = value.clone();
        if self.guard.load(Ordering::SeqCst) {
            log::trace!("{} written during host update, not forwarded", self.object_id);
            return;
        }
        let hook = self.hook.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(hook) = hook {
            hook(self.object_id, &value);
        }
    }

    /// Host-originated present-value update. Suppresses the hook while the
    /// value is stored.
    pub fn apply_guarded(&self, value: BacnetValue) {
        self.guard.store(true, Ordering::SeqCst);
        *self.present_value.lock().unwrap_or_else(PoisonError::into_inner) = value;
        self.host_writes.fetch_add(1, Ordering::Relaxed);
        self.guard.store(false, Ordering::SeqCst);
    }

    pub fn is_guarded(&self) -> bool {
        self.guard.load(Ordering::SeqCst)
    }

    /// How many host-originated updates were stored.
    pub fn host_writes(&self) -> usize {
        self.host_writes.load(Ordering::Relaxed)
    }
}
