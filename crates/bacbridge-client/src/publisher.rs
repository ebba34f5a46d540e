//! Publisher: serves host entities as local BACnet objects and keeps both
//! sides in sync.

use crate::app::BacnetApp;
use crate::host::{HostPlatform, StateChange};
use crate::local_object::LocalObject;
use crate::mapping::{Mapping, PublishedType, WriteAction};
use crate::writeback;
use bacbridge_core::codec::{
    as_float, binary_present_value, hvac_action_is_active, hvac_mode_is_on, multistate_index, truthy,
};
use bacbridge_core::types::ObjectId;
use bacbridge_core::{BacnetValue, HostValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// Present value a mapping asks for, `None` when the host value cannot be
/// represented (never a fabricated zero).
pub fn desired_value(mapping: &Mapping, value: &HostValue) -> Option<BacnetValue> {
    if value.is_null() && mapping.object_type != PublishedType::BinaryValue {
        return None;
    }
    match mapping.object_type {
        PublishedType::AnalogValue => as_float(value).map(|v| BacnetValue::Real(v as f32)),
        PublishedType::MultiStateValue => Some(BacnetValue::Unsigned(multistate_index(
            &mapping.state_labels(),
            &value.to_string(),
        ))),
        PublishedType::BinaryValue => {
            let reads_action = [mapping.read_attr.as_deref(), mapping.source_attr.as_deref()]
                .into_iter()
                .flatten()
                .any(|attr| attr.trim().eq_ignore_ascii_case("hvac_action"));
            let on = if mapping.write_action == Some(WriteAction::ClimateHvacMode) {
                hvac_mode_is_on(value, mapping.on_mode())
            } else if reads_action {
                hvac_action_is_active(value)
            } else {
                truthy(value)
            };
            Some(binary_present_value(on))
        }
    }
}

/// Whether `current` already holds `desired` for this kind of object.
fn unchanged(object_type: PublishedType, current: &BacnetValue, desired: &BacnetValue) -> bool {
    match object_type {
        PublishedType::AnalogValue => match (current.as_f64(), desired.as_f64()) {
            (Some(current), Some(desired)) => current == desired,
            _ => false,
        },
        PublishedType::MultiStateValue => match (current.as_u32(), desired.as_u32()) {
            (Some(current), Some(desired)) => current == desired,
            _ => false,
        },
        PublishedType::BinaryValue => current == desired || current.to_string() == desired.to_string(),
    }
}

/// Applies a host value to a published object. Returns whether the present
/// value was written.
pub fn apply_from_host(object: &LocalObject, mapping: &Mapping, value: &HostValue) -> bool {
    let Some(desired) = desired_value(mapping, value) else {
        log::debug!("{}: {value:?} has no {:?} form, skipped", mapping.source_key(), mapping.object_type);
        return false;
    };
    if unchanged(mapping.object_type, &object.present_value(), &desired) {
        return false;
    }
    log::debug!("{} -> {} = {desired}", mapping.source_key(), object.object_id());
    object.apply_guarded(desired);
    true
}

struct Published {
    mapping: Mapping,
    object: Arc<LocalObject>,
}

#[derive(Default)]
struct Registry {
    by_source: BTreeMap<String, Published>,
    sources_by_entity: BTreeMap<String, Vec<String>>,
    source_by_object: HashMap<ObjectId, String>,
}

impl Registry {
    fn apply_change(&self, change: &StateChange) -> usize {
        let Some(state) = &change.new_state else {
            return 0;
        };
        let Some(sources) = self.sources_by_entity.get(&change.entity_id) else {
            return 0;
        };
        sources
            .iter()
            .filter_map(|source| self.by_source.get(source))
            .filter(|published| {
                apply_from_host(&published.object, &published.mapping, &published.mapping.source_value(state))
            })
            .count()
    }
}

/// Mirrors host entities into local BACnet objects.
pub struct Publisher {
    app: Arc<dyn BacnetApp>,
    host: Arc<dyn HostPlatform>,
    mappings: Vec<Mapping>,
    registry: Arc<Mutex<Registry>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Publisher {
    pub fn new(app: Arc<dyn BacnetApp>, host: Arc<dyn HostPlatform>, mappings: Vec<Mapping>) -> Self {
        Self {
            app,
            host,
            mappings,
            registry: Arc::new(Mutex::new(Registry::default())),
            listener: Mutex::new(None),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates one object per mapping (first mapping wins per source key),
    /// pushes the current host values, then follows host state changes.
    /// Returns how many objects are published.
    pub async fn start(&self) -> usize {
        for mapping in &self.mappings {
            if mapping.entity_id.trim().is_empty() {
                continue;
            }
            let source_key = mapping.source_key();
            if self.registry().by_source.contains_key(&source_key) {
                log::debug!("skipping duplicate source mapping {source_key}");
                continue;
            }

            let state = self.host.state(&mapping.entity_id);
            let description = mapping
                .friendly_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| mapping.describe(state.as_ref()));
            let uom = state
                .as_ref()
                .and_then(|state| state.attr("unit_of_measurement"))
                .map(ToString::to_string);
            let object = Arc::new(LocalObject::from_mapping(mapping, uom.as_deref(), description));

            let host = Arc::clone(&self.host);
            let forwarded = mapping.clone();
            object.set_hook(Arc::new(move |_: ObjectId, value: &BacnetValue| {
                writeback::forward_to_host(host.as_ref(), &forwarded, value);
            }));

            if let Err(err) = self.app.add_object(Arc::clone(&object)) {
                log::warn!("could not publish {source_key}: {err}");
                continue;
            }
            log::info!(
                "published {} <= {source_key} (name={:?}, units={:?})",
                object.object_id(),
                object.object_name(),
                object.units()
            );

            let mut registry = self.registry();
            registry
                .sources_by_entity
                .entry(mapping.entity_id.clone())
                .or_default()
                .push(source_key.clone());
            registry
                .source_by_object
                .insert(object.object_id(), source_key.clone());
            registry.by_source.insert(
                source_key,
                Published {
                    mapping: mapping.clone(),
                    object,
                },
            );
        }

        self.initial_sync();

        let entity_ids: Vec<String> = self.registry().sources_by_entity.keys().cloned().collect();
        let mut changes = self.host.subscribe_state_changes(&entity_ids);
        let registry = Arc::clone(&self.registry);
        let listener = tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                let written = registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .apply_change(&change);
                log::trace!("{} changed, {written} object(s) written", change.entity_id);
            }
        });
        if let Some(previous) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(listener)
        {
            previous.abort();
        }

        let count = self.registry().by_source.len();
        log::info!("publisher running with {count} mapping(s)");
        count
    }

    fn initial_sync(&self) {
        let registry = self.registry();
        for published in registry.by_source.values() {
            if let Some(state) = self.host.state(&published.mapping.entity_id) {
                apply_from_host(
                    &published.object,
                    &published.mapping,
                    &published.mapping.source_value(&state),
                );
            }
        }
    }

    /// Stops following host changes and forgets every object.
    pub async fn stop(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.abort();
            if let Err(err) = listener.await {
                if err.is_panic() {
                    log::error!("publisher listener panicked: {err}");
                }
            }
        }
        let mut registry = self.registry();
        for published in registry.by_source.values() {
            published.object.clear_hook();
        }
        *registry = Registry::default();
        log::info!("publisher stopped");
    }

    /// Refreshes object descriptions from the current friendly names.
    /// Returns how many changed.
    pub fn update_descriptions(&self) -> usize {
        let registry = self.registry();
        registry
            .by_source
            .values()
            .filter(|published| {
                let state = self.host.state(&published.mapping.entity_id);
                published
                    .object
                    .set_description(&published.mapping.describe(state.as_ref()))
            })
            .count()
    }

    /// Guard for the BACnet write handler: whether a write to `object_id`
    /// may be accepted and forwarded right now.
    pub fn is_writable(&self, object_id: ObjectId) -> bool {
        let registry = self.registry();
        registry
            .source_by_object
            .get(&object_id)
            .and_then(|source| registry.by_source.get(source))
            .is_some_and(|published| writeback::is_auto_writable(self.host.as_ref(), &published.mapping))
    }

    pub fn object(&self, object_id: ObjectId) -> Option<Arc<LocalObject>> {
        let registry = self.registry();
        let source = registry.source_by_object.get(&object_id)?;
        registry
            .by_source
            .get(source)
            .map(|published| Arc::clone(&published.object))
    }

    pub fn object_for_source(&self, source_key: &str) -> Option<Arc<LocalObject>> {
        self.registry()
            .by_source
            .get(source_key)
            .map(|published| Arc::clone(&published.object))
    }

    pub fn len(&self) -> usize {
        self.registry().by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_from_host, desired_value};
    use crate::local_object::LocalObject;
    use crate::mapping::{Mapping, PublishedType, WriteAction};
    use bacbridge_core::{BacnetValue, HostValue};

    #[test]
    fn analog_dedupes_equal_values() {
        let mapping = Mapping::new("sensor.temp", PublishedType::AnalogValue, 1);
        let object = LocalObject::from_mapping(&mapping, Some("°C"), "Temp");

        assert!(apply_from_host(&object, &mapping, &HostValue::from("21.5")));
        assert_eq!(object.present_value(), BacnetValue::Real(21.5));
        assert!(!apply_from_host(&object, &mapping, &HostValue::Number(21.5)));
        assert_eq!(object.host_writes(), 1);
    }

    #[test]
    fn unparsable_analog_values_are_dropped() {
        let mapping = Mapping::new("sensor.temp", PublishedType::AnalogValue, 1);
        let object = LocalObject::from_mapping(&mapping, None, "Temp");
        assert!(apply_from_host(&object, &mapping, &HostValue::Number(3.0)));
        assert!(!apply_from_host(&object, &mapping, &HostValue::from("unavailable")));
        assert!(!apply_from_host(&object, &mapping, &HostValue::Null));
        assert_eq!(object.present_value(), BacnetValue::Real(3.0));
    }

    #[test]
    fn binary_uses_truthiness_and_climate_rules() {
        let plain = Mapping::new("binary_sensor.door", PublishedType::BinaryValue, 1);
        assert_eq!(desired_value(&plain, &HostValue::from("open")), Some(BacnetValue::Enumerated(1)));
        assert_eq!(desired_value(&plain, &HostValue::from("inactive")), Some(BacnetValue::Enumerated(0)));
        assert_eq!(desired_value(&plain, &HostValue::Null), Some(BacnetValue::Enumerated(0)));

        let mut mode = Mapping::new("climate.living", PublishedType::BinaryValue, 2);
        mode.write_action = Some(WriteAction::ClimateHvacMode);
        mode.hvac_on_mode = Some("cool".into());
        assert_eq!(desired_value(&mode, &HostValue::from("heat")), Some(BacnetValue::Enumerated(0)));
        assert_eq!(desired_value(&mode, &HostValue::from("Cool")), Some(BacnetValue::Enumerated(1)));

        let mut action = Mapping::new("climate.living", PublishedType::BinaryValue, 3);
        action.source_attr = Some("hvac_action".into());
        assert_eq!(desired_value(&action, &HostValue::from("heating")), Some(BacnetValue::Enumerated(1)));
        assert_eq!(desired_value(&action, &HostValue::from("idle")), Some(BacnetValue::Enumerated(0)));
    }

    #[test]
    fn multistate_matches_labels() {
        let mut mapping = Mapping::new("climate.living", PublishedType::MultiStateValue, 1);
        mapping.mv_states = vec!["off".into(), "heat".into(), "cool".into()];
        assert_eq!(desired_value(&mapping, &HostValue::from("COOL")), Some(BacnetValue::Unsigned(3)));
        assert_eq!(desired_value(&mapping, &HostValue::from("dry")), Some(BacnetValue::Unsigned(1)));

        let object = LocalObject::from_mapping(&mapping, None, "Mode");
        assert!(!apply_from_host(&object, &mapping, &HostValue::from("off")));
        assert!(apply_from_host(&object, &mapping, &HostValue::from("heat")));
        assert_eq!(object.present_value(), BacnetValue::Unsigned(2));
    }
}
