//! Publisher mappings: which host entity (or entity attribute) is served as
//! which local BACnet object.

use crate::host::{entity_domain, EntityState};
use bacbridge_core::codec::{self, normalize_states};
use bacbridge_core::types::ObjectType;
use bacbridge_core::HostValue;
use serde::{Deserialize, Serialize};

/// Source attribute name standing for the entity's primary state.
pub const SOURCE_STATE: &str = "__state__";

const BINARY_DOMAINS: [&str; 9] = [
    "binary_sensor",
    "switch",
    "light",
    "lock",
    "cover",
    "input_boolean",
    "alarm_control_panel",
    "device_tracker",
    "button",
];

/// Object types the publisher can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PublishedType {
    AnalogValue,
    BinaryValue,
    MultiStateValue,
}

impl PublishedType {
    pub const fn object_type(self) -> ObjectType {
        match self {
            Self::AnalogValue => ObjectType::AnalogValue,
            Self::BinaryValue => ObjectType::BinaryValue,
            Self::MultiStateValue => ObjectType::MultiStateValue,
        }
    }
}

/// Explicit host action for writes arriving from BACnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    ClimateHvacMode,
    ClimateTemperature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub entity_id: String,
    pub object_type: PublishedType,
    #[serde(default)]
    pub instance: u32,
    /// Attribute mirrored instead of the primary state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_attr: Option<String>,
    /// Attribute read for the value when it differs from `source_attr`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_attr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mv_states: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_action: Option<WriteAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_on_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_off_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cov_increment: Option<f32>,
}

/// Dedup key of a mapping source: `entity_id|attribute`, lower-cased
/// attribute, [`SOURCE_STATE`] for the primary state.
pub fn source_key(entity_id: &str, source_attr: Option<&str>) -> String {
    let attr = source_attr
        .map(str::trim)
        .filter(|attr| !attr.is_empty())
        .unwrap_or(SOURCE_STATE)
        .to_lowercase();
    format!("{entity_id}|{attr}")
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl Mapping {
    pub fn new(entity_id: impl Into<String>, object_type: PublishedType, instance: u32) -> Self {
        Self {
            entity_id: entity_id.into(),
            object_type,
            instance,
            source_attr: None,
            read_attr: None,
            units: None,
            friendly_name: None,
            mv_states: Vec::new(),
            write_action: None,
            hvac_on_mode: None,
            hvac_off_mode: None,
            cov_increment: None,
        }
    }

    pub fn source_key(&self) -> String {
        source_key(&self.entity_id, self.source_attr.as_deref())
    }

    pub fn domain(&self) -> &str {
        entity_domain(&self.entity_id)
    }

    /// Local object name: the entity id, suffixed with the source attribute.
    pub fn object_name(&self) -> String {
        match blank_to_none(self.source_attr.as_deref()) {
            Some(attr) => format!("{}.{attr}", self.entity_id),
            None => self.entity_id.clone(),
        }
    }

    /// The value this mapping mirrors from `state`.
    ///
    /// A missing `hvac_mode` attribute falls back to the primary state,
    /// since climate entities report their mode there.
    pub fn source_value(&self, state: &EntityState) -> HostValue {
        let attr = blank_to_none(self.read_attr.as_deref())
            .or_else(|| blank_to_none(self.source_attr.as_deref()))
            .filter(|attr| *attr != SOURCE_STATE);
        let Some(attr) = attr else {
            return state.state.clone();
        };
        match state.attr(attr) {
            Some(value) => value.clone(),
            None if attr == "hvac_mode" => state.state.clone(),
            None => HostValue::Null,
        }
    }

    /// Multi-state labels as served, case preserved.
    pub fn state_labels(&self) -> Vec<String> {
        normalize_states(&self.mv_states)
    }

    pub fn on_mode(&self) -> &str {
        blank_to_none(self.hvac_on_mode.as_deref()).unwrap_or("heat")
    }

    pub fn off_mode(&self) -> &str {
        blank_to_none(self.hvac_off_mode.as_deref()).unwrap_or("off")
    }

    /// Object description: the entity's friendly name, with a suffix naming
    /// the climate attribute when there is one.
    pub fn describe(&self, state: Option<&EntityState>) -> String {
        let base = state.map_or_else(|| self.entity_id.clone(), EntityState::friendly_name);
        let suffix = match blank_to_none(self.source_attr.as_deref())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("hvac_mode") => Some("HVAC Mode"),
            Some("current_temperature") => Some("Current Temperature"),
            Some("temperature") => Some("Target Temperature"),
            Some("set_temperature") => Some("Set Temperature"),
            _ => None,
        };
        match suffix {
            Some(suffix) => format!("{base} {suffix}"),
            None => base,
        }
    }
}

fn is_numeric(value: &HostValue) -> bool {
    matches!(value, HostValue::Number(_))
        || matches!(value, HostValue::Text(_) if codec::as_float(value).is_some())
}

/// Object type and units for a plain (non-climate) entity.
pub fn object_type_for(state: Option<&EntityState>, entity_id: &str) -> (PublishedType, Option<String>) {
    if BINARY_DOMAINS.contains(&entity_domain(entity_id)) {
        return (PublishedType::BinaryValue, None);
    }
    let Some(state) = state else {
        return (PublishedType::BinaryValue, None);
    };
    let uom = state.attr("unit_of_measurement").map(ToString::to_string);
    if uom.is_some() || is_numeric(&state.state) {
        return (PublishedType::AnalogValue, uom);
    }
    (PublishedType::BinaryValue, None)
}

/// Lower-cased, deduplicated hvac modes with `off` first. The current mode
/// is included; an empty list becomes `off`, `heat`.
fn normalize_hvac_modes(raw: Option<&HostValue>, current: Option<&HostValue>) -> Vec<String> {
    let mut modes: Vec<String> = Vec::new();
    let mut push = |mode: String| {
        let mode = mode.trim().to_lowercase();
        if !mode.is_empty() && !modes.contains(&mode) {
            modes.push(mode);
        }
    };
    match raw {
        Some(HostValue::List(items)) => items.iter().for_each(|item| push(item.to_string())),
        Some(other) => push(other.to_string()),
        None => {}
    }
    if let Some(current) = current {
        push(current.to_string());
    }
    if modes.is_empty() {
        return vec!["off".to_string(), "heat".to_string()];
    }
    let mut ordered = vec!["off".to_string()];
    ordered.extend(modes.into_iter().filter(|mode| mode != "off"));
    ordered
}

/// Mapping proposals for one entity.
///
/// Climate entities split into an hvac-mode mapping (binary when the only
/// modes are off/heat, multi-state otherwise) plus current and target
/// temperature mappings when those attributes exist. Instances are left at
/// zero for the caller to assign.
pub fn candidates_for_entity(entity_id: &str, state: Option<&EntityState>) -> Vec<Mapping> {
    if entity_domain(entity_id) != "climate" {
        let (object_type, units) = object_type_for(state, entity_id);
        let mut mapping = Mapping::new(entity_id, object_type, 0);
        mapping.units = units;
        mapping.friendly_name = Some(mapping.describe(state));
        return vec![mapping];
    }

    let attr = |name: &str| state.and_then(|state| state.attr(name));
    let mut candidates = Vec::new();

    let modes = normalize_hvac_modes(
        attr("hvac_modes"),
        attr("hvac_mode").or_else(|| state.map(|state| &state.state)),
    );
    let heat_only = modes.iter().all(|mode| mode == "off" || mode == "heat")
        && modes.iter().any(|mode| mode == "heat");
    let mut hvac = if heat_only {
        let mut hvac = Mapping::new(entity_id, PublishedType::BinaryValue, 0);
        hvac.hvac_on_mode = Some("heat".to_string());
        hvac.hvac_off_mode = Some("off".to_string());
        hvac
    } else {
        let mut hvac = Mapping::new(entity_id, PublishedType::MultiStateValue, 0);
        hvac.mv_states = modes;
        hvac
    };
    hvac.source_attr = Some("hvac_mode".to_string());
    hvac.write_action = Some(WriteAction::ClimateHvacMode);
    hvac.friendly_name = Some(hvac.describe(state));
    candidates.push(hvac);

    let temperature_unit = attr("temperature_unit")
        .or_else(|| attr("unit_of_measurement"))
        .map(ToString::to_string);

    if attr("current_temperature").is_some() {
        let mut current = Mapping::new(entity_id, PublishedType::AnalogValue, 0);
        current.units = temperature_unit.clone();
        current.source_attr = Some("current_temperature".to_string());
        current.cov_increment = Some(0.2);
        current.friendly_name = Some(current.describe(state));
        candidates.push(current);
    }

    if attr("temperature").is_some() {
        let mut target = Mapping::new(entity_id, PublishedType::AnalogValue, 0);
        target.units = temperature_unit;
        target.source_attr = Some("set_temperature".to_string());
        target.read_attr = Some("temperature".to_string());
        target.write_action = Some(WriteAction::ClimateTemperature);
        target.cov_increment = Some(0.1);
        target.friendly_name = Some(target.describe(state));
        candidates.push(target);
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn climate(modes: &[&str]) -> EntityState {
        EntityState::new("climate.living", "heat")
            .with_attr("friendly_name", "Living Room")
            .with_attr(
                "hvac_modes",
                HostValue::List(modes.iter().map(|m| HostValue::from(*m)).collect()),
            )
            .with_attr("current_temperature", 20.5)
            .with_attr("temperature", 21.0)
            .with_attr("temperature_unit", "°C")
    }

    #[test]
    fn source_keys_default_to_state() {
        assert_eq!(source_key("sensor.a", None), "sensor.a|__state__");
        assert_eq!(source_key("sensor.a", Some("  ")), "sensor.a|__state__");
        assert_eq!(source_key("climate.b", Some("HVAC_Mode")), "climate.b|hvac_mode");
    }

    #[test]
    fn reads_attribute_or_state() {
        let state = EntityState::new("climate.living", "cool").with_attr("temperature", 21.0);

        let mut target = Mapping::new("climate.living", PublishedType::AnalogValue, 1);
        target.source_attr = Some("set_temperature".into());
        target.read_attr = Some("temperature".into());
        assert_eq!(target.source_value(&state), HostValue::Number(21.0));

        let mut mode = Mapping::new("climate.living", PublishedType::BinaryValue, 2);
        mode.source_attr = Some("hvac_mode".into());
        assert_eq!(mode.source_value(&state), HostValue::from("cool"));

        let mut missing = Mapping::new("climate.living", PublishedType::AnalogValue, 3);
        missing.source_attr = Some("humidity".into());
        assert_eq!(missing.source_value(&state), HostValue::Null);

        let plain = Mapping::new("climate.living", PublishedType::BinaryValue, 4);
        assert_eq!(plain.source_value(&state), HostValue::from("cool"));
    }

    #[test]
    fn names_objects_after_source() {
        let mut mapping = Mapping::new("climate.living", PublishedType::AnalogValue, 1);
        assert_eq!(mapping.object_name(), "climate.living");
        mapping.source_attr = Some("current_temperature".into());
        assert_eq!(mapping.object_name(), "climate.living.current_temperature");
    }

    #[test]
    fn heat_only_climate_becomes_binary() {
        let state = climate(&["off", "heat"]);
        let candidates = candidates_for_entity("climate.living", Some(&state));
        assert_eq!(candidates.len(), 3);

        let hvac = &candidates[0];
        assert_eq!(hvac.object_type, PublishedType::BinaryValue);
        assert_eq!(hvac.write_action, Some(WriteAction::ClimateHvacMode));
        assert_eq!(hvac.on_mode(), "heat");
        assert_eq!(hvac.friendly_name.as_deref(), Some("Living Room HVAC Mode"));

        let current = &candidates[1];
        assert_eq!(current.source_attr.as_deref(), Some("current_temperature"));
        assert_eq!(current.units.as_deref(), Some("°C"));
        assert_eq!(current.cov_increment, Some(0.2));

        let target = &candidates[2];
        assert_eq!(target.read_attr.as_deref(), Some("temperature"));
        assert_eq!(target.write_action, Some(WriteAction::ClimateTemperature));
        assert_eq!(target.friendly_name.as_deref(), Some("Living Room Set Temperature"));
    }

    #[test]
    fn multi_mode_climate_becomes_multistate() {
        let state = climate(&["heat", "cool", "Auto", "off"]);
        let candidates = candidates_for_entity("climate.living", Some(&state));
        let hvac = &candidates[0];
        assert_eq!(hvac.object_type, PublishedType::MultiStateValue);
        assert_eq!(hvac.mv_states, vec!["off", "heat", "cool", "auto"]);
    }

    #[test]
    fn plain_entities_pick_type_from_state() {
        let light = EntityState::new("light.kitchen", "on");
        assert_eq!(
            candidates_for_entity("light.kitchen", Some(&light))[0].object_type,
            PublishedType::BinaryValue
        );

        let power = EntityState::new("sensor.power", "12.5").with_attr("unit_of_measurement", "W");
        let mapping = &candidates_for_entity("sensor.power", Some(&power))[0];
        assert_eq!(mapping.object_type, PublishedType::AnalogValue);
        assert_eq!(mapping.units.as_deref(), Some("W"));

        let mode = EntityState::new("sensor.mode", "eco");
        assert_eq!(object_type_for(Some(&mode), "sensor.mode").0, PublishedType::BinaryValue);
    }

    #[test]
    fn deserializes_configured_mappings() {
        let json = r#"{
            "entity_id": "climate.living",
            "object_type": "multiStateValue",
            "instance": 4,
            "source_attr": "hvac_mode",
            "write_action": "climate_hvac_mode",
            "mv_states": ["off", "heat", "cool"]
        }"#;
        let mapping: Mapping = serde_json::from_str(json).expect("mapping");
        assert_eq!(mapping.object_type, PublishedType::MultiStateValue);
        assert_eq!(mapping.instance, 4);
        assert_eq!(mapping.write_action, Some(WriteAction::ClimateHvacMode));
        assert_eq!(mapping.state_labels(), vec!["off", "heat", "cool"]);
    }
}
