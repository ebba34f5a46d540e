//! Remote points imported from BACnet devices.
//!
//! A [`Point`] is the cached view of one supported object on a remote device.
//! Its [`PointKind`] is fixed when the point is built and carries the
//! per-kind descriptive data together with the coercion rules for decoding
//! present values for the host and encoding host writes.

use crate::codec::{self, HostValue};
use crate::types::{normalize_token, ObjectId, ObjectType, PropertyId};
use crate::value::BacnetValue;
use std::collections::HashMap;

/// Properties read for every imported point.
pub const POINT_PROPERTIES: [PropertyId; 13] = [
    PropertyId::ObjectIdentifier,
    PropertyId::ObjectName,
    PropertyId::Description,
    PropertyId::PresentValue,
    PropertyId::Units,
    PropertyId::StatusFlags,
    PropertyId::OutOfService,
    PropertyId::Reliability,
    PropertyId::StateText,
    PropertyId::NumberOfStates,
    PropertyId::ActiveText,
    PropertyId::InactiveText,
    PropertyId::PriorityArray,
];

/// Properties a change-of-value notification may update.
pub const COV_PROPERTIES: [PropertyId; 9] = [
    PropertyId::PresentValue,
    PropertyId::StatusFlags,
    PropertyId::OutOfService,
    PropertyId::Reliability,
    PropertyId::Description,
    PropertyId::ObjectName,
    PropertyId::StateText,
    PropertyId::ActiveText,
    PropertyId::InactiveText,
];

/// Highest option count synthesized from `numberOfStates` when a multi-state
/// point has no state text.
const MAX_SYNTHESIZED_OPTIONS: u32 = 128;

/// Object types the bridge imports from remote devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PointType {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    MultiStateValue,
    CharacterStringValue,
}

/// Whether a point is an input, output, or value object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointDirection {
    Input,
    Output,
    Value,
}

impl PointType {
    pub const ALL: [Self; 8] = [
        Self::AnalogInput,
        Self::AnalogOutput,
        Self::AnalogValue,
        Self::BinaryInput,
        Self::BinaryOutput,
        Self::BinaryValue,
        Self::MultiStateValue,
        Self::CharacterStringValue,
    ];

    /// Short slug used in point keys (`ai`, `bv`, `csv`, ...).
    pub const fn slug(self) -> &'static str {
        match self {
            Self::AnalogInput => "ai",
            Self::AnalogOutput => "ao",
            Self::AnalogValue => "av",
            Self::BinaryInput => "bi",
            Self::BinaryOutput => "bo",
            Self::BinaryValue => "bv",
            Self::MultiStateValue => "mv",
            Self::CharacterStringValue => "csv",
        }
    }

    pub const fn object_type(self) -> ObjectType {
        match self {
            Self::AnalogInput => ObjectType::AnalogInput,
            Self::AnalogOutput => ObjectType::AnalogOutput,
            Self::AnalogValue => ObjectType::AnalogValue,
            Self::BinaryInput => ObjectType::BinaryInput,
            Self::BinaryOutput => ObjectType::BinaryOutput,
            Self::BinaryValue => ObjectType::BinaryValue,
            Self::MultiStateValue => ObjectType::MultiStateValue,
            Self::CharacterStringValue => ObjectType::CharacterStringValue,
        }
    }

    pub fn from_object_type(object_type: ObjectType) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.object_type() == object_type)
    }

    /// Canonical hyphenated object type name, e.g. `analog-input`.
    pub fn canonical_name(self) -> &'static str {
        self.object_type().name().unwrap_or_default()
    }

    pub const fn direction(self) -> PointDirection {
        match self {
            Self::AnalogInput | Self::BinaryInput => PointDirection::Input,
            Self::AnalogOutput | Self::BinaryOutput => PointDirection::Output,
            Self::AnalogValue
            | Self::BinaryValue
            | Self::MultiStateValue
            | Self::CharacterStringValue => PointDirection::Value,
        }
    }

    /// Classifies an object type token as reported by a device.
    ///
    /// Tries an exact match on the normalized token, then the token with a
    /// leading `objecttype`/`object`/`enum`/`bacnetobjecttype` stripped, then
    /// keyword heuristics (`analog` + `input`, ...). Returns `None` for types
    /// the bridge does not import.
    pub fn classify(token: &str) -> Option<Self> {
        let key = normalize_token(token);
        if key.is_empty() {
            return None;
        }
        if let Some(ty) = Self::from_key(&key) {
            return Some(ty);
        }
        if key.bytes().all(|b| b.is_ascii_digit()) {
            return ObjectType::from_name(&key).and_then(Self::from_object_type);
        }
        for prefix in ["objecttype", "object", "enum", "bacnetobjecttype"] {
            if let Some(ty) = key.strip_prefix(prefix).and_then(Self::from_key) {
                return Some(ty);
            }
        }
        let has = |needle: &str| key.contains(needle);
        let ty = if has("analog") && has("input") {
            Self::AnalogInput
        } else if has("analog") && has("output") {
            Self::AnalogOutput
        } else if has("analog") && has("value") {
            Self::AnalogValue
        } else if has("binary") && has("input") {
            Self::BinaryInput
        } else if has("binary") && has("output") {
            Self::BinaryOutput
        } else if has("binary") && has("value") {
            Self::BinaryValue
        } else if has("multistate") && has("value") {
            Self::MultiStateValue
        } else if has("characterstring") && has("value") {
            Self::CharacterStringValue
        } else {
            return None;
        };
        Some(ty)
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| normalize_token(ty.canonical_name()) == key)
    }

    /// An empty descriptive payload of the right kind for this type.
    pub fn empty_kind(self) -> PointKind {
        match self {
            Self::AnalogInput | Self::AnalogOutput | Self::AnalogValue => {
                PointKind::Analog { unit: None }
            }
            Self::BinaryInput | Self::BinaryOutput | Self::BinaryValue => PointKind::Binary {
                active_text: None,
                inactive_text: None,
            },
            Self::MultiStateValue => PointKind::MultiState {
                state_text: None,
                number_of_states: None,
            },
            Self::CharacterStringValue => PointKind::Text,
        }
    }
}

/// Unique key of a point within one device: `{slug}_{instance}`.
pub fn point_key(point_type: PointType, instance: u32) -> String {
    format!("{}_{}", point_type.slug(), instance)
}

/// Per-kind descriptive data and coercion rules.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum PointKind {
    Analog {
        unit: Option<String>,
    },
    Binary {
        active_text: Option<String>,
        inactive_text: Option<String>,
    },
    MultiState {
        state_text: Option<Vec<String>>,
        number_of_states: Option<u32>,
    },
    Text,
}

impl PointKind {
    /// Host-side rendering of a present value.
    pub fn decode(&self, value: &BacnetValue) -> Option<HostValue> {
        if value.is_null() {
            return None;
        }
        let decoded = match self {
            Self::Analog { .. } => value
                .as_f64()
                .map(|v| HostValue::Number(codec::round_analog(v))),
            Self::Binary {
                active_text,
                inactive_text,
            } => codec::binary_is_active(value).map(|active| {
                let label = if active {
                    active_text.as_deref().unwrap_or("active")
                } else {
                    inactive_text.as_deref().unwrap_or("inactive")
                };
                HostValue::Text(label.to_string())
            }),
            Self::MultiState { .. } => value.as_u32().map(|index| {
                let options = self.options();
                match codec::multistate_label(&options, index) {
                    Some(label) => HostValue::Text(label.to_string()),
                    None => HostValue::Number(f64::from(index)),
                }
            }),
            Self::Text => None,
        };
        decoded.or_else(|| value.as_text().map(HostValue::Text))
    }

    /// BACnet encoding of a host write, `None` when the value has no meaning
    /// for this kind.
    pub fn encode(&self, value: &HostValue) -> Option<BacnetValue> {
        match self {
            Self::Analog { .. } => codec::as_float(value).map(|v| BacnetValue::Real(v as f32)),
            Self::Binary {
                active_text,
                inactive_text,
            } => {
                if let HostValue::Text(text) = value {
                    let matches = |label: &Option<String>| {
                        label
                            .as_deref()
                            .is_some_and(|label| label.trim().eq_ignore_ascii_case(text.trim()))
                    };
                    if matches(active_text) {
                        return Some(codec::binary_present_value(true));
                    }
                    if matches(inactive_text) {
                        return Some(codec::binary_present_value(false));
                    }
                }
                Some(codec::binary_present_value(codec::truthy(value)))
            }
            Self::MultiState { .. } => {
                let options = self.options();
                let index = match value {
                    HostValue::Text(text) => codec::find_state(&options, text)
                        .or_else(|| text.trim().parse::<u32>().ok())?,
                    other => u32::try_from(codec::as_int(other)?).ok()?,
                };
                let in_range = index >= 1
                    && (options.is_empty() || index as usize <= options.len());
                in_range.then_some(BacnetValue::Unsigned(index))
            }
            Self::Text => match value {
                HostValue::Null => None,
                other => Some(BacnetValue::CharacterString(other.to_string())),
            },
        }
    }

    /// Selectable options of a multi-state point: its state text, else
    /// `1..=numberOfStates`. Empty for other kinds.
    pub fn options(&self) -> Vec<String> {
        let Self::MultiState {
            state_text,
            number_of_states,
        } = self
        else {
            return Vec::new();
        };
        let labels: Vec<String> = state_text
            .iter()
            .flatten()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();
        if !labels.is_empty() {
            return labels;
        }
        let count = number_of_states.unwrap_or(0).min(MAX_SYNTHESIZED_OPTIONS);
        (1..=count).map(|idx| idx.to_string()).collect()
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::Analog { unit } => unit.as_deref(),
            _ => None,
        }
    }
}

/// Host entity platform a point is exposed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PointPlatform {
    Sensor,
    BinarySensor,
    Number,
    Switch,
    Select,
    Text,
}

/// Cached view of one supported object on a remote device.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub point_type: PointType,
    pub object_instance: u32,
    /// Compact `type,instance` identifier used to address the object.
    pub object_identifier: String,
    pub device_instance: u32,
    pub device_address: String,
    pub object_name: String,
    pub description: Option<String>,
    pub present_value: Option<BacnetValue>,
    pub status_flags: Option<String>,
    pub out_of_service: Option<bool>,
    pub reliability: Option<String>,
    pub has_priority_array: bool,
    pub kind: PointKind,
}

impl Point {
    pub fn new(
        point_type: PointType,
        object_instance: u32,
        device_instance: u32,
        device_address: impl Into<String>,
    ) -> Self {
        Self {
            point_type,
            object_instance,
            object_identifier: ObjectId::new(point_type.object_type(), object_instance)
                .to_string(),
            device_instance,
            device_address: device_address.into(),
            object_name: format!("{} {}", point_type.canonical_name(), object_instance),
            description: None,
            present_value: None,
            status_flags: None,
            out_of_service: None,
            reliability: None,
            has_priority_array: false,
            kind: point_type.empty_kind(),
        }
    }

    /// Builds a point from the values of a bulk property read. Missing or
    /// null properties leave the corresponding field empty.
    pub fn from_properties(
        point_type: PointType,
        object_instance: u32,
        device_instance: u32,
        device_address: impl Into<String>,
        values: &HashMap<PropertyId, BacnetValue>,
    ) -> Self {
        let mut point = Self::new(point_type, object_instance, device_instance, device_address);
        let get = |prop: PropertyId| values.get(&prop).filter(|value| !value.is_null());

        if let Some(identifier) = get(PropertyId::ObjectIdentifier).and_then(BacnetValue::as_text) {
            point.object_identifier = identifier;
        }
        if let Some(name) = get(PropertyId::ObjectName).and_then(BacnetValue::as_text) {
            point.object_name = name;
        }
        point.description = get(PropertyId::Description).and_then(BacnetValue::as_text);
        point.present_value = get(PropertyId::PresentValue).cloned();
        point.status_flags = get(PropertyId::StatusFlags).and_then(codec::status_flags_text);
        point.out_of_service = get(PropertyId::OutOfService).and_then(BacnetValue::as_bool);
        point.reliability = get(PropertyId::Reliability).and_then(BacnetValue::as_text);
        point.has_priority_array = get(PropertyId::PriorityArray)
            .is_some_and(|value| !matches!(value, BacnetValue::List(items) if items.is_empty()));

        match &mut point.kind {
            PointKind::Analog { unit } => {
                *unit = get(PropertyId::Units).and_then(codec::normalize_unit);
            }
            PointKind::Binary {
                active_text,
                inactive_text,
            } => {
                *active_text = get(PropertyId::ActiveText).and_then(BacnetValue::as_text);
                *inactive_text = get(PropertyId::InactiveText).and_then(BacnetValue::as_text);
            }
            PointKind::MultiState {
                state_text,
                number_of_states,
            } => {
                *state_text = get(PropertyId::StateText).and_then(codec::text_list);
                *number_of_states = get(PropertyId::NumberOfStates).and_then(BacnetValue::as_u32);
            }
            PointKind::Text => {}
        }
        point
    }

    pub fn key(&self) -> String {
        point_key(self.point_type, self.object_instance)
    }

    /// Whether the host may write this point. Values objects always are;
    /// outputs only when they expose a priority array.
    pub fn writable_from_ha(&self) -> bool {
        match self.point_type {
            PointType::AnalogValue
            | PointType::BinaryValue
            | PointType::MultiStateValue
            | PointType::CharacterStringValue => true,
            PointType::AnalogOutput | PointType::BinaryOutput => self.has_priority_array,
            PointType::AnalogInput | PointType::BinaryInput => false,
        }
    }

    /// Command priority for writes: commandable outputs are written at
    /// `priority`, everything else without one.
    pub fn write_priority(&self, priority: u8) -> Option<u8> {
        let commandable = matches!(
            self.point_type,
            PointType::AnalogOutput | PointType::BinaryOutput
        ) && self.has_priority_array;
        commandable.then_some(priority)
    }

    pub fn platform(&self) -> PointPlatform {
        let writable = self.writable_from_ha();
        match self.point_type {
            PointType::CharacterStringValue => PointPlatform::Text,
            PointType::AnalogInput => PointPlatform::Sensor,
            PointType::BinaryInput => PointPlatform::BinarySensor,
            PointType::MultiStateValue if writable => PointPlatform::Select,
            PointType::MultiStateValue => PointPlatform::Sensor,
            PointType::AnalogValue | PointType::AnalogOutput if writable => PointPlatform::Number,
            PointType::AnalogValue | PointType::AnalogOutput => PointPlatform::Sensor,
            PointType::BinaryValue | PointType::BinaryOutput if writable => PointPlatform::Switch,
            PointType::BinaryValue | PointType::BinaryOutput => PointPlatform::BinarySensor,
        }
    }

    /// Present value as shown on the host.
    pub fn native_value(&self) -> Option<HostValue> {
        self.kind.decode(self.present_value.as_ref()?)
    }

    /// Binary state, `None` for non-binary points or unrecognised values.
    pub fn is_on(&self) -> Option<bool> {
        match self.kind {
            PointKind::Binary { .. } => codec::binary_is_active(self.present_value.as_ref()?),
            _ => None,
        }
    }

    pub fn encode_write(&self, value: &HostValue) -> Option<BacnetValue> {
        self.kind.encode(value)
    }

    /// Merges one change-of-value property into the point. Properties outside
    /// [`COV_PROPERTIES`], null values, and properties that do not apply to
    /// this kind are ignored. Returns whether anything changed.
    pub fn apply_cov(&mut self, property: PropertyId, value: &BacnetValue) -> bool {
        if value.is_null() || !COV_PROPERTIES.contains(&property) {
            return false;
        }
        fn set<T: PartialEq>(slot: &mut T, next: T) -> bool {
            if *slot == next {
                return false;
            }
            *slot = next;
            true
        }
        match (property, &mut self.kind) {
            (PropertyId::PresentValue, _) => set(&mut self.present_value, Some(value.clone())),
            (PropertyId::StatusFlags, _) => {
                set(&mut self.status_flags, codec::status_flags_text(value))
            }
            (PropertyId::OutOfService, _) => set(&mut self.out_of_service, value.as_bool()),
            (PropertyId::Reliability, _) => set(&mut self.reliability, value.as_text()),
            (PropertyId::Description, _) => set(&mut self.description, value.as_text()),
            (PropertyId::ObjectName, _) => match value.as_text() {
                Some(name) => set(&mut self.object_name, name),
                None => false,
            },
            (PropertyId::StateText, PointKind::MultiState { state_text, .. }) => {
                match codec::text_list(value) {
                    Some(labels) => set(state_text, Some(labels)),
                    None => false,
                }
            }
            (PropertyId::ActiveText, PointKind::Binary { active_text, .. }) => {
                set(active_text, value.as_text())
            }
            (PropertyId::InactiveText, PointKind::Binary { inactive_text, .. }) => {
                set(inactive_text, value.as_text())
            }
            _ => false,
        }
    }

    /// Points the cached object at a new device address. Returns whether the
    /// address changed.
    pub fn readdress(&mut self, address: &str) -> bool {
        if self.device_address == address {
            return false;
        }
        self.device_address = address.to_string();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multistate(labels: &[&str]) -> Point {
        let mut point = Point::new(PointType::MultiStateValue, 1, 100, "10.0.0.5");
        point.kind = PointKind::MultiState {
            state_text: Some(labels.iter().map(|s| s.to_string()).collect()),
            number_of_states: Some(labels.len() as u32),
        };
        point
    }

    #[test]
    fn classifies_vendor_tokens() {
        assert_eq!(PointType::classify("analogInput"), Some(PointType::AnalogInput));
        assert_eq!(PointType::classify("analog-input"), Some(PointType::AnalogInput));
        assert_eq!(
            PointType::classify("ObjectType.binaryValue"),
            Some(PointType::BinaryValue)
        );
        assert_eq!(
            PointType::classify("OBJECT_MULTI_STATE_VALUE"),
            Some(PointType::MultiStateValue)
        );
        assert_eq!(
            PointType::classify("BACnet analog output object"),
            Some(PointType::AnalogOutput)
        );
        assert_eq!(PointType::classify("2"), Some(PointType::AnalogValue));
        assert_eq!(PointType::classify("device"), None);
        assert_eq!(PointType::classify("multiStateInput"), None);
        assert_eq!(PointType::classify(""), None);
    }

    #[test]
    fn point_keys_use_slugs() {
        assert_eq!(point_key(PointType::AnalogInput, 5), "ai_5");
        assert_eq!(point_key(PointType::CharacterStringValue, 9), "csv_9");
        let point = Point::new(PointType::BinaryValue, 2, 1001, "192.168.1.20");
        assert_eq!(point.key(), "bv_2");
        assert_eq!(point.object_identifier, "binary-value,2");
        assert_eq!(point.object_name, "binary-value 2");
    }

    #[test]
    fn writability_and_platform() {
        let mut output = Point::new(PointType::AnalogOutput, 1, 1, "a");
        assert!(!output.writable_from_ha());
        assert_eq!(output.platform(), PointPlatform::Sensor);
        assert_eq!(output.write_priority(16), None);
        output.has_priority_array = true;
        assert!(output.writable_from_ha());
        assert_eq!(output.platform(), PointPlatform::Number);
        assert_eq!(output.write_priority(16), Some(16));

        let value = Point::new(PointType::BinaryValue, 1, 1, "a");
        assert!(value.writable_from_ha());
        assert_eq!(value.platform(), PointPlatform::Switch);
        assert_eq!(value.write_priority(16), None);

        assert_eq!(
            Point::new(PointType::BinaryInput, 1, 1, "a").platform(),
            PointPlatform::BinarySensor
        );
        assert_eq!(
            Point::new(PointType::CharacterStringValue, 1, 1, "a").platform(),
            PointPlatform::Text
        );
        assert_eq!(multistate(&["a", "b"]).platform(), PointPlatform::Select);
    }

    #[test]
    fn builds_from_bulk_read() {
        let mut values = HashMap::new();
        values.insert(PropertyId::ObjectName, BacnetValue::from("Zone Temp"));
        values.insert(PropertyId::PresentValue, BacnetValue::Real(72.3));
        values.insert(PropertyId::Units, BacnetValue::Enumerated(64));
        values.insert(PropertyId::Description, BacnetValue::Null);
        let point = Point::from_properties(PointType::AnalogInput, 5, 1001, "10.0.0.7", &values);
        assert_eq!(point.object_name, "Zone Temp");
        assert_eq!(point.kind.unit(), Some("°F"));
        assert_eq!(point.description, None);
        assert!(!point.has_priority_array);
        assert_eq!(point.native_value(), Some(HostValue::Number(72.3)));
    }

    #[test]
    fn multistate_decode_and_encode() {
        let point = multistate(&["Off", "Low", "High"]);
        let mut current = point.clone();
        current.present_value = Some(BacnetValue::Unsigned(2));
        assert_eq!(current.native_value(), Some(HostValue::from("Low")));
        assert_eq!(point.encode_write(&"high".into()), Some(BacnetValue::Unsigned(3)));
        assert_eq!(point.encode_write(&"2".into()), Some(BacnetValue::Unsigned(2)));
        assert_eq!(point.encode_write(&HostValue::Number(3.0)), Some(BacnetValue::Unsigned(3)));
        assert_eq!(point.encode_write(&"turbo".into()), None);
        assert_eq!(point.encode_write(&HostValue::Number(4.0)), None);

        let mut counted = Point::new(PointType::MultiStateValue, 2, 1, "a");
        counted.kind = PointKind::MultiState {
            state_text: None,
            number_of_states: Some(3),
        };
        assert_eq!(counted.kind.options(), vec!["1", "2", "3"]);
    }

    #[test]
    fn binary_decode_uses_labels() {
        let mut point = Point::new(PointType::BinaryValue, 2, 1, "a");
        point.present_value = Some(BacnetValue::Enumerated(1));
        assert_eq!(point.native_value(), Some(HostValue::from("active")));
        assert_eq!(point.is_on(), Some(true));
        point.kind = PointKind::Binary {
            active_text: Some("Running".into()),
            inactive_text: Some("Stopped".into()),
        };
        assert_eq!(point.native_value(), Some(HostValue::from("Running")));
        assert_eq!(point.encode_write(&"stopped".into()), Some(BacnetValue::Enumerated(0)));
        assert_eq!(point.encode_write(&HostValue::Bool(true)), Some(BacnetValue::Enumerated(1)));
    }

    #[test]
    fn analog_encode_rejects_garbage() {
        let point = Point::new(PointType::AnalogValue, 1, 1, "a");
        assert_eq!(point.encode_write(&"21.5".into()), Some(BacnetValue::Real(21.5)));
        assert_eq!(point.encode_write(&"warm".into()), None);
    }

    #[test]
    fn cov_merge_respects_allow_list() {
        let mut point = Point::new(PointType::BinaryValue, 2, 1, "a");
        assert!(point.apply_cov(PropertyId::PresentValue, &BacnetValue::Enumerated(1)));
        assert!(!point.apply_cov(PropertyId::PresentValue, &BacnetValue::Enumerated(1)));
        assert!(point.apply_cov(PropertyId::ActiveText, &"On".into()));
        assert!(!point.apply_cov(PropertyId::Units, &BacnetValue::Enumerated(62)));
        assert!(!point.apply_cov(PropertyId::StateText, &BacnetValue::List(vec![])));
        assert!(!point.apply_cov(PropertyId::Description, &BacnetValue::Null));
        assert_eq!(point.native_value(), Some(HostValue::from("On")));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn kind_serializes_with_tag() {
        let point = Point::new(PointType::AnalogInput, 5, 1, "a");
        let json = serde_json::to_value(&point).expect("serialize point");
        assert_eq!(json["kind"]["kind"], "analog");
        assert_eq!(json["object_identifier"], "analog-input,5");
    }
}
