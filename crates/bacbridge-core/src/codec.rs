//! Pure conversions between BACnet values and host-side values.
//!
//! Nothing here performs I/O. The publisher and the remote point model both
//! build on these rules, so a value travelling host → BACnet → host keeps its
//! meaning.

use crate::types::units::normalize_unit_text;
use crate::types::EngineeringUnits;
use crate::value::BacnetValue;
use std::fmt;

/// A normalized host-platform value (entity state or attribute).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum HostValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<HostValue>),
}

impl HostValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(text) => f.write_str(text),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Truthiness of a host value as a binary point state.
///
/// Text containing `inactive` is false before text containing `active` is
/// true; the remaining keywords decide otherwise.
pub fn truthy(value: &HostValue) -> bool {
    match value {
        HostValue::Null => false,
        HostValue::Bool(v) => *v,
        HostValue::Number(v) => *v != 0.0,
        HostValue::List(items) => !items.is_empty(),
        HostValue::Text(text) => text_truthy(text),
    }
}

fn text_truthy(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    if text.is_empty() || text.contains("inactive") {
        return false;
    }
    if text.contains("active") {
        return true;
    }
    matches!(
        text.as_str(),
        "1" | "true" | "on" | "open" | "heat" | "cool" | "heating" | "cooling"
    )
}

/// Numeric coercion. Unparsable input is `None`, never a fabricated zero.
pub fn as_float(value: &HostValue) -> Option<f64> {
    match value {
        HostValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
        HostValue::Number(v) => v.is_finite().then_some(*v),
        HostValue::Text(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        HostValue::Null | HostValue::List(_) => None,
    }
}

/// Integer coercion truncating toward zero, like reading `int(float(x))`.
pub fn as_int(value: &HostValue) -> Option<i64> {
    as_float(value).map(|v| v.trunc() as i64)
}

/// Rounds an analog reading to three decimals and folds negative zero.
pub fn round_analog(value: f64) -> f64 {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Present-value encoding of a binary state (`active` = 1, `inactive` = 0).
pub fn binary_present_value(active: bool) -> BacnetValue {
    BacnetValue::Enumerated(u32::from(active))
}

/// Interprets a remote binary present value. `None` when it is neither
/// recognisably active nor inactive.
pub fn binary_is_active(value: &BacnetValue) -> Option<bool> {
    match value {
        BacnetValue::Boolean(v) => Some(*v),
        BacnetValue::Enumerated(v) | BacnetValue::Unsigned(v) if *v <= 1 => Some(*v == 1),
        BacnetValue::CharacterString(text) => {
            match text.trim().to_ascii_lowercase().as_str() {
                "active" | "on" | "true" | "1" => Some(true),
                "inactive" | "off" | "false" | "0" => Some(false),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Cleans a multi-state option list: trimmed, blanks dropped, and at least
/// two options (`off`, `on`) when fewer are configured.
pub fn normalize_states<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let states: Vec<String> = labels
        .iter()
        .map(|label| label.as_ref().trim().to_string())
        .filter(|label| !label.is_empty())
        .collect();
    if states.len() < 2 {
        return vec!["off".to_string(), "on".to_string()];
    }
    states
}

/// 1-based index of `text` among `states`, matched case-insensitively.
/// Unknown text maps to the first state.
pub fn multistate_index<S: AsRef<str>>(states: &[S], text: &str) -> u32 {
    find_state(states, text).unwrap_or(1)
}

/// Like [`multistate_index`] but `None` when `text` matches no state.
pub fn find_state<S: AsRef<str>>(states: &[S], text: &str) -> Option<u32> {
    let wanted = text.trim().to_lowercase();
    states
        .iter()
        .position(|state| state.as_ref().trim().to_lowercase() == wanted)
        .and_then(|pos| u32::try_from(pos + 1).ok())
}

/// Label of the 1-based `index`, `None` when out of range or blank.
pub fn multistate_label<S: AsRef<str>>(states: &[S], index: u32) -> Option<&str> {
    let pos = usize::try_from(index).ok()?.checked_sub(1)?;
    states
        .get(pos)
        .map(|label| label.as_ref().trim())
        .filter(|label| !label.is_empty())
}

/// Whether a climate hvac mode equals the configured "on" mode.
pub fn hvac_mode_is_on(value: &HostValue, on_mode: &str) -> bool {
    value.to_string().trim().to_lowercase() == on_mode.trim().to_lowercase()
}

/// A climate hvac action is active unless it reports `idle` or `off`.
pub fn hvac_action_is_active(value: &HostValue) -> bool {
    let action = value.to_string().trim().to_lowercase();
    !action.is_empty() && action != "idle" && action != "off"
}

/// Host display unit of a remote `units` property.
pub fn normalize_unit(value: &BacnetValue) -> Option<String> {
    match value {
        BacnetValue::Enumerated(code) | BacnetValue::Unsigned(code) => {
            match EngineeringUnits::from_code(*code) {
                Some(unit) if unit.symbol().is_empty() => None,
                Some(unit) => Some(unit.symbol().to_string()),
                None => Some(code.to_string()),
            }
        }
        other => normalize_unit_text(&other.as_text()?),
    }
}

/// Option labels carried by a `stateText` array.
pub fn text_list(value: &BacnetValue) -> Option<Vec<String>> {
    match value {
        BacnetValue::List(items) => Some(
            items
                .iter()
                .map(|item| item.as_text().unwrap_or_default())
                .collect(),
        ),
        _ => None,
    }
}

/// Renders a `statusFlags` bit string as the names of the set flags, or
/// `normal` when none is set.
pub fn status_flags_text(value: &BacnetValue) -> Option<String> {
    const FLAGS: [&str; 4] = ["in-alarm", "fault", "overridden", "out-of-service"];
    let Some(bits) = value.bits() else {
        return value.as_text();
    };
    let set: Vec<&str> = FLAGS
        .iter()
        .zip(bits)
        .filter_map(|(name, bit)| bit.then_some(*name))
        .collect();
    if set.is_empty() {
        Some("normal".to_string())
    } else {
        Some(set.join(","))
    }
}

/// Device `systemStatus` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SystemStatus {
    Operational,
    OperationalReadOnly,
    DownloadRequired,
    DownloadInProgress,
    NonOperational,
    BackupInProgress,
}

impl SystemStatus {
    const ALL: [Self; 6] = [
        Self::Operational,
        Self::OperationalReadOnly,
        Self::DownloadRequired,
        Self::DownloadInProgress,
        Self::NonOperational,
        Self::BackupInProgress,
    ];

    pub const fn code(self) -> u32 {
        match self {
            Self::Operational => 0,
            Self::OperationalReadOnly => 1,
            Self::DownloadRequired => 2,
            Self::DownloadInProgress => 3,
            Self::NonOperational => 4,
            Self::BackupInProgress => 5,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Operational => "operational",
            Self::OperationalReadOnly => "operational_read_only",
            Self::DownloadRequired => "download_required",
            Self::DownloadInProgress => "download_in_progress",
            Self::NonOperational => "non_operational",
            Self::BackupInProgress => "backup_in_progress",
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Interprets an enumerated code or a textual status in any spelling.
    pub fn from_value(value: &BacnetValue) -> Option<Self> {
        if let Some(status) = value.as_u32().and_then(Self::from_code) {
            return Some(status);
        }
        let text = value.as_text()?.to_lowercase();
        let digits: String = text.chars().filter(char::is_ascii_digit).collect();
        if let Some(status) = digits.parse().ok().and_then(Self::from_code) {
            return Some(status);
        }
        let key = crate::types::normalize_token(&text);
        if key.contains("readonly") {
            return Some(Self::OperationalReadOnly);
        }
        if key.contains("nonoperational") {
            return Some(Self::NonOperational);
        }
        Self::ALL
            .into_iter()
            .find(|status| key.contains(&crate::types::normalize_token(status.label())))
    }
}
