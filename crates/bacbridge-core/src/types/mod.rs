pub mod object_id;
pub mod object_type;
pub mod property_id;
pub mod units;

pub use object_id::ObjectId;
pub use object_type::ObjectType;
pub use property_id::PropertyId;
pub use units::EngineeringUnits;

/// Lower-cases `text` and drops every character that is not ASCII alphanumeric.
///
/// Vendors spell the same identifier as `analogInput`, `analog-input`,
/// `ANALOG_INPUT` or `Analog Input`; all of them normalize to `analoginput`.
pub fn normalize_token(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
