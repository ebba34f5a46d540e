use crate::types::ObjectId;
use std::fmt;

/// An owned, decoded BACnet application value as handed over by the
/// protocol layer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BacnetValue {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Signed(i32),
    Real(f32),
    Double(f64),
    OctetString(Vec<u8>),
    CharacterString(String),
    BitString { unused_bits: u8, data: Vec<u8> },
    Enumerated(u32),
    ObjectId(ObjectId),
    /// A BACnet array or list (object lists, state texts, priority arrays).
    List(Vec<BacnetValue>),
}

impl BacnetValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value. Character strings are parsed leniently.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Unsigned(v) | Self::Enumerated(v) => Some(f64::from(*v)),
            Self::Signed(v) => Some(f64::from(*v)),
            Self::Real(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::CharacterString(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Non-negative integral view of the value.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Unsigned(v) | Self::Enumerated(v) => Some(*v),
            Self::Signed(v) => u32::try_from(*v).ok(),
            Self::Boolean(v) => Some(u32::from(*v)),
            Self::Real(_) | Self::Double(_) | Self::CharacterString(_) => {
                let value = self.as_f64()?;
                (value.is_finite() && value >= 0.0 && value <= f64::from(u32::MAX))
                    .then(|| value.trunc() as u32)
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            Self::Unsigned(v) | Self::Enumerated(v) => Some(*v != 0),
            Self::CharacterString(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Trimmed textual rendering, `None` for null or blank values.
    pub fn as_text(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        let text = self.to_string();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Individual bits of a bit string, most significant bit of the first
    /// octet first, with unused trailing bits removed.
    pub fn bits(&self) -> Option<Vec<bool>> {
        let Self::BitString { unused_bits, data } = self else {
            return None;
        };
        let total = (data.len() * 8).saturating_sub(usize::from(*unused_bits));
        Some(
            (0..total)
                .map(|idx| data[idx / 8] & (0x80 >> (idx % 8)) != 0)
                .collect(),
        )
    }
}

impl fmt::Display for BacnetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Unsigned(v) | Self::Enumerated(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::OctetString(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02X}")?;
                }
                Ok(())
            }
            Self::CharacterString(text) => f.write_str(text),
            Self::BitString { .. } => {
                for bit in self.bits().unwrap_or_default() {
                    f.write_str(if bit { "1" } else { "0" })?;
                }
                Ok(())
            }
            Self::ObjectId(id) => write!(f, "{id}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for BacnetValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f32> for BacnetValue {
    fn from(value: f32) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for BacnetValue {
    fn from(value: &str) -> Self {
        Self::CharacterString(value.to_string())
    }
}

impl From<ObjectId> for BacnetValue {
    fn from(value: ObjectId) -> Self {
        Self::ObjectId(value)
    }
}

#[cfg(test)]
mod tests {
    use super::BacnetValue;
    use crate::types::{ObjectId, ObjectType};

    #[test]
    fn numeric_views() {
        assert_eq!(BacnetValue::Real(72.5).as_f64(), Some(72.5));
        assert_eq!(BacnetValue::CharacterString(" 3 ".into()).as_u32(), Some(3));
        assert_eq!(BacnetValue::Signed(-1).as_u32(), None);
        assert_eq!(BacnetValue::Double(2.9).as_u32(), Some(2));
        assert_eq!(BacnetValue::Null.as_f64(), None);
    }

    #[test]
    fn text_view_skips_blank_values() {
        assert_eq!(BacnetValue::CharacterString("  ".into()).as_text(), None);
        assert_eq!(BacnetValue::Null.as_text(), None);
        assert_eq!(
            BacnetValue::ObjectId(ObjectId::new(ObjectType::AnalogInput, 5)).as_text(),
            Some("analog-input,5".to_string())
        );
    }

    #[test]
    fn bit_string_bits() {
        let flags = BacnetValue::BitString {
            unused_bits: 4,
            data: vec![0b0100_0000],
        };
        assert_eq!(flags.bits(), Some(vec![false, true, false, false]));
        assert_eq!(flags.to_string(), "0100");
    }
}
