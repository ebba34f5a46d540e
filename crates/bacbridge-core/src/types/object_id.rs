use crate::error::ParseError;
use crate::types::ObjectType;
use std::fmt;
use std::str::FromStr;

/// Largest instance number a BACnet object identifier can carry.
pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

/// A packed BACnet object identifier combining an [`ObjectType`] and a 22-bit
/// instance number into a single `u32`.
///
/// The text form is the compact `type,instance` pair (`analog-input,5`). Parsing
/// also accepts `:` or whitespace as separator and any spelling understood by
/// [`ObjectType::from_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectId(u32);

impl ObjectId {
    /// Creates an `ObjectId` from a type and instance number.
    pub const fn new(object_type: ObjectType, instance: u32) -> Self {
        Self((((object_type.to_u16() as u32) & 0x03FF) << 22) | (instance & MAX_INSTANCE))
    }

    /// Like [`new`](Self::new) but rejects instances outside the 22-bit range
    /// instead of truncating them.
    pub fn checked(object_type: ObjectType, instance: u32) -> Result<Self, ParseError> {
        if instance > MAX_INSTANCE {
            return Err(ParseError::InstanceOutOfRange(instance));
        }
        Ok(Self::new(object_type, instance))
    }

    /// Shorthand for the device object of `instance`.
    pub const fn device(instance: u32) -> Self {
        Self::new(ObjectType::Device, instance)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn object_type(self) -> ObjectType {
        ObjectType::from_u16(((self.0 >> 22) & 0x03FF) as u16)
    }

    pub const fn instance(self) -> u32 {
        self.0 & MAX_INSTANCE
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.object_type(), self.instance())
    }
}

impl FromStr for ObjectId {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let split = trimmed
            .rfind(|c: char| c == ',' || c == ':' || c.is_whitespace())
            .ok_or_else(|| ParseError::InvalidObjectId(trimmed.to_string()))?;
        let (type_part, instance_part) = trimmed.split_at(split);
        let separator_len = instance_part.chars().next().map_or(0, char::len_utf8);
        let instance = instance_part[separator_len..]
            .trim()
            .parse::<u32>()
            .map_err(|_| ParseError::InvalidObjectId(trimmed.to_string()))?;
        let type_part =
            type_part.trim_end_matches(|c: char| c == ',' || c == ':' || c.is_whitespace());
        let object_type = ObjectType::from_name(type_part)
            .ok_or_else(|| ParseError::UnknownObjectType(type_part.to_string()))?;
        Self::checked(object_type, instance)
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectId;
    use crate::error::ParseError;
    use crate::types::ObjectType;

    #[test]
    fn packs_type_and_instance() {
        let id = ObjectId::new(ObjectType::AnalogInput, 1);
        assert_eq!(id.object_type(), ObjectType::AnalogInput);
        assert_eq!(id.instance(), 1);
        assert_eq!(ObjectId::device(1001).object_type(), ObjectType::Device);
    }

    #[test]
    fn compact_text_form() {
        let id = ObjectId::new(ObjectType::BinaryValue, 2);
        assert_eq!(id.to_string(), "binary-value,2");
        assert_eq!("binary-value,2".parse::<ObjectId>(), Ok(id));
        assert_eq!("binaryValue:2".parse::<ObjectId>(), Ok(id));
        assert_eq!("binary value 2".parse::<ObjectId>(), Ok(id));
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(matches!(
            "device".parse::<ObjectId>(),
            Err(ParseError::InvalidObjectId(_))
        ));
        assert!(matches!(
            "device,abc".parse::<ObjectId>(),
            Err(ParseError::InvalidObjectId(_))
        ));
        assert_eq!(
            "device,4194304".parse::<ObjectId>(),
            Err(ParseError::InstanceOutOfRange(4_194_304))
        );
    }
}
