use super::normalize_token;
use std::fmt;

macro_rules! object_types {
    ($($variant:ident = $code:literal => $name:literal,)+) => {
        /// BACnet object type identifiers.
        ///
        /// Standard types used by the bridge are named variants; anything else
        /// (including vendor-specific types) is [`Proprietary`](Self::Proprietary).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum ObjectType {
            $($variant,)+
            Proprietary(u16),
        }

        impl ObjectType {
            /// Converts this object type to its numeric BACnet identifier.
            pub const fn to_u16(self) -> u16 {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Proprietary(v) => v,
                }
            }

            /// Creates an `ObjectType` from its numeric BACnet identifier.
            pub const fn from_u16(value: u16) -> Self {
                match value {
                    $($code => Self::$variant,)+
                    v => Self::Proprietary(v),
                }
            }

            /// The hyphenated standard name, e.g. `analog-input`.
            pub const fn name(self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => Some($name),)+
                    Self::Proprietary(_) => None,
                }
            }

            const KNOWN: &'static [Self] = &[$(Self::$variant,)+];
        }
    };
}

object_types! {
    AnalogInput = 0 => "analog-input",
    AnalogOutput = 1 => "analog-output",
    AnalogValue = 2 => "analog-value",
    BinaryInput = 3 => "binary-input",
    BinaryOutput = 4 => "binary-output",
    BinaryValue = 5 => "binary-value",
    Calendar = 6 => "calendar",
    Command = 7 => "command",
    Device = 8 => "device",
    EventEnrollment = 9 => "event-enrollment",
    File = 10 => "file",
    Group = 11 => "group",
    Loop = 12 => "loop",
    MultiStateInput = 13 => "multi-state-input",
    MultiStateOutput = 14 => "multi-state-output",
    NotificationClass = 15 => "notification-class",
    Program = 16 => "program",
    Schedule = 17 => "schedule",
    Averaging = 18 => "averaging",
    MultiStateValue = 19 => "multi-state-value",
    TrendLog = 20 => "trend-log",
    Accumulator = 23 => "accumulator",
    PulseConverter = 24 => "pulse-converter",
    EventLog = 25 => "event-log",
    TrendLogMultiple = 27 => "trend-log-multiple",
    StructuredView = 29 => "structured-view",
    CharacterStringValue = 40 => "characterstring-value",
    NetworkPort = 56 => "network-port",
}

impl ObjectType {
    /// Resolves a textual object type in any common spelling.
    ///
    /// Accepts the hyphenated standard name, camel case (`analogInput`),
    /// upper snake case, a bare numeric code, and `proprietary-<n>`.
    pub fn from_name(text: &str) -> Option<Self> {
        let key = normalize_token(text);
        if key.is_empty() {
            return None;
        }
        if let Ok(code) = key.parse::<u16>() {
            return Some(Self::from_u16(code));
        }
        if let Some(code) = key.strip_prefix("proprietary") {
            return code.parse::<u16>().ok().map(Self::Proprietary);
        }
        Self::KNOWN
            .iter()
            .copied()
            .find(|ty| ty.name().is_some_and(|name| normalize_token(name) == key))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "proprietary-{}", self.to_u16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectType;

    #[test]
    fn numeric_codes_round_trip_through_known_types() {
        for ty in ObjectType::KNOWN {
            assert_eq!(ObjectType::from_u16(ty.to_u16()), *ty);
        }
        assert_eq!(ObjectType::from_u16(700), ObjectType::Proprietary(700));
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!(ObjectType::from_name("analogInput"), Some(ObjectType::AnalogInput));
        assert_eq!(
            ObjectType::from_name("MULTI_STATE_VALUE"),
            Some(ObjectType::MultiStateValue)
        );
        assert_eq!(ObjectType::from_name("network-port"), Some(ObjectType::NetworkPort));
        assert_eq!(ObjectType::from_name("8"), Some(ObjectType::Device));
        assert_eq!(
            ObjectType::from_name("proprietary-700"),
            Some(ObjectType::Proprietary(700))
        );
        assert_eq!(ObjectType::from_name("toaster"), None);
        assert_eq!(ObjectType::from_name(""), None);
    }

    #[test]
    fn displays_standard_name() {
        assert_eq!(ObjectType::CharacterStringValue.to_string(), "characterstring-value");
        assert_eq!(ObjectType::Proprietary(512).to_string(), "proprietary-512");
    }
}
