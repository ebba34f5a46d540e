use super::normalize_token;
use std::fmt;

macro_rules! property_ids {
    ($($variant:ident = $code:literal => $name:literal,)+) => {
        /// BACnet property identifiers.
        ///
        /// Properties the bridge reads, writes or subscribes to are named
        /// variants; everything else is [`Proprietary`](Self::Proprietary).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum PropertyId {
            $($variant,)+
            Proprietary(u32),
        }

        impl PropertyId {
            pub const fn to_u32(self) -> u32 {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Proprietary(v) => v,
                }
            }

            pub const fn from_u32(value: u32) -> Self {
                match value {
                    $($code => Self::$variant,)+
                    v => Self::Proprietary(v),
                }
            }

            /// The camel-case identifier, e.g. `presentValue`.
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

property_ids! {
    ActiveText = 4 => "activeText",
    ApplicationSoftwareVersion = 12 => "applicationSoftwareVersion",
    CovIncrement = 22 => "covIncrement",
    Description = 28 => "description",
    FirmwareRevision = 44 => "firmwareRevision",
    InactiveText = 46 => "inactiveText",
    Location = 58 => "location",
    ModelName = 70 => "modelName",
    NumberOfStates = 74 => "numberOfStates",
    ObjectIdentifier = 75 => "objectIdentifier",
    ObjectList = 76 => "objectList",
    ObjectName = 77 => "objectName",
    ObjectType = 79 => "objectType",
    OutOfService = 81 => "outOfService",
    PresentValue = 85 => "presentValue",
    PriorityArray = 87 => "priorityArray",
    Reliability = 103 => "reliability",
    RelinquishDefault = 104 => "relinquishDefault",
    StateText = 110 => "stateText",
    StatusFlags = 111 => "statusFlags",
    SystemStatus = 112 => "systemStatus",
    Units = 117 => "units",
    VendorIdentifier = 120 => "vendorIdentifier",
    VendorName = 121 => "vendorName",
    SerialNumber = 372 => "serialNumber",
    IpAddress = 400 => "ipAddress",
    IpSubnetMask = 411 => "ipSubnetMask",
    BacnetIpUdpPort = 412 => "bacnetIpUdpPort",
    MacAddress = 423 => "macAddress",
}

impl PropertyId {
    /// Resolves a property identifier from text such as `presentValue`,
    /// `present-value`, `PropertyIdentifier.presentValue` or `85`.
    pub fn from_name(text: &str) -> Option<Self> {
        let tail = text.rsplit('.').next().unwrap_or(text);
        let key = normalize_token(tail);
        if key.is_empty() {
            return None;
        }
        if let Ok(code) = key.parse::<u32>() {
            return Some(Self::from_u32(code));
        }
        Self::KNOWN
            .iter()
            .copied()
            .find(|prop| prop.name().is_some_and(|name| normalize_token(name) == key))
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "proprietary-{}", self.to_u32()),
        }
    }
}
