//! BACnet engineering units and their host-side symbols.

use super::normalize_token;

macro_rules! engineering_units {
    ($($variant:ident = $code:literal => $name:literal, $symbol:literal;)+) => {
        /// The subset of BACnet engineering units the bridge translates.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum EngineeringUnits {
            $($variant,)+
        }

        impl EngineeringUnits {
            pub const fn code(self) -> u32 {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            pub const fn from_code(code: u32) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// The camel-case enumeration name, e.g. `degreesFahrenheit`.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            /// Display symbol used on the host side, e.g. `°F`.
            pub const fn symbol(self) -> &'static str {
                match self {
                    $(Self::$variant => $symbol,)+
                }
            }

            const ALL: &'static [Self] = &[$(Self::$variant,)+];
        }
    };
}

engineering_units! {
    Milliamperes = 2 => "milliamperes", "mA";
    Amperes = 3 => "amperes", "A";
    Volts = 5 => "volts", "V";
    Kilovolts = 6 => "kilovolts", "kV";
    WattHours = 18 => "wattHours", "Wh";
    KilowattHours = 19 => "kilowattHours", "kWh";
    Hertz = 27 => "hertz", "Hz";
    Millimeters = 30 => "millimeters", "mm";
    Meters = 31 => "meters", "m";
    Luxes = 37 => "luxes", "lx";
    Watts = 47 => "watts", "W";
    Kilowatts = 48 => "kilowatts", "kW";
    Pascals = 53 => "pascals", "Pa";
    Kilopascals = 54 => "kilopascals", "kPa";
    Bars = 55 => "bars", "bar";
    DegreesCelsius = 62 => "degreesCelsius", "°C";
    DegreesKelvin = 63 => "degreesKelvin", "K";
    DegreesFahrenheit = 64 => "degreesFahrenheit", "°F";
    MetersPerSecond = 74 => "metersPerSecond", "m/s";
    KilometersPerHour = 75 => "kilometersPerHour", "km/h";
    CubicMetersPerSecond = 85 => "cubicMetersPerSecond", "m3/s";
    LitersPerMinute = 88 => "litersPerMinute", "L/min";
    NoUnits = 95 => "noUnits", "";
    PartsPerMillion = 96 => "partsPerMillion", "ppm";
    Percent = 98 => "percent", "%";
    Centimeters = 118 => "centimeters", "cm";
    Millivolts = 124 => "millivolts", "mV";
    Kilohertz = 129 => "kilohertz", "kHz";
    Megahertz = 130 => "megahertz", "MHz";
    Millibars = 134 => "millibars", "mbar";
    CubicMetersPerHour = 135 => "cubicMetersPerHour", "m3/h";
    LitersPerHour = 136 => "litersPerHour", "L/h";
}

impl EngineeringUnits {
    /// Matches the enumeration name in any spelling (`degrees-fahrenheit`,
    /// `DEGREES_FAHRENHEIT`, singular `degreeFahrenheit`, ...).
    pub fn from_name(text: &str) -> Option<Self> {
        let key = normalize_token(text);
        if key.is_empty() {
            return None;
        }
        Self::ALL.iter().copied().find(|unit| {
            let name = normalize_token(unit.name());
            name == key || name.replacen("degrees", "degree", 1) == key || name == format!("{key}s")
        })
    }

    /// Resolves a host unit of measurement (`°C`, `kWh`, `m3/h`) or a BACnet
    /// enumeration name to a unit.
    pub fn from_host_uom(uom: &str) -> Option<Self> {
        if let Some(unit) = Self::from_name(uom) {
            return Some(unit);
        }
        let key = host_uom_key(uom);
        if key.is_empty() {
            return None;
        }
        let unit = match key.as_str() {
            "°c" => Self::DegreesCelsius,
            "°f" => Self::DegreesFahrenheit,
            "k" => Self::DegreesKelvin,
            "l/min" => Self::LitersPerMinute,
            "l/h" => Self::LitersPerHour,
            other => {
                return Self::ALL
                    .iter()
                    .copied()
                    .find(|unit| !unit.symbol().is_empty() && unit.symbol().to_lowercase() == other)
            }
        };
        Some(unit)
    }
}

/// Turns a raw unit read from a remote device into the host display form.
///
/// Known enumeration names and numeric codes become their symbol; `c`/`degC`
/// and `f`/`degF` are accepted as shorthands; anything else is passed through
/// trimmed. Blank input yields `None`.
pub fn normalize_unit_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let key = normalize_token(trimmed);
    let unit = match key.parse::<u32>() {
        Ok(code) => match EngineeringUnits::from_code(code) {
            Some(unit) => Some(unit),
            None => return Some(trimmed.to_string()),
        },
        Err(_) => EngineeringUnits::from_name(trimmed),
    };
    if let Some(unit) = unit {
        let symbol = unit.symbol();
        return (!symbol.is_empty()).then(|| symbol.to_string());
    }
    match key.as_str() {
        "c" | "degc" => Some("°C".to_string()),
        "f" | "degf" => Some("°F".to_string()),
        _ => Some(trimmed.to_string()),
    }
}

/// Default change-of-value increment for a locally published analog object,
/// chosen from the unit of measurement of its source.
pub fn default_cov_increment(uom: Option<&str>) -> f32 {
    let Some(uom) = uom else {
        return 0.5;
    };
    match host_uom_key(uom).as_str() {
        "°c" | "°f" | "k" => 0.2,
        "%" => 2.0,
        "w" => 5.0,
        "kw" => 0.1,
        "v" => 0.5,
        "mv" => 5.0,
        "kv" => 0.01,
        "a" => 0.1,
        "ma" => 1.0,
        "ka" => 0.01,
        "pa" => 10.0,
        "kpa" | "mbar" | "bar" => 0.1,
        "lx" => 10.0,
        "ppm" => 50.0,
        "wh" => 100.0,
        "kwh" => 0.1,
        _ => 0.5,
    }
}

fn host_uom_key(uom: &str) -> String {
    uom.trim()
        .to_lowercase()
        .replace("° c", "°c")
        .replace("° f", "°f")
        .replace(" c", "°c")
        .replace(" f", "°f")
}

#[cfg(test)]
mod tests {
    use super::{default_cov_increment, normalize_unit_text, EngineeringUnits};

    #[test]
    fn codes_and_names_agree() {
        for unit in EngineeringUnits::ALL {
            assert_eq!(EngineeringUnits::from_code(unit.code()), Some(*unit));
            assert_eq!(EngineeringUnits::from_name(unit.name()), Some(*unit));
        }
        assert_eq!(EngineeringUnits::from_code(64), Some(EngineeringUnits::DegreesFahrenheit));
        assert_eq!(EngineeringUnits::from_code(9999), None);
    }

    #[test]
    fn normalizes_remote_unit_text() {
        assert_eq!(normalize_unit_text("degreesFahrenheit").as_deref(), Some("°F"));
        assert_eq!(normalize_unit_text("degree-celsius").as_deref(), Some("°C"));
        assert_eq!(normalize_unit_text("64").as_deref(), Some("°F"));
        assert_eq!(normalize_unit_text("degF").as_deref(), Some("°F"));
        assert_eq!(normalize_unit_text("kilowattHours").as_deref(), Some("kWh"));
        assert_eq!(normalize_unit_text(" furlongs ").as_deref(), Some("furlongs"));
        assert_eq!(normalize_unit_text("   "), None);
        assert_eq!(normalize_unit_text("noUnits"), None);
    }

    #[test]
    fn resolves_host_units() {
        assert_eq!(EngineeringUnits::from_host_uom("°C"), Some(EngineeringUnits::DegreesCelsius));
        assert_eq!(EngineeringUnits::from_host_uom("° F"), Some(EngineeringUnits::DegreesFahrenheit));
        assert_eq!(EngineeringUnits::from_host_uom("kWh"), Some(EngineeringUnits::KilowattHours));
        assert_eq!(EngineeringUnits::from_host_uom("m3/h"), Some(EngineeringUnits::CubicMetersPerHour));
        assert_eq!(EngineeringUnits::from_host_uom("L/min"), Some(EngineeringUnits::LitersPerMinute));
        assert_eq!(EngineeringUnits::from_host_uom("percent"), Some(EngineeringUnits::Percent));
        assert_eq!(EngineeringUnits::from_host_uom("widgets"), None);
    }

    #[test]
    fn cov_increment_follows_unit() {
        assert_eq!(default_cov_increment(Some("°C")), 0.2);
        assert_eq!(default_cov_increment(Some("%")), 2.0);
        assert_eq!(default_cov_increment(Some("kWh")), 0.1);
        assert_eq!(default_cov_increment(Some("ppm")), 50.0);
        assert_eq!(default_cov_increment(None), 0.5);
        assert_eq!(default_cov_increment(Some("widgets")), 0.5);
    }
}
