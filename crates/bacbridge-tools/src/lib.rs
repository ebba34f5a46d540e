use bacbridge_client::{BridgeConfig, Mapping};
use bacbridge_core::PointType;
use clap::ValueEnum;
use serde::Deserialize;
use std::path::Path;

/// CLI-friendly enum for selecting importable point types.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PointTypeArg {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    MultiStateValue,
    CharacterStringValue,
}

impl PointTypeArg {
    pub const fn into_point_type(self) -> PointType {
        match self {
            Self::AnalogInput => PointType::AnalogInput,
            Self::AnalogOutput => PointType::AnalogOutput,
            Self::AnalogValue => PointType::AnalogValue,
            Self::BinaryInput => PointType::BinaryInput,
            Self::BinaryOutput => PointType::BinaryOutput,
            Self::BinaryValue => PointType::BinaryValue,
            Self::MultiStateValue => PointType::MultiStateValue,
            Self::CharacterStringValue => PointType::CharacterStringValue,
        }
    }
}

/// Bridge settings plus publisher mappings, as read from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeFile {
    pub bridge: BridgeConfig,
    pub mappings: Vec<Mapping>,
}

impl BridgeFile {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&text)?;
        file.bridge.validate()?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::BridgeFile;
    use bacbridge_client::PublishedType;

    #[test]
    fn parses_partial_files() {
        let file: BridgeFile = serde_json::from_str(
            r#"{
                "bridge": {"local_instance": 4000, "read_timeout_secs": 1.5},
                "mappings": [{"entity_id": "sensor.oat", "object_type": "analogValue", "instance": 1}]
            }"#,
        )
        .unwrap();
        assert_eq!(file.bridge.local_instance, Some(4000));
        assert_eq!(file.bridge.cov_lease_secs, 300);
        assert_eq!(file.mappings.len(), 1);
        assert_eq!(file.mappings[0].object_type, PublishedType::AnalogValue);

        let empty: BridgeFile = serde_json::from_str("{}").unwrap();
        assert!(empty.mappings.is_empty());
    }
}
