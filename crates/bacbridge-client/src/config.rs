//! Bridge timing and sizing configuration.

use crate::BridgeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing constants and limits for discovery, import and subscriptions.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Instance of the local BACnet device; excluded from discovery results.
    pub local_instance: Option<u32>,
    pub discovery_timeout_secs: f64,
    /// Wait for the global-broadcast fallback when the first Who-Is is silent.
    pub global_discovery_timeout_secs: f64,
    pub read_timeout_secs: f64,
    pub object_list_read_timeout_secs: f64,
    pub bulk_read_timeout_secs: f64,
    pub write_timeout_secs: f64,
    /// Maximum object-list entries inspected per device.
    pub point_scan_limit: u32,
    /// Object-list entries searched for a network-port object.
    pub network_port_scan_limit: u32,
    pub cov_lease_secs: u32,
    pub cov_retry_floor_secs: f64,
    pub cov_retry_cap_secs: f64,
    /// Process-identifier offsets tried when a context already exists.
    pub cov_offset_attempts: u32,
    pub cov_close_timeout_secs: f64,
    pub rescan_min_interval_secs: f64,
    pub refresh_min_interval_secs: f64,
    pub diagnostics_interval_secs: f64,
    pub rediscovery_interval_secs: f64,
    /// Command priority for commandable outputs.
    pub write_priority: u8,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            local_instance: None,
            discovery_timeout_secs: 3.0,
            global_discovery_timeout_secs: 5.0,
            read_timeout_secs: 2.5,
            object_list_read_timeout_secs: 0.6,
            bulk_read_timeout_secs: 6.0,
            write_timeout_secs: 2.5,
            point_scan_limit: 128,
            network_port_scan_limit: 16,
            cov_lease_secs: 300,
            cov_retry_floor_secs: 10.0,
            cov_retry_cap_secs: 300.0,
            cov_offset_attempts: 3,
            cov_close_timeout_secs: 2.0,
            rescan_min_interval_secs: 10.0,
            refresh_min_interval_secs: 55.0,
            diagnostics_interval_secs: 60.0,
            rediscovery_interval_secs: 60.0,
            write_priority: 16,
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}

impl BridgeConfig {
    /// Rejects values that would make timers panic or requests meaningless.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let durations = [
            ("discovery_timeout_secs", self.discovery_timeout_secs),
            ("global_discovery_timeout_secs", self.global_discovery_timeout_secs),
            ("read_timeout_secs", self.read_timeout_secs),
            ("object_list_read_timeout_secs", self.object_list_read_timeout_secs),
            ("bulk_read_timeout_secs", self.bulk_read_timeout_secs),
            ("write_timeout_secs", self.write_timeout_secs),
            ("cov_retry_floor_secs", self.cov_retry_floor_secs),
            ("cov_retry_cap_secs", self.cov_retry_cap_secs),
            ("cov_close_timeout_secs", self.cov_close_timeout_secs),
            ("rescan_min_interval_secs", self.rescan_min_interval_secs),
            ("refresh_min_interval_secs", self.refresh_min_interval_secs),
            ("diagnostics_interval_secs", self.diagnostics_interval_secs),
            ("rediscovery_interval_secs", self.rediscovery_interval_secs),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value <= 0.0 || value > 86_400.0 {
                return Err(BridgeError::Config(format!(
                    "{name} must be between 0 and 86400 seconds, got {value}"
                )));
            }
        }
        if self.cov_retry_cap_secs < self.cov_retry_floor_secs {
            return Err(BridgeError::Config(
                "cov_retry_cap_secs must not be below cov_retry_floor_secs".into(),
            ));
        }
        if !(1..=16).contains(&self.write_priority) {
            return Err(BridgeError::Config(format!(
                "write_priority must be 1..=16, got {}",
                self.write_priority
            )));
        }
        if self.point_scan_limit == 0 || self.cov_lease_secs == 0 || self.cov_offset_attempts == 0 {
            return Err(BridgeError::Config(
                "point_scan_limit, cov_lease_secs and cov_offset_attempts must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn discovery_timeout(&self) -> Duration {
        secs(self.discovery_timeout_secs)
    }

    pub fn global_discovery_timeout(&self) -> Duration {
        secs(self.global_discovery_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        secs(self.read_timeout_secs)
    }

    pub fn object_list_read_timeout(&self) -> Duration {
        secs(self.object_list_read_timeout_secs)
    }

    pub fn bulk_read_timeout(&self) -> Duration {
        secs(self.bulk_read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        secs(self.write_timeout_secs)
    }

    pub fn cov_lease(&self) -> Duration {
        Duration::from_secs(u64::from(self.cov_lease_secs))
    }

    pub fn cov_retry_floor(&self) -> Duration {
        secs(self.cov_retry_floor_secs)
    }

    pub fn cov_retry_cap(&self) -> Duration {
        secs(self.cov_retry_cap_secs)
    }

    pub fn cov_close_timeout(&self) -> Duration {
        secs(self.cov_close_timeout_secs)
    }

    pub fn rescan_min_interval(&self) -> Duration {
        secs(self.rescan_min_interval_secs)
    }

    pub fn refresh_min_interval(&self) -> Duration {
        secs(self.refresh_min_interval_secs)
    }

    pub fn diagnostics_interval(&self) -> Duration {
        secs(self.diagnostics_interval_secs)
    }

    pub fn rediscovery_interval(&self) -> Duration {
        secs(self.rediscovery_interval_secs)
    }
}
