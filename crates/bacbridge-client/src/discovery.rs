//! Remote device discovery via Who-Is / I-Am.

use crate::app::{BacnetApp, IAm, WhoIsTarget};
use crate::config::BridgeConfig;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::timeout;

/// Extra time granted to the engine beyond the Who-Is wait before the
/// request is abandoned.
const WHO_IS_SLACK: Duration = Duration::from_secs(1);

/// A device that answered Who-Is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DiscoveredDevice {
    pub instance: u32,
    pub address: String,
}

/// Discovers remote devices.
///
/// Issues the engine's default Who-Is first and falls back to a global
/// broadcast only when nothing answered. Responses without a parsable
/// device identifier or source are skipped, the local device is excluded,
/// and the result is deduplicated and ordered by `(instance, address)`.
/// Failures of the engine yield an empty list.
pub async fn discover_devices(app: &dyn BacnetApp, config: &BridgeConfig) -> Vec<DiscoveredDevice> {
    let mut responses = who_is_round(app, WhoIsTarget::Default, config.discovery_timeout()).await;
    if responses.is_empty() {
        responses = who_is_round(
            app,
            WhoIsTarget::GlobalBroadcast,
            config.global_discovery_timeout(),
        )
        .await;
    }

    let raw = responses.len();
    let mut found = BTreeSet::new();
    for i_am in responses {
        let instance = i_am.device_instance();
        let source = i_am
            .source
            .as_deref()
            .map(str::trim)
            .filter(|source| !source.is_empty());
        let (Some(instance), Some(source)) = (instance, source) else {
            log::debug!("ignoring I-Am with unparsable payload: {i_am:?}");
            continue;
        };
        if config.local_instance == Some(instance) {
            continue;
        }
        found.insert(DiscoveredDevice {
            instance,
            address: source.to_string(),
        });
    }

    if found.is_empty() {
        log::debug!(
            "discovery returned no usable I-Am responses (raw={raw}, local_instance={:?})",
            config.local_instance
        );
    } else {
        log::debug!("discovered {} BACnet device(s)", found.len());
    }
    found.into_iter().collect()
}

async fn who_is_round(app: &dyn BacnetApp, target: WhoIsTarget, wait: Duration) -> Vec<IAm> {
    match timeout(wait + WHO_IS_SLACK, app.who_is(target, wait)).await {
        Ok(Ok(responses)) => {
            log::debug!("who-is {target:?} returned {} response(s)", responses.len());
            responses
        }
        Ok(Err(err)) => {
            log::debug!("who-is {target:?} failed: {err}");
            Vec::new()
        }
        Err(_) => {
            log::debug!("who-is {target:?} did not finish within {wait:?}");
            Vec::new()
        }
    }
}

/// Resolves the current address of `instance`.
///
/// A non-blank `known` address (from an I-Am or an explicit scan) is
/// authoritative; otherwise the device is looked up by discovery.
pub async fn resolve_address(
    app: &dyn BacnetApp,
    config: &BridgeConfig,
    instance: u32,
    known: Option<&str>,
) -> Option<String> {
    if let Some(address) = known.map(str::trim).filter(|address| !address.is_empty()) {
        return Some(address.to_string());
    }
    discover_devices(app, config)
        .await
        .into_iter()
        .find(|device| device.instance == instance)
        .map(|device| device.address)
}
