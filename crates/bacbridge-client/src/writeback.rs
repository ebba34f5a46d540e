//! Forwarding of BACnet-side writes on published objects to host services.

use crate::host::{HostPlatform, ServiceCall};
use crate::mapping::{Mapping, PublishedType, WriteAction};
use bacbridge_core::codec::{as_float, as_int, truthy};
use bacbridge_core::{BacnetValue, HostValue};

const TOGGLE_DOMAINS: [&str; 4] = ["light", "switch", "fan", "group"];
const NUMBER_DOMAINS: [&str; 2] = ["number", "input_number"];

/// Host view of a value written over BACnet.
pub fn host_value(value: &BacnetValue) -> HostValue {
    match value {
        BacnetValue::Null => HostValue::Null,
        BacnetValue::Boolean(v) => HostValue::Bool(*v),
        BacnetValue::Unsigned(v) | BacnetValue::Enumerated(v) => HostValue::Number(f64::from(*v)),
        BacnetValue::Signed(v) => HostValue::Number(f64::from(*v)),
        BacnetValue::Real(v) => HostValue::Number(f64::from(*v)),
        BacnetValue::Double(v) => HostValue::Number(*v),
        BacnetValue::List(items) => HostValue::List(items.iter().map(host_value).collect()),
        other => other.as_text().map_or(HostValue::Null, HostValue::Text),
    }
}

/// Whether writes to this mapping can currently be forwarded, judged by the
/// host services available right now.
pub fn is_auto_writable(host: &dyn HostPlatform, mapping: &Mapping) -> bool {
    match mapping.write_action {
        Some(WriteAction::ClimateHvacMode) => return host.has_service("climate", "set_hvac_mode"),
        Some(WriteAction::ClimateTemperature) => return host.has_service("climate", "set_temperature"),
        None => {}
    }
    let domain = mapping.domain();
    if TOGGLE_DOMAINS.contains(&domain) {
        return host.has_service(domain, "turn_on") && host.has_service(domain, "turn_off");
    }
    if domain == "cover" {
        return host.has_service("cover", "open_cover") && host.has_service("cover", "close_cover");
    }
    if NUMBER_DOMAINS.contains(&domain) {
        return host.has_service(domain, "set_value");
    }
    false
}

/// Service call that applies `value` to the mapped entity, `None` when the
/// value cannot be expressed for it.
pub fn service_call_for(mapping: &Mapping, value: &BacnetValue) -> Option<ServiceCall> {
    let entity_id = mapping.entity_id.as_str();
    let value = host_value(value);
    match mapping.write_action {
        Some(WriteAction::ClimateHvacMode) => {
            let mode = if mapping.object_type == PublishedType::MultiStateValue {
                let states = mapping.state_labels();
                let index = as_int(&value).unwrap_or(0);
                let Some(label) = usize::try_from(index)
                    .ok()
                    .and_then(|index| index.checked_sub(1))
                    .and_then(|pos| states.get(pos))
                else {
                    log::warn!("hvac mode index {value} out of range for {entity_id}");
                    return None;
                };
                label.to_lowercase()
            } else if truthy(&value) {
                mapping.on_mode().to_string()
            } else {
                mapping.off_mode().to_string()
            };
            return Some(ServiceCall::new("climate", "set_hvac_mode", entity_id).with("hvac_mode", mode));
        }
        Some(WriteAction::ClimateTemperature) => {
            let temperature = as_float(&value)?;
            return Some(
                ServiceCall::new("climate", "set_temperature", entity_id).with("temperature", temperature),
            );
        }
        None => {}
    }

    let domain = mapping.domain();
    if TOGGLE_DOMAINS.contains(&domain) {
        let service = if truthy(&value) { "turn_on" } else { "turn_off" };
        return Some(ServiceCall::new(domain, service, entity_id));
    }
    if domain == "cover" {
        let service = if truthy(&value) { "open_cover" } else { "close_cover" };
        return Some(ServiceCall::new("cover", service, entity_id));
    }
    if NUMBER_DOMAINS.contains(&domain) {
        let number = as_float(&value)?;
        return Some(ServiceCall::new(domain, "set_value", entity_id).with("value", number));
    }
    None
}

/// Forwards a BACnet-side write to the host. Returns the call that was made.
pub fn forward_to_host(host: &dyn HostPlatform, mapping: &Mapping, value: &BacnetValue) -> Option<ServiceCall> {
    if !is_auto_writable(host, mapping) {
        log::debug!("write to {} not forwarded: host services unavailable", mapping.entity_id);
        return None;
    }
    let Some(call) = service_call_for(mapping, value) else {
        log::debug!("write {value} to {} has no host action", mapping.entity_id);
        return None;
    };
    log::info!("forwarding to {}.{} {:?}", call.domain, call.service, call.data);
    host.call_service(call.clone());
    Some(call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    fn data(call: &ServiceCall, key: &str) -> Option<HostValue> {
        call.data.get(key).cloned()
    }

    #[test]
    fn toggles_binary_domains() {
        let host = MemoryHost::new();
        let mapping = Mapping::new("light.kitchen", PublishedType::BinaryValue, 1);
        assert!(forward_to_host(&host, &mapping, &BacnetValue::Enumerated(1)).is_none());

        host.register_service("light", "turn_on");
        host.register_service("light", "turn_off");
        let call = forward_to_host(&host, &mapping, &BacnetValue::Enumerated(1)).expect("call");
        assert_eq!((call.domain.as_str(), call.service.as_str()), ("light", "turn_on"));
        let call = forward_to_host(&host, &mapping, &BacnetValue::Enumerated(0)).expect("call");
        assert_eq!(call.service, "turn_off");
        assert_eq!(host.calls().len(), 2);
    }

    #[test]
    fn covers_open_and_close() {
        let mapping = Mapping::new("cover.garage", PublishedType::BinaryValue, 1);
        let call = service_call_for(&mapping, &BacnetValue::Boolean(true)).expect("call");
        assert_eq!(call.service, "open_cover");
        let call = service_call_for(&mapping, &BacnetValue::CharacterString("inactive".into()))
            .expect("call");
        assert_eq!(call.service, "close_cover");
    }

    #[test]
    fn numbers_set_value() {
        let mapping = Mapping::new("input_number.setpoint", PublishedType::AnalogValue, 1);
        let call = service_call_for(&mapping, &BacnetValue::Real(21.5)).expect("call");
        assert_eq!(call.service, "set_value");
        assert_eq!(data(&call, "value"), Some(HostValue::Number(21.5)));
        assert!(service_call_for(&mapping, &BacnetValue::CharacterString("n/a".into())).is_none());
    }

    #[test]
    fn climate_modes_follow_mapping() {
        let mut binary = Mapping::new("climate.living", PublishedType::BinaryValue, 1);
        binary.write_action = Some(WriteAction::ClimateHvacMode);
        let call = service_call_for(&binary, &BacnetValue::Enumerated(1)).expect("call");
        assert_eq!(data(&call, "hvac_mode"), Some(HostValue::from("heat")));
        let call = service_call_for(&binary, &BacnetValue::Enumerated(0)).expect("call");
        assert_eq!(data(&call, "hvac_mode"), Some(HostValue::from("off")));

        let mut multi = Mapping::new("climate.living", PublishedType::MultiStateValue, 2);
        multi.write_action = Some(WriteAction::ClimateHvacMode);
        multi.mv_states = vec!["off".into(), "Heat".into(), "cool".into()];
        let call = service_call_for(&multi, &BacnetValue::Unsigned(2)).expect("call");
        assert_eq!(data(&call, "hvac_mode"), Some(HostValue::from("heat")));
        assert!(service_call_for(&multi, &BacnetValue::Unsigned(4)).is_none());
        assert!(service_call_for(&multi, &BacnetValue::Unsigned(0)).is_none());
    }

    #[test]
    fn climate_writes_need_climate_services() {
        let host = MemoryHost::new();
        let mut target = Mapping::new("climate.living", PublishedType::AnalogValue, 3);
        target.write_action = Some(WriteAction::ClimateTemperature);
        assert!(!is_auto_writable(&host, &target));
        host.register_service("climate", "set_temperature");
        assert!(is_auto_writable(&host, &target));

        let call = forward_to_host(&host, &target, &BacnetValue::Real(22.0)).expect("call");
        assert_eq!(data(&call, "temperature"), Some(HostValue::Number(22.0)));
    }

    #[test]
    fn unknown_domains_are_not_writable() {
        let host = MemoryHost::new();
        host.register_service("sensor", "set_value");
        let mapping = Mapping::new("sensor.outdoor", PublishedType::AnalogValue, 1);
        assert!(!is_auto_writable(&host, &mapping));
        assert!(service_call_for(&mapping, &BacnetValue::Real(1.0)).is_none());
    }
}
