//! Device diagnostics: device-object and network-port properties of remote
//! devices, refreshed into the shared cache.

use crate::cache::{DeviceEntry, DeviceInfo, NetworkInfo, SharedCache};
use crate::discovery::resolve_address;
use crate::importer::{object_list_item, object_list_len};
use crate::reader::PropertyReader;
use crate::signals::device_id;
use bacbridge_core::codec::SystemStatus;
use bacbridge_core::types::{ObjectId, ObjectType, PropertyId};
use bacbridge_core::BacnetValue;
use std::sync::Arc;
use tokio::time::Instant;

/// Renders a 4-byte octet string or dotted-quad text as an IPv4 address.
pub fn ipv4_text(value: &BacnetValue) -> Option<String> {
    match value {
        BacnetValue::OctetString(bytes) if bytes.len() == 4 => Some(format!(
            "{}.{}.{}.{}",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )),
        BacnetValue::CharacterString(text) => {
            let text = text.trim();
            let octets: Vec<&str> = text.split('.').collect();
            let dotted = octets.len() == 4
                && octets.iter().all(|octet| {
                    (1..=3).contains(&octet.len()) && octet.bytes().all(|b| b.is_ascii_digit())
                });
            dotted.then(|| text.to_string())
        }
        _ => None,
    }
}

/// Upper-case hex form of a MAC address. Text must contain at least six
/// bytes of hex digits; separators are ignored.
pub fn mac_hex(value: &BacnetValue) -> Option<String> {
    match value {
        BacnetValue::OctetString(bytes) if !bytes.is_empty() => {
            Some(bytes.iter().map(|b| format!("{b:02X}")).collect())
        }
        BacnetValue::CharacterString(text) => {
            let hex: String = text
                .chars()
                .filter(char::is_ascii_hexdigit)
                .map(|c| c.to_ascii_uppercase())
                .collect();
            (hex.len() >= 12 && hex.len() % 2 == 0).then_some(hex)
        }
        _ => None,
    }
}

/// `AABBCC` → `AA:BB:CC`.
pub fn mac_colon(hex: &str) -> String {
    hex.as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

/// BACnet/IP MAC (four address octets then the port, big-endian) in hex.
pub fn bacnet_mac_from_ip_port(ip_address: &str, udp_port: u16) -> Option<String> {
    let octets: Vec<u8> = ip_address
        .trim()
        .split('.')
        .map(|part| part.parse::<u8>().ok())
        .collect::<Option<_>>()?;
    if octets.len() != 4 {
        return None;
    }
    let mut hex: String = octets.iter().map(|b| format!("{b:02X}")).collect();
    hex.push_str(&format!("{udp_port:04X}"));
    Some(hex)
}

fn network_port(instance: u32) -> ObjectId {
    ObjectId::new(ObjectType::NetworkPort, instance)
}

/// Reads the diagnostics of one device.
///
/// The device is probed through `objectName`, then `objectIdentifier`; when
/// neither answers the returned entry is offline with no device object.
/// The network-port object is read at `network_port_hint` (default 1) and,
/// when that fails on the default, located through the first entries of
/// the object list.
pub async fn read_device_runtime(
    reader: &PropertyReader,
    instance: u32,
    address: &str,
    network_port_hint: Option<u32>,
) -> DeviceEntry {
    let device = ObjectId::device(instance);
    let mut entry = DeviceEntry::new(instance, address);
    let mut port_instance = network_port_hint.unwrap_or(1).max(1);
    entry.network_port_instance = Some(port_instance);

    let read_text = |prop: PropertyId| async move {
        reader
            .read_optional(address, device, prop)
            .await
            .and_then(|value| value.as_text())
    };

    let object_name = read_text(PropertyId::ObjectName).await;
    let identifier = reader
        .read_optional(address, device, PropertyId::ObjectIdentifier)
        .await;
    if object_name.is_none() && identifier.is_none() {
        log::debug!("device {instance} at {address} did not answer the device-object probe");
        entry.device.object_identifier = Some(instance.to_string());
        return entry;
    }

    let identifier_instance = match identifier {
        Some(BacnetValue::ObjectId(id)) => Some(id.instance()),
        Some(other) => other
            .as_text()
            .and_then(|text| text.parse::<ObjectId>().ok())
            .map(|id| id.instance()),
        None => None,
    }
    .unwrap_or(instance);

    entry.device = DeviceInfo {
        object_identifier: Some(identifier_instance.to_string()),
        object_name,
        description: read_text(PropertyId::Description).await,
        model_name: read_text(PropertyId::ModelName).await,
        vendor_name: read_text(PropertyId::VendorName).await,
        vendor_identifier: reader
            .read_optional(address, device, PropertyId::VendorIdentifier)
            .await
            .and_then(|value| value.as_u32()),
        firmware_revision: read_text(PropertyId::FirmwareRevision).await,
        application_software_version: read_text(PropertyId::ApplicationSoftwareVersion).await,
        serial_number: read_text(PropertyId::SerialNumber).await,
        system_status: reader
            .read_optional(address, device, PropertyId::SystemStatus)
            .await
            .and_then(|value| SystemStatus::from_value(&value))
            .map(|status| status.label().to_string()),
    };
    entry.has_device_object = true;

    let mut port_identifier = reader
        .read_optional(address, network_port(port_instance), PropertyId::ObjectIdentifier)
        .await;
    if port_identifier.is_none() && port_instance == 1 {
        if let Some(found) = find_network_port(reader, address, instance).await {
            port_instance = found;
            port_identifier = reader
                .read_optional(address, network_port(port_instance), PropertyId::ObjectIdentifier)
                .await;
        }
    }
    entry.network_port_instance = Some(port_instance);
    entry.has_network_object = port_identifier.is_some();

    let port = network_port(port_instance);
    let ip_address = reader
        .read_optional(address, port, PropertyId::IpAddress)
        .await
        .and_then(|value| ipv4_text(&value).or_else(|| value.as_text()));
    let subnet_mask = reader
        .read_optional(address, port, PropertyId::IpSubnetMask)
        .await
        .and_then(|value| ipv4_text(&value).or_else(|| value.as_text()));
    let udp_port = reader
        .read_optional(address, port, PropertyId::BacnetIpUdpPort)
        .await
        .and_then(|value| value.as_u32())
        .and_then(|port| u16::try_from(port).ok());
    let mac = reader
        .read_optional(address, port, PropertyId::MacAddress)
        .await
        .and_then(|value| mac_hex(&value))
        .or_else(|| bacnet_mac_from_ip_port(ip_address.as_deref()?, udp_port?));

    entry.network = NetworkInfo {
        object_identifier: port_identifier.as_ref().map(|_| port.to_string()),
        ip_address,
        subnet_mask,
        udp_port,
        mac_address: mac.as_deref().map(mac_colon),
    };

    entry.online = entry.device.object_name.is_some()
        || entry.device.model_name.is_some()
        || entry.device.vendor_name.is_some()
        || entry.device.firmware_revision.is_some()
        || entry.network.ip_address.is_some()
        || entry.network.mac_address.is_some();
    if let Some(name) = &entry.device.object_name {
        entry.name = name.clone();
    }
    entry
}

async fn find_network_port(reader: &PropertyReader, address: &str, instance: u32) -> Option<u32> {
    let len = match object_list_len(reader, address, instance).await {
        Ok(len) => len,
        Err(err) => {
            log::debug!("object list of device {instance} unreadable while locating network port: {err}");
            return None;
        }
    };
    for index in 1..=len.min(reader.config().network_port_scan_limit) {
        let Some((token, found)) = object_list_item(reader, address, instance, index).await else {
            continue;
        };
        if ObjectType::from_name(&token) == Some(ObjectType::NetworkPort) {
            return Some(found);
        }
    }
    None
}

/// Refreshes device diagnostics into the shared cache for one entry.
pub struct DiagnosticsRefresher {
    reader: Arc<PropertyReader>,
    cache: Arc<SharedCache>,
    entry_id: String,
}

impl DiagnosticsRefresher {
    pub fn new(reader: Arc<PropertyReader>, cache: Arc<SharedCache>, entry_id: impl Into<String>) -> Self {
        Self {
            reader,
            cache,
            entry_id: entry_id.into(),
        }
    }

    async fn is_fresh(&self, device_id: &str) -> bool {
        let min_interval = self.reader.config().refresh_min_interval();
        self.cache
            .device(&self.entry_id, device_id)
            .await
            .and_then(|entry| entry.last_refresh)
            .is_some_and(|at| Instant::now().saturating_duration_since(at) < min_interval)
    }

    /// Refreshes `instance`, known at `address` (blank when unknown).
    ///
    /// Skipped when the device was refreshed within the minimum interval,
    /// unless `force`. Returns the stored entry, or `None` when skipped.
    /// Fields that could not be read keep their previous values.
    pub async fn refresh(&self, instance: u32, address: &str, force: bool) -> Option<DeviceEntry> {
        let device_id = device_id(instance);
        if !force && self.is_fresh(&device_id).await {
            return None;
        }

        let lock = self.cache.device_lock(&self.entry_id, &device_id).await;
        let _guard = lock.lock().await;
        if !force && self.is_fresh(&device_id).await {
            return None;
        }

        let previous = self.cache.device(&self.entry_id, &device_id).await;
        let hint = previous.as_ref().and_then(|entry| entry.network_port_instance);
        let resolved = resolve_address(
            self.reader.app().as_ref(),
            self.reader.config(),
            instance,
            Some(address),
        )
        .await
        .unwrap_or_default();

        let mut current = if resolved.is_empty() {
            log::debug!("no address known for device {instance}, marking offline");
            let mut offline = DeviceEntry::new(instance, "");
            offline.network_port_instance = hint;
            offline
        } else {
            read_device_runtime(&self.reader, instance, &resolved, hint).await
        };
        current.last_refresh = Some(Instant::now());

        let merged = DeviceEntry::merged(previous.as_ref(), current);
        log::debug!(
            "device {instance} refreshed: online={} address={}",
            merged.online,
            merged.address
        );
        self.cache
            .store_device(&self.entry_id, &device_id, merged.clone())
            .await;
        Some(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::{bacnet_mac_from_ip_port, ipv4_text, mac_colon, mac_hex};
    use bacbridge_core::BacnetValue;

    #[test]
    fn renders_ipv4_addresses() {
        assert_eq!(
            ipv4_text(&BacnetValue::OctetString(vec![192, 168, 1, 20])).as_deref(),
            Some("192.168.1.20")
        );
        assert_eq!(
            ipv4_text(&BacnetValue::CharacterString(" 10.0.0.5 ".into())).as_deref(),
            Some("10.0.0.5")
        );
        assert_eq!(ipv4_text(&BacnetValue::OctetString(vec![1, 2, 3])), None);
        assert_eq!(ipv4_text(&BacnetValue::CharacterString("10.0.0".into())), None);
    }

    #[test]
    fn normalizes_mac_addresses() {
        let raw = BacnetValue::OctetString(vec![0xc0, 0xa8, 0x01, 0x14, 0xba, 0xc0]);
        assert_eq!(mac_hex(&raw).as_deref(), Some("C0A80114BAC0"));
        let text = BacnetValue::CharacterString("c0-a8-01-14-ba-c0".into());
        assert_eq!(mac_hex(&text).as_deref(), Some("C0A80114BAC0"));
        assert_eq!(mac_hex(&BacnetValue::CharacterString("abc".into())), None);
        assert_eq!(mac_colon("C0A80114BAC0"), "C0:A8:01:14:BA:C0");
    }

    #[test]
    fn derives_bacnet_ip_mac() {
        assert_eq!(
            bacnet_mac_from_ip_port("192.168.1.20", 47808).as_deref(),
            Some("C0A80114BAC0")
        );
        assert_eq!(bacnet_mac_from_ip_port("192.168.1", 47808), None);
        assert_eq!(bacnet_mac_from_ip_port("300.1.1.1", 47808), None);
    }
}
