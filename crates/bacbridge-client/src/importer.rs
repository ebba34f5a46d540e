//! Point import: walks a device's object list and reads every supported
//! object into a [`Point`].

use crate::cache::SharedCache;
use crate::reader::PropertyReader;
use crate::throttle::RescanRequester;
use crate::BridgeError;
use bacbridge_core::point::{point_key, POINT_PROPERTIES};
use bacbridge_core::types::{ObjectId, PropertyId};
use bacbridge_core::{BacnetValue, Point, PointType};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Reads the object-list length (array index 0).
///
/// A length of zero is reported as [`BridgeError::EmptyObjectList`] and a
/// length that is not a number as [`BridgeError::Remote`], so callers never
/// mistake either for a successful walk.
pub(crate) async fn object_list_len(
    reader: &PropertyReader,
    address: &str,
    device_instance: u32,
) -> Result<u32, BridgeError> {
    let value = reader
        .read_with(
            address,
            ObjectId::device(device_instance),
            PropertyId::ObjectList,
            Some(0),
            reader.config().object_list_read_timeout(),
        )
        .await?;
    match value.as_u32() {
        Some(0) => Err(BridgeError::EmptyObjectList(device_instance)),
        Some(len) => Ok(len),
        None => Err(BridgeError::Remote(format!("object-list length is not a number: {value}"))),
    }
}

/// Reads one object-list element (1-based). Failures are logged and skipped.
pub(crate) async fn object_list_item(
    reader: &PropertyReader,
    address: &str,
    device_instance: u32,
    index: u32,
) -> Option<(String, u32)> {
    let item = reader
        .read_with(
            address,
            ObjectId::device(device_instance),
            PropertyId::ObjectList,
            Some(index),
            reader.config().object_list_read_timeout(),
        )
        .await;
    match item {
        Ok(value) => parse_object_list_item(&value),
        Err(err) => {
            log::debug!("object-list[{index}] of device {device_instance} unreadable: {err}");
            None
        }
    }
}

/// Splits an object-list element into its type token and instance.
///
/// Accepts a decoded identifier, `"type,instance"` style text and a
/// two-element `[type, instance]` list.
pub fn parse_object_list_item(value: &BacnetValue) -> Option<(String, u32)> {
    match value {
        BacnetValue::ObjectId(id) => Some((id.object_type().to_string(), id.instance())),
        BacnetValue::List(items) if items.len() == 2 => {
            let token = match &items[0] {
                BacnetValue::Enumerated(code) | BacnetValue::Unsigned(code) => code.to_string(),
                other => other.as_text()?,
            };
            Some((token, items[1].as_u32()?))
        }
        BacnetValue::CharacterString(text) => {
            let text = text.trim();
            let split = text.rfind(|c: char| c == ',' || c == ':' || c.is_whitespace())?;
            let (token, rest) = text.split_at(split);
            let separator_len = rest.chars().next().map_or(0, char::len_utf8);
            let instance = rest[separator_len..].trim().parse().ok()?;
            let token = token.trim_end_matches(|c: char| c == ',' || c == ':' || c.is_whitespace());
            (!token.is_empty()).then(|| (token.to_string(), instance))
        }
        _ => None,
    }
}

/// Lists the supported objects of a device, in object-list order.
///
/// At most `point_scan_limit` elements are inspected. Objects of types the
/// bridge does not import (including the device object itself) are skipped.
pub async fn read_object_list(
    reader: &PropertyReader,
    address: &str,
    device_instance: u32,
) -> Result<Vec<(PointType, u32)>, BridgeError> {
    let len = object_list_len(reader, address, device_instance).await?;
    let limit = len.min(reader.config().point_scan_limit);
    if limit < len {
        log::debug!("device {device_instance} lists {len} objects, scanning first {limit}");
    }

    let mut objects = Vec::new();
    for index in 1..=limit {
        let Some((token, instance)) =
            object_list_item(reader, address, device_instance, index).await
        else {
            continue;
        };
        match PointType::classify(&token) {
            Some(point_type) => objects.push((point_type, instance)),
            None => log::trace!("skipping unsupported object {token},{instance}"),
        }
    }
    Ok(objects)
}

/// Reads the import properties of one object.
pub async fn read_point(
    reader: &PropertyReader,
    address: &str,
    device_instance: u32,
    point_type: PointType,
    instance: u32,
) -> Point {
    let object_id = ObjectId::new(point_type.object_type(), instance);
    let values = reader.read_many(address, object_id, &POINT_PROPERTIES).await;
    Point::from_properties(point_type, instance, device_instance, address, &values)
}

/// Imports every supported object of a device, skipping keys in `skip`.
pub async fn import_points(
    reader: &PropertyReader,
    address: &str,
    device_instance: u32,
    skip: &BTreeSet<String>,
) -> Result<BTreeMap<String, Point>, BridgeError> {
    let mut points = BTreeMap::new();
    for (point_type, instance) in read_object_list(reader, address, device_instance).await? {
        let key = point_key(point_type, instance);
        if skip.contains(&key) || points.contains_key(&key) {
            continue;
        }
        let point = read_point(reader, address, device_instance, point_type, instance).await;
        points.insert(key, point);
    }
    Ok(points)
}

/// Result of [`PointImporter::import`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Points were written to the cache under these keys.
    Imported(Vec<String>),
    /// The object list is empty or yielded nothing new.
    NoPoints,
    /// The object list was unreadable or empty while points are cached. The
    /// cache is left untouched and a rescan was requested.
    Transient,
    /// The object list was unreadable and nothing is cached.
    Unreachable,
}

/// Imports device points into the shared cache for one configuration entry.
pub struct PointImporter {
    reader: Arc<PropertyReader>,
    cache: Arc<SharedCache>,
    rescans: Arc<RescanRequester>,
    entry_id: String,
}

impl PointImporter {
    pub fn new(
        reader: Arc<PropertyReader>,
        cache: Arc<SharedCache>,
        rescans: Arc<RescanRequester>,
        entry_id: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            cache,
            rescans,
            entry_id: entry_id.into(),
        }
    }

    /// Imports the points of `device_instance` at `address`.
    ///
    /// With `only_new`, objects already cached are not read again. Cached
    /// points are never removed.
    pub async fn import(
        &self,
        device_id: &str,
        address: &str,
        device_instance: u32,
        only_new: bool,
    ) -> ImportOutcome {
        let cached = self.cache.point_keys(&self.entry_id, device_id).await;
        let skip = if only_new { cached.clone() } else { BTreeSet::new() };

        match import_points(&self.reader, address, device_instance, &skip).await {
            Err(BridgeError::EmptyObjectList(_)) if cached.is_empty() => ImportOutcome::NoPoints,
            Err(err) if cached.is_empty() => {
                log::debug!("object list of device {device_instance} at {address} unreadable: {err}");
                ImportOutcome::Unreachable
            }
            Err(err) => {
                log::debug!(
                    "object list of device {device_instance} unusable, keeping {} cached point(s): {err}",
                    cached.len()
                );
                self.rescans.request(device_instance);
                ImportOutcome::Transient
            }
            Ok(points) if points.is_empty() => ImportOutcome::NoPoints,
            Ok(points) => {
                let keys: Vec<String> = points.keys().cloned().collect();
                let stored = self
                    .cache
                    .upsert_points(&self.entry_id, device_id, points)
                    .await;
                log::info!("imported {stored} point(s) from device {device_instance}");
                ImportOutcome::Imported(keys)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_object_list_item;
    use bacbridge_core::types::{ObjectId, ObjectType};
    use bacbridge_core::BacnetValue;

    #[test]
    fn parses_object_list_shapes() {
        let id = BacnetValue::ObjectId(ObjectId::new(ObjectType::AnalogInput, 5));
        assert_eq!(parse_object_list_item(&id), Some(("analog-input".into(), 5)));

        let text = BacnetValue::CharacterString("binaryValue, 2".into());
        assert_eq!(parse_object_list_item(&text), Some(("binaryValue".into(), 2)));

        let spaced = BacnetValue::CharacterString("OBJECT_MULTI_STATE_VALUE 7".into());
        assert_eq!(
            parse_object_list_item(&spaced),
            Some(("OBJECT_MULTI_STATE_VALUE".into(), 7))
        );

        let pair = BacnetValue::List(vec![
            BacnetValue::CharacterString("analogValue".into()),
            BacnetValue::Unsigned(3),
        ]);
        assert_eq!(parse_object_list_item(&pair), Some(("analogValue".into(), 3)));

        let coded = BacnetValue::List(vec![BacnetValue::Enumerated(5), BacnetValue::Unsigned(1)]);
        assert_eq!(parse_object_list_item(&coded), Some(("5".into(), 1)));
    }

    #[test]
    fn rejects_malformed_items() {
        assert_eq!(parse_object_list_item(&BacnetValue::Null), None);
        assert_eq!(
            parse_object_list_item(&BacnetValue::CharacterString("analogInput".into())),
            None
        );
        assert_eq!(
            parse_object_list_item(&BacnetValue::CharacterString(",4".into())),
            None
        );
        assert_eq!(
            parse_object_list_item(&BacnetValue::List(vec![BacnetValue::Unsigned(1)])),
            None
        );
    }
}
