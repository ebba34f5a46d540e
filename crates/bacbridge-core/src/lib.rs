//! BACnet object model and value codec for the bacbridge crate family.
//!
//! `bacbridge-core` holds everything that can be decided without touching the
//! network: object and property identifiers, engineering units, the decoded
//! [`BacnetValue`](value::BacnetValue) form, host-side [`HostValue`](codec::HostValue)
//! conversions, and the [`Point`](point::Point) model imported from remote devices.
//!
//! # Feature flags
//!
//! - **`serde`**: derives `Serialize`/`Deserialize` on the data types.

/// Conversions between BACnet values and host-side values.
pub mod codec;
/// Error types for parsing identifiers.
pub mod error;
/// Imported remote points and their per-kind coercion rules.
pub mod point;
/// Object identifiers, object types, property identifiers and units.
pub mod types;
/// Decoded BACnet application values.
pub mod value;

pub use codec::HostValue;
pub use error::ParseError;
pub use point::{Point, PointKind, PointPlatform, PointType};
pub use value::BacnetValue;
