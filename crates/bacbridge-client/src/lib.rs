//! Async BACnet client bridge.
//!
//! Discovers remote BACnet devices, imports their objects as cached
//! [`Point`](bacbridge_core::Point)s, keeps them current through COV
//! subscriptions, and publishes host entities as local BACnet objects. The
//! protocol engine and the host platform are reached only through the
//! [`BacnetApp`] and [`HostPlatform`] traits; [`SimulatedNetwork`] and
//! [`MemoryHost`] are in-memory implementations of both.

pub mod app;
pub mod cache;
pub mod config;
pub mod consumer;
pub mod cov;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod host;
pub mod importer;
pub mod local_object;
pub mod mapping;
pub mod publisher;
pub mod reader;
pub mod runtime;
pub mod signals;
pub mod simulator;
pub mod tasks;
pub mod throttle;
pub mod writeback;

pub use app::{BacnetApp, CovContext, CovRequest, IAm, WhoIsTarget};
pub use cache::{DeviceEntry, DeviceInfo, NetworkInfo, SharedCache};
pub use config::BridgeConfig;
pub use consumer::PointConsumer;
pub use cov::{CovState, CovSubscription};
pub use discovery::{discover_devices, DiscoveredDevice};
pub use error::BridgeError;
pub use host::{EntityState, HostPlatform, MemoryHost, ServiceCall, StateChange};
pub use importer::{import_points, ImportOutcome, PointImporter};
pub use local_object::LocalObject;
pub use mapping::{Mapping, PublishedType, WriteAction};
pub use publisher::Publisher;
pub use runtime::ClientRuntime;
pub use signals::{Signal, SignalBus};
pub use simulator::SimulatedNetwork;
pub use tasks::TaskPool;
