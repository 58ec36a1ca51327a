//! BLE communication module.
//!
//! Discovery, advertising data, and the transport abstraction the engine
//! drives ISDT chargers through.

pub mod advertising;
pub mod btleplug_transport;
pub mod connection;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use advertising::{identify_model, AdvertisementRecord, DeviceModel};
pub use btleplug_transport::BtleplugTransport;
pub use connection::{ConnectionEvent, ConnectionPhase};
pub use scanner::{resolve_model, BleScanner, ChargerDiscoveryEvent};
pub use transport::{Transport, TransportEvent};
pub use uuids::*;
