// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # isdt-air-ble
//!
//! A cross-platform Rust library for monitoring ISDT Air multi-slot battery
//! chargers over Bluetooth Low Energy.
//!
//! A [`Charger`] supervises one charger: it connects, binds, reads hardware
//! info, then polls all six slots on a fixed interval, reconnecting with
//! backoff whenever the link drops. The host reads whole-charger
//! [`ChargerSnapshot`]s that are only ever replaced once a poll cycle has
//! completed.
//!
//! ## Features
//!
//! - **Charger Discovery**: Identify ISDT models from advertising data
//! - **Per-slot State**: Work state, capacity, voltages, currents and internal resistance
//! - **Consistent Snapshots**: One atomic update per poll cycle
//! - **Automatic Reconnect**: Exponential backoff with an optional attempt limit
//! - **Alarm Tone Control**: Toggle the charger's buzzer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use isdt_air_ble::{BleScanner, Charger, ChargerConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let scanner = BleScanner::new().await?;
//!     let mut discoveries = scanner.subscribe();
//!     scanner.start().await?;
//!
//!     let Ok(found) = discoveries.recv().await else {
//!         return Ok(());
//!     };
//!     scanner.stop().await?;
//!     println!("Found {} ({})", found.model, found.identifier);
//!
//!     let charger = Charger::connect_peripheral(
//!         scanner.adapter().clone(),
//!         found.peripheral,
//!         ChargerConfig::default(),
//!     )?;
//!
//!     let mut snapshots = charger.subscribe();
//!     while let Ok(snapshot) = snapshots.recv().await {
//!         for channel in snapshot.charging_channels() {
//!             println!(
//!                 "slot {}: {}% at {:.2} A",
//!                 channel.slot_number(),
//!                 channel.capacity_percent,
//!                 channel.charging_current()
//!             );
//!         }
//!     }
//!
//!     charger.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod charger;
pub mod config;
pub mod data;
pub mod error;
pub mod protocol;
pub mod utils;

mod engine;

// Re-exports for convenience
pub use charger::{CallbackHandle, Charger};
pub use config::{ChargerConfig, ReconnectPolicy, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL};
pub use error::{Error, Result};
pub use utils::{format_work_period, milli_to_unit, raw_ir_to_milliohm};

// Re-export commonly used types from submodules
pub use ble::advertising::{identify_model, DeviceModel};
pub use ble::btleplug_transport::BtleplugTransport;
pub use ble::connection::{ConnectionEvent, ConnectionPhase};
pub use ble::scanner::{BleScanner, ChargerDiscoveryEvent};
pub use ble::transport::{Transport, TransportEvent};
pub use data::{BatteryType, Channel, ChargerSnapshot, HardwareInfo, WorkState, CHANNEL_COUNT};
