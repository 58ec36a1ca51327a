//! Data structures for charger state.
//!
//! This module contains the per-slot channel state, the hardware info
//! captured during the handshake, and the snapshot published to the host.

pub mod channel;
pub mod hardware_info;
pub mod snapshot;

pub use channel::{BatteryType, Channel, WorkState, CELL_PRESENT_THRESHOLD_MV, CHANNEL_COUNT};
pub use hardware_info::HardwareInfo;
pub use snapshot::ChargerSnapshot;
