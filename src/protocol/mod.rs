//! Protocol module for parsing and constructing charger frames.
//!
//! This module contains the implementations for:
//! - Request encoding and the poll cycle command order
//! - Bind and hardware info handshake responses
//! - Electric, work state and internal resistance responses

pub mod commands;
pub mod electric;
pub mod handshake;
pub mod internal_resistance;
pub mod response;
pub mod work_state;

pub use commands::{cycle_plan, Request, ResponseKey, CYCLE_LENGTH};
pub use electric::{ElectricFormat, ElectricResponse};
pub use handshake::{decode_hardware_info, encode_hardware_info, BindResponse};
pub use internal_resistance::{filter_ir_reading, ir_cell_count, InternalResistanceResponse};
pub use response::Response;
pub use work_state::WorkStateResponse;
