//! Request frames and command bytes.
//!
//! Requests written to the poll characteristic carry a two-byte header
//! (`0x12` or `0x13` followed by the command byte) and, for per-channel
//! queries, the channel index. Responses echo an address byte, then the
//! response command byte (request command + 1), then the payload.

use bytes::{BufMut, BytesMut};

use crate::data::CHANNEL_COUNT;

/// Bind request command (handshake characteristic).
pub const CMD_BIND_REQ: u8 = 0x18;
/// Bind response command.
pub const RESP_BIND: u8 = 0x19;
/// Hardware info request command (handshake characteristic).
pub const CMD_HARDWARE_INFO_REQ: u8 = 0xE0;
/// Hardware info response command.
pub const RESP_HARDWARE_INFO: u8 = 0xE1;

/// Alarm tone query command.
pub const CMD_ALARM_TONE_REQ: u8 = 0x92;
/// Alarm tone query response command.
pub const RESP_ALARM_TONE: u8 = 0x93;
/// Alarm tone set command.
pub const CMD_ALARM_TONE_SET: u8 = 0x9C;
/// Alarm tone set acknowledgement command.
pub const RESP_ALARM_TONE_SET: u8 = 0x9D;
/// Electric query command.
pub const CMD_ELECTRIC_REQ: u8 = 0xE4;
/// Electric response command.
pub const RESP_ELECTRIC: u8 = 0xE5;
/// Work state query command.
pub const CMD_WORK_STATE_REQ: u8 = 0xE6;
/// Work state response command.
pub const RESP_WORK_STATE: u8 = 0xE7;
/// Internal resistance query command.
pub const CMD_IR_REQ: u8 = 0xFA;
/// Internal resistance response command.
pub const RESP_IR: u8 = 0xFB;

/// Header byte for alarm tone and electric queries.
const HEADER_QUERY: u8 = 0x12;
/// Header byte for work state, IR and alarm set commands.
const HEADER_TASK: u8 = 0x13;

/// Number of commands in one poll cycle (alarm query + 3 per channel).
pub const CYCLE_LENGTH: usize = 1 + 3 * CHANNEL_COUNT;

/// A request the engine can write to the charger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    /// Register this client with the charger.
    Bind {
        /// Session client identifier.
        client_id: [u8; 16],
    },
    /// Query hardware/firmware versions and device id.
    HardwareInfo,
    /// Query the alarm tone state.
    AlarmTone,
    /// Enable or disable the alarm tone.
    SetAlarmTone(bool),
    /// Query voltages and currents for a channel.
    Electric(u8),
    /// Query work state for a channel.
    WorkState(u8),
    /// Query internal resistance for a channel.
    InternalResistance(u8),
}

/// Identifies the response a poll request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseKey {
    /// Response command byte.
    pub command: u8,
    /// Channel the response must carry, if per-channel.
    pub channel: Option<u8>,
}

impl Request {
    /// Serialize the request to its wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(19);
        match *self {
            Self::Bind { client_id } => {
                buf.put_u8(CMD_BIND_REQ);
                buf.put_slice(&client_id);
                // reserved, status
                buf.put_u8(0x00);
                buf.put_u8(0x00);
            }
            Self::HardwareInfo => buf.put_u8(CMD_HARDWARE_INFO_REQ),
            Self::AlarmTone => buf.put_slice(&[HEADER_QUERY, CMD_ALARM_TONE_REQ]),
            Self::SetAlarmTone(enabled) => {
                buf.put_slice(&[HEADER_TASK, CMD_ALARM_TONE_SET, u8::from(enabled)])
            }
            Self::Electric(channel) => buf.put_slice(&[HEADER_QUERY, CMD_ELECTRIC_REQ, channel]),
            Self::WorkState(channel) => buf.put_slice(&[HEADER_TASK, CMD_WORK_STATE_REQ, channel]),
            Self::InternalResistance(channel) => {
                buf.put_slice(&[HEADER_TASK, CMD_IR_REQ, channel])
            }
        }
        buf.to_vec()
    }

    /// Get the response this request is answered with.
    pub fn response_key(&self) -> ResponseKey {
        let (command, channel) = match *self {
            Self::Bind { .. } => (RESP_BIND, None),
            Self::HardwareInfo => (RESP_HARDWARE_INFO, None),
            Self::AlarmTone => (RESP_ALARM_TONE, None),
            Self::SetAlarmTone(_) => (RESP_ALARM_TONE_SET, None),
            Self::Electric(channel) => (RESP_ELECTRIC, Some(channel)),
            Self::WorkState(channel) => (RESP_WORK_STATE, Some(channel)),
            Self::InternalResistance(channel) => (RESP_IR, Some(channel)),
        };
        ResponseKey { command, channel }
    }

    /// Check if the request is written to the handshake characteristic.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::HardwareInfo)
    }
}

/// Build the fixed command order of one poll cycle.
///
/// Alarm tone query first, then work state, electric and IR for each channel.
pub fn cycle_plan() -> [Request; CYCLE_LENGTH] {
    let mut plan = [Request::AlarmTone; CYCLE_LENGTH];
    for channel in 0..CHANNEL_COUNT {
        let base = 1 + channel * 3;
        let channel = channel as u8;
        plan[base] = Request::WorkState(channel);
        plan[base + 1] = Request::Electric(channel);
        plan[base + 2] = Request::InternalResistance(channel);
    }
    plan
}
