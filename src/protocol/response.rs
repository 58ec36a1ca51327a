//! Decoding of poll characteristic notifications.

use crate::data::CHANNEL_COUNT;
use crate::error::{Error, Result};
use crate::protocol::commands::{
    ResponseKey, RESP_ALARM_TONE, RESP_ALARM_TONE_SET, RESP_ELECTRIC, RESP_IR, RESP_WORK_STATE,
};
use crate::protocol::electric::ElectricResponse;
use crate::protocol::internal_resistance::InternalResistanceResponse;
use crate::protocol::work_state::WorkStateResponse;

/// Status byte of a successful alarm tone set acknowledgement.
pub const ALARM_SET_SUCCESS: u8 = 0xFF;

/// A decoded poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Alarm tone state; `true` when the tone is on.
    AlarmTone(bool),
    /// Acknowledgement of an alarm tone set command.
    AlarmToneSet {
        /// Whether the charger reported success.
        success: bool,
    },
    /// Voltages and currents for a channel.
    Electric(ElectricResponse),
    /// Work state for a channel.
    WorkState(WorkStateResponse),
    /// Internal resistance for a channel.
    InternalResistance(InternalResistanceResponse),
}

impl Response {
    /// Decode a notification frame by its command byte (offset 1).
    ///
    /// Per-channel responses naming a channel outside `0..CHANNEL_COUNT`
    /// are rejected.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(Error::malformed(format!(
                "response too short: {} bytes",
                data.len()
            )));
        }

        let response = match data[1] {
            RESP_ALARM_TONE => return Ok(Self::AlarmTone(data[2] != 0)),
            RESP_ALARM_TONE_SET => {
                return Ok(Self::AlarmToneSet {
                    success: data[2] == ALARM_SET_SUCCESS,
                })
            }
            RESP_ELECTRIC => Self::Electric(ElectricResponse::decode(data)?),
            RESP_WORK_STATE => Self::WorkState(WorkStateResponse::decode(data)?),
            RESP_IR => Self::InternalResistance(InternalResistanceResponse::decode(data)?),
            other => {
                return Err(Error::malformed(format!(
                    "unknown response command {:#04x}",
                    other
                )))
            }
        };

        if usize::from(data[2]) >= CHANNEL_COUNT {
            return Err(Error::malformed(format!("unexpected channel {}", data[2])));
        }

        Ok(response)
    }

    /// Get the key used to match this response to its request.
    pub fn key(&self) -> ResponseKey {
        let (command, channel) = match self {
            Self::AlarmTone(_) => (RESP_ALARM_TONE, None),
            Self::AlarmToneSet { .. } => (RESP_ALARM_TONE_SET, None),
            Self::Electric(r) => (RESP_ELECTRIC, Some(r.channel)),
            Self::WorkState(r) => (RESP_WORK_STATE, Some(r.channel)),
            Self::InternalResistance(r) => (RESP_IR, Some(r.channel)),
        };
        ResponseKey { command, channel }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands::Request;

    #[test]
    fn test_decode_alarm_tone() {
        assert_eq!(Response::decode(&[0x01, 0x93, 0x01]).unwrap(), Response::AlarmTone(true));
        assert_eq!(Response::decode(&[0x01, 0x93, 0x00]).unwrap(), Response::AlarmTone(false));
        assert_eq!(
            Response::decode(&[0x01, 0x93, 0x01]).unwrap().key(),
            Request::AlarmTone.response_key()
        );
    }

    #[test]
    fn test_decode_alarm_tone_ack() {
        assert_eq!(
            Response::decode(&[0x01, 0x9D, 0xFF]).unwrap(),
            Response::AlarmToneSet { success: true }
        );
        assert_eq!(
            Response::decode(&[0x01, 0x9D, 0x00]).unwrap(),
            Response::AlarmToneSet { success: false }
        );
    }

    #[test]
    fn test_decode_ir_key_matches_request() {
        let mut data = vec![0x01, 0xFB, 0x03];
        data.extend_from_slice(&[0x10, 0x01, 0x20, 0x01]);
        let response = Response::decode(&data).unwrap();
        assert_eq!(response.key(), Request::InternalResistance(3).response_key());
        assert_ne!(response.key(), Request::InternalResistance(2).response_key());
    }

    #[test]
    fn test_decode_rejects_bad_channel() {
        let mut data = vec![0x01, 0xFB, 0x06];
        data.extend_from_slice(&[0x10, 0x01]);
        assert!(matches!(
            Response::decode(&data),
            Err(Error::MalformedPacket { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_and_short() {
        assert!(Response::decode(&[0x01, 0x42, 0x00]).is_err());
        assert!(Response::decode(&[0x01, 0x93]).is_err());
        assert!(Response::decode(&[0x01, 0xE5, 0x00, 0x00]).is_err());
    }
}
