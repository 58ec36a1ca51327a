//! Bind and hardware-info responses received on the handshake characteristic.

use bytes::Buf;

use crate::data::HardwareInfo;
use crate::error::{Error, Result};
use crate::protocol::commands::{RESP_BIND, RESP_HARDWARE_INFO};

/// Hardware info body length, command byte included.
pub const HARDWARE_INFO_LEN: usize = 13;

/// Response to a bind request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindResponse {
    /// Bound status; 0 means the client was accepted.
    pub status: u8,
}

impl BindResponse {
    /// Decode `[0x19, status]`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        match data {
            [RESP_BIND, status, ..] => Ok(Self { status: *status }),
            _ => Err(Error::malformed(format!("not a bind response: {:02X?}", data))),
        }
    }

    /// Check if the charger accepted the bind.
    pub fn is_accepted(&self) -> bool {
        self.status == 0
    }

    /// Encode to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![RESP_BIND, self.status]
    }
}

/// Decode a hardware info response.
///
/// Some firmware prefixes the frame with an address byte, so the command
/// byte is looked for at offset 0 first and then at offset 1.
pub fn decode_hardware_info(data: &[u8]) -> Result<HardwareInfo> {
    let offset = [0usize, 1]
        .into_iter()
        .find(|&offset| {
            data.get(offset) == Some(&RESP_HARDWARE_INFO)
                && data.len() >= offset + HARDWARE_INFO_LEN
        })
        .ok_or_else(|| {
            Error::malformed(format!("not a hardware info response: {:02X?}", data))
        })?;

    let mut buf = &data[offset + 1..];
    Ok(HardwareInfo {
        hardware_major: buf.get_u8(),
        hardware_minor: buf.get_u8(),
        firmware_major: buf.get_u8(),
        firmware_minor: buf.get_u8(),
        device_id: buf.get_u64_le(),
    })
}

/// Encode a hardware info response, optionally with an address prefix.
pub fn encode_hardware_info(info: &HardwareInfo, address: Option<u8>) -> Vec<u8> {
    let mut data = Vec::with_capacity(HARDWARE_INFO_LEN + 1);
    data.extend(address);
    data.extend_from_slice(&[
        RESP_HARDWARE_INFO,
        info.hardware_major,
        info.hardware_minor,
        info.firmware_major,
        info.firmware_minor,
    ]);
    data.extend_from_slice(&info.device_id.to_le_bytes());
    data
}
