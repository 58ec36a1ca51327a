//! Internal resistance response decoding.
//!
//! `[addr, 0xFB, channel, ir0_lo, ir0_hi, ...]` with one little-endian u16 per
//! cell in 0.1 mΩ units. The cell count is not carried in the frame and is
//! derived from the frame length instead.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::commands::RESP_IR;

/// Minimum IR frame length (prefix plus one cell).
pub const IR_MIN_LEN: usize = 5;

/// Raw readings at or above this value are not real measurements.
pub const IR_INVALID_THRESHOLD: u16 = 10_000;

/// Derive the cell count from an IR frame length.
///
/// ```
/// use isdt_air_ble::protocol::ir_cell_count;
///
/// assert_eq!(ir_cell_count(20), 16);
/// assert_eq!(ir_cell_count(16), 8);
/// assert_eq!(ir_cell_count(15), 6);
/// assert_eq!(ir_cell_count(13), 5);
/// ```
pub fn ir_cell_count(len: usize) -> usize {
    match len {
        n if n >= 20 => 16,
        n if n > 15 => 8,
        15 => 6,
        n => n.saturating_sub(3) / 2,
    }
}

/// Filter a raw reading, mapping sentinel values to `None`.
pub fn filter_ir_reading(raw: u16) -> Option<u16> {
    (raw != 0 && raw < IR_INVALID_THRESHOLD).then_some(raw)
}

/// Decoded internal resistance response for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalResistanceResponse {
    /// Address byte echoed by the charger.
    pub address: u8,
    /// Channel index.
    pub channel: u8,
    /// Per-cell readings (0.1 mΩ). Sentinels and cells past the end of the
    /// frame are `None`.
    pub cells: Vec<Option<u16>>,
}

impl InternalResistanceResponse {
    /// Decode from a notification frame.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < IR_MIN_LEN {
            return Err(Error::malformed(format!(
                "IR response too short: {} bytes",
                data.len()
            )));
        }
        if data[1] != RESP_IR {
            return Err(Error::malformed(format!(
                "expected IR response, got command {:#04x}",
                data[1]
            )));
        }

        let count = ir_cell_count(data.len());
        let mut buf = &data[3..];
        let cells = (0..count)
            .map(|_| {
                if buf.remaining() >= 2 {
                    filter_ir_reading(buf.get_u16_le())
                } else {
                    None
                }
            })
            .collect();

        Ok(Self {
            address: data[0],
            channel: data[2],
            cells,
        })
    }

    /// Encode back to wire format. Absent cells are written as 0.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(3 + self.cells.len() * 2);
        buf.put_slice(&[self.address, RESP_IR, self.channel]);
        for cell in &self.cells {
            buf.put_u16_le(cell.unwrap_or(0));
        }
        buf.to_vec()
    }
}
