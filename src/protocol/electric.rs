//! Electric response decoding.
//!
//! The charger answers an electric query in one of two layouts, selected by
//! frame length:
//!
//! | Field            | Short (<= 35 bytes) | Long (> 35 bytes) |
//! |------------------|---------------------|-------------------|
//! | input voltage    | u16 mV              | u32 mV            |
//! | input current    | u32 mA              | u32 mA            |
//! | output voltage   | u16 mV              | u32 mV            |
//! | charging current | u32 mA              | u32 mA            |
//! | cell voltages    | 8 x u16 mV          | 16 x u16 mV       |
//!
//! All fields follow a three-byte `[addr, 0xE5, channel]` prefix and are
//! little-endian.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::commands::RESP_ELECTRIC;

/// Frames longer than this use the long layout.
pub const LONG_FORMAT_THRESHOLD: usize = 35;

/// Smallest frame that carries every scalar field (short layout, no cells).
pub const ELECTRIC_MIN_LEN: usize = 15;

/// Electric response layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElectricFormat {
    /// 2-byte voltages, 8 cell slots.
    Short,
    /// 4-byte voltages, 16 cell slots.
    Long,
}

impl ElectricFormat {
    /// Select the layout for a frame of `len` bytes.
    pub fn for_len(len: usize) -> Self {
        if len > LONG_FORMAT_THRESHOLD {
            Self::Long
        } else {
            Self::Short
        }
    }

    /// Number of cell voltage slots in this layout.
    pub fn cell_slots(&self) -> usize {
        match self {
            Self::Short => 8,
            Self::Long => 16,
        }
    }

    /// Bytes between the prefix and the first cell.
    fn scalar_len(&self) -> usize {
        match self {
            Self::Short => 2 + 4 + 2 + 4,
            Self::Long => 4 + 4 + 4 + 4,
        }
    }
}

/// Decoded electric response for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectricResponse {
    /// Address byte echoed by the charger.
    pub address: u8,
    /// Channel index.
    pub channel: u8,
    /// Layout the frame was decoded from.
    pub format: ElectricFormat,
    /// Input voltage (mV).
    pub input_voltage_mv: u32,
    /// Input current (mA).
    pub input_current_ma: u32,
    /// Output voltage (mV).
    pub output_voltage_mv: u32,
    /// Charging current (mA).
    pub charging_current_ma: u32,
    /// Cell voltages (mV). Empty, or exactly [`ElectricFormat::cell_slots`] long.
    pub cell_voltages_mv: Vec<u16>,
}

impl ElectricResponse {
    /// Decode from a notification frame.
    ///
    /// Cells missing from a truncated frame are reported as 0 mV so the
    /// cell array always has the layout's full slot count. A frame with no
    /// cell bytes at all yields an empty array.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < ELECTRIC_MIN_LEN {
            return Err(Error::malformed(format!(
                "electric response too short: {} bytes",
                data.len()
            )));
        }
        if data[1] != RESP_ELECTRIC {
            return Err(Error::malformed(format!(
                "expected electric response, got command {:#04x}",
                data[1]
            )));
        }

        let format = ElectricFormat::for_len(data.len());
        let mut buf = &data[3..];

        let (input_voltage_mv, input_current_ma, output_voltage_mv, charging_current_ma) =
            match format {
                ElectricFormat::Long => (
                    buf.get_u32_le(),
                    buf.get_u32_le(),
                    buf.get_u32_le(),
                    buf.get_u32_le(),
                ),
                ElectricFormat::Short => (
                    u32::from(buf.get_u16_le()),
                    buf.get_u32_le(),
                    u32::from(buf.get_u16_le()),
                    buf.get_u32_le(),
                ),
            };

        let slots = format.cell_slots();
        let available = (buf.remaining() / 2).min(slots);
        let mut cell_voltages_mv = Vec::new();
        if available > 0 {
            cell_voltages_mv.reserve(slots);
            for _ in 0..available {
                cell_voltages_mv.push(buf.get_u16_le());
            }
            cell_voltages_mv.resize(slots, 0);
        }

        Ok(Self {
            address: data[0],
            channel: data[2],
            format,
            input_voltage_mv,
            input_current_ma,
            output_voltage_mv,
            charging_current_ma,
            cell_voltages_mv,
        })
    }

    /// Encode back to wire format.
    ///
    /// Short-format voltages are truncated to 16 bits. The cell block is
    /// always written with the layout's full slot count.
    pub fn to_bytes(&self) -> Vec<u8> {
        let slots = self.format.cell_slots();
        let mut buf = BytesMut::with_capacity(3 + self.format.scalar_len() + slots * 2);
        buf.put_slice(&[self.address, RESP_ELECTRIC, self.channel]);

        match self.format {
            ElectricFormat::Long => {
                buf.put_u32_le(self.input_voltage_mv);
                buf.put_u32_le(self.input_current_ma);
                buf.put_u32_le(self.output_voltage_mv);
                buf.put_u32_le(self.charging_current_ma);
            }
            ElectricFormat::Short => {
                buf.put_u16_le(self.input_voltage_mv as u16);
                buf.put_u32_le(self.input_current_ma);
                buf.put_u16_le(self.output_voltage_mv as u16);
                buf.put_u32_le(self.charging_current_ma);
            }
        }

        for i in 0..slots {
            buf.put_u16_le(self.cell_voltages_mv.get(i).copied().unwrap_or(0));
        }

        buf.to_vec()
    }
}
