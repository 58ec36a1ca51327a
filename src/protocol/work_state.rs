//! Work state response decoding.
//!
//! Fixed layout after the `[addr, 0xE7, channel]` prefix:
//!
//! | Offset | Size | Field                         |
//! |--------|------|-------------------------------|
//! | 3      | 1    | work state                    |
//! | 4      | 1    | capacity percent              |
//! | 5      | 4    | capacity charged (mAh)        |
//! | 9      | 4    | energy charged (mWh)          |
//! | 13     | 4    | work period (ms)              |
//! | 17     | 1    | battery type                  |
//! | 18     | 1    | unit serials                  |
//! | 19     | 1    | link type                     |
//! | 20     | 2    | full-charge voltage (mV)      |
//! | 22     | 4    | work current (mA)             |
//! | 26     | 2    | batteries in job              |
//! | 28     | 2    | battery being charged         |
//! | 30     | 2    | minimum input voltage (mV)    |
//! | 32     | 4    | maximum output power (mW)     |
//! | 36     | 2    | error code                    |
//! | 38     | 1    | parallel flag (optional)      |

use bytes::{Buf, BufMut, BytesMut};

use crate::data::{BatteryType, WorkState};
use crate::error::{Error, Result};
use crate::protocol::commands::RESP_WORK_STATE;

/// Minimum work state frame length (without the parallel flag).
pub const WORK_STATE_MIN_LEN: usize = 38;

/// Decoded work state response for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkStateResponse {
    /// Address byte echoed by the charger.
    pub address: u8,
    /// Channel index.
    pub channel: u8,
    /// Work state.
    pub work_state: WorkState,
    /// Capacity (0-100 %).
    pub capacity_percent: u8,
    /// Capacity charged (mAh).
    pub capacity_charged_mah: u32,
    /// Energy charged (mWh).
    pub energy_charged_mwh: u32,
    /// Time in current work state (ms).
    pub work_period_ms: u32,
    /// Battery chemistry.
    pub battery_type: BatteryType,
    /// Cells in series.
    pub unit_serials: u8,
    /// Link type.
    pub link_type: u8,
    /// Full-charge voltage (mV).
    pub full_charge_voltage_mv: u16,
    /// Work current (mA).
    pub work_current_ma: u32,
    /// Batteries in the charging job.
    pub batteries_total: u16,
    /// Battery currently being charged.
    pub batteries_current: u16,
    /// Minimum input voltage (mV).
    pub min_input_voltage_mv: u16,
    /// Maximum output power (mW).
    pub max_output_power_mw: u32,
    /// Error code.
    pub error_code: u16,
    /// Parallel flag, present on 39-byte frames.
    pub parallel: Option<bool>,
}

impl WorkStateResponse {
    /// Decode from a notification frame.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < WORK_STATE_MIN_LEN {
            return Err(Error::malformed(format!(
                "work state response too short: {} bytes",
                data.len()
            )));
        }
        if data[1] != RESP_WORK_STATE {
            return Err(Error::malformed(format!(
                "expected work state response, got command {:#04x}",
                data[1]
            )));
        }

        let mut buf = &data[3..];

        Ok(Self {
            address: data[0],
            channel: data[2],
            work_state: WorkState::from_raw(buf.get_u8()),
            capacity_percent: buf.get_u8(),
            capacity_charged_mah: buf.get_u32_le(),
            energy_charged_mwh: buf.get_u32_le(),
            work_period_ms: buf.get_u32_le(),
            battery_type: BatteryType::from_raw(buf.get_u8()),
            unit_serials: buf.get_u8(),
            link_type: buf.get_u8(),
            full_charge_voltage_mv: buf.get_u16_le(),
            work_current_ma: buf.get_u32_le(),
            batteries_total: buf.get_u16_le(),
            batteries_current: buf.get_u16_le(),
            min_input_voltage_mv: buf.get_u16_le(),
            max_output_power_mw: buf.get_u32_le(),
            error_code: buf.get_u16_le(),
            parallel: buf.has_remaining().then(|| buf.get_u8() == 1),
        })
    }

    /// Encode back to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(WORK_STATE_MIN_LEN + 1);
        buf.put_slice(&[self.address, RESP_WORK_STATE, self.channel]);
        buf.put_u8(self.work_state.to_raw());
        buf.put_u8(self.capacity_percent);
        buf.put_u32_le(self.capacity_charged_mah);
        buf.put_u32_le(self.energy_charged_mwh);
        buf.put_u32_le(self.work_period_ms);
        buf.put_u8(self.battery_type.to_raw());
        buf.put_u8(self.unit_serials);
        buf.put_u8(self.link_type);
        buf.put_u16_le(self.full_charge_voltage_mv);
        buf.put_u32_le(self.work_current_ma);
        buf.put_u16_le(self.batteries_total);
        buf.put_u16_le(self.batteries_current);
        buf.put_u16_le(self.min_input_voltage_mv);
        buf.put_u32_le(self.max_output_power_mw);
        buf.put_u16_le(self.error_code);
        if let Some(parallel) = self.parallel {
            buf.put_u8(u8::from(parallel));
        }
        buf.to_vec()
    }
}
