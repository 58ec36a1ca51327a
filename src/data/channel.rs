//! Per-slot charger state.
//!
//! A charger has exactly [`CHANNEL_COUNT`] slots. Each [`Channel`] is
//! overwritten field-group by field-group as work state, electric and IR
//! responses arrive; groups not reported in a cycle keep their last value.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::utils::{format_work_period, milli_to_unit, raw_ir_to_milliohm};

/// Number of charging slots on the charger.
pub const CHANNEL_COUNT: usize = 6;

/// Cell voltages at or below this value (mV) mean no cell is present.
pub const CELL_PRESENT_THRESHOLD_MV: u16 = 100;

/// Slot work state.
///
/// Raw codes 1 through 4 are all charging phases (pre-charge, constant
/// current, and constant voltage); the charger reports them separately but
/// they are one state from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WorkState {
    /// Empty or waiting.
    #[default]
    Idle,
    /// Charging, with the raw phase code (1-4).
    Charging(u8),
    /// The slot reported an error.
    Error,
    /// Charge complete.
    Done,
    /// Code outside the documented range.
    Unknown(u8),
}

impl WorkState {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1..=4 => Self::Charging(value),
            5 => Self::Error,
            6 => Self::Done,
            other => Self::Unknown(other),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        match *self {
            Self::Idle => 0,
            Self::Charging(phase) => phase,
            Self::Error => 5,
            Self::Done => 6,
            Self::Unknown(raw) => raw,
        }
    }

    /// Check if the slot is charging.
    pub fn is_charging(&self) -> bool {
        matches!(self, Self::Charging(_))
    }

    /// Get the state name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Charging(_) => "charging",
            Self::Error => "error",
            Self::Done => "done",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl std::fmt::Display for WorkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "unknown_{}", raw),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Battery chemistry selected for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatteryType {
    /// 4.35 V lithium high voltage.
    LiHv,
    /// 4.20 V lithium-ion.
    LiIon,
    /// 3.65 V lithium iron phosphate.
    LiFe,
    /// Nickel-zinc.
    NiZn,
    /// Nickel metal hydride / nickel cadmium.
    NiMhCd,
    /// 1.50 V lithium-ion.
    LiIon1V5,
    /// Automatic detection.
    #[default]
    Auto,
    /// Code outside the documented range.
    Unknown(u8),
}

impl BatteryType {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::LiHv,
            1 => Self::LiIon,
            2 => Self::LiFe,
            3 => Self::NiZn,
            4 => Self::NiMhCd,
            5 => Self::LiIon1V5,
            6 => Self::Auto,
            other => Self::Unknown(other),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        match *self {
            Self::LiHv => 0,
            Self::LiIon => 1,
            Self::LiFe => 2,
            Self::NiZn => 3,
            Self::NiMhCd => 4,
            Self::LiIon1V5 => 5,
            Self::Auto => 6,
            Self::Unknown(raw) => raw,
        }
    }

    /// Get the chemistry name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LiHv => "LiHV",
            Self::LiIon => "LiIon",
            Self::LiFe => "LiFe",
            Self::NiZn => "NiZn",
            Self::NiMhCd => "NiMH/Cd",
            Self::LiIon1V5 => "LiIon 1.5V",
            Self::Auto => "Auto",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl std::fmt::Display for BatteryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State of one charging slot.
///
/// Voltages and currents are integer milli-units as reported by the charger;
/// the accessor methods convert to V/A/Wh for display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Channel {
    /// Slot index (0-5).
    pub index: u8,

    // Work state group
    /// Work state.
    pub work_state: WorkState,
    /// Capacity (0-100 %).
    pub capacity_percent: u8,
    /// Capacity charged so far (mAh).
    pub capacity_charged_mah: u32,
    /// Energy charged so far (mWh).
    pub energy_charged_mwh: u32,
    /// Time spent in the current work state (ms).
    pub work_period_ms: u32,
    /// Battery chemistry.
    pub battery_type: BatteryType,
    /// Number of cells in series.
    pub unit_serials: u8,
    /// Link type reported by the charger.
    pub link_type: u8,
    /// Full-charge voltage (mV).
    pub full_charge_voltage_mv: u16,
    /// Configured work current (mA).
    pub work_current_ma: u32,
    /// Batteries in the charging job.
    pub batteries_total: u16,
    /// Battery currently being charged within the job.
    pub batteries_current: u16,
    /// Minimum input voltage (mV).
    pub min_input_voltage_mv: u16,
    /// Maximum output power (mW).
    pub max_output_power_mw: u32,
    /// Error code (0 = none).
    pub error_code: u16,
    /// Parallel charging flag, when the firmware reports it.
    pub parallel: Option<bool>,
    /// When the slot entered a charging state, while it stays charging.
    pub charge_started_at: Option<DateTime<Utc>>,

    // Electric group
    /// Input voltage (mV).
    pub input_voltage_mv: u32,
    /// Input current (mA).
    pub input_current_ma: u32,
    /// Output voltage (mV).
    pub output_voltage_mv: u32,
    /// Charging current (mA).
    pub charging_current_ma: u32,
    /// Per-cell voltages (mV); 0, 8 or 16 entries.
    pub cell_voltages_mv: Vec<u16>,

    // IR group
    /// Per-cell internal resistance (0.1 mΩ); `None` for invalid readings.
    pub internal_resistance: Vec<Option<u16>>,

    /// Last time any response for this slot was applied.
    pub last_updated: Option<DateTime<Utc>>,
}

impl Channel {
    /// Create an empty channel for a slot index.
    pub fn new(index: u8) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// Check if the slot is charging.
    pub fn is_charging(&self) -> bool {
        self.work_state.is_charging()
    }

    /// Get the 1-based slot number as printed on the charger.
    pub fn slot_number(&self) -> u8 {
        self.index + 1
    }

    /// Input voltage in volts.
    pub fn input_voltage(&self) -> f64 {
        milli_to_unit(self.input_voltage_mv)
    }

    /// Input current in amperes.
    pub fn input_current(&self) -> f64 {
        milli_to_unit(self.input_current_ma)
    }

    /// Output voltage in volts.
    pub fn output_voltage(&self) -> f64 {
        milli_to_unit(self.output_voltage_mv)
    }

    /// Charging current in amperes.
    pub fn charging_current(&self) -> f64 {
        milli_to_unit(self.charging_current_ma)
    }

    /// Energy charged in watt-hours.
    pub fn energy_charged_wh(&self) -> f64 {
        milli_to_unit(self.energy_charged_mwh)
    }

    /// Full-charge voltage in volts.
    pub fn full_charge_voltage(&self) -> f64 {
        milli_to_unit(u32::from(self.full_charge_voltage_mv))
    }

    /// Time spent in the current work state.
    pub fn work_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.work_period_ms))
    }

    /// Work period as `HH:MM:SS`.
    pub fn work_period_string(&self) -> String {
        format_work_period(self.work_period())
    }

    /// Voltages (V) of cells that are actually present, by cell index.
    pub fn present_cells(&self) -> Vec<(usize, f64)> {
        self.cell_voltages_mv
            .iter()
            .enumerate()
            .filter(|(_, mv)| **mv > CELL_PRESENT_THRESHOLD_MV)
            .map(|(i, mv)| (i, milli_to_unit(u32::from(*mv))))
            .collect()
    }

    /// Internal resistance of the first cell in mΩ, if valid.
    pub fn primary_internal_resistance(&self) -> Option<f64> {
        self.internal_resistance
            .first()
            .copied()
            .flatten()
            .map(raw_ir_to_milliohm)
    }
}
