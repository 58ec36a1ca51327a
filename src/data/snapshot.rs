//! Immutable view of a charger published to the host.

use chrono::{DateTime, Utc};

use crate::ble::connection::ConnectionPhase;
use crate::data::{Channel, HardwareInfo, CHANNEL_COUNT};
use crate::utils::milli_to_unit;

/// Point-in-time copy of everything known about a charger.
///
/// A new snapshot is published after each completed poll cycle and on each
/// connection phase change. Snapshots are never mutated once published.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChargerSnapshot {
    /// Connection phase at publish time.
    pub phase: ConnectionPhase,
    /// The six charging slots.
    pub channels: [Channel; CHANNEL_COUNT],
    /// Hardware info, once captured.
    pub hardware_info: Option<HardwareInfo>,
    /// Alarm tone state, once reported.
    pub alarm_tone: Option<bool>,
    /// Sum of the charging currents (mA) reported in the last completed cycle.
    pub total_charging_current_ma: u64,
    /// Number of poll cycles applied since the handle was created.
    pub cycles_completed: u64,
    /// Receive time of the most recent response applied.
    pub last_seen: Option<DateTime<Utc>>,
}

impl Default for ChargerSnapshot {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            channels: std::array::from_fn(|i| Channel::new(i as u8)),
            hardware_info: None,
            alarm_tone: None,
            total_charging_current_ma: 0,
            cycles_completed: 0,
            last_seen: None,
        }
    }
}

impl ChargerSnapshot {
    /// Host-visible connected status.
    pub fn is_connected(&self) -> bool {
        self.phase.is_connected()
    }

    /// Get a channel by index.
    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    /// Channels currently charging.
    pub fn charging_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| c.is_charging())
    }

    /// Total charging current in amperes.
    pub fn total_charging_current(&self) -> f64 {
        self.total_charging_current_ma as f64 / 1000.0
    }

    /// Total input current across channels in amperes.
    pub fn total_input_current(&self) -> f64 {
        self.channels
            .iter()
            .map(|c| milli_to_unit(c.input_current_ma))
            .sum()
    }
}
