//! State aggregation and publication.
//!
//! The engine task is the only writer. It keeps a working [`ChargerSnapshot`]
//! and publishes an immutable copy after each completed poll cycle and on
//! every connection phase change. Readers only ever see published copies.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ble::connection::{ConnectionEvent, ConnectionPhase};
use crate::data::{ChargerSnapshot, HardwareInfo};
use crate::protocol::{ElectricResponse, InternalResistanceResponse, Response, WorkStateResponse};

/// Snapshot broadcast capacity.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 32;
/// Connection event broadcast capacity.
const CONNECTION_CHANNEL_CAPACITY: usize = 16;

/// A decoded response collected during a poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub(crate) response: Response,
    pub(crate) received_at: DateTime<Utc>,
}

impl Record {
    pub(crate) fn new(response: Response) -> Self {
        Self {
            response,
            received_at: Utc::now(),
        }
    }
}

/// Shared between the engine task and every [`Charger`](crate::Charger) reader.
pub(crate) struct Publisher {
    current: RwLock<Arc<ChargerSnapshot>>,
    snapshot_tx: broadcast::Sender<Arc<ChargerSnapshot>>,
    connection_tx: broadcast::Sender<ConnectionEvent>,
}

impl Publisher {
    pub(crate) fn new() -> Self {
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let (connection_tx, _) = broadcast::channel(CONNECTION_CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(Arc::new(ChargerSnapshot::default())),
            snapshot_tx,
            connection_tx,
        }
    }

    /// Latest published snapshot.
    pub(crate) fn current(&self) -> Arc<ChargerSnapshot> {
        self.current.read().clone()
    }

    pub(crate) fn subscribe_snapshots(&self) -> broadcast::Receiver<Arc<ChargerSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub(crate) fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection_tx.subscribe()
    }

    fn publish(&self, snapshot: ChargerSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = snapshot.clone();
        // No receivers is fine.
        let _ = self.snapshot_tx.send(snapshot);
    }
}

/// Single-writer owner of the authoritative charger state.
pub(crate) struct StateAggregator {
    state: ChargerSnapshot,
    publisher: Arc<Publisher>,
}

impl StateAggregator {
    pub(crate) fn new(publisher: Arc<Publisher>) -> Self {
        Self {
            state: ChargerSnapshot::default(),
            publisher,
        }
    }

    pub(crate) fn phase(&self) -> ConnectionPhase {
        self.state.phase
    }

    /// Move to a new phase, publishing the event and a snapshot.
    pub(crate) fn set_phase(&mut self, phase: ConnectionPhase) {
        let previous = self.state.phase;
        if previous == phase {
            return;
        }

        debug!("Connection phase: {} -> {}", previous, phase);
        self.state.phase = phase;
        let _ = self
            .publisher
            .connection_tx
            .send(ConnectionEvent { previous, phase });
        self.publisher.publish(self.state.clone());
    }

    pub(crate) fn hardware_info(&self) -> Option<HardwareInfo> {
        self.state.hardware_info
    }

    /// Record hardware info. Published with the next snapshot.
    pub(crate) fn set_hardware_info(&mut self, info: HardwareInfo) {
        info!(
            "Charger hardware {} firmware {} serial {}",
            info.hardware_version(),
            info.firmware_version(),
            info.serial_number()
        );
        self.state.hardware_info = Some(info);
    }

    /// Optimistically record an alarm tone change the host just wrote.
    pub(crate) fn set_alarm_tone(&mut self, enabled: bool) {
        self.state.alarm_tone = Some(enabled);
        self.publisher.publish(self.state.clone());
    }

    /// Apply one completed poll cycle as a single update and publish it.
    pub(crate) fn apply_cycle(&mut self, records: Vec<Record>) {
        let received = records.len();
        // Channels that missed their electric response count as zero.
        self.state.total_charging_current_ma = records
            .iter()
            .filter_map(|record| match &record.response {
                Response::Electric(resp) => Some(u64::from(resp.charging_current_ma)),
                _ => None,
            })
            .sum();

        for record in records {
            self.apply(record);
        }
        self.state.cycles_completed += 1;

        debug!(
            "Cycle {} applied: {} responses, total charging current {} mA",
            self.state.cycles_completed, received, self.state.total_charging_current_ma
        );
        self.publisher.publish(self.state.clone());
    }

    fn apply(&mut self, record: Record) {
        let at = record.received_at;
        self.state.last_seen = Some(self.state.last_seen.map_or(at, |seen| seen.max(at)));

        match record.response {
            Response::AlarmTone(enabled) => self.state.alarm_tone = Some(enabled),
            Response::AlarmToneSet { success } => {
                if !success {
                    warn!("Charger rejected alarm tone change");
                }
            }
            Response::WorkState(resp) => self.apply_work_state(resp, at),
            Response::Electric(resp) => self.apply_electric(resp, at),
            Response::InternalResistance(resp) => self.apply_internal_resistance(resp, at),
        }
    }

    fn apply_work_state(&mut self, resp: WorkStateResponse, at: DateTime<Utc>) {
        let Some(channel) = self.state.channels.get_mut(usize::from(resp.channel)) else {
            return;
        };

        if resp.work_state.is_charging() {
            if !channel.is_charging() || channel.charge_started_at.is_none() {
                info!("Channel {} started charging", channel.slot_number());
                channel.charge_started_at = Some(at);
            }
        } else if channel.charge_started_at.take().is_some() {
            info!(
                "Channel {} stopped charging ({})",
                channel.slot_number(),
                resp.work_state
            );
        }

        channel.work_state = resp.work_state;
        channel.capacity_percent = resp.capacity_percent;
        channel.capacity_charged_mah = resp.capacity_charged_mah;
        channel.energy_charged_mwh = resp.energy_charged_mwh;
        channel.work_period_ms = resp.work_period_ms;
        channel.battery_type = resp.battery_type;
        channel.unit_serials = resp.unit_serials;
        channel.link_type = resp.link_type;
        channel.full_charge_voltage_mv = resp.full_charge_voltage_mv;
        channel.work_current_ma = resp.work_current_ma;
        channel.batteries_total = resp.batteries_total;
        channel.batteries_current = resp.batteries_current;
        channel.min_input_voltage_mv = resp.min_input_voltage_mv;
        channel.max_output_power_mw = resp.max_output_power_mw;
        channel.error_code = resp.error_code;
        channel.parallel = resp.parallel;
        channel.last_updated = Some(at);
    }

    fn apply_electric(&mut self, resp: ElectricResponse, at: DateTime<Utc>) {
        let Some(channel) = self.state.channels.get_mut(usize::from(resp.channel)) else {
            return;
        };

        channel.input_voltage_mv = resp.input_voltage_mv;
        channel.input_current_ma = resp.input_current_ma;
        channel.output_voltage_mv = resp.output_voltage_mv;
        channel.charging_current_ma = resp.charging_current_ma;
        channel.cell_voltages_mv = resp.cell_voltages_mv;
        channel.last_updated = Some(at);
    }

    fn apply_internal_resistance(&mut self, resp: InternalResistanceResponse, at: DateTime<Utc>) {
        let Some(channel) = self.state.channels.get_mut(usize::from(resp.channel)) else {
            return;
        };

        channel.internal_resistance = resp.cells;
        channel.last_updated = Some(at);
    }
}
