//! Scripted charger used by engine tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::ble::connection::{ConnectionEvent, ConnectionPhase};
use crate::ble::transport::{Transport, TransportEvent};
use crate::ble::uuids::{HANDSHAKE_CHARACTERISTIC_UUID, POLL_CHARACTERISTIC_UUID};
use crate::data::{BatteryType, ChargerSnapshot, HardwareInfo, WorkState, CHANNEL_COUNT};
use crate::error::Result;
use crate::protocol::commands::{
    CMD_ALARM_TONE_REQ, CMD_ALARM_TONE_SET, CMD_BIND_REQ, CMD_ELECTRIC_REQ,
    CMD_HARDWARE_INFO_REQ, CMD_IR_REQ, CMD_WORK_STATE_REQ, RESP_ALARM_TONE, RESP_ALARM_TONE_SET,
};
use crate::protocol::{
    encode_hardware_info, BindResponse, ElectricFormat, ElectricResponse,
    InternalResistanceResponse, WorkStateResponse,
};

const ADDRESS: u8 = 0x01;

/// Work state response for `channel` with the given raw state code.
pub(crate) fn work_state_response(channel: u8, raw_state: u8) -> WorkStateResponse {
    WorkStateResponse {
        address: ADDRESS,
        channel,
        work_state: WorkState::from_raw(raw_state),
        capacity_percent: 40,
        capacity_charged_mah: 900,
        energy_charged_mwh: 3_300,
        work_period_ms: 600_000,
        battery_type: BatteryType::LiIon,
        unit_serials: 1,
        link_type: 0,
        full_charge_voltage_mv: 4_200,
        work_current_ma: 1_000,
        batteries_total: 1,
        batteries_current: 1,
        min_input_voltage_mv: 5_000,
        max_output_power_mw: 20_000,
        error_code: 0,
        parallel: Some(false),
    }
}

/// Short-format electric response for `channel`.
pub(crate) fn electric_response(channel: u8, charging_current_ma: u32) -> ElectricResponse {
    ElectricResponse {
        address: ADDRESS,
        channel,
        format: ElectricFormat::Short,
        input_voltage_mv: 12_000,
        input_current_ma: charging_current_ma / 3,
        output_voltage_mv: 4_100,
        charging_current_ma,
        cell_voltages_mv: vec![4_100, 0, 0, 0, 0, 0, 0, 0],
    }
}

struct FakeState {
    events: Option<mpsc::Sender<TransportEvent>>,
    bind_status: Option<u8>,
    hardware_info: Option<HardwareInfo>,
    alarm_tone: bool,
    work_states: [u8; CHANNEL_COUNT],
    charging_currents: [u32; CHANNEL_COUNT],
    disconnect_at_poll_write: Option<usize>,
    poll_writes: Vec<Vec<u8>>,
    handshake_writes: Vec<Vec<u8>>,
    connects: usize,
    disconnects: usize,
}

/// In-memory charger answering every request the engine writes.
///
/// Responses are pushed into the session queue from inside `write`, so they
/// are already waiting when the engine starts its response window.
pub(crate) struct FakeCharger {
    state: Mutex<FakeState>,
}

impl FakeCharger {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                events: None,
                bind_status: Some(0),
                hardware_info: Some(Self::hardware_info()),
                alarm_tone: true,
                work_states: [0; CHANNEL_COUNT],
                charging_currents: [0; CHANNEL_COUNT],
                disconnect_at_poll_write: None,
                poll_writes: Vec::new(),
                handshake_writes: Vec::new(),
                connects: 0,
                disconnects: 0,
            }),
        }
    }

    /// Hardware info the fake reports.
    pub(crate) fn hardware_info() -> HardwareInfo {
        HardwareInfo {
            hardware_major: 1,
            hardware_minor: 0,
            firmware_major: 2,
            firmware_minor: 5,
            device_id: 0x00C4_A1B2_C3D4_E5F6,
        }
    }

    /// Never answer hardware info requests.
    pub(crate) fn without_hardware_info(self) -> Self {
        self.state.lock().hardware_info = None;
        self
    }

    /// Answer bind requests with `status`, or never when `None`.
    pub(crate) fn with_bind_status(self, status: Option<u8>) -> Self {
        self.state.lock().bind_status = status;
        self
    }

    /// Drop the link instead of answering the `n`th poll write (1-based,
    /// counted across sessions).
    pub(crate) fn disconnect_at_poll_write(self, n: usize) -> Self {
        self.state.lock().disconnect_at_poll_write = Some(n);
        self
    }

    pub(crate) fn set_work_state(&self, channel: usize, raw: u8) {
        self.state.lock().work_states[channel] = raw;
    }

    pub(crate) fn set_charging_current(&self, channel: usize, ma: u32) {
        self.state.lock().charging_currents[channel] = ma;
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    pub(crate) fn disconnect_count(&self) -> usize {
        self.state.lock().disconnects
    }

    pub(crate) fn poll_writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().poll_writes.clone()
    }

    pub(crate) fn handshake_writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().handshake_writes.clone()
    }

    pub(crate) fn bind_requests(&self) -> usize {
        self.count_handshake(CMD_BIND_REQ)
    }

    pub(crate) fn hardware_info_requests(&self) -> usize {
        self.count_handshake(CMD_HARDWARE_INFO_REQ)
    }

    fn count_handshake(&self, command: u8) -> usize {
        self.state
            .lock()
            .handshake_writes
            .iter()
            .filter(|w| w.first() == Some(&command))
            .count()
    }
}

impl FakeState {
    fn handshake_reply(&self, data: &[u8]) -> Option<Vec<u8>> {
        match data.first().copied()? {
            CMD_BIND_REQ => self
                .bind_status
                .map(|status| BindResponse { status }.to_bytes()),
            CMD_HARDWARE_INFO_REQ => self
                .hardware_info
                .map(|info| encode_hardware_info(&info, Some(ADDRESS))),
            _ => None,
        }
    }

    fn poll_reply(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        let command = *data.get(1)?;
        let channel = data.get(2).copied().unwrap_or(0);
        let index = usize::from(channel);

        match command {
            CMD_ALARM_TONE_REQ => Some(vec![ADDRESS, RESP_ALARM_TONE, u8::from(self.alarm_tone)]),
            CMD_ALARM_TONE_SET => {
                self.alarm_tone = channel != 0;
                Some(vec![ADDRESS, RESP_ALARM_TONE_SET, 0xFF])
            }
            CMD_WORK_STATE_REQ => {
                Some(work_state_response(channel, self.work_states[index]).to_bytes())
            }
            CMD_ELECTRIC_REQ => {
                Some(electric_response(channel, self.charging_currents[index]).to_bytes())
            }
            CMD_IR_REQ => Some(
                InternalResistanceResponse {
                    address: ADDRESS,
                    channel,
                    cells: vec![Some(425), None, None, None, None, None, None, None],
                }
                .to_bytes(),
            ),
            _ => None,
        }
    }

    fn push(&self, characteristic: Uuid, data: Vec<u8>) {
        if let Some(events) = &self.events {
            let _ = events.try_send(TransportEvent::notification(characteristic, data));
        }
    }
}

#[async_trait]
impl Transport for FakeCharger {
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        let mut state = self.state.lock();
        state.connects += 1;
        state.events = Some(events);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.disconnects += 1;
        state.events = None;
        Ok(())
    }

    async fn subscribe(&self, _characteristic: Uuid) -> Result<()> {
        Ok(())
    }

    async fn unsubscribe(&self, _characteristic: Uuid) -> Result<()> {
        Ok(())
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();

        if characteristic == HANDSHAKE_CHARACTERISTIC_UUID {
            state.handshake_writes.push(data.to_vec());
            if let Some(reply) = state.handshake_reply(data) {
                state.push(HANDSHAKE_CHARACTERISTIC_UUID, reply);
            }
        } else if characteristic == POLL_CHARACTERISTIC_UUID {
            state.poll_writes.push(data.to_vec());
            if state.disconnect_at_poll_write == Some(state.poll_writes.len()) {
                if let Some(events) = state.events.take() {
                    let _ = events.try_send(TransportEvent::Disconnected);
                }
                return Ok(());
            }
            if let Some(reply) = state.poll_reply(data) {
                state.push(POLL_CHARACTERISTIC_UUID, reply);
            }
        }

        Ok(())
    }
}

/// Wait (in paused time) for a published snapshot matching `pred`.
pub(crate) async fn wait_for_snapshot(
    rx: &mut broadcast::Receiver<Arc<ChargerSnapshot>>,
    mut pred: impl FnMut(&ChargerSnapshot) -> bool,
) -> Arc<ChargerSnapshot> {
    let found = tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            match rx.recv().await {
                Ok(snapshot) if pred(&snapshot) => return snapshot,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("snapshot channel closed"),
            }
        }
    })
    .await;
    found.expect("timed out waiting for snapshot")
}

/// Wait (in paused time) for a transition into `phase`.
pub(crate) async fn wait_for_phase(
    rx: &mut broadcast::Receiver<ConnectionEvent>,
    phase: ConnectionPhase,
) -> ConnectionEvent {
    let found = tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            match rx.recv().await {
                Ok(event) if event.phase == phase => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await;
    found.expect("timed out waiting for connection phase")
}
