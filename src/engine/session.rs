//! One connection attempt to a charger.
//!
//! A session owns the receiving end of the transport event queue and the
//! client identifier used for binding. It is created fresh for every
//! attempt and dropped when the attempt ends, which also drops the queue so
//! nothing from a dead link reaches the next session.

use bytes::Bytes;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::connection::ConnectionPhase;
use crate::ble::transport::{Transport, TransportEvent, EVENT_QUEUE_CAPACITY};
use crate::ble::uuids::POLL_CHARACTERISTIC_UUID;
use crate::config::ChargerConfig;
use crate::engine::aggregator::StateAggregator;
use crate::engine::{handshake, poller, Control, Flow, Interrupt};
use crate::error::{Error, Result};
use crate::protocol::Request;

/// What ended a [`Session::wait`].
#[derive(Debug)]
pub(crate) enum Wake {
    /// A notification arrived on the awaited characteristic.
    Frame(Bytes),
    /// A host command was applied.
    Command,
    /// The deadline passed.
    Deadline,
}

pub(crate) struct Session<'a> {
    transport: &'a dyn Transport,
    config: &'a ChargerConfig,
    client_id: [u8; 16],
    events_tx: Option<mpsc::Sender<TransportEvent>>,
    events: mpsc::Receiver<TransportEvent>,
    reached_polling: bool,
}

impl<'a> Session<'a> {
    pub(crate) fn new(transport: &'a dyn Transport, config: &'a ChargerConfig) -> Self {
        let (events_tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        Self {
            transport,
            config,
            client_id: *Uuid::new_v4().as_bytes(),
            events_tx: Some(events_tx),
            events,
            reached_polling: false,
        }
    }

    pub(crate) fn config(&self) -> &ChargerConfig {
        self.config
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport
    }

    pub(crate) fn client_id(&self) -> [u8; 16] {
        self.client_id
    }

    /// Whether this session got as far as polling.
    pub(crate) fn reached_polling(&self) -> bool {
        self.reached_polling
    }

    /// Run the session until it is interrupted.
    pub(crate) async fn run(
        &mut self,
        control: &mut Control,
        state: &mut StateAggregator,
    ) -> Interrupt {
        match self.drive(control, state).await {
            Ok(never) => match never {},
            Err(interrupt) => interrupt,
        }
    }

    async fn drive(
        &mut self,
        control: &mut Control,
        state: &mut StateAggregator,
    ) -> Flow<Infallible> {
        // Host writes queued while disconnected belong to no session.
        control.pending_writes.clear();

        state.set_phase(ConnectionPhase::Connecting);
        let events_tx = self
            .events_tx
            .take()
            .ok_or_else(|| Error::ConnectionFailed {
                reason: "session already connected".to_string(),
            })?;
        control.guard(self.transport.connect(events_tx)).await?;

        state.set_phase(ConnectionPhase::Settling);
        self.transport.subscribe(POLL_CHARACTERISTIC_UUID).await?;
        let settled = Instant::now() + self.config.settle_delay;
        self.sleep_until(control, settled).await?;

        state.set_phase(ConnectionPhase::Handshaking);
        handshake::run(self, control, state).await?;

        state.set_phase(ConnectionPhase::Polling);
        self.reached_polling = true;
        info!("Session bound, polling every {:?}", control.poll_interval);
        poller::run(self, control, state).await
    }

    /// Tear down the link. Errors are logged, never returned.
    pub(crate) async fn close(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Error while disconnecting: {}", e);
        }
        self.events.close();
    }

    /// Write a request to its characteristic.
    pub(crate) async fn write(&self, characteristic: Uuid, request: &Request) -> Result<()> {
        let bytes = request.to_bytes();
        trace!("Writing {:?}: {:02X?}", request, bytes);
        self.transport.write(characteristic, &bytes).await
    }

    /// Wait for the next notification on `characteristic` (any when `None`),
    /// a host command, or `deadline`, whichever comes first.
    ///
    /// A disconnect or a closed event queue ends the session.
    pub(crate) async fn wait(
        &mut self,
        control: &mut Control,
        characteristic: Option<Uuid>,
        deadline: Instant,
    ) -> Flow<Wake> {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(TransportEvent::Notification { characteristic: from, data }) => {
                        trace!("Notification from {}: {:02X?}", from, &data[..]);
                        if characteristic.map_or(true, |wanted| wanted == from) {
                            return Ok(Wake::Frame(data));
                        }
                    }
                    Some(TransportEvent::Disconnected) | None => {
                        debug!("Transport reported disconnect");
                        return Err(Error::ConnectionLost.into());
                    }
                },
                command = control.recv() => {
                    control.dispatch(command)?;
                    return Ok(Wake::Command);
                }
                _ = tokio::time::sleep_until(deadline) => return Ok(Wake::Deadline),
            }
        }
    }

    /// Wait until `deadline`, dropping any notifications.
    pub(crate) async fn sleep_until(
        &mut self,
        control: &mut Control,
        deadline: Instant,
    ) -> Flow<()> {
        loop {
            match self.wait(control, None, deadline).await? {
                Wake::Deadline => return Ok(()),
                Wake::Frame(data) => trace!("Dropping unsolicited frame {:02X?}", &data[..]),
                Wake::Command => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::transport::MockTransport;
    use crate::engine::aggregator::Publisher;
    use crate::engine::{EngineCommand, StopReason};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_wait_filters_by_characteristic() {
        let transport = MockTransport::new();
        let config = ChargerConfig::default();
        let mut session = Session::new(&transport, &config);
        let tx = session.events_tx.take().unwrap();
        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let mut control = Control::new(cmd_rx, config.poll_interval);

        tx.send(TransportEvent::notification(Uuid::nil(), vec![0xAA]))
            .await
            .unwrap();
        tx.send(TransportEvent::notification(POLL_CHARACTERISTIC_UUID, vec![0xBB]))
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        match session
            .wait(&mut control, Some(POLL_CHARACTERISTIC_UUID), deadline)
            .await
        {
            Ok(Wake::Frame(data)) => assert_eq!(&data[..], &[0xBB]),
            other => panic!("unexpected wake: {:?}", other),
        }

        assert!(matches!(
            session.wait(&mut control, None, deadline).await,
            Ok(Wake::Deadline)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_reports_disconnect() {
        let transport = MockTransport::new();
        let config = ChargerConfig::default();
        let mut session = Session::new(&transport, &config);
        let tx = session.events_tx.take().unwrap();
        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let mut control = Control::new(cmd_rx, config.poll_interval);

        tx.send(TransportEvent::Disconnected).await.unwrap();
        let result = session
            .wait(&mut control, None, Instant::now() + Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(Interrupt::Failed(Error::ConnectionLost))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_ends_session() {
        let mut transport = MockTransport::new();
        transport.expect_connect().times(1).returning(|_| {
            Err(Error::ConnectionFailed {
                reason: "out of range".to_string(),
            })
        });
        let config = ChargerConfig::default();
        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let mut control = Control::new(cmd_rx, config.poll_interval);
        let mut state = StateAggregator::new(Arc::new(Publisher::new()));

        let mut session = Session::new(&transport, &config);
        let interrupt = session.run(&mut control, &mut state).await;

        assert!(matches!(
            interrupt,
            Interrupt::Failed(Error::ConnectionFailed { .. })
        ));
        assert!(!session.reached_polling());
        assert_eq!(state.phase(), ConnectionPhase::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_settle() {
        // Hold the event sender so the link stays up while settling.
        let link = Arc::new(Mutex::new(None));
        let held = link.clone();
        let mut transport = MockTransport::new();
        transport.expect_connect().times(1).returning(move |events| {
            *held.lock() = Some(events);
            Ok(())
        });
        transport.expect_subscribe().returning(|_| Ok(()));
        let config = ChargerConfig::default();
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let mut control = Control::new(cmd_rx, config.poll_interval);
        let mut state = StateAggregator::new(Arc::new(Publisher::new()));

        let mut session = Session::new(&transport, &config);
        let run = session.run(&mut control, &mut state);
        tokio::pin!(run);
        let early = tokio::time::timeout(Duration::from_millis(500), &mut run).await;
        assert!(early.is_err(), "session ended before the settle delay");
        assert!(link.lock().is_some());

        cmd_tx.send(EngineCommand::Shutdown).await.unwrap();
        let interrupt = run.await;
        assert!(matches!(interrupt, Interrupt::Stop(StopReason::Shutdown)));
    }
}
