//! Connection supervisor.
//!
//! Runs sessions back to back, waiting between failed attempts according to
//! the [`ReconnectPolicy`](crate::config::ReconnectPolicy). The consecutive
//! failure count resets whenever a session reaches polling or the host asks
//! for an explicit reconnect.

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::ble::connection::ConnectionPhase;
use crate::ble::transport::Transport;
use crate::config::ChargerConfig;
use crate::engine::aggregator::StateAggregator;
use crate::engine::session::Session;
use crate::engine::{Control, Interrupt, StopReason};

pub(crate) struct Supervisor {
    transport: Arc<dyn Transport>,
    config: ChargerConfig,
    control: Control,
    state: StateAggregator,
}

impl Supervisor {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: ChargerConfig,
        control: Control,
        state: StateAggregator,
    ) -> Self {
        Self {
            transport,
            config,
            control,
            state,
        }
    }

    /// Run until shutdown or until the reconnect policy gives up.
    pub(crate) async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            let delay = self.config.reconnect.delay_for(failures);
            if !delay.is_zero() {
                info!("Reconnecting in {:?} (attempt {})", delay, failures + 1);
                match self.control.sleep_until(Instant::now() + delay).await {
                    Ok(()) => {}
                    Err(Interrupt::Stop(StopReason::Reconnect)) => failures = 0,
                    Err(_) => break,
                }
            }

            let mut session = Session::new(&*self.transport, &self.config);
            let interrupt = session.run(&mut self.control, &mut self.state).await;
            let reached_polling = session.reached_polling();
            let ended_in = self.state.phase();
            session.close().await;
            drop(session);
            self.state.set_phase(ConnectionPhase::Disconnected);

            match interrupt {
                Interrupt::Stop(StopReason::Shutdown) => break,
                Interrupt::Stop(StopReason::Reconnect) => {
                    info!("Reconnect requested");
                    failures = 0;
                }
                Interrupt::Failed(e) => {
                    if reached_polling {
                        failures = 0;
                    }
                    failures += 1;
                    warn!("Session ended while {}: {}", ended_in, e);

                    if !self.config.reconnect.allows(failures) {
                        error!("Giving up after {} consecutive failed attempts", failures);
                        break;
                    }
                }
            }
        }

        info!("Charger engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::connection::ConnectionEvent;
    use crate::ble::transport::MockTransport;
    use crate::charger::Charger;
    use crate::config::ReconnectPolicy;
    use crate::data::WorkState;
    use crate::engine::testing::{wait_for_phase, wait_for_snapshot, FakeCharger};
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(10),
            "expected {:?}, got {:?}",
            expected,
            actual
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hardware_info_timeout_still_polls() {
        let fake = Arc::new(FakeCharger::new().without_hardware_info());
        let charger = Charger::spawn(fake.clone(), ChargerConfig::default()).unwrap();
        let mut rx = charger.subscribe();

        let snapshot = wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 1).await;
        assert_eq!(snapshot.phase, ConnectionPhase::Polling);
        assert!(snapshot.is_connected());
        assert!(snapshot.hardware_info.is_none());
        assert_eq!(fake.bind_requests(), 1);

        charger.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hardware_info_captured() {
        let fake = Arc::new(FakeCharger::new());
        let charger = Charger::spawn(fake.clone(), ChargerConfig::default()).unwrap();
        let mut rx = charger.subscribe();

        let snapshot = wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 1).await;
        let info = snapshot.hardware_info.unwrap();
        assert_eq!(info, FakeCharger::hardware_info());
        assert_eq!(snapshot.alarm_tone, Some(true));

        charger.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_transition_into_charging() {
        let fake = Arc::new(FakeCharger::new());
        let charger = Charger::spawn(fake.clone(), ChargerConfig::default()).unwrap();
        let mut rx = charger.subscribe();

        let first = wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 1).await;
        assert_eq!(first.channels[2].work_state, WorkState::Idle);
        assert!(first.channels[2].charge_started_at.is_none());

        fake.set_work_state(2, 2);
        fake.set_charging_current(2, 1_800);
        let second = wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 2).await;
        let channel = &second.channels[2];
        assert!(channel.is_charging());
        let started = channel.charge_started_at.unwrap();
        assert_eq!(second.total_charging_current_ma, 1_800);

        let third = wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 3).await;
        assert_eq!(third.channels[2].charge_started_at, Some(started));

        fake.set_work_state(2, 0);
        let fourth = wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 4).await;
        assert!(fourth.channels[2].charge_started_at.is_none());

        charger.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_cycle_discards_partial_data() {
        // Poll write 24 is channel 1's work state query in the second cycle,
        // after channel 0 has already reported charging.
        let fake = Arc::new(FakeCharger::new().disconnect_at_poll_write(24));
        fake.set_work_state(0, 0);
        let charger = Charger::spawn(fake.clone(), ChargerConfig::default()).unwrap();
        let mut rx = charger.subscribe();
        let mut events = charger.subscribe_connection();

        wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 1).await;
        fake.set_work_state(0, 2);

        let lost = wait_for_phase(&mut events, ConnectionPhase::Disconnected).await;
        assert_eq!(lost.previous, ConnectionPhase::Polling);

        let mut seen = Vec::new();
        let recovered = wait_for_snapshot(&mut rx, |s| {
            seen.push((s.cycles_completed, s.channels[0].is_charging()));
            s.cycles_completed >= 2
        })
        .await;

        // Every snapshot published before the second complete cycle still
        // shows channel 0 idle.
        assert!(seen
            .iter()
            .filter(|(cycles, _)| *cycles < 2)
            .all(|(_, charging)| !charging));
        assert!(recovered.channels[0].is_charging());
        assert_eq!(fake.connect_count(), 2);
        // Hardware info is captured once and not queried again.
        assert_eq!(fake.hardware_info_requests(), 1);

        charger.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requery_hardware_info_on_reconnect() {
        let fake = Arc::new(FakeCharger::new());
        let config = ChargerConfig::default().with_requery_hardware_info(true);
        let charger = Charger::spawn(fake.clone(), config).unwrap();
        let mut events = charger.subscribe_connection();

        wait_for_phase(&mut events, ConnectionPhase::Polling).await;
        charger.reconnect().await.unwrap();
        wait_for_phase(&mut events, ConnectionPhase::Disconnected).await;
        wait_for_phase(&mut events, ConnectionPhase::Polling).await;

        assert_eq!(fake.connect_count(), 2);
        assert_eq!(fake.hardware_info_requests(), 2);

        charger.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_rejected_reconnects() {
        let fake = Arc::new(FakeCharger::new().with_bind_status(Some(0x02)));
        let config = ChargerConfig::default().with_reconnect(ReconnectPolicy {
            max_attempts: Some(2),
            ..Default::default()
        });
        let charger = Charger::spawn(fake.clone(), config).unwrap();
        let mut events = charger.subscribe_connection();

        tokio::time::timeout(Duration::from_secs(60), charger.stopped())
            .await
            .unwrap();

        assert_eq!(fake.connect_count(), 2);
        assert_eq!(fake.hardware_info_requests(), 0);
        let mut phases = Vec::new();
        while let Ok(event) = events.try_recv() {
            phases.push(event.phase);
        }
        assert!(!phases.contains(&ConnectionPhase::Polling));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_timeout_fails_session() {
        let fake = Arc::new(FakeCharger::new().with_bind_status(None));
        let config = ChargerConfig::default().with_reconnect(ReconnectPolicy {
            max_attempts: Some(1),
            ..Default::default()
        });
        let charger = Charger::spawn(fake.clone(), config).unwrap();

        tokio::time::timeout(Duration::from_secs(60), charger.stopped())
            .await
            .unwrap();
        assert_eq!(fake.connect_count(), 1);
        assert_eq!(charger.snapshot().phase, ConnectionPhase::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_backs_off() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let mut transport = MockTransport::new();
        let recorded = attempts.clone();
        transport.expect_connect().times(3).returning(move |_| {
            recorded.lock().push(Instant::now());
            Err(Error::ConnectionFailed {
                reason: "not advertising".to_string(),
            })
        });
        transport.expect_disconnect().returning(|| Ok(()));

        let config = ChargerConfig::default().with_reconnect(ReconnectPolicy {
            max_attempts: Some(3),
            ..Default::default()
        });
        let charger = Charger::spawn(Arc::new(transport), config).unwrap();

        tokio::time::timeout(Duration::from_secs(60), charger.stopped())
            .await
            .unwrap();

        let attempts = attempts.lock();
        assert_eq!(attempts.len(), 3);
        assert_close(attempts[1] - attempts[0], Duration::from_secs(1));
        assert_close(attempts[2] - attempts[1], Duration::from_secs(2));
        assert!(!charger.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_alarm_tone() {
        let fake = Arc::new(FakeCharger::new());
        let charger = Charger::spawn(fake.clone(), ChargerConfig::default()).unwrap();
        let mut rx = charger.subscribe();

        assert!(matches!(
            charger.set_alarm_tone(false).await,
            Err(Error::NotConnected)
        ));

        wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 1).await;
        charger.set_alarm_tone(false).await.unwrap();

        let snapshot = wait_for_snapshot(&mut rx, |s| s.alarm_tone == Some(false)).await;
        assert_eq!(snapshot.cycles_completed, 1);
        assert!(fake.poll_writes().contains(&vec![0x13, 0x9C, 0x00]));

        // The next cycle's query reads back the new state.
        let next = wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 2).await;
        assert_eq!(next.alarm_tone, Some(false));

        charger.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_spacing() {
        let fake = Arc::new(FakeCharger::new());
        let charger = Charger::spawn(fake.clone(), ChargerConfig::default()).unwrap();
        let mut rx = charger.subscribe();

        let first = wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 1).await;
        let first_at = Instant::now();
        assert!(fake
            .handshake_writes()
            .iter()
            .all(|w| w[0] == 0x18 || w[0] == 0xE0));
        assert_eq!(first.cycles_completed, 1);
        assert_eq!(fake.poll_writes().len(), 19);

        charger
            .set_poll_interval(Duration::from_secs(30))
            .await
            .unwrap();
        wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 2).await;
        wait_for_snapshot(&mut rx, |s| s.cycles_completed >= 3).await;
        let elapsed = Instant::now() - first_at;
        assert!(elapsed >= Duration::from_secs(38), "elapsed {:?}", elapsed);
        assert!(charger.set_poll_interval(Duration::from_secs(5)).await.is_err());

        charger.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disconnects() {
        let fake = Arc::new(FakeCharger::new());
        let charger = Charger::spawn(fake.clone(), ChargerConfig::default()).unwrap();
        let mut events: broadcast::Receiver<ConnectionEvent> = charger.subscribe_connection();

        wait_for_phase(&mut events, ConnectionPhase::Polling).await;
        charger.shutdown().await.unwrap();

        assert_eq!(fake.disconnect_count(), 1);
        assert_eq!(charger.snapshot().phase, ConnectionPhase::Disconnected);
        assert!(matches!(
            charger.reconnect().await,
            Err(Error::EngineStopped)
        ));
    }
}
