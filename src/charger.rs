//! Host-facing charger handle.
//!
//! A [`Charger`] owns the engine task for one charger. Reads are served from
//! the last published [`ChargerSnapshot`] and never wait on the device;
//! commands are queued to the engine and applied at its next suspension
//! point.

use btleplug::platform::{Adapter, Peripheral};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ble::btleplug_transport::BtleplugTransport;
use crate::ble::connection::{ConnectionEvent, ConnectionPhase};
use crate::ble::transport::Transport;
use crate::config::{validate_poll_interval, ChargerConfig};
use crate::data::ChargerSnapshot;
use crate::engine::aggregator::{Publisher, StateAggregator};
use crate::engine::supervisor::Supervisor;
use crate::engine::{Control, EngineCommand, COMMAND_QUEUE_CAPACITY};
use crate::error::{Error, Result};

/// Registration of a snapshot or connection callback.
///
/// Each callback runs on its own task fed by a broadcast receiver. Dropping
/// the handle, or calling [`unregister`](Self::unregister), aborts that task.
#[derive(Debug)]
pub struct CallbackHandle {
    id: u64,
    task: Option<JoinHandle<()>>,
}

impl CallbackHandle {
    fn new(id: u64, task: JoinHandle<()>) -> Self {
        Self {
            id,
            task: Some(task),
        }
    }

    /// Stop delivering to this callback.
    pub fn unregister(mut self) {
        self.abort();
    }

    /// Registration number, unique per [`Charger`].
    pub fn id(&self) -> u64 {
        self.id
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Handle to a supervised connection with one ISDT charger.
///
/// # Example
///
/// ```rust,no_run
/// use isdt_air_ble::{BleScanner, Charger, ChargerConfig};
///
/// # async fn example() -> isdt_air_ble::Result<()> {
/// let scanner = BleScanner::new().await?;
/// let mut discoveries = scanner.subscribe();
/// scanner.start().await?;
///
/// let found = discoveries
///     .recv()
///     .await
///     .map_err(|_| isdt_air_ble::Error::BluetoothUnavailable)?;
/// let charger = Charger::connect_peripheral(
///     scanner.adapter().clone(),
///     found.peripheral,
///     ChargerConfig::default(),
/// )?;
///
/// let snapshot = charger.snapshot();
/// for channel in snapshot.charging_channels() {
///     println!("slot {}: {}%", channel.slot_number(), channel.capacity_percent);
/// }
/// # Ok(())
/// # }
/// ```
///
/// Dropping the handle closes the command queue, which stops the engine and
/// disconnects.
pub struct Charger {
    commands: mpsc::Sender<EngineCommand>,
    publisher: Arc<Publisher>,
    task: Mutex<Option<JoinHandle<()>>>,
    callback_counter: Arc<AtomicU64>,
}

impl Charger {
    /// Start the engine over any [`Transport`]. Must be called inside a
    /// tokio runtime.
    pub fn spawn(transport: Arc<dyn Transport>, config: ChargerConfig) -> Result<Self> {
        config.validate()?;

        let (commands, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let publisher = Arc::new(Publisher::new());
        let control = Control::new(commands_rx, config.poll_interval);
        let state = StateAggregator::new(publisher.clone());
        let supervisor = Supervisor::new(transport, config, control, state);

        let task = tokio::spawn(supervisor.run());
        debug!("Charger engine started");

        Ok(Self {
            commands,
            publisher,
            task: Mutex::new(Some(task)),
            callback_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Start the engine for a btleplug peripheral.
    pub fn connect_peripheral(
        adapter: Adapter,
        peripheral: Peripheral,
        config: ChargerConfig,
    ) -> Result<Self> {
        Self::spawn(
            Arc::new(BtleplugTransport::new(adapter, peripheral)),
            config,
        )
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<ChargerSnapshot> {
        self.publisher.current()
    }

    /// Current connection phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.snapshot().phase
    }

    /// Host-visible connected status.
    pub fn is_connected(&self) -> bool {
        self.phase().is_connected()
    }

    /// Subscribe to published snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChargerSnapshot>> {
        self.publisher.subscribe_snapshots()
    }

    /// Subscribe to connection phase changes.
    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.publisher.subscribe_connection()
    }

    /// Register a callback for published snapshots.
    pub fn on_snapshot<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&ChargerSnapshot) + Send + Sync + 'static,
    {
        self.register(self.subscribe(), move |snapshot: Arc<ChargerSnapshot>| {
            callback(&snapshot)
        })
    }

    /// Register a callback for connection phase changes.
    pub fn on_connection_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(ConnectionEvent) + Send + Sync + 'static,
    {
        self.register(self.subscribe_connection(), callback)
    }

    /// Feed every item from `rx` to `callback` on a dedicated task.
    fn register<T, F>(&self, mut rx: broadcast::Receiver<T>, callback: F) -> CallbackHandle
    where
        T: Clone + Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(item) => callback(item),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Callback {} lagged, skipped {} updates", id, skipped)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        CallbackHandle::new(id, task)
    }

    /// Change the poll interval (10-300 s).
    pub async fn set_poll_interval(&self, interval: Duration) -> Result<()> {
        let interval = validate_poll_interval(interval)?;
        self.send(EngineCommand::SetPollInterval(interval)).await
    }

    /// Enable or disable the charger's alarm tone.
    ///
    /// Only accepted while polling. The snapshot is updated as soon as the
    /// command has been written, before the next alarm query confirms it.
    pub async fn set_alarm_tone(&self, enabled: bool) -> Result<()> {
        if self.phase() != ConnectionPhase::Polling {
            return Err(Error::NotConnected);
        }
        self.send(EngineCommand::SetAlarmTone(enabled)).await
    }

    /// Drop the current session and connect again immediately.
    pub async fn reconnect(&self) -> Result<()> {
        self.send(EngineCommand::Reconnect).await
    }

    /// Stop the engine, disconnecting from the charger.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down charger engine");
        // Already stopped is fine.
        let _ = self.commands.send(EngineCommand::Shutdown).await;

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    return Err(Error::EngineStopped);
                }
            }
        }
        Ok(())
    }

    /// Resolve once the engine task has stopped.
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }

    async fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::EngineStopped)
    }
}
