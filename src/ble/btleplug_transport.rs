//! [`Transport`] implementation over a btleplug peripheral.
//!
//! Characteristics are discovered and cached on connect. A listener task
//! merges the peripheral's notification stream with the adapter's
//! disconnect events and forwards both into the session's event queue.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::transport::{Transport, TransportEvent};
use crate::ble::uuids::*;
use crate::error::{Error, Result};

/// How long a single GATT connect attempt may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// BLE transport backed by btleplug.
pub struct BtleplugTransport {
    /// Adapter the peripheral was discovered on (used for disconnect events).
    adapter: Adapter,
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// Cached characteristics by UUID.
    characteristics: RwLock<HashMap<Uuid, Characteristic>>,
    /// Handle to the event forwarding task.
    listener_handle: Mutex<Option<JoinHandle<()>>>,
    /// Connect timeout.
    connect_timeout: Duration,
}

impl BtleplugTransport {
    /// Create a transport for a discovered peripheral.
    pub fn new(adapter: Adapter, peripheral: Peripheral) -> Self {
        Self {
            adapter,
            peripheral,
            characteristics: RwLock::new(HashMap::new()),
            listener_handle: Mutex::new(None),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Discover and cache the charger characteristics.
    async fn discover_characteristics(&self) -> Result<()> {
        self.peripheral.discover_services().await?;

        let services = self.peripheral.services();
        if !services.iter().any(|s| s.uuid == CHARGER_SERVICE_UUID) {
            return Err(Error::ServiceNotFound {
                uuid: CHARGER_SERVICE_UUID.to_string(),
            });
        }

        let mut chars = self.characteristics.write();
        chars.clear();

        for service in services {
            for characteristic in service.characteristics {
                debug!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid, service.uuid
                );
                chars.insert(characteristic.uuid, characteristic);
            }
        }

        for required in [POLL_CHARACTERISTIC_UUID, HANDSHAKE_CHARACTERISTIC_UUID] {
            if !chars.contains_key(&required) {
                return Err(Error::CharacteristicNotFound {
                    uuid: required.to_string(),
                });
            }
        }

        debug!("Discovered {} characteristics", chars.len());

        Ok(())
    }

    /// Get a cached characteristic by UUID.
    fn characteristic(&self, uuid: &Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }

    /// Start forwarding notifications and disconnects into `events`.
    async fn start_listener(&self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        let notifications = self.peripheral.notifications().await?;
        let central_events = self.adapter.events().await?;
        let id = self.peripheral.id();

        let notifications = notifications
            .map(|n| TransportEvent::Notification {
                characteristic: n.uuid,
                data: Bytes::from(n.value),
            })
            // The notification stream ends when the link drops on most platforms.
            .chain(stream::once(async { TransportEvent::Disconnected }));

        let disconnects = central_events.filter_map(move |event| {
            let id = id.clone();
            async move {
                match event {
                    CentralEvent::DeviceDisconnected(peer) if peer == id => {
                        Some(TransportEvent::Disconnected)
                    }
                    _ => None,
                }
            }
        });

        let handle = tokio::spawn(async move {
            let mut merged = Box::pin(stream::select(notifications, disconnects));

            while let Some(event) = merged.next().await {
                let is_disconnect = matches!(event, TransportEvent::Disconnected);
                if let TransportEvent::Notification {
                    characteristic,
                    data,
                } = &event
                {
                    trace!(
                        "Notification from {}: {} bytes, data: {:02X?}",
                        characteristic,
                        data.len(),
                        &data[..]
                    );
                }

                if events.send(event).await.is_err() {
                    debug!("Session queue closed, listener exiting");
                    break;
                }
                if is_disconnect {
                    debug!("Peripheral disconnected, listener exiting");
                    break;
                }
            }
        });

        if let Some(previous) = self.listener_handle.lock().replace(handle) {
            previous.abort();
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            match tokio::time::timeout(self.connect_timeout, self.peripheral.connect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(Error::Bluetooth(e)),
                Err(_) => {
                    return Err(Error::ConnectionFailed {
                        reason: format!("no connection after {:?}", self.connect_timeout),
                    })
                }
            }
        } else {
            info!("Peripheral already connected at BLE level");
        }

        self.discover_characteristics().await?;
        self.start_listener(events).await?;

        info!("Connected to charger {:?}", self.peripheral.id());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
        }

        if !self.peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }

        match self.peripheral.disconnect().await {
            Ok(()) => {
                info!("Disconnected from charger {:?}", self.peripheral.id());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to disconnect: {}", e);
                Err(Error::Bluetooth(e))
            }
        }
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        let target = self.characteristic(&characteristic)?;
        self.peripheral.subscribe(&target).await?;
        debug!("Subscribed to notifications from {}", characteristic);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        let target = self.characteristic(&characteristic)?;
        self.peripheral.unsubscribe(&target).await?;
        debug!("Unsubscribed from notifications from {}", characteristic);
        Ok(())
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let target = self.characteristic(&characteristic)?;
        self.peripheral
            .write(&target, data, WriteType::WithoutResponse)
            .await?;
        trace!("Wrote {:02X?} to characteristic {}", data, characteristic);
        Ok(())
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
        }
    }
}
