//! BLE scanning functionality.
//!
//! Discovers ISDT chargers by their manufacturer data, falling back to the
//! advertised local name for models that do not carry a recognizable
//! pattern.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::ble::advertising::{identify_model, DeviceModel};
use crate::ble::uuids::ISDT_MANUFACTURER_ID;
use crate::error::{Error, Result};

/// Capacity of the discovery event channel.
const DISCOVERY_CHANNEL_CAPACITY: usize = 100;

/// Event emitted when a charger is discovered or its advertisement updates.
#[derive(Debug, Clone)]
pub struct ChargerDiscoveryEvent {
    /// The BLE peripheral identifier.
    pub identifier: String,
    /// The peripheral handle.
    pub peripheral: Peripheral,
    /// Resolved charger model.
    pub model: DeviceModel,
    /// Advertised local name, if any.
    pub local_name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// Resolve a model from manufacturer data, then from the local name.
///
/// Returns `None` when neither identifies an ISDT device.
pub fn resolve_model(
    manufacturer_data: &HashMap<u16, Vec<u8>>,
    local_name: Option<&str>,
) -> Option<DeviceModel> {
    manufacturer_data
        .get(&ISDT_MANUFACTURER_ID)
        .and_then(|payload| identify_model(ISDT_MANUFACTURER_ID, payload))
        .filter(DeviceModel::is_recognized)
        .or_else(|| local_name.and_then(DeviceModel::from_local_name))
        .or_else(|| {
            manufacturer_data
                .contains_key(&ISDT_MANUFACTURER_ID)
                .then_some(DeviceModel::Unrecognized)
        })
}

/// BLE scanner for discovering ISDT chargers.
pub struct BleScanner {
    adapter: Adapter,
    is_scanning: Arc<RwLock<bool>>,
    discovered: Arc<RwLock<HashMap<String, ChargerDiscoveryEvent>>>,
    event_tx: broadcast::Sender<ChargerDiscoveryEvent>,
    scan_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl BleScanner {
    /// Create a scanner on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        let (event_tx, _) = broadcast::channel(DISCOVERY_CHANNEL_CAPACITY);

        Self {
            adapter,
            is_scanning: Arc::new(RwLock::new(false)),
            discovered: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            scan_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Start scanning for chargers.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning cannot be started.
    pub async fn start(&self) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan for ISDT chargers");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        *self.is_scanning.write() = true;

        let adapter = self.adapter.clone();
        let is_scanning = self.is_scanning.clone();
        let discovered = self.discovered.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    return;
                }
            };

            while *is_scanning.read() {
                tokio::select! {
                    Some(event) = events.next() => {
                        Self::handle_event(event, &adapter, &discovered, &event_tx).await;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                }
            }

            debug!("Scan event loop ended");
        });

        *self.scan_handle.write() = Some(handle);

        Ok(())
    }

    /// Stop scanning.
    pub async fn stop(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        *self.is_scanning.write() = false;

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        let handle = self.scan_handle.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.read()
    }

    /// All chargers seen so far, keyed by peripheral identifier.
    pub fn discovered_chargers(&self) -> HashMap<String, ChargerDiscoveryEvent> {
        self.discovered.read().clone()
    }

    /// Subscribe to discovery events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChargerDiscoveryEvent> {
        self.event_tx.subscribe()
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn handle_event(
        event: CentralEvent,
        adapter: &Adapter,
        discovered: &RwLock<HashMap<String, ChargerDiscoveryEvent>>,
        event_tx: &broadcast::Sender<ChargerDiscoveryEvent>,
    ) {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                trace!("Device seen: {:?}", id);
                Self::process_peripheral(adapter, id, discovered, event_tx).await;
            }
            CentralEvent::ManufacturerDataAdvertisement {
                id,
                manufacturer_data,
            } => {
                if manufacturer_data.contains_key(&ISDT_MANUFACTURER_ID) {
                    trace!("ISDT advertisement: {:?}", id);
                    Self::process_peripheral(adapter, id, discovered, event_tx).await;
                }
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
            }
            _ => {}
        }
    }

    async fn process_peripheral(
        adapter: &Adapter,
        id: PeripheralId,
        discovered: &RwLock<HashMap<String, ChargerDiscoveryEvent>>,
        event_tx: &broadcast::Sender<ChargerDiscoveryEvent>,
    ) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let Some(model) = resolve_model(
            &properties.manufacturer_data,
            properties.local_name.as_deref(),
        ) else {
            return;
        };

        let identifier = id.to_string();
        let event = ChargerDiscoveryEvent {
            identifier: identifier.clone(),
            peripheral,
            model,
            local_name: properties.local_name,
            rssi: properties.rssi,
        };

        let is_new = discovered
            .write()
            .insert(identifier.clone(), event.clone())
            .is_none();
        if is_new {
            info!("Discovered {} charger {}", model, identifier);
        }

        let _ = event_tx.send(event);
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        *self.is_scanning.write() = false;
    }
}
