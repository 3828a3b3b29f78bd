//! btleplug-backed SensorTag driver.
//!
//! [`BtleDriver`] discovers SensorTags through the [`BleScanner`] and
//! hands each one out as a [`BtleSensorTag`], which implements the
//! [`SensorPeripheral`] operations on top of GATT reads, writes and
//! notifications.

use async_trait::async_trait;
use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::ble::characteristics::CharacteristicHandler;
use crate::ble::scanner::{BleScanner, ScanEvent};
use crate::ble::uuids::*;
use crate::data::InfoField;
use crate::error::{Error, Result};
use crate::peripheral::{PeripheralDriver, PeripheralEvent, SensorPeripheral};
use crate::protocol::ir_temperature::SENSOR_ENABLE;
use crate::protocol::{encode_period, parse_reading, SensorTagModel};

/// Event senders of the peripherals handed out, by peripheral id.
type SessionMap = Arc<RwLock<HashMap<String, broadcast::Sender<PeripheralEvent>>>>;

/// A SensorTag reached over btleplug.
pub struct BtleSensorTag {
    /// BLE identifier.
    identifier: String,
    /// The underlying peripheral.
    peripheral: Peripheral,
    /// Hardware generation, for decoding readings.
    model: SensorTagModel,
    /// GATT access.
    characteristics: CharacteristicHandler,
    /// Readings and disconnect events.
    event_tx: broadcast::Sender<PeripheralEvent>,
    /// Task turning IR notifications into readings.
    reading_listener: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BtleSensorTag {
    fn new(
        peripheral: Peripheral,
        model: SensorTagModel,
        event_tx: broadcast::Sender<PeripheralEvent>,
    ) -> Self {
        Self {
            identifier: peripheral.id().to_string(),
            characteristics: CharacteristicHandler::new(peripheral.clone()),
            peripheral,
            model,
            event_tx,
            reading_listener: Mutex::new(None),
        }
    }

    /// Get the detected hardware generation.
    pub fn model(&self) -> SensorTagModel {
        self.model
    }

    /// Start the reading listener unless it is already running.
    fn ensure_reading_listener(&self) {
        let mut listener = self.reading_listener.lock();
        if listener.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            debug!("Reading listener already running for {}", self.identifier);
            return;
        }

        let mut rx = self.characteristics.subscribe_notifications();
        let event_tx = self.event_tx.clone();
        let model = self.model;

        *listener = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.characteristic_uuid == IR_TEMPERATURE_DATA_UUID => {
                        match parse_reading(&event.data, model) {
                            Ok(reading) => {
                                let _ = event_tx.send(PeripheralEvent::Reading(reading));
                            }
                            Err(e) => warn!("Dropping IR temperature notification: {}", e),
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Reading listener lagged, {} notifications skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }
}

#[async_trait]
impl SensorPeripheral for BtleSensorTag {
    fn id(&self) -> String {
        self.identifier.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<PeripheralEvent> {
        self.event_tx.subscribe()
    }

    async fn connect_and_set_up(&self) -> Result<()> {
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            self.peripheral
                .connect()
                .await
                .map_err(|e| Error::ConnectionFailed {
                    reason: e.to_string(),
                })?;
        }

        self.peripheral.discover_services().await?;

        if self.characteristics.discover_characteristics() == 0 {
            return Err(Error::ConnectionFailed {
                reason: "no characteristics discovered".to_string(),
            });
        }

        info!("Connected to {} ({:?})", self.identifier, self.model);

        Ok(())
    }

    async fn read_info(&self, field: InfoField) -> Result<String> {
        self.characteristics.read_info(field).await
    }

    async fn enable_ir_temperature(&self) -> Result<()> {
        self.characteristics
            .write(&IR_TEMPERATURE_CONFIG_UUID, &[SENSOR_ENABLE], true)
            .await
    }

    async fn set_ir_temperature_period(&self, period: Duration) -> Result<()> {
        let units = encode_period(period)?;
        self.characteristics
            .write(&IR_TEMPERATURE_PERIOD_UUID, &[units], true)
            .await
    }

    async fn notify_ir_temperature(&self) -> Result<()> {
        self.ensure_reading_listener();
        self.characteristics
            .subscribe(&IR_TEMPERATURE_DATA_UUID)
            .await?;
        self.characteristics.start_notifications().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.characteristics.stop_notifications().await;
        let listener = self.reading_listener.lock().take();
        if let Some(handle) = listener {
            handle.abort();
        }
        self.peripheral.disconnect().await.map_err(Error::Bluetooth)
    }
}

/// Peripheral driver backed by the host's first Bluetooth adapter.
pub struct BtleDriver {
    /// BLE scanner.
    scanner: Arc<BleScanner>,
    /// Sessions that get disconnect events routed to them.
    sessions: SessionMap,
    /// Task routing disconnect events.
    router_handle: tokio::task::JoinHandle<()>,
}

impl BtleDriver {
    /// Open the Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BluetoothUnavailable`] if there is no adapter.
    pub async fn new() -> Result<Self> {
        let scanner = Arc::new(BleScanner::new().await?);
        let sessions: SessionMap = Arc::new(RwLock::new(HashMap::new()));

        let mut rx = scanner.subscribe();
        let router_sessions = sessions.clone();
        let router_handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ScanEvent::Disconnected(id)) => {
                        let tx = router_sessions.write().remove(&id.to_string());
                        if let Some(tx) = tx {
                            info!("SensorTag {} disconnected", id);
                            let _ = tx.send(PeripheralEvent::Disconnected);
                        }
                    }
                    Ok(ScanEvent::Discovered { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Disconnect router lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Self {
            scanner,
            sessions,
            router_handle,
        })
    }
}

#[async_trait]
impl PeripheralDriver for BtleDriver {
    async fn discover(&self) -> Result<Arc<dyn SensorPeripheral>> {
        let mut rx = self.scanner.subscribe();
        self.scanner.start_scanning().await?;

        let (peripheral, local_name) = loop {
            match rx.recv().await {
                Ok(ScanEvent::Discovered {
                    peripheral,
                    local_name,
                }) => break (peripheral, local_name),
                Ok(ScanEvent::Disconnected(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Discovery lagged, {} scan events skipped", skipped);
                }
                Err(RecvError::Closed) => return Err(Error::BluetoothUnavailable),
            }
        };

        if let Err(e) = self.scanner.stop_scanning().await {
            warn!("Failed to stop scan: {}", e);
        }

        let model = local_name
            .as_deref()
            .map(SensorTagModel::from_local_name)
            .unwrap_or_default();

        let (event_tx, _) = broadcast::channel(64);
        let tag = BtleSensorTag::new(peripheral, model, event_tx.clone());

        info!(
            "discovered: {} ({})",
            tag.id(),
            local_name.as_deref().unwrap_or("unnamed")
        );

        self.sessions.write().insert(tag.id(), event_tx);

        Ok(Arc::new(tag))
    }
}

impl Drop for BtleDriver {
    fn drop(&mut self) {
        self.router_handle.abort();
    }
}
