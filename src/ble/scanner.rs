//! BLE scanning functionality.
//!
//! Listens to central events for the lifetime of the scanner, reports
//! SensorTags seen while a scan is active, and reports every peripheral
//! disconnect.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

use crate::ble::uuids::{is_sensortag_name, is_sensortag_service};
use crate::error::{Error, Result};

/// Event emitted by the scanner.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A SensorTag was seen while scanning.
    Discovered {
        /// The peripheral handle.
        peripheral: Peripheral,
        /// Advertised local name, if any.
        local_name: Option<String>,
    },
    /// A peripheral disconnected.
    Disconnected(PeripheralId),
}

/// BLE scanner for discovering SensorTags.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Whether scanning is currently active.
    is_scanning: Arc<RwLock<bool>>,
    /// Channel for scanner events.
    event_tx: broadcast::Sender<ScanEvent>,
    /// Handle to the central event task.
    event_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl BleScanner {
    /// Create a scanner on the first Bluetooth adapter.
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

        let scanner = Self::with_adapter(adapter);
        scanner.listen().await?;
        Ok(scanner)
    }

    /// Create a scanner with a specific adapter.
    ///
    /// No events are reported until `listen` is called.
    fn with_adapter(adapter: Adapter) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            adapter,
            is_scanning: Arc::new(RwLock::new(false)),
            event_tx,
            event_handle: RwLock::new(None),
        }
    }

    /// Start the central event task.
    async fn listen(&self) -> Result<()> {
        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        let adapter = self.adapter.clone();
        let is_scanning = self.is_scanning.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                Self::handle_event(event, &adapter, &is_scanning, &event_tx).await;
            }
            error!("Central event stream ended");
        });

        *self.event_handle.write() = Some(handle);

        Ok(())
    }

    /// Start scanning for SensorTags.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning cannot be started.
    pub async fn start_scanning(&self) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan for SensorTags");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        *self.is_scanning.write() = true;

        Ok(())
    }

    /// Stop scanning.
    pub async fn stop_scanning(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        *self.is_scanning.write() = false;

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        Ok(())
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.read()
    }

    /// Subscribe to scanner events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.event_tx.subscribe()
    }

    /// Handle a BLE central event.
    async fn handle_event(
        event: CentralEvent,
        adapter: &Adapter,
        is_scanning: &Arc<RwLock<bool>>,
        event_tx: &broadcast::Sender<ScanEvent>,
    ) {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                trace!("Device seen: {:?}", id);
                if *is_scanning.read() {
                    Self::process_peripheral(adapter, id, event_tx).await;
                }
            }
            CentralEvent::DeviceConnected(id) => {
                debug!("Device connected: {:?}", id);
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
                let _ = event_tx.send(ScanEvent::Disconnected(id));
            }
            _ => {}
        }
    }

    /// Report a peripheral if it looks like a SensorTag.
    async fn process_peripheral(
        adapter: &Adapter,
        id: PeripheralId,
        event_tx: &broadcast::Sender<ScanEvent>,
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

        let name_matches = properties
            .local_name
            .as_deref()
            .map(is_sensortag_name)
            .unwrap_or(false);
        let service_matches = properties.services.iter().any(is_sensortag_service);

        if !name_matches && !service_matches {
            return;
        }

        let _ = event_tx.send(ScanEvent::Discovered {
            peripheral,
            local_name: properties.local_name,
        });
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        *self.is_scanning.write() = false;
        if let Some(handle) = self.event_handle.write().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_event_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<ScanEvent>();
    }
}
