//! Test doubles for the driver and broadcast seams.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};

use crate::config::BridgeConfig;
use crate::data::{InfoField, Reading};
use crate::error::{Error, Result};
use crate::ipc::{BroadcastMessage, BroadcastSink};
use crate::peripheral::{PeripheralDriver, PeripheralEvent, SensorPeripheral};

const WAIT_LIMIT: Duration = Duration::from_secs(2);

/// Configuration with short delays for tests.
pub(crate) fn test_config() -> BridgeConfig {
    BridgeConfig {
        settle_delay: Duration::from_millis(20),
        operation_timeout: Duration::from_secs(1),
        socket_path: temp_socket_path(),
        bind_retry_delay: Duration::from_millis(20),
        ..BridgeConfig::default()
    }
}

/// A socket path nobody else uses.
pub(crate) fn temp_socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("sensortag-bridge-{}.sock", uuid::Uuid::new_v4()))
}

/// Peripheral that records every call and lets tests inject events.
pub(crate) struct FakePeripheral {
    id: String,
    event_tx: broadcast::Sender<PeripheralEvent>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    call_notify: Notify,
}

impl FakePeripheral {
    pub(crate) fn new(id: &str) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            id: id.to_string(),
            event_tx,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
            call_notify: Notify::new(),
        }
    }

    /// Make `call` return an error.
    pub(crate) fn fail(&self, call: &str) {
        self.failing.lock().insert(call.to_string());
    }

    /// Make `call` never complete.
    pub(crate) fn hang(&self, call: &str) {
        self.hanging.lock().insert(call.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn emit_reading(&self, object: f64, ambient: f64) {
        let _ = self
            .event_tx
            .send(PeripheralEvent::Reading(Reading::new(object, ambient)));
    }

    pub(crate) fn emit_disconnect(&self) {
        let _ = self.event_tx.send(PeripheralEvent::Disconnected);
    }

    /// Wait until `call` has been made.
    pub(crate) async fn wait_for_call(&self, call: &str) {
        let wait = async {
            loop {
                let notified = self.call_notify.notified();
                if self.calls.lock().iter().any(|c| c == call) {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(WAIT_LIMIT, wait).await.is_err() {
            panic!("{} was never called on {}", call, self.id);
        }
    }

    async fn record(&self, call: String) -> Result<()> {
        self.calls.lock().push(call.clone());
        self.call_notify.notify_waiters();

        let hangs = self.hanging.lock().contains(&call);
        if hangs {
            std::future::pending::<()>().await;
        }

        let fails = self.failing.lock().contains(&call);
        if fails {
            return Err(Error::ConnectionFailed {
                reason: format!("{} failed", call),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl SensorPeripheral for FakePeripheral {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<PeripheralEvent> {
        self.event_tx.subscribe()
    }

    async fn connect_and_set_up(&self) -> Result<()> {
        self.record("connect".to_string()).await
    }

    async fn read_info(&self, field: InfoField) -> Result<String> {
        self.record(format!("read_info:{}", field.label())).await?;
        Ok(format!("{} value", field.label()))
    }

    async fn enable_ir_temperature(&self) -> Result<()> {
        self.record("enable_ir_temperature".to_string()).await
    }

    async fn set_ir_temperature_period(&self, period: Duration) -> Result<()> {
        self.record(format!("set_ir_temperature_period:{}", period.as_millis()))
            .await
    }

    async fn notify_ir_temperature(&self) -> Result<()> {
        self.record("notify_ir_temperature".to_string()).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.record("disconnect".to_string()).await?;
        self.emit_disconnect();
        Ok(())
    }
}

/// Driver that hands out peripherals offered by the test.
pub(crate) struct FakeDriver {
    offered_tx: mpsc::UnboundedSender<Arc<FakePeripheral>>,
    offered_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<FakePeripheral>>>,
    discover_calls: AtomicUsize,
}

impl FakeDriver {
    pub(crate) fn new() -> Self {
        let (offered_tx, offered_rx) = mpsc::unbounded_channel();
        Self {
            offered_tx,
            offered_rx: tokio::sync::Mutex::new(offered_rx),
            discover_calls: AtomicUsize::new(0),
        }
    }

    /// Make `peripheral` the next one discovered.
    pub(crate) fn offer(&self, peripheral: Arc<FakePeripheral>) {
        let _ = self.offered_tx.send(peripheral);
    }

    pub(crate) fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeripheralDriver for FakeDriver {
    async fn discover(&self) -> Result<Arc<dyn SensorPeripheral>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        let peripheral = self
            .offered_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(Error::BluetoothUnavailable)?;
        Ok(peripheral)
    }
}

/// Broadcast sink that records messages.
pub(crate) struct RecordingSink {
    clients: usize,
    messages: Mutex<Vec<BroadcastMessage>>,
    notify: Notify,
}

impl RecordingSink {
    pub(crate) fn with_clients(clients: usize) -> Self {
        Self {
            clients,
            messages: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    pub(crate) fn messages(&self) -> Vec<BroadcastMessage> {
        self.messages.lock().clone()
    }

    /// Wait until at least `count` messages were broadcast.
    pub(crate) async fn wait_for(&self, count: usize) {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.messages.lock().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(WAIT_LIMIT, wait).await.is_err() {
            panic!("expected {} messages, got {:?}", count, self.messages());
        }
    }
}

impl BroadcastSink for RecordingSink {
    fn broadcast(&self, message: &BroadcastMessage) -> usize {
        self.messages.lock().push(message.clone());
        self.notify.notify_waiters();
        self.clients
    }
}
