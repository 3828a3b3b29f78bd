//! Reconnection supervisor.
//!
//! Owns the single peripheral session of the process. The session loop
//! moves through:
//!
//! ```text
//! Idle -> Discovering -> SettingUp -> Ready
//!              ^             |          |
//!              +-- disconnect+----------+
//! ```
//!
//! A disconnect at any point after discovery discards the handle and
//! re-enters discovery immediately, with no retry limit or backoff. A
//! setup failure that is not a disconnect discards the handle and goes
//! back to `Idle`; the next client connection starts over.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::forwarder::EventForwarder;
use crate::handle::PeripheralHandle;
use crate::peripheral::{PeripheralDriver, PeripheralEvent};
use crate::setup::SetupPipeline;

/// Where the session loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SupervisorState {
    /// No session and nothing running.
    #[default]
    Idle,
    /// Waiting for a peripheral to be discovered.
    Discovering,
    /// Running the setup pipeline on the current handle.
    SettingUp,
    /// The current handle is streaming readings.
    Ready,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Discovering => write!(f, "Discovering"),
            Self::SettingUp => write!(f, "SettingUp"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

struct SupervisorInner {
    driver: Arc<dyn PeripheralDriver>,
    pipeline: SetupPipeline,
    config: Arc<BridgeConfig>,
    state_tx: watch::Sender<SupervisorState>,
    current: RwLock<Option<Arc<PeripheralHandle>>>,
}

/// Keeps one peripheral session alive for as long as the process runs.
pub struct SessionSupervisor {
    inner: Arc<SupervisorInner>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionSupervisor {
    /// Create a supervisor. Nothing happens until [`ensure_session`] is
    /// called.
    ///
    /// [`ensure_session`]: SessionSupervisor::ensure_session
    pub fn new(
        driver: Arc<dyn PeripheralDriver>,
        config: Arc<BridgeConfig>,
        forwarder: Arc<EventForwarder>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Idle);

        Self {
            inner: Arc::new(SupervisorInner {
                driver,
                pipeline: SetupPipeline::new(config.clone(), forwarder),
                config,
                state_tx,
                current: RwLock::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Get the current state.
    pub fn state(&self) -> SupervisorState {
        *self.inner.state_tx.borrow()
    }

    /// Watch state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.inner.state_tx.subscribe()
    }

    /// The handle of the current session, if any.
    pub fn current_handle(&self) -> Option<Arc<PeripheralHandle>> {
        self.inner.current.read().clone()
    }

    /// Start a session unless one is already active.
    ///
    /// Returns true if discovery was started. When a session already exists
    /// (discovering, setting up or ready) it is reused.
    pub fn ensure_session(&self) -> bool {
        let mut task = self.task.lock();

        let started = self.inner.state_tx.send_if_modified(|state| {
            if *state == SupervisorState::Idle {
                *state = SupervisorState::Discovering;
                true
            } else {
                false
            }
        });

        if !started {
            debug!("Session already {}, reusing it", self.state());
            return false;
        }

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move { inner.run().await }));

        true
    }

    /// Stop the session loop and disconnect the current peripheral.
    pub async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
        }

        let current = self.inner.current.write().take();
        if let Some(handle) = current {
            handle.mark_ended();
            let disconnect = handle.peripheral().disconnect();
            match tokio::time::timeout(self.inner.config.operation_timeout, disconnect).await {
                Ok(Ok(())) => debug!("Disconnected {}", handle.id()),
                Ok(Err(e)) => warn!("Failed to disconnect {}: {}", handle.id(), e),
                Err(_) => warn!("Timed out disconnecting {}", handle.id()),
            }
        }

        self.inner.set_state(SupervisorState::Idle);
    }
}

impl Drop for SessionSupervisor {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl SupervisorInner {
    fn set_state(&self, new_state: SupervisorState) {
        let old_state = self.state_tx.send_replace(new_state);
        if old_state != new_state {
            debug!("Supervisor state changed: {} -> {}", old_state, new_state);
        }
    }

    /// Drop `handle` and forget it if it is still the current one.
    fn discard(&self, handle: &Arc<PeripheralHandle>) {
        handle.mark_ended();
        let mut current = self.current.write();
        if current.as_ref().map(|c| Arc::ptr_eq(c, handle)).unwrap_or(false) {
            *current = None;
        }
    }

    /// The session loop.
    async fn run(self: Arc<Self>) {
        loop {
            self.set_state(SupervisorState::Discovering);
            info!("Discovering SensorTag");

            let peripheral = match self.driver.discover().await {
                Ok(peripheral) => peripheral,
                Err(e) => {
                    error!("Discovery failed: {}", e);
                    self.set_state(SupervisorState::Idle);
                    return;
                }
            };

            info!("discovered: {}", peripheral.id());

            let mut events = peripheral.subscribe();
            let handle = Arc::new(PeripheralHandle::new(peripheral));

            let previous = self.current.write().replace(handle.clone());
            if let Some(previous) = previous {
                previous.mark_ended();
            }

            self.set_state(SupervisorState::SettingUp);

            let mut setup = {
                let pipeline = self.pipeline.clone();
                let handle = handle.clone();
                tokio::spawn(async move { pipeline.run(&handle).await })
            };

            let outcome = tokio::select! {
                result = &mut setup => Some(result),
                _ = wait_for_disconnect(&mut events) => None,
            };

            match outcome {
                // The setup task keeps running; it sees the ended handle and
                // finishes without touching anything.
                None => {
                    info!("disconnected during setup: {}", handle.id());
                    self.discard(&handle);
                    continue;
                }
                Some(Ok(Ok(report))) => {
                    debug!("Setup of {} ran {} steps", handle.id(), report.completed.len());
                    self.set_state(SupervisorState::Ready);
                }
                Some(Ok(Err(e))) if e.is_disconnect() => {
                    info!("disconnected during setup: {}", handle.id());
                    self.discard(&handle);
                    continue;
                }
                Some(Ok(Err(e))) => {
                    error!("Setup of {} failed: {}", handle.id(), e);
                    self.abandon(&handle).await;
                    return;
                }
                Some(Err(e)) => {
                    error!("Setup task of {} failed: {}", handle.id(), e);
                    self.abandon(&handle).await;
                    return;
                }
            }

            wait_for_disconnect(&mut events).await;
            info!("disconnected: {}", handle.id());
            self.discard(&handle);
        }
    }

    /// Give up on a handle after a failed setup and go idle.
    async fn abandon(&self, handle: &Arc<PeripheralHandle>) {
        self.discard(handle);

        let disconnect = handle.peripheral().disconnect();
        match tokio::time::timeout(self.config.operation_timeout, disconnect).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Disconnect after failed setup: {}", e),
            Err(_) => warn!("Timed out disconnecting {}", handle.id()),
        }

        self.set_state(SupervisorState::Idle);
        info!("Waiting for the next client connection to retry");
    }
}

/// Resolve once the peripheral reports a disconnect.
///
/// A closed event channel means the peripheral is gone and counts too.
async fn wait_for_disconnect(events: &mut broadcast::Receiver<PeripheralEvent>) {
    loop {
        match events.recv().await {
            Ok(PeripheralEvent::Disconnected) | Err(RecvError::Closed) => return,
            Ok(PeripheralEvent::Reading(_)) | Err(RecvError::Lagged(_)) => {}
        }
    }
}
