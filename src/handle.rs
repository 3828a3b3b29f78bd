//! Peripheral handle.
//!
//! One handle wraps one discovered peripheral for the lifetime of its
//! session. Once the session ends the handle can never become ready
//! again; a new discovery always produces a new handle.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

use crate::data::{DeviceInfo, InfoField};
use crate::forwarder::CallbackHandle;
use crate::peripheral::SensorPeripheral;

/// Connection state of a peripheral handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No session, or the session has ended.
    #[default]
    Disconnected,
    /// The setup pipeline is running.
    Connecting,
    /// Setup completed; readings are being forwarded.
    Ready,
}

impl ConnectionState {
    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    state: ConnectionState,
    ended: bool,
}

/// Session with one discovered peripheral.
pub struct PeripheralHandle {
    /// The driver-side peripheral.
    peripheral: Arc<dyn SensorPeripheral>,
    /// Connection state and the ended flag, changed together.
    session: RwLock<SessionState>,
    /// Metadata collected by info reads.
    info: RwLock<DeviceInfo>,
    /// The registered reading callback, at most one.
    reading_callback: Mutex<Option<CallbackHandle>>,
}

impl PeripheralHandle {
    /// Wrap a freshly discovered peripheral.
    pub fn new(peripheral: Arc<dyn SensorPeripheral>) -> Self {
        Self {
            peripheral,
            session: RwLock::new(SessionState::default()),
            info: RwLock::new(DeviceInfo::default()),
            reading_callback: Mutex::new(None),
        }
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Arc<dyn SensorPeripheral> {
        &self.peripheral
    }

    /// Identifier of the peripheral.
    pub fn id(&self) -> String {
        self.peripheral.id()
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.session.read().state
    }

    /// Check if the handle is ready.
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Check if the session has ended.
    pub fn is_ended(&self) -> bool {
        self.session.read().ended
    }

    /// Enter `Connecting`. Returns false if the session already ended.
    pub(crate) fn begin_setup(&self) -> bool {
        let mut session = self.session.write();
        if session.ended {
            return false;
        }
        session.state = ConnectionState::Connecting;
        true
    }

    /// Enter `Ready`. Returns false if the session already ended.
    pub(crate) fn mark_ready(&self) -> bool {
        let mut session = self.session.write();
        if session.ended {
            return false;
        }
        session.state = ConnectionState::Ready;
        true
    }

    /// End the session and stop forwarding its readings.
    pub(crate) fn mark_ended(&self) {
        {
            let mut session = self.session.write();
            if session.ended {
                return;
            }
            session.ended = true;
            session.state = ConnectionState::Disconnected;
        }

        let callback = self.reading_callback.lock().take();
        if let Some(callback) = callback {
            debug!("Dropping reading callback {} of {}", callback.id(), self.id());
        }
    }

    /// Install the reading callback, replacing any previous one.
    pub(crate) fn set_reading_callback(&self, callback: CallbackHandle) {
        let previous = self.reading_callback.lock().replace(callback);
        if let Some(previous) = previous {
            debug!("Replacing reading callback {} of {}", previous.id(), self.id());
        }
    }

    /// Check whether a reading callback is installed.
    pub fn has_reading_callback(&self) -> bool {
        self.reading_callback.lock().is_some()
    }

    /// Record an info value.
    pub(crate) fn set_info(&self, field: InfoField, value: String) {
        self.info.write().set(field, value);
    }

    /// Metadata read during setup.
    pub fn device_info(&self) -> DeviceInfo {
        self.info.read().clone()
    }
}

impl std::fmt::Debug for PeripheralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("ended", &self.is_ended())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePeripheral;

    fn handle() -> PeripheralHandle {
        PeripheralHandle::new(Arc::new(FakePeripheral::new("tag-1")))
    }

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::Connecting.is_ready());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(format!("{}", ConnectionState::Connecting), "Connecting");
    }

    #[test]
    fn test_lifecycle() {
        let handle = handle();
        assert_eq!(handle.state(), ConnectionState::Disconnected);

        assert!(handle.begin_setup());
        assert_eq!(handle.state(), ConnectionState::Connecting);

        assert!(handle.mark_ready());
        assert!(handle.is_ready());

        handle.mark_ended();
        assert!(handle.is_ended());
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_ended_handle_never_becomes_ready() {
        let handle = handle();
        assert!(handle.begin_setup());
        handle.mark_ended();

        assert!(!handle.mark_ready());
        assert!(!handle.begin_setup());
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_info_is_recorded() {
        let handle = handle();
        handle.set_info(InfoField::DeviceName, "CC2650 SensorTag".to_string());
        assert_eq!(handle.device_info().name.as_deref(), Some("CC2650 SensorTag"));
    }
}
