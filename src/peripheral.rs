//! Peripheral driver seam.
//!
//! The bridge core never talks to a Bluetooth stack directly. It is handed
//! a [`PeripheralDriver`] at construction and only sees discovered devices
//! through the [`SensorPeripheral`] trait, so tests can drive it with fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::data::{InfoField, Reading};
use crate::error::Result;

/// Event emitted by a discovered peripheral.
#[derive(Debug, Clone, PartialEq)]
pub enum PeripheralEvent {
    /// A temperature notification tick.
    Reading(Reading),
    /// The session with the peripheral ended.
    Disconnected,
}

/// Discovers temperature peripherals.
#[async_trait]
pub trait PeripheralDriver: Send + Sync {
    /// Wait until a peripheral is found.
    ///
    /// There is no timeout: discovery keeps looking until a device shows up.
    async fn discover(&self) -> Result<Arc<dyn SensorPeripheral>>;
}

/// Operations on one discovered peripheral.
///
/// Every async method is a single driver call. Callers apply their own
/// timeouts.
#[async_trait]
pub trait SensorPeripheral: Send + Sync {
    /// Stable identifier of the peripheral.
    fn id(&self) -> String;

    /// Subscribe to readings and the disconnect event.
    fn subscribe(&self) -> broadcast::Receiver<PeripheralEvent>;

    /// Connect and discover the attribute table.
    async fn connect_and_set_up(&self) -> Result<()>;

    /// Read one device information attribute.
    async fn read_info(&self, field: InfoField) -> Result<String>;

    /// Power up the IR temperature sensor.
    async fn enable_ir_temperature(&self) -> Result<()>;

    /// Set the time between IR temperature notifications.
    async fn set_ir_temperature_period(&self, period: Duration) -> Result<()>;

    /// Enable IR temperature notifications.
    ///
    /// Calling this more than once must not duplicate readings.
    async fn notify_ir_temperature(&self) -> Result<()>;

    /// End the session.
    async fn disconnect(&self) -> Result<()>;
}
