//! Process-wide constants and the immutable bridge configuration.
//!
//! Everything is fixed at process start. `BridgeConfig` is built once in
//! `main`, validated, and then shared read-only.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

// Setup pipeline

/// Read the device information attributes after connecting.
pub const READ_INFO: bool = true;

/// Explicitly enable the IR temperature sensor before subscribing.
pub const ENABLE_THERM_SENSOR: bool = true;

/// Time between readings (ms).
pub const NOTIFY_PERIOD_MS: u64 = 500;

/// Warm-up time after enabling the IR sensor before readings are valid (ms).
pub const SENSOR_SETTLE_DELAY_MS: u64 = 2000;

/// Upper bound on any single driver call (ms).
pub const OPERATION_TIMEOUT_MS: u64 = 10_000;

/// Shortest notification period the device accepts (ms).
pub const MIN_NOTIFY_PERIOD_MS: u64 = 100;

/// Longest notification period the device accepts (ms). The period is sent
/// as a single byte in 10 ms units.
pub const MAX_NOTIFY_PERIOD_MS: u64 = 2550;

// Broadcast channel

/// Well-known path of the local broadcast socket.
pub const SOCKET_PATH: &str = "/tmp/antsis.node-tag";

/// Wait between attempts to bind the broadcast socket (ms).
pub const BIND_RETRY_DELAY_MS: u64 = 1000;

/// Immutable configuration for one bridge process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Perform the seven device-info reads during setup.
    pub read_info: bool,
    /// Enable the thermal sensor (and wait for it to settle) during setup.
    pub enable_sensor: bool,
    /// Notification period.
    pub notify_period: Duration,
    /// Settle delay after enabling the sensor.
    pub settle_delay: Duration,
    /// Timeout applied to each driver call.
    pub operation_timeout: Duration,
    /// Path of the local broadcast socket.
    pub socket_path: PathBuf,
    /// Wait before retrying a failed socket bind.
    pub bind_retry_delay: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            read_info: READ_INFO,
            enable_sensor: ENABLE_THERM_SENSOR,
            notify_period: Duration::from_millis(NOTIFY_PERIOD_MS),
            settle_delay: Duration::from_millis(SENSOR_SETTLE_DELAY_MS),
            operation_timeout: Duration::from_millis(OPERATION_TIMEOUT_MS),
            socket_path: PathBuf::from(SOCKET_PATH),
            bind_retry_delay: Duration::from_millis(BIND_RETRY_DELAY_MS),
        }
    }
}

impl BridgeConfig {
    /// Check the configuration against device limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the notification period is out
    /// of range or the operation timeout is zero.
    pub fn validate(&self) -> Result<()> {
        let period_ms = self.notify_period.as_millis();
        if period_ms < MIN_NOTIFY_PERIOD_MS as u128 || period_ms > MAX_NOTIFY_PERIOD_MS as u128 {
            return Err(Error::InvalidParameter {
                name: "notify_period".to_string(),
                value: format!("{}ms", period_ms),
            });
        }

        if self.operation_timeout.is_zero() {
            return Err(Error::InvalidParameter {
                name: "operation_timeout".to_string(),
                value: "0ms".to_string(),
            });
        }

        Ok(())
    }
}
