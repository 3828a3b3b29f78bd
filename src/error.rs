//! Error types for the sensortag-bridge crate.

use thiserror::Error;

use crate::setup::SetupStep;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Failed to establish a connection to the peripheral.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The connection to the peripheral was lost.
    #[error("Connection lost")]
    ConnectionLost,

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Invalid data was received from the peripheral.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// A driver call did not complete in time.
    #[error("Timed out waiting for {operation}")]
    Timeout {
        /// The operation that stalled.
        operation: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// A setup pipeline step failed and the remaining steps were skipped.
    #[error("Setup step {step} failed: {source}")]
    SetupStep {
        /// The step that failed.
        step: SetupStep,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The local broadcast channel reported an error.
    #[error("Transport error ({context}): {source}")]
    Transport {
        /// What the transport was doing.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Plain I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an I/O error as a transport error.
    pub(crate) fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }

    /// Check if this error means the peripheral went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionLost => true,
            Self::SetupStep { source, .. } => source.is_disconnect(),
            _ => false,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_step_error_display() {
        let err = Error::SetupStep {
            step: SetupStep::Connect,
            source: Box::new(Error::ConnectionFailed {
                reason: "refused".to_string(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "Setup step connect failed: Connection failed: refused"
        );
    }

    #[test]
    fn test_is_disconnect() {
        assert!(Error::ConnectionLost.is_disconnect());
        assert!(Error::SetupStep {
            step: SetupStep::ArmNotifications,
            source: Box::new(Error::ConnectionLost),
        }
        .is_disconnect());
        assert!(!Error::Timeout {
            operation: "connect".to_string()
        }
        .is_disconnect());
    }
}
