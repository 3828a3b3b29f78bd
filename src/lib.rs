// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # sensortag-bridge
//!
//! Bridges the IR temperature sensor of a TI SensorTag to local processes.
//!
//! The bridge waits for a client to connect to its Unix domain socket,
//! then discovers a SensorTag over Bluetooth Low Energy, runs the setup
//! handshake (connect, device info reads, sensor enable, notifications)
//! and republishes every reading to all connected clients as two lines:
//!
//! ```text
//! object_temperature:36.2
//! ambient_temperature:25.0
//! ```
//!
//! When the tag disconnects it is rediscovered and set up again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sensortag_bridge::bridge::ShutdownReason;
//! use sensortag_bridge::{Bridge, BridgeConfig, BtleDriver, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let driver = Arc::new(BtleDriver::new().await?);
//!     let bridge = Bridge::new(BridgeConfig::default(), driver)?;
//!
//!     let reason = bridge
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!             ShutdownReason::Interrupt
//!         })
//!         .await;
//!
//!     println!("stopped: {}", reason);
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! Unix only, because clients are reached through a Unix domain socket.
//! On Linux BlueZ is required and the user may need to be in the
//! `bluetooth` group.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod bridge;
pub mod config;
pub mod data;
pub mod error;
pub mod forwarder;
pub mod handle;
pub mod ipc;
pub mod peripheral;
pub mod protocol;
pub mod setup;
pub mod supervisor;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use ble::BtleDriver;
pub use bridge::{Bridge, ShutdownReason};
pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use forwarder::{CallbackHandle, EventForwarder};
pub use handle::{ConnectionState, PeripheralHandle};
pub use ipc::{BroadcastMessage, BroadcastSink, IpcServer, MessageTag};
pub use peripheral::{PeripheralDriver, PeripheralEvent, SensorPeripheral};
pub use setup::{SetupPipeline, SetupReport, SetupStep};
pub use supervisor::{SessionSupervisor, SupervisorState};
pub use utils::format_tenths;

pub use data::{DeviceInfo, InfoField, Reading};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<Bridge>();
        let _ = std::any::TypeId::of::<SessionSupervisor>();
        let _ = std::any::TypeId::of::<PeripheralHandle>();
        let _ = std::any::TypeId::of::<IpcServer>();
        let _ = std::any::TypeId::of::<Reading>();
        let _ = std::any::TypeId::of::<Error>();
    }

    #[test]
    fn test_wire_format() {
        let [object, ambient] = BroadcastMessage::from_reading(&Reading::new(36.2, 25.0));
        assert_eq!(&object.encode()[..], b"object_temperature:36.2\n");
        assert_eq!(&ambient.encode()[..], b"ambient_temperature:25.0\n");
    }
}
