//! BLE communication module.
//!
//! The concrete peripheral driver: discovering SensorTags and talking to
//! their GATT attributes over btleplug.

pub mod characteristics;
pub mod scanner;
pub mod sensortag;
pub mod uuids;

pub use characteristics::CharacteristicHandler;
pub use scanner::{BleScanner, ScanEvent};
pub use sensortag::{BtleDriver, BtleSensorTag};
pub use uuids::*;
