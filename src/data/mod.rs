//! Data structures for sensor data.
//!
//! Readings produced by the peripheral and the device metadata
//! collected during setup.

pub mod device_info;
pub mod reading;

pub use device_info::{DeviceInfo, InfoField};
pub use reading::Reading;
