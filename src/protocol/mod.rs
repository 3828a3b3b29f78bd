//! Protocol module for decoding SensorTag attribute values.
//!
//! This module contains:
//! - IR temperature notification decoding and period encoding
//! - Device information value decoding

pub mod device_info;
pub mod ir_temperature;

pub use device_info::decode_info_value;
pub use ir_temperature::{encode_period, parse_reading, SensorTagModel};
