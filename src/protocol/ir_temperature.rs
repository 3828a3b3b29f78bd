//! IR temperature service payloads.
//!
//! The data characteristic notifies 4 bytes:
//! - Bytes 0-1: raw object temperature (int16 little-endian)
//! - Bytes 2-3: raw ambient (die) temperature (int16 little-endian)

use std::time::Duration;

use crate::data::Reading;
use crate::error::{Error, Result};

/// Value written to the config characteristic to power the sensor.
pub const SENSOR_ENABLE: u8 = 0x01;

/// SensorTag hardware generation.
///
/// The two generations carry different thermopile chips and need
/// different conversions for the object temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SensorTagModel {
    /// Original SensorTag (TMP006).
    Cc2540,
    /// SensorTag 2.0 / CC2650 (TMP007, on-chip conversion).
    #[default]
    Cc2650,
}

impl SensorTagModel {
    /// Guess the model from the advertised local name.
    pub fn from_local_name(name: &str) -> Self {
        if name.contains("CC2650") || name.contains("SensorTag 2.0") {
            Self::Cc2650
        } else {
            Self::Cc2540
        }
    }
}

/// Decode an IR temperature notification into a [`Reading`].
///
/// # Errors
///
/// Returns [`Error::InvalidData`] if the payload is shorter than 4 bytes.
pub fn parse_reading(data: &[u8], model: SensorTagModel) -> Result<Reading> {
    if data.len() < 4 {
        return Err(Error::InvalidData {
            context: format!("IR temperature data too short: {} bytes", data.len()),
        });
    }

    let raw_object = i16::from_le_bytes([data[0], data[1]]);
    let raw_ambient = i16::from_le_bytes([data[2], data[3]]);

    let ambient = raw_ambient as f64 / 128.0;
    let object = match model {
        SensorTagModel::Cc2650 => raw_object as f64 / 128.0,
        SensorTagModel::Cc2540 => tmp006_object_temperature(raw_object, ambient),
    };

    Ok(Reading::new(object, ambient))
}

/// TMP006 thermopile conversion from the chip's user guide.
fn tmp006_object_temperature(raw_object: i16, ambient: f64) -> f64 {
    const S0: f64 = 5.593e-14;
    const A1: f64 = 1.75e-3;
    const A2: f64 = -1.678e-5;
    const B0: f64 = -2.94e-5;
    const B1: f64 = -5.7e-7;
    const B2: f64 = 4.63e-9;
    const C2: f64 = 13.4;
    const T_REF: f64 = 298.15;

    let v_obj = raw_object as f64 * 0.000_000_156_25;
    let t_die = ambient + 273.15;
    let dt = t_die - T_REF;

    let s = S0 * (1.0 + A1 * dt + A2 * dt * dt);
    let v_os = B0 + B1 * dt + B2 * dt * dt;
    let f_obj = (v_obj - v_os) + C2 * (v_obj - v_os).powi(2);

    (t_die.powi(4) + f_obj / s).powf(0.25) - 273.15
}

/// Encode a notification period for the period characteristic.
///
/// The device takes the period as one byte in 10 ms units.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if the period does not fit.
pub fn encode_period(period: Duration) -> Result<u8> {
    let units = period.as_millis() / 10;
    if units == 0 || units > u8::MAX as u128 {
        return Err(Error::InvalidParameter {
            name: "notify_period".to_string(),
            value: format!("{}ms", period.as_millis()),
        });
    }
    Ok(units as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cc2650() {
        // object 36.25 = 4640 / 128, ambient 25.0 = 3200 / 128
        let object = 4640i16.to_le_bytes();
        let ambient = 3200i16.to_le_bytes();
        let data = [object[0], object[1], ambient[0], ambient[1]];

        let reading = parse_reading(&data, SensorTagModel::Cc2650).unwrap();
        assert!((reading.object - 36.25).abs() < 1e-9);
        assert!((reading.ambient - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_negative_ambient() {
        let ambient = (-640i16).to_le_bytes();
        let data = [0, 0, ambient[0], ambient[1]];

        let reading = parse_reading(&data, SensorTagModel::Cc2650).unwrap();
        assert!((reading.ambient - (-5.0)).abs() < 1e-9);
    }

    #[test]
    fn test_parse_cc2540_zero_voltage_tracks_die() {
        // With no thermopile voltage the object reads close to the die.
        let ambient = 3200i16.to_le_bytes();
        let data = [0, 0, ambient[0], ambient[1]];

        let reading = parse_reading(&data, SensorTagModel::Cc2540).unwrap();
        assert!((reading.ambient - 25.0).abs() < 1e-9);
        assert!((reading.object - 25.0).abs() < 10.0);
    }

    #[test]
    fn test_parse_too_short() {
        assert!(matches!(
            parse_reading(&[0x01, 0x02, 0x03], SensorTagModel::Cc2650),
            Err(Error::InvalidData { .. })
        ));
    }

    #[test]
    fn test_model_from_local_name() {
        assert_eq!(
            SensorTagModel::from_local_name("CC2650 SensorTag"),
            SensorTagModel::Cc2650
        );
        assert_eq!(
            SensorTagModel::from_local_name("SensorTag 2.0"),
            SensorTagModel::Cc2650
        );
        assert_eq!(
            SensorTagModel::from_local_name("SensorTag"),
            SensorTagModel::Cc2540
        );
        assert_eq!(
            SensorTagModel::from_local_name("TI BLE Sensor Tag"),
            SensorTagModel::Cc2540
        );
    }

    #[test]
    fn test_encode_period() {
        assert_eq!(encode_period(Duration::from_millis(500)).unwrap(), 50);
        assert_eq!(encode_period(Duration::from_millis(2550)).unwrap(), 255);
        assert!(encode_period(Duration::from_millis(2560)).is_err());
        assert!(encode_period(Duration::from_millis(5)).is_err());
    }
}
