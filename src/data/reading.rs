//! Temperature reading data structures.

use std::time::Instant;

use crate::utils::format_tenths;

/// One paired IR temperature sample from the sensor.
///
/// Both values are in degrees Celsius, as decoded from the notification.
/// Rounding to one decimal place only happens when the reading is
/// forwarded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Temperature of the object in the sensor's field of view.
    pub object: f64,
    /// Die (ambient) temperature of the sensor.
    pub ambient: f64,
    /// When the notification was received.
    pub received_at: Instant,
}

impl Reading {
    /// Create a reading stamped with the current time.
    pub fn new(object: f64, ambient: f64) -> Self {
        Self {
            object,
            ambient,
            received_at: Instant::now(),
        }
    }

    /// Object temperature in its transport form.
    pub fn object_payload(&self) -> String {
        format_tenths(self.object)
    }

    /// Ambient temperature in its transport form.
    pub fn ambient_payload(&self) -> String {
        format_tenths(self.ambient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_payloads() {
        let reading = Reading::new(36.27, 24.96);
        assert_eq!(reading.object_payload(), "36.3");
        assert_eq!(reading.ambient_payload(), "25.0");
    }
}
