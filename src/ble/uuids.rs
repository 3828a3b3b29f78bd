//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for SensorTag communication.

use uuid::Uuid;

use crate::data::InfoField;

// Generic Access Service (Standard BLE)
/// Device Name characteristic UUID.
pub const DEVICE_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a00_0000_1000_8000_00805f9b34fb);

// Device Information Service (Standard BLE)
/// Standard BLE Device Information Service UUID.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);
/// System ID characteristic UUID.
pub const SYSTEM_ID_UUID: Uuid = Uuid::from_u128(0x0000_2a23_0000_1000_8000_00805f9b34fb);
/// Serial Number characteristic UUID.
pub const SERIAL_NUMBER_UUID: Uuid = Uuid::from_u128(0x0000_2a25_0000_1000_8000_00805f9b34fb);
/// Firmware Revision characteristic UUID.
pub const FIRMWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a26_0000_1000_8000_00805f9b34fb);
/// Hardware Revision characteristic UUID.
pub const HARDWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a27_0000_1000_8000_00805f9b34fb);
/// Software Revision characteristic UUID.
pub const SOFTWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a28_0000_1000_8000_00805f9b34fb);
/// Manufacturer Name characteristic UUID.
pub const MANUFACTURER_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a29_0000_1000_8000_00805f9b34fb);

// IR Temperature Service (TI custom)
/// IR Temperature Service UUID.
pub const IR_TEMPERATURE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0xf000_aa00_0451_4000_b000_000000000000);
/// IR Temperature data characteristic UUID (Read, Notify).
pub const IR_TEMPERATURE_DATA_UUID: Uuid =
    Uuid::from_u128(0xf000_aa01_0451_4000_b000_000000000000);
/// IR Temperature config characteristic UUID (sensor on/off).
pub const IR_TEMPERATURE_CONFIG_UUID: Uuid =
    Uuid::from_u128(0xf000_aa02_0451_4000_b000_000000000000);
/// IR Temperature period characteristic UUID (10 ms units).
pub const IR_TEMPERATURE_PERIOD_UUID: Uuid =
    Uuid::from_u128(0xf000_aa03_0451_4000_b000_000000000000);

/// 16-bit service the CC2650 SensorTag puts in its advertisements.
pub const SENSORTAG_ADVERTISED_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_aa80_0000_1000_8000_00805f9b34fb);

/// Local name substrings SensorTags advertise. The first-generation
/// CC2540 tag uses "TI BLE Sensor Tag".
pub const SENSORTAG_LOCAL_NAMES: [&str; 2] = ["SensorTag", "Sensor Tag"];

/// Get the characteristic holding a device information field.
pub fn info_uuid(field: InfoField) -> Uuid {
    match field {
        InfoField::DeviceName => DEVICE_NAME_UUID,
        InfoField::SystemId => SYSTEM_ID_UUID,
        InfoField::SerialNumber => SERIAL_NUMBER_UUID,
        InfoField::FirmwareRevision => FIRMWARE_REVISION_UUID,
        InfoField::HardwareRevision => HARDWARE_REVISION_UUID,
        InfoField::SoftwareRevision => SOFTWARE_REVISION_UUID,
        InfoField::ManufacturerName => MANUFACTURER_NAME_UUID,
    }
}

/// Check if an advertised local name belongs to a SensorTag.
pub fn is_sensortag_name(name: &str) -> bool {
    SENSORTAG_LOCAL_NAMES.iter().any(|n| name.contains(n))
}

/// Check if a service UUID indicates a SensorTag.
pub fn is_sensortag_service(uuid: &Uuid) -> bool {
    *uuid == SENSORTAG_ADVERTISED_SERVICE_UUID || *uuid == IR_TEMPERATURE_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uuid_format() {
        let device_info = DEVICE_INFO_SERVICE_UUID.to_string();
        assert!(device_info.contains("180a"));

        assert_eq!(
            IR_TEMPERATURE_DATA_UUID.to_string(),
            "f000aa01-0451-4000-b000-000000000000"
        );
    }

    #[test]
    fn test_info_uuids_are_distinct() {
        let uuids: HashSet<_> = InfoField::ALL.iter().map(|f| info_uuid(*f)).collect();
        assert_eq!(uuids.len(), InfoField::ALL.len());
        assert_eq!(info_uuid(InfoField::SoftwareRevision), SOFTWARE_REVISION_UUID);
    }

    #[test]
    fn test_is_sensortag_name() {
        assert!(is_sensortag_name("TI BLE Sensor Tag"));
        assert!(is_sensortag_name("CC2650 SensorTag"));
        assert!(is_sensortag_name("SensorTag 2.0"));
        assert!(!is_sensortag_name("Thermometer"));
    }

    #[test]
    fn test_is_sensortag_service() {
        assert!(is_sensortag_service(&SENSORTAG_ADVERTISED_SERVICE_UUID));
        assert!(is_sensortag_service(&IR_TEMPERATURE_SERVICE_UUID));
        assert!(!is_sensortag_service(&DEVICE_INFO_SERVICE_UUID));
    }
}
