//! Device information read during setup.

/// One device-information attribute.
///
/// Listed in the order the setup pipeline reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InfoField {
    /// GAP device name.
    DeviceName,
    /// System identifier.
    SystemId,
    /// Serial number string.
    SerialNumber,
    /// Firmware revision string.
    FirmwareRevision,
    /// Hardware revision string.
    HardwareRevision,
    /// Software revision string.
    SoftwareRevision,
    /// Manufacturer name string.
    ManufacturerName,
}

impl InfoField {
    /// Every field, in read order.
    pub const ALL: [InfoField; 7] = [
        InfoField::DeviceName,
        InfoField::SystemId,
        InfoField::SerialNumber,
        InfoField::FirmwareRevision,
        InfoField::HardwareRevision,
        InfoField::SoftwareRevision,
        InfoField::ManufacturerName,
    ];

    /// Human-readable label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DeviceName => "device name",
            Self::SystemId => "system id",
            Self::SerialNumber => "serial number",
            Self::FirmwareRevision => "firmware revision",
            Self::HardwareRevision => "hardware revision",
            Self::SoftwareRevision => "software revision",
            Self::ManufacturerName => "manufacturer name",
        }
    }
}

impl std::fmt::Display for InfoField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Metadata of a discovered peripheral.
///
/// Every field stays `None` unless info reads are enabled and the read
/// succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub system_id: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_revision: Option<String>,
    pub hardware_revision: Option<String>,
    pub software_revision: Option<String>,
    pub manufacturer_name: Option<String>,
}

impl DeviceInfo {
    /// Store the value read for `field`.
    pub fn set(&mut self, field: InfoField, value: String) {
        let slot = match field {
            InfoField::DeviceName => &mut self.name,
            InfoField::SystemId => &mut self.system_id,
            InfoField::SerialNumber => &mut self.serial_number,
            InfoField::FirmwareRevision => &mut self.firmware_revision,
            InfoField::HardwareRevision => &mut self.hardware_revision,
            InfoField::SoftwareRevision => &mut self.software_revision,
            InfoField::ManufacturerName => &mut self.manufacturer_name,
        };
        *slot = Some(value);
    }

    /// Get the value stored for `field`.
    pub fn get(&self, field: InfoField) -> Option<&str> {
        match field {
            InfoField::DeviceName => self.name.as_deref(),
            InfoField::SystemId => self.system_id.as_deref(),
            InfoField::SerialNumber => self.serial_number.as_deref(),
            InfoField::FirmwareRevision => self.firmware_revision.as_deref(),
            InfoField::HardwareRevision => self.hardware_revision.as_deref(),
            InfoField::SoftwareRevision => self.software_revision.as_deref(),
            InfoField::ManufacturerName => self.manufacturer_name.as_deref(),
        }
    }

    /// Check whether nothing has been read yet.
    pub fn is_empty(&self) -> bool {
        InfoField::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_are_field_specific() {
        let mut info = DeviceInfo::default();
        assert!(info.is_empty());

        info.set(InfoField::HardwareRevision, "PCB 1.2".to_string());
        info.set(InfoField::SoftwareRevision, "N.A.".to_string());

        assert_eq!(info.get(InfoField::HardwareRevision), Some("PCB 1.2"));
        assert_eq!(info.get(InfoField::SoftwareRevision), Some("N.A."));
        assert_eq!(info.get(InfoField::FirmwareRevision), None);
        assert!(!info.is_empty());
    }

    #[test]
    fn test_read_order() {
        assert_eq!(InfoField::ALL.len(), 7);
        assert_eq!(InfoField::ALL[0], InfoField::DeviceName);
        assert_eq!(InfoField::ALL[6], InfoField::ManufacturerName);
    }
}
