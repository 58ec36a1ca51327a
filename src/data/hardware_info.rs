//! Hardware information reported during the handshake.

/// Hardware/firmware versions and device identifier.
///
/// Queried at most once per session and never changed once populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HardwareInfo {
    /// Hardware major version.
    pub hardware_major: u8,
    /// Hardware minor version.
    pub hardware_minor: u8,
    /// Firmware major version.
    pub firmware_major: u8,
    /// Firmware minor version.
    pub firmware_minor: u8,
    /// 64-bit device identifier.
    pub device_id: u64,
}

impl HardwareInfo {
    /// Hardware version as `major.minor`.
    pub fn hardware_version(&self) -> String {
        format!("{}.{}", self.hardware_major, self.hardware_minor)
    }

    /// Firmware version as `major.minor`.
    pub fn firmware_version(&self) -> String {
        format!("{}.{}", self.firmware_major, self.firmware_minor)
    }

    /// Serial number (device id as 16 upper-case hex digits).
    pub fn serial_number(&self) -> String {
        format!("{:016X}", self.device_id)
    }
}
