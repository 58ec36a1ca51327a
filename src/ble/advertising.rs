//! Advertising data parsing.
//!
//! Resolves the charger model from ISDT manufacturer-specific advertising
//! data. Only records carrying ISDT's company identifier are considered;
//! bytes 2..6 of the payload select the model from a fixed table.

use crate::ble::uuids::ISDT_MANUFACTURER_ID;

/// Charger model resolved from advertising data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceModel {
    /// NP2 Air.
    Np2Air,
    /// LP2 Air.
    Lp2Air,
    /// C4 Air.
    C4Air,
    /// C4 EVO.
    C4Evo,
    /// 608PD.
    Isdt608Pd,
    /// K4.
    K4,
    /// Power 200.
    Power200,
    /// PB70W power bank.
    Pb70w,
    /// EDGE.
    Edge,
    /// PB100W power bank.
    Pb100w,
    /// PB10DW power bank.
    Pb10dw,
    /// PB25DW power bank.
    Pb25dw,
    /// PB50DW power bank.
    Pb50dw,
    /// A4 Air (only identifiable by local name).
    A4Air,
    /// A8 Air (only identifiable by local name).
    A8Air,
    /// ISDT device whose model pattern is not in the table.
    #[default]
    Unrecognized,
}

/// Model patterns found at bytes 2..6 of the manufacturer payload.
const MODEL_TABLE: [([u8; 4], DeviceModel); 16] = [
    ([0x01, 0x01, 0x00, 0x00], DeviceModel::Np2Air),
    ([0x01, 0x02, 0x00, 0x00], DeviceModel::Lp2Air),
    ([0x01, 0x03, 0x00, 0x00], DeviceModel::C4Air),
    ([0x01, 0x04, 0x00, 0x00], DeviceModel::C4Evo),
    ([0x01, 0x05, 0x00, 0x00], DeviceModel::Isdt608Pd),
    ([0x01, 0x06, 0x00, 0x00], DeviceModel::K4),
    ([0x01, 0x07, 0x00, 0x00], DeviceModel::C4Air),
    ([0x01, 0x08, 0x00, 0x00], DeviceModel::Power200),
    ([0x01, 0x10, 0x00, 0x00], DeviceModel::Pb70w),
    ([0x01, 0x10, 0x00, 0x01], DeviceModel::Pb70w),
    ([0x01, 0x11, 0x00, 0x00], DeviceModel::Edge),
    ([0x01, 0x12, 0x00, 0x00], DeviceModel::Pb100w),
    ([0x01, 0x12, 0x00, 0x01], DeviceModel::Pb100w),
    ([0x81, 0xC0, 0x00, 0x00], DeviceModel::Pb10dw),
    ([0x81, 0xC0, 0x01, 0x00], DeviceModel::Pb25dw),
    ([0x81, 0xC0, 0x02, 0x00], DeviceModel::Pb50dw),
];

impl DeviceModel {
    /// Look up a 4-byte model pattern.
    ///
    /// Unknown patterns resolve to [`DeviceModel::Unrecognized`].
    pub fn from_pattern(pattern: [u8; 4]) -> Self {
        MODEL_TABLE
            .iter()
            .find(|(known, _)| *known == pattern)
            .map(|(_, model)| *model)
            .unwrap_or(Self::Unrecognized)
    }

    /// Look up a model from the advertised local name (e.g. `C4Air`).
    pub fn from_local_name(name: &str) -> Option<Self> {
        match name.trim() {
            "C4Air" => Some(Self::C4Air),
            "NP2Air" => Some(Self::Np2Air),
            "LP2Air" => Some(Self::Lp2Air),
            "A4Air" => Some(Self::A4Air),
            "A8Air" => Some(Self::A8Air),
            _ => None,
        }
    }

    /// Check if the model was resolved.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }

    /// Get the model name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Np2Air => "NP2 Air",
            Self::Lp2Air => "LP2 Air",
            Self::C4Air => "C4 Air",
            Self::C4Evo => "C4 EVO",
            Self::Isdt608Pd => "608PD",
            Self::K4 => "K4",
            Self::Power200 => "Power 200",
            Self::Pb70w => "PB70W",
            Self::Edge => "EDGE",
            Self::Pb100w => "PB100W",
            Self::Pb10dw => "PB10DW",
            Self::Pb25dw => "PB25DW",
            Self::Pb50dw => "PB50DW",
            Self::A4Air => "A4 Air",
            Self::A8Air => "A8 Air",
            Self::Unrecognized => "unrecognized model",
        }
    }
}

impl std::fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A manufacturer data record taken from an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementRecord {
    /// Bluetooth company identifier.
    pub company_id: u16,
    /// Manufacturer-specific payload.
    pub payload: Vec<u8>,
}

impl AdvertisementRecord {
    /// Offset of the model pattern within the payload.
    const MODEL_OFFSET: usize = 2;

    /// Create a new record.
    pub fn new(company_id: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            company_id,
            payload: payload.into(),
        }
    }

    /// Check if the record comes from an ISDT device.
    pub fn is_isdt(&self) -> bool {
        self.company_id == ISDT_MANUFACTURER_ID
    }

    /// Resolve the charger model.
    ///
    /// Returns `None` for records from other vendors. ISDT records that are too
    /// short or carry an unknown pattern resolve to
    /// [`DeviceModel::Unrecognized`].
    pub fn identify(&self) -> Option<DeviceModel> {
        if !self.is_isdt() {
            return None;
        }

        let model = self
            .payload
            .get(Self::MODEL_OFFSET..Self::MODEL_OFFSET + 4)
            .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
            .map(DeviceModel::from_pattern)
            .unwrap_or(DeviceModel::Unrecognized);

        Some(model)
    }
}

/// Resolve the charger model from a company identifier and payload.
///
/// Convenience wrapper around [`AdvertisementRecord::identify`].
pub fn identify_model(company_id: u16, payload: &[u8]) -> Option<DeviceModel> {
    AdvertisementRecord::new(company_id, payload).identify()
}
