//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for ISDT charger communication.

use uuid::Uuid;

/// ISDT charger service UUID.
pub const CHARGER_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_af00_0000_1000_8000_00805f9b34fb);

/// Polling characteristic (notify + write).
///
/// Carries alarm tone, electric, work state and IR traffic.
pub const POLL_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_af01_0000_1000_8000_00805f9b34fb);

/// Handshake characteristic (notify + write).
///
/// Carries bind and hardware info traffic; idle once a session is polling.
pub const HANDSHAKE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_af02_0000_1000_8000_00805f9b34fb);

/// ISDT's Bluetooth company identifier in manufacturer data.
pub const ISDT_MANUFACTURER_ID: u16 = 0xABBA;
