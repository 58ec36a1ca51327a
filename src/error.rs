//! Error types for the isdt-air-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Failed to establish a connection to the charger.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The transport reported that the charger went away.
    #[error("Connection lost")]
    ConnectionLost,

    /// Operation requires a polling session but the charger is not connected.
    #[error("Charger not connected")]
    NotConnected,

    /// A request/response exchange did not complete in time.
    #[error("Timed out waiting for {operation}")]
    Timeout {
        /// The exchange that timed out.
        operation: &'static str,
    },

    /// The charger answered the bind request with a non-zero status.
    #[error("Bind rejected with status {status:#04x}")]
    BindRejected {
        /// Bound-status byte from the response.
        status: u8,
    },

    /// A notification frame could not be decoded.
    #[error("Malformed packet: {context}")]
    MalformedPacket {
        /// Description of what was wrong with the frame.
        context: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// The engine task has exited and no longer accepts commands.
    #[error("Charger engine stopped")]
    EngineStopped,
}

impl Error {
    /// Shorthand for a [`Error::MalformedPacket`] with the given context.
    pub(crate) fn malformed(context: impl Into<String>) -> Self {
        Self::MalformedPacket {
            context: context.into(),
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
