//! Error types for the BLE OTA/DFU engines.

// Allow unused variants/methods - these are part of the error API surface
// consumed by the orchestrator.
#![allow(dead_code)]

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for OTA/DFU operations.
pub type OtaResult<T> = Result<T, OtaError>;

/// Errors that can occur during a firmware update attempt.
#[derive(Debug, Error)]
pub enum OtaError {
    /// BLE stack error from the btleplug crate.
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error while reading a DFU package.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Response shorter than the protocol's minimum frame length.
    #[error("Response too short ({actual} bytes, need {minimum}): {response}")]
    ResponseTooShort {
        minimum: usize,
        actual: usize,
        response: String,
    },

    /// Device explicitly rejected an OTA command.
    #[error("Device rejected OTA command 0x{command:02X} (not supported on this platform)")]
    CommandRejected { command: u8 },

    /// Response status/echo did not match the command just sent.
    #[error("Unexpected response to OTA command 0x{command:02X}: {response}")]
    UnexpectedResponse { command: u8, response: String },

    /// DFU response did not start with the response marker byte.
    #[error("Not a DFU response (first byte 0x{first:02X}): {response}")]
    NotADfuResponse { first: u8, response: String },

    /// DFU response echoed a different opcode than the one sent.
    #[error("DFU response for wrong opcode: expected {expected}, got 0x{actual:02X}")]
    ResponseOpcodeMismatch { expected: &'static str, actual: u8 },

    /// DFU operation returned a non-success result code.
    #[error("DFU {operation} failed with result code 0x{code:02X}: {description}")]
    DfuRequestFailed {
        operation: &'static str,
        code: u8,
        description: &'static str,
    },

    /// No response notification arrived within the operation deadline.
    #[error("Timed out waiting for response to {operation}")]
    Timeout { operation: &'static str },

    /// The notification stream closed while a response was pending.
    #[error("Notification stream closed during {operation}")]
    Disconnected { operation: &'static str },

    /// DFU package is missing a required entry.
    #[error("DFU package missing required {extension} entry")]
    MissingPackageEntry { extension: &'static str },

    /// No DFU bootloader advertisement found within the scan timeout.
    #[error("DFU bootloader not found within {timeout_secs}s")]
    BootloaderNotFound { timeout_secs: u64 },

    /// Connected device does not expose a required GATT characteristic.
    #[error("Characteristic {uuid} not found on device")]
    MissingCharacteristic { uuid: Uuid },
}

impl OtaError {
    /// Get a stable error code for support/diagnostics purposes.
    pub fn error_code(&self) -> &'static str {
        match self {
            OtaError::Ble(_) => "OTA-001",
            OtaError::Io(_) => "OTA-002",
            OtaError::Zip(_) => "OTA-003",
            OtaError::ResponseTooShort { .. } => "OTA-010",
            OtaError::CommandRejected { .. } => "OTA-011",
            OtaError::UnexpectedResponse { .. } => "OTA-012",
            OtaError::NotADfuResponse { .. } => "OTA-020",
            OtaError::ResponseOpcodeMismatch { .. } => "OTA-021",
            OtaError::DfuRequestFailed { .. } => "OTA-022",
            OtaError::Timeout { .. } => "OTA-030",
            OtaError::Disconnected { .. } => "OTA-031",
            OtaError::MissingPackageEntry { .. } => "OTA-040",
            OtaError::BootloaderNotFound { .. } => "OTA-050",
            OtaError::MissingCharacteristic { .. } => "OTA-051",
        }
    }

    /// Whether this error was an explicit rejection by the device, as
    /// opposed to a transport fault or a desynchronized exchange.
    pub fn is_device_rejection(&self) -> bool {
        matches!(
            self,
            OtaError::CommandRejected { .. } | OtaError::DfuRequestFailed { .. }
        )
    }
}
