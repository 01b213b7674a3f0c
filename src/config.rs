//! Protocol constants for the OpenDisplay BLE OTA and Nordic DFU protocols.

// Allow unused items - these mirror the full wire protocol and may be used
// by callers that drive the engines directly.
#![allow(dead_code)]

use std::time::Duration;

use uuid::Uuid;

// ============================================================================
// ESP32 OTA Protocol (OpenDisplay commands 0x0046/0x0047/0x0048)
// ============================================================================

/// OTA start command: declares the total firmware size.
pub const CMD_OTA_START: [u8; 2] = [0x00, 0x46];

/// OTA data command: carries one firmware chunk.
pub const CMD_OTA_DATA: [u8; 2] = [0x00, 0x47];

/// OTA end command: finalizes the transfer and triggers a reboot.
pub const CMD_OTA_END: [u8; 2] = [0x00, 0x48];

/// Status byte for a successful acknowledgement.
pub const RESP_SUCCESS: u8 = 0x00;

/// Status byte the device reports when it rejects a command.
pub const RESP_ERROR: u8 = 0xFF;

/// Maximum firmware bytes per OTA data command.
///
/// Conservative for BLE MTU: the full write is the 2-byte command header
/// plus the chunk, and 202 bytes stays under common negotiated MTUs
/// without requiring MTU negotiation first.
pub const ESP32_OTA_CHUNK_SIZE: usize = 200;

/// Timeout for the start and data command acknowledgements.
pub const ESP32_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the end command acknowledgement.
///
/// Finalizing flashes the last page and verifies the image, which takes
/// longer than a data chunk.
pub const ESP32_END_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// Nordic Secure DFU Service (bootloader mode)
// ============================================================================

/// Nordic DFU service advertised by the bootloader.
pub const DFU_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000fe59_0000_1000_8000_00805f9b34fb);

/// DFU control point characteristic (commands out, status notifications in).
pub const DFU_CONTROL_POINT_UUID: Uuid = Uuid::from_u128(0x8ec90001_f315_4f60_9fb8_838830daea50);

/// DFU packet characteristic (object data, write-without-response).
pub const DFU_PACKET_UUID: Uuid = Uuid::from_u128(0x8ec90002_f315_4f60_9fb8_838830daea50);

/// Maximum size of one DFU data object.
pub const DFU_DATA_OBJECT_MAX_SIZE: usize = 4096;

/// Maximum bytes per write to the packet characteristic.
pub const DFU_PACKET_CHUNK_SIZE: usize = 200;

/// Timeout waiting for a control point response notification.
pub const DFU_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to scan for the DFU bootloader advertisement.
pub const DFU_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between peripheral polls while scanning for the bootloader.
pub const DFU_SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ============================================================================
// Nordic Secure DFU Opcodes
// ============================================================================

/// Control point opcodes for the Secure DFU object protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuOpcode {
    /// Create a new command or data object of a given size.
    Create = 0x01,
    /// Set the packet receipt notification interval.
    SetPrn = 0x02,
    /// Request the CRC of the current object.
    CalculateCrc = 0x03,
    /// Execute (commit) the current object.
    Execute = 0x04,
    /// Select an object type, returning its offset/CRC/max size.
    Select = 0x06,
    /// Response notification marker (first byte of every response).
    Response = 0x60,
}

impl DfuOpcode {
    /// Name used in error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            DfuOpcode::Create => "CREATE",
            DfuOpcode::SetPrn => "SET_PRN",
            DfuOpcode::CalculateCrc => "CALCULATE_CRC",
            DfuOpcode::Execute => "EXECUTE",
            DfuOpcode::Select => "SELECT",
            DfuOpcode::Response => "RESPONSE",
        }
    }
}

/// DFU object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuObjectType {
    /// Command object (the init packet).
    Command = 0x01,
    /// Data object (a firmware slice of up to 4096 bytes).
    Data = 0x02,
}

/// Result codes carried in the third byte of a DFU response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuResultCode {
    Success = 0x01,
    Invalid = 0x02,
    NotSupported = 0x03,
    InvalidSize = 0x04,
    CrcError = 0x05,
    OperationFailed = 0x0A,
}

impl DfuResultCode {
    /// Parse a result code from a byte value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(DfuResultCode::Success),
            0x02 => Some(DfuResultCode::Invalid),
            0x03 => Some(DfuResultCode::NotSupported),
            0x04 => Some(DfuResultCode::InvalidSize),
            0x05 => Some(DfuResultCode::CrcError),
            0x0A => Some(DfuResultCode::OperationFailed),
            _ => None,
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            DfuResultCode::Success => "Operation successful",
            DfuResultCode::Invalid => "Invalid opcode",
            DfuResultCode::NotSupported => "Opcode not supported",
            DfuResultCode::InvalidSize => "Invalid object size",
            DfuResultCode::CrcError => "CRC validation failed",
            DfuResultCode::OperationFailed => "Operation failed",
        }
    }
}

/// Describe a raw result-code byte, tolerating unrecognized values.
pub fn describe_result_code(byte: u8) -> &'static str {
    match DfuResultCode::from_byte(byte) {
        Some(code) => code.description(),
        None => "Unrecognized result code",
    }
}

// ============================================================================
// Chip Family Dispatch
// ============================================================================

/// Chip families reported by OpenDisplay tags (TLV `system.ic_type`).
///
/// The orchestrator selects the update engine from this value once; the
/// engines themselves do not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagChip {
    Nrf52840,
    Esp32S3,
    Esp32C3,
    Esp32C6,
}

impl TagChip {
    /// Parse the device-reported IC type integer.
    pub fn from_ic_type(ic_type: u8) -> Option<Self> {
        match ic_type {
            1 => Some(TagChip::Nrf52840),
            2 => Some(TagChip::Esp32S3),
            3 => Some(TagChip::Esp32C3),
            4 => Some(TagChip::Esp32C6),
            _ => None,
        }
    }

    /// Whether this chip is updated via the Nordic Secure DFU bootloader.
    pub fn uses_nrf_dfu(&self) -> bool {
        matches!(self, TagChip::Nrf52840)
    }

    /// Whether this chip is updated via the ESP32 OTA command protocol.
    pub fn uses_esp32_ota(&self) -> bool {
        !self.uses_nrf_dfu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_from_byte() {
        assert_eq!(DfuResultCode::from_byte(0x01), Some(DfuResultCode::Success));
        assert_eq!(
            DfuResultCode::from_byte(0x0A),
            Some(DfuResultCode::OperationFailed)
        );
        assert_eq!(DfuResultCode::from_byte(0x06), None);
        assert_eq!(DfuResultCode::from_byte(0xFF), None);
    }

    #[test]
    fn test_describe_result_code_tolerates_unknown() {
        assert_eq!(describe_result_code(0x05), "CRC validation failed");
        assert_eq!(describe_result_code(0x42), "Unrecognized result code");
    }

    #[test]
    fn test_opcode_bytes() {
        assert_eq!(DfuOpcode::Create as u8, 0x01);
        assert_eq!(DfuOpcode::SetPrn as u8, 0x02);
        assert_eq!(DfuOpcode::CalculateCrc as u8, 0x03);
        assert_eq!(DfuOpcode::Execute as u8, 0x04);
        assert_eq!(DfuOpcode::Select as u8, 0x06);
        assert_eq!(DfuOpcode::Response as u8, 0x60);
    }

    #[test]
    fn test_tag_chip_dispatch() {
        assert_eq!(TagChip::from_ic_type(1), Some(TagChip::Nrf52840));
        assert_eq!(TagChip::from_ic_type(2), Some(TagChip::Esp32S3));
        assert_eq!(TagChip::from_ic_type(4), Some(TagChip::Esp32C6));
        assert_eq!(TagChip::from_ic_type(0), None);

        assert!(TagChip::Nrf52840.uses_nrf_dfu());
        assert!(!TagChip::Nrf52840.uses_esp32_ota());
        assert!(TagChip::Esp32C3.uses_esp32_ota());
    }
}
