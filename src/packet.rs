//! Wire-frame encoding and response validation for both update protocols.
//!
//! ESP32 OTA frames are `[opcode_hi, opcode_lo, payload...]` with a
//! `{status, echoed_opcode}` acknowledgement. Nordic DFU control point
//! frames are `opcode(1)` optionally followed by `object_type(1)` and/or
//! `size(4, LE)`, answered by `0x60, echoed_opcode, result_code`
//! notifications.

use crate::config::{
    describe_result_code, DfuObjectType, DfuOpcode, DfuResultCode, CMD_OTA_DATA, CMD_OTA_END,
    CMD_OTA_START, RESP_ERROR, RESP_SUCCESS,
};
use crate::error::{OtaError, OtaResult};

/// Render bytes as lowercase hex for error messages.
pub(crate) fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

// ============================================================================
// ESP32 OTA Command Builders
// ============================================================================

/// Build the OTA start frame: `CMD_OTA_START ++ u32_le(total_size)`.
pub fn build_ota_start(total_size: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(6);
    frame.extend_from_slice(&CMD_OTA_START);
    frame.extend_from_slice(&total_size.to_le_bytes());
    frame
}

/// Build an OTA data frame: `CMD_OTA_DATA ++ chunk`.
pub fn build_ota_data(chunk: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(2 + chunk.len());
    frame.extend_from_slice(&CMD_OTA_DATA);
    frame.extend_from_slice(chunk);
    frame
}

/// Build the OTA end frame (no payload).
pub fn build_ota_end() -> Vec<u8> {
    CMD_OTA_END.to_vec()
}

/// Validate an OTA acknowledgement against the command just sent.
///
/// `expected_cmd` is the echoed command byte (the opcode's low byte,
/// e.g. 0x46/0x47/0x48).
pub fn check_ota_response(response: &[u8], expected_cmd: u8) -> OtaResult<()> {
    if response.len() < 2 {
        return Err(OtaError::ResponseTooShort {
            minimum: 2,
            actual: response.len(),
            response: to_hex(response),
        });
    }
    let status = response[0];
    let cmd_echo = response[1];
    if status == RESP_ERROR {
        // The echo byte is irrelevant here: the device is reporting that it
        // cannot service OTA commands at all.
        return Err(OtaError::CommandRejected {
            command: expected_cmd,
        });
    }
    if status != RESP_SUCCESS || cmd_echo != expected_cmd {
        return Err(OtaError::UnexpectedResponse {
            command: expected_cmd,
            response: to_hex(response),
        });
    }
    Ok(())
}

// ============================================================================
// Nordic DFU Control Point Builders
// ============================================================================

/// Build a CREATE frame: `[0x01, object_type, size_le(4)]`.
pub fn build_create(object_type: DfuObjectType, size: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(6);
    frame.push(DfuOpcode::Create as u8);
    frame.push(object_type as u8);
    frame.extend_from_slice(&size.to_le_bytes());
    frame
}

/// Build a SET_PRN frame: `[0x02, value_le(2)]`.
pub fn build_set_prn(value: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(3);
    frame.push(DfuOpcode::SetPrn as u8);
    frame.extend_from_slice(&value.to_le_bytes());
    frame
}

/// Build a CALCULATE_CRC frame: `[0x03]`.
pub fn build_calculate_crc() -> Vec<u8> {
    vec![DfuOpcode::CalculateCrc as u8]
}

/// Build an EXECUTE frame: `[0x04]`.
pub fn build_execute() -> Vec<u8> {
    vec![DfuOpcode::Execute as u8]
}

/// Build a SELECT frame: `[0x06, object_type]`.
pub fn build_select(object_type: DfuObjectType) -> Vec<u8> {
    vec![DfuOpcode::Select as u8, object_type as u8]
}

/// Validate a DFU control point response notification.
///
/// The frame must be at least 3 bytes, start with the response marker,
/// echo the opcode that was just sent, and carry a SUCCESS result code.
/// Any other result code, including unrecognized values, is fatal.
pub fn check_dfu_response(response: &[u8], expected: DfuOpcode) -> OtaResult<()> {
    if response.len() < 3 {
        return Err(OtaError::ResponseTooShort {
            minimum: 3,
            actual: response.len(),
            response: to_hex(response),
        });
    }
    if response[0] != DfuOpcode::Response as u8 {
        return Err(OtaError::NotADfuResponse {
            first: response[0],
            response: to_hex(response),
        });
    }
    if response[1] != expected as u8 {
        return Err(OtaError::ResponseOpcodeMismatch {
            expected: expected.name(),
            actual: response[1],
        });
    }
    if response[2] != DfuResultCode::Success as u8 {
        return Err(OtaError::DfuRequestFailed {
            operation: expected.name(),
            code: response[2],
            description: describe_result_code(response[2]),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ota_start_layout() {
        assert_eq!(build_ota_start(1000), vec![0x00, 0x46, 0xE8, 0x03, 0x00, 0x00]);
        assert_eq!(build_ota_start(0), vec![0x00, 0x46, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_build_ota_data_layout() {
        assert_eq!(build_ota_data(&[0xAA, 0xBB]), vec![0x00, 0x47, 0xAA, 0xBB]);
        assert_eq!(build_ota_data(&[]), vec![0x00, 0x47]);
    }

    #[test]
    fn test_build_ota_end_layout() {
        assert_eq!(build_ota_end(), vec![0x00, 0x48]);
    }

    #[test]
    fn test_check_ota_response_success() {
        assert!(check_ota_response(&[0x00, 0x46], 0x46).is_ok());
        // Trailing bytes are tolerated
        assert!(check_ota_response(&[0x00, 0x47, 0x12], 0x47).is_ok());
    }

    #[test]
    fn test_check_ota_response_too_short() {
        let err = check_ota_response(&[0x00], 0x46).unwrap_err();
        assert!(matches!(
            err,
            OtaError::ResponseTooShort { minimum: 2, actual: 1, .. }
        ));
        assert!(matches!(
            check_ota_response(&[], 0x48).unwrap_err(),
            OtaError::ResponseTooShort { .. }
        ));
    }

    #[test]
    fn test_check_ota_response_rejection_ignores_echo() {
        // Error status is a rejection no matter what the echo byte says
        for echo in [0x46u8, 0x47, 0x00, 0xFF] {
            let err = check_ota_response(&[0xFF, echo], 0x46).unwrap_err();
            assert!(matches!(err, OtaError::CommandRejected { command: 0x46 }));
        }
    }

    #[test]
    fn test_check_ota_response_mismatch() {
        // Wrong echo byte
        let err = check_ota_response(&[0x00, 0x47], 0x46).unwrap_err();
        assert!(matches!(err, OtaError::UnexpectedResponse { command: 0x46, .. }));
        // Wrong status byte that is not the error code
        let err = check_ota_response(&[0x01, 0x46], 0x46).unwrap_err();
        assert!(matches!(err, OtaError::UnexpectedResponse { .. }));
    }

    #[test]
    fn test_build_dfu_frames() {
        assert_eq!(
            build_create(DfuObjectType::Data, 4096),
            vec![0x01, 0x02, 0x00, 0x10, 0x00, 0x00]
        );
        assert_eq!(
            build_create(DfuObjectType::Command, 141),
            vec![0x01, 0x01, 0x8D, 0x00, 0x00, 0x00]
        );
        assert_eq!(build_set_prn(0), vec![0x02, 0x00, 0x00]);
        assert_eq!(build_calculate_crc(), vec![0x03]);
        assert_eq!(build_execute(), vec![0x04]);
        assert_eq!(build_select(DfuObjectType::Command), vec![0x06, 0x01]);
        assert_eq!(build_select(DfuObjectType::Data), vec![0x06, 0x02]);
    }

    #[test]
    fn test_check_dfu_response_success() {
        assert!(check_dfu_response(&[0x60, 0x02, 0x01], DfuOpcode::SetPrn).is_ok());
        // SELECT responses carry offset/CRC/max-size after the result code
        assert!(check_dfu_response(
            &[0x60, 0x06, 0x01, 0x00, 0x10, 0x00, 0x00],
            DfuOpcode::Select
        )
        .is_ok());
    }

    #[test]
    fn test_check_dfu_response_too_short() {
        let err = check_dfu_response(&[0x60, 0x01], DfuOpcode::Create).unwrap_err();
        assert!(matches!(
            err,
            OtaError::ResponseTooShort { minimum: 3, actual: 2, .. }
        ));
    }

    #[test]
    fn test_check_dfu_response_not_a_response() {
        let err = check_dfu_response(&[0x61, 0x01, 0x01], DfuOpcode::Create).unwrap_err();
        assert!(matches!(err, OtaError::NotADfuResponse { first: 0x61, .. }));
    }

    #[test]
    fn test_check_dfu_response_opcode_mismatch_beats_success() {
        // Echoed opcode wrong even though result is SUCCESS
        let err = check_dfu_response(&[0x60, 0x04, 0x01], DfuOpcode::Create).unwrap_err();
        assert!(matches!(
            err,
            OtaError::ResponseOpcodeMismatch { expected: "CREATE", actual: 0x04 }
        ));
    }

    #[test]
    fn test_check_dfu_response_result_codes() {
        let err = check_dfu_response(&[0x60, 0x03, 0x05], DfuOpcode::CalculateCrc).unwrap_err();
        assert!(matches!(
            err,
            OtaError::DfuRequestFailed {
                operation: "CALCULATE_CRC",
                code: 0x05,
                description: "CRC validation failed",
            }
        ));

        // Unrecognized result codes are fatal too
        let err = check_dfu_response(&[0x60, 0x04, 0x42], DfuOpcode::Execute).unwrap_err();
        assert!(matches!(
            err,
            OtaError::DfuRequestFailed { code: 0x42, description: "Unrecognized result code", .. }
        ));
    }
}
