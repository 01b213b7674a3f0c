//! ESP32 BLE OTA engine.
//!
//! Flashes firmware over an existing OpenDisplay BLE connection using the
//! three-command OTA protocol (commands 0x0046/0x0047/0x0048), used for
//! ESP32-S3, ESP32-C3 and ESP32-C6 tags. The firmware must be the
//! application-only `.bin`, not the merged image including bootloader and
//! partition table - the device's updater rejects the latter.
//!
//! Protocol flow:
//! 1. OTA Start - declares the total firmware size
//! 2. OTA Data  - streams firmware in chunks, one acknowledgement per chunk
//! 3. OTA End   - finalizes and triggers a reboot

use log::{debug, info};

use crate::config::{
    CMD_OTA_DATA, CMD_OTA_END, CMD_OTA_START, ESP32_COMMAND_TIMEOUT, ESP32_END_TIMEOUT,
    ESP32_OTA_CHUNK_SIZE,
};
use crate::error::OtaResult;
use crate::packet::{build_ota_data, build_ota_end, build_ota_start, check_ota_response};
use crate::transport::OtaConnection;

/// Flash firmware to an ESP32 tag over BLE.
///
/// Strictly sequential: each command's acknowledgement is validated before
/// the next command is sent, and the first error aborts the transfer - a
/// failed chunk fails the whole update. On success the device reboots into
/// the new firmware; any post-reboot settling delay is the caller's
/// concern.
///
/// `progress` is invoked with `(bytes_sent, total_bytes)` after every
/// acknowledged chunk; on success the final call reports the full size.
pub async fn perform_esp32_ota<C, F>(
    connection: &C,
    firmware: &[u8],
    mut progress: F,
) -> OtaResult<()>
where
    C: OtaConnection + ?Sized,
    F: FnMut(usize, usize),
{
    let total_size = firmware.len();
    info!("Starting ESP32 BLE OTA ({total_size} bytes)");

    let response = connection
        .write_command_with_response(build_ota_start(total_size as u32), ESP32_COMMAND_TIMEOUT)
        .await?;
    check_ota_response(&response, CMD_OTA_START[1])?;
    debug!("ESP32 OTA started, sending firmware data...");

    let mut offset = 0;
    for chunk in firmware.chunks(ESP32_OTA_CHUNK_SIZE) {
        let response = connection
            .write_command_with_response(build_ota_data(chunk), ESP32_COMMAND_TIMEOUT)
            .await?;
        check_ota_response(&response, CMD_OTA_DATA[1])?;

        offset += chunk.len();
        progress(offset, total_size);
        debug!("ESP32 OTA progress: {offset} / {total_size} bytes");
    }

    let response = connection
        .write_command_with_response(build_ota_end(), ESP32_END_TIMEOUT)
        .await?;
    check_ota_response(&response, CMD_OTA_END[1])?;

    info!("ESP32 OTA completed successfully, device will reboot");
    Ok(())
}
