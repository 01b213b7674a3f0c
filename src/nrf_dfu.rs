//! Nordic BLE DFU engine for NRF52840 tags.
//!
//! Drives the Nordic/Adafruit Secure DFU object protocol against a device
//! already rebooted into its DFU bootloader:
//! 1. Subscribe to control point notifications, disable PRN batching
//! 2. Init packet - one command object (SELECT/CREATE/stream/CRC/EXECUTE)
//! 3. Firmware - data objects of up to 4096 bytes, same cycle per object
//! 4. Unsubscribe (best-effort)
//!
//! Responses arrive asynchronously as control point notifications; commands
//! are never pipelined, so a single-slot rendezvous (a bounded channel of
//! capacity one) correlates each command with its response.

use std::time::Duration;

use btleplug::platform::Adapter;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::{
    DfuObjectType, DfuOpcode, DFU_CONTROL_POINT_UUID, DFU_DATA_OBJECT_MAX_SIZE,
    DFU_PACKET_CHUNK_SIZE, DFU_PACKET_UUID, DFU_RESPONSE_TIMEOUT,
};
use crate::discovery::find_dfu_bootloader;
use crate::error::{OtaError, OtaResult};
use crate::package::{parse_dfu_package, DfuPackage};
use crate::packet::{
    build_calculate_crc, build_create, build_execute, build_select, build_set_prn,
    check_dfu_response,
};
use crate::transport::{BtleplugDfuClient, DfuClient};

/// Update stages for UI feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", content = "data")]
pub enum UpdateStage {
    /// Parsing the DFU package.
    ReadingPackage,
    /// Scanning for the DFU bootloader advertisement.
    Scanning,
    /// Connecting to the bootloader.
    Connecting,
    /// Transferring init packet and firmware.
    Transferring { sent: usize, total: usize },
    /// Update complete, device is rebooting into the new firmware.
    Complete,
}

impl UpdateStage {
    /// Get a percentage estimate for this stage.
    pub fn percent(&self) -> f32 {
        match self {
            UpdateStage::ReadingPackage => 0.0,
            UpdateStage::Scanning => 2.0,
            UpdateStage::Connecting => 8.0,
            UpdateStage::Transferring { sent, total } => {
                if *total == 0 {
                    10.0
                } else {
                    10.0 + (*sent as f32 / *total as f32) * 88.0
                }
            }
            UpdateStage::Complete => 100.0,
        }
    }

    /// Get a human-readable message for this stage.
    pub fn message(&self) -> String {
        match self {
            UpdateStage::ReadingPackage => "Reading firmware package...".into(),
            UpdateStage::Scanning => "Scanning for DFU bootloader...".into(),
            UpdateStage::Connecting => "Connecting to bootloader...".into(),
            UpdateStage::Transferring { sent, total } => {
                let percent = if *total == 0 { 0 } else { (sent * 100) / total };
                format!("Transferring firmware... {}%", percent)
            }
            UpdateStage::Complete => "Update complete!".into(),
        }
    }
}

/// Secure DFU controller for the Nordic/Adafruit bootloader.
pub struct NordicDfuController<'a, C: DfuClient + ?Sized> {
    client: &'a C,
    response_tx: mpsc::Sender<Vec<u8>>,
    responses: mpsc::Receiver<Vec<u8>>,
    response_timeout: Duration,
    subscribed: bool,
}

impl<'a, C: DfuClient + ?Sized> NordicDfuController<'a, C> {
    /// Create a controller over a connected DFU client.
    pub fn new(client: &'a C) -> Self {
        // Capacity one: commands are strictly sequential, so there is at
        // most one outstanding response at any time.
        let (response_tx, responses) = mpsc::channel(1);
        Self {
            client,
            response_tx,
            responses,
            response_timeout: DFU_RESPONSE_TIMEOUT,
            subscribed: false,
        }
    }

    /// Override the control point response timeout (default 10s).
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Subscribe to control point notifications and disable PRN batching.
    ///
    /// With PRN set to 0 the bootloader acknowledges at the object level
    /// only, never per packet.
    pub async fn start(&mut self) -> OtaResult<()> {
        let tx = self.response_tx.clone();
        self.client
            .subscribe_notifications(
                DFU_CONTROL_POINT_UUID,
                Box::new(move |data| {
                    // A full slot means a stale response nobody is waiting
                    // for; the next request drains it anyway.
                    let _ = tx.try_send(data);
                }),
            )
            .await?;
        self.subscribed = true;

        self.request(build_set_prn(0), DfuOpcode::SetPrn).await
    }

    /// Send the init packet as a single command object.
    pub async fn send_init_packet(&mut self, init_packet: &[u8]) -> OtaResult<()> {
        debug!("Sending init packet ({} bytes)", init_packet.len());
        self.request(build_select(DfuObjectType::Command), DfuOpcode::Select)
            .await?;
        self.request(
            build_create(DfuObjectType::Command, init_packet.len() as u32),
            DfuOpcode::Create,
        )
        .await?;
        self.stream_object(init_packet).await?;
        self.request(build_calculate_crc(), DfuOpcode::CalculateCrc)
            .await?;
        self.request(build_execute(), DfuOpcode::Execute).await
    }

    /// Send the firmware as a sequence of data objects.
    ///
    /// `progress` is invoked with `(bytes_sent, total_bytes)` after each
    /// executed object.
    pub async fn send_firmware<F>(&mut self, firmware: &[u8], progress: &mut F) -> OtaResult<()>
    where
        F: FnMut(usize, usize),
    {
        self.request(build_select(DfuObjectType::Data), DfuOpcode::Select)
            .await?;

        let total_size = firmware.len();
        let mut offset = 0;

        while offset < total_size {
            let object_size = DFU_DATA_OBJECT_MAX_SIZE.min(total_size - offset);

            self.request(
                build_create(DfuObjectType::Data, object_size as u32),
                DfuOpcode::Create,
            )
            .await?;
            self.stream_object(&firmware[offset..offset + object_size])
                .await?;
            self.request(build_calculate_crc(), DfuOpcode::CalculateCrc)
                .await?;
            self.request(build_execute(), DfuOpcode::Execute).await?;

            offset += object_size;
            progress(offset, total_size);
            debug!("DFU progress: {offset} / {total_size} bytes");
        }

        Ok(())
    }

    /// Unsubscribe from control point notifications.
    ///
    /// Best-effort: a teardown failure is logged and never surfaces, so it
    /// cannot mask the transfer outcome.
    pub async fn stop(&mut self) {
        if !self.subscribed {
            return;
        }
        if let Err(err) = self
            .client
            .unsubscribe_notifications(DFU_CONTROL_POINT_UUID)
            .await
        {
            warn!("Failed to unsubscribe from DFU control point: {err}");
        }
        self.subscribed = false;
    }

    /// Send a control point command and validate its response notification.
    async fn request(&mut self, frame: Vec<u8>, opcode: DfuOpcode) -> OtaResult<()> {
        // Drop any stale notification from a previous exchange.
        while self.responses.try_recv().is_ok() {}

        self.client
            .write_characteristic(DFU_CONTROL_POINT_UUID, frame, true)
            .await?;

        let response = match tokio::time::timeout(self.response_timeout, self.responses.recv())
            .await
        {
            Ok(Some(data)) => data,
            Ok(None) => {
                return Err(OtaError::Disconnected {
                    operation: opcode.name(),
                })
            }
            Err(_) => {
                return Err(OtaError::Timeout {
                    operation: opcode.name(),
                })
            }
        };

        check_dfu_response(&response, opcode)
    }

    /// Stream an object's bytes to the packet characteristic.
    ///
    /// Write-without-response sub-chunks; the object as a whole is
    /// acknowledged via CALCULATE_CRC/EXECUTE, not per packet.
    async fn stream_object(&self, data: &[u8]) -> OtaResult<()> {
        for chunk in data.chunks(DFU_PACKET_CHUNK_SIZE) {
            self.client
                .write_characteristic(DFU_PACKET_UUID, chunk.to_vec(), false)
                .await?;
        }
        Ok(())
    }
}

/// Run a complete DFU session against a connected client.
///
/// Teardown (unsubscribing the control point) happens on every exit path;
/// the first transfer error aborts the session and is returned unchanged.
pub async fn run_dfu<C, F>(client: &C, package: &DfuPackage, mut progress: F) -> OtaResult<()>
where
    C: DfuClient + ?Sized,
    F: FnMut(usize, usize),
{
    let mut dfu = NordicDfuController::new(client);
    let outcome = run_session(&mut dfu, package, &mut progress).await;
    dfu.stop().await;
    outcome
}

async fn run_session<C, F>(
    dfu: &mut NordicDfuController<'_, C>,
    package: &DfuPackage,
    progress: &mut F,
) -> OtaResult<()>
where
    C: DfuClient + ?Sized,
    F: FnMut(usize, usize),
{
    dfu.start().await?;
    info!("Sending init packet...");
    dfu.send_init_packet(&package.init_packet).await?;
    info!("Sending firmware ({} bytes)...", package.firmware.len());
    dfu.send_firmware(&package.firmware, progress).await?;
    info!("DFU transfer completed successfully");
    Ok(())
}

/// Perform a complete DFU update on a device already in bootloader mode.
///
/// Parses the package, scans for the bootloader advertisement, connects,
/// runs the transfer and disconnects. Stages (including byte progress while
/// transferring) are reported through `on_stage`.
pub async fn perform_dfu_update<F>(
    adapter: &Adapter,
    package_data: &[u8],
    mut on_stage: F,
    scan_timeout: Duration,
) -> OtaResult<()>
where
    F: FnMut(UpdateStage),
{
    on_stage(UpdateStage::ReadingPackage);
    let package = parse_dfu_package(package_data)?;
    info!(
        "DFU package: init={} bytes, firmware={} bytes",
        package.init_packet.len(),
        package.firmware.len()
    );

    on_stage(UpdateStage::Scanning);
    let peripheral = find_dfu_bootloader(adapter, scan_timeout).await?;

    on_stage(UpdateStage::Connecting);
    let client = BtleplugDfuClient::connect(peripheral).await?;

    let result = run_dfu(&client, &package, |sent, total| {
        on_stage(UpdateStage::Transferring { sent, total })
    })
    .await;

    // Let the device reboot into the new firmware.
    client.disconnect().await;

    if result.is_ok() {
        on_stage(UpdateStage::Complete);
        info!("DFU update completed successfully");
    }
    result
}
