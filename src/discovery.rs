//! DFU bootloader discovery.
//!
//! After being told to reboot into DFU mode, an NRF52840 tag advertises the
//! Nordic DFU service, typically under a name like "DfuTarg". The original
//! connection is gone at that point, so the bootloader is found by scanning
//! for a matching advertisement rather than by address.

use std::time::Duration;

use btleplug::api::{Central, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Peripheral};
use log::{debug, info};
use uuid::Uuid;

use crate::config::{DFU_SCAN_POLL_INTERVAL, DFU_SERVICE_UUID};
use crate::error::{OtaError, OtaResult};

/// Whether an advertisement belongs to a DFU bootloader.
///
/// Matches either the Nordic DFU service UUID or a local name containing
/// "dfu" (case-insensitive) - some bootloaders advertise only the name.
pub fn is_dfu_advertisement(service_uuids: &[Uuid], local_name: Option<&str>) -> bool {
    if service_uuids.contains(&DFU_SERVICE_UUID) {
        return true;
    }
    local_name
        .map(|name| name.to_lowercase().contains("dfu"))
        .unwrap_or(false)
}

/// Scan for a device advertising the DFU bootloader.
///
/// Polls the adapter's peripheral list until the first matching
/// advertisement appears or the timeout expires. Not finding the bootloader
/// is terminal for the update attempt; any retry belongs to the caller.
pub async fn find_dfu_bootloader(adapter: &Adapter, timeout: Duration) -> OtaResult<Peripheral> {
    info!(
        "Scanning for DFU bootloader (timeout={}s)...",
        timeout.as_secs()
    );
    // Unfiltered scan: a name-only bootloader advertisement would not pass
    // a service filter.
    adapter.start_scan(ScanFilter::default()).await?;

    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        for peripheral in adapter.peripherals().await? {
            let Some(properties) = peripheral.properties().await.ok().flatten() else {
                continue;
            };
            if is_dfu_advertisement(&properties.services, properties.local_name.as_deref()) {
                let _ = adapter.stop_scan().await;
                info!(
                    "Found DFU bootloader: {} ({})",
                    properties.local_name.as_deref().unwrap_or("<unnamed>"),
                    properties.address
                );
                return Ok(peripheral);
            }
            debug!("Ignoring non-DFU advertisement from {}", properties.address);
        }
        tokio::time::sleep(DFU_SCAN_POLL_INTERVAL).await;
    }

    let _ = adapter.stop_scan().await;
    Err(OtaError::BootloaderNotFound {
        timeout_secs: timeout.as_secs(),
    })
}
