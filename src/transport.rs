//! BLE transport abstractions for the update engines.
//!
//! Two seams, matching the two protocols:
//!
//! - [`OtaConnection`] - an already-open OpenDisplay connection that can
//!   send a command and return its correlated response. Provided by the
//!   connection layer that owns the GATT link; the ESP32 engine only needs
//!   this one method.
//! - [`DfuClient`] - a raw GATT client (write, subscribe, unsubscribe) for
//!   the Nordic DFU bootloader, where responses arrive asynchronously as
//!   control point notifications.
//!
//! Both traits are mockable in tests. [`BtleplugDfuClient`] is the real
//! implementation over a connected btleplug peripheral.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::error::{OtaError, OtaResult};

/// Callback invoked with the payload of each notification.
pub type NotificationHandler = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// An open connection to a tag running the OpenDisplay application,
/// consumed by the ESP32 OTA engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OtaConnection: Send + Sync {
    /// Perform a GATT command write and return the correlated response,
    /// failing with a timeout error if none arrives within `timeout`.
    async fn write_command_with_response(
        &self,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> OtaResult<Vec<u8>>;
}

/// A raw GATT client for a device in DFU bootloader mode, consumed by the
/// Nordic DFU engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DfuClient: Send + Sync {
    /// Write to a characteristic, with or without a link-layer response.
    async fn write_characteristic(
        &self,
        uuid: Uuid,
        data: Vec<u8>,
        with_response: bool,
    ) -> OtaResult<()>;

    /// Subscribe to notifications on a characteristic, delivering each
    /// payload to `handler`.
    async fn subscribe_notifications(
        &self,
        uuid: Uuid,
        handler: NotificationHandler,
    ) -> OtaResult<()>;

    /// Stop notifications on a characteristic.
    async fn unsubscribe_notifications(&self, uuid: Uuid) -> OtaResult<()>;
}

/// btleplug-backed [`DfuClient`] over a connected peripheral.
pub struct BtleplugDfuClient {
    peripheral: Peripheral,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugDfuClient {
    /// Connect to a peripheral and discover its services.
    pub async fn connect(peripheral: Peripheral) -> OtaResult<Self> {
        peripheral.connect().await?;
        peripheral.discover_services().await?;
        Ok(Self {
            peripheral,
            forwarder: Mutex::new(None),
        })
    }

    /// Wrap a peripheral that is already connected with services discovered.
    pub fn from_connected(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            forwarder: Mutex::new(None),
        }
    }

    /// Disconnect from the peripheral, ignoring failures.
    ///
    /// Best-effort teardown for use on both success and failure paths;
    /// a disconnect error must never mask the update outcome.
    pub async fn disconnect(&self) {
        if let Some(task) = self.forwarder.lock().await.take() {
            task.abort();
        }
        if let Err(err) = self.peripheral.disconnect().await {
            warn!("Disconnect from DFU target failed: {err}");
        }
    }

    fn characteristic(&self, uuid: Uuid) -> OtaResult<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(OtaError::MissingCharacteristic { uuid })
    }
}

#[async_trait]
impl DfuClient for BtleplugDfuClient {
    async fn write_characteristic(
        &self,
        uuid: Uuid,
        data: Vec<u8>,
        with_response: bool,
    ) -> OtaResult<()> {
        let characteristic = self.characteristic(uuid)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral
            .write(&characteristic, &data, write_type)
            .await?;
        Ok(())
    }

    async fn subscribe_notifications(
        &self,
        uuid: Uuid,
        handler: NotificationHandler,
    ) -> OtaResult<()> {
        let characteristic = self.characteristic(uuid)?;
        self.peripheral.subscribe(&characteristic).await?;

        // The peripheral exposes one merged notification stream; forward
        // only the subscribed characteristic's payloads to the handler.
        let mut stream = self.peripheral.notifications().await?;
        let task = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == uuid {
                    handler(notification.value);
                }
            }
            debug!("Notification stream for {uuid} ended");
        });

        let mut forwarder = self.forwarder.lock().await;
        if let Some(previous) = forwarder.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe_notifications(&self, uuid: Uuid) -> OtaResult<()> {
        let characteristic = self.characteristic(uuid)?;
        self.peripheral.unsubscribe(&characteristic).await?;
        if let Some(task) = self.forwarder.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}
