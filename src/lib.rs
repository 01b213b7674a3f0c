//! BLE firmware update engines for OpenDisplay e-paper tags.
//!
//! Two independent engines cover the two tag chip families:
//!
//! - **ESP32 OTA** ([`esp32_ota`]) - a three-command protocol
//!   (START/DATA/END) driven over an already-open OpenDisplay BLE
//!   connection, for ESP32-S3/C3/C6 tags.
//! - **Nordic DFU** ([`nrf_dfu`]) - the Nordic Secure DFU object protocol
//!   (control point + packet characteristic) for NRF52840 tags in
//!   bootloader mode, fed by the DFU zip package parser ([`package`]) and
//!   bootloader discovery ([`discovery`]).
//!
//! The caller owns device selection, firmware download and presentation;
//! the engines take raw firmware bytes plus a BLE abstraction and report
//! `(bytes_sent, total_bytes)` progress after every acknowledged chunk or
//! object. Every protocol step is strictly sequential and carries an
//! explicit timeout; the first error aborts the attempt, and cleanup runs
//! on every exit path.
//!
//! # Example
//!
//! ```ignore
//! use opendisplay_ota::{perform_dfu_update, UpdateStage};
//! use std::time::Duration;
//!
//! let package = std::fs::read("firmware.zip")?;
//! perform_dfu_update(
//!     &adapter,
//!     &package,
//!     |stage: UpdateStage| println!("{} ({:.0}%)", stage.message(), stage.percent()),
//!     Duration::from_secs(30),
//! )
//! .await?;
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod esp32_ota;
pub mod nrf_dfu;
pub mod package;
pub mod packet;
pub mod transport;

// Chip dispatch
pub use config::TagChip;

// Errors
pub use error::{OtaError, OtaResult};

// ESP32 OTA engine
pub use esp32_ota::perform_esp32_ota;

// Nordic DFU engine
pub use nrf_dfu::{perform_dfu_update, run_dfu, NordicDfuController, UpdateStage};

// DFU packages and bootloader discovery
pub use discovery::find_dfu_bootloader;
pub use package::{parse_dfu_package, DfuPackage};

// BLE abstractions
pub use transport::{BtleplugDfuClient, DfuClient, NotificationHandler, OtaConnection};
