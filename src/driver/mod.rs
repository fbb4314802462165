//! Driver handles: the transport-specific connection to one device instance.
//!
//! A [`DriverHandle`] exposes untyped property reads (`get`) and writes/method
//! calls (`put`). It may fail with any [`TransportError`]; translating those into
//! the uniform [`ErrorKind`](crate::error::ErrorKind) taxonomy is the facade's job.
//!
//! Two implementations exist:
//! - [`LocalHandle`]: an in-process driver object created from a [`LocalDriverRegistry`]
//! - [`AlpacaHandle`]: a remote device spoken to over the Alpaca REST protocol
//!
//! Handles are opened by a [`Connector`]. The orchestrator owns the handle for the
//! lifetime of one run and calls [`DriverHandle::release`] exactly once.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::ConformSettings;
use crate::core::{Argument, DeviceValue, TransportKind};

/// Alpaca REST transport.
pub mod alpaca;
/// In-process drivers.
pub mod local;
/// Built-in simulated devices.
pub mod simulator;

pub use alpaca::AlpacaHandle;
pub use local::{LocalDriver, LocalDriverError, LocalDriverRegistry, LocalHandle};

/// Error numbers shared by both transports.
pub mod codes {
    /// Member is not implemented.
    pub const NOT_IMPLEMENTED: i32 = 0x400;
    /// Value is invalid or out of range.
    pub const INVALID_VALUE: i32 = 0x401;
    /// Value was read before it was ever set.
    pub const VALUE_NOT_SET: i32 = 0x402;
    /// Device is not connected.
    pub const NOT_CONNECTED: i32 = 0x407;
    /// Not valid while the mount is parked.
    pub const INVALID_WHILE_PARKED: i32 = 0x408;
    /// Not valid while the dome is slaved.
    pub const INVALID_WHILE_SLAVED: i32 = 0x409;
    /// Operation is not valid in the current state.
    pub const INVALID_OPERATION: i32 = 0x40B;
    /// Action name is not supported.
    pub const ACTION_NOT_IMPLEMENTED: i32 = 0x40C;
    /// Operation was cancelled.
    pub const OPERATION_CANCELLED: i32 = 0x40E;
    /// First driver-specific error number
    pub const DRIVER_BASE: i32 = 0x500;
    /// Last driver-specific error number
    pub const DRIVER_MAX: i32 = 0xFFF;
}

/// Raw failure reported by a driver handle.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The device answered with a non-zero error number.
    #[error("device error {code:#x}: {message}")]
    Device { code: i32, message: String },

    /// Error raised by an in-process driver.
    #[error("local driver error: {0}")]
    Local(#[from] LocalDriverError),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP status other than 200.
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// Reply could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// No reply within the bound.
    #[error("no response within {0:?}")]
    TimedOut(Duration),

    /// Handle was already released.
    #[error("driver handle has been released")]
    Released,

    /// Driver call panicked.
    #[error("driver call panicked: {0}")]
    Panicked(String),

    /// Could not reach the device.
    #[error("connection failed: {0}")]
    Connect(String),
}

/// Transport-specific connection to one device instance.
#[async_trait]
pub trait DriverHandle: Send + Sync {
    fn transport(&self) -> TransportKind;

    /// Human readable identity for logs and reports.
    fn describe(&self) -> String;

    /// Read a property.
    async fn get(&self, member: &str, args: &[Argument]) -> Result<DeviceValue, TransportError>;

    /// Write a property or invoke a method.
    async fn put(&self, member: &str, args: &[Argument]) -> Result<DeviceValue, TransportError>;

    /// Free the underlying driver. Later calls fail with [`TransportError::Released`].
    fn release(&self);
}

/// Opens a driver handle for the configured device.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, settings: &ConformSettings) -> Result<Arc<dyn DriverHandle>, TransportError>;
}

/// Default connector: local drivers come from a registry, network devices are
/// reached over Alpaca.
pub struct TransportConnector {
    registry: Arc<LocalDriverRegistry>,
}

impl TransportConnector {
    /// Connector creating local drivers from `registry`.
    pub fn new(registry: Arc<LocalDriverRegistry>) -> Self {
        Self { registry }
    }
}

impl Default for TransportConnector {
    fn default() -> Self {
        Self::new(Arc::new(LocalDriverRegistry::with_simulators()))
    }
}

#[async_trait]
impl Connector for TransportConnector {
    async fn open(&self, settings: &ConformSettings) -> Result<Arc<dyn DriverHandle>, TransportError> {
        let device = &settings.device;
        match device.transport {
            TransportKind::LocalInterop => {
                let driver_id = device.local.driver_id.clone();
                let registry = Arc::clone(&self.registry);
                // Driver construction may be slow, like instantiating a COM object.
                let driver = tokio::task::spawn_blocking({
                    let driver_id = driver_id.clone();
                    move || registry.create(&driver_id)
                })
                .await
                .map_err(|e| TransportError::Panicked(e.to_string()))??;
                info!(driver = %driver_id, "Created local driver");
                Ok(Arc::new(LocalHandle::new(driver_id, driver)))
            }
            TransportKind::NetworkProtocol => {
                let handle = AlpacaHandle::open(
                    &device.alpaca,
                    device.category,
                    settings.run.call_timeout(),
                )
                .await?;
                info!(device = %handle.describe(), "Opened Alpaca device");
                Ok(Arc::new(handle))
            }
        }
    }
}
