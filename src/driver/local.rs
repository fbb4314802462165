//! In-process drivers.
//!
//! A [`LocalDriver`] is a synchronous driver object living inside the harness
//! process, looked up by identifier in a [`LocalDriverRegistry`]. Driver calls may
//! block for as long as the hardware takes, so [`LocalHandle`] executes every call
//! on Tokio's blocking pool and never on the orchestrator's task.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use super::{codes, DriverHandle, TransportError};
use crate::core::{Argument, DeviceValue, TransportKind};

/// Errors raised by in-process drivers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocalDriverError {
    /// Member is not implemented by this driver.
    #[error("{member} is not implemented")]
    NotImplemented { member: String },

    /// Value was rejected.
    #[error("invalid value for {member}: {message}")]
    InvalidValue { member: String, message: String },

    /// Member needs a connected device.
    #[error("{member} requires the device to be connected")]
    NotConnected { member: String },

    /// Call is not valid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Any other driver error number.
    #[error("driver error {code:#x}: {message}")]
    Driver { code: i32, message: String },

    /// Identifier is not in the registry.
    #[error("no local driver registered as '{0}'")]
    UnknownDriver(String),
}

impl LocalDriverError {
    /// Shorthand for [`LocalDriverError::NotImplemented`].
    pub fn not_implemented(member: &str) -> Self {
        LocalDriverError::NotImplemented {
            member: member.to_string(),
        }
    }

    /// Shorthand for [`LocalDriverError::InvalidValue`].
    pub fn invalid_value(member: &str, message: impl Into<String>) -> Self {
        LocalDriverError::InvalidValue {
            member: member.to_string(),
            message: message.into(),
        }
    }

    /// Error number this failure carries on the wire.
    pub fn code(&self) -> i32 {
        match self {
            LocalDriverError::NotImplemented { .. } => codes::NOT_IMPLEMENTED,
            LocalDriverError::InvalidValue { .. } => codes::INVALID_VALUE,
            LocalDriverError::NotConnected { .. } => codes::NOT_CONNECTED,
            LocalDriverError::InvalidOperation(_) => codes::INVALID_OPERATION,
            LocalDriverError::Driver { code, .. } => *code,
            LocalDriverError::UnknownDriver(_) => codes::DRIVER_BASE,
        }
    }
}

/// Synchronous in-process driver object.
pub trait LocalDriver: Send {
    /// Read a property.
    fn get(&mut self, member: &str, args: &[Argument]) -> Result<DeviceValue, LocalDriverError>;

    /// Write a property or invoke a method.
    fn put(&mut self, member: &str, args: &[Argument]) -> Result<DeviceValue, LocalDriverError>;

    /// Called once when the handle is released.
    fn dispose(&mut self) {}
}

type DriverFactory =
    Box<dyn Fn(&str) -> Result<Box<dyn LocalDriver>, LocalDriverError> + Send + Sync>;

/// Creates local drivers by identifier (case-insensitive).
#[derive(Default)]
pub struct LocalDriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl LocalDriverRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in simulators.
    pub fn with_simulators() -> Self {
        let mut registry = Self::new();
        super::simulator::register_simulators(&mut registry);
        registry
    }

    /// Register a factory under `id`, replacing any earlier one.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&str) -> Result<Box<dyn LocalDriver>, LocalDriverError> + Send + Sync + 'static,
    {
        self.factories
            .insert(id.into().to_ascii_lowercase(), Box::new(factory));
    }

    /// Create the driver registered as `id`.
    pub fn create(&self, id: &str) -> Result<Box<dyn LocalDriver>, LocalDriverError> {
        let factory = self
            .factories
            .get(&id.to_ascii_lowercase())
            .ok_or_else(|| LocalDriverError::UnknownDriver(id.to_string()))?;
        factory(id)
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Handle over an in-process driver object.
pub struct LocalHandle {
    driver_id: String,
    driver: Arc<Mutex<Option<Box<dyn LocalDriver>>>>,
    released: Arc<AtomicBool>,
}

impl LocalHandle {
    /// Wrap a driver created by the registry.
    pub fn new(driver_id: impl Into<String>, driver: Box<dyn LocalDriver>) -> Self {
        Self {
            driver_id: driver_id.into(),
            driver: Arc::new(Mutex::new(Some(driver))),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn invoke(
        &self,
        write: bool,
        member: &str,
        args: &[Argument],
    ) -> Result<DeviceValue, TransportError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(TransportError::Released);
        }

        let driver = Arc::clone(&self.driver);
        let released = Arc::clone(&self.released);
        let member = member.to_string();
        let args = args.to_vec();

        // Execute the blocking driver call on a dedicated thread
        tokio::task::spawn_blocking(move || {
            let mut guard = driver.blocking_lock();
            let result = match guard.as_mut() {
                None => Err(TransportError::Released),
                Some(d) if write => d.put(&member, &args).map_err(TransportError::from),
                Some(d) => d.get(&member, &args).map_err(TransportError::from),
            };
            // The handle may have been released while this call was stuck in the driver
            if released.load(Ordering::SeqCst) {
                dispose(&mut guard);
            }
            result
        })
        .await
        .map_err(|e| TransportError::Panicked(e.to_string()))?
    }
}

#[async_trait]
impl DriverHandle for LocalHandle {
    fn transport(&self) -> TransportKind {
        TransportKind::LocalInterop
    }

    fn describe(&self) -> String {
        self.driver_id.clone()
    }

    async fn get(&self, member: &str, args: &[Argument]) -> Result<DeviceValue, TransportError> {
        self.invoke(false, member, args).await
    }

    async fn put(&self, member: &str, args: &[Argument]) -> Result<DeviceValue, TransportError> {
        self.invoke(true, member, args).await
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.driver.try_lock() {
            Ok(mut guard) => {
                dispose(&mut guard);
                debug!(driver = %self.driver_id, "Local driver disposed");
            }
            Err(_) => {
                // A call is still in flight. Wait for it off the caller's thread.
                debug!(driver = %self.driver_id, "Local driver busy, disposal deferred");
                let driver = Arc::clone(&self.driver);
                let deferred = move || dispose(&mut driver.blocking_lock());
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => drop(runtime.spawn_blocking(deferred)),
                    Err(_) => drop(std::thread::spawn(deferred)),
                }
            }
        }
    }
}

/// Dispose the driver if nobody has yet. Runs with the driver lock held.
fn dispose(slot: &mut Option<Box<dyn LocalDriver>>) {
    if let Some(mut d) = slot.take() {
        d.dispose();
    }
}
