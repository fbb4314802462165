//! Custom error types for the application.
//!
//! This module defines the application-level error type, `ConformError`, and the
//! uniform device error taxonomy (`ErrorKind` / `FacadeError`) that every facade
//! translates transport failures into.
//!
//! ## Error Hierarchy
//!
//! - **`TransportError`** (see [`crate::driver`]): raw failures from a driver handle.
//!   These never cross the facade boundary.
//! - **`FacadeError`**: a transport failure translated into one [`ErrorKind`], annotated
//!   with the member that was being accessed and the raw transport message.
//! - **`CheckError`**: what a test case check can fail with. Either a device error
//!   (classified into a verdict) or a harness error (ends the run as Fatal).
//! - **`ConformError`**: errors surfaced to the caller of the library: settings
//!   problems, malformed test plans, misuse of the orchestrator, report I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::testing::Verdict;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ConformError>;

/// Errors surfaced by the harness itself, never by the device under test.
#[derive(Error, Debug)]
pub enum ConformError {
    /// Settings could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Plan is malformed or does not fit the device.
    #[error("Invalid test plan: {0}")]
    InvalidPlan(String),

    /// No facade for this category and transport.
    #[error("No facade is registered for {category} over {transport}")]
    NoFacade {
        category: crate::core::DeviceCategory,
        transport: crate::core::TransportKind,
    },

    /// `run_conformance_test` was already called.
    #[error("RunConformanceTest may only be called once per orchestrator")]
    AlreadyRun,

    /// I/O failure writing a report.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Uniform classification of anything that went wrong while talking to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The driver signalled that the member is not implemented.
    Unsupported,
    /// The driver answered with a value of the wrong type or outside its contract.
    InvalidResponse,
    /// Connection dropped, malformed payload or protocol-level failure.
    TransportFailure,
    /// The call did not complete within the configured bound.
    Timeout,
    /// Internal skip reason: a prerequisite case did not pass.
    PrerequisiteNotMet,
    /// Internal abort reason: the run's cancellation signal was observed.
    Cancelled,
    /// The driver rejected a supplied argument as out of range.
    InvalidValue,
    /// Any other error the driver reported (not connected, invalid operation, ...).
    DriverError,
}

impl ErrorKind {
    /// Verdict a case receives when it ends with an unexpected error of this kind.
    pub fn verdict(&self) -> Verdict {
        match self {
            ErrorKind::Unsupported => Verdict::Warning,
            ErrorKind::PrerequisiteNotMet => Verdict::Skipped,
            ErrorKind::Cancelled => Verdict::Aborted,
            ErrorKind::InvalidResponse
            | ErrorKind::TransportFailure
            | ErrorKind::Timeout
            | ErrorKind::InvalidValue
            | ErrorKind::DriverError => Verdict::Fail,
        }
    }

    /// Stable upper-case name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unsupported => "UNSUPPORTED",
            ErrorKind::InvalidResponse => "INVALID_RESPONSE",
            ErrorKind::TransportFailure => "TRANSPORT_FAILURE",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::PrerequisiteNotMet => "PREREQUISITE_NOT_MET",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::InvalidValue => "INVALID_VALUE",
            ErrorKind::DriverError => "DRIVER_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device error as seen above the facade boundary.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} from {member}: {message}")]
pub struct FacadeError {
    pub kind: ErrorKind,
    /// Interface member being accessed, e.g. `Position`.
    pub member: String,
    /// Raw message from the transport or driver.
    pub message: String,
}

impl FacadeError {
    /// Error of `kind` raised by `member`.
    pub fn new(kind: ErrorKind, member: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            member: member.into(),
            message: message.into(),
        }
    }

    /// The driver answered with a value of the wrong type or range.
    pub fn invalid_response(member: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, member, message)
    }

    /// True when the driver reported the member as not implemented.
    pub fn is_unsupported(&self) -> bool {
        self.kind == ErrorKind::Unsupported
    }
}

/// Failure of a single check.
#[derive(Error, Debug)]
pub enum CheckError {
    /// The device misbehaved; classified through [`ErrorKind::verdict`].
    #[error(transparent)]
    Device(#[from] FacadeError),

    /// A defect in the harness itself, e.g. a plan run against the wrong facade.
    #[error("harness error: {0}")]
    Harness(String),
}
