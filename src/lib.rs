//! Conformance checker for astronomy device drivers.
//!
//! A run connects to one device (an in-process driver or a remote Alpaca device),
//! wraps it in the facade for its category and walks it through the category's
//! test plan, streaming every verdict to a [`ResultSink`] and returning a
//! [`RunReport`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_conform::{ConformSettings, ConformanceTestManager, TracingSink};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> rust_conform::AppResult<()> {
//! let settings = ConformSettings::load(None)?;
//! let mut manager =
//!     ConformanceTestManager::new(settings, Arc::new(TracingSink), CancellationToken::new());
//! let report = manager.run_conformance_test().await?;
//! println!("{}", report.to_markdown());
//! # Ok(())
//! # }
//! ```

/// Settings.
pub mod config;
/// Shared value types.
pub mod core;
/// Driver handles and transports.
pub mod driver;
/// Error types.
pub mod error;
/// Per-category facades.
pub mod facade;
/// Subscriber setup.
pub mod logging;
/// Run orchestration.
pub mod orchestrator;
/// Built-in test plans.
pub mod plans;
/// Test cases, results and reports.
pub mod testing;

pub use config::ConformSettings;
pub use core::{DeviceCategory, DeviceValue, TransportKind};
pub use error::{AppResult, ConformError, ErrorKind, FacadeError};
pub use orchestrator::{ConformanceTestManager, RunState};
pub use testing::{ResultSink, RunOutcome, RunReport, TestResult, TracingSink, Verdict};
