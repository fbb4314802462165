//! Run configuration using Figment.
//!
//! Settings are merged from (lowest to highest precedence):
//! 1. Built-in defaults (`ConformSettings::default()`)
//! 2. An optional TOML settings file
//! 3. Environment variables prefixed with `CONFORM_`, nested keys separated by `__`
//!
//! ```text
//! CONFORM_DEVICE__TRANSPORT=NetworkProtocol
//! CONFORM_DEVICE__ALPACA__ADDRESS=192.168.1.40
//! CONFORM_RUN__CALL_TIMEOUT_MS=2000
//! ```
//!
//! Loading only checks syntax and types. Call [`ConformSettings::validate`] before
//! handing the settings to an orchestrator.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::{DeviceCategory, TransportKind};
use crate::testing::Phase;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings could not be read or merged.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// Settings were read but are not usable.
    #[error("Configuration validation error: {}", .0.join("; "))]
    ValidationError(Vec<String>),
    /// Settings could not be rendered as TOML.
    #[error("Configuration serialization error: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Top-level settings for one conformance run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConformSettings {
    /// Which device to test and how to reach it
    pub device: DeviceSettings,
    /// Per-run options
    #[serde(default)]
    pub run: RunSettings,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Where to write the JSON report, if anywhere
    #[serde(default)]
    pub results_file: Option<PathBuf>,
}

/// Which device to test and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub category: DeviceCategory,
    pub transport: TransportKind,
    #[serde(default)]
    pub alpaca: AlpacaSettings,
    #[serde(default)]
    pub local: LocalSettings,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            category: DeviceCategory::FilterWheel,
            transport: TransportKind::LocalInterop,
            alpaca: AlpacaSettings::default(),
            local: LocalSettings::default(),
        }
    }
}

impl DeviceSettings {
    /// Human readable address of the device under test.
    pub fn describe(&self) -> String {
        match self.transport {
            TransportKind::LocalInterop => format!("{} ({})", self.local.driver_id, self.category),
            TransportKind::NetworkProtocol => format!(
                "{}/api/v1/{}/{}",
                self.alpaca.base_url(),
                self.category.alpaca_name(),
                self.alpaca.device_number
            ),
        }
    }
}

/// Alpaca device server location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlpacaSettings {
    /// Host name or IP address
    pub address: String,
    #[serde(default = "default_alpaca_port")]
    pub port: u16,
    #[serde(default)]
    pub device_number: u32,
    /// Sent as `ClientID` on every request
    #[serde(default = "default_client_id")]
    pub client_id: u32,
}

impl Default for AlpacaSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: default_alpaca_port(),
            device_number: 0,
            client_id: default_client_id(),
        }
    }
}

impl AlpacaSettings {
    /// Root URL of the device, e.g. `http://127.0.0.1:11111`.
    pub fn base_url(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            format!("{}:{}", self.address.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.address, self.port)
        }
    }

    /// Point at `HOST`, `HOST:PORT` or an `http://` / `https://` URL. IPv6
    /// literals need brackets, e.g. `[::1]:11111`. Without a port the configured
    /// one is kept.
    pub fn set_address(&mut self, value: &str) -> Result<(), ConfigError> {
        let invalid =
            |why: &str| ConfigError::ValidationError(vec![format!("address '{}' {}", value, why)]);
        let (secure, authority) = match value.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http") => (false, rest),
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("https") => (true, rest),
            Some(_) => return Err(invalid("must use http or https")),
            None => (false, value),
        };

        // A scheme without a default port, so an explicit :80 or :443 survives parsing
        let url = Url::parse(&format!("alpaca://{}", authority.trim_end_matches('/')))
            .map_err(|e| invalid(&e.to_string()))?;
        if !url.path().is_empty() || url.query().is_some() || !url.username().is_empty() {
            return Err(invalid("must be a host with an optional port"));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("has no host"))?;

        self.address = if secure {
            format!("https://{}", host)
        } else {
            host.to_string()
        };
        if let Some(port) = url.port() {
            self.port = port;
        }
        Ok(())
    }
}

/// In-process driver selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Registry key of the driver, e.g. `Simulator.FilterWheel`
    pub driver_id: String,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            driver_id: "Simulator.FilterWheel".to_string(),
        }
    }
}

/// Options that shape the test run itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Phases to schedule, executed in their fixed order regardless of listing order
    #[serde(default = "default_phases")]
    pub phases: Vec<Phase>,
    /// Bound on a single member call
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
    /// Bound on a whole test case
    #[serde(default = "default_case_timeout")]
    pub case_timeout_ms: u64,
    /// Bound on acquiring the driver handle and connecting
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Bound on waiting for a commanded move to finish
    #[serde(default = "default_move_timeout")]
    pub move_timeout_ms: u64,
    /// Delay between status polls while waiting for motion
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Schedule cases that move hardware
    #[serde(default = "default_enabled")]
    pub allow_moves: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            phases: default_phases(),
            call_timeout_ms: default_call_timeout(),
            case_timeout_ms: default_case_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            move_timeout_ms: default_move_timeout(),
            poll_interval_ms: default_poll_interval(),
            allow_moves: default_enabled(),
        }
    }
}

impl RunSettings {
    /// Bound on a single driver call.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Bound on one test case.
    pub fn case_timeout(&self) -> Duration {
        Duration::from_millis(self.case_timeout_ms)
    }

    /// Bound on opening the handle and setting `Connected`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Bound on waiting for a move to finish.
    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.move_timeout_ms)
    }

    /// Delay between motion polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Whether cases of `phase` are scheduled.
    pub fn includes(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_alpaca_port() -> u16 {
    11111
}
fn default_client_id() -> u32 {
    1
}
fn default_phases() -> Vec<Phase> {
    Phase::ALL.to_vec()
}
fn default_call_timeout() -> u64 {
    5_000
}
fn default_case_timeout() -> u64 {
    120_000
}
fn default_connect_timeout() -> u64 {
    15_000
}
fn default_move_timeout() -> u64 {
    60_000
}
fn default_poll_interval() -> u64 {
    100
}
fn default_enabled() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl ConformSettings {
    /// Load defaults, then the optional settings file, then `CONFORM_` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ConformSettings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("CONFORM_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))
    }

    /// Parse settings from a TOML string on top of the defaults (no environment).
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Figment::from(Serialized::defaults(ConformSettings::default()))
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))
    }

    /// Render these settings as a TOML document.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check semantic constraints, reporting every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let run = &self.run;

        match self.device.transport {
            TransportKind::NetworkProtocol => {
                if self.device.alpaca.address.trim().is_empty() {
                    problems.push("device.alpaca.address must not be empty".to_string());
                }
                if self.device.alpaca.port == 0 {
                    problems.push("device.alpaca.port must be non-zero".to_string());
                }
            }
            TransportKind::LocalInterop => {
                if self.device.local.driver_id.trim().is_empty() {
                    problems.push("device.local.driver_id must not be empty".to_string());
                }
            }
        }

        for (name, value) in [
            ("run.call_timeout_ms", run.call_timeout_ms),
            ("run.case_timeout_ms", run.case_timeout_ms),
            ("run.connect_timeout_ms", run.connect_timeout_ms),
            ("run.move_timeout_ms", run.move_timeout_ms),
            ("run.poll_interval_ms", run.poll_interval_ms),
        ] {
            if value == 0 {
                problems.push(format!("{} must be greater than zero", name));
            }
        }
        if run.poll_interval_ms >= run.move_timeout_ms {
            problems.push("run.poll_interval_ms must be shorter than run.move_timeout_ms".to_string());
        }
        if run.phases.is_empty() {
            problems.push("run.phases must name at least one phase".to_string());
        }

        if !["trace", "debug", "info", "warn", "error"]
            .contains(&self.logging.level.to_ascii_lowercase().as_str())
        {
            problems.push(format!("logging.level '{}' is not a log level", self.logging.level));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(problems))
        }
    }
}
