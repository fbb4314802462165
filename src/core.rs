//! Core data types shared by drivers, facades and test plans.
//!
//! - [`DeviceCategory`]: the standardized interface a driver claims to implement
//! - [`TransportKind`]: how the harness reaches the driver
//! - [`DeviceValue`]: a dynamically typed member value, as it travels through a
//!   [`DriverHandle`](crate::driver::DriverHandle) before the facade gives it a type
//! - [`Argument`]: a named value passed to a property write or method call

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Standardized device interface contract.
///
/// Adding a category means adding a variant here, one facade and one test plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    /// Filter wheel with named slots.
    FilterWheel,
    /// Stepper focuser.
    Focuser,
    /// Observatory safety monitor.
    SafetyMonitor,
}

impl DeviceCategory {
    /// Every category the harness knows how to test.
    pub const ALL: [DeviceCategory; 3] = [
        DeviceCategory::FilterWheel,
        DeviceCategory::Focuser,
        DeviceCategory::SafetyMonitor,
    ];

    /// Lower-case device type used in Alpaca URLs.
    pub fn alpaca_name(&self) -> &'static str {
        match self {
            DeviceCategory::FilterWheel => "filterwheel",
            DeviceCategory::Focuser => "focuser",
            DeviceCategory::SafetyMonitor => "safetymonitor",
        }
    }

    /// Canonical name, as written in settings and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCategory::FilterWheel => "FilterWheel",
            DeviceCategory::Focuser => "Focuser",
            DeviceCategory::SafetyMonitor => "SafetyMonitor",
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        DeviceCategory::ALL
            .into_iter()
            .find(|c| c.alpaca_name() == normalized)
            .ok_or_else(|| format!("unknown device category '{}'", s))
    }
}

/// Mechanism used to reach a driver instance. Fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// In-process driver object created from the local driver registry.
    #[serde(alias = "local", alias = "com")]
    LocalInterop,
    /// Remote device reached over the Alpaca REST protocol.
    #[serde(alias = "alpaca", alias = "network")]
    NetworkProtocol,
}

impl TransportKind {
    /// Canonical name, as written in settings and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::LocalInterop => "LocalInterop",
            TransportKind::NetworkProtocol => "NetworkProtocol",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "localinterop" | "local" | "com" => Ok(TransportKind::LocalInterop),
            "networkprotocol" | "network" | "alpaca" => Ok(TransportKind::NetworkProtocol),
            _ => Err(format!("unknown transport '{}'", s)),
        }
    }
}

/// Dynamically typed value returned by a driver handle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DeviceValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    String(String),
    /// Array of values.
    Array(Vec<DeviceValue>),
    /// JSON object, kept as raw text. No interface member has this type.
    Object(String),
    /// No value, as returned by methods and writes.
    Null,
}

impl fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceValue::Bool(b) => write!(f, "{}", b),
            DeviceValue::Int(i) => write!(f, "{}", i),
            DeviceValue::Float(fl) => write!(f, "{}", fl),
            DeviceValue::String(s) => write!(f, "{}", s),
            DeviceValue::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            DeviceValue::Object(raw) => write!(f, "{}", raw),
            DeviceValue::Null => write!(f, "null"),
        }
    }
}

impl DeviceValue {
    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            DeviceValue::Bool(_) => "bool",
            DeviceValue::Int(_) => "int",
            DeviceValue::Float(_) => "float",
            DeviceValue::String(_) => "string",
            DeviceValue::Array(_) => "array",
            DeviceValue::Object(_) => "object",
            DeviceValue::Null => "null",
        }
    }

    /// Returns the value if it is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DeviceValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integers only. `3.0` is a float, not an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DeviceValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a double. Integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DeviceValue::Float(f) => Some(*f),
            DeviceValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the value if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DeviceValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the items if the value is an array.
    pub fn as_array(&self) -> Option<&[DeviceValue]> {
        match self {
            DeviceValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Convert a JSON `Value` field from a protocol envelope.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DeviceValue::Null,
            serde_json::Value::Bool(b) => DeviceValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => DeviceValue::Int(i),
                None => DeviceValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => DeviceValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                DeviceValue::Array(items.iter().map(DeviceValue::from_json).collect())
            }
            // Keep the raw text so the facade can report it as an invalid response
            serde_json::Value::Object(_) => DeviceValue::Object(value.to_string()),
        }
    }

    /// Text form used for form-encoded protocol parameters.
    pub fn to_wire(&self) -> String {
        match self {
            DeviceValue::Bool(true) => "True".to_string(),
            DeviceValue::Bool(false) => "False".to_string(),
            DeviceValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl From<bool> for DeviceValue {
    fn from(value: bool) -> Self {
        DeviceValue::Bool(value)
    }
}

impl From<i64> for DeviceValue {
    fn from(value: i64) -> Self {
        DeviceValue::Int(value)
    }
}

impl From<i32> for DeviceValue {
    fn from(value: i32) -> Self {
        DeviceValue::Int(value as i64)
    }
}

impl From<i16> for DeviceValue {
    fn from(value: i16) -> Self {
        DeviceValue::Int(value as i64)
    }
}

impl From<f64> for DeviceValue {
    fn from(value: f64) -> Self {
        DeviceValue::Float(value)
    }
}

impl From<&str> for DeviceValue {
    fn from(value: &str) -> Self {
        DeviceValue::String(value.to_string())
    }
}

impl From<String> for DeviceValue {
    fn from(value: String) -> Self {
        DeviceValue::String(value)
    }
}

impl From<Vec<i32>> for DeviceValue {
    fn from(value: Vec<i32>) -> Self {
        DeviceValue::Array(value.into_iter().map(DeviceValue::from).collect())
    }
}

impl From<Vec<String>> for DeviceValue {
    fn from(value: Vec<String>) -> Self {
        DeviceValue::Array(value.into_iter().map(DeviceValue::from).collect())
    }
}

/// Named argument of a property write or method call, e.g. `Position=2`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: DeviceValue,
}

impl Argument {
    /// Create an argument.
    pub fn new(name: impl Into<String>, value: impl Into<DeviceValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Find an argument by name (protocol parameter names are case-insensitive).
pub fn find_argument<'a>(args: &'a [Argument], name: &str) -> Option<&'a DeviceValue> {
    args.iter()
        .find(|a| a.name.eq_ignore_ascii_case(name))
        .map(|a| &a.value)
}
