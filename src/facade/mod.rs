//! Device facades.
//!
//! A facade re-exposes exactly the members of one device interface and forwards
//! each call to the underlying [`DriverHandle`]. It never caches, retries or
//! pre-checks support: the point is to observe the driver's real behaviour.
//! The only thing a facade adds is translation at the seam:
//!
//! ```text
//! check --> FilterWheelFacade::position() --> DeviceConnection::get("Position")
//!                                               |-- timeout      -> ErrorKind::Timeout
//!                                               |-- TransportError -> translator(transport)
//!                                               `-- wrong type   -> ErrorKind::InvalidResponse
//! ```
//!
//! Facades are created by a [`FacadeFactory`] keyed on
//! `(DeviceCategory, TransportKind)`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::core::{Argument, DeviceCategory, DeviceValue, TransportKind};
use crate::driver::{codes, DriverHandle, LocalDriverError, TransportError};
use crate::error::{CheckError, ConformError, ErrorKind, FacadeError};

/// FilterWheel facade.
pub mod filter_wheel;
/// Focuser facade.
pub mod focuser;
/// SafetyMonitor facade.
pub mod safety_monitor;

pub use filter_wheel::FilterWheelFacade;
pub use focuser::FocuserFacade;
pub use safety_monitor::SafetyMonitorFacade;

type Translator = fn(&str, TransportError) -> FacadeError;

fn classify_code(code: i32) -> ErrorKind {
    match code {
        codes::NOT_IMPLEMENTED | codes::ACTION_NOT_IMPLEMENTED => ErrorKind::Unsupported,
        codes::INVALID_VALUE => ErrorKind::InvalidValue,
        _ => ErrorKind::DriverError,
    }
}

fn translate_network(member: &str, err: TransportError) -> FacadeError {
    let kind = match &err {
        TransportError::Device { code, .. } => classify_code(*code),
        TransportError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
        TransportError::TimedOut(_) => ErrorKind::Timeout,
        TransportError::Local(e) => classify_code(e.code()),
        TransportError::Http(_)
        | TransportError::Status { .. }
        | TransportError::Malformed(_)
        | TransportError::Released
        | TransportError::Panicked(_)
        | TransportError::Connect(_) => ErrorKind::TransportFailure,
    };
    FacadeError::new(kind, member, err.to_string())
}

fn translate_local(member: &str, err: TransportError) -> FacadeError {
    let kind = match &err {
        TransportError::Local(LocalDriverError::UnknownDriver(_)) => ErrorKind::TransportFailure,
        TransportError::Local(e) => classify_code(e.code()),
        TransportError::Device { code, .. } => classify_code(*code),
        TransportError::TimedOut(_) => ErrorKind::Timeout,
        _ => ErrorKind::TransportFailure,
    };
    FacadeError::new(kind, member, err.to_string())
}

fn translator(transport: TransportKind) -> Translator {
    match transport {
        TransportKind::LocalInterop => translate_local,
        TransportKind::NetworkProtocol => translate_network,
    }
}

fn wrong_type(member: &str, expected: &str, value: &DeviceValue) -> FacadeError {
    FacadeError::invalid_response(
        member,
        format!("expected {}, got {} ({})", expected, value.type_name(), value),
    )
}

/// Forwarding layer shared by every facade: one driver handle, the translator for
/// its transport and the per-call timeout. Also carries the members every device
/// interface has in common.
#[derive(Clone)]
pub struct DeviceConnection {
    handle: Arc<dyn DriverHandle>,
    transport: TransportKind,
    translate: Translator,
    call_timeout: Duration,
}

impl DeviceConnection {
    /// Wrap `handle`, bounding every call by `call_timeout`.
    pub fn new(handle: Arc<dyn DriverHandle>, transport: TransportKind, call_timeout: Duration) -> Self {
        Self {
            handle,
            transport,
            translate: translator(transport),
            call_timeout,
        }
    }

    /// Transport this connection forwards to.
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Identity of the underlying handle.
    pub fn describe(&self) -> String {
        self.handle.describe()
    }

    async fn call(&self, write: bool, member: &str, args: &[Argument]) -> Result<DeviceValue, FacadeError> {
        debug!(member, write, "device call");
        let call = async {
            if write {
                self.handle.put(member, args).await
            } else {
                self.handle.get(member, args).await
            }
        };
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err((self.translate)(member, err)),
            Err(_) => Err(FacadeError::new(
                ErrorKind::Timeout,
                member,
                format!("no response within {:?}", self.call_timeout),
            )),
        }
    }

    /// Read a property.
    pub async fn get(&self, member: &str) -> Result<DeviceValue, FacadeError> {
        self.call(false, member, &[]).await
    }

    /// Write a property or invoke a method.
    pub async fn put(&self, member: &str, args: &[Argument]) -> Result<DeviceValue, FacadeError> {
        self.call(true, member, args).await
    }

    /// Write a property whose single argument carries the property's own name.
    pub async fn set(&self, member: &str, value: impl Into<DeviceValue>) -> Result<(), FacadeError> {
        self.put(member, &[Argument::new(member, value)]).await.map(|_| ())
    }

    /// Read a bool property.
    pub async fn get_bool(&self, member: &str) -> Result<bool, FacadeError> {
        let value = self.get(member).await?;
        value.as_bool().ok_or_else(|| wrong_type(member, "bool", &value))
    }

    /// Read an integer property.
    pub async fn get_i64(&self, member: &str) -> Result<i64, FacadeError> {
        let value = self.get(member).await?;
        value.as_i64().ok_or_else(|| wrong_type(member, "integer", &value))
    }

    /// Read a 32-bit integer property.
    pub async fn get_i32(&self, member: &str) -> Result<i32, FacadeError> {
        let raw = self.get_i64(member).await?;
        i32::try_from(raw).map_err(|_| {
            FacadeError::invalid_response(member, format!("{} does not fit in a 32-bit integer", raw))
        })
    }

    /// Read a 16-bit integer property.
    pub async fn get_i16(&self, member: &str) -> Result<i16, FacadeError> {
        let raw = self.get_i64(member).await?;
        i16::try_from(raw).map_err(|_| {
            FacadeError::invalid_response(member, format!("{} does not fit in a 16-bit integer", raw))
        })
    }

    /// Read a double property. Integers are accepted.
    pub async fn get_f64(&self, member: &str) -> Result<f64, FacadeError> {
        let value = self.get(member).await?;
        value.as_f64().ok_or_else(|| wrong_type(member, "number", &value))
    }

    /// Read a string property.
    pub async fn get_string(&self, member: &str) -> Result<String, FacadeError> {
        let value = self.get(member).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| wrong_type(member, "string", &value))
    }

    /// Read a string array property.
    pub async fn get_string_array(&self, member: &str) -> Result<Vec<String>, FacadeError> {
        let value = self.get(member).await?;
        value
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| wrong_type(member, "string array", &value))
    }

    /// Read a 32-bit integer array property.
    pub async fn get_i32_array(&self, member: &str) -> Result<Vec<i32>, FacadeError> {
        let value = self.get(member).await?;
        value
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .map(|v| v.as_i64().and_then(|i| i32::try_from(i).ok()))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| wrong_type(member, "integer array", &value))
    }

    // Members common to every device interface

    /// Whether the driver is connected to its hardware.
    pub async fn connected(&self) -> Result<bool, FacadeError> {
        self.get_bool("Connected").await
    }

    /// Connect or disconnect the hardware.
    pub async fn set_connected(&self, connected: bool) -> Result<(), FacadeError> {
        self.set("Connected", connected).await
    }

    /// Description of the device.
    pub async fn description(&self) -> Result<String, FacadeError> {
        self.get_string("Description").await
    }

    /// Description of the driver.
    pub async fn driver_info(&self) -> Result<String, FacadeError> {
        self.get_string("DriverInfo").await
    }

    /// Driver version string.
    pub async fn driver_version(&self) -> Result<String, FacadeError> {
        self.get_string("DriverVersion").await
    }

    /// Version of the interface the driver implements.
    pub async fn interface_version(&self) -> Result<i16, FacadeError> {
        self.get_i16("InterfaceVersion").await
    }

    /// Short display name.
    pub async fn name(&self) -> Result<String, FacadeError> {
        self.get_string("Name").await
    }

    /// Actions accepted by [`DeviceConnection::action`].
    pub async fn supported_actions(&self) -> Result<Vec<String>, FacadeError> {
        self.get_string_array("SupportedActions").await
    }

    /// Invoke a named driver-specific action.
    pub async fn action(&self, action: &str, parameters: &str) -> Result<String, FacadeError> {
        let value = self
            .put(
                "Action",
                &[
                    Argument::new("Action", action),
                    Argument::new("Parameters", parameters),
                ],
            )
            .await?;
        match value {
            DeviceValue::String(s) => Ok(s),
            DeviceValue::Null => Ok(String::new()),
            other => Err(wrong_type("Action", "string", &other)),
        }
    }

    /// Send a command that returns nothing.
    pub async fn command_blind(&self, command: &str, raw: bool) -> Result<(), FacadeError> {
        self.put(
            "CommandBlind",
            &[Argument::new("Command", command), Argument::new("Raw", raw)],
        )
        .await
        .map(|_| ())
    }

    /// Send a command that returns a bool.
    pub async fn command_bool(&self, command: &str, raw: bool) -> Result<bool, FacadeError> {
        let value = self
            .put(
                "CommandBool",
                &[Argument::new("Command", command), Argument::new("Raw", raw)],
            )
            .await?;
        value
            .as_bool()
            .ok_or_else(|| wrong_type("CommandBool", "bool", &value))
    }

    /// Send a command that returns a string.
    pub async fn command_string(&self, command: &str, raw: bool) -> Result<String, FacadeError> {
        let value = self
            .put(
                "CommandString",
                &[Argument::new("Command", command), Argument::new("Raw", raw)],
            )
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| wrong_type("CommandString", "string", &value))
    }
}

/// One facade per device category.
#[derive(Clone)]
pub enum DeviceFacade {
    /// FilterWheel interface.
    FilterWheel(FilterWheelFacade),
    /// Focuser interface.
    Focuser(FocuserFacade),
    /// SafetyMonitor interface.
    SafetyMonitor(SafetyMonitorFacade),
}

impl DeviceFacade {
    /// Category this facade implements.
    pub fn category(&self) -> DeviceCategory {
        match self {
            DeviceFacade::FilterWheel(_) => DeviceCategory::FilterWheel,
            DeviceFacade::Focuser(_) => DeviceCategory::Focuser,
            DeviceFacade::SafetyMonitor(_) => DeviceCategory::SafetyMonitor,
        }
    }

    /// Members every interface shares.
    pub fn common(&self) -> &DeviceConnection {
        match self {
            DeviceFacade::FilterWheel(f) => f.common(),
            DeviceFacade::Focuser(f) => f.common(),
            DeviceFacade::SafetyMonitor(f) => f.common(),
        }
    }

    /// The FilterWheel facade, or a harness error for any other category.
    pub fn filter_wheel(&self) -> Result<&FilterWheelFacade, CheckError> {
        match self {
            DeviceFacade::FilterWheel(f) => Ok(f),
            other => Err(mismatch(DeviceCategory::FilterWheel, other.category())),
        }
    }

    /// The Focuser facade, or a harness error for any other category.
    pub fn focuser(&self) -> Result<&FocuserFacade, CheckError> {
        match self {
            DeviceFacade::Focuser(f) => Ok(f),
            other => Err(mismatch(DeviceCategory::Focuser, other.category())),
        }
    }

    /// The SafetyMonitor facade, or a harness error for any other category.
    pub fn safety_monitor(&self) -> Result<&SafetyMonitorFacade, CheckError> {
        match self {
            DeviceFacade::SafetyMonitor(f) => Ok(f),
            other => Err(mismatch(DeviceCategory::SafetyMonitor, other.category())),
        }
    }

    /// Bring the device to rest before disconnecting.
    pub async fn make_safe(&self) -> Result<(), FacadeError> {
        match self {
            DeviceFacade::Focuser(f) => match f.halt().await {
                Err(e) if e.is_unsupported() => Ok(()),
                other => other,
            },
            DeviceFacade::FilterWheel(_) | DeviceFacade::SafetyMonitor(_) => Ok(()),
        }
    }
}

fn mismatch(expected: DeviceCategory, actual: DeviceCategory) -> CheckError {
    CheckError::Harness(format!(
        "check written for a {} was run against a {} facade",
        expected, actual
    ))
}

type FacadeBuilder = fn(DeviceConnection) -> DeviceFacade;

/// Creates facades keyed on `(DeviceCategory, TransportKind)`.
#[derive(Clone, Default)]
pub struct FacadeFactory {
    builders: HashMap<(DeviceCategory, TransportKind), FacadeBuilder>,
}

impl FacadeFactory {
    /// Factory with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in category over both transports.
    pub fn standard() -> Self {
        let mut factory = Self::empty();
        for transport in [TransportKind::LocalInterop, TransportKind::NetworkProtocol] {
            factory.register(DeviceCategory::FilterWheel, transport, |c| {
                DeviceFacade::FilterWheel(FilterWheelFacade::new(c))
            });
            factory.register(DeviceCategory::Focuser, transport, |c| {
                DeviceFacade::Focuser(FocuserFacade::new(c))
            });
            factory.register(DeviceCategory::SafetyMonitor, transport, |c| {
                DeviceFacade::SafetyMonitor(SafetyMonitorFacade::new(c))
            });
        }
        factory
    }

    /// Register `builder` for a category and transport, replacing any earlier entry.
    pub fn register(&mut self, category: DeviceCategory, transport: TransportKind, builder: FacadeBuilder) {
        self.builders.insert((category, transport), builder);
    }

    /// Build the facade for `category` over `handle`.
    pub fn create(
        &self,
        category: DeviceCategory,
        transport: TransportKind,
        handle: Arc<dyn DriverHandle>,
        call_timeout: Duration,
    ) -> Result<DeviceFacade, ConformError> {
        let builder = self
            .builders
            .get(&(category, transport))
            .ok_or(ConformError::NoFacade { category, transport })?;
        Ok(builder(DeviceConnection::new(handle, transport, call_timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Answers every read with the same value.
    struct Fixed(DeviceValue);

    #[async_trait]
    impl DriverHandle for Fixed {
        fn transport(&self) -> TransportKind {
            TransportKind::NetworkProtocol
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }

        async fn get(&self, _member: &str, _args: &[Argument]) -> Result<DeviceValue, TransportError> {
            Ok(self.0.clone())
        }

        async fn put(&self, _member: &str, _args: &[Argument]) -> Result<DeviceValue, TransportError> {
            Ok(DeviceValue::Null)
        }

        fn release(&self) {}
    }

    fn answering(json: serde_json::Value) -> DeviceConnection {
        DeviceConnection::new(
            Arc::new(Fixed(DeviceValue::from_json(&json))),
            TransportKind::NetworkProtocol,
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_object_is_not_a_string() {
        let conn = answering(serde_json::json!({ "oops": 1 }));
        let err = conn.name().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
        assert_eq!(err.member, "Name");
        assert!(err.message.contains("object"));
        assert_eq!(conn.description().await.unwrap_err().kind, ErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_float_is_not_an_integer() {
        let conn = answering(serde_json::json!(3.0));
        let err = conn.interface_version().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
        assert_eq!(err.member, "InterfaceVersion");
        assert!(err.message.contains("float"));

        let conn = answering(serde_json::json!([0, 10.0]));
        assert_eq!(
            conn.get_i32_array("FocusOffsets").await.unwrap_err().kind,
            ErrorKind::InvalidResponse
        );

        // Numbers stay acceptable where a double is expected
        assert_eq!(answering(serde_json::json!(3)).get_f64("Temperature").await.unwrap(), 3.0);
    }

    #[test]
    fn test_network_translation() {
        let err = translate_network(
            "Names",
            TransportError::Device {
                code: codes::NOT_IMPLEMENTED,
                message: "Names is not implemented".to_string(),
            },
        );
        assert_eq!(err.kind, ErrorKind::Unsupported);
        assert_eq!(err.member, "Names");
        assert!(err.message.contains("not implemented"));

        let err = translate_network("Position", TransportError::Malformed("{".to_string()));
        assert_eq!(err.kind, ErrorKind::TransportFailure);

        let err = translate_network(
            "Position",
            TransportError::Device {
                code: codes::INVALID_VALUE,
                message: "bad".to_string(),
            },
        );
        assert_eq!(err.kind, ErrorKind::InvalidValue);

        let err = translate_network(
            "Position",
            TransportError::Device {
                code: codes::NOT_CONNECTED,
                message: "not connected".to_string(),
            },
        );
        assert_eq!(err.kind, ErrorKind::DriverError);
    }

    #[test]
    fn test_local_translation() {
        let err = translate_local(
            "TempComp",
            TransportError::Local(LocalDriverError::not_implemented("TempComp")),
        );
        assert_eq!(err.kind, ErrorKind::Unsupported);

        let err = translate_local("Move", TransportError::Panicked("boom".to_string()));
        assert_eq!(err.kind, ErrorKind::TransportFailure);
    }

    #[test]
    fn test_factory_lookup() {
        let factory = FacadeFactory::standard();
        let handle: Arc<dyn DriverHandle> = Arc::new(crate::driver::LocalHandle::new(
            "Simulator.SafetyMonitor",
            Box::new(crate::driver::simulator::SimulatedSafetyMonitor::new()),
        ));
        let facade = factory
            .create(
                DeviceCategory::SafetyMonitor,
                TransportKind::LocalInterop,
                Arc::clone(&handle),
                Duration::from_secs(1),
            )
            .unwrap();
        assert_eq!(facade.category(), DeviceCategory::SafetyMonitor);
        assert!(facade.filter_wheel().is_err());

        let missing = FacadeFactory::empty().create(
            DeviceCategory::Focuser,
            TransportKind::NetworkProtocol,
            handle,
            Duration::from_secs(1),
        );
        assert!(matches!(missing, Err(ConformError::NoFacade { .. })));
    }
}
