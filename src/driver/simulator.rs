//! Simulated in-process devices.
//!
//! Registered under `Simulator.FilterWheel`, `Simulator.Focuser` and
//! `Simulator.SafetyMonitor`. Motion uses wall-clock timing rather than sleeping,
//! so reads issued during a move observe the in-progress state:
//!
//! - FilterWheel: 150ms per slot travelled, `Position` reads -1 while moving
//! - Focuser: 5000 steps/sec, `IsMoving` is true until the target is reached

use std::time::{Duration, Instant};

use super::local::{LocalDriver, LocalDriverError, LocalDriverRegistry};
use crate::core::{find_argument, Argument, DeviceValue};

/// Register every simulator with a registry.
pub fn register_simulators(registry: &mut LocalDriverRegistry) {
    registry.register("Simulator.FilterWheel", |_| {
        Ok(Box::new(SimulatedFilterWheel::new()))
    });
    registry.register("Simulator.Focuser", |_| Ok(Box::new(SimulatedFocuser::new())));
    registry.register("Simulator.SafetyMonitor", |_| {
        Ok(Box::new(SimulatedSafetyMonitor::new()))
    });
}

const ECHO_ACTION: &str = "Simulator:Echo";

/// State and behaviour shared by every simulated device.
#[derive(Debug, Clone)]
struct CommonMembers {
    connected: bool,
    name: &'static str,
    description: &'static str,
    interface_version: i64,
}

impl CommonMembers {
    fn new(name: &'static str, description: &'static str, interface_version: i64) -> Self {
        Self {
            connected: false,
            name,
            description,
            interface_version,
        }
    }

    fn get(&self, member: &str) -> Option<Result<DeviceValue, LocalDriverError>> {
        let value = match member.to_ascii_lowercase().as_str() {
            "connected" => DeviceValue::Bool(self.connected),
            "name" => DeviceValue::from(self.name),
            "description" => DeviceValue::from(self.description),
            "driverinfo" => DeviceValue::from(format!(
                "{} simulator, rust_conform {}",
                self.name,
                env!("CARGO_PKG_VERSION")
            )),
            "driverversion" => DeviceValue::from(env!("CARGO_PKG_VERSION")),
            "interfaceversion" => DeviceValue::Int(self.interface_version),
            "supportedactions" => DeviceValue::Array(vec![DeviceValue::from(ECHO_ACTION)]),
            _ => return None,
        };
        Some(Ok(value))
    }

    fn put(
        &mut self,
        member: &str,
        args: &[Argument],
    ) -> Option<Result<DeviceValue, LocalDriverError>> {
        let result = match member.to_ascii_lowercase().as_str() {
            "connected" => bool_argument(member, args, "Connected").map(|connected| {
                self.connected = connected;
                DeviceValue::Null
            }),
            "action" => {
                let action = find_argument(args, "Action").and_then(DeviceValue::as_str);
                match action {
                    Some(a) if a.eq_ignore_ascii_case(ECHO_ACTION) => Ok(find_argument(
                        args,
                        "Parameters",
                    )
                    .cloned()
                    .unwrap_or_else(|| DeviceValue::from(""))),
                    Some(a) => Err(LocalDriverError::Driver {
                        code: super::codes::ACTION_NOT_IMPLEMENTED,
                        message: format!("action '{}' is not supported", a),
                    }),
                    None => Err(LocalDriverError::invalid_value(member, "missing Action")),
                }
            }
            "commandblind" | "commandbool" | "commandstring" => {
                Err(LocalDriverError::not_implemented(member))
            }
            _ => return None,
        };
        Some(result)
    }

    fn require_connected(&self, member: &str) -> Result<(), LocalDriverError> {
        if self.connected {
            Ok(())
        } else {
            Err(LocalDriverError::NotConnected {
                member: member.to_string(),
            })
        }
    }
}

fn bool_argument(member: &str, args: &[Argument], name: &str) -> Result<bool, LocalDriverError> {
    match find_argument(args, name) {
        Some(DeviceValue::Bool(b)) => Ok(*b),
        Some(DeviceValue::String(s)) => s
            .parse::<bool>()
            .or_else(|_| s.to_ascii_lowercase().parse::<bool>())
            .map_err(|_| LocalDriverError::invalid_value(member, format!("'{}' is not a boolean", s))),
        Some(other) => Err(LocalDriverError::invalid_value(
            member,
            format!("expected a boolean, got {}", other.type_name()),
        )),
        None => Err(LocalDriverError::invalid_value(member, format!("missing {}", name))),
    }
}

fn int_argument(member: &str, args: &[Argument], name: &str) -> Result<i64, LocalDriverError> {
    match find_argument(args, name) {
        Some(value) => value.as_i64().ok_or_else(|| {
            LocalDriverError::invalid_value(member, format!("'{}' is not an integer", value))
        }),
        None => Err(LocalDriverError::invalid_value(member, format!("missing {}", name))),
    }
}

// =============================================================================
// Filter wheel
// =============================================================================

/// Four-slot filter wheel.
#[derive(Debug, Clone)]
pub struct SimulatedFilterWheel {
    common: CommonMembers,
    names: Vec<String>,
    offsets: Vec<i32>,
    position: i16,
    moving_until: Option<Instant>,
    slot_time: Duration,
}

impl SimulatedFilterWheel {
    /// Four slot wheel at slot 0.
    pub fn new() -> Self {
        Self {
            common: CommonMembers::new("Filter Wheel Simulator", "Simulated four slot filter wheel", 2),
            names: ["Red", "Green", "Blue", "Clear"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            offsets: vec![100, 200, 300, 0],
            position: 0,
            moving_until: None,
            slot_time: Duration::from_millis(150),
        }
    }

    /// Change the travel time per slot.
    pub fn with_slot_time(mut self, slot_time: Duration) -> Self {
        self.slot_time = slot_time;
        self
    }

    fn current_position(&mut self) -> i16 {
        match self.moving_until {
            Some(until) if Instant::now() < until => -1,
            Some(_) => {
                self.moving_until = None;
                self.position
            }
            None => self.position,
        }
    }
}

impl Default for SimulatedFilterWheel {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalDriver for SimulatedFilterWheel {
    fn get(&mut self, member: &str, _args: &[Argument]) -> Result<DeviceValue, LocalDriverError> {
        if let Some(result) = self.common.get(member) {
            return result;
        }
        self.common.require_connected(member)?;
        match member.to_ascii_lowercase().as_str() {
            "focusoffsets" => Ok(DeviceValue::from(self.offsets.clone())),
            "names" => Ok(DeviceValue::from(self.names.clone())),
            "position" => Ok(DeviceValue::from(self.current_position())),
            _ => Err(LocalDriverError::not_implemented(member)),
        }
    }

    fn put(&mut self, member: &str, args: &[Argument]) -> Result<DeviceValue, LocalDriverError> {
        if let Some(result) = self.common.put(member, args) {
            return result;
        }
        self.common.require_connected(member)?;
        match member.to_ascii_lowercase().as_str() {
            "position" => {
                let target = int_argument(member, args, "Position")?;
                let slots = self.names.len() as i64;
                if !(0..slots).contains(&target) {
                    return Err(LocalDriverError::invalid_value(
                        member,
                        format!("{} is outside 0..{}", target, slots - 1),
                    ));
                }
                let from = self.current_position();
                let from = if from < 0 { self.position } else { from };
                let distance = (target - from as i64).unsigned_abs() as u32;
                self.position = target as i16;
                self.moving_until = Some(Instant::now() + self.slot_time * distance);
                Ok(DeviceValue::Null)
            }
            _ => Err(LocalDriverError::not_implemented(member)),
        }
    }
}

// =============================================================================
// Focuser
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct FocuserMove {
    from: i64,
    to: i64,
    started: Instant,
}

/// Absolute focuser with temperature compensation.
#[derive(Debug, Clone)]
pub struct SimulatedFocuser {
    common: CommonMembers,
    position: i64,
    max_step: i64,
    max_increment: i64,
    steps_per_sec: f64,
    temp_comp: bool,
    motion: Option<FocuserMove>,
}

impl SimulatedFocuser {
    /// Absolute focuser at mid travel.
    pub fn new() -> Self {
        Self {
            common: CommonMembers::new("Focuser Simulator", "Simulated absolute focuser", 3),
            position: 25_000,
            max_step: 50_000,
            max_increment: 50_000,
            steps_per_sec: 5_000.0,
            temp_comp: false,
            motion: None,
        }
    }

    fn update(&mut self) {
        if let Some(motion) = self.motion {
            let travelled = (motion.started.elapsed().as_secs_f64() * self.steps_per_sec) as i64;
            let distance = (motion.to - motion.from).abs();
            if travelled >= distance {
                self.position = motion.to;
                self.motion = None;
            } else {
                self.position = motion.from + travelled * (motion.to - motion.from).signum();
            }
        }
    }
}

impl Default for SimulatedFocuser {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalDriver for SimulatedFocuser {
    fn get(&mut self, member: &str, _args: &[Argument]) -> Result<DeviceValue, LocalDriverError> {
        if let Some(result) = self.common.get(member) {
            return result;
        }
        self.common.require_connected(member)?;
        self.update();
        match member.to_ascii_lowercase().as_str() {
            "absolute" => Ok(DeviceValue::Bool(true)),
            "ismoving" => Ok(DeviceValue::Bool(self.motion.is_some())),
            "maxincrement" => Ok(DeviceValue::Int(self.max_increment)),
            "maxstep" => Ok(DeviceValue::Int(self.max_step)),
            "position" => Ok(DeviceValue::Int(self.position)),
            "stepsize" => Ok(DeviceValue::Float(2.5)),
            "tempcomp" => Ok(DeviceValue::Bool(self.temp_comp)),
            "tempcompavailable" => Ok(DeviceValue::Bool(true)),
            "temperature" => Ok(DeviceValue::Float(8.5)),
            _ => Err(LocalDriverError::not_implemented(member)),
        }
    }

    fn put(&mut self, member: &str, args: &[Argument]) -> Result<DeviceValue, LocalDriverError> {
        if let Some(result) = self.common.put(member, args) {
            return result;
        }
        self.common.require_connected(member)?;
        self.update();
        match member.to_ascii_lowercase().as_str() {
            "tempcomp" => {
                self.temp_comp = bool_argument(member, args, "TempComp")?;
                Ok(DeviceValue::Null)
            }
            "halt" => {
                self.motion = None;
                Ok(DeviceValue::Null)
            }
            "move" => {
                let target = int_argument(member, args, "Position")?;
                if !(0..=self.max_step).contains(&target) {
                    return Err(LocalDriverError::invalid_value(
                        member,
                        format!("{} is outside 0..={}", target, self.max_step),
                    ));
                }
                if (target - self.position).abs() > self.max_increment {
                    return Err(LocalDriverError::invalid_value(
                        member,
                        format!("move of {} exceeds MaxIncrement", target - self.position),
                    ));
                }
                self.motion = Some(FocuserMove {
                    from: self.position,
                    to: target,
                    started: Instant::now(),
                });
                Ok(DeviceValue::Null)
            }
            _ => Err(LocalDriverError::not_implemented(member)),
        }
    }
}

// =============================================================================
// Safety monitor
// =============================================================================

/// Simulated safety monitor, safe while connected.
#[derive(Debug, Clone)]
pub struct SimulatedSafetyMonitor {
    common: CommonMembers,
    safe: bool,
}

impl SimulatedSafetyMonitor {
    /// Monitor reporting safe.
    pub fn new() -> Self {
        Self {
            common: CommonMembers::new("Safety Monitor Simulator", "Simulated safety monitor", 2),
            safe: true,
        }
    }
}

impl Default for SimulatedSafetyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalDriver for SimulatedSafetyMonitor {
    fn get(&mut self, member: &str, _args: &[Argument]) -> Result<DeviceValue, LocalDriverError> {
        if let Some(result) = self.common.get(member) {
            return result;
        }
        match member.to_ascii_lowercase().as_str() {
            // IsSafe reports false while disconnected rather than raising
            "issafe" => Ok(DeviceValue::Bool(self.common.connected && self.safe)),
            _ => Err(LocalDriverError::not_implemented(member)),
        }
    }

    fn put(&mut self, member: &str, args: &[Argument]) -> Result<DeviceValue, LocalDriverError> {
        match self.common.put(member, args) {
            Some(result) => result,
            None => Err(LocalDriverError::not_implemented(member)),
        }
    }
}
