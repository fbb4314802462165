use crate::core::Argument;
use crate::error::FacadeError;

use super::DeviceConnection;

/// Focuser interface.
#[derive(Clone)]
pub struct FocuserFacade {
    conn: DeviceConnection,
}

impl FocuserFacade {
    /// Wrap a connection.
    pub fn new(conn: DeviceConnection) -> Self {
        Self { conn }
    }

    /// Members every interface shares.
    pub fn common(&self) -> &DeviceConnection {
        &self.conn
    }

    /// True for absolute positioning, false for relative.
    pub async fn absolute(&self) -> Result<bool, FacadeError> {
        self.conn.get_bool("Absolute").await
    }

    /// True while a move is in progress.
    pub async fn is_moving(&self) -> Result<bool, FacadeError> {
        self.conn.get_bool("IsMoving").await
    }

    /// Largest single move, in steps.
    pub async fn max_increment(&self) -> Result<i32, FacadeError> {
        self.conn.get_i32("MaxIncrement").await
    }

    /// Highest position an absolute focuser reaches.
    pub async fn max_step(&self) -> Result<i32, FacadeError> {
        self.conn.get_i32("MaxStep").await
    }

    /// Current position, in steps.
    pub async fn position(&self) -> Result<i32, FacadeError> {
        self.conn.get_i32("Position").await
    }

    /// Step size in microns.
    pub async fn step_size(&self) -> Result<f64, FacadeError> {
        self.conn.get_f64("StepSize").await
    }

    /// Whether temperature compensation is on.
    pub async fn temp_comp(&self) -> Result<bool, FacadeError> {
        self.conn.get_bool("TempComp").await
    }

    /// Turn temperature compensation on or off.
    pub async fn set_temp_comp(&self, enabled: bool) -> Result<(), FacadeError> {
        self.conn.set("TempComp", enabled).await
    }

    /// Whether temperature compensation exists.
    pub async fn temp_comp_available(&self) -> Result<bool, FacadeError> {
        self.conn.get_bool("TempCompAvailable").await
    }

    /// Ambient temperature in degrees Celsius.
    pub async fn temperature(&self) -> Result<f64, FacadeError> {
        self.conn.get_f64("Temperature").await
    }

    /// Stop any move in progress.
    pub async fn halt(&self) -> Result<(), FacadeError> {
        self.conn.put("Halt", &[]).await.map(|_| ())
    }

    /// Start a move to an absolute step position.
    pub async fn move_to(&self, position: i32) -> Result<(), FacadeError> {
        self.conn
            .put("Move", &[Argument::new("Position", position)])
            .await
            .map(|_| ())
    }
}
