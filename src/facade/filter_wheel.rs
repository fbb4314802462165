use crate::error::FacadeError;

use super::DeviceConnection;

/// FilterWheel interface.
#[derive(Clone)]
pub struct FilterWheelFacade {
    conn: DeviceConnection,
}

impl FilterWheelFacade {
    /// Wrap a connection.
    pub fn new(conn: DeviceConnection) -> Self {
        Self { conn }
    }

    /// Members every interface shares.
    pub fn common(&self) -> &DeviceConnection {
        &self.conn
    }

    /// Focus offset of each filter slot, in focuser steps.
    pub async fn focus_offsets(&self) -> Result<Vec<i32>, FacadeError> {
        self.conn.get_i32_array("FocusOffsets").await
    }

    /// Name of each filter slot.
    pub async fn names(&self) -> Result<Vec<String>, FacadeError> {
        self.conn.get_string_array("Names").await
    }

    /// Current slot, or -1 while the wheel is moving.
    pub async fn position(&self) -> Result<i16, FacadeError> {
        self.conn.get_i16("Position").await
    }

    /// Start a move to `position`. Returns as soon as the driver accepts the request.
    pub async fn set_position(&self, position: i16) -> Result<(), FacadeError> {
        self.conn.set("Position", position).await
    }
}
