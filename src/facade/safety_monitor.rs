use crate::error::FacadeError;

use super::DeviceConnection;

/// SafetyMonitor interface.
#[derive(Clone)]
pub struct SafetyMonitorFacade {
    conn: DeviceConnection,
}

impl SafetyMonitorFacade {
    /// Wrap a connection.
    pub fn new(conn: DeviceConnection) -> Self {
        Self { conn }
    }

    /// Members every interface shares.
    pub fn common(&self) -> &DeviceConnection {
        &self.conn
    }

    /// Whether conditions are safe.
    pub async fn is_safe(&self) -> Result<bool, FacadeError> {
        self.conn.get_bool("IsSafe").await
    }
}
