use std::fmt;

use crate::error::{DriverError, Result};

/// Machine state as seen by the host tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    None,
    Running,
    Paused,
    Stopped,
    Error,
}

impl MachineState {
    /// Map a remote lifecycle state. Unknown states are an error, never a default.
    pub fn from_remote(state: &str) -> Result<Self> {
        match state {
            "NOSTATE" => Ok(Self::None),
            "AVAILABLE" => Ok(Self::Running),
            "PAUSED" => Ok(Self::Paused),
            "BLOCKED" | "SHUTDOWN" | "SHUTOFF" | "INACTIVE" => Ok(Self::Stopped),
            "CRASHED" => Ok(Self::Error),
            other => Err(DriverError::ServerState(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
