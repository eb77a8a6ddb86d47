use serde::{Deserialize, Serialize};

use crate::adapter::AdapterError;
use crate::control::ControlError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Device already exists: {0}")]
    DeviceExists(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("No protocol adapter for {0}")]
    NoAdapter(String),

    #[error("No running worker for device {0}")]
    NoWorker(String),

    #[error("Worker for device {0} has stopped")]
    WorkerStopped(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SCL error: {0}")]
    Scl(#[from] scl_compiler::SclError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),
}

/// Device connection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}
