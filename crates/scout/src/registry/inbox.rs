//! Messages handed back to the registry's owning context
//!
//! Background threads never touch the device maps. They post here and the
//! owner applies the results in [`DeviceRegistry::process_pending`].
//!
//! [`DeviceRegistry::process_pending`]: super::DeviceRegistry::process_pending

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use scout_model::{Node, Signal};
use uuid::Uuid;

use crate::adapter::AdapterError;

/// Stable device identity; survives renames
pub type DeviceId = Uuid;

#[derive(Debug)]
pub enum RegistryMessage {
    /// Offline discovery finished on the parse pool
    ParseCompleted {
        device: DeviceId,
        /// Discovery request this result answers
        seq: u64,
        root: Node,
    },
    /// Connection attempt and online discovery finished
    ConnectFinished {
        device: DeviceId,
        seq: u64,
        result: Result<Node, AdapterError>,
    },
    /// A worker finished a poll cycle
    PollCompleted {
        device: DeviceId,
        at: DateTime<Utc>,
        signals: Vec<Signal>,
    },
    /// A watched SCL file changed on disk
    SclFileChanged { path: PathBuf },
}
