//! Protocol Adapters
//!
//! The wire-level protocol clients are collaborators; the engine talks to
//! them through [`ProtocolAdapter`]. Optional abilities are separate traits
//! exposed through capability accessors, so "can this adapter write?" is a
//! type question answered at compile time by the implementor.

mod factory;
mod offline;
mod sim;

pub use factory::{AdapterConstructor, AdapterFactory};
pub use offline::{offline_model, ConfiguredModel, OfflineModel};
pub use sim::SimulatedAdapter;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use scout_model::{Node, Signal, SignalValue};

use crate::control::ControlModel;
use crate::events::{EventBus, RegistryEvent};

/// Result type for adapter calls
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Protocol call failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("Not connected")]
    NotConnected,

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Rejected by device: {0}")]
    Rejected(String),

    #[error("Timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Optional parameter bag of control calls
///
/// `Default` is the zero value: callers that do not care pass
/// `ControlParams::default()` and the engine fills in its configured
/// originator and SBO timeout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlParams {
    /// Originator category (orCat); 0 means "use configured default"
    pub originator_category: i32,
    /// Originator identity (orIdent); empty means "use configured default"
    pub originator_identity: String,
    pub test: bool,
    pub interlock_check: bool,
    pub synchro_check: bool,
    /// SBO timeout in milliseconds; 0 means "use configured default"
    pub sbo_timeout_ms: u64,
    /// Control sequence number, filled in by the control context
    pub ctl_num: u8,
}

// ─────────────────────────────────────────────────────────────────────────────
// Update Sink
// ─────────────────────────────────────────────────────────────────────────────

/// Where an adapter publishes unsolicited signal updates (reports, GOOSE)
///
/// Clones share the device name, so the registry can rename a device
/// without reaching into its adapter.
#[derive(Clone)]
pub struct UpdateSink {
    device: Arc<RwLock<String>>,
    bus: Arc<EventBus>,
}

impl UpdateSink {
    pub fn new(device: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            device: Arc::new(RwLock::new(device.into())),
            bus,
        }
    }

    pub fn device(&self) -> String {
        self.device.read().clone()
    }

    /// Updates published from now on use the new name
    pub fn rename(&self, device: &str) {
        *self.device.write() = device.to_string();
    }

    pub fn publish(&self, signal: Signal) {
        self.bus.publish(RegistryEvent::SignalUpdated {
            device: self.device(),
            signal,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

/// Required surface of every protocol adapter
pub trait ProtocolAdapter: Send {
    fn connect(&mut self) -> AdapterResult<()>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Build the device's signal tree
    ///
    /// Failures are reported as a placeholder error node, never as an error.
    fn discover(&mut self) -> Node;

    /// Read one signal; the returned signal carries the new value and quality
    fn read_signal(&mut self, signal: &Signal) -> AdapterResult<Signal>;

    /// Attach the sink for unsolicited updates; called again after a rename
    fn set_update_sink(&mut self, _sink: UpdateSink) {}

    /// Write capability, if the protocol supports it
    fn writer(&mut self) -> Option<&mut dyn SignalWriter> {
        None
    }

    /// Control capability, if the protocol supports it
    fn controller(&mut self) -> Option<&mut dyn ControlCapability> {
        None
    }
}

/// Writing values to signals
pub trait SignalWriter {
    fn write_signal(&mut self, signal: &Signal, value: &SignalValue) -> AdapterResult<()>;
}

/// Select-Before-Operate and direct control
pub trait ControlCapability {
    /// Control model configured for a control object, if the adapter knows it
    fn control_model(&mut self, _object_ref: &str) -> Option<ControlModel> {
        None
    }

    /// Whether the object behind `address` accepts control at all
    fn check_control_model(&mut self, _address: &str) -> bool {
        true
    }

    fn select(&mut self, signal: &Signal, value: Option<&SignalValue>, params: &ControlParams) -> AdapterResult<()>;

    fn operate(&mut self, signal: &Signal, value: &SignalValue, params: &ControlParams) -> AdapterResult<()>;

    fn cancel(&mut self, signal: &Signal, params: &ControlParams) -> AdapterResult<()>;
}

/// An adapter shared between the registry, the parse pool and the device's
/// worker. The mutex keeps protocol calls for one device strictly serial.
pub type SharedAdapter = Arc<Mutex<Box<dyn ProtocolAdapter>>>;

pub fn share(adapter: Box<dyn ProtocolAdapter>) -> SharedAdapter {
    Arc::new(Mutex::new(adapter))
}
