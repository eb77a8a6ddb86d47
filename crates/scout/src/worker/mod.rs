//! Protocol Workers
//!
//! Per-device task queues executing reads, writes and control actions, and
//! driving throttled polling of subscribed signals.

mod protocol;
mod types;

pub use protocol::{spawn_worker, SignalIndex, WorkerConfig, WorkerContext, WorkerHandle};
pub use types::{TaskOutcome, WorkerState, WorkerTask};
