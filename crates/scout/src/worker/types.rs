//! Worker task and state types

use std::sync::mpsc::Sender;

use scout_model::{Signal, SignalValue};

use crate::adapter::ControlParams;
use crate::control::{ControlAction, ControlError, ControlState};

/// An action queued to a device's worker
#[derive(Debug)]
pub enum WorkerTask {
    /// Read one signal
    Read {
        signal: Signal,
        reply: Option<Sender<TaskOutcome>>,
    },
    /// Write a value
    Write {
        signal: Signal,
        value: SignalValue,
        reply: Option<Sender<TaskOutcome>>,
    },
    /// Select, operate, cancel or a full command on a control object
    Control {
        action: ControlAction,
        signal: Signal,
        value: Option<SignalValue>,
        params: ControlParams,
        reply: Option<Sender<TaskOutcome>>,
    },
}

impl WorkerTask {
    pub fn read(signal: Signal) -> Self {
        WorkerTask::Read { signal, reply: None }
    }

    pub fn write(signal: Signal, value: SignalValue) -> Self {
        WorkerTask::Write {
            signal,
            value,
            reply: None,
        }
    }

    pub fn control(action: ControlAction, signal: Signal, value: Option<SignalValue>, params: ControlParams) -> Self {
        WorkerTask::Control {
            action,
            signal,
            value,
            params,
            reply: None,
        }
    }

    /// Attach a reply channel
    pub fn with_reply(mut self, tx: Sender<TaskOutcome>) -> Self {
        match &mut self {
            WorkerTask::Read { reply, .. } | WorkerTask::Write { reply, .. } | WorkerTask::Control { reply, .. } => {
                *reply = Some(tx);
            }
        }
        self
    }

    /// Task name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerTask::Read { .. } => "read",
            WorkerTask::Write { .. } => "write",
            WorkerTask::Control { action, .. } => action.as_str(),
        }
    }
}

/// Result of a worker task, sent back on the task's reply channel
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The signal as read; failed reads carry a bad quality and an error
    Read(Signal),
    /// Whether the write was accepted
    Written(bool),
    /// State of the control object after the action
    Control(Result<ControlState, ControlError>),
}

/// Lifecycle of a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl WorkerState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        *self == WorkerState::Running
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Stopping => write!(f, "stopping"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}
