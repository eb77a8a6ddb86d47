//! Protocol worker thread
//!
//! One blocking thread per connected device. Queued tasks run strictly in
//! order and always before polling; polling only happens when the queue has
//! been empty for a whole tick and the poll interval has elapsed. The worker
//! is the only caller of its adapter while it runs, so there is never more
//! than one protocol call in flight per device.
//!
//! A stopping worker disconnects its adapter only if no newer connection has
//! been started on it in the meantime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use scout_model::{Signal, SignalQuality, SignalValue};

use super::types::{TaskOutcome, WorkerState, WorkerTask};
use crate::adapter::{AdapterError, ControlParams, SharedAdapter};
use crate::control::{
    control_object_ref, ControlAction, ControlContext, ControlDefaults, ControlError, ControlModel, ControlState,
};
use crate::events::{EventBus, RegistryEvent};
use crate::registry::{DeviceId, RegistryMessage};
use crate::subscriptions::{SubscriptionMode, SubscriptionRegistry};
use crate::types::{Error, Result};

/// Discovered signals by address, shared with the registry
pub type SignalIndex = Arc<RwLock<HashMap<String, Signal>>>;

/// Timing and control settings of one worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    /// How long the queue may stay empty before a poll is considered
    pub tick: Duration,
    pub control_defaults: ControlDefaults,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            tick: Duration::from_millis(100),
            control_defaults: ControlDefaults::default(),
        }
    }
}

/// Collaborators a worker needs
pub struct WorkerContext {
    pub device_id: DeviceId,
    pub device_name: String,
    pub adapter: SharedAdapter,
    pub signals: SignalIndex,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub events: Arc<EventBus>,
    pub inbox: Sender<RegistryMessage>,
    /// Connection generation of the device, bumped by every connect
    pub session: Arc<AtomicU64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a running protocol worker
pub struct WorkerHandle {
    device: Arc<RwLock<String>>,
    task_tx: Sender<WorkerTask>,
    stop: Arc<AtomicBool>,
    renamed: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Queue a task
    pub fn send(&self, task: WorkerTask) -> Result<()> {
        self.task_tx
            .send(task)
            .map_err(|_| Error::WorkerStopped(self.device()))
    }

    pub fn device(&self) -> String {
        self.device.read().clone()
    }

    /// Events published from now on use the new name
    pub fn rename(&self, name: &str) {
        *self.device.write() = name.to_string();
        self.renamed.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Ask the worker to stop after its current task
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Stop and wait for the thread to exit
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Worker thread for {} panicked", self.device());
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start a worker thread for one device
pub fn spawn_worker(ctx: WorkerContext, config: WorkerConfig) -> Result<WorkerHandle> {
    let (task_tx, task_rx) = mpsc::channel();
    let device = Arc::new(RwLock::new(ctx.device_name.clone()));
    let stop = Arc::new(AtomicBool::new(false));
    let renamed = Arc::new(AtomicBool::new(false));
    let state = Arc::new(AtomicU8::new(WorkerState::Starting as u8));

    let worker = ProtocolWorker {
        device: Arc::clone(&device),
        session: ctx.session.load(Ordering::SeqCst),
        ctx,
        task_rx,
        stop: Arc::clone(&stop),
        renamed: Arc::clone(&renamed),
        state: Arc::clone(&state),
        last_poll: Instant::now()
            .checked_sub(config.poll_interval)
            .unwrap_or_else(Instant::now),
        config,
        controls: HashMap::new(),
        ctl_nums: HashMap::new(),
    };

    let thread = thread::Builder::new()
        .name(format!("worker-{}", device.read()))
        .spawn(move || worker.run())?;

    Ok(WorkerHandle {
        device,
        task_tx,
        stop,
        renamed,
        state,
        thread: Some(thread),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────────────────

struct ProtocolWorker {
    device: Arc<RwLock<String>>,
    /// Connection generation this worker was started for
    session: u64,
    ctx: WorkerContext,
    task_rx: Receiver<WorkerTask>,
    stop: Arc<AtomicBool>,
    renamed: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    config: WorkerConfig,
    last_poll: Instant,
    /// Control objects with a pending selection
    controls: HashMap<String, ControlContext>,
    /// Next control number per object
    ctl_nums: HashMap<String, u8>,
}

impl ProtocolWorker {
    fn run(mut self) {
        tracing::info!("Protocol worker started for {}", self.device_name());
        self.set_state(WorkerState::Running);

        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            match self.task_rx.recv_timeout(self.config.tick) {
                Ok(task) => self.handle_task(task),
                Err(RecvTimeoutError::Timeout) => {
                    if self.last_poll.elapsed() >= self.config.poll_interval {
                        self.poll();
                        self.last_poll = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("Task channel closed for {}", self.device_name());
                    break;
                }
            }
        }

        self.set_state(WorkerState::Stopping);
        self.disconnect();
        self.set_state(WorkerState::Stopped);
        tracing::info!("Protocol worker stopped for {}", self.device_name());
    }

    fn disconnect(&self) {
        let mut adapter = self.ctx.adapter.lock();
        // Checked under the lock: a reconnect takes the same lock to connect
        if self.ctx.session.load(Ordering::SeqCst) == self.session {
            adapter.disconnect();
        } else {
            tracing::debug!("{}: adapter reconnected since start, leaving it open", self.device_name());
        }
    }

    fn device_name(&self) -> String {
        self.device.read().clone()
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn handle_task(&mut self, task: WorkerTask) {
        if self.renamed.swap(false, Ordering::SeqCst) {
            self.forget_idle_controls();
        }
        tracing::debug!("{}: {} task", self.device_name(), task.kind());
        match task {
            WorkerTask::Read { signal, reply } => {
                let signal = self.read(signal);
                self.publish(signal.clone());
                respond(reply, TaskOutcome::Read(signal));
            }
            WorkerTask::Write { signal, value, reply } => {
                let ok = self.write(&signal, &value);
                respond(reply, TaskOutcome::Written(ok));
            }
            WorkerTask::Control {
                action,
                signal,
                value,
                params,
                reply,
            } => {
                let result = self.control(action, &signal, value, &params);
                if let Err(e) = &result {
                    tracing::warn!("{}: {} on {} failed: {}", self.device_name(), action.as_str(), signal.address, e);
                }
                respond(reply, TaskOutcome::Control(result));
            }
        }
    }

    /// Read through the adapter; failures come back as a tagged signal
    fn read(&mut self, signal: Signal) -> Signal {
        let result = self.ctx.adapter.lock().read_signal(&signal);
        match result {
            Ok(read) => read,
            Err(e) => {
                let quality = match e {
                    AdapterError::NotConnected => SignalQuality::NotConnected,
                    _ => SignalQuality::Invalid,
                };
                let mut failed = signal;
                failed.mark_failed(quality, e.to_string());
                failed
            }
        }
    }

    fn write(&mut self, signal: &Signal, value: &SignalValue) -> bool {
        let mut adapter = self.ctx.adapter.lock();
        let Some(writer) = adapter.writer() else {
            tracing::warn!("{}: adapter does not support writes", self.device_name());
            return false;
        };
        match writer.write_signal(signal, value) {
            Ok(()) => {
                tracing::info!("{}: wrote {} = {}", self.device_name(), signal.address, value);
                true
            }
            Err(e) => {
                tracing::warn!("{}: write {} failed: {}", self.device_name(), signal.address, e);
                false
            }
        }
    }

    fn control(
        &mut self,
        action: ControlAction,
        signal: &Signal,
        value: Option<SignalValue>,
        params: &ControlParams,
    ) -> std::result::Result<ControlState, ControlError> {
        let adapter = Arc::clone(&self.ctx.adapter);
        let mut adapter = adapter.lock();
        let controller = adapter.controller().ok_or(ControlError::Unsupported)?;

        let object_ref = control_object_ref(&signal.address).to_string();
        let mut context = match self.controls.remove(&object_ref) {
            Some(context) => context,
            None => {
                let ctl_num = self.ctl_nums.get(&object_ref).copied().unwrap_or(0);
                let mut context =
                    ControlContext::resolve(controller, signal, params, &self.config.control_defaults, ctl_num);
                if let Some(model) = self.discovered_control_model(&object_ref) {
                    context.model = model;
                }
                context
            }
        };

        let missing_value = || ControlError::Adapter(AdapterError::Protocol("control value required".to_string()));
        let result = match action {
            ControlAction::Select => context.select(controller, signal, value.as_ref(), params),
            ControlAction::Operate => match &value {
                Some(v) => context.operate(controller, signal, v, params).map(|_| ()),
                None => Err(missing_value()),
            },
            ControlAction::Cancel => context.cancel(controller, signal, params).map(|_| ()),
            ControlAction::SendCommand => match &value {
                Some(v) => context.send_command(controller, signal, v, params).map(|_| ()),
                None => Err(missing_value()),
            },
        };

        self.ctl_nums.insert(object_ref.clone(), context.ctl_num);
        let state = context.state;
        // Only a pending selection outlives the action that created it
        if state == ControlState::Selected {
            self.controls.insert(object_ref, context);
        }
        result.map(|()| state)
    }

    /// ctlModel value last read from the device for a control object
    fn discovered_control_model(&self, object_ref: &str) -> Option<ControlModel> {
        self.ctx
            .signals
            .read()
            .get(&format!("{}.ctlModel", object_ref))
            .and_then(|signal| signal.value.as_ref())
            .and_then(SignalValue::as_i64)
            .map(ControlModel::from_ctl_model)
    }

    /// Drop control numbers of objects without a pending selection
    fn forget_idle_controls(&mut self) {
        let controls = &self.controls;
        self.ctl_nums.retain(|object_ref, _| controls.contains_key(object_ref));
        tracing::debug!("{}: control numbers reset after rename", self.device_name());
    }

    /// Read every polled subscription of the device
    fn poll(&mut self) {
        let device = self.device_name();
        let subs = self
            .ctx
            .subscriptions
            .get_subscriptions(&device, Some(SubscriptionMode::ReadPolling));
        if subs.is_empty() {
            return;
        }

        let mut results = Vec::with_capacity(subs.len());
        for sub in subs {
            let template = self.ctx.signals.read().get(&sub.mms_path).cloned();
            let signal = template.unwrap_or_else(|| {
                let name = sub.mms_path.rsplit('.').next().unwrap_or(&sub.mms_path).to_string();
                Signal::new(name, sub.mms_path.clone()).with_fc(sub.fc.clone())
            });
            let read = self.read(signal);
            self.publish(read.clone());
            results.push(read);
        }

        tracing::debug!("{}: polled {} signals", device, results.len());
        let _ = self.ctx.inbox.send(RegistryMessage::PollCompleted {
            device: self.ctx.device_id,
            at: chrono::Utc::now(),
            signals: results,
        });
    }

    fn publish(&self, signal: Signal) {
        self.ctx.events.publish(RegistryEvent::SignalUpdated {
            device: self.device_name(),
            signal,
        });
    }
}

fn respond(reply: Option<Sender<TaskOutcome>>, outcome: TaskOutcome) {
    if let Some(reply) = reply {
        // Caller may have stopped waiting
        let _ = reply.send(outcome);
    }
}
