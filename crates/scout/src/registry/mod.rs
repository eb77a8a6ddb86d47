//! Device Registry
//!
//! Owns every configured device, its protocol adapter and its worker. All
//! public methods run on the owner's context and never block on protocol or
//! file I/O: connection attempts run on their own thread, cold-cache SCL
//! parsing runs on the [`ParsePool`], and both report back through an inbox
//! that the owner drains with [`DeviceRegistry::process_pending`]. Nor do they
//! wait for an adapter: offline models are built from configuration alone and
//! update sinks are renamed in place.

mod device;
mod inbox;
mod pool;
mod rename;

pub use device::{assign_unique_addresses, Device};
pub use inbox::{DeviceId, RegistryMessage};
pub use pool::ParsePool;
pub use rename::{ReferenceRewriter, RenameReport, RenameStep, ScriptTokens};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scl_compiler::SclCache;
use scout_model::{Node, Signal, SignalValue};
use tracing::{debug, error, info, warn};

use crate::adapter::{
    share, AdapterError, AdapterFactory, ConfiguredModel, ControlParams, OfflineModel, SharedAdapter, UpdateSink,
};
use crate::control::ControlAction;
use crate::events::{EventBus, RegistryEvent};
use crate::project::{DeviceConfig, ProjectFile, SclWatcher, Settings};
use crate::subscriptions::SubscriptionRegistry;
use crate::types::{ConnectionState, Error, Result};
use crate::worker::{spawn_worker, TaskOutcome, WorkerConfig, WorkerContext, WorkerHandle, WorkerTask};

/// How an offline discovery request was served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryPath {
    /// Cache was warm (or no file is involved); the model is already applied
    Synchronous,
    /// Parse queued on the pool; applied by a later `process_pending`
    Scheduled,
    /// Nothing to discover from
    Skipped,
}

pub struct DeviceRegistry {
    devices: BTreeMap<String, Device>,
    adapters: HashMap<String, SharedAdapter>,
    sinks: HashMap<String, UpdateSink>,
    workers: HashMap<String, WorkerHandle>,
    folders: BTreeMap<String, String>,
    subscriptions: Arc<SubscriptionRegistry>,
    cache: Arc<SclCache>,
    events: Arc<EventBus>,
    factory: AdapterFactory,
    offline: Arc<dyn OfflineModel>,
    pool: ParsePool,
    inbox_tx: Sender<RegistryMessage>,
    inbox_rx: Receiver<RegistryMessage>,
    rewriters: Vec<Arc<dyn ReferenceRewriter>>,
    watcher: Option<SclWatcher>,
    settings: Settings,
}

impl DeviceRegistry {
    /// Registry using the default adapter factory
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_factory(settings, AdapterFactory::default())
    }

    pub fn with_factory(settings: Settings, factory: AdapterFactory) -> Result<Self> {
        let events = Arc::new(EventBus::default());
        let (inbox_tx, inbox_rx) = mpsc::channel();

        Ok(Self {
            devices: BTreeMap::new(),
            adapters: HashMap::new(),
            sinks: HashMap::new(),
            workers: HashMap::new(),
            folders: BTreeMap::new(),
            subscriptions: Arc::new(SubscriptionRegistry::with_events(Arc::clone(&events))),
            cache: Arc::new(SclCache::new()),
            events,
            factory,
            offline: Arc::new(ConfiguredModel),
            pool: ParsePool::new(settings.parse_workers)?,
            inbox_tx,
            inbox_rx,
            rewriters: Vec::new(),
            watcher: None,
            settings,
        })
    }

    /// Replace how offline models are built
    pub fn with_offline_model(mut self, offline: Arc<dyn OfflineModel>) -> Self {
        self.offline = offline;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    pub fn cache(&self) -> &Arc<SclCache> {
        &self.cache
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn get_device(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device_names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn folders(&self) -> &BTreeMap<String, String> {
        &self.folders
    }

    pub fn add_folder(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.folders.insert(name.into(), description.into());
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.workers.get(name).is_some_and(|w| w.state().is_running())
    }

    /// Register a collaborator to be told about device renames
    pub fn register_rewriter(&mut self, rewriter: Arc<dyn ReferenceRewriter>) {
        debug!("Registered reference rewriter: {}", rewriter.name());
        self.rewriters.push(rewriter);
    }

    fn publish(&self, event: RegistryEvent) {
        self.events.publish(event);
    }

    fn progress(&self, device: &str, percent: u8, message: impl Into<String>) {
        self.publish(RegistryEvent::ConnectionProgress {
            device: device.to_string(),
            percent,
            message: message.into(),
        });
    }

    fn set_state(&mut self, name: &str, state: ConnectionState) {
        if let Some(device) = self.devices.get_mut(name) {
            device.state = state;
            self.events.publish(RegistryEvent::StatusChanged {
                device: name.to_string(),
                state,
            });
        }
    }

    fn name_of(&self, id: DeviceId) -> Option<String> {
        self.devices
            .values()
            .find(|d| d.id == id)
            .map(|d| d.name().to_string())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Device Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a device; `run_offline` discovers its model right away
    ///
    /// A device type without an adapter is still added; it just cannot
    /// discover or connect until its configuration changes.
    pub fn add_device(&mut self, config: DeviceConfig, run_offline: bool) -> Result<()> {
        let name = config.name.clone();
        if self.devices.contains_key(&name) {
            return Err(Error::DeviceExists(name));
        }

        let device_type = config.device_type;
        let scl_source = config.scl_source().map(Path::to_path_buf);
        self.devices.insert(name.clone(), Device::new(config));

        if let Err(e) = self.ensure_adapter(&name) {
            warn!("Device {} has no adapter: {}", name, e);
        }
        if let Some(path) = scl_source {
            self.watch_scl(&path);
        }

        info!("Device added: {} ({})", name, device_type);
        self.publish(RegistryEvent::DeviceAdded { device: name.clone() });

        if run_offline {
            self.load_offline_scd(&name)?;
        }
        Ok(())
    }

    /// Stop and forget a device, dropping its subscriptions
    pub fn remove_device(&mut self, name: &str) -> Result<()> {
        if !self.devices.contains_key(name) {
            return Err(Error::DeviceNotFound(name.to_string()));
        }

        if let Some(worker) = self.workers.remove(name) {
            worker.stop();
        }
        self.adapters.remove(name);
        self.sinks.remove(name);
        self.subscriptions.remove_device(name);
        self.devices.remove(name);

        info!("Device removed: {}", name);
        self.publish(RegistryEvent::DeviceRemoved {
            device: name.to_string(),
        });
        Ok(())
    }

    /// Remove every device, subscription and folder
    pub fn clear_all_devices(&mut self) {
        for (_, worker) in self.workers.drain() {
            worker.stop();
        }
        self.adapters.clear();
        self.sinks.clear();
        self.devices.clear();
        self.folders.clear();
        self.subscriptions.clear();

        info!("Project cleared");
        self.publish(RegistryEvent::ProjectCleared);
    }

    /// Adapter for a device, created on first use
    fn ensure_adapter(&mut self, name: &str) -> Result<SharedAdapter> {
        if let Some(adapter) = self.adapters.get(name) {
            return Ok(Arc::clone(adapter));
        }

        let device = self
            .devices
            .get(name)
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))?;
        let mut adapter = self.factory.create(&device.config, Arc::clone(&self.cache))?;
        let sink = UpdateSink::new(name, Arc::clone(&self.events));
        adapter.set_update_sink(sink.clone());

        let adapter = share(adapter);
        self.adapters.insert(name.to_string(), Arc::clone(&adapter));
        self.sinks.insert(name.to_string(), sink);
        Ok(adapter)
    }

    fn watch_scl(&mut self, path: &Path) {
        if !self.settings.watch_scl_files {
            return;
        }
        if self.watcher.is_none() {
            match SclWatcher::new(self.inbox_tx.clone()) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => {
                    warn!("SCL file watching disabled: {}", e);
                    return;
                }
            }
        }
        if let Some(watcher) = self.watcher.as_mut() {
            if let Err(e) = watcher.watch(path) {
                warn!("Cannot watch {}: {}", path.display(), e);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Discovery
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a device's model without connecting to it
    ///
    /// Returns immediately: a warm SCL cache (or a Modbus register map) is
    /// served synchronously, anything else is parsed on the pool. The
    /// device's adapter is not involved.
    pub fn load_offline_scd(&mut self, name: &str) -> Result<DiscoveryPath> {
        let device = self
            .devices
            .get(name)
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))?;

        let scl_source = device.config.scl_source().map(Path::to_path_buf);
        let from_registers = device.config.device_type.is_modbus() && !device.config.modbus_register_maps.is_empty();
        if scl_source.is_none() && !from_registers {
            debug!("No offline model source for {}", name);
            return Ok(DiscoveryPath::Skipped);
        }

        let Some(device) = self.devices.get_mut(name) else {
            return Err(Error::DeviceNotFound(name.to_string()));
        };
        device.discovery_seq += 1;
        let seq = device.discovery_seq;
        let id = device.id;
        let config = device.config.clone();

        let warm = match &scl_source {
            Some(path) => self.cache.is_warm(path),
            None => true,
        };
        if warm {
            let root = self.offline.build(&config, &self.cache);
            self.apply_discovery(name, root);
            return Ok(DiscoveryPath::Synchronous);
        }

        let offline = Arc::clone(&self.offline);
        let cache = Arc::clone(&self.cache);
        let inbox = self.inbox_tx.clone();
        self.pool.submit(move || {
            let root = offline.build(&config, &cache);
            let _ = inbox.send(RegistryMessage::ParseCompleted { device: id, seq, root });
        })?;
        info!("Offline discovery scheduled for {}", name);
        Ok(DiscoveryPath::Scheduled)
    }

    /// Choose between SCL and online discovery for a device
    pub fn set_discovery_mode(&mut self, name: &str, use_scd: bool) -> Result<()> {
        let device = self
            .devices
            .get_mut(name)
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))?;
        device.config.use_scd_discovery = use_scd;
        self.publish(RegistryEvent::DeviceUpdated {
            device: name.to_string(),
        });
        Ok(())
    }

    fn apply_discovery(&mut self, name: &str, mut root: Node) {
        let Some(device) = self.devices.get_mut(name) else {
            return;
        };

        let duplicates = assign_unique_addresses(name, &mut root);
        if duplicates > 0 {
            warn!("{}: {} duplicate signal addresses", name, duplicates);
        }
        if root.is_error() {
            error!("Discovery failed for {}: {}", name, root.name);
            device.last_error = Some(root.name.clone());
        } else {
            info!("Discovered {} signals for {}", root.signal_count(), name);
        }
        device.set_root(root);

        self.publish(RegistryEvent::DeviceUpdated {
            device: name.to_string(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────────

    /// Start connecting to a device
    ///
    /// Connection and online discovery run on a dedicated thread; the result
    /// is applied by `process_pending`, which then starts the device's worker.
    pub fn connect_device(&mut self, name: &str) -> Result<()> {
        let device = self
            .devices
            .get(name)
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))?;
        if self.workers.contains_key(name) || device.state == ConnectionState::Connecting {
            debug!("{} is already connected or connecting", name);
            return Ok(());
        }
        let ip_address = device.config.ip_address.clone();

        self.progress(name, 5, "Preparing connection...");
        self.progress(name, 10, "Initializing protocol adapter...");
        let adapter = match self.ensure_adapter(name) {
            Ok(adapter) => adapter,
            Err(e) => {
                self.progress(name, 0, "Error: No protocol handler");
                return Err(e);
            }
        };

        let Some(device) = self.devices.get_mut(name) else {
            return Err(Error::DeviceNotFound(name.to_string()));
        };
        device.connect_seq += 1;
        // A pending offline parse must not overwrite the online model
        device.discovery_seq += 1;
        // A worker still winding down must leave this connection open
        device.session.fetch_add(1, Ordering::SeqCst);
        let seq = device.connect_seq;
        let id = device.id;
        self.set_state(name, ConnectionState::Connecting);

        let events = Arc::clone(&self.events);
        let inbox = self.inbox_tx.clone();
        let device_name = name.to_string();
        let spawned = thread::Builder::new()
            .name(format!("connect-{}", name))
            .spawn(move || {
                let progress = |percent: u8, message: String| {
                    events.publish(RegistryEvent::ConnectionProgress {
                        device: device_name.clone(),
                        percent,
                        message,
                    });
                };

                progress(20, format!("Connecting to {}...", ip_address));
                let result = {
                    let mut adapter = adapter.lock();
                    match adapter.connect() {
                        Ok(()) => {
                            progress(40, "Connected successfully".to_string());
                            progress(50, "Discovering device structure...".to_string());
                            let root = adapter.discover();
                            let done = if root.is_error() {
                                "Discovery failed"
                            } else {
                                "Discovery complete"
                            };
                            progress(90, done.to_string());
                            Ok(root)
                        }
                        Err(e) => {
                            progress(0, "Connection failed".to_string());
                            Err(e)
                        }
                    }
                };
                let _ = inbox.send(RegistryMessage::ConnectFinished { device: id, seq, result });
            });

        if let Err(e) = spawned {
            self.set_state(name, ConnectionState::Failed);
            return Err(e.into());
        }
        Ok(())
    }

    /// Stop a device's worker and mark it disconnected
    ///
    /// The worker finishes its current task and disconnects the adapter on
    /// its own thread.
    pub fn disconnect_device(&mut self, name: &str) -> Result<()> {
        let device = self
            .devices
            .get_mut(name)
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))?;
        // Results of an attempt still in flight become stale
        device.connect_seq += 1;

        if let Some(worker) = self.workers.remove(name) {
            worker.stop();
        } else if let Some(adapter) = self.adapters.get(name) {
            // Busy means a connection attempt holds it; its stale result
            // disconnects it instead
            if let Some(mut adapter) = adapter.try_lock() {
                adapter.disconnect();
            }
        }

        self.set_state(name, ConnectionState::Disconnected);
        info!("Device disconnected: {}", name);
        Ok(())
    }

    fn start_worker(&mut self, name: &str) -> Result<()> {
        let adapter = self.ensure_adapter(name)?;
        let device = self
            .devices
            .get(name)
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))?;

        let config = &device.config;
        let poll_interval = if config.polling_enabled && config.poll_interval.is_finite() && config.poll_interval > 0.0 {
            Duration::from_secs_f64(config.poll_interval)
        } else {
            self.settings.poll_interval()
        };

        let ctx = WorkerContext {
            device_id: device.id,
            device_name: name.to_string(),
            adapter,
            signals: Arc::clone(&device.signals),
            subscriptions: Arc::clone(&self.subscriptions),
            events: Arc::clone(&self.events),
            inbox: self.inbox_tx.clone(),
            session: Arc::clone(&device.session),
        };
        let worker_config = WorkerConfig {
            poll_interval,
            tick: self.settings.worker_tick(),
            control_defaults: self.settings.control_defaults(),
        };

        let handle = spawn_worker(ctx, worker_config)?;
        self.workers.insert(name.to_string(), handle);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbox
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply everything background threads have posted since the last call
    ///
    /// Returns the number of messages handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            handled += 1;
            match message {
                RegistryMessage::ParseCompleted { device, seq, root } => self.on_parse_completed(device, seq, root),
                RegistryMessage::ConnectFinished { device, seq, result } => self.on_connect_finished(device, seq, result),
                RegistryMessage::PollCompleted { device, at, signals } => {
                    let Some(name) = self.name_of(device) else {
                        continue;
                    };
                    if let Some(device) = self.devices.get_mut(&name) {
                        device.last_poll = Some(at);
                        device.apply_values(&signals);
                    }
                }
                RegistryMessage::SclFileChanged { path } => self.on_scl_changed(&path),
            }
        }
        handled
    }

    fn on_parse_completed(&mut self, id: DeviceId, seq: u64, root: Node) {
        let Some(name) = self.name_of(id) else {
            debug!("Discarding parse result for a removed device");
            return;
        };
        if self.devices.get(&name).is_some_and(|d| d.discovery_seq != seq) {
            debug!("Discarding stale parse result for {}", name);
            return;
        }
        self.apply_discovery(&name, root);
    }

    fn on_connect_finished(&mut self, id: DeviceId, seq: u64, result: std::result::Result<Node, AdapterError>) {
        let Some(name) = self.name_of(id) else {
            return;
        };
        let Some(device) = self.devices.get(&name) else {
            return;
        };

        if device.connect_seq != seq {
            debug!("Discarding stale connection result for {}", name);
            if result.is_ok() && !self.workers.contains_key(&name) && device.state != ConnectionState::Connecting {
                // Busy means a newer session is using it
                if let Some(mut adapter) = self.adapters.get(&name).and_then(|a| a.try_lock()) {
                    adapter.disconnect();
                }
            }
            return;
        }

        let root = match result {
            Ok(root) => root,
            Err(e) => {
                warn!("Connection to {} failed: {}", name, e);
                if let Some(device) = self.devices.get_mut(&name) {
                    device.last_error = Some(e.to_string());
                }
                self.set_state(&name, ConnectionState::Failed);
                return;
            }
        };

        if let Some(device) = self.devices.get_mut(&name) {
            device.last_error = None;
        }
        self.set_state(&name, ConnectionState::Connected);

        let mut name = name;
        if self.should_adopt_ied_name(&name, &root) {
            let ied_name = root.name.clone();
            match self.rename_device(&name, &ied_name) {
                Ok(_) => {
                    self.progress(&ied_name, 95, format!("Renamed to {}", ied_name));
                    name = ied_name;
                }
                Err(e) => warn!("Could not rename {} to {}: {}", name, ied_name, e),
            }
        }

        self.apply_discovery(&name, root);

        if let Err(e) = self.start_worker(&name) {
            error!("Failed to start worker for {}: {}", name, e);
            if let Some(device) = self.devices.get_mut(&name) {
                device.last_error = Some(e.to_string());
            }
            self.set_state(&name, ConnectionState::Failed);
            return;
        }
        self.progress(&name, 100, "Ready");
    }

    /// IEC 61850 devices take the IED name their server reports
    fn should_adopt_ied_name(&self, name: &str, root: &Node) -> bool {
        let Some(device) = self.devices.get(name) else {
            return false;
        };
        device.config.device_type.is_iec61850()
            && !root.is_error()
            && !root.name.is_empty()
            && root.name != name
            && !self.devices.contains_key(&root.name)
    }

    fn on_scl_changed(&mut self, path: &Path) {
        let changed = canonical(path);
        let affected: Vec<String> = self
            .devices
            .values()
            .filter(|d| !d.is_connected())
            .filter(|d| d.config.scl_source().is_some_and(|p| canonical(p) == changed))
            .map(|d| d.name().to_string())
            .collect();

        for name in affected {
            info!("SCL file changed, rediscovering {}", name);
            if let Err(e) = self.load_offline_scd(&name) {
                warn!("Rediscovery of {} failed: {}", name, e);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rename & Update
    // ─────────────────────────────────────────────────────────────────────────

    /// Move a device and everything keyed by its name to `new`
    ///
    /// Every propagation step runs even if an earlier one fails; the report
    /// records each outcome and is logged here.
    pub fn rename_device(&mut self, old: &str, new: &str) -> Result<RenameReport> {
        let mut report = RenameReport::new(old, new);
        if old == new {
            return Ok(report);
        }
        if self.devices.contains_key(new) {
            return Err(Error::DeviceExists(new.to_string()));
        }
        let mut device = self
            .devices
            .remove(old)
            .ok_or_else(|| Error::DeviceNotFound(old.to_string()))?;

        device.config.name = new.to_string();
        if let Some(mut root) = device.root.take() {
            assign_unique_addresses(new, &mut root);
            report.record("unique_addresses", Ok(root.signal_count()));
            device.set_root(root);
        }
        self.devices.insert(new.to_string(), device);

        let moved = match self.adapters.remove(old) {
            Some(adapter) => {
                self.adapters.insert(new.to_string(), adapter);
                if let Some(sink) = self.sinks.remove(old) {
                    sink.rename(new);
                    self.sinks.insert(new.to_string(), sink);
                }
                1
            }
            None => 0,
        };
        report.record("adapter", Ok(moved));

        let moved = match self.workers.remove(old) {
            Some(worker) => {
                worker.rename(new);
                self.workers.insert(new.to_string(), worker);
                1
            }
            None => 0,
        };
        report.record("worker", Ok(moved));

        report.record("subscriptions", Ok(self.subscriptions.rename_device(old, new)));
        for rewriter in &self.rewriters {
            report.record(rewriter.name(), rewriter.rewrite_device(old, new));
        }
        report.log();

        self.publish(RegistryEvent::DeviceRemoved {
            device: old.to_string(),
        });
        self.publish(RegistryEvent::DeviceAdded {
            device: new.to_string(),
        });
        self.publish(RegistryEvent::DeviceRenamed {
            old: old.to_string(),
            new: new.to_string(),
        });
        Ok(report)
    }

    /// Replace a device's configuration
    ///
    /// The device is found by the config's name, or else by its endpoint. It
    /// is disconnected, its adapter rebuilt, and renamed if the name changed.
    pub fn update_device_config(&mut self, config: DeviceConfig) -> Result<()> {
        let current = if self.devices.contains_key(&config.name) {
            config.name.clone()
        } else {
            self.devices
                .values()
                .find(|d| d.config.same_endpoint(&config))
                .map(|d| d.name().to_string())
                .ok_or_else(|| Error::DeviceNotFound(config.name.clone()))?
        };

        self.disconnect_device(&current)?;
        self.adapters.remove(&current);
        self.sinks.remove(&current);

        let name = config.name.clone();
        if name != current {
            self.rename_device(&current, &name)?;
        }

        let Some(device) = self.devices.get_mut(&name) else {
            return Err(Error::DeviceNotFound(name));
        };
        let source_changed = device.config.scl_source() != config.scl_source();
        let scl_source = config.scl_source().map(Path::to_path_buf);
        device.config = config;

        if let Err(e) = self.ensure_adapter(&name) {
            warn!("Device {} has no adapter: {}", name, e);
        }
        if let Some(path) = &scl_source {
            self.watch_scl(path);
        }

        info!("Device updated: {}", name);
        self.publish(RegistryEvent::DeviceUpdated { device: name.clone() });

        if source_changed {
            self.load_offline_scd(&name)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Signal Access
    // ─────────────────────────────────────────────────────────────────────────

    fn enqueue(&self, name: &str, task: WorkerTask) -> Result<Receiver<TaskOutcome>> {
        let worker = self
            .workers
            .get(name)
            .ok_or_else(|| Error::NoWorker(name.to_string()))?;
        let (tx, rx) = mpsc::channel();
        worker.send(task.with_reply(tx))?;
        Ok(rx)
    }

    /// Queue a read; the outcome arrives on the returned channel
    pub fn read_signal(&self, name: &str, signal: Signal) -> Result<Receiver<TaskOutcome>> {
        self.enqueue(name, WorkerTask::read(signal))
    }

    pub fn write_signal(&self, name: &str, signal: Signal, value: SignalValue) -> Result<Receiver<TaskOutcome>> {
        self.enqueue(name, WorkerTask::write(signal, value))
    }

    pub fn send_control_command(
        &self,
        name: &str,
        signal: Signal,
        action: ControlAction,
        value: Option<SignalValue>,
        params: ControlParams,
    ) -> Result<Receiver<TaskOutcome>> {
        self.enqueue(name, WorkerTask::control(action, signal, value, params))
    }

    /// Whether `address` names a control value the device accepts commands on
    ///
    /// Asks the adapter when it is idle. While a protocol call is in flight
    /// the discovered model answers instead: a known signal with FC "CO".
    pub fn is_controllable(&self, name: &str, address: &str) -> bool {
        if !address.contains("ctlVal") {
            return false;
        }
        let Some(adapter) = self.adapters.get(name) else {
            return false;
        };
        if let Some(mut adapter) = adapter.try_lock() {
            return match adapter.controller() {
                Some(controller) => controller.check_control_model(address),
                None => false,
            };
        }
        debug!("{}: adapter busy, answering from the model", name);
        self.devices
            .get(name)
            .and_then(|d| d.signals.read().get(address).map(|s| s.fc == "CO"))
            .unwrap_or(false)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    pub fn save_configuration(&self, path: impl AsRef<Path>) -> Result<()> {
        let project = ProjectFile {
            devices: self.devices.values().map(|d| d.config.clone()).collect(),
            folders: self.folders.clone(),
        };
        project.save(path)
    }

    /// Replace the current project with a saved device list
    ///
    /// Devices are added first and discovered afterwards, so listeners see
    /// the whole list before any model arrives. Returns the number added.
    pub fn load_configuration(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let project = ProjectFile::load(path)?;
        self.clear_all_devices();
        self.folders = project.folders;

        self.publish(RegistryEvent::BatchLoadStarted {
            count: project.devices.len(),
        });

        let mut added = Vec::with_capacity(project.devices.len());
        for config in project.devices {
            let name = config.name.clone();
            match self.add_device(config, false) {
                Ok(()) => added.push(name),
                Err(e) => warn!("Skipping device {}: {}", name, e),
            }
        }
        for name in &added {
            if let Err(e) = self.load_offline_scd(name) {
                warn!("Offline discovery of {} failed: {}", name, e);
            }
        }

        self.publish(RegistryEvent::BatchLoadFinished { count: added.len() });
        Ok(added.len())
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        for (_, worker) in self.workers.drain() {
            worker.join();
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterResult, ControlCapability, ProtocolAdapter, SimulatedAdapter};
    use crate::control::{ControlOutcome, ControlState};
    use crate::events::EventRecorder;
    use crate::project::{DeviceType, ModbusRegisterMap};
    use crate::subscriptions::{Subscription, SubscriptionMode};
    use crate::testing::{write_scl, STATION};
    use scout_model::SignalQuality;
    use std::time::Instant;

    fn settings() -> Settings {
        Settings {
            poll_interval_ms: 20,
            worker_tick_ms: 5,
            watch_scl_files: false,
            ..Settings::default()
        }
    }

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(settings()).unwrap()
    }

    /// Pump the inbox until `done` holds or five seconds pass
    fn pump_until(registry: &mut DeviceRegistry, mut done: impl FnMut(&DeviceRegistry) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            registry.process_pending();
            if done(registry) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Offline model that takes a while to build
    struct SlowModel;

    impl OfflineModel for SlowModel {
        fn build(&self, config: &DeviceConfig, cache: &Arc<SclCache>) -> Node {
            thread::sleep(Duration::from_millis(120));
            ConfiguredModel.build(config, cache)
        }
    }

    /// Simulated adapter whose reads take a while
    struct SlowAdapter(SimulatedAdapter);

    impl ProtocolAdapter for SlowAdapter {
        fn connect(&mut self) -> AdapterResult<()> {
            self.0.connect()
        }

        fn disconnect(&mut self) {
            self.0.disconnect();
        }

        fn is_connected(&self) -> bool {
            self.0.is_connected()
        }

        fn discover(&mut self) -> Node {
            self.0.discover()
        }

        fn read_signal(&mut self, signal: &Signal) -> AdapterResult<Signal> {
            thread::sleep(Duration::from_millis(300));
            self.0.read_signal(signal)
        }

        fn controller(&mut self) -> Option<&mut dyn ControlCapability> {
            self.0.controller()
        }
    }

    fn slow_registry() -> DeviceRegistry {
        let mut factory = AdapterFactory::empty();
        factory.register(DeviceType::Iec61850Ied, |config, cache| {
            Box::new(SlowAdapter(SimulatedAdapter::new(config.clone(), cache)))
        });
        DeviceRegistry::with_factory(settings(), factory).unwrap()
    }

    /// Failing collaborator for rename propagation
    struct BrokenRewriter;

    impl ReferenceRewriter for BrokenRewriter {
        fn name(&self) -> &str {
            "alarms"
        }

        fn rewrite_device(&self, _old: &str, _new: &str) -> Result<usize> {
            Err(Error::Config("alarm store is read-only".to_string()))
        }
    }

    #[test]
    fn test_add_duplicate_device() {
        let mut registry = registry();
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102), false)
            .unwrap();
        let err = registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.2", 102), false)
            .unwrap_err();
        assert!(matches!(err, Error::DeviceExists(_)));
        assert_eq!(registry.device_names(), vec!["IED1"]);
    }

    #[test]
    fn test_offline_discovery_is_non_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scl(&dir, "station.scd", STATION);

        let mut registry = registry().with_offline_model(Arc::new(SlowModel));
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102).with_scd(&path), false)
            .unwrap();

        let started = Instant::now();
        let path_taken = registry.load_offline_scd("IED1").unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(path_taken, DiscoveryPath::Scheduled);
        assert!(registry.get_device("IED1").unwrap().root.is_none());

        assert!(pump_until(&mut registry, |r| r.get_device("IED1").unwrap().root.is_some()));
        let device = registry.get_device("IED1").unwrap();
        assert!(device.signal("IED1::LD1/XCBR1.Pos.stVal").is_some());
    }

    #[test]
    fn test_warm_cache_discovers_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scl(&dir, "station.scd", STATION);

        let mut registry = registry();
        registry.cache().document(&path).unwrap();
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102).with_scd(&path), false)
            .unwrap();

        assert_eq!(registry.load_offline_scd("IED1").unwrap(), DiscoveryPath::Synchronous);
        let device = registry.get_device("IED1").unwrap();
        assert!(device.signal("IED1::LD1/GGIO1.Ind1.stVal").is_some());
        assert!(device.signal("IED1::LD1/GGIO1.Ind1.stVal#2").is_some());
        assert!(device.signal("IED1::LD1/GGIO1.Ind1.stVal#3").is_none());
    }

    #[test]
    fn test_busy_adapter_does_not_block_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scl(&dir, "station.scd", STATION);

        let mut registry = slow_registry();
        registry.cache().document(&path).unwrap();
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102).with_scd(&path), false)
            .unwrap();
        registry.connect_device("IED1").unwrap();
        assert!(pump_until(&mut registry, |r| r.is_running("IED1")));

        // The worker holds the adapter for the whole read
        let pending = registry
            .read_signal("IED1", Signal::new("stVal", "LD1/XCBR1.Pos.stVal").with_fc("ST"))
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        assert_eq!(registry.load_offline_scd("IED1").unwrap(), DiscoveryPath::Synchronous);
        assert!(registry.is_controllable("IED1", "LD1/CSWI1.Pos.Oper.ctlVal"));
        assert!(!registry.is_controllable("IED1", "LD1/GGIO9.SPCSO1.Oper.ctlVal"));
        let report = registry.rename_device("IED1", "Bay9").unwrap();
        assert!(started.elapsed() < Duration::from_millis(150));
        assert!(report.is_clean());

        assert!(matches!(
            pending.recv_timeout(Duration::from_secs(5)).unwrap(),
            TaskOutcome::Read(_)
        ));
    }

    #[test]
    fn test_offline_discovery_skipped_without_source() {
        let mut registry = registry();
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102), true)
            .unwrap();
        assert_eq!(registry.load_offline_scd("IED1").unwrap(), DiscoveryPath::Skipped);

        let mut modbus = DeviceConfig::new("MB1", "10.0.0.5", 502).with_type(DeviceType::ModbusTcp);
        modbus.modbus_register_maps.push(ModbusRegisterMap {
            start_address: 0,
            count: 4,
            function_code: 3,
            data_type: "Unsigned 16-bit".to_string(),
            name_prefix: "HR".to_string(),
            description: String::new(),
            scale: 1.0,
            offset: 0.0,
        });
        registry.add_device(modbus, false).unwrap();
        assert_eq!(registry.load_offline_scd("MB1").unwrap(), DiscoveryPath::Synchronous);
        assert_eq!(registry.get_device("MB1").unwrap().root.as_ref().unwrap().signal_count(), 4);
    }

    #[test]
    fn test_connect_adopts_ied_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scl(&dir, "station.scd", STATION);

        let mut registry = registry();
        let recorder = EventRecorder::new();
        registry.events().subscribe("*", recorder.clone());
        let tokens = Arc::new(ScriptTokens::new());
        tokens.set_script("trip", "x = {{TAG:Bay1::LD1/XCBR1.Pos.stVal}}");
        registry.register_rewriter(tokens.clone());

        registry
            .add_device(DeviceConfig::new("Bay1", "10.0.0.1", 102).with_scd(&path), false)
            .unwrap();
        registry.subscriptions().subscribe(Subscription::new(
            "Bay1",
            "LD1/XCBR1.Pos.stVal",
            "ST",
            SubscriptionMode::ReadPolling,
            "live_data",
        ));

        registry.connect_device("Bay1").unwrap();
        assert!(pump_until(&mut registry, |r| r.is_running("IED1")));

        assert!(registry.get_device("Bay1").is_none());
        let device = registry.get_device("IED1").unwrap();
        assert_eq!(device.state, ConnectionState::Connected);
        assert!(device.signal("IED1::LD1/XCBR1.Pos.stVal").is_some());
        assert_eq!(registry.subscriptions().get_subscriptions("IED1", None).len(), 1);
        assert!(registry.subscriptions().get_subscriptions("Bay1", None).is_empty());
        assert_eq!(tokens.script("trip").unwrap(), "x = {{TAG:IED1::LD1/XCBR1.Pos.stVal}}");

        let events = recorder.events();
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                RegistryEvent::ConnectionProgress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![5, 10, 20, 40, 50, 90, 95, 100]);
        assert!(events.contains(&RegistryEvent::DeviceRenamed {
            old: "Bay1".to_string(),
            new: "IED1".to_string(),
        }));

        // The subscribed signal is polled under the new name
        assert!(pump_until(&mut registry, |r| r.get_device("IED1").unwrap().last_poll.is_some()));
        let polled = registry.get_device("IED1").unwrap().signal("IED1::LD1/XCBR1.Pos.stVal").unwrap();
        assert!(polled.value.is_some());
    }

    #[test]
    fn test_reconnect_while_worker_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scl(&dir, "station.scd", STATION);

        let mut registry = slow_registry();
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102).with_scd(&path), false)
            .unwrap();
        registry.connect_device("IED1").unwrap();
        assert!(pump_until(&mut registry, |r| r.is_running("IED1")));

        // The old worker is mid-read while the device is reconnected
        let status = Signal::new("stVal", "LD1/XCBR1.Pos.stVal").with_fc("ST");
        let _pending = registry.read_signal("IED1", status.clone()).unwrap();
        thread::sleep(Duration::from_millis(50));
        registry.disconnect_device("IED1").unwrap();
        registry.connect_device("IED1").unwrap();
        assert!(pump_until(&mut registry, |r| r.is_running("IED1")));

        // Long enough for the old worker to have finished and exited
        thread::sleep(Duration::from_millis(400));
        assert_eq!(registry.get_device("IED1").unwrap().state, ConnectionState::Connected);
        let outcome = registry
            .read_signal("IED1", status)
            .unwrap()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        match outcome {
            TaskOutcome::Read(signal) => {
                assert_ne!(signal.quality, SignalQuality::NotConnected);
                assert!(signal.value.is_some());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_connect_failure() {
        let mut registry = registry();
        let mut config = DeviceConfig::new("IED1", "10.0.0.1", 102);
        config.enabled = false;
        registry.add_device(config, false).unwrap();

        registry.connect_device("IED1").unwrap();
        assert!(pump_until(&mut registry, |r| r.get_device("IED1").unwrap().state == ConnectionState::Failed));
        assert!(registry.get_device("IED1").unwrap().last_error.is_some());
        assert!(!registry.is_running("IED1"));
    }

    #[test]
    fn test_signal_access_goes_through_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scl(&dir, "station.scd", STATION);

        let mut registry = registry();
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102).with_scd(&path), false)
            .unwrap();

        let status = Signal::new("stVal", "LD1/XCBR1.Pos.stVal").with_fc("ST");
        let err = registry.read_signal("IED1", status.clone()).unwrap_err();
        assert!(matches!(err, Error::NoWorker(_)));

        registry.connect_device("IED1").unwrap();
        assert!(pump_until(&mut registry, |r| r.is_running("IED1")));

        let outcome = registry
            .read_signal("IED1", status)
            .unwrap()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        match outcome {
            TaskOutcome::Read(signal) => assert!(signal.value.is_some()),
            other => panic!("unexpected outcome {:?}", other),
        }

        let oper = Signal::new("ctlVal", "LD1/CSWI1.Pos.Oper.ctlVal").with_fc("CO");
        let outcome = registry
            .send_control_command(
                "IED1",
                oper,
                ControlAction::SendCommand,
                Some(SignalValue::Bool(true)),
                ControlParams::default(),
            )
            .unwrap()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::Control(Ok(ControlState::Done(ControlOutcome::OperateSucceeded)))
        );

        registry.disconnect_device("IED1").unwrap();
        assert_eq!(registry.get_device("IED1").unwrap().state, ConnectionState::Disconnected);
        assert!(matches!(
            registry.read_signal("IED1", Signal::new("stVal", "LD1/XCBR1.Pos.stVal")),
            Err(Error::NoWorker(_))
        ));
    }

    #[test]
    fn test_is_controllable() {
        let mut registry = registry();
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102), false)
            .unwrap();
        registry
            .add_device(
                DeviceConfig::new("MB1", "10.0.0.5", 502).with_type(DeviceType::ModbusTcp),
                false,
            )
            .unwrap();
        registry
            .add_device(
                DeviceConfig::new("RTU1", "10.0.0.9", 2404).with_type(DeviceType::Iec104Rtu),
                false,
            )
            .unwrap();

        assert!(registry.is_controllable("IED1", "LD1/CSWI1.Pos.Oper.ctlVal"));
        assert!(!registry.is_controllable("IED1", "LD1/XCBR1.Pos.stVal"));
        assert!(!registry.is_controllable("MB1", "ctlVal"));
        // No adapter for IEC 104
        assert!(!registry.is_controllable("RTU1", "ctlVal"));
    }

    #[test]
    fn test_update_matches_by_endpoint() {
        let mut registry = registry();
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102), false)
            .unwrap();
        registry.subscriptions().subscribe(Subscription::new(
            "IED1",
            "LD1/XCBR1.Pos.stVal",
            "ST",
            SubscriptionMode::OnDemand,
            "watch",
        ));

        let mut changed = DeviceConfig::new("Bay7", "10.0.0.1", 102);
        changed.description = "renamed by the user".to_string();
        registry.update_device_config(changed).unwrap();

        assert!(registry.get_device("IED1").is_none());
        let device = registry.get_device("Bay7").unwrap();
        assert_eq!(device.config.description, "renamed by the user");
        assert!(registry.subscriptions().is_subscribed("Bay7", "LD1/XCBR1.Pos.stVal"));

        let err = registry
            .update_device_config(DeviceConfig::new("Other", "10.9.9.9", 102))
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[test]
    fn test_rename_collision() {
        let mut registry = registry();
        registry.add_device(DeviceConfig::new("A", "10.0.0.1", 102), false).unwrap();
        registry.add_device(DeviceConfig::new("B", "10.0.0.2", 102), false).unwrap();

        assert!(matches!(registry.rename_device("A", "B"), Err(Error::DeviceExists(_))));
        assert!(matches!(registry.rename_device("C", "D"), Err(Error::DeviceNotFound(_))));

        let report = registry.rename_device("A", "C").unwrap();
        assert!(report.is_clean());
        assert_eq!(report.step("adapter").unwrap().result, Ok(1));
        assert_eq!(report.step("worker").unwrap().result, Ok(0));
        assert_eq!(registry.device_names(), vec!["B", "C"]);
    }

    #[test]
    fn test_rename_continues_past_failed_step() {
        let mut registry = registry();
        let recorder = EventRecorder::new();
        registry.events().subscribe("*", recorder.clone());
        let tokens = Arc::new(ScriptTokens::new());
        tokens.set_script("interlock", "ok = {{TAG:A::LD1/XCBR1.Pos.stVal}}");
        registry.register_rewriter(Arc::new(BrokenRewriter));
        registry.register_rewriter(tokens.clone());

        registry.add_device(DeviceConfig::new("A", "10.0.0.1", 102), false).unwrap();
        registry.subscriptions().subscribe(Subscription::new(
            "A",
            "LD1/XCBR1.Pos.stVal",
            "ST",
            SubscriptionMode::ReadPolling,
            "live_data",
        ));

        let report = registry.rename_device("A", "B").unwrap();
        assert!(!report.is_clean());
        assert!(report.step("alarms").unwrap().result.is_err());
        assert_eq!(report.step("adapter").unwrap().result, Ok(1));
        assert_eq!(report.step("subscriptions").unwrap().result, Ok(1));
        assert_eq!(report.step("script_tokens").unwrap().result, Ok(1));

        assert_eq!(registry.device_names(), vec!["B"]);
        assert!(registry.subscriptions().is_subscribed("B", "LD1/XCBR1.Pos.stVal"));
        assert_eq!(tokens.script("interlock").unwrap(), "ok = {{TAG:B::LD1/XCBR1.Pos.stVal}}");

        let events = recorder.events();
        assert!(events.contains(&RegistryEvent::DeviceRemoved { device: "A".to_string() }));
        assert!(events.contains(&RegistryEvent::DeviceAdded { device: "B".to_string() }));
        assert!(events.contains(&RegistryEvent::DeviceRenamed {
            old: "A".to_string(),
            new: "B".to_string(),
        }));
    }

    #[test]
    fn test_save_and_load_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let scl = write_scl(&dir, "station.scd", STATION);
        let project = dir.path().join("devices.json");

        let mut registry = registry();
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102).with_scd(&scl), false)
            .unwrap();
        registry
            .add_device(DeviceConfig::new("IED2", "10.0.0.2", 102), false)
            .unwrap();
        registry.add_folder("Substation A", "North yard");
        registry.save_configuration(&project).unwrap();

        let mut loaded = DeviceRegistry::new(settings()).unwrap();
        let recorder = EventRecorder::new();
        loaded.events().subscribe("batch/*", recorder.clone());

        assert_eq!(loaded.load_configuration(&project).unwrap(), 2);
        assert_eq!(loaded.device_names(), vec!["IED1", "IED2"]);
        assert_eq!(loaded.folders().get("Substation A").map(String::as_str), Some("North yard"));
        assert_eq!(
            recorder.events(),
            vec![
                RegistryEvent::BatchLoadStarted { count: 2 },
                RegistryEvent::BatchLoadFinished { count: 2 },
            ]
        );
        assert!(pump_until(&mut loaded, |r| r.get_device("IED1").unwrap().root.is_some()));
    }

    #[test]
    fn test_scl_change_triggers_rediscovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scl(&dir, "station.scd", STATION);

        let mut registry = registry();
        registry
            .add_device(DeviceConfig::new("IED1", "10.0.0.1", 102).with_scd(&path), false)
            .unwrap();
        registry
            .add_device(DeviceConfig::new("IED2", "10.0.0.2", 102), false)
            .unwrap();
        let before = registry.get_device("IED1").unwrap().discovery_seq;

        registry
            .inbox_tx
            .send(RegistryMessage::SclFileChanged { path: path.clone() })
            .unwrap();
        // The rescheduled parse may already have landed too
        assert!(registry.process_pending() >= 1);
        assert_eq!(registry.get_device("IED1").unwrap().discovery_seq, before + 1);
        assert_eq!(registry.get_device("IED2").unwrap().discovery_seq, 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut registry = registry();
        let recorder = EventRecorder::new();
        registry.events().subscribe("*", recorder.clone());

        registry.add_device(DeviceConfig::new("A", "10.0.0.1", 102), false).unwrap();
        registry.add_device(DeviceConfig::new("B", "10.0.0.2", 102), false).unwrap();
        registry.subscriptions().subscribe(Subscription::new(
            "A",
            "LD1/XCBR1.Pos.stVal",
            "ST",
            SubscriptionMode::ReadPolling,
            "live_data",
        ));

        registry.remove_device("A").unwrap();
        assert!(registry.get_device("A").is_none());
        assert!(registry.subscriptions().get_subscriptions("A", None).is_empty());
        assert!(matches!(registry.remove_device("A"), Err(Error::DeviceNotFound(_))));

        registry.add_folder("F", "");
        registry.clear_all_devices();
        assert_eq!(registry.devices().count(), 0);
        assert!(registry.folders().is_empty());
        assert_eq!(recorder.types().last(), Some(&"project/cleared"));
    }
}
