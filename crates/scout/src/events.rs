//! Registry Events
//!
//! Everything the engine tells its collaborators goes through the
//! [`EventBus`]: typed listeners registered per event-name pattern, plus a
//! broadcast channel for async consumers.

use std::sync::Arc;

use parking_lot::RwLock;
use scout_model::Signal;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;
use wildmatch::WildMatch;

use crate::types::ConnectionState;

// ─────────────────────────────────────────────────────────────────────────────
// Event
// ─────────────────────────────────────────────────────────────────────────────

/// An event fired by the device registry, its workers or the subscription
/// registry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    DeviceAdded { device: String },
    DeviceRemoved { device: String },
    DeviceUpdated { device: String },
    DeviceRenamed { old: String, new: String },
    StatusChanged { device: String, state: ConnectionState },
    SignalUpdated { device: String, signal: Signal },
    ConnectionProgress { device: String, percent: u8, message: String },
    SubscriptionsChanged { device: String },
    BatchLoadStarted { count: usize },
    BatchLoadFinished { count: usize },
    ProjectCleared,
}

impl RegistryEvent {
    /// Event name used for listener pattern matching
    pub fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::DeviceAdded { .. } => "device/added",
            RegistryEvent::DeviceRemoved { .. } => "device/removed",
            RegistryEvent::DeviceUpdated { .. } => "device/updated",
            RegistryEvent::DeviceRenamed { .. } => "device/renamed",
            RegistryEvent::StatusChanged { .. } => "device/status",
            RegistryEvent::SignalUpdated { .. } => "signal/updated",
            RegistryEvent::ConnectionProgress { .. } => "connection/progress",
            RegistryEvent::SubscriptionsChanged { .. } => "subscriptions/changed",
            RegistryEvent::BatchLoadStarted { .. } => "batch/started",
            RegistryEvent::BatchLoadFinished { .. } => "batch/finished",
            RegistryEvent::ProjectCleared => "project/cleared",
        }
    }

    /// Device the event concerns, if any
    pub fn device(&self) -> Option<&str> {
        match self {
            RegistryEvent::DeviceAdded { device }
            | RegistryEvent::DeviceRemoved { device }
            | RegistryEvent::DeviceUpdated { device }
            | RegistryEvent::StatusChanged { device, .. }
            | RegistryEvent::SignalUpdated { device, .. }
            | RegistryEvent::ConnectionProgress { device, .. }
            | RegistryEvent::SubscriptionsChanged { device } => Some(device),
            RegistryEvent::DeviceRenamed { new, .. } => Some(new),
            _ => None,
        }
    }

    /// Check if this event matches a listener pattern
    ///
    /// Patterns support:
    /// - Exact match: "device/added"
    /// - Wildcard suffix: "device/*" matches every device event
    /// - Global wildcard: "*"
    /// - Glob: "*/updated"
    pub fn matches(&self, pattern: &str) -> bool {
        let event_type = self.event_type();
        if pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix('*').filter(|p| p.ends_with('/')) {
            if !prefix[..prefix.len() - 1].contains(['*', '?']) {
                return event_type.starts_with(prefix);
            }
        }
        if pattern.contains(['*', '?']) {
            return WildMatch::new(pattern).matches(event_type);
        }
        event_type == pattern
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listeners
// ─────────────────────────────────────────────────────────────────────────────

/// A typed event listener
///
/// Listeners run synchronously on the thread that publishes the event, which
/// may be a protocol worker. Keep them short.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &RegistryEvent);
}

/// Listener registration id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

struct Registration {
    id: ListenerId,
    pattern: String,
    listener: Arc<dyn EventListener>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Bus
// ─────────────────────────────────────────────────────────────────────────────

/// Publish/subscribe hub for registry events
pub struct EventBus {
    listeners: RwLock<Vec<Registration>>,
    tx: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    /// Create a bus whose broadcast channel holds `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            tx,
        }
    }

    /// Register a listener for every event matching `pattern`
    pub fn subscribe(&self, pattern: impl Into<String>, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.listeners.write().push(Registration {
            id,
            pattern: pattern.into(),
            listener,
        });
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    /// Receiver for async consumers
    pub fn receiver(&self) -> broadcast::Receiver<RegistryEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Publish an event to matching listeners and the broadcast channel
    pub fn publish(&self, event: RegistryEvent) {
        let targets: Vec<Arc<dyn EventListener>> = self
            .listeners
            .read()
            .iter()
            .filter(|r| event.matches(&r.pattern))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in targets {
            listener.on_event(&event);
        }

        // No receivers is not an error
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Listener collecting every event it sees, for tests and diagnostics
#[derive(Default)]
pub struct EventRecorder {
    events: parking_lot::Mutex<Vec<RegistryEvent>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<RegistryEvent> {
        self.events.lock().clone()
    }

    /// Event names seen so far, in order
    pub fn types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(RegistryEvent::event_type).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventListener for EventRecorder {
    fn on_event(&self, event: &RegistryEvent) {
        self.events.lock().push(event.clone());
    }
}
