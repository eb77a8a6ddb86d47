//! Subscription Registry
//!
//! Single source of truth for what is polled or reported per device.
//! Workers read it on every poll cycle; features add and remove their own
//! subscriptions tagged with a `source` so that one feature clearing its data
//! never disturbs another's.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::events::{EventBus, RegistryEvent};

/// How a subscribed value is kept current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionMode {
    /// Read by the device's worker on every poll cycle
    ReadPolling,
    /// Delivered by the device through report control blocks
    Reporting,
    /// Read only when explicitly requested
    OnDemand,
}

impl std::fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionMode::ReadPolling => write!(f, "READ_POLLING"),
            SubscriptionMode::Reporting => write!(f, "REPORTING"),
            SubscriptionMode::OnDemand => write!(f, "ON_DEMAND"),
        }
    }
}

/// An immutable subscription value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subscription {
    pub device: String,
    pub mms_path: String,
    pub fc: String,
    pub mode: SubscriptionMode,
    /// Feature that owns the subscription (e.g. "live_data")
    pub source: String,
}

impl Subscription {
    pub fn new(
        device: impl Into<String>,
        mms_path: impl Into<String>,
        fc: impl Into<String>,
        mode: SubscriptionMode,
        source: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            mms_path: mms_path.into(),
            fc: fc.into(),
            mode,
            source: source.into(),
        }
    }

    /// Same subscription under another device name
    pub fn for_device(&self, device: &str) -> Self {
        Self {
            device: device.to_string(),
            ..self.clone()
        }
    }
}

/// Per-device sets of subscriptions
#[derive(Default)]
pub struct SubscriptionRegistry {
    by_device: RwLock<HashMap<String, HashSet<Subscription>>>,
    events: Option<Arc<EventBus>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that announces changes on `events`
    pub fn with_events(events: Arc<EventBus>) -> Self {
        Self {
            by_device: RwLock::new(HashMap::new()),
            events: Some(events),
        }
    }

    fn changed(&self, device: &str) {
        if let Some(events) = &self.events {
            events.publish(RegistryEvent::SubscriptionsChanged {
                device: device.to_string(),
            });
        }
    }

    /// Add a subscription; returns false if it already existed
    pub fn subscribe(&self, sub: Subscription) -> bool {
        let device = sub.device.clone();
        let added = {
            let mut by_device = self.by_device.write();
            let set = by_device.entry(device.clone()).or_default();
            if set.contains(&sub) {
                false
            } else {
                info!("Subscribed: {} {} [{}] via {}", sub.device, sub.mms_path, sub.mode, sub.source);
                set.insert(sub)
            }
        };
        if added {
            self.changed(&device);
        }
        added
    }

    /// Remove a subscription; returns false if it did not exist
    pub fn unsubscribe(&self, sub: &Subscription) -> bool {
        let removed = self
            .by_device
            .write()
            .get_mut(&sub.device)
            .is_some_and(|set| set.remove(sub));
        if removed {
            debug!("Unsubscribed: {} {} via {}", sub.device, sub.mms_path, sub.source);
            self.changed(&sub.device);
        }
        removed
    }

    /// Remove every subscription of a device, or only those of one source
    ///
    /// Returns the number removed.
    pub fn unsubscribe_all(&self, device: &str, source: Option<&str>) -> usize {
        let removed = {
            let mut by_device = self.by_device.write();
            let Some(set) = by_device.get_mut(device) else {
                return 0;
            };
            match source {
                None => {
                    let count = set.len();
                    set.clear();
                    info!("Unsubscribed all for {}", device);
                    count
                }
                Some(source) => {
                    let before = set.len();
                    set.retain(|s| s.source != source);
                    let count = before - set.len();
                    if count == 0 {
                        return 0;
                    }
                    info!("Unsubscribed {} items for {} (source={})", count, device, source);
                    count
                }
            }
        };
        self.changed(device);
        removed
    }

    /// Subscriptions of a device, optionally filtered by mode, in stable order
    pub fn get_subscriptions(&self, device: &str, mode: Option<SubscriptionMode>) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .by_device
            .read()
            .get(device)
            .map(|set| {
                set.iter()
                    .filter(|s| mode.is_none_or(|m| s.mode == m))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        subs.sort();
        subs
    }

    /// Whether any subscription exists for `mms_path` (linear scan)
    pub fn is_subscribed(&self, device: &str, mms_path: &str) -> bool {
        self.by_device
            .read()
            .get(device)
            .is_some_and(|set| set.iter().any(|s| s.mms_path == mms_path))
    }

    /// Move every subscription of `old` under `new`; returns the number moved
    pub fn rename_device(&self, old: &str, new: &str) -> usize {
        if old.is_empty() || new.is_empty() || old == new {
            return 0;
        }

        let moved = {
            let mut by_device = self.by_device.write();
            let Some(old_set) = by_device.remove(old) else {
                return 0;
            };
            let count = old_set.len();
            let new_set = by_device.entry(new.to_string()).or_default();
            new_set.extend(old_set.iter().map(|s| s.for_device(new)));
            count
        };

        info!("Renamed subscriptions: {} -> {}", old, new);
        self.changed(old);
        self.changed(new);
        moved
    }

    /// Devices with at least one subscription
    pub fn devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self
            .by_device
            .read()
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(device, _)| device.clone())
            .collect();
        devices.sort();
        devices
    }

    /// Forget a device entirely
    pub fn remove_device(&self, device: &str) {
        if self.by_device.write().remove(device).is_some() {
            self.changed(device);
        }
    }

    pub fn clear(&self) {
        self.by_device.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRecorder;

    fn poll(device: &str, path: &str, source: &str) -> Subscription {
        Subscription::new(device, path, "ST", SubscriptionMode::ReadPolling, source)
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.subscribe(poll("IED1", "LD1/XCBR1.Pos.stVal", "live_data")));
        assert!(!registry.subscribe(poll("IED1", "LD1/XCBR1.Pos.stVal", "live_data")));

        assert_eq!(registry.get_subscriptions("IED1", None).len(), 1);
        assert!(registry.is_subscribed("IED1", "LD1/XCBR1.Pos.stVal"));
        assert!(!registry.is_subscribed("IED1", "LD1/XCBR1.Pos.q"));
        assert!(!registry.is_subscribed("IED2", "LD1/XCBR1.Pos.stVal"));
    }

    #[test]
    fn test_unsubscribe() {
        let registry = SubscriptionRegistry::new();
        let sub = poll("IED1", "LD1/XCBR1.Pos.stVal", "live_data");
        registry.subscribe(sub.clone());

        assert!(registry.unsubscribe(&sub));
        assert!(!registry.unsubscribe(&sub));
        assert!(registry.get_subscriptions("IED1", None).is_empty());
    }

    #[test]
    fn test_scoped_unsubscribe_all() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(poll("IED1", "LD1/XCBR1.Pos.stVal", "live_data"));
        registry.subscribe(poll("IED1", "LD1/MMXU1.TotW.mag.f", "live_data"));
        registry.subscribe(poll("IED1", "LD1/XCBR1.Pos.stVal", "historian"));

        assert_eq!(registry.unsubscribe_all("IED1", Some("live_data")), 2);
        let remaining = registry.get_subscriptions("IED1", None);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].source, "historian");

        assert_eq!(registry.unsubscribe_all("IED1", Some("live_data")), 0);
        assert_eq!(registry.unsubscribe_all("IED1", None), 1);
        assert_eq!(registry.unsubscribe_all("missing", None), 0);
    }

    #[test]
    fn test_filter_by_mode() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(poll("IED1", "LD1/XCBR1.Pos.stVal", "live_data"));
        registry.subscribe(Subscription::new(
            "IED1",
            "LD1/LLN0.RCB1",
            "BR",
            SubscriptionMode::Reporting,
            "reports",
        ));

        let polled = registry.get_subscriptions("IED1", Some(SubscriptionMode::ReadPolling));
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].mms_path, "LD1/XCBR1.Pos.stVal");
    }

    #[test]
    fn test_rename_device() {
        let events = Arc::new(EventBus::default());
        let recorder = EventRecorder::new();
        events.subscribe("subscriptions/*", recorder.clone());
        let registry = SubscriptionRegistry::with_events(events);

        registry.subscribe(poll("Bay1", "LD1/XCBR1.Pos.stVal", "live_data"));
        registry.subscribe(poll("IED1", "LD1/XCBR1.Pos.q", "live_data"));
        recorder.clear();

        assert_eq!(registry.rename_device("Bay1", "IED1"), 1);
        assert!(registry.get_subscriptions("Bay1", None).is_empty());

        let moved = registry.get_subscriptions("IED1", None);
        assert_eq!(moved.len(), 2);
        assert!(moved.iter().all(|s| s.device == "IED1"));
        assert_eq!(
            recorder.events(),
            vec![
                RegistryEvent::SubscriptionsChanged {
                    device: "Bay1".to_string()
                },
                RegistryEvent::SubscriptionsChanged {
                    device: "IED1".to_string()
                },
            ]
        );

        assert_eq!(registry.rename_device("IED1", "IED1"), 0);
        assert_eq!(registry.rename_device("", "X"), 0);
    }

    #[test]
    fn test_serialized_shape() {
        let sub = poll("IED1", "LD1/XCBR1.Pos.stVal", "live_data");
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["mode"], "READ_POLLING");
        assert_eq!(json["mms_path"], "LD1/XCBR1.Pos.stVal");
    }
}
