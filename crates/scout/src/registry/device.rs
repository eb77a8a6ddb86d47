use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use scout_model::{Node, Signal};
use serde::Serialize;
use uuid::Uuid;

use super::inbox::DeviceId;
use crate::project::DeviceConfig;
use crate::types::ConnectionState;
use crate::worker::SignalIndex;

/// Runtime representation of a configured device
#[derive(Debug, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub config: DeviceConfig,
    pub state: ConnectionState,
    /// Discovered model; replaced wholesale on every rediscovery
    pub root: Option<Node>,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    #[serde(skip)]
    pub(crate) signals: SignalIndex,
    /// Latest offline discovery request
    #[serde(skip)]
    pub(crate) discovery_seq: u64,
    /// Latest connection attempt
    #[serde(skip)]
    pub(crate) connect_seq: u64,
    /// Connection generation shared with the device's workers
    #[serde(skip)]
    pub(crate) session: Arc<AtomicU64>,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            state: ConnectionState::Disconnected,
            root: None,
            last_poll: None,
            last_error: None,
            signals: SignalIndex::default(),
            discovery_seq: 0,
            connect_seq: 0,
            session: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Signal by its unique address ("Device::path[#n]")
    pub fn signal(&self, unique_address: &str) -> Option<&Signal> {
        self.root.as_ref()?.find_unique(unique_address)
    }

    /// Replace the model and rebuild the address index
    pub(crate) fn set_root(&mut self, root: Node) {
        let mut index = HashMap::new();
        root.walk_signals(&mut |signal| {
            index
                .entry(signal.address.clone())
                .or_insert_with(|| signal.clone());
        });
        *self.signals.write() = index;
        self.root = Some(root);
    }

    /// Copy freshly read values into the model and the address index
    pub(crate) fn apply_values(&mut self, signals: &[Signal]) -> usize {
        let Some(root) = self.root.as_mut() else {
            return 0;
        };
        let by_address: HashMap<&str, &Signal> = signals.iter().map(|s| (s.address.as_str(), s)).collect();

        let mut index = self.signals.write();
        for (address, read) in &by_address {
            if let Some(entry) = index.get_mut(*address) {
                entry.value = read.value.clone();
                entry.quality = read.quality;
                entry.timestamp = read.timestamp;
            }
        }
        drop(index);

        let mut applied = 0;
        root.walk_signals_mut(&mut |signal| {
            if let Some(read) = by_address.get(signal.address.as_str()) {
                signal.value = read.value.clone();
                signal.quality = read.quality;
                signal.timestamp = read.timestamp;
                signal.last_changed = read.last_changed.or(signal.last_changed);
                signal.error = read.error.clone();
                applied += 1;
            }
        });
        applied
    }
}

/// Assign `"device::address"` to every signal, suffixing `#n` for the n-th
/// occurrence of the same address
///
/// Returns the number of duplicates found.
pub fn assign_unique_addresses(device: &str, root: &mut Node) -> usize {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut duplicates = 0;

    root.walk_signals_mut(&mut |signal| {
        let count = seen.entry(signal.address.clone()).or_insert(0);
        *count += 1;
        signal.unique_address = if *count == 1 {
            format!("{}::{}", device, signal.address)
        } else {
            duplicates += 1;
            format!("{}::{}#{}", device, signal.address, count)
        };
    });

    duplicates
}
