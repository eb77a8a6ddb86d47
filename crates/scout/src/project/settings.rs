//! Application Settings
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `SCOUT_*` environment variables (`SCOUT_POLL_INTERVAL_MS=500`).

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::control::ControlDefaults;
use crate::types::{Error, Result};

/// Default settings file name, looked up in the working directory
pub const SETTINGS_FILE: &str = "scout.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Poll interval for devices without their own, in milliseconds
    pub poll_interval_ms: u64,
    /// Size of the background SCL parse pool
    pub parse_workers: usize,
    /// Idle tick of protocol workers, in milliseconds
    pub worker_tick_ms: u64,
    pub sbo_timeout_ms: u64,
    pub originator_identity: String,
    pub originator_category: i32,
    /// tracing filter used when RUST_LOG is unset
    pub log_filter: String,
    pub watch_scl_files: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            parse_workers: 2,
            worker_tick_ms: 100,
            sbo_timeout_ms: 10_000,
            originator_identity: "ScadaScout".to_string(),
            originator_category: 2,
            log_filter: "scout=info,scl_compiler=info".to_string(),
            watch_scl_files: true,
        }
    }
}

impl Settings {
    /// Load settings from `path` (missing file is fine) and the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SCOUT_"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn worker_tick(&self) -> Duration {
        Duration::from_millis(self.worker_tick_ms.max(1))
    }

    pub fn control_defaults(&self) -> ControlDefaults {
        ControlDefaults {
            originator_category: self.originator_category,
            originator_identity: self.originator_identity.clone(),
            sbo_timeout: Duration::from_millis(self.sbo_timeout_ms),
        }
    }
}
