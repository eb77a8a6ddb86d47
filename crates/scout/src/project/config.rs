//! Project Configuration Types
//!
//! Defines the persisted device list (`devices.json`) and its entries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Result;

/// Protocol family of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceType {
    Iec104Rtu,
    #[default]
    Iec61850Ied,
    Iec61850Server,
    ModbusTcp,
    ModbusServer,
    Unknown,
}

impl DeviceType {
    pub const ALL: [DeviceType; 6] = [
        DeviceType::Iec104Rtu,
        DeviceType::Iec61850Ied,
        DeviceType::Iec61850Server,
        DeviceType::ModbusTcp,
        DeviceType::ModbusServer,
        DeviceType::Unknown,
    ];

    /// Label used in persisted device lists
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Iec104Rtu => "IEC 60870-5-104 RTU",
            DeviceType::Iec61850Ied => "IEC 61850 IED",
            DeviceType::Iec61850Server => "IEC 61850 Simulator (Server)",
            DeviceType::ModbusTcp => "Modbus TCP",
            DeviceType::ModbusServer => "Modbus Slave Server",
            DeviceType::Unknown => "Unknown",
        }
    }

    pub fn is_iec61850(&self) -> bool {
        matches!(self, DeviceType::Iec61850Ied | DeviceType::Iec61850Server)
    }

    pub fn is_modbus(&self) -> bool {
        matches!(self, DeviceType::ModbusTcp | DeviceType::ModbusServer)
    }
}

impl From<String> for DeviceType {
    fn from(label: String) -> Self {
        DeviceType::ALL
            .into_iter()
            .find(|t| t.as_str() == label)
            .unwrap_or(DeviceType::Unknown)
    }
}

impl From<DeviceType> for String {
    fn from(device_type: DeviceType) -> Self {
        device_type.as_str().to_string()
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A block of Modbus registers exposed as signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusRegisterMap {
    pub start_address: u16,
    pub count: u16,
    /// Modbus function code: 1 coils, 2 discrete inputs, 3 holding, 4 input
    pub function_code: u8,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default)]
    pub name_prefix: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

impl ModbusRegisterMap {
    /// Whether the block holds single bits (coils or discrete inputs)
    pub fn is_bit_block(&self) -> bool {
        matches!(self.function_code, 1 | 2)
    }

    /// Whether the block can be written (coils and holding registers)
    pub fn is_writable(&self) -> bool {
        matches!(self.function_code, 1 | 3)
    }
}

fn default_data_type() -> String {
    "Unsigned 16-bit".to_string()
}

fn default_scale() -> f64 {
    1.0
}

/// Configuration required to reach a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub ip_address: String,
    pub port: u16,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub scd_file_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub use_scd_discovery: bool,
    #[serde(default)]
    pub protocol_params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub polling_enabled: bool,
    /// Poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    #[serde(default = "default_unit_id")]
    pub modbus_unit_id: u8,
    /// Modbus timeout in seconds
    #[serde(default = "default_modbus_timeout")]
    pub modbus_timeout: f64,
    #[serde(default)]
    pub modbus_register_maps: Vec<ModbusRegisterMap>,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_unit_id() -> u8 {
    1
}

fn default_modbus_timeout() -> f64 {
    3.0
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>, ip_address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            ip_address: ip_address.into(),
            port,
            folder: String::new(),
            description: String::new(),
            device_type: DeviceType::default(),
            enabled: true,
            scd_file_path: None,
            use_scd_discovery: true,
            protocol_params: serde_json::Map::new(),
            polling_enabled: false,
            poll_interval: default_poll_interval(),
            modbus_unit_id: default_unit_id(),
            modbus_timeout: default_modbus_timeout(),
            modbus_register_maps: Vec::new(),
        }
    }

    pub fn with_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn with_scd(mut self, path: impl Into<PathBuf>) -> Self {
        self.scd_file_path = Some(path.into());
        self
    }

    /// SCL file to discover from, if discovery from SCL is enabled
    pub fn scl_source(&self) -> Option<&Path> {
        self.scd_file_path
            .as_deref()
            .filter(|_| self.use_scd_discovery)
    }

    /// Same network endpoint as `other`
    pub fn same_endpoint(&self, other: &DeviceConfig) -> bool {
        self.ip_address == other.ip_address && self.port == other.port
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Project File
// ─────────────────────────────────────────────────────────────────────────────

/// Persisted device list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Folder name → description
    #[serde(default)]
    pub folders: BTreeMap<String, String>,
}

/// Accepted on-disk shapes; older files are a bare device list
#[derive(Deserialize)]
#[serde(untagged)]
enum ProjectRepr {
    Full(ProjectFile),
    Devices(Vec<DeviceConfig>),
}

impl ProjectFile {
    pub fn from_json(content: &str) -> Result<Self> {
        let project = match serde_json::from_str::<ProjectRepr>(content)? {
            ProjectRepr::Full(project) => project,
            ProjectRepr::Devices(devices) => ProjectFile {
                devices,
                folders: BTreeMap::new(),
            },
        };
        Ok(project)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let project = Self::from_json(&content)?;
        info!("Loaded {} devices from {}", project.devices.len(), path.display());
        Ok(project)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved {} devices to {}", self.devices.len(), path.display());
        Ok(())
    }
}
