//! Signals
//!
//! A signal is a single addressable data point (telemetry, status or command)
//! of a device model.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Integer ordinal to label map resolved from an SCL `EnumType`
pub type EnumMap = BTreeMap<i32, String>;

// ─────────────────────────────────────────────────────────────────────────────
// Tags
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of value a signal carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    #[default]
    Analog,
    Binary,
    DoubleBinary,
    Counter,
    Timestamp,
    Command,
    /// Enumerated status value
    State,
}

/// Quality of the last value read for a signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalQuality {
    Good,
    Invalid,
    #[default]
    NotConnected,
    Blocked,
}

/// Access mode of a signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    #[default]
    #[serde(rename = "RO")]
    ReadOnly,
    #[serde(rename = "WO")]
    WriteOnly,
    #[serde(rename = "RW")]
    ReadWrite,
}

impl AccessMode {
    /// Whether values may be written to a signal with this access mode
    pub fn is_writable(&self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadOnly => write!(f, "RO"),
            AccessMode::WriteOnly => write!(f, "WO"),
            AccessMode::ReadWrite => write!(f, "RW"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Values
// ─────────────────────────────────────────────────────────────────────────────

/// A value read from or written to a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SignalValue {
    /// Integer view of the value, if it has one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SignalValue::Bool(b) => Some(i64::from(*b)),
            SignalValue::Int(i) => Some(*i),
            SignalValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            SignalValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            SignalValue::Int(i) => Some(*i as f64),
            SignalValue::Float(f) => Some(*f),
            SignalValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Bool(b) => write!(f, "{}", b),
            SignalValue::Int(i) => write!(f, "{}", i),
            SignalValue::Float(v) => write!(f, "{}", v),
            SignalValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for SignalValue {
    fn from(value: bool) -> Self {
        SignalValue::Bool(value)
    }
}

impl From<i64> for SignalValue {
    fn from(value: i64) -> Self {
        SignalValue::Int(value)
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        SignalValue::Float(value)
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        SignalValue::Text(value.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signal
// ─────────────────────────────────────────────────────────────────────────────

/// A single data point of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Leaf name (e.g. "stVal")
    pub name: String,
    /// Dotted protocol address (e.g. "LD1/XCBR1.Pos.stVal")
    pub address: String,
    /// Device-wide unique tag: "Device::address[#n]"
    #[serde(default)]
    pub unique_address: String,
    /// Functional constraint (IEC 61850), empty for other protocols
    #[serde(default)]
    pub fc: String,
    #[serde(default)]
    pub access: AccessMode,
    #[serde(default)]
    pub signal_type: SignalType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enum_map: Option<EnumMap>,

    /// Last value read, if any
    #[serde(default)]
    pub value: Option<SignalValue>,
    #[serde(default)]
    pub quality: SignalQuality,
    /// When the value was last read
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// When the value last changed
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
    /// Error attached by a failed read
    #[serde(default)]
    pub error: String,
}

impl Signal {
    /// Create a read-only analog signal with no value
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            unique_address: String::new(),
            fc: String::new(),
            access: AccessMode::default(),
            signal_type: SignalType::default(),
            description: None,
            enum_map: None,
            value: None,
            quality: SignalQuality::default(),
            timestamp: None,
            last_changed: None,
            error: String::new(),
        }
    }

    pub fn with_fc(mut self, fc: impl Into<String>) -> Self {
        self.fc = fc.into();
        self
    }

    pub fn with_type(mut self, signal_type: SignalType) -> Self {
        self.signal_type = signal_type;
        self
    }

    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enum_map(mut self, enum_map: EnumMap) -> Self {
        self.enum_map = Some(enum_map);
        self
    }

    /// Record a freshly read value
    ///
    /// `last_changed` only moves when the value differs from the previous one.
    pub fn set_value(&mut self, value: SignalValue) {
        let now = Utc::now();
        if self.value.as_ref() != Some(&value) {
            self.last_changed = Some(now);
        }
        self.value = Some(value);
        self.timestamp = Some(now);
        self.quality = SignalQuality::Good;
        self.error.clear();
    }

    /// Tag the signal as failed without discarding its last value
    pub fn mark_failed(&mut self, quality: SignalQuality, error: impl Into<String>) {
        self.quality = quality;
        self.error = error.into();
        self.timestamp = Some(Utc::now());
    }

    /// Label of the current value according to the enum map
    pub fn enum_label(&self) -> Option<&str> {
        let ordinal = self.value.as_ref()?.as_i64()?;
        let ordinal = i32::try_from(ordinal).ok()?;
        self.enum_map.as_ref()?.get(&ordinal).map(String::as_str)
    }

    pub fn is_writable(&self) -> bool {
        self.access.is_writable()
    }
}
