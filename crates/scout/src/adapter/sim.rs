//! Simulated protocol adapter
//!
//! Stands in for a field device: its model is the device's offline model.
//! Reads
//! return deterministic values, writes are remembered and control follows
//! the object's control model.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use scl_compiler::SclCache;
use scout_model::{Node, Signal, SignalType, SignalValue};
use tracing::info;

use super::offline::offline_model;
use super::{AdapterError, AdapterResult, ControlCapability, ControlParams, ProtocolAdapter, SignalWriter, UpdateSink};
use crate::control::ControlModel;
use crate::project::DeviceConfig;

pub struct SimulatedAdapter {
    config: DeviceConfig,
    cache: Arc<SclCache>,
    connected: bool,
    /// Values written (or operated) by address
    values: HashMap<String, SignalValue>,
    /// Control objects currently selected
    selected: HashSet<String>,
    reads: u64,
    sink: Option<UpdateSink>,
}

impl SimulatedAdapter {
    pub fn new(config: DeviceConfig, cache: Arc<SclCache>) -> Self {
        Self {
            config,
            cache,
            connected: false,
            values: HashMap::new(),
            selected: HashSet::new(),
            reads: 0,
            sink: None,
        }
    }

    /// Number of reads served so far
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Stable synthetic value for a signal
    fn synthetic_value(&self, signal: &Signal) -> SignalValue {
        let seed = signal
            .address
            .bytes()
            .fold(17u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));

        match signal.signal_type {
            SignalType::Binary | SignalType::Command => SignalValue::Bool(seed % 2 == 0),
            // 1 = off, 2 = on
            SignalType::DoubleBinary => SignalValue::Int(1 + (seed % 2) as i64),
            SignalType::Counter => SignalValue::Int(self.reads as i64),
            SignalType::State => {
                let first = signal
                    .enum_map
                    .as_ref()
                    .and_then(|m| m.keys().next().copied())
                    .unwrap_or(1);
                SignalValue::Int(i64::from(first))
            }
            SignalType::Timestamp => SignalValue::Text(chrono::Utc::now().to_rfc3339()),
            SignalType::Analog => SignalValue::Float((seed % 10_000) as f64 / 10.0),
        }
    }
}

impl ProtocolAdapter for SimulatedAdapter {
    fn connect(&mut self) -> AdapterResult<()> {
        if !self.config.enabled {
            return Err(AdapterError::Rejected(format!("{} is disabled", self.config.name)));
        }
        self.connected = true;
        info!("Simulated connection to {}:{}", self.config.ip_address, self.config.port);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.selected.clear();
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn discover(&mut self) -> Node {
        offline_model(&self.config, &self.cache)
    }

    fn read_signal(&mut self, signal: &Signal) -> AdapterResult<Signal> {
        if !self.connected {
            return Err(AdapterError::NotConnected);
        }
        self.reads += 1;

        let value = match self.values.get(&signal.address) {
            Some(value) => value.clone(),
            None => self.synthetic_value(signal),
        };
        let mut result = signal.clone();
        result.set_value(value);
        Ok(result)
    }

    fn set_update_sink(&mut self, sink: UpdateSink) {
        self.sink = Some(sink);
    }

    fn writer(&mut self) -> Option<&mut dyn SignalWriter> {
        Some(self)
    }

    fn controller(&mut self) -> Option<&mut dyn ControlCapability> {
        if self.config.device_type.is_iec61850() {
            Some(self)
        } else {
            None
        }
    }
}

impl SignalWriter for SimulatedAdapter {
    fn write_signal(&mut self, signal: &Signal, value: &SignalValue) -> AdapterResult<()> {
        if !self.connected {
            return Err(AdapterError::NotConnected);
        }
        if !signal.is_writable() {
            return Err(AdapterError::Rejected(format!("{} is read-only", signal.address)));
        }
        self.values.insert(signal.address.clone(), value.clone());
        Ok(())
    }
}

impl ControlCapability for SimulatedAdapter {
    fn control_model(&mut self, object_ref: &str) -> Option<ControlModel> {
        if let Some(value) = self.values.get(&format!("{}.ctlModel", object_ref)) {
            return value.as_i64().map(ControlModel::from_ctl_model);
        }
        if object_ref.to_ascii_uppercase().contains("SBO") {
            Some(ControlModel::SboNormal)
        } else {
            Some(ControlModel::DirectNormal)
        }
    }

    fn select(&mut self, signal: &Signal, _value: Option<&SignalValue>, _params: &ControlParams) -> AdapterResult<()> {
        if !self.connected {
            return Err(AdapterError::NotConnected);
        }
        let object_ref = crate::control::control_object_ref(&signal.address).to_string();
        if !self.selected.insert(object_ref.clone()) {
            return Err(AdapterError::Rejected(format!("{} already selected", object_ref)));
        }
        Ok(())
    }

    fn operate(&mut self, signal: &Signal, value: &SignalValue, _params: &ControlParams) -> AdapterResult<()> {
        if !self.connected {
            return Err(AdapterError::NotConnected);
        }
        let object_ref = crate::control::control_object_ref(&signal.address).to_string();
        self.selected.remove(&object_ref);
        self.values.insert(signal.address.clone(), value.clone());

        // The status attribute follows the command
        if let Some(sink) = &self.sink {
            let status = match value {
                SignalValue::Bool(true) => SignalValue::Int(2),
                SignalValue::Bool(false) => SignalValue::Int(1),
                other => other.clone(),
            };
            let mut st_val = Signal::new("stVal", format!("{}.stVal", object_ref))
                .with_fc("ST")
                .with_type(SignalType::DoubleBinary);
            st_val.set_value(status.clone());
            self.values.insert(st_val.address.clone(), status);
            sink.publish(st_val);
        }
        Ok(())
    }

    fn cancel(&mut self, signal: &Signal, _params: &ControlParams) -> AdapterResult<()> {
        let object_ref = crate::control::control_object_ref(&signal.address);
        self.selected.remove(object_ref);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, EventRecorder};
    use crate::project::{DeviceType, ModbusRegisterMap};
    use scl_compiler::ERROR_NO_SCD;
    use scout_model::AccessMode;
    use crate::testing::{write_scl, STATION};

    fn connected(config: DeviceConfig) -> SimulatedAdapter {
        let mut adapter = SimulatedAdapter::new(config, Arc::new(SclCache::new()));
        adapter.connect().unwrap();
        adapter
    }

    #[test]
    fn test_discover_from_scl_falls_back_to_first_ied() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scl(&dir, "station.scd", STATION);

        let mut adapter = connected(DeviceConfig::new("Bay1", "10.0.0.1", 102).with_scd(&path));
        let root = adapter.discover();
        assert_eq!(root.name, "IED1");
        assert!(root.find_signal("LD1/XCBR1.Pos.stVal").is_some());
    }

    #[test]
    fn test_discover_without_scl() {
        let mut adapter = connected(DeviceConfig::new("IED1", "10.0.0.1", 102));
        let root = adapter.discover();
        assert!(root.is_error());
        assert_eq!(root.name, ERROR_NO_SCD);
    }

    #[test]
    fn test_modbus_tree() {
        let mut config = DeviceConfig::new("MB1", "10.0.0.5", 502).with_type(DeviceType::ModbusTcp);
        config.modbus_register_maps.push(ModbusRegisterMap {
            start_address: 10,
            count: 3,
            function_code: 1,
            data_type: "Boolean".to_string(),
            name_prefix: "CO".to_string(),
            description: String::new(),
            scale: 1.0,
            offset: 0.0,
        });
        let mut adapter = connected(config);
        let root = adapter.discover();

        assert_eq!(root.signal_count(), 3);
        let coil = root.find_signal("1:11").unwrap();
        assert_eq!(coil.name, "CO11");
        assert_eq!(coil.signal_type, SignalType::Binary);
        assert!(coil.is_writable());
        assert!(adapter.controller().is_none());
    }

    #[test]
    fn test_reads_are_deterministic() {
        let mut adapter = connected(DeviceConfig::new("IED1", "10.0.0.1", 102));
        let signal = Signal::new("mag", "LD1/MMXU1.TotW.mag.f");

        let first = adapter.read_signal(&signal).unwrap();
        let second = adapter.read_signal(&signal).unwrap();
        assert_eq!(first.value, second.value);
        assert_eq!(adapter.reads(), 2);

        adapter.disconnect();
        assert_eq!(adapter.read_signal(&signal).unwrap_err(), AdapterError::NotConnected);
    }

    #[test]
    fn test_write_then_read() {
        let mut adapter = connected(DeviceConfig::new("IED1", "10.0.0.1", 102));
        let setting = Signal::new("setVal", "LD1/PTOC1.StrVal.setMag.f")
            .with_fc("SP")
            .with_access(AccessMode::ReadWrite);
        let value = SignalValue::Float(1.5);

        adapter.writer().unwrap().write_signal(&setting, &value).unwrap();
        assert_eq!(adapter.read_signal(&setting).unwrap().value, Some(value));

        let status = Signal::new("stVal", "LD1/XCBR1.Pos.stVal");
        let err = adapter
            .writer()
            .unwrap()
            .write_signal(&status, &SignalValue::Int(2))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Rejected(_)));
    }

    #[test]
    fn test_control_models_and_operate() {
        let bus = Arc::new(EventBus::default());
        let recorder = EventRecorder::new();
        bus.subscribe("signal/*", recorder.clone());

        let mut adapter = connected(DeviceConfig::new("IED1", "10.0.0.1", 102));
        let sink = UpdateSink::new("IED1", bus);
        adapter.set_update_sink(sink.clone());
        let ctl = adapter.controller().unwrap();

        assert_eq!(ctl.control_model("LD1/CSWI1.Pos"), Some(ControlModel::DirectNormal));
        assert_eq!(ctl.control_model("LD1/SBOCSWI1.Pos"), Some(ControlModel::SboNormal));

        let oper = Signal::new("ctlVal", "LD1/CSWI1.Pos.Oper.ctlVal").with_fc("CO");
        ctl.select(&oper, None, &ControlParams::default()).unwrap();
        assert!(ctl.select(&oper, None, &ControlParams::default()).is_err());
        ctl.operate(&oper, &SignalValue::Bool(true), &ControlParams::default())
            .unwrap();

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            crate::events::RegistryEvent::SignalUpdated { device, signal } => {
                assert_eq!(device, "IED1");
                assert_eq!(signal.address, "LD1/CSWI1.Pos.stVal");
                assert_eq!(signal.value, Some(SignalValue::Int(2)));
            }
            other => panic!("unexpected event {:?}", other),
        }

        // A renamed sink reaches the adapter's clone too
        sink.rename("Bay9");
        ctl.operate(&oper, &SignalValue::Bool(false), &ControlParams::default())
            .unwrap();
        assert_eq!(recorder.events()[1].device(), Some("Bay9"));
    }
}
