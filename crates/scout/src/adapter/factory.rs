//! Type-keyed adapter construction

use std::collections::HashMap;
use std::sync::Arc;

use scl_compiler::SclCache;
use tracing::debug;

use super::{ProtocolAdapter, SimulatedAdapter};
use crate::project::{DeviceConfig, DeviceType};
use crate::types::{Error, Result};

/// Builds an adapter for one device
pub type AdapterConstructor = Arc<dyn Fn(&DeviceConfig, Arc<SclCache>) -> Box<dyn ProtocolAdapter> + Send + Sync>;

/// Map from device type to adapter constructor
#[derive(Clone)]
pub struct AdapterFactory {
    constructors: HashMap<DeviceType, AdapterConstructor>,
}

impl AdapterFactory {
    /// Factory with no registered types
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for a device type
    pub fn register<F>(&mut self, device_type: DeviceType, constructor: F)
    where
        F: Fn(&DeviceConfig, Arc<SclCache>) -> Box<dyn ProtocolAdapter> + Send + Sync + 'static,
    {
        self.constructors.insert(device_type, Arc::new(constructor));
    }

    pub fn supports(&self, device_type: DeviceType) -> bool {
        self.constructors.contains_key(&device_type)
    }

    pub fn create(&self, config: &DeviceConfig, cache: Arc<SclCache>) -> Result<Box<dyn ProtocolAdapter>> {
        let constructor = self
            .constructors
            .get(&config.device_type)
            .ok_or_else(|| Error::NoAdapter(config.device_type.to_string()))?;
        debug!("Creating {} adapter for {}", config.device_type, config.name);
        Ok(constructor(config, cache))
    }
}

impl Default for AdapterFactory {
    /// The simulated adapter for every IEC 61850 and Modbus type
    fn default() -> Self {
        let mut factory = Self::empty();
        for device_type in [
            DeviceType::Iec61850Ied,
            DeviceType::Iec61850Server,
            DeviceType::ModbusTcp,
            DeviceType::ModbusServer,
        ] {
            factory.register(device_type, |config, cache| {
                Box::new(SimulatedAdapter::new(config.clone(), cache))
            });
        }
        factory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_types() {
        let factory = AdapterFactory::default();
        assert!(factory.supports(DeviceType::Iec61850Ied));
        assert!(factory.supports(DeviceType::ModbusServer));
        assert!(!factory.supports(DeviceType::Iec104Rtu));

        let config = DeviceConfig::new("RTU1", "10.0.0.1", 2404).with_type(DeviceType::Iec104Rtu);
        let err = factory.create(&config, Arc::new(SclCache::new())).err().unwrap();
        assert!(matches!(err, Error::NoAdapter(_)));
    }

    #[test]
    fn test_create_registered() {
        let factory = AdapterFactory::default();
        let config = DeviceConfig::new("IED1", "10.0.0.1", 102);
        let adapter = factory.create(&config, Arc::new(SclCache::new())).unwrap();
        assert!(!adapter.is_connected());
    }
}
