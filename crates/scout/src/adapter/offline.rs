//! Offline device models
//!
//! A device's model can be built without talking to it: IEC 61850 devices
//! from their SCL file through the shared cache, Modbus devices from their
//! register maps. No adapter is involved, so building never waits on a
//! protocol call in flight.

use std::sync::Arc;

use scl_compiler::{SclCache, SclCompiler, ERROR_NO_SCD, IED_NOT_FOUND};
use scout_model::{AccessMode, Node, Signal, SignalType};
use tracing::debug;

use crate::project::{DeviceConfig, ModbusRegisterMap};

/// Builds a device's model from its configuration
pub trait OfflineModel: Send + Sync {
    fn build(&self, config: &DeviceConfig, cache: &Arc<SclCache>) -> Node;
}

/// Model from the configured SCL file or register maps
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfiguredModel;

impl OfflineModel for ConfiguredModel {
    fn build(&self, config: &DeviceConfig, cache: &Arc<SclCache>) -> Node {
        offline_model(config, cache)
    }
}

pub fn offline_model(config: &DeviceConfig, cache: &Arc<SclCache>) -> Node {
    if config.device_type.is_modbus() {
        modbus_model(config)
    } else {
        scl_model(config, cache)
    }
}

fn scl_model(config: &DeviceConfig, cache: &Arc<SclCache>) -> Node {
    let Some(path) = config.scl_source() else {
        return Node::error(ERROR_NO_SCD);
    };

    let compiler = SclCompiler::open(Arc::clone(cache), path);
    let root = compiler.get_structure(Some(&config.name));
    if root.name == IED_NOT_FOUND {
        // Configured name need not match the IED name in the file
        debug!("No IED named {} in {}, using first IED", config.name, path.display());
        return compiler.get_structure(None);
    }
    root
}

fn modbus_model(config: &DeviceConfig) -> Node {
    let mut root = Node::new(&config.name, "Modbus Device");
    for map in &config.modbus_register_maps {
        root.children.push(register_block(map));
    }
    root
}

/// One branch per register block, one signal per register
fn register_block(map: &ModbusRegisterMap) -> Node {
    let last = map.start_address.saturating_add(map.count.saturating_sub(1));
    let name = if map.name_prefix.is_empty() {
        format!("FC{} {}-{}", map.function_code, map.start_address, last)
    } else {
        map.name_prefix.clone()
    };
    let mut node = Node::new(name, map.description.clone());

    let signal_type = if map.is_bit_block() {
        SignalType::Binary
    } else {
        SignalType::Analog
    };
    let access = if map.is_writable() {
        AccessMode::ReadWrite
    } else {
        AccessMode::ReadOnly
    };

    for offset in 0..map.count {
        let register = map.start_address.saturating_add(offset);
        let signal = Signal::new(format!("{}{}", map.name_prefix, register), format!("{}:{}", map.function_code, register))
            .with_type(signal_type)
            .with_access(access)
            .with_description(map.data_type.clone());
        node.signals.push(signal);
    }
    node
}
