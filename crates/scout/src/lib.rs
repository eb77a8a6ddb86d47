//! Scout - IEC 61850 device synchronization engine
//!
//! This crate provides the runtime that keeps a set of field devices in sync
//! with their configured models:
//! - Device registry with offline (SCL) and online discovery
//! - Per-device protocol workers with throttled polling
//! - Subscription bookkeeping shared by independent features
//! - Select-Before-Operate control sequencing
//! - Project persistence, settings and SCL file watching

// Protocol adapter traits and the simulated adapter
pub mod adapter;

// Control model state machine
pub mod control;

// Event bus
pub mod events;

// Project files and settings
pub mod project;

// Device registry
pub mod registry;

// Subscription registry
pub mod subscriptions;

// Core types
pub mod types;

// Protocol workers
pub mod worker;

#[cfg(test)]
mod testing;

pub use registry::{DeviceRegistry, DiscoveryPath};
pub use types::{ConnectionState, Error, Result};
