//! Scout Model
//!
//! The device data model shared by the SCL compiler and the synchronization
//! engine: a strict tree of [`Node`]s whose leaves are [`Signal`]s.

mod node;
mod signal;

pub use node::*;
pub use signal::*;
