//! Project Management
//!
//! Persisted device lists, application settings and SCL file watching.

mod config;
mod settings;
mod watcher;

pub use config::*;
pub use settings::*;
pub use watcher::*;
