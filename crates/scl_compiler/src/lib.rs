//! SCL Model Compiler
//!
//! Turns IEC 61850 SCL documents (SCD/ICD/CID/IID) into the runtime
//! [`Node`](scout_model::Node)/[`Signal`](scout_model::Signal) tree, and
//! extracts the ancillary tables exporters need: IED network addresses from
//! the Communication section and the GOOSE publisher/subscriber map.
//!
//! Parsed documents, their DataTypeTemplates and expanded trees live in an
//! explicitly owned [`SclCache`] that callers share by reference.

mod cache;
mod communication;
mod compiler;
mod dataset;
mod error;
mod goose;
mod structure;
mod templates;
mod xml;

#[cfg(test)]
mod testing;

pub use cache::{CacheStats, CachedDocument, SclCache};
pub use communication::{IedInfo, DEFAULT_IP, DEFAULT_PORT};
pub use compiler::SclCompiler;
pub use dataset::{DataSetDef, FcdaRef};
pub use error::{Result, SclError};
pub use goose::GooseRow;
pub use structure::{ERROR_NO_SCD, ERROR_SCD_PARSE, IED_NOT_FOUND};
pub use templates::DataTypeTemplates;
pub use xml::{XmlDocument, XmlElement, SCL_NAMESPACE};
