//! SCL Model Compiler
//!
//! Front door over one SCL file. Opening never fails: a missing or malformed
//! file yields a compiler whose tree is a placeholder error node and whose
//! tables are empty, so discovery never aborts the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scout_model::Node;
use tracing::error;

use crate::cache::{CachedDocument, SclCache};
use crate::communication::{self, IedInfo};
use crate::error::SclError;
use crate::goose::{self, GooseRow};
use crate::structure::{ied_elements, ERROR_NO_SCD, ERROR_SCD_PARSE};

/// Compiler bound to one SCL file and a shared cache
pub struct SclCompiler {
    path: PathBuf,
    cache: Arc<SclCache>,
    document: std::result::Result<Arc<CachedDocument>, SclError>,
}

impl SclCompiler {
    /// Parse `path` through the cache
    ///
    /// An unchanged file is a cache hit and performs no read or re-parse.
    pub fn open(cache: Arc<SclCache>, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let document = cache.document(&path);
        if let Err(e) = &document {
            error!("Failed to load SCL file {}: {}", path.display(), e);
        }
        Self { path, cache, document }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.document.is_ok()
    }

    /// Load error, if the file could not be parsed
    pub fn error(&self) -> Option<&SclError> {
        self.document.as_ref().err()
    }

    /// Namespace URI declared on the root element
    pub fn namespace(&self) -> Option<&str> {
        self.document
            .as_ref()
            .ok()
            .and_then(|d| d.document.namespace.as_deref())
    }

    /// Signal tree of an IED (the first populated IED when `None`)
    pub fn get_structure(&self, ied_name: Option<&str>) -> Node {
        match &self.document {
            Ok(document) => self.cache.structure(document, ied_name),
            Err(SclError::Xml { .. } | SclError::Encoding { .. } | SclError::MissingElement(_)) => Node::error(ERROR_SCD_PARSE),
            Err(_) => Node::error(ERROR_NO_SCD),
        }
    }

    /// Names of every IED declared in the file
    pub fn ied_names(&self) -> Vec<String> {
        match &self.document {
            Ok(document) => ied_elements(&document.document.root)
                .into_iter()
                .filter_map(|ied| ied.attr("name"))
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Network addressing of every IED
    pub fn extract_ieds_info(&self) -> Vec<IedInfo> {
        match &self.document {
            Ok(document) => communication::extract_ieds_info(&document.document.root),
            Err(_) => Vec::new(),
        }
    }

    /// GOOSE publisher/subscriber rows
    pub fn extract_goose_map(&self) -> Vec<GooseRow> {
        match &self.document {
            Ok(document) => goose::extract_goose_map(&document.document.root),
            Err(_) => Vec::new(),
        }
    }
}
