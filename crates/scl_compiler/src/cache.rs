//! SCL cache
//!
//! Two key→value stores shared by every compiler instance:
//!
//! - documents: absolute path → (mtime, parsed document, lazily built
//!   DataTypeTemplates)
//! - structures: (path, mtime, IED name) → expanded Node tree
//!
//! An entry is valid only for the mtime it was built from. When a file's mtime
//! changes, both stores drop everything for that path before re-parsing.
//!
//! Writers are expected to be single per path. Two threads loading the same
//! changed file at once both parse it and the last insert wins.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use dashmap::DashMap;
use scout_model::Node;
use tracing::{debug, info};

use crate::error::{Result, SclError};
use crate::structure::build_structure;
use crate::templates::DataTypeTemplates;
use crate::xml::XmlDocument;

/// A parsed document valid for one mtime
#[derive(Debug)]
pub struct CachedDocument {
    pub path: PathBuf,
    pub mtime: SystemTime,
    pub document: XmlDocument,
    templates: OnceLock<DataTypeTemplates>,
}

impl CachedDocument {
    fn new(path: PathBuf, mtime: SystemTime, document: XmlDocument) -> Self {
        Self {
            path,
            mtime,
            document,
            templates: OnceLock::new(),
        }
    }

    /// Whether the DataTypeTemplates tables have been built yet
    pub fn has_templates(&self) -> bool {
        self.templates.get().is_some()
    }
}

type StructureKey = (PathBuf, SystemTime, String);

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub file_reads: u64,
    pub document_parses: u64,
    pub document_hits: u64,
    pub template_builds: u64,
    pub structure_builds: u64,
    pub structure_hits: u64,
}

#[derive(Debug, Default)]
struct Counters {
    file_reads: AtomicU64,
    document_parses: AtomicU64,
    document_hits: AtomicU64,
    template_builds: AtomicU64,
    structure_builds: AtomicU64,
    structure_hits: AtomicU64,
}

/// Explicitly owned cache of parsed SCL documents and expanded trees
#[derive(Debug, Default)]
pub struct SclCache {
    documents: DashMap<PathBuf, Arc<CachedDocument>>,
    structures: DashMap<StructureKey, Node>,
    counters: Counters,
}

impl SclCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed document for a path, reading and parsing only when the cached
    /// entry is missing or stale
    pub fn document(&self, path: impl AsRef<Path>) -> Result<Arc<CachedDocument>> {
        let (path, mtime) = stat(path.as_ref())?;

        if let Some(entry) = self.documents.get(&path) {
            if entry.mtime == mtime {
                self.counters.document_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(entry.value()));
            }
        }

        self.invalidate(&path);

        let content = std::fs::read(&path).map_err(|source| SclError::Io {
            path: path.clone(),
            source,
        })?;
        self.counters.file_reads.fetch_add(1, Ordering::Relaxed);

        let document = XmlDocument::parse_bytes(&content)?;
        self.counters.document_parses.fetch_add(1, Ordering::Relaxed);
        info!("Parsed SCL file: {} ({} bytes)", path.display(), content.len());

        let cached = Arc::new(CachedDocument::new(path.clone(), mtime, document));
        self.documents.insert(path, Arc::clone(&cached));
        Ok(cached)
    }

    /// DataTypeTemplates of a cached document, built on first use
    pub fn templates<'a>(&self, document: &'a CachedDocument) -> &'a DataTypeTemplates {
        document.templates.get_or_init(|| {
            self.counters.template_builds.fetch_add(1, Ordering::Relaxed);
            let templates = DataTypeTemplates::from_root(&document.document.root);
            debug!(
                "Built DataTypeTemplates for {}: {} entries",
                document.path.display(),
                templates.len()
            );
            templates
        })
    }

    /// Expanded tree for one IED of a cached document
    pub fn structure(&self, document: &CachedDocument, ied_name: Option<&str>) -> Node {
        let key = (
            document.path.clone(),
            document.mtime,
            ied_name.unwrap_or_default().to_string(),
        );

        if let Some(node) = self.structures.get(&key) {
            self.counters.structure_hits.fetch_add(1, Ordering::Relaxed);
            return node.value().clone();
        }

        let templates = self.templates(document);
        let node = build_structure(&document.document.root, templates, ied_name);
        self.counters.structure_builds.fetch_add(1, Ordering::Relaxed);
        self.structures.insert(key, node.clone());
        node
    }

    /// Whether the document for `path` is cached and still current
    pub fn is_warm(&self, path: impl AsRef<Path>) -> bool {
        let Ok((path, mtime)) = stat(path.as_ref()) else {
            return false;
        };
        self.documents
            .get(&path)
            .is_some_and(|entry| entry.mtime == mtime)
    }

    /// Drop every entry for a path
    pub fn invalidate(&self, path: &Path) {
        let removed = self.documents.remove(path).is_some();
        self.structures.retain(|(p, _, _), _| p != path);
        if removed {
            debug!("Invalidated SCL cache for {}", path.display());
        }
    }

    pub fn clear(&self) {
        self.documents.clear();
        self.structures.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            file_reads: c.file_reads.load(Ordering::Relaxed),
            document_parses: c.document_parses.load(Ordering::Relaxed),
            document_hits: c.document_hits.load(Ordering::Relaxed),
            template_builds: c.template_builds.load(Ordering::Relaxed),
            structure_builds: c.structure_builds.load(Ordering::Relaxed),
            structure_hits: c.structure_hits.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        let c = &self.counters;
        for counter in [
            &c.file_reads,
            &c.document_parses,
            &c.document_hits,
            &c.template_builds,
            &c.structure_builds,
            &c.structure_hits,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Absolute path and mtime of an SCL file
fn stat(path: &Path) -> Result<(PathBuf, SystemTime)> {
    let absolute = path
        .canonicalize()
        .map_err(|_| SclError::NotFound(path.to_path_buf()))?;
    let mtime = std::fs::metadata(&absolute)
        .and_then(|m| m.modified())
        .map_err(|source| SclError::Io {
            path: absolute.clone(),
            source,
        })?;
    Ok((absolute, mtime))
}
