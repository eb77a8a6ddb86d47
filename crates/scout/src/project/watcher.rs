//! SCL File Watcher
//!
//! Watches the SCL files devices discover from and posts a message to the
//! registry inbox when one changes, so the device is rediscovered on the next
//! `process_pending`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::registry::RegistryMessage;

pub struct SclWatcher {
    /// Files of interest, canonicalized
    files: Arc<RwLock<HashSet<PathBuf>>>,
    /// Directories being watched
    dirs: HashSet<PathBuf>,
    /// The underlying watcher (kept alive)
    watcher: RecommendedWatcher,
}

impl SclWatcher {
    pub fn new(inbox: Sender<RegistryMessage>) -> Result<Self, notify::Error> {
        let files: Arc<RwLock<HashSet<PathBuf>>> = Arc::default();
        let watched = Arc::clone(&files);

        let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                for path in Self::event_to_changes(&watched.read(), &event) {
                    let _ = inbox.send(RegistryMessage::SclFileChanged { path });
                }
            }
            Err(e) => {
                error!("SCL watcher error: {}", e);
            }
        })?;

        Ok(Self {
            files,
            dirs: HashSet::new(),
            watcher,
        })
    }

    /// Start watching one SCL file
    pub fn watch(&mut self, path: &Path) -> Result<(), notify::Error> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        // Editors replace files on save, so the directory is watched
        if !self.dirs.contains(&dir) {
            self.watcher.watch(&dir, RecursiveMode::NonRecursive)?;
            info!("Watching SCL directory: {}", dir.display());
            self.dirs.insert(dir);
        }
        self.files.write().insert(path);
        Ok(())
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.files.read().contains(&path)
    }

    /// Watched files touched by a notify event
    fn event_to_changes(files: &HashSet<PathBuf>, event: &Event) -> Vec<PathBuf> {
        match event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => {}
            _ => {
                debug!("Ignoring event kind: {:?}", event.kind);
                return Vec::new();
            }
        }

        event
            .paths
            .iter()
            .filter(|p| files.contains(p.as_path()))
            .cloned()
            .collect()
    }
}
