//! ParsePool - bounded thread pool for offline SCL discovery
//!
//! Parsing a multi-megabyte SCD must never stall the registry's owner, so
//! offline discovery on a cold cache is pushed here. Jobs go to the
//! least-loaded worker; results come back through the registry inbox.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::types::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum PoolCommand {
    Run(Job),
    Shutdown,
}

/// Handle to one pool thread
struct PoolWorker {
    id: usize,
    command_tx: Sender<PoolCommand>,
    thread: Option<JoinHandle<()>>,
    /// Jobs queued or running on this worker
    pending: Arc<AtomicUsize>,
}

pub struct ParsePool {
    workers: Vec<PoolWorker>,
}

impl ParsePool {
    /// Create a pool with `size` threads (at least one)
    pub fn new(size: usize) -> Result<Self> {
        let workers = (0..size.max(1))
            .map(spawn_worker)
            .collect::<std::io::Result<Vec<_>>>()?;
        tracing::info!("ParsePool created with {} workers", workers.len());
        Ok(Self { workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Jobs queued or running across the pool
    pub fn pending(&self) -> usize {
        self.workers
            .iter()
            .map(|w| w.pending.load(Ordering::SeqCst))
            .sum()
    }

    /// Queue a job on the least-loaded worker
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        let worker = self
            .workers
            .iter()
            .min_by_key(|w| w.pending.load(Ordering::SeqCst))
            .ok_or_else(|| Error::Config("parse pool has no workers".to_string()))?;

        worker.pending.fetch_add(1, Ordering::SeqCst);
        worker.command_tx.send(PoolCommand::Run(Box::new(job))).map_err(|_| {
            worker.pending.fetch_sub(1, Ordering::SeqCst);
            Error::WorkerStopped(format!("parse-{}", worker.id))
        })
    }
}

impl Drop for ParsePool {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.command_tx.send(PoolCommand::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    tracing::error!("Parse worker {} panicked", worker.id);
                }
            }
        }
    }
}

fn spawn_worker(id: usize) -> std::io::Result<PoolWorker> {
    let (command_tx, command_rx) = mpsc::channel();
    let pending = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pending);

    let thread = thread::Builder::new()
        .name(format!("parse-{}", id))
        .spawn(move || run_worker(id, command_rx, counter))?;

    Ok(PoolWorker {
        id,
        command_tx,
        thread: Some(thread),
        pending,
    })
}

fn run_worker(id: usize, command_rx: Receiver<PoolCommand>, pending: Arc<AtomicUsize>) {
    tracing::debug!("Parse worker {} started", id);
    while let Ok(command) = command_rx.recv() {
        match command {
            PoolCommand::Run(job) => {
                job();
                pending.fetch_sub(1, Ordering::SeqCst);
            }
            PoolCommand::Shutdown => break,
        }
    }
    tracing::debug!("Parse worker {} stopped", id);
}
