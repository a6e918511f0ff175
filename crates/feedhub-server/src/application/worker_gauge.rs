//! Live-worker counter used for the "active workers" line of the health report.
//!
//! Every spawned worker (connection, processor, dispatch, per-client handler,
//! reporter) holds a [`WorkerGuard`] for as long as it runs.  Dropping the
//! guard, including during a panic unwind, decrements the count.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct WorkerGauge {
    active: Arc<AtomicUsize>,
}

impl WorkerGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one running worker until the returned guard is dropped.
    pub fn enter(&self) -> WorkerGuard {
        self.active.fetch_add(1, Ordering::Relaxed);
        WorkerGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct WorkerGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}
