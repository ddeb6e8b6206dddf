//! Lock-free counters for load-pipeline activity.
//!
//! Counters are updated from worker tasks with relaxed atomics; a
//! [`MetricsSnapshot`] is a point-in-time copy for display.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters shared between the selection pass and the load pipeline.
#[derive(Debug, Default)]
pub struct TilesetMetrics {
    loads_started: AtomicU64,
    loads_completed: AtomicU64,
    loads_failed: AtomicU64,
    loads_in_progress: AtomicU64,
    bytes_downloaded: AtomicU64,
    tiles_unloaded: AtomicU64,
}

impl TilesetMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_started(&self) {
        self.loads_started.fetch_add(1, Ordering::Relaxed);
        self.loads_in_progress.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load_completed(&self, bytes: u64) {
        self.loads_completed.fetch_add(1, Ordering::Relaxed);
        self.loads_in_progress.fetch_sub(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn load_failed(&self) {
        self.loads_failed.fetch_add(1, Ordering::Relaxed);
        self.loads_in_progress.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn tile_unloaded(&self) {
        self.tiles_unloaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of loads currently mid-pipeline.
    pub fn loads_in_progress(&self) -> u64 {
        self.loads_in_progress.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            loads_started: self.loads_started.load(Ordering::Relaxed),
            loads_completed: self.loads_completed.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            loads_in_progress: self.loads_in_progress.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            tiles_unloaded: self.tiles_unloaded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TilesetMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub loads_started: u64,
    pub loads_completed: u64,
    pub loads_failed: u64,
    pub loads_in_progress: u64,
    pub bytes_downloaded: u64,
    pub tiles_unloaded: u64,
}
