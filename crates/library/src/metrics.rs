use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking pipeline outcomes.
///
/// All counters use relaxed ordering. For a point-in-time view, call
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct LibraryMetrics {
    /// Documents created.
    pub uploads: AtomicU64,
    /// Uploads that failed after validation passed.
    pub upload_failures: AtomicU64,
    /// Content replacements committed.
    pub replaces: AtomicU64,
    /// Replacements that failed after validation passed.
    pub replace_failures: AtomicU64,
    /// Documents deleted.
    pub deletes: AtomicU64,
    /// Download streams opened.
    pub views: AtomicU64,
    /// Blobs deleted to roll back a failed write.
    pub compensations: AtomicU64,
    /// Records found pointing at a missing blob, or blobs left orphaned.
    pub consistency_faults: AtomicU64,
    /// Updates rejected by optimistic concurrency control.
    pub conflicts: AtomicU64,
}

impl LibraryMetrics {
    pub fn increment_uploads(&self) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_upload_failures(&self) {
        self.upload_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_replaces(&self) {
        self.replaces.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_replace_failures(&self) {
        self.replace_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deletes(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_views(&self) {
        self.views.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_compensations(&self) {
        self.compensations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_consistency_faults(&self) {
        self.consistency_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_conflicts(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads: self.uploads.load(Ordering::Relaxed),
            upload_failures: self.upload_failures.load(Ordering::Relaxed),
            replaces: self.replaces.load(Ordering::Relaxed),
            replace_failures: self.replace_failures.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            views: self.views.load(Ordering::Relaxed),
            compensations: self.compensations.load(Ordering::Relaxed),
            consistency_faults: self.consistency_faults.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`LibraryMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uploads: u64,
    pub upload_failures: u64,
    pub replaces: u64,
    pub replace_failures: u64,
    pub deletes: u64,
    pub views: u64,
    pub compensations: u64,
    pub consistency_faults: u64,
    pub conflicts: u64,
}
