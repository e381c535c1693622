pub mod audit_retention;
pub mod no_show_processor;
pub mod queue_maintenance;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Per-job run bookkeeping shared with health reporting.
///
/// The `is_running` flag keeps two ticks of the same job from overlapping in
/// one process. It is not a distributed lock; multi-process deployments need
/// the datastore-level claims the repositories already do.
#[derive(Debug, Default)]
pub struct JobStats {
    run_count: AtomicU64,
    error_count: AtomicU64,
    is_running: AtomicBool,
}

impl JobStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Try to mark the job running. `false` means a previous tick is still
    /// in flight and this one must be skipped.
    pub fn try_begin(&self) -> bool {
        self.is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn finish(&self, errored: bool) {
        self.run_count.fetch_add(1, Ordering::SeqCst);
        if errored {
            self.error_count.fetch_add(1, Ordering::SeqCst);
        }
        self.is_running.store(false, Ordering::SeqCst);
    }

    pub fn run_count(&self) -> u64 {
        self.run_count.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}
