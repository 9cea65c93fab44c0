use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A trait for reporting progress of long-running operations.
pub trait Progress: Send + Sync {
    /// Set the phase label for the current operation (e.g., "Identifying", "Counting").
    fn set_phase(&self, phase: &str);

    /// Configure determinate progress reporting.
    ///
    /// The callback returns (total, current, message).
    fn set_determinate(&self, callback: Box<dyn Fn() -> (u64, u64, String) + Send + Sync + 'static>);

    /// Finish and clear the progress indicator.
    fn done(&self);
}

/// Progress sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn set_phase(&self, _phase: &str) {}
    fn set_determinate(&self, _callback: Box<dyn Fn() -> (u64, u64, String) + Send + Sync + 'static>) {}
    fn done(&self) {}
}

/// Counts month tasks as they finish and feeds the count to a [`Progress`].
#[derive(Debug, Clone, Default)]
pub struct MonthTracker {
    issued: Arc<AtomicU64>,
    completed: Arc<AtomicU64>,
}

impl MonthTracker {
    /// Create a tracker and register it as the determinate source of `progress`.
    #[must_use]
    pub fn attach(progress: &dyn Progress) -> Self {
        let tracker = Self::default();

        let issued = Arc::clone(&tracker.issued);
        let completed = Arc::clone(&tracker.completed);
        progress.set_determinate(Box::new(move || {
            let issued = issued.load(Ordering::Relaxed);
            let completed = completed.load(Ordering::Relaxed);
            (issued, completed, format!("months {completed}/{issued}"))
        }));

        tracker
    }

    pub fn add_months(&self, count: u64) {
        let _ = self.issued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn complete_month(&self) {
        let _ = self.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}
