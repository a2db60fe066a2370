use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Overlay progress, recomputed after every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub matches_so_far: usize,
}

impl Progress {
    /// Completed fraction in [0, 1]; an empty run counts as complete.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// Receives progress after each batch.
///
/// Called inline between batches, so implementations should return quickly.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: Progress);
}

/// Discards progress.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _progress: Progress) {}
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn on_progress(&self, progress: Progress) {
        self(progress)
    }
}

/// Cooperative cancellation, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn fraction() {
        let p = Progress {
            processed: 25,
            total: 100,
            matches_so_far: 3,
        };
        assert!((p.fraction() - 0.25).abs() < f64::EPSILON);
        assert_eq!(Progress::default().fraction(), 1.0);
    }

    #[test]
    fn closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |p: Progress| seen.lock().unwrap().push(p.processed);
        sink.on_progress(Progress {
            processed: 5,
            total: 10,
            matches_so_far: 0,
        });
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[test]
    fn cancellation_is_shared() {
        let flag = CancellationFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }
}
