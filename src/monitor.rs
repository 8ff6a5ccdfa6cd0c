//! Execution monitoring
//!
//! Long-running engine stages poll an [`ExecutionMonitor`] for cooperative
//! cancellation and report fractional progress through it. Progress is
//! monotone: a report below the current high-water mark is dropped, so
//! interleaved stages can report independently without the bar jumping back.

use crate::errors::ConformalError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Rows processed between cancellation polls in engine loops.
pub(crate) const PROGRESS_STEP: usize = 200;

type ProgressFn = dyn Fn(f64) + Send + Sync;

/// Cancellation flag and progress sink shared with the caller.
pub struct ExecutionMonitor {
    cancelled: Arc<AtomicBool>,
    progress: Option<Box<ProgressFn>>,
    high_water: AtomicU64,
}

impl Default for ExecutionMonitor {
    fn default() -> Self {
        ExecutionMonitor {
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: None,
            high_water: AtomicU64::new(0),
        }
    }
}

impl ExecutionMonitor {
    /// Monitor that never cancels and discards progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor forwarding progress fractions in `[0, 1]` to `sink`.
    pub fn with_progress<F>(sink: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        ExecutionMonitor {
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: Some(Box::new(sink)),
            high_water: AtomicU64::new(0),
        }
    }

    /// Handle the caller keeps to request cancellation from another thread.
    pub fn handle(&self) -> CancellationHandle {
        CancellationHandle {
            cancelled: self.cancelled.clone(),
        }
    }

    /// Monitor sharing this one's cancellation flag but reporting no
    /// progress. Multi-stage drivers hand it to their inner stages and keep
    /// stage-level progress for themselves.
    pub fn child(&self) -> ExecutionMonitor {
        ExecutionMonitor {
            cancelled: self.cancelled.clone(),
            progress: None,
            high_water: AtomicU64::new(0),
        }
    }

    /// Fail with [`ConformalError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<(), ConformalError> {
        if self.cancelled.load(Ordering::Relaxed) {
            Err(ConformalError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Report progress as a fraction in `[0, 1]`. Reports below the current
    /// high-water mark are dropped.
    pub fn progress(&self, fraction: f64) {
        let clamped = fraction.clamp(0.0, 1.0);
        let bits = clamped.to_bits();
        let raised = self
            .high_water
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
                if clamped > f64::from_bits(prev) {
                    Some(bits)
                } else {
                    None
                }
            })
            .is_ok();
        if raised {
            if let Some(sink) = self.progress.as_ref() {
                sink(clamped);
            }
        }
    }

    /// Report progress as `done` out of `total` items.
    pub fn progress_of(&self, done: usize, total: usize) {
        if total > 0 {
            self.progress(done as f64 / total as f64);
        }
    }
}

/// Clonable cancellation flag for an [`ExecutionMonitor`].
#[derive(Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Request cancellation. The running stage observes it at its next poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}
