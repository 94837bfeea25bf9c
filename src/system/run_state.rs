//! Cooperative shutdown signal for the run loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation token checked once per run-loop iteration.
///
/// Clones share the same flag; cancelling is idempotent and permanent.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop. Returns true if this call was the first.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn should_run(&self) -> bool {
        !self.is_cancelled()
    }
}
