//! The map-building algorithm seam driven by the map-maker thread.

use anyhow::Result;

use crate::system::messages::NewKeyFrameMsg;

use super::snapshot::KeyFrameSummary;

/// Result of one call to [`MapBuilder::refine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineOutcome {
    /// Nothing left to optimize; the worker may wait for new keyframes.
    Idle,
    /// The map changed; a new snapshot should be published.
    Refined,
    /// `should_stop` fired before the work finished.
    Aborted,
}

/// Mapping/optimization algorithm. Owned and called only by the map-maker
/// thread, so implementations need no internal locking.
pub trait MapBuilder: Send + 'static {
    /// One-time setup, run on the caller's thread before the worker starts.
    /// An error here aborts system startup.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn insert_keyframe(&mut self, msg: NewKeyFrameMsg) -> Result<()>;

    /// Run optimization work. Implementations must poll `should_stop` between
    /// iterations and return [`RefineOutcome::Aborted`] promptly when it fires.
    fn refine(&mut self, should_stop: &dyn Fn() -> bool) -> RefineOutcome;

    /// Drop all map state.
    fn clear(&mut self) -> Result<()>;

    /// Current keyframes, used to publish snapshots.
    fn keyframes(&self) -> Vec<KeyFrameSummary>;
}
