//! The tracking seam driven synchronously by the run loop.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::io::FrameSet;
use crate::system::messages::KeyFrameSender;
use crate::system::shared_state::SharedState;

use super::state::TrackerState;

/// Per-frame pose tracking.
///
/// Called only from the run-loop thread and from a reset, always through the
/// [`SharedTracker`] lock, so implementations need no internal locking.
pub trait Tracker: Send {
    /// One-time setup before the first frame. An error aborts system startup.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Track one frame set. Keyframes for the map maker are handed over
    /// through the [`TrackerContext`] sender and must never block.
    fn process_frame(&mut self, frame_set: &FrameSet) -> Result<()>;

    fn state(&self) -> TrackerState;

    /// Forget everything and return to [`TrackingQuality::NotInitialized`].
    ///
    /// [`TrackingQuality::NotInitialized`]: super::TrackingQuality::NotInitialized
    fn reset(&mut self) -> Result<()>;

    /// Enable or disable keyframe creation. Ignored by trackers that never
    /// create keyframes.
    fn set_keyframe_insertion(&mut self, _enabled: bool) {}
}

/// The tracker as shared between the run loop and the reset coordinator.
pub type SharedTracker = Arc<Mutex<dyn Tracker>>;

/// What a tracker gets to talk to the rest of the system.
#[derive(Clone)]
pub struct TrackerContext {
    pub keyframes: KeyFrameSender,
    pub shared: Arc<SharedState>,
}
