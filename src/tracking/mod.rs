//! Tracking: the synchronous per-frame side of the system.
//!
//! - The [`Tracker`] seam called by the run loop
//! - Tracking quality and the published tracker state
//! - New KeyFrame decision
//! - A ground-truth replay tracker for running without a vision front-end

pub mod keyframe_decision;
pub mod replay;
pub mod state;
mod tracker;

pub use keyframe_decision::KeyFrameDecision;
pub use replay::{ReplayConfig, ReplayTracker};
pub use state::{TrackerState, TrackingQuality};
pub use tracker::{SharedTracker, Tracker, TrackerContext};
