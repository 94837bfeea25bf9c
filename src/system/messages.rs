//! Inter-thread message types.
//!
//! Keyframes travel from the tracker (run-loop thread) to the map maker over a
//! bounded channel. Sending never blocks the run loop.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use nalgebra::Matrix6;
use tracing::{debug, warn};

use crate::geometry::SE3;
use crate::io::FrameSet;

use super::shared_state::SharedState;

/// Identifier assigned to a keyframe by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyFrameId(pub u64);

impl fmt::Display for KeyFrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KF{}", self.0)
    }
}

/// Message sent from tracking to the map maker when a new keyframe is created.
///
/// Ownership of the frame set moves into the map maker's queue with it.
#[derive(Debug, Clone)]
pub struct NewKeyFrameMsg {
    pub keyframe_id: KeyFrameId,

    /// Timestamp in nanoseconds.
    pub timestamp_ns: u64,

    /// Pose estimate from tracking (T_wc: camera to world).
    pub pose: SE3,

    pub covariance: Matrix6<f64>,

    pub frame_set: FrameSet,
}

/// Tracker-side handle on the keyframe channel.
#[derive(Clone)]
pub struct KeyFrameSender {
    tx: Sender<NewKeyFrameMsg>,
    shared: Arc<SharedState>,
}

impl KeyFrameSender {
    pub fn new(tx: Sender<NewKeyFrameMsg>, shared: Arc<SharedState>) -> Self {
        Self { tx, shared }
    }

    /// Hand a keyframe to the map maker without blocking.
    ///
    /// A full queue drops the keyframe and raises the flow-control flag.
    /// Returns whether the keyframe was queued.
    pub fn try_send(&self, msg: NewKeyFrameMsg) -> bool {
        let id = msg.keyframe_id;
        match self.tx.try_send(msg) {
            Ok(()) => {
                // Let the map maker yield from refinement to pick it up.
                self.shared.request_abort_refinement();
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Keyframe queue full, dropping {}", id);
                self.shared.set_stop_keyframe_creation(true);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("Map maker is gone, dropping {}", id);
                false
            }
        }
    }

    /// Keyframes waiting for the map maker.
    pub fn queue_len(&self) -> usize {
        self.tx.len()
    }
}
