//! Immutable, versioned views of the map.

use crate::geometry::SE3;
use crate::system::messages::KeyFrameId;

/// What readers outside the map maker may know about one keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFrameSummary {
    pub id: KeyFrameId,
    pub timestamp_ns: u64,
    pub pose: SE3,
    pub num_cameras: usize,
}

/// A consistent copy of the map at one point in time.
///
/// `version` increases by one with every publication, across resets too, so
/// readers can tell whether anything changed since their last look.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSnapshot {
    pub version: u64,
    pub keyframes: Vec<KeyFrameSummary>,
}

impl MapSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            keyframes: Vec::new(),
        }
    }

    pub fn num_keyframes(&self) -> usize {
        self.keyframes.len()
    }

    pub fn keyframe(&self, id: KeyFrameId) -> Option<&KeyFrameSummary> {
        self.keyframes.iter().find(|kf| kf.id == id)
    }
}
