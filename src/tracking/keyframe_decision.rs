//! KeyFrame decision criteria.

use crate::geometry::SE3;

/// Criteria for deciding whether to create a new KeyFrame.
///
/// - Frames since the last KeyFrame (lower and upper bound)
/// - Translation and rotation with respect to the last KeyFrame
#[derive(Debug, Clone)]
pub struct KeyFrameDecision {
    /// Minimum frames between KeyFrames.
    min_frames: usize,
    /// Maximum frames between KeyFrames.
    max_frames: usize,
    /// Motion since the last KeyFrame that triggers a new one.
    min_translation_m: f64,
    min_rotation_rad: f64,
    /// Frame counter since last KeyFrame.
    frames_since_kf: usize,
    last_kf_pose: Option<SE3>,
}

impl KeyFrameDecision {
    pub fn new() -> Self {
        Self {
            min_frames: 2,
            max_frames: 20,
            min_translation_m: 0.1,
            min_rotation_rad: 10f64.to_radians(),
            frames_since_kf: 0,
            last_kf_pose: None,
        }
    }

    pub fn with_frame_bounds(mut self, min_frames: usize, max_frames: usize) -> Self {
        self.min_frames = min_frames;
        self.max_frames = max_frames.max(min_frames);
        self
    }

    pub fn with_motion_thresholds(mut self, translation_m: f64, rotation_deg: f64) -> Self {
        self.min_translation_m = translation_m;
        self.min_rotation_rad = rotation_deg.to_radians();
        self
    }

    /// Decide whether the frame at `pose` should become a KeyFrame.
    ///
    /// Call once per tracked frame; call [`Self::keyframe_created`] when the
    /// KeyFrame was actually handed over.
    pub fn should_create_keyframe(&mut self, pose: &SE3) -> bool {
        self.frames_since_kf += 1;

        // First KeyFrame of the map
        let Some(last) = &self.last_kf_pose else {
            return true;
        };

        // Don't create KF too soon
        if self.frames_since_kf < self.min_frames {
            return false;
        }

        // Always create KF if max frames exceeded
        if self.frames_since_kf >= self.max_frames {
            return true;
        }

        let (dt, dr) = last.distance_to(pose);
        dt >= self.min_translation_m || dr >= self.min_rotation_rad
    }

    pub fn keyframe_created(&mut self, pose: &SE3) {
        self.frames_since_kf = 0;
        self.last_kf_pose = Some(pose.clone());
    }

    /// Forget the last KeyFrame (after a reset).
    pub fn reset(&mut self) {
        self.frames_since_kf = 0;
        self.last_kf_pose = None;
    }
}

impl Default for KeyFrameDecision {
    fn default() -> Self {
        Self::new()
    }
}
