//! Ground-truth replay tracker.
//!
//! Reports, for each frame set, the ground-truth pose closest in time to the
//! capture. The timestamp gap grades the estimate and inflates its covariance,
//! so the rest of the pipeline (keyframes, map maker, publication, reset) can
//! run end to end without a vision front-end.

use anyhow::{Result, bail};
use nalgebra::Matrix6;
use tracing::{debug, info};

use crate::io::FrameSet;
use crate::io::euroc::GroundTruthEntry;
use crate::system::messages::{KeyFrameId, NewKeyFrameMsg};

use super::keyframe_decision::KeyFrameDecision;
use super::state::{TrackerState, TrackingQuality};
use super::tracker::{Tracker, TrackerContext};

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Largest gap between capture and ground truth graded `Good`.
    pub good_gap_ns: u64,
    /// Largest gap graded `Poor`; anything beyond is `Lost`.
    pub poor_gap_ns: u64,
    /// Position standard deviation at zero gap (meters).
    pub base_sigma_m: f64,
    /// Added standard deviation per millisecond of gap (meters).
    pub sigma_per_ms: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            good_gap_ns: 5_000_000,
            poor_gap_ns: 20_000_000,
            base_sigma_m: 0.01,
            sigma_per_ms: 0.002,
        }
    }
}

pub struct ReplayTracker {
    config: ReplayConfig,
    /// Sorted by timestamp.
    trajectory: Vec<GroundTruthEntry>,
    ctx: TrackerContext,
    decision: KeyFrameDecision,
    state: TrackerState,
    keyframe_insertion: bool,
    /// Keyframe ids stay unique across resets.
    next_kf_id: u64,
    frames_processed: usize,
}

impl ReplayTracker {
    pub fn new(mut trajectory: Vec<GroundTruthEntry>, ctx: TrackerContext) -> Self {
        trajectory.sort_by_key(|e| e.timestamp_ns);
        Self {
            config: ReplayConfig::default(),
            trajectory,
            ctx,
            decision: KeyFrameDecision::default(),
            state: TrackerState::initial(),
            keyframe_insertion: true,
            next_kf_id: 0,
            frames_processed: 0,
        }
    }

    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_keyframe_decision(mut self, decision: KeyFrameDecision) -> Self {
        self.decision = decision;
        self
    }

    pub fn frames_processed(&self) -> usize {
        self.frames_processed
    }

    /// Ground-truth entry closest to `timestamp_ns` and its gap.
    fn nearest(&self, timestamp_ns: u64) -> Option<(&GroundTruthEntry, u64)> {
        let idx = self
            .trajectory
            .partition_point(|e| e.timestamp_ns < timestamp_ns);

        let after = self.trajectory.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.trajectory.get(i));
        [before, after]
            .into_iter()
            .flatten()
            .map(|e| (e, e.timestamp_ns.abs_diff(timestamp_ns)))
            .min_by_key(|&(_, gap)| gap)
    }

    fn grade(&self, gap_ns: u64) -> TrackingQuality {
        if gap_ns <= self.config.good_gap_ns {
            TrackingQuality::Good
        } else if gap_ns <= self.config.poor_gap_ns {
            TrackingQuality::Poor
        } else {
            TrackingQuality::Lost
        }
    }

    fn covariance(&self, gap_ns: u64) -> Matrix6<f64> {
        let gap_ms = gap_ns as f64 / 1e6;
        let sigma = self.config.base_sigma_m + self.config.sigma_per_ms * gap_ms;
        Matrix6::identity() * (sigma * sigma)
    }

    fn maybe_send_keyframe(&mut self, frame_set: &FrameSet) {
        if !self.keyframe_insertion || !self.state.quality.is_confident() {
            return;
        }
        // Map maker is behind; don't even count this frame.
        if self.ctx.shared.should_stop_keyframe_creation() {
            return;
        }
        if !self.decision.should_create_keyframe(&self.state.pose) {
            return;
        }

        let keyframe_id = KeyFrameId(self.next_kf_id);
        let msg = NewKeyFrameMsg {
            keyframe_id,
            timestamp_ns: self.state.timestamp_ns,
            pose: self.state.pose.clone(),
            covariance: self.state.covariance,
            frame_set: frame_set.clone(),
        };
        if self.ctx.keyframes.try_send(msg) {
            self.next_kf_id += 1;
            self.decision.keyframe_created(&self.state.pose);
            debug!("Created {} at ts={}", keyframe_id, self.state.timestamp_ns);
        }
    }
}

impl Tracker for ReplayTracker {
    fn initialize(&mut self) -> Result<()> {
        if self.trajectory.is_empty() {
            bail!("replay tracker needs a non-empty ground-truth trajectory");
        }
        info!(
            "Replay tracker ready ({} ground-truth poses)",
            self.trajectory.len()
        );
        Ok(())
    }

    fn process_frame(&mut self, frame_set: &FrameSet) -> Result<()> {
        if frame_set.is_empty() {
            bail!("frame set at ts={} has no images", frame_set.timestamp_ns());
        }
        let timestamp_ns = frame_set.timestamp_ns();
        let Some((entry, gap_ns)) = self.nearest(timestamp_ns) else {
            bail!("no ground truth loaded");
        };
        let pose = entry.pose.clone();
        let quality = self.grade(gap_ns);

        self.frames_processed += 1;
        self.state.timestamp_ns = timestamp_ns;
        self.state.quality = quality;
        if quality == TrackingQuality::Lost {
            // Stale pose stays, with an uncertainty that matches the gap.
            self.state.covariance = self.covariance(gap_ns);
            debug!("No ground truth within {} ns of ts={}", gap_ns, timestamp_ns);
            return Ok(());
        }
        self.state.pose = pose;
        self.state.covariance = self.covariance(gap_ns);

        self.maybe_send_keyframe(frame_set);
        Ok(())
    }

    fn state(&self) -> TrackerState {
        self.state.clone()
    }

    fn reset(&mut self) -> Result<()> {
        self.state = TrackerState::initial();
        self.decision.reset();
        info!("Replay tracker reset after {} frames", self.frames_processed);
        Ok(())
    }

    fn set_keyframe_insertion(&mut self, enabled: bool) {
        self.keyframe_insertion = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;
    use crate::io::CameraId;
    use crate::system::messages::KeyFrameSender;
    use crate::system::shared_state::SharedState;
    use approx::assert_relative_eq;
    use crossbeam_channel::{Receiver, bounded};
    use image::GrayImage;
    use nalgebra::{UnitQuaternion, Vector3};

    const MS: u64 = 1_000_000;

    fn trajectory() -> Vec<GroundTruthEntry> {
        (0..10)
            .map(|i| GroundTruthEntry {
                timestamp_ns: 1_000 * MS + i * 50 * MS,
                pose: SE3::from_parts(
                    UnitQuaternion::identity(),
                    Vector3::new(i as f64, 0.0, 0.0),
                ),
            })
            .collect()
    }

    fn frame(ts: u64) -> FrameSet {
        FrameSet::new(ts).with_image(CameraId(0), GrayImage::new(4, 4))
    }

    fn tracker(capacity: usize) -> (ReplayTracker, Receiver<NewKeyFrameMsg>) {
        let shared = SharedState::new();
        let (tx, rx) = bounded(capacity);
        let ctx = TrackerContext {
            keyframes: KeyFrameSender::new(tx, shared.clone()),
            shared,
        };
        let tracker = ReplayTracker::new(trajectory(), ctx)
            .with_keyframe_decision(KeyFrameDecision::new().with_frame_bounds(0, 100));
        (tracker, rx)
    }

    #[test]
    fn test_empty_trajectory_fails_initialization() {
        let (tx, _rx) = bounded(1);
        let shared = SharedState::new();
        let ctx = TrackerContext {
            keyframes: KeyFrameSender::new(tx, shared.clone()),
            shared,
        };
        assert!(ReplayTracker::new(Vec::new(), ctx).initialize().is_err());
    }

    #[test]
    fn test_quality_graded_by_timestamp_gap() {
        let (mut tracker, _rx) = tracker(8);
        tracker.initialize().unwrap();
        assert_eq!(tracker.state().quality, TrackingQuality::NotInitialized);

        tracker.process_frame(&frame(1_050 * MS + 2 * MS)).unwrap();
        let good = tracker.state();
        assert_eq!(good.quality, TrackingQuality::Good);
        assert_relative_eq!(good.pose.translation.x, 1.0);

        tracker.process_frame(&frame(1_100 * MS + 15 * MS)).unwrap();
        let poor = tracker.state();
        assert_eq!(poor.quality, TrackingQuality::Poor);
        assert_relative_eq!(poor.pose.translation.x, 2.0);
        assert!(poor.covariance[(0, 0)] > good.covariance[(0, 0)]);

        // Midway between two poses: 25 ms from both.
        tracker.process_frame(&frame(1_175 * MS)).unwrap();
        let lost = tracker.state();
        assert_eq!(lost.quality, TrackingQuality::Lost);
        assert_relative_eq!(lost.pose.translation.x, 2.0);
        assert_eq!(lost.timestamp_ns, 1_175 * MS);
        assert!(lost.covariance[(0, 0)] > poor.covariance[(0, 0)]);
    }

    #[test]
    fn test_keyframes_only_from_good_frames() {
        let (mut tracker, rx) = tracker(8);
        tracker.process_frame(&frame(1_000 * MS)).unwrap();
        tracker.process_frame(&frame(1_065 * MS)).unwrap(); // poor
        tracker.process_frame(&frame(1_100 * MS)).unwrap();

        let ids: Vec<_> = rx.try_iter().map(|m| m.keyframe_id.0).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_keyframe_insertion_toggle_and_flow_control() {
        let (mut tracker, rx) = tracker(8);
        tracker.set_keyframe_insertion(false);
        tracker.process_frame(&frame(1_000 * MS)).unwrap();
        assert!(rx.is_empty());

        tracker.set_keyframe_insertion(true);
        tracker.ctx.shared.set_stop_keyframe_creation(true);
        tracker.process_frame(&frame(1_050 * MS)).unwrap();
        assert!(rx.is_empty());

        tracker.ctx.shared.set_stop_keyframe_creation(false);
        tracker.process_frame(&frame(1_100 * MS)).unwrap();
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_full_queue_drops_keyframe_without_blocking() {
        let (mut tracker, rx) = tracker(1);
        tracker.process_frame(&frame(1_000 * MS)).unwrap();
        tracker.process_frame(&frame(1_050 * MS)).unwrap();
        assert_eq!(rx.len(), 1);
        assert!(tracker.ctx.shared.should_stop_keyframe_creation());
    }

    #[test]
    fn test_empty_frame_set_is_an_error() {
        let (mut tracker, _rx) = tracker(1);
        assert!(tracker.process_frame(&FrameSet::new(1_000 * MS)).is_err());
    }

    #[test]
    fn test_reset_returns_to_not_initialized() {
        let (mut tracker, rx) = tracker(8);
        tracker.process_frame(&frame(1_000 * MS)).unwrap();
        tracker.reset().unwrap();
        assert_eq!(tracker.state(), TrackerState::initial());

        // First frame after reset is a keyframe again, with a fresh id.
        tracker.process_frame(&frame(1_000 * MS)).unwrap();
        let ids: Vec<_> = rx.try_iter().map(|m| m.keyframe_id.0).collect();
        assert_eq!(ids, vec![0, 1]);
    }
}
