//! Scripted collaborators for unit tests of the system core.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use image::GrayImage;
use nalgebra::Matrix6;

use crate::io::{AcquisitionError, CameraId, FrameSet, FrameSource};
use crate::local_mapping::{KeyFrameSummary, MapBuilder, RefineOutcome};
use crate::system::messages::{KeyFrameId, KeyFrameSender, NewKeyFrameMsg};
use crate::tracking::{Tracker, TrackerState, TrackingQuality};

pub(crate) fn frame(ts: u64) -> FrameSet {
    FrameSet::new(ts).with_image(CameraId(0), GrayImage::new(2, 2))
}

pub(crate) fn keyframe_msg(id: u64) -> NewKeyFrameMsg {
    NewKeyFrameMsg {
        keyframe_id: KeyFrameId(id),
        timestamp_ns: id,
        pose: Default::default(),
        covariance: Matrix6::identity(),
        frame_set: frame(id),
    }
}

pub(crate) fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Frame source replaying a fixed script, then a fallback outcome forever.
pub(crate) struct ScriptedSource {
    script: VecDeque<Result<FrameSet, AcquisitionError>>,
    exhaust_at_end: bool,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    /// `n` frames, 50 ms apart, then `Exhausted`.
    pub(crate) fn frames(n: u64) -> Self {
        Self::new((0..n).map(|i| Ok(frame(1_000 + i * 50_000_000))).collect())
    }

    pub(crate) fn new(script: Vec<Result<FrameSet, AcquisitionError>>) -> Self {
        Self {
            script: script.into(),
            exhaust_at_end: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// After the script, time out forever instead of exhausting.
    pub(crate) fn then_timeouts(mut self) -> Self {
        self.exhaust_at_end = false;
        self
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame_set(&mut self, timeout: Duration) -> Result<FrameSet, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(item) => item,
            None if self.exhaust_at_end => Err(AcquisitionError::Exhausted),
            None => Err(AcquisitionError::Timeout(timeout)),
        }
    }
}

/// Counters shared between a test and its [`MockTracker`].
#[derive(Debug, Clone, Default)]
pub(crate) struct TrackerProbe {
    pub frames: Arc<AtomicUsize>,
    pub resets: Arc<AtomicUsize>,
}

impl TrackerProbe {
    pub(crate) fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub(crate) fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

/// Tracker reporting a fixed quality, optionally emitting one keyframe per frame.
pub(crate) struct MockTracker {
    pub probe: TrackerProbe,
    pub quality: TrackingQuality,
    pub fail_init: bool,
    pub fail_frames: bool,
    pub fail_reset: bool,
    pub reset_delay: Duration,
    pub keyframes: Option<KeyFrameSender>,
    pub keyframe_insertion: bool,
    state: TrackerState,
    next_kf_id: u64,
}

impl MockTracker {
    pub(crate) fn new(quality: TrackingQuality) -> Self {
        Self {
            probe: TrackerProbe::default(),
            quality,
            fail_init: false,
            fail_frames: false,
            fail_reset: false,
            reset_delay: Duration::ZERO,
            keyframes: None,
            keyframe_insertion: true,
            state: TrackerState::initial(),
            next_kf_id: 0,
        }
    }
}

impl Tracker for MockTracker {
    fn initialize(&mut self) -> Result<()> {
        if self.fail_init {
            bail!("camera calibration missing");
        }
        Ok(())
    }

    fn process_frame(&mut self, frame_set: &FrameSet) -> Result<()> {
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        if self.fail_frames {
            bail!("feature extraction failed");
        }
        self.state.timestamp_ns = frame_set.timestamp_ns();
        self.state.quality = self.quality;

        if let (Some(tx), true) = (&self.keyframes, self.keyframe_insertion) {
            let mut msg = keyframe_msg(self.next_kf_id);
            msg.frame_set = frame_set.clone();
            if tx.try_send(msg) {
                self.next_kf_id += 1;
            }
        }
        Ok(())
    }

    fn state(&self) -> TrackerState {
        self.state.clone()
    }

    fn reset(&mut self) -> Result<()> {
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.reset_delay);
        if self.fail_reset {
            bail!("tracker refused to reset");
        }
        self.state = TrackerState::initial();
        Ok(())
    }

    fn set_keyframe_insertion(&mut self, enabled: bool) {
        self.keyframe_insertion = enabled;
    }
}

/// Map builder that keeps every keyframe. Refinement runs `pending_refines`
/// uninterrupted passes, then stays idle.
#[derive(Default)]
pub(crate) struct VecBuilder {
    pub keyframes: Vec<KeyFrameSummary>,
    pub fail_init: bool,
    pub fail_clear: bool,
    pub pending_refines: usize,
    pub insert_delay: Duration,
}

impl MapBuilder for VecBuilder {
    fn initialize(&mut self) -> Result<()> {
        if self.fail_init {
            bail!("no vocabulary");
        }
        Ok(())
    }

    fn insert_keyframe(&mut self, msg: NewKeyFrameMsg) -> Result<()> {
        thread::sleep(self.insert_delay);
        self.keyframes.push(KeyFrameSummary {
            id: msg.keyframe_id,
            timestamp_ns: msg.timestamp_ns,
            pose: msg.pose,
            num_cameras: msg.frame_set.num_cameras(),
        });
        Ok(())
    }

    fn refine(&mut self, should_stop: &dyn Fn() -> bool) -> RefineOutcome {
        if self.pending_refines == 0 {
            return RefineOutcome::Idle;
        }
        if should_stop() {
            return RefineOutcome::Aborted;
        }
        self.pending_refines -= 1;
        RefineOutcome::Refined
    }

    fn clear(&mut self) -> Result<()> {
        self.keyframes.clear();
        if self.fail_clear {
            bail!("map storage corrupted");
        }
        Ok(())
    }

    fn keyframes(&self) -> Vec<KeyFrameSummary> {
        self.keyframes.clone()
    }
}
