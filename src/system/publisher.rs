//! State publication: diagnostics every iteration, pose at a bounded rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use nalgebra::Matrix6;
use tracing::{debug, info};

use crate::geometry::SE3;
use crate::tracking::{TrackerState, TrackingQuality};

use super::shared_state::SystemHealth;

/// Monotonic time source, as elapsed time since an arbitrary origin.
pub trait Clock: Send {
    fn now(&self) -> Duration;
}

pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, t: Duration) {
        self.nanos.store(t.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, dt: Duration) {
        self.nanos.fetch_add(dt.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Minimum spacing between pose publications.
#[derive(Debug, Clone)]
pub struct PublishSchedule {
    min_interval: Duration,
    last_publish: Option<Duration>,
}

impl PublishSchedule {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_publish: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn last_publish(&self) -> Option<Duration> {
        self.last_publish
    }

    /// The first publication is always due; later ones once at least
    /// `min_interval` has passed.
    pub fn is_due(&self, now: Duration) -> bool {
        match self.last_publish {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.min_interval,
        }
    }

    pub fn mark(&mut self, now: Duration) {
        self.last_publish = Some(now);
    }
}

/// Diagnostics published once per run-loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInfo {
    pub iteration: u64,
    pub timestamp_ns: u64,
    /// Exponential moving average of processed frames per second.
    pub frame_rate_hz: f64,
    pub tracking_duration: Duration,
    pub quality: TrackingQuality,
    pub consecutive_failures: u32,
    pub map_version: u64,
    pub num_keyframes: usize,
    pub keyframe_queue_len: usize,
    pub mapping_paused: bool,
    pub health: SystemHealth,
}

/// A pose publication.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseMessage {
    pub timestamp_ns: u64,
    pub pose: SE3,
    pub covariance: Matrix6<f64>,
    pub quality: TrackingQuality,
    /// Set when the quality is below `Good`; consumers should not rely on it.
    pub low_confidence: bool,
}

impl From<&TrackerState> for PoseMessage {
    fn from(state: &TrackerState) -> Self {
        Self {
            timestamp_ns: state.timestamp_ns,
            pose: state.pose.clone(),
            covariance: state.covariance,
            quality: state.quality,
            low_confidence: !state.quality.is_confident(),
        }
    }
}

/// Everything a sink can receive, for sinks that forward over a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Publication {
    SystemInfo(SystemInfo),
    Pose(PoseMessage),
}

/// Where publications go. Encoding and transport belong to the sink.
pub trait PublicationSink: Send {
    fn system_info(&mut self, info: &SystemInfo);
    fn pose(&mut self, pose: &PoseMessage);
}

/// Logs publications through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl PublicationSink for LogSink {
    fn system_info(&mut self, s: &SystemInfo) {
        debug!(
            "[{}] {:.1} Hz, track {:.1} ms, {}, failures={}, map v{} ({} KFs, {} queued{}), {}",
            s.iteration,
            s.frame_rate_hz,
            s.tracking_duration.as_secs_f64() * 1000.0,
            s.quality,
            s.consecutive_failures,
            s.map_version,
            s.num_keyframes,
            s.keyframe_queue_len,
            if s.mapping_paused { ", paused" } else { "" },
            s.health
        );
    }

    fn pose(&mut self, p: &PoseMessage) {
        let t = &p.pose.translation;
        info!(
            "Pose ts={} [{:.3}, {:.3}, {:.3}] {}{}",
            p.timestamp_ns,
            t.x,
            t.y,
            t.z,
            p.quality,
            if p.low_confidence { " (low confidence)" } else { "" }
        );
    }
}

/// Forwards publications over a channel. A disconnected receiver is ignored.
pub struct ChannelSink {
    tx: Sender<Publication>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Publication>) -> Self {
        Self { tx }
    }
}

impl PublicationSink for ChannelSink {
    fn system_info(&mut self, info: &SystemInfo) {
        let _ = self.tx.send(Publication::SystemInfo(info.clone()));
    }

    fn pose(&mut self, pose: &PoseMessage) {
        let _ = self.tx.send(Publication::Pose(pose.clone()));
    }
}

pub struct StatePublisher {
    sink: Box<dyn PublicationSink>,
    clock: Box<dyn Clock>,
    schedule: PublishSchedule,
}

impl StatePublisher {
    pub fn new(
        sink: Box<dyn PublicationSink>,
        clock: Box<dyn Clock>,
        min_interval: Duration,
    ) -> Self {
        Self {
            sink,
            clock,
            schedule: PublishSchedule::new(min_interval),
        }
    }

    /// Unthrottled.
    pub fn publish_state(&mut self, info: &SystemInfo) {
        self.sink.system_info(info);
    }

    /// Publish the pose if the schedule allows it. Returns whether it did.
    pub fn publish_pose(&mut self, state: &TrackerState) -> bool {
        let now = self.clock.now();
        if !self.schedule.is_due(now) {
            return false;
        }
        self.sink.pose(&PoseMessage::from(state));
        self.schedule.mark(now);
        true
    }

    /// Swap the time source. The schedule is kept.
    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    pub fn schedule(&self) -> &PublishSchedule {
        &self.schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, unbounded};

    fn publisher(clock: &ManualClock, interval_ms: u64) -> (StatePublisher, Receiver<Publication>) {
        let (tx, rx) = unbounded();
        let publisher = StatePublisher::new(
            Box::new(ChannelSink::new(tx)),
            Box::new(clock.clone()),
            Duration::from_millis(interval_ms),
        );
        (publisher, rx)
    }

    fn good_state() -> TrackerState {
        TrackerState {
            quality: TrackingQuality::Good,
            ..TrackerState::initial()
        }
    }

    #[test]
    fn test_pose_schedule_0_50_100() {
        let clock = ManualClock::new();
        let (mut publisher, rx) = publisher(&clock, 100);
        let state = good_state();

        assert!(publisher.publish_pose(&state));
        clock.set(Duration::from_millis(50));
        assert!(!publisher.publish_pose(&state));
        clock.set(Duration::from_millis(100));
        assert!(publisher.publish_pose(&state));

        assert_eq!(rx.try_iter().count(), 2);
        assert_eq!(
            publisher.schedule().last_publish(),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_suppressed_pose_does_not_move_schedule() {
        let clock = ManualClock::new();
        let (mut publisher, _rx) = publisher(&clock, 100);
        let state = good_state();

        assert!(publisher.publish_pose(&state));
        clock.set(Duration::from_millis(99));
        assert!(!publisher.publish_pose(&state));
        clock.set(Duration::from_millis(100));
        assert!(publisher.publish_pose(&state));
    }

    #[test]
    fn test_low_quality_pose_flagged_not_suppressed() {
        let clock = ManualClock::new();
        let (mut publisher, rx) = publisher(&clock, 100);
        let lost = TrackerState::initial().degraded();

        assert!(publisher.publish_pose(&lost));
        match rx.try_recv().unwrap() {
            Publication::Pose(p) => {
                assert!(p.low_confidence);
                assert_eq!(p.quality, TrackingQuality::Lost);
            }
            other => panic!("unexpected publication {:?}", other),
        }
    }

    #[test]
    fn test_system_info_is_not_throttled() {
        let clock = ManualClock::new();
        let (mut publisher, rx) = publisher(&clock, 100);
        let info = SystemInfo {
            iteration: 0,
            timestamp_ns: 0,
            frame_rate_hz: 0.0,
            tracking_duration: Duration::ZERO,
            quality: TrackingQuality::NotInitialized,
            consecutive_failures: 0,
            map_version: 0,
            num_keyframes: 0,
            keyframe_queue_len: 0,
            mapping_paused: false,
            health: SystemHealth::Nominal,
        };
        for _ in 0..5 {
            publisher.publish_state(&info);
        }
        assert_eq!(rx.try_iter().count(), 5);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(7));
        assert_eq!(other.now(), Duration::from_millis(7));
    }
}
