//! Tracking System - main entry point and run loop.
//!
//! The `TrackingSystem` owns the frame source and the tracker, which run on the
//! calling thread, and the map maker, which runs on its own thread. Each
//! iteration of the run loop:
//!
//! 1. Dispatches at most one pending command
//! 2. Acquires the next frame set (bounded by `frame_timeout`)
//! 3. Tracks it; keyframes go to the map maker without blocking
//! 4. Publishes diagnostics, and the pose when the schedule allows
//! 5. Checks the shutdown token

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::io::map_export::save_map_csv;
use crate::io::{FrameSet, FrameSource};
use crate::local_mapping::{MapBuilder, MapMaker};
use crate::tracking::{SharedTracker, Tracker, TrackerContext, TrackerState};

use super::commands::{Command, CommandQueue, CommandSender};
use super::config::SystemConfig;
use super::messages::{KeyFrameSender, NewKeyFrameMsg};
use super::publisher::{Clock, MonotonicClock, PublicationSink, StatePublisher, SystemInfo};
use super::reset::{ResetCoordinator, ResetHandle};
use super::run_state::ShutdownToken;
use super::shared_state::SharedState;

/// Smoothing factor of the frame-rate moving average.
const FRAME_RATE_ALPHA: f64 = 0.1;

/// Why the run loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QuitCommand,
    FailureThreshold,
    SourceExhausted,
    /// The shutdown token was cancelled from outside the loop.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub frames_processed: u64,
    pub stop_reason: StopReason,
}

#[derive(Debug, Default)]
struct LoopStats {
    iterations: u64,
    frames_processed: u64,
    consecutive_failures: u32,
    frame_rate_hz: f64,
    last_frame_at: Option<Instant>,
    tracking_duration: Duration,
}

impl LoopStats {
    fn frame_arrived(&mut self, now: Instant) {
        if let Some(prev) = self.last_frame_at {
            let dt = now.duration_since(prev).as_secs_f64();
            if dt > 0.0 {
                let rate = 1.0 / dt;
                self.frame_rate_hz = if self.frame_rate_hz == 0.0 {
                    rate
                } else {
                    (1.0 - FRAME_RATE_ALPHA) * self.frame_rate_hz + FRAME_RATE_ALPHA * rate
                };
            }
        }
        self.last_frame_at = Some(now);
    }
}

pub struct TrackingSystem<S: FrameSource> {
    config: SystemConfig,
    source: S,

    /// Shared with the reset coordinator.
    tracker: SharedTracker,

    /// Tracker state as last published; degraded when tracking failed.
    published_state: TrackerState,

    map_maker: MapMaker,
    kf_sender: KeyFrameSender,
    shared: Arc<SharedState>,
    commands: CommandQueue,
    reset: ResetHandle,
    publisher: StatePublisher,
    shutdown: ShutdownToken,
    stop_reason: Option<StopReason>,
    stats: LoopStats,
}

impl<S: FrameSource> TrackingSystem<S> {
    /// Build and initialize every component, then start the map maker.
    ///
    /// A tracker or map builder that fails to initialize, or a map maker
    /// thread that cannot be spawned, is returned as an error; the run loop
    /// never starts.
    pub fn new<T, F, B, P>(
        config: SystemConfig,
        source: S,
        make_tracker: F,
        builder: B,
        sink: P,
    ) -> Result<Self>
    where
        T: Tracker + 'static,
        F: FnOnce(TrackerContext) -> Result<T>,
        B: MapBuilder,
        P: PublicationSink + 'static,
    {
        config.validate()?;

        let shared = SharedState::new();

        // Create bounded channel for keyframe communication
        let (kf_tx, kf_rx) = bounded::<NewKeyFrameMsg>(config.keyframe_queue_capacity);
        let kf_sender = KeyFrameSender::new(kf_tx, shared.clone());

        let mut tracker = make_tracker(TrackerContext {
            keyframes: kf_sender.clone(),
            shared: shared.clone(),
        })
        .context("failed to create tracker")?;
        tracker
            .initialize()
            .context("tracker initialization failed")?;

        let map_maker = MapMaker::spawn(
            builder,
            kf_rx,
            shared.clone(),
            config.keyframe_queue_high_water,
            config.mapper_idle_wait(),
        )?;

        let tracker: SharedTracker = Arc::new(Mutex::new(tracker));
        let coordinator = ResetCoordinator::new(
            tracker.clone(),
            map_maker.control(),
            shared.clone(),
            config.reset_ack_timeout(),
        );

        let publisher = StatePublisher::new(
            Box::new(sink),
            Box::new(MonotonicClock::new()),
            config.pose_publish_interval(),
        );

        info!(
            "Tracking system ready (pose interval {:?}, frame timeout {:?}, failure threshold {})",
            config.pose_publish_interval(),
            config.frame_timeout(),
            config.max_consecutive_failures
        );

        Ok(Self {
            config,
            source,
            tracker,
            published_state: TrackerState::initial(),
            map_maker,
            kf_sender,
            shared,
            commands: CommandQueue::new(),
            reset: ResetHandle::new(Arc::new(coordinator)),
            publisher,
            shutdown: ShutdownToken::new(),
            stop_reason: None,
            stats: LoopStats::default(),
        })
    }

    /// Replace the publication clock.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.publisher.set_clock(clock);
        self
    }

    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    pub fn reset_handle(&self) -> ResetHandle {
        self.reset.clone()
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn tracker(&self) -> SharedTracker {
        self.tracker.clone()
    }

    pub fn map_maker(&self) -> &MapMaker {
        &self.map_maker
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Run until the shutdown token is cancelled.
    pub fn run(&mut self) -> RunSummary {
        info!("Run loop started");
        while self.step() {}

        let summary = RunSummary {
            iterations: self.stats.iterations,
            frames_processed: self.stats.frames_processed,
            stop_reason: self.stop_reason.unwrap_or(StopReason::External),
        };
        info!(
            "Run loop stopped ({:?}) after {} iterations, {} frames",
            summary.stop_reason, summary.iterations, summary.frames_processed
        );
        summary
    }

    /// One run-loop iteration. Returns whether the loop should continue.
    pub fn step(&mut self) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }

        if let Some(command) = self.commands.try_next() {
            self.handle_command(command);
        }

        let mut tracked = false;
        if !self.shutdown.is_cancelled() {
            if let Some(frame_set) = self.acquire() {
                self.track(&frame_set);
                tracked = true;
            }
        }

        self.publish(tracked);
        self.stats.iterations += 1;
        self.shutdown.should_run()
    }

    fn handle_command(&mut self, command: Command) {
        info!("Command: {}", command);
        match command {
            Command::Reset => {
                let outcome = self.reset.reset();
                info!("Reset {}", outcome);
            }
            Command::Quit => self.stop(StopReason::QuitCommand),
            Command::SaveMap(path) => {
                let snapshot = self.shared.map_snapshot();
                match save_map_csv(&snapshot, &path) {
                    Ok(n) => info!(
                        "Saved {} keyframes (map version {}) to {}",
                        n,
                        snapshot.version,
                        path.display()
                    ),
                    Err(e) => warn!("SaveMap failed: {:#}", e),
                }
            }
            Command::KeyFrameInsertion(enabled) => {
                self.tracker.lock().set_keyframe_insertion(enabled);
            }
            Command::PauseMapping => match self.map_maker.pause(self.config.reset_ack_timeout()) {
                Ok(_) => info!("Map maker paused"),
                Err(e) => warn!("PauseMapping failed: {}", e),
            },
            Command::ResumeMapping => self.map_maker.resume(),
            Command::Unknown { name, params } => {
                warn!("Unknown command '{}' (params '{}'), ignored", name, params);
            }
        }
    }

    fn acquire(&mut self) -> Option<FrameSet> {
        match self.source.next_frame_set(self.config.frame_timeout()) {
            Ok(frame_set) => {
                self.stats.consecutive_failures = 0;
                Some(frame_set)
            }
            Err(e) if !e.is_transient() => {
                info!("Frame source finished: {}", e);
                self.stop(StopReason::SourceExhausted);
                None
            }
            Err(e) => {
                self.stats.consecutive_failures += 1;
                warn!(
                    "Frame acquisition failed ({} consecutive): {}",
                    self.stats.consecutive_failures, e
                );
                let threshold = self.config.max_consecutive_failures;
                if threshold > 0 && self.stats.consecutive_failures >= threshold {
                    error!(
                        "{} consecutive acquisition failures, shutting down",
                        self.stats.consecutive_failures
                    );
                    self.stop(StopReason::FailureThreshold);
                }
                None
            }
        }
    }

    fn track(&mut self, frame_set: &FrameSet) {
        let start = Instant::now();
        self.stats.frame_arrived(start);

        let mut tracker = self.tracker.lock();
        let result = tracker.process_frame(frame_set);
        let state = tracker.state();
        drop(tracker);

        self.stats.tracking_duration = start.elapsed();
        self.stats.frames_processed += 1;

        self.published_state = match result {
            Ok(()) => state,
            Err(e) => {
                warn!(
                    "Tracking failed on frame ts={}: {:#}",
                    frame_set.timestamp_ns(),
                    e
                );
                state.degraded()
            }
        };
        debug!(
            "Frame ts={} tracked in {:?}: {}",
            frame_set.timestamp_ns(),
            self.stats.tracking_duration,
            self.published_state.quality
        );
    }

    fn publish(&mut self, tracked: bool) {
        let snapshot = self.shared.map_snapshot();
        let info = SystemInfo {
            iteration: self.stats.iterations,
            timestamp_ns: self.published_state.timestamp_ns,
            frame_rate_hz: self.stats.frame_rate_hz,
            tracking_duration: self.stats.tracking_duration,
            quality: self.published_state.quality,
            consecutive_failures: self.stats.consecutive_failures,
            map_version: snapshot.version,
            num_keyframes: snapshot.num_keyframes(),
            keyframe_queue_len: self.kf_sender.queue_len(),
            mapping_paused: self.map_maker.is_paused(),
            health: self.shared.health(),
        };
        self.publisher.publish_state(&info);

        if tracked {
            self.publisher.publish_pose(&self.published_state);
        }
    }

    fn stop(&mut self, reason: StopReason) {
        if self.shutdown.cancel() {
            self.stop_reason = Some(reason);
        }
    }

    /// Stop the run loop and join the map maker.
    pub fn shutdown(&mut self) {
        self.shutdown.cancel();
        self.map_maker.shutdown();
    }
}

impl<S: FrameSource> Drop for TrackingSystem<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
