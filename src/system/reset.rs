//! Coordinated reset of tracking and mapping.
//!
//! Only one reset runs at a time; a concurrent request is turned away
//! immediately instead of queuing. During a reset the tracker is locked, so
//! the run loop cannot produce keyframes for a map that is being cleared.
//!
//! Sequence:
//! 1. Map maker: pause-and-clear hand-shake (bounded by the ack timeout)
//! 2. Tracker reset on the calling thread
//! 3. Map maker resume, issued whatever happened before

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::local_mapping::MapperControl;
use crate::tracking::SharedTracker;

use super::shared_state::{SharedState, SystemHealth};

/// Reset service request. Carries no payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetRequest;

/// Reset service response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Both tracker and map maker were reset.
    Completed,
    /// Another reset was running; nothing was done.
    AlreadyInProgress,
    /// At least one component failed. Each field holds that component's error.
    Failed {
        tracker: Option<String>,
        map_maker: Option<String>,
    },
}

impl ResetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ResetOutcome::Completed)
    }
}

impl fmt::Display for ResetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetOutcome::Completed => f.write_str("completed"),
            ResetOutcome::AlreadyInProgress => f.write_str("already in progress"),
            ResetOutcome::Failed { tracker, map_maker } => {
                f.write_str("failed:")?;
                if let Some(e) = tracker {
                    write!(f, " tracker ({})", e)?;
                }
                if let Some(e) = map_maker {
                    write!(f, " map maker ({})", e)?;
                }
                Ok(())
            }
        }
    }
}

pub struct ResetCoordinator {
    in_progress: Mutex<()>,
    tracker: SharedTracker,
    mapper: Arc<MapperControl>,
    shared: Arc<SharedState>,
    ack_timeout: Duration,
}

impl ResetCoordinator {
    pub fn new(
        tracker: SharedTracker,
        mapper: Arc<MapperControl>,
        shared: Arc<SharedState>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            in_progress: Mutex::new(()),
            tracker,
            mapper,
            shared,
            ack_timeout,
        }
    }

    pub fn reset(&self) -> ResetOutcome {
        let Some(_in_progress) = self.in_progress.try_lock() else {
            warn!("Reset requested while another reset is running; ignored");
            return ResetOutcome::AlreadyInProgress;
        };

        info!("Reset: locking tracker");
        let mut tracker = self.tracker.lock();

        info!("Reset: pausing map maker and clearing map");
        let map_maker = match self.mapper.pause_and_clear(self.ack_timeout) {
            Ok(_) => None,
            Err(e) => {
                error!("Reset: map maker: {}", e);
                Some(e.to_string())
            }
        };

        info!("Reset: resetting tracker");
        let tracker_err = match tracker.reset() {
            Ok(()) => None,
            Err(e) => {
                error!("Reset: tracker: {:#}", e);
                Some(format!("{:#}", e))
            }
        };

        self.mapper.resume();
        drop(tracker);

        let outcome = if tracker_err.is_none() && map_maker.is_none() {
            ResetOutcome::Completed
        } else {
            ResetOutcome::Failed {
                tracker: tracker_err,
                map_maker,
            }
        };

        match &outcome {
            ResetOutcome::Completed => {
                self.shared.set_health(SystemHealth::Nominal);
                info!("Reset complete");
            }
            failed => {
                self.shared.set_health(SystemHealth::Degraded {
                    reason: format!("reset {}", failed),
                });
                error!("Reset {}; system needs a manual reset", failed);
            }
        }
        outcome
    }
}

/// Cloneable reset service, callable from any thread.
#[derive(Clone)]
pub struct ResetHandle {
    coordinator: Arc<ResetCoordinator>,
}

impl ResetHandle {
    pub fn new(coordinator: Arc<ResetCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn reset(&self) -> ResetOutcome {
        self.coordinator.reset()
    }

    pub fn call(&self, _request: ResetRequest) -> ResetResponse {
        ResetResponse {
            success: self.reset().is_success(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_mapping::MapMaker;
    use crate::system::test_support::{MockTracker, VecBuilder, frame, keyframe_msg, wait_for};
    use crate::tracking::{Tracker, TrackingQuality};
    use crossbeam_channel::{Sender, bounded};
    use std::thread;

    struct Fixture {
        tracker: Arc<Mutex<MockTracker>>,
        maker: MapMaker,
        kf_tx: Sender<crate::system::messages::NewKeyFrameMsg>,
        shared: Arc<SharedState>,
        handle: ResetHandle,
    }

    fn fixture(tracker: MockTracker, builder: VecBuilder) -> Fixture {
        let shared = SharedState::new();
        let (kf_tx, kf_rx) = bounded(4);
        let maker = MapMaker::spawn(builder, kf_rx, shared.clone(), 3, Duration::from_millis(5))
            .unwrap();
        let tracker = Arc::new(Mutex::new(tracker));
        let shared_tracker: SharedTracker = tracker.clone();
        let coordinator = ResetCoordinator::new(
            shared_tracker,
            maker.control(),
            shared.clone(),
            Duration::from_secs(2),
        );
        Fixture {
            tracker,
            maker,
            kf_tx,
            shared,
            handle: ResetHandle::new(Arc::new(coordinator)),
        }
    }

    #[test]
    fn test_reset_while_lost_runs_full_sequence() {
        let fx = fixture(MockTracker::new(TrackingQuality::Lost), VecBuilder::default());
        fx.tracker.lock().process_frame(&frame(10)).unwrap();
        assert_eq!(fx.tracker.lock().state().quality, TrackingQuality::Lost);

        fx.kf_tx.send(keyframe_msg(1)).unwrap();
        assert!(wait_for(|| fx.shared.map_snapshot().num_keyframes() == 1));

        assert_eq!(fx.handle.reset(), ResetOutcome::Completed);
        assert_eq!(fx.shared.map_snapshot().num_keyframes(), 0);
        assert_eq!(
            fx.tracker.lock().state().quality,
            TrackingQuality::NotInitialized
        );
        assert!(fx.shared.health().is_nominal());

        // Map maker was resumed and accepts keyframes again.
        assert!(wait_for(|| !fx.maker.is_paused()));
        fx.kf_tx.send(keyframe_msg(2)).unwrap();
        assert!(wait_for(|| fx.shared.map_snapshot().num_keyframes() == 1));
    }

    #[test]
    fn test_concurrent_reset_is_turned_away() {
        let mut tracker = MockTracker::new(TrackingQuality::Good);
        tracker.reset_delay = Duration::from_millis(300);
        let probe = tracker.probe.clone();
        let fx = fixture(tracker, VecBuilder::default());

        let first = {
            let handle = fx.handle.clone();
            thread::spawn(move || handle.reset())
        };
        assert!(wait_for(|| probe.resets() == 1));

        assert_eq!(fx.handle.reset(), ResetOutcome::AlreadyInProgress);
        assert!(!fx.handle.call(ResetRequest).success);

        assert_eq!(first.join().unwrap(), ResetOutcome::Completed);
        assert_eq!(probe.resets(), 1);

        // Guard released: the next one goes through.
        assert!(fx.handle.call(ResetRequest).success);
        assert_eq!(probe.resets(), 2);
    }

    #[test]
    fn test_tracker_failure_degrades_until_next_good_reset() {
        let mut tracker = MockTracker::new(TrackingQuality::Good);
        tracker.fail_reset = true;
        let fx = fixture(tracker, VecBuilder::default());

        match fx.handle.reset() {
            ResetOutcome::Failed { tracker, map_maker } => {
                assert!(tracker.unwrap().contains("refused"));
                assert!(map_maker.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let health = fx.shared.health();
        assert!(!health.is_nominal());
        assert!(health.to_string().contains("needs manual reset"));
        // Resume was still issued.
        assert!(wait_for(|| !fx.maker.is_paused()));

        fx.tracker.lock().fail_reset = false;
        assert_eq!(fx.handle.reset(), ResetOutcome::Completed);
        assert!(fx.shared.health().is_nominal());
    }

    #[test]
    fn test_map_maker_failure_still_resets_tracker() {
        let builder = VecBuilder {
            fail_clear: true,
            ..Default::default()
        };
        let tracker = MockTracker::new(TrackingQuality::Good);
        let probe = tracker.probe.clone();
        let fx = fixture(tracker, builder);

        match fx.handle.reset() {
            ResetOutcome::Failed { tracker, map_maker } => {
                assert!(tracker.is_none());
                assert!(map_maker.unwrap().contains("corrupted"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(probe.resets(), 1);
        assert!(!fx.shared.health().is_nominal());
    }

    #[test]
    fn test_stopped_map_maker_reported() {
        let tracker = MockTracker::new(TrackingQuality::Good);
        let mut fx = fixture(tracker, VecBuilder::default());
        fx.maker.shutdown();

        let outcome = fx.handle.reset();
        assert!(matches!(
            outcome,
            ResetOutcome::Failed { tracker: None, map_maker: Some(ref e) } if e.contains("not running")
        ));
    }
}
