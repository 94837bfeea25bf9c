//! Local Mapper - main loop of the map-maker thread.
//!
//! Per pass:
//! 1. Checkpoint: honor stop / pause / pause-and-clear requests
//! 2. Update flow control from the keyframe queue length
//! 3. Insert the next queued keyframe, if any
//! 4. Otherwise run one interruptible refinement pass
//! 5. When refinement is idle, wait briefly for a keyframe
//!
//! Every map change is followed by a snapshot publication; nothing else ever
//! sees the builder's live state.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use tracing::{debug, info, warn};

use crate::system::messages::NewKeyFrameMsg;
use crate::system::shared_state::SharedState;

use super::builder::{MapBuilder, RefineOutcome};
use super::control::{Checkpoint, MapperControl};

/// Counters for the map-maker thread.
#[derive(Debug, Default)]
struct MapperStats {
    keyframes_inserted: usize,
    keyframes_rejected: usize,
    refinements: usize,
    refinements_aborted: usize,
    clears: usize,
}

/// Map-maker thread state.
pub struct LocalMapper<B: MapBuilder> {
    builder: B,

    /// Flow control threshold: if the queue holds more than this many
    /// keyframes, signal tracking to stop creating new ones.
    high_water: usize,

    /// Idle wait for keyframes. Bounds checkpoint latency while idle.
    idle_wait: Duration,

    stats: MapperStats,
}

impl<B: MapBuilder> LocalMapper<B> {
    pub fn new(builder: B, high_water: usize, idle_wait: Duration) -> Self {
        Self {
            builder,
            high_water,
            idle_wait,
            stats: MapperStats::default(),
        }
    }

    /// Main thread loop: runs until stop is requested or the channel closes.
    pub fn run(
        &mut self,
        kf_receiver: Receiver<NewKeyFrameMsg>,
        shared: Arc<SharedState>,
        control: Arc<MapperControl>,
    ) {
        info!("Map maker thread started");

        loop {
            if control.checkpoint(|| self.clear_map(&kf_receiver, &shared)) == Checkpoint::Stop {
                break;
            }

            shared.set_stop_keyframe_creation(kf_receiver.len() > self.high_water);

            match kf_receiver.try_recv() {
                Ok(msg) => {
                    self.process_keyframe(msg, &shared);
                    continue;
                }
                Err(TryRecvError::Disconnected) => {
                    info!("Keyframe channel disconnected");
                    break;
                }
                Err(TryRecvError::Empty) => {
                    // The abort flag only means a keyframe is waiting.
                    shared.clear_abort_refinement();
                }
            }

            let should_stop = || shared.should_abort_refinement() || control.interrupt_requested();
            match self.builder.refine(&should_stop) {
                RefineOutcome::Refined => {
                    self.stats.refinements += 1;
                    shared.publish_map(self.builder.keyframes());
                }
                RefineOutcome::Aborted => {
                    self.stats.refinements_aborted += 1;
                }
                RefineOutcome::Idle => match kf_receiver.recv_timeout(self.idle_wait) {
                    Ok(msg) => self.process_keyframe(msg, &shared),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        info!("Keyframe channel disconnected");
                        break;
                    }
                },
            }
        }

        info!(
            "Map maker thread exiting. Stats: inserted={}, rejected={}, refinements={}, aborted={}, clears={}",
            self.stats.keyframes_inserted,
            self.stats.keyframes_rejected,
            self.stats.refinements,
            self.stats.refinements_aborted,
            self.stats.clears
        );
    }

    fn process_keyframe(&mut self, msg: NewKeyFrameMsg, shared: &SharedState) {
        // Starting fresh work; any pending abort was for this keyframe.
        shared.clear_abort_refinement();

        let kf_id = msg.keyframe_id;
        match self.builder.insert_keyframe(msg) {
            Ok(()) => {
                self.stats.keyframes_inserted += 1;
                let version = shared.publish_map(self.builder.keyframes());
                debug!("Inserted {} (map version {})", kf_id, version);
            }
            Err(e) => {
                self.stats.keyframes_rejected += 1;
                warn!("Map builder rejected {}: {:#}", kf_id, e);
            }
        }
    }

    /// Runs inside a pause-and-clear checkpoint.
    fn clear_map(
        &mut self,
        kf_receiver: &Receiver<NewKeyFrameMsg>,
        shared: &SharedState,
    ) -> Result<(), String> {
        // Keyframes queued before the reset belong to the old map.
        let drained = kf_receiver.try_iter().count();

        let result = self.builder.clear();
        self.stats.clears += 1;

        let version = shared.publish_map(self.builder.keyframes());
        shared.set_stop_keyframe_creation(false);
        shared.clear_abort_refinement();

        match result {
            Ok(()) => {
                info!(
                    "Map cleared (dropped {} queued keyframes, map version {})",
                    drained, version
                );
                Ok(())
            }
            Err(e) => Err(format!("{:#}", e)),
        }
    }
}
