//! Lifecycle control of the map-maker thread.
//!
//! Other threads post requests (pause, pause-and-clear, resume, stop) under a
//! mutex; the worker honors them at its checkpoints and acknowledges through a
//! condition variable. A pause request returns only once the worker has
//! parked, or after the caller's timeout.
//!
//! Checkpoints happen between keyframe insertions, between refinement
//! iterations (through [`MapperControl::interrupt_requested`]) and after each
//! idle wait.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("map maker is not running")]
    NotRunning,

    #[error("map maker did not acknowledge pause within {0:?}")]
    AckTimeout(Duration),

    #[error("map maker failed to clear its map: {0}")]
    ClearFailed(String),
}

/// Acknowledgment of a pause request: the worker is parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseAck {
    /// The worker cleared its map before parking.
    pub cleared: bool,
}

/// What the worker should do after a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Stop,
}

#[derive(Debug)]
struct ControlState {
    running: bool,
    stop_requested: bool,
    pause_requested: bool,
    clear_requested: bool,
    paused: bool,
    /// Pause requests issued / acknowledged. Each requester waits for its own number.
    pause_seq: u64,
    acked_seq: u64,
    /// Result of the clear performed for `acked_seq`, if one was requested.
    clear_result: Result<(), String>,
}

pub struct MapperControl {
    state: Mutex<ControlState>,
    cond: Condvar,
}

impl MapperControl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ControlState {
                running: false,
                stop_requested: false,
                pause_requested: false,
                clear_requested: false,
                paused: false,
                pause_seq: 0,
                acked_seq: 0,
                clear_result: Ok(()),
            }),
            cond: Condvar::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Park the worker at its next checkpoint.
    pub fn pause(&self, timeout: Duration) -> Result<PauseAck, MapperError> {
        self.request_pause(false, timeout)
    }

    /// Park the worker after it has cleared its map and drained its queue.
    pub fn pause_and_clear(&self, timeout: Duration) -> Result<PauseAck, MapperError> {
        self.request_pause(true, timeout)
    }

    fn request_pause(&self, clear: bool, timeout: Duration) -> Result<PauseAck, MapperError> {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock();
        if !st.running {
            return Err(MapperError::NotRunning);
        }

        st.pause_seq += 1;
        let seq = st.pause_seq;
        st.pause_requested = true;
        st.clear_requested |= clear;
        self.cond.notify_all();

        while st.acked_seq < seq {
            if !st.running {
                return Err(MapperError::NotRunning);
            }
            if self.cond.wait_until(&mut st, deadline).timed_out() && st.acked_seq < seq {
                // Withdraw the request so the worker does not park later on.
                st.pause_requested = false;
                st.clear_requested = false;
                self.cond.notify_all();
                return Err(MapperError::AckTimeout(timeout));
            }
        }

        if clear {
            st.clear_result
                .clone()
                .map(|()| PauseAck { cleared: true })
                .map_err(MapperError::ClearFailed)
        } else {
            Ok(PauseAck { cleared: false })
        }
    }

    /// Release a paused worker. No-op if it is not paused.
    pub fn resume(&self) {
        let mut st = self.state.lock();
        st.pause_requested = false;
        self.cond.notify_all();
    }

    /// Ask the worker to exit at its next checkpoint.
    pub fn request_stop(&self) {
        let mut st = self.state.lock();
        st.stop_requested = true;
        self.cond.notify_all();
    }

    /// Cheap check for refinement loops: should the worker reach a checkpoint?
    pub fn interrupt_requested(&self) -> bool {
        let st = self.state.lock();
        st.stop_requested || (st.pause_requested && st.acked_seq < st.pause_seq)
    }

    /// Worker side: honor pending requests.
    ///
    /// Blocks while paused. `on_clear` runs on the worker thread, without the
    /// control lock held, when a pause-and-clear request is pending.
    pub fn checkpoint<F>(&self, mut on_clear: F) -> Checkpoint
    where
        F: FnMut() -> Result<(), String>,
    {
        let mut st = self.state.lock();
        loop {
            if st.stop_requested {
                st.paused = false;
                return Checkpoint::Stop;
            }

            if !st.pause_requested {
                if st.paused {
                    st.paused = false;
                    debug!("Map maker resumed");
                }
                return Checkpoint::Continue;
            }

            if st.acked_seq < st.pause_seq {
                let target = st.pause_seq;
                let result = if st.clear_requested {
                    st.clear_requested = false;
                    MutexGuard::unlocked(&mut st, &mut on_clear)
                } else {
                    Ok(())
                };
                st.clear_result = result;
                st.acked_seq = target;
                st.paused = true;
                debug!("Map maker paused (request {})", target);
                self.cond.notify_all();
                continue;
            }

            self.cond.wait(&mut st);
        }
    }

    pub(crate) fn mark_running(&self) {
        let mut st = self.state.lock();
        st.running = true;
        st.stop_requested = false;
    }

    pub(crate) fn mark_stopped(&self) {
        let mut st = self.state.lock();
        st.running = false;
        st.paused = false;
        self.cond.notify_all();
    }
}

impl Default for MapperControl {
    fn default() -> Self {
        Self::new()
    }
}
