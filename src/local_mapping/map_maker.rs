//! Handle on the map-maker thread: start, pause, resume, stop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use tracing::{info, warn};

use crate::system::messages::NewKeyFrameMsg;
use crate::system::shared_state::SharedState;

use super::builder::MapBuilder;
use super::control::{MapperControl, MapperError, PauseAck};
use super::local_mapper::LocalMapper;

/// Marks the control as stopped however the worker exits, panics included.
struct RunningGuard(Arc<MapperControl>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.mark_stopped();
    }
}

/// The map maker: a [`MapBuilder`] running on its own thread.
pub struct MapMaker {
    control: Arc<MapperControl>,
    handle: Option<JoinHandle<()>>,
}

impl MapMaker {
    /// Initialize `builder` on the calling thread, then spawn the worker.
    ///
    /// Initialization and spawn failures are returned; no thread is left behind.
    pub fn spawn<B: MapBuilder>(
        mut builder: B,
        kf_receiver: Receiver<NewKeyFrameMsg>,
        shared: Arc<SharedState>,
        high_water: usize,
        idle_wait: Duration,
    ) -> Result<Self> {
        builder
            .initialize()
            .context("map builder initialization failed")?;

        let control = Arc::new(MapperControl::new());
        control.mark_running();

        let worker_control = Arc::clone(&control);
        let spawned = thread::Builder::new()
            .name("map-maker".into())
            .spawn(move || {
                let _guard = RunningGuard(Arc::clone(&worker_control));
                let mut local_mapper = LocalMapper::new(builder, high_water, idle_wait);
                local_mapper.run(kf_receiver, shared, worker_control);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                control.mark_stopped();
                return Err(e).context("failed to spawn map maker thread");
            }
        };

        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Shared control, for components that coordinate with the worker.
    pub fn control(&self) -> Arc<MapperControl> {
        Arc::clone(&self.control)
    }

    pub fn pause(&self, timeout: Duration) -> Result<PauseAck, MapperError> {
        self.control.pause(timeout)
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn request_stop(&self) {
        self.control.request_stop();
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    /// Request stop and wait for the worker to exit.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.control.request_stop();
        if handle.join().is_err() {
            warn!("Map maker thread panicked");
        } else {
            info!("Map maker thread joined");
        }
    }
}

impl Drop for MapMaker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
