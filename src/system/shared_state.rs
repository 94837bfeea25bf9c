//! Shared state between the run-loop thread and the map-maker thread.
//!
//! The live map is never shared. The map maker publishes immutable, versioned
//! [`MapSnapshot`]s here; everyone else reads the latest one by cloning an
//! `Arc`. The remaining fields are small flags for flow control and health.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::local_mapping::{KeyFrameSummary, MapSnapshot};

/// Overall system status, surfaced in published diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SystemHealth {
    #[default]
    Nominal,
    /// A reset completed only partially; a manual reset is needed.
    Degraded { reason: String },
}

impl SystemHealth {
    pub fn is_nominal(&self) -> bool {
        matches!(self, SystemHealth::Nominal)
    }
}

impl fmt::Display for SystemHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemHealth::Nominal => f.write_str("nominal"),
            SystemHealth::Degraded { reason } => {
                write!(f, "degraded, needs manual reset ({})", reason)
            }
        }
    }
}

/// Shared state accessible by both the run loop and the map maker.
pub struct SharedState {
    /// Latest map snapshot. Written only by the map maker.
    map: RwLock<Arc<MapSnapshot>>,

    /// Flow control: when true, the tracker should not create new keyframes.
    /// Set by the map maker when the keyframe queue is too long.
    stop_keyframe_creation: AtomicBool,

    /// Signal to abort the current refinement iteration early when a new
    /// keyframe arrives. Set by the tracker side when sending a keyframe.
    abort_refinement: AtomicBool,

    health: RwLock<SystemHealth>,
}

impl SharedState {
    /// Create a new SharedState with an empty map (version 0).
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Latest published map snapshot.
    pub fn map_snapshot(&self) -> Arc<MapSnapshot> {
        Arc::clone(&self.map.read())
    }

    /// Publish a new snapshot; returns its version (previous + 1).
    pub fn publish_map(&self, keyframes: Vec<KeyFrameSummary>) -> u64 {
        let mut map = self.map.write();
        let version = map.version + 1;
        *map = Arc::new(MapSnapshot { version, keyframes });
        version
    }

    /// Check if keyframe creation should be stopped (flow control).
    pub fn should_stop_keyframe_creation(&self) -> bool {
        self.stop_keyframe_creation.load(Ordering::SeqCst)
    }

    pub fn set_stop_keyframe_creation(&self, value: bool) {
        self.stop_keyframe_creation.store(value, Ordering::SeqCst);
    }

    pub fn should_abort_refinement(&self) -> bool {
        self.abort_refinement.load(Ordering::SeqCst)
    }

    /// Signal that refinement should yield (new keyframe arriving).
    pub fn request_abort_refinement(&self) {
        self.abort_refinement.store(true, Ordering::SeqCst);
    }

    pub fn clear_abort_refinement(&self) {
        self.abort_refinement.store(false, Ordering::SeqCst);
    }

    pub fn health(&self) -> SystemHealth {
        self.health.read().clone()
    }

    pub fn set_health(&self, health: SystemHealth) {
        *self.health.write() = health;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            map: RwLock::new(Arc::new(MapSnapshot::empty())),
            stop_keyframe_creation: AtomicBool::new(false),
            abort_refinement: AtomicBool::new(false),
            health: RwLock::new(SystemHealth::Nominal),
        }
    }
}
