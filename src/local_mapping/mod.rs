//! Map-maker thread.
//!
//! The map maker is responsible for:
//! - Inserting keyframes handed over by tracking into the map
//! - Running continuous, interruptible refinement of the map
//! - Publishing versioned snapshots after every map change
//! - Honoring pause / pause-and-clear / resume / stop requests at checkpoints

mod builder;
mod control;
mod keyframe_map;
mod local_mapper;
mod map_maker;
mod snapshot;

pub use builder::{MapBuilder, RefineOutcome};
pub use control::{Checkpoint, MapperControl, MapperError, PauseAck};
pub use keyframe_map::{KeyframeMap, KeyframeMapConfig};
pub use local_mapper::LocalMapper;
pub use map_maker::MapMaker;
pub use snapshot::{KeyFrameSummary, MapSnapshot};
