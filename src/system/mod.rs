//! System orchestration: run loop, commands, reset, publication.
//!
//! This module contains the top-level `TrackingSystem` that drives tracking on
//! the calling thread and coordinates with the map-maker thread, along with
//! shared state and inter-thread messaging types.

pub mod commands;
pub mod config;
pub mod messages;
pub mod publisher;
pub mod reset;
pub mod run_state;
pub mod shared_state;
#[cfg(test)]
pub(crate) mod test_support;
mod tracking_system;

pub use commands::{Command, CommandQueue, CommandSender};
pub use config::{ConfigError, SystemConfig};
pub use messages::{KeyFrameId, KeyFrameSender, NewKeyFrameMsg};
pub use publisher::{
    ChannelSink, Clock, LogSink, ManualClock, MonotonicClock, PoseMessage, Publication,
    PublicationSink, PublishSchedule, StatePublisher, SystemInfo,
};
pub use reset::{ResetCoordinator, ResetHandle, ResetOutcome, ResetRequest, ResetResponse};
pub use run_state::ShutdownToken;
pub use shared_state::{SharedState, SystemHealth};
pub use tracking_system::{RunSummary, StopReason, TrackingSystem};
