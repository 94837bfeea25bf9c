//! Frame acquisition and file output.

pub mod console;
pub mod euroc;
mod frame_set;
mod frame_source;
pub mod map_export;

pub use frame_set::{CameraId, FrameSet};
pub use frame_source::{AcquisitionError, FrameSource};
