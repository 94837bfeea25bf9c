//! Frame acquisition seam.

use std::time::Duration;

use thiserror::Error;

use super::frame_set::FrameSet;

/// Why a frame set could not be delivered.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Nothing arrived within the requested timeout.
    #[error("no frame set within {0:?}")]
    Timeout(Duration),

    /// The device or backing storage failed (disconnect, unreadable image, ...).
    #[error("acquisition device failure: {0}")]
    Device(String),

    /// A finite source (dataset playback) has no more frames.
    #[error("frame source exhausted")]
    Exhausted,
}

impl AcquisitionError {
    /// Transient failures are retried by the run loop and count toward the
    /// consecutive-failure threshold.
    pub fn is_transient(&self) -> bool {
        !matches!(self, AcquisitionError::Exhausted)
    }
}

/// Supplies synchronized multi-camera captures on demand.
///
/// Implementations may block, but never longer than `timeout`.
pub trait FrameSource {
    fn next_frame_set(&mut self, timeout: Duration) -> Result<FrameSet, AcquisitionError>;
}

impl<F: FrameSource + ?Sized> FrameSource for Box<F> {
    fn next_frame_set(&mut self, timeout: Duration) -> Result<FrameSet, AcquisitionError> {
        (**self).next_frame_set(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_is_not_transient() {
        assert!(AcquisitionError::Timeout(Duration::from_millis(5)).is_transient());
        assert!(AcquisitionError::Device("unplugged".into()).is_transient());
        assert!(!AcquisitionError::Exhausted.is_transient());
    }
}
