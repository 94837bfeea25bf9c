//! Tracking quality and the tracker state snapshot.

use std::fmt;

use nalgebra::Matrix6;

use crate::geometry::SE3;

/// Discrete indicator of how reliable the current pose estimate is.
///
/// Ordered from worst to best so `quality >= TrackingQuality::Good` reads
/// naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TrackingQuality {
    /// No pose estimate yet (fresh start or just reset).
    #[default]
    NotInitialized,
    /// Tracking failed; the pose is stale.
    Lost,
    /// Tracking but with weak support.
    Poor,
    /// Tracking successfully.
    Good,
}

impl TrackingQuality {
    /// Whether consumers may rely on the pose without extra caution.
    pub fn is_confident(self) -> bool {
        self == TrackingQuality::Good
    }
}

impl fmt::Display for TrackingQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackingQuality::NotInitialized => "NOT_INITIALIZED",
            TrackingQuality::Lost => "LOST",
            TrackingQuality::Poor => "POOR",
            TrackingQuality::Good => "GOOD",
        };
        f.write_str(s)
    }
}

/// Read-only snapshot of the tracker's estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState {
    /// Camera pose T_wc.
    pub pose: SE3,
    /// Pose covariance, ordered (tx, ty, tz, rx, ry, rz).
    pub covariance: Matrix6<f64>,
    pub quality: TrackingQuality,
    /// Timestamp of the frame this estimate belongs to (0 before the first frame).
    pub timestamp_ns: u64,
}

impl TrackerState {
    pub fn initial() -> Self {
        Self {
            pose: SE3::identity(),
            covariance: Matrix6::identity(),
            quality: TrackingQuality::NotInitialized,
            timestamp_ns: 0,
        }
    }

    /// Same estimate, marked as lost. Used when processing a frame failed.
    pub fn degraded(mut self) -> Self {
        self.quality = TrackingQuality::Lost;
        self
    }
}

impl Default for TrackerState {
    fn default() -> Self {
        Self::initial()
    }
}
