//! EuRoC-style dataset playback as a [`FrameSource`].
//!
//! Layout (any number of cameras, `cam0` required):
//!
//! ```text
//! <root>/cam0/data.csv                          timestamp_ns,filename
//! <root>/cam0/data/<filename>
//! <root>/cam1/...
//! <root>/state_groundtruth_estimate0/data.csv   optional
//! ```

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::geometry::SE3;

use super::frame_set::{CameraId, FrameSet};
use super::frame_source::{AcquisitionError, FrameSource};

const GROUNDTRUTH_CSV: &str = "state_groundtruth_estimate0/data.csv";

#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub timestamp_ns: u64,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct GroundTruthEntry {
    pub timestamp_ns: u64,
    pub pose: SE3, // position + orientation
}

#[derive(Debug)]
struct CameraStream {
    id: CameraId,
    entries: Vec<ImageEntry>,
}

#[derive(Debug)]
pub struct EurocDataset {
    dataset_path: PathBuf,
    cameras: Vec<CameraStream>,
    pub groundtruth: Vec<GroundTruthEntry>,
}

impl EurocDataset {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        let mut cameras = Vec::new();
        for idx in 0u32.. {
            let csv_path = root.join(format!("cam{}/data.csv", idx));
            if !csv_path.exists() {
                break;
            }
            cameras.push(CameraStream {
                id: CameraId(idx),
                entries: load_image_list(csv_path)?,
            });
        }

        let Some(first) = cameras.first() else {
            bail!("no cam0/data.csv under {}", root.display());
        };
        let n_frames = first.entries.len();
        if let Some(cam) = cameras.iter().find(|c| c.entries.len() != n_frames) {
            bail!(
                "{} has {} frames but cam0 has {}",
                cam.id,
                cam.entries.len(),
                n_frames
            );
        }

        // Ground truth is optional - some datasets might not have it
        let groundtruth = if root.join(GROUNDTRUTH_CSV).exists() {
            load_groundtruth_list(root.join(GROUNDTRUTH_CSV)).unwrap_or_else(|e| {
                warn!("Could not load ground truth: {}. Continuing without it.", e);
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(Self {
            dataset_path: root,
            cameras,
            groundtruth,
        })
    }

    pub fn len(&self) -> usize {
        self.cameras.first().map_or(0, |c| c.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    pub fn frame_timestamp(&self, idx: usize) -> Option<u64> {
        self.cameras
            .first()
            .and_then(|c| c.entries.get(idx))
            .map(|e| e.timestamp_ns)
    }

    /// Load every camera's image for frame `idx`. The capture is stamped with
    /// cam0's timestamp; the other cameras are expected to be synchronized.
    pub fn frame_set(&self, idx: usize) -> Result<FrameSet> {
        let timestamp_ns = self
            .frame_timestamp(idx)
            .with_context(|| format!("No frame at index {}", idx))?;

        let mut frame_set = FrameSet::new(timestamp_ns);
        for cam in &self.cameras {
            let entry = cam
                .entries
                .get(idx)
                .with_context(|| format!("No {} frame at index {}", cam.id, idx))?;
            let path = self
                .dataset_path
                .join(format!("cam{}/data", cam.id.0))
                .join(&entry.filename);
            let image = image::open(&path)
                .with_context(|| format!("Failed to read image {:?}", path))?
                .to_luma8();
            frame_set = frame_set.with_image(cam.id, image);
        }
        Ok(frame_set)
    }
}

/// Plays an [`EurocDataset`] back one frame set per call.
///
/// With `realtime` enabled, frames are released no faster than their recorded
/// timestamps; a wait longer than the caller's timeout is reported as
/// [`AcquisitionError::Timeout`] and the same frame is offered again next call.
pub struct DatasetFrameSource {
    dataset: EurocDataset,
    next_index: usize,
    realtime: bool,
    /// Wall-clock instant and dataset timestamp of the previously released frame.
    last_release: Option<(Instant, u64)>,
}

impl DatasetFrameSource {
    pub fn new(dataset: EurocDataset, realtime: bool) -> Self {
        Self {
            dataset,
            next_index: 0,
            realtime,
            last_release: None,
        }
    }

    pub fn dataset(&self) -> &EurocDataset {
        &self.dataset
    }

    pub fn position(&self) -> usize {
        self.next_index
    }
}

impl FrameSource for DatasetFrameSource {
    fn next_frame_set(&mut self, timeout: Duration) -> Result<FrameSet, AcquisitionError> {
        let Some(timestamp_ns) = self.dataset.frame_timestamp(self.next_index) else {
            return Err(AcquisitionError::Exhausted);
        };

        if self.realtime {
            if let Some((released_at, released_ts)) = self.last_release {
                let due = released_at
                    + Duration::from_nanos(timestamp_ns.saturating_sub(released_ts));
                let wait = due.saturating_duration_since(Instant::now());
                if wait > timeout {
                    thread::sleep(timeout);
                    return Err(AcquisitionError::Timeout(timeout));
                }
                thread::sleep(wait);
            }
        }

        let frame_set = self
            .dataset
            .frame_set(self.next_index)
            .map_err(|e| AcquisitionError::Device(format!("{:#}", e)))?;

        debug!(
            "Released frame {} (ts={}, {} cameras)",
            self.next_index,
            timestamp_ns,
            frame_set.num_cameras()
        );
        self.next_index += 1;
        self.last_release = Some((Instant::now(), timestamp_ns));
        Ok(frame_set)
    }
}

fn load_image_list(csv_path: PathBuf) -> Result<Vec<ImageEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(&csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 2 {
            continue;
        }
        let ts: u64 = rec[0].trim().parse()?;
        let filename = rec[1].trim().to_string();
        entries.push(ImageEntry {
            timestamp_ns: ts,
            filename,
        });
    }
    Ok(entries)
}

fn load_groundtruth_list(csv_path: PathBuf) -> Result<Vec<GroundTruthEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(&csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        // CSV format: timestamp, p_RS_R_x, p_RS_R_y, p_RS_R_z, q_RS_w, q_RS_x, q_RS_y, q_RS_z,
        //             [v_RS_R_x, v_RS_R_y, v_RS_R_z, biases...]
        if rec.len() < 8 {
            continue;
        }
        let ts: u64 = rec[0].trim().parse()?;

        let position = Vector3::new(
            rec[1].trim().parse()?,
            rec[2].trim().parse()?,
            rec[3].trim().parse()?,
        );

        // w-first quaternion
        let qw: f64 = rec[4].trim().parse()?;
        let qx: f64 = rec[5].trim().parse()?;
        let qy: f64 = rec[6].trim().parse()?;
        let qz: f64 = rec[7].trim().parse()?;
        let pose = SE3::from_quaternion(qw, qx, qy, qz, position);

        entries.push(GroundTruthEntry {
            timestamp_ns: ts,
            pose,
        });
    }
    Ok(entries)
}
