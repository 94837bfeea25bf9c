//! Map snapshot export.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::local_mapping::{KeyFrameSummary, MapSnapshot};

#[derive(Debug, Serialize)]
struct KeyFrameRow {
    id: u64,
    timestamp_ns: u64,
    tx: f64,
    ty: f64,
    tz: f64,
    qw: f64,
    qx: f64,
    qy: f64,
    qz: f64,
    num_cameras: usize,
}

impl From<&KeyFrameSummary> for KeyFrameRow {
    fn from(kf: &KeyFrameSummary) -> Self {
        let t = &kf.pose.translation;
        let q = kf.pose.rotation.quaternion();
        Self {
            id: kf.id.0,
            timestamp_ns: kf.timestamp_ns,
            tx: t.x,
            ty: t.y,
            tz: t.z,
            qw: q.w,
            qx: q.i,
            qy: q.j,
            qz: q.k,
            num_cameras: kf.num_cameras,
        }
    }
}

/// Write one CSV row per keyframe (with a header). Returns the row count.
pub fn save_map_csv(snapshot: &MapSnapshot, path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for kf in &snapshot.keyframes {
        writer.serialize(KeyFrameRow::from(kf))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(snapshot.keyframes.len())
}
