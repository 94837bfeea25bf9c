//! Keyframe map with redundancy culling as its background refinement.
//!
//! Newly inserted keyframes are queued as culling candidates. Each refinement
//! pass checks candidates one at a time, polling `should_stop` between them,
//! and removes a candidate whose pose is within both the translation and the
//! rotation threshold of another retained keyframe.
//!
//! Does NOT cull the root (oldest) keyframe.

use std::collections::{BTreeMap, VecDeque};

use anyhow::{Result, bail};
use tracing::debug;

use crate::system::messages::{KeyFrameId, NewKeyFrameMsg};

use super::builder::{MapBuilder, RefineOutcome};
use super::snapshot::KeyFrameSummary;

#[derive(Debug, Clone)]
pub struct KeyframeMapConfig {
    /// Keyframes closer than this (meters) to a retained one may be culled.
    pub min_translation_m: f64,
    /// ...and whose relative rotation is below this (degrees).
    pub min_rotation_deg: f64,
}

impl Default for KeyframeMapConfig {
    fn default() -> Self {
        Self {
            min_translation_m: 0.05,
            min_rotation_deg: 5.0,
        }
    }
}

pub struct KeyframeMap {
    config: KeyframeMapConfig,
    keyframes: BTreeMap<KeyFrameId, KeyFrameSummary>,
    /// Keyframes not yet checked for redundancy.
    pending: VecDeque<KeyFrameId>,
    num_culled: usize,
}

impl KeyframeMap {
    pub fn new(config: KeyframeMapConfig) -> Self {
        Self {
            config,
            keyframes: BTreeMap::new(),
            pending: VecDeque::new(),
            num_culled: 0,
        }
    }

    pub fn num_keyframes(&self) -> usize {
        self.keyframes.len()
    }

    pub fn num_culled(&self) -> usize {
        self.num_culled
    }

    fn is_redundant(&self, kf_id: KeyFrameId) -> bool {
        let Some(kf) = self.keyframes.get(&kf_id) else {
            return false;
        };
        // Root keyframe anchors the map.
        if self.keyframes.keys().next() == Some(&kf_id) {
            return false;
        }

        let max_rotation = self.config.min_rotation_deg.to_radians();
        self.keyframes
            .values()
            .filter(|other| other.id != kf_id)
            .any(|other| {
                let (dt, dr) = kf.pose.distance_to(&other.pose);
                dt < self.config.min_translation_m && dr < max_rotation
            })
    }
}

impl Default for KeyframeMap {
    fn default() -> Self {
        Self::new(KeyframeMapConfig::default())
    }
}

impl MapBuilder for KeyframeMap {
    fn insert_keyframe(&mut self, msg: NewKeyFrameMsg) -> Result<()> {
        if self.keyframes.contains_key(&msg.keyframe_id) {
            bail!("duplicate keyframe {}", msg.keyframe_id);
        }
        self.keyframes.insert(
            msg.keyframe_id,
            KeyFrameSummary {
                id: msg.keyframe_id,
                timestamp_ns: msg.timestamp_ns,
                pose: msg.pose,
                num_cameras: msg.frame_set.num_cameras(),
            },
        );
        self.pending.push_back(msg.keyframe_id);
        Ok(())
    }

    fn refine(&mut self, should_stop: &dyn Fn() -> bool) -> RefineOutcome {
        let mut changed = false;
        while let Some(&kf_id) = self.pending.front() {
            if should_stop() {
                return RefineOutcome::Aborted;
            }
            self.pending.pop_front();

            if self.is_redundant(kf_id) {
                self.keyframes.remove(&kf_id);
                self.num_culled += 1;
                changed = true;
                debug!(
                    "[KFCulling] Removed redundant {} (remaining: {})",
                    kf_id,
                    self.keyframes.len()
                );
            }
        }

        if changed {
            RefineOutcome::Refined
        } else {
            RefineOutcome::Idle
        }
    }

    fn clear(&mut self) -> Result<()> {
        self.keyframes.clear();
        self.pending.clear();
        Ok(())
    }

    fn keyframes(&self) -> Vec<KeyFrameSummary> {
        self.keyframes.values().cloned().collect()
    }
}
