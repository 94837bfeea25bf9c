//! Synchronized multi-camera captures.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use image::GrayImage;

/// Identifier of one camera in the rig (`cam0` is id 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CameraId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cam{}", self.0)
    }
}

/// One time-synchronized capture from every configured camera.
///
/// Images are reference counted and never mutated after capture, so cloning a
/// `FrameSet` (e.g. when the tracker hands it to the map maker as part of a
/// keyframe) does not copy pixel data.
#[derive(Debug, Clone)]
pub struct FrameSet {
    timestamp_ns: u64,
    images: BTreeMap<CameraId, Arc<GrayImage>>,
}

impl FrameSet {
    pub fn new(timestamp_ns: u64) -> Self {
        Self {
            timestamp_ns,
            images: BTreeMap::new(),
        }
    }

    /// Builder-style insertion used while assembling a capture.
    pub fn with_image(mut self, camera: CameraId, image: GrayImage) -> Self {
        self.images.insert(camera, Arc::new(image));
        self
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn image(&self, camera: CameraId) -> Option<&GrayImage> {
        self.images.get(&camera).map(|img| img.as_ref())
    }

    pub fn cameras(&self) -> impl Iterator<Item = CameraId> + '_ {
        self.images.keys().copied()
    }

    pub fn num_cameras(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_set_clone_shares_pixels() {
        let fs = FrameSet::new(42)
            .with_image(CameraId(1), GrayImage::new(4, 3))
            .with_image(CameraId(0), GrayImage::new(8, 6));

        let copy = fs.clone();
        assert_eq!(copy.timestamp_ns(), 42);
        assert_eq!(copy.cameras().collect::<Vec<_>>(), vec![CameraId(0), CameraId(1)]);
        assert!(Arc::ptr_eq(&fs.images[&CameraId(0)], &copy.images[&CameraId(0)]));
        assert_eq!(copy.image(CameraId(1)).map(|i| i.dimensions()), Some((4, 3)));
        assert!(copy.image(CameraId(2)).is_none());
    }

    #[test]
    fn test_camera_id_display() {
        assert_eq!(CameraId(3).to_string(), "cam3");
    }
}
