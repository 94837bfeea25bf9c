//! Rigid-body transform used for tracker and keyframe poses.

use nalgebra::{UnitQuaternion, Vector3};

/// Rigid transform T = [R | t]. Poses are stored as T_wc (camera to world).
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn from_parts(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build from a w-first quaternion (normalized here) and a position.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        let rotation =
            UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self {
            rotation,
            translation,
        }
    }

    /// Composition `self * other`.
    pub fn compose(&self, other: &SE3) -> SE3 {
        SE3 {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn inverse(&self) -> SE3 {
        let rotation = self.rotation.inverse();
        SE3 {
            translation: -(rotation * self.translation),
            rotation,
        }
    }

    /// Translation distance and rotation angle (radians) of the relative
    /// motion `self^-1 * other`.
    pub fn distance_to(&self, other: &SE3) -> (f64, f64) {
        let relative = self.inverse().compose(other);
        (relative.translation.norm(), relative.rotation.angle())
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}
