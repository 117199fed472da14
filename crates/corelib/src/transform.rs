use crate::{EulerRot, Mat4, Quat, Vec3};

/// Placement of a loaded model: translation, Euler XYZ rotation, scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    /// Euler angles in radians (XYZ order).
    pub rotation_euler: Vec3,
    pub scale: Vec3,
}

impl Transform {
    #[inline]
    pub const fn identity() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation_euler: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }

    #[inline]
    pub fn from_trs(translation: Vec3, rotation_euler: Vec3, scale: Vec3) -> Self {
        Self {
            translation,
            rotation_euler,
            scale,
        }
    }

    #[inline]
    pub fn from_scale(scale: f32) -> Self {
        Self {
            scale: Vec3::splat(scale),
            ..Self::identity()
        }
    }

    /// Build matrix = T * R * S (column-major Mat4 per glam).
    #[inline]
    pub fn matrix(&self) -> Mat4 {
        let q = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation_euler.x,
            self.rotation_euler.y,
            self.rotation_euler.z,
        );
        Mat4::from_scale_rotation_translation(self.scale, q, self.translation)
    }

    /// World-space axis-aligned bounds of the given object-space points.
    /// `None` for an empty iterator.
    pub fn bounds_of(&self, points: impl IntoIterator<Item = Vec3>) -> Option<(Vec3, Vec3)> {
        let m = self.matrix();
        points.into_iter().fold(None, |acc, p| {
            let w = m.transform_point3(p);
            Some(match acc {
                None => (w, w),
                Some((lo, hi)) => (lo.min(w), hi.max(w)),
            })
        })
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}
