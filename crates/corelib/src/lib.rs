//! Core types shared by loaders and the viewer: math re-exports and Transform.

pub use glam::{EulerRot, Mat4, Quat, Vec3, vec3};

pub mod transform;
