//! Asset loading/parsers: OBJ meshes, MTL materials, textures and the
//! combined OBJ+MTL model loader.

pub mod mesh;
pub mod model;
pub mod mtl;
pub mod obj;
pub mod texture;

pub use model::{Model, ModelLoader};
