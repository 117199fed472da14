//! Two-stage model loading: `<stem>.mtl` first, then `<stem>.obj` with
//! those materials bound to its `usemtl` groups.

use std::{
    ffi::OsString,
    ops::Range,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use corelib::{Vec3, transform::Transform};

use crate::{
    mesh::MeshData,
    mtl::{Material, MaterialLibrary, load_mtl_from_path},
    obj::load_obj_from_path,
};

/// Name given to the material used when a group names none or an unknown one.
pub const DEFAULT_MATERIAL: &str = "default";

/// Material of the stand-in cube shown while models load.
pub const PLACEHOLDER_MATERIAL: &str = "placeholder";

/// One drawable range of a model with its resolved material.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelPart {
    pub material: Material,
    pub indices: Range<u32>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

/// A loaded, material-bound model ready to hand to a renderer.
#[derive(Clone, Debug)]
pub struct Model {
    pub name: String,
    pub mesh: MeshData,
    pub parts: Vec<ModelPart>,
    pub materials: MaterialLibrary,
    pub transform: Transform,
}

impl Model {
    /// Unit cube with a half-transparent material, drawn in place of models
    /// that are still loading.
    pub fn placeholder() -> Self {
        let mesh = MeshData::cube(1.0);
        let mut material = Material::new(PLACEHOLDER_MATERIAL);
        material.opacity = 0.5;

        let mut materials = MaterialLibrary::default();
        materials.insert(material.clone());
        let parts = mesh
            .groups
            .iter()
            .map(|group| ModelPart {
                material: material.clone(),
                indices: group.indices.clone(),
                cast_shadow: false,
                receive_shadow: false,
            })
            .collect();

        Self {
            name: PLACEHOLDER_MATERIAL.to_string(),
            mesh,
            parts,
            materials,
            transform: Transform::identity(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.mesh.triangle_count()
    }

    /// World-space bounds after applying `transform`.
    pub fn world_bounds(&self) -> Option<(Vec3, Vec3)> {
        self.transform
            .bounds_of(self.mesh.vertices.iter().map(|v| Vec3::from(v.position)))
    }

    pub fn texture_count(&self) -> usize {
        self.materials
            .iter()
            .filter(|m| m.diffuse_texture.is_some())
            .count()
    }
}

/// Loads `<stem>.mtl` + `<stem>.obj` pairs.
#[derive(Clone, Debug)]
pub struct ModelLoader {
    pub scale: f32,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self {
            scale: 0.1,
            cast_shadows: true,
            receive_shadows: true,
        }
    }
}

impl ModelLoader {
    pub fn with_scale(scale: f32) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }

    /// Load the model whose files share `stem` (path without extension).
    pub fn load(&self, stem: &Path) -> Result<Model> {
        let mtl_path = with_suffix(stem, ".mtl");
        let obj_path = with_suffix(stem, ".obj");
        let base_dir = mtl_path.parent().unwrap_or_else(|| Path::new("."));

        let mut materials = load_mtl_from_path(&mtl_path)?;
        materials
            .preload(base_dir)
            .with_context(|| format!("Failed to preload materials of {}", mtl_path.display()))?;

        let obj = load_obj_from_path(&obj_path)?;
        for lib in &obj.material_libs {
            if base_dir.join(lib) != mtl_path {
                log::debug!(
                    "{} references {lib}; using {} instead",
                    obj_path.display(),
                    mtl_path.display()
                );
            }
        }

        let parts = self.bind_materials(&obj.mesh, &materials, stem);
        let name = stem
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| stem.display().to_string());

        log::info!(
            "Model '{}': {} vertices, {} triangles, {} material(s), {} part(s)",
            name,
            obj.mesh.vertices.len(),
            obj.mesh.triangle_count(),
            materials.len(),
            parts.len()
        );

        Ok(Model {
            name,
            mesh: obj.mesh,
            parts,
            materials,
            transform: Transform::from_scale(self.scale),
        })
    }

    fn bind_materials(
        &self,
        mesh: &MeshData,
        materials: &MaterialLibrary,
        stem: &Path,
    ) -> Vec<ModelPart> {
        mesh.groups
            .iter()
            .map(|group| {
                let material = match group.material.as_deref() {
                    Some(name) => materials.get(name).cloned().unwrap_or_else(|| {
                        log::warn!(
                            "{}: material '{}' not found, using default",
                            stem.display(),
                            name
                        );
                        Material::new(DEFAULT_MATERIAL)
                    }),
                    None => Material::new(DEFAULT_MATERIAL),
                };
                ModelPart {
                    material,
                    indices: group.indices.clone(),
                    cast_shadow: self.cast_shadows,
                    receive_shadow: self.receive_shadows,
                }
            })
            .collect()
    }
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(stem.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}
