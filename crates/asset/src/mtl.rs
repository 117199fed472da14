//! MTL material library parser plus diffuse texture preloading.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};

use crate::texture::TextureData;

/// Phong-style material as described by an MTL `newmtl` block.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub emissive: [f32; 3],
    pub shininess: f32,
    /// 1.0 = opaque.
    pub opacity: f32,
    pub illum: u32,
    /// `map_Kd` path as written in the file.
    pub diffuse_map: Option<String>,
    /// Filled by [`MaterialLibrary::preload`].
    pub diffuse_texture: Option<Arc<TextureData>>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient: [1.0, 1.0, 1.0],
            diffuse: [0.8, 0.8, 0.8],
            specular: [0.0, 0.0, 0.0],
            emissive: [0.0, 0.0, 0.0],
            shininess: 30.0,
            opacity: 1.0,
            illum: 2,
            diffuse_map: None,
            diffuse_texture: None,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.opacity < 1.0
    }
}

/// Materials keyed by name, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialLibrary {
    materials: Vec<Material>,
    by_name: HashMap<String, usize>,
}

impl MaterialLibrary {
    pub fn get(&self, name: &str) -> Option<&Material> {
        self.by_name.get(name).map(|&i| &self.materials[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Adds or replaces a material by name.
    pub fn insert(&mut self, material: Material) {
        match self.by_name.get(&material.name).copied() {
            Some(i) => {
                log::warn!("Material '{}' redefined; keeping the last one", material.name);
                self.materials[i] = material;
            }
            None => {
                self.by_name
                    .insert(material.name.clone(), self.materials.len());
                self.materials.push(material);
            }
        }
    }

    /// Loads every `map_Kd` texture, resolving paths against `base_dir`.
    /// Textures shared by several materials are read once.
    pub fn preload(&mut self, base_dir: &Path) -> Result<()> {
        let mut loaded: HashMap<String, Arc<TextureData>> = HashMap::new();
        for material in &mut self.materials {
            let Some(map) = material.diffuse_map.as_ref() else {
                continue;
            };
            let texture = match loaded.get(map) {
                Some(texture) => Arc::clone(texture),
                None => {
                    let texture = Arc::new(
                        TextureData::load(base_dir.join(map)).with_context(|| {
                            format!("Failed to preload map_Kd of material '{}'", material.name)
                        })?,
                    );
                    loaded.insert(map.clone(), Arc::clone(&texture));
                    texture
                }
            };
            material.diffuse_texture = Some(texture);
        }
        log::debug!(
            "Preloaded {} texture(s) for {} material(s)",
            loaded.len(),
            self.materials.len()
        );
        Ok(())
    }
}

/// Load an MTL file from a path.
pub fn load_mtl_from_path(path: impl AsRef<Path>) -> Result<MaterialLibrary> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open MTL file: {}", path.as_ref().display()))?;
    parse_mtl(BufReader::new(file))
        .with_context(|| format!("Failed to parse MTL file: {}", path.as_ref().display()))
}

/// Convenience helper to parse an MTL string literal.
pub fn load_mtl_from_str(contents: &str) -> Result<MaterialLibrary> {
    parse_mtl(io::Cursor::new(contents))
}

fn parse_mtl<R: BufRead>(reader: R) -> Result<MaterialLibrary> {
    let mut library = MaterialLibrary::default();
    let mut current: Option<Material> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };

        if tag == "newmtl" {
            let name = trimmed[tag.len()..].trim();
            if name.is_empty() {
                anyhow::bail!("newmtl without a name on line {}", line_no + 1);
            }
            if let Some(done) = current.replace(Material::new(name)) {
                library.insert(done);
            }
            continue;
        }

        let material = current
            .as_mut()
            .ok_or_else(|| anyhow!("'{}' before any newmtl on line {}", tag, line_no + 1))?;

        match tag {
            "Ka" => material.ambient = parse_rgb(&mut parts, line_no)?,
            "Kd" => material.diffuse = parse_rgb(&mut parts, line_no)?,
            "Ks" => material.specular = parse_rgb(&mut parts, line_no)?,
            "Ke" => material.emissive = parse_rgb(&mut parts, line_no)?,
            "Ns" => material.shininess = parse_f32(parts.next(), line_no, "Ns")?,
            "d" => material.opacity = parse_f32(parts.next(), line_no, "d")?.clamp(0.0, 1.0),
            "Tr" => {
                material.opacity = (1.0 - parse_f32(parts.next(), line_no, "Tr")?).clamp(0.0, 1.0)
            }
            "illum" => {
                let token = parts
                    .next()
                    .ok_or_else(|| anyhow!("Missing illum on line {}", line_no + 1))?;
                material.illum = token
                    .parse()
                    .with_context(|| format!("Failed to parse illum on line {}", line_no + 1))?;
            }
            "map_Kd" => {
                // Options like `-s 1 1 1` precede the file name; the name is last.
                let file = parts
                    .last()
                    .ok_or_else(|| anyhow!("map_Kd without a file on line {}", line_no + 1))?;
                material.diffuse_map = Some(file.replace('\\', "/"));
            }
            _ => {}
        }
    }

    if let Some(done) = current {
        library.insert(done);
    }
    Ok(library)
}

fn parse_rgb<'a>(parts: &mut impl Iterator<Item = &'a str>, line_no: usize) -> Result<[f32; 3]> {
    let r = parse_f32(parts.next(), line_no, "red component")?;
    // A single value means grey.
    let g = match parts.next() {
        Some(token) => parse_f32(Some(token), line_no, "green component")?,
        None => return Ok([r, r, r]),
    };
    let b = parse_f32(parts.next(), line_no, "blue component")?;
    Ok([r, g, b])
}

fn parse_f32(value: Option<&str>, line_no: usize, what: &str) -> Result<f32> {
    let token = value.ok_or_else(|| anyhow!("Missing {} on line {}", what, line_no + 1))?;
    token
        .parse::<f32>()
        .with_context(|| format!("Failed to parse {} on line {}", what, line_no + 1))
}
