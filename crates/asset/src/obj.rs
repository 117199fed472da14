//! OBJ parser: positions, normals, texture coordinates and material groups.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result, anyhow};

use crate::mesh::{MaterialGroup, MeshData, MeshVertex};

/// Parsed OBJ file: geometry plus the material libraries it references.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjData {
    pub mesh: MeshData,
    /// `mtllib` file names, relative to the OBJ file.
    pub material_libs: Vec<String>,
}

/// Load an OBJ file from a path.
pub fn load_obj_from_path(path: impl AsRef<Path>) -> Result<ObjData> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open OBJ file: {}", path.as_ref().display()))?;
    load_obj_from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse OBJ file: {}", path.as_ref().display()))
}

/// Load an OBJ file from a [`BufRead`] implementation.
pub fn load_obj_from_reader<R: BufRead>(reader: R) -> Result<ObjData> {
    parse_obj(reader)
}

/// Convenience helper to parse an OBJ string literal.
pub fn load_obj_from_str(contents: &str) -> Result<ObjData> {
    parse_obj(io::Cursor::new(contents))
}

/// Accumulates `usemtl` ranges over the index buffer.
struct GroupBuilder {
    groups: Vec<MaterialGroup>,
    current: Option<String>,
    start: u32,
}

impl GroupBuilder {
    fn new() -> Self {
        Self {
            groups: Vec::new(),
            current: None,
            start: 0,
        }
    }

    fn switch(&mut self, material: Option<String>, index_len: u32) {
        self.close(index_len);
        self.current = material;
        self.start = index_len;
    }

    fn close(&mut self, index_len: u32) {
        if index_len == self.start {
            return;
        }
        // Consecutive blocks with the same material merge into one range.
        if let Some(last) = self.groups.last_mut() {
            if last.material == self.current && last.indices.end == self.start {
                last.indices.end = index_len;
                return;
            }
        }
        self.groups.push(MaterialGroup {
            material: self.current.clone(),
            indices: self.start..index_len,
        });
    }

    fn finish(mut self, index_len: u32) -> Vec<MaterialGroup> {
        self.close(index_len);
        self.groups
    }
}

fn parse_obj<R: BufRead>(reader: R) -> Result<ObjData> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut texcoords: Vec<[f32; 2]> = Vec::new();

    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    struct Key(usize, Option<usize>, Option<usize>);

    let mut unique: HashMap<Key, u32> = HashMap::new();
    let mut vertices: Vec<MeshVertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut groups = GroupBuilder::new();
    let mut material_libs: Vec<String> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let tag = parts
            .next()
            .ok_or_else(|| anyhow!("Malformed OBJ line {}: '{}'", line_no + 1, trimmed))?;

        match tag {
            "v" => {
                let x = parse_f32(parts.next(), line_no, "x coordinate")?;
                let y = parse_f32(parts.next(), line_no, "y coordinate")?;
                let z = parse_f32(parts.next(), line_no, "z coordinate")?;
                positions.push([x, y, z]);
            }
            "vt" => {
                let u = parse_f32(parts.next(), line_no, "u coordinate")?;
                let v = parse_f32(parts.next(), line_no, "v coordinate")?;
                texcoords.push([u, v]);
            }
            "vn" => {
                let nx = parse_f32(parts.next(), line_no, "nx coordinate")?;
                let ny = parse_f32(parts.next(), line_no, "ny coordinate")?;
                let nz = parse_f32(parts.next(), line_no, "nz coordinate")?;
                normals.push([nx, ny, nz]);
            }
            "f" => {
                let mut face_indices: Vec<u32> = Vec::new();
                for part in parts {
                    let (vi, vti, vni) = parse_face_vertex(
                        part,
                        positions.len(),
                        texcoords.len(),
                        normals.len(),
                        line_no,
                    )?;
                    let key = Key(vi, vti, vni);
                    let index = match unique.get(&key) {
                        Some(&idx) => idx,
                        None => {
                            let position = positions[vi];
                            let uv = vti.map(|i| texcoords[i]).unwrap_or([0.0, 0.0]);
                            let normal = vni.map(|i| normals[i]).unwrap_or([0.0, 0.0, 1.0]);

                            let idx = u32::try_from(vertices.len())
                                .map_err(|_| anyhow!("Too many vertices in OBJ (>{})", u32::MAX))?;
                            vertices.push(MeshVertex::new(position, normal, uv));
                            unique.insert(key, idx);
                            idx
                        }
                    };
                    face_indices.push(index);
                }

                if face_indices.len() < 3 {
                    log::warn!("Skipping degenerate face on line {}", line_no + 1);
                    continue;
                }
                for tri in 1..(face_indices.len() - 1) {
                    indices.push(face_indices[0]);
                    indices.push(face_indices[tri]);
                    indices.push(face_indices[tri + 1]);
                }
            }
            "usemtl" => {
                let name = rest_of_line(trimmed, tag);
                let material = (!name.is_empty()).then(|| name.to_string());
                groups.switch(material, index_len(&indices)?);
            }
            "mtllib" => {
                let name = rest_of_line(trimmed, tag);
                if name.is_empty() {
                    anyhow::bail!("mtllib without a file name on line {}", line_no + 1);
                }
                material_libs.push(name.to_string());
            }
            _ => {
                // o/g/s and friends carry nothing we keep
            }
        }
    }

    if vertices.is_empty() || indices.is_empty() {
        anyhow::bail!("OBJ contained no triangles");
    }

    let groups = groups.finish(index_len(&indices)?);
    Ok(ObjData {
        mesh: MeshData {
            vertices,
            indices,
            groups,
        },
        material_libs,
    })
}

fn index_len(indices: &[u32]) -> Result<u32> {
    u32::try_from(indices.len()).map_err(|_| anyhow!("Too many indices in OBJ (>{})", u32::MAX))
}

/// Everything after the directive, so names with spaces survive.
fn rest_of_line<'a>(line: &'a str, tag: &str) -> &'a str {
    line[tag.len()..].trim()
}

fn parse_f32(value: Option<&str>, line_no: usize, what: &str) -> Result<f32> {
    let token = value.ok_or_else(|| anyhow!("Missing {} on line {}", what, line_no + 1))?;
    token
        .parse::<f32>()
        .with_context(|| format!("Failed to parse {} on line {}", what, line_no + 1))
}

fn parse_face_vertex(
    token: &str,
    pos_count: usize,
    tex_count: usize,
    norm_count: usize,
    line_no: usize,
) -> Result<(usize, Option<usize>, Option<usize>)> {
    let mut split = token.split('/');
    let pos = split
        .next()
        .ok_or_else(|| anyhow!("Malformed face element '{}' on line {}", token, line_no + 1))?;
    let pos_idx = resolve_index(pos, pos_count, line_no)?;

    let tex_idx = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(value, tex_count, line_no)?),
        _ => None,
    };

    let norm_idx = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(value, norm_count, line_no)?),
        _ => None,
    };

    Ok((pos_idx, tex_idx, norm_idx))
}

fn resolve_index(token: &str, len: usize, line_no: usize) -> Result<usize> {
    let raw = token
        .parse::<i64>()
        .with_context(|| format!("Invalid index '{}' on line {}", token, line_no + 1))?;
    if raw == 0 {
        anyhow::bail!("OBJ indices are 1-based; found 0 on line {}", line_no + 1);
    }

    let idx = if raw > 0 { raw - 1 } else { len as i64 + raw };

    if idx < 0 || idx as usize >= len {
        anyhow::bail!(
            "OBJ index {} resolved out of bounds (len={}) on line {}",
            raw,
            len,
            line_no + 1
        );
    }

    Ok(idx as usize)
}
