//! CPU-side mesh representation used by loaders.

use std::ops::Range;

/// Vertex with position/normal/uv. Values are in object space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// A run of indices drawn with one material (`usemtl` block).
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialGroup {
    pub material: Option<String>,
    pub indices: Range<u32>,
}

impl MaterialGroup {
    pub fn triangle_count(&self) -> u32 {
        (self.indices.end - self.indices.start) / 3
    }
}

/// Indexed triangle mesh with tightly-packed vertices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    /// Index ranges per material, in file order. Empty ranges are dropped.
    pub groups: Vec<MaterialGroup>,
}

impl MeshData {
    /// Mesh with a single group spanning every index, or no group when
    /// there are no indices or too many to address with `u32`.
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        let groups = match u32::try_from(indices.len()) {
            Ok(0) => Vec::new(),
            Ok(end) => vec![MaterialGroup {
                material: None,
                indices: 0..end,
            }],
            Err(_) => {
                log::warn!("Mesh has more than {} indices; leaving it ungrouped", u32::MAX);
                Vec::new()
            }
        };
        Self {
            vertices,
            indices,
            groups,
        }
    }

    /// Returns `true` if both vertex and index buffers are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned cube of edge `size` centered at the origin, 24 vertices
    /// so every face keeps its own normal.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        // (normal, tangent u, tangent v) per face
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (n, u, v) in faces {
            let base = vertices.len() as u32;
            for (cu, cv) in corners {
                let position = [
                    (n[0] + u[0] * cu + v[0] * cv) * h,
                    (n[1] + u[1] * cu + v[1] * cv) * h,
                    (n[2] + u[2] * cu + v[2] * cv) * h,
                ];
                let uv = [(cu + 1.0) * 0.5, (1.0 - cv) * 0.5];
                vertices.push(MeshVertex::new(position, n, uv));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices)
    }
}
