// Triangle meshes shared by the floor geometry builder, picking and the renderer.
//
// Pipeline:
//   Outline → extrude() → TriMesh (flat normals) → UV remap → TriMesh → GPU
//   Dimensions → box_mesh() → TriMesh with six material groups → GPU

use std::collections::HashMap;
use std::ops::Range;

use glam::{Mat4, Vec2, Vec3};

// ============================================================================
// GPU VERTEX
// ============================================================================

/// GPU-ready vertex with position, normal and texture coordinate.
///   @location(0) position: vec3<f32>
///   @location(1) normal:   vec3<f32>
///   @location(2) uv:       vec2<f32>
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal:   [f32; 3],
    pub uv:       [f32; 2],
}

impl GpuVertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal:   normal.to_array(),
            uv:       uv.to_array(),
        }
    }

    pub fn position(&self) -> Vec3 { Vec3::from_array(self.position) }
    pub fn normal(&self) -> Vec3 { Vec3::from_array(self.normal) }
    pub fn uv(&self) -> Vec2 { Vec2::from_array(self.uv) }

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GpuVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

// ============================================================================
// TRIANGLE MESH
// ============================================================================

/// A run of indices drawn with one material slot.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshGroup {
    pub indices:  Range<u32>,
    pub material: usize,
}

/// Indexed triangle list. Faces use CCW winding viewed from outside.
/// A mesh without explicit groups is drawn with material 0 throughout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    pub vertices: Vec<GpuVertex>,
    pub indices:  Vec<u32>,
    pub groups:   Vec<MeshGroup>,
}

impl TriMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a standalone triangle (no shared vertices). Normals are filled in
    /// by `compute_vertex_normals`.
    pub fn push_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3) {
        let base = self.vertices.len() as u32;
        for p in [a, b, c] {
            self.vertices.push(GpuVertex::new(p, Vec3::ZERO, Vec2::ZERO));
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    pub fn triangle_count(&self) -> usize { self.indices.len() / 3 }

    /// Iterate triangles as position triples.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                self.vertices[tri[0] as usize].position(),
                self.vertices[tri[1] as usize].position(),
                self.vertices[tri[2] as usize].position(),
            ]
        })
    }

    /// Material groups, or a single implicit group covering every index.
    pub fn draw_groups(&self) -> Vec<MeshGroup> {
        if self.groups.is_empty() {
            vec![MeshGroup { indices: 0..self.indices.len() as u32, material: 0 }]
        } else {
            self.groups.clone()
        }
    }

    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        self.vertices.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), v| (min.min(v.position()), max.max(v.position())),
        )
    }

    /// Apply an affine transform to positions and normals.
    pub fn transform(&mut self, m: Mat4) {
        for v in &mut self.vertices {
            v.position = m.transform_point3(v.position()).to_array();
            v.normal = m.transform_vector3(v.normal()).normalize_or_zero().to_array();
        }
    }

    /// Translate so the bounding box is centered on the origin.
    pub fn center(&mut self) {
        let (min, max) = self.bounding_box();
        let offset = -(min + max) * 0.5;
        self.transform(Mat4::from_translation(offset));
    }

    /// Recompute per-vertex normals from the triangles.
    ///
    /// Area-weighted accumulation: the unnormalized cross product carries
    /// 2×area. Vertices that belong to a single triangle (non-indexed meshes)
    /// end up with that triangle's flat normal.
    pub fn compute_vertex_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let a = self.vertices[tri[0] as usize].position();
            let b = self.vertices[tri[1] as usize].position();
            let c = self.vertices[tri[2] as usize].position();
            let weighted = (b - a).cross(c - a);
            for &i in tri {
                accum[i as usize] += weighted;
            }
        }

        for (v, n) in self.vertices.iter_mut().zip(accum) {
            v.normal = n.normalize_or_zero().to_array();
        }
    }

    /// Cast vertex slice to raw bytes for wgpu buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Cast index slice to raw bytes for wgpu buffer upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn index_count(&self) -> usize { self.indices.len() }
}

// ============================================================================
// FEATURE EDGES
// ============================================================================

/// Snap positions so coincident vertices from different triangles hash equal.
fn vertex_key(p: Vec3) -> (i64, i64, i64) {
    const PRECISION: f32 = 1e4;
    (
        (p.x * PRECISION).round() as i64,
        (p.y * PRECISION).round() as i64,
        (p.z * PRECISION).round() as i64,
    )
}

type EdgeKey = ((i64, i64, i64), (i64, i64, i64));

/// Line segments along the mesh's hard edges.
///
/// An edge shared by two triangles is kept when their normals differ by more
/// than `threshold_deg`. Edges used by only one triangle (open boundaries)
/// are always kept.
pub fn feature_edges(mesh: &TriMesh, threshold_deg: f32) -> Vec<[Vec3; 2]> {
    let threshold_dot = threshold_deg.to_radians().cos();
    let mut open: HashMap<EdgeKey, ([Vec3; 2], Vec3)> = HashMap::new();
    let mut lines = Vec::new();

    for tri in mesh.triangles() {
        let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
        if normal.length_squared() <= f32::EPSILON {
            continue;
        }
        let normal = normal.normalize();

        for i in 0..3 {
            let a = tri[i];
            let b = tri[(i + 1) % 3];
            let (ka, kb) = (vertex_key(a), vertex_key(b));
            if ka == kb {
                continue;
            }

            // The neighbouring triangle walks the shared edge the other way.
            if let Some((segment, other_normal)) = open.remove(&(kb, ka)) {
                if normal.dot(other_normal) <= threshold_dot {
                    lines.push(segment);
                }
            } else {
                open.entry((ka, kb)).or_insert(([a, b], normal));
            }
        }
    }

    // Iteration order of the map is unstable; sort the leftovers for determinism.
    let mut boundary: Vec<(EdgeKey, [Vec3; 2])> =
        open.into_iter().map(|(k, (segment, _))| (k, segment)).collect();
    boundary.sort_by_key(|(k, _)| *k);
    lines.extend(boundary.into_iter().map(|(_, segment)| segment));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> TriMesh {
        let mut mesh = TriMesh::new();
        let (a, b, c, d) = (Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y);
        mesh.push_triangle(a, b, c);
        mesh.push_triangle(a, c, d);
        mesh.compute_vertex_normals();
        mesh
    }

    #[test]
    fn flat_normals_point_out_of_ccw_face() {
        for v in &quad().vertices {
            assert_relative_eq!(v.normal()[2], 1.0);
        }
    }

    #[test]
    fn center_moves_bbox_to_origin() {
        let mut mesh = quad();
        mesh.transform(Mat4::from_translation(Vec3::new(5.0, -2.0, 3.0)));
        mesh.center();
        let (min, max) = mesh.bounding_box();
        assert_relative_eq!((min + max).length(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn coplanar_diagonal_is_not_a_feature_edge() {
        // Four boundary edges survive, the shared diagonal does not.
        assert_eq!(feature_edges(&quad(), 15.0).len(), 4);
    }

    #[test]
    fn folded_edge_is_a_feature_edge() {
        let mut mesh = TriMesh::new();
        mesh.push_triangle(Vec3::ZERO, Vec3::X, Vec3::Y);
        mesh.push_triangle(Vec3::X, Vec3::ZERO, Vec3::new(0.5, 0.0, -1.0));
        // two open triangles: 4 boundary edges + the 90° fold
        assert_eq!(feature_edges(&mesh, 15.0).len(), 5);
    }

    #[test]
    fn implicit_group_covers_all_indices() {
        let groups = quad().draw_groups();
        assert_eq!(groups, vec![MeshGroup { indices: 0..6, material: 0 }]);
    }
}
