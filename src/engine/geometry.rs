// Floor slab geometry.
//
// A floor is a width × height × depth slab. With no curved side it is drawn as
// a plain six-face box (`box_mesh`). With a curved side, one edge of the
// footprint rectangle is replaced by a cubic Bézier bulge, the outline is
// extruded by `height`, stood upright and centered, and every vertex gets a
// fresh UV chosen by the orientation of its face.
//
// Footprint plane: X = width axis, Y = depth axis. Extrusion runs along +Z,
// then a -90° rotation about X maps (x, y, z) → (x, z, -y) so the slab stands
// on the XZ ground plane with Y up.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::mesh::{GpuVertex, MeshGroup, TriMesh};

/// Bézier tessellation resolution.
pub const CURVE_SEGMENTS: usize = 20;
/// Control points sit this fraction of the straight edge in from each corner.
const CONTROL_INSET: f32 = 0.2;

pub const DEFAULT_CURVE_AMOUNT: f32 = 0.3;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("failed to triangulate floor outline: {0}")]
    Triangulation(String),
}

// ============================================================================
// INPUTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Dimensions {
    pub width:  f32,
    pub height: f32,
    pub depth:  f32,
}

impl Dimensions {
    pub const fn new(width: f32, height: f32, depth: f32) -> Self {
        Self { width, height, depth }
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.width, self.height, self.depth)
    }

    /// All three extents finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        [self.width, self.height, self.depth]
            .iter()
            .all(|d| d.is_finite() && *d > 0.0)
    }
}

impl From<[f32; 3]> for Dimensions {
    fn from([width, height, depth]: [f32; 3]) -> Self {
        Self { width, height, depth }
    }
}

impl From<Dimensions> for [f32; 3] {
    fn from(d: Dimensions) -> Self {
        [d.width, d.height, d.depth]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveSide {
    Front,
    Back,
    Left,
    Right,
    #[default]
    None,
}

impl CurveSide {
    pub const ALL: [CurveSide; 5] =
        [CurveSide::None, CurveSide::Front, CurveSide::Back, CurveSide::Left, CurveSide::Right];

    pub fn label(self) -> &'static str {
        match self {
            CurveSide::Front => "front",
            CurveSide::Back => "back",
            CurveSide::Left => "left",
            CurveSide::Right => "right",
            CurveSide::None => "none",
        }
    }
}

/// Which side bulges and by how much. 0 = flat, negative bulges inward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveSpec {
    pub side:   CurveSide,
    pub amount: f32,
}

impl Default for CurveSpec {
    fn default() -> Self {
        Self { side: CurveSide::None, amount: DEFAULT_CURVE_AMOUNT }
    }
}

// ============================================================================
// OUTLINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    Line(Vec2),
    Cubic { c1: Vec2, c2: Vec2, end: Vec2 },
}

/// Closed 2D path in the footprint plane. The last point joins back to `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub start:    Vec2,
    pub segments: Vec<PathSegment>,
}

impl Outline {
    fn new(start: Vec2) -> Self {
        Self { start, segments: Vec::new() }
    }

    fn line_to(&mut self, p: Vec2) -> &mut Self {
        self.segments.push(PathSegment::Line(p));
        self
    }

    fn cubic_to(&mut self, c1: Vec2, c2: Vec2, end: Vec2) -> &mut Self {
        self.segments.push(PathSegment::Cubic { c1, c2, end });
        self
    }

    /// Flatten to a polygon. Each cubic contributes `curve_segments` points.
    /// A trailing point equal to the start is dropped.
    pub fn points(&self, curve_segments: usize) -> Vec<Vec2> {
        let mut pts = vec![self.start];
        let mut cursor = self.start;

        for seg in &self.segments {
            match *seg {
                PathSegment::Line(p) => {
                    pts.push(p);
                    cursor = p;
                }
                PathSegment::Cubic { c1, c2, end } => {
                    for i in 1..=curve_segments {
                        let t = i as f32 / curve_segments as f32;
                        pts.push(cubic_bezier(cursor, c1, c2, end, t));
                    }
                    cursor = end;
                }
            }
        }

        if pts.len() > 1 && pts.last() == Some(&self.start) {
            pts.pop();
        }
        pts
    }
}

fn cubic_bezier(p0: Vec2, c1: Vec2, c2: Vec2, p3: Vec2, t: f32) -> Vec2 {
    let k = 1.0 - t;
    p0 * (k * k * k) + c1 * (3.0 * k * k * t) + c2 * (3.0 * k * t * t) + p3 * (t * t * t)
}

/// Footprint outline: three straight rectangle edges plus one Bézier edge on
/// the curved side. `None` for an uncurved floor.
pub fn build_outline(dims: Dimensions, curve: CurveSpec) -> Option<Outline> {
    let (w, d, a) = (dims.width, dims.depth, curve.amount);
    let (hw, hd) = (w / 2.0, d / 2.0);
    let v = Vec2::new;

    let outline = match curve.side {
        CurveSide::None => return None,
        CurveSide::Front => {
            let mut o = Outline::new(v(-hw, -hd));
            o.line_to(v(hw, -hd)).line_to(v(hw, hd)).cubic_to(
                v(hw - w * CONTROL_INSET, hd + d * a),
                v(-hw + w * CONTROL_INSET, hd + d * a),
                v(-hw, hd),
            );
            o
        }
        CurveSide::Back => {
            let mut o = Outline::new(v(-hw, hd));
            o.line_to(v(hw, hd)).line_to(v(hw, -hd)).cubic_to(
                v(hw - w * CONTROL_INSET, -hd - d * a),
                v(-hw + w * CONTROL_INSET, -hd - d * a),
                v(-hw, -hd),
            );
            o
        }
        CurveSide::Right => {
            let mut o = Outline::new(v(-hw, -hd));
            o.line_to(v(-hw, hd))
                .line_to(v(hw, hd))
                .cubic_to(
                    v(hw + w * a, hd - d * CONTROL_INSET),
                    v(hw + w * a, -hd + d * CONTROL_INSET),
                    v(hw, -hd),
                )
                .line_to(v(-hw, -hd));
            o
        }
        CurveSide::Left => {
            let mut o = Outline::new(v(hw, -hd));
            o.line_to(v(hw, hd))
                .line_to(v(-hw, hd))
                .cubic_to(
                    v(-hw - w * a, hd - d * CONTROL_INSET),
                    v(-hw - w * a, -hd + d * CONTROL_INSET),
                    v(-hw, -hd),
                )
                .line_to(v(hw, -hd));
            o
        }
    };

    Some(outline)
}

// ============================================================================
// EXTRUSION
// ============================================================================

fn signed_area(poly: &[Vec2]) -> f32 {
    let n = poly.len();
    (0..n).map(|i| poly[i].perp_dot(poly[(i + 1) % n])).sum::<f32>() * 0.5
}

/// Extrude a simple polygon along +Z by `depth`: bottom cap at z = 0, top cap
/// at z = depth, one quad per edge. Non-indexed, flat normals.
pub fn extrude(polygon: &[Vec2], depth: f32) -> Result<TriMesh, GeometryError> {
    let mut poly = polygon.to_vec();
    if signed_area(&poly) < 0.0 {
        poly.reverse();
    }

    let coords: Vec<f64> = poly.iter().flat_map(|p| [p.x as f64, p.y as f64]).collect();
    let tris = earcutr::earcut(&coords, &[], 2)
        .map_err(|e| GeometryError::Triangulation(format!("{e:?}")))?;
    if tris.is_empty() {
        return Err(GeometryError::Triangulation(format!(
            "no triangles for {}-point outline",
            poly.len()
        )));
    }

    let at = |p: Vec2, z: f32| Vec3::new(p.x, p.y, z);
    let mut mesh = TriMesh::new();

    for tri in tris.chunks_exact(3) {
        let (mut a, b, mut c) = (poly[tri[0]], poly[tri[1]], poly[tri[2]]);
        if (b - a).perp_dot(c - a) < 0.0 {
            std::mem::swap(&mut a, &mut c);
        }
        // bottom faces -Z, top faces +Z
        mesh.push_triangle(at(a, 0.0), at(c, 0.0), at(b, 0.0));
        mesh.push_triangle(at(a, depth), at(b, depth), at(c, depth));
    }

    let n = poly.len();
    for i in 0..n {
        let (p, q) = (poly[i], poly[(i + 1) % n]);
        mesh.push_triangle(at(p, 0.0), at(q, 0.0), at(q, depth));
        mesh.push_triangle(at(p, 0.0), at(q, depth), at(p, depth));
    }

    mesh.compute_vertex_normals();
    Ok(mesh)
}

// ============================================================================
// UV REMAPPING
// ============================================================================

/// Face orientation class used to pick a UV projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceClass {
    /// Normal mostly ±Y.
    TopBottom,
    /// Straight side facing ±X.
    AlongWidth,
    /// Straight side facing ±Z.
    AlongDepth,
    /// Bézier wall segment or any other slanted face.
    CurvedOrSlanted,
}

impl FaceClass {
    pub fn classify(normal: Vec3) -> Self {
        if normal.y.abs() > 0.9 {
            FaceClass::TopBottom
        } else if normal.x.abs() > 0.7 {
            FaceClass::AlongWidth
        } else if normal.z.abs() > 0.7 {
            FaceClass::AlongDepth
        } else {
            FaceClass::CurvedOrSlanted
        }
    }

    /// Texture coordinate for a vertex of this class. Side faces sample the
    /// vertical middle of the legend (V = 0.5) regardless of height.
    pub fn uv(self, p: Vec3, dims: Dimensions, side: CurveSide) -> Vec2 {
        let (hw, hd) = (dims.width / 2.0, dims.depth / 2.0);
        let along_x = (p.x + hw) / dims.width;
        let along_z = (p.z + hd) / dims.depth;

        let uv = match self {
            FaceClass::TopBottom => Vec2::new(along_x, along_z),
            FaceClass::AlongWidth => Vec2::new(along_z, 0.5),
            FaceClass::AlongDepth => Vec2::new(along_x, 0.5),
            FaceClass::CurvedOrSlanted => match side {
                CurveSide::Left | CurveSide::Right => Vec2::new(along_z, 0.5),
                _ => Vec2::new(along_x, 0.5),
            },
        };
        uv.clamp(Vec2::ZERO, Vec2::ONE)
    }
}

fn remap_uvs(mesh: &mut TriMesh, dims: Dimensions, side: CurveSide) {
    for v in &mut mesh.vertices {
        let class = FaceClass::classify(v.normal());
        v.uv = class.uv(v.position(), dims, side).to_array();
    }
}

// ============================================================================
// PUBLIC BUILDERS
// ============================================================================

/// Curved floor mesh, or `None` when the floor should be a plain box
/// (no curved side, or degenerate dimensions). Pure: equal inputs give equal
/// vertex data.
pub fn build_geometry(dims: Dimensions, curve: CurveSpec) -> Result<Option<TriMesh>, GeometryError> {
    if curve.side == CurveSide::None {
        return Ok(None);
    }
    if !dims.is_valid() || !curve.amount.is_finite() {
        log::warn!("degenerate floor {:?} / {:?}, falling back to a box", dims, curve);
        return Ok(None);
    }
    let Some(outline) = build_outline(dims, curve) else {
        return Ok(None);
    };

    let mut mesh = extrude(&outline.points(CURVE_SEGMENTS), dims.height)?;
    mesh.transform(Mat4::from_rotation_x(-FRAC_PI_2));
    mesh.center();

    remap_uvs(&mut mesh, dims, curve.side);
    mesh.compute_vertex_normals();

    log::debug!(
        "built {} floor: {} triangles",
        curve.side.label(),
        mesh.triangle_count()
    );
    Ok(Some(mesh))
}

/// Box face order: +X, -X, +Y, -Y, +Z, -Z. Face `i` uses material slot `i`.
pub const BOX_FACES: usize = 6;

/// Axis-aligned box centered on the origin with one material group per face.
pub fn box_mesh(dims: Dimensions) -> TriMesh {
    let (w, h, d) = (dims.width, dims.height, dims.depth);
    let mut mesh = TriMesh::new();

    //                  (u, v, w) axes  udir  vdir  plane w  plane h  offset
    box_face(&mut mesh, [2, 1, 0], -1.0, -1.0, d, h,  w, 0); // +X
    box_face(&mut mesh, [2, 1, 0],  1.0, -1.0, d, h, -w, 1); // -X
    box_face(&mut mesh, [0, 2, 1],  1.0,  1.0, w, d,  h, 2); // +Y
    box_face(&mut mesh, [0, 2, 1],  1.0, -1.0, w, d, -h, 3); // -Y
    box_face(&mut mesh, [0, 1, 2],  1.0, -1.0, w, h,  d, 4); // +Z
    box_face(&mut mesh, [0, 1, 2], -1.0, -1.0, w, h, -d, 5); // -Z

    mesh
}

/// One box face as a single quad. `depth` is the signed extent along the
/// face's normal axis; its sign picks which side the face sits on.
#[allow(clippy::too_many_arguments)]
fn box_face(
    mesh: &mut TriMesh,
    axes: [usize; 3],
    udir: f32,
    vdir: f32,
    width: f32,
    height: f32,
    depth: f32,
    material: usize,
) {
    let [u, v, w] = axes;
    let base = mesh.vertices.len() as u32;
    let start = mesh.indices.len() as u32;

    let mut normal = Vec3::ZERO;
    normal[w] = depth.signum();

    for iy in 0..2 {
        for ix in 0..2 {
            let mut p = Vec3::ZERO;
            p[u] = (ix as f32 - 0.5) * width * udir;
            p[v] = (iy as f32 - 0.5) * height * vdir;
            p[w] = depth / 2.0;
            mesh.vertices.push(GpuVertex::new(p, normal, Vec2::new(ix as f32, 1.0 - iy as f32)));
        }
    }

    // a = (0,0), b = (0,1), c = (1,1), d = (1,0)
    let (a, b, c, d) = (base, base + 2, base + 3, base + 1);
    mesh.indices.extend_from_slice(&[a, b, d, b, c, d]);
    mesh.groups.push(MeshGroup { indices: start..start + 6, material });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DIMS: Dimensions = Dimensions::new(3.0, 1.0, 3.0);

    fn curved(side: CurveSide, amount: f32) -> TriMesh {
        build_geometry(DIMS, CurveSpec { side, amount })
            .expect("triangulation")
            .expect("curved mesh")
    }

    #[test]
    fn uncurved_floor_has_no_custom_geometry() {
        for dims in [DIMS, Dimensions::new(10.0, 0.2, 1.0), Dimensions::new(0.0, 0.0, 0.0)] {
            let curve = CurveSpec { side: CurveSide::None, amount: 0.8 };
            assert!(build_geometry(dims, curve).unwrap().is_none());
        }
    }

    #[test]
    fn degenerate_dims_fall_back_to_box() {
        let curve = CurveSpec { side: CurveSide::Front, amount: 0.5 };
        for dims in [Dimensions::new(0.0, 1.0, 3.0), Dimensions::new(3.0, -1.0, 3.0), Dimensions::new(f32::NAN, 1.0, 1.0)] {
            assert!(build_geometry(dims, curve).unwrap().is_none());
        }
    }

    #[test]
    fn front_outline_corners() {
        let outline = build_outline(DIMS, CurveSpec { side: CurveSide::Front, amount: 0.5 }).unwrap();
        assert_eq!(outline.start, Vec2::new(-1.5, -1.5));
        assert_eq!(outline.segments.len(), 3);
        assert_eq!(outline.segments[0], PathSegment::Line(Vec2::new(1.5, -1.5)));
        assert_eq!(outline.segments[1], PathSegment::Line(Vec2::new(1.5, 1.5)));
        match outline.segments[2] {
            PathSegment::Cubic { c1, c2, end } => {
                assert_eq!(end, Vec2::new(-1.5, 1.5));
                assert_relative_eq!(c1.x, 1.5 - 0.6);
                assert_relative_eq!(c1.y, 1.5 + 1.5);
                assert_relative_eq!(c2.x, -1.5 + 0.6);
            }
            other => panic!("expected a cubic, got {other:?}"),
        }
    }

    #[test]
    fn outline_points_tessellate_curve() {
        let outline = build_outline(DIMS, CurveSpec { side: CurveSide::Right, amount: 0.3 }).unwrap();
        let pts = outline.points(CURVE_SEGMENTS);
        // start + 2 line ends + 20 curve points; closing line back to start dropped
        assert_eq!(pts.len(), 3 + CURVE_SEGMENTS);
        assert_ne!(pts.last(), Some(&outline.start));
    }

    #[test]
    fn front_curve_extents() {
        let mesh = curved(CurveSide::Front, 0.5);
        let (min, max) = mesh.bounding_box();
        let size = max - min;
        assert_relative_eq!(size.x, 3.0, epsilon = 1e-4);
        assert_relative_eq!(size.y, 1.0, epsilon = 1e-4);
        // peak of the bulge: 0.75 * amount * depth past the edge
        assert_relative_eq!(size.z, 3.0 + 0.75 * 0.5 * 3.0, epsilon = 1e-4);
        assert_relative_eq!((min + max).length(), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn deterministic_for_equal_inputs() {
        for side in [CurveSide::Front, CurveSide::Back, CurveSide::Left, CurveSide::Right] {
            assert_eq!(curved(side, 0.4), curved(side, 0.4));
        }
    }

    #[test]
    fn uvs_stay_in_unit_square() {
        let dims_set = [DIMS, Dimensions::new(5.0, 0.3, 2.0), Dimensions::new(1.0, 4.0, 8.0)];
        for dims in dims_set {
            for side in [CurveSide::Front, CurveSide::Back, CurveSide::Left, CurveSide::Right] {
                for amount in [-0.4, 0.0, 0.3, 0.5, 1.2] {
                    let mesh = build_geometry(dims, CurveSpec { side, amount }).unwrap().unwrap();
                    for v in &mesh.vertices {
                        let uv = v.uv();
                        assert!((0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y),
                            "{side:?} {amount} {dims:?}: uv {uv}");
                    }
                }
            }
        }
    }

    #[test]
    fn caps_use_planar_projection_and_sides_sample_midline() {
        let mesh = curved(CurveSide::Front, 0.5);
        let mut saw_top = false;
        for v in &mesh.vertices {
            let (p, n, uv) = (v.position(), v.normal(), v.uv());
            match FaceClass::classify(n) {
                FaceClass::TopBottom => {
                    saw_top |= n.y > 0.0;
                    assert_relative_eq!(p.y.abs(), 0.5, epsilon = 1e-4);
                    assert_relative_eq!(uv.x, ((p.x + 1.5) / 3.0).clamp(0.0, 1.0), epsilon = 1e-5);
                    assert_relative_eq!(uv.y, ((p.z + 1.5) / 3.0).clamp(0.0, 1.0), epsilon = 1e-5);
                }
                _ => assert_eq!(uv.y, 0.5),
            }
        }
        assert!(saw_top);
    }

    #[test]
    fn curved_wall_projects_along_its_own_axis() {
        let p = Vec3::new(0.75, 0.2, -1.2);
        let front = FaceClass::CurvedOrSlanted.uv(p, DIMS, CurveSide::Front);
        let left = FaceClass::CurvedOrSlanted.uv(p, DIMS, CurveSide::Left);
        assert_relative_eq!(front.x, 0.75);
        assert_relative_eq!(left.x, 0.1);
        assert_eq!(front.y, 0.5);
    }

    #[test]
    fn classify_thresholds() {
        assert_eq!(FaceClass::classify(Vec3::Y), FaceClass::TopBottom);
        assert_eq!(FaceClass::classify(-Vec3::Y), FaceClass::TopBottom);
        assert_eq!(FaceClass::classify(Vec3::X), FaceClass::AlongWidth);
        assert_eq!(FaceClass::classify(Vec3::NEG_Z), FaceClass::AlongDepth);
        assert_eq!(FaceClass::classify(Vec3::new(1.0, 0.5, 1.0).normalize()), FaceClass::CurvedOrSlanted);
    }

    #[test]
    fn diagonal_wall_counts_as_width_face() {
        // width is tested before depth
        assert_eq!(FaceClass::classify(Vec3::new(1.0, 0.0, 1.0).normalize()), FaceClass::AlongWidth);
        assert_eq!(FaceClass::classify(Vec3::new(-1.0, 0.0, -1.0).normalize()), FaceClass::AlongWidth);
    }

    #[test]
    fn extruded_faces_wind_outward() {
        let mesh = curved(CurveSide::Back, 0.5);
        for tri in mesh.triangles() {
            let n = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
            let centroid = (tri[0] + tri[1] + tri[2]) / 3.0;
            // the slab is star-shaped around its center
            assert!(n.dot(centroid) >= -1e-5, "inward face at {centroid}");
        }
    }

    #[test]
    fn box_has_six_outward_groups() {
        let mesh = box_mesh(DIMS);
        assert_eq!(mesh.groups.len(), BOX_FACES);
        assert_eq!(mesh.triangle_count(), 12);

        let expected = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (group, normal) in mesh.groups.iter().zip(expected) {
            let idx = &mesh.indices[group.indices.start as usize..group.indices.end as usize];
            for tri in idx.chunks_exact(3) {
                let p: Vec<Vec3> = tri.iter().map(|&i| mesh.vertices[i as usize].position()).collect();
                let n = (p[1] - p[0]).cross(p[2] - p[0]).normalize();
                assert_relative_eq!(n.dot(normal), 1.0, epsilon = 1e-5);
            }
            for &i in idx {
                assert_eq!(mesh.vertices[i as usize].normal(), normal);
            }
        }

        let (min, max) = mesh.bounding_box();
        assert_eq!(max - min, DIMS.to_vec3());
    }
}
