// Ray picking against triangle meshes (Möller–Trumbore).

use glam::{Mat4, Vec3};

use super::camera::Ray;
use super::mesh::TriMesh;

const EPSILON: f32 = 1e-7;

/// Distance along the ray to the triangle, if hit in front of the origin.
/// Both faces count as hits.
pub fn ray_triangle(ray: &Ray, [a, b, c]: [Vec3; 3]) -> Option<f32> {
    let e1 = b - a;
    let e2 = c - a;
    let p = ray.dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(e1);
    let v = ray.dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(q) * inv_det;
    (t > EPSILON).then_some(t)
}

/// Nearest hit of a world-space ray against `mesh` placed by `model`.
/// Returns the distance along the ray and the world-space hit point.
pub fn pick_mesh(ray: &Ray, mesh: &TriMesh, model: Mat4) -> Option<(f32, Vec3)> {
    // Transform the ray into mesh space instead of every triangle into world space.
    let inv = model.inverse();
    let local_origin = inv.transform_point3(ray.origin);
    let local_dir = inv.transform_vector3(ray.dir);
    let scale = local_dir.length();
    if scale <= f32::EPSILON {
        return None;
    }
    let local = Ray { origin: local_origin, dir: local_dir / scale };

    mesh.triangles()
        .filter_map(|tri| ray_triangle(&local, tri))
        .min_by(f32::total_cmp)
        .map(|t| {
            let world_t = t / scale;
            (world_t, ray.at(world_t))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geometry::{box_mesh, Dimensions};
    use approx::assert_relative_eq;

    fn down_ray(x: f32, z: f32) -> Ray {
        Ray { origin: Vec3::new(x, 10.0, z), dir: Vec3::NEG_Y }
    }

    #[test]
    fn hits_top_of_box() {
        let mesh = box_mesh(Dimensions::new(3.0, 1.0, 3.0));
        let (t, p) = pick_mesh(&down_ray(0.2, -0.4), &mesh, Mat4::IDENTITY).unwrap();
        assert_relative_eq!(t, 9.5, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn misses_outside_footprint() {
        let mesh = box_mesh(Dimensions::new(3.0, 1.0, 3.0));
        assert!(pick_mesh(&down_ray(2.0, 0.0), &mesh, Mat4::IDENTITY).is_none());
    }

    #[test]
    fn respects_model_transform() {
        let mesh = box_mesh(Dimensions::new(1.0, 1.0, 1.0));
        let model = Mat4::from_translation(Vec3::new(5.0, 0.5, 0.0));
        assert!(pick_mesh(&down_ray(0.0, 0.0), &mesh, model).is_none());
        let (t, _) = pick_mesh(&down_ray(5.2, 0.1), &mesh, model).unwrap();
        assert_relative_eq!(t, 9.0, epsilon = 1e-5);
    }

    #[test]
    fn triangle_behind_origin_is_ignored() {
        let ray = Ray { origin: Vec3::ZERO, dir: Vec3::Z };
        let tri = [Vec3::new(-1.0, -1.0, -2.0), Vec3::new(1.0, -1.0, -2.0), Vec3::new(0.0, 1.0, -2.0)];
        assert!(ray_triangle(&ray, tri).is_none());
    }
}
