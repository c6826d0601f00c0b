// Scene lighting and the static backdrop (ground plane, axes helper).

use glam::{Mat4, Vec2, Vec3};

use super::mesh::{GpuVertex, TriMesh};
use super::palette::Color;

pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

/// Orthographic shadow camera settings for a directional light.
pub struct ShadowSettings {
    pub map_size: u32,
    /// Half-size of the square orthographic frustum, in world units.
    pub extent: f32,
    pub near: f32,
    pub far: f32,
}

pub struct DirectionalLight {
    pub position: Vec3,
    pub target: Vec3,
    pub color: Color,
    pub intensity: f32,
    pub shadow: Option<ShadowSettings>,
}

impl DirectionalLight {
    /// Unit vector from the lit surface toward the light.
    pub fn to_light(&self) -> Vec3 {
        (self.position - self.target).normalize()
    }

    /// View-projection of the shadow camera. Identity if the light casts no shadow.
    pub fn shadow_view_proj(&self) -> Mat4 {
        let Some(shadow) = &self.shadow else {
            return Mat4::IDENTITY;
        };
        let e = shadow.extent;
        let proj = Mat4::orthographic_rh(-e, e, -e, e, shadow.near, shadow.far);
        proj * Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }
}

pub struct Lights {
    pub ambient: AmbientLight,
    pub sun: DirectionalLight,
}

impl Default for Lights {
    fn default() -> Self {
        Self {
            ambient: AmbientLight { color: Color::WHITE, intensity: 1.2 },
            sun: DirectionalLight {
                position: Vec3::new(15.0, 15.0, -10.0),
                target: Vec3::ZERO,
                color: Color::WHITE,
                intensity: 1.5,
                shadow: Some(ShadowSettings { map_size: 1024, extent: 5.0, near: 0.5, far: 50.0 }),
            },
        }
    }
}

// ============================================================================
// BACKDROP
// ============================================================================

pub const GROUND_SIZE: f32 = 20.0;
pub const GROUND_COLOR: Color = Color::WHITE;
pub const GROUND_OPACITY: f32 = 0.8;
pub const AXES_LENGTH: f32 = 3.0;

/// Square ground plane at y = 0 facing up.
pub fn ground_mesh(size: f32) -> TriMesh {
    let h = size / 2.0;
    let corners = [
        (Vec3::new(-h, 0.0, -h), Vec2::new(0.0, 1.0)),
        (Vec3::new(-h, 0.0, h), Vec2::new(0.0, 0.0)),
        (Vec3::new(h, 0.0, h), Vec2::new(1.0, 0.0)),
        (Vec3::new(h, 0.0, -h), Vec2::new(1.0, 1.0)),
    ];
    TriMesh {
        vertices: corners.iter().map(|&(p, uv)| GpuVertex::new(p, Vec3::Y, uv)).collect(),
        indices: vec![0, 1, 2, 0, 2, 3],
        groups: Vec::new(),
    }
}

/// Colored line vertex for helper geometry.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color:    [f32; 4],
}

impl LineVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// X (red), Y (green), Z (blue) axis lines from the origin, as a line list.
pub fn axes_lines(length: f32) -> Vec<LineVertex> {
    [
        (Vec3::X, [1.0, 0.0, 0.0, 1.0]),
        (Vec3::Y, [0.0, 1.0, 0.0, 1.0]),
        (Vec3::Z, [0.0, 0.0, 1.0, 1.0]),
    ]
    .iter()
    .flat_map(|&(axis, color)| {
        [
            LineVertex { position: [0.0; 3], color },
            LineVertex { position: (axis * length).to_array(), color },
        ]
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4Swizzles;

    #[test]
    fn shadow_frustum_contains_floor() {
        let lights = Lights::default();
        let vp = lights.sun.shadow_view_proj();
        for corner in [Vec3::new(-1.5, 0.0, -2.1), Vec3::new(1.5, 1.0, 2.1), Vec3::new(0.0, 0.5, 0.0)] {
            let clip = vp * corner.extend(1.0);
            let ndc = clip.xyz() / clip.w;
            assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0, "{corner} -> {ndc}");
            assert!((0.0..=1.0).contains(&ndc.z), "{corner} depth {}", ndc.z);
        }
    }

    #[test]
    fn sun_shines_from_above() {
        let sun = Lights::default().sun;
        assert!(sun.to_light().y > 0.0);
        assert_relative_eq!(sun.to_light().length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn ground_faces_up() {
        let mut ground = ground_mesh(GROUND_SIZE);
        ground.compute_vertex_normals();
        assert!(ground.vertices.iter().all(|v| v.normal() == Vec3::Y));
    }

    #[test]
    fn three_axes() {
        let lines = axes_lines(AXES_LENGTH);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1].position, [AXES_LENGTH, 0.0, 0.0]);
    }
}
