// Viewer camera: pan + zoom around a target point, no orbit rotation.
//
// Camera model:
//   - A "target" point on the XZ ground plane (Y=0) that the camera looks at
//   - Fixed pitch (elevation angle) and yaw (horizontal rotation), taken from
//     the initial eye position
//   - Zoom by adjusting distance along the look vector (mouse wheel)
//   - Pan the target with WASD or a right-button drag
//
// Rotation is left to the floor rig, so dragging with the left button never
// moves the camera.

use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use super::input::InputState;

pub const INITIAL_EYE: Vec3 = Vec3::new(10.0, 5.0, 10.0);

/// A ray in world space. `dir` is normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

pub struct ViewCamera {
    /// Point on the ground plane (X/Z) the camera looks at.
    target: Vec2,

    /// Distance from target along the look direction.
    /// Private: always clamped to [min_distance, max_distance] in update().
    distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,

    /// Elevation angle in radians (0 = horizontal, PI/2 = straight down)
    pub pitch: f32,

    /// Horizontal rotation in radians (0 = eye on the +Z side of the target)
    pub yaw: f32,

    /// Vertical field of view in radians
    pub fov: f32,
    pub near: f32,
    pub far: f32,

    /// WASD pan speed in world units per second
    pub move_speed: f32,

    /// World units of pan per pixel of right-drag, per unit of distance
    pub drag_pan_speed: f32,

    /// Fraction of the current distance removed per scroll line
    pub zoom_speed: f32,

    /// Target is clamped to [-pan_limit, pan_limit] on X/Z
    pub pan_limit: f32,
}

impl ViewCamera {
    pub fn new() -> Self {
        Self::looking_from(INITIAL_EYE)
    }

    /// Camera at `eye` looking at the origin.
    pub fn looking_from(eye: Vec3) -> Self {
        let distance = eye.length();
        Self {
            target: Vec2::ZERO,
            distance,
            min_distance: 2.0,
            max_distance: 60.0,
            pitch: (eye.y / distance).asin(),
            yaw: eye.x.atan2(eye.z),
            fov: 50.0_f32.to_radians(),
            near: 0.1,
            far: 1000.0,
            move_speed: 8.0,
            drag_pan_speed: 0.0015,
            zoom_speed: 0.1,
            pan_limit: 20.0,
        }
    }

    /// Update camera position based on input. Call once per frame before rendering.
    pub fn update(&mut self, input: &InputState, dt: f32) {
        // yaw=0 means the camera faces along -Z, so forward is (0, -1) in (X, Z).
        let forward = Vec2::new(-self.yaw.sin(), -self.yaw.cos());
        let right = Vec2::new(self.yaw.cos(), -self.yaw.sin());

        let mut move_dir = Vec2::ZERO;

        if input.is_key_held(KeyCode::KeyW) { move_dir += forward; }
        if input.is_key_held(KeyCode::KeyS) { move_dir -= forward; }
        if input.is_key_held(KeyCode::KeyD) { move_dir += right; }
        if input.is_key_held(KeyCode::KeyA) { move_dir -= right; }

        if move_dir != Vec2::ZERO {
            self.target += move_dir.normalize() * self.move_speed * dt;
        }

        // Right-drag: grab the ground and pull it along with the cursor.
        if input.is_button_held(MouseButton::Right) {
            let (dx, dy) = input.mouse_delta;
            let scale = self.drag_pan_speed * self.distance;
            self.target -= (right * dx - forward * dy) * scale;
        }

        // Zoom: scroll up (positive delta) zooms in (decreases distance)
        self.distance *= 1.0 - input.scroll_delta * self.zoom_speed;
        self.distance = self.distance.clamp(self.min_distance, self.max_distance);

        self.target = self.target.clamp(Vec2::splat(-self.pan_limit), Vec2::splat(self.pan_limit));
    }

    /// World-space position of the camera eye.
    pub fn camera_position(&self) -> Vec3 {
        self.target_3d() + self.eye_offset()
    }

    /// View matrix: looks from the camera eye toward the target.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.camera_position(), self.target_3d(), Vec3::Y)
    }

    /// Perspective projection matrix.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }

    /// Combined view-projection matrix ready to upload to the GPU.
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// World-space ray through a cursor position given in window pixels.
    pub fn ray_from_screen(&self, cursor: (f32, f32), window_size: (u32, u32)) -> Ray {
        let (w, h) = (window_size.0.max(1) as f32, window_size.1.max(1) as f32);
        let ndc = Vec2::new(2.0 * cursor.0 / w - 1.0, 1.0 - 2.0 * cursor.1 / h);
        let inv = self.view_projection(w / h).inverse();

        // wgpu clip space: depth 0 = near plane, 1 = far plane
        let unproject = |z: f32| {
            let p = inv * ndc.extend(z).extend(1.0);
            p.xyz() / p.w
        };
        let near = unproject(0.0);
        let far = unproject(1.0);
        Ray { origin: near, dir: (far - near).normalize() }
    }

    pub fn target(&self) -> Vec2 { self.target }
    pub fn distance(&self) -> f32 { self.distance }

    fn target_3d(&self) -> Vec3 {
        Vec3::new(self.target.x, 0.0, self.target.y)
    }

    // Offset from target to camera eye based on pitch, yaw, and distance.
    fn eye_offset(&self) -> Vec3 {
        Vec3::new(
            self.yaw.sin() * self.pitch.cos() * self.distance,
            self.pitch.sin() * self.distance,
            self.yaw.cos() * self.pitch.cos() * self.distance,
        )
    }
}

impl Default for ViewCamera {
    fn default() -> Self {
        Self::new()
    }
}
