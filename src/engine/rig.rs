// Rotating rig: spins its child group about Y.
//
// Two modes:
//   Idle    : auto-rotates (if enabled) at a fixed angular speed per frame
//   Dragging: follows horizontal pointer movement; no auto-rotation
//
// The angle accumulates without wrapping or clamping.

use bevy_ecs::prelude::*;

/// Radians of rotation per pixel of horizontal drag.
pub const DRAG_SENSITIVITY: f32 = 0.02;
/// Auto-rotation speed in radians per second.
pub const AUTO_ROTATE_SPEED: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RigMode {
    Idle,
    Dragging { last_x: f32 },
}

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Rig {
    pub mode: RigMode,
    /// Rotation about Y in radians.
    pub rotation: f32,
    pub auto_rotate: bool,
}

impl Rig {
    pub fn new(auto_rotate: bool) -> Self {
        Self { mode: RigMode::Idle, rotation: 0.0, auto_rotate }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.mode, RigMode::Dragging { .. })
    }

    pub fn pointer_down(&mut self, client_x: f32) {
        self.mode = RigMode::Dragging { last_x: client_x };
    }

    pub fn pointer_move(&mut self, client_x: f32) {
        if let RigMode::Dragging { last_x } = &mut self.mode {
            self.rotation += (client_x - *last_x) * DRAG_SENSITIVITY;
            *last_x = client_x;
        }
    }

    pub fn pointer_up(&mut self) {
        self.mode = RigMode::Idle;
    }

    pub fn pointer_leave(&mut self) {
        self.pointer_up();
    }

    /// Per-frame update. Dragging always wins over auto-rotation.
    pub fn tick(&mut self, dt: f32) {
        if self.auto_rotate && self.mode == RigMode::Idle {
            self.rotation += dt * AUTO_ROTATE_SPEED;
        }
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn idle_auto_rotates_by_dt_times_speed() {
        let mut rig = Rig::new(true);
        rig.tick(0.1);
        assert_relative_eq!(rig.rotation, 0.05);
    }

    #[test]
    fn auto_rotate_off_holds_still() {
        let mut rig = Rig::new(false);
        rig.tick(1.0);
        assert_eq!(rig.rotation, 0.0);
    }

    #[test]
    fn drag_suppresses_auto_rotation_for_the_frame() {
        let mut rig = Rig::new(true);
        rig.pointer_down(100.0);
        rig.pointer_move(110.0);
        rig.tick(0.1);
        assert_relative_eq!(rig.rotation, 0.2);
    }

    #[test]
    fn move_without_press_is_ignored() {
        let mut rig = Rig::new(false);
        rig.pointer_move(500.0);
        assert_eq!(rig.rotation, 0.0);
        assert!(!rig.is_dragging());
    }

    #[test]
    fn drag_tracks_last_position() {
        let mut rig = Rig::new(false);
        rig.pointer_down(0.0);
        rig.pointer_move(10.0);
        rig.pointer_move(5.0);
        assert_relative_eq!(rig.rotation, 0.1);
        assert_eq!(rig.mode, RigMode::Dragging { last_x: 5.0 });
    }

    #[test]
    fn release_or_leave_returns_to_idle() {
        let mut rig = Rig::new(true);
        rig.pointer_down(0.0);
        rig.pointer_up();
        assert!(!rig.is_dragging());
        rig.tick(0.2);
        assert_relative_eq!(rig.rotation, 0.1);

        rig.pointer_down(0.0);
        rig.pointer_leave();
        rig.pointer_move(50.0);
        assert_relative_eq!(rig.rotation, 0.1);
    }

    #[test]
    fn rotation_is_not_clamped() {
        let mut rig = Rig::new(true);
        for _ in 0..100 {
            rig.tick(1.0);
        }
        assert_relative_eq!(rig.rotation, 50.0, epsilon = 1e-4);
    }
}
