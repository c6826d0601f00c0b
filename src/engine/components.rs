// ECS components and resources for the floor scene.

use bevy_ecs::prelude::*;
use glam::{Mat4, Quat, Vec3};

use super::surface::{FloorProps, SurfaceDraw};

/// Local placement of an entity: translation plus rotation about Y.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation_y: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation_y: 0.0,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self { position, ..Default::default() }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(Quat::from_rotation_y(self.rotation_y), self.position)
    }
}

/// World matrix, resolved each frame from the local transform and its rig.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct GlobalTransform(pub Mat4);

impl Default for GlobalTransform {
    fn default() -> Self {
        Self(Mat4::IDENTITY)
    }
}

/// Attaches an entity to a rig group; its world transform follows the rig.
#[derive(Component, Debug, Clone, Copy)]
pub struct RigMember {
    pub rig: Entity,
}

/// Caller-owned floor props. The host flips `selected` on click.
#[derive(Component, Debug, Clone)]
pub struct Floor {
    pub props: FloorProps,
}

/// Latest draw description produced by the entity's `FloorSurface`.
#[derive(Component, Debug, Clone, Default)]
pub struct FloorDraw(pub Option<SurfaceDraw>);

/// Marker: the pointer is currently over this floor.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Hovered;

/// Frame timing, written by the host before the schedule runs.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct FrameTime {
    /// Seconds since the previous frame.
    pub delta: f32,
}
