// ECS systems for updating scene state
// Systems operate on entities with specific component combinations

use bevy_ecs::prelude::*;

use super::components::*;
use super::geometry::GeometryError;
use super::rig::Rig;
use super::surface::FloorSurface;

/// Advance every rig by one frame and mirror its angle into its transform.
pub fn rig_rotation_system(
    time: Res<FrameTime>,
    mut rigs: Query<(&mut Rig, &mut Transform)>,
) {
    for (mut rig, mut transform) in rigs.iter_mut() {
        rig.tick(time.delta);
        transform.rotation_y = rig.rotation;
    }
}

/// Rig groups sit at the root of the scene: world = local.
pub fn rig_global_system(
    mut rigs: Query<(&Transform, &mut GlobalTransform), With<Rig>>,
) {
    for (transform, mut global) in rigs.iter_mut() {
        global.0 = transform.matrix();
    }
}

/// Members inherit their rig's world matrix.
pub fn member_global_system(
    rigs: Query<&GlobalTransform, With<Rig>>,
    mut members: Query<(&Transform, &RigMember, &mut GlobalTransform), Without<Rig>>,
) {
    for (transform, member, mut global) in members.iter_mut() {
        let parent = rigs.get(member.rig).map(|g| g.0).unwrap_or_default();
        global.0 = parent * transform.matrix();
    }
}

/// Per-frame schedule: rig rotation, then transform propagation.
pub fn build_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((rig_rotation_system, rig_global_system, member_global_system).chain());
    schedule
}

/// Re-resolve every floor's draw description from its current props.
/// Cheap when nothing changed: geometry and textures are memoized.
pub fn refresh_surfaces(world: &mut World) -> Result<(), GeometryError> {
    let mut query = world.query::<(&Floor, &mut FloorSurface, &mut FloorDraw)>();
    for (floor, mut surface, mut draw) in query.iter_mut(world) {
        draw.0 = Some(surface.update(&floor.props)?);
    }
    Ok(())
}
