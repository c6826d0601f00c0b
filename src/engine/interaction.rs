// Pointer dispatch: turns one frame of cursor input into floor hover/click
// hooks and rig drag events.
//
// Rig events only fire while the pointer is over one of the rig's members,
// so moving off the floors ends a drag the same way releasing the button does.

use bevy_ecs::prelude::*;
use glam::Vec3;

use super::camera::Ray;
use super::components::*;
use super::picking;
use super::rig::Rig;
use super::surface::{FloorSurface, PointerEvent};

/// Cursor input for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerFrame {
    pub client_x: f32,
    pub client_y: f32,
    /// `None` when the cursor is outside the window or captured by the HUD.
    pub ray: Option<Ray>,
    pub pressed: bool,
    pub released: bool,
}

#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct PointerTracker {
    pub hovered: Option<Entity>,
    /// Set by a press inside the scene: the floor it landed on, if any.
    /// Presses over the HUD are not recorded.
    pub press: Option<Option<Entity>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerOutcome {
    pub hovered: Option<Entity>,
    /// Set when a press and release both landed on the same floor.
    pub clicked: Option<Entity>,
    /// Set when a press and release both landed on empty scene space.
    pub clicked_empty: bool,
}

/// Nearest floor under the ray, with the world-space hit point.
pub fn pick_floor(world: &mut World, ray: &Ray) -> Option<(Entity, Vec3)> {
    let mut query = world.query::<(Entity, &FloorDraw, &GlobalTransform)>();
    query
        .iter(world)
        .filter_map(|(entity, draw, global)| {
            let draw = draw.0.as_ref()?;
            picking::pick_mesh(ray, &draw.shape.mesh, global.0).map(|(t, p)| (t, entity, p))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, entity, p)| (entity, p))
}

fn rig_of(world: &World, floor: Option<Entity>) -> Option<Entity> {
    floor.and_then(|e| world.get::<RigMember>(e)).map(|m| m.rig)
}

fn with_rig(world: &mut World, rig: Option<Entity>, f: impl FnOnce(&mut Rig)) {
    if let Some(mut rig) = rig.and_then(|e| world.get_mut::<Rig>(e)) {
        f(&mut rig);
    }
}

fn with_surface(world: &mut World, floor: Entity, f: impl FnOnce(&mut FloorSurface)) {
    if let Some(mut surface) = world.get_mut::<FloorSurface>(floor) {
        f(&mut surface);
    }
}

pub fn dispatch_pointer(world: &mut World, frame: &PointerFrame) -> PointerOutcome {
    let hit = frame.ray.and_then(|ray| pick_floor(world, &ray));
    let hit_entity = hit.map(|(e, _)| e);
    let event = PointerEvent {
        client_x: frame.client_x,
        client_y: frame.client_y,
        point: hit.map(|(_, p)| p),
    };

    let mut tracker = world.get_resource::<PointerTracker>().copied().unwrap_or_default();

    // Hover transitions
    if tracker.hovered != hit_entity {
        if let Some(old) = tracker.hovered {
            if let Ok(mut entity) = world.get_entity_mut(old) {
                entity.remove::<Hovered>();
            }
            let out = PointerEvent { point: None, ..event };
            with_surface(world, old, |s| s.pointer_out(&out));
        }
        if let Some(new) = hit_entity {
            world.entity_mut(new).insert(Hovered);
            with_surface(world, new, |s| s.pointer_over(&event));
        }

        let (old_rig, new_rig) = (rig_of(world, tracker.hovered), rig_of(world, hit_entity));
        if old_rig.is_some() && old_rig != new_rig {
            with_rig(world, old_rig, Rig::pointer_leave);
        }
        tracker.hovered = hit_entity;
    }

    let rig = rig_of(world, hit_entity);
    let mut outcome = PointerOutcome { hovered: hit_entity, ..Default::default() };

    if frame.pressed {
        with_rig(world, rig, |r| r.pointer_down(frame.client_x));
        tracker.press = frame.ray.is_some().then_some(hit_entity);
    } else {
        with_rig(world, rig, |r| r.pointer_move(frame.client_x));
    }

    if frame.released {
        with_rig(world, rig, Rig::pointer_up);
        match (tracker.press.take(), hit_entity) {
            (Some(Some(pressed)), Some(released)) if pressed == released => {
                with_surface(world, released, |s| s.click(&event));
                outcome.clicked = Some(released);
            }
            (Some(None), None) if frame.ray.is_some() => outcome.clicked_empty = true,
            _ => {}
        }
    }

    world.insert_resource(tracker);
    outcome
}

/// Pointer left the window: end hovers and drags everywhere.
pub fn pointer_left_window(world: &mut World, client_x: f32, client_y: f32) {
    let mut tracker = world.get_resource::<PointerTracker>().copied().unwrap_or_default();
    if let Some(old) = tracker.hovered.take() {
        if let Ok(mut entity) = world.get_entity_mut(old) {
            entity.remove::<Hovered>();
        }
        let out = PointerEvent { client_x, client_y, point: None };
        with_surface(world, old, |s| s.pointer_out(&out));
    }
    tracker.press = None;

    let mut rigs = world.query::<&mut Rig>();
    for mut rig in rigs.iter_mut(world) {
        rig.pointer_leave();
    }
    world.insert_resource(tracker);
}

/// Single selection: clicking a floor toggles it and clears the others,
/// clicking empty space clears everything.
pub fn apply_selection(world: &mut World, clicked: Option<Entity>) {
    let mut floors = world.query::<(Entity, &mut Floor)>();
    for (entity, mut floor) in floors.iter_mut(world) {
        let selected = Some(entity) == clicked && !floor.props.selected;
        if floor.props.selected != selected {
            floor.props.selected = selected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geometry::{CurveSpec, Dimensions};
    use crate::engine::surface::{FloorProps, PointerCallback, PointerHandlers};
    use crate::engine::systems::{build_schedule, refresh_surfaces};
    use approx::assert_relative_eq;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn scene(log: &Log) -> (World, Entity, Entity) {
        let hook = |name: &'static str| -> Option<PointerCallback> {
            let log = Arc::clone(log);
            Some(Box::new(move |_: &PointerEvent| log.lock().unwrap().push(name)))
        };

        let mut world = World::new();
        world.insert_resource(FrameTime::default());
        let rig = world.spawn((Rig::new(true), Transform::default(), GlobalTransform::default())).id();
        let floor = world
            .spawn((
                Floor {
                    props: FloorProps {
                        dims: Dimensions::new(2.0, 1.0, 2.0),
                        segments: Vec::new(),
                        selected: false,
                        curve: CurveSpec::default(),
                    },
                },
                FloorSurface::new(PointerHandlers {
                    on_click: hook("click"),
                    on_pointer_over: hook("over"),
                    on_pointer_out: hook("out"),
                }),
                FloorDraw::default(),
                Transform::default(),
                GlobalTransform::default(),
                RigMember { rig },
            ))
            .id();
        build_schedule().run(&mut world);
        refresh_surfaces(&mut world).unwrap();
        (world, rig, floor)
    }

    fn frame(x: f32, over_floor: bool) -> PointerFrame {
        let origin = if over_floor { glam::Vec3::new(0.0, 10.0, 0.0) } else { glam::Vec3::new(9.0, 10.0, 9.0) };
        PointerFrame {
            client_x: x,
            client_y: 0.0,
            ray: Some(Ray { origin, dir: glam::Vec3::NEG_Y }),
            pressed: false,
            released: false,
        }
    }

    #[test]
    fn hover_enter_and_exit_fire_hooks() {
        let log = Log::default();
        let (mut world, _, floor) = scene(&log);

        let out = dispatch_pointer(&mut world, &frame(0.0, true));
        assert_eq!(out.hovered, Some(floor));
        assert!(world.get::<Hovered>(floor).is_some());

        dispatch_pointer(&mut world, &frame(0.0, false));
        assert!(world.get::<Hovered>(floor).is_none());
        assert_eq!(*log.lock().unwrap(), vec!["over", "out"]);
    }

    #[test]
    fn press_release_on_floor_clicks() {
        let log = Log::default();
        let (mut world, _, floor) = scene(&log);

        dispatch_pointer(&mut world, &PointerFrame { pressed: true, ..frame(0.0, true) });
        let out = dispatch_pointer(&mut world, &PointerFrame { released: true, ..frame(0.0, true) });
        assert_eq!(out.clicked, Some(floor));
        assert!(log.lock().unwrap().contains(&"click"));
        // the surface does not select itself
        assert!(!world.get::<Floor>(floor).unwrap().props.selected);
    }

    #[test]
    fn drag_over_floor_turns_rig() {
        let log = Log::default();
        let (mut world, rig, _) = scene(&log);

        dispatch_pointer(&mut world, &PointerFrame { pressed: true, ..frame(100.0, true) });
        dispatch_pointer(&mut world, &frame(110.0, true));
        world.resource_mut::<FrameTime>().delta = 0.1;
        build_schedule().run(&mut world);
        assert_relative_eq!(world.get::<Rig>(rig).unwrap().rotation, 0.2);
    }

    #[test]
    fn leaving_floor_ends_drag() {
        let log = Log::default();
        let (mut world, rig, _) = scene(&log);

        dispatch_pointer(&mut world, &PointerFrame { pressed: true, ..frame(100.0, true) });
        dispatch_pointer(&mut world, &frame(300.0, false));
        assert!(!world.get::<Rig>(rig).unwrap().is_dragging());
    }

    #[test]
    fn window_exit_clears_hover_and_drag() {
        let log = Log::default();
        let (mut world, rig, floor) = scene(&log);
        dispatch_pointer(&mut world, &PointerFrame { pressed: true, ..frame(0.0, true) });
        pointer_left_window(&mut world, 0.0, 0.0);
        assert!(world.get::<Hovered>(floor).is_none());
        assert!(!world.get::<Rig>(rig).unwrap().is_dragging());
    }

    #[test]
    fn empty_click_needs_scene_press() {
        let log = Log::default();
        let (mut world, _, _) = scene(&log);

        dispatch_pointer(&mut world, &PointerFrame { pressed: true, ..frame(0.0, false) });
        let out = dispatch_pointer(&mut world, &PointerFrame { released: true, ..frame(0.0, false) });
        assert!(out.clicked_empty);

        // press and release over the HUD: no ray, no click
        let hud = PointerFrame { ray: None, ..frame(0.0, false) };
        dispatch_pointer(&mut world, &PointerFrame { pressed: true, ..hud });
        let out = dispatch_pointer(&mut world, &PointerFrame { released: true, ..hud });
        assert!(!out.clicked_empty);
        assert_eq!(out.clicked, None);
    }

    #[test]
    fn selection_toggles_and_clears() {
        let log = Log::default();
        let (mut world, _, floor) = scene(&log);
        apply_selection(&mut world, Some(floor));
        assert!(world.get::<Floor>(floor).unwrap().props.selected);
        apply_selection(&mut world, Some(floor));
        assert!(!world.get::<Floor>(floor).unwrap().props.selected);
        apply_selection(&mut world, Some(floor));
        apply_selection(&mut world, None);
        assert!(!world.get::<Floor>(floor).unwrap().props.selected);
    }
}
