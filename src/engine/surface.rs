// Floor surface: the renderable composition of one floor.
//
// Takes caller-owned props (dims, legend, selection, curve) and produces a
// draw description: mesh, per-group textures, edge outline and shadow flags.
// Geometry and textures are derived data, memoized on the props they depend
// on and rebuilt only when those props change.

use std::sync::Arc;

use bevy_ecs::prelude::*;
use glam::Vec3;

use super::geometry::{self, CurveSpec, Dimensions, GeometryError};
use super::mesh::{self, TriMesh};
use super::palette::{Color, ColorSegment};
use super::texture::{self, FloorTexture, TextureSet};

/// Dihedral angle above which a mesh edge is outlined.
const EDGE_THRESHOLD_DEG: f32 = 15.0;

const EDGE_COLOR: Color = Color::from_u32(0x99A1AF);
const EDGE_COLOR_SELECTED: Color = Color::from_u32(0x16A4C0);

// ============================================================================
// MEMO
// ============================================================================

/// Single-slot cache keyed by equality: holds the value for the last key.
#[derive(Debug)]
pub struct Memo<K, V> {
    slot: Option<(K, V)>,
    computations: u64,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self { slot: None, computations: 0 }
    }
}

impl<K: PartialEq + Clone, V> Memo<K, V> {
    pub fn get_or_insert_with(&mut self, key: &K, compute: impl FnOnce(&K) -> V) -> &V {
        match self.get_or_try_insert_with(key, |k| Ok::<V, std::convert::Infallible>(compute(k))) {
            Ok(v) => v,
            Err(never) => match never {},
        }
    }

    /// Like `get_or_insert_with`, but a failed computation leaves the cache empty.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: &K,
        compute: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<&V, E> {
        let entry = match self.slot.take() {
            Some((k, v)) if k == *key => (k, v),
            _ => {
                self.computations += 1;
                (key.clone(), compute(key)?)
            }
        };
        Ok(&self.slot.insert(entry).1)
    }

    /// How many times a value has been (re)computed. Doubles as a generation
    /// counter for consumers that mirror the value elsewhere (GPU buffers).
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

// ============================================================================
// PROPS AND DRAW DESCRIPTION
// ============================================================================

/// Caller-owned floor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FloorProps {
    pub dims:     Dimensions,
    pub segments: Vec<ColorSegment>,
    pub selected: bool,
    pub curve:    CurveSpec,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeStyle {
    pub color: Color,
    /// Screen-space width in pixels.
    pub width: f32,
}

impl EdgeStyle {
    pub fn for_selection(selected: bool) -> Self {
        if selected {
            Self { color: EDGE_COLOR_SELECTED, width: 3.0 }
        } else {
            Self { color: EDGE_COLOR, width: 1.0 }
        }
    }
}

/// Mesh plus its outline, derived from (dims, curve).
#[derive(Debug, Clone)]
pub struct FloorShape {
    pub mesh:   Arc<TriMesh>,
    pub curved: bool,
    pub edges:  Arc<Vec<[Vec3; 2]>>,
}

impl FloorShape {
    fn build(dims: Dimensions, curve: CurveSpec) -> Result<Self, GeometryError> {
        let (mesh, curved) = match geometry::build_geometry(dims, curve)? {
            Some(mesh) => (mesh, true),
            None => (geometry::box_mesh(dims), false),
        };
        let edges = mesh::feature_edges(&mesh, EDGE_THRESHOLD_DEG);
        Ok(Self { mesh: Arc::new(mesh), curved, edges: Arc::new(edges) })
    }
}

/// Everything the renderer needs to draw one floor this frame.
#[derive(Debug, Clone)]
pub struct SurfaceDraw {
    pub shape: FloorShape,
    /// The full legend texture set the materials were picked from.
    pub textures: TextureSet,
    /// Texture per material slot (indexed by `MeshGroup::material`).
    pub materials: Vec<FloorTexture>,
    pub edge_style: EdgeStyle,
    pub casts_shadow: bool,
    pub receives_shadow: bool,
    pub geometry_generation: u64,
    pub texture_generation: u64,
}

// ============================================================================
// POINTER HOOKS
// ============================================================================

/// A pointer event that hit (or left) the floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub client_x: f32,
    pub client_y: f32,
    /// World-space hit point, if the pointer is over the mesh.
    pub point: Option<Vec3>,
}

pub type PointerCallback = Box<dyn FnMut(&PointerEvent) + Send + Sync>;

/// Optional callbacks, invoked with the event exactly as delivered.
#[derive(Default)]
pub struct PointerHandlers {
    pub on_click:        Option<PointerCallback>,
    pub on_pointer_over: Option<PointerCallback>,
    pub on_pointer_out:  Option<PointerCallback>,
}

impl std::fmt::Debug for PointerHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerHandlers")
            .field("on_click", &self.on_click.is_some())
            .field("on_pointer_over", &self.on_pointer_over.is_some())
            .field("on_pointer_out", &self.on_pointer_out.is_some())
            .finish()
    }
}

// ============================================================================
// FLOOR SURFACE
// ============================================================================

#[derive(Component, Debug, Default)]
pub struct FloorSurface {
    shape:    Memo<(Dimensions, CurveSpec), FloorShape>,
    textures: Memo<Vec<ColorSegment>, TextureSet>,
    pub handlers: PointerHandlers,
}

impl FloorSurface {
    pub fn new(handlers: PointerHandlers) -> Self {
        Self { handlers, ..Default::default() }
    }

    /// Resolve the draw description for `props`, reusing cached geometry and
    /// textures when their inputs are unchanged.
    pub fn update(&mut self, props: &FloorProps) -> Result<SurfaceDraw, GeometryError> {
        let shape = self
            .shape
            .get_or_try_insert_with(&(props.dims, props.curve), |&(dims, curve)| {
                FloorShape::build(dims, curve)
            })?
            .clone();
        let set = self.textures.get_or_insert_with(&props.segments, |segs| texture::synthesize(segs));

        let (tex, mirrored) = set.pick(props.selected);
        let materials = if shape.curved {
            vec![tex.clone()]
        } else {
            // ±X faces get the mirrored legend so stripes read the same way
            // all around the box.
            (0..geometry::BOX_FACES)
                .map(|face| if face < 2 { mirrored.clone() } else { tex.clone() })
                .collect()
        };

        Ok(SurfaceDraw {
            shape,
            textures: set.clone(),
            materials,
            edge_style: EdgeStyle::for_selection(props.selected),
            casts_shadow: true,
            receives_shadow: true,
            geometry_generation: self.shape.computations(),
            texture_generation: self.textures.computations(),
        })
    }

    pub fn click(&mut self, event: &PointerEvent) {
        if let Some(cb) = self.handlers.on_click.as_mut() {
            cb(event);
        }
    }

    pub fn pointer_over(&mut self, event: &PointerEvent) {
        if let Some(cb) = self.handlers.on_pointer_over.as_mut() {
            cb(event);
        }
    }

    pub fn pointer_out(&mut self, event: &PointerEvent) {
        if let Some(cb) = self.handlers.on_pointer_out.as_mut() {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geometry::CurveSide;
    use crate::engine::palette::UsageType;
    use std::sync::Mutex;

    fn props() -> FloorProps {
        FloorProps {
            dims: Dimensions::new(3.0, 1.0, 3.0),
            segments: vec![
                ColorSegment::from_usage(UsageType::Parking),
                ColorSegment::from_usage(UsageType::House),
                ColorSegment::from_usage(UsageType::Others),
            ],
            selected: false,
            curve: CurveSpec { side: CurveSide::Front, amount: 0.5 },
        }
    }

    #[test]
    fn memo_recomputes_only_on_key_change() {
        let mut memo: Memo<u32, String> = Memo::default();
        assert_eq!(memo.get_or_insert_with(&1, |k| k.to_string()), "1");
        assert_eq!(memo.get_or_insert_with(&1, |_| unreachable!()), "1");
        assert_eq!(memo.computations(), 1);
        assert_eq!(memo.get_or_insert_with(&2, |k| k.to_string()), "2");
        assert_eq!(memo.computations(), 2);
    }

    #[test]
    fn memo_failure_leaves_cache_empty() {
        let mut memo: Memo<u32, u32> = Memo::default();
        assert!(memo.get_or_try_insert_with(&1, |_| Err::<u32, &str>("boom")).is_err());
        assert_eq!(*memo.get_or_try_insert_with(&1, |k| Ok::<u32, &str>(k + 1)).unwrap(), 2);
    }

    #[test]
    fn unchanged_props_reuse_geometry_and_textures() {
        let mut surface = FloorSurface::default();
        let first = surface.update(&props()).unwrap();
        let second = surface.update(&props()).unwrap();
        assert!(Arc::ptr_eq(&first.shape.mesh, &second.shape.mesh));
        assert_eq!(first.geometry_generation, second.geometry_generation);
        assert_eq!(first.texture_generation, second.texture_generation);
    }

    #[test]
    fn selection_change_keeps_caches() {
        let mut surface = FloorSurface::default();
        let base = surface.update(&props()).unwrap();
        let selected = surface.update(&FloorProps { selected: true, ..props() }).unwrap();
        assert_eq!(base.geometry_generation, selected.geometry_generation);
        assert_eq!(base.texture_generation, selected.texture_generation);
    }

    #[test]
    fn curve_change_rebuilds_geometry_only() {
        let mut surface = FloorSurface::default();
        let before = surface.update(&props()).unwrap();
        let mut p = props();
        p.curve.amount = 0.2;
        let after = surface.update(&p).unwrap();
        assert!(after.geometry_generation > before.geometry_generation);
        assert_eq!(after.texture_generation, before.texture_generation);
    }

    #[test]
    fn segment_change_rebuilds_textures_only() {
        let mut surface = FloorSurface::default();
        let before = surface.update(&props()).unwrap();
        let mut p = props();
        p.segments.pop();
        let after = surface.update(&p).unwrap();
        assert_eq!(after.geometry_generation, before.geometry_generation);
        assert!(after.texture_generation > before.texture_generation);
        assert_eq!(after.materials[0].width(), 200);
    }

    #[test]
    fn curved_floor_uses_one_material_per_selection() {
        let mut surface = FloorSurface::default();
        let draw = surface.update(&props()).unwrap();
        assert!(draw.shape.curved);
        assert_eq!(draw.materials.len(), 1);
        assert!(!draw.materials[0].is_mirrored());
        let base_pixels = Arc::clone(&draw.materials[0].image);

        let draw = surface.update(&FloorProps { selected: true, ..props() }).unwrap();
        assert!(!Arc::ptr_eq(&base_pixels, &draw.materials[0].image));
    }

    #[test]
    fn box_fallback_mirrors_x_faces() {
        let mut surface = FloorSurface::default();
        let p = FloorProps { curve: CurveSpec::default(), ..props() };
        let draw = surface.update(&p).unwrap();
        assert!(!draw.shape.curved);
        assert_eq!(draw.shape.mesh.groups.len(), 6);
        let mirrored: Vec<bool> = draw.materials.iter().map(|t| t.is_mirrored()).collect();
        assert_eq!(mirrored, vec![true, true, false, false, false, false]);
        // a box has exactly its 12 edges outlined
        assert_eq!(draw.shape.edges.len(), 12);
    }

    #[test]
    fn edge_style_and_shadows_follow_selection() {
        let mut surface = FloorSurface::default();
        let draw = surface.update(&props()).unwrap();
        assert_eq!(draw.edge_style, EdgeStyle { color: EDGE_COLOR, width: 1.0 });
        assert!(draw.casts_shadow && draw.receives_shadow);

        let draw = surface.update(&FloorProps { selected: true, ..props() }).unwrap();
        assert_eq!(draw.edge_style.color.to_hex(), "#16A4C0");
        assert!(draw.edge_style.width > 1.0);
    }

    #[test]
    fn pointer_events_forwarded_unmodified() {
        let seen: Arc<Mutex<Vec<(&'static str, PointerEvent)>>> = Arc::default();
        let hook = |name: &'static str| -> PointerCallback {
            let seen = Arc::clone(&seen);
            Box::new(move |e: &PointerEvent| seen.lock().unwrap().push((name, *e)))
        };
        let mut surface = FloorSurface::new(PointerHandlers {
            on_click: Some(hook("click")),
            on_pointer_over: Some(hook("over")),
            on_pointer_out: Some(hook("out")),
        });

        let hit = PointerEvent { client_x: 12.0, client_y: 40.0, point: Some(Vec3::new(0.1, 0.5, 0.2)) };
        let miss = PointerEvent { point: None, ..hit };
        surface.pointer_over(&hit);
        surface.click(&hit);
        surface.pointer_out(&miss);

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![("over", hit), ("click", hit), ("out", miss)]);
    }

    #[test]
    fn missing_handlers_are_ignored() {
        let mut surface = FloorSurface::default();
        let e = PointerEvent { client_x: 0.0, client_y: 0.0, point: None };
        surface.click(&e);
        surface.pointer_over(&e);
        surface.pointer_out(&e);
    }
}
