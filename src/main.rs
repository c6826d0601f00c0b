// Interactive floor plate viewer
// One rotating rig holding a textured floor slab; click to select, drag to spin

mod engine;

use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Instant;

use anyhow::Context;
use bevy_ecs::prelude::*;
use clap::Parser;
use winit::{
    event::{ElementState, Event as WinitEvent, KeyEvent, MouseButton, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorIcon, Window},
};

use engine::camera::ViewCamera;
use engine::config::SceneConfig;
use engine::debug_overlay::{DebugOverlay, HudControls, HudStats};
use engine::geometry::GeometryError;
use engine::input::InputState;
use engine::interaction::{self, PointerFrame, PointerTracker};
use engine::lights::Lights;
use engine::renderer::{FrameReport, RenderError, Renderer};
use engine::rig::Rig;
use engine::surface::{FloorSurface, PointerCallback, PointerEvent, PointerHandlers};
use engine::systems;
use engine::{Floor, FloorDraw, FrameTime, GlobalTransform, Hovered, RigMember, Transform};

#[derive(Parser, Debug)]
#[command(version, about = "Interactive 3D floor plate viewer")]
struct Args {
    /// JSON scene description; the reference scene is used when omitted
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Start with auto-rotation on, whatever the scene file says
    #[arg(long)]
    auto_rotate: bool,
}

/// Emitted by floor pointer hooks, drained by the host once per frame.
#[derive(Debug, Clone, Copy)]
enum SceneEvent {
    Clicked(Entity),
    PointerOver,
    PointerOut,
}

// ============================================================================
// FRAME TIMING
// ============================================================================

/// Frame time samples over the last second, for the HUD.
struct FrameTimer {
    window_start: Instant,
    samples: Vec<f32>,
    fps: u32,
    avg_ms: f32,
    min_ms: f32,
    max_ms: f32,
}

impl FrameTimer {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            samples: Vec::new(),
            fps: 0,
            avg_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
        }
    }

    fn record(&mut self, dt: f32) {
        self.samples.push(dt * 1000.0);
        if self.window_start.elapsed().as_secs_f32() < 1.0 {
            return;
        }
        self.fps = self.samples.len() as u32;
        self.avg_ms = self.samples.iter().sum::<f32>() / self.samples.len() as f32;
        self.min_ms = self.samples.iter().copied().fold(f32::INFINITY, f32::min);
        self.max_ms = self.samples.iter().copied().fold(0.0, f32::max);
        self.samples.clear();
        self.window_start = Instant::now();
    }
}

// ============================================================================
// APPLICATION STATE
// ============================================================================

struct State {
    window: Arc<Window>,
    renderer: Renderer,
    overlay: DebugOverlay,

    // ECS World
    world: World,
    schedule: Schedule,
    events: mpsc::Receiver<SceneEvent>,

    camera: ViewCamera,
    input: InputState,
    controls: HudControls,

    last_update: Instant,
    timer: FrameTimer,
    last_report: FrameReport,
}

impl State {
    async fn new(window: Arc<Window>, config: &SceneConfig, auto_rotate: bool) -> Result<Self, RenderError> {
        let renderer = Renderer::new(window.clone(), Lights::default()).await?;
        let overlay = DebugOverlay::new(&window, renderer.device(), renderer.surface_format());

        let (sender, events) = mpsc::channel();
        let mut world = World::new();
        spawn_scene(&mut world, config, auto_rotate, &sender);

        let mut input = InputState::new();
        input.window_size = renderer.size();

        Ok(Self {
            window,
            renderer,
            overlay,
            world,
            schedule: systems::build_schedule(),
            events,
            camera: ViewCamera::new(),
            input,
            controls: HudControls::new(auto_rotate, config.curve),
            last_update: Instant::now(),
            timer: FrameTimer::new(),
            last_report: FrameReport::default(),
        })
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        self.renderer.resize(new_size.width, new_size.height);
    }

    fn update(&mut self) -> Result<(), GeometryError> {
        let now = Instant::now();
        let dt = (now - self.last_update).as_secs_f32();
        self.last_update = now;
        self.timer.record(dt);

        self.world.resource_mut::<FrameTime>().delta = dt;

        let hud_has_pointer = self.overlay.wants_pointer();
        if !hud_has_pointer {
            self.camera.update(&self.input, dt);
        }
        self.controls.apply(&mut self.world);

        // Pointer → hover, drag and click dispatch
        let (client_x, client_y) = self.input.mouse_position;
        if self.input.cursor_left {
            interaction::pointer_left_window(&mut self.world, client_x, client_y);
        } else if self.input.cursor_inside {
            let frame = PointerFrame {
                client_x,
                client_y,
                ray: (!hud_has_pointer)
                    .then(|| self.camera.ray_from_screen(self.input.mouse_position, self.input.window_size)),
                pressed: self.input.was_pressed(MouseButton::Left),
                released: self.input.was_released(MouseButton::Left),
            };
            let outcome = interaction::dispatch_pointer(&mut self.world, &frame);
            if outcome.clicked_empty {
                interaction::apply_selection(&mut self.world, None);
            }
        }

        self.schedule.run(&mut self.world);

        while let Ok(event) = self.events.try_recv() {
            match event {
                SceneEvent::Clicked(floor) => interaction::apply_selection(&mut self.world, Some(floor)),
                SceneEvent::PointerOver => self.window.set_cursor(CursorIcon::Pointer),
                SceneEvent::PointerOut => self.window.set_cursor(CursorIcon::Default),
            }
        }

        systems::refresh_surfaces(&mut self.world)
    }

    fn hud_stats(&mut self) -> HudStats {
        let (rig_degrees, dragging) = self
            .world
            .query::<&Rig>()
            .iter(&self.world)
            .next()
            .map_or((0.0, false), |rig| (rig.rotation.to_degrees().rem_euclid(360.0), rig.is_dragging()));
        let hovered = self.world.query::<&Hovered>().iter(&self.world).next().is_some();
        let selected = self
            .world
            .query::<&Floor>()
            .iter(&self.world)
            .filter(|floor| floor.props.selected)
            .count();
        let target = self.camera.target();

        HudStats {
            fps: self.timer.fps,
            frame_time_avg_ms: self.timer.avg_ms,
            frame_time_min_ms: self.timer.min_ms,
            frame_time_max_ms: self.timer.max_ms,
            floor_count: self.last_report.floors,
            draw_calls: self.last_report.draw_calls,
            resolution: self.renderer.size(),
            camera_target: (target.x, target.y),
            camera_distance: self.camera.distance(),
            rig_degrees,
            dragging,
            hovered,
            selected,
        }
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let stats = self.hud_stats();
        let overlay = &mut self.overlay;
        let controls = &mut self.controls;
        let window = &self.window;

        self.last_report = self.renderer.render(&mut self.world, &self.camera, |pass| {
            overlay.render(pass, window, &stats, controls);
        })?;
        Ok(())
    }
}

// ============================================================================
// SCENE SPAWNING
// ============================================================================

fn floor_handlers(floor: Entity, events: &mpsc::Sender<SceneEvent>) -> PointerHandlers {
    let forward = |event: SceneEvent| -> Option<PointerCallback> {
        let events = events.clone();
        Some(Box::new(move |_: &PointerEvent| {
            events.send(event).ok();
        }))
    };
    PointerHandlers {
        on_click: forward(SceneEvent::Clicked(floor)),
        on_pointer_over: forward(SceneEvent::PointerOver),
        on_pointer_out: forward(SceneEvent::PointerOut),
    }
}

fn spawn_scene(world: &mut World, config: &SceneConfig, auto_rotate: bool, events: &mpsc::Sender<SceneEvent>) {
    world.insert_resource(FrameTime::default());
    world.insert_resource(PointerTracker::default());

    let rig = world
        .spawn((
            Rig::new(auto_rotate),
            Transform::from_position(config.rig_position()),
            GlobalTransform::default(),
        ))
        .id();

    let floor = world
        .spawn((
            Floor { props: config.to_props() },
            FloorDraw::default(),
            Transform::default(),
            GlobalTransform::default(),
            RigMember { rig },
        ))
        .id();
    world.entity_mut(floor).insert(FloorSurface::new(floor_handlers(floor, events)));

    log::info!(
        "spawned floor {:?} ({} segments, curve {} {:.2}, auto-rotate {})",
        config.dims,
        config.segments.len(),
        config.curve.side.label(),
        config.curve.amount,
        auto_rotate
    );
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.scene {
        Some(path) => SceneConfig::load(path)
            .with_context(|| format!("loading scene {}", path.display()))?,
        None => SceneConfig::default(),
    };
    let auto_rotate = args.auto_rotate || config.auto_rotate;

    let event_loop = EventLoop::new()?;

    let window_attributes = Window::default_attributes()
        .with_title("Floor Plate")
        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

    let window = Arc::new(event_loop.create_window(window_attributes)?);

    let mut state = pollster::block_on(State::new(window.clone(), &config, auto_rotate))
        .context("initializing renderer")?;

    event_loop.run(move |event, control_flow| {
        match event {
            WinitEvent::WindowEvent {
                ref event,
                window_id,
            } if window_id == window.id() => {
                // egui sees every event; the HUD gates the scene via wants_pointer()
                let _ = state.overlay.handle_window_event(&window, event);
                state.input.process_event(event);

                match event {
                    WindowEvent::CloseRequested
                    | WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                state: ElementState::Pressed,
                                physical_key: PhysicalKey::Code(KeyCode::Escape),
                                ..
                            },
                        ..
                    } => control_flow.exit(),
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                state: ElementState::Pressed,
                                physical_key: PhysicalKey::Code(KeyCode::F3),
                                repeat: false,
                                ..
                            },
                        ..
                    } => state.overlay.toggle(),
                    WindowEvent::Resized(physical_size) => {
                        state.resize(*physical_size);
                    }
                    WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                        state.renderer.set_scale_factor(*scale_factor as f32);
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(e) = state.update() {
                            log::error!("floor geometry failed: {e}");
                            control_flow.exit();
                            return;
                        }
                        match state.render() {
                            Ok(_) => {}
                            Err(wgpu::SurfaceError::Lost) => state.renderer.reconfigure(),
                            Err(wgpu::SurfaceError::OutOfMemory) => {
                                log::error!("GPU out of memory");
                                control_flow.exit();
                            }
                            Err(e) => log::warn!("{:?}", e),
                        }
                        state.input.end_frame();
                    }
                    _ => {}
                }
            }
            WinitEvent::AboutToWait => {
                window.request_redraw();
            }
            _ => {}
        }
    })?;

    Ok(())
}
