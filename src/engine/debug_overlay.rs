use bevy_ecs::prelude::*;
use egui::epaint::Shadow;

use super::components::Floor;
use super::geometry::{CurveSide, CurveSpec};
use super::renderer::OverlayPass;
use super::rig::Rig;

pub struct HudStats {
    pub fps: u32,
    pub frame_time_avg_ms: f32,
    pub frame_time_min_ms: f32,
    pub frame_time_max_ms: f32,
    pub floor_count: usize,
    pub draw_calls: u32,
    pub resolution: (u32, u32),
    pub camera_target: (f32, f32),
    pub camera_distance: f32,
    /// Rig angle in degrees, wrapped to [0, 360) for display only.
    pub rig_degrees: f32,
    pub dragging: bool,
    pub hovered: bool,
    pub selected: usize,
}

/// Scene controls edited through the HUD. `dirty` is set when the user
/// changed something and cleared by `apply`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HudControls {
    pub auto_rotate: bool,
    pub curve: CurveSpec,
    pub dirty: bool,
}

impl HudControls {
    pub fn new(auto_rotate: bool, curve: CurveSpec) -> Self {
        Self { auto_rotate, curve, dirty: false }
    }

    /// Push pending edits into every rig and floor.
    pub fn apply(&mut self, world: &mut World) {
        if !self.dirty {
            return;
        }
        self.dirty = false;

        let mut rigs = world.query::<&mut Rig>();
        for mut rig in rigs.iter_mut(world) {
            rig.auto_rotate = self.auto_rotate;
        }
        let mut floors = world.query::<&mut Floor>();
        for mut floor in floors.iter_mut(world) {
            floor.props.curve = self.curve;
        }
        log::info!(
            "controls: auto-rotate {}, curve {} {:.2}",
            self.auto_rotate,
            self.curve.side.label(),
            self.curve.amount
        );
    }
}

pub struct DebugOverlay {
    pub visible: bool,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl DebugOverlay {
    pub fn new(
        window: &winit::window::Window,
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let egui_ctx = egui::Context::default();

        // Style: dark, semi-transparent, small monospace white font
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill = egui::Color32::from_rgba_premultiplied(0, 0, 0, 180);
        visuals.window_stroke = egui::Stroke::NONE;
        visuals.window_shadow = Shadow::NONE;
        visuals.override_text_color = Some(egui::Color32::WHITE);
        egui_ctx.set_visuals(visuals);

        let mut style = (*egui_ctx.style()).clone();
        style.override_font_id = Some(egui::FontId::monospace(13.0));
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(
            device,
            surface_format,
            None,  // no depth
            1,     // msaa samples
            false, // no dithering
        );

        Self {
            visible: true,
            egui_ctx,
            egui_state,
            egui_renderer,
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    pub fn handle_window_event(
        &mut self,
        window: &winit::window::Window,
        event: &winit::event::WindowEvent,
    ) -> egui_winit::EventResponse {
        self.egui_state.on_window_event(window, event)
    }

    /// True while the pointer is over a HUD panel; scene picking and camera
    /// drags should ignore the cursor then.
    pub fn wants_pointer(&self) -> bool {
        self.visible && self.egui_ctx.is_pointer_over_area()
    }

    /// Render one egui frame: the stats panel and the scene controls.
    /// Both are skipped while the overlay is hidden (F3).
    pub fn render(
        &mut self,
        pass: OverlayPass<'_>,
        window: &winit::window::Window,
        stats: &HudStats,
        controls: &mut HudControls,
    ) {
        let raw_input = self.egui_state.take_egui_input(window);
        let visible = self.visible;

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            if !visible {
                return;
            }

            // ── Stats panel ──────────────────────────────────────────────────
            egui::Area::new(egui::Id::new("debug_overlay"))
                .fixed_pos(egui::pos2(10.0, 10.0))
                .show(ctx, |ui| {
                    egui::Frame::none()
                        .fill(egui::Color32::from_rgba_premultiplied(0, 0, 0, 180))
                        .inner_margin(egui::Margin::same(8.0))
                        .rounding(4.0)
                        .show(ui, |ui: &mut egui::Ui| {
                            ui.label(format!("FPS: {}", stats.fps));
                            ui.label(format!(
                                "Frame: {:.2} ms (min: {:.1} | max: {:.1})",
                                stats.frame_time_avg_ms,
                                stats.frame_time_min_ms,
                                stats.frame_time_max_ms
                            ));
                            ui.label(format!("Floors: {}", stats.floor_count));
                            ui.label(format!("Draw calls: {}", stats.draw_calls));
                            ui.label(format!(
                                "Resolution: {} x {}",
                                stats.resolution.0, stats.resolution.1
                            ));
                            ui.label(format!(
                                "Camera: ({:.1}, {:.1})  dist {:.1}",
                                stats.camera_target.0, stats.camera_target.1, stats.camera_distance
                            ));
                            ui.label(format!(
                                "Rig: {:.1}°{}",
                                stats.rig_degrees,
                                if stats.dragging { "  (dragging)" } else { "" }
                            ));
                            ui.label(format!(
                                "Hover: {}  Selected: {}",
                                if stats.hovered { "yes" } else { "no" },
                                stats.selected
                            ));
                        });
                });

            // ── Scene controls ───────────────────────────────────────────────
            egui::Window::new("Scene")
                .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-10.0, 10.0))
                .resizable(false)
                .collapsible(true)
                .show(ctx, |ui| {
                    let mut changed = ui.checkbox(&mut controls.auto_rotate, "Auto-rotate").changed();

                    egui::ComboBox::from_label("Curved side")
                        .selected_text(controls.curve.side.label())
                        .show_ui(ui, |ui| {
                            for side in CurveSide::ALL {
                                changed |= ui
                                    .selectable_value(&mut controls.curve.side, side, side.label())
                                    .changed();
                            }
                        });

                    changed |= ui
                        .add_enabled(
                            controls.curve.side != CurveSide::None,
                            egui::Slider::new(&mut controls.curve.amount, -1.0..=1.0).text("Curve amount"),
                        )
                        .changed();

                    controls.dirty |= changed;
                });
        });

        self.egui_state
            .handle_platform_output(window, full_output.platform_output);

        let tris = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(pass.device, pass.queue, *id, image_delta);
        }

        self.egui_renderer
            .update_buffers(pass.device, pass.queue, pass.encoder, &tris, pass.screen);

        {
            let render_pass = pass.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: pass.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            self.egui_renderer
                .render(&mut render_pass.forget_lifetime(), &tris, pass.screen);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geometry::Dimensions;
    use crate::engine::surface::FloorProps;

    #[test]
    fn apply_pushes_edits_once() {
        let mut world = World::new();
        let rig = world.spawn(Rig::new(false)).id();
        let floor = world
            .spawn(Floor {
                props: FloorProps {
                    dims: Dimensions::new(3.0, 1.0, 3.0),
                    segments: Vec::new(),
                    selected: false,
                    curve: CurveSpec::default(),
                },
            })
            .id();

        let curve = CurveSpec { side: CurveSide::Right, amount: -0.4 };
        let mut controls = HudControls::new(true, curve);

        // nothing pending yet
        controls.apply(&mut world);
        assert!(!world.get::<Rig>(rig).unwrap().auto_rotate);

        controls.dirty = true;
        controls.apply(&mut world);
        assert!(!controls.dirty);
        assert!(world.get::<Rig>(rig).unwrap().auto_rotate);
        assert_eq!(world.get::<Floor>(floor).unwrap().props.curve, curve);
    }
}
