// wgpu renderer for the floor scene.
//
// Passes per frame:
//   1. shadow : floors into the sun's depth map
//   2. main   : floors, translucent ground, axes, thick outline edges
//   3. overlay: caller-supplied (egui HUD), drawn on top
//
// Floor GPU resources are cached per entity and rebuilt only when the
// surface's geometry or texture generation moves.

use std::collections::HashMap;
use std::sync::Arc;

use bevy_ecs::prelude::*;
use glam::Mat4;
use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::camera::ViewCamera;
use super::components::{FloorDraw, GlobalTransform};
use super::lights::{self, LineVertex, Lights};
use super::mesh::{GpuVertex, MeshGroup, TriMesh};
use super::palette::Color;
use super::surface::SurfaceDraw;
use super::texture::{FloorTexture, TextureSet, UvTransform};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.95, g: 0.96, b: 0.97, a: 1.0 };

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create window surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to acquire GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

// ============================================================================
// UNIFORM DATA
// ============================================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Globals {
    view_proj:       [[f32; 4]; 4],
    light_view_proj: [[f32; 4]; 4],
    light_dir:       [f32; 4],
    light_color:     [f32; 4],
    ambient:         [f32; 4],
    viewport:        [f32; 4],
}

impl Globals {
    fn new(camera: &ViewCamera, lights: &Lights, size: (u32, u32)) -> Self {
        let aspect = size.0 as f32 / size.1.max(1) as f32;
        // Intensities are physical; the Lambert BRDF divides by pi.
        let radiance = |color: Color, intensity: f32| {
            let [r, g, b, _] = color.to_linear();
            let k = intensity / std::f32::consts::PI;
            [r * k, g * k, b * k, 1.0]
        };
        Self {
            view_proj: camera.view_projection(aspect).to_cols_array_2d(),
            light_view_proj: lights.sun.shadow_view_proj().to_cols_array_2d(),
            light_dir: lights.sun.to_light().extend(0.0).to_array(),
            light_color: radiance(lights.sun.color, lights.sun.intensity),
            ambient: radiance(lights.ambient.color, lights.ambient.intensity),
            viewport: [size.0 as f32, size.1 as f32, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ObjectUniform {
    model:        [[f32; 4]; 4],
    base_color:   [f32; 4],
    uv_transform: [f32; 4],
    params:       [f32; 4],
}

impl ObjectUniform {
    fn new(model: Mat4, base_color: [f32; 4], uv: UvTransform, receives_shadow: bool, opacity: f32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            base_color,
            uv_transform: uv.to_array(),
            params: [if receives_shadow { 1.0 } else { 0.0 }, opacity, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct EdgeUniform {
    model:  [[f32; 4]; 4],
    color:  [f32; 4],
    params: [f32; 4],
}

/// One outline segment, drawn as an instanced screen-space quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct EdgeInstance {
    a: [f32; 3],
    b: [f32; 3],
}

impl EdgeInstance {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<EdgeInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ATTRIBUTES,
        }
    }
}

// ============================================================================
// GPU RESOURCES
// ============================================================================

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    groups: Vec<MeshGroup>,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, mesh: &TriMesh, label: &str) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: mesh.vertex_bytes(),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: mesh.index_bytes(),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count() as u32,
            groups: mesh.draw_groups(),
        }
    }
}

/// Object uniform + texture binding for one material slot.
struct Material {
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    /// Which uploaded raster it samples (0 = base, 1 = active).
    slot: usize,
    uv: UvTransform,
}

struct FloorGpu {
    geometry_generation: u64,
    texture_generation: u64,
    mesh: GpuMesh,
    edges: Option<(wgpu::Buffer, u32)>,
    edge_uniform: wgpu::Buffer,
    edge_bind_group: wgpu::BindGroup,
    /// Base and active rasters of the current legend.
    rasters: [wgpu::TextureView; 2],
    materials: Vec<Material>,
    casts_shadow: bool,
}

struct Backdrop {
    ground: GpuMesh,
    ground_material: Material,
    axes: wgpu::Buffer,
    axes_count: u32,
}

/// Target handed to the overlay callback after the scene passes.
pub struct OverlayPass<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub view: &'a wgpu::TextureView,
    pub screen: &'a egui_wgpu::ScreenDescriptor,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameReport {
    pub draw_calls: u32,
    pub floors: usize,
}

// ============================================================================
// RENDERER
// ============================================================================

pub struct Renderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    scale_factor: f32,
    depth_view: wgpu::TextureView,

    lights: Lights,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    shadow_globals_bind_group: wgpu::BindGroup,
    shadow_view: wgpu::TextureView,

    object_layout: wgpu::BindGroupLayout,
    edge_layout: wgpu::BindGroupLayout,
    albedo_sampler: wgpu::Sampler,

    mesh_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    edge_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,

    backdrop: Backdrop,
    floors: HashMap<Entity, FloorGpu>,
}

impl Renderer {
    pub async fn new(window: Arc<winit::window::Window>, lights: Lights) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let scale_factor = window.scale_factor() as f32;

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        log::info!("GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or(RenderError::NoSurfaceFormat)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_view = create_depth_view(&device, config.width, config.height);

        // ── Shadow map ──────────────────────────────────────────────────────
        let shadow_size = lights.sun.shadow.as_ref().map_or(1, |s| s.map_size);
        let shadow_view = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Shadow Map"),
                size: wgpu::Extent3d { width: shadow_size, height: shadow_size, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let albedo_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Albedo Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        // ── Bind group layouts ──────────────────────────────────────────────
        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Globals Buffer"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_entry = |binding: u32, visibility: wgpu::ShaderStages| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let both = wgpu::ShaderStages::VERTEX_FRAGMENT;

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals_bind_group_layout"),
            entries: &[
                uniform_entry(0, both),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        // The shadow pass writes the shadow map, so it binds globals without it.
        let shadow_globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow_globals_bind_group_layout"),
            entries: &[uniform_entry(0, both)],
        });

        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object_bind_group_layout"),
            entries: &[
                uniform_entry(0, both),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let edge_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edge_bind_group_layout"),
            entries: &[uniform_entry(0, both)],
        });

        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals_bind_group"),
            layout: &globals_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: globals_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&shadow_view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&shadow_sampler) },
            ],
        });

        let shadow_globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow_globals_bind_group"),
            layout: &shadow_globals_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: globals_buffer.as_entire_binding() }],
        });

        // ── Pipelines ───────────────────────────────────────────────────────
        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/scene.wgsl").into()),
        });
        let lines_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lines Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/lines.wgsl").into()),
        });

        let mesh_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&globals_layout, &object_layout],
            push_constant_ranges: &[],
        });
        let shadow_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shadow Pipeline Layout"),
            bind_group_layouts: &[&shadow_globals_layout, &object_layout],
            push_constant_ranges: &[],
        });
        let edge_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Edge Pipeline Layout"),
            bind_group_layouts: &[&globals_layout, &edge_layout],
            push_constant_ranges: &[],
        });
        let line_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Line Pipeline Layout"),
            bind_group_layouts: &[&globals_layout],
            push_constant_ranges: &[],
        });

        let color_target = Some(wgpu::ColorTargetState {
            format: config.format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        });
        let depth_state = |write: bool| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: write,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        };
        let primitive = |topology: wgpu::PrimitiveTopology| wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        };

        let mesh_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mesh Pipeline"),
            layout: Some(&mesh_layout),
            vertex: wgpu::VertexState {
                module: &scene_shader,
                entry_point: Some("vs_main"),
                buffers: &[GpuVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &scene_shader,
                entry_point: Some("fs_main"),
                targets: &[color_target.clone()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: primitive(wgpu::PrimitiveTopology::TriangleList),
            depth_stencil: Some(depth_state(true)),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Pipeline"),
            layout: Some(&shadow_layout),
            vertex: wgpu::VertexState {
                module: &scene_shader,
                entry_point: Some("vs_shadow"),
                buffers: &[GpuVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: None,
            primitive: primitive(wgpu::PrimitiveTopology::TriangleList),
            depth_stencil: Some(wgpu::DepthStencilState {
                bias: wgpu::DepthBiasState { constant: 2, slope_scale: 2.0, clamp: 0.0 },
                ..depth_state(true)
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let edge_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Edge Pipeline"),
            layout: Some(&edge_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &lines_shader,
                entry_point: Some("vs_edge"),
                buffers: &[EdgeInstance::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &lines_shader,
                entry_point: Some("fs_edge"),
                targets: &[color_target.clone()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: primitive(wgpu::PrimitiveTopology::TriangleList),
            depth_stencil: Some(depth_state(false)),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let line_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Line Pipeline"),
            layout: Some(&line_layout),
            vertex: wgpu::VertexState {
                module: &lines_shader,
                entry_point: Some("vs_line"),
                buffers: &[LineVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &lines_shader,
                entry_point: Some("fs_line"),
                targets: &[color_target],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: primitive(wgpu::PrimitiveTopology::LineList),
            depth_stencil: Some(depth_state(true)),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // ── Backdrop ────────────────────────────────────────────────────────
        let white = RgbaImage::from_pixel(1, 1, Color::WHITE.to_rgba());
        let white_view = upload_raster(&device, &queue, &white, "White Texture");
        let ground_material = create_material(
            &device,
            &object_layout,
            &albedo_sampler,
            &white_view,
            0,
            UvTransform::IDENTITY,
            "Ground",
        );
        write_ground_uniform(&queue, &ground_material);
        let axes_vertices = lights::axes_lines(lights::AXES_LENGTH);
        let backdrop = Backdrop {
            ground: GpuMesh::upload(&device, &lights::ground_mesh(lights::GROUND_SIZE), "Ground"),
            ground_material,
            axes: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Axes Vertex Buffer"),
                contents: bytemuck::cast_slice(&axes_vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            axes_count: axes_vertices.len() as u32,
        };

        log::info!("renderer ready: {}x{} {:?}", config.width, config.height, config.format);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            scale_factor,
            depth_view,
            lights,
            globals_buffer,
            globals_bind_group,
            shadow_globals_bind_group,
            shadow_view,
            object_layout,
            edge_layout,
            albedo_sampler,
            mesh_pipeline,
            shadow_pipeline,
            edge_pipeline,
            line_pipeline,
            backdrop,
            floors: HashMap::new(),
        })
    }

    pub fn device(&self) -> &wgpu::Device { &self.device }
    pub fn surface_format(&self) -> wgpu::TextureFormat { self.config.format }
    pub fn size(&self) -> (u32, u32) { (self.config.width, self.config.height) }

    pub fn set_scale_factor(&mut self, scale_factor: f32) {
        self.scale_factor = scale_factor;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.depth_view = create_depth_view(&self.device, width, height);
        }
    }

    /// Reconfigure after `SurfaceError::Lost`.
    pub fn reconfigure(&mut self) {
        self.resize(self.config.width, self.config.height);
    }

    // ------------------------------------------------------------------------
    // Floor resource sync
    // ------------------------------------------------------------------------

    fn sync_floors(&mut self, world: &mut World) {
        let mut query = world.query::<(Entity, &FloorDraw, &GlobalTransform)>();
        let mut seen = Vec::new();

        for (entity, draw, global) in query.iter(world) {
            let Some(draw) = &draw.0 else { continue };
            seen.push(entity);

            let stale = self.floors.get(&entity).is_none_or(|gpu| {
                gpu.geometry_generation != draw.geometry_generation
                    || gpu.texture_generation != draw.texture_generation
            });
            if stale {
                log::debug!(
                    "uploading floor {entity:?} (geometry gen {}, texture gen {})",
                    draw.geometry_generation,
                    draw.texture_generation
                );
                let gpu = self.upload_floor(draw);
                self.floors.insert(entity, gpu);
            }

            if let Some(gpu) = self.floors.get_mut(&entity) {
                refresh_materials(
                    &self.device,
                    &self.object_layout,
                    &self.albedo_sampler,
                    gpu,
                    draw,
                );
                write_floor_uniforms(&self.queue, gpu, draw, global.0);
            }
        }

        self.floors.retain(|entity, _| seen.contains(entity));
    }

    fn upload_floor(&self, draw: &SurfaceDraw) -> FloorGpu {
        let mesh = GpuMesh::upload(&self.device, &draw.shape.mesh, "Floor");

        let instances: Vec<EdgeInstance> = draw
            .shape
            .edges
            .iter()
            .map(|[a, b]| EdgeInstance { a: a.to_array(), b: b.to_array() })
            .collect();
        let edges = (!instances.is_empty()).then(|| {
            let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Floor Edge Buffer"),
                contents: bytemuck::cast_slice(&instances),
                usage: wgpu::BufferUsages::VERTEX,
            });
            (buffer, instances.len() as u32)
        });

        let edge_uniform = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Floor Edge Uniform"),
            size: std::mem::size_of::<EdgeUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let edge_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("floor_edge_bind_group"),
            layout: &self.edge_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: edge_uniform.as_entire_binding() }],
        });

        let rasters = [
            upload_raster(&self.device, &self.queue, &draw.textures.base.image, "Floor Base Texture"),
            upload_raster(&self.device, &self.queue, &draw.textures.active.image, "Floor Active Texture"),
        ];

        FloorGpu {
            geometry_generation: draw.geometry_generation,
            texture_generation: draw.texture_generation,
            mesh,
            edges,
            edge_uniform,
            edge_bind_group,
            rasters,
            materials: Vec::new(),
            casts_shadow: draw.casts_shadow,
        }
    }

    // ------------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------------

    /// Draw one frame. `overlay` runs after the scene passes, on the same
    /// encoder and target view.
    pub fn render(
        &mut self,
        world: &mut World,
        camera: &ViewCamera,
        overlay: impl FnOnce(OverlayPass<'_>),
    ) -> Result<FrameReport, wgpu::SurfaceError> {
        self.sync_floors(world);

        let globals = Globals::new(camera, &self.lights, self.size());
        self.queue.write_buffer(&self.globals_buffer, 0, bytemuck::cast_slice(&[globals]));

        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });
        let mut report = FrameReport { floors: self.floors.len(), ..Default::default() };

        // ── Shadow pass ─────────────────────────────────────────────────────
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if self.lights.sun.shadow.is_some() {
                pass.set_pipeline(&self.shadow_pipeline);
                pass.set_bind_group(0, &self.shadow_globals_bind_group, &[]);
                for gpu in self.floors.values().filter(|gpu| gpu.casts_shadow) {
                    let Some(material) = gpu.materials.first() else { continue };
                    pass.set_bind_group(1, &material.bind_group, &[]);
                    pass.set_vertex_buffer(0, gpu.mesh.vertex_buffer.slice(..));
                    pass.set_index_buffer(gpu.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..gpu.mesh.index_count, 0, 0..1);
                    report.draw_calls += 1;
                }
            }
        }

        // ── Main pass ───────────────────────────────────────────────────────
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Main Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            pass.set_pipeline(&self.mesh_pipeline);
            pass.set_bind_group(0, &self.globals_bind_group, &[]);

            // Opaque floors first, then the translucent ground over them.
            for gpu in self.floors.values() {
                pass.set_vertex_buffer(0, gpu.mesh.vertex_buffer.slice(..));
                pass.set_index_buffer(gpu.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                for group in &gpu.mesh.groups {
                    let Some(material) = gpu.materials.get(group.material) else { continue };
                    pass.set_bind_group(1, &material.bind_group, &[]);
                    pass.draw_indexed(group.indices.clone(), 0, 0..1);
                    report.draw_calls += 1;
                }
            }

            let ground = &self.backdrop.ground;
            pass.set_bind_group(1, &self.backdrop.ground_material.bind_group, &[]);
            pass.set_vertex_buffer(0, ground.vertex_buffer.slice(..));
            pass.set_index_buffer(ground.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..ground.index_count, 0, 0..1);
            report.draw_calls += 1;

            pass.set_pipeline(&self.line_pipeline);
            pass.set_vertex_buffer(0, self.backdrop.axes.slice(..));
            pass.draw(0..self.backdrop.axes_count, 0..1);
            report.draw_calls += 1;

            pass.set_pipeline(&self.edge_pipeline);
            for gpu in self.floors.values() {
                let Some((buffer, count)) = &gpu.edges else { continue };
                pass.set_bind_group(1, &gpu.edge_bind_group, &[]);
                pass.set_vertex_buffer(0, buffer.slice(..));
                pass.draw(0..6, 0..*count);
                report.draw_calls += 1;
            }
        }

        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.scale_factor,
        };
        overlay(OverlayPass {
            device: &self.device,
            queue: &self.queue,
            encoder: &mut encoder,
            view: &view,
            screen: &screen,
        });

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(report)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

/// Upload an sRGB raster. Row 0 of the image is the top row of the texture.
fn upload_raster(device: &wgpu::Device, queue: &wgpu::Queue, image: &RgbaImage, label: &str) -> wgpu::TextureView {
    device
        .create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: image.width(),
                    height: image.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            image.as_raw(),
        )
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_material(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    raster: &wgpu::TextureView,
    slot: usize,
    uv: UvTransform,
    label: &str,
) -> Material {
    let uniform = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("{label} Object Uniform")),
        size: std::mem::size_of::<ObjectUniform>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{label} Object Bind Group")),
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: uniform.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(raster) },
            wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(sampler) },
        ],
    });
    Material { uniform, bind_group, slot, uv }
}

/// Which uploaded raster (0 = base, 1 = active) a material samples.
fn raster_slot(set: &TextureSet, texture: &FloorTexture) -> usize {
    if texture.shares_pixels_with(&set.active) { 1 } else { 0 }
}

/// Rebuild material bindings when the selection flips or the slot count changes.
fn refresh_materials(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    gpu: &mut FloorGpu,
    draw: &SurfaceDraw,
) {
    let wanted: Vec<(usize, UvTransform)> = draw
        .materials
        .iter()
        .map(|tex| (raster_slot(&draw.textures, tex), tex.uv))
        .collect();
    let current: Vec<(usize, UvTransform)> = gpu.materials.iter().map(|m| (m.slot, m.uv)).collect();
    if wanted == current {
        return;
    }

    gpu.materials = wanted
        .into_iter()
        .map(|(slot, uv)| create_material(device, layout, sampler, &gpu.rasters[slot], slot, uv, "Floor"))
        .collect();
}

fn write_floor_uniforms(queue: &wgpu::Queue, gpu: &FloorGpu, draw: &SurfaceDraw, model: Mat4) {
    let white = Color::WHITE.to_linear();
    for material in &gpu.materials {
        let uniform = ObjectUniform::new(model, white, material.uv, draw.receives_shadow, 1.0);
        queue.write_buffer(&material.uniform, 0, bytemuck::cast_slice(&[uniform]));
    }

    let edge = EdgeUniform {
        model: model.to_cols_array_2d(),
        color: draw.edge_style.color.to_linear(),
        params: [draw.edge_style.width, 0.0, 0.0, 0.0],
    };
    queue.write_buffer(&gpu.edge_uniform, 0, bytemuck::cast_slice(&[edge]));
}

/// Ground uniforms never change, so they are written once at startup.
fn write_ground_uniform(queue: &wgpu::Queue, material: &Material) {
    let uniform = ObjectUniform::new(
        Mat4::IDENTITY,
        lights::GROUND_COLOR.to_linear(),
        UvTransform::IDENTITY,
        true,
        lights::GROUND_OPACITY,
    );
    queue.write_buffer(&material.uniform, 0, bytemuck::cast_slice(&[uniform]));
}
