//! wgpu render backend
//!
//! The production [`RenderBackend`]: owns the surface, device, and
//! queue, keeps one GPU mesh per shape, materializes pooled render
//! targets as textures, and draws submissions with a single forward
//! pass. In offscreen mode presents land in a texture an embedding
//! editor can sample instead of the surface.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::backend::{BackendError, DrawCall, RenderBackend};
use super::graph::Eye;
use super::mesh::{Mesh, Vertex};
use super::target::{TargetDesc, TargetFormat, TargetId, TargetSize};
use crate::ecs::Shape;

/// Where presented frames go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Blit to the window surface
    Surface,
    /// Keep the presented target as an offscreen texture for a host
    /// viewport
    Offscreen,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GlobalsUniform {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ModelUniform {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
}

impl ModelUniform {
    fn from_transform(model: Mat4) -> Self {
        let normal_matrix = model.inverse().transpose();
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: normal_matrix.to_cols_array_2d(),
        }
    }
}

struct TargetResources {
    desc: TargetDesc,
    color_view: wgpu::TextureView,
    /// Kept alive alongside its view
    _color_texture: wgpu::Texture,
    depth_view: Option<wgpu::TextureView>,
}

/// wgpu-backed renderer.
pub struct WgpuRenderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: (u32, u32),
    shader: wgpu::ShaderModule,
    draw_pipeline_layout: wgpu::PipelineLayout,
    draw_pipelines: FxHashMap<(TargetFormat, bool), wgpu::RenderPipeline>,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    model_bind_group_layout: wgpu::BindGroupLayout,
    blit_pipeline: wgpu::RenderPipeline,
    blit_bind_group_layout: wgpu::BindGroupLayout,
    blit_sampler: wgpu::Sampler,
    meshes: FxHashMap<Shape, Mesh>,
    targets: FxHashMap<TargetId, TargetResources>,
    output_mode: OutputMode,
    last_presented: Option<TargetId>,
    /// Clear color for the frame's first pass into a target
    pub clear_color: wgpu::Color,
}

impl WgpuRenderer {
    /// Create a renderer on `window`.
    ///
    /// # Errors
    ///
    /// Any backend initialization failure; the engine treats this as
    /// fatal at startup.
    pub async fn new(
        window: Arc<Window>,
        vsync: bool,
        output_mode: OutputMode,
    ) -> Result<Self, BackendError> {
        let size = window.inner_size();
        let size = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| BackendError(format!("failed to create surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError("no compatible GPU adapter".to_string()))?;

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Engine Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError(format!("failed to create device: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.0,
            height: size.1,
            present_mode,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Forward Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let globals_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Globals Buffer"),
            contents: bytemuck::cast_slice(&[GlobalsUniform {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let globals_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Globals Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Globals Bind Group"),
            layout: &globals_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let model_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Model Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let draw_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Draw Pipeline Layout"),
            bind_group_layouts: &[&globals_bind_group_layout, &model_bind_group_layout],
            push_constant_ranges: &[],
        });

        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("blit.wgsl").into()),
        });

        let blit_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Blit Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let blit_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&blit_bind_group_layout],
            push_constant_ranges: &[],
        });

        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blit Pipeline"),
            layout: Some(&blit_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let blit_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blit Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            shader,
            draw_pipeline_layout,
            draw_pipelines: FxHashMap::default(),
            globals_buffer,
            globals_bind_group,
            model_bind_group_layout,
            blit_pipeline,
            blit_bind_group_layout,
            blit_sampler,
            meshes: FxHashMap::default(),
            targets: FxHashMap::default(),
            output_mode,
            last_presented: None,
            clear_color: wgpu::Color {
                r: 0.1,
                g: 0.1,
                b: 0.1,
                a: 1.0,
            },
        })
    }

    /// Texture view of the most recently presented offscreen frame.
    ///
    /// What an embedding editor samples for its viewport panel.
    #[must_use]
    pub fn offscreen_view(&self) -> Option<&wgpu::TextureView> {
        let id = self.last_presented?;
        self.targets.get(&id).map(|t| &t.color_view)
    }

    fn texture_format(format: TargetFormat) -> wgpu::TextureFormat {
        match format {
            TargetFormat::Bgra8 => wgpu::TextureFormat::Bgra8UnormSrgb,
            TargetFormat::Hdr => wgpu::TextureFormat::Rgba16Float,
        }
    }

    fn target_extent(&self, size: TargetSize) -> (u32, u32) {
        match size {
            TargetSize::Backbuffer => self.size,
            TargetSize::Fixed { width, height } => (width.max(1), height.max(1)),
        }
    }

    fn build_target(&self, desc: &TargetDesc) -> TargetResources {
        let (width, height) = self.target_extent(desc.size);
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let color_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Pooled Color Target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::texture_format(desc.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_view = desc.depth.then(|| {
            self.device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("Pooled Depth Target"),
                    size: extent,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Depth32Float,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });

        TargetResources {
            desc: *desc,
            color_view,
            _color_texture: color_texture,
            depth_view,
        }
    }

    fn ensure_draw_pipeline(&mut self, format: TargetFormat, depth: bool) {
        if self.draw_pipelines.contains_key(&(format, depth)) {
            return;
        }
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Draw Pipeline"),
                layout: Some(&self.draw_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: Self::texture_format(format),
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: depth.then(|| wgpu::DepthStencilState {
                    format: wgpu::TextureFormat::Depth32Float,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        self.draw_pipelines.insert((format, depth), pipeline);
    }

    fn ensure_mesh(&mut self, shape: Shape) {
        if self.meshes.contains_key(&shape) {
            return;
        }
        let mut mesh = Mesh::from_shape(shape);
        mesh.vertex_buffer = Some(self.device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("Vertex Buffer"),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            },
        ));
        mesh.index_buffer = Some(self.device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("Index Buffer"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            },
        ));
        self.meshes.insert(shape, mesh);
    }
}

impl RenderBackend for WgpuRenderer {
    fn create_target(&mut self, id: TargetId, desc: &TargetDesc) -> Result<(), BackendError> {
        let resources = self.build_target(desc);
        self.targets.insert(id, resources);
        Ok(())
    }

    fn dispose_target(&mut self, id: TargetId) {
        self.targets.remove(&id);
    }

    fn submit(
        &mut self,
        target: TargetId,
        eye: &Eye,
        calls: &[DrawCall],
    ) -> Result<(), BackendError> {
        if !self.targets.contains_key(&target) {
            return Err(BackendError(format!("unknown target {target:?}")));
        }

        // Mutating setup before the pass takes its borrows.
        let desc = self.targets[&target].desc;
        self.ensure_draw_pipeline(desc.format, desc.depth);
        for call in calls {
            self.ensure_mesh(call.shape);
        }

        self.queue.write_buffer(
            &self.globals_buffer,
            0,
            bytemuck::cast_slice(&[GlobalsUniform {
                view_proj: (eye.proj * eye.view).to_cols_array_2d(),
            }]),
        );

        let resources = &self.targets[&target];
        let pipeline = &self.draw_pipelines[&(desc.format, desc.depth)];

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Submit Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Forward Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &resources.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: resources.depth_view.as_ref().map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.globals_bind_group, &[]);

            for call in calls {
                let mesh = &self.meshes[&call.shape];
                let (Some(vertex_buffer), Some(index_buffer)) =
                    (mesh.vertex_buffer.as_ref(), mesh.index_buffer.as_ref())
                else {
                    continue;
                };

                let uniform = ModelUniform::from_transform(call.transform);
                let model_buffer =
                    self.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("Model Buffer"),
                            contents: bytemuck::cast_slice(&[uniform]),
                            usage: wgpu::BufferUsages::UNIFORM,
                        });
                let model_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Model Bind Group"),
                    layout: &self.model_bind_group_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: model_buffer.as_entire_binding(),
                    }],
                });

                pass.set_bind_group(1, &model_bind_group, &[]);
                pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count(), 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn present(&mut self, target: TargetId) -> Result<(), BackendError> {
        let Some(resources) = self.targets.get(&target) else {
            return Err(BackendError(format!("unknown target {target:?}")));
        };

        if self.output_mode == OutputMode::Offscreen {
            self.last_presented = Some(target);
            return Ok(());
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Err(BackendError("surface lost, reconfigured".to_string()));
            }
            Err(e) => return Err(BackendError(format!("surface error: {e}"))),
        };
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let blit_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Bind Group"),
            layout: &self.blit_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&resources.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.blit_sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Present Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.blit_pipeline);
            pass.set_bind_group(0, &blit_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.last_presented = Some(target);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        // Backbuffer-sized targets track the surface.
        let stale: Vec<TargetId> = self
            .targets
            .iter()
            .filter(|(_, t)| t.desc.size == TargetSize::Backbuffer)
            .map(|(&id, _)| id)
            .collect();
        for id in stale {
            let desc = self.targets[&id].desc;
            let rebuilt = self.build_target(&desc);
            self.targets.insert(id, rebuilt);
        }

        log::debug!("Resized to {width}x{height}");
    }
}

impl std::fmt::Debug for WgpuRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuRenderer")
            .field("size", &self.size)
            .field("targets", &self.targets.len())
            .field("meshes", &self.meshes.len())
            .field("output_mode", &self.output_mode)
            .finish()
    }
}
