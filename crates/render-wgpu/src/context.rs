use std::sync::Arc;

use splitcube_math::Matrix4;
use splitcube_render::gpu::{
    AttributeLocation, BufferTarget, BufferUsage, ClearState, ComponentType, IndexFormat,
    ProgramInterface, ShaderStage, Topology, UniformLocation, VertexLayout,
};
use splitcube_render::{GpuContext, GpuError, SurfaceSize};
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub(crate) fn request_device(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue), GpuError> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface,
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| {
        GpuError::NoAdapter("no adapter matched the request".into())
    })?;

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("splitcube_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
        },
        None,
    ))
    .map_err(|e| GpuError::Device(e.to_string()))?;

    device.on_uncaptured_error(Box::new(|e| {
        tracing::error!(error = %e, "uncaptured wgpu error");
    }));
    Ok((adapter, device, queue))
}

/// Where frames end up.
pub(crate) enum Target {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        format: wgpu::TextureFormat,
    },
}

impl Target {
    pub(crate) fn offscreen(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        size: SurfaceSize,
    ) -> Self {
        Self::Offscreen {
            texture: create_color_texture(device, format, size),
            format,
        }
    }

    fn format(&self) -> wgpu::TextureFormat {
        match self {
            Self::Window { config, .. } => config.format,
            Self::Offscreen { format, .. } => *format,
        }
    }

    fn size(&self) -> SurfaceSize {
        match self {
            Self::Window { config, .. } => SurfaceSize::new(config.width, config.height),
            Self::Offscreen { texture, .. } => SurfaceSize::new(texture.width(), texture.height()),
        }
    }

    fn resize(&mut self, device: &wgpu::Device, size: SurfaceSize) {
        match self {
            Self::Window { surface, config } => {
                config.width = size.width.max(1);
                config.height = size.height.max(1);
                surface.configure(device, config);
            }
            Self::Offscreen { texture, format } => {
                *texture = create_color_texture(device, *format, size);
            }
        }
    }
}

fn create_color_texture(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    size: SurfaceSize,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen_color"),
        size: wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

fn create_depth_view(device: &wgpu::Device, size: SurfaceSize) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

fn vertex_format(layout: &VertexLayout) -> Result<wgpu::VertexFormat, String> {
    if layout.normalized {
        return Err("normalized float attributes are not supported".into());
    }
    match (layout.component_type, layout.components) {
        (ComponentType::Float32, 1) => Ok(wgpu::VertexFormat::Float32),
        (ComponentType::Float32, 2) => Ok(wgpu::VertexFormat::Float32x2),
        (ComponentType::Float32, 3) => Ok(wgpu::VertexFormat::Float32x3),
        (ComponentType::Float32, 4) => Ok(wgpu::VertexFormat::Float32x4),
        (_, n) => Err(format!("{n}-component attributes are not supported")),
    }
}

fn buffer_usages(target: BufferTarget, usage: BufferUsage) -> wgpu::BufferUsages {
    let base = match target {
        BufferTarget::Array => wgpu::BufferUsages::VERTEX,
        BufferTarget::ElementArray => wgpu::BufferUsages::INDEX,
    };
    match usage {
        BufferUsage::Static => base,
        BufferUsage::Dynamic => base | wgpu::BufferUsages::COPY_DST,
    }
}

fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
    }
}

fn depth_compare(state: &ClearState) -> wgpu::CompareFunction {
    if state.depth_test {
        wgpu::CompareFunction::LessEqual
    } else {
        wgpu::CompareFunction::Always
    }
}

/// Vertex buffer slot an attribute location is read from.
fn attribute_slot(interface: &ProgramInterface, location: AttributeLocation) -> Option<u32> {
    interface
        .attributes
        .iter()
        .position(|a| a.location == location.0)
        .map(|slot| slot as u32)
}

#[derive(Debug)]
pub struct WgpuShader {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
}

struct ProgramParts {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    interface: ProgramInterface,
}

#[derive(Clone)]
pub struct WgpuProgram(Arc<ProgramParts>);

#[derive(Clone)]
pub struct WgpuBuffer(Arc<wgpu::Buffer>);

/// Bindings collected since the last draw.
#[derive(Default)]
struct PendingFrame {
    clear: bool,
    program: Option<WgpuProgram>,
    vertex_buffers: Vec<(u32, WgpuBuffer)>,
    index_buffer: Option<(WgpuBuffer, wgpu::IndexFormat)>,
    viewport: Option<SurfaceSize>,
}

/// wgpu implementation of [`GpuContext`].
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: Target,
    depth: wgpu::TextureView,
    clear_state: ClearState,
    pending: PendingFrame,
}

impl WgpuContext {
    pub(crate) fn new(device: wgpu::Device, queue: wgpu::Queue, target: Target) -> Self {
        let depth = create_depth_view(&device, target.size());
        Self {
            device,
            queue,
            target,
            depth,
            clear_state: ClearState::default(),
            pending: PendingFrame::default(),
        }
    }

    /// Run `f` inside a validation error scope and report what it caught.
    fn scoped<T>(
        &self,
        filter: wgpu::ErrorFilter,
        f: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, String> {
        self.device.push_error_scope(filter);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(error.to_string()),
            None => Ok(value),
        }
    }

    fn acquire(&mut self) -> Result<(Option<wgpu::SurfaceTexture>, wgpu::TextureView), String> {
        let surface = match &self.target {
            Target::Window { surface, .. } => surface,
            Target::Offscreen { texture, .. } => {
                return Ok((None, texture.create_view(&Default::default())));
            }
        };
        match surface.get_current_texture() {
            Ok(frame) => {
                let view = frame.texture.create_view(&Default::default());
                Ok((Some(frame), view))
            }
            Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                let size = self.target.size();
                self.target.resize(&self.device, size);
                tracing::warn!(error = %e, "surface reconfigured");
                Err(format!("frame skipped: {e}"))
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

impl GpuContext for WgpuContext {
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type Buffer = WgpuBuffer;

    fn set_clear_state(&mut self, state: &ClearState) {
        self.clear_state = *state;
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<WgpuShader, String> {
        let label = format!("{stage}_shader");
        let module = self.scoped(wgpu::ErrorFilter::Validation, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;
        tracing::debug!(%stage, "shader compiled");
        Ok(WgpuShader { stage, module })
    }

    fn link_program(
        &mut self,
        vertex: WgpuShader,
        fragment: WgpuShader,
        interface: &ProgramInterface,
    ) -> Result<WgpuProgram, String> {
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err("program needs one vertex and one fragment stage".into());
        }
        let uniform = interface
            .uniforms
            .first()
            .ok_or("program declares no uniform block")?;

        let attributes = interface
            .attributes
            .iter()
            .map(|a| {
                Ok([wgpu::VertexAttribute {
                    format: vertex_format(&a.layout)?,
                    offset: 0,
                    shader_location: a.location,
                }])
            })
            .collect::<Result<Vec<_>, String>>()?;
        let buffers: Vec<_> = interface
            .attributes
            .iter()
            .zip(&attributes)
            .map(|(a, attrs)| wgpu::VertexBufferLayout {
                array_stride: u64::from(a.layout.byte_stride()),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("u_matrix"),
                contents: bytemuck::bytes_of(&Matrix4::IDENTITY),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("uniform_bind_group_layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: uniform.binding,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: uniform.binding,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let format = self.target.format();
        let depth_compare = depth_compare(&self.clear_state);
        let pipeline = self.scoped(wgpu::ErrorFilter::Validation, |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("cube_pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(interface.vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment.module,
                    entry_point: Some(interface.fragment_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
        })?;
        tracing::debug!("program linked");

        Ok(WgpuProgram(Arc::new(ProgramParts {
            pipeline,
            bind_group,
            uniform_buffer,
            interface: *interface,
        })))
    }

    fn attribute_location(&self, program: &WgpuProgram, name: &str) -> Option<AttributeLocation> {
        program
            .0
            .interface
            .attribute(name)
            .map(|a| AttributeLocation(a.location))
    }

    fn uniform_location(&self, program: &WgpuProgram, name: &str) -> Option<UniformLocation> {
        program
            .0
            .interface
            .uniform(name)
            .map(|u| UniformLocation(u.binding))
    }

    fn create_buffer(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<WgpuBuffer, String> {
        if data.is_empty() {
            return Err("refusing to allocate an empty buffer".into());
        }
        let buffer = self.scoped(wgpu::ErrorFilter::OutOfMemory, |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(match target {
                    BufferTarget::Array => "vertex_buffer",
                    BufferTarget::ElementArray => "index_buffer",
                }),
                contents: data,
                usage: buffer_usages(target, usage),
            })
        })?;
        Ok(WgpuBuffer(Arc::new(buffer)))
    }

    fn clear(&mut self) {
        self.pending.clear = true;
    }

    fn set_viewport(&mut self, size: SurfaceSize) {
        let size = SurfaceSize::new(size.width.max(1), size.height.max(1));
        if size != self.target.size() {
            tracing::debug!(
                width = size.width,
                height = size.height,
                "resizing render target"
            );
            self.target.resize(&self.device, size);
            self.depth = create_depth_view(&self.device, size);
        }
        self.pending.viewport = Some(size);
    }

    fn use_program(&mut self, program: &WgpuProgram) {
        self.pending.program = Some(program.clone());
        self.pending.vertex_buffers.clear();
    }

    fn bind_vertex_attribute(
        &mut self,
        location: AttributeLocation,
        buffer: &WgpuBuffer,
        layout: VertexLayout,
    ) {
        let Some(program) = &self.pending.program else {
            tracing::warn!(
                location = location.0,
                "attribute bound with no program in use"
            );
            return;
        };
        let Some(slot) = attribute_slot(&program.0.interface, location) else {
            tracing::warn!(location = location.0, "program has no such attribute");
            return;
        };
        if program.0.interface.attributes[slot as usize].layout != layout {
            tracing::warn!(
                location = location.0,
                "attribute layout differs from the linked one"
            );
        }
        self.pending.vertex_buffers.retain(|(s, _)| *s != slot);
        self.pending.vertex_buffers.push((slot, buffer.clone()));
    }

    fn set_uniform_matrix(&mut self, location: UniformLocation, matrix: &Matrix4) {
        let Some(program) = &self.pending.program else {
            tracing::warn!(location = location.0, "uniform set with no program in use");
            return;
        };
        let uniforms = &program.0.interface.uniforms;
        if !uniforms.iter().any(|u| u.binding == location.0) {
            tracing::warn!(location = location.0, "program has no such uniform");
            return;
        }
        self.queue
            .write_buffer(&program.0.uniform_buffer, 0, bytemuck::bytes_of(matrix));
    }

    fn bind_index_buffer(&mut self, buffer: &WgpuBuffer, format: IndexFormat) {
        self.pending.index_buffer = Some((buffer.clone(), index_format(format)));
    }

    fn draw_indexed(&mut self, topology: Topology, count: u32) -> Result<(), String> {
        let Topology::TriangleList = topology;
        let program = self.pending.program.clone().ok_or("no program in use")?;
        let (index_buffer, format) = self
            .pending
            .index_buffer
            .clone()
            .ok_or("no index buffer bound")?;
        if self.pending.vertex_buffers.len() != program.0.interface.attributes.len() {
            return Err("not every attribute has a buffer bound".into());
        }

        let (frame, view) = self.acquire()?;
        let viewport = self.pending.viewport.unwrap_or_else(|| self.target.size());
        let (color_load, depth_load) = if self.pending.clear {
            let [r, g, b, a] = self.clear_state.color.map(f64::from);
            (
                wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                wgpu::LoadOp::Clear(self.clear_state.clear_depth),
            )
        } else {
            (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("cube_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_viewport(
                0.0,
                0.0,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            pass.set_pipeline(&program.0.pipeline);
            pass.set_bind_group(0, &program.0.bind_group, &[]);
            for (slot, buffer) in &self.pending.vertex_buffers {
                pass.set_vertex_buffer(*slot, buffer.0.slice(..));
            }
            pass.set_index_buffer(index_buffer.0.slice(..), format);
            pass.draw_indexed(0..count, 0, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }
        self.pending.clear = false;
        Ok(())
    }
}
