//! wgpu implementation of [`GraphicsDevice`].
//!
//! Calls are recorded into passes and encoded in one command buffer when the
//! frame is presented. Binding a different render target, clearing after a
//! draw, or dispatching a compute kernel closes the open pass. Every draw
//! takes a snapshot of the uniform block into a ring buffer and is bound with
//! its own dynamic offset, so uniform writes between draws behave like a
//! single-context API would.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use glam::Vec4;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::device::*;
use crate::pipeline::{
    create_compute_pipeline, create_render_pipeline, create_storage_bind_group_layout,
    create_texture_bind_group_layout, create_uniform_bind_group_layout, PipelineKey, TargetSignature, DEPTH_FORMAT,
    TARGET_COLOR_FORMAT,
};
use crate::texture::rgb_to_rgba;
use crate::uniforms::UniformBlock;

const INITIAL_UNIFORM_SLOTS: u64 = 256;

struct GpuProgram {
    label: String,
    vertex: Option<wgpu::ShaderModule>,
    fragment: Option<wgpu::ShaderModule>,
    samplers: Vec<SamplerSlot>,
    storage: Vec<StorageAccess>,
    sampler_units: HashMap<String, u32>,
    /// Uniform values persist per program, like GL program state.
    uniforms: UniformBlock,
    group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    compute: Option<Rc<wgpu::ComputePipeline>>,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    layout: Option<VertexLayout>,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    kind: TextureKind,
}

struct GpuTarget {
    color: Option<TextureId>,
    depth: Option<TextureId>,
    width: u32,
    height: u32,
}

struct DrawRecord {
    pipeline: Rc<wgpu::RenderPipeline>,
    textures: Rc<wgpu::BindGroup>,
    uniform_offset: u32,
    viewport: Option<Viewport>,
    vertex_buffers: Vec<BufferId>,
    index_buffer: Option<BufferId>,
    count: u32,
    instances: u32,
}

struct PassRecord {
    target: Option<RenderTargetId>,
    clear_color: Option<Vec4>,
    clear_depth: bool,
    draws: Vec<DrawRecord>,
}

struct DispatchRecord {
    pipeline: Rc<wgpu::ComputePipeline>,
    storage: wgpu::BindGroup,
    uniform_offset: u32,
    workgroups: u32,
}

enum FrameItem {
    Pass(PassRecord),
    Dispatch(DispatchRecord),
}

/// Render state set by the state setters.
#[derive(Default)]
struct BoundState {
    program: Option<ProgramId>,
    target: Option<RenderTargetId>,
    viewport: Option<Viewport>,
    blend: BlendMode,
    depth: DepthState,
    cull: CullState,
}

/// GPU backend presenting to a winit window.
pub struct GpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    sample_count: u32,
    msaa_view: Option<wgpu::TextureView>,
    depth_view: wgpu::TextureView,

    uniform_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_stride: u64,
    uniform_slots: u64,
    uniform_staging: Vec<u8>,

    programs: HashMap<ProgramId, GpuProgram>,
    buffers: HashMap<BufferId, GpuBuffer>,
    textures: HashMap<TextureId, GpuTexture>,
    targets: HashMap<RenderTargetId, GpuTarget>,
    pipelines: HashMap<PipelineKey, Rc<wgpu::RenderPipeline>>,
    texture_groups: HashMap<(ProgramId, Vec<TextureId>), Rc<wgpu::BindGroup>>,
    units: HashMap<u32, TextureId>,
    default_2d: TextureId,
    default_cube: TextureId,
    default_depth: TextureId,

    state: BoundState,
    frame: Vec<FrameItem>,
    pass_open: bool,
    next_handle: u64,
    alive: bool,
    error: Option<DeviceError>,
    uncaptured: Arc<Mutex<Vec<String>>>,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32, samples: u32) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: samples,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_msaa_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration, samples: u32) -> Option<wgpu::TextureView> {
    (samples > 1).then(|| {
        device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("MSAA Color"),
                size: wgpu::Extent3d {
                    width: config.width,
                    height: config.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: samples,
                dimension: wgpu::TextureDimension::D2,
                format: config.format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    })
}

fn create_uniform_ring(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    stride: u64,
    slots: u64,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Uniform Ring"),
        size: stride * slots,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Uniform Ring Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(std::mem::size_of::<UniformBlock>() as u64),
            }),
        }],
    });
    (buffer, bind_group)
}

/// Mip chain for an RGBA8 image, level 0 first.
fn mip_chain(width: u32, height: u32, rgba: Vec<u8>) -> Vec<(u32, u32, Vec<u8>)> {
    let mut levels = vec![(width, height, rgba)];
    let Some(base) = image::RgbaImage::from_raw(width, height, levels[0].2.clone()) else {
        return levels;
    };
    let (mut w, mut h) = (width, height);
    while w > 1 || h > 1 {
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        let level = image::imageops::resize(&base, w, h, image::imageops::FilterType::Triangle);
        levels.push((w, h, level.into_raw()));
    }
    levels
}

impl GpuDevice {
    /// Create the device for `window` with `samples`x MSAA on the default framebuffer.
    pub async fn new(window: Arc<Window>, samples: u32, vsync: bool) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("Failed to find suitable GPU adapter"))?;

        log::info!("Using GPU: {:?} ({:?})", adapter.get_info().name, adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Benchmark Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let uncaptured = Arc::new(Mutex::new(Vec::new()));
        let sink = uncaptured.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("wgpu error: {error}");
            if let Ok(mut errors) = sink.lock() {
                errors.push(error.to_string());
            }
        }));

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
            surface_caps
                .present_modes
                .iter()
                .find(|m| matches!(m, wgpu::PresentMode::Immediate | wgpu::PresentMode::Mailbox))
                .copied()
                .unwrap_or(wgpu::PresentMode::AutoNoVsync)
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let format_features = adapter.get_texture_format_features(surface_format);
        let sample_count = if samples > 1 && !format_features.flags.sample_count_supported(samples) {
            log::warn!("{samples}x MSAA is not supported for {surface_format:?}, rendering without it");
            1
        } else {
            samples.max(1)
        };

        let msaa_view = create_msaa_view(&device, &config, sample_count);
        let depth_view = create_depth_view(&device, config.width, config.height, sample_count);

        let uniform_layout = create_uniform_bind_group_layout(&device);
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_stride = align_up(std::mem::size_of::<UniformBlock>() as u64, alignment);
        let (uniform_buffer, uniform_bind_group) =
            create_uniform_ring(&device, &uniform_layout, uniform_stride, INITIAL_UNIFORM_SLOTS);

        let mut gpu = Self {
            surface,
            device,
            queue,
            config,
            sample_count,
            msaa_view,
            depth_view,
            uniform_layout,
            uniform_buffer,
            uniform_bind_group,
            uniform_stride,
            uniform_slots: INITIAL_UNIFORM_SLOTS,
            uniform_staging: Vec::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            targets: HashMap::new(),
            pipelines: HashMap::new(),
            texture_groups: HashMap::new(),
            units: HashMap::new(),
            default_2d: TextureId(0),
            default_cube: TextureId(0),
            default_depth: TextureId(0),
            state: BoundState::default(),
            frame: Vec::new(),
            pass_open: false,
            next_handle: 1,
            alive: true,
            error: None,
            uncaptured,
        };
        gpu.create_default_textures()?;
        log::info!(
            "Surface {}x{} {:?}, {}x MSAA, {:?}",
            gpu.config.width,
            gpu.config.height,
            gpu.config.format,
            gpu.sample_count,
            gpu.config.present_mode
        );
        Ok(gpu)
    }

    fn create_default_textures(&mut self) -> Result<(), DeviceError> {
        let white = vec![255u8; 4];
        let desc = |label: &str, kind| TextureDesc {
            label: label.to_string(),
            kind,
            width: 1,
            height: 1,
            format: PixelFormat::Rgba8,
            mipmaps: false,
            anisotropy: 1,
        };
        self.default_2d = self.create_texture(
            &desc("Default White", TextureKind::D2),
            &TextureData {
                layers: vec![white.clone()],
            },
        )?;
        self.default_cube = self.create_texture(
            &desc("Default Cube", TextureKind::Cube),
            &TextureData {
                layers: vec![white; 6],
            },
        )?;
        self.default_depth = self.create_texture(&desc("Default Depth", TextureKind::Depth), &TextureData::default())?;
        Ok(())
    }

    fn handle(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn fail(&mut self, error: DeviceError) {
        log::debug!("device error: {error}");
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn check_alive(&mut self, call: &'static str) -> bool {
        if !self.alive {
            self.fail(DeviceError::ContextLost(format!("{call} after release_context")));
        }
        self.alive
    }

    fn compile(&self, label: &str, stage: ShaderStage, source: &str) -> Result<wgpu::ShaderModule, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} {stage}")),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(DeviceError::ShaderCompile {
                program: label.to_string(),
                stage,
                message: error.to_string(),
            }),
            None => Ok(module),
        }
    }

    fn target_signature(&self) -> Option<TargetSignature> {
        match self.state.target {
            None => Some(TargetSignature {
                color: Some(self.config.format),
                depth: true,
                samples: self.sample_count,
            }),
            Some(id) => self.targets.get(&id).map(|t| TargetSignature {
                color: t.color.map(|_| TARGET_COLOR_FORMAT),
                depth: t.depth.is_some(),
                samples: 1,
            }),
        }
    }

    fn push_uniform_snapshot(&mut self, program: ProgramId) -> u32 {
        let offset = self.uniform_staging.len() as u64;
        let block = self.programs.get(&program).map(|p| p.uniforms).unwrap_or_default();
        self.uniform_staging.extend_from_slice(bytemuck::bytes_of(&block));
        self.uniform_staging.resize((offset + self.uniform_stride) as usize, 0);
        offset as u32
    }

    fn open_pass(&mut self) -> &mut PassRecord {
        let reuse = self.pass_open
            && matches!(self.frame.last(), Some(FrameItem::Pass(p)) if p.target == self.state.target);
        if !reuse {
            self.frame.push(FrameItem::Pass(PassRecord {
                target: self.state.target,
                clear_color: None,
                clear_depth: false,
                draws: Vec::new(),
            }));
            self.pass_open = true;
        }
        match self.frame.last_mut() {
            Some(FrameItem::Pass(pass)) => pass,
            _ => unreachable!("a pass was just opened"),
        }
    }

    /// Bind group with the textures currently feeding the program's samplers.
    fn texture_group(&mut self, program: ProgramId) -> Option<Rc<wgpu::BindGroup>> {
        let gpu_program = self.programs.get(&program)?;
        let textures: Vec<TextureId> = gpu_program
            .samplers
            .iter()
            .map(|slot| {
                let bound = gpu_program
                    .sampler_units
                    .get(&slot.name)
                    .and_then(|unit| self.units.get(unit))
                    .filter(|id| self.textures.get(id).is_some_and(|t| t.kind == slot.kind))
                    .copied();
                bound.unwrap_or(match slot.kind {
                    TextureKind::D2 => self.default_2d,
                    TextureKind::Cube => self.default_cube,
                    TextureKind::Depth => self.default_depth,
                })
            })
            .collect();

        let key = (program, textures);
        if let Some(group) = self.texture_groups.get(&key) {
            return Some(group.clone());
        }
        let mut entries = Vec::with_capacity(key.1.len() * 2);
        for (i, id) in key.1.iter().enumerate() {
            let texture = self.textures.get(id)?;
            entries.push(wgpu::BindGroupEntry {
                binding: 2 * i as u32,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 * i as u32 + 1,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            });
        }
        let group = Rc::new(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} textures", gpu_program.label)),
            layout: &gpu_program.group_layout,
            entries: &entries,
        }));
        self.texture_groups.insert(key, group.clone());
        Some(group)
    }

    fn pipeline(&mut self, key: PipelineKey) -> Option<Rc<wgpu::RenderPipeline>> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Some(pipeline.clone());
        }
        let program = self.programs.get(&ProgramId(key.program))?;
        let vertex = program.vertex.as_ref()?;
        log::debug!("building pipeline for '{}' ({:?}, {:?})", program.label, key.blend, key.depth);
        let pipeline = Rc::new(create_render_pipeline(
            &self.device,
            &program.label,
            &program.pipeline_layout,
            vertex,
            program.fragment.as_ref(),
            &key,
        ));
        self.pipelines.insert(key, pipeline.clone());
        Some(pipeline)
    }

    fn forget_texture(&mut self, texture: TextureId) {
        self.texture_groups.retain(|(_, ids), _| !ids.contains(&texture));
        self.units.retain(|_, id| *id != texture);
    }

    fn grow_uniform_ring(&mut self) {
        let needed = self.uniform_staging.len() as u64 / self.uniform_stride;
        if needed <= self.uniform_slots {
            return;
        }
        self.uniform_slots = needed.next_power_of_two();
        let (buffer, bind_group) =
            create_uniform_ring(&self.device, &self.uniform_layout, self.uniform_stride, self.uniform_slots);
        self.uniform_buffer = buffer;
        self.uniform_bind_group = bind_group;
        log::debug!("uniform ring grown to {} slots", self.uniform_slots);
    }

    fn view(&self, texture: Option<TextureId>) -> Option<&wgpu::TextureView> {
        texture.and_then(|t| self.textures.get(&t)).map(|t| &t.view)
    }

    fn encode_pass(&self, encoder: &mut wgpu::CommandEncoder, surface_view: &wgpu::TextureView, pass: &PassRecord) {
        let (color_view, resolve_target, depth_view) = match pass.target {
            None => match &self.msaa_view {
                Some(msaa) => (Some(msaa), Some(surface_view), Some(&self.depth_view)),
                None => (Some(surface_view), None, Some(&self.depth_view)),
            },
            Some(id) => {
                let Some(target) = self.targets.get(&id) else {
                    return;
                };
                (self.view(target.color), None, self.view(target.depth))
            }
        };

        let load = match pass.clear_color {
            Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                r: c.x as f64,
                g: c.y as f64,
                b: c.z as f64,
                a: c.w as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_view
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .into_iter()
            .collect();

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if pass.clear_depth {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in &pass.draws {
            render_pass.set_pipeline(draw.pipeline.as_ref());
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[draw.uniform_offset]);
            render_pass.set_bind_group(1, draw.textures.as_ref(), &[]);
            if let Some(v) = draw.viewport {
                render_pass.set_viewport(v.x as f32, v.y as f32, v.width as f32, v.height as f32, 0.0, 1.0);
            }
            for (slot, id) in draw.vertex_buffers.iter().enumerate() {
                if let Some(buffer) = self.buffers.get(id) {
                    render_pass.set_vertex_buffer(slot as u32, buffer.buffer.slice(..));
                }
            }
            match draw.index_buffer.and_then(|id| self.buffers.get(&id)) {
                Some(index) => {
                    render_pass.set_index_buffer(index.buffer.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..draw.count, 0, 0..draw.instances);
                }
                None => render_pass.draw(0..draw.count, 0..draw.instances),
            }
        }
    }

    fn encode_dispatch(&self, encoder: &mut wgpu::CommandEncoder, dispatch: &DispatchRecord) {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Compute Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(dispatch.pipeline.as_ref());
        compute_pass.set_bind_group(0, &self.uniform_bind_group, &[dispatch.uniform_offset]);
        compute_pass.set_bind_group(1, &dispatch.storage, &[]);
        compute_pass.dispatch_workgroups(dispatch.workgroups, 1, 1);
    }

    fn discard_frame(&mut self) {
        self.frame.clear();
        self.uniform_staging.clear();
        self.pass_open = false;
    }
}

impl GraphicsDevice for GpuDevice {
    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError> {
        if !self.alive {
            return Err(DeviceError::ContextLost("create_program".into()));
        }
        let module = |stage| desc.stage(stage).map(|src| self.compile(&desc.label, stage, src)).transpose();
        let vertex = module(ShaderStage::Vertex)?;
        let fragment = module(ShaderStage::Fragment)?;
        let compute_module = module(ShaderStage::Compute)?;
        if vertex.is_none() && compute_module.is_none() {
            return Err(DeviceError::ProgramLink {
                program: desc.label.clone(),
                message: "program has neither a vertex nor a compute stage".into(),
            });
        }

        let group_layout = match &compute_module {
            Some(_) => create_storage_bind_group_layout(&self.device, &desc.label, &desc.storage),
            None => create_texture_bind_group_layout(&self.device, &desc.label, &desc.samplers),
        };
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&desc.label),
            bind_group_layouts: &[&self.uniform_layout, &group_layout],
            push_constant_ranges: &[],
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let compute = compute_module
            .as_ref()
            .map(|m| Rc::new(create_compute_pipeline(&self.device, &desc.label, &pipeline_layout, m)));
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::ProgramLink {
                program: desc.label.clone(),
                message: error.to_string(),
            });
        }

        let id = ProgramId(self.handle());
        self.programs.insert(
            id,
            GpuProgram {
                label: desc.label.clone(),
                vertex,
                fragment,
                samplers: desc.samplers.clone(),
                storage: desc.storage.clone(),
                sampler_units: HashMap::new(),
                uniforms: UniformBlock::default(),
                group_layout,
                pipeline_layout,
                compute,
            },
        );
        log::debug!("created program '{}'", desc.label);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            self.fail(DeviceError::UnknownHandle { kind: "program", id: program.0 });
        }
        self.pipelines.retain(|key, _| key.program != program.0);
        self.texture_groups.retain(|(p, _), _| *p != program);
        if self.state.program == Some(program) {
            self.state.program = None;
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        if !self.check_alive("use_program") {
            return;
        }
        if !self.programs.contains_key(&program) {
            self.fail(DeviceError::UnknownHandle { kind: "program", id: program.0 });
            return;
        }
        self.state.program = Some(program);
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        let Some(program) = self.state.program else {
            self.fail(DeviceError::InvalidOperation {
                call: "set_uniform",
                message: format!("'{name}' set with no program bound"),
            });
            return;
        };
        let Some(p) = self.programs.get_mut(&program) else {
            return;
        };
        if let UniformValue::Sampler(unit) = value {
            p.sampler_units.insert(name.to_string(), unit);
        } else if !p.uniforms.set(name, &value) {
            log::trace!("uniform '{name}' is not part of the uniform block");
        }
    }

    fn create_buffer(&mut self, label: &str, kind: BufferKind, data: &[u8]) -> Result<BufferId, DeviceError> {
        if !self.alive {
            return Err(DeviceError::ContextLost("create_buffer".into()));
        }
        let (usage, layout) = match kind {
            BufferKind::Vertex(layout) => (wgpu::BufferUsages::VERTEX, Some(layout)),
            BufferKind::Index => (wgpu::BufferUsages::INDEX, None),
            BufferKind::Storage(layout) => (
                wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                Some(layout),
            ),
        };
        // wgpu rejects zero-sized buffers with initial contents.
        let contents: &[u8] = if data.is_empty() { &[0; 4] } else { data };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: usage | wgpu::BufferUsages::COPY_DST,
        });
        let id = BufferId(self.handle());
        self.buffers.insert(id, GpuBuffer { buffer, layout });
        Ok(id)
    }

    fn update_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        match self.buffers.get(&buffer) {
            Some(b) if offset + data.len() as u64 <= b.buffer.size() => {
                self.queue.write_buffer(&b.buffer, offset, data);
            }
            Some(b) => {
                let size = b.buffer.size();
                self.fail(DeviceError::InvalidOperation {
                    call: "update_buffer",
                    message: format!("write of {} bytes at {offset} overflows {size}-byte buffer", data.len()),
                });
            }
            None => self.fail(DeviceError::UnknownHandle { kind: "buffer", id: buffer.0 }),
        }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        match self.buffers.remove(&buffer) {
            Some(b) => b.buffer.destroy(),
            None => self.fail(DeviceError::UnknownHandle { kind: "buffer", id: buffer.0 }),
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: &TextureData) -> Result<TextureId, DeviceError> {
        if !self.alive {
            return Err(DeviceError::ContextLost("create_texture".into()));
        }
        let (layers, format, usage) = match desc.kind {
            TextureKind::D2 => (1u32, TARGET_COLOR_FORMAT, wgpu::TextureUsages::TEXTURE_BINDING),
            TextureKind::Cube => (6u32, TARGET_COLOR_FORMAT, wgpu::TextureUsages::TEXTURE_BINDING),
            TextureKind::Depth => (1u32, DEPTH_FORMAT, wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT),
        };
        if desc.kind == TextureKind::Depth && !data.layers.is_empty() {
            return Err(DeviceError::InvalidOperation {
                call: "create_texture",
                message: format!("depth texture '{}' cannot be created with pixel data", desc.label),
            });
        }
        if !data.layers.is_empty() && data.layers.len() != layers as usize {
            return Err(DeviceError::InvalidOperation {
                call: "create_texture",
                message: format!("'{}' expects {layers} layers, got {}", desc.label, data.layers.len()),
            });
        }
        let mip_levels = if desc.mipmaps && desc.kind == TextureKind::D2 {
            32 - desc.width.max(desc.height).max(1).leading_zeros()
        } else {
            1
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: layers,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: if desc.kind == TextureKind::Depth { usage } else { usage | wgpu::TextureUsages::COPY_DST },
            view_formats: &[],
        });

        for (layer, pixels) in data.layers.iter().enumerate() {
            let rgba = match desc.format {
                PixelFormat::Rgb8 => rgb_to_rgba(pixels),
                PixelFormat::Rgba8 => pixels.clone(),
            };
            let levels = if mip_levels > 1 {
                mip_chain(desc.width, desc.height, rgba)
            } else {
                vec![(desc.width, desc.height, rgba)]
            };
            for (level, (w, h, bytes)) in levels.iter().enumerate() {
                self.queue.write_texture(
                    wgpu::ImageCopyTexture {
                        texture: &texture,
                        mip_level: level as u32,
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: 0,
                            z: layer as u32,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    bytes,
                    wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(w * 4),
                        rows_per_image: Some(*h),
                    },
                    wgpu::Extent3d {
                        width: *w,
                        height: *h,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(match desc.kind {
                TextureKind::Cube => wgpu::TextureViewDimension::Cube,
                _ => wgpu::TextureViewDimension::D2,
            }),
            ..Default::default()
        });
        let anisotropy = desc.anisotropy.clamp(1, 16);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&desc.label),
            address_mode_u: match desc.kind {
                TextureKind::D2 => wgpu::AddressMode::Repeat,
                _ => wgpu::AddressMode::ClampToEdge,
            },
            address_mode_v: match desc.kind {
                TextureKind::D2 => wgpu::AddressMode::Repeat,
                _ => wgpu::AddressMode::ClampToEdge,
            },
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: if mip_levels > 1 {
                wgpu::FilterMode::Linear
            } else {
                wgpu::FilterMode::Nearest
            },
            compare: (desc.kind == TextureKind::Depth).then_some(wgpu::CompareFunction::LessEqual),
            anisotropy_clamp: if mip_levels > 1 { anisotropy } else { 1 },
            ..Default::default()
        });

        let id = TextureId(self.handle());
        self.textures.insert(
            id,
            GpuTexture {
                _texture: texture,
                view,
                sampler,
                kind: desc.kind,
            },
        );
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            self.fail(DeviceError::UnknownHandle { kind: "texture", id: texture.0 });
        }
        self.forget_texture(texture);
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        if !self.textures.contains_key(&texture) {
            self.fail(DeviceError::UnknownHandle { kind: "texture", id: texture.0 });
            return;
        }
        self.units.insert(unit, texture);
    }

    fn unbind_textures(&mut self) {
        self.units.clear();
    }

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTargetId, DeviceError> {
        if !self.alive {
            return Err(DeviceError::ContextLost("create_render_target".into()));
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(DeviceError::IncompleteFramebuffer {
                label: desc.label.clone(),
                reason: format!("unsupported size {}x{} (max {max})", desc.width, desc.height),
            });
        }
        if !desc.color && !desc.depth {
            return Err(DeviceError::IncompleteFramebuffer {
                label: desc.label.clone(),
                reason: "no attachments".into(),
            });
        }

        let mut attachment = |kind: TextureKind, suffix: &str| -> Result<TextureId, DeviceError> {
            let (format, usage) = match kind {
                TextureKind::Depth => (DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING),
                _ => (
                    TARGET_COLOR_FORMAT,
                    wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                ),
            };
            let label = format!("{} {suffix}", desc.label);
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&label),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(&label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                compare: (kind == TextureKind::Depth).then_some(wgpu::CompareFunction::LessEqual),
                ..Default::default()
            });
            let id = TextureId(self.handle());
            self.textures.insert(
                id,
                GpuTexture {
                    _texture: texture,
                    view,
                    sampler,
                    kind,
                },
            );
            Ok(id)
        };

        let color = if desc.color { Some(attachment(TextureKind::D2, "color")?) } else { None };
        let depth = if desc.depth { Some(attachment(TextureKind::Depth, "depth")?) } else { None };
        let id = RenderTargetId(self.handle());
        self.targets.insert(
            id,
            GpuTarget {
                color,
                depth,
                width: desc.width,
                height: desc.height,
            },
        );
        log::debug!("created render target '{}' {}x{}", desc.label, desc.width, desc.height);
        Ok(id)
    }

    fn render_target_texture(&self, target: RenderTargetId) -> Option<TextureId> {
        self.targets.get(&target).and_then(|t| t.color.or(t.depth))
    }

    fn delete_render_target(&mut self, target: RenderTargetId) {
        let Some(removed) = self.targets.remove(&target) else {
            self.fail(DeviceError::UnknownHandle { kind: "render target", id: target.0 });
            return;
        };
        for texture in removed.color.into_iter().chain(removed.depth) {
            self.textures.remove(&texture);
            self.forget_texture(texture);
        }
        if self.state.target == Some(target) {
            self.state.target = None;
            self.pass_open = false;
        }
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetId>) {
        if let Some(id) = target {
            if !self.targets.contains_key(&id) {
                self.fail(DeviceError::UnknownHandle { kind: "render target", id: id.0 });
                return;
            }
        }
        if self.state.target != target {
            self.pass_open = false;
        }
        self.state.target = target;
        self.state.viewport = None;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        let (width, height) = match self.state.target.and_then(|t| self.targets.get(&t)) {
            Some(t) => (t.width, t.height),
            None => (self.config.width, self.config.height),
        };
        if viewport.x + viewport.width > width || viewport.y + viewport.height > height {
            self.fail(DeviceError::InvalidOperation {
                call: "set_viewport",
                message: format!("{viewport:?} exceeds {width}x{height}"),
            });
            return;
        }
        self.state.viewport = Some(viewport);
    }

    fn clear(&mut self, color: Option<Vec4>, depth: bool) {
        if !self.check_alive("clear") {
            return;
        }
        if matches!(self.frame.last(), Some(FrameItem::Pass(p)) if self.pass_open && !p.draws.is_empty()) {
            self.pass_open = false;
        }
        let pass = self.open_pass();
        if color.is_some() {
            pass.clear_color = color;
        }
        pass.clear_depth |= depth;
    }

    fn set_blend(&mut self, blend: BlendMode) {
        self.state.blend = blend;
    }

    fn set_depth(&mut self, depth: DepthState) {
        self.state.depth = depth;
    }

    fn set_cull(&mut self, cull: CullState) {
        self.state.cull = cull;
    }

    fn draw(&mut self, call: &DrawCall) {
        if !self.check_alive("draw") {
            return;
        }
        let Some(program) = self.state.program else {
            self.fail(DeviceError::InvalidOperation {
                call: "draw",
                message: "no program bound".into(),
            });
            return;
        };
        let mut layouts = Vec::with_capacity(call.vertex_buffers.len());
        for id in &call.vertex_buffers {
            match self.buffers.get(id).and_then(|b| b.layout.clone()) {
                Some(layout) => layouts.push(layout),
                None => {
                    self.fail(DeviceError::UnknownHandle { kind: "vertex buffer", id: id.0 });
                    return;
                }
            }
        }
        if let Some(index) = call.index_buffer {
            if !self.buffers.contains_key(&index) {
                self.fail(DeviceError::UnknownHandle { kind: "index buffer", id: index.0 });
                return;
            }
        }
        let Some(target) = self.target_signature() else {
            return;
        };
        let key = PipelineKey {
            program: program.0,
            layouts,
            blend: self.state.blend,
            depth: self.state.depth,
            cull: self.state.cull,
            topology: call.topology,
            target,
        };
        let Some(pipeline) = self.pipeline(key) else {
            self.fail(DeviceError::InvalidOperation {
                call: "draw",
                message: "bound program has no vertex stage".into(),
            });
            return;
        };
        let Some(textures) = self.texture_group(program) else {
            return;
        };
        let uniform_offset = self.push_uniform_snapshot(program);
        let viewport = self.state.viewport;
        let record = DrawRecord {
            pipeline,
            textures,
            uniform_offset,
            viewport,
            vertex_buffers: call.vertex_buffers.clone(),
            index_buffer: call.index_buffer,
            count: call.count,
            instances: call.instances,
        };
        self.open_pass().draws.push(record);
    }

    fn dispatch(&mut self, buffers: &[BufferId], workgroups: u32) {
        if !self.check_alive("dispatch") {
            return;
        }
        let Some(program_id) = self.state.program.filter(|p| self.programs.contains_key(p)) else {
            self.fail(DeviceError::InvalidOperation {
                call: "dispatch",
                message: "no program bound".into(),
            });
            return;
        };
        let (label, compute, declared) = match self.programs.get(&program_id) {
            Some(p) => (p.label.clone(), p.compute.clone(), p.storage.len()),
            None => return,
        };
        let Some(pipeline) = compute else {
            self.fail(DeviceError::InvalidOperation {
                call: "dispatch",
                message: format!("'{label}' is not a compute program"),
            });
            return;
        };
        if declared != buffers.len() {
            self.fail(DeviceError::InvalidOperation {
                call: "dispatch",
                message: format!("'{label}' declares {declared} storage buffers, {} bound", buffers.len()),
            });
            return;
        }
        if let Some(missing) = buffers.iter().find(|id| !self.buffers.contains_key(id)) {
            let id = missing.0;
            self.fail(DeviceError::UnknownHandle { kind: "storage buffer", id });
            return;
        }
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                self.buffers.get(id).map(|b| wgpu::BindGroupEntry {
                    binding: i as u32,
                    resource: b.buffer.as_entire_binding(),
                })
            })
            .collect();
        let Some(layout) = self.programs.get(&program_id).map(|p| &p.group_layout) else {
            return;
        };
        let storage = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label} storage")),
            layout,
            entries: &entries,
        });
        let uniform_offset = self.push_uniform_snapshot(program_id);
        self.pass_open = false;
        self.frame.push(FrameItem::Dispatch(DispatchRecord {
            pipeline,
            storage,
            uniform_offset,
            workgroups,
        }));
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.msaa_view = create_msaa_view(&self.device, &self.config, self.sample_count);
        self.depth_view = create_depth_view(&self.device, width, height, self.sample_count);
        self.pipelines.retain(|key, _| key.target.color != Some(self.config.format) || key.target.samples == 1);
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        if !self.alive {
            return Err(DeviceError::ContextLost("present".into()));
        }
        if !self.frame.iter().any(|item| matches!(item, FrameItem::Pass(p) if p.target.is_none())) {
            self.pass_open = false;
            self.state.target = None;
            self.clear(Some(Vec4::new(0.0, 0.0, 0.0, 1.0)), true);
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                self.discard_frame();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface timeout, frame dropped");
                self.discard_frame();
                return Ok(());
            }
            Err(e) => {
                self.discard_frame();
                return Err(DeviceError::Surface(e.to_string()));
            }
        };
        let surface_view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.grow_uniform_ring();
        self.queue.write_buffer(&self.uniform_buffer, 0, &self.uniform_staging);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        let frame = std::mem::take(&mut self.frame);
        for item in &frame {
            match item {
                FrameItem::Pass(pass) => self.encode_pass(&mut encoder, &surface_view, pass),
                FrameItem::Dispatch(dispatch) => self.encode_dispatch(&mut encoder, dispatch),
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.uniform_staging.clear();
        self.pass_open = false;
        Ok(())
    }

    fn take_error(&mut self) -> Option<DeviceError> {
        if let Some(error) = self.error.take() {
            return Some(error);
        }
        let mut errors = self.uncaptured.lock().ok()?;
        if errors.is_empty() {
            return None;
        }
        let message = errors.remove(0);
        Some(DeviceError::InvalidOperation {
            call: "wgpu",
            message,
        })
    }

    fn release_context(&mut self) {
        let leaked = self.programs.len() + self.buffers.len() + self.targets.len();
        if leaked > 0 {
            log::warn!("releasing graphics context with {leaked} live resources");
        }
        self.discard_frame();
        self.pipelines.clear();
        self.texture_groups.clear();
        self.units.clear();
        self.textures.clear();
        let _ = self.device.poll(wgpu::Maintain::Wait);
        self.alive = false;
        log::info!("graphics context released");
    }
}
