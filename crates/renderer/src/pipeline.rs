//! Pipeline creation for the wgpu backend.
//!
//! wgpu bakes fixed-function state into pipelines, so the backend keeps one
//! pipeline per distinct [`PipelineKey`] and builds it on first use.

use std::num::NonZeroU64;

use crate::device::{
    BlendMode, CullState, DepthFunc, DepthState, Face, SamplerSlot, StepMode, StorageAccess, TextureKind, Topology,
    VertexFormat, VertexLayout, Winding,
};
use crate::uniforms::UniformBlock;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const TARGET_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Attachment formats of whatever a draw renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSignature {
    pub color: Option<wgpu::TextureFormat>,
    pub depth: bool,
    pub samples: u32,
}

/// Everything that selects a distinct render pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub program: u64,
    pub layouts: Vec<VertexLayout>,
    pub blend: BlendMode,
    pub depth: DepthState,
    pub cull: CullState,
    pub topology: Topology,
    pub target: TargetSignature,
}

fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
    }
}

fn compare(func: DepthFunc) -> wgpu::CompareFunction {
    match func {
        DepthFunc::Less => wgpu::CompareFunction::Less,
        DepthFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        DepthFunc::Always => wgpu::CompareFunction::Always,
    }
}

fn texture_binding(kind: TextureKind) -> wgpu::BindingType {
    match kind {
        TextureKind::D2 => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        TextureKind::Cube => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::Cube,
            multisampled: false,
        },
        TextureKind::Depth => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
    }
}

fn sampler_binding(kind: TextureKind) -> wgpu::BindingType {
    match kind {
        TextureKind::Depth => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
        _ => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    }
}

/// Group 0: the uniform block, addressed with a dynamic offset per draw.
pub fn create_uniform_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Uniform Block Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(std::mem::size_of::<UniformBlock>() as u64),
            },
            count: None,
        }],
    })
}

/// Group 1 of a render program: texture at `2i`, sampler at `2i + 1` per sampler slot.
pub fn create_texture_bind_group_layout(device: &wgpu::Device, label: &str, samplers: &[SamplerSlot]) -> wgpu::BindGroupLayout {
    let entries: Vec<wgpu::BindGroupLayoutEntry> = samplers
        .iter()
        .enumerate()
        .flat_map(|(i, slot)| {
            [
                wgpu::BindGroupLayoutEntry {
                    binding: 2 * i as u32,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: texture_binding(slot.kind),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2 * i as u32 + 1,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: sampler_binding(slot.kind),
                    count: None,
                },
            ]
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// Group 1 of a compute program: one storage buffer per binding.
pub fn create_storage_bind_group_layout(device: &wgpu::Device, label: &str, storage: &[StorageAccess]) -> wgpu::BindGroupLayout {
    let entries: Vec<wgpu::BindGroupLayoutEntry> = storage
        .iter()
        .enumerate()
        .map(|(i, access)| wgpu::BindGroupLayoutEntry {
            binding: i as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: *access == StorageAccess::ReadOnly,
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// Build the render pipeline described by `key`.
pub fn create_render_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    vertex: &wgpu::ShaderModule,
    fragment: Option<&wgpu::ShaderModule>,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
        .layouts
        .iter()
        .map(|l| {
            l.attributes
                .iter()
                .map(|a| wgpu::VertexAttribute {
                    format: vertex_format(a.format),
                    offset: a.offset,
                    shader_location: a.location,
                })
                .collect()
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout> = key
        .layouts
        .iter()
        .zip(attributes.iter())
        .map(|(l, attrs)| wgpu::VertexBufferLayout {
            array_stride: l.stride,
            step_mode: match l.step {
                StepMode::Vertex => wgpu::VertexStepMode::Vertex,
                StepMode::Instance => wgpu::VertexStepMode::Instance,
            },
            attributes: attrs,
        })
        .collect();

    let blend = match key.blend {
        BlendMode::Disabled => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
    };
    let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
        .target
        .color
        .map(|format| {
            Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .into_iter()
        .collect();

    let depth_stencil = key.target.depth.then(|| wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: key.depth.test && key.depth.write,
        depth_compare: if key.depth.test { compare(key.depth.func) } else { wgpu::CompareFunction::Always },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("vs_main"),
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: fragment.map(|module| wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &color_targets,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: match key.topology {
                Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
                Topology::Points => wgpu::PrimitiveTopology::PointList,
            },
            strip_index_format: None,
            front_face: match key.cull.winding {
                Winding::CounterClockwise => wgpu::FrontFace::Ccw,
                Winding::Clockwise => wgpu::FrontFace::Cw,
            },
            cull_mode: key.cull.face.map(|face| match face {
                Face::Back => wgpu::Face::Back,
                Face::Front => wgpu::Face::Front,
            }),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: key.target.samples,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

pub fn create_compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module,
        entry_point: Some("cs_main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}
