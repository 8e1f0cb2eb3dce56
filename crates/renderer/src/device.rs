//! The graphics device contract every backend implements.
//!
//! The model is a single-context state machine: a program is bound, fixed
//! function state is set, uniforms are written by name, textures are bound to
//! numbered units, and draws are issued against the currently bound render
//! target. Exactly one thread owns a device.

use glam::{Mat4, Vec2, Vec3, Vec4};
use thiserror::Error;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

handle!(
    /// A compiled and linked shader program.
    ProgramId
);
handle!(
    /// A GPU buffer (vertex, index or storage).
    BufferId
);
handle!(
    /// A 2D, cube or depth texture.
    TextureId
);
handle!(
    /// An offscreen framebuffer with its attachments.
    RenderTargetId
);

/// Pipeline stage a shader source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
            ShaderStage::Compute => write!(f, "compute"),
        }
    }
}

/// Kind of texture a sampler slot expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
    Depth,
}

/// A named sampler declared by a program. Written with `UniformValue::Sampler(unit)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SamplerSlot {
    pub name: String,
    pub kind: TextureKind,
}

impl SamplerSlot {
    pub fn new(name: impl Into<String>, kind: TextureKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Access mode of a storage buffer bound to a compute program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageAccess {
    ReadOnly,
    ReadWrite,
}

/// Fully resolved program sources plus the resources it declares.
#[derive(Debug, Clone, Default)]
pub struct ProgramDesc {
    pub label: String,
    pub stages: Vec<(ShaderStage, String)>,
    pub samplers: Vec<SamplerSlot>,
    pub storage: Vec<StorageAccess>,
}

impl ProgramDesc {
    pub fn stage(&self, stage: ShaderStage) -> Option<&str> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, src)| src.as_str())
    }
}

/// Per-attribute vertex format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepMode {
    Vertex,
    Instance,
}

/// Interleaved layout of one vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub stride: u64,
    pub step: StepMode,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Build a tightly packed layout with consecutive locations starting at `first_location`.
    pub fn packed(step: StepMode, first_location: u32, formats: &[VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(i, format)| {
                let attribute = VertexAttribute {
                    location: first_location + i as u32,
                    format: *format,
                    offset,
                };
                offset += format.size();
                attribute
            })
            .collect();
        Self {
            stride: offset,
            step,
            attributes,
        }
    }
}

/// What a buffer is used for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex(VertexLayout),
    Index,
    /// Storage buffer that can also be drawn from with the given layout.
    Storage(VertexLayout),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Texture creation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub mipmaps: bool,
    pub anisotropy: u16,
}

/// Pixel data for a texture; one layer for 2D, six for cube maps (+X, -X, +Y, -Y, +Z, -Z).
#[derive(Debug, Clone, Default)]
pub struct TextureData {
    pub layers: Vec<Vec<u8>>,
}

/// Offscreen framebuffer parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Depth-only targets (shadow maps) have no colour attachment.
    pub color: bool,
    pub depth: bool,
}

/// Rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Colour blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Disabled,
    /// src-alpha / one-minus-src-alpha.
    Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunc {
    #[default]
    Less,
    LessEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub func: DepthFunc,
}

impl DepthState {
    pub const DISABLED: Self = Self {
        test: false,
        write: false,
        func: DepthFunc::Always,
    };

    pub fn enabled(func: DepthFunc) -> Self {
        Self {
            test: true,
            write: true,
            func,
        }
    }
}

impl Default for DepthState {
    fn default() -> Self {
        Self::DISABLED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Face {
    #[default]
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Winding {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CullState {
    pub face: Option<Face>,
    pub winding: Winding,
}

impl CullState {
    pub const DISABLED: Self = Self {
        face: None,
        winding: Winding::CounterClockwise,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    #[default]
    Triangles,
    Points,
}

/// A value written to a named uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    /// Texture unit feeding a sampler.
    Sampler(u32),
}

/// One draw against the bound program and target.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub vertex_buffers: Vec<BufferId>,
    pub index_buffer: Option<BufferId>,
    /// Index count when indexed, vertex count otherwise.
    pub count: u32,
    pub instances: u32,
    pub topology: Topology,
}

impl DrawCall {
    pub fn arrays(vertex_buffer: BufferId, count: u32) -> Self {
        Self {
            vertex_buffers: vec![vertex_buffer],
            index_buffer: None,
            count,
            instances: 1,
            topology: Topology::Triangles,
        }
    }

    pub fn indexed(vertex_buffer: BufferId, index_buffer: BufferId, count: u32) -> Self {
        Self {
            vertex_buffers: vec![vertex_buffer],
            index_buffer: Some(index_buffer),
            count,
            instances: 1,
            topology: Topology::Triangles,
        }
    }

    pub fn instanced(mut self, instance_buffer: BufferId, instances: u32) -> Self {
        self.vertex_buffers.push(instance_buffer);
        self.instances = instances;
        self
    }
}

/// Errors raised by a graphics backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeviceError {
    #[error("{stage} stage of program '{program}' failed to compile: {message}")]
    ShaderCompile {
        program: String,
        stage: ShaderStage,
        message: String,
    },
    #[error("program '{program}' failed to link: {message}")]
    ProgramLink { program: String, message: String },
    #[error("framebuffer '{label}' is incomplete: {reason}")]
    IncompleteFramebuffer { label: String, reason: String },
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },
    #[error("invalid call sequence in {call}: {message}")]
    InvalidOperation { call: &'static str, message: String },
    #[error("graphics context is not available: {0}")]
    ContextLost(String),
    #[error("surface error: {0}")]
    Surface(String),
}

/// The native graphics API as seen by the renderers.
///
/// State setters do not return errors; a backend records the first invalid
/// call and hands it out through [`GraphicsDevice::take_error`], which debug
/// builds of the frame loop poll after every call.
pub trait GraphicsDevice {
    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: ProgramId);
    fn set_uniform(&mut self, name: &str, value: UniformValue);

    fn create_buffer(&mut self, label: &str, kind: BufferKind, data: &[u8]) -> Result<BufferId, DeviceError>;
    fn update_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);
    fn delete_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self, desc: &TextureDesc, data: &TextureData) -> Result<TextureId, DeviceError>;
    fn delete_texture(&mut self, texture: TextureId);
    fn bind_texture(&mut self, unit: u32, texture: TextureId);
    fn unbind_textures(&mut self);

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTargetId, DeviceError>;
    /// Colour attachment of a target, or its depth attachment for depth-only targets.
    fn render_target_texture(&self, target: RenderTargetId) -> Option<TextureId>;
    fn delete_render_target(&mut self, target: RenderTargetId);
    /// `None` binds the default framebuffer.
    fn bind_render_target(&mut self, target: Option<RenderTargetId>);

    fn set_viewport(&mut self, viewport: Viewport);
    fn clear(&mut self, color: Option<Vec4>, depth: bool);
    fn set_blend(&mut self, blend: BlendMode);
    fn set_depth(&mut self, depth: DepthState);
    fn set_cull(&mut self, cull: CullState);

    fn draw(&mut self, call: &DrawCall);
    /// Run the bound compute program over `buffers` (in declaration order).
    fn dispatch(&mut self, buffers: &[BufferId], workgroups: u32);

    /// Default framebuffer size in pixels.
    fn surface_size(&self) -> (u32, u32);
    /// Resize the default framebuffer.
    fn resize(&mut self, width: u32, height: u32);
    /// Buffer swap.
    fn present(&mut self) -> Result<(), DeviceError>;

    /// First error recorded since the last call.
    fn take_error(&mut self) -> Option<DeviceError>;
    /// Tear down the context. Any later call is an error.
    fn release_context(&mut self);
}
