//! Headless device that records every call instead of talking to a GPU.
//!
//! Used for tests, CI and dry runs. It tracks live resources and the bound
//! state so invalid call sequences surface through `take_error` exactly like a
//! debug context would report them.

use std::collections::{HashMap, HashSet};

use glam::Vec4;

use crate::device::*;

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateProgram { program: ProgramId, label: String },
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    SetUniform { name: String, value: UniformValue },
    CreateBuffer { buffer: BufferId, label: String, size: usize },
    UpdateBuffer { buffer: BufferId, offset: u64, size: usize },
    DeleteBuffer(BufferId),
    CreateTexture { texture: TextureId, label: String, kind: TextureKind },
    DeleteTexture(TextureId),
    BindTexture { unit: u32, texture: TextureId },
    UnbindTextures,
    CreateRenderTarget { target: RenderTargetId, label: String },
    DeleteRenderTarget(RenderTargetId),
    BindRenderTarget(Option<RenderTargetId>),
    SetViewport(Viewport),
    Clear { color: Option<Vec4>, depth: bool },
    SetBlend(BlendMode),
    SetDepth(DepthState),
    SetCull(CullState),
    Draw { program: ProgramId, target: Option<RenderTargetId>, call: DrawCall },
    Dispatch { program: ProgramId, buffers: Vec<BufferId>, workgroups: u32 },
    Present,
    ReleaseContext,
}

struct RecordedTarget {
    width: u32,
    height: u32,
    color: Option<TextureId>,
    depth: Option<TextureId>,
}

/// A device that records commands and validates their order.
pub struct RecordingDevice {
    commands: Vec<Command>,
    programs: HashMap<ProgramId, ProgramDesc>,
    buffers: HashMap<BufferId, Vec<u8>>,
    textures: HashSet<TextureId>,
    targets: HashMap<RenderTargetId, RecordedTarget>,
    next_handle: u64,
    bound_program: Option<ProgramId>,
    bound_target: Option<RenderTargetId>,
    size: (u32, u32),
    context_alive: bool,
    error: Option<DeviceError>,
    failing_programs: HashMap<String, (ShaderStage, String)>,
    max_target_size: u32,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            commands: Vec::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashSet::new(),
            targets: HashMap::new(),
            next_handle: 1,
            bound_program: None,
            bound_target: None,
            size: (width, height),
            context_alive: true,
            error: None,
            failing_programs: HashMap::new(),
            max_target_size: 16384,
        }
    }

    /// Make programs whose label contains `label` fail to compile at `stage`.
    pub fn fail_program(&mut self, label: impl Into<String>, stage: ShaderStage, message: impl Into<String>) {
        self.failing_programs.insert(label.into(), (stage, message.into()));
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Label a program was created with.
    pub fn program_label(&self, program: ProgramId) -> Option<&str> {
        self.programs.get(&program).map(|p| p.label.as_str())
    }

    /// Draws issued with a program whose label starts with `prefix`.
    pub fn draws_with_program(&self, prefix: &str) -> Vec<&DrawCall> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw { program, call, .. }
                    if self.program_label(*program).is_some_and(|l| l.starts_with(prefix)) =>
                {
                    Some(call)
                }
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.commands.iter().filter(|c| matches!(c, Command::Draw { .. })).count()
    }

    /// Contents last written to a buffer.
    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.as_slice())
    }

    /// Number of live programs, buffers, textures and render targets.
    pub fn live_resources(&self) -> usize {
        self.programs.len() + self.buffers.len() + self.live_textures() + self.targets.len()
    }

    /// Textures created directly, not counting render target attachments.
    pub fn live_textures(&self) -> usize {
        let attachments: usize = self
            .targets
            .values()
            .map(|t| t.color.is_some() as usize + t.depth.is_some() as usize)
            .sum();
        self.textures.len() - attachments
    }

    pub fn live_render_targets(&self) -> usize {
        self.targets.len()
    }

    fn handle(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn fail(&mut self, error: DeviceError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn record(&mut self, call: &'static str, command: Command) -> bool {
        if !self.context_alive {
            self.fail(DeviceError::ContextLost(format!("{call} after release_context")));
            return false;
        }
        self.commands.push(command);
        true
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, DeviceError> {
        if !self.context_alive {
            return Err(DeviceError::ContextLost("create_program".into()));
        }
        if let Some((stage, message)) = self
            .failing_programs
            .iter()
            .find(|(label, _)| desc.label.contains(label.as_str()))
            .map(|(_, v)| v.clone())
        {
            return Err(DeviceError::ShaderCompile {
                program: desc.label.clone(),
                stage,
                message,
            });
        }
        if desc.stages.is_empty() {
            return Err(DeviceError::ProgramLink {
                program: desc.label.clone(),
                message: "no shader stages".into(),
            });
        }
        let program = ProgramId(self.handle());
        self.programs.insert(program, desc.clone());
        self.record(
            "create_program",
            Command::CreateProgram {
                program,
                label: desc.label.clone(),
            },
        );
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            self.fail(DeviceError::UnknownHandle { kind: "program", id: program.0 });
        }
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
        self.record("delete_program", Command::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramId) {
        if !self.programs.contains_key(&program) {
            self.fail(DeviceError::UnknownHandle { kind: "program", id: program.0 });
            return;
        }
        self.bound_program = Some(program);
        self.record("use_program", Command::UseProgram(program));
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        if self.bound_program.is_none() {
            self.fail(DeviceError::InvalidOperation {
                call: "set_uniform",
                message: format!("'{name}' set with no program bound"),
            });
        }
        self.record(
            "set_uniform",
            Command::SetUniform {
                name: name.to_string(),
                value,
            },
        );
    }

    fn create_buffer(&mut self, label: &str, _kind: BufferKind, data: &[u8]) -> Result<BufferId, DeviceError> {
        if !self.context_alive {
            return Err(DeviceError::ContextLost("create_buffer".into()));
        }
        let buffer = BufferId(self.handle());
        self.buffers.insert(buffer, data.to_vec());
        self.record(
            "create_buffer",
            Command::CreateBuffer {
                buffer,
                label: label.to_string(),
                size: data.len(),
            },
        );
        Ok(buffer)
    }

    fn update_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        match self.buffers.get_mut(&buffer) {
            Some(contents) => {
                let start = offset as usize;
                if contents.len() < start + data.len() {
                    contents.resize(start + data.len(), 0);
                }
                contents[start..start + data.len()].copy_from_slice(data);
            }
            None => {
                self.fail(DeviceError::UnknownHandle { kind: "buffer", id: buffer.0 });
                return;
            }
        }
        self.record(
            "update_buffer",
            Command::UpdateBuffer {
                buffer,
                offset,
                size: data.len(),
            },
        );
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_none() {
            self.fail(DeviceError::UnknownHandle { kind: "buffer", id: buffer.0 });
        }
        self.record("delete_buffer", Command::DeleteBuffer(buffer));
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: &TextureData) -> Result<TextureId, DeviceError> {
        if !self.context_alive {
            return Err(DeviceError::ContextLost("create_texture".into()));
        }
        let expected_layers = match desc.kind {
            TextureKind::Cube => 6,
            _ => 1,
        };
        let layer_size = desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel();
        if !data.layers.is_empty()
            && (data.layers.len() != expected_layers || data.layers.iter().any(|l| l.len() != layer_size))
        {
            return Err(DeviceError::InvalidOperation {
                call: "create_texture",
                message: format!("pixel data does not match {}x{} {:?}", desc.width, desc.height, desc.kind),
            });
        }
        let texture = TextureId(self.handle());
        self.textures.insert(texture);
        self.record(
            "create_texture",
            Command::CreateTexture {
                texture,
                label: desc.label.clone(),
                kind: desc.kind,
            },
        );
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if !self.textures.remove(&texture) {
            self.fail(DeviceError::UnknownHandle { kind: "texture", id: texture.0 });
        }
        self.record("delete_texture", Command::DeleteTexture(texture));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        if !self.textures.contains(&texture) {
            self.fail(DeviceError::UnknownHandle { kind: "texture", id: texture.0 });
        }
        self.record("bind_texture", Command::BindTexture { unit, texture });
    }

    fn unbind_textures(&mut self) {
        self.record("unbind_textures", Command::UnbindTextures);
    }

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTargetId, DeviceError> {
        if !self.context_alive {
            return Err(DeviceError::ContextLost("create_render_target".into()));
        }
        if desc.width == 0 || desc.height == 0 || desc.width > self.max_target_size || desc.height > self.max_target_size {
            return Err(DeviceError::IncompleteFramebuffer {
                label: desc.label.clone(),
                reason: format!("unsupported size {}x{}", desc.width, desc.height),
            });
        }
        if !desc.color && !desc.depth {
            return Err(DeviceError::IncompleteFramebuffer {
                label: desc.label.clone(),
                reason: "no attachments".into(),
            });
        }
        let color = desc.color.then(|| TextureId(self.handle()));
        let depth = desc.depth.then(|| TextureId(self.handle()));
        self.textures.extend(color.iter().chain(depth.iter()));
        let target = RenderTargetId(self.handle());
        self.targets.insert(
            target,
            RecordedTarget {
                width: desc.width,
                height: desc.height,
                color,
                depth,
            },
        );
        self.record(
            "create_render_target",
            Command::CreateRenderTarget {
                target,
                label: desc.label.clone(),
            },
        );
        Ok(target)
    }

    fn render_target_texture(&self, target: RenderTargetId) -> Option<TextureId> {
        self.targets.get(&target).and_then(|t| t.color.or(t.depth))
    }

    fn delete_render_target(&mut self, target: RenderTargetId) {
        match self.targets.remove(&target) {
            Some(removed) => {
                for texture in removed.color.iter().chain(removed.depth.iter()) {
                    self.textures.remove(texture);
                }
            }
            None => self.fail(DeviceError::UnknownHandle { kind: "render target", id: target.0 }),
        }
        if self.bound_target == Some(target) {
            self.bound_target = None;
        }
        self.record("delete_render_target", Command::DeleteRenderTarget(target));
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetId>) {
        if let Some(id) = target {
            if !self.targets.contains_key(&id) {
                self.fail(DeviceError::UnknownHandle { kind: "render target", id: id.0 });
                return;
            }
        }
        self.bound_target = target;
        self.record("bind_render_target", Command::BindRenderTarget(target));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        let (width, height) = match self.bound_target.and_then(|t| self.targets.get(&t)) {
            Some(target) => (target.width, target.height),
            None => self.size,
        };
        if viewport.x + viewport.width > width || viewport.y + viewport.height > height {
            self.fail(DeviceError::InvalidOperation {
                call: "set_viewport",
                message: format!("{viewport:?} exceeds {width}x{height}"),
            });
        }
        self.record("set_viewport", Command::SetViewport(viewport));
    }

    fn clear(&mut self, color: Option<Vec4>, depth: bool) {
        self.record("clear", Command::Clear { color, depth });
    }

    fn set_blend(&mut self, blend: BlendMode) {
        self.record("set_blend", Command::SetBlend(blend));
    }

    fn set_depth(&mut self, depth: DepthState) {
        self.record("set_depth", Command::SetDepth(depth));
    }

    fn set_cull(&mut self, cull: CullState) {
        self.record("set_cull", Command::SetCull(cull));
    }

    fn draw(&mut self, call: &DrawCall) {
        let Some(program) = self.bound_program else {
            self.fail(DeviceError::InvalidOperation {
                call: "draw",
                message: "no program bound".into(),
            });
            return;
        };
        for buffer in call.vertex_buffers.iter().chain(call.index_buffer.iter()) {
            if !self.buffers.contains_key(buffer) {
                self.fail(DeviceError::UnknownHandle { kind: "buffer", id: buffer.0 });
                return;
            }
        }
        let target = self.bound_target;
        self.record(
            "draw",
            Command::Draw {
                program,
                target,
                call: call.clone(),
            },
        );
    }

    fn dispatch(&mut self, buffers: &[BufferId], workgroups: u32) {
        let Some(program) = self.bound_program else {
            self.fail(DeviceError::InvalidOperation {
                call: "dispatch",
                message: "no program bound".into(),
            });
            return;
        };
        let declared = self.programs.get(&program).map(|p| p.storage.len()).unwrap_or(0);
        if declared != buffers.len() {
            self.fail(DeviceError::InvalidOperation {
                call: "dispatch",
                message: format!("program declares {declared} storage buffers, {} bound", buffers.len()),
            });
            return;
        }
        self.record(
            "dispatch",
            Command::Dispatch {
                program,
                buffers: buffers.to_vec(),
                workgroups,
            },
        );
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        if !self.context_alive {
            return Err(DeviceError::ContextLost("present".into()));
        }
        self.commands.push(Command::Present);
        Ok(())
    }

    fn take_error(&mut self) -> Option<DeviceError> {
        self.error.take()
    }

    fn release_context(&mut self) {
        if self.live_resources() > 0 {
            self.fail(DeviceError::InvalidOperation {
                call: "release_context",
                message: format!("{} resources still alive", self.live_resources()),
            });
        }
        self.commands.push(Command::ReleaseContext);
        self.context_alive = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(device: &mut RecordingDevice, label: &str) -> ProgramId {
        device
            .create_program(&ProgramDesc {
                label: label.into(),
                stages: vec![(ShaderStage::Vertex, "fn vs_main() {}".into())],
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn draw_without_program_is_reported() {
        let mut device = RecordingDevice::new(64, 64);
        let layout = VertexLayout::packed(StepMode::Vertex, 0, &[VertexFormat::Float32x3]);
        let buffer = device.create_buffer("vb", BufferKind::Vertex(layout), &[0; 36]).unwrap();
        device.draw(&DrawCall::arrays(buffer, 3));
        assert!(matches!(device.take_error(), Some(DeviceError::InvalidOperation { call: "draw", .. })));
        assert!(device.take_error().is_none());
    }

    #[test]
    fn draws_are_attributed_to_program_labels() {
        let mut device = RecordingDevice::new(64, 64);
        let layout = VertexLayout::packed(StepMode::Vertex, 0, &[VertexFormat::Float32x3]);
        let buffer = device.create_buffer("vb", BufferKind::Vertex(layout), &[0; 36]).unwrap();
        let sky = program(&mut device, "skybox/main");
        let water = program(&mut device, "water/main");
        device.use_program(sky);
        device.draw(&DrawCall::arrays(buffer, 3));
        device.use_program(water);
        device.draw(&DrawCall::arrays(buffer, 3));
        device.draw(&DrawCall::arrays(buffer, 3));
        assert_eq!(device.draws_with_program("skybox").len(), 1);
        assert_eq!(device.draws_with_program("water").len(), 2);
        assert!(device.take_error().is_none());
    }

    #[test]
    fn release_with_live_resources_is_an_error() {
        let mut device = RecordingDevice::new(64, 64);
        program(&mut device, "leak");
        device.release_context();
        assert!(device.take_error().is_some());
        assert!(device.present().is_err());
    }

    #[test]
    fn zero_sized_target_is_incomplete() {
        let mut device = RecordingDevice::new(64, 64);
        let err = device
            .create_render_target(&RenderTargetDesc {
                label: "planar".into(),
                width: 0,
                height: 128,
                color: true,
                depth: true,
            })
            .unwrap_err();
        assert!(matches!(err, DeviceError::IncompleteFramebuffer { .. }));
    }

    #[test]
    fn viewport_is_checked_against_bound_target() {
        let mut device = RecordingDevice::new(64, 64);
        let target = device
            .create_render_target(&RenderTargetDesc {
                label: "small".into(),
                width: 16,
                height: 16,
                color: true,
                depth: true,
            })
            .unwrap();
        device.bind_render_target(Some(target));
        device.set_viewport(Viewport::new(32, 32));
        assert!(device.take_error().is_some());
        device.bind_render_target(None);
        device.set_viewport(Viewport::new(32, 32));
        assert!(device.take_error().is_none());
    }
}
