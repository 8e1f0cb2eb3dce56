//! Renderers: the shared setup/render sequence and the per-kind variants.
//!
//! [`SceneRenderer`] owns everything every renderer has in common (programs,
//! camera, transform, shadow and planar sub-features) and drives a boxed
//! [`RendererVariant`] for geometry, textures and simulation.

pub mod model;
pub mod particle;
pub mod planar;
pub mod shadow;
pub mod skybox;
pub mod surface;

use std::sync::atomic::{AtomicU64, Ordering};

use engine_core::{CameraKeyframe, CameraSample, Light, ObjectTransform};
use glam::{Mat4, Vec2, Vec4};
use renderer::{
    names, BlendMode, Camera, CullState, DepthFunc, DepthState, DeviceError, GraphicsDevice, ProgramId, ProgramKind,
    SamplerSlot, StorageAccess, TextureKind, TextureUnitAllocator, UniformValue, Viewport, MAX_LIGHTS,
};

use crate::config::{RendererSettings, VariantConfig};
use crate::context::{bind_texture, GpuContext, Resources};
use crate::error::{SceneError, VariantError};

use self::planar::PlanarCamera;
use self::shadow::ShadowMapManager;

static NEXT_RENDERER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a renderer, used to key texture units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RendererId(u64);

impl RendererId {
    pub fn next() -> Self {
        Self(NEXT_RENDERER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Sampler names shared between renderers and shaders.
pub mod samplers {
    pub const DIFFUSE_MAP: &str = "diffuseMap";
    pub const NORMAL_MAP: &str = "normalMap";
    pub const DUDV_MAP: &str = "dudvMap";
    pub const ENVIRONMENT_MAP: &str = "environmentMap";
    pub const SKYBOX: &str = "skybox";
    pub const SHADOW_MAP: &str = "shadowMap";
    pub const PLANAR_TEXTURE: &str = "planarTexture";
}

/// Programs compiled for one renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramSet {
    pub main: Option<ProgramId>,
    pub shadow: Option<ProgramId>,
    pub compute: Option<ProgramId>,
}

/// Lifecycle of a [`SceneRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Constructed,
    Ready,
    Disposed,
}

/// Per-kind behaviour plugged into [`SceneRenderer`].
///
/// Implementations keep every handle they create so that [`release`] can run
/// after a partial setup.
///
/// [`release`]: RendererVariant::release
pub trait RendererVariant {
    fn kind(&self) -> &'static str;

    /// Samplers of the main program, before the shadow map and planar texture.
    fn samplers(&self) -> Vec<SamplerSlot> {
        Vec::new()
    }

    /// Extra kernel compiled next to the main program.
    fn compute_program(&self) -> Option<(ProgramKind, Vec<StorageAccess>)> {
        None
    }

    fn casts_shadow(&self) -> bool {
        true
    }

    fn depth_state(&self, configured: DepthState) -> DepthState {
        configured
    }

    fn view_matrix(&self, view: Mat4) -> Mat4 {
        view
    }

    fn create_buffers(&mut self, res: &mut Resources<'_>) -> Result<(), VariantError>;

    fn load_textures(&mut self, _res: &mut Resources<'_>) -> Result<(), VariantError> {
        Ok(())
    }

    /// Kind-specific uniforms, written with the main program bound.
    fn upload_uniforms(&self, _device: &mut dyn GraphicsDevice) {}

    fn draw_geometry(&mut self, res: &mut Resources<'_>);

    /// Depth-only draw for the shadow pass.
    fn draw_depth(&mut self, res: &mut Resources<'_>) {
        self.draw_geometry(res);
    }

    /// Per-frame simulation step.
    fn advance(&mut self, _res: &mut Resources<'_>, _programs: &ProgramSet, _dt: f32) {}

    /// Delete textures, then buffers.
    fn release(&mut self, device: &mut dyn GraphicsDevice);
}

/// A drawable scene entry: shared render sequence around a variant.
pub struct SceneRenderer {
    id: RendererId,
    settings: RendererSettings,
    variant: Box<dyn RendererVariant>,
    state: RendererState,
    transform: ObjectTransform,
    camera: Camera,
    programs: ProgramSet,
    planar: Option<PlanarCamera>,
    created_shadow_map: bool,
    view: Mat4,
    projection: Mat4,
}

impl std::fmt::Debug for SceneRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneRenderer")
            .field("id", &self.id)
            .field("name", &self.settings.name)
            .field("kind", &self.variant.kind())
            .field("state", &self.state)
            .finish()
    }
}

impl SceneRenderer {
    /// Build the renderer for a validated config. No GPU work happens until [`setup`](Self::setup).
    pub fn new(config: VariantConfig) -> Self {
        match config {
            VariantConfig::Model(c) => Self::with_variant(c.settings.clone(), Box::new(model::ModelRenderer::new(c))),
            VariantConfig::Surface(c) => Self::with_variant(c.settings.clone(), Box::new(surface::SurfaceRenderer::new(c))),
            VariantConfig::Skybox(c) => Self::with_variant(c.settings.clone(), Box::new(skybox::SkyboxRenderer::new(c))),
            VariantConfig::Particle(c) => {
                Self::with_variant(c.settings.clone(), Box::new(particle::ParticleRenderer::new(c)))
            }
        }
    }

    pub fn with_variant(settings: RendererSettings, variant: Box<dyn RendererVariant>) -> Self {
        let mut transform = ObjectTransform::new(settings.transform);
        transform.auto_rotation = settings.auto_rotation;
        let camera = Camera {
            up: settings.up,
            fov_degrees: settings.fov,
            near: settings.near,
            far: settings.far,
            ..Default::default()
        };
        let planar = settings
            .planar_camera
            .zip(settings.planar_resolution())
            .map(|(config, (w, h))| PlanarCamera::new(config, w, h));
        Self {
            id: RendererId::next(),
            settings,
            variant,
            state: RendererState::Constructed,
            transform,
            camera,
            programs: ProgramSet::default(),
            planar,
            created_shadow_map: false,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }

    pub fn id(&self) -> RendererId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn kind(&self) -> &'static str {
        self.variant.kind()
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn programs(&self) -> ProgramSet {
        self.programs
    }

    pub fn transform(&self) -> &ObjectTransform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut ObjectTransform {
        &mut self.transform
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn has_planar_camera(&self) -> bool {
        self.planar.is_some()
    }

    pub fn planar_camera(&self) -> Option<&PlanarCamera> {
        self.planar.as_ref()
    }

    /// Whether this renderer takes part in the shadow pre-pass.
    pub fn casts_shadow(&self) -> bool {
        self.programs.shadow.is_some()
    }

    /// Light-space matrix of the first light, if any.
    pub fn calculate_light_space_matrix(&self) -> Option<Mat4> {
        self.settings.lights.first().map(shadow::calculate_light_space_matrix)
    }

    /// Acquire every GPU resource. On failure everything already acquired is released.
    pub fn setup(&mut self, ctx: &mut GpuContext<'_>) -> Result<(), SceneError> {
        match self.state {
            RendererState::Ready => return Ok(()),
            RendererState::Disposed => return Err(SceneError::NotReady(self.settings.name.clone())),
            RendererState::Constructed => {}
        }
        log::info!("Setting up {} renderer '{}'", self.variant.kind(), self.settings.name);
        match self.acquire(ctx) {
            Ok(()) => {
                self.state = RendererState::Ready;
                Ok(())
            }
            Err(e) => {
                log::error!("Setup of renderer '{}' failed: {}", self.settings.name, e);
                let owned_map = self.created_shadow_map.then_some(&mut *ctx.shadow_maps);
                self.release_resources(ctx.device, ctx.units, owned_map);
                Err(e)
            }
        }
    }

    fn acquire(&mut self, ctx: &mut GpuContext<'_>) -> Result<(), SceneError> {
        let mut main_samplers = self.variant.samplers();
        main_samplers.push(SamplerSlot::new(samplers::SHADOW_MAP, TextureKind::Depth));
        main_samplers.push(SamplerSlot::new(samplers::PLANAR_TEXTURE, TextureKind::D2));
        self.programs.main = Some(self.compile(ctx, ProgramKind::Main, main_samplers, Vec::new())?);
        if self.settings.shadows.is_some() && self.variant.casts_shadow() {
            self.programs.shadow = Some(self.compile(ctx, ProgramKind::Shadow, Vec::new(), Vec::new())?);
        }
        if let Some((kind, storage)) = self.variant.compute_program() {
            self.programs.compute = Some(self.compile(ctx, kind, Vec::new(), storage)?);
        }
        self.check(ctx.device)?;

        let name = self.settings.name.clone();
        self.variant
            .create_buffers(&mut ctx.resources(self.id))
            .map_err(|e| e.for_renderer(&name))?;
        self.variant
            .load_textures(&mut ctx.resources(self.id))
            .map_err(|e| e.for_renderer(&name))?;
        self.check(ctx.device)?;

        let initial = self.first_keyframe();
        self.update_camera(&initial, ctx.device.surface_size());

        if let Some(shadows) = self.settings.shadows {
            self.created_shadow_map = ctx
                .shadow_maps
                .ensure(ctx.device, 0, shadows.map_size)
                .map_err(|source| self.device_error(source))?;
        }
        if let Some(planar) = self.planar.as_mut() {
            planar
                .allocate(ctx.device, &name)
                .map_err(|source| SceneError::Device {
                    renderer: name.clone(),
                    source,
                })?;
        }

        let device = &mut *ctx.device;
        if let Some(main) = self.programs.main {
            device.use_program(main);
            device.set_uniform(names::LOD_BIAS, UniformValue::Float(self.settings.lod_bias));
            device.set_uniform(names::TONE_MAPPING, UniformValue::Bool(self.settings.tone_mapping));
            device.set_uniform(names::GAMMA, UniformValue::Bool(self.settings.gamma_correction));
            device.set_uniform(names::SHADOWS, UniformValue::Bool(self.settings.shadows.is_some()));
            let screen_facing = self.planar.as_ref().is_some_and(PlanarCamera::screen_facing);
            device.set_uniform(names::SCREEN_FACING, UniformValue::Bool(screen_facing));
        }
        self.check(ctx.device)
    }

    fn compile(
        &self,
        ctx: &mut GpuContext<'_>,
        kind: ProgramKind,
        samplers: Vec<SamplerSlot>,
        storage: Vec<StorageAccess>,
    ) -> Result<ProgramId, SceneError> {
        let desc = ctx
            .shaders
            .program(&self.settings.shader_folder, kind, samplers, storage)
            .map_err(|source| SceneError::Shader {
                renderer: self.settings.name.clone(),
                source,
            })?;
        let program = ctx.device.create_program(&desc).map_err(|source| self.device_error(source))?;
        log::debug!("Compiled program '{}' for renderer '{}'", desc.label, self.settings.name);
        Ok(program)
    }

    fn device_error(&self, source: DeviceError) -> SceneError {
        SceneError::Device {
            renderer: self.settings.name.clone(),
            source,
        }
    }

    /// Setup-time device check; only in debug mode.
    fn check(&self, device: &mut dyn GraphicsDevice) -> Result<(), SceneError> {
        match self.settings.debug.then(|| device.take_error()).flatten() {
            Some(source) => Err(self.device_error(source)),
            None => Ok(()),
        }
    }

    /// Draw-time device check; only in debug mode.
    fn check_draw(&self, device: &mut dyn GraphicsDevice) -> Result<(), SceneError> {
        match self.settings.debug.then(|| device.take_error()).flatten() {
            Some(source) => Err(SceneError::Draw {
                renderer: self.settings.name.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    fn ready_program(&self) -> Result<ProgramId, SceneError> {
        match (self.state, self.programs.main) {
            (RendererState::Ready, Some(main)) => Ok(main),
            _ => Err(SceneError::NotReady(self.settings.name.clone())),
        }
    }

    fn first_keyframe(&self) -> CameraSample {
        let keyframe = self
            .settings
            .camera_positions
            .first()
            .copied()
            .unwrap_or(CameraKeyframe::new(0.0, 0.0, 0.0, -90.0, 0.0));
        CameraSample {
            position: keyframe.position,
            rotation: keyframe.rotation(),
            lens_roll: self.settings.lens_rotations.first().copied().unwrap_or(0.0),
        }
    }

    /// Point the main camera for this frame and rebuild its matrices.
    ///
    /// Renderers with `move_camera` follow `sample` from the shared path,
    /// the others hold their first keyframe.
    pub fn update_camera(&mut self, sample: &CameraSample, surface_size: (u32, u32)) {
        let sample = if self.settings.move_camera { *sample } else { self.first_keyframe() };
        self.camera.follow(&sample);
        self.camera.set_aspect(surface_size.0, surface_size.1);
        self.view = self.camera.view_matrix();
        self.projection = self.camera.projection_matrix();
    }

    /// Run the variant's simulation step.
    pub fn advance(&mut self, ctx: &mut GpuContext<'_>, dt: f32) -> Result<(), SceneError> {
        self.ready_program()?;
        self.variant.advance(&mut ctx.resources(self.id), &self.programs, dt);
        self.check_draw(ctx.device)
    }

    /// Draw with the renderer's own camera.
    pub fn render(&mut self, ctx: &mut GpuContext<'_>) -> Result<(), SceneError> {
        let (view, projection) = (self.view, self.projection);
        self.render_with_camera(ctx, view, projection)
    }

    /// Draw with an arbitrary view and projection.
    pub fn render_with_camera(&mut self, ctx: &mut GpuContext<'_>, view: Mat4, projection: Mat4) -> Result<(), SceneError> {
        let main = self.ready_program()?;
        let settings = &self.settings;
        let eye = view.inverse().w_axis.truncate();

        let device = &mut *ctx.device;
        device.use_program(main);
        device.set_blend(settings.blend);
        device.set_depth(self.variant.depth_state(settings.depth));
        device.set_uniform(names::VIEW_POSITION, UniformValue::Vec3(eye));
        device.set_cull(settings.cull);
        device.set_uniform(names::MODEL, UniformValue::Mat4(self.transform.model_matrix(ctx.elapsed)));
        self.upload_frame_uniforms(ctx, view, projection);
        self.check_draw(ctx.device)?;

        self.variant.draw_geometry(&mut ctx.resources(self.id));

        let device = &mut *ctx.device;
        device.unbind_textures();
        device.set_blend(BlendMode::Disabled);
        device.set_depth(DepthState::DISABLED);
        device.set_cull(CullState::DISABLED);
        self.check_draw(ctx.device)
    }

    fn upload_frame_uniforms(&self, ctx: &mut GpuContext<'_>, view: Mat4, projection: Mat4) {
        let settings = &self.settings;
        let device = &mut *ctx.device;
        let (width, height) = device.surface_size();

        device.set_uniform(names::AMBIENT_COLOR, UniformValue::Vec3(settings.ambient_color));
        device.set_uniform(names::VIEW, UniformValue::Mat4(self.variant.view_matrix(view)));
        device.set_uniform(names::PROJECTION, UniformValue::Mat4(projection));
        device.set_uniform(names::OPACITY, UniformValue::Float(settings.opacity));
        device.set_uniform(names::SHININESS, UniformValue::Float(settings.shininess));
        device.set_uniform(names::DISTORTION, UniformValue::Float(settings.distortion_strength));
        device.set_uniform(names::REFLECTION, UniformValue::Float(settings.reflection_strength));
        device.set_uniform(names::RESOLUTION, UniformValue::Vec2(Vec2::new(width as f32, height as f32)));
        self.variant.upload_uniforms(device);
        device.set_uniform(names::CAMERA_POSITION, UniformValue::Vec3(self.camera.position));
        device.set_uniform(names::TIME, UniformValue::Float(ctx.elapsed));

        let lights: &[Light] = if settings.enable_lighting { &settings.lights } else { &[] };
        let count = lights.len().min(MAX_LIGHTS);
        device.set_uniform(names::LIGHT_COUNT, UniformValue::Int(count as i32));
        for (i, light) in lights.iter().take(MAX_LIGHTS).enumerate() {
            device.set_uniform(&names::light(i, "position"), UniformValue::Vec3(light.position));
            device.set_uniform(&names::light(i, "color"), UniformValue::Vec3(light.color));
            device.set_uniform(&names::light(i, "strength"), UniformValue::Float(light.strength));
        }

        if let Some(shadows) = settings.shadows {
            let light_space = ctx
                .shadow_maps
                .light_space()
                .or_else(|| self.calculate_light_space_matrix())
                .unwrap_or(Mat4::IDENTITY);
            device.set_uniform(names::LIGHT_SPACE, UniformValue::Mat4(light_space));
            device.set_uniform(names::SHADOW_BIAS, UniformValue::Float(shadows.bias));
            device.set_uniform(names::SHADOW_STRENGTH, UniformValue::Float(shadows.strength));
            if let Some(texture) = ctx.shadow_maps.texture(&*device, 0) {
                bind_texture(device, ctx.units, self.id, samplers::SHADOW_MAP, texture);
            }
        }
        if let Some(texture) = self.planar.as_ref().and_then(|p| p.texture(&*device)) {
            bind_texture(device, ctx.units, self.id, samplers::PLANAR_TEXTURE, texture);
        }
    }

    /// Depth-only draw into the bound shadow map.
    pub fn render_from_light(&mut self, ctx: &mut GpuContext<'_>, light_space: Mat4) -> Result<(), SceneError> {
        self.ready_program()?;
        let Some(shadow) = self.programs.shadow else {
            return Ok(());
        };
        let device = &mut *ctx.device;
        device.use_program(shadow);
        device.set_depth(DepthState::enabled(DepthFunc::Less));
        device.set_cull(self.settings.cull);
        device.set_uniform(names::MODEL, UniformValue::Mat4(self.transform.model_matrix(ctx.elapsed)));
        device.set_uniform(names::LIGHT_SPACE, UniformValue::Mat4(light_space));

        self.variant.draw_depth(&mut ctx.resources(self.id));

        let device = &mut *ctx.device;
        device.set_depth(DepthState::DISABLED);
        device.set_cull(CullState::DISABLED);
        self.check_draw(ctx.device)
    }

    /// Render `peers` (self excluded) into the planar target from the planar camera.
    ///
    /// Does nothing without a planar camera. The default framebuffer and the
    /// main viewport are restored afterwards, also when a peer fails.
    pub fn render_planar_view(
        &mut self,
        ctx: &mut GpuContext<'_>,
        peers: &mut [&mut SceneRenderer],
        clear_color: Vec4,
    ) -> Result<(), SceneError> {
        self.ready_program()?;
        let Some(planar) = self.planar.as_mut() else {
            return Ok(());
        };
        planar.update(self.transform.base.position, &self.camera);
        if !planar.begin(ctx.device, clear_color) {
            return Ok(());
        }
        log::debug!("Planar pass of '{}' over {} peers", self.settings.name, peers.len());

        let (view, projection) = (planar.view(), planar.projection());
        let mut result = Ok(());
        for peer in peers.iter_mut().filter(|p| p.id != self.id) {
            if let Err(e) = peer.render_with_camera(ctx, view, projection) {
                result = Err(e);
                break;
            }
        }

        let (width, height) = ctx.device.surface_size();
        planar.end(ctx.device, Viewport::new(width, height));
        result
    }

    /// Release every GPU resource. Shared shadow maps stay with the instance.
    pub fn shutdown(&mut self, ctx: &mut GpuContext<'_>) -> Result<(), SceneError> {
        if self.state == RendererState::Ready {
            log::info!("Shutting down renderer '{}'", self.settings.name);
            self.release_resources(ctx.device, ctx.units, None);
        }
        self.state = RendererState::Disposed;
        self.check(ctx.device)
    }

    /// Reverse acquisition order: planar target, shadow map, textures and buffers, programs, units.
    fn release_resources(
        &mut self,
        device: &mut dyn GraphicsDevice,
        units: &mut TextureUnitAllocator,
        shadow_maps: Option<&mut ShadowMapManager>,
    ) {
        if let Some(planar) = self.planar.as_mut() {
            planar.release(device);
        }
        if let Some(maps) = shadow_maps {
            maps.release(device, 0);
        }
        self.created_shadow_map = false;
        self.variant.release(device);
        let programs = std::mem::take(&mut self.programs);
        for program in [programs.compute, programs.shadow, programs.main].into_iter().flatten() {
            device.delete_program(program);
        }
        units.release(self.id.raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::config::{PlanarCameraConfig, RenderOverrides, RendererConfiguration};
    use engine_core::Vec3;
    use renderer::{Command, DrawCall, RecordingDevice, ShaderLibrary};

    /// Draws one triangle from a single buffer.
    #[derive(Default)]
    struct Triangle {
        buffer: Option<renderer::BufferId>,
        fail: bool,
    }

    impl RendererVariant for Triangle {
        fn kind(&self) -> &'static str {
            "triangle"
        }

        fn create_buffers(&mut self, res: &mut Resources<'_>) -> Result<(), VariantError> {
            let data = [0u8; 36];
            let layout = renderer::SkyboxVertex::layout();
            self.buffer = Some(res.device.create_buffer("triangle", renderer::BufferKind::Vertex(layout), &data)?);
            if self.fail {
                return Err(VariantError::Asset(crate::error::AssetError::NotFound("missing.png".into())));
            }
            Ok(())
        }

        fn draw_geometry(&mut self, res: &mut Resources<'_>) {
            if let Some(buffer) = self.buffer {
                res.device.draw(&DrawCall::arrays(buffer, 3));
            }
        }

        fn release(&mut self, device: &mut dyn GraphicsDevice) {
            if let Some(buffer) = self.buffer.take() {
                device.delete_buffer(buffer);
            }
        }
    }

    fn shaders() -> ShaderLibrary {
        ShaderLibrary::in_memory()
            .with_file("triangle/vertex.wgsl", "vs")
            .with_file("triangle/fragment.wgsl", "fs")
            .with_file("triangle/shadow_vertex.wgsl", "svs")
            .with_file("triangle/shadow_fragment.wgsl", "sfs")
    }

    fn settings(overrides: RenderOverrides) -> RendererSettings {
        let defaults = RendererConfiguration {
            camera_positions: vec![CameraKeyframe::new(0.0, 0.0, 5.0, -90.0, 0.0)],
            lights: vec![Light::new(Vec3::new(0.0, 10.0, 0.0), Vec3::ONE, 1.0)],
            debug: true,
            ..Default::default()
        };
        defaults.resolve("tri", "triangle", &overrides).unwrap()
    }

    struct Harness {
        device: RecordingDevice,
        shaders: ShaderLibrary,
        assets: MemoryAssets,
        units: TextureUnitAllocator,
        shadow_maps: ShadowMapManager,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                device: RecordingDevice::new(320, 240),
                shaders: shaders(),
                assets: MemoryAssets::new(),
                units: TextureUnitAllocator::new(),
                shadow_maps: ShadowMapManager::new(),
            }
        }

        fn ctx(&mut self) -> GpuContext<'_> {
            GpuContext {
                device: &mut self.device,
                shaders: &self.shaders,
                assets: &self.assets,
                units: &mut self.units,
                shadow_maps: &mut self.shadow_maps,
                elapsed: 0.0,
            }
        }
    }

    #[test]
    fn render_restores_fixed_function_state() {
        let mut h = Harness::new();
        let mut r = SceneRenderer::with_variant(settings(RenderOverrides::default()), Box::new(Triangle::default()));
        r.setup(&mut h.ctx()).unwrap();
        h.device.clear_commands();

        r.render(&mut h.ctx()).unwrap();
        let commands = h.device.commands();
        assert!(matches!(commands[0], Command::UseProgram(_)));
        assert!(matches!(commands[1], Command::SetBlend(BlendMode::Disabled)));
        assert!(matches!(commands[2], Command::SetDepth(d) if d.test));
        let n = commands.len();
        assert_eq!(commands[n - 4], Command::UnbindTextures);
        assert_eq!(commands[n - 3], Command::SetBlend(BlendMode::Disabled));
        assert_eq!(commands[n - 2], Command::SetDepth(DepthState::DISABLED));
        assert_eq!(commands[n - 1], Command::SetCull(CullState::DISABLED));
        assert_eq!(h.device.draw_count(), 1);
    }

    #[test]
    fn failed_setup_releases_everything() {
        let mut h = Harness::new();
        let overrides = RenderOverrides {
            shadows: Some(true),
            ..Default::default()
        };
        let variant = Triangle {
            fail: true,
            ..Default::default()
        };
        let mut r = SceneRenderer::with_variant(settings(overrides), Box::new(variant));
        let err = r.setup(&mut h.ctx()).unwrap_err();
        assert!(matches!(err, SceneError::Asset { .. }));
        assert_eq!(err.renderer(), Some("tri"));
        assert_eq!(h.device.live_resources(), 0);
        assert!(h.shadow_maps.is_empty());
        assert_eq!(r.state(), RendererState::Constructed);
        assert!(matches!(r.render(&mut h.ctx()), Err(SceneError::NotReady(_))));
    }

    #[test]
    fn shader_failure_names_renderer_and_stage() {
        let mut h = Harness::new();
        h.device
            .fail_program("triangle/main", renderer::ShaderStage::Fragment, "syntax error");
        let mut r = SceneRenderer::with_variant(settings(RenderOverrides::default()), Box::new(Triangle::default()));
        let err = r.setup(&mut h.ctx()).unwrap_err();
        match err {
            SceneError::Device {
                renderer,
                source: DeviceError::ShaderCompile { stage, .. },
            } => {
                assert_eq!(renderer, "tri");
                assert_eq!(stage, renderer::ShaderStage::Fragment);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(h.device.live_resources(), 0);
    }

    #[test]
    fn fixed_camera_holds_first_keyframe() {
        let overrides = RenderOverrides {
            move_camera: Some(false),
            ..Default::default()
        };
        let mut r = SceneRenderer::with_variant(settings(overrides), Box::new(Triangle::default()));
        let sample = CameraSample {
            position: Vec3::new(9.0, 9.0, 9.0),
            rotation: Vec2::new(0.0, 0.0),
            lens_roll: 0.0,
        };
        r.update_camera(&sample, (320, 240));
        assert_eq!(r.camera().position, Vec3::new(0.0, 0.0, 5.0));
        assert!((r.camera().aspect - 320.0 / 240.0).abs() < 1e-6);
    }

    #[test]
    fn shadow_pass_uses_shadow_program() {
        let mut h = Harness::new();
        let overrides = RenderOverrides {
            shadows: Some(true),
            ..Default::default()
        };
        let mut r = SceneRenderer::with_variant(settings(overrides), Box::new(Triangle::default()));
        r.setup(&mut h.ctx()).unwrap();
        assert!(r.casts_shadow());
        assert!(!h.shadow_maps.is_empty());

        let light_space = r.calculate_light_space_matrix().unwrap();
        r.render_from_light(&mut h.ctx(), light_space).unwrap();
        assert_eq!(h.device.draws_with_program("triangle/shadow").len(), 1);

        r.shutdown(&mut h.ctx()).unwrap();
        // The shadow map belongs to the instance and survives renderer shutdown.
        assert_eq!(h.device.live_render_targets(), 1);
        h.shadow_maps.destroy_all(&mut h.device);
        assert_eq!(h.device.live_resources(), 0);
        assert!(h.units.is_empty());
    }

    #[test]
    fn planar_view_skips_self_and_restores_viewport() {
        let mut h = Harness::new();
        let overrides = RenderOverrides {
            planar_camera: Some(PlanarCameraConfig {
                resolution: Some((64, 64)),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut mirror = SceneRenderer::with_variant(settings(overrides), Box::new(Triangle::default()));
        let mut other = SceneRenderer::with_variant(settings(RenderOverrides::default()), Box::new(Triangle::default()));
        mirror.setup(&mut h.ctx()).unwrap();
        other.setup(&mut h.ctx()).unwrap();
        h.device.clear_commands();

        mirror
            .render_planar_view(&mut h.ctx(), &mut [&mut other], Vec4::ZERO)
            .unwrap();
        let commands = h.device.commands();
        assert!(matches!(commands[0], Command::BindRenderTarget(Some(_))));
        assert_eq!(commands[1], Command::SetViewport(Viewport::new(64, 64)));
        assert_eq!(h.device.draw_count(), 1);
        let n = commands.len();
        assert_eq!(commands[n - 2], Command::BindRenderTarget(None));
        assert_eq!(commands[n - 1], Command::SetViewport(Viewport::new(320, 240)));
    }
}
