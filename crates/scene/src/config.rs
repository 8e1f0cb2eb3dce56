//! Scenario configuration.
//!
//! A scenario has one [`RendererConfiguration`] holding scenario-wide
//! defaults. Each renderer merges those defaults with its own
//! [`RenderOverrides`] (`defaults.with_overrides(overrides)`) and then its
//! variant parameters through `add_model` / `add_surface` / `add_skybox` /
//! `add_particle`. Every missing required key is reported there, before any
//! renderer exists.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use engine_core::{AutoRotation, CameraKeyframe, Light, Transform};
use glam::{Vec2, Vec3, Vec4};
use renderer::{BlendMode, CullState, DepthFunc, DepthState, Face, Winding};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::material::PbrOverrides;

/// Which faces are culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CullMode {
    #[default]
    None,
    Back,
    Front,
}

/// Winding of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

/// Shadow map parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettings {
    #[serde(default = "default_shadow_map_size")]
    pub map_size: u32,
    #[serde(default = "default_shadow_bias")]
    pub bias: f32,
    #[serde(default = "default_shadow_strength")]
    pub strength: f32,
}

fn default_shadow_map_size() -> u32 {
    2048
}
fn default_shadow_bias() -> f32 {
    0.005
}
fn default_shadow_strength() -> f32 {
    0.5
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            map_size: default_shadow_map_size(),
            bias: default_shadow_bias(),
            strength: default_shadow_strength(),
        }
    }
}

/// How a planar camera is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlanarMode {
    /// Follows the main camera, mirrored about the object.
    #[default]
    Relative,
    /// Static offset from the object.
    Fixed,
}

/// Render-to-texture camera owned by one renderer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanarCameraConfig {
    #[serde(default)]
    pub mode: PlanarMode,
    /// Target size; the window size when unset.
    #[serde(default)]
    pub resolution: Option<(u32, u32)>,
    #[serde(default)]
    pub position_offset: Vec3,
    /// (yaw, pitch) offset in degrees.
    #[serde(default)]
    pub rotation_offset: Vec2,
    /// Roll composed after the look-at, in degrees.
    #[serde(default)]
    pub lens_rotation: f32,
    #[serde(default)]
    pub screen_facing: bool,
}

/// Scenario-wide defaults every renderer starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfiguration {
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_window_title")]
    pub window_title: String,
    #[serde(default = "default_msaa_samples")]
    pub msaa_samples: u32,
    #[serde(default = "default_true")]
    pub vsync: bool,

    #[serde(default)]
    pub camera_positions: Vec<CameraKeyframe>,
    #[serde(default)]
    pub lens_rotations: Vec<f32>,
    #[serde(default = "default_camera_speed")]
    pub camera_speed: f32,
    #[serde(default)]
    pub loop_camera: bool,
    /// Follow the shared camera path; otherwise hold the first keyframe.
    #[serde(default = "default_true")]
    pub move_camera: bool,
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_near_plane")]
    pub near_plane: f32,
    #[serde(default = "default_far_plane")]
    pub far_plane: f32,
    #[serde(default = "default_world_up")]
    pub world_up: Vec3,

    #[serde(default)]
    pub lights: Vec<Light>,
    #[serde(default = "default_true")]
    pub enable_lighting: bool,
    #[serde(default = "default_anisotropy")]
    pub anisotropy: u16,
    #[serde(default)]
    pub lod_bias: f32,
    #[serde(default)]
    pub culling: CullMode,
    #[serde(default)]
    pub front_face: FrontFace,
    #[serde(default)]
    pub alpha_blending: bool,
    #[serde(default = "default_true")]
    pub depth_test: bool,
    #[serde(default)]
    pub apply_tone_mapping: bool,
    #[serde(default)]
    pub apply_gamma_correction: bool,
    #[serde(default = "default_ambient_color")]
    pub ambient_color: Vec3,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_shininess")]
    pub shininess: f32,
    #[serde(default)]
    pub distortion_strength: f32,
    #[serde(default)]
    pub reflection_strength: f32,
    #[serde(default)]
    pub shadow: ShadowSettings,
    /// Check the device after every call and fail fast.
    #[serde(default)]
    pub debug: bool,
}

fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    720
}
fn default_window_title() -> String {
    "FrameBench".to_string()
}
fn default_msaa_samples() -> u32 {
    4
}
fn default_true() -> bool {
    true
}
fn default_camera_speed() -> f32 {
    0.1
}
fn default_fov() -> f32 {
    45.0
}
fn default_near_plane() -> f32 {
    0.1
}
fn default_far_plane() -> f32 {
    1000.0
}
fn default_world_up() -> Vec3 {
    Vec3::Y
}
fn default_anisotropy() -> u16 {
    16
}
fn default_ambient_color() -> Vec3 {
    Vec3::splat(0.1)
}
fn default_opacity() -> f32 {
    1.0
}
fn default_shininess() -> f32 {
    32.0
}

impl Default for RendererConfiguration {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            window_title: default_window_title(),
            msaa_samples: default_msaa_samples(),
            vsync: true,
            camera_positions: Vec::new(),
            lens_rotations: Vec::new(),
            camera_speed: default_camera_speed(),
            loop_camera: false,
            move_camera: true,
            fov: default_fov(),
            near_plane: default_near_plane(),
            far_plane: default_far_plane(),
            world_up: default_world_up(),
            lights: Vec::new(),
            enable_lighting: true,
            anisotropy: default_anisotropy(),
            lod_bias: 0.0,
            culling: CullMode::None,
            front_face: FrontFace::Ccw,
            alpha_blending: false,
            depth_test: true,
            apply_tone_mapping: false,
            apply_gamma_correction: false,
            ambient_color: default_ambient_color(),
            opacity: default_opacity(),
            shininess: default_shininess(),
            distortion_strength: 0.0,
            reflection_strength: 0.0,
            shadow: ShadowSettings::default(),
            debug: false,
        }
    }
}

/// Auto-rotation as written in a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoRotationConfig {
    pub axis: Vec3,
    /// Degrees per second.
    pub speed: f32,
}

/// Per-renderer overrides. Unset fields keep the scenario default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOverrides {
    pub camera_positions: Option<Vec<CameraKeyframe>>,
    pub lens_rotations: Option<Vec<f32>>,
    pub move_camera: Option<bool>,
    pub fov: Option<f32>,
    pub near_plane: Option<f32>,
    pub far_plane: Option<f32>,
    pub lights: Option<Vec<Light>>,
    pub enable_lighting: Option<bool>,
    pub anisotropy: Option<u16>,
    pub lod_bias: Option<f32>,
    pub culling: Option<CullMode>,
    pub front_face: Option<FrontFace>,
    pub alpha_blending: Option<bool>,
    pub depth_test: Option<bool>,
    pub apply_tone_mapping: Option<bool>,
    pub apply_gamma_correction: Option<bool>,
    pub ambient_color: Option<Vec3>,
    pub opacity: Option<f32>,
    pub shininess: Option<f32>,
    pub distortion_strength: Option<f32>,
    pub reflection_strength: Option<f32>,
    pub debug: Option<bool>,

    // Renderer-only fields, no scenario default.
    pub position: Option<Vec3>,
    /// Euler angles in degrees.
    pub rotation: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub auto_rotation: Option<AutoRotationConfig>,
    pub shadows: Option<bool>,
    pub planar_camera: Option<PlanarCameraConfig>,
    pub shader_folder: Option<String>,
}

impl RendererConfiguration {
    /// A copy of the defaults with every set override applied.
    pub fn with_overrides(&self, overrides: &RenderOverrides) -> RendererConfiguration {
        let mut merged = self.clone();
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &overrides.$field { merged.$field = value.clone(); })*
            };
        }
        merge!(
            camera_positions,
            lens_rotations,
            move_camera,
            fov,
            near_plane,
            far_plane,
            lights,
            enable_lighting,
            anisotropy,
            lod_bias,
            culling,
            front_face,
            alpha_blending,
            depth_test,
            apply_tone_mapping,
            apply_gamma_correction,
            ambient_color,
            opacity,
            shininess,
            distortion_strength,
            reflection_strength,
            debug,
        );
        merged
    }

    /// Merge and validate the settings every renderer needs.
    pub fn resolve(&self, name: &str, shader_folder: &str, overrides: &RenderOverrides) -> Result<RendererSettings, ConfigError> {
        let merged = self.with_overrides(overrides);
        let invalid = |key: &'static str, reason: String| ConfigError::InvalidParameter {
            renderer: name.to_string(),
            key,
            reason,
        };

        if name.is_empty() {
            return Err(invalid("name", "renderer name is empty".into()));
        }
        if merged.camera_positions.is_empty() {
            return Err(ConfigError::MissingParameter {
                renderer: name.to_string(),
                key: "camera_positions",
            });
        }
        if merged.window_width == 0 || merged.window_height == 0 {
            return Err(invalid(
                "window_size",
                format!("{}x{}", merged.window_width, merged.window_height),
            ));
        }
        if !(merged.fov > 0.0 && merged.fov < 180.0) {
            return Err(invalid("fov", format!("{} is outside (0, 180)", merged.fov)));
        }
        if !(merged.near_plane > 0.0 && merged.near_plane < merged.far_plane) {
            return Err(invalid(
                "near_plane",
                format!("near {} must be positive and below far {}", merged.near_plane, merged.far_plane),
            ));
        }

        let shadows = overrides.shadows.unwrap_or(false);
        if shadows && merged.lights.is_empty() {
            return Err(ConfigError::MissingParameter {
                renderer: name.to_string(),
                key: "lights",
            });
        }
        if let Some(planar) = &overrides.planar_camera {
            if planar.resolution.is_some_and(|(w, h)| w == 0 || h == 0) {
                return Err(invalid("planar_camera.resolution", "zero-sized target".into()));
            }
        }

        let transform = Transform::from_euler_degrees(
            overrides.position.unwrap_or(Vec3::ZERO),
            overrides.rotation.unwrap_or(Vec3::ZERO),
            overrides.scale.unwrap_or(Vec3::ONE),
        );
        let auto_rotation = overrides
            .auto_rotation
            .map(|a| AutoRotation::new(a.axis, a.speed))
            .unwrap_or_default();

        Ok(RendererSettings {
            name: name.to_string(),
            shader_folder: overrides.shader_folder.clone().unwrap_or_else(|| shader_folder.to_string()),
            width: merged.window_width,
            height: merged.window_height,
            camera_positions: merged.camera_positions,
            lens_rotations: merged.lens_rotations,
            move_camera: merged.move_camera,
            fov: merged.fov,
            near: merged.near_plane,
            far: merged.far_plane,
            up: merged.world_up,
            lights: merged.lights,
            enable_lighting: merged.enable_lighting,
            anisotropy: merged.anisotropy.max(1),
            lod_bias: merged.lod_bias,
            cull: CullState {
                face: match merged.culling {
                    CullMode::None => None,
                    CullMode::Back => Some(Face::Back),
                    CullMode::Front => Some(Face::Front),
                },
                winding: match merged.front_face {
                    FrontFace::Ccw => Winding::CounterClockwise,
                    FrontFace::Cw => Winding::Clockwise,
                },
            },
            blend: if merged.alpha_blending { BlendMode::Alpha } else { BlendMode::Disabled },
            depth: if merged.depth_test { DepthState::enabled(DepthFunc::Less) } else { DepthState::DISABLED },
            tone_mapping: merged.apply_tone_mapping,
            gamma_correction: merged.apply_gamma_correction,
            ambient_color: merged.ambient_color,
            opacity: merged.opacity,
            shininess: merged.shininess,
            distortion_strength: merged.distortion_strength,
            reflection_strength: merged.reflection_strength,
            transform,
            auto_rotation,
            shadows: shadows.then_some(merged.shadow),
            planar_camera: overrides.planar_camera,
            debug: merged.debug,
        })
    }

    pub fn add_model(&self, name: &str, params: &ModelParams, overrides: &RenderOverrides) -> Result<ModelConfig, ConfigError> {
        let settings = self.resolve(name, "model", overrides)?;
        let path = params.path.clone().ok_or_else(|| missing(name, "path"))?;
        Ok(ModelConfig {
            settings,
            path,
            material: params.material,
        })
    }

    pub fn add_surface(&self, name: &str, params: &SurfaceParams, overrides: &RenderOverrides) -> Result<SurfaceConfig, ConfigError> {
        let settings = self.resolve(name, "surface", overrides)?;
        let width = params.width.ok_or_else(|| missing(name, "width"))?;
        let height = params.height.ok_or_else(|| missing(name, "height"))?;
        if !(width > 0.0 && height > 0.0) {
            return Err(ConfigError::InvalidParameter {
                renderer: name.to_string(),
                key: "width",
                reason: format!("surface size {width}x{height} must be positive"),
            });
        }
        Ok(SurfaceConfig {
            settings,
            width,
            height,
            wave: params.wave,
            normal_map: params.normal_map.clone(),
            dudv_map: params.dudv_map.clone(),
            environment: params.environment.clone(),
        })
    }

    pub fn add_skybox(&self, name: &str, params: &SkyboxParams, overrides: &RenderOverrides) -> Result<SkyboxConfig, ConfigError> {
        let settings = self.resolve(name, "skybox", overrides)?;
        let faces = params.faces.clone().ok_or_else(|| missing(name, "faces"))?;
        Ok(SkyboxConfig { settings, faces })
    }

    pub fn add_particle(&self, name: &str, params: &ParticleParams, overrides: &RenderOverrides) -> Result<ParticleConfig, ConfigError> {
        let settings = self.resolve(name, "particle", overrides)?;
        let count = params.count.ok_or_else(|| missing(name, "count"))?;
        let invalid = |key: &'static str, reason: &str| ConfigError::InvalidParameter {
            renderer: name.to_string(),
            key,
            reason: reason.to_string(),
        };
        if count == 0 {
            return Err(invalid("count", "at least one particle is required"));
        }
        let Some(ground_normal) = params.physics.ground_normal.try_normalize() else {
            return Err(invalid("ground_normal", "normal has zero length"));
        };
        if params.physics.max_velocity <= 0.0 {
            return Err(invalid("max_velocity", "must be positive"));
        }
        Ok(ParticleConfig {
            settings,
            count,
            seed: params.seed,
            backend: params.backend,
            physics: ParticlePhysics {
                ground_normal,
                ..params.physics
            },
            spawn: params.spawn,
            size: params.size,
            color: params.color,
        })
    }
}

fn missing(renderer: &str, key: &'static str) -> ConfigError {
    ConfigError::MissingParameter {
        renderer: renderer.to_string(),
        key,
    }
}

/// Validated parameters shared by every renderer kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    pub name: String,
    pub shader_folder: String,
    pub width: u32,
    pub height: u32,
    pub camera_positions: Vec<CameraKeyframe>,
    pub lens_rotations: Vec<f32>,
    pub move_camera: bool,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub up: Vec3,
    pub lights: Vec<Light>,
    pub enable_lighting: bool,
    pub anisotropy: u16,
    pub lod_bias: f32,
    pub cull: CullState,
    pub blend: BlendMode,
    pub depth: DepthState,
    pub tone_mapping: bool,
    pub gamma_correction: bool,
    pub ambient_color: Vec3,
    pub opacity: f32,
    pub shininess: f32,
    pub distortion_strength: f32,
    pub reflection_strength: f32,
    pub transform: Transform,
    pub auto_rotation: AutoRotation,
    pub shadows: Option<ShadowSettings>,
    pub planar_camera: Option<PlanarCameraConfig>,
    pub debug: bool,
}

impl RendererSettings {
    /// Planar target size, defaulting to the window size.
    pub fn planar_resolution(&self) -> Option<(u32, u32)> {
        self.planar_camera
            .map(|p| p.resolution.unwrap_or((self.width, self.height)))
    }
}

/// Model parameters as written in a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub path: Option<PathBuf>,
    /// Constructor-level PBR values, below the material file and above the defaults.
    pub material: PbrOverrides,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub settings: RendererSettings,
    pub path: PathBuf,
    pub material: PbrOverrides,
}

/// Wave animation of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveParams {
    #[serde(default = "default_wave_speed")]
    pub speed: f32,
    #[serde(default = "default_wave_amplitude")]
    pub amplitude: f32,
    #[serde(default = "default_wave_frequency")]
    pub frequency: f32,
    #[serde(default)]
    pub randomness: f32,
    #[serde(default = "default_tex_frequency")]
    pub tex_frequency: f32,
    #[serde(default = "default_tex_amplitude")]
    pub tex_amplitude: f32,
}

fn default_wave_speed() -> f32 {
    1.0
}
fn default_wave_amplitude() -> f32 {
    0.1
}
fn default_wave_frequency() -> f32 {
    1.0
}
fn default_tex_frequency() -> f32 {
    1.0
}
fn default_tex_amplitude() -> f32 {
    0.01
}

impl Default for WaveParams {
    fn default() -> Self {
        Self {
            speed: default_wave_speed(),
            amplitude: default_wave_amplitude(),
            frequency: default_wave_frequency(),
            randomness: 0.0,
            tex_frequency: default_tex_frequency(),
            tex_amplitude: default_tex_amplitude(),
        }
    }
}

/// Surface parameters as written in a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceParams {
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub wave: WaveParams,
    pub normal_map: Option<PathBuf>,
    pub dudv_map: Option<PathBuf>,
    /// Cube map faces in +X, -X, +Y, -Y, +Z, -Z order.
    pub environment: Option<[PathBuf; 6]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceConfig {
    pub settings: RendererSettings,
    pub width: f32,
    pub height: f32,
    pub wave: WaveParams,
    pub normal_map: Option<PathBuf>,
    pub dudv_map: Option<PathBuf>,
    pub environment: Option<[PathBuf; 6]>,
}

/// Skybox parameters as written in a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyboxParams {
    /// Faces in +X, -X, +Y, -Y, +Z, -Z order.
    pub faces: Option<[PathBuf; 6]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkyboxConfig {
    pub settings: RendererSettings,
    pub faces: [PathBuf; 6],
}

/// Where particles are simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParticleBackend {
    /// Host loop, re-uploaded every frame.
    #[default]
    Cpu,
    /// Two GPU buffers, each step reads one and writes the other.
    TransformFeedback,
    /// One GPU storage buffer updated in place.
    Compute,
}

/// The physical model every particle backend implements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticlePhysics {
    #[serde(default = "default_gravity")]
    pub gravity: Vec3,
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f32,
    #[serde(default = "default_bounce")]
    pub bounce_factor: f32,
    #[serde(default = "default_world_up")]
    pub ground_normal: Vec3,
    #[serde(default)]
    pub ground_height: f32,
}

fn default_gravity() -> Vec3 {
    Vec3::new(0.0, -9.81, 0.0)
}
fn default_max_velocity() -> f32 {
    20.0
}
fn default_bounce() -> f32 {
    0.6
}

impl Default for ParticlePhysics {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            max_velocity: default_max_velocity(),
            bounce_factor: default_bounce(),
            ground_normal: Vec3::Y,
            ground_height: 0.0,
        }
    }
}

/// Initial particle distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnParams {
    #[serde(default = "default_spawn_center")]
    pub center: Vec3,
    #[serde(default = "default_spawn_radius")]
    pub radius: f32,
    #[serde(default = "default_initial_speed")]
    pub initial_speed: f32,
}

fn default_spawn_center() -> Vec3 {
    Vec3::new(0.0, 5.0, 0.0)
}
fn default_spawn_radius() -> f32 {
    2.0
}
fn default_initial_speed() -> f32 {
    3.0
}

impl Default for SpawnParams {
    fn default() -> Self {
        Self {
            center: default_spawn_center(),
            radius: default_spawn_radius(),
            initial_speed: default_initial_speed(),
        }
    }
}

/// Particle parameters as written in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleParams {
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub backend: ParticleBackend,
    #[serde(default)]
    pub physics: ParticlePhysics,
    #[serde(default)]
    pub spawn: SpawnParams,
    #[serde(default = "default_particle_size")]
    pub size: f32,
    #[serde(default = "default_particle_color")]
    pub color: Vec4,
}

fn default_particle_size() -> f32 {
    0.05
}
fn default_particle_color() -> Vec4 {
    Vec4::new(1.0, 0.6, 0.2, 1.0)
}

impl Default for ParticleParams {
    fn default() -> Self {
        Self {
            count: None,
            seed: 0,
            backend: ParticleBackend::Cpu,
            physics: ParticlePhysics::default(),
            spawn: SpawnParams::default(),
            size: default_particle_size(),
            color: default_particle_color(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleConfig {
    pub settings: RendererSettings,
    pub count: u32,
    pub seed: u64,
    pub backend: ParticleBackend,
    pub physics: ParticlePhysics,
    pub spawn: SpawnParams,
    pub size: f32,
    pub color: Vec4,
}

/// A validated renderer config of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum VariantConfig {
    Model(ModelConfig),
    Surface(SurfaceConfig),
    Skybox(SkyboxConfig),
    Particle(ParticleConfig),
}

impl VariantConfig {
    pub fn settings(&self) -> &RendererSettings {
        match self {
            VariantConfig::Model(c) => &c.settings,
            VariantConfig::Surface(c) => &c.settings,
            VariantConfig::Skybox(c) => &c.settings,
            VariantConfig::Particle(c) => &c.settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings().name
    }
}

/// Renderer kind and its parameters, as written in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RendererKind {
    Model(ModelParams),
    Surface(SurfaceParams),
    Skybox(SkyboxParams),
    Particle(ParticleParams),
}

/// One renderer of a scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererEntry {
    pub name: String,
    /// Main-pass order; appended after the current maximum when unset.
    #[serde(default)]
    pub order: Option<i32>,
    pub kind: RendererKind,
    #[serde(default)]
    pub overrides: RenderOverrides,
}

/// Loop termination and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Seconds of simulated time; unbounded when unset.
    #[serde(default = "default_duration")]
    pub duration: Option<f32>,
    #[serde(default)]
    pub frame_limit: Option<u64>,
    /// Sleep after each frame, in milliseconds.
    #[serde(default = "default_frame_yield_ms")]
    pub frame_yield_ms: u64,
    #[serde(default = "default_clear_color")]
    pub clear_color: Vec4,
}

fn default_duration() -> Option<f32> {
    Some(30.0)
}
fn default_frame_yield_ms() -> u64 {
    1
}
fn default_clear_color() -> Vec4 {
    Vec4::new(0.0, 0.0, 0.0, 1.0)
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            frame_limit: None,
            frame_yield_ms: default_frame_yield_ms(),
            clear_color: default_clear_color(),
        }
    }
}

/// A complete scenario as stored in a RON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFile {
    #[serde(default)]
    pub defaults: RendererConfiguration,
    #[serde(default)]
    pub renderers: Vec<RendererEntry>,
    #[serde(default)]
    pub run: RunSettings,
}

/// A renderer ready to be constructed, with its requested order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRenderer {
    pub order: Option<i32>,
    pub config: VariantConfig,
}

impl ScenarioFile {
    pub fn from_ron(source: &str) -> Result<Self, ConfigError> {
        ron::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let scenario = Self::from_ron(&data)?;
        log::info!("Loaded scenario {:?} with {} renderers", path, scenario.renderers.len());
        Ok(scenario)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate every renderer entry in file order.
    pub fn plan(&self) -> Result<Vec<PlannedRenderer>, ConfigError> {
        let mut seen = HashSet::new();
        self.renderers
            .iter()
            .map(|entry| {
                if !seen.insert(entry.name.as_str()) {
                    return Err(ConfigError::DuplicateRenderer(entry.name.clone()));
                }
                let (name, overrides, defaults) = (&entry.name, &entry.overrides, &self.defaults);
                let config = match &entry.kind {
                    RendererKind::Model(p) => VariantConfig::Model(defaults.add_model(name, p, overrides)?),
                    RendererKind::Surface(p) => VariantConfig::Surface(defaults.add_surface(name, p, overrides)?),
                    RendererKind::Skybox(p) => VariantConfig::Skybox(defaults.add_skybox(name, p, overrides)?),
                    RendererKind::Particle(p) => VariantConfig::Particle(defaults.add_particle(name, p, overrides)?),
                };
                Ok(PlannedRenderer {
                    order: entry.order,
                    config,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> RendererConfiguration {
        RendererConfiguration {
            camera_positions: vec![CameraKeyframe::new(0.0, 5.0, 10.0, -90.0, -20.0)],
            ..Default::default()
        }
    }

    #[test]
    fn overrides_replace_only_set_fields() {
        let overrides = RenderOverrides {
            fov: Some(60.0),
            alpha_blending: Some(true),
            ..Default::default()
        };
        let merged = defaults().with_overrides(&overrides);
        assert_eq!(merged.fov, 60.0);
        assert!(merged.alpha_blending);
        assert_eq!(merged.near_plane, defaults().near_plane);
        assert_eq!(merged.camera_positions, defaults().camera_positions);
    }

    #[test]
    fn missing_camera_positions_fail_at_construction() {
        let err = RendererConfiguration::default()
            .add_skybox("sky", &SkyboxParams::default(), &RenderOverrides::default())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingParameter {
                renderer: "sky".into(),
                key: "camera_positions"
            }
        );
    }

    #[test]
    fn variant_required_keys_are_reported() {
        let none = RenderOverrides::default();
        let err = defaults().add_surface("water", &SurfaceParams::default(), &none).unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter { key: "width", .. }));
        let err = defaults().add_model("teapot", &ModelParams::default(), &none).unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter { key: "path", .. }));
        let err = defaults().add_particle("sparks", &ParticleParams::default(), &none).unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter { key: "count", .. }));
    }

    #[test]
    fn shadows_require_a_light() {
        let overrides = RenderOverrides {
            shadows: Some(true),
            ..Default::default()
        };
        let err = defaults()
            .add_skybox("sky", &SkyboxParams::default(), &overrides)
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter { key: "lights", .. }));
    }

    #[test]
    fn surface_settings_resolve_transform_and_state() {
        let overrides = RenderOverrides {
            position: Some(Vec3::new(0.0, -1.0, 0.0)),
            culling: Some(CullMode::Back),
            alpha_blending: Some(true),
            planar_camera: Some(PlanarCameraConfig::default()),
            ..Default::default()
        };
        let params = SurfaceParams {
            width: Some(50.0),
            height: Some(50.0),
            ..Default::default()
        };
        let config = defaults().add_surface("water", &params, &overrides).unwrap();
        let settings = &config.settings;
        assert_eq!(settings.shader_folder, "surface");
        assert_eq!(settings.transform.position, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(settings.cull.face, Some(Face::Back));
        assert_eq!(settings.blend, BlendMode::Alpha);
        assert_eq!(settings.planar_resolution(), Some((1280, 720)));
        assert!(settings.shadows.is_none());
    }

    #[test]
    fn scenario_parses_from_ron() {
        let source = r#"(
            defaults: (
                window_width: 800,
                window_height: 600,
                camera_positions: [(position: (0.0, 2.0, 8.0), yaw: -90.0, pitch: 0.0)],
            ),
            renderers: [
                (name: "sky", kind: Skybox((faces: Some(("r.png", "l.png", "u.png", "d.png", "f.png", "b.png"))))),
                (name: "water", order: Some(3), kind: Surface((width: Some(50.0), height: Some(50.0), wave: (speed: 6.0)))),
            ],
            run: (duration: Some(5.0)),
        )"#;
        let scenario = ScenarioFile::from_ron(source).unwrap();
        assert_eq!(scenario.defaults.window_width, 800);
        assert_eq!(scenario.run.duration, Some(5.0));
        let plan = scenario.plan().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].order, Some(3));
        match &plan[1].config {
            VariantConfig::Surface(surface) => assert_eq!(surface.wave.speed, 6.0),
            other => panic!("expected a surface, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let entry = RendererEntry {
            name: "sky".into(),
            order: None,
            kind: RendererKind::Skybox(SkyboxParams {
                faces: Some(std::array::from_fn(|i| PathBuf::from(format!("{i}.png")))),
            }),
            overrides: RenderOverrides::default(),
        };
        let scenario = ScenarioFile {
            defaults: defaults(),
            renderers: vec![entry.clone(), entry],
            run: RunSettings::default(),
        };
        assert_eq!(scenario.plan().unwrap_err(), ConfigError::DuplicateRenderer("sky".into()));
    }
}
