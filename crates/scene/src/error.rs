//! Error types for scene construction and the frame loop.

use std::path::PathBuf;

use engine_core::CameraPathError;
use renderer::{DeviceError, ShaderError};
use thiserror::Error;

/// A scenario or renderer parameter set that cannot be resolved.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("renderer '{renderer}' is missing required parameter '{key}'")]
    MissingParameter { renderer: String, key: &'static str },
    #[error("renderer '{renderer}' has an invalid '{key}': {reason}")]
    InvalidParameter {
        renderer: String,
        key: &'static str,
        reason: String,
    },
    #[error("duplicate renderer name '{0}' in scenario")]
    DuplicateRenderer(String),
    #[error("failed to parse scenario: {0}")]
    Parse(String),
    #[error("failed to read scenario {path:?}: {message}")]
    Io { path: PathBuf, message: String },
    #[error(transparent)]
    CameraPath(#[from] CameraPathError),
}

/// Asset loading failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssetError {
    #[error("asset {0:?} not found")]
    NotFound(PathBuf),
    #[error("failed to decode image {path:?}: {message}")]
    Image { path: PathBuf, message: String },
    #[error("failed to load model {path:?}: {message}")]
    Model { path: PathBuf, message: String },
    #[error("model {0:?} contains no geometry")]
    EmptyModel(PathBuf),
    #[error("cube map faces differ in size or format (first face {0:?})")]
    InconsistentCubeMap(PathBuf),
    #[error("material '{material}': invalid value '{value}' for '{key}'")]
    MaterialParameter {
        material: String,
        key: String,
        value: String,
    },
}

/// Failure inside a renderer variant, before the renderer name is attached.
#[derive(Debug, Error)]
pub enum VariantError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

impl VariantError {
    pub(crate) fn for_renderer(self, renderer: &str) -> SceneError {
        let renderer = renderer.to_string();
        match self {
            VariantError::Device(source) => SceneError::Device { renderer, source },
            VariantError::Asset(source) => SceneError::Asset { renderer, source },
        }
    }
}

/// Everything that can abort a benchmark run.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("renderer '{renderer}': {source}")]
    Asset {
        renderer: String,
        #[source]
        source: AssetError,
    },
    #[error("renderer '{renderer}': {source}")]
    Shader {
        renderer: String,
        #[source]
        source: ShaderError,
    },
    #[error("renderer '{renderer}': {source}")]
    Device {
        renderer: String,
        #[source]
        source: DeviceError,
    },
    /// Raised in debug mode when a call inside a render sequence fails.
    #[error("renderer '{renderer}' draw failed: {source}")]
    Draw {
        renderer: String,
        #[source]
        source: DeviceError,
    },
    #[error("renderer '{0}' used before setup")]
    NotReady(String),
    #[error("graphics context: {0}")]
    Context(#[source] DeviceError),
}

impl SceneError {
    /// Name of the renderer the error belongs to, if any.
    pub fn renderer(&self) -> Option<&str> {
        match self {
            SceneError::Asset { renderer, .. }
            | SceneError::Shader { renderer, .. }
            | SceneError::Device { renderer, .. }
            | SceneError::Draw { renderer, .. } => Some(renderer),
            SceneError::NotReady(renderer) => Some(renderer),
            SceneError::Config(ConfigError::MissingParameter { renderer, .. })
            | SceneError::Config(ConfigError::InvalidParameter { renderer, .. }) => Some(renderer),
            _ => None,
        }
    }
}
