//! Scene renderers, the scene graph and the rendering instance that runs a benchmark.
//!
//! - [`RenderingInstance`]: device, window, render order and the frame loop
//! - [`SceneRenderer`]: one drawable with its programs, camera and shadow/planar passes
//! - [`SceneGraph`]: renderers by name
//! - [`config`]: renderer configuration, scenario files and run settings

pub mod assets;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod instance;
pub mod material;
pub mod message;
pub mod renderer;

pub use crate::assets::{AssetLoader, FsAssetLoader, MemoryAssets, ModelData, ModelGroup};
pub use crate::config::{
    ParticleBackend, RenderOverrides, RendererConfiguration, RendererKind, RunSettings, ScenarioFile, VariantConfig,
};
pub use crate::context::{GpuContext, Resources};
pub use crate::error::{AssetError, ConfigError, SceneError};
pub use crate::graph::SceneGraph;
pub use crate::instance::RenderingInstance;
pub use crate::message::{BenchMessage, MessageSink, NullSink, RunOutcome, RunReport, StdoutSink};
pub use crate::renderer::{RendererId, RendererState, RendererVariant, SceneRenderer};
