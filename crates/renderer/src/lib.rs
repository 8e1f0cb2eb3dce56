//! Graphics device abstraction and the building blocks renderers share.
//!
//! - [`GraphicsDevice`]: the single-context device contract
//! - [`GpuDevice`]: wgpu backend presenting to a window
//! - [`RecordingDevice`]: headless backend that records and validates calls
//! - Shader library, texture units, render targets, camera and mesh helpers

pub mod camera;
pub mod device;
pub mod gpu;
pub mod mesh;
pub mod pipeline;
pub mod recording;
pub mod render_target;
pub mod shader;
pub mod texture;
pub mod uniforms;
pub mod vertex;

pub use camera::*;
pub use device::*;
pub use gpu::GpuDevice;
pub use mesh::*;
pub use recording::{Command, RecordingDevice};
pub use render_target::*;
pub use shader::*;
pub use texture::*;
pub use uniforms::{names, UniformBlock, MAX_LIGHTS};
pub use vertex::*;
