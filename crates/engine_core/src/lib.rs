//! Core engine types shared by every FrameBench crate.
//!
//! This crate provides the foundational types used across all systems:
//! - Transform and auto-rotation
//! - Frame timing
//! - Lights
//! - Keyframed camera paths

pub mod camera_path;
pub mod light;
pub mod time;
pub mod transform;

pub use camera_path::*;
pub use light::*;
pub use time::*;
pub use transform::*;

// Re-export commonly used types
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
