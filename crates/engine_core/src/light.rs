//! Point lights and their optional shadow frustum.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Orthographic frustum used when a light casts shadows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowBounds {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    #[serde(default = "default_shadow_near")]
    pub near: f32,
    #[serde(default = "default_shadow_far")]
    pub far: f32,
}

fn default_shadow_near() -> f32 {
    1.0
}
fn default_shadow_far() -> f32 {
    100.0
}

impl Default for ShadowBounds {
    fn default() -> Self {
        Self {
            left: -20.0,
            right: 20.0,
            bottom: -20.0,
            top: 20.0,
            near: default_shadow_near(),
            far: default_shadow_far(),
        }
    }
}

/// A light source. Immutable for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub position: Vec3,
    /// Linear RGB.
    #[serde(default = "default_color")]
    pub color: Vec3,
    #[serde(default = "default_strength")]
    pub strength: f32,
    #[serde(default)]
    pub shadow: Option<ShadowBounds>,
}

fn default_color() -> Vec3 {
    Vec3::ONE
}
fn default_strength() -> f32 {
    1.0
}

impl Light {
    pub fn new(position: Vec3, color: Vec3, strength: f32) -> Self {
        Self {
            position,
            color,
            strength,
            shadow: None,
        }
    }

    pub fn with_shadow(mut self, bounds: ShadowBounds) -> Self {
        self.shadow = Some(bounds);
        self
    }

    /// Orthographic projection times a look-at from the light toward the world origin.
    pub fn light_space_matrix(&self) -> Mat4 {
        let bounds = self.shadow.unwrap_or_default();
        let projection = Mat4::orthographic_rh(
            bounds.left,
            bounds.right,
            bounds.bottom,
            bounds.top,
            bounds.near,
            bounds.far,
        );
        let direction = (Vec3::ZERO - self.position).normalize_or_zero();
        // Looking straight down the Y axis makes Y a degenerate up vector.
        let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_at_rh(self.position, Vec3::ZERO, up);
        projection * view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_space_maps_origin_inside_clip_volume() {
        let light = Light::new(Vec3::new(10.0, 20.0, 5.0), Vec3::ONE, 1.0)
            .with_shadow(ShadowBounds::default());
        let clip = light.light_space_matrix() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(clip.x.abs() < 1e-4);
        assert!(clip.y.abs() < 1e-4);
        assert!(clip.z >= 0.0 && clip.z <= 1.0);
    }

    #[test]
    fn overhead_light_has_finite_matrix() {
        let light = Light::new(Vec3::new(0.0, 30.0, 0.0), Vec3::ONE, 1.0);
        assert!(light.light_space_matrix().is_finite());
    }
}
