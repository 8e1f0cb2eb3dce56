//! Shadow maps: one depth-only target per shadow-casting light.

use std::collections::BTreeMap;

use engine_core::Light;
use glam::Mat4;
use renderer::{DeviceError, GraphicsDevice, RenderTarget, RenderTargetDesc, TextureId, Viewport};

/// Orthographic light frustum times a look-at from the light toward the origin.
pub fn calculate_light_space_matrix(light: &Light) -> Mat4 {
    light.light_space_matrix()
}

/// Owns the shadow map targets of one rendering instance.
#[derive(Debug, Default)]
pub struct ShadowMapManager {
    maps: BTreeMap<usize, RenderTarget>,
    light_space: Option<Mat4>,
}

impl ShadowMapManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure light `light` has a `size x size` depth target. Returns true when one was created.
    pub fn ensure(&mut self, device: &mut dyn GraphicsDevice, light: usize, size: u32) -> Result<bool, DeviceError> {
        if self.maps.contains_key(&light) {
            return Ok(false);
        }
        let id = device.create_render_target(&RenderTargetDesc {
            label: format!("shadow map {light}"),
            width: size,
            height: size,
            color: false,
            depth: true,
        })?;
        log::debug!("allocated {size}x{size} shadow map for light {light}");
        self.maps.insert(
            light,
            RenderTarget {
                id,
                width: size,
                height: size,
            },
        );
        Ok(true)
    }

    pub fn target(&self, light: usize) -> Option<RenderTarget> {
        self.maps.get(&light).copied()
    }

    /// Depth texture sampled by the main pass.
    pub fn texture(&self, device: &dyn GraphicsDevice, light: usize) -> Option<TextureId> {
        self.target(light).and_then(|t| device.render_target_texture(t.id))
    }

    /// Light-space matrix of the current frame's shadow pass.
    pub fn light_space(&self) -> Option<Mat4> {
        self.light_space
    }

    /// Bind and clear the map of light `index`, remembering its light-space matrix.
    /// Returns `None` when that light has no map.
    pub fn begin_pass(&mut self, device: &mut dyn GraphicsDevice, index: usize, light: &Light) -> Option<Mat4> {
        let target = self.target(index)?;
        let light_space = calculate_light_space_matrix(light);
        self.light_space = Some(light_space);
        device.bind_render_target(Some(target.id));
        device.set_viewport(target.viewport());
        device.clear(None, true);
        Some(light_space)
    }

    /// Rebind the default framebuffer and its viewport.
    pub fn end_pass(&self, device: &mut dyn GraphicsDevice, viewport: Viewport) {
        device.bind_render_target(None);
        device.set_viewport(viewport);
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice, light: usize) -> bool {
        match self.maps.remove(&light) {
            Some(target) => {
                device.delete_render_target(target.id);
                true
            }
            None => false,
        }
    }

    pub fn destroy_all(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, target) in std::mem::take(&mut self.maps) {
            device.delete_render_target(target.id);
        }
        self.light_space = None;
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::ShadowBounds;
    use glam::Vec3;
    use renderer::{Command, RecordingDevice};

    #[test]
    fn ensure_allocates_once_per_light() {
        let mut device = RecordingDevice::new(64, 64);
        let mut maps = ShadowMapManager::new();
        assert!(maps.ensure(&mut device, 0, 512).unwrap());
        assert!(!maps.ensure(&mut device, 0, 512).unwrap());
        assert_eq!(device.live_render_targets(), 1);
        assert!(maps.texture(&device, 0).is_some());
        maps.destroy_all(&mut device);
        assert!(maps.is_empty());
        assert_eq!(device.live_render_targets(), 0);
    }

    #[test]
    fn begin_pass_clears_depth_of_the_light_target() {
        let mut device = RecordingDevice::new(64, 64);
        let mut maps = ShadowMapManager::new();
        maps.ensure(&mut device, 0, 256).unwrap();
        let light = Light::new(Vec3::new(5.0, 10.0, 5.0), Vec3::ONE, 1.0).with_shadow(ShadowBounds::default());
        device.clear_commands();

        let matrix = maps.begin_pass(&mut device, 0, &light).unwrap();
        assert_eq!(maps.light_space(), Some(matrix));
        assert_eq!(matrix, light.light_space_matrix());
        assert!(device.commands().contains(&Command::Clear { color: None, depth: true }));
        assert!(device.commands().contains(&Command::SetViewport(Viewport::new(256, 256))));
        assert!(maps.begin_pass(&mut device, 1, &light).is_none());
        assert!(device.take_error().is_none());
    }
}
