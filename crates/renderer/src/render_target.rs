//! Offscreen render target bookkeeping.

use std::collections::BTreeMap;

use crate::device::{DeviceError, GraphicsDevice, RenderTargetDesc, RenderTargetId, TextureId, Viewport};

/// A render target plus the size it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub id: RenderTargetId,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }
}

/// Creates and destroys colour+depth targets keyed by owner name.
#[derive(Debug, Default)]
pub struct FramebufferManager {
    targets: BTreeMap<String, RenderTarget>,
}

impl FramebufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a colour+depth target for `owner`, replacing any previous one.
    pub fn allocate(
        &mut self,
        device: &mut dyn GraphicsDevice,
        owner: &str,
        width: u32,
        height: u32,
    ) -> Result<RenderTarget, DeviceError> {
        self.destroy(device, owner);
        let id = device.create_render_target(&RenderTargetDesc {
            label: format!("{owner} framebuffer"),
            width,
            height,
            color: true,
            depth: true,
        })?;
        let target = RenderTarget { id, width, height };
        log::debug!("allocated {width}x{height} framebuffer for '{owner}'");
        self.targets.insert(owner.to_string(), target);
        Ok(target)
    }

    pub fn get(&self, owner: &str) -> Option<RenderTarget> {
        self.targets.get(owner).copied()
    }

    pub fn texture(&self, device: &dyn GraphicsDevice, owner: &str) -> Option<TextureId> {
        self.get(owner).and_then(|t| device.render_target_texture(t.id))
    }

    /// Destroy the target of `owner`. Returns false when it had none.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice, owner: &str) -> bool {
        match self.targets.remove(owner) {
            Some(target) => {
                device.delete_render_target(target.id);
                true
            }
            None => false,
        }
    }

    pub fn destroy_all(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, target) in std::mem::take(&mut self.targets) {
            device.delete_render_target(target.id);
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingDevice;

    #[test]
    fn allocate_replaces_and_destroy_releases() {
        let mut device = RecordingDevice::new(800, 600);
        let mut framebuffers = FramebufferManager::new();
        framebuffers.allocate(&mut device, "water", 800, 600).unwrap();
        framebuffers.allocate(&mut device, "water", 400, 300).unwrap();
        framebuffers.allocate(&mut device, "skybox", 800, 600).unwrap();
        assert_eq!(framebuffers.len(), 2);
        assert_eq!(device.live_render_targets(), 2);
        assert_eq!(framebuffers.get("water").map(|t| t.width), Some(400));
        assert!(framebuffers.texture(&device, "water").is_some());

        assert!(framebuffers.destroy(&mut device, "water"));
        assert!(!framebuffers.destroy(&mut device, "water"));
        framebuffers.destroy_all(&mut device);
        assert_eq!(device.live_render_targets(), 0);
        assert!(device.take_error().is_none());
    }
}
