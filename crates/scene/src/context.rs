//! Services handed to renderers during setup and per frame.

use renderer::{GraphicsDevice, ShaderLibrary, TextureId, TextureUnitAllocator, UniformValue};

use crate::assets::AssetLoader;
use crate::renderer::shadow::ShadowMapManager;
use crate::renderer::RendererId;

/// Everything a renderer may touch, borrowed from the owning instance.
///
/// Built fresh for each setup and each frame so that a renderer never holds
/// on to device or allocator state between calls.
pub struct GpuContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub shaders: &'a ShaderLibrary,
    pub assets: &'a dyn AssetLoader,
    pub units: &'a mut TextureUnitAllocator,
    pub shadow_maps: &'a mut ShadowMapManager,
    /// Seconds since the run started.
    pub elapsed: f32,
}

impl<'a> GpuContext<'a> {
    /// Narrow view for one renderer's variant.
    pub fn resources(&mut self, owner: RendererId) -> Resources<'_> {
        Resources {
            device: &mut *self.device,
            assets: self.assets,
            units: &mut *self.units,
            owner,
        }
    }
}

/// The part of a [`GpuContext`] a renderer variant works with.
pub struct Resources<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub assets: &'a dyn AssetLoader,
    pub units: &'a mut TextureUnitAllocator,
    pub owner: RendererId,
}

impl Resources<'_> {
    /// Unit reserved for `role` of this renderer.
    pub fn unit(&mut self, role: &str) -> u32 {
        self.units.unit(self.owner.raw(), role)
    }

    /// Point sampler `role` at `texture` through this renderer's unit for it.
    pub fn bind_texture(&mut self, role: &str, texture: TextureId) {
        bind_texture(self.device, self.units, self.owner, role, texture);
    }
}

pub(crate) fn bind_texture(
    device: &mut dyn GraphicsDevice,
    units: &mut TextureUnitAllocator,
    owner: RendererId,
    role: &str,
    texture: TextureId,
) {
    let unit = units.unit(owner.raw(), role);
    device.set_uniform(role, UniformValue::Sampler(unit));
    device.bind_texture(unit, texture);
}
