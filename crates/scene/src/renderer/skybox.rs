//! Skybox renderer: a unit cube sampled with a cube map around the eye.

use std::path::PathBuf;

use glam::Mat4;
use renderer::{
    skybox_cube, strip_translation, BufferId, BufferKind, DepthFunc, DepthState, DrawCall, GraphicsDevice,
    SamplerSlot, SkyboxVertex, TextureId, TextureKind,
};

use super::{samplers, RendererVariant};
use crate::config::SkyboxConfig;
use crate::context::Resources;
use crate::error::VariantError;

pub struct SkyboxRenderer {
    name: String,
    faces: [PathBuf; 6],
    vertices: Option<BufferId>,
    vertex_count: u32,
    cube_map: Option<TextureId>,
}

impl SkyboxRenderer {
    pub fn new(config: SkyboxConfig) -> Self {
        Self {
            name: config.settings.name,
            faces: config.faces,
            vertices: None,
            vertex_count: 0,
            cube_map: None,
        }
    }
}

impl RendererVariant for SkyboxRenderer {
    fn kind(&self) -> &'static str {
        "skybox"
    }

    fn samplers(&self) -> Vec<SamplerSlot> {
        vec![SamplerSlot::new(samplers::SKYBOX, TextureKind::Cube)]
    }

    fn casts_shadow(&self) -> bool {
        false
    }

    /// Drawn at the far plane: passes where nothing else was drawn, never writes depth.
    fn depth_state(&self, configured: DepthState) -> DepthState {
        DepthState {
            test: configured.test,
            write: false,
            func: DepthFunc::LessEqual,
        }
    }

    fn view_matrix(&self, view: Mat4) -> Mat4 {
        strip_translation(view)
    }

    fn create_buffers(&mut self, res: &mut Resources<'_>) -> Result<(), VariantError> {
        let vertices = skybox_cube();
        self.vertices = Some(res.device.create_buffer(
            &format!("{} skybox cube", self.name),
            BufferKind::Vertex(SkyboxVertex::layout()),
            bytemuck::cast_slice(&vertices),
        )?);
        self.vertex_count = vertices.len() as u32;
        Ok(())
    }

    fn load_textures(&mut self, res: &mut Resources<'_>) -> Result<(), VariantError> {
        let cube = res.assets.load_cube_map(&self.faces)?;
        let label = format!("{} cube map", self.name);
        self.cube_map = Some(res.device.create_texture(&cube.desc(&label), &cube.data())?);
        Ok(())
    }

    fn draw_geometry(&mut self, res: &mut Resources<'_>) {
        let Some(vertices) = self.vertices else {
            return;
        };
        if let Some(cube_map) = self.cube_map {
            res.bind_texture(samplers::SKYBOX, cube_map);
        }
        res.device.draw(&DrawCall::arrays(vertices, self.vertex_count));
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(texture) = self.cube_map.take() {
            device.delete_texture(texture);
        }
        if let Some(buffer) = self.vertices.take() {
            device.delete_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::config::{RenderOverrides, RendererConfiguration, SkyboxParams};
    use crate::error::AssetError;
    use crate::renderer::RendererId;
    use engine_core::{CameraKeyframe, Vec3};
    use renderer::{ImageData, RecordingDevice, TextureUnitAllocator};

    fn faces() -> [PathBuf; 6] {
        ["right", "left", "top", "bottom", "front", "back"].map(|f| PathBuf::from(format!("sky/{f}.jpg")))
    }

    fn skybox() -> SkyboxRenderer {
        let defaults = RendererConfiguration {
            camera_positions: vec![CameraKeyframe::new(0.0, 0.0, 0.0, 0.0, 0.0)],
            ..Default::default()
        };
        let params = SkyboxParams { faces: Some(faces()) };
        SkyboxRenderer::new(defaults.add_skybox("sky", &params, &RenderOverrides::default()).unwrap())
    }

    #[test]
    fn view_translation_is_stripped_and_depth_not_written() {
        let sky = skybox();
        let view = Mat4::look_at_rh(Vec3::new(5.0, 2.0, 1.0), Vec3::ZERO, Vec3::Y);
        assert_eq!(sky.view_matrix(view).w_axis, glam::Vec4::W);
        let depth = sky.depth_state(DepthState::enabled(DepthFunc::Less));
        assert_eq!(depth.func, DepthFunc::LessEqual);
        assert!(depth.test && !depth.write);
        assert!(!sky.casts_shadow());
    }

    #[test]
    fn cube_has_36_vertices_and_one_cube_map() {
        let assets = faces()
            .iter()
            .fold(MemoryAssets::new(), |a, f| a.with_image(f.clone(), ImageData::solid(4, 4, [90, 120, 200, 255])));
        let mut device = RecordingDevice::new(64, 64);
        let mut units = TextureUnitAllocator::new();
        let mut res = Resources {
            device: &mut device,
            assets: &assets,
            units: &mut units,
            owner: RendererId::next(),
        };
        let mut sky = skybox();
        sky.create_buffers(&mut res).unwrap();
        sky.load_textures(&mut res).unwrap();
        assert_eq!(sky.vertex_count, 36);
        assert!(sky.cube_map.is_some());
        sky.release(res.device);
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn missing_face_fails_texture_loading() {
        let assets = MemoryAssets::new();
        let mut device = RecordingDevice::new(64, 64);
        let mut units = TextureUnitAllocator::new();
        let mut res = Resources {
            device: &mut device,
            assets: &assets,
            units: &mut units,
            owner: RendererId::next(),
        };
        let mut sky = skybox();
        let err = sky.load_textures(&mut res).unwrap_err();
        assert!(matches!(err, VariantError::Asset(AssetError::NotFound(_))));
    }
}
