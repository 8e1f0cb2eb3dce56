//! Animated surface (water) renderer: a flat quad displaced and shaded in the shaders.

use std::path::PathBuf;

use renderer::{
    names, quad, BufferId, BufferKind, DrawCall, GraphicsDevice, ImageData, SamplerSlot, SurfaceVertex, TextureId,
    TextureKind, UniformValue,
};

use super::{samplers, RendererVariant};
use crate::config::{SurfaceConfig, WaveParams};
use crate::context::Resources;
use crate::error::VariantError;

const FLAT_NORMAL: [u8; 4] = [128, 128, 255, 255];
/// Decodes to a zero offset.
const NEUTRAL_DUDV: [u8; 4] = [128, 128, 0, 255];

#[derive(Debug, Default)]
struct SurfaceTextures {
    normal: Option<TextureId>,
    dudv: Option<TextureId>,
    environment: Option<TextureId>,
}

pub struct SurfaceRenderer {
    name: String,
    width: f32,
    height: f32,
    wave: WaveParams,
    normal_map: Option<PathBuf>,
    dudv_map: Option<PathBuf>,
    environment: Option<[PathBuf; 6]>,
    anisotropy: u16,
    vertices: Option<BufferId>,
    indices: Option<BufferId>,
    index_count: u32,
    textures: SurfaceTextures,
}

impl SurfaceRenderer {
    pub fn new(config: SurfaceConfig) -> Self {
        Self {
            name: config.settings.name,
            width: config.width,
            height: config.height,
            wave: config.wave,
            normal_map: config.normal_map,
            dudv_map: config.dudv_map,
            environment: config.environment,
            anisotropy: config.settings.anisotropy,
            vertices: None,
            indices: None,
            index_count: 0,
            textures: SurfaceTextures::default(),
        }
    }

    pub fn wave(&self) -> &WaveParams {
        &self.wave
    }

    fn image_or(&self, res: &mut Resources<'_>, path: Option<&PathBuf>, role: &str, fallback: [u8; 4]) -> Result<TextureId, VariantError> {
        let (image, mipmaps) = match path {
            Some(path) => (res.assets.load_image(path)?, true),
            None => (ImageData::solid(1, 1, fallback), false),
        };
        let label = format!("{} {}", self.name, role);
        Ok(res
            .device
            .create_texture(&image.desc(&label, mipmaps, self.anisotropy), &image.data())?)
    }
}

impl RendererVariant for SurfaceRenderer {
    fn kind(&self) -> &'static str {
        "surface"
    }

    fn samplers(&self) -> Vec<SamplerSlot> {
        vec![
            SamplerSlot::new(samplers::NORMAL_MAP, TextureKind::D2),
            SamplerSlot::new(samplers::DUDV_MAP, TextureKind::D2),
            SamplerSlot::new(samplers::ENVIRONMENT_MAP, TextureKind::Cube),
        ]
    }

    fn create_buffers(&mut self, res: &mut Resources<'_>) -> Result<(), VariantError> {
        let mesh = quad(self.width, self.height);
        self.vertices = Some(res.device.create_buffer(
            &format!("{} surface vertices", self.name),
            BufferKind::Vertex(SurfaceVertex::layout()),
            mesh.vertex_bytes(),
        )?);
        self.indices = Some(res.device.create_buffer(
            &format!("{} surface indices", self.name),
            BufferKind::Index,
            mesh.index_bytes(),
        )?);
        self.index_count = mesh.indices.len() as u32;
        Ok(())
    }

    fn load_textures(&mut self, res: &mut Resources<'_>) -> Result<(), VariantError> {
        let normal_map = self.normal_map.clone();
        self.textures.normal = Some(self.image_or(res, normal_map.as_ref(), "normal map", FLAT_NORMAL)?);
        let dudv_map = self.dudv_map.clone();
        self.textures.dudv = Some(self.image_or(res, dudv_map.as_ref(), "dudv map", NEUTRAL_DUDV)?);
        if let Some(faces) = &self.environment {
            let cube = res.assets.load_cube_map(faces)?;
            let label = format!("{} environment", self.name);
            self.textures.environment = Some(res.device.create_texture(&cube.desc(&label), &cube.data())?);
        }
        Ok(())
    }

    fn upload_uniforms(&self, device: &mut dyn GraphicsDevice) {
        let wave = &self.wave;
        device.set_uniform(names::WAVE_SPEED, UniformValue::Float(wave.speed));
        device.set_uniform(names::WAVE_AMPLITUDE, UniformValue::Float(wave.amplitude));
        device.set_uniform(names::WAVE_FREQUENCY, UniformValue::Float(wave.frequency));
        device.set_uniform(names::RANDOMNESS, UniformValue::Float(wave.randomness));
        device.set_uniform(names::TEX_FREQUENCY, UniformValue::Float(wave.tex_frequency));
        device.set_uniform(names::TEX_AMPLITUDE, UniformValue::Float(wave.tex_amplitude));
    }

    fn draw_geometry(&mut self, res: &mut Resources<'_>) {
        let textures = [
            (samplers::NORMAL_MAP, self.textures.normal),
            (samplers::DUDV_MAP, self.textures.dudv),
            (samplers::ENVIRONMENT_MAP, self.textures.environment),
        ];
        for (role, texture) in textures {
            if let Some(texture) = texture {
                res.bind_texture(role, texture);
            }
        }
        self.draw_depth(res);
    }

    fn draw_depth(&mut self, res: &mut Resources<'_>) {
        if let (Some(vertices), Some(indices)) = (self.vertices, self.indices) {
            res.device.draw(&DrawCall::indexed(vertices, indices, self.index_count));
        }
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        let textures = std::mem::take(&mut self.textures);
        for texture in [textures.environment, textures.dudv, textures.normal].into_iter().flatten() {
            device.delete_texture(texture);
        }
        for buffer in [self.indices.take(), self.vertices.take()].into_iter().flatten() {
            device.delete_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::config::{RenderOverrides, RendererConfiguration, SurfaceParams};
    use crate::renderer::RendererId;
    use engine_core::CameraKeyframe;
    use renderer::{Command, RecordingDevice, TextureUnitAllocator};

    fn surface(params: SurfaceParams) -> SurfaceRenderer {
        let defaults = RendererConfiguration {
            camera_positions: vec![CameraKeyframe::new(0.0, 5.0, 10.0, -90.0, -20.0)],
            ..Default::default()
        };
        SurfaceRenderer::new(defaults.add_surface("water", &params, &RenderOverrides::default()).unwrap())
    }

    fn main_program() -> renderer::ProgramDesc {
        renderer::ProgramDesc {
            label: "surface/main".into(),
            stages: vec![(renderer::ShaderStage::Vertex, String::new())],
            ..Default::default()
        }
    }

    #[test]
    fn quad_is_four_vertices_six_indices() {
        let assets = MemoryAssets::new();
        let mut device = RecordingDevice::new(64, 64);
        let mut units = TextureUnitAllocator::new();
        let mut water = surface(SurfaceParams {
            width: Some(50.0),
            height: Some(50.0),
            ..Default::default()
        });
        let program = device.create_program(&main_program()).unwrap();
        device.use_program(program);
        {
            let mut res = Resources {
                device: &mut device,
                assets: &assets,
                units: &mut units,
                owner: RendererId::next(),
            };
            water.create_buffers(&mut res).unwrap();
            water.load_textures(&mut res).unwrap();
            water.draw_geometry(&mut res);
        }
        assert_eq!(water.index_count, 6);
        let vertices = water.vertices.unwrap();
        assert_eq!(device.buffer_data(vertices), Some(quad(50.0, 50.0).vertex_bytes()));
        let draws: Vec<_> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Draw { call, .. } => Some(call.count),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![6]);

        water.release(&mut device);
        device.delete_program(program);
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn wave_parameters_are_uploaded() {
        let mut device = RecordingDevice::new(64, 64);
        let wave = WaveParams {
            speed: 6.0,
            ..Default::default()
        };
        let water = surface(SurfaceParams {
            width: Some(10.0),
            height: Some(10.0),
            wave,
            ..Default::default()
        });
        let program = device.create_program(&main_program()).unwrap();
        device.use_program(program);
        water.upload_uniforms(&mut device);
        assert!(device.commands().contains(&Command::SetUniform {
            name: names::WAVE_SPEED.into(),
            value: UniformValue::Float(6.0),
        }));
        assert_eq!(device.take_error(), None);
    }
}
