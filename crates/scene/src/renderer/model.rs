//! Wavefront model renderer: one buffer and material per material group.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use renderer::{
    model_vertices, BufferId, BufferKind, DrawCall, GraphicsDevice, ImageData, ModelVertex, SamplerSlot, TextureId,
    TextureKind,
};

use super::{samplers, RendererVariant};
use crate::config::ModelConfig;
use crate::context::Resources;
use crate::error::VariantError;
use crate::material::{Material, PbrOverrides};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const FLAT_NORMAL: [u8; 4] = [128, 128, 255, 255];

#[derive(Debug)]
struct GpuGroup {
    buffer: BufferId,
    vertex_count: u32,
    material: Material,
    diffuse: Option<TextureId>,
    normal: Option<TextureId>,
}

pub struct ModelRenderer {
    name: String,
    path: PathBuf,
    configured: PbrOverrides,
    anisotropy: u16,
    groups: Vec<GpuGroup>,
    textures: HashMap<PathBuf, TextureId>,
    default_diffuse: Option<TextureId>,
    default_normal: Option<TextureId>,
}

impl ModelRenderer {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            name: config.settings.name,
            path: config.path,
            configured: config.material,
            anisotropy: config.settings.anisotropy,
            groups: Vec::new(),
            textures: HashMap::new(),
            default_diffuse: None,
            default_normal: None,
        }
    }

    /// Materials of the uploaded groups, in draw order.
    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.groups.iter().map(|g| &g.material)
    }

    fn texture(&mut self, res: &mut Resources<'_>, path: &Path) -> Result<TextureId, VariantError> {
        if let Some(texture) = self.textures.get(path) {
            return Ok(*texture);
        }
        let image = res.assets.load_image(path)?;
        let label = format!("{} {}", self.name, path.display());
        let texture = res
            .device
            .create_texture(&image.desc(&label, true, self.anisotropy), &image.data())?;
        self.textures.insert(path.to_path_buf(), texture);
        Ok(texture)
    }

    fn solid(&self, res: &mut Resources<'_>, role: &str, rgba: [u8; 4]) -> Result<TextureId, VariantError> {
        let image = ImageData::solid(1, 1, rgba);
        let label = format!("{} default {}", self.name, role);
        Ok(res.device.create_texture(&image.desc(&label, false, 1), &image.data())?)
    }
}

impl RendererVariant for ModelRenderer {
    fn kind(&self) -> &'static str {
        "model"
    }

    fn samplers(&self) -> Vec<SamplerSlot> {
        vec![
            SamplerSlot::new(samplers::DIFFUSE_MAP, TextureKind::D2),
            SamplerSlot::new(samplers::NORMAL_MAP, TextureKind::D2),
        ]
    }

    fn create_buffers(&mut self, res: &mut Resources<'_>) -> Result<(), VariantError> {
        let data = res.assets.load_model(&self.path)?;
        for (i, group) in data.groups.into_iter().enumerate() {
            let vertices: Vec<ModelVertex> = model_vertices(&group.vertices);
            if vertices.is_empty() {
                continue;
            }
            let buffer = res.device.create_buffer(
                &format!("{} group {i}", self.name),
                BufferKind::Vertex(ModelVertex::layout()),
                bytemuck::cast_slice(&vertices),
            )?;
            let file_pbr = data.pbr.get(&group.material.name).copied().unwrap_or_default();
            log::debug!(
                "Model '{}' group {} ('{}'): {} vertices",
                self.name,
                i,
                group.material.name,
                vertices.len()
            );
            self.groups.push(GpuGroup {
                buffer,
                vertex_count: vertices.len() as u32,
                material: Material::resolve(group.material, &file_pbr, &self.configured),
                diffuse: None,
                normal: None,
            });
        }
        Ok(())
    }

    fn load_textures(&mut self, res: &mut Resources<'_>) -> Result<(), VariantError> {
        self.default_diffuse = Some(self.solid(res, "diffuse", WHITE)?);
        self.default_normal = Some(self.solid(res, "normal", FLAT_NORMAL)?);
        for i in 0..self.groups.len() {
            let base = &self.groups[i].material.base;
            let (diffuse_path, normal_path) = (base.diffuse_map.clone(), base.normal_map.clone());
            if let Some(path) = diffuse_path {
                self.groups[i].diffuse = Some(self.texture(res, &path)?);
            }
            if let Some(path) = normal_path {
                self.groups[i].normal = Some(self.texture(res, &path)?);
            }
        }
        Ok(())
    }

    fn draw_geometry(&mut self, res: &mut Resources<'_>) {
        for group in &self.groups {
            group.material.upload(res.device);
            if let Some(texture) = group.diffuse.or(self.default_diffuse) {
                res.bind_texture(samplers::DIFFUSE_MAP, texture);
            }
            if let Some(texture) = group.normal.or(self.default_normal) {
                res.bind_texture(samplers::NORMAL_MAP, texture);
            }
            res.device.draw(&DrawCall::arrays(group.buffer, group.vertex_count));
        }
    }

    fn draw_depth(&mut self, res: &mut Resources<'_>) {
        for group in &self.groups {
            res.device.draw(&DrawCall::arrays(group.buffer, group.vertex_count));
        }
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        let defaults = [self.default_diffuse.take(), self.default_normal.take()];
        for texture in self.textures.drain().map(|(_, t)| t).chain(defaults.into_iter().flatten()) {
            device.delete_texture(texture);
        }
        for group in self.groups.drain(..) {
            device.delete_buffer(group.buffer);
        }
    }
}
