//! Material parameters for model renderers.
//!
//! A model material is a base block read from the `.mtl` file plus an extended
//! PBR block. PBR values come from three layers: keys in the material file,
//! overrides given when the renderer is configured, then built-in defaults.

use std::collections::HashMap;
use std::path::PathBuf;

use glam::Vec3;
use renderer::{names, GraphicsDevice, UniformValue};
use serde::{Deserialize, Serialize};

use crate::error::AssetError;

/// Classic material block of a wavefront material file.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseMaterial {
    pub name: String,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub shininess: f32,
    /// 1.0 is fully opaque.
    pub opacity: f32,
    pub ior: f32,
    pub emissive: Vec3,
    pub illumination: u8,
    pub diffuse_map: Option<PathBuf>,
    pub normal_map: Option<PathBuf>,
}

impl Default for BaseMaterial {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            ambient: Vec3::splat(0.2),
            diffuse: Vec3::splat(0.8),
            specular: Vec3::splat(0.5),
            shininess: 32.0,
            opacity: 1.0,
            ior: 1.0,
            emissive: Vec3::ZERO,
            illumination: 2,
            diffuse_map: None,
            normal_map: None,
        }
    }
}

/// Extended physically based parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PbrParams {
    pub roughness: f32,
    pub metallic: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub sheen: f32,
    pub anisotropy: f32,
    pub anisotropy_rotation: f32,
    pub transmission: f32,
    pub fresnel_exponent: f32,
    pub emissive: Vec3,
}

impl Default for PbrParams {
    fn default() -> Self {
        Self {
            roughness: 0.5,
            metallic: 0.0,
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
            sheen: 0.0,
            anisotropy: 0.0,
            anisotropy_rotation: 0.0,
            transmission: 0.0,
            fresnel_exponent: 5.0,
            emissive: Vec3::ZERO,
        }
    }
}

/// A partial set of PBR values. Unset fields defer to the next layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PbrOverrides {
    pub roughness: Option<f32>,
    pub metallic: Option<f32>,
    pub clearcoat: Option<f32>,
    pub clearcoat_roughness: Option<f32>,
    pub sheen: Option<f32>,
    pub anisotropy: Option<f32>,
    pub anisotropy_rotation: Option<f32>,
    pub transmission: Option<f32>,
    pub fresnel_exponent: Option<f32>,
    pub emissive: Option<Vec3>,
}

impl PbrOverrides {
    /// Write every set field into `params`.
    pub fn apply(&self, params: &mut PbrParams) {
        if let Some(value) = self.roughness {
            params.roughness = value;
        }
        if let Some(value) = self.metallic {
            params.metallic = value;
        }
        if let Some(value) = self.clearcoat {
            params.clearcoat = value;
        }
        if let Some(value) = self.clearcoat_roughness {
            params.clearcoat_roughness = value;
        }
        if let Some(value) = self.sheen {
            params.sheen = value;
        }
        if let Some(value) = self.anisotropy {
            params.anisotropy = value;
        }
        if let Some(value) = self.anisotropy_rotation {
            params.anisotropy_rotation = value;
        }
        if let Some(value) = self.transmission {
            params.transmission = value;
        }
        if let Some(value) = self.fresnel_exponent {
            params.fresnel_exponent = value;
        }
        if let Some(value) = self.emissive {
            params.emissive = value;
        }
    }

    /// Parse the extended keys a material file carries beyond the classic block.
    ///
    /// Unrelated keys are ignored; a recognised key with an unparsable value is an error.
    pub fn from_material_keys(material: &str, keys: &HashMap<String, String>) -> Result<Self, AssetError> {
        let mut overrides = Self::default();
        for (key, value) in keys {
            let slot = match key.as_str() {
                "Pr" => &mut overrides.roughness,
                "Pm" => &mut overrides.metallic,
                "Pc" => &mut overrides.clearcoat,
                "Pcr" => &mut overrides.clearcoat_roughness,
                "Ps" => &mut overrides.sheen,
                "aniso" => &mut overrides.anisotropy,
                "anisor" => &mut overrides.anisotropy_rotation,
                "Tf" | "transmission" => &mut overrides.transmission,
                "fresnel" => &mut overrides.fresnel_exponent,
                "Ke" => {
                    overrides.emissive = Some(parse_vec3(value).ok_or_else(|| invalid(material, key, value))?);
                    continue;
                }
                _ => continue,
            };
            // `Tf` is an RGB filter in some exporters; its first component is the scalar.
            let first = value.split_whitespace().next().unwrap_or_default();
            *slot = Some(first.parse().map_err(|_| invalid(material, key, value))?);
        }
        Ok(overrides)
    }
}

fn invalid(material: &str, key: &str, value: &str) -> AssetError {
    AssetError::MaterialParameter {
        material: material.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_vec3(value: &str) -> Option<Vec3> {
    let parts: Vec<f32> = value.split_whitespace().map(|p| p.parse().ok()).collect::<Option<_>>()?;
    match parts.as_slice() {
        [v] => Some(Vec3::splat(*v)),
        [x, y, z] => Some(Vec3::new(*x, *y, *z)),
        _ => None,
    }
}

/// Merge PBR layers: file-level keys win over configured overrides, which win over defaults.
pub fn resolve_pbr(file: &PbrOverrides, configured: &PbrOverrides) -> PbrParams {
    let mut params = PbrParams::default();
    configured.apply(&mut params);
    file.apply(&mut params);
    params
}

/// Fully resolved material of one model group.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub base: BaseMaterial,
    pub pbr: PbrParams,
}

impl Material {
    pub fn resolve(base: BaseMaterial, file: &PbrOverrides, configured: &PbrOverrides) -> Self {
        Self {
            base,
            pbr: resolve_pbr(file, configured),
        }
    }

    /// Upload both blocks to the bound program.
    pub fn upload(&self, device: &mut dyn GraphicsDevice) {
        let base = &self.base;
        device.set_uniform(names::MATERIAL_AMBIENT, UniformValue::Vec3(base.ambient));
        device.set_uniform(names::MATERIAL_DIFFUSE, UniformValue::Vec3(base.diffuse));
        device.set_uniform(names::MATERIAL_SPECULAR, UniformValue::Vec3(base.specular));
        device.set_uniform(names::MATERIAL_EMISSIVE, UniformValue::Vec3(base.emissive));
        device.set_uniform(names::MATERIAL_SHININESS, UniformValue::Float(base.shininess));
        device.set_uniform(names::MATERIAL_OPACITY, UniformValue::Float(base.opacity));

        let pbr = &self.pbr;
        device.set_uniform(names::ROUGHNESS, UniformValue::Float(pbr.roughness));
        device.set_uniform(names::METALLIC, UniformValue::Float(pbr.metallic));
        device.set_uniform(names::CLEARCOAT, UniformValue::Float(pbr.clearcoat));
        device.set_uniform(names::CLEARCOAT_ROUGHNESS, UniformValue::Float(pbr.clearcoat_roughness));
        device.set_uniform(names::SHEEN, UniformValue::Float(pbr.sheen));
        device.set_uniform(names::ANISOTROPY, UniformValue::Float(pbr.anisotropy));
        device.set_uniform(names::ANISOTROPY_ROTATION, UniformValue::Float(pbr.anisotropy_rotation));
        device.set_uniform(names::TRANSMISSION, UniformValue::Float(pbr.transmission));
        device.set_uniform(names::FRESNEL, UniformValue::Float(pbr.fresnel_exponent));
        device.set_uniform(names::EMISSIVE, UniformValue::Vec3(pbr.emissive));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_keys_beat_configured_values_beat_defaults() {
        let file = PbrOverrides {
            roughness: Some(0.9),
            ..Default::default()
        };
        let configured = PbrOverrides {
            roughness: Some(0.1),
            metallic: Some(1.0),
            ..Default::default()
        };
        let pbr = resolve_pbr(&file, &configured);
        assert_eq!(pbr.roughness, 0.9);
        assert_eq!(pbr.metallic, 1.0);
        assert_eq!(pbr.sheen, PbrParams::default().sheen);
        assert_eq!(pbr.fresnel_exponent, 5.0);
    }

    #[test]
    fn material_keys_are_parsed() {
        let keys: HashMap<String, String> = [
            ("Pr", "0.25"),
            ("Pm", "1"),
            ("Tf", "0.5 0.5 0.5"),
            ("anisor", "0.75"),
            ("Ke", "1 0.5 0"),
            ("map_Bump", "normal.png"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let overrides = PbrOverrides::from_material_keys("steel", &keys).unwrap();
        assert_eq!(overrides.roughness, Some(0.25));
        assert_eq!(overrides.metallic, Some(1.0));
        assert_eq!(overrides.transmission, Some(0.5));
        assert_eq!(overrides.anisotropy_rotation, Some(0.75));
        assert_eq!(overrides.emissive, Some(Vec3::new(1.0, 0.5, 0.0)));
        assert_eq!(overrides.clearcoat, None);
    }

    #[test]
    fn unparsable_material_key_names_the_material() {
        let keys: HashMap<String, String> = [("Pm".to_string(), "shiny".to_string())].into_iter().collect();
        let err = PbrOverrides::from_material_keys("steel", &keys).unwrap_err();
        assert!(matches!(err, AssetError::MaterialParameter { ref material, .. } if material == "steel"));
    }
}
