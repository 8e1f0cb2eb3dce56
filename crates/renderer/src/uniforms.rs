//! Named uniform storage with one layout for every program.
//!
//! Programs address uniforms by name. Backends without by-name uniform
//! locations keep one [`UniformBlock`] per program and upload a snapshot of it
//! with every draw; `shaders/common/uniforms.wgsl` declares the same layout.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::device::UniformValue;

pub const MAX_LIGHTS: usize = 4;

/// Uniform names understood by [`UniformBlock::set`].
pub mod names {
    pub const MODEL: &str = "model";
    pub const VIEW: &str = "view";
    pub const PROJECTION: &str = "projection";
    pub const LIGHT_SPACE: &str = "lightSpaceMatrix";
    pub const CAMERA_POSITION: &str = "cameraPosition";
    pub const VIEW_POSITION: &str = "viewPos";
    pub const TIME: &str = "time";
    pub const RESOLUTION: &str = "resolution";

    pub const AMBIENT_COLOR: &str = "ambientColor";
    pub const OPACITY: &str = "opacity";
    pub const SHININESS: &str = "shininess";
    pub const DISTORTION: &str = "distortionStrength";
    pub const REFLECTION: &str = "reflectionStrength";
    pub const WAVE_SPEED: &str = "waveSpeed";
    pub const WAVE_AMPLITUDE: &str = "waveAmplitude";
    pub const WAVE_FREQUENCY: &str = "waveFrequency";
    pub const RANDOMNESS: &str = "randomness";
    pub const TEX_FREQUENCY: &str = "texFrequency";
    pub const TEX_AMPLITUDE: &str = "texAmplitude";
    pub const LOD_BIAS: &str = "lodBias";
    pub const LIGHT_COUNT: &str = "lightCount";
    pub const TONE_MAPPING: &str = "applyToneMapping";
    pub const GAMMA: &str = "applyGammaCorrection";
    pub const SHADOWS: &str = "enableShadows";
    pub const SCREEN_FACING: &str = "screenFacing";
    pub const SHADOW_BIAS: &str = "shadowBias";
    pub const SHADOW_STRENGTH: &str = "shadowStrength";

    pub const MATERIAL_AMBIENT: &str = "material.ambient";
    pub const MATERIAL_DIFFUSE: &str = "material.diffuse";
    pub const MATERIAL_SPECULAR: &str = "material.specular";
    pub const MATERIAL_EMISSIVE: &str = "material.emissive";
    pub const MATERIAL_SHININESS: &str = "material.shininess";
    pub const MATERIAL_OPACITY: &str = "material.opacity";
    pub const ROUGHNESS: &str = "pbr.roughness";
    pub const METALLIC: &str = "pbr.metallic";
    pub const CLEARCOAT: &str = "pbr.clearcoat";
    pub const CLEARCOAT_ROUGHNESS: &str = "pbr.clearcoatRoughness";
    pub const SHEEN: &str = "pbr.sheen";
    pub const ANISOTROPY: &str = "pbr.anisotropy";
    pub const ANISOTROPY_ROTATION: &str = "pbr.anisotropyRotation";
    pub const TRANSMISSION: &str = "pbr.transmission";
    pub const FRESNEL: &str = "pbr.fresnel";
    pub const EMISSIVE: &str = "pbr.emissive";

    pub const GRAVITY: &str = "gravity";
    pub const DELTA_TIME: &str = "deltaTime";
    pub const GROUND_NORMAL: &str = "groundNormal";
    pub const GROUND_HEIGHT: &str = "groundHeight";
    pub const MAX_VELOCITY: &str = "maxVelocity";
    pub const BOUNCE: &str = "bounceFactor";
    pub const PARTICLE_COUNT: &str = "particleCount";
    pub const PARTICLE_SIZE: &str = "particleSize";
    pub const PARTICLE_COLOR: &str = "particleColor";

    /// `lights[i].position` etc.
    pub fn light(index: usize, field: &str) -> String {
        format!("lights[{index}].{field}")
    }
}

/// One light as seen by the shaders. `position.w` carries the strength.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct LightUniform {
    pub position: [f32; 4],
    pub color: [f32; 4],
}

/// Every uniform any program can read, packed into vec4 slots.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UniformBlock {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub light_space: [[f32; 4]; 4],
    /// rgb ambient colour, a opacity.
    pub ambient_color: [f32; 4],
    /// xyz camera position, w time.
    pub camera_position: [f32; 4],
    /// xyz view position, w shininess.
    pub view_position: [f32; 4],
    /// xy resolution, z distortion strength, w reflection strength.
    pub resolution: [f32; 4],
    /// speed, amplitude, frequency, randomness.
    pub wave: [f32; 4],
    /// texture frequency, texture amplitude, lod bias, light count.
    pub wave_tex: [f32; 4],
    /// tone mapping, gamma, shadows, screen facing (as 0/1).
    pub flags: [f32; 4],
    /// shadow bias, shadow strength, material shininess, material opacity.
    pub shadow: [f32; 4],
    pub material_ambient: [f32; 4],
    pub material_diffuse: [f32; 4],
    pub material_specular: [f32; 4],
    pub material_emissive: [f32; 4],
    /// roughness, metallic, clearcoat, clearcoat roughness.
    pub pbr0: [f32; 4],
    /// sheen, anisotropy, anisotropy rotation, transmission.
    pub pbr1: [f32; 4],
    /// xyz emissive, w fresnel.
    pub pbr2: [f32; 4],
    /// xyz gravity, w delta time.
    pub particle_gravity: [f32; 4],
    /// xyz ground normal, w ground height.
    pub particle_ground: [f32; 4],
    /// max velocity, bounce, particle count, particle size.
    pub particle_params: [f32; 4],
    pub particle_color: [f32; 4],
    pub lights: [LightUniform; MAX_LIGHTS],
}

impl Default for UniformBlock {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            model: identity,
            view: identity,
            projection: identity,
            light_space: identity,
            ambient_color: [1.0, 1.0, 1.0, 1.0],
            shadow: [0.005, 1.0, 32.0, 1.0],
            material_diffuse: [1.0, 1.0, 1.0, 1.0],
            pbr0: [0.5, 0.0, 0.0, 0.0],
            particle_ground: [0.0, 1.0, 0.0, 0.0],
            particle_color: [1.0, 1.0, 1.0, 1.0],
            ..Zeroable::zeroed()
        }
    }
}

fn as_f32(value: &UniformValue) -> Option<f32> {
    match *value {
        UniformValue::Float(v) => Some(v),
        UniformValue::Int(v) => Some(v as f32),
        UniformValue::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_vec4(value: &UniformValue, w: f32) -> Option<[f32; 4]> {
    match *value {
        UniformValue::Vec3(v) => Some(v.extend(w).to_array()),
        UniformValue::Vec4(v) => Some(v.to_array()),
        _ => None,
    }
}

fn as_mat4(value: &UniformValue) -> Option<[[f32; 4]; 4]> {
    match value {
        UniformValue::Mat4(m) => Some(m.to_cols_array_2d()),
        _ => None,
    }
}

fn set_rgb(slot: &mut [f32; 4], value: &UniformValue) -> bool {
    match as_vec4(value, slot[3]) {
        Some(v) => {
            slot[..3].copy_from_slice(&v[..3]);
            true
        }
        None => false,
    }
}

fn set_component(slot: &mut [f32; 4], index: usize, value: &UniformValue) -> bool {
    match as_f32(value) {
        Some(v) => {
            slot[index] = v;
            true
        }
        None => false,
    }
}

fn set_matrix(slot: &mut [[f32; 4]; 4], value: &UniformValue) -> bool {
    match as_mat4(value) {
        Some(m) => {
            *slot = m;
            true
        }
        None => false,
    }
}

impl UniformBlock {
    /// Write a uniform by name. Returns false for unknown names or mismatched types.
    pub fn set(&mut self, name: &str, value: &UniformValue) -> bool {
        use names::*;

        if let Some(rest) = name.strip_prefix("lights[") {
            return self.set_light(rest, value);
        }

        match name {
            MODEL => set_matrix(&mut self.model, value),
            VIEW => set_matrix(&mut self.view, value),
            PROJECTION => set_matrix(&mut self.projection, value),
            LIGHT_SPACE => set_matrix(&mut self.light_space, value),

            AMBIENT_COLOR => set_rgb(&mut self.ambient_color, value),
            OPACITY => set_component(&mut self.ambient_color, 3, value),
            CAMERA_POSITION => set_rgb(&mut self.camera_position, value),
            TIME => set_component(&mut self.camera_position, 3, value),
            VIEW_POSITION => set_rgb(&mut self.view_position, value),
            SHININESS => set_component(&mut self.view_position, 3, value),
            RESOLUTION => match value {
                UniformValue::Vec2(v) => {
                    self.resolution[0] = v.x;
                    self.resolution[1] = v.y;
                    true
                }
                _ => false,
            },
            DISTORTION => set_component(&mut self.resolution, 2, value),
            REFLECTION => set_component(&mut self.resolution, 3, value),

            WAVE_SPEED => set_component(&mut self.wave, 0, value),
            WAVE_AMPLITUDE => set_component(&mut self.wave, 1, value),
            WAVE_FREQUENCY => set_component(&mut self.wave, 2, value),
            RANDOMNESS => set_component(&mut self.wave, 3, value),
            TEX_FREQUENCY => set_component(&mut self.wave_tex, 0, value),
            TEX_AMPLITUDE => set_component(&mut self.wave_tex, 1, value),
            LOD_BIAS => set_component(&mut self.wave_tex, 2, value),
            LIGHT_COUNT => set_component(&mut self.wave_tex, 3, value),

            TONE_MAPPING => set_component(&mut self.flags, 0, value),
            GAMMA => set_component(&mut self.flags, 1, value),
            SHADOWS => set_component(&mut self.flags, 2, value),
            SCREEN_FACING => set_component(&mut self.flags, 3, value),
            SHADOW_BIAS => set_component(&mut self.shadow, 0, value),
            SHADOW_STRENGTH => set_component(&mut self.shadow, 1, value),
            MATERIAL_SHININESS => set_component(&mut self.shadow, 2, value),
            MATERIAL_OPACITY => set_component(&mut self.shadow, 3, value),

            MATERIAL_AMBIENT => set_rgb(&mut self.material_ambient, value),
            MATERIAL_DIFFUSE => set_rgb(&mut self.material_diffuse, value),
            MATERIAL_SPECULAR => set_rgb(&mut self.material_specular, value),
            MATERIAL_EMISSIVE => set_rgb(&mut self.material_emissive, value),

            ROUGHNESS => set_component(&mut self.pbr0, 0, value),
            METALLIC => set_component(&mut self.pbr0, 1, value),
            CLEARCOAT => set_component(&mut self.pbr0, 2, value),
            CLEARCOAT_ROUGHNESS => set_component(&mut self.pbr0, 3, value),
            SHEEN => set_component(&mut self.pbr1, 0, value),
            ANISOTROPY => set_component(&mut self.pbr1, 1, value),
            ANISOTROPY_ROTATION => set_component(&mut self.pbr1, 2, value),
            TRANSMISSION => set_component(&mut self.pbr1, 3, value),
            EMISSIVE => set_rgb(&mut self.pbr2, value),
            FRESNEL => set_component(&mut self.pbr2, 3, value),

            GRAVITY => set_rgb(&mut self.particle_gravity, value),
            DELTA_TIME => set_component(&mut self.particle_gravity, 3, value),
            GROUND_NORMAL => set_rgb(&mut self.particle_ground, value),
            GROUND_HEIGHT => set_component(&mut self.particle_ground, 3, value),
            MAX_VELOCITY => set_component(&mut self.particle_params, 0, value),
            BOUNCE => set_component(&mut self.particle_params, 1, value),
            PARTICLE_COUNT => set_component(&mut self.particle_params, 2, value),
            PARTICLE_SIZE => set_component(&mut self.particle_params, 3, value),
            PARTICLE_COLOR => match as_vec4(value, 1.0) {
                Some(v) => {
                    self.particle_color = v;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn set_light(&mut self, rest: &str, value: &UniformValue) -> bool {
        let Some((index, field)) = rest.split_once("].") else {
            return false;
        };
        let Ok(index) = index.parse::<usize>() else {
            return false;
        };
        let Some(light) = self.lights.get_mut(index) else {
            return false;
        };
        match field {
            "position" => set_rgb(&mut light.position, value),
            "strength" => set_component(&mut light.position, 3, value),
            "color" => set_rgb(&mut light.color, value),
            _ => false,
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }

    pub fn ambient(&self) -> Vec4 {
        Vec4::from_array(self.ambient_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    #[test]
    fn block_size_is_vec4_aligned() {
        assert_eq!(std::mem::size_of::<UniformBlock>() % 16, 0);
    }

    #[test]
    fn scalars_pack_into_shared_slots() {
        let mut block = UniformBlock::default();
        assert!(block.set(names::AMBIENT_COLOR, &UniformValue::Vec3(Vec3::new(0.1, 0.2, 0.3))));
        assert!(block.set(names::OPACITY, &UniformValue::Float(0.5)));
        assert_eq!(block.ambient_color, [0.1, 0.2, 0.3, 0.5]);

        assert!(block.set(names::RESOLUTION, &UniformValue::Vec2(Vec2::new(800.0, 600.0))));
        assert!(block.set(names::REFLECTION, &UniformValue::Float(0.75)));
        assert_eq!(block.resolution, [800.0, 600.0, 0.0, 0.75]);
    }

    #[test]
    fn booleans_become_floats() {
        let mut block = UniformBlock::default();
        assert!(block.set(names::TONE_MAPPING, &UniformValue::Bool(true)));
        assert!(block.set(names::SCREEN_FACING, &UniformValue::Int(1)));
        assert_eq!(block.flags, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn indexed_light_fields() {
        let mut block = UniformBlock::default();
        assert!(block.set(&names::light(2, "position"), &UniformValue::Vec3(Vec3::new(1.0, 2.0, 3.0))));
        assert!(block.set(&names::light(2, "strength"), &UniformValue::Float(4.0)));
        assert_eq!(block.lights[2].position, [1.0, 2.0, 3.0, 4.0]);
        assert!(!block.set(&names::light(MAX_LIGHTS, "position"), &UniformValue::Vec3(Vec3::ONE)));
    }

    #[test]
    fn unknown_names_and_wrong_types_are_rejected() {
        let mut block = UniformBlock::default();
        assert!(!block.set("doesNotExist", &UniformValue::Float(1.0)));
        assert!(!block.set(names::MODEL, &UniformValue::Float(1.0)));
    }
}
