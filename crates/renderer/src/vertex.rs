//! Vertex types and layouts for rendering.

use bytemuck::{Pod, Zeroable};

use crate::device::{StepMode, VertexFormat, VertexLayout};

/// Model vertex with normal-mapping basis.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl ModelVertex {
    pub fn layout() -> VertexLayout {
        use VertexFormat::*;
        VertexLayout::packed(
            StepMode::Vertex,
            0,
            &[Float32x3, Float32x3, Float32x2, Float32x3, Float32x3],
        )
    }
}

/// Flat surface vertex (water and other quads).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SurfaceVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl SurfaceVertex {
    pub fn new(position: [f32; 3], tex_coords: [f32; 2]) -> Self {
        Self { position, tex_coords }
    }

    pub fn layout() -> VertexLayout {
        VertexLayout::packed(StepMode::Vertex, 0, &[VertexFormat::Float32x3, VertexFormat::Float32x2])
    }
}

/// Position-only vertex for the skybox cube.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SkyboxVertex {
    pub position: [f32; 3],
}

impl SkyboxVertex {
    pub fn layout() -> VertexLayout {
        VertexLayout::packed(StepMode::Vertex, 0, &[VertexFormat::Float32x3])
    }
}

/// Corner of the billboard quad each particle is drawn with.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BillboardVertex {
    pub corner: [f32; 2],
}

impl BillboardVertex {
    pub fn layout() -> VertexLayout {
        VertexLayout::packed(StepMode::Vertex, 0, &[VertexFormat::Float32x2])
    }
}

/// Per-particle state, shared by the host simulation and the GPU kernels.
/// `w` components are unused padding so the struct matches WGSL storage layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    pub position: [f32; 4],
    pub velocity: [f32; 4],
}

impl ParticleVertex {
    pub fn new(position: glam::Vec3, velocity: glam::Vec3) -> Self {
        Self {
            position: position.extend(1.0).to_array(),
            velocity: velocity.extend(0.0).to_array(),
        }
    }

    pub fn position(&self) -> glam::Vec3 {
        glam::Vec4::from_array(self.position).truncate()
    }

    pub fn velocity(&self) -> glam::Vec3 {
        glam::Vec4::from_array(self.velocity).truncate()
    }

    /// Instance layout at locations 1 and 2, after the billboard corner.
    pub fn layout() -> VertexLayout {
        VertexLayout::packed(StepMode::Instance, 1, &[VertexFormat::Float32x4, VertexFormat::Float32x4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_struct_sizes() {
        assert_eq!(ModelVertex::layout().stride, std::mem::size_of::<ModelVertex>() as u64);
        assert_eq!(SurfaceVertex::layout().stride, std::mem::size_of::<SurfaceVertex>() as u64);
        assert_eq!(SkyboxVertex::layout().stride, std::mem::size_of::<SkyboxVertex>() as u64);
        assert_eq!(ParticleVertex::layout().stride, std::mem::size_of::<ParticleVertex>() as u64);
    }

    #[test]
    fn particle_layout_follows_billboard_corner() {
        let layout = ParticleVertex::layout();
        assert_eq!(layout.step, StepMode::Instance);
        assert_eq!(layout.attributes[0].location, 1);
        assert_eq!(layout.attributes[1].offset, 16);
    }
}
