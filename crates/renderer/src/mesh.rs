//! Host-side mesh data and primitive generation.

use crate::vertex::{BillboardVertex, ModelVertex, SkyboxVertex, SurfaceVertex};
use glam::{Vec2, Vec3};

/// Floats per vertex in the loader's interleaved `[u, v, nx, ny, nz, x, y, z]` layout.
pub const LOADER_STRIDE: usize = 8;

const UV_EPSILON: f32 = 1e-8;

/// Vertex and index data ready for upload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData<V> {
    pub vertices: Vec<V>,
    pub indices: Vec<u32>,
}

impl<V: bytemuck::Pod> MeshData<V> {
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// A `width x height` quad in the XZ plane centred at the origin.
pub fn quad(width: f32, height: f32) -> MeshData<SurfaceVertex> {
    let (hw, hh) = (width / 2.0, height / 2.0);
    MeshData {
        vertices: vec![
            SurfaceVertex::new([-hw, 0.0, -hh], [0.0, 0.0]),
            SurfaceVertex::new([hw, 0.0, -hh], [1.0, 0.0]),
            SurfaceVertex::new([hw, 0.0, hh], [1.0, 1.0]),
            SurfaceVertex::new([-hw, 0.0, hh], [0.0, 1.0]),
        ],
        indices: vec![0, 2, 1, 0, 3, 2],
    }
}

/// Unit cube as 36 non-indexed vertices, wound to be seen from inside.
pub fn skybox_cube() -> Vec<SkyboxVertex> {
    #[rustfmt::skip]
    const POSITIONS: [[f32; 3]; 36] = [
        [-1.0,  1.0, -1.0], [-1.0, -1.0, -1.0], [ 1.0, -1.0, -1.0],
        [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [-1.0,  1.0, -1.0],

        [-1.0, -1.0,  1.0], [-1.0, -1.0, -1.0], [-1.0,  1.0, -1.0],
        [-1.0,  1.0, -1.0], [-1.0,  1.0,  1.0], [-1.0, -1.0,  1.0],

        [ 1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0],
        [ 1.0,  1.0,  1.0], [ 1.0,  1.0, -1.0], [ 1.0, -1.0, -1.0],

        [-1.0, -1.0,  1.0], [-1.0,  1.0,  1.0], [ 1.0,  1.0,  1.0],
        [ 1.0,  1.0,  1.0], [ 1.0, -1.0,  1.0], [-1.0, -1.0,  1.0],

        [-1.0,  1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0],
        [ 1.0,  1.0,  1.0], [-1.0,  1.0,  1.0], [-1.0,  1.0, -1.0],

        [-1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [ 1.0, -1.0, -1.0],
        [ 1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0],
    ];
    POSITIONS.iter().map(|&position| SkyboxVertex { position }).collect()
}

/// Two triangles spanning [-1, 1]^2, expanded to camera-facing quads in the vertex shader.
pub fn billboard_corners() -> Vec<BillboardVertex> {
    [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]]
        .into_iter()
        .map(|corner| BillboardVertex { corner })
        .collect()
}

/// Any unit vector perpendicular to `normal`.
fn perpendicular(normal: Vec3) -> Vec3 {
    let axis = if normal.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    (axis - normal * normal.dot(axis)).normalize()
}

/// Tangent and bitangent of a triangle from its UV derivatives.
///
/// Both results are unit length and orthogonal to `normal`. When the UV area is
/// degenerate an arbitrary orthonormal basis around the normal is returned.
pub fn compute_tangents(positions: [Vec3; 3], uvs: [Vec2; 3], normal: Vec3) -> (Vec3, Vec3) {
    let normal = match normal.try_normalize() {
        Some(n) => n,
        None => (positions[1] - positions[0])
            .cross(positions[2] - positions[0])
            .try_normalize()
            .unwrap_or(Vec3::Z),
    };

    let edge1 = positions[1] - positions[0];
    let edge2 = positions[2] - positions[0];
    let duv1 = uvs[1] - uvs[0];
    let duv2 = uvs[2] - uvs[0];
    let det = duv1.x * duv2.y - duv2.x * duv1.y;

    let fallback = || {
        let tangent = perpendicular(normal);
        (tangent, normal.cross(tangent))
    };

    if det.abs() < UV_EPSILON {
        return fallback();
    }

    let r = 1.0 / det;
    let raw_tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
    let raw_bitangent = (edge2 * duv1.x - edge1 * duv2.x) * r;

    let Some(tangent) = (raw_tangent - normal * normal.dot(raw_tangent)).try_normalize() else {
        return fallback();
    };
    let handedness = if normal.cross(tangent).dot(raw_bitangent) < 0.0 { -1.0 } else { 1.0 };
    (tangent, normal.cross(tangent) * handedness)
}

/// Build model vertices from the loader's flat layout, computing a tangent basis per triangle.
/// Trailing floats that do not form a whole triangle are ignored.
pub fn model_vertices(flat: &[f32]) -> Vec<ModelVertex> {
    let vertex_count = flat.len() / LOADER_STRIDE;
    let triangle_count = vertex_count / 3;
    let mut vertices = Vec::with_capacity(triangle_count * 3);

    let read = |i: usize| {
        let v = &flat[i * LOADER_STRIDE..(i + 1) * LOADER_STRIDE];
        (
            Vec2::new(v[0], v[1]),
            Vec3::new(v[2], v[3], v[4]),
            Vec3::new(v[5], v[6], v[7]),
        )
    };

    for tri in 0..triangle_count {
        let corners = [read(tri * 3), read(tri * 3 + 1), read(tri * 3 + 2)];
        let positions = corners.map(|c| c.2);
        let uvs = corners.map(|c| c.0);
        for (uv, normal, position) in corners {
            let (tangent, bitangent) = compute_tangents(positions, uvs, normal);
            vertices.push(ModelVertex {
                position: position.to_array(),
                normal: normal.to_array(),
                tex_coords: uv.to_array(),
                tangent: tangent.to_array(),
                bitangent: bitangent.to_array(),
            });
        }
    }
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_basis(normal: Vec3, tangent: Vec3, bitangent: Vec3) {
        assert!(tangent.is_finite() && bitangent.is_finite());
        assert!((tangent.length() - 1.0).abs() < 1e-5);
        assert!((bitangent.length() - 1.0).abs() < 1e-5);
        assert!(tangent.dot(normal).abs() < 1e-5);
        assert!(bitangent.dot(normal).abs() < 1e-5);
    }

    #[test]
    fn quad_has_four_vertices_six_indices() {
        let q = quad(50.0, 50.0);
        assert_eq!(q.vertices.len(), 4);
        assert_eq!(q.indices.len(), 6);
        assert!(q.vertices.iter().all(|v| v.position[1] == 0.0));
        assert_eq!(q.vertices[2].position, [25.0, 0.0, 25.0]);
    }

    #[test]
    fn skybox_cube_has_36_vertices() {
        let cube = skybox_cube();
        assert_eq!(cube.len(), 36);
        assert!(cube.iter().all(|v| v.position.iter().all(|c| c.abs() == 1.0)));
    }

    #[test]
    fn regular_uvs_give_tangent_along_u() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Z];
        let uvs = [Vec2::ZERO, Vec2::X, Vec2::Y];
        let (t, b) = compute_tangents(positions, uvs, Vec3::Y);
        assert_basis(Vec3::Y, t, b);
        assert!((t - Vec3::X).length() < 1e-5);
        assert!((b.abs() - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn degenerate_uvs_fall_back_to_orthonormal_basis() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Z];
        let uvs = [Vec2::splat(0.5); 3];
        let normal = Vec3::new(0.3, 0.9, -0.1).normalize();
        let (t, b) = compute_tangents(positions, uvs, normal);
        assert_basis(normal, t, b);
    }

    #[test]
    fn zero_normal_uses_face_normal() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let (t, b) = compute_tangents(positions, [Vec2::ZERO; 3], Vec3::ZERO);
        assert_basis(Vec3::Z, t, b);
    }

    #[test]
    fn flat_layout_is_read_as_uv_normal_position() {
        #[rustfmt::skip]
        let flat = [
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
            1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0,
            9.0, 9.0,
        ];
        let vertices = model_vertices(&flat);
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[2].tex_coords, [0.0, 1.0]);
        assert_eq!(vertices[0].normal, [0.0, 1.0, 0.0]);
    }
}
