//! Asset loading: images, cube maps and wavefront models.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glam::Vec3;
use renderer::{CubeMapData, ImageData, LOADER_STRIDE};

use crate::error::AssetError;
use crate::material::{BaseMaterial, PbrOverrides};

/// Geometry of one material group in the flat `[u, v, nx, ny, nz, x, y, z]` layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGroup {
    pub material: BaseMaterial,
    pub vertices: Vec<f32>,
}

impl ModelGroup {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / LOADER_STRIDE
    }
}

/// A loaded model plus the extended material keys found in its material file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    pub groups: Vec<ModelGroup>,
    /// PBR keys per material name.
    pub pbr: HashMap<String, PbrOverrides>,
}

/// Source of decoded assets.
pub trait AssetLoader {
    fn load_image(&self, path: &Path) -> Result<ImageData, AssetError>;

    fn load_model(&self, path: &Path) -> Result<ModelData, AssetError>;

    /// Six faces in +X, -X, +Y, -Y, +Z, -Z order, all the same size and format.
    fn load_cube_map(&self, faces: &[PathBuf; 6]) -> Result<CubeMapData, AssetError> {
        let images = faces
            .iter()
            .map(|path| self.load_image(path))
            .collect::<Result<Vec<_>, _>>()?;
        let faces_data: [ImageData; 6] = images
            .try_into()
            .map_err(|_| AssetError::InconsistentCubeMap(faces[0].clone()))?;
        let cube = CubeMapData { faces: faces_data };
        if !cube.is_consistent() {
            return Err(AssetError::InconsistentCubeMap(faces[0].clone()));
        }
        Ok(cube)
    }
}

/// Loads assets from disk, resolving relative paths against a root directory.
#[derive(Debug, Clone)]
pub struct FsAssetLoader {
    root: PathBuf,
}

impl FsAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, AssetError> {
        let full = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };
        if full.is_file() {
            Ok(full)
        } else {
            Err(AssetError::NotFound(path.to_path_buf()))
        }
    }
}

impl AssetLoader for FsAssetLoader {
    fn load_image(&self, path: &Path) -> Result<ImageData, AssetError> {
        let full = self.resolve(path)?;
        let img = image::open(&full).map_err(|e| AssetError::Image {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let (width, height) = (img.width(), img.height());
        log::debug!("Loaded image {:?} ({}x{})", full, width, height);
        if img.color().has_alpha() {
            Ok(ImageData::rgba(width, height, img.into_rgba8().into_raw()))
        } else {
            Ok(ImageData::rgb(width, height, img.into_rgb8().into_raw()))
        }
    }

    fn load_model(&self, path: &Path) -> Result<ModelData, AssetError> {
        let full = self.resolve(path)?;
        let model_error = |message: String| AssetError::Model {
            path: path.to_path_buf(),
            message,
        };

        let (models, materials) = tobj::load_obj(
            &full,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )
        .map_err(|e| model_error(e.to_string()))?;

        let materials = materials.unwrap_or_else(|e| {
            log::warn!("No usable material file for {:?}: {}, using default material", path, e);
            Vec::new()
        });
        let base_dir = full.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut pbr = HashMap::new();
        let mut bases = Vec::with_capacity(materials.len());
        for material in &materials {
            let keys: HashMap<String, String> = material
                .unknown_param
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            pbr.insert(material.name.clone(), PbrOverrides::from_material_keys(&material.name, &keys)?);
            bases.push(base_material(material, &keys, &base_dir));
        }

        // Meshes sharing a material are merged into one group.
        let mut groups: Vec<(Option<usize>, ModelGroup)> = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            let material_id = mesh.material_id.filter(|id| *id < bases.len());
            let index = match groups.iter().position(|(id, _)| *id == material_id) {
                Some(index) => index,
                None => {
                    let material = material_id.map(|id| bases[id].clone()).unwrap_or_default();
                    groups.push((
                        material_id,
                        ModelGroup {
                            material,
                            vertices: Vec::new(),
                        },
                    ));
                    groups.len() - 1
                }
            };
            let out = &mut groups[index].1.vertices;
            out.reserve(mesh.indices.len() * LOADER_STRIDE);
            for &i in &mesh.indices {
                let i = i as usize;
                let uv = [mesh.texcoords.get(2 * i), mesh.texcoords.get(2 * i + 1)];
                out.extend(uv.iter().map(|c| c.copied().unwrap_or(0.0)));
                for k in 0..3 {
                    out.push(mesh.normals.get(3 * i + k).copied().unwrap_or(0.0));
                }
                for k in 0..3 {
                    let p = mesh.positions.get(3 * i + k).ok_or_else(|| model_error(format!("index {i} out of range")))?;
                    out.push(*p);
                }
            }
        }

        let groups: Vec<ModelGroup> = groups.into_iter().map(|(_, g)| g).filter(|g| g.vertex_count() >= 3).collect();
        if groups.is_empty() {
            return Err(AssetError::EmptyModel(path.to_path_buf()));
        }
        log::info!(
            "Loaded model {:?}: {} groups, {} vertices",
            path,
            groups.len(),
            groups.iter().map(ModelGroup::vertex_count).sum::<usize>()
        );
        Ok(ModelData { groups, pbr })
    }
}

fn base_material(material: &tobj::Material, keys: &HashMap<String, String>, base_dir: &Path) -> BaseMaterial {
    let defaults = BaseMaterial::default();
    let vec3 = |v: Option<[f32; 3]>, fallback: Vec3| v.map(Vec3::from_array).unwrap_or(fallback);
    let texture = |name: &Option<String>| name.as_ref().filter(|n| !n.is_empty()).map(|n| base_dir.join(n));
    let normal_map = texture(&material.normal_texture).or_else(|| {
        ["map_Bump", "map_bump", "bump"]
            .iter()
            .find_map(|k| keys.get(*k))
            .and_then(|v| v.split_whitespace().last())
            .map(|n| base_dir.join(n))
    });
    BaseMaterial {
        name: material.name.clone(),
        ambient: vec3(material.ambient, defaults.ambient),
        diffuse: vec3(material.diffuse, defaults.diffuse),
        specular: vec3(material.specular, defaults.specular),
        shininess: material.shininess.unwrap_or(defaults.shininess),
        opacity: material.dissolve.unwrap_or(defaults.opacity),
        ior: material.optical_density.unwrap_or(defaults.ior),
        emissive: defaults.emissive,
        illumination: material.illumination_model.unwrap_or(defaults.illumination),
        diffuse_map: texture(&material.diffuse_texture),
        normal_map,
    }
}

/// Assets held in memory, keyed by the path they are requested with.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    images: HashMap<PathBuf, ImageData>,
    models: HashMap<PathBuf, ModelData>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, path: impl Into<PathBuf>, image: ImageData) -> Self {
        self.images.insert(path.into(), image);
        self
    }

    pub fn with_model(mut self, path: impl Into<PathBuf>, model: ModelData) -> Self {
        self.models.insert(path.into(), model);
        self
    }
}

impl AssetLoader for MemoryAssets {
    fn load_image(&self, path: &Path) -> Result<ImageData, AssetError> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_path_buf()))
    }

    fn load_model(&self, path: &Path) -> Result<ModelData, AssetError> {
        self.models
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faces() -> [PathBuf; 6] {
        std::array::from_fn(|i| PathBuf::from(format!("face{i}.png")))
    }

    #[test]
    fn cube_map_needs_six_matching_faces() {
        let mut assets = MemoryAssets::new();
        for (i, face) in faces().iter().enumerate() {
            let size = if i == 5 { 4 } else { 2 };
            assets = assets.with_image(face.clone(), ImageData::solid(size, size, [0, 0, 255, 255]));
        }
        assert!(matches!(assets.load_cube_map(&faces()), Err(AssetError::InconsistentCubeMap(_))));

        let assets = faces().iter().fold(MemoryAssets::new(), |a, f| {
            a.with_image(f.clone(), ImageData::solid(2, 2, [0, 0, 255, 255]))
        });
        assert!(assets.load_cube_map(&faces()).is_ok());
    }

    #[test]
    fn missing_asset_is_not_found() {
        let err = MemoryAssets::new().load_image(Path::new("missing.png")).unwrap_err();
        assert_eq!(err, AssetError::NotFound(PathBuf::from("missing.png")));
        let err = FsAssetLoader::new(std::env::temp_dir())
            .load_model(Path::new("framebench-missing-model.obj"))
            .unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[test]
    fn obj_groups_use_flat_uv_normal_position_layout() {
        let dir = std::env::temp_dir().join(format!("framebench-assets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("tri.mtl"),
            "newmtl steel\nKd 0.5 0.5 0.5\nNs 64\nPr 0.2\nPm 1.0\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("tri.obj"),
            "mtllib tri.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nvn 0 0 1\nusemtl steel\nf 1/1/1 2/2/1 3/3/1\n",
        )
        .unwrap();

        let model = FsAssetLoader::new(&dir).load_model(Path::new("tri.obj")).unwrap();
        assert_eq!(model.groups.len(), 1);
        let group = &model.groups[0];
        assert_eq!(group.vertex_count(), 3);
        assert_eq!(group.material.name, "steel");
        assert_eq!(group.material.shininess, 64.0);
        // second vertex: uv (1, 0), normal (0, 0, 1), position (1, 0, 0)
        assert_eq!(&group.vertices[8..16], &[1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(model.pbr["steel"].roughness, Some(0.2));
        assert_eq!(model.pbr["steel"].metallic, Some(1.0));

        std::fs::remove_dir_all(&dir).ok();
    }
}
