//! Built-in scenarios with procedurally authored assets, so a run needs no files besides shaders.

use std::collections::HashMap;
use std::path::PathBuf;

use engine_core::{CameraKeyframe, Light};
use glam::{Vec2, Vec3};
use renderer::ImageData;
use scene::assets::{MemoryAssets, ModelData, ModelGroup};
use scene::config::{
    AutoRotationConfig, ModelParams, ParticleBackend, ParticleParams, PlanarCameraConfig, RenderOverrides, RendererConfiguration,
    RendererEntry, RendererKind, RunSettings, ScenarioFile, SkyboxParams, SpawnParams, SurfaceParams, WaveParams,
};
use scene::material::{BaseMaterial, PbrOverrides};

pub const NAMES: [&str; 3] = ["water", "models", "particles"];

const CUBE_MODEL: &str = "builtin/cube.obj";
const GROUND_MODEL: &str = "builtin/ground.obj";

pub struct Builtin {
    pub scenario: ScenarioFile,
    pub assets: MemoryAssets,
}

pub fn builtin(name: &str) -> Option<Builtin> {
    let renderers = match name {
        "water" => vec![
            sky_entry(),
            entry(
                "water",
                RendererKind::Surface(SurfaceParams {
                    width: Some(50.0),
                    height: Some(50.0),
                    wave: WaveParams {
                        speed: 6.0,
                        amplitude: 0.2,
                        randomness: 0.3,
                        ..Default::default()
                    },
                    environment: Some(sky_faces()),
                    ..Default::default()
                }),
                RenderOverrides {
                    alpha_blending: Some(true),
                    reflection_strength: Some(0.6),
                    distortion_strength: Some(0.02),
                    planar_camera: Some(PlanarCameraConfig {
                        resolution: Some((640, 360)),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ),
        ],
        "models" => vec![
            sky_entry(),
            entry(
                "ground",
                model(GROUND_MODEL, 0.9),
                RenderOverrides {
                    shadows: Some(true),
                    ..Default::default()
                },
            ),
            entry(
                "crate",
                model(CUBE_MODEL, 0.4),
                RenderOverrides {
                    shadows: Some(true),
                    position: Some(Vec3::new(0.0, 1.0, 0.0)),
                    scale: Some(Vec3::splat(2.0)),
                    auto_rotation: Some(AutoRotationConfig {
                        axis: Vec3::Y,
                        speed: 30.0,
                    }),
                    ..Default::default()
                },
            ),
        ],
        "particles" => vec![
            sky_entry(),
            entry(
                "fountain",
                RendererKind::Particle(ParticleParams {
                    count: Some(20_000),
                    seed: 7,
                    backend: ParticleBackend::Compute,
                    spawn: SpawnParams {
                        center: Vec3::new(0.0, 4.0, 0.0),
                        radius: 1.5,
                        initial_speed: 6.0,
                    },
                    ..Default::default()
                }),
                RenderOverrides {
                    alpha_blending: Some(true),
                    ..Default::default()
                },
            ),
        ],
        _ => return None,
    };
    Some(Builtin {
        scenario: ScenarioFile {
            defaults: defaults(),
            renderers,
            run: RunSettings::default(),
        },
        assets: assets(),
    })
}

fn defaults() -> RendererConfiguration {
    RendererConfiguration {
        window_title: "FrameBench".to_string(),
        camera_positions: vec![
            CameraKeyframe::new(0.0, 6.0, 18.0, -90.0, -15.0),
            CameraKeyframe::new(18.0, 8.0, 0.0, -180.0, -20.0),
            CameraKeyframe::new(0.0, 10.0, -18.0, -270.0, -25.0),
            CameraKeyframe::new(-18.0, 8.0, 0.0, -360.0, -20.0),
        ],
        camera_speed: 0.25,
        loop_camera: true,
        lights: vec![Light::new(Vec3::new(10.0, 20.0, 10.0), Vec3::ONE, 1.0)],
        ..Default::default()
    }
}

fn entry(name: &str, kind: RendererKind, overrides: RenderOverrides) -> RendererEntry {
    RendererEntry {
        name: name.to_string(),
        order: None,
        kind,
        overrides,
    }
}

fn sky_entry() -> RendererEntry {
    entry(
        "sky",
        RendererKind::Skybox(SkyboxParams { faces: Some(sky_faces()) }),
        RenderOverrides::default(),
    )
}

fn model(path: &str, roughness: f32) -> RendererKind {
    RendererKind::Model(ModelParams {
        path: Some(path.into()),
        material: PbrOverrides {
            roughness: Some(roughness),
            ..Default::default()
        },
    })
}

fn sky_faces() -> [PathBuf; 6] {
    ["px", "nx", "py", "ny", "pz", "nz"].map(|face| PathBuf::from(format!("builtin/sky_{face}.png")))
}

fn assets() -> MemoryAssets {
    // Horizon colour on the sides, deeper blue above, dark ground below.
    let colors = [
        [150, 185, 225, 255],
        [150, 185, 225, 255],
        [70, 120, 200, 255],
        [40, 45, 50, 255],
        [150, 185, 225, 255],
        [150, 185, 225, 255],
    ];
    sky_faces()
        .into_iter()
        .zip(colors)
        .fold(MemoryAssets::new(), |assets, (face, rgba)| {
            assets.with_image(face, ImageData::solid(16, 16, rgba))
        })
        .with_model(CUBE_MODEL, box_model("crate", Vec3::ONE))
        .with_model(GROUND_MODEL, box_model("ground", Vec3::new(40.0, 0.1, 40.0)))
}

/// Axis-aligned box centred on the origin, one material group, loader vertex layout.
pub fn box_model(material: &str, size: Vec3) -> ModelData {
    let mut vertices = Vec::with_capacity(36 * 8);
    let normals = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
    for normal in normals {
        let u = normal.any_orthonormal_vector();
        let v = normal.cross(u);
        let corners = [Vec2::new(-0.5, -0.5), Vec2::new(0.5, -0.5), Vec2::new(0.5, 0.5), Vec2::new(-0.5, 0.5)];
        for index in [0, 1, 2, 0, 2, 3] {
            let c = corners[index];
            let position = (normal * 0.5 + u * c.x + v * c.y) * size;
            let uv = c + Vec2::splat(0.5);
            vertices.extend_from_slice(&[uv.x, uv.y, normal.x, normal.y, normal.z, position.x, position.y, position.z]);
        }
    }
    let material = BaseMaterial {
        name: material.to_string(),
        ..Default::default()
    };
    ModelData {
        groups: vec![ModelGroup { material, vertices }],
        pbr: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use input::HeadlessWindow;
    use renderer::{RecordingDevice, ShaderLibrary};
    use scene::{RenderingInstance, RunOutcome};

    fn shader_library() -> ShaderLibrary {
        ShaderLibrary::from_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/../../shaders"))
    }

    #[test]
    fn every_builtin_plans() {
        for name in NAMES {
            let builtin = builtin(name).unwrap();
            let plan = builtin.scenario.plan().unwrap();
            assert!(plan.len() >= 2, "{name}");
        }
        assert!(builtin("nope").is_none());
    }

    #[test]
    fn box_faces_point_outward() {
        let model = box_model("box", Vec3::new(2.0, 1.0, 4.0));
        let group = &model.groups[0];
        assert_eq!(group.vertex_count(), 36);
        for vertex in group.vertices.chunks(8) {
            let normal = Vec3::new(vertex[2], vertex[3], vertex[4]);
            let position = Vec3::new(vertex[5], vertex[6], vertex[7]);
            assert!(position.dot(normal) > 0.0);
        }
        for triangle in group.vertices.chunks(24) {
            let p = |i: usize| Vec3::new(triangle[i * 8 + 5], triangle[i * 8 + 6], triangle[i * 8 + 7]);
            let normal = Vec3::new(triangle[2], triangle[3], triangle[4]);
            let winding = (p(1) - p(0)).cross(p(2) - p(0));
            assert!(winding.dot(normal) > 0.0);
        }
    }

    #[test]
    fn every_builtin_runs_headless_with_shipped_shaders() {
        for name in NAMES {
            let mut builtin = builtin(name).unwrap();
            builtin.scenario.run = RunSettings {
                duration: None,
                frame_limit: Some(3),
                frame_yield_ms: 0,
                ..Default::default()
            };
            let mut instance = RenderingInstance::from_scenario(
                RecordingDevice::new(320, 180),
                HeadlessWindow::new(320, 180, 1.0 / 60.0),
                shader_library(),
                Box::new(builtin.assets),
                &builtin.scenario,
            )
            .unwrap();
            let report = instance.run().unwrap();
            assert_eq!(report.outcome, RunOutcome::Completed, "{name}");
            assert_eq!(report.frames, 3, "{name}");
            assert!(instance.device().draw_count() >= 6, "{name}");
            instance.shutdown().unwrap();
            assert_eq!(instance.device().live_resources(), 0, "{name}");
        }
    }
}
