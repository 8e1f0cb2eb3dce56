//! Particle renderer with host, ping-pong kernel and in-place compute backends.
//!
//! Every backend integrates the same model:
//! `v += g * dt`, clamp `|v|` to the maximum speed, `p += v * dt`, and on
//! penetrating the ground plane project `p` back onto it and reflect `v`
//! scaled by the bounce factor. Particles are drawn as instanced billboards.

use glam::Vec3;
use rand::prelude::*;
use renderer::{
    billboard_corners, names, BillboardVertex, BufferId, BufferKind, DrawCall, GraphicsDevice, ParticleVertex,
    ProgramKind, StorageAccess, UniformValue,
};

use super::{ProgramSet, RendererVariant};
use crate::config::{ParticleBackend, ParticleConfig, ParticlePhysics, SpawnParams};
use crate::context::Resources;
use crate::error::VariantError;

/// Invocations per workgroup in `compute.wgsl` and `feedback.wgsl`.
pub const WORKGROUP_SIZE: u32 = 64;

/// Project a particle below the ground back onto it and bounce its velocity.
/// Particles on or above the plane are returned unchanged.
pub fn resolve_ground(position: Vec3, velocity: Vec3, physics: &ParticlePhysics) -> (Vec3, Vec3) {
    let normal = physics.ground_normal;
    let depth = position.dot(normal) - physics.ground_height;
    if depth >= 0.0 {
        return (position, velocity);
    }
    let position = position - normal * depth;
    let velocity = (velocity - 2.0 * velocity.dot(normal) * normal) * physics.bounce_factor;
    (position, velocity)
}

/// One integration step of a single particle.
pub fn step_particle(position: Vec3, velocity: Vec3, physics: &ParticlePhysics, dt: f32) -> (Vec3, Vec3) {
    let velocity = (velocity + physics.gravity * dt).clamp_length_max(physics.max_velocity);
    let position = position + velocity * dt;
    resolve_ground(position, velocity, physics)
}

/// Seeded initial state: positions in the upper half of a box around the spawn centre.
pub fn spawn_particles(count: u32, seed: u64, spawn: &SpawnParams) -> Vec<ParticleVertex> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let offset = Vec3::new(
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(0.0..=1.0),
                rng.gen_range(-1.0..=1.0),
            ) * spawn.radius;
            let direction = Vec3::new(
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(0.5..=1.0),
                rng.gen_range(-1.0..=1.0),
            )
            .normalize_or_zero();
            ParticleVertex::new(spawn.center + offset, direction * spawn.initial_speed)
        })
        .collect()
}

pub struct ParticleRenderer {
    name: String,
    count: u32,
    seed: u64,
    backend: ParticleBackend,
    physics: ParticlePhysics,
    spawn: SpawnParams,
    size: f32,
    color: glam::Vec4,
    /// Host copy; authoritative for the CPU backend, initial state otherwise.
    particles: Vec<ParticleVertex>,
    corners: Option<BufferId>,
    /// One buffer, or two for the ping-pong backend.
    buffers: Vec<BufferId>,
    /// Index of the buffer holding the current state.
    front: usize,
}

impl ParticleRenderer {
    pub fn new(config: ParticleConfig) -> Self {
        Self {
            name: config.settings.name,
            count: config.count,
            seed: config.seed,
            backend: config.backend,
            physics: config.physics,
            spawn: config.spawn,
            size: config.size,
            color: config.color,
            particles: Vec::new(),
            corners: None,
            buffers: Vec::new(),
            front: 0,
        }
    }

    pub fn backend(&self) -> ParticleBackend {
        self.backend
    }

    /// Host-side particles. Only advanced by the CPU backend.
    pub fn particles(&self) -> &[ParticleVertex] {
        &self.particles
    }

    fn workgroups(&self) -> u32 {
        self.count.div_ceil(WORKGROUP_SIZE)
    }

    fn upload_physics(&self, device: &mut dyn GraphicsDevice, dt: f32) {
        let physics = &self.physics;
        device.set_uniform(names::GRAVITY, UniformValue::Vec3(physics.gravity));
        device.set_uniform(names::DELTA_TIME, UniformValue::Float(dt));
        device.set_uniform(names::GROUND_NORMAL, UniformValue::Vec3(physics.ground_normal));
        device.set_uniform(names::GROUND_HEIGHT, UniformValue::Float(physics.ground_height));
        device.set_uniform(names::MAX_VELOCITY, UniformValue::Float(physics.max_velocity));
        device.set_uniform(names::BOUNCE, UniformValue::Float(physics.bounce_factor));
        device.set_uniform(names::PARTICLE_COUNT, UniformValue::Int(self.count as i32));
    }
}

impl RendererVariant for ParticleRenderer {
    fn kind(&self) -> &'static str {
        "particle"
    }

    fn compute_program(&self) -> Option<(ProgramKind, Vec<StorageAccess>)> {
        match self.backend {
            ParticleBackend::Cpu => None,
            ParticleBackend::TransformFeedback => Some((
                ProgramKind::Feedback,
                vec![StorageAccess::ReadOnly, StorageAccess::ReadWrite],
            )),
            ParticleBackend::Compute => Some((ProgramKind::Compute, vec![StorageAccess::ReadWrite])),
        }
    }

    fn casts_shadow(&self) -> bool {
        false
    }

    fn create_buffers(&mut self, res: &mut Resources<'_>) -> Result<(), VariantError> {
        self.particles = spawn_particles(self.count, self.seed, &self.spawn);
        let corners = billboard_corners();
        self.corners = Some(res.device.create_buffer(
            &format!("{} billboard", self.name),
            BufferKind::Vertex(BillboardVertex::layout()),
            bytemuck::cast_slice(&corners),
        )?);

        let (kind, copies) = match self.backend {
            ParticleBackend::Cpu => (BufferKind::Vertex(ParticleVertex::layout()), 1),
            ParticleBackend::TransformFeedback => (BufferKind::Storage(ParticleVertex::layout()), 2),
            ParticleBackend::Compute => (BufferKind::Storage(ParticleVertex::layout()), 1),
        };
        for i in 0..copies {
            let buffer = res.device.create_buffer(
                &format!("{} particles {i}", self.name),
                kind.clone(),
                bytemuck::cast_slice(&self.particles),
            )?;
            self.buffers.push(buffer);
        }
        self.front = 0;
        log::debug!(
            "Spawned {} particles for '{}' ({:?} backend)",
            self.count,
            self.name,
            self.backend
        );
        Ok(())
    }

    fn upload_uniforms(&self, device: &mut dyn GraphicsDevice) {
        device.set_uniform(names::PARTICLE_SIZE, UniformValue::Float(self.size));
        device.set_uniform(names::PARTICLE_COLOR, UniformValue::Vec4(self.color));
    }

    fn advance(&mut self, res: &mut Resources<'_>, programs: &ProgramSet, dt: f32) {
        match self.backend {
            ParticleBackend::Cpu => {
                for particle in &mut self.particles {
                    let (position, velocity) =
                        step_particle(particle.position(), particle.velocity(), &self.physics, dt);
                    *particle = ParticleVertex::new(position, velocity);
                }
                if let Some(&buffer) = self.buffers.first() {
                    res.device.update_buffer(buffer, 0, bytemuck::cast_slice(&self.particles));
                }
            }
            ParticleBackend::TransformFeedback => {
                let (Some(program), [a, b]) = (programs.compute, self.buffers.as_slice()) else {
                    return;
                };
                let (source, destination) = if self.front == 0 { (*a, *b) } else { (*b, *a) };
                res.device.use_program(program);
                self.upload_physics(res.device, dt);
                res.device.dispatch(&[source, destination], self.workgroups());
                self.front = 1 - self.front;
            }
            ParticleBackend::Compute => {
                let (Some(program), Some(&buffer)) = (programs.compute, self.buffers.first()) else {
                    return;
                };
                res.device.use_program(program);
                self.upload_physics(res.device, dt);
                res.device.dispatch(&[buffer], self.workgroups());
            }
        }
    }

    fn draw_geometry(&mut self, res: &mut Resources<'_>) {
        if let (Some(corners), Some(&state)) = (self.corners, self.buffers.get(self.front)) {
            let call = DrawCall::arrays(corners, 6).instanced(state, self.count);
            res.device.draw(&call);
        }
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for buffer in self.buffers.drain(..).rev().chain(self.corners.take()) {
            device.delete_buffer(buffer);
        }
        self.particles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn physics() -> ParticlePhysics {
        ParticlePhysics {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            max_velocity: 20.0,
            bounce_factor: 0.5,
            ground_normal: Vec3::Y,
            ground_height: 0.0,
        }
    }

    #[test]
    fn gravity_accelerates_downward() {
        let (p, v) = step_particle(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, &physics(), 0.1);
        assert!((v.y + 0.981).abs() < 1e-5);
        assert!((p.y - (10.0 - 0.0981)).abs() < 1e-5);
    }

    #[test]
    fn speed_is_clamped() {
        let (_, v) = step_particle(Vec3::new(0.0, 100.0, 0.0), Vec3::new(100.0, 0.0, 0.0), &physics(), 0.01);
        assert!((v.length() - 20.0).abs() < 1e-4);
    }

    #[test]
    fn ground_bounce_projects_and_reflects_once() {
        let physics = physics();
        let (p, v) = step_particle(Vec3::new(0.0, 0.05, 0.0), Vec3::new(1.0, -10.0, 0.0), &physics, 0.1);
        assert!(p.y.abs() < 1e-5);
        assert!(v.y > 0.0);
        assert!((v.x - 0.5).abs() < 1e-5);

        // Already on the plane: resolving again changes nothing.
        assert_eq!(resolve_ground(p, v, &physics), (p, v));
    }

    #[test]
    fn resting_particle_stays_on_the_ground() {
        let physics = physics();
        let (mut p, mut v) = (Vec3::new(1.0, 0.0, 2.0), Vec3::new(0.5, 0.0, 0.0));
        for _ in 0..10 {
            (p, v) = step_particle(p, v, &physics, 0.01);
            assert!((p.dot(physics.ground_normal) - physics.ground_height).abs() < 1e-5, "{p:?}");
        }
        assert!((p.x - 1.05).abs() < 1e-4);
        assert_eq!(p.z, 2.0);
    }

    #[test]
    fn spawning_is_deterministic_per_seed() {
        let spawn = SpawnParams::default();
        let a = spawn_particles(16, 7, &spawn);
        let b = spawn_particles(16, 7, &spawn);
        let c = spawn_particles(16, 8, &spawn);
        assert_eq!(a, b);
        assert_ne!(a, c);
        for particle in &a {
            let offset = particle.position() - spawn.center;
            assert!(offset.y >= 0.0 && offset.abs().max_element() <= spawn.radius + 1e-5);
            assert!((particle.velocity().length() - spawn.initial_speed).abs() < 1e-4);
        }
    }
}
