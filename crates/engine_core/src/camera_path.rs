//! Keyframed camera path: interpolates position, yaw/pitch and lens roll over time.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One camera keyframe: position plus yaw/pitch in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraKeyframe {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl CameraKeyframe {
    pub fn new(x: f32, y: f32, z: f32, yaw: f32, pitch: f32) -> Self {
        Self {
            position: Vec3::new(x, y, z),
            yaw,
            pitch,
        }
    }

    /// Yaw and pitch packed as a vector.
    pub fn rotation(&self) -> Vec2 {
        Vec2::new(self.yaw, self.pitch)
    }
}

/// Interpolated camera state for the current progress along the path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSample {
    pub position: Vec3,
    /// (yaw, pitch) in degrees.
    pub rotation: Vec2,
    /// Lens roll in degrees.
    pub lens_roll: f32,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CameraPathError {
    #[error("camera path needs at least one keyframe")]
    NoKeyframes,
}

/// Moves a camera along an ordered list of keyframes.
///
/// Progress `t` runs from 0 to 1 between the current and next keyframe. When it
/// passes 1 it resets to 0 and the keyframe pair advances. Looping paths wrap to
/// the first keyframe; non-looping paths clamp at the last one and stay there.
#[derive(Debug, Clone)]
pub struct CameraPathController {
    keyframes: Vec<CameraKeyframe>,
    lens_rolls: Vec<f32>,
    speed: f32,
    looping: bool,
    current: usize,
    next: usize,
    t: f32,
    target: Vec3,
}

impl CameraPathController {
    pub fn new(
        keyframes: Vec<CameraKeyframe>,
        lens_rolls: Vec<f32>,
        speed: f32,
        looping: bool,
    ) -> Result<Self, CameraPathError> {
        if keyframes.is_empty() {
            return Err(CameraPathError::NoKeyframes);
        }
        if !lens_rolls.is_empty() && lens_rolls.len() != keyframes.len() {
            log::warn!(
                "{} lens rotations for {} camera keyframes, using the first lens rotation for the whole path",
                lens_rolls.len(),
                keyframes.len()
            );
        }
        let next = if keyframes.len() > 1 { 1 } else { 0 };
        Ok(Self {
            keyframes,
            lens_rolls,
            speed,
            looping,
            current: 0,
            next,
            t: 0.0,
            target: Vec3::ZERO,
        })
    }

    /// A path that never moves.
    pub fn fixed(keyframe: CameraKeyframe) -> Self {
        Self {
            keyframes: vec![keyframe],
            lens_rolls: Vec::new(),
            speed: 0.0,
            looping: false,
            current: 0,
            next: 0,
            t: 0.0,
            target: Vec3::ZERO,
        }
    }

    /// Advance the path by `delta_time` seconds and return the new sample.
    pub fn update(&mut self, delta_time: f32) -> CameraSample {
        if self.keyframes.len() > 1 {
            self.t += self.speed * delta_time;
            if self.t > 1.0 {
                self.t = 0.0;
                self.advance_indices();
            }
        }
        self.current()
    }

    fn advance_indices(&mut self) {
        let count = self.keyframes.len();
        if self.looping {
            self.current = (self.current + 1) % count;
            self.next = (self.current + 1) % count;
        } else {
            self.current = (self.current + 1).min(count - 1);
            self.next = (self.current + 1).min(count - 1);
        }
    }

    /// Sample at the current progress without advancing.
    pub fn current(&self) -> CameraSample {
        let a = &self.keyframes[self.current];
        let b = &self.keyframes[self.next];
        CameraSample {
            position: a.position.lerp(b.position, self.t),
            rotation: a.rotation().lerp(b.rotation(), self.t),
            lens_roll: self.current_lens_rotation(),
        }
    }

    /// Lens roll interpolated with the same index pair and progress as the position.
    pub fn current_lens_rotation(&self) -> f32 {
        if self.lens_rolls.len() != self.keyframes.len() {
            return self.lens_rolls.first().copied().unwrap_or(0.0);
        }
        let a = self.lens_rolls[self.current];
        let b = self.lens_rolls[self.next];
        a + (b - a) * self.t
    }

    /// Look-at target. Fixed, not driven by the path.
    pub fn current_target(&self) -> Vec3 {
        self.target
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn first_keyframe(&self) -> CameraKeyframe {
        self.keyframes[0]
    }

    pub fn progress(&self) -> f32 {
        self.t
    }

    /// (current, next) keyframe indices.
    pub fn indices(&self) -> (usize, usize) {
        (self.current, self.next)
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_point_path(looping: bool) -> CameraPathController {
        CameraPathController::new(
            vec![
                CameraKeyframe::new(0.0, 0.0, 0.0, 0.0, 0.0),
                CameraKeyframe::new(10.0, 10.0, 10.0, 90.0, 45.0),
            ],
            vec![0.0, 90.0],
            1.0,
            looping,
        )
        .unwrap()
    }

    #[test]
    fn interpolates_halfway() {
        let mut path = two_point_path(false);
        let sample = path.update(0.5);
        assert!((sample.position - Vec3::splat(5.0)).length() < 1e-5);
        assert!((sample.rotation.x - 45.0).abs() < 1e-5);
        assert!((sample.rotation.y - 22.5).abs() < 1e-5);
        assert!((path.current_lens_rotation() - 45.0).abs() < 1e-5);
    }

    #[test]
    fn single_keyframe_is_static() {
        let key = CameraKeyframe::new(1.0, 2.0, 3.0, 10.0, -5.0);
        let mut path = CameraPathController::new(vec![key], vec![7.0], 3.0, true).unwrap();
        for dt in [0.0, 0.016, 1.0, 250.0] {
            let sample = path.update(dt);
            assert_eq!(sample.position, key.position);
            assert_eq!(sample.rotation, key.rotation());
            assert_eq!(sample.lens_roll, 7.0);
            assert!(sample.position.is_finite());
        }
    }

    #[test]
    fn non_looping_clamps_at_last_keyframe() {
        let mut path = two_point_path(false);
        path.update(0.9);
        path.update(0.2); // passes 1.0
        assert_eq!(path.indices(), (1, 1));
        for _ in 0..10 {
            let sample = path.update(0.7);
            assert!((sample.position - Vec3::splat(10.0)).length() < 1e-5);
            assert!((sample.lens_roll - 90.0).abs() < 1e-5);
        }
    }

    #[test]
    fn looping_wraps_to_first_keyframe() {
        let mut path = two_point_path(true);
        path.update(0.9);
        path.update(0.2);
        assert_eq!(path.indices(), (1, 0));
        let sample = path.update(0.5);
        assert!((sample.position - Vec3::splat(5.0)).length() < 1e-5);
        path.update(0.6);
        assert_eq!(path.indices(), (0, 1));
    }

    #[test]
    fn mismatched_lens_rolls_fall_back_to_first() {
        let mut path = CameraPathController::new(
            vec![
                CameraKeyframe::new(0.0, 0.0, 0.0, 0.0, 0.0),
                CameraKeyframe::new(1.0, 0.0, 0.0, 0.0, 0.0),
            ],
            vec![12.0],
            1.0,
            true,
        )
        .unwrap();
        path.update(0.5);
        assert_eq!(path.current_lens_rotation(), 12.0);
    }

    #[test]
    fn empty_path_is_rejected() {
        assert_eq!(
            CameraPathController::new(Vec::new(), Vec::new(), 1.0, true).unwrap_err(),
            CameraPathError::NoKeyframes
        );
    }
}
