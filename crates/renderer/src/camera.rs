//! Yaw/pitch camera with lens roll.

use engine_core::CameraSample;
use glam::{Mat3, Mat4, Vec3};

/// Forward direction for yaw/pitch in degrees. Yaw 0 looks down +X.
pub fn forward_from_yaw_pitch(yaw_degrees: f32, pitch_degrees: f32) -> Vec3 {
    let (yaw, pitch) = (yaw_degrees.to_radians(), pitch_degrees.to_radians());
    Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
}

/// Rotate a view matrix about the viewing axis by `roll_degrees`.
pub fn apply_lens_roll(view: Mat4, roll_degrees: f32) -> Mat4 {
    if roll_degrees == 0.0 {
        return view;
    }
    Mat4::from_axis_angle(Vec3::Z, roll_degrees.to_radians()) * view
}

/// Perspective camera driven by position, yaw/pitch and lens roll.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Roll about the viewing axis in degrees.
    pub lens_roll: f32,
    pub up: Vec3,
    /// Field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Aspect ratio (width / height).
    pub aspect: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            lens_roll: 0.0,
            up: Vec3::Y,
            fov_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
            aspect: 16.0 / 9.0,
        }
    }
}

impl Camera {
    /// Update aspect ratio (call on window resize).
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// Take position, rotation and lens roll from a camera path sample.
    pub fn follow(&mut self, sample: &CameraSample) {
        self.position = sample.position;
        self.yaw = sample.rotation.x;
        self.pitch = sample.rotation.y;
        self.lens_roll = sample.lens_roll;
    }

    pub fn forward(&self) -> Vec3 {
        forward_from_yaw_pitch(self.yaw, self.pitch)
    }

    /// Look-at along the forward vector, then lens roll.
    pub fn view_matrix(&self) -> Mat4 {
        let view = Mat4::look_at_rh(self.position, self.position + self.forward(), self.up);
        apply_lens_roll(view, self.lens_roll)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }
}

/// View matrix with its translation removed, for drawing a skybox around the eye.
pub fn strip_translation(view: Mat4) -> Mat4 {
    Mat4::from_mat3(Mat3::from_mat4(view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec4};

    #[test]
    fn yaw_zero_looks_down_x() {
        assert!((forward_from_yaw_pitch(0.0, 0.0) - Vec3::X).length() < 1e-5);
        assert!((forward_from_yaw_pitch(90.0, 0.0) - Vec3::Z).length() < 1e-5);
        assert!((forward_from_yaw_pitch(0.0, 90.0) - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn view_centres_forward_point() {
        let mut camera = Camera::default();
        camera.follow(&CameraSample {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec2::new(90.0, 0.0),
            lens_roll: 0.0,
        });
        let ahead = camera.position + camera.forward() * 5.0;
        let p = camera.view_matrix() * ahead.extend(1.0);
        assert!(p.x.abs() < 1e-4 && p.y.abs() < 1e-4);
        assert!((p.z + 5.0).abs() < 1e-4);
    }

    #[test]
    fn lens_roll_rotates_about_view_axis() {
        let camera = Camera {
            lens_roll: 90.0,
            ..Default::default()
        };
        let up_point = camera.position + camera.forward() * 2.0 + Vec3::Y;
        let p = camera.view_matrix() * up_point.extend(1.0);
        // Screen up rolls onto screen -X.
        assert!((p.x + 1.0).abs() < 1e-4);
        assert!(p.y.abs() < 1e-4);
    }

    #[test]
    fn stripped_view_keeps_rotation_only() {
        let view = Mat4::look_at_rh(Vec3::new(5.0, 5.0, 5.0), Vec3::ZERO, Vec3::Y);
        let stripped = strip_translation(view);
        assert_eq!(stripped * Vec4::W, Vec4::W);
        assert!((stripped.x_axis - view.x_axis).length() < 1e-6);
    }
}
