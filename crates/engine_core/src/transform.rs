//! Transform component with time-driven auto-rotation.

use glam::{EulerRot, Mat4, Quat, Vec3};

/// A 3D transform representing position, rotation, and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform at the given position.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform from position, Euler rotation in degrees (X, Y, Z order) and scale.
    pub fn from_euler_degrees(position: Vec3, rotation_degrees: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::from_euler(
                EulerRot::XYZ,
                rotation_degrees.x.to_radians(),
                rotation_degrees.y.to_radians(),
                rotation_degrees.z.to_radians(),
            ),
            scale,
        }
    }

    /// Create the model matrix for this transform (T * R * S).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Translate the transform by a delta.
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Rotate by `degrees` around `axis`, applied after the current rotation.
    pub fn rotate(&mut self, axis: Vec3, degrees: f32) {
        let axis = axis.normalize_or_zero();
        if axis == Vec3::ZERO {
            return;
        }
        self.rotation = (self.rotation * Quat::from_axis_angle(axis, degrees.to_radians())).normalize();
    }

    /// Multiply the current scale component-wise.
    pub fn scale_by(&mut self, factor: Vec3) {
        self.scale *= factor;
    }
}

/// Time-driven rotation that composes on top of a manual transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoRotation {
    pub enabled: bool,
    pub axis: Vec3,
    /// Angular speed in degrees per second.
    pub speed: f32,
}

impl Default for AutoRotation {
    fn default() -> Self {
        Self {
            enabled: false,
            axis: Vec3::Y,
            speed: 0.0,
        }
    }
}

impl AutoRotation {
    pub fn new(axis: Vec3, speed: f32) -> Self {
        Self {
            enabled: true,
            axis,
            speed,
        }
    }

    /// Rotation matrix at `elapsed` seconds. Identity when disabled or stopped.
    pub fn matrix(&self, elapsed: f32) -> Mat4 {
        let axis = self.axis.normalize_or_zero();
        if !self.enabled || self.speed == 0.0 || axis == Vec3::ZERO {
            return Mat4::IDENTITY;
        }
        Mat4::from_axis_angle(axis, (self.speed * elapsed).to_radians())
    }
}

/// Persistent manual transform plus the ephemeral auto-rotation layered on it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ObjectTransform {
    pub base: Transform,
    pub auto_rotation: AutoRotation,
}

impl ObjectTransform {
    pub fn new(base: Transform) -> Self {
        Self {
            base,
            auto_rotation: AutoRotation::default(),
        }
    }

    /// Composed model matrix: `T * R * S * A(t)`.
    pub fn model_matrix(&self, elapsed: f32) -> Mat4 {
        self.base.to_matrix() * self.auto_rotation.matrix(elapsed)
    }

    pub fn set_auto_rotation(&mut self, enabled: bool, axis: Option<Vec3>, speed: Option<f32>) {
        self.auto_rotation.enabled = enabled;
        if let Some(axis) = axis {
            self.auto_rotation.axis = axis;
        }
        if let Some(speed) = speed {
            self.auto_rotation.speed = speed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat_close(a: Mat4, b: Mat4) -> bool {
        a.to_cols_array()
            .iter()
            .zip(b.to_cols_array().iter())
            .all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn model_matrix_is_manual_then_auto_rotation() {
        let base = Transform::from_euler_degrees(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(0.0, 30.0, 0.0),
            Vec3::new(2.0, 2.0, 2.0),
        );
        let mut object = ObjectTransform::new(base);
        object.set_auto_rotation(true, Some(Vec3::Y), Some(45.0));

        let t = Mat4::from_translation(base.position);
        let r = Mat4::from_quat(base.rotation);
        let s = Mat4::from_scale(base.scale);
        let a = Mat4::from_axis_angle(Vec3::Y, (45.0f32 * 2.0).to_radians());

        assert!(mat_close(object.model_matrix(2.0), t * r * s * a));
        // Auto-rotation must not be applied first.
        assert!(!mat_close(object.model_matrix(2.0), a * t * r * s));
    }

    #[test]
    fn zero_speed_freezes_at_manual_transform() {
        let base = Transform::from_position(Vec3::new(4.0, 0.0, -1.0));
        let mut object = ObjectTransform::new(base);
        object.set_auto_rotation(true, Some(Vec3::X), Some(90.0));
        assert!(!mat_close(object.model_matrix(1.0), base.to_matrix()));

        object.set_auto_rotation(true, None, Some(0.0));
        assert!(mat_close(object.model_matrix(1.0), base.to_matrix()));
        assert!(mat_close(object.model_matrix(57.0), base.to_matrix()));
    }

    #[test]
    fn disabled_auto_rotation_is_identity() {
        let rotation = AutoRotation {
            enabled: false,
            axis: Vec3::Z,
            speed: 10.0,
        };
        assert!(mat_close(rotation.matrix(3.0), Mat4::IDENTITY));
    }

    #[test]
    fn rotate_ignores_zero_axis() {
        let mut t = Transform::default();
        t.rotate(Vec3::ZERO, 90.0);
        assert_eq!(t.rotation, Quat::IDENTITY);
    }
}
