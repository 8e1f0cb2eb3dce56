//! Planar cameras: render the rest of the scene into a texture one object samples.

use glam::{Mat4, Vec3};
use renderer::{
    apply_lens_roll, forward_from_yaw_pitch, Camera, DeviceError, GraphicsDevice, RenderTarget, RenderTargetDesc,
    TextureId, Viewport,
};

use crate::config::{PlanarCameraConfig, PlanarMode};

const PITCH_LIMIT: f32 = 89.0;

/// Secondary camera plus the offscreen target it renders into.
#[derive(Debug)]
pub struct PlanarCamera {
    config: PlanarCameraConfig,
    width: u32,
    height: u32,
    target: Option<RenderTarget>,
    position: Vec3,
    view: Mat4,
    projection: Mat4,
}

impl PlanarCamera {
    pub fn new(config: PlanarCameraConfig, width: u32, height: u32) -> Self {
        Self {
            config,
            width,
            height,
            target: None,
            position: Vec3::ZERO,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }

    pub fn allocate(&mut self, device: &mut dyn GraphicsDevice, owner: &str) -> Result<(), DeviceError> {
        let id = device.create_render_target(&RenderTargetDesc {
            label: format!("{owner} planar camera"),
            width: self.width,
            height: self.height,
            color: true,
            depth: true,
        })?;
        self.target = Some(RenderTarget {
            id,
            width: self.width,
            height: self.height,
        });
        Ok(())
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(target) = self.target.take() {
            device.delete_render_target(target.id);
        }
    }

    pub fn target(&self) -> Option<RenderTarget> {
        self.target
    }

    /// Colour texture the owning renderer samples.
    pub fn texture(&self, device: &dyn GraphicsDevice) -> Option<TextureId> {
        self.target.and_then(|t| device.render_target_texture(t.id))
    }

    pub fn screen_facing(&self) -> bool {
        self.config.screen_facing
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// Place the camera for this frame.
    ///
    /// `Relative` sits at the object plus offset, keeps the main camera's yaw and
    /// pitches by the mirrored elevation of the main camera as seen from the
    /// object. `Fixed` uses the rotation offset alone. Both look with an
    /// inverted up vector, then apply the lens rotation.
    pub fn update(&mut self, object_position: Vec3, main: &Camera) {
        let position = object_position + self.config.position_offset;
        let offset = self.config.rotation_offset;
        let (yaw, pitch) = match self.config.mode {
            PlanarMode::Relative => {
                let to_main = (main.position - position).normalize_or_zero();
                let elevation = to_main.y.clamp(-1.0, 1.0).asin().to_degrees();
                (main.yaw + offset.x, -elevation + offset.y)
            }
            PlanarMode::Fixed => (offset.x, offset.y),
        };
        let pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        let forward = forward_from_yaw_pitch(yaw, pitch);

        let up = -main.up;
        let view = Mat4::look_at_rh(position, position + forward, up);
        self.position = position;
        self.view = apply_lens_roll(view, self.config.lens_rotation);
        self.projection = Mat4::perspective_rh(
            main.fov_degrees.to_radians(),
            self.width as f32 / self.height.max(1) as f32,
            main.near,
            main.far,
        );
    }

    /// Bind the target, set its viewport and clear colour and depth.
    pub fn begin(&self, device: &mut dyn GraphicsDevice, clear_color: glam::Vec4) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        device.bind_render_target(Some(target.id));
        device.set_viewport(target.viewport());
        device.clear(Some(clear_color), true);
        true
    }

    /// Back to the default framebuffer and the main viewport.
    pub fn end(&self, device: &mut dyn GraphicsDevice, main_viewport: Viewport) {
        device.bind_render_target(None);
        device.set_viewport(main_viewport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec4};

    fn main_camera() -> Camera {
        Camera {
            position: Vec3::new(0.0, 10.0, 10.0),
            yaw: -90.0,
            pitch: -30.0,
            ..Default::default()
        }
    }

    #[test]
    fn relative_mode_mirrors_main_camera_elevation() {
        let mut planar = PlanarCamera::new(PlanarCameraConfig::default(), 256, 256);
        planar.update(Vec3::ZERO, &main_camera());
        assert_eq!(planar.position(), Vec3::ZERO);

        // The main camera is 45 degrees above the object, so the planar camera looks 45 degrees down.
        let inverse = planar.view().inverse();
        let forward = -inverse.z_axis.truncate();
        assert!(forward.y < 0.0);
        assert!((forward.y.abs() - 45f32.to_radians().sin()).abs() < 1e-4);
        // Up is flipped.
        assert!(inverse.y_axis.y < 0.0);
        assert!(planar.view().is_finite() && planar.projection().is_finite());
    }

    #[test]
    fn fixed_mode_uses_static_offsets() {
        let config = PlanarCameraConfig {
            mode: PlanarMode::Fixed,
            position_offset: Vec3::new(0.0, 2.0, 0.0),
            rotation_offset: Vec2::new(0.0, 0.0),
            ..Default::default()
        };
        let mut planar = PlanarCamera::new(config, 128, 64);
        planar.update(Vec3::new(1.0, 0.0, 0.0), &main_camera());
        assert_eq!(planar.position(), Vec3::new(1.0, 2.0, 0.0));
        let forward = -planar.view().inverse().z_axis.truncate();
        assert!((forward - Vec3::X).length() < 1e-4);
    }

    #[test]
    fn begin_without_target_does_nothing() {
        let mut device = renderer::RecordingDevice::new(64, 64);
        let planar = PlanarCamera::new(PlanarCameraConfig::default(), 32, 32);
        assert!(!planar.begin(&mut device, Vec4::ZERO));
        assert!(device.commands().is_empty());
    }
}
