use winit::event::{ElementState, KeyboardInput, VirtualKeyCode, WindowEvent};

use crate::tracked::Tracked;
use crate::util::math::degree_to_radian;

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub eye: glam::Vec3,
    pub target: glam::Vec3,
    pub up: glam::Vec3,
    pub aspect: f32,
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    pub fn new(eye: glam::Vec3, target: glam::Vec3, fov_y_degrees: f32) -> Self {
        Self {
            eye,
            target,
            fov_y: degree_to_radian(fov_y_degrees),
            ..Default::default()
        }
    }

    pub fn view_matrix(&self) -> glam::Mat4 {
        glam::Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> glam::Mat4 {
        glam::Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far)
    }

    pub fn camera_to_world(&self) -> glam::Mat4 {
        self.view_matrix().inverse()
    }

    /// Clip space to view space.
    pub fn inverse_projection(&self) -> glam::Mat4 {
        self.projection_matrix().inverse()
    }

    pub fn forward(&self) -> glam::Vec3 {
        (self.target - self.eye).normalize_or_zero()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: glam::Vec3::new(0.0, 40.0, 160.0),
            target: glam::Vec3::ZERO,
            up: glam::Vec3::Y,
            aspect: 16.0 / 9.0,
            fov_y: degree_to_radian(60.0),
            z_near: 0.1,
            z_far: 1000.0,
        }
    }
}

pub struct CameraController {
    pub speed: f32,
    pub turn_speed: f32,
}

impl CameraController {
    pub fn new(speed: f32) -> Self {
        Self {
            speed,
            turn_speed: degree_to_radian(2.0),
        }
    }

    /// Apply a key press to the camera. Returns true if the event moved it.
    pub fn process_events(&self, camera: &mut Tracked<Camera>, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state: ElementState::Pressed,
                        virtual_keycode: Some(keycode),
                        ..
                    },
                ..
            } => self.process_key(camera, *keycode),
            _ => false,
        }
    }

    pub fn process_key(&self, camera: &mut Tracked<Camera>, keycode: VirtualKeyCode) -> bool {
        let forward = camera.forward();
        let right = forward.cross(camera.up).normalize_or_zero();
        let translation = match keycode {
            VirtualKeyCode::W => forward * self.speed,
            VirtualKeyCode::S => -forward * self.speed,
            VirtualKeyCode::D => right * self.speed,
            VirtualKeyCode::A => -right * self.speed,
            VirtualKeyCode::Space => camera.up * self.speed,
            VirtualKeyCode::LShift => -camera.up * self.speed,
            VirtualKeyCode::Up => return self.pitch(camera, self.turn_speed),
            VirtualKeyCode::Down => return self.pitch(camera, -self.turn_speed),
            _ => return false,
        };
        camera.modify(|camera| {
            camera.eye += translation;
            camera.target += translation;
        });
        tracing::trace!(?keycode, "camera moved");
        true
    }

    fn pitch(&self, camera: &mut Tracked<Camera>, angle: f32) -> bool {
        let right = camera.forward().cross(camera.up).normalize_or_zero();
        if right == glam::Vec3::ZERO {
            return false;
        }
        camera.modify(|camera| {
            let offset = camera.target - camera.eye;
            camera.target = camera.eye + glam::Quat::from_axis_angle(right, angle) * offset;
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_to_world_places_eye() {
        let camera = Camera::new(glam::Vec3::new(1.0, 2.0, 3.0), glam::Vec3::ZERO, 60.0);
        let origin = camera.camera_to_world().transform_point3(glam::Vec3::ZERO);
        assert!((origin - camera.eye).length() < 1e-4);
    }

    #[test]
    fn inverse_projection_round_trips() {
        let camera = Camera::default();
        let identity = camera.projection_matrix() * camera.inverse_projection();
        assert!(identity.abs_diff_eq(glam::Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn movement_marks_camera_changed() {
        let controller = CameraController::new(1.0);
        let mut camera = Tracked::new(Camera::default());
        assert!(controller.process_key(&mut camera, VirtualKeyCode::W));
        assert!(camera.take_changed());
        assert!(!controller.process_key(&mut camera, VirtualKeyCode::F1));
        assert!(!camera.take_changed());
    }
}
