use winit::event::VirtualKeyCode;

use crate::tracked::Tracked;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in, normalized.
    pub direction: glam::Vec3,
    pub intensity: f32,
}

impl DirectionalLight {
    pub fn new(direction: glam::Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            intensity,
        }
    }

    /// `xyz` = direction, `w` = intensity.
    pub fn as_vec4(&self) -> glam::Vec4 {
        self.direction.extend(self.intensity)
    }

    pub fn rotated_y(&self, angle: f32) -> Self {
        Self {
            direction: glam::Quat::from_rotation_y(angle) * self.direction,
            intensity: self.intensity,
        }
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(glam::Vec3::new(-0.4, -1.0, 0.6), 1.0)
    }
}

/// Left/Right arrows swing the light around the vertical axis.
pub fn process_key(light: &mut Tracked<DirectionalLight>, keycode: VirtualKeyCode, step: f32) -> bool {
    let angle = match keycode {
        VirtualKeyCode::Left => step,
        VirtualKeyCode::Right => -step,
        _ => return false,
    };
    let rotated = light.rotated_y(angle);
    light.set(rotated);
    true
}
