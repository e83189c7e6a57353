//! Directional light

use glam::{Mat4, Vec3};

/// Single directional light shading every model
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    /// Direction the light travels, world space
    pub direction: Vec3,
    pub color: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::splat(0.6),
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
        }
    }

    /// Light direction rotated into the camera's view space
    pub fn view_direction(&self, view: &Mat4) -> Vec3 {
        view.transform_vector3(self.direction).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_direction_ignores_translation() {
        let light = DirectionalLight::new(-Vec3::Y, Vec3::ONE);
        let view = Mat4::from_translation(Vec3::new(3.0, 4.0, 5.0));
        assert_eq!(light.view_direction(&view), -Vec3::Y);
    }
}
