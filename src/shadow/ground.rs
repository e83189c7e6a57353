//! Planar projected ground shadow

use glam::{Mat4, Vec3, Vec4};

/// Ground shadow settings
#[derive(Debug, Clone)]
pub struct GroundShadowConfig {
    pub enabled: bool,
    /// Premultiplied over the ground; alpha below 1 turns on the stencil guard
    pub color: Vec4,
    /// `(a, b, c, d)` with `ax + by + cz + d = 0`
    pub plane: Vec4,
}

impl Default for GroundShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            color: Vec4::new(0.4, 0.2, 0.2, 0.7),
            plane: Vec4::new(0.0, 1.0, 0.0, 0.0),
        }
    }
}

impl GroundShadowConfig {
    /// Overlapping shadow triangles must not darken a pixel twice
    pub fn uses_stencil(&self) -> bool {
        self.color.w < 1.0
    }
}

/// Matrix flattening geometry onto `plane` along the direction `light`.
///
/// `light` points from the scene towards the light, i.e. the negated light
/// direction. Each column `c` is `dot(plane, L) * e_c - L * plane[c]` with
/// `L = (light, 0)`.
pub fn ground_shadow_matrix(plane: Vec4, light: Vec3) -> Mat4 {
    let l = light.extend(0.0);
    let d = plane.dot(l);
    Mat4::from_cols(
        Vec4::X * d - l * plane.x,
        Vec4::Y * d - l * plane.y,
        Vec4::Z * d - l * plane.z,
        Vec4::W * d - l * plane.w,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_straight_down_light_flattens_y() {
        let m = ground_shadow_matrix(Vec4::new(0.0, 1.0, 0.0, 0.0), Vec3::Y);
        assert_eq!(m.row(0), Vec4::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(m.row(1), Vec4::ZERO);
        assert_eq!(m.row(2), Vec4::new(0.0, 0.0, 1.0, 0.0));
        assert_eq!(m.row(3), Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_bilinear_terms() {
        let (lx, ly, lz) = (0.3, 0.8, -0.5);
        let m = ground_shadow_matrix(Vec4::new(0.0, 1.0, 0.0, 0.0), Vec3::new(lx, ly, lz));
        assert_eq!(m.row(0), Vec4::new(ly, -lx, 0.0, 0.0));
        assert_eq!(m.row(1), Vec4::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(m.row(2), Vec4::new(0.0, -lz, ly, 0.0));
        assert_eq!(m.row(3), Vec4::new(0.0, 0.0, 0.0, ly));
    }

    #[rstest]
    #[case(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.4, 1.0, 0.2))]
    #[case(Vec3::new(-2.0, 0.5, 1.0), Vec3::new(-0.3, 0.7, 0.6))]
    fn test_points_land_on_ground(#[case] point: Vec3, #[case] light: Vec3) {
        let m = ground_shadow_matrix(Vec4::new(0.0, 1.0, 0.0, 0.0), light);
        let projected = m * point.extend(1.0);
        let projected = projected.truncate() / projected.w;
        assert!(projected.y.abs() < 1e-5);

        // Moving along the light ray does not move the shadow
        let along = m * (point + light).extend(1.0);
        let along = along.truncate() / along.w;
        assert!((along - projected).length() < 1e-4);
    }

    #[test]
    fn test_stencil_only_for_translucent_color() {
        let mut config = GroundShadowConfig::default();
        assert!(config.uses_stencil());
        config.color.w = 1.0;
        assert!(!config.uses_stencil());
    }
}
