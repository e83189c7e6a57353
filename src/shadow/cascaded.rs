//! Cascaded shadow map fitted to the camera frustum

use glam::{Mat4, Vec3};

use super::{ShadowCascade, ShadowConfig, ShadowMapProvider, MAX_SHADOW_CASCADES};
use crate::backend::{
    BackendResult, GraphicsBackend, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage,
    TextureViewHandle,
};
use crate::error::RenderResult;
use crate::scene::{Camera, DirectionalLight};

/// Depth format of every cascade texture
pub const SHADOW_MAP_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Cascade boundaries between `near` and `far`, `count + 1` values.
///
/// Each inner split blends the logarithmic and uniform positions by `lambda`.
pub fn split_positions(near: f32, far: f32, count: usize, lambda: f32) -> Vec<f32> {
    let count = count.max(1);
    let mut splits = vec![0.0; count + 1];
    for (i, split) in splits.iter_mut().enumerate().skip(1) {
        let t = i as f32 / count as f32;
        let log = near * (far / near).powf(t);
        let uniform = near + (far - near) * t;
        *split = lambda * log + (1.0 - lambda) * uniform;
    }
    splits[0] = near;
    splits[count] = far;
    splits
}

/// World to light view space for a light travelling along `direction`
pub fn light_view_matrix(direction: Vec3) -> Mat4 {
    let w = direction.normalize_or_zero();
    let mut u = w.cross(Vec3::X);
    if u.length() < 1.0e-5 {
        u = w.cross(Vec3::Y);
    }
    let u = u.normalize();
    let v = u.cross(w);
    Mat4::look_at_rh(Vec3::ZERO, w, v)
}

/// Orthographic projection mapping the light-space box `min..max` to clip
/// space, depth 0 on the side facing the light
pub fn fit_orthographic(min: Vec3, max: Vec3) -> Mat4 {
    Mat4::orthographic_rh(min.x, max.x, min.y, max.y, -max.z, -min.z)
}

/// Clip space to shadow-map texture coordinates
pub fn texture_bias_matrix() -> Mat4 {
    Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0)) * Mat4::from_scale(Vec3::new(0.5, -0.5, 1.0))
}

fn create_depth_target<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    resolution: u32,
    index: usize,
) -> BackendResult<(TextureHandle, TextureViewHandle)> {
    let texture = backend.create_texture(&TextureDescriptor {
        label: Some(format!("Shadow Cascade {index}")),
        width: resolution,
        height: resolution,
        mip_levels: 1,
        format: SHADOW_MAP_FORMAT,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    })?;
    match backend.create_texture_view(texture) {
        Ok(view) => Ok((texture, view)),
        Err(e) => {
            backend.destroy_texture(texture);
            Err(e)
        }
    }
}

/// Shadow map provider owning one depth texture per cascade
pub struct CascadedShadowMap {
    config: ShadowConfig,
    cascades: Vec<ShadowCascade>,
    splits: Vec<f32>,
    view: Mat4,
}

impl CascadedShadowMap {
    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B, mut config: ShadowConfig) -> RenderResult<Self> {
        if config.cascade_count == 0 || config.cascade_count > MAX_SHADOW_CASCADES {
            log::warn!(
                "Shadow cascade count {} out of range, clamping to 1..={}",
                config.cascade_count,
                MAX_SHADOW_CASCADES
            );
            config.cascade_count = config.cascade_count.clamp(1, MAX_SHADOW_CASCADES);
        }

        let mut cascades: Vec<ShadowCascade> = Vec::with_capacity(config.cascade_count);
        for i in 0..config.cascade_count {
            let created = create_depth_target(backend, config.resolution, i);
            let (texture, depth_view) = match created {
                Ok(pair) => pair,
                Err(e) => {
                    for cascade in cascades {
                        backend.destroy_texture_view(cascade.depth_view);
                        backend.destroy_texture(cascade.texture);
                    }
                    return Err(e.into());
                }
            };
            cascades.push(ShadowCascade {
                texture,
                depth_view,
                view_projection: Mat4::IDENTITY,
                bias_view_projection: texture_bias_matrix(),
                near: 0.0,
                far: 0.0,
            });
        }

        log::info!(
            "Created {} shadow cascades at {}x{}",
            cascades.len(),
            config.resolution,
            config.resolution
        );

        let splits = split_positions(config.near, config.far, config.cascade_count, config.split_lambda);
        Ok(Self {
            config,
            cascades,
            splits,
            view: Mat4::IDENTITY,
        })
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn resolution(&self) -> u32 {
        self.config.resolution
    }

    /// Refit every cascade to the camera frustum as seen from `light`
    pub fn update(&mut self, camera: &Camera, light: &DirectionalLight) {
        self.view = light_view_matrix(light.direction);
        let to_light_view = self.view * camera.view_matrix().inverse();

        let tan_half_fov_y = (camera.fov_y * 0.5).tan();
        let tan_half_fov_x = tan_half_fov_y * camera.aspect;

        self.splits = split_positions(
            self.config.near,
            self.config.far,
            self.cascades.len(),
            self.config.split_lambda,
        );

        for (i, cascade) in self.cascades.iter_mut().enumerate() {
            let near = self.splits[i];
            let far = self.splits[i + 1];
            let (xn, yn) = (near * tan_half_fov_x, near * tan_half_fov_y);
            let (xf, yf) = (far * tan_half_fov_x, far * tan_half_fov_y);

            let corners = [
                Vec3::new(xn, yn, -near),
                Vec3::new(-xn, yn, -near),
                Vec3::new(xn, -yn, -near),
                Vec3::new(-xn, -yn, -near),
                Vec3::new(xf, yf, -far),
                Vec3::new(-xf, yf, -far),
                Vec3::new(xf, -yf, -far),
                Vec3::new(-xf, -yf, -far),
            ];
            let (min, max) = corners.iter().fold(
                (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
                |(min, max), &corner| {
                    let p = to_light_view.transform_point3(corner);
                    (min.min(p), max.max(p))
                },
            );

            cascade.view_projection = fit_orthographic(min, max) * self.view;
            cascade.bias_view_projection = texture_bias_matrix() * cascade.view_projection;
            cascade.near = near;
            cascade.far = far;
        }
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for cascade in self.cascades {
            backend.destroy_texture_view(cascade.depth_view);
            backend.destroy_texture(cascade.texture);
        }
    }
}

impl ShadowMapProvider for CascadedShadowMap {
    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn cascade_count(&self) -> usize {
        self.cascades.len()
    }

    fn cascade(&self, index: usize) -> Option<&ShadowCascade> {
        self.cascades.get(index)
    }

    fn split_positions(&self) -> &[f32] {
        &self.splits
    }

    fn shadow_view(&self) -> Mat4 {
        self.view
    }

    fn depth_bias(&self) -> f32 {
        self.config.depth_bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_single_split_spans_range() {
        assert_eq!(split_positions(0.5, 100.0, 1, 0.5), vec![0.5, 100.0]);
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.5)]
    #[case(1.0)]
    fn test_splits_are_increasing(#[case] lambda: f32) {
        let splits = split_positions(0.1, 500.0, 4, lambda);
        assert_eq!(splits.len(), 5);
        assert_eq!(splits[0], 0.1);
        assert_eq!(splits[4], 500.0);
        assert!(splits.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_uniform_splits() {
        let splits = split_positions(0.0, 100.0, 4, 0.0);
        for (split, expected) in splits.iter().zip([0.0, 25.0, 50.0, 75.0, 100.0]) {
            assert!((split - expected).abs() < 1e-4);
        }
    }

    #[rstest]
    #[case(Vec3::new(-0.5, -1.0, -0.5))]
    #[case(Vec3::X)]
    #[case(-Vec3::Y)]
    fn test_light_view_looks_down_light_direction(#[case] direction: Vec3) {
        let view = light_view_matrix(direction);
        let forward = view.transform_vector3(direction.normalize());
        assert!((forward - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_orthographic_fit_maps_box_to_clip_volume() {
        let (min, max) = (Vec3::new(-2.0, -1.0, -10.0), Vec3::new(4.0, 3.0, -2.0));
        let ortho = fit_orthographic(min, max);

        let near_corner = ortho.project_point3(Vec3::new(min.x, min.y, max.z));
        assert!((near_corner - Vec3::new(-1.0, -1.0, 0.0)).length() < 1e-5);
        let far_corner = ortho.project_point3(Vec3::new(max.x, max.y, min.z));
        assert!((far_corner - Vec3::new(1.0, 1.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_bias_matrix_maps_to_texture_space() {
        let bias = texture_bias_matrix();
        assert!((bias.transform_point3(Vec3::new(-1.0, 1.0, 0.3)) - Vec3::new(0.0, 0.0, 0.3)).length() < 1e-6);
        assert!((bias.transform_point3(Vec3::new(1.0, -1.0, 0.0)) - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-6);
    }
}
