//! Toon material model and its GPU-side mirror

use glam::{Vec3, Vec4};

use super::texture::TextureId;

/// How the sphere (environment) texture combines with the lit colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SphereMode {
    #[default]
    None,
    Multiply,
    Add,
}

impl SphereMode {
    pub fn as_i32(self) -> i32 {
        match self {
            SphereMode::None => 0,
            SphereMode::Multiply => 1,
            SphereMode::Add => 2,
        }
    }
}

/// How the base texture contributes to colour and opacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureMode {
    /// No base texture bound; scalar factors only
    None,
    /// Texture colour is used, opacity comes from the material alone
    MaterialAlpha,
    /// Material opacity is modulated by the texture's alpha channel
    TextureAlpha,
}

impl TextureMode {
    pub fn select(bound: bool, has_alpha: bool) -> Self {
        match (bound, has_alpha) {
            (false, _) => TextureMode::None,
            (true, false) => TextureMode::MaterialAlpha,
            (true, true) => TextureMode::TextureAlpha,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            TextureMode::None => 0,
            TextureMode::MaterialAlpha => 1,
            TextureMode::TextureAlpha => 2,
        }
    }
}

/// Material as owned by the animation engine.
///
/// Scalar and factor fields may change every frame through material morphs;
/// texture paths and flags are fixed once the model is loaded.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub diffuse: Vec3,
    /// Opacity; exactly 0 hides the material from every pass
    pub alpha: f32,
    pub specular: Vec3,
    pub specular_power: f32,
    pub ambient: Vec3,

    pub edge_flag: bool,
    pub edge_size: f32,
    pub edge_color: Vec4,

    pub both_face: bool,
    pub ground_shadow: bool,
    pub shadow_caster: bool,
    pub shadow_receiver: bool,

    pub texture: Option<String>,
    pub sphere_texture: Option<String>,
    pub sphere_mode: SphereMode,
    pub toon_texture: Option<String>,

    pub texture_mul_factor: Vec4,
    pub texture_add_factor: Vec4,
    pub sphere_mul_factor: Vec4,
    pub sphere_add_factor: Vec4,
    pub toon_mul_factor: Vec4,
    pub toon_add_factor: Vec4,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            diffuse: Vec3::ONE,
            alpha: 1.0,
            specular: Vec3::ZERO,
            specular_power: 1.0,
            ambient: Vec3::splat(0.2),
            edge_flag: false,
            edge_size: 1.0,
            edge_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            both_face: false,
            ground_shadow: true,
            shadow_caster: true,
            shadow_receiver: true,
            texture: None,
            sphere_texture: None,
            sphere_mode: SphereMode::None,
            toon_texture: None,
            texture_mul_factor: Vec4::ONE,
            texture_add_factor: Vec4::ZERO,
            sphere_mul_factor: Vec4::ONE,
            sphere_add_factor: Vec4::ZERO,
            toon_mul_factor: Vec4::ONE,
            toon_add_factor: Vec4::ZERO,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_diffuse(mut self, diffuse: Vec3, alpha: f32) -> Self {
        self.diffuse = diffuse;
        self.alpha = alpha;
        self
    }

    pub fn with_specular(mut self, specular: Vec3, power: f32) -> Self {
        self.specular = specular;
        self.specular_power = power;
        self
    }

    pub fn with_ambient(mut self, ambient: Vec3) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn with_edge(mut self, size: f32, color: Vec4) -> Self {
        self.edge_flag = true;
        self.edge_size = size;
        self.edge_color = color;
        self
    }

    pub fn with_both_face(mut self, both_face: bool) -> Self {
        self.both_face = both_face;
        self
    }

    pub fn with_ground_shadow(mut self, enabled: bool) -> Self {
        self.ground_shadow = enabled;
        self
    }

    pub fn with_shadow_caster(mut self, enabled: bool) -> Self {
        self.shadow_caster = enabled;
        self
    }

    pub fn with_texture(mut self, path: &str) -> Self {
        self.texture = Some(path.to_string());
        self
    }

    pub fn with_sphere_texture(mut self, path: &str, mode: SphereMode) -> Self {
        self.sphere_texture = Some(path.to_string());
        self.sphere_mode = mode;
        self
    }

    pub fn with_toon_texture(mut self, path: &str) -> Self {
        self.toon_texture = Some(path.to_string());
        self
    }

}

/// GPU-side mirror of a [`Material`].
///
/// Holds resolved texture ids plus a copy of every field that can change per
/// frame, refreshed by [`mirror_from`](Self::mirror_from) after each update.
#[derive(Debug, Clone)]
pub struct GpuMaterial {
    pub diffuse: Vec3,
    pub alpha: f32,
    pub specular: Vec3,
    pub specular_power: f32,
    pub ambient: Vec3,

    pub edge_flag: bool,
    pub edge_size: f32,
    pub edge_color: Vec4,

    pub both_face: bool,
    pub ground_shadow: bool,
    pub shadow_caster: bool,
    pub shadow_receiver: bool,

    pub texture: Option<TextureId>,
    pub texture_has_alpha: bool,
    pub sphere_texture: Option<TextureId>,
    pub sphere_mode: SphereMode,
    pub toon_texture: Option<TextureId>,

    pub texture_mul_factor: Vec4,
    pub texture_add_factor: Vec4,
    pub sphere_mul_factor: Vec4,
    pub sphere_add_factor: Vec4,
    pub toon_mul_factor: Vec4,
    pub toon_add_factor: Vec4,
}

impl GpuMaterial {
    /// Mirror `material` with no textures resolved yet
    pub fn new(material: &Material) -> Self {
        Self {
            diffuse: material.diffuse,
            alpha: material.alpha,
            specular: material.specular,
            specular_power: material.specular_power,
            ambient: material.ambient,
            edge_flag: material.edge_flag,
            edge_size: material.edge_size,
            edge_color: material.edge_color,
            both_face: material.both_face,
            ground_shadow: material.ground_shadow,
            shadow_caster: material.shadow_caster,
            shadow_receiver: material.shadow_receiver,
            texture: None,
            texture_has_alpha: false,
            sphere_texture: None,
            sphere_mode: material.sphere_mode,
            toon_texture: None,
            texture_mul_factor: material.texture_mul_factor,
            texture_add_factor: material.texture_add_factor,
            sphere_mul_factor: material.sphere_mul_factor,
            sphere_add_factor: material.sphere_add_factor,
            toon_mul_factor: material.toon_mul_factor,
            toon_add_factor: material.toon_add_factor,
        }
    }

    /// Copy the morphable fields after an animation update
    pub fn mirror_from(&mut self, material: &Material) {
        self.diffuse = material.diffuse;
        self.alpha = material.alpha;
        self.specular = material.specular;
        self.specular_power = material.specular_power;
        self.ambient = material.ambient;
        self.edge_size = material.edge_size;
        self.edge_color = material.edge_color;
        self.texture_mul_factor = material.texture_mul_factor;
        self.texture_add_factor = material.texture_add_factor;
        self.sphere_mul_factor = material.sphere_mul_factor;
        self.sphere_add_factor = material.sphere_add_factor;
        self.toon_mul_factor = material.toon_mul_factor;
        self.toon_add_factor = material.toon_add_factor;
    }

    /// Materials with opacity exactly 0 are skipped by every pass
    pub fn is_visible(&self) -> bool {
        self.alpha != 0.0
    }

    pub fn texture_mode(&self) -> TextureMode {
        TextureMode::select(self.texture.is_some(), self.texture_has_alpha)
    }

    /// Effective sphere mode; `None` when the texture did not resolve
    pub fn sphere_mode(&self) -> SphereMode {
        if self.sphere_texture.is_some() {
            self.sphere_mode
        } else {
            SphereMode::None
        }
    }

    pub fn toon_mode(&self) -> i32 {
        i32::from(self.toon_texture.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(false, false, TextureMode::None, 0)]
    #[case(false, true, TextureMode::None, 0)]
    #[case(true, false, TextureMode::MaterialAlpha, 1)]
    #[case(true, true, TextureMode::TextureAlpha, 2)]
    fn test_texture_mode_selection(
        #[case] bound: bool,
        #[case] has_alpha: bool,
        #[case] expected: TextureMode,
        #[case] code: i32,
    ) {
        let mode = TextureMode::select(bound, has_alpha);
        assert_eq!(mode, expected);
        assert_eq!(mode.as_i32(), code);
    }

    #[test]
    fn test_unresolved_sphere_texture_disables_sphere_mode() {
        let material = Material::new("m").with_sphere_texture("missing.sph", SphereMode::Add);
        let gpu = GpuMaterial::new(&material);
        assert_eq!(gpu.sphere_mode(), SphereMode::None);
        assert_eq!(gpu.toon_mode(), 0);
    }

    #[test]
    fn test_mirror_copies_morphable_fields() {
        let mut material = Material::new("skin").with_edge(1.0, Vec4::ONE);
        let mut gpu = GpuMaterial::new(&material);

        material.alpha = 0.0;
        material.texture_mul_factor = Vec4::new(0.5, 0.5, 0.5, 1.0);
        gpu.mirror_from(&material);

        assert!(!gpu.is_visible());
        assert_eq!(gpu.texture_mul_factor, material.texture_mul_factor);
        assert!(gpu.edge_flag);
    }
}
