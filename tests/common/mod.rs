//! Shared setup for the integration tests.
//!
//! Everything runs on the dummy backend, which records passes and draws
//! instead of talking to a GPU.

#![allow(dead_code)]

use glam::{Vec3, Vec4};

use toon_renderer::backend::dummy::DummyBackend;
use toon_renderer::resources::{Material, StaticModel, TextureCache, TextureData, TextureLoader};
use toon_renderer::shader::ShaderVariantCache;
use toon_renderer::{RenderContext, RenderError, RenderResult, RendererConfig};

pub const BLACK: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

/// Index ranges of the submeshes built by [`sphere_model`]
pub const BODY: (u32, u32) = (0, 96);
pub const HAIR: (u32, u32) = (96, 48);
pub const HIDDEN: (u32, u32) = (144, 48);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Solid-colour textures; paths starting with `missing` fail to load
pub struct SolidLoader;

impl TextureLoader for SolidLoader {
    fn load(&self, path: &str) -> RenderResult<TextureData> {
        if path.starts_with("missing") {
            return Err(RenderError::TextureLoadFailed {
                path: path.to_string(),
                message: "not found".into(),
            });
        }
        Ok(TextureData::solid_color([180, 160, 150, 255], path))
    }
}

pub fn small_config() -> RendererConfig {
    let mut config = RendererConfig {
        width: 320,
        height: 240,
        ..Default::default()
    };
    config.shadow.cascade_count = 2;
    config.shadow.resolution = 64;
    config
}

pub fn context(config: RendererConfig) -> RenderContext<DummyBackend> {
    init_logging();
    RenderContext::with_sources(
        DummyBackend::new(),
        config,
        ShaderVariantCache::with_builtin_sources(),
        TextureCache::new(Box::new(SolidLoader)),
    )
    .expect("render context")
}

/// Opaque, outlined material lit mostly by its own colour
pub fn skin(color: Vec3) -> Material {
    Material::new("skin")
        .with_diffuse(color, 1.0)
        .with_ambient(color * 0.5)
        .with_edge(1.0, Vec4::new(0.2, 0.1, 0.1, 1.0))
}

/// Sphere with three submeshes: an outlined body, hair whose outline is
/// controlled by `hair_edge`, and a fully transparent part.
pub fn sphere_model(hair_edge: bool) -> StaticModel {
    let mut hair = Material::new("hair").with_texture("hair.bmp");
    if hair_edge {
        hair = hair.with_edge(0.5, BLACK);
    }
    StaticModel::uv_sphere(1.0, 8, 4)
        .with_sub_mesh(
            skin(Vec3::new(1.0, 0.9, 0.8)).with_toon_texture("toon01.bmp"),
            BODY.0,
            BODY.1,
        )
        .with_sub_mesh(hair, HAIR.0, HAIR.1)
        .with_sub_mesh(
            Material::new("hidden")
                .with_diffuse(Vec3::ONE, 0.0)
                .with_edge(1.0, BLACK),
            HIDDEN.0,
            HIDDEN.1,
        )
}
