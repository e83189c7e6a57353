//! Toon Renderer - multi-pass cel-shading renderer for animated character models
//!
//! Rendering goes through a small [`GraphicsBackend`](backend::GraphicsBackend)
//! abstraction:
//! - **wgpu**: real GPU backend, windowless or on an existing device
//! - **dummy**: records passes and draws without a GPU (feature `dummy`)
//!
//! # Features
//! - Toon shading with sphere maps and toon ramps
//! - Inverted-hull edge outlines
//! - Cascaded shadow maps and a planar ground shadow with a stencil guard
//! - Shader variants composed on demand from GLSL templates, with defines and
//!   stage selection handled by naga's GLSL front end
//! - Reference-counted texture cache with mipmaps
//! - Playback control that clamps the physics step

pub mod animation;
pub mod backend;
pub mod context;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod shadow;

pub use animation::{FrameTick, PlayController, PlayMode};
pub use context::RenderContext;
pub use error::{RenderError, RenderResult};
pub use model::ToonModel;
pub use pipeline::{FrameStats, ToonRenderer};

// Re-export wgpu backend for direct access
pub use backend::wgpu_backend::WgpuBackend;

use backend::TextureFormat;
use shadow::{GroundShadowConfig, ShadowConfig};

/// Configuration for a [`RenderContext`]
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Framebuffer width
    pub width: u32,
    /// Framebuffer height
    pub height: u32,
    /// Format of the main colour target
    pub color_format: TextureFormat,
    /// Format of the main depth target; needs stencil for the ground shadow guard
    pub depth_format: TextureFormat,
    /// Main pass clear colour
    pub clear_color: [f32; 4],
    pub shadow: ShadowConfig,
    pub ground_shadow: GroundShadowConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            color_format: TextureFormat::Rgba8UnormSrgb,
            depth_format: TextureFormat::Depth24PlusStencil8,
            clear_color: [1.0, 1.0, 1.0, 1.0],
            shadow: ShadowConfig::default(),
            ground_shadow: GroundShadowConfig::default(),
        }
    }
}
