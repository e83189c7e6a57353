//! Shadow inputs of the colour pass
//!
//! Cascaded shadow maps come from a [`ShadowMapProvider`]; the planar ground
//! shadow only needs [`ground_shadow_matrix`].

mod cascaded;
mod ground;

pub use cascaded::*;
pub use ground::*;

use glam::Mat4;

use crate::backend::{TextureHandle, TextureViewHandle};

/// Upper bound on cascades the opaque shader samples
pub const MAX_SHADOW_CASCADES: usize = 4;

/// Shadow map settings
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    pub enabled: bool,
    /// Clamped to `1..=MAX_SHADOW_CASCADES`
    pub cascade_count: usize,
    /// Width and height of every cascade's depth texture
    pub resolution: u32,
    /// Blend between uniform (0) and logarithmic (1) split placement
    pub split_lambda: f32,
    /// View-space range covered by the cascades
    pub near: f32,
    pub far: f32,
    /// Subtracted from the receiver depth before comparison
    pub depth_bias: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cascade_count: MAX_SHADOW_CASCADES,
            resolution: 1024,
            split_lambda: 0.5,
            near: 0.01,
            far: 1000.0,
            depth_bias: 0.01,
        }
    }
}

/// One cascade: a depth texture and the light matrices that render into it
#[derive(Debug, Clone)]
pub struct ShadowCascade {
    pub texture: TextureHandle,
    pub depth_view: TextureViewHandle,
    /// World to light clip space, used by shadow casters
    pub view_projection: Mat4,
    /// World to shadow-map texture space, used by receivers
    pub bias_view_projection: Mat4,
    pub near: f32,
    pub far: f32,
}

/// Source of cascade state for the colour and shadow-caster passes
pub trait ShadowMapProvider {
    /// Global switch; when off, receivers sample nothing
    fn enabled(&self) -> bool;

    /// Active cascades, at most [`MAX_SHADOW_CASCADES`]
    fn cascade_count(&self) -> usize;

    fn cascade(&self, index: usize) -> Option<&ShadowCascade>;

    /// `cascade_count() + 1` view-space distances; cascade `i` covers
    /// `split_positions()[i]..split_positions()[i + 1]`
    fn split_positions(&self) -> &[f32];

    /// World to light view space
    fn shadow_view(&self) -> Mat4;

    fn depth_bias(&self) -> f32;
}
