//! Toon rendering pipeline
//!
//! Every frame runs these passes:
//! 1. Shadow cascades - depth-only draws of every shadow caster per cascade
//! 2. Main pass, per model:
//!    - Colour - lit, textured, alpha-blended submeshes
//!    - Edge - inverted-hull outlines
//!    - Ground shadow - geometry flattened onto the ground plane

mod frame;
mod model_drawer;
mod render_state;
mod uniforms;

pub use frame::{FrameStats, ToonRenderer};
pub use model_drawer::{FrameView, MaterialBinding, ModelDrawer};
pub use render_state::{
    PipelineCache, RenderState, RenderStateTracker, TargetFormats, GROUND_SHADOW_STENCIL_REF,
};
pub use uniforms::{
    EdgeUniforms, GroundShadowUniforms, MaterialUniforms, ModelUniforms, ShadowCasterUniforms,
};
