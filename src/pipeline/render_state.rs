//! Fixed-function state per pass, baked into cached pipelines

use std::collections::HashMap;

use crate::backend::*;
use crate::error::{RenderError, RenderResult};
use crate::shader::{ShaderVariantCache, VariantIndex};

/// Stencil reference used by the ground shadow guard
pub const GROUND_SHADOW_STENCIL_REF: u32 = 1;

/// Blend, cull, depth and stencil state of one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub blend: Option<BlendState>,
    pub cull: CullMode,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub stencil: StencilState,
    pub depth_bias: DepthBiasState,
}

impl Default for RenderState {
    /// Opaque, back-face culled, depth tested, no stencil and no offset
    fn default() -> Self {
        Self {
            blend: None,
            cull: CullMode::Back,
            depth_write: true,
            depth_compare: CompareFunction::LessEqual,
            stencil: StencilState::default(),
            depth_bias: DepthBiasState::default(),
        }
    }
}

fn face_cull(both_face: bool) -> CullMode {
    if both_face {
        CullMode::None
    } else {
        CullMode::Back
    }
}

impl RenderState {
    pub fn shadow_caster(both_face: bool) -> Self {
        Self {
            cull: face_cull(both_face),
            depth_compare: CompareFunction::Less,
            ..Default::default()
        }
    }

    /// Colour pass; always alpha blended
    pub fn color(both_face: bool) -> Self {
        Self {
            blend: Some(BlendState::alpha_blending()),
            cull: face_cull(both_face),
            ..Default::default()
        }
    }

    /// Outline shell: front faces culled so only the extruded back shows
    pub fn edge() -> Self {
        Self {
            blend: Some(BlendState::alpha_blending()),
            cull: CullMode::Front,
            ..Default::default()
        }
    }

    /// Planar shadow: no culling, pulled towards the camera, and with
    /// `stencil_guard` each pixel is darkened at most once
    pub fn ground_shadow(stencil_guard: bool) -> Self {
        let stencil = if stencil_guard {
            StencilState {
                face: StencilFaceState {
                    compare: CompareFunction::NotEqual,
                    fail_op: StencilOperation::Keep,
                    depth_fail_op: StencilOperation::Keep,
                    pass_op: StencilOperation::Replace,
                },
                read_mask: 0xff,
                write_mask: 0xff,
            }
        } else {
            StencilState::default()
        };

        Self {
            blend: Some(BlendState::alpha_blending()),
            cull: CullMode::None,
            stencil,
            depth_bias: DepthBiasState {
                constant: -1,
                slope_scale: -1,
            },
            ..Default::default()
        }
    }
}

/// Attachment formats a pipeline renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetFormats {
    /// `None` for depth-only passes
    pub color: Option<TextureFormat>,
    pub depth: TextureFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    variant: VariantIndex,
    state: RenderState,
    targets: TargetFormats,
}

/// Render pipelines keyed by shader variant, render state and targets
#[derive(Default)]
pub struct PipelineCache {
    pipelines: HashMap<PipelineKey, RenderPipelineHandle>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn get_or_create<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        shaders: &ShaderVariantCache,
        variant: VariantIndex,
        state: &RenderState,
        targets: TargetFormats,
    ) -> RenderResult<RenderPipelineHandle> {
        let key = PipelineKey {
            variant,
            state: *state,
            targets,
        };
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }

        let shader = shaders
            .variant(variant)
            .ok_or(RenderError::InvalidVariant(variant.index()))?;

        let desc = RenderPipelineDescriptor {
            label: Some(format!("{} {}", shader.family, shader.defines)),
            vertex: shader.vertex_module,
            // Depth-only targets drop the fragment stage entirely
            fragment: shader.fragment_module.filter(|_| targets.color.is_some()),
            vertex_layouts: shader.vertex_layouts()?,
            bind_group_layouts: shader.layouts.clone(),
            cull_mode: state.cull,
            depth_stencil: DepthStencilState {
                format: targets.depth,
                depth_write_enabled: state.depth_write,
                depth_compare: state.depth_compare,
                stencil: state.stencil,
                bias: state.depth_bias,
            },
            color_target: targets.color.map(|format| ColorTargetState {
                format,
                blend: state.blend,
            }),
        };

        let pipeline = backend.create_render_pipeline(&desc)?;
        log::debug!("Created pipeline {:?} ({} cached)", desc.label, self.pipelines.len() + 1);
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }
}

/// Skips redundant binds inside a pass and restores a known state between
/// models.
///
/// Forgetting a binding does not touch the GPU; it only forces the next
/// `set_*` to be issued.
#[derive(Debug, Default)]
pub struct RenderStateTracker {
    pipeline: Option<RenderPipelineHandle>,
    bind_groups: [Option<BindGroupHandle>; 4],
    stencil_reference: u32,
    draw_count: usize,
}

impl RenderStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pipeline<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, pipeline: RenderPipelineHandle) {
        if self.pipeline != Some(pipeline) {
            backend.set_render_pipeline(pipeline);
            self.pipeline = Some(pipeline);
        }
    }

    pub fn set_bind_group<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        index: u32,
        bind_group: BindGroupHandle,
    ) {
        let slot = &mut self.bind_groups[index as usize];
        if *slot != Some(bind_group) {
            backend.set_bind_group(index, bind_group);
            *slot = Some(bind_group);
        }
    }

    /// Forget the group at `index` so the next draw must bind its own
    pub fn unbind(&mut self, index: u32) {
        self.bind_groups[index as usize] = None;
    }

    pub fn set_stencil_reference<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, reference: u32) {
        if self.stencil_reference != reference {
            backend.set_stencil_reference(reference);
            self.stencil_reference = reference;
        }
    }

    pub fn draw_indexed<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, index_count: u32) {
        backend.draw_indexed(0..index_count);
        self.draw_count += 1;
    }

    pub fn draw_count(&self) -> usize {
        self.draw_count
    }

    /// Back to the state a fresh pass starts with: nothing bound, stencil
    /// reference 0
    pub fn reset<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.stencil_reference != 0 {
            backend.set_stencil_reference(0);
        }
        self.pipeline = None;
        self.bind_groups = [None; 4];
        self.stencil_reference = 0;
    }

    /// Forget everything without issuing commands; call when a new pass begins
    pub fn begin_pass(&mut self) {
        self.pipeline = None;
        self.bind_groups = [None; 4];
        self.stencil_reference = 0;
    }
}
