//! The GPU interface the toon passes record through
//!
//! The renderer only talks to the GPU through [`GraphicsBackend`]. Resources are
//! addressed with small copyable handles; the backend owns the real objects.

use crate::backend::types::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create bind group: {0}")]
    BindGroupCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Failed to submit frame: {0}")]
    SubmitFailed(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Entry point of every stage module produced by the shader composer
pub const SHADER_ENTRY_POINT: &str = "main";

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) u64);
    };
}

handle!(
    /// Vertex, index or uniform buffer
    BufferHandle
);
handle!(TextureHandle);
handle!(
    /// Whole-texture view, the only kind the passes bind
    TextureViewHandle
);
handle!(SamplerHandle);
handle!(
    /// One compiled stage of a shader variant
    ShaderModuleHandle
);
handle!(RenderPipelineHandle);
handle!(BindGroupHandle);
handle!(BindGroupLayoutHandle);

/// Resource bound at one binding of a group
#[derive(Debug, Clone, PartialEq)]
pub enum BindGroupEntry {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Texture(TextureViewHandle),
    Sampler(SamplerHandle),
}

/// Layout slot reflected from a shader variant.
///
/// Every slot is visible to both stages; the families share their uniform
/// blocks between the vertex and fragment modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub ty: BindingType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    UniformBuffer,
    /// Filterable colour texture, or a depth texture read through a
    /// comparison sampler
    Texture { depth: bool },
    Sampler { comparison: bool },
}

/// One pass family's pipeline for a render state and a set of targets.
///
/// A pipeline without a fragment module writes depth only, as the shadow
/// caster pass does.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub vertex: ShaderModuleHandle,
    pub fragment: Option<ShaderModuleHandle>,
    /// One layout per mesh attribute buffer, bound to slots `0..n`
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub bind_group_layouts: Vec<BindGroupLayoutHandle>,
    /// Triangles are wound counter-clockwise
    pub cull_mode: CullMode,
    pub depth_stencil: DepthStencilState,
    pub color_target: Option<ColorTargetState>,
}

#[derive(Debug, Clone)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
    pub stencil: StencilState,
    pub bias: DepthBiasState,
}

#[derive(Debug, Clone)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: Option<BlendState>,
}

/// Colour attachment, cleared at the start of the pass and stored at the end
#[derive(Debug, Clone)]
pub struct ColorAttachment {
    pub view: TextureViewHandle,
    pub clear_color: [f32; 4],
}

/// Depth attachment, cleared to `depth_clear_value` and stored
#[derive(Debug, Clone)]
pub struct DepthStencilAttachment {
    pub view: TextureViewHandle,
    pub depth_clear_value: f32,
    /// `Some(value)` clears the stencil aspect to `value`; `None` leaves it untouched
    pub stencil_clear_value: Option<u32>,
}

/// A shadow cascade pass has no colour attachment; the main pass has one
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachment: Option<ColorAttachment>,
    pub depth_stencil_attachment: DepthStencilAttachment,
}

/// Element width of an uploaded index buffer. 8-bit source indices are
/// widened to 16 bits on upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn size(&self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// GPU interface used by the toon renderer
///
/// All calls are made from the render thread. Commands recorded between
/// [`begin_render_pass`](Self::begin_render_pass) and
/// [`end_render_pass`](Self::end_render_pass) are submitted on
/// [`end_frame`](Self::end_frame).
pub trait GraphicsBackend {
    fn begin_frame(&mut self);

    /// Submit everything recorded since [`begin_frame`](Self::begin_frame)
    fn end_frame(&mut self) -> BackendResult<()>;

    // Resources

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> BackendResult<BufferHandle>;

    /// Queue a write; it lands before the next submitted frame
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Allocated size of a buffer in bytes
    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64>;

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle>;

    /// Write tightly packed RGBA8 data to one mip level of a texture
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        data: &[u8],
        width: u32,
        height: u32,
    );

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    /// Create one stage module from composed, naga-validated WGSL whose entry
    /// point is [`SHADER_ENTRY_POINT`]
    fn create_shader_module(&mut self, label: &str, wgsl: &str)
        -> BackendResult<ShaderModuleHandle>;

    // Pipelines

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle>;

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle>;

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle>;

    // Recording

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    fn end_render_pass(&mut self);

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle);

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle);

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    /// `offset` in bytes, the start of a submesh's index range
    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat);

    /// Viewport in pixels; shadow passes cover the whole cascade texture
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32);

    /// Dynamic stencil reference used by the ground-shadow guard
    fn set_stencil_reference(&mut self, reference: u32);

    fn draw_indexed(&mut self, indices: std::ops::Range<u32>);

    // Cleanup

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn destroy_texture_view(&mut self, view: TextureViewHandle);

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle);
}
