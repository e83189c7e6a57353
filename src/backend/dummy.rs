//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform GPU work. It hands out handles, remembers
//! what was created, and records every render pass and draw so frame
//! structure can be inspected without GPU hardware.

use std::collections::HashMap;
use std::ops::Range;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A render pass as seen by the dummy backend
#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub label: Option<String>,
    pub color_attachments: usize,
    pub depth_view: TextureViewHandle,
    pub stencil_clear_value: Option<u32>,
}

/// One `draw_indexed` call together with the state bound at that moment
#[derive(Debug, Clone)]
pub struct RecordedDraw {
    pub pass_index: usize,
    pub pass_label: Option<String>,
    pub pipeline: Option<RenderPipelineHandle>,
    pub pipeline_label: Option<String>,
    pub index_buffer: Option<BufferHandle>,
    pub index_format: Option<IndexFormat>,
    pub index_byte_offset: u64,
    pub indices: Range<u32>,
    pub stencil_reference: u32,
    pub bind_groups: [Option<BindGroupHandle>; 4],
}

#[derive(Debug, Default)]
struct PassState {
    pipeline: Option<RenderPipelineHandle>,
    bind_groups: [Option<BindGroupHandle>; 4],
    index_buffer: Option<(BufferHandle, u64, IndexFormat)>,
    stencil_reference: u32,
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    next_id: u64,
    buffer_limit: Option<usize>,

    /// Shadow copy of every buffer's contents
    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, TextureDescriptor>,
    texture_views: HashMap<u64, TextureHandle>,
    bind_groups: HashMap<u64, Vec<(u32, BindGroupEntry)>>,
    pipelines: HashMap<u64, RenderPipelineDescriptor>,
    shader_modules: HashMap<u64, String>,
    samplers: usize,
    texture_writes: Vec<(TextureHandle, u32)>,
    buffer_writes: usize,

    frames: usize,
    in_frame: bool,
    passes: Vec<RecordedPass>,
    draws: Vec<RecordedDraw>,
    current: Option<PassState>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    /// Make buffer creation fail once `max` buffers are alive.
    pub fn with_buffer_limit(mut self, max: usize) -> Self {
        self.buffer_limit = Some(max);
        self
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_bind_group_count(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn shader_module_count(&self) -> usize {
        self.shader_modules.len()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn sampler_count(&self) -> usize {
        self.samplers
    }

    pub fn buffer_write_count(&self) -> usize {
        self.buffer_writes
    }

    /// Bytes last written to `buffer`, zero-filled where never written
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    /// Mip levels written to `texture`, in upload order
    pub fn texture_writes(&self, texture: TextureHandle) -> Vec<u32> {
        self.texture_writes
            .iter()
            .filter(|(t, _)| *t == texture)
            .map(|(_, mip)| *mip)
            .collect()
    }

    pub fn texture_of_view(&self, view: TextureViewHandle) -> Option<TextureHandle> {
        self.texture_views.get(&view.0).copied()
    }

    pub fn bind_group_entries(&self, bind_group: BindGroupHandle) -> Option<&[(u32, BindGroupEntry)]> {
        self.bind_groups.get(&bind_group.0).map(Vec::as_slice)
    }

    pub fn pipeline_descriptor(&self, pipeline: RenderPipelineHandle) -> Option<&RenderPipelineDescriptor> {
        self.pipelines.get(&pipeline.0)
    }

    pub fn passes(&self) -> &[RecordedPass] {
        &self.passes
    }

    pub fn draw_calls(&self) -> &[RecordedDraw] {
        &self.draws
    }

    /// Forget recorded passes and draws, keeping resources
    pub fn clear_recording(&mut self) {
        self.passes.clear();
        self.draws.clear();
    }

    fn allocate_id(&mut self) -> u64 {
        if self.next_id == 0 {
            self.next_id = 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GraphicsBackend for DummyBackend {
    fn begin_frame(&mut self) {
        log::trace!("DummyBackend: begin frame {}", self.frames);
        self.in_frame = true;
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if self.current.is_some() {
            return Err(BackendError::SubmitFailed(
                "frame ended with an open render pass".into(),
            ));
        }
        self.in_frame = false;
        self.frames += 1;
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        if let Some(limit) = self.buffer_limit {
            if self.buffers.len() >= limit {
                return Err(BackendError::BufferCreationFailed(format!(
                    "{:?}: buffer limit of {} reached",
                    desc.label, limit
                )));
            }
        }
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let id = self.allocate_id();
        self.buffers.insert(id, vec![0; desc.size as usize]);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let desc = BufferDescriptor {
            size: data.len() as u64,
            ..desc.clone()
        };
        let handle = self.create_buffer(&desc)?;
        // Initial contents are not counted as writes
        if let Some(bytes) = self.buffers.get_mut(&handle.0) {
            bytes.copy_from_slice(data);
        }
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        match self.buffers.get_mut(&buffer.0) {
            Some(bytes) if offset as usize + data.len() <= bytes.len() => {
                bytes[offset as usize..offset as usize + data.len()].copy_from_slice(data);
                self.buffer_writes += 1;
            }
            Some(bytes) => log::warn!(
                "DummyBackend: write of {} bytes at {} overflows buffer of {} bytes",
                data.len(),
                offset,
                bytes.len()
            ),
            None => log::warn!("DummyBackend: write to unknown buffer {:?}", buffer),
        }
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers.get(&buffer.0).map(|b| b.len() as u64)
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: invalid size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.mip_levels
        );
        let id = self.allocate_id();
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::TextureCreationFailed("Texture not found".into()));
        }
        let id = self.allocate_id();
        self.texture_views.insert(id, texture);
        Ok(TextureViewHandle(id))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        data: &[u8],
        width: u32,
        height: u32,
    ) {
        if data.len() as u64 != width as u64 * height as u64 * 4 {
            log::warn!(
                "DummyBackend: texture write of {} bytes does not match {}x{}",
                data.len(),
                width,
                height
            );
        }
        self.texture_writes.push((texture, mip_level));
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("DummyBackend: creating sampler {:?}", desc.label);
        self.samplers += 1;
        Ok(SamplerHandle(self.allocate_id()))
    }

    fn create_shader_module(
        &mut self,
        label: &str,
        _wgsl: &str,
    ) -> BackendResult<ShaderModuleHandle> {
        log::trace!("DummyBackend: creating shader module {}", label);
        let id = self.allocate_id();
        self.shader_modules.insert(id, label.to_string());
        Ok(ShaderModuleHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        _entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        Ok(BindGroupLayoutHandle(self.allocate_id()))
    }

    fn create_bind_group(
        &mut self,
        _layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let id = self.allocate_id();
        self.bind_groups.insert(id, entries.to_vec());
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        let known = |m: &ShaderModuleHandle| self.shader_modules.contains_key(&m.0);
        if !known(&desc.vertex) || !desc.fragment.as_ref().map_or(true, known) {
            return Err(BackendError::PipelineCreationFailed(format!(
                "{:?}: unknown shader module",
                desc.label
            )));
        }
        if desc.fragment.is_none() && desc.color_target.is_some() {
            return Err(BackendError::PipelineCreationFailed(format!(
                "{:?}: colour target without a fragment stage",
                desc.label
            )));
        }
        log::trace!("DummyBackend: creating pipeline {:?}", desc.label);
        let id = self.allocate_id();
        self.pipelines.insert(id, desc.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if !self.in_frame {
            log::warn!("DummyBackend: render pass {:?} begun outside a frame", desc.label);
        }
        self.passes.push(RecordedPass {
            label: desc.label.clone(),
            color_attachments: desc.color_attachment.is_some() as usize,
            depth_view: desc.depth_stencil_attachment.view,
            stencil_clear_value: desc.depth_stencil_attachment.stencil_clear_value,
        });
        self.current = Some(PassState::default());
    }

    fn end_render_pass(&mut self) {
        self.current = None;
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if let Some(state) = self.current.as_mut() {
            state.pipeline = Some(pipeline);
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        if let Some(state) = self.current.as_mut() {
            if let Some(slot) = state.bind_groups.get_mut(index as usize) {
                *slot = Some(bind_group);
            }
        }
    }

    fn set_vertex_buffer(&mut self, _slot: u32, _buffer: BufferHandle, _offset: u64) {}

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        if let Some(state) = self.current.as_mut() {
            state.index_buffer = Some((buffer, offset, format));
        }
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, _width: f32, _height: f32) {}

    fn set_stencil_reference(&mut self, reference: u32) {
        if let Some(state) = self.current.as_mut() {
            state.stencil_reference = reference;
        }
    }

    fn draw_indexed(&mut self, indices: Range<u32>) {
        let Some(state) = self.current.as_ref() else {
            log::warn!("DummyBackend: draw outside a render pass");
            return;
        };
        let pass_index = self.passes.len().saturating_sub(1);
        let draw = RecordedDraw {
            pass_index,
            pass_label: self.passes.last().and_then(|p| p.label.clone()),
            pipeline: state.pipeline,
            pipeline_label: state
                .pipeline
                .and_then(|p| self.pipelines.get(&p.0))
                .and_then(|d| d.label.clone()),
            index_buffer: state.index_buffer.map(|(b, _, _)| b),
            index_format: state.index_buffer.map(|(_, _, f)| f),
            index_byte_offset: state.index_buffer.map(|(_, o, _)| o).unwrap_or(0),
            indices,
            stencil_reference: state.stencil_reference,
            bind_groups: state.bind_groups,
        };
        self.draws.push(draw);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.texture_views.remove(&view.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_desc(size: u64) -> BufferDescriptor {
        BufferDescriptor {
            label: Some("test".into()),
            size,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        }
    }

    #[test]
    fn test_buffer_limit() {
        let mut backend = DummyBackend::new().with_buffer_limit(1);
        let first = backend.create_buffer(&uniform_desc(16));
        assert!(first.is_ok());
        assert!(backend.create_buffer(&uniform_desc(16)).is_err());

        backend.destroy_buffer(first.unwrap());
        assert!(backend.create_buffer(&uniform_desc(16)).is_ok());
    }

    fn pass(backend: &mut DummyBackend, label: &str) -> RenderPassDescriptor {
        let texture = backend
            .create_texture(&TextureDescriptor {
                format: TextureFormat::Depth32Float,
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            })
            .unwrap();
        RenderPassDescriptor {
            label: Some(label.into()),
            color_attachment: None,
            depth_stencil_attachment: DepthStencilAttachment {
                view: backend.create_texture_view(texture).unwrap(),
                depth_clear_value: 1.0,
                stencil_clear_value: None,
            },
        }
    }

    #[test]
    fn test_draw_records_bound_state() {
        let mut backend = DummyBackend::new();
        let index = backend.create_buffer(&uniform_desc(64)).unwrap();
        let desc = pass(&mut backend, "main");

        backend.begin_frame();
        backend.begin_render_pass(&desc);
        backend.set_index_buffer(index, 12, IndexFormat::Uint16);
        backend.set_stencil_reference(1);
        backend.draw_indexed(0..3);
        backend.end_render_pass();
        backend.end_frame().unwrap();

        let draws = backend.draw_calls();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].index_byte_offset, 12);
        assert_eq!(draws[0].stencil_reference, 1);
        assert_eq!(draws[0].pass_label.as_deref(), Some("main"));
        assert_eq!(backend.passes()[0].color_attachments, 0);
        assert_eq!(backend.frame_count(), 1);
    }

    #[test]
    fn test_writes_land_in_buffer_data() {
        let mut backend = DummyBackend::new();
        let buffer = backend.create_buffer(&uniform_desc(8)).unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(backend.buffer_data(buffer), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));

        // Overflowing writes are dropped
        backend.write_buffer(buffer, 6, &[9, 9, 9, 9]);
        assert_eq!(backend.buffer_data(buffer).unwrap()[6], 3);
        assert_eq!(backend.buffer_write_count(), 1);
    }

    #[test]
    fn test_end_frame_with_open_pass_fails() {
        let mut backend = DummyBackend::new();
        let desc = pass(&mut backend, "shadow");
        backend.begin_frame();
        backend.begin_render_pass(&desc);
        assert!(backend.end_frame().is_err());
    }
}
