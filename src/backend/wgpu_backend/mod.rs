//! wgpu implementation of [`GraphicsBackend`]
//!
//! Pass commands are buffered between `begin_render_pass` and
//! `end_render_pass`, then replayed into a real `wgpu::RenderPass` so that
//! handles can be resolved against the resource tables in one place.

mod convert;

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::ops::Range;
use wgpu::util::DeviceExt;

#[derive(Clone)]
enum PassCommand {
    Pipeline(RenderPipelineHandle),
    BindGroup(u32, BindGroupHandle),
    VertexBuffer(u32, BufferHandle, u64),
    IndexBuffer(BufferHandle, u64, IndexFormat),
    Viewport([f32; 4]),
    StencilReference(u32),
    Draw(Range<u32>),
}

struct OpenPass {
    descriptor: RenderPassDescriptor,
    commands: Vec<PassCommand>,
}

/// Resources owned by the backend, addressed by handle id
#[derive(Default)]
struct Resources {
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, wgpu::Texture>,
    views: HashMap<u64, wgpu::TextureView>,
    samplers: HashMap<u64, wgpu::Sampler>,
    shaders: HashMap<u64, wgpu::ShaderModule>,
    layouts: HashMap<u64, wgpu::BindGroupLayout>,
    bind_groups: HashMap<u64, wgpu::BindGroup>,
    pipelines: HashMap<u64, wgpu::RenderPipeline>,
    next_id: u64,
}

impl Resources {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Renders the toon passes with wgpu.
///
/// Targets are textures owned by the backend. Applications that already
/// own a device, for example next to a window surface, use
/// [`WgpuBackend::from_device`] and read the colour target back through
/// [`WgpuBackend::texture_view`].
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    resources: Resources,
    encoder: Option<wgpu::CommandEncoder>,
    open_pass: Option<OpenPass>,
}

impl WgpuBackend {
    /// Wrap an existing device and queue.
    ///
    /// Validation errors raised outside an error scope are logged rather
    /// than aborting the process.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        device.on_uncaptured_error(Box::new(|error| {
            log::error!("wgpu validation error: {error}");
        }));
        Self {
            device,
            queue,
            resources: Resources::default(),
            encoder: None,
            open_pass: None,
        }
    }

    /// Create a backend without a presentation surface
    pub fn new_headless() -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async())
    }

    pub async fn new_headless_async() -> BackendResult<Self> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::all());
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let info = adapter.get_info();
        log::info!("Selected GPU: {} ({:?} backend)", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Toon Renderer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok(Self::from_device(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Look up the wgpu view behind a handle, for compositing with external passes
    pub fn texture_view(&self, view: TextureViewHandle) -> Option<&wgpu::TextureView> {
        self.resources.views.get(&view.0)
    }

    fn record(&mut self, command: PassCommand) {
        match self.open_pass.as_mut() {
            Some(pass) => pass.commands.push(command),
            None => log::warn!("pass command recorded outside of a render pass"),
        }
    }

    fn replay(&self, encoder: &mut wgpu::CommandEncoder, pass: &OpenPass) {
        let res = &self.resources;
        let desc = &pass.descriptor;

        let color = desc.color_attachment.as_ref().and_then(|att| {
            Some(wgpu::RenderPassColorAttachment {
                view: res.views.get(&att.view.0)?,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(convert::clear_color(att.clear_color)),
                    store: wgpu::StoreOp::Store,
                },
            })
        });
        let color_attachments = [color];

        let depth = &desc.depth_stencil_attachment;
        let Some(depth_view) = res.views.get(&depth.view.0) else {
            log::warn!("{:?}: unknown depth view, pass skipped", desc.label);
            return;
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: desc.label.as_deref(),
            color_attachments: if desc.color_attachment.is_some() {
                &color_attachments
            } else {
                &[]
            },
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(depth.depth_clear_value),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: depth.stencil_clear_value.map(|value| wgpu::Operations {
                    load: wgpu::LoadOp::Clear(value),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for command in &pass.commands {
            match command {
                PassCommand::Pipeline(handle) => {
                    if let Some(pipeline) = res.pipelines.get(&handle.0) {
                        render_pass.set_pipeline(pipeline);
                    }
                }
                PassCommand::BindGroup(index, handle) => {
                    if let Some(group) = res.bind_groups.get(&handle.0) {
                        render_pass.set_bind_group(*index, group, &[]);
                    }
                }
                PassCommand::VertexBuffer(slot, handle, offset) => {
                    if let Some(buffer) = res.buffers.get(&handle.0) {
                        render_pass.set_vertex_buffer(*slot, buffer.slice(*offset..));
                    }
                }
                PassCommand::IndexBuffer(handle, offset, format) => {
                    if let Some(buffer) = res.buffers.get(&handle.0) {
                        render_pass.set_index_buffer(buffer.slice(*offset..), (*format).into());
                    }
                }
                PassCommand::Viewport([x, y, w, h]) => {
                    render_pass.set_viewport(*x, *y, *w, *h, 0.0, 1.0);
                }
                PassCommand::StencilReference(reference) => {
                    render_pass.set_stencil_reference(*reference);
                }
                PassCommand::Draw(indices) => {
                    render_pass.draw_indexed(indices.clone(), 0, 0..1);
                }
            }
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn begin_frame(&mut self) {
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Toon Frame"),
                }),
        );
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if self.open_pass.is_some() {
            return Err(BackendError::SubmitFailed(
                "frame ended with an open render pass".into(),
            ));
        }
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        if desc.size > self.device.limits().max_buffer_size {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?}: {} bytes exceeds device limit",
                desc.label, desc.size
            )));
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: desc.usage.into(),
            mapped_at_creation: false,
        });
        let id = self.resources.next();
        self.resources.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        if data.len() as u64 > self.device.limits().max_buffer_size {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?}: {} bytes exceeds device limit",
                desc.label,
                data.len()
            )));
        }
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: data,
            usage: desc.usage.into(),
        });
        let id = self.resources.next();
        self.resources.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        match self.resources.buffers.get(&buffer.0) {
            Some(buf) => self.queue.write_buffer(buf, offset, data),
            None => log::warn!("write_buffer: unknown buffer {:?}", buffer),
        }
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.resources.buffers.get(&buffer.0).map(|b| b.size())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let max_size = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max_size || desc.height > max_size {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: invalid size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.into(),
            usage: desc.usage.into(),
            view_formats: &[],
        });
        let id = self.resources.next();
        self.resources.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        let view = self
            .resources
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::TextureCreationFailed("Texture not found".into()))?
            .create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.resources.next();
        self.resources.views.insert(id, view);
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
        let Some(tex) = self.resources.textures.get(&texture.0) else {
            log::warn!("write_texture: unknown texture {:?}", texture);
            return;
        };
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: tex,
                mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: desc.address_mode_u.into(),
            address_mode_v: desc.address_mode_v.into(),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: desc.mag_filter.into(),
            min_filter: desc.min_filter.into(),
            mipmap_filter: desc.mipmap_filter.into(),
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: desc.compare.map(Into::into),
            anisotropy_clamp: 1,
            border_color: None,
        });
        let id = self.resources.next();
        self.resources.samplers.insert(id, sampler);
        Ok(SamplerHandle(id))
    }

    fn create_shader_module(
        &mut self,
        label: &str,
        wgsl: &str,
    ) -> BackendResult<ShaderModuleHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ShaderCreationFailed(format!("{label}: {error}")));
        }
        let id = self.resources.next();
        self.resources.shaders.insert(id, module);
        Ok(ShaderModuleHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = entries
            .iter()
            .map(|e| wgpu::BindGroupLayoutEntry {
                binding: e.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: e.ty.into(),
                count: None,
            })
            .collect();
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: None,
                entries: &entries,
            });
        let id = self.resources.next();
        self.resources.layouts.insert(id, layout);
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let res = &self.resources;
        let layout = res
            .layouts
            .get(&layout.0)
            .ok_or_else(|| BackendError::BindGroupCreationFailed("Layout not found".into()))?;

        let missing =
            |binding: &u32, what: &str| BackendError::BindGroupCreationFailed(format!("binding {binding}: unknown {what}"));

        let mut wgpu_entries = Vec::with_capacity(entries.len());
        for (binding, entry) in entries {
            let resource = match entry {
                BindGroupEntry::Buffer { buffer, offset, size } => {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: res.buffers.get(&buffer.0).ok_or_else(|| missing(binding, "buffer"))?,
                        offset: *offset,
                        size: size.and_then(std::num::NonZeroU64::new),
                    })
                }
                BindGroupEntry::Texture(view) => wgpu::BindingResource::TextureView(
                    res.views.get(&view.0).ok_or_else(|| missing(binding, "view"))?,
                ),
                BindGroupEntry::Sampler(sampler) => wgpu::BindingResource::Sampler(
                    res.samplers.get(&sampler.0).ok_or_else(|| missing(binding, "sampler"))?,
                ),
            };
            wgpu_entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource,
            });
        }

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout,
            entries: &wgpu_entries,
        });
        let id = self.resources.next();
        self.resources.bind_groups.insert(id, group);
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        let res = &self.resources;
        let unknown = |what: &str| {
            BackendError::PipelineCreationFailed(format!("{:?}: unknown {what}", desc.label))
        };

        let vertex = res.shaders.get(&desc.vertex.0).ok_or_else(|| unknown("vertex module"))?;
        let fragment = match desc.fragment {
            Some(handle) => Some(res.shaders.get(&handle.0).ok_or_else(|| unknown("fragment module"))?),
            None => None,
        };
        let layouts = desc
            .bind_group_layouts
            .iter()
            .map(|h| res.layouts.get(&h.0).ok_or_else(|| unknown("bind group layout")))
            .collect::<BackendResult<Vec<_>>>()?;

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        // Every mesh attribute lives in its own buffer with a single attribute
        let attributes: Vec<[wgpu::VertexAttribute; 1]> = desc
            .vertex_layouts
            .iter()
            .map(|layout| {
                [wgpu::VertexAttribute {
                    format: layout.format.into(),
                    offset: 0,
                    shader_location: layout.location,
                }]
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_layouts
            .iter()
            .zip(&attributes)
            .map(|(layout, attrs)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let targets = [desc.color_target.as_ref().map(|target| wgpu::ColorTargetState {
            format: target.format.into(),
            blend: target.blend.map(Into::into),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let ds = &desc.depth_stencil;
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label.as_deref(),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: SHADER_ENTRY_POINT,
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: fragment.map(|module| wgpu::FragmentState {
                    module,
                    entry_point: SHADER_ENTRY_POINT,
                    targets: if desc.color_target.is_some() { &targets } else { &[] },
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: desc.cull_mode.into(),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: ds.format.into(),
                    depth_write_enabled: ds.depth_write_enabled,
                    depth_compare: ds.depth_compare.into(),
                    stencil: ds.stencil.into(),
                    bias: wgpu::DepthBiasState {
                        constant: ds.bias.constant,
                        slope_scale: ds.bias.slope_scale as f32,
                        clamp: 0.0,
                    },
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        let id = self.resources.next();
        self.resources.pipelines.insert(id, pipeline);
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.open_pass.is_some() {
            log::warn!("begin_render_pass: previous pass was not ended, dropping its commands");
        }
        self.open_pass = Some(OpenPass {
            descriptor: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        let Some(pass) = self.open_pass.take() else {
            return;
        };
        let Some(mut encoder) = self.encoder.take() else {
            log::warn!("end_render_pass called outside of a frame");
            return;
        };
        self.replay(&mut encoder, &pass);
        self.encoder = Some(encoder);
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record(PassCommand::Pipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.record(PassCommand::BindGroup(index, bind_group));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.record(PassCommand::VertexBuffer(slot, buffer, offset));
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        self.record(PassCommand::IndexBuffer(buffer, offset, format));
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.record(PassCommand::Viewport([x, y, width, height]));
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.record(PassCommand::StencilReference(reference));
    }

    fn draw_indexed(&mut self, indices: Range<u32>) {
        self.record(PassCommand::Draw(indices));
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buf) = self.resources.buffers.remove(&buffer.0) {
            buf.destroy();
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(tex) = self.resources.textures.remove(&texture.0) {
            tex.destroy();
        }
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.resources.views.remove(&view.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.resources.bind_groups.remove(&bind_group.0);
    }
}
