//! Per-model bindings and the four draw passes

use glam::Mat4;

use super::render_state::{RenderState, GROUND_SHADOW_STENCIL_REF};
use super::uniforms::{
    EdgeUniforms, GroundShadowUniforms, MaterialUniforms, ModelUniforms, ShadowCasterUniforms,
};
use crate::backend::*;
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::resources::{GpuMaterial, GpuMeshResource, SubMesh, TextureId};
use crate::scene::DirectionalLight;
use crate::shader::{
    ShaderDefines, ShaderFamily, ShaderVariant, VariantIndex, NORMAL_INPUT, POSITION_INPUT,
    UV_INPUT,
};
use crate::shadow::{ground_shadow_matrix, ShadowMapProvider, MAX_SHADOW_CASCADES};

/// Camera-side inputs of one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameView {
    pub view: Mat4,
    pub projection: Mat4,
    pub light: DirectionalLight,
    /// Framebuffer size in pixels
    pub width: u32,
    pub height: u32,
}

/// Vertex buffers and per-submesh resources of one (submesh, family) pair.
///
/// Built once by [`ModelDrawer::create`] and reused every frame.
#[derive(Debug, Clone)]
pub struct MaterialBinding {
    pub family: ShaderFamily,
    /// Bound to vertex slots `0..n` in [`ShaderFamily::required_inputs`] order
    pub vertex_buffers: Vec<BufferHandle>,
    /// Group 1 of families with per-material uniforms
    pub bind_group: Option<BindGroupHandle>,
    uniform_buffer: Option<BufferHandle>,
}

#[derive(Debug, Clone)]
struct SubMeshBindings {
    opaque: MaterialBinding,
    edge: MaterialBinding,
    ground_shadow: MaterialBinding,
    shadow_caster: MaterialBinding,
}

impl SubMeshBindings {
    fn get(&self, family: ShaderFamily) -> &MaterialBinding {
        match family {
            ShaderFamily::Opaque => &self.opaque,
            ShaderFamily::Edge => &self.edge,
            ShaderFamily::GroundShadow => &self.ground_shadow,
            ShaderFamily::ShadowCaster => &self.shadow_caster,
        }
    }
}

/// Buffers and bind groups created during setup, released together on failure
#[derive(Default)]
struct Allocations {
    buffers: Vec<BufferHandle>,
    bind_groups: Vec<BindGroupHandle>,
}

impl Allocations {
    fn uniform_buffer<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        label: &str,
        size: usize,
    ) -> RenderResult<BufferHandle> {
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some(label.to_string()),
            size: size as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        self.buffers.push(buffer);
        Ok(buffer)
    }

    /// Bind group for `group` of `variant`, resolving each resource by name
    fn bind_group<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        variant: &ShaderVariant,
        group: u32,
        resources: &[(&str, BindGroupEntry)],
    ) -> RenderResult<BindGroupHandle> {
        let layout = variant.layout(group).ok_or_else(|| RenderError::MissingShaderInput {
            family: variant.family,
            name: format!("@group({group})"),
        })?;

        let mut entries = Vec::with_capacity(resources.len());
        for (name, entry) in resources {
            let slot = variant.require_slot(name)?;
            if slot.group != group {
                return Err(RenderError::MissingShaderInput {
                    family: variant.family,
                    name: format!("{name} in @group({group})"),
                });
            }
            entries.push((slot.binding, entry.clone()));
        }

        let bind_group = backend.create_bind_group(layout, &entries)?;
        self.bind_groups.push(bind_group);
        Ok(bind_group)
    }

    /// Destroy one bind group created earlier
    fn drop_bind_group<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, bind_group: BindGroupHandle) {
        self.bind_groups.retain(|&g| g != bind_group);
        backend.destroy_bind_group(bind_group);
    }

    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for bind_group in self.bind_groups {
            backend.destroy_bind_group(bind_group);
        }
        for buffer in self.buffers {
            backend.destroy_buffer(buffer);
        }
    }
}

/// Cascade views bound to `shadow_map0..3`, the dummy depth view where
/// `shadows` has no cascade
fn cascade_views(
    shadows: Option<&dyn ShadowMapProvider>,
    dummy: TextureViewHandle,
) -> [TextureViewHandle; MAX_SHADOW_CASCADES] {
    std::array::from_fn(|i| {
        shadows
            .and_then(|s| s.cascade(i))
            .map_or(dummy, |c| c.depth_view)
    })
}

fn opaque_model_entries(
    model_buffer: BufferHandle,
    views: &[TextureViewHandle; MAX_SHADOW_CASCADES],
    sampler: SamplerHandle,
) -> [(&'static str, BindGroupEntry); 6] {
    [
        ("model", uniform(model_buffer)),
        ("shadow_map0", BindGroupEntry::Texture(views[0])),
        ("shadow_map1", BindGroupEntry::Texture(views[1])),
        ("shadow_map2", BindGroupEntry::Texture(views[2])),
        ("shadow_map3", BindGroupEntry::Texture(views[3])),
        ("shadow_sampler", BindGroupEntry::Sampler(sampler)),
    ]
}

fn uniform(buffer: BufferHandle) -> BindGroupEntry {
    BindGroupEntry::Buffer {
        buffer,
        offset: 0,
        size: None,
    }
}

/// Issues the shadow-caster, colour, edge and ground-shadow draws of one
/// [`GpuMeshResource`].
pub struct ModelDrawer {
    opaque_variant: VariantIndex,
    edge_variant: VariantIndex,
    ground_shadow_variant: VariantIndex,
    shadow_caster_variant: VariantIndex,

    model_buffer: BufferHandle,
    opaque_model_group: BindGroupHandle,
    /// Depth views baked into `opaque_model_group`
    shadow_views: [TextureViewHandle; MAX_SHADOW_CASCADES],
    edge_model_group: BindGroupHandle,
    ground_shadow_buffer: BufferHandle,
    ground_shadow_group: BindGroupHandle,
    caster_buffers: Vec<BufferHandle>,
    caster_groups: Vec<BindGroupHandle>,

    bindings: Vec<SubMeshBindings>,
    allocations: Allocations,
}

impl ModelDrawer {
    /// Compile the four variants and build every binding for `mesh`.
    ///
    /// `shadows` supplies the cascade depth textures sampled by the colour
    /// pass; slots it does not fill get the dummy depth texture. A provider
    /// handed to a later frame only drives receiver shadows for the cascades
    /// bound here, until [`rebind_shadows`](Self::rebind_shadows) is called.
    pub fn create<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        mesh: &GpuMeshResource,
        shadows: Option<&dyn ShadowMapProvider>,
    ) -> RenderResult<Self> {
        let opaque_defines = ctx.opaque_defines();
        let none = ShaderDefines::new();
        let opaque_variant = ctx
            .shaders
            .variant_index(&mut ctx.backend, ShaderFamily::Opaque, &opaque_defines)?;
        let edge_variant = ctx
            .shaders
            .variant_index(&mut ctx.backend, ShaderFamily::Edge, &none)?;
        let ground_shadow_variant =
            ctx.shaders
                .variant_index(&mut ctx.backend, ShaderFamily::GroundShadow, &none)?;
        let shadow_caster_variant =
            ctx.shaders
                .variant_index(&mut ctx.backend, ShaderFamily::ShadowCaster, &none)?;

        let mut allocations = Allocations::default();
        let result = Self::build(
            ctx,
            mesh,
            shadows,
            [opaque_variant, edge_variant, ground_shadow_variant, shadow_caster_variant],
            &mut allocations,
        );
        match result {
            Ok(mut drawer) => {
                drawer.allocations = allocations;
                log::debug!(
                    "Model drawer ready: {} submeshes, {} bind groups",
                    drawer.bindings.len(),
                    drawer.allocations.bind_groups.len()
                );
                Ok(drawer)
            }
            Err(e) => {
                log::error!("Failed to set up model drawer: {}", e);
                allocations.release(&mut ctx.backend);
                Err(e)
            }
        }
    }

    fn build<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        mesh: &GpuMeshResource,
        shadows: Option<&dyn ShadowMapProvider>,
        variants: [VariantIndex; 4],
        alloc: &mut Allocations,
    ) -> RenderResult<Self> {
        let [opaque_variant, edge_variant, ground_shadow_variant, shadow_caster_variant] = variants;
        let variant = |index: VariantIndex| {
            ctx.shaders
                .variant(index)
                .ok_or(RenderError::InvalidVariant(index.index()))
        };
        let opaque = variant(opaque_variant)?;
        let edge = variant(edge_variant)?;
        let ground = variant(ground_shadow_variant)?;
        let caster = variant(shadow_caster_variant)?;
        let backend = &mut ctx.backend;
        let defaults = &ctx.defaults;
        let textures = &ctx.textures;

        // Per-model groups
        let model_buffer =
            alloc.uniform_buffer(backend, "Model Uniforms", std::mem::size_of::<ModelUniforms>())?;

        let shadow_views = cascade_views(shadows, defaults.dummy_depth_view);
        let opaque_model_group = alloc.bind_group(
            backend,
            opaque,
            0,
            &opaque_model_entries(model_buffer, &shadow_views, defaults.shadow_sampler),
        )?;
        let edge_model_group = alloc.bind_group(backend, edge, 0, &[("model", uniform(model_buffer))])?;

        let ground_shadow_buffer = alloc.uniform_buffer(
            backend,
            "Ground Shadow Uniforms",
            std::mem::size_of::<GroundShadowUniforms>(),
        )?;
        let ground_shadow_group =
            alloc.bind_group(backend, ground, 0, &[("ground", uniform(ground_shadow_buffer))])?;

        // One caster block per cascade; all are written before the frame is submitted
        let mut caster_buffers = Vec::with_capacity(MAX_SHADOW_CASCADES);
        let mut caster_groups = Vec::with_capacity(MAX_SHADOW_CASCADES);
        for i in 0..MAX_SHADOW_CASCADES {
            let buffer = alloc.uniform_buffer(
                backend,
                &format!("Shadow Caster Uniforms {i}"),
                std::mem::size_of::<ShadowCasterUniforms>(),
            )?;
            caster_groups.push(alloc.bind_group(backend, caster, 0, &[("caster", uniform(buffer))])?);
            caster_buffers.push(buffer);
        }

        let view_of = |id: Option<TextureId>| {
            id.and_then(|id| textures.get(id))
                .map_or(defaults.white_view, |t| t.view)
        };

        let mut bindings = Vec::with_capacity(mesh.sub_meshes().len());
        for (index, sub_mesh) in mesh.sub_meshes().iter().enumerate() {
            let material = mesh.materials().get(sub_mesh.material).ok_or(RenderError::InvalidMaterialIndex {
                index,
                material: sub_mesh.material,
                material_count: mesh.materials().len(),
            })?;

            let material_buffer = alloc.uniform_buffer(
                backend,
                &format!("Material Uniforms {index}"),
                std::mem::size_of::<MaterialUniforms>(),
            )?;
            let material_group = alloc.bind_group(
                backend,
                opaque,
                1,
                &[
                    ("material", uniform(material_buffer)),
                    ("base_texture", BindGroupEntry::Texture(view_of(material.texture))),
                    ("base_sampler", BindGroupEntry::Sampler(defaults.base_sampler)),
                    ("sphere_texture", BindGroupEntry::Texture(view_of(material.sphere_texture))),
                    ("sphere_sampler", BindGroupEntry::Sampler(defaults.sphere_sampler)),
                    ("toon_texture", BindGroupEntry::Texture(view_of(material.toon_texture))),
                    ("toon_sampler", BindGroupEntry::Sampler(defaults.toon_sampler)),
                ],
            )?;

            let edge_buffer = alloc.uniform_buffer(
                backend,
                &format!("Edge Uniforms {index}"),
                std::mem::size_of::<EdgeUniforms>(),
            )?;
            let edge_group = alloc.bind_group(backend, edge, 1, &[("edge", uniform(edge_buffer))])?;

            bindings.push(SubMeshBindings {
                opaque: MaterialBinding {
                    family: ShaderFamily::Opaque,
                    vertex_buffers: vertex_buffers(mesh, ShaderFamily::Opaque),
                    bind_group: Some(material_group),
                    uniform_buffer: Some(material_buffer),
                },
                edge: MaterialBinding {
                    family: ShaderFamily::Edge,
                    vertex_buffers: vertex_buffers(mesh, ShaderFamily::Edge),
                    bind_group: Some(edge_group),
                    uniform_buffer: Some(edge_buffer),
                },
                ground_shadow: MaterialBinding {
                    family: ShaderFamily::GroundShadow,
                    vertex_buffers: vertex_buffers(mesh, ShaderFamily::GroundShadow),
                    bind_group: None,
                    uniform_buffer: None,
                },
                shadow_caster: MaterialBinding {
                    family: ShaderFamily::ShadowCaster,
                    vertex_buffers: vertex_buffers(mesh, ShaderFamily::ShadowCaster),
                    bind_group: None,
                    uniform_buffer: None,
                },
            });
        }

        Ok(Self {
            opaque_variant,
            edge_variant,
            ground_shadow_variant,
            shadow_caster_variant,
            model_buffer,
            opaque_model_group,
            shadow_views,
            edge_model_group,
            ground_shadow_buffer,
            ground_shadow_group,
            caster_buffers,
            caster_groups,
            bindings,
            allocations: Allocations::default(),
        })
    }

    /// Binding of `sub_mesh` for `family`
    pub fn binding(&self, sub_mesh: usize, family: ShaderFamily) -> Option<&MaterialBinding> {
        self.bindings.get(sub_mesh).map(|b| b.get(family))
    }

    pub fn variant(&self, family: ShaderFamily) -> VariantIndex {
        match family {
            ShaderFamily::Opaque => self.opaque_variant,
            ShaderFamily::Edge => self.edge_variant,
            ShaderFamily::GroundShadow => self.ground_shadow_variant,
            ShaderFamily::ShadowCaster => self.shadow_caster_variant,
        }
    }

    /// Point the colour pass at the cascades `shadows` holds now.
    ///
    /// Needed after the provider's depth textures were recreated, or for a
    /// model created before any provider existed. Does nothing when the
    /// bound views already match.
    pub fn rebind_shadows<B: GraphicsBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        shadows: Option<&dyn ShadowMapProvider>,
    ) -> RenderResult<()> {
        let views = cascade_views(shadows, ctx.defaults.dummy_depth_view);
        if views == self.shadow_views {
            return Ok(());
        }
        let opaque = ctx
            .shaders
            .variant(self.opaque_variant)
            .ok_or(RenderError::InvalidVariant(self.opaque_variant.index()))?;
        let group = self.allocations.bind_group(
            &mut ctx.backend,
            opaque,
            0,
            &opaque_model_entries(self.model_buffer, &views, ctx.defaults.shadow_sampler),
        )?;
        let previous = std::mem::replace(&mut self.opaque_model_group, group);
        self.allocations.drop_bind_group(&mut ctx.backend, previous);
        self.shadow_views = views;
        log::debug!("Rebound shadow cascades of model drawer");
        Ok(())
    }

    /// Cascade depth views the colour pass currently samples
    pub fn shadow_views(&self) -> &[TextureViewHandle; MAX_SHADOW_CASCADES] {
        &self.shadow_views
    }

    /// Uniform buffer holding this model's [`ModelUniforms`]
    pub fn model_buffer(&self) -> BufferHandle {
        self.model_buffer
    }

    /// Cascades of `shadows` the colour pass can sample: the leading run
    /// whose depth view is the one bound at setup.
    fn bound_cascades(&self, shadows: &dyn ShadowMapProvider) -> usize {
        let count = shadows.cascade_count().min(MAX_SHADOW_CASCADES);
        (0..count)
            .take_while(|&i| shadows.cascade(i).is_some_and(|c| c.depth_view == self.shadow_views[i]))
            .count()
    }

    /// Write this frame's uniforms. Must run before any pass of the frame.
    pub fn prepare<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        mesh: &GpuMeshResource,
        world: Mat4,
        frame: &FrameView,
        shadows: Option<&dyn ShadowMapProvider>,
    ) {
        let backend = &mut ctx.backend;

        let mut model = ModelUniforms::new(world, frame.view, frame.projection);
        model.light_direction = frame.light.view_direction(&frame.view).extend(0.0);
        model.light_color = frame.light.color.extend(1.0);
        model.screen_size = glam::Vec4::new(frame.width as f32, frame.height as f32, 0.0, 0.0);

        if let Some(shadows) = shadows {
            let count = shadows.cascade_count().min(MAX_SHADOW_CASCADES);
            let bound = self.bound_cascades(shadows);
            if bound < count {
                log::debug!(
                    "Only {} of {} shadow cascades are bound for sampling, call rebind_shadows",
                    bound,
                    count
                );
            }

            // Casters render into every cascade regardless of what this model samples
            for i in 0..count {
                if let Some(cascade) = shadows.cascade(i) {
                    backend.write_buffer(
                        self.caster_buffers[i],
                        0,
                        bytemuck::bytes_of(&ShadowCasterUniforms {
                            world_view_projection: cascade.view_projection * world,
                        }),
                    );
                }
            }

            let splits = shadows.split_positions();
            for i in 0..bound {
                if let Some(cascade) = shadows.cascade(i) {
                    model.shadow_matrices[i] = cascade.bias_view_projection * world;
                }
                model.split_positions[i] = splits.get(i + 1).copied().unwrap_or(f32::MAX);
            }
            let enabled = shadows.enabled() && bound > 0;
            model.shadow_params = glam::Vec4::new(
                if enabled { 1.0 } else { 0.0 },
                shadows.depth_bias(),
                bound as f32,
                0.0,
            );
        }
        backend.write_buffer(self.model_buffer, 0, bytemuck::bytes_of(&model));

        let ground = &ctx.config.ground_shadow;
        let shadow = ground_shadow_matrix(ground.plane, -frame.light.direction);
        let ground_uniforms = GroundShadowUniforms {
            world_shadow_view_projection: frame.projection * frame.view * shadow * world,
            shadow_color: ground.color,
        };
        backend.write_buffer(self.ground_shadow_buffer, 0, bytemuck::bytes_of(&ground_uniforms));

        for (bindings, sub_mesh) in self.bindings.iter().zip(mesh.sub_meshes()) {
            let Some(material) = mesh.materials().get(sub_mesh.material) else {
                continue;
            };
            if let Some(buffer) = bindings.opaque.uniform_buffer {
                backend.write_buffer(buffer, 0, bytemuck::bytes_of(&MaterialUniforms::from_material(material)));
            }
            if let Some(buffer) = bindings.edge.uniform_buffer {
                backend.write_buffer(buffer, 0, bytemuck::bytes_of(&EdgeUniforms::from_material(material)));
            }
        }
    }

    /// Depth-only draw of every caster submesh into `cascade`
    pub fn draw_shadow_caster<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        mesh: &GpuMeshResource,
        cascade: usize,
    ) -> RenderResult<()> {
        let Some(&group) = self.caster_groups.get(cascade) else {
            log::warn!("No shadow caster binding for cascade {}", cascade);
            return Ok(());
        };
        let targets = ctx.shadow_targets();

        for (sub_mesh, material, bindings) in self.visible(mesh) {
            if !material.shadow_caster {
                continue;
            }
            let state = RenderState::shadow_caster(material.both_face);
            let pipeline = ctx.pipelines.get_or_create(
                &mut ctx.backend,
                &ctx.shaders,
                self.shadow_caster_variant,
                &state,
                targets,
            )?;
            ctx.state.set_pipeline(&mut ctx.backend, pipeline);
            ctx.state.set_bind_group(&mut ctx.backend, 0, group);
            bind_geometry(&mut ctx.backend, mesh, sub_mesh, &bindings.shadow_caster);
            ctx.state.draw_indexed(&mut ctx.backend, sub_mesh.index_count);
        }
        Ok(())
    }

    /// Lit, textured, alpha-blended draw of every visible submesh
    pub fn draw_color<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        mesh: &GpuMeshResource,
    ) -> RenderResult<()> {
        let targets = ctx.main_targets();

        for (sub_mesh, material, bindings) in self.visible(mesh) {
            let Some(material_group) = bindings.opaque.bind_group else {
                continue;
            };
            let state = RenderState::color(material.both_face);
            let pipeline = ctx.pipelines.get_or_create(
                &mut ctx.backend,
                &ctx.shaders,
                self.opaque_variant,
                &state,
                targets,
            )?;
            ctx.state.set_pipeline(&mut ctx.backend, pipeline);
            ctx.state.set_bind_group(&mut ctx.backend, 0, self.opaque_model_group);
            ctx.state.set_bind_group(&mut ctx.backend, 1, material_group);
            bind_geometry(&mut ctx.backend, mesh, sub_mesh, &bindings.opaque);
            ctx.state.draw_indexed(&mut ctx.backend, sub_mesh.index_count);

            // Textures belong to this submesh only
            ctx.state.unbind(1);
        }
        Ok(())
    }

    /// Outline shell of every visible submesh with its edge flag set
    pub fn draw_edge<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        mesh: &GpuMeshResource,
    ) -> RenderResult<()> {
        if !mesh.edge_enabled {
            return Ok(());
        }
        let targets = ctx.main_targets();
        let state = RenderState::edge();

        for (sub_mesh, material, bindings) in self.visible(mesh) {
            if !material.edge_flag {
                continue;
            }
            let Some(edge_group) = bindings.edge.bind_group else {
                continue;
            };
            let pipeline = ctx.pipelines.get_or_create(
                &mut ctx.backend,
                &ctx.shaders,
                self.edge_variant,
                &state,
                targets,
            )?;
            ctx.state.set_pipeline(&mut ctx.backend, pipeline);
            ctx.state.set_bind_group(&mut ctx.backend, 0, self.edge_model_group);
            ctx.state.set_bind_group(&mut ctx.backend, 1, edge_group);
            bind_geometry(&mut ctx.backend, mesh, sub_mesh, &bindings.edge);
            ctx.state.draw_indexed(&mut ctx.backend, sub_mesh.index_count);
        }
        Ok(())
    }

    /// Planar shadow of every visible submesh that casts a ground shadow
    pub fn draw_ground_shadow<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        mesh: &GpuMeshResource,
    ) -> RenderResult<()> {
        if !ctx.config.ground_shadow.enabled || !mesh.ground_shadow_enabled {
            return Ok(());
        }
        let targets = ctx.main_targets();
        let stencil_guard = ctx.config.ground_shadow.uses_stencil();
        let state = RenderState::ground_shadow(stencil_guard);

        for (sub_mesh, material, bindings) in self.visible(mesh) {
            if !material.ground_shadow {
                continue;
            }
            let pipeline = ctx.pipelines.get_or_create(
                &mut ctx.backend,
                &ctx.shaders,
                self.ground_shadow_variant,
                &state,
                targets,
            )?;
            ctx.state.set_pipeline(&mut ctx.backend, pipeline);
            if stencil_guard {
                ctx.state
                    .set_stencil_reference(&mut ctx.backend, GROUND_SHADOW_STENCIL_REF);
            }
            ctx.state.set_bind_group(&mut ctx.backend, 0, self.ground_shadow_group);
            bind_geometry(&mut ctx.backend, mesh, sub_mesh, &bindings.ground_shadow);
            ctx.state.draw_indexed(&mut ctx.backend, sub_mesh.index_count);
        }
        Ok(())
    }

    /// Submeshes whose material is not fully transparent
    fn visible<'a>(
        &'a self,
        mesh: &'a GpuMeshResource,
    ) -> impl Iterator<Item = (&'a SubMesh, &'a GpuMaterial, &'a SubMeshBindings)> + 'a {
        mesh.sub_meshes()
            .iter()
            .zip(&self.bindings)
            .filter_map(|(sub_mesh, bindings)| {
                let material = mesh.materials().get(sub_mesh.material)?;
                material.is_visible().then_some((sub_mesh, material, bindings))
            })
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        self.allocations.release(backend);
    }
}

fn vertex_buffers(mesh: &GpuMeshResource, family: ShaderFamily) -> Vec<BufferHandle> {
    family
        .required_inputs()
        .iter()
        .filter_map(|&input| match input {
            POSITION_INPUT => Some(mesh.position_buffer()),
            NORMAL_INPUT => Some(mesh.normal_buffer()),
            UV_INPUT => Some(mesh.uv_buffer()),
            _ => None,
        })
        .collect()
}

fn bind_geometry<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    mesh: &GpuMeshResource,
    sub_mesh: &SubMesh,
    binding: &MaterialBinding,
) {
    for (slot, &buffer) in binding.vertex_buffers.iter().enumerate() {
        backend.set_vertex_buffer(slot as u32, buffer, 0);
    }
    backend.set_index_buffer(mesh.index_buffer(), mesh.index_byte_offset(sub_mesh), mesh.index_format());
}
