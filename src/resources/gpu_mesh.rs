//! GPU buffers and material mirror for one animated model

use std::time::{Duration, Instant};

use super::material::GpuMaterial;
use super::mesh::{AnimatedModel, IndexWidth, SubMesh};
use super::texture::{TextureCache, TextureId, TextureKey};
use crate::animation::{ANIMATION_FPS, MAX_ELAPSED};
use crate::backend::{BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend, IndexFormat};
use crate::error::{RenderError, RenderResult};

/// Wall-clock cost of the phases of one [`GpuMeshResource::update`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateTimings {
    pub animation: Duration,
    pub physics: Duration,
    pub material: Duration,
    pub upload: Duration,
}

impl UpdateTimings {
    pub fn total(&self) -> Duration {
        self.animation + self.physics + self.material + self.upload
    }
}

/// Vertex and index buffers of an [`AnimatedModel`], plus the GPU-side
/// material table.
///
/// Position, normal and UV each live in their own buffer so that every shader
/// family can bind just the channels it reads.
pub struct GpuMeshResource {
    model: Box<dyn AnimatedModel>,

    position_buffer: BufferHandle,
    normal_buffer: BufferHandle,
    uv_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_width: IndexWidth,
    vertex_count: usize,

    materials: Vec<GpuMaterial>,
    textures: Vec<TextureId>,

    anim_time: f32,
    timings: UpdateTimings,

    pub physics_enabled: bool,
    pub edge_enabled: bool,
    pub ground_shadow_enabled: bool,
}

impl GpuMeshResource {
    /// Upload `model` and resolve its material textures.
    ///
    /// Buffer failures, unsupported index widths and submeshes that reach
    /// outside the index or material tables are fatal. A texture that fails
    /// to load only leaves its slot unbound.
    pub fn create<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        textures: &mut TextureCache,
        model: Box<dyn AnimatedModel>,
    ) -> RenderResult<Self> {
        let index_width = IndexWidth::from_size(model.index_element_size()).map_err(|e| {
            log::error!("Unknown index size: {}", model.index_element_size());
            e
        })?;
        validate_sub_meshes(model.as_ref()).map_err(|e| {
            log::error!("Rejected mesh: {}", e);
            e
        })?;

        let vertex_count = model.vertex_count();
        let mut created = Vec::with_capacity(4);
        let buffers = Self::create_buffers(backend, model.as_ref(), index_width, &mut created);
        let [position_buffer, normal_buffer, uv_buffer, index_buffer] = match buffers {
            Ok(buffers) => buffers,
            Err(e) => {
                log::error!("Failed to create mesh buffers: {}", e);
                for buffer in created {
                    backend.destroy_buffer(buffer);
                }
                return Err(e);
            }
        };

        let mut acquired = Vec::new();
        let materials = model
            .materials()
            .iter()
            .map(|material| {
                let mut gpu = GpuMaterial::new(material);

                if let Some(path) = &material.texture {
                    gpu.texture = resolve(backend, textures, TextureKey::color(path), &mut acquired);
                    gpu.texture_has_alpha = gpu
                        .texture
                        .and_then(|id| textures.get(id))
                        .is_some_and(|t| t.has_alpha);
                }
                if let Some(path) = &material.sphere_texture {
                    gpu.sphere_texture =
                        resolve(backend, textures, TextureKey::linear(path), &mut acquired);
                }
                if let Some(path) = &material.toon_texture {
                    gpu.toon_texture =
                        resolve(backend, textures, TextureKey::linear(path), &mut acquired);
                }
                gpu
            })
            .collect();

        log::debug!(
            "Created mesh resource: {} vertices, {} indices ({:?}), {} materials, {} textures",
            vertex_count,
            model.index_count(),
            index_width,
            model.materials().len(),
            acquired.len()
        );

        Ok(Self {
            model,
            position_buffer,
            normal_buffer,
            uv_buffer,
            index_buffer,
            index_width,
            vertex_count,
            materials,
            textures: acquired,
            anim_time: 0.0,
            timings: UpdateTimings::default(),
            physics_enabled: true,
            edge_enabled: true,
            ground_shadow_enabled: true,
        })
    }

    fn create_buffers<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        model: &dyn AnimatedModel,
        index_width: IndexWidth,
        created: &mut Vec<BufferHandle>,
    ) -> RenderResult<[BufferHandle; 4]> {
        let vertex_usage = BufferUsage::VERTEX | BufferUsage::COPY_DST;

        let positions: &[u8] = bytemuck::cast_slice(model.positions());
        let position = backend.create_buffer_init(&desc("Mesh Positions", vertex_usage), positions)?;
        created.push(position);

        let normals: &[u8] = bytemuck::cast_slice(model.normals());
        let normal = backend.create_buffer_init(&desc("Mesh Normals", vertex_usage), normals)?;
        created.push(normal);

        let uvs: &[u8] = bytemuck::cast_slice(model.uvs());
        let uv = backend.create_buffer_init(&desc("Mesh UVs", vertex_usage), uvs)?;
        created.push(uv);

        let index_data = match index_width {
            IndexWidth::U8 => model
                .index_bytes()
                .iter()
                .flat_map(|&i| u16::from(i).to_le_bytes())
                .collect(),
            IndexWidth::U16 | IndexWidth::U32 => model.index_bytes().to_vec(),
        };
        let index = backend.create_buffer_init(
            &desc("Mesh Indices", BufferUsage::INDEX | BufferUsage::COPY_DST),
            &index_data,
        )?;
        created.push(index);

        Ok([position, normal, uv, index])
    }

    /// Advance the model to `anim_time` seconds and upload the new pose.
    ///
    /// `elapsed` must already be clipped to [`MAX_ELAPSED`] by the caller
    /// (see [`PlayController`](crate::animation::PlayController)).
    pub fn update<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        anim_time: f32,
        elapsed: f32,
    ) -> RenderResult<()> {
        debug_assert!(
            elapsed <= MAX_ELAPSED + f32::EPSILON,
            "elapsed time {elapsed} exceeds the {MAX_ELAPSED} cap"
        );

        let start = Instant::now();
        self.model.evaluate_animation(anim_time * ANIMATION_FPS);
        self.anim_time = anim_time;
        self.timings.animation = start.elapsed();

        let start = Instant::now();
        if self.physics_enabled {
            self.model.update_physics(elapsed);
        }
        self.timings.physics = start.elapsed();

        let start = Instant::now();
        self.model.update();
        self.mirror_materials();
        self.timings.material = start.elapsed();

        let start = Instant::now();
        self.upload(backend)?;
        self.timings.upload = start.elapsed();

        log::debug!(
            "Mesh update at {:.3}s: anim {:?}, physics {:?}, material {:?}, upload {:?}",
            anim_time,
            self.timings.animation,
            self.timings.physics,
            self.timings.material,
            self.timings.upload
        );
        Ok(())
    }

    /// Re-run morphs and skinning at the current time without advancing
    /// animation or physics
    pub fn refresh_pose<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> RenderResult<()> {
        self.model.evaluate_morphs(self.anim_time * ANIMATION_FPS);
        self.model.update();
        self.mirror_materials();
        self.upload(backend)
    }

    /// Reset the pose to `anim_time` seconds and re-sync physics
    pub fn reset_animation<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        anim_time: f32,
    ) -> RenderResult<()> {
        self.anim_time = anim_time;
        self.model.reset_animation(anim_time * ANIMATION_FPS);
        self.model.update();
        self.mirror_materials();
        self.upload(backend)
    }

    /// Release the buffers and this resource's texture references
    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &mut B, textures: &mut TextureCache) {
        for buffer in [
            self.position_buffer,
            self.normal_buffer,
            self.uv_buffer,
            self.index_buffer,
        ] {
            backend.destroy_buffer(buffer);
        }
        for id in self.textures {
            textures.release(backend, id);
        }
    }

    fn mirror_materials(&mut self) {
        for (gpu, material) in self.materials.iter_mut().zip(self.model.materials()) {
            gpu.mirror_from(material);
        }
    }

    fn upload<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> RenderResult<()> {
        let model = self.model.as_ref();
        for actual in [model.positions().len(), model.normals().len(), model.uvs().len()] {
            if actual != self.vertex_count {
                return Err(RenderError::VertexCountMismatch {
                    expected: self.vertex_count,
                    actual,
                });
            }
        }

        backend.write_buffer(self.position_buffer, 0, bytemuck::cast_slice(model.positions()));
        backend.write_buffer(self.normal_buffer, 0, bytemuck::cast_slice(model.normals()));
        backend.write_buffer(self.uv_buffer, 0, bytemuck::cast_slice(model.uvs()));
        Ok(())
    }

    pub fn model(&self) -> &dyn AnimatedModel {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn AnimatedModel {
        self.model.as_mut()
    }

    pub fn materials(&self) -> &[GpuMaterial] {
        &self.materials
    }

    pub fn sub_meshes(&self) -> &[SubMesh] {
        self.model.sub_meshes()
    }

    pub fn position_buffer(&self) -> BufferHandle {
        self.position_buffer
    }

    pub fn normal_buffer(&self) -> BufferHandle {
        self.normal_buffer
    }

    pub fn uv_buffer(&self) -> BufferHandle {
        self.uv_buffer
    }

    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    pub fn index_width(&self) -> IndexWidth {
        self.index_width
    }

    pub fn index_format(&self) -> IndexFormat {
        self.index_width.gpu_format()
    }

    /// Byte offset of a sub-mesh's first index in the GPU index buffer
    pub fn index_byte_offset(&self, sub_mesh: &SubMesh) -> u64 {
        u64::from(sub_mesh.begin_index) * self.index_format().size()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Animation time of the last update, in seconds
    pub fn anim_time(&self) -> f32 {
        self.anim_time
    }

    pub fn timings(&self) -> UpdateTimings {
        self.timings
    }

    /// Textures this resource holds a reference to
    pub fn texture_ids(&self) -> &[TextureId] {
        &self.textures
    }
}

fn desc(label: &str, usage: BufferUsage) -> BufferDescriptor {
    BufferDescriptor {
        label: Some(label.to_string()),
        size: 0,
        usage,
    }
}

fn resolve<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    textures: &mut TextureCache,
    key: TextureKey,
    acquired: &mut Vec<TextureId>,
) -> Option<TextureId> {
    match textures.acquire(backend, key.clone()) {
        Ok(id) => {
            acquired.push(id);
            Some(id)
        }
        Err(e) => {
            log::warn!("Texture {} unavailable, slot left unbound: {}", key, e);
            None
        }
    }
}

/// Every submesh must draw inside the index buffer with an existing material
fn validate_sub_meshes(model: &dyn AnimatedModel) -> RenderResult<()> {
    let index_count = model.index_count();
    let material_count = model.materials().len();
    for (index, sub_mesh) in model.sub_meshes().iter().enumerate() {
        let end = sub_mesh.begin_index as u64 + sub_mesh.index_count as u64;
        if end > index_count as u64 {
            return Err(RenderError::InvalidSubMesh {
                index,
                begin: sub_mesh.begin_index,
                end,
                index_count,
            });
        }
        if sub_mesh.material >= material_count {
            return Err(RenderError::InvalidMaterialIndex {
                index,
                material: sub_mesh.material,
                material_count,
            });
        }
    }
    Ok(())
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::resources::{Material, StaticModel, TextureData, TextureLoader};
    use rstest::rstest;

    struct SolidLoader;

    impl TextureLoader for SolidLoader {
        fn load(&self, path: &str) -> RenderResult<TextureData> {
            if path.starts_with("missing") {
                return Err(RenderError::TextureLoadFailed {
                    path: path.to_string(),
                    message: "not found".into(),
                });
            }
            let alpha = if path.ends_with(".png") { 128 } else { 255 };
            Ok(TextureData::solid_color([200, 200, 200, alpha], path))
        }
    }

    fn cache() -> TextureCache {
        TextureCache::new(Box::new(SolidLoader))
    }

    #[rstest]
    #[case(IndexWidth::U8, IndexFormat::Uint16, 12)]
    #[case(IndexWidth::U16, IndexFormat::Uint16, 12)]
    #[case(IndexWidth::U32, IndexFormat::Uint32, 24)]
    fn test_index_buffer_width(
        #[case] width: IndexWidth,
        #[case] format: IndexFormat,
        #[case] bytes: u64,
    ) {
        let mut backend = DummyBackend::new();
        let mut textures = cache();
        let model = StaticModel::quad()
            .with_index_width(width)
            .with_sub_mesh(Material::default(), 0, 3)
            .with_shared_sub_mesh(0, 3, 3);

        let mesh = GpuMeshResource::create(&mut backend, &mut textures, Box::new(model)).unwrap();
        assert_eq!(mesh.index_format(), format);
        assert_eq!(backend.buffer_size(mesh.index_buffer()), Some(bytes));
        assert_eq!(mesh.index_byte_offset(&mesh.sub_meshes()[1]), 3 * format.size());
    }

    #[test]
    fn test_unsupported_index_width_fails() {
        let mut backend = DummyBackend::new();
        let model = StaticModel::quad().with_raw_indices(3, vec![0; 18]);
        let result = GpuMeshResource::create(&mut backend, &mut cache(), Box::new(model));
        assert!(matches!(result, Err(RenderError::UnsupportedIndexWidth(3))));
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_buffer_failure_releases_partial_buffers() {
        let mut backend = DummyBackend::new().with_buffer_limit(2);
        let result = GpuMeshResource::create(&mut backend, &mut cache(), Box::new(StaticModel::quad()));
        assert!(matches!(result, Err(RenderError::Backend(_))));
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_submesh_past_index_buffer_is_rejected() {
        let mut backend = DummyBackend::new();
        // 8x4 sphere has 192 indices
        let model = StaticModel::uv_sphere(1.0, 8, 4)
            .with_sub_mesh(Material::default(), 0, 150)
            .with_sub_mesh(Material::default(), 150, 96);
        let result = GpuMeshResource::create(&mut backend, &mut cache(), Box::new(model));
        assert!(matches!(
            result,
            Err(RenderError::InvalidSubMesh { index: 1, begin: 150, end: 246, index_count: 192 })
        ));
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_submesh_with_unknown_material_is_rejected() {
        let mut backend = DummyBackend::new();
        let model = StaticModel::quad()
            .with_sub_mesh(Material::default(), 0, 3)
            .with_shared_sub_mesh(4, 3, 3);
        let result = GpuMeshResource::create(&mut backend, &mut cache(), Box::new(model));
        assert!(matches!(
            result,
            Err(RenderError::InvalidMaterialIndex { index: 1, material: 4, material_count: 1 })
        ));
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_update_keeps_buffer_sizes() {
        let mut backend = DummyBackend::new();
        let mut textures = cache();
        let model = StaticModel::uv_sphere(1.0, 8, 4).with_sub_mesh(Material::default(), 0, 192);
        let mut mesh = GpuMeshResource::create(&mut backend, &mut textures, Box::new(model)).unwrap();

        let sizes = |backend: &DummyBackend, mesh: &GpuMeshResource| {
            [
                backend.buffer_size(mesh.position_buffer()),
                backend.buffer_size(mesh.normal_buffer()),
                backend.buffer_size(mesh.uv_buffer()),
                backend.buffer_size(mesh.index_buffer()),
            ]
        };
        let before = sizes(&backend, &mesh);
        assert_eq!(before[0], Some(45 * 12));
        assert_eq!(before[2], Some(45 * 8));

        for frame in 1..=5 {
            mesh.update(&mut backend, frame as f32 / 30.0, MAX_ELAPSED).unwrap();
            assert_eq!(sizes(&backend, &mesh), before);
        }
        assert_eq!(backend.live_buffer_count(), 4);
        assert_eq!(backend.buffer_write_count(), 15);
    }

    #[test]
    fn test_shared_texture_is_reference_counted() {
        let mut backend = DummyBackend::new();
        let mut textures = cache();
        let model = StaticModel::quad()
            .with_sub_mesh(Material::new("a").with_texture("body.bmp"), 0, 3)
            .with_sub_mesh(Material::new("b").with_texture("body.bmp"), 3, 3);

        let mesh = GpuMeshResource::create(&mut backend, &mut textures, Box::new(model)).unwrap();
        let a = mesh.materials()[0].texture.unwrap();
        let b = mesh.materials()[1].texture.unwrap();
        assert_eq!(a, b);
        assert_eq!(textures.ref_count(a), 2);
        assert_eq!(textures.len(), 1);

        mesh.destroy(&mut backend, &mut textures);
        assert!(textures.is_empty());
        assert_eq!(backend.live_texture_count(), 0);
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_missing_texture_leaves_slot_unbound() {
        let mut backend = DummyBackend::new();
        let mut textures = cache();
        let model = StaticModel::quad().with_sub_mesh(
            Material::new("m")
                .with_texture("missing.bmp")
                .with_toon_texture("toon01.bmp"),
            0,
            6,
        );

        let mesh = GpuMeshResource::create(&mut backend, &mut textures, Box::new(model)).unwrap();
        let material = &mesh.materials()[0];
        assert!(material.texture.is_none());
        assert_eq!(material.texture_mode().as_i32(), 0);
        assert_eq!(material.toon_mode(), 1);
    }

    #[test]
    fn test_alpha_texture_selects_texture_alpha_mode() {
        let mut backend = DummyBackend::new();
        let mut textures = cache();
        let model = StaticModel::quad()
            .with_sub_mesh(Material::new("a").with_texture("hair.png"), 0, 3)
            .with_sub_mesh(Material::new("b").with_texture("skin.bmp"), 3, 3);

        let mesh = GpuMeshResource::create(&mut backend, &mut textures, Box::new(model)).unwrap();
        assert_eq!(mesh.materials()[0].texture_mode().as_i32(), 2);
        assert_eq!(mesh.materials()[1].texture_mode().as_i32(), 1);
    }

    #[test]
    fn test_physics_toggle() {
        let mut backend = DummyBackend::new();
        let mut textures = cache();
        let mut mesh =
            GpuMeshResource::create(&mut backend, &mut textures, Box::new(StaticModel::quad())).unwrap();

        mesh.update(&mut backend, 0.0, MAX_ELAPSED).unwrap();
        mesh.physics_enabled = false;
        mesh.update(&mut backend, MAX_ELAPSED, MAX_ELAPSED).unwrap();

        assert_eq!(mesh.anim_time(), MAX_ELAPSED);
        let timings = mesh.timings();
        assert_eq!(
            timings.total(),
            timings.animation + timings.physics + timings.material + timings.upload
        );
    }
}
