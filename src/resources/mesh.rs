//! Animated mesh interface and a simple procedural implementation

use glam::{Vec2, Vec3};

use super::material::Material;
use crate::backend::IndexFormat;
use crate::error::{RenderError, RenderResult};

/// A contiguous index range drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMesh {
    pub begin_index: u32,
    pub index_count: u32,
    pub material: usize,
}

/// Index element width of the source mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
}

impl IndexWidth {
    pub fn from_size(bytes: usize) -> RenderResult<Self> {
        match bytes {
            1 => Ok(IndexWidth::U8),
            2 => Ok(IndexWidth::U16),
            4 => Ok(IndexWidth::U32),
            other => Err(RenderError::UnsupportedIndexWidth(other)),
        }
    }

    /// Narrowest width able to address `vertex_count` vertices
    pub fn for_vertex_count(vertex_count: usize) -> Self {
        if vertex_count <= u8::MAX as usize + 1 {
            IndexWidth::U8
        } else if vertex_count <= u16::MAX as usize + 1 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    pub fn size(self) -> usize {
        match self {
            IndexWidth::U8 => 1,
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }

    /// GPU index format. 8-bit indices are widened to 16 bits on upload.
    pub fn gpu_format(self) -> IndexFormat {
        match self {
            IndexWidth::U8 | IndexWidth::U16 => IndexFormat::Uint16,
            IndexWidth::U32 => IndexFormat::Uint32,
        }
    }

    /// Encode indices at this width, little endian
    pub fn encode(self, indices: &[u32]) -> Vec<u8> {
        match self {
            IndexWidth::U8 => indices.iter().map(|&i| i as u8).collect(),
            IndexWidth::U16 => indices
                .iter()
                .flat_map(|&i| (i as u16).to_le_bytes())
                .collect(),
            IndexWidth::U32 => indices.iter().flat_map(|&i| i.to_le_bytes()).collect(),
        }
    }
}

/// CPU-side animated model, as driven by an animation/physics engine.
///
/// Array lengths and the index buffer must stay stable for the lifetime of
/// any GPU resource created from the model.
pub trait AnimatedModel {
    fn vertex_count(&self) -> usize;
    fn index_count(&self) -> usize;
    /// Index element size in bytes: 1, 2 or 4
    fn index_element_size(&self) -> usize;
    /// Raw little-endian index data, `index_count * index_element_size` bytes
    fn index_bytes(&self) -> &[u8];

    fn positions(&self) -> &[Vec3];
    fn normals(&self) -> &[Vec3];
    fn uvs(&self) -> &[Vec2];

    fn materials(&self) -> &[Material];
    fn sub_meshes(&self) -> &[SubMesh];

    /// Evaluate keyframes (morphs, then bones) at `frame`
    fn evaluate_animation(&mut self, frame: f32);

    /// Evaluate morphs only, leaving bones and physics where they are
    fn evaluate_morphs(&mut self, _frame: f32) {}

    /// Advance the rigid-body simulation by `elapsed` seconds
    fn update_physics(&mut self, elapsed: f32);

    /// Skin vertices and apply material morphs into the snapshot arrays
    fn update(&mut self);

    /// Put the model back into its pose at `frame` and re-sync physics
    fn reset_animation(&mut self, frame: f32);
}

/// Per-vertex deformation applied by [`StaticModel`] at a given frame
pub type Deformer = Box<dyn Fn(f32, Vec3) -> Vec3>;

/// In-memory model with optional procedural deformation.
///
/// Useful for tests and demos; it has no skeleton and its "physics" only
/// counts steps.
pub struct StaticModel {
    rest_positions: Vec<Vec3>,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    index_size: usize,
    indices: Vec<u8>,
    index_count: usize,
    materials: Vec<Material>,
    sub_meshes: Vec<SubMesh>,
    deformer: Option<Deformer>,
    frame: f32,
    pub physics_steps: usize,
    pub physics_time: f32,
}

impl StaticModel {
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>, uvs: Vec<Vec2>, indices: &[u32]) -> Self {
        let width = IndexWidth::for_vertex_count(positions.len());
        Self {
            rest_positions: positions.clone(),
            positions,
            normals,
            uvs,
            index_size: width.size(),
            indices: width.encode(indices),
            index_count: indices.len(),
            materials: Vec::new(),
            sub_meshes: Vec::new(),
            deformer: None,
            frame: 0.0,
            physics_steps: 0,
            physics_time: 0.0,
        }
    }

    /// Re-encode the index buffer at a specific width
    pub fn with_index_width(mut self, width: IndexWidth) -> Self {
        let indices = self.decoded_indices();
        self.index_size = width.size();
        self.indices = width.encode(&indices);
        self
    }

    /// Replace the index buffer with raw bytes of any element size
    pub fn with_raw_indices(mut self, element_size: usize, bytes: Vec<u8>) -> Self {
        self.index_count = if element_size == 0 { 0 } else { bytes.len() / element_size };
        self.index_size = element_size;
        self.indices = bytes;
        self
    }

    /// Append a material with a sub-mesh covering `index_count` indices from `begin_index`
    pub fn with_sub_mesh(mut self, material: Material, begin_index: u32, index_count: u32) -> Self {
        self.materials.push(material);
        self.sub_meshes.push(SubMesh {
            begin_index,
            index_count,
            material: self.materials.len() - 1,
        });
        self
    }

    /// Add a sub-mesh that reuses an existing material
    pub fn with_shared_sub_mesh(mut self, material: usize, begin_index: u32, index_count: u32) -> Self {
        self.sub_meshes.push(SubMesh {
            begin_index,
            index_count,
            material,
        });
        self
    }

    pub fn with_deformer(mut self, deformer: Deformer) -> Self {
        self.deformer = Some(deformer);
        self
    }

    pub fn materials_mut(&mut self) -> &mut [Material] {
        &mut self.materials
    }

    pub fn frame(&self) -> f32 {
        self.frame
    }

    fn decoded_indices(&self) -> Vec<u32> {
        match self.index_size {
            1 => self.indices.iter().map(|&i| i as u32).collect(),
            2 => self
                .indices
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                .collect(),
            _ => self
                .indices
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }

    /// UV sphere centred at the origin
    pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let segment_angle = 2.0 * std::f32::consts::PI / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let normal = Vec3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin());
                positions.push(normal * radius);
                normals.push(normal.normalize_or_zero());
                uvs.push(Vec2::new(
                    segment as f32 / segments as f32,
                    ring as f32 / rings as f32,
                ));
            }
        }

        let mut indices = Vec::new();
        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;
                indices.extend_from_slice(&[current, current + 1, next, current + 1, next + 1, next]);
            }
        }

        Self::new(positions, normals, uvs, &indices)
    }

    /// Unit quad on the XY plane, facing +Z, split into two triangles
    pub fn quad() -> Self {
        Self::new(
            vec![
                Vec3::new(-0.5, -0.5, 0.0),
                Vec3::new(0.5, -0.5, 0.0),
                Vec3::new(0.5, 0.5, 0.0),
                Vec3::new(-0.5, 0.5, 0.0),
            ],
            vec![Vec3::Z; 4],
            vec![
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 0.0),
            ],
            &[0, 1, 2, 0, 2, 3],
        )
    }
}

impl AnimatedModel for StaticModel {
    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn index_count(&self) -> usize {
        self.index_count
    }

    fn index_element_size(&self) -> usize {
        self.index_size
    }

    fn index_bytes(&self) -> &[u8] {
        &self.indices
    }

    fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    fn uvs(&self) -> &[Vec2] {
        &self.uvs
    }

    fn materials(&self) -> &[Material] {
        &self.materials
    }

    fn sub_meshes(&self) -> &[SubMesh] {
        &self.sub_meshes
    }

    fn evaluate_animation(&mut self, frame: f32) {
        self.frame = frame;
    }

    fn update_physics(&mut self, elapsed: f32) {
        self.physics_steps += 1;
        self.physics_time += elapsed;
    }

    fn update(&mut self) {
        if let Some(deformer) = &self.deformer {
            for (out, rest) in self.positions.iter_mut().zip(&self.rest_positions) {
                *out = deformer(self.frame, *rest);
            }
        }
    }

    fn reset_animation(&mut self, frame: f32) {
        self.frame = frame;
        self.physics_time = 0.0;
        self.positions.clone_from(&self.rest_positions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(4, IndexWidth::U8)]
    #[case(256, IndexWidth::U8)]
    #[case(257, IndexWidth::U16)]
    #[case(70_000, IndexWidth::U32)]
    fn test_width_for_vertex_count(#[case] count: usize, #[case] expected: IndexWidth) {
        assert_eq!(IndexWidth::for_vertex_count(count), expected);
    }

    #[rstest]
    #[case(3)]
    #[case(8)]
    #[case(0)]
    fn test_unsupported_width(#[case] size: usize) {
        assert!(matches!(
            IndexWidth::from_size(size),
            Err(RenderError::UnsupportedIndexWidth(s)) if s == size
        ));
    }

    #[test]
    fn test_u8_indices_use_16_bit_gpu_format() {
        assert_eq!(IndexWidth::U8.gpu_format(), IndexFormat::Uint16);
        assert_eq!(IndexWidth::U32.gpu_format(), IndexFormat::Uint32);
    }

    #[test]
    fn test_index_width_reencoding() {
        let model = StaticModel::quad().with_index_width(IndexWidth::U32);
        assert_eq!(model.index_element_size(), 4);
        assert_eq!(model.index_bytes().len(), 6 * 4);
        assert_eq!(model.decoded_indices(), vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_deformer_applies_on_update() {
        let mut model = StaticModel::quad()
            .with_deformer(Box::new(|frame: f32, p: Vec3| p + Vec3::Y * frame));
        model.evaluate_animation(2.0);
        model.update();
        assert_eq!(model.positions()[0], Vec3::new(-0.5, 1.5, 0.0));

        model.reset_animation(0.0);
        assert_eq!(model.positions()[0], Vec3::new(-0.5, -0.5, 0.0));
    }

    #[test]
    fn test_sphere_counts() {
        let sphere = StaticModel::uv_sphere(1.0, 8, 4);
        assert_eq!(sphere.vertex_count(), 9 * 5);
        assert_eq!(sphere.index_count(), 8 * 4 * 6);
        assert_eq!(sphere.index_element_size(), 1);
    }
}
