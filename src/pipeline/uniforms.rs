//! Uniform block layouts shared with the GLSL shaders (std140)

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec4};

use crate::resources::GpuMaterial;
use crate::shadow::MAX_SHADOW_CASCADES;

/// Per-model block of the opaque and edge families
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ModelUniforms {
    pub world: Mat4,
    pub world_view: Mat4,
    pub world_view_projection: Mat4,
    pub world_view_inverse_transpose: Mat4,
    /// View space
    pub light_direction: Vec4,
    pub light_color: Vec4,
    /// xy: framebuffer size in pixels
    pub screen_size: Vec4,
    pub shadow_matrices: [Mat4; MAX_SHADOW_CASCADES],
    /// View-space far distance of each cascade
    pub split_positions: Vec4,
    /// x: enabled, y: depth bias, z: cascade count
    pub shadow_params: Vec4,
}

impl ModelUniforms {
    pub fn new(world: Mat4, view: Mat4, projection: Mat4) -> Self {
        let world_view = view * world;
        let normal = Mat3::from_mat4(world_view).inverse().transpose();
        Self {
            world,
            world_view,
            world_view_projection: projection * world_view,
            world_view_inverse_transpose: Mat4::from_mat3(normal),
            light_direction: Vec4::ZERO,
            light_color: Vec4::ONE,
            screen_size: Vec4::ZERO,
            shadow_matrices: [Mat4::IDENTITY; MAX_SHADOW_CASCADES],
            split_positions: Vec4::ZERO,
            shadow_params: Vec4::ZERO,
        }
    }
}

/// Per-submesh block of the opaque family
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniforms {
    /// rgb: diffuse, a: opacity
    pub diffuse: Vec4,
    pub ambient: Vec4,
    /// rgb: specular, a: specular power
    pub specular: Vec4,
    pub texture_mul: Vec4,
    pub texture_add: Vec4,
    pub sphere_mul: Vec4,
    pub sphere_add: Vec4,
    pub toon_mul: Vec4,
    pub toon_add: Vec4,
    /// x: texture mode, y: sphere mode, z: toon mode, w: receives shadows
    pub modes: [i32; 4],
}

impl MaterialUniforms {
    pub fn from_material(material: &GpuMaterial) -> Self {
        Self {
            diffuse: material.diffuse.extend(material.alpha),
            ambient: material.ambient.extend(1.0),
            specular: material.specular.extend(material.specular_power),
            texture_mul: material.texture_mul_factor,
            texture_add: material.texture_add_factor,
            sphere_mul: material.sphere_mul_factor,
            sphere_add: material.sphere_add_factor,
            toon_mul: material.toon_mul_factor,
            toon_add: material.toon_add_factor,
            modes: [
                material.texture_mode().as_i32(),
                material.sphere_mode().as_i32(),
                material.toon_mode(),
                i32::from(material.shadow_receiver),
            ],
        }
    }
}

/// Per-submesh block of the edge family
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct EdgeUniforms {
    pub edge_color: Vec4,
    /// x: edge size
    pub edge_params: Vec4,
}

impl EdgeUniforms {
    pub fn from_material(material: &GpuMaterial) -> Self {
        Self {
            edge_color: material.edge_color,
            edge_params: Vec4::new(material.edge_size, 0.0, 0.0, 0.0),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GroundShadowUniforms {
    pub world_shadow_view_projection: Mat4,
    pub shadow_color: Vec4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ShadowCasterUniforms {
    pub world_view_projection: Mat4,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Material;
    use glam::Vec3;

    #[test]
    fn test_block_sizes_match_shaders() {
        assert_eq!(std::mem::size_of::<ModelUniforms>(), 592);
        assert_eq!(std::mem::size_of::<MaterialUniforms>(), 160);
        assert_eq!(std::mem::size_of::<EdgeUniforms>(), 32);
        assert_eq!(std::mem::size_of::<GroundShadowUniforms>(), 80);
        assert_eq!(std::mem::size_of::<ShadowCasterUniforms>(), 64);
    }

    #[test]
    fn test_material_packing() {
        let material = Material::new("m")
            .with_diffuse(Vec3::new(0.1, 0.2, 0.3), 0.5)
            .with_specular(Vec3::ONE, 12.0);
        let uniforms = MaterialUniforms::from_material(&GpuMaterial::new(&material));
        assert_eq!(uniforms.diffuse, Vec4::new(0.1, 0.2, 0.3, 0.5));
        assert_eq!(uniforms.specular.w, 12.0);
        assert_eq!(uniforms.modes, [0, 0, 0, 1]);
    }

    #[test]
    fn test_normal_matrix_undoes_non_uniform_scale() {
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let uniforms = ModelUniforms::new(world, Mat4::IDENTITY, Mat4::IDENTITY);
        let n = uniforms.world_view_inverse_transpose.transform_vector3(Vec3::X);
        assert!((n - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
    }
}
