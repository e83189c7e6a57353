//! Shader source resolution and the built-in GLSL templates
//!
//! Each template holds both stages behind `#ifdef VERTEX` and
//! `#ifdef FRAGMENT`; the composer parses it once per stage.

use std::path::{Path, PathBuf};

use super::ShaderFamily;
use crate::error::{RenderError, RenderResult};

/// Resolves a shader family to its GLSL template before composition
pub trait ShaderSourceResolver {
    /// Template source for `family`
    fn resolve(&self, family: ShaderFamily) -> RenderResult<String>;

    /// Source for an `#include` path. `None` falls back to the built-in snippets.
    fn resolve_include(&self, _path: &str) -> Option<String> {
        None
    }
}

/// Built-in GLSL shipped with the crate
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinShaderSources;

impl BuiltinShaderSources {
    pub fn source(family: ShaderFamily) -> &'static str {
        match family {
            ShaderFamily::Opaque => OPAQUE_SHADER,
            ShaderFamily::Edge => EDGE_SHADER,
            ShaderFamily::GroundShadow => GROUND_SHADOW_SHADER,
            ShaderFamily::ShadowCaster => SHADOW_CASTER_SHADER,
        }
    }

    /// Snippets available to `#include`
    pub fn includes() -> &'static [(&'static str, &'static str)] {
        &[(MODEL_UNIFORMS_PATH, MODEL_UNIFORMS_INCLUDE)]
    }
}

impl ShaderSourceResolver for BuiltinShaderSources {
    fn resolve(&self, family: ShaderFamily) -> RenderResult<String> {
        Ok(Self::source(family).to_string())
    }
}

/// Loads `<root>/<family-name>.glsl`, with includes resolved relative to `root`
#[derive(Debug, Clone)]
pub struct DirectoryShaderSources {
    root: PathBuf,
    fallback_to_builtin: bool,
}

impl DirectoryShaderSources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fallback_to_builtin: false,
        }
    }

    /// Use the built-in template for families without a file
    pub fn with_builtin_fallback(mut self) -> Self {
        self.fallback_to_builtin = true;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, family: ShaderFamily) -> PathBuf {
        self.root.join(format!("{}.glsl", family.name()))
    }
}

impl ShaderSourceResolver for DirectoryShaderSources {
    fn resolve(&self, family: ShaderFamily) -> RenderResult<String> {
        let path = self.path_for(family);
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                log::debug!("Loaded {} shader from {}", family, path.display());
                Ok(source)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.fallback_to_builtin => {
                log::debug!("No {} override in {}, using built-in", family, self.root.display());
                Ok(BuiltinShaderSources::source(family).to_string())
            }
            Err(e) => Err(RenderError::ShaderSourceNotFound(format!(
                "{}: {e}",
                path.display()
            ))),
        }
    }

    fn resolve_include(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(path)).ok()
    }
}

/// Include path of the shared per-model uniform block
pub const MODEL_UNIFORMS_PATH: &str = "toon/model_uniforms.glsl";

/// Per-model uniforms shared by the opaque and edge families
pub const MODEL_UNIFORMS_INCLUDE: &str = r#"
layout(set = 0, binding = 0) uniform ModelUniforms {
    mat4 world;
    mat4 world_view;
    mat4 world_view_projection;
    mat4 world_view_inverse_transpose;
    // View space, xyz. Points from the light towards the scene.
    vec4 light_direction;
    vec4 light_color;
    // xy: framebuffer size in pixels
    vec4 screen_size;
    // Bias-adjusted light view-projection per cascade, premultiplied by world
    mat4 shadow_matrices[4];
    // View-space far distance of each cascade
    vec4 split_positions;
    // x: enabled, y: depth bias, z: cascade count
    vec4 shadow_params;
} model;
"#;

/// Opaque / translucent colour pass
pub const OPAQUE_SHADER: &str = r#"#version 450
#include "toon/model_uniforms.glsl"

#ifndef SHADOW_CASCADE_COUNT
#define SHADOW_CASCADE_COUNT 4
#endif

layout(set = 0, binding = 1) uniform texture2D shadow_map0;
layout(set = 0, binding = 2) uniform texture2D shadow_map1;
layout(set = 0, binding = 3) uniform texture2D shadow_map2;
layout(set = 0, binding = 4) uniform texture2D shadow_map3;
layout(set = 0, binding = 5) uniform samplerShadow shadow_sampler;

layout(set = 1, binding = 0) uniform MaterialUniforms {
    // rgb: diffuse, a: opacity
    vec4 diffuse;
    vec4 ambient;
    // rgb: specular, a: specular power
    vec4 specular;
    vec4 texture_mul;
    vec4 texture_add;
    vec4 sphere_mul;
    vec4 sphere_add;
    vec4 toon_mul;
    vec4 toon_add;
    // x: texture mode, y: sphere mode, z: toon mode, w: receives shadows
    ivec4 modes;
} material;
layout(set = 1, binding = 1) uniform texture2D base_texture;
layout(set = 1, binding = 2) uniform sampler base_sampler;
layout(set = 1, binding = 3) uniform texture2D sphere_texture;
layout(set = 1, binding = 4) uniform sampler sphere_sampler;
layout(set = 1, binding = 5) uniform texture2D toon_texture;
layout(set = 1, binding = 6) uniform sampler toon_sampler;

#ifdef VERTEX
layout(location = 0) in vec3 position;
layout(location = 1) in vec3 normal;
layout(location = 2) in vec2 uv;

layout(location = 0) out vec3 v_view_position;
layout(location = 1) out vec3 v_view_normal;
layout(location = 2) out vec2 v_uv;
layout(location = 3) out vec3 v_model_position;

void main() {
    vec4 p = vec4(position, 1.0);
    gl_Position = model.world_view_projection * p;
    v_view_position = (model.world_view * p).xyz;
    v_view_normal = (model.world_view_inverse_transpose * vec4(normal, 0.0)).xyz;
    v_uv = uv;
    v_model_position = position;
}
#endif

#ifdef FRAGMENT
layout(location = 0) in vec3 v_view_position;
layout(location = 1) in vec3 v_view_normal;
layout(location = 2) in vec2 v_uv;
layout(location = 3) in vec3 v_model_position;

layout(location = 0) out vec4 out_color;

vec3 apply_mul_factor(vec3 color, vec4 factor) {
    return mix(color, color * factor.rgb, factor.a);
}

vec3 apply_add_factor(vec3 color, vec4 factor) {
    return mix(color, color + factor.rgb, factor.a);
}

// Cascade maps are always bound, so this is compiled in every variant
float sample_cascade(int cascade, vec2 coord, float depth) {
    vec3 reference = vec3(coord, depth);
    if (cascade == 0) {
        return textureLod(sampler2DShadow(shadow_map0, shadow_sampler), reference, 0.0);
    } else if (cascade == 1) {
        return textureLod(sampler2DShadow(shadow_map1, shadow_sampler), reference, 0.0);
    } else if (cascade == 2) {
        return textureLod(sampler2DShadow(shadow_map2, shadow_sampler), reference, 0.0);
    }
    return textureLod(sampler2DShadow(shadow_map3, shadow_sampler), reference, 0.0);
}

float shadow_visibility(vec3 model_position, float view_depth) {
    float visibility = 1.0;
#ifdef SHADOW_MAP
    if (model.shadow_params.x > 0.5 && material.modes.w != 0) {
        int count = min(int(model.shadow_params.z), SHADOW_CASCADE_COUNT);
        int cascade = 0;
        for (int i = 0; i < count; i++) {
            if (view_depth > model.split_positions[i]) {
                cascade = i + 1;
            }
        }
        if (cascade < count) {
            vec4 coord = model.shadow_matrices[cascade] * vec4(model_position, 1.0);
            visibility = sample_cascade(cascade, coord.xy / coord.w, coord.z / coord.w - model.shadow_params.y);
        }
    }
#endif
    return visibility;
}

void main() {
    vec3 n = normalize(v_view_normal);
    vec3 eye_dir = normalize(-v_view_position);
    vec3 light_dir = normalize(-model.light_direction.xyz);
    vec2 sphere_uv = vec2(n.x * 0.5 + 0.5, 0.5 - n.y * 0.5);

    // Unbound slots carry a 1x1 white texture, so sampling is always valid
    vec4 base_texel = texture(sampler2D(base_texture, base_sampler), v_uv);
    vec3 sphere_texel = texture(sampler2D(sphere_texture, sphere_sampler), sphere_uv).rgb;

    float visibility = shadow_visibility(v_model_position, -v_view_position.z);
    float ln = min(clamp(dot(n, light_dir) + 0.5, 0.0, 1.0), visibility);
    vec3 toon_texel = textureLod(sampler2D(toon_texture, toon_sampler), vec2(0.0, 1.0 - ln), 0.0).rgb;

    vec3 color = clamp(material.diffuse.rgb * model.light_color.rgb + material.ambient.rgb, vec3(0.0), vec3(1.0));
    float alpha = material.diffuse.a;

    // Alpha-textured cutouts end up fully transparent and are blended away
    int texture_mode = material.modes.x;
    if (texture_mode != 0) {
        color *= apply_add_factor(apply_mul_factor(base_texel.rgb, material.texture_mul), material.texture_add);
        if (texture_mode == 2) {
            alpha *= base_texel.a;
        }
    }

    int sphere_mode = material.modes.y;
    if (sphere_mode != 0) {
        vec3 sphere = apply_add_factor(apply_mul_factor(sphere_texel, material.sphere_mul), material.sphere_add);
        if (sphere_mode == 1) {
            color *= sphere;
        } else {
            color += sphere;
        }
    }

    if (material.modes.z != 0) {
        color *= apply_add_factor(apply_mul_factor(toon_texel, material.toon_mul), material.toon_add);
    }

    vec3 specular = vec3(0.0);
    float power = material.specular.a;
    if (power > 0.0) {
        vec3 half_dir = normalize(eye_dir + light_dir);
        specular = pow(max(0.0, dot(half_dir, n)), power) * material.specular.rgb * model.light_color.rgb;
    }

    out_color = vec4(color + specular, alpha);
}
#endif
"#;

/// Outline shell, extruded along the screen-space normal
pub const EDGE_SHADER: &str = r#"#version 450
#include "toon/model_uniforms.glsl"

layout(set = 1, binding = 0) uniform EdgeUniforms {
    vec4 edge_color;
    // x: edge size
    vec4 edge_params;
} edge;

#ifdef VERTEX
layout(location = 0) in vec3 position;
layout(location = 1) in vec3 normal;

void main() {
    vec3 view_normal = (model.world_view * vec4(normal, 0.0)).xyz;
    vec4 clip = model.world_view_projection * vec4(position, 1.0);
    vec2 screen_normal = view_normal.xy;
    float normal_length = length(screen_normal);
    if (normal_length > 0.0) {
        vec2 extrusion = (screen_normal / normal_length) / (model.screen_size.xy * 0.5) * edge.edge_params.x * clip.w;
        clip = vec4(clip.xy + extrusion, clip.zw);
    }
    gl_Position = clip;
}
#endif

#ifdef FRAGMENT
layout(location = 0) out vec4 out_color;

void main() {
    out_color = edge.edge_color;
}
#endif
"#;

/// Planar projected shadow on the ground plane
pub const GROUND_SHADOW_SHADER: &str = r#"#version 450
layout(set = 0, binding = 0) uniform GroundShadowUniforms {
    mat4 world_shadow_view_projection;
    vec4 shadow_color;
} ground;

#ifdef VERTEX
layout(location = 0) in vec3 position;

void main() {
    gl_Position = ground.world_shadow_view_projection * vec4(position, 1.0);
}
#endif

#ifdef FRAGMENT
layout(location = 0) out vec4 out_color;

void main() {
    out_color = ground.shadow_color;
}
#endif
"#;

/// Depth-only pass into one shadow cascade
pub const SHADOW_CASTER_SHADER: &str = r#"#version 450
layout(set = 0, binding = 0) uniform ShadowCasterUniforms {
    mat4 world_view_projection;
} caster;

#ifdef VERTEX
layout(location = 0) in vec3 position;

void main() {
    gl_Position = caster.world_view_projection * vec4(position, 1.0);
}
#endif
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_resolves_every_family() {
        for family in ShaderFamily::ALL {
            let source = BuiltinShaderSources.resolve(family).unwrap();
            assert!(source.starts_with("#version 450"), "{family} must open with #version");
            assert!(source.contains("#ifdef VERTEX"), "{family} has no vertex stage");
            assert_eq!(source.contains("#ifdef FRAGMENT"), family.has_fragment());
            assert!(!source.contains("discard"));
        }
    }

    #[test]
    fn test_directory_without_file_fails_unless_fallback() {
        let dir = std::env::temp_dir().join("toon-renderer-missing-shaders");
        let strict = DirectoryShaderSources::new(&dir);
        assert!(matches!(
            strict.resolve(ShaderFamily::Edge),
            Err(RenderError::ShaderSourceNotFound(_))
        ));

        let lenient = DirectoryShaderSources::new(&dir).with_builtin_fallback();
        assert_eq!(lenient.resolve(ShaderFamily::Edge).unwrap(), EDGE_SHADER);
    }

    #[test]
    fn test_directory_path_uses_family_name() {
        let sources = DirectoryShaderSources::new("shaders");
        assert_eq!(
            sources.path_for(ShaderFamily::GroundShadow),
            Path::new("shaders").join("ground-shadow.glsl")
        );
    }
}
