//! Vertex input and resource binding reflection from naga modules

use std::collections::{BTreeMap, HashMap};

use crate::backend::{BindGroupLayoutEntry, BindingType, SHADER_ENTRY_POINT};

/// Named locations resolved once per compiled variant
#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    /// Vertex input name -> location
    pub inputs: HashMap<String, u32>,
    /// Global resource name -> (set, binding)
    pub bindings: HashMap<String, (u32, u32)>,
    /// Layout entries per bind group, ordered by group index
    pub groups: Vec<Vec<BindGroupLayoutEntry>>,
    pub has_vertex: bool,
    pub has_fragment: bool,
}

impl ShaderReflection {
    pub fn from_module(module: &naga::Module) -> Self {
        Self::from_modules(&[module])
    }

    /// Merge the stage modules of one variant.
    ///
    /// Every stage declares the full resource set, but a stage only learns a
    /// texture is a depth texture where it samples it through a comparison
    /// sampler. Later modules therefore override earlier ones, so pass the
    /// vertex module first.
    pub fn from_modules(modules: &[&naga::Module]) -> Self {
        let mut reflection = ShaderReflection::default();
        let mut slots: BTreeMap<(u32, u32), BindingType> = BTreeMap::new();

        for module in modules {
            for entry in module.entry_points.iter().filter(|e| e.name == SHADER_ENTRY_POINT) {
                match entry.stage {
                    naga::ShaderStage::Vertex => {
                        reflection.has_vertex = true;
                        for argument in &entry.function.arguments {
                            collect_inputs(module, argument, &mut reflection.inputs);
                        }
                    }
                    naga::ShaderStage::Fragment => reflection.has_fragment = true,
                    naga::ShaderStage::Compute => {}
                }
            }

            for (_, global) in module.global_variables.iter() {
                let (Some(name), Some(binding)) = (&global.name, &global.binding) else {
                    continue;
                };
                let Some(ty) = binding_type(module, global) else {
                    log::warn!("Skipping unsupported shader resource `{}`", name);
                    continue;
                };
                reflection
                    .bindings
                    .insert(name.clone(), (binding.group, binding.binding));
                slots.insert((binding.group, binding.binding), ty);
            }
        }

        // Groups must be contiguous for the pipeline layout
        let group_count = slots.keys().next_back().map_or(0, |(last, _)| last + 1);
        reflection.groups = vec![Vec::new(); group_count as usize];
        for ((group, binding), ty) in slots {
            reflection.groups[group as usize].push(BindGroupLayoutEntry { binding, ty });
        }

        reflection
    }

    pub fn input_location(&self, name: &str) -> Option<u32> {
        self.inputs.get(name).copied()
    }
}

fn collect_inputs(
    module: &naga::Module,
    argument: &naga::FunctionArgument,
    inputs: &mut HashMap<String, u32>,
) {
    if let Some(naga::Binding::Location { location, .. }) = &argument.binding {
        if let Some(name) = &argument.name {
            inputs.insert(name.clone(), *location);
        }
        return;
    }

    if let naga::TypeInner::Struct { members, .. } = &module.types[argument.ty].inner {
        for member in members {
            if let (Some(name), Some(naga::Binding::Location { location, .. })) =
                (&member.name, &member.binding)
            {
                inputs.insert(name.clone(), *location);
            }
        }
    }
}

fn binding_type(module: &naga::Module, global: &naga::GlobalVariable) -> Option<BindingType> {
    if global.space == naga::AddressSpace::Uniform {
        return Some(BindingType::UniformBuffer);
    }

    match &module.types[global.ty].inner {
        naga::TypeInner::Image { class, .. } => match class {
            naga::ImageClass::Depth { .. } => Some(BindingType::Texture { depth: true }),
            naga::ImageClass::Sampled { .. } => Some(BindingType::Texture { depth: false }),
            naga::ImageClass::Storage { .. } => None,
        },
        naga::TypeInner::Sampler { comparison } => Some(BindingType::Sampler {
            comparison: *comparison,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"#version 450
layout(set = 0, binding = 0) uniform Uniforms { mat4 wvp; } model;
layout(set = 1, binding = 2) uniform sampler base_sampler;
layout(set = 1, binding = 1) uniform texture2D base_texture;
layout(set = 1, binding = 3) uniform texture2D depth_map;
layout(set = 1, binding = 4) uniform samplerShadow depth_sampler;

#ifdef VERTEX
layout(location = 0) in vec3 position;
layout(location = 2) in vec2 uv;
layout(location = 5) in float extra;
layout(location = 0) out vec2 v_uv;

void main() {
    gl_Position = model.wvp * vec4(position * extra, 1.0);
    v_uv = uv;
}
#endif

#ifdef FRAGMENT
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

void main() {
    float lit = textureLod(sampler2DShadow(depth_map, depth_sampler), vec3(v_uv, 0.5), 0.0);
    out_color = texture(sampler2D(base_texture, base_sampler), v_uv) * lit;
}
#endif
"#;

    fn parse(stage: naga::ShaderStage, define: &str) -> naga::Module {
        let mut defines = naga::FastHashMap::default();
        defines.insert(define.to_string(), String::new());
        naga::front::glsl::Frontend::default()
            .parse(&naga::front::glsl::Options { stage, defines }, SOURCE)
            .unwrap()
    }

    #[test]
    fn test_reflects_inputs_and_bindings() {
        let vertex = parse(naga::ShaderStage::Vertex, "VERTEX");
        let fragment = parse(naga::ShaderStage::Fragment, "FRAGMENT");
        let reflection = ShaderReflection::from_modules(&[&vertex, &fragment]);

        assert!(reflection.has_vertex);
        assert!(reflection.has_fragment);
        assert_eq!(reflection.input_location("position"), Some(0));
        assert_eq!(reflection.input_location("uv"), Some(2));
        assert_eq!(reflection.input_location("extra"), Some(5));
        assert_eq!(reflection.bindings.get("base_texture"), Some(&(1, 1)));

        assert_eq!(reflection.groups.len(), 2);
        assert_eq!(reflection.groups[0][0].ty, BindingType::UniformBuffer);
        let bindings: Vec<u32> = reflection.groups[1].iter().map(|e| e.binding).collect();
        assert_eq!(bindings, [1, 2, 3, 4]);
    }

    #[test]
    fn test_fragment_stage_decides_depth_textures() {
        let vertex = parse(naga::ShaderStage::Vertex, "VERTEX");
        let fragment = parse(naga::ShaderStage::Fragment, "FRAGMENT");

        let merged = ShaderReflection::from_modules(&[&vertex, &fragment]);
        let depth_map = merged.groups[1].iter().find(|e| e.binding == 3).unwrap();
        assert_eq!(depth_map.ty, BindingType::Texture { depth: true });
        let base = merged.groups[1].iter().find(|e| e.binding == 1).unwrap();
        assert_eq!(base.ty, BindingType::Texture { depth: false });
        let sampler = merged.groups[1].iter().find(|e| e.binding == 4).unwrap();
        assert_eq!(sampler.ty, BindingType::Sampler { comparison: true });

        let vertex_only = ShaderReflection::from_module(&vertex);
        assert!(!vertex_only.has_fragment);
    }
}
