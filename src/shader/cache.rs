//! Lazily compiled shader variants keyed by family and define set

use crate::backend::{
    BindGroupLayoutHandle, GraphicsBackend, ShaderModuleHandle, VertexBufferLayout, VertexFormat,
};
use crate::error::{RenderError, RenderResult};

use super::composer::{ComposeError, ShaderComposer, ShaderStage};
use super::reflect::ShaderReflection;
use super::sources::{BuiltinShaderSources, ShaderSourceResolver};
use super::{ShaderDefines, ShaderFamily, NORMAL_INPUT, POSITION_INPUT, UV_INPUT};

/// Opaque index of a compiled variant inside a [`ShaderVariantCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantIndex(pub(crate) usize);

impl VariantIndex {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Set and binding of a named shader resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSlot {
    pub group: u32,
    pub binding: u32,
}

/// A compiled program with its reflected locations and bind group layouts
#[derive(Debug, Clone)]
pub struct ShaderVariant {
    pub family: ShaderFamily,
    pub defines: ShaderDefines,
    pub vertex_module: ShaderModuleHandle,
    /// `None` for depth-only families
    pub fragment_module: Option<ShaderModuleHandle>,
    /// One layout per bind group, in group order
    pub layouts: Vec<BindGroupLayoutHandle>,
    pub reflection: ShaderReflection,
}

impl ShaderVariant {
    pub fn input_location(&self, name: &str) -> Option<u32> {
        self.reflection.input_location(name)
    }

    pub fn slot(&self, name: &str) -> Option<ResourceSlot> {
        self.reflection
            .bindings
            .get(name)
            .map(|&(group, binding)| ResourceSlot { group, binding })
    }

    /// Like [`slot`](Self::slot), but a missing resource is an error
    pub fn require_slot(&self, name: &str) -> RenderResult<ResourceSlot> {
        self.slot(name).ok_or_else(|| RenderError::MissingShaderInput {
            family: self.family,
            name: name.to_string(),
        })
    }

    pub fn layout(&self, group: u32) -> Option<BindGroupLayoutHandle> {
        self.layouts.get(group as usize).copied()
    }

    /// Vertex buffer layouts for the family's inputs, in
    /// [`ShaderFamily::required_inputs`] order. Each input reads its own buffer.
    pub fn vertex_layouts(&self) -> RenderResult<Vec<VertexBufferLayout>> {
        self.family
            .required_inputs()
            .iter()
            .map(|&name| {
                let location = self.input_location(name).ok_or_else(|| {
                    RenderError::MissingShaderInput {
                        family: self.family,
                        name: name.to_string(),
                    }
                })?;
                Ok(VertexBufferLayout::single(location, input_format(name)))
            })
            .collect()
    }
}

fn input_format(name: &str) -> VertexFormat {
    match name {
        UV_INPUT => VertexFormat::Float32x2,
        POSITION_INPUT | NORMAL_INPUT => VertexFormat::Float32x3,
        _ => VertexFormat::Float32x4,
    }
}

/// Owns every compiled shader variant for a render context.
///
/// Lookup is a linear scan over `(family, defines)`; the number of live
/// variants per family stays small. Variants are never recompiled or evicted.
pub struct ShaderVariantCache {
    resolver: Box<dyn ShaderSourceResolver>,
    composer: ShaderComposer,
    variants: Vec<ShaderVariant>,
}

impl ShaderVariantCache {
    pub fn new(resolver: Box<dyn ShaderSourceResolver>) -> Self {
        let mut composer = ShaderComposer::new();
        for (path, source) in BuiltinShaderSources::includes() {
            composer.register_include(path, source);
        }
        Self {
            resolver,
            composer,
            variants: Vec::new(),
        }
    }

    pub fn with_builtin_sources() -> Self {
        Self::new(Box::new(BuiltinShaderSources))
    }

    /// Register an extra snippet for `#include`
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.composer.register_include(path, source);
    }

    /// Number of compiled variants
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Index of the variant for `family` and `defines`, compiling it on first use.
    ///
    /// Equal define sets map to the same index regardless of insertion order.
    /// Compile failures are logged and returned; nothing is cached for them.
    pub fn variant_index<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        family: ShaderFamily,
        defines: &ShaderDefines,
    ) -> RenderResult<VariantIndex> {
        if let Some(position) = self
            .variants
            .iter()
            .position(|v| v.family == family && v.defines == *defines)
        {
            return Ok(VariantIndex(position));
        }

        match self.compile(backend, family, defines) {
            Ok(variant) => {
                log::info!("Compiled {} shader variant {}", family, defines);
                self.variants.push(variant);
                Ok(VariantIndex(self.variants.len() - 1))
            }
            Err(e) => {
                log::error!("{} shader variant {} failed: {}", family, defines, e);
                Err(e)
            }
        }
    }

    /// Look up a compiled variant. An index from another cache is a
    /// programming error; it is logged and yields `None`.
    pub fn variant(&self, index: VariantIndex) -> Option<&ShaderVariant> {
        let variant = self.variants.get(index.0);
        if variant.is_none() {
            log::error!(
                "Invalid shader variant index {} ({} variants compiled)",
                index.0,
                self.variants.len()
            );
        }
        variant
    }

    fn compile<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        family: ShaderFamily,
        defines: &ShaderDefines,
    ) -> RenderResult<ShaderVariant> {
        let template = self.resolver.resolve(family)?;
        let lookup = |path: &str| self.resolver.resolve_include(path);
        let compose = |stage| {
            self.composer
                .compose(&template, stage, defines, &lookup)
                .map_err(|e| match e {
                    ComposeError::IncludeNotFound(path) => RenderError::ShaderSourceNotFound(path),
                    other => compile_error(family, format!("{} stage: {other}", stage.define())),
                })
        };

        let vertex = compose(ShaderStage::Vertex)?;
        let fragment = if family.has_fragment() {
            Some(compose(ShaderStage::Fragment)?)
        } else {
            None
        };

        let mut modules = vec![&vertex.module];
        modules.extend(fragment.as_ref().map(|f| &f.module));
        let reflection = ShaderReflection::from_modules(&modules);
        if !reflection.has_vertex {
            return Err(compile_error(family, "missing vertex `main`".into()));
        }
        if family.has_fragment() && !reflection.has_fragment {
            return Err(compile_error(family, "missing fragment `main`".into()));
        }
        for &input in family.required_inputs() {
            if reflection.input_location(input).is_none() {
                return Err(RenderError::MissingShaderInput {
                    family,
                    name: input.to_string(),
                });
            }
        }

        let label = format!("{family} {defines}");
        let vertex_module = backend
            .create_shader_module(&format!("{label} vertex"), &vertex.wgsl)
            .map_err(|e| compile_error(family, e.to_string()))?;
        let fragment_module = match &fragment {
            Some(stage) => Some(
                backend
                    .create_shader_module(&format!("{label} fragment"), &stage.wgsl)
                    .map_err(|e| compile_error(family, e.to_string()))?,
            ),
            None => None,
        };

        let layouts = reflection
            .groups
            .iter()
            .map(|entries| backend.create_bind_group_layout(entries))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ShaderVariant {
            family,
            defines: defines.clone(),
            vertex_module,
            fragment_module,
            layouts,
            reflection,
        })
    }
}

fn compile_error(family: ShaderFamily, message: String) -> RenderError {
    RenderError::ShaderCompilationFailed { family, message }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::backend::BindingType;
    use rstest::rstest;
    use crate::shader::{SHADOW_CASCADE_COUNT_DEFINE, SHADOW_MAP_DEFINE};

    struct BrokenSources;

    impl ShaderSourceResolver for BrokenSources {
        fn resolve(&self, _family: ShaderFamily) -> RenderResult<String> {
            Ok("#version 450\n#ifdef VERTEX\nvoid main() { gl_Position = 1.0; }\n#endif\n".into())
        }
    }

    #[test]
    fn test_equal_defines_compile_once() {
        let mut backend = DummyBackend::new();
        let mut cache = ShaderVariantCache::with_builtin_sources();

        let a = ShaderDefines::new()
            .with(SHADOW_MAP_DEFINE, "")
            .with(SHADOW_CASCADE_COUNT_DEFINE, 4);
        let b = ShaderDefines::new()
            .with(SHADOW_CASCADE_COUNT_DEFINE, 4)
            .with(SHADOW_MAP_DEFINE, "");

        let first = cache.variant_index(&mut backend, ShaderFamily::Opaque, &a).unwrap();
        let second = cache.variant_index(&mut backend, ShaderFamily::Opaque, &b).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        // One module per stage
        assert_eq!(backend.shader_module_count(), 2);
    }

    #[test]
    fn test_every_builtin_family_compiles() {
        let mut backend = DummyBackend::new();
        let mut cache = ShaderVariantCache::with_builtin_sources();

        for family in ShaderFamily::ALL {
            let index = cache
                .variant_index(&mut backend, family, &ShaderDefines::new())
                .unwrap();
            let variant = cache.variant(index).unwrap();
            assert_eq!(variant.family, family);
            assert_eq!(variant.vertex_layouts().unwrap().len(), family.required_inputs().len());
        }
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_opaque_reflection() {
        let mut backend = DummyBackend::new();
        let mut cache = ShaderVariantCache::with_builtin_sources();
        let defines = ShaderDefines::new()
            .with(SHADOW_MAP_DEFINE, "")
            .with(SHADOW_CASCADE_COUNT_DEFINE, 2);
        let index = cache
            .variant_index(&mut backend, ShaderFamily::Opaque, &defines)
            .unwrap();
        let variant = cache.variant(index).unwrap();

        assert_eq!(variant.layouts.len(), 2);
        assert_eq!(variant.input_location("uv"), Some(2));
        assert_eq!(
            variant.slot("toon_texture"),
            Some(ResourceSlot { group: 1, binding: 5 })
        );
        assert!(variant.slot("does_not_exist").is_none());
    }

    #[rstest]
    #[case(ShaderDefines::new())]
    #[case(ShaderDefines::new().with(SHADOW_MAP_DEFINE, "").with(SHADOW_CASCADE_COUNT_DEFINE, 4))]
    fn test_cascade_maps_are_depth_bindings(#[case] defines: ShaderDefines) {
        let mut backend = DummyBackend::new();
        let mut cache = ShaderVariantCache::with_builtin_sources();
        let index = cache
            .variant_index(&mut backend, ShaderFamily::Opaque, &defines)
            .unwrap();
        let variant = cache.variant(index).unwrap();

        let group0 = &variant.reflection.groups[0];
        for binding in 1..=4 {
            let entry = group0.iter().find(|e| e.binding == binding).unwrap();
            assert_eq!(entry.ty, BindingType::Texture { depth: true });
        }
        let sampler = group0.iter().find(|e| e.binding == 5).unwrap();
        assert_eq!(sampler.ty, BindingType::Sampler { comparison: true });
    }

    #[test]
    fn test_shadow_caster_has_no_fragment_stage() {
        let mut backend = DummyBackend::new();
        let mut cache = ShaderVariantCache::with_builtin_sources();
        let index = cache
            .variant_index(&mut backend, ShaderFamily::ShadowCaster, &ShaderDefines::new())
            .unwrap();
        let variant = cache.variant(index).unwrap();
        assert!(variant.fragment_module.is_none());
        assert_eq!(backend.shader_module_count(), 1);
    }

    #[test]
    fn test_compile_failure_is_not_cached() {
        let mut backend = DummyBackend::new();
        let mut cache = ShaderVariantCache::new(Box::new(BrokenSources));

        let result = cache.variant_index(&mut backend, ShaderFamily::ShadowCaster, &ShaderDefines::new());
        assert!(matches!(
            result,
            Err(RenderError::ShaderCompilationFailed { family: ShaderFamily::ShadowCaster, .. })
        ));
        assert!(cache.is_empty());
        assert_eq!(backend.shader_module_count(), 0);
    }

    #[test]
    fn test_invalid_index_returns_none() {
        let cache = ShaderVariantCache::with_builtin_sources();
        assert!(cache.variant(VariantIndex(3)).is_none());
    }
}
