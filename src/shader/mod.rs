//! Shader families, define sets and variant compilation.
//!
//! Every draw pass uses one [`ShaderFamily`]. A family's GLSL template holds
//! both stages; [`ShaderComposer`] inlines its `#include`s and hands it to
//! naga's GLSL front end once per stage, with the [`ShaderDefines`] set and
//! the stage macro as preprocessor defines. The modules are validated,
//! written out as WGSL, reflected for vertex input locations and resource
//! bindings, and cached by [`ShaderVariantCache`].
//!
//! # Example
//!
//! ```ignore
//! use toon_renderer::shader::{ShaderDefines, ShaderFamily, ShaderVariantCache};
//!
//! let mut cache = ShaderVariantCache::with_builtin_sources();
//! let defines = ShaderDefines::new()
//!     .with("SHADOW_MAP", "")
//!     .with("SHADOW_CASCADE_COUNT", 4);
//! let index = cache.variant_index(&mut backend, ShaderFamily::Opaque, &defines)?;
//! let variant = cache.variant(index);
//! ```

mod cache;
mod composer;
mod reflect;
mod sources;

use std::collections::BTreeMap;
use std::fmt;

pub use cache::{ResourceSlot, ShaderVariant, ShaderVariantCache, VariantIndex};
pub use composer::{ComposeError, ComposedStage, ShaderComposer, ShaderStage};
pub use reflect::ShaderReflection;
pub use sources::{
    BuiltinShaderSources, DirectoryShaderSources, ShaderSourceResolver, EDGE_SHADER,
    GROUND_SHADOW_SHADER, MODEL_UNIFORMS_INCLUDE, OPAQUE_SHADER, SHADOW_CASTER_SHADER,
};

/// Vertex input names shared by all shader families
pub const POSITION_INPUT: &str = "position";
pub const NORMAL_INPUT: &str = "normal";
pub const UV_INPUT: &str = "uv";

/// Define that enables cascaded shadow sampling in the opaque family
pub const SHADOW_MAP_DEFINE: &str = "SHADOW_MAP";
/// Define holding the compiled cascade count
pub const SHADOW_CASCADE_COUNT_DEFINE: &str = "SHADOW_CASCADE_COUNT";

/// One shader program family per draw pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderFamily {
    Opaque,
    Edge,
    GroundShadow,
    ShadowCaster,
}

impl ShaderFamily {
    pub const ALL: [ShaderFamily; 4] = [
        ShaderFamily::Opaque,
        ShaderFamily::Edge,
        ShaderFamily::GroundShadow,
        ShaderFamily::ShadowCaster,
    ];

    /// Logical source name, also the file stem used by [`DirectoryShaderSources`]
    pub fn name(&self) -> &'static str {
        match self {
            ShaderFamily::Opaque => "opaque",
            ShaderFamily::Edge => "edge",
            ShaderFamily::GroundShadow => "ground-shadow",
            ShaderFamily::ShadowCaster => "shadow-caster",
        }
    }

    /// Vertex inputs this family reads from the mesh buffers
    pub fn required_inputs(&self) -> &'static [&'static str] {
        match self {
            ShaderFamily::Opaque => &[POSITION_INPUT, NORMAL_INPUT, UV_INPUT],
            ShaderFamily::Edge => &[POSITION_INPUT, NORMAL_INPUT],
            ShaderFamily::GroundShadow | ShaderFamily::ShadowCaster => &[POSITION_INPUT],
        }
    }

    /// Whether the family writes colour. Shadow casters are depth-only.
    pub fn has_fragment(&self) -> bool {
        !matches!(self, ShaderFamily::ShadowCaster)
    }
}

impl fmt::Display for ShaderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Order-independent set of preprocessor defines.
///
/// Two sets are equal when they hold the same names with the same values,
/// regardless of insertion order. A define with an empty value acts as a flag
/// for `#ifdef`; a non-empty value is also substituted by naga's preprocessor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderDefines {
    values: BTreeMap<String, String>,
}

impl ShaderDefines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.values.insert(name.into(), value.to_string());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ShaderDefines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if value.is_empty() {
                f.write_str(name)?;
            } else {
                write!(f, "{name}={value}")?;
            }
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defines_ignore_insertion_order() {
        let a = ShaderDefines::new().with("A", 1).with("B", "");
        let b = ShaderDefines::new().with("B", "").with("A", 1);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "[A=1, B]");
    }

    #[test]
    fn test_defines_differ_by_value() {
        let a = ShaderDefines::new().with(SHADOW_CASCADE_COUNT_DEFINE, 2);
        let b = ShaderDefines::new().with(SHADOW_CASCADE_COUNT_DEFINE, 4);
        assert_ne!(a, b);
    }

    #[test]
    fn test_family_names() {
        let names: Vec<_> = ShaderFamily::ALL.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["opaque", "edge", "ground-shadow", "shadow-caster"]);
    }
}
