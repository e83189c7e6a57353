//! GLSL variant composition through naga
//!
//! `#include` is the only directive resolved here. Define sets, `#ifdef`
//! blocks and value substitution are left to naga's GLSL preprocessor,
//! which also receives `VERTEX` or `FRAGMENT` for the stage being built.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::ShaderDefines;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("include not found: \"{0}\"")]
    IncludeNotFound(String),
    #[error("GLSL parse error:\n{0}")]
    Parse(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("WGSL generation error: {0}")]
    Output(String),
}

/// Pipeline stage a template is composed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Define naga sees while parsing this stage
    pub fn define(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "VERTEX",
            ShaderStage::Fragment => "FRAGMENT",
        }
    }

    fn naga(&self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

/// One composed stage: the validated IR and the WGSL handed to the backend
#[derive(Debug)]
pub struct ComposedStage {
    pub module: naga::Module,
    pub wgsl: String,
}

/// Extra include source consulted before the registered snippets
pub type IncludeLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Resolves includes and turns GLSL templates into per-stage naga modules
#[derive(Debug, Default, Clone)]
pub struct ShaderComposer {
    includes: HashMap<String, String>,
}

impl ShaderComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `source` available to `#include "path"`
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.includes.insert(path.to_string(), source.to_string());
    }

    pub fn has_include(&self, path: &str) -> bool {
        self.includes.contains_key(path)
    }

    /// Defines for one stage: the stage macro plus every entry of `defines`.
    /// Empty values are plain flags.
    pub fn build_defines(stage: ShaderStage, defines: &ShaderDefines) -> naga::FastHashMap<String, String> {
        let mut map = naga::FastHashMap::default();
        map.insert(stage.define().to_string(), String::new());
        for (name, value) in defines.iter() {
            map.insert(name.to_string(), value.to_string());
        }
        map
    }

    /// Inline every `#include`, each path at most once.
    pub fn resolve_includes(&self, source: &str, lookup: IncludeLookup<'_>) -> Result<String, ComposeError> {
        let mut included = HashSet::new();
        self.resolve_into(source, lookup, &mut included)
    }

    fn resolve_into(
        &self,
        source: &str,
        lookup: IncludeLookup<'_>,
        included: &mut HashSet<String>,
    ) -> Result<String, ComposeError> {
        let mut result = String::with_capacity(source.len());
        for line in source.lines() {
            match parse_include_directive(line.trim()) {
                Some(path) => {
                    if !included.insert(path.to_string()) {
                        continue;
                    }
                    let snippet = lookup(path)
                        .or_else(|| self.includes.get(path).cloned())
                        .ok_or_else(|| ComposeError::IncludeNotFound(path.to_string()))?;
                    result.push_str(&self.resolve_into(&snippet, lookup, included)?);
                }
                None => result.push_str(line),
            }
            result.push('\n');
        }
        Ok(result)
    }

    /// Parse one stage of `source` with naga's GLSL front end
    pub fn compose_to_naga(
        &self,
        source: &str,
        stage: ShaderStage,
        defines: &ShaderDefines,
        lookup: IncludeLookup<'_>,
    ) -> Result<naga::Module, ComposeError> {
        let resolved = self.resolve_includes(source, lookup)?;
        let options = naga::front::glsl::Options {
            stage: stage.naga(),
            defines: Self::build_defines(stage, defines),
        };
        naga::front::glsl::Frontend::default()
            .parse(&options, &resolved)
            .map_err(|errors| ComposeError::Parse(errors.emit_to_string(&resolved)))
    }

    /// [`compose_to_naga`](Self::compose_to_naga), then validate and write WGSL
    pub fn compose(
        &self,
        source: &str,
        stage: ShaderStage,
        defines: &ShaderDefines,
        lookup: IncludeLookup<'_>,
    ) -> Result<ComposedStage, ComposeError> {
        let module = self.compose_to_naga(source, stage, defines, lookup)?;
        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| ComposeError::Validation(e.to_string()))?;
        let wgsl = naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
            .map_err(|e| ComposeError::Output(e.to_string()))?;
        Ok(ComposedStage { module, wgsl })
    }
}

/// `#include "path"` or `#include <path>`
fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include")?.trim();
    if let Some(inner) = rest.strip_prefix('"') {
        inner.strip_suffix('"')
    } else {
        rest.strip_prefix('<')?.strip_suffix('>')
    }
}
