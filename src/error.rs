//! Crate-level error type

use thiserror::Error;

use crate::backend::BackendError;
use crate::shader::ShaderFamily;

/// Errors surfaced by setup and per-frame rendering operations
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Failed to compile {family} shader: {message}")]
    ShaderCompilationFailed { family: ShaderFamily, message: String },
    #[error("Shader source not found: {0}")]
    ShaderSourceNotFound(String),
    #[error("{family} shader has no input or binding named `{name}`")]
    MissingShaderInput { family: ShaderFamily, name: String },
    #[error("Unsupported index width: {0} bytes")]
    UnsupportedIndexWidth(usize),
    #[error("Vertex count changed from {expected} to {actual}; recreate the mesh resource")]
    VertexCountMismatch { expected: usize, actual: usize },
    #[error("Failed to load texture {path}: {message}")]
    TextureLoadFailed { path: String, message: String },
    #[error("Submesh {index} covers indices {begin}..{end} but the mesh has {index_count}")]
    InvalidSubMesh {
        index: usize,
        begin: u32,
        end: u64,
        index_count: usize,
    },
    #[error("Submesh {index} uses material {material} but the mesh has {material_count}")]
    InvalidMaterialIndex {
        index: usize,
        material: usize,
        material_count: usize,
    },
    #[error("Invalid shader variant index {0}")]
    InvalidVariant(usize),
}

pub type RenderResult<T> = Result<T, RenderError>;
