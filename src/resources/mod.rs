//! Model-side resources
//!
//! Materials, the animated-model interface, the texture cache and the GPU
//! mirror of an animated mesh.

mod gpu_mesh;
mod material;
mod mesh;
mod texture;

pub use gpu_mesh::*;
pub use material::*;
pub use mesh::*;
pub use texture::*;
