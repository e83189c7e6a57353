//! Backend abstraction layer
//!
//! Provides the common trait and types implemented by the wgpu backend and,
//! with the `dummy` feature, by a recording backend that needs no GPU.

pub mod traits;
pub mod types;
pub mod wgpu_backend;

#[cfg(feature = "dummy")]
pub mod dummy;

pub use traits::*;
pub use types::*;
