//! Camera, light and model transforms

mod camera;
mod light;
mod transform;

pub use camera::*;
pub use light::*;
pub use transform::*;
