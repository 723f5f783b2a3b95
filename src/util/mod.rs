//! Utility types shared across the renderer.
//!
//! - [`Aabb`] and `glam` vector re-exports
//! - [`Error`] / [`Result`] - Error handling

mod error;
mod math;

pub use error::*;
pub use math::*;
