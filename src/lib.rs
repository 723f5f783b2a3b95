//! # Epsilon
//!
//! Host-side core of a spectral path tracer that runs on a compute device.
//!
//! The crate turns scene triangles into a flat bounding volume hierarchy,
//! binds it together with the other device resources of a render to one
//! compute entry point, and drives a fixed number of accumulation passes.
//!
//! ## Modules
//!
//! - [`util`] - Math types (AABB, vectors) and errors
//! - [`geometry`] - Triangles and BVH construction
//! - [`backend`] - Compute device abstraction (host and wgpu backends)
//! - [`kernel`] - Kernel object protocol: bind, update, query, teardown
//! - [`objects`] - Built-in kernel objects (pixel buffer, camera, ...)
//! - [`scene`] - Scene resource sources and the geometry record format
//! - [`engine`] - Configuration, renderer and pass loop
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use epsilon::backend::WgpuBackend;
//! use epsilon::engine::{run, RenderConfig, Renderer, TracingSink};
//!
//! let config = RenderConfig::load("render.json")?;
//! let backend = Arc::new(WgpuBackend::new(config.device)?);
//! let renderer = Renderer::new(config, backend)?;
//! run(renderer, &mut TracingSink)?;
//! ```

pub mod util;
pub mod geometry;
pub mod backend;
pub mod kernel;
pub mod objects;
pub mod scene;
pub mod engine;

// Re-export commonly used types
pub use util::{Aabb, Error, Result};
pub use geometry::{build_bvh, Bvh, Triangle};
pub use engine::{RenderConfig, Renderer, Statistics};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Aabb, Error, Result, Vec3};
    pub use crate::geometry::{build_bvh, Bvh, FlatNode, Primitive, Triangle};
    pub use crate::backend::{ComputeBackend, HostBackend};
    pub use crate::kernel::{EngineParams, KernelObject, Query, QueryValue, SlotCursor, Teardown};
    pub use crate::engine::{run, ProgressSink, RenderConfig, Renderer, Statistics};
}
