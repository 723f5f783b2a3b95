//! Scene geometry: triangles and the bounding volume hierarchy over them.

mod bvh;
mod triangle;

pub use bvh::{build_bvh, Bvh, FlatNode, GpuBvhNode, Primitive};
pub use triangle::{GpuTriangle, Triangle};
