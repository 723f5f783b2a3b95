//! Scene geometry on the device.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::backend::{Access, BufferDesc, BufferHandle};
use crate::geometry::{build_bvh, Bvh, GpuBvhNode, GpuTriangle, Triangle};
use crate::kernel::{EngineParams, KernelObject, Query, QueryValue, SlotCursor, Teardown};
use crate::scene::{self, ids};
use crate::util::{Aabb, Error, Result};

/// Device layout of the scene info block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SceneInfo {
    pub triangle_count: u32,
    pub node_count: u32,
    pub _pad: [u32; 2],
}

/// Triangles in BVH order, the flattened BVH, and a scene info block.
pub struct Geometry {
    params: Arc<EngineParams>,
    triangles: BufferHandle,
    nodes: BufferHandle,
    info: BufferHandle,
    triangle_count: usize,
    leaf_count: usize,
    node_count: usize,
    bounds: Aabb,
}

impl Geometry {
    pub const NAME: &'static str = "Geometry";

    /// Load the `geometry` scene resource and upload it.
    pub fn new(params: &Arc<EngineParams>) -> Result<Self> {
        tracing::debug!("initializing <{}>", Self::NAME);
        let reader = params.scene.open(ids::GEOMETRY)?;
        let triangles = scene::read_geometry(reader)?;
        Self::from_triangles(params, triangles)
    }

    /// Build the hierarchy over `triangles` and upload both.
    pub fn from_triangles(params: &Arc<EngineParams>, mut triangles: Vec<Triangle>) -> Result<Self> {
        if triangles.is_empty() {
            return Err(Error::invalid_scene("scene has no triangles"));
        }

        let bvh: Bvh = build_bvh(&mut triangles, params.config.leaf_size);
        tracing::info!(
            triangles = triangles.len(),
            nodes = bvh.node_count,
            leaves = bvh.leaf_count,
            "scene hierarchy built"
        );

        let gpu_triangles: Vec<GpuTriangle> = triangles.iter().map(Triangle::to_gpu).collect();
        let gpu_nodes: Vec<GpuBvhNode> = bvh.to_gpu();
        let info = SceneInfo {
            triangle_count: triangles.len() as u32,
            node_count: bvh.node_count as u32,
            _pad: [0; 2],
        };

        let backend = &params.backend;
        let tri_bytes: &[u8] = bytemuck::cast_slice(&gpu_triangles);
        let triangles_buf = backend.create_buffer(
            &BufferDesc::storage("triangles", tri_bytes.len() as u64, Access::ReadOnly),
            Some(tri_bytes),
        )?;

        let node_bytes: &[u8] = bytemuck::cast_slice(&gpu_nodes);
        let nodes_buf = match backend.create_buffer(
            &BufferDesc::storage("nodes", node_bytes.len() as u64, Access::ReadOnly),
            Some(node_bytes),
        ) {
            Ok(b) => b,
            Err(e) => {
                backend.release(triangles_buf.into());
                return Err(e);
            }
        };

        let info_buf = match backend.create_buffer(
            &BufferDesc::uniform("scene_info", std::mem::size_of::<SceneInfo>() as u64),
            Some(bytemuck::bytes_of(&info)),
        ) {
            Ok(b) => b,
            Err(e) => {
                backend.release(triangles_buf.into());
                backend.release(nodes_buf.into());
                return Err(e);
            }
        };

        Ok(Self {
            params: Arc::clone(params),
            triangles: triangles_buf,
            nodes: nodes_buf,
            info: info_buf,
            triangle_count: triangles.len(),
            leaf_count: bvh.leaf_count,
            node_count: bvh.node_count,
            bounds: bvh.root().bbox,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Bounds of the whole scene.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }
}

impl KernelObject for Geometry {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, cursor: &mut SlotCursor<'_>) -> Result<()> {
        cursor.bind(Self::NAME, "triangles", self.triangles)?;
        cursor.bind(Self::NAME, "nodes", self.nodes)?;
        cursor.bind(Self::NAME, "scene_info", self.info)?;
        Ok(())
    }

    fn query(&self, query: Query) -> Option<QueryValue> {
        match query {
            Query::TriangleCount => Some(QueryValue::Count(self.triangle_count as u64)),
            _ => None,
        }
    }

    fn teardown(&mut self, _mode: Teardown) -> Result<()> {
        let backend = &self.params.backend;
        backend.release(self.triangles.into());
        backend.release(self.nodes.into());
        backend.release(self.info.into());
        Ok(())
    }
}
