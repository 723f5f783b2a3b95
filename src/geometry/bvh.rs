//! Median-split BVH builder producing a flat, pre-order node array.
//!
//! Node layout in the output array:
//! - node 0 is the root
//! - an internal node's left child sits at `i + 1`
//! - its right child sits at `i + right_offset`
//! - `right_offset == 0` marks a leaf
//!
//! The array is self-sufficient for traversal; leaves reference primitives
//! by position in the primitive slice as it was reordered by the build.

use bytemuck::{Pod, Zeroable};

use crate::util::{Aabb, Vec3};

/// Anything the builder can partition: it only needs a box and a centroid.
pub trait Primitive {
    fn bounding_box(&self) -> Aabb;
    fn centroid(&self) -> Vec3;
}

/// Flattened BVH node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatNode {
    pub bbox: Aabb,
    /// First primitive covered by this node.
    pub start: u32,
    /// Number of primitives covered by this node.
    pub n_prims: u32,
    /// Distance to the right child, or 0 for a leaf.
    pub right_offset: u32,
}

impl FlatNode {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.right_offset == 0
    }

    /// Primitive index range covered by this node.
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.n_prims) as usize
    }

    /// Convert to the packed device layout.
    pub fn to_gpu(&self) -> GpuBvhNode {
        GpuBvhNode {
            bbox_min: self.bbox.min.extend(0.0).to_array(),
            bbox_max: self.bbox.max.extend(0.0).to_array(),
            data: [self.start, self.n_prims, self.right_offset, 0],
        }
    }
}

/// Device BVH node (48 bytes): `data = [start, n_prims, right_offset, 0]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuBvhNode {
    pub bbox_min: [f32; 4],
    pub bbox_max: [f32; 4],
    pub data: [u32; 4],
}

/// Built BVH.
#[derive(Debug, Clone, PartialEq)]
pub struct Bvh {
    /// Flat node array in depth-first pre-order.
    pub nodes: Vec<FlatNode>,
    /// Number of leaf nodes.
    pub leaf_count: usize,
    /// Number of nodes (internal + leaf).
    pub node_count: usize,
}

impl Bvh {
    #[inline]
    pub fn root(&self) -> &FlatNode {
        &self.nodes[0]
    }

    /// Nodes in device layout, ready for upload.
    pub fn to_gpu(&self) -> Vec<GpuBvhNode> {
        self.nodes.iter().map(FlatNode::to_gpu).collect()
    }
}

/// Right-child link of a node under construction.
///
/// Internal nodes start `Pending(2)`; each child arriving consumes one touch
/// and the second (right) child resolves the offset.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Link {
    Leaf,
    Pending(u8),
    Resolved(u32),
}

struct BuildNode {
    bbox: Aabb,
    start: u32,
    n_prims: u32,
    link: Link,
}

struct BuildEntry {
    parent: Option<usize>,
    start: usize,
    end: usize,
}

/// Build a BVH over `primitives`, reordering them in place.
///
/// Nodes holding at most `leaf_size` primitives become leaves. A `leaf_size`
/// of zero subdivides down to single-primitive leaves.
///
/// # Panics
///
/// `primitives` must not be empty: no root box can be formed.
#[tracing::instrument(skip_all, fields(prim_count = primitives.len(), leaf_size = leaf_size))]
pub fn build_bvh<P: Primitive>(primitives: &mut [P], leaf_size: usize) -> Bvh {
    assert!(!primitives.is_empty(), "cannot build a BVH over zero primitives");

    // A node cannot be split below one primitive.
    let leaf_size = leaf_size.max(1);

    let mut build_nodes: Vec<BuildNode> = Vec::with_capacity(primitives.len() * 2);
    let mut leaf_count = 0usize;
    let mut stack = vec![BuildEntry {
        parent: None,
        start: 0,
        end: primitives.len(),
    }];

    while let Some(entry) = stack.pop() {
        let BuildEntry { parent, start, end } = entry;
        let n_prims = end - start;

        // Geometric bounds for the node, centroid bounds for the split.
        let mut bbox = primitives[start].bounding_box();
        let mut centroid_bounds = Aabb::from_point(primitives[start].centroid());
        for prim in &primitives[start + 1..end] {
            bbox.expand_to_include(&prim.bounding_box());
            centroid_bounds.expand_to_include_point(prim.centroid());
        }

        let is_leaf = n_prims <= leaf_size;
        if is_leaf {
            leaf_count += 1;
        }

        let index = build_nodes.len();
        build_nodes.push(BuildNode {
            bbox,
            start: start as u32,
            n_prims: n_prims as u32,
            link: if is_leaf { Link::Leaf } else { Link::Pending(2) },
        });

        // Child touches parent; the second touch is the right child.
        if let Some(parent) = parent {
            let link = &mut build_nodes[parent].link;
            *link = match *link {
                Link::Pending(2) => Link::Pending(1),
                Link::Pending(1) => Link::Resolved((index - parent) as u32),
                other => unreachable!("node {parent} touched in state {other:?}"),
            };
        }

        if is_leaf {
            continue;
        }

        let axis = centroid_bounds.split_axis();
        let split_coord = 0.5 * (centroid_bounds.min[axis] + centroid_bounds.max[axis]);

        let mut mid = start;
        for i in start..end {
            if primitives[i].centroid()[axis] < split_coord {
                primitives.swap(i, mid);
                mid += 1;
            }
        }

        // Bad split: everything landed on one side, cut the range in half.
        if mid == start || mid == end {
            mid = start + (end - start) / 2;
        }

        // Right first so the left child pops next and lands at index + 1.
        stack.push(BuildEntry {
            parent: Some(index),
            start: mid,
            end,
        });
        stack.push(BuildEntry {
            parent: Some(index),
            start,
            end: mid,
        });
    }

    let nodes: Vec<FlatNode> = build_nodes
        .iter()
        .enumerate()
        .map(|(i, n)| FlatNode {
            bbox: n.bbox,
            start: n.start,
            n_prims: n.n_prims,
            right_offset: match n.link {
                Link::Leaf => 0,
                Link::Resolved(offset) => offset,
                Link::Pending(_) => unreachable!("internal node {i} never received its right child"),
            },
        })
        .collect();

    tracing::debug!(nodes = nodes.len(), leaves = leaf_count, "BVH built");

    Bvh {
        node_count: nodes.len(),
        leaf_count,
        nodes,
    }
}
