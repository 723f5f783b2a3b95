//! Triangle primitive and its device-side layout.
//!
//! The host triangle carries everything BVH construction needs (bounding box,
//! centroid); the device triangle only carries what intersection and shading
//! need (origin vertex, two edges, normal, material).

use bytemuck::{Pod, Zeroable};

use crate::util::{Aabb, Vec3};

use super::bvh::Primitive;

/// Triangle with derived data precomputed at construction.
///
/// Vertices and derived fields are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    p1: Vec3,
    p2: Vec3,
    p3: Vec3,
    edge1: Vec3,
    edge2: Vec3,
    normal: Vec3,
    bbox: Aabb,
    centroid: Vec3,
    material: u32,
}

impl Triangle {
    /// Create a triangle from three vertices and a material index.
    pub fn new(p1: Vec3, p2: Vec3, p3: Vec3, material: u32) -> Self {
        let edge1 = p2 - p1;
        let edge2 = p3 - p1;

        // Unsigned normal; degenerate triangles get a zero normal.
        let normal = edge1.cross(edge2).normalize_or_zero();

        let mut bbox = Aabb::from_point(p1);
        bbox.expand_to_include_point(p2);
        bbox.expand_to_include_point(p3);

        Self {
            p1,
            p2,
            p3,
            edge1,
            edge2,
            normal,
            bbox,
            centroid: (p1 + p2 + p3) / 3.0,
            material,
        }
    }

    #[inline]
    pub fn vertices(&self) -> [Vec3; 3] {
        [self.p1, self.p2, self.p3]
    }

    #[inline]
    pub fn edges(&self) -> (Vec3, Vec3) {
        (self.edge1, self.edge2)
    }

    #[inline]
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    #[inline]
    pub fn material(&self) -> u32 {
        self.material
    }

    /// Convert to the packed device layout.
    pub fn to_gpu(&self) -> GpuTriangle {
        GpuTriangle {
            p: self.p1.extend(0.0).to_array(),
            x: self.edge1.extend(0.0).to_array(),
            y: self.edge2.extend(0.0).to_array(),
            n: self.normal.extend(0.0).to_array(),
            material: self.material,
            _pad: [0; 3],
        }
    }
}

impl Primitive for Triangle {
    #[inline]
    fn bounding_box(&self) -> Aabb {
        self.bbox
    }

    #[inline]
    fn centroid(&self) -> Vec3 {
        self.centroid
    }
}

/// Device triangle (80 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuTriangle {
    /// First vertex.
    pub p: [f32; 4],
    /// Edge `p2 - p1`.
    pub x: [f32; 4],
    /// Edge `p3 - p1`.
    pub y: [f32; 4],
    /// Unit normal.
    pub n: [f32; 4],
    pub material: u32,
    pub _pad: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_fields() {
        let t = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 3.0, 0.0),
            7,
        );
        assert_eq!(t.edges(), (Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 3.0, 0.0)));
        assert_eq!(t.normal(), Vec3::Z);
        assert_eq!(t.bounding_box(), Aabb::new(Vec3::ZERO, Vec3::new(2.0, 3.0, 0.0)));
        assert!((t.centroid() - Vec3::new(2.0 / 3.0, 1.0, 0.0)).length() < 1e-6);
        assert_eq!(t.material(), 7);
    }

    #[test]
    fn test_degenerate_normal_is_zero() {
        let t = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::X * 2.0, 0);
        assert_eq!(t.normal(), Vec3::ZERO);
    }

    #[test]
    fn test_gpu_layout() {
        assert_eq!(std::mem::size_of::<GpuTriangle>(), 80);

        let t = Triangle::new(Vec3::ONE, Vec3::new(2.0, 1.0, 1.0), Vec3::new(1.0, 2.0, 1.0), 3);
        let g = t.to_gpu();
        assert_eq!(g.p, [1.0, 1.0, 1.0, 0.0]);
        assert_eq!(g.x, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(g.y, [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(g.material, 3);
    }
}
