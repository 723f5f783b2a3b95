//! Math type re-exports and renderer-specific math utilities.
//!
//! This module re-exports the `glam` types used throughout the crate and
//! provides the axis-aligned bounding box used by BVH construction.

pub use glam::{Vec3, Vec4};

use std::fmt;

/// Axis-aligned bounding box.
///
/// A default or single-point box is degenerate (`min == max`). Expanding a
/// box never shrinks it along any axis.
#[derive(Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a bounding box from two corners.
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a degenerate bounding box containing a single point.
    #[inline]
    pub fn from_point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    /// Diagonal extent, `max - min`.
    #[inline]
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_to_include_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_to_include(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Axis along which the box is largest (0=x, 1=y, 2=z).
    ///
    /// `y` is compared against `x` first, then `z` against `y`; ties keep
    /// the lower axis.
    #[inline]
    pub fn split_axis(&self) -> usize {
        let e = self.extent();
        let mut axis = 0;
        if e.y > e.x {
            axis = 1;
        }
        if e.z > e.y {
            axis = 2;
        }
        axis
    }

    /// Whether `other` lies entirely inside this box.
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    /// Whether a point lies inside this box (boundary inclusive).
    #[inline]
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.min.cmple(p).all() && self.max.cmpge(p).all()
    }

    /// Center of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

impl fmt::Debug for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aabb({:?} - {:?})", self.min, self.max)
    }
}

/// Build an orthonormal `(normal, tangent)` pair around a view direction,
/// using world up `(0, 1, 0)` as reference.
pub fn basis(bitangent: Vec3) -> (Vec3, Vec3) {
    let tangent = bitangent.cross(Vec3::Y).normalize();
    let normal = tangent.cross(bitangent).normalize();
    (normal, tangent)
}

/// Express `v` in the basis `(tangent, normal, bitangent)`.
#[inline]
pub fn transform(v: Vec3, tangent: Vec3, normal: Vec3, bitangent: Vec3) -> Vec3 {
    tangent * v.x + normal * v.y + bitangent * v.z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_point() {
        let b = Aabb::default();
        assert_eq!(b.min, b.max);
        assert_eq!(b.extent(), Vec3::ZERO);

        let p = Aabb::from_point(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p.min, p.max);
    }

    #[test]
    fn test_expand_is_monotonic() {
        let mut b = Aabb::from_point(Vec3::ZERO);
        let samples = [
            Vec3::new(1.0, -2.0, 0.5),
            Vec3::new(-3.0, 0.0, 0.0),
            Vec3::new(0.1, 0.1, 0.1),
            Vec3::new(0.0, 7.0, -9.0),
        ];
        for p in samples {
            let before = b;
            b.expand_to_include_point(p);
            assert!(b.contains(&before));
            assert!(b.contains_point(p));
        }

        let other = Aabb::new(Vec3::splat(-20.0), Vec3::splat(-10.0));
        let before = b;
        b.expand_to_include(&other);
        assert!(b.contains(&before));
        assert!(b.contains(&other));
    }

    #[test]
    fn test_expand_inside_is_noop() {
        let mut b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        b.expand_to_include_point(Vec3::splat(0.5));
        assert_eq!(b, Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
    }

    #[test]
    fn test_split_axis() {
        let b = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 5.0, 2.0));
        assert_eq!(b.split_axis(), 1);

        let b = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 4.0));
        assert_eq!(b.split_axis(), 2);

        // All ties keep x.
        let b = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(b.split_axis(), 0);

        let b = Aabb::from_point(Vec3::ONE);
        assert_eq!(b.split_axis(), 0);
    }

    #[test]
    fn test_basis_is_orthonormal() {
        let dir = Vec3::new(0.3, -0.2, 1.0).normalize();
        let (normal, tangent) = basis(dir);
        assert!(normal.dot(tangent).abs() < 1e-5);
        assert!(normal.dot(dir).abs() < 1e-5);
        assert!(tangent.dot(dir).abs() < 1e-5);
        assert!((normal.length() - 1.0).abs() < 1e-5);

        let z = transform(Vec3::Z, tangent, normal, dir);
        assert!((z - dir).length() < 1e-5);
    }
}
