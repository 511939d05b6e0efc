// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Axis-aligned bounding boxes in 3D.

use crate::{CoordType, GeometryError, Point3D, point_max, point_min};

/// Axis-aligned box given by its minimum and maximum corners.
///
/// `min <= max` holds componentwise for every constructed box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Box3D {
    /// Minimum corner.
    pub min: Point3D,
    /// Maximum corner.
    pub max: Point3D,
}

impl Box3D {
    /// Create a box from its corners. Fails if the box is inverted on any
    /// axis.
    pub fn new(min: Point3D, max: Point3D) -> Result<Self, GeometryError> {
        if min.x > max.x || min.y > max.y || min.z > max.z {
            return Err(GeometryError::InvalidGeometry("inverted box"));
        }
        Ok(Self { min, max })
    }

    /// The box spanned by two arbitrary corner points.
    pub fn spanning(a: &Point3D, b: &Point3D) -> Self {
        Self {
            min: point_min(a, b),
            max: point_max(a, b),
        }
    }

    /// A degenerate box containing a single point.
    pub fn at_point(p: Point3D) -> Self {
        Self { min: p, max: p }
    }

    /// The smallest box containing both operands.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: point_min(&self.min, &other.min),
            max: point_max(&self.max, &other.max),
        }
    }

    /// Grow the box by `pad` on every side.
    pub fn padded(&self, pad: CoordType) -> Self {
        Self {
            min: Point3D::new(self.min.x - pad, self.min.y - pad, self.min.z - pad),
            max: Point3D::new(self.max.x + pad, self.max.y + pad, self.max.z + pad),
        }
    }

    /// Geometric center of the box.
    pub fn center(&self) -> Point3D {
        Point3D::from((self.min.coords + self.max.coords) * 0.5)
    }

    /// Whether the point lies inside or on the boundary.
    pub fn contains_point(&self, p: &Point3D) -> bool {
        self.min.x <= p.x
            && p.x <= self.max.x
            && self.min.y <= p.y
            && p.y <= self.max.y
            && self.min.z <= p.z
            && p.z <= self.max.z
    }

    /// Whether the point lies strictly inside the box.
    pub fn strictly_contains_point(&self, p: &Point3D) -> bool {
        self.min.x < p.x
            && p.x < self.max.x
            && self.min.y < p.y
            && p.y < self.max.y
            && self.min.z < p.z
            && p.z < self.max.z
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &Self) -> bool {
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    /// Standard AABB overlap. Boxes sharing only a face, edge or corner
    /// still count as intersecting.
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }

    /// Squared distance from a point to the box, zero if inside.
    pub fn distance_sq_to_point(&self, p: &Point3D) -> CoordType {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        dx * dx + dy * dy + dz * dz
    }

    /// Squared distance between two boxes, zero if they overlap.
    pub fn distance_sq_to_box(&self, other: &Self) -> CoordType {
        let axis = |amin: CoordType, amax: CoordType, bmin: CoordType, bmax: CoordType| {
            (bmin - amax).max(0.0).max(amin - bmax)
        };
        let dx = axis(self.min.x, self.max.x, other.min.x, other.max.x);
        let dy = axis(self.min.y, self.max.y, other.min.y, other.max.y);
        let dz = axis(self.min.z, self.max.z, other.min.z, other.max.z);
        dx * dx + dy * dy + dz * dz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_box_is_rejected() {
        let r = Box3D::new(Point3D::new(1.0, 0.0, 0.0), Point3D::new(0.0, 1.0, 1.0));
        assert_eq!(r, Err(GeometryError::InvalidGeometry("inverted box")));
    }

    #[test]
    fn spanning_reorders_corners() {
        let b = Box3D::spanning(&Point3D::new(2.0, -1.0, 3.0), &Point3D::new(0.0, 1.0, 1.0));
        assert_eq!(b.min, Point3D::new(0.0, -1.0, 1.0));
        assert_eq!(b.max, Point3D::new(2.0, 1.0, 3.0));
    }

    #[test]
    fn overlap_is_closed_on_boundaries() {
        let a = Box3D::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(1.0, 1.0, 1.0)).unwrap();
        let b = Box3D::new(Point3D::new(1.0, 0.0, 0.0), Point3D::new(2.0, 1.0, 1.0)).unwrap();
        let c = Box3D::new(Point3D::new(1.1, 0.0, 0.0), Point3D::new(2.0, 1.0, 1.0)).unwrap();
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn strict_containment_excludes_faces() {
        let b = Box3D::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(2.0, 2.0, 2.0)).unwrap();
        assert!(b.contains_point(&Point3D::new(2.0, 1.0, 1.0)));
        assert!(!b.strictly_contains_point(&Point3D::new(2.0, 1.0, 1.0)));
        assert!(b.strictly_contains_point(&Point3D::new(1.0, 1.0, 1.0)));
    }

    #[test]
    fn point_distance_is_zero_inside() {
        let b = Box3D::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(2.0, 2.0, 2.0)).unwrap();
        assert_eq!(b.distance_sq_to_point(&Point3D::new(1.0, 1.0, 1.0)), 0.0);
        assert_eq!(b.distance_sq_to_point(&Point3D::new(3.0, 1.0, 1.0)), 1.0);
        assert_eq!(b.distance_sq_to_point(&Point3D::new(3.0, 3.0, 1.0)), 2.0);
    }

    #[test]
    fn box_distance_matches_gap() {
        let a = Box3D::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(1.0, 1.0, 1.0)).unwrap();
        let b = Box3D::new(Point3D::new(3.0, 0.0, 0.0), Point3D::new(4.0, 1.0, 1.0)).unwrap();
        assert_eq!(a.distance_sq_to_box(&b), 4.0);
        assert_eq!(a.distance_sq_to_box(&a), 0.0);
    }
}
