// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Query geometry modes and shape predicates.
//!
//! A query shape is any [`TreeShape`]: spheres, cylinders, boxes, or indexed
//! entities. The query shape itself is always treated exactly; the mode only
//! selects how the indexed entities are tested against it.

use arbor_geometry::{
    Box3D, CoordType, Cylinder, GeometryEntry, GeometryRef, MorphoEntry, Point3D, Sphere,
    TreeShape, geometries_intersect,
};

/// How indexed entities are tested against a query shape.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum GeometryMode {
    /// Test the query shape against each entity's bounding box. Cheapest.
    #[default]
    BoundingBox,
    /// Use the exact predicate where the shape pair has one, the bounding
    /// box otherwise.
    BestEffort,
}

/// Exact test of the query shape against an axis-aligned box.
///
/// Falls back to the shape's own bounding box for shapes without an exact
/// box predicate (capped cylinders).
pub fn shape_overlaps_box<Q: TreeShape>(shape: &Q, bbox: &Box3D) -> bool {
    geometries_intersect(shape.geometry(), GeometryRef::Box(bbox))
        .unwrap_or_else(|| shape.bounding_box().intersects(bbox))
}

/// Whether `entry` is selected by `shape` under the given mode.
pub fn shape_matches<Q: TreeShape, T: TreeShape>(shape: &Q, entry: &T, mode: GeometryMode) -> bool {
    match mode {
        GeometryMode::BoundingBox => shape_overlaps_box(shape, &entry.bounding_box()),
        GeometryMode::BestEffort => {
            match geometries_intersect(shape.geometry(), entry.geometry()) {
                Some(hit) => hit,
                None => shape_overlaps_box(shape, &entry.bounding_box()),
            }
        }
    }
}

/// Shapes the placement sweep knows how to move along the x axis.
pub trait Placeable: TreeShape {
    /// A copy of the shape moved so its centroid is `centroid`.
    fn translated_to(&self, centroid: Point3D) -> Self;
    /// Sweep increment: the diameter for spheres, the x extent of the
    /// bounding box otherwise.
    fn sweep_step(&self) -> CoordType;
}

impl Placeable for Sphere {
    fn translated_to(&self, centroid: Point3D) -> Self {
        Self {
            centroid,
            radius: self.radius,
        }
    }
    fn sweep_step(&self) -> CoordType {
        2.0 * self.radius
    }
}

impl Placeable for Cylinder {
    fn translated_to(&self, centroid: Point3D) -> Self {
        let shift = centroid - self.centroid();
        Self {
            p1: self.p1 + shift,
            p2: self.p2 + shift,
            radius: self.radius,
        }
    }
    fn sweep_step(&self) -> CoordType {
        let bbox = self.bounding_box();
        bbox.max.x - bbox.min.x
    }
}

impl Placeable for GeometryEntry {
    fn translated_to(&self, centroid: Point3D) -> Self {
        match self {
            Self::Sphere(s) => Self::Sphere(s.translated_to(centroid)),
            Self::Cylinder(c) => Self::Cylinder(c.translated_to(centroid)),
        }
    }
    fn sweep_step(&self) -> CoordType {
        match self {
            Self::Sphere(s) => s.sweep_step(),
            Self::Cylinder(c) => c.sweep_step(),
        }
    }
}

impl Placeable for MorphoEntry {
    fn translated_to(&self, centroid: Point3D) -> Self {
        match self {
            Self::Soma(s) => Self::Soma(arbor_geometry::Soma {
                id: s.id,
                sphere: s.sphere.translated_to(centroid),
            }),
            Self::Segment(s) => Self::Segment(arbor_geometry::Segment {
                id: s.id,
                cylinder: s.cylinder.translated_to(centroid),
            }),
        }
    }
    fn sweep_step(&self) -> CoordType {
        match self {
            Self::Soma(s) => s.sphere.sweep_step(),
            Self::Segment(s) => s.cylinder.sweep_step(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_geometry::Point3D;

    #[test]
    fn sphere_query_against_box_is_exact() {
        let q = Sphere::new(Point3D::new(3.0, 3.0, 0.0), 1.0).unwrap();
        let bbox = Box3D::new(Point3D::new(0.0, 0.0, -1.0), Point3D::new(2.0, 2.0, 1.0)).unwrap();
        // Their bounding boxes touch at the corner but the sphere stays
        // sqrt(2) away from it.
        assert!(q.bounding_box().intersects(&bbox));
        assert!(!shape_overlaps_box(&q, &bbox));
    }

    #[test]
    fn best_effort_falls_back_without_exact_predicate() {
        let q = Cylinder::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(4.0, 0.0, 0.0), 1.0)
            .unwrap();
        let target = Box3D::new(Point3D::new(1.0, 1.0, 1.0), Point3D::new(2.0, 2.0, 2.0)).unwrap();
        assert_eq!(
            shape_matches(&q, &target, GeometryMode::BestEffort),
            shape_overlaps_box(&q, &target.bounding_box())
        );
    }

    #[test]
    fn translation_moves_both_cylinder_endpoints() {
        let c = Cylinder::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(2.0, 0.0, 0.0), 0.5)
            .unwrap();
        let moved = c.translated_to(Point3D::new(5.0, 1.0, 0.0));
        assert_eq!(moved.p1, Point3D::new(4.0, 1.0, 0.0));
        assert_eq!(moved.p2, Point3D::new(6.0, 1.0, 0.0));
        assert_eq!(moved.sweep_step(), 3.0);
    }
}
