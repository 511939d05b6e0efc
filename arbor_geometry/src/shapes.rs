// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spheres and capped cylinders with exact intersection predicates.
//!
//! Intersection tests treat a [`Cylinder`] as a capsule on its lateral
//! surface and as a flat disk at the caps; [`Cylinder::contains`] uses the
//! flat-capped reading throughout. All predicates are reflection symmetric
//! and total: degenerate inputs resolve to a deterministic answer instead of
//! an error.

use crate::{Box3D, CoordType, EPSILON, GeometryError, Point3D, Vector3D, point_max, point_min};

/// A sphere. Somas and synapse points are spheres; synapses have radius 0.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sphere {
    /// Center of the sphere.
    pub centroid: Point3D,
    /// Radius, non-negative.
    pub radius: CoordType,
}

/// A capped cylinder between two endpoints.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Cylinder {
    /// First endpoint of the axis.
    pub p1: Point3D,
    /// Second endpoint of the axis.
    pub p2: Point3D,
    /// Radius, non-negative.
    pub radius: CoordType,
}

impl Sphere {
    /// Create a sphere. Fails on a negative radius.
    pub fn new(centroid: Point3D, radius: CoordType) -> Result<Self, GeometryError> {
        if radius < 0.0 {
            return Err(GeometryError::InvalidGeometry("negative sphere radius"));
        }
        Ok(Self { centroid, radius })
    }

    /// A zero-radius sphere, used for point queries.
    pub fn point(p: Point3D) -> Self {
        Self {
            centroid: p,
            radius: 0.0,
        }
    }

    /// The tight axis-aligned bounding box.
    pub fn bounding_box(&self) -> Box3D {
        Box3D {
            min: Point3D::new(
                self.centroid.x - self.radius,
                self.centroid.y - self.radius,
                self.centroid.z - self.radius,
            ),
            max: Point3D::new(
                self.centroid.x + self.radius,
                self.centroid.y + self.radius,
                self.centroid.z + self.radius,
            ),
        }
    }

    /// Whether the point lies inside or on the sphere.
    pub fn contains(&self, p: &Point3D) -> bool {
        (p - self.centroid).norm_squared() <= self.radius * self.radius
    }

    /// Exact sphere-sphere overlap.
    pub fn intersects_sphere(&self, other: &Sphere) -> bool {
        let max_distance = self.radius + other.radius;
        (self.centroid - other.centroid).norm_squared() <= max_distance * max_distance
    }

    /// Exact sphere-box overlap; the box is treated as a solid.
    pub fn intersects_box(&self, bbox: &Box3D) -> bool {
        bbox.distance_sq_to_point(&self.centroid) <= self.radius * self.radius
    }

    /// Sphere against capped cylinder.
    ///
    /// On the lateral surface the cylinder acts as a capsule (distance to the
    /// axis against the sum of radii). Past an endpoint, the closest point on
    /// the cap disk is found by projecting the center onto the diameter
    /// segment that points at it; a sphere centered on the axis itself would
    /// make that direction vanish, so within 100 machine epsilons of the axis
    /// the cap center is used directly.
    pub fn intersects_cylinder(&self, c: &Cylinder) -> bool {
        let u = self.centroid - c.p1;
        let v = c.p2 - c.p1;

        let v_dot_u = v.dot(&u);
        let v_dot_v = v.norm_squared();

        let max_distance = self.radius + c.radius;
        let max_distance_sq = max_distance * max_distance;

        if 0.0 <= v_dot_u && v_dot_u <= v_dot_v {
            // Between the caps the cylinder can be treated as infinitely
            // long: compare the distance to the axis with the radius sum.
            let dist_sq = u.norm_squared() - v_dot_u * v_dot_u / v_dot_v;
            return dist_sq <= max_distance_sq;
        }

        let closer_cap = if v_dot_u < 0.0 { c.p1 } else { c.p2 };

        if (self.centroid - closer_cap).norm_squared() > max_distance_sq {
            return false;
        }

        // Project the center onto the cap disk: first the foot point on the
        // axis, then the diameter segment across the cap that points at the
        // center.
        let foot = c.p1 + v * (v_dot_u / v_dot_v);
        let d = self.centroid - foot;
        let d_norm = d.norm();

        let closest_on_cap = if d_norm < 100.0 * CoordType::EPSILON {
            closer_cap
        } else {
            project_point_onto_segment(
                &(closer_cap - d * (c.radius / d_norm)),
                &(d * (2.0 * c.radius / d_norm)),
                &self.centroid,
            )
        };

        (self.centroid - closest_on_cap).norm_squared() <= self.radius * self.radius
    }
}

impl Cylinder {
    /// Create a cylinder. Fails on a negative radius.
    pub fn new(p1: Point3D, p2: Point3D, radius: CoordType) -> Result<Self, GeometryError> {
        if radius < 0.0 {
            return Err(GeometryError::InvalidGeometry("negative cylinder radius"));
        }
        Ok(Self { p1, p2, radius })
    }

    /// Midpoint of the axis.
    pub fn centroid(&self) -> Point3D {
        Point3D::from((self.p1.coords + self.p2.coords) * 0.5)
    }

    /// The tight axis-aligned bounding box of the capsule.
    pub fn bounding_box(&self) -> Box3D {
        Box3D {
            min: point_min(&self.p1, &self.p2),
            max: point_max(&self.p1, &self.p2),
        }
        .padded(self.radius)
    }

    /// Whether the point lies inside the flat-capped cylinder.
    pub fn contains(&self, p: &Point3D) -> bool {
        let axis = self.p2 - self.p1;
        let rel = p - self.p1;
        let dot = rel.dot(&axis);
        let axis_len_sq = axis.norm_squared();

        // Past either cap plane?
        if dot < 0.0 || dot > axis_len_sq {
            return false;
        }
        // Distance to the axis via Pythagoras on the projection triangle.
        let dist_sq = rel.norm_squared() - dot * dot / axis_len_sq;
        dist_sq <= self.radius * self.radius
    }

    /// Capsule-capsule overlap: closest distance between the two axis
    /// segments against the sum of radii.
    pub fn intersects_cylinder(&self, other: &Cylinder) -> bool {
        let min_dist = segment_segment_distance(&self.p1, &self.p2, &other.p1, &other.p2);
        min_dist <= self.radius + other.radius
    }

    /// Mirror of [`Sphere::intersects_cylinder`].
    pub fn intersects_sphere(&self, s: &Sphere) -> bool {
        s.intersects_cylinder(self)
    }
}

/// Project `x` onto the segment from `base` to `base + dir`.
fn project_point_onto_segment(base: &Point3D, dir: &Vector3D, x: &Point3D) -> Point3D {
    let dir_dot_dir = dir.norm_squared();
    let x_dot_dir = (x - base).dot(dir);
    let t = (x_dot_dir / dir_dot_dir).clamp(0.0, 1.0);
    base + dir * t
}

/// Minimum distance between the segments `[a0, a1]` and `[b0, b1]`.
///
/// Lumelsky's algorithm. Near-parallel segments (discriminant below
/// [`EPSILON`]) pin `s = 0` to avoid a division by a vanishing denominator;
/// both parameters stay clamped to their segments throughout.
pub fn segment_segment_distance(a0: &Point3D, a1: &Point3D, b0: &Point3D, b1: &Point3D) -> CoordType {
    let u = a1 - a0;
    let v = b1 - b0;
    let w = a0 - b0;
    let a = u.dot(&u);
    let b = u.dot(&v);
    let c = v.dot(&v);
    let d = u.dot(&w);
    let e = v.dot(&w);
    let big_d = a * c - b * b;

    let mut s_n;
    let mut s_d = big_d;
    let mut t_n;
    let mut t_d = big_d;

    if big_d < EPSILON {
        // Almost parallel: force the a0 end of the first segment.
        s_n = 0.0;
        s_d = 1.0;
        t_n = e;
        t_d = c;
    } else {
        s_n = b * e - c * d;
        t_n = a * e - b * d;
        if s_n < 0.0 {
            s_n = 0.0;
            t_n = e;
            t_d = c;
        } else if s_n > s_d {
            s_n = s_d;
            t_n = e + b;
            t_d = c;
        }
    }

    if t_n < 0.0 {
        t_n = 0.0;
        if -d < 0.0 {
            s_n = 0.0;
        } else if -d > a {
            s_n = s_d;
        } else {
            s_n = -d;
            s_d = a;
        }
    } else if t_n > t_d {
        t_n = t_d;
        if (-d + b) < 0.0 {
            s_n = 0.0;
        } else if (-d + b) > a {
            s_n = s_d;
        } else {
            s_n = -d + b;
            s_d = a;
        }
    }

    let sc = if s_n.abs() < EPSILON { 0.0 } else { s_n / s_d };
    let tc = if t_n.abs() < EPSILON { 0.0 } else { t_n / t_d };

    let dp = w + u * sc - v * tc;
    dp.norm()
}
