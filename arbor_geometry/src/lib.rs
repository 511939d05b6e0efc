// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arbor Geometry: primitives for indexing neural morphologies.
//!
//! This crate provides the geometric vocabulary shared by the rest of the
//! workspace:
//!
//! - [`Point3D`], [`Box3D`], [`Sphere`] and [`Cylinder`] with exact
//!   intersection and containment predicates. Cylinders are treated as
//!   capsules by the intersection tests; only [`Cylinder::contains`] uses the
//!   flat-capped reading.
//! - Packed 64-bit identifiers ([`ids::MorphPartId`]) encoding
//!   (gid, section, segment) as 36/14/14 bits.
//! - Indexed entities ([`Soma`], [`Segment`], [`Synapse`]) and the tagged
//!   unions ([`MorphoEntry`], [`GeometryEntry`]) stored by the index crates.
//!
//! Coordinates are `f32` by default; enable the `double-precision` feature to
//! switch the whole workspace (and every on-disk artifact) to `f64`.
//!
//! # Example
//!
//! ```rust
//! use arbor_geometry::{Point3D, Sphere, Cylinder};
//!
//! let soma = Sphere::new(Point3D::new(0.0, 0.0, 0.0), 2.0).unwrap();
//! let dendrite = Cylinder::new(
//!     Point3D::new(0.0, 0.0, 0.0),
//!     Point3D::new(0.0, 5.0, 0.0),
//!     1.0,
//! )
//! .unwrap();
//!
//! assert!(soma.intersects_cylinder(&dendrite));
//! assert!(dendrite.intersects_sphere(&soma));
//! ```
//!
//! The predicates never fail: degenerate configurations (parallel axes, a
//! sphere centred on a cylinder axis) resolve to deterministic boolean
//! answers through small epsilon guards.

pub mod bbox;
pub mod entities;
pub mod ids;
pub mod shapes;

use thiserror::Error;

pub use bbox::Box3D;
pub use entities::{
    EntryKind, EntryRecord, GeometryEntry, GeometryRef, GidSegm, Indexed, IndexedSphere,
    IndexedSubtreeBox, MorphoEntry, Segment, Soma, Synapse, TreeShape, geometries_intersect,
};
pub use ids::{MorphPartId, SubtreeId, SynapseId};
pub use shapes::{Cylinder, Sphere, segment_segment_distance};

/// Scalar type for every coordinate in the workspace.
#[cfg(feature = "double-precision")]
pub type CoordType = f64;
/// Scalar type for every coordinate in the workspace.
#[cfg(not(feature = "double-precision"))]
pub type CoordType = f32;

/// A point in 3D space.
pub type Point3D = nalgebra::Point3<CoordType>;
/// A displacement in 3D space.
pub type Vector3D = nalgebra::Vector3<CoordType>;

/// Error tolerance for near-parallel axis handling in the predicates.
/// This is not machine epsilon (`CoordType::EPSILON`).
pub const EPSILON: CoordType = 1e-6;

/// Errors raised when constructing geometry or packed identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// A component of a packed identifier does not fit its bit field.
    #[error("{0} is too large for its identifier field")]
    InvalidIdentifier(&'static str),
    /// A shape was constructed with a negative radius or an inverted box.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),
}

/// Componentwise minimum of two points.
#[inline]
pub fn point_min(a: &Point3D, b: &Point3D) -> Point3D {
    Point3D::from(a.coords.inf(&b.coords))
}

/// Componentwise maximum of two points.
#[inline]
pub fn point_max(a: &Point3D, b: &Point3D) -> Point3D {
    Point3D::from(a.coords.sup(&b.coords))
}

/// Approximate point equality with a relative tolerance of 1e-8 on the
/// squared distance.
#[inline]
pub fn approx_eq(a: &Point3D, b: &Point3D) -> bool {
    let dist_sq = (a - b).norm_squared();
    if dist_sq == 0.0 {
        return true;
    }
    dist_sq < a.coords.norm_squared() * 1e-8
}
