// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arbor Index: a bulk-loaded spatial index for neural morphologies.
//!
//! The central type is [`IndexTree`], a bounding-volume tree with fanout 16
//! built in one Sort-Tile-Recursion pass over the population. It answers:
//!
//! - intersection queries ([`IndexTree::find_intersecting`] and friends) in
//!   two geometry modes: against entity bounding boxes, or best-effort
//!   against the exact shapes where a predicate exists;
//! - k-nearest-neighbor queries by bounding-box distance
//!   ([`IndexTree::find_nearest`]);
//! - counting and per-gid aggregation
//!   ([`IndexTree::count_intersecting_agg_gid`]);
//! - non-overlapping placement of new shapes ([`IndexTree::place`]).
//!
//! Trees serialize to a single versioned file ([`IndexTree::dump`] /
//! [`IndexTree::load`]) or live inside a memory-mapped file
//! ([`MemDiskIndex`]) so indices larger than RAM stay usable. A coarse
//! [`VoxelGrid`] pre-partitions streamed populations for the distributed
//! loaders built on top of this crate.
//!
//! # Example
//!
//! ```rust
//! use arbor_geometry::{MorphoEntry, Point3D, Soma, Sphere};
//! use arbor_index::{GeometryMode, IndexTree};
//!
//! let somas: Vec<MorphoEntry> = (0..3)
//!     .map(|i| {
//!         let center = Point3D::new(i as arbor_geometry::CoordType * 10.0, 0.0, 0.0);
//!         Soma::new(i, center, 2.0).unwrap().into()
//!     })
//!     .collect();
//! let tree = IndexTree::from_entries(somas);
//!
//! let probe = Sphere::new(Point3D::new(10.0, 1.0, 0.0), 1.0).unwrap();
//! let ids = tree.find_intersecting_ids(&probe, GeometryMode::BestEffort);
//! assert_eq!(ids.len(), 1);
//! ```
//!
//! Floating-point coordinates are assumed finite; `NaN` keys would make the
//! bulk-load ordering meaningless.

pub mod builder;
pub mod grid;
pub mod memdisk;
pub mod persist;
pub mod query;
pub mod record;
pub mod rtree;

pub use builder::{bulk_load, neuron_from_arrays, somas_from_arrays};
pub use grid::{MorphVoxelGrid, VoxelGrid};
pub use memdisk::MemDiskIndex;
pub use persist::{IndexError, PRECISION_TAG, STRUCT_VERSION, precision_name};
pub use query::{GeometryMode, Placeable, shape_matches, shape_overlaps_box};
pub use record::Record;
pub use rtree::{IndexTree, MAX_FANOUT, MIN_FANOUT};
