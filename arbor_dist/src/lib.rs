// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arbor Dist: distributed bulk loading for arbor indices.
//!
//! Populations too large for one machine are bulk-loaded with a two-level
//! Sort-Tile-Recursion: a distributed level that sorts and balances the
//! global population across a power-of-two rank grid, and a serial level
//! that tiles each rank's shard into subtrees. Subtrees are persisted
//! through a [`Storage`] adapter and a top-level tree over their bounding
//! boxes is saved by rank 0.
//!
//! The message-passing transport is injected through the [`Communicator`]
//! trait; the crate ships [`SelfComm`] for single-rank runs and
//! [`ThreadComm`] for in-process rank groups on threads. Long-running loads
//! poll a process-wide cancellation flag between collectives (see
//! [`cancel`]).
//!
//! # Example
//!
//! ```rust
//! use arbor_dist::{DirStorage, SelfComm, distributed_partition};
//! use arbor_geometry::{IndexedSphere, Point3D};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let storage = DirStorage::create(dir.path().join("circuit")).unwrap();
//!
//! let mut population: Vec<IndexedSphere> = (0..1000)
//!     .map(|i| {
//!         let x = (i % 32) as arbor_geometry::CoordType;
//!         let y = (i / 32) as arbor_geometry::CoordType;
//!         IndexedSphere::new(i, Point3D::new(x, y, 0.0), 0.4).unwrap()
//!     })
//!     .collect();
//!
//! distributed_partition(&mut population, 100, &storage, &SelfComm).unwrap();
//! let top_tree = storage.load_top_tree().unwrap();
//! assert_eq!(
//!     top_tree.iter().map(|b| b.id.n_elements).sum::<u64>(),
//!     1000
//! );
//! ```

pub mod cancel;
pub mod comm;
pub mod error;
pub mod storage;
pub mod str;

pub use cancel::{cancel_requested, check_signals, request_cancel, reset_cancel};
pub use comm::{Communicator, SelfComm, ThreadComm};
pub use error::LoadError;
pub use storage::{DirStorage, Storage};
pub use str::{
    DistributedStrParams, LocalStrParams, SerialStrParams, TwoLevelStrParams,
    distributed_partition, distributed_sort_tile_recursion, gather_subtree_boxes,
    infer_local_str_params, rank_distribution, serial_sort_tile_recursion,
    two_level_str_heuristic,
};
