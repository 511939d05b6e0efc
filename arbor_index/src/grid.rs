// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Coarse voxel grid used to pre-partition streamed populations.
//!
//! The grid maps integer voxel coordinates `floor(p / LEN)` to lists of
//! entities. An entity whose bounding box spans several voxels is stored
//! under its min-corner voxel and, when different, its max-corner voxel.
//! That is a two-cell approximation of the up-to-eight cells a box can
//! touch; it suits long thin cylinders, and the grid is a pre-partition
//! structure, not a query structure, so downstream consumers see every
//! entity at least once.

use std::collections::BTreeMap;

use arbor_geometry::{CoordType, GeometryError, MorphoEntry, Point3D, Segment, Soma, TreeShape};

use crate::builder::neuron_from_arrays;

/// Voxel grid over entities of type `T` with cubic voxels of side `LEN`.
#[derive(Debug, Clone)]
pub struct VoxelGrid<T, const LEN: i32> {
    cells: BTreeMap<[i32; 3], Vec<T>>,
}

impl<T, const LEN: i32> Default for VoxelGrid<T, LEN> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const LEN: i32> VoxelGrid<T, LEN> {
    /// An empty grid.
    pub fn new() -> Self {
        Self {
            cells: BTreeMap::new(),
        }
    }

    /// The voxel containing `p`.
    pub fn voxel_of(p: &Point3D) -> [i32; 3] {
        let len = LEN as CoordType;
        [
            (p.x / len).floor() as i32,
            (p.y / len).floor() as i32,
            (p.z / len).floor() as i32,
        ]
    }

    /// Total list length over all voxels. Entities stored under two voxels
    /// count twice.
    pub fn size(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    /// Number of occupied voxels.
    pub fn n_voxels(&self) -> usize {
        self.cells.len()
    }

    /// The occupied voxel coordinates, in lexicographic order.
    pub fn voxels(&self) -> Vec<[i32; 3]> {
        self.cells.keys().copied().collect()
    }

    /// Iterate over (voxel, entities) pairs in lexicographic voxel order.
    pub fn items(&self) -> impl Iterator<Item = (&[i32; 3], &Vec<T>)> {
        self.cells.iter()
    }

    /// Append the other grid's per-voxel lists onto this one. No
    /// deduplication is performed.
    pub fn merge(&mut self, other: Self) {
        for (voxel, mut entities) in other.cells {
            self.cells.entry(voxel).or_default().append(&mut entities);
        }
    }
}

impl<T: TreeShape, const LEN: i32> VoxelGrid<T, LEN> {
    /// Insert an entity under its min-corner voxel, and additionally under
    /// its max-corner voxel when the two differ.
    pub fn insert(&mut self, value: T) {
        let bbox = value.bounding_box();
        let min_voxel = Self::voxel_of(&bbox.min);
        let max_voxel = Self::voxel_of(&bbox.max);
        if min_voxel != max_voxel {
            self.cells.entry(max_voxel).or_default().push(value.clone());
        }
        self.cells.entry(min_voxel).or_default().push(value);
    }

    /// Insert every entity of the iterator.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, entities: I) {
        for e in entities {
            self.insert(e);
        }
    }
}

/// Voxel grid of morphology pieces, with flat-array builders.
pub type MorphVoxelGrid<const LEN: i32> = VoxelGrid<MorphoEntry, LEN>;

impl<const LEN: i32> MorphVoxelGrid<LEN> {
    /// Insert one soma.
    pub fn add_soma(
        &mut self,
        gid: u64,
        centroid: Point3D,
        radius: CoordType,
    ) -> Result<(), GeometryError> {
        self.insert(MorphoEntry::Soma(Soma::new(gid, centroid, radius)?));
        Ok(())
    }

    /// Insert one segment.
    pub fn add_segment(
        &mut self,
        gid: u64,
        section_id: u32,
        segment_id: u32,
        p1: Point3D,
        p2: Point3D,
        radius: CoordType,
    ) -> Result<(), GeometryError> {
        self.insert(MorphoEntry::Segment(Segment::new(
            gid, section_id, segment_id, p1, p2, radius,
        )?));
        Ok(())
    }

    /// Insert the segments of a whole neuron given as flat point and radius
    /// arrays with per-section offsets.
    pub fn add_branches(
        &mut self,
        gid: u64,
        points: &[Point3D],
        radii: &[CoordType],
        section_offsets: &[usize],
    ) -> Result<(), GeometryError> {
        self.extend(neuron_from_arrays(gid, points, radii, section_offsets)?);
        Ok(())
    }
}
