// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Build morphology entities from flat coordinate arrays.
//!
//! Morphology readers hand over somas and neurites as parallel arrays:
//! point coordinates, per-point radii and the offsets where each section
//! starts. One segment is produced per consecutive point pair within a
//! section; sections are numbered from 1 (the soma is section 0) and a
//! segment's radius is the mean of its endpoint radii.

use arbor_geometry::{
    CoordType, GeometryError, MorphoEntry, Point3D, Segment, Soma, TreeShape,
};

use crate::record::Record;
use crate::rtree::IndexTree;

/// Somas from parallel gid, centroid and radius arrays.
pub fn somas_from_arrays(
    gids: &[u64],
    centroids: &[Point3D],
    radii: &[CoordType],
) -> Result<Vec<MorphoEntry>, GeometryError> {
    if gids.len() != centroids.len() || gids.len() != radii.len() {
        return Err(GeometryError::InvalidGeometry("soma array length mismatch"));
    }
    gids.iter()
        .zip(centroids)
        .zip(radii)
        .map(|((&gid, &centroid), &radius)| {
            Ok(MorphoEntry::Soma(Soma::new(gid, centroid, radius)?))
        })
        .collect()
}

/// Segments of one neuron from flat point and radius arrays.
///
/// `section_offsets` holds the index of each section's first point, in
/// ascending order; an empty slice means a single section. Sections with
/// fewer than two points produce no segments.
pub fn neuron_from_arrays(
    gid: u64,
    points: &[Point3D],
    radii: &[CoordType],
    section_offsets: &[usize],
) -> Result<Vec<MorphoEntry>, GeometryError> {
    if points.len() != radii.len() {
        return Err(GeometryError::InvalidGeometry(
            "neuron point and radius arrays differ in length",
        ));
    }
    let default_offsets = [0];
    let offsets: &[usize] = if section_offsets.is_empty() {
        &default_offsets
    } else {
        section_offsets
    };
    if offsets.windows(2).any(|w| w[0] >= w[1]) || *offsets.last().unwrap() > points.len() {
        return Err(GeometryError::InvalidGeometry(
            "section offsets are not ascending within the point array",
        ));
    }

    let mut out = Vec::with_capacity(points.len().saturating_sub(offsets.len()));
    for (k, &start) in offsets.iter().enumerate() {
        let end = offsets.get(k + 1).copied().unwrap_or(points.len());
        let section = k + 1;
        for (segment, i) in (start..end.saturating_sub(1)).enumerate() {
            let radius = 0.5 * (radii[i] + radii[i + 1]);
            out.push(MorphoEntry::Segment(Segment::new(
                gid,
                section as u32,
                segment as u32,
                points[i],
                points[i + 1],
                radius,
            )?));
        }
    }
    Ok(out)
}

impl IndexTree<MorphoEntry> {
    /// Append somas given as parallel arrays.
    pub fn add_somas(
        &mut self,
        gids: &[u64],
        centroids: &[Point3D],
        radii: &[CoordType],
    ) -> Result<(), GeometryError> {
        for entry in somas_from_arrays(gids, centroids, radii)? {
            self.insert(entry);
        }
        Ok(())
    }

    /// Append the segments of one neuron given as flat arrays.
    pub fn add_neuron(
        &mut self,
        gid: u64,
        points: &[Point3D],
        radii: &[CoordType],
        section_offsets: &[usize],
    ) -> Result<(), GeometryError> {
        for entry in neuron_from_arrays(gid, points, radii, section_offsets)? {
            self.insert(entry);
        }
        Ok(())
    }

    /// Append one soma.
    pub fn add_soma(
        &mut self,
        gid: u64,
        centroid: Point3D,
        radius: CoordType,
    ) -> Result<(), GeometryError> {
        self.insert(MorphoEntry::Soma(Soma::new(gid, centroid, radius)?));
        Ok(())
    }
}

/// Build a bulk-loaded tree from any entity iterator.
pub fn bulk_load<T, I>(entries: I) -> IndexTree<T>
where
    T: TreeShape + Record,
    I: IntoIterator<Item = T>,
{
    IndexTree::from_entries(entries)
}
