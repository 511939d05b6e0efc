// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-size binary records for indexed entities.
//!
//! Every storable entity encodes to a fixed number of bytes, so a
//! memory-mapped index can address entity `i` at `offset + i * SIZE` and
//! decode it on demand without loading the file into memory. Multi-byte
//! fields are little-endian; the file header (see `persist`) records the
//! coordinate precision so a mismatched build is rejected up front, and
//! decoding fails with [`IndexError::Corrupt`] on a foreign tag byte
//! instead of trusting it.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;

use arbor_geometry::{
    Box3D, CoordType, Cylinder, GeometryEntry, IndexedSphere, IndexedSubtreeBox, MorphPartId,
    MorphoEntry, Point3D, Segment, Soma, Sphere, SubtreeId, Synapse, SynapseId,
};

use crate::persist::IndexError;

/// Size of one coordinate in bytes.
pub const COORD_SIZE: usize = size_of::<CoordType>();

#[cfg(feature = "double-precision")]
#[inline]
pub(crate) fn write_coord(buf: &mut [u8], v: CoordType) {
    LittleEndian::write_f64(buf, v);
}

#[cfg(feature = "double-precision")]
#[inline]
pub(crate) fn read_coord(buf: &[u8]) -> CoordType {
    LittleEndian::read_f64(buf)
}

#[cfg(not(feature = "double-precision"))]
#[inline]
pub(crate) fn write_coord(buf: &mut [u8], v: CoordType) {
    LittleEndian::write_f32(buf, v);
}

#[cfg(not(feature = "double-precision"))]
#[inline]
pub(crate) fn read_coord(buf: &[u8]) -> CoordType {
    LittleEndian::read_f32(buf)
}

#[inline]
fn write_point(buf: &mut [u8], p: &Point3D) {
    write_coord(&mut buf[0..], p.x);
    write_coord(&mut buf[COORD_SIZE..], p.y);
    write_coord(&mut buf[2 * COORD_SIZE..], p.z);
}

#[inline]
fn read_point(buf: &[u8]) -> Point3D {
    Point3D::new(
        read_coord(&buf[0..]),
        read_coord(&buf[COORD_SIZE..]),
        read_coord(&buf[2 * COORD_SIZE..]),
    )
}

/// Fixed-size binary codec for storable values.
pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;
    /// Encode into `buf`, which holds at least `SIZE` bytes.
    fn write_record(&self, buf: &mut [u8]);
    /// Decode from `buf`, which holds at least `SIZE` bytes. Fails with
    /// [`IndexError::Corrupt`] when the bytes do not hold a valid record.
    fn read_record(buf: &[u8]) -> Result<Self, IndexError>;
}

impl Record for Sphere {
    const SIZE: usize = 4 * COORD_SIZE;

    fn write_record(&self, buf: &mut [u8]) {
        write_point(buf, &self.centroid);
        write_coord(&mut buf[3 * COORD_SIZE..], self.radius);
    }

    fn read_record(buf: &[u8]) -> Result<Self, IndexError> {
        Ok(Self {
            centroid: read_point(buf),
            radius: read_coord(&buf[3 * COORD_SIZE..]),
        })
    }
}

impl Record for Cylinder {
    const SIZE: usize = 7 * COORD_SIZE;

    fn write_record(&self, buf: &mut [u8]) {
        write_point(buf, &self.p1);
        write_point(&mut buf[3 * COORD_SIZE..], &self.p2);
        write_coord(&mut buf[6 * COORD_SIZE..], self.radius);
    }

    fn read_record(buf: &[u8]) -> Result<Self, IndexError> {
        Ok(Self {
            p1: read_point(buf),
            p2: read_point(&buf[3 * COORD_SIZE..]),
            radius: read_coord(&buf[6 * COORD_SIZE..]),
        })
    }
}

impl Record for Box3D {
    const SIZE: usize = 6 * COORD_SIZE;

    fn write_record(&self, buf: &mut [u8]) {
        write_point(buf, &self.min);
        write_point(&mut buf[3 * COORD_SIZE..], &self.max);
    }

    fn read_record(buf: &[u8]) -> Result<Self, IndexError> {
        Ok(Self {
            min: read_point(buf),
            max: read_point(&buf[3 * COORD_SIZE..]),
        })
    }
}

impl Record for Soma {
    const SIZE: usize = 8 + Sphere::SIZE;

    fn write_record(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, self.id.raw());
        self.sphere.write_record(&mut buf[8..]);
    }

    fn read_record(buf: &[u8]) -> Result<Self, IndexError> {
        Ok(Self {
            id: MorphPartId::from_raw(LittleEndian::read_u64(buf)),
            sphere: Sphere::read_record(&buf[8..])?,
        })
    }
}

impl Record for Segment {
    const SIZE: usize = 8 + Cylinder::SIZE;

    fn write_record(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, self.id.raw());
        self.cylinder.write_record(&mut buf[8..]);
    }

    fn read_record(buf: &[u8]) -> Result<Self, IndexError> {
        Ok(Self {
            id: MorphPartId::from_raw(LittleEndian::read_u64(buf)),
            cylinder: Cylinder::read_record(&buf[8..])?,
        })
    }
}

impl Record for Synapse {
    const SIZE: usize = 24 + Sphere::SIZE;

    fn write_record(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, self.id.id);
        LittleEndian::write_u64(&mut buf[8..], self.id.post_gid);
        LittleEndian::write_u64(&mut buf[16..], self.id.pre_gid);
        self.sphere.write_record(&mut buf[24..]);
    }

    fn read_record(buf: &[u8]) -> Result<Self, IndexError> {
        Ok(Self {
            id: SynapseId::new(
                LittleEndian::read_u64(buf),
                LittleEndian::read_u64(&buf[8..]),
                LittleEndian::read_u64(&buf[16..]),
            ),
            sphere: Sphere::read_record(&buf[24..])?,
        })
    }
}

impl Record for IndexedSphere {
    const SIZE: usize = 8 + Sphere::SIZE;

    fn write_record(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, self.id);
        self.sphere.write_record(&mut buf[8..]);
    }

    fn read_record(buf: &[u8]) -> Result<Self, IndexError> {
        Ok(Self {
            id: LittleEndian::read_u64(buf),
            sphere: Sphere::read_record(&buf[8..])?,
        })
    }
}

impl Record for IndexedSubtreeBox {
    const SIZE: usize = 16 + Box3D::SIZE;

    fn write_record(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, self.id.id);
        LittleEndian::write_u64(&mut buf[8..], self.id.n_elements);
        self.bbox.write_record(&mut buf[16..]);
    }

    fn read_record(buf: &[u8]) -> Result<Self, IndexError> {
        Ok(Self {
            id: SubtreeId::new(LittleEndian::read_u64(buf), LittleEndian::read_u64(&buf[8..])),
            bbox: Box3D::read_record(&buf[16..])?,
        })
    }
}

// Tagged unions pad the smaller variant so the record stays fixed size.

impl Record for MorphoEntry {
    const SIZE: usize = 1 + Segment::SIZE;

    fn write_record(&self, buf: &mut [u8]) {
        buf[..Self::SIZE].fill(0);
        match self {
            Self::Soma(s) => {
                buf[0] = 0;
                s.write_record(&mut buf[1..]);
            }
            Self::Segment(s) => {
                buf[0] = 1;
                s.write_record(&mut buf[1..]);
            }
        }
    }

    fn read_record(buf: &[u8]) -> Result<Self, IndexError> {
        match buf[0] {
            0 => Ok(Self::Soma(Soma::read_record(&buf[1..])?)),
            1 => Ok(Self::Segment(Segment::read_record(&buf[1..])?)),
            _ => Err(IndexError::Corrupt),
        }
    }
}

impl Record for GeometryEntry {
    const SIZE: usize = 1 + Cylinder::SIZE;

    fn write_record(&self, buf: &mut [u8]) {
        buf[..Self::SIZE].fill(0);
        match self {
            Self::Sphere(s) => {
                buf[0] = 0;
                s.write_record(&mut buf[1..]);
            }
            Self::Cylinder(c) => {
                buf[0] = 1;
                c.write_record(&mut buf[1..]);
            }
        }
    }

    fn read_record(buf: &[u8]) -> Result<Self, IndexError> {
        match buf[0] {
            0 => Ok(Self::Sphere(Sphere::read_record(&buf[1..])?)),
            1 => Ok(Self::Cylinder(Cylinder::read_record(&buf[1..])?)),
            _ => Err(IndexError::Corrupt),
        }
    }
}

/// Backing storage for a tree's entities: an owned vector, or a window of a
/// memory-mapped file with an in-memory overflow for entities appended after
/// opening.
#[derive(Debug)]
pub(crate) enum EntryStore<T> {
    Heap(Vec<T>),
    Mapped {
        map: Arc<Mmap>,
        offset: usize,
        base_len: usize,
        overflow: Vec<T>,
    },
}

impl<T: Record + Clone> EntryStore<T> {
    pub(crate) fn empty() -> Self {
        Self::Heap(Vec::new())
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Heap(v) => v.len(),
            Self::Mapped {
                base_len, overflow, ..
            } => base_len + overflow.len(),
        }
    }

    pub(crate) fn get(&self, index: usize) -> T {
        match self {
            Self::Heap(v) => v[index].clone(),
            Self::Mapped {
                map,
                offset,
                base_len,
                overflow,
            } => {
                if index < *base_len {
                    let start = offset + index * T::SIZE;
                    // The whole mapped region is validated when the file
                    // is opened.
                    T::read_record(&map[start..start + T::SIZE])
                        .expect("mapped entity records are validated on open")
                } else {
                    overflow[index - base_len].clone()
                }
            }
        }
    }

    pub(crate) fn push(&mut self, value: T) -> usize {
        let index = self.len();
        match self {
            Self::Heap(v) => v.push(value),
            Self::Mapped { overflow, .. } => overflow.push(value),
        }
        index
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }
}

impl<T> From<Vec<T>> for EntryStore<T> {
    fn from(v: Vec<T>) -> Self {
        Self::Heap(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn morpho_entry_round_trips_both_variants() {
        let soma: MorphoEntry = Soma::new(5, Point3D::new(1.0, 2.0, 3.0), 4.0).unwrap().into();
        let seg: MorphoEntry = Segment::new(
            6,
            2,
            9,
            Point3D::new(0.0, 1.0, 2.0),
            Point3D::new(3.0, 4.0, 5.0),
            0.5,
        )
        .unwrap()
        .into();
        for entry in [soma, seg] {
            let mut buf = vec![0u8; MorphoEntry::SIZE];
            entry.write_record(&mut buf);
            assert_eq!(MorphoEntry::read_record(&buf).unwrap(), entry);
        }
    }

    #[test]
    fn foreign_tag_byte_is_corrupt() {
        let soma: MorphoEntry = Soma::new(5, Point3D::new(1.0, 2.0, 3.0), 4.0).unwrap().into();
        let mut buf = vec![0u8; MorphoEntry::SIZE];
        soma.write_record(&mut buf);
        buf[0] = 7;
        assert!(matches!(
            MorphoEntry::read_record(&buf),
            Err(IndexError::Corrupt)
        ));
        assert!(matches!(
            GeometryEntry::read_record(&buf[..GeometryEntry::SIZE]),
            Err(IndexError::Corrupt)
        ));
    }

    #[test]
    fn synapse_keeps_both_gids() {
        let syn = Synapse::new(3, 14, 15, Point3D::new(-1.0, 0.5, 2.0));
        let mut buf = vec![0u8; Synapse::SIZE];
        syn.write_record(&mut buf);
        let back = Synapse::read_record(&buf).unwrap();
        assert_eq!(back.id.post_gid, 14);
        assert_eq!(back.id.pre_gid, 15);
        assert_eq!(back, syn);
    }

    #[test]
    fn subtree_box_record_is_stable() {
        let b = IndexedSubtreeBox::new(
            7,
            1234,
            Box3D::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(1.0, 2.0, 3.0)).unwrap(),
        );
        let mut buf = vec![0u8; IndexedSubtreeBox::SIZE];
        b.write_record(&mut buf);
        assert_eq!(IndexedSubtreeBox::read_record(&buf).unwrap(), b);
        assert_eq!(LittleEndian::read_u64(&buf[8..]), 1234);
    }
}
