// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flat serialization of an [`IndexTree`] to a single binary file.
//!
//! The file starts with a big-endian structure version and one precision
//! byte; readers reject files written by a newer structure revision or by a
//! build with the other coordinate precision. Entities follow as fixed-size
//! records, then the node topology in arena order, so a memory-mapped reader
//! can address entities without decoding the whole file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use memmap2::Mmap;
use thiserror::Error;

use arbor_geometry::{Box3D, TreeShape};

use crate::record::{EntryStore, Record};
use crate::rtree::{Child, IndexTree, Node};

/// Bump when the serialized layout changes.
pub const STRUCT_VERSION: u32 = 2;

/// Coordinate precision written into every index file.
pub const PRECISION_TAG: u8 = if size_of::<arbor_geometry::CoordType>() == 8 {
    1
} else {
    0
};

/// Human-readable name of a precision tag.
pub fn precision_name(tag: u8) -> &'static str {
    if tag == 1 { "float64" } else { "float32" }
}

const ROOT_NONE: u64 = u64::MAX;
const HEADER_LEN: usize = 4 + 1 + 8 + 8;

/// Errors from index persistence and memory mapping.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The file was written by a newer structure revision.
    #[error("index file has structure version {found}, newer than supported version {supported}")]
    FutureFormat { found: u32, supported: u32 },
    /// The file was written by a build with the other coordinate precision.
    #[error("index file stores {found} coordinates but this build uses {expected}")]
    PrecisionMismatch {
        found: &'static str,
        expected: &'static str,
    },
    /// The mapped file is full and growth is disabled.
    #[error("mapped capacity exhausted: {needed} bytes needed, {capacity} mapped")]
    MappedCapacityExhausted { needed: usize, capacity: usize },
    /// The file ends before the encoded structure does.
    #[error("index file is truncated or corrupt")]
    Corrupt,
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Metadata could not be encoded or decoded.
    #[error("index metadata: {0}")]
    Meta(#[from] serde_json::Error),
}

/// Bounds-checked reader over a byte slice.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], IndexError> {
        let end = self.pos.checked_add(n).ok_or(IndexError::Corrupt)?;
        if end > self.buf.len() {
            return Err(IndexError::Corrupt);
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, IndexError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, IndexError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn u32_be(&mut self) -> Result<u32, IndexError> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> Result<u64, IndexError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    fn record<R: Record>(&mut self) -> Result<R, IndexError> {
        R::read_record(self.take(R::SIZE)?)
    }
}

fn check_header(r: &mut Reader<'_>) -> Result<(Option<usize>, usize), IndexError> {
    let version = r.u32_be()?;
    if version > STRUCT_VERSION {
        return Err(IndexError::FutureFormat {
            found: version,
            supported: STRUCT_VERSION,
        });
    }
    let precision = r.u8()?;
    if precision != PRECISION_TAG {
        return Err(IndexError::PrecisionMismatch {
            found: precision_name(precision),
            expected: precision_name(PRECISION_TAG),
        });
    }
    let root = r.u64()?;
    let root = if root == ROOT_NONE {
        None
    } else {
        Some(root as usize)
    };
    let entry_count = r.u64()? as usize;
    Ok((root, entry_count))
}

fn decode_nodes(r: &mut Reader<'_>) -> Result<Vec<Node>, IndexError> {
    let node_count = r.u64()? as usize;
    let mut nodes = Vec::with_capacity(node_count.min(1 << 16));
    for _ in 0..node_count {
        let bbox: Box3D = r.record()?;
        let leaf = r.u8()? != 0;
        let child_count = r.u16()? as usize;
        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let tag = r.u8()?;
            let index = r.u64()? as usize;
            children.push(match tag {
                0 => Child::Node(index),
                1 => Child::Entry {
                    index,
                    bbox: r.record()?,
                },
                _ => return Err(IndexError::Corrupt),
            });
        }
        nodes.push(Node {
            bbox,
            leaf,
            children,
        });
    }
    Ok(nodes)
}

impl<T: TreeShape + Record> IndexTree<T> {
    /// Total encoded size in bytes.
    pub(crate) fn encoded_len(&self) -> usize {
        let mut len = HEADER_LEN + self.entries.len() * T::SIZE + 8;
        for node in &self.nodes {
            len += Box3D::SIZE + 1 + 2;
            for child in &node.children {
                len += 1 + 8;
                if matches!(child, Child::Entry { .. }) {
                    len += Box3D::SIZE;
                }
            }
        }
        len
    }

    pub(crate) fn encode_into<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let mut word = [0u8; 8];
        BigEndian::write_u32(&mut word[..4], STRUCT_VERSION);
        w.write_all(&word[..4])?;
        w.write_all(&[PRECISION_TAG])?;
        LittleEndian::write_u64(&mut word, self.root.map_or(ROOT_NONE, |r| r as u64));
        w.write_all(&word)?;
        LittleEndian::write_u64(&mut word, self.entries.len() as u64);
        w.write_all(&word)?;

        let mut buf = vec![0u8; T::SIZE];
        for entry in self.entries.iter() {
            entry.write_record(&mut buf);
            w.write_all(&buf)?;
        }

        LittleEndian::write_u64(&mut word, self.nodes.len() as u64);
        w.write_all(&word)?;
        let mut bbox_buf = [0u8; Box3D::SIZE];
        for node in &self.nodes {
            node.bbox.write_record(&mut bbox_buf);
            w.write_all(&bbox_buf)?;
            w.write_all(&[u8::from(node.leaf)])?;
            LittleEndian::write_u16(&mut word[..2], node.children.len() as u16);
            w.write_all(&word[..2])?;
            for child in &node.children {
                match child {
                    Child::Node(ci) => {
                        w.write_all(&[0])?;
                        LittleEndian::write_u64(&mut word, *ci as u64);
                        w.write_all(&word)?;
                    }
                    Child::Entry { index, bbox } => {
                        w.write_all(&[1])?;
                        LittleEndian::write_u64(&mut word, *index as u64);
                        w.write_all(&word)?;
                        bbox.write_record(&mut bbox_buf);
                        w.write_all(&bbox_buf)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Serialize the tree and all contained entities to `path`.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let mut w = BufWriter::new(File::create(path)?);
        self.encode_into(&mut w)?;
        w.flush()?;
        Ok(())
    }

    /// Rebuild a tree from a file written by [`IndexTree::dump`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let bytes = std::fs::read(path)?;
        let mut r = Reader::new(&bytes);
        let (root, entry_count) = check_header(&mut r)?;
        let mut entries = Vec::with_capacity(entry_count.min(1 << 16));
        for _ in 0..entry_count {
            entries.push(r.record::<T>()?);
        }
        let nodes = decode_nodes(&mut r)?;
        Ok(Self::from_parts(root, nodes, EntryStore::from(entries)))
    }

    /// Rebuild a tree over a memory-mapped file. Node topology is decoded
    /// into memory; entities stay in the map and are decoded per query.
    /// Every entity record is validated here, so the per-query decodes
    /// cannot fail later.
    pub(crate) fn decode_from_mapped(map: Arc<Mmap>) -> Result<Self, IndexError> {
        let (root, entry_count, entries_offset, nodes) = {
            let mut r = Reader::new(&map[..]);
            let (root, entry_count) = check_header(&mut r)?;
            let entries_offset = r.pos;
            let entries_bytes = entry_count
                .checked_mul(T::SIZE)
                .ok_or(IndexError::Corrupt)?;
            let entries_region = r.take(entries_bytes)?;
            for chunk in entries_region.chunks_exact(T::SIZE) {
                T::read_record(chunk)?;
            }
            let nodes = decode_nodes(&mut r)?;
            (root, entry_count, entries_offset, nodes)
        };
        Ok(Self::from_parts(
            root,
            nodes,
            EntryStore::Mapped {
                map,
                offset: entries_offset,
                base_len: entry_count,
                overflow: Vec::new(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::GeometryMode;
    use arbor_geometry::{IndexedSphere, Point3D, Sphere};

    fn indexed_spheres() -> Vec<IndexedSphere> {
        [(0.0, 2.0), (10.0, 2.5), (20.0, 4.0)]
            .into_iter()
            .enumerate()
            .map(|(i, (x, r)): (usize, (f32, f32))| {
                IndexedSphere::new(
                    i as u64,
                    Point3D::new(x as arbor_geometry::CoordType, 0.0, 0.0),
                    r as arbor_geometry::CoordType,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn dump_load_preserves_ids_and_queries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sphere_index");
        let tree = IndexTree::from_entries(indexed_spheres());
        tree.dump(&path).unwrap();

        let loaded: IndexTree<IndexedSphere> = IndexTree::load(&path).unwrap();
        assert_eq!(loaded.all_ids(), tree.all_ids());

        for probe in [
            Sphere::new(Point3D::new(15.0, 0.0, 0.0), 2.0).unwrap(),
            Sphere::new(Point3D::new(5.0, 0.0, 0.0), 2.0).unwrap(),
            Sphere::new(Point3D::new(0.0, -3.0, 0.0), 2.0).unwrap(),
        ] {
            for mode in [GeometryMode::BoundingBox, GeometryMode::BestEffort] {
                assert_eq!(
                    loaded.find_intersecting_ids(&probe, mode),
                    tree.find_intersecting_ids(&probe, mode)
                );
                assert_eq!(
                    loaded.count_intersecting(&probe, mode),
                    tree.count_intersecting(&probe, mode)
                );
            }
            let near: Vec<u64> = loaded.find_nearest(&probe, 2).iter().map(|e| e.id).collect();
            let orig: Vec<u64> = tree.find_nearest(&probe, 2).iter().map(|e| e.id).collect();
            assert_eq!(near, orig);
        }
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future_index");
        let tree = IndexTree::from_entries(indexed_spheres());
        tree.dump(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        BigEndian::write_u32(&mut bytes[..4], STRUCT_VERSION + 1);
        std::fs::write(&path, &bytes).unwrap();

        match IndexTree::<IndexedSphere>::load(&path) {
            Err(IndexError::FutureFormat { found, supported }) => {
                assert_eq!(found, STRUCT_VERSION + 1);
                assert_eq!(supported, STRUCT_VERSION);
            }
            other => panic!("expected FutureFormat, got {other:?}"),
        }
    }

    #[test]
    fn wrong_precision_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed_index");
        let tree = IndexTree::from_entries(indexed_spheres());
        tree.dump(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4] = 1 - PRECISION_TAG;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            IndexTree::<IndexedSphere>::load(&path),
            Err(IndexError::PrecisionMismatch { .. })
        ));
    }

    #[test]
    fn flipped_entry_tag_is_corrupt() {
        use arbor_geometry::{MorphoEntry, Segment, Soma};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagged_index");
        let tree = IndexTree::from_entries(vec![
            MorphoEntry::Soma(Soma::new(1, Point3D::new(0.0, 0.0, 0.0), 2.0).unwrap()),
            MorphoEntry::Segment(
                Segment::new(
                    2,
                    1,
                    0,
                    Point3D::new(0.0, 0.0, 0.0),
                    Point3D::new(0.0, 5.0, 0.0),
                    1.0,
                )
                .unwrap(),
            ),
        ]);
        tree.dump(&path).unwrap();

        // The first byte after the header is the first entry's tag.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[HEADER_LEN] = 9;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            IndexTree::<MorphoEntry>::load(&path),
            Err(IndexError::Corrupt)
        ));

        // The memory-mapped open validates the records too.
        let dir_path = dir.path().join("tagged_memdisk");
        crate::memdisk::MemDiskIndex::create_from(&dir_path, 1, true, tree.iter().collect::<Vec<_>>())
            .unwrap()
            .close()
            .unwrap();
        let index_file = dir_path.join("index.bin");
        let mut bytes = std::fs::read(&index_file).unwrap();
        bytes[HEADER_LEN] = 9;
        std::fs::write(&index_file, &bytes).unwrap();
        assert!(matches!(
            crate::memdisk::MemDiskIndex::<MorphoEntry>::open(&dir_path),
            Err(IndexError::Corrupt)
        ));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short_index");
        let tree = IndexTree::from_entries(indexed_spheres());
        tree.dump(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(
            IndexTree::<IndexedSphere>::load(&path),
            Err(IndexError::Corrupt)
        ));
    }
}
