// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An [`IndexTree`] backed by a memory-mapped file.
//!
//! [`MemDiskIndex::create`] reserves a file of the requested capacity and
//! writes the tree into it through the map; the capacity doubles whenever an
//! encode outgrows it. [`MemDiskIndex::open`] maps the file read-only and
//! decodes only the node topology, leaving entities in the map, so an index
//! larger than RAM stays queryable. A `meta_data.json` sibling records the
//! structure version, coordinate precision and element count.

use std::fs::{File, OpenOptions};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::{Mmap, MmapMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use arbor_geometry::TreeShape;

use crate::persist::{IndexError, PRECISION_TAG, STRUCT_VERSION, precision_name};
use crate::record::Record;
use crate::rtree::IndexTree;

const INDEX_FILE: &str = "index.bin";
const META_FILE: &str = "meta_data.json";
const MIB: usize = 1024 * 1024;

/// Sidecar metadata stored next to the mapped file.
#[derive(Debug, Serialize, Deserialize)]
struct MetaData {
    version: u32,
    precision: String,
    element_count: u64,
}

/// Handle owning a tree and the mapped file that backs it.
///
/// The handle dereferences to the tree, so every query and insert operation
/// is available directly. Dropping a writable handle flushes it; call
/// [`MemDiskIndex::close`] to observe flush errors and apply the
/// shrink-on-close policy.
pub struct MemDiskIndex<T: TreeShape + Record> {
    dir: PathBuf,
    tree: IndexTree<T>,
    capacity: usize,
    close_shrink: bool,
    growth_enabled: bool,
    writable: bool,
    closed: bool,
}

impl<T: TreeShape + Record> MemDiskIndex<T> {
    /// Create an empty index inside `dir` with an initial capacity of
    /// `size_mb` MiB. With `close_shrink`, the file is truncated to the live
    /// extent on close.
    pub fn create(
        dir: impl AsRef<Path>,
        size_mb: usize,
        close_shrink: bool,
    ) -> Result<Self, IndexError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let capacity = size_mb.max(1) * MIB;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.join(INDEX_FILE))?;
        file.set_len(capacity as u64)?;
        info!(path = %dir.display(), capacity_mb = size_mb, "created mapped index");
        Ok(Self {
            dir,
            tree: IndexTree::new(),
            capacity,
            close_shrink,
            growth_enabled: true,
            writable: true,
            closed: false,
        })
    }

    /// Create an index inside `dir` and bulk-load it from `entries`.
    pub fn create_from<I>(
        dir: impl AsRef<Path>,
        size_mb: usize,
        close_shrink: bool,
        entries: I,
    ) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = T>,
    {
        let mut index = Self::create(dir, size_mb, close_shrink)?;
        index.tree = IndexTree::from_entries(entries);
        index.flush()?;
        Ok(index)
    }

    /// Open an existing index read-only.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, IndexError> {
        let dir = dir.as_ref().to_path_buf();
        let meta: MetaData = serde_json::from_reader(File::open(dir.join(META_FILE))?)?;
        if meta.version > STRUCT_VERSION {
            return Err(IndexError::FutureFormat {
                found: meta.version,
                supported: STRUCT_VERSION,
            });
        }
        let file = File::open(dir.join(INDEX_FILE))?;
        let capacity = file.metadata()?.len() as usize;
        let map = unsafe { Mmap::map(&file)? };
        let tree = IndexTree::decode_from_mapped(Arc::new(map))?;
        info!(path = %dir.display(), elements = tree.len(), "opened mapped index");
        Ok(Self {
            dir,
            tree,
            capacity,
            close_shrink: false,
            growth_enabled: false,
            writable: false,
            closed: false,
        })
    }

    /// Disable capacity growth; a flush that outgrows the file then fails
    /// with [`IndexError::MappedCapacityExhausted`].
    pub fn set_growth(&mut self, enabled: bool) {
        self.growth_enabled = enabled;
    }

    /// The directory holding `index.bin` and `meta_data.json`.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Borrow the underlying tree.
    pub fn tree(&self) -> &IndexTree<T> {
        &self.tree
    }

    /// Write the tree into the mapped file and refresh the metadata.
    pub fn flush(&mut self) -> Result<(), IndexError> {
        if !self.writable {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "index was opened read-only",
            )
            .into());
        }
        let needed = self.tree.encoded_len();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.dir.join(INDEX_FILE))?;
        if needed > self.capacity {
            if !self.growth_enabled {
                return Err(IndexError::MappedCapacityExhausted {
                    needed,
                    capacity: self.capacity,
                });
            }
            let mut capacity = self.capacity.max(MIB);
            while capacity < needed {
                capacity *= 2;
            }
            debug!(
                old_mb = self.capacity / MIB,
                new_mb = capacity / MIB,
                "growing mapped index file"
            );
            file.set_len(capacity as u64)?;
            self.capacity = capacity;
        }
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        let mut cursor = &mut map[..needed];
        self.tree.encode_into(&mut cursor)?;
        map.flush()?;
        self.write_meta()?;
        Ok(())
    }

    fn write_meta(&self) -> Result<(), IndexError> {
        let meta = MetaData {
            version: STRUCT_VERSION,
            precision: precision_name(PRECISION_TAG).to_string(),
            element_count: self.tree.len() as u64,
        };
        serde_json::to_writer_pretty(File::create(self.dir.join(META_FILE))?, &meta)?;
        Ok(())
    }

    /// Flush and close the index, shrinking the file to its live extent if
    /// the handle was created with `close_shrink`.
    pub fn close(mut self) -> Result<(), IndexError> {
        if self.writable {
            self.flush()?;
            if self.close_shrink {
                let used = self.tree.encoded_len();
                let file = OpenOptions::new()
                    .write(true)
                    .open(self.dir.join(INDEX_FILE))?;
                file.set_len(used as u64)?;
                debug!(bytes = used, "shrank mapped index file to live extent");
            }
        }
        self.closed = true;
        Ok(())
    }
}

impl<T: TreeShape + Record> Deref for MemDiskIndex<T> {
    type Target = IndexTree<T>;
    fn deref(&self) -> &Self::Target {
        &self.tree
    }
}

impl<T: TreeShape + Record> DerefMut for MemDiskIndex<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tree
    }
}

impl<T: TreeShape + Record> Drop for MemDiskIndex<T> {
    fn drop(&mut self) {
        if self.writable && !self.closed {
            if let Err(err) = self.flush() {
                warn!(path = %self.dir.display(), %err, "failed to flush mapped index on drop");
            }
        }
    }
}
