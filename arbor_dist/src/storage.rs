// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Storage adapters consumed by the bulk loader.
//!
//! The loader hands every finished partition to a [`Storage`]
//! implementation keyed by `rank * parts_per_rank + k`, and the root rank
//! hands over the top-level tree of subtree bounding boxes. The adapter
//! also decides how trees are built, so a memory-mapped flavor can be
//! substituted without touching the loader.

use std::path::{Path, PathBuf};

use arbor_geometry::{IndexedSubtreeBox, TreeShape};
use arbor_index::{IndexTree, Record};

use crate::error::LoadError;

/// Where the loader persists subtrees and the top-level tree.
pub trait Storage<T: TreeShape + Record> {
    /// Persist one subtree under `key`.
    fn save_subtree(&self, subtree: &IndexTree<T>, key: usize) -> Result<(), LoadError>;

    /// Persist the top-level tree. Called on rank 0 only.
    fn save_top_tree(&self, tree: &IndexTree<IndexedSubtreeBox>) -> Result<(), LoadError>;

    /// Build a subtree over one partition.
    fn build_subtree(&self, entries: Vec<T>) -> IndexTree<T> {
        IndexTree::from_entries(entries)
    }

    /// Build the top-level tree over the gathered subtree boxes.
    fn build_top_tree(&self, boxes: Vec<IndexedSubtreeBox>) -> IndexTree<IndexedSubtreeBox> {
        IndexTree::from_entries(boxes)
    }
}

/// Flat-file storage: one `subtree_<key>.bin` per partition plus a
/// `top_tree.bin`, all in one directory.
#[derive(Debug, Clone)]
pub struct DirStorage {
    dir: PathBuf,
}

impl DirStorage {
    /// Create the directory (if needed) and an adapter writing into it.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(arbor_index::IndexError::from)?;
        Ok(Self { dir })
    }

    /// Adapter over an existing directory.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the subtree saved under `key`.
    pub fn subtree_path(&self, key: usize) -> PathBuf {
        self.dir.join(format!("subtree_{key}.bin"))
    }

    /// Path of the top-level tree.
    pub fn top_tree_path(&self) -> PathBuf {
        self.dir.join("top_tree.bin")
    }

    /// Load one saved subtree.
    pub fn load_subtree<T: TreeShape + Record>(&self, key: usize) -> Result<IndexTree<T>, LoadError> {
        Ok(IndexTree::load(self.subtree_path(key))?)
    }

    /// Load the saved top-level tree.
    pub fn load_top_tree(&self) -> Result<IndexTree<IndexedSubtreeBox>, LoadError> {
        Ok(IndexTree::load(self.top_tree_path())?)
    }
}

impl<T: TreeShape + Record> Storage<T> for DirStorage {
    fn save_subtree(&self, subtree: &IndexTree<T>, key: usize) -> Result<(), LoadError> {
        subtree.dump(self.subtree_path(key))?;
        Ok(())
    }

    fn save_top_tree(&self, tree: &IndexTree<IndexedSubtreeBox>) -> Result<(), LoadError> {
        tree.dump(self.top_tree_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_geometry::{IndexedSphere, Point3D};

    #[test]
    fn subtree_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirStorage::create(dir.path().join("shards")).unwrap();

        let entries: Vec<IndexedSphere> = (0..20)
            .map(|i| {
                IndexedSphere::new(i, Point3D::new(i as arbor_geometry::CoordType, 0.0, 0.0), 0.5)
                    .unwrap()
            })
            .collect();
        let subtree = storage.build_subtree(entries);
        storage.save_subtree(&subtree, 3).unwrap();

        let loaded: IndexTree<IndexedSphere> = storage.load_subtree(3).unwrap();
        assert_eq!(loaded.all_ids(), subtree.all_ids());
        assert!(storage.subtree_path(3).exists());
    }
}
