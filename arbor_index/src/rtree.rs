// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bulk-loaded bounding-volume tree with fanout 16 and linear splits.
//!
//! The tree is built once from a population with a Sort-Tile-Recursion pass
//! and is immutable afterwards except for [`IndexTree::insert`] and
//! [`IndexTree::place`], which append entities through the classic R-tree
//! insertion path. Queries traverse an arena of nodes with an explicit
//! stack, so traversal order (and therefore result order) is stable across
//! runs for identical builds.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use ordered_float::OrderedFloat;

use arbor_geometry::{Box3D, CoordType, EntryRecord, GidSegm, Indexed, Point3D, TreeShape};

use crate::query::{GeometryMode, Placeable, shape_matches, shape_overlaps_box};
use crate::record::{EntryStore, Record};

/// Maximum number of children per node.
pub const MAX_FANOUT: usize = 16;
/// Minimum number of children per node after a split.
pub const MIN_FANOUT: usize = 2;

#[derive(Copy, Clone, Debug)]
pub(crate) enum Child {
    /// An inner child node, by arena index.
    Node(usize),
    /// A stored entity, with its bounding box cached inline.
    Entry { index: usize, bbox: Box3D },
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) bbox: Box3D,
    pub(crate) leaf: bool,
    pub(crate) children: Vec<Child>,
}

/// A spatial index over entities of type `T`.
pub struct IndexTree<T: TreeShape + Record> {
    pub(crate) root: Option<usize>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) entries: EntryStore<T>,
}

impl<T: TreeShape + Record> Default for IndexTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TreeShape + Record> IndexTree<T> {
    /// An empty tree.
    pub fn new() -> Self {
        Self {
            root: None,
            nodes: Vec::new(),
            entries: EntryStore::empty(),
        }
    }

    /// Bulk-load a tree from a population. `O(n log n)` and deterministic
    /// for a given input order.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut tree = Self {
            root: None,
            nodes: Vec::new(),
            entries: EntryStore::from(entries.into_iter().collect::<Vec<_>>()),
        };
        tree.bulk_load();
        tree
    }

    pub(crate) fn from_parts(root: Option<usize>, nodes: Vec<Node>, entries: EntryStore<T>) -> Self {
        Self {
            root,
            nodes,
            entries,
        }
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree holds no entities.
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    /// Bounding box of the whole population, `None` when empty.
    pub fn bounds(&self) -> Option<Box3D> {
        self.root.map(|r| self.nodes[r].bbox)
    }

    /// Iterate over all stored entities, decoding as needed.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.entries.iter()
    }

    /// Stream every entity whose selected geometry intersects `shape` to
    /// `visit`. Each matching entity is visited exactly once, in traversal
    /// order.
    pub fn find_intersecting<Q, F>(&self, shape: &Q, mode: GeometryMode, mut visit: F)
    where
        Q: TreeShape,
        F: FnMut(&T),
    {
        let Some(root) = self.root else { return };
        let qbox = shape.bounding_box();
        let mut stack = vec![root];
        while let Some(ni) = stack.pop() {
            let node = &self.nodes[ni];
            if !node.bbox.intersects(&qbox) {
                continue;
            }
            for child in &node.children {
                match child {
                    Child::Node(ci) => stack.push(*ci),
                    Child::Entry { index, bbox } => {
                        if !bbox.intersects(&qbox) {
                            continue;
                        }
                        match mode {
                            GeometryMode::BoundingBox => {
                                if shape_overlaps_box(shape, bbox) {
                                    let entry = self.entries.get(*index);
                                    visit(&entry);
                                }
                            }
                            GeometryMode::BestEffort => {
                                let entry = self.entries.get(*index);
                                if shape_matches(shape, &entry, mode) {
                                    visit(&entry);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// The matching entities themselves. Mainly useful for id-less trees.
    pub fn find_intersecting_objs<Q: TreeShape>(&self, shape: &Q, mode: GeometryMode) -> Vec<T> {
        let mut out = Vec::new();
        self.find_intersecting(shape, mode, |e| out.push(e.clone()));
        out
    }

    /// Whether any indexed entity matches `shape`. Short-circuits.
    pub fn is_intersecting<Q: TreeShape>(&self, shape: &Q, mode: GeometryMode) -> bool {
        let Some(root) = self.root else { return false };
        let qbox = shape.bounding_box();
        let mut stack = vec![root];
        while let Some(ni) = stack.pop() {
            let node = &self.nodes[ni];
            if !node.bbox.intersects(&qbox) {
                continue;
            }
            for child in &node.children {
                match child {
                    Child::Node(ci) => stack.push(*ci),
                    Child::Entry { index, bbox } => {
                        if !bbox.intersects(&qbox) {
                            continue;
                        }
                        let hit = match mode {
                            GeometryMode::BoundingBox => shape_overlaps_box(shape, bbox),
                            GeometryMode::BestEffort => {
                                shape_matches(shape, &self.entries.get(*index), mode)
                            }
                        };
                        if hit {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Number of entities matching `shape`.
    pub fn count_intersecting<Q: TreeShape>(&self, shape: &Q, mode: GeometryMode) -> usize {
        let mut count = 0;
        self.find_intersecting(shape, mode, |_| count += 1);
        count
    }

    /// The `k` entities closest to `shape` by ascending bounding-box
    /// distance. Ties are broken by insertion order.
    pub fn find_nearest<Q: TreeShape>(&self, shape: &Q, k: usize) -> Vec<T> {
        #[derive(PartialEq, Eq, PartialOrd, Ord)]
        struct QueueKey {
            dist: OrderedFloat<CoordType>,
            is_entry: bool,
            index: usize,
        }

        let mut out = Vec::new();
        let Some(root) = self.root else { return out };
        if k == 0 {
            return out;
        }
        let qbox = shape.bounding_box();
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(QueueKey {
            dist: OrderedFloat(qbox.distance_sq_to_box(&self.nodes[root].bbox)),
            is_entry: false,
            index: root,
        }));
        while let Some(Reverse(item)) = heap.pop() {
            if item.is_entry {
                out.push(self.entries.get(item.index));
                if out.len() == k {
                    break;
                }
                continue;
            }
            for child in &self.nodes[item.index].children {
                let (dist, is_entry, index) = match child {
                    Child::Node(ci) => (
                        qbox.distance_sq_to_box(&self.nodes[*ci].bbox),
                        false,
                        *ci,
                    ),
                    Child::Entry { index, bbox } => {
                        (qbox.distance_sq_to_box(bbox), true, *index)
                    }
                };
                heap.push(Reverse(QueueKey {
                    dist: OrderedFloat(dist),
                    is_entry,
                    index,
                }));
            }
        }
        out
    }

    /// Append one entity. It is visible to every subsequent query.
    pub fn insert(&mut self, value: T) {
        let bbox = value.bounding_box();
        let index = self.entries.push(value);
        let entry = Child::Entry { index, bbox };
        match self.root {
            None => {
                let idx = self.nodes.len();
                self.nodes.push(Node {
                    bbox,
                    leaf: true,
                    children: vec![entry],
                });
                self.root = Some(idx);
            }
            Some(root_idx) => {
                if let Some(right_idx) = Self::insert_node(&mut self.nodes, root_idx, entry, bbox) {
                    // The root itself split: grow the tree by one level.
                    let left_bbox = self.nodes[root_idx].bbox;
                    let right_bbox = self.nodes[right_idx].bbox;
                    let idx = self.nodes.len();
                    self.nodes.push(Node {
                        bbox: left_bbox.union(&right_bbox),
                        leaf: false,
                        children: vec![Child::Node(root_idx), Child::Node(right_idx)],
                    });
                    self.root = Some(idx);
                }
            }
        }
    }

    /// Sweep `shape` along `+x` from the region center (or its own centroid
    /// when already inside the region) in steps of its own width until it
    /// reaches a spot whose centroid is covered by no indexed bounding box,
    /// then insert it there. Returns false once the sweep exits the region.
    pub fn place(&mut self, region: &Box3D, shape: &mut T) -> bool
    where
        T: Placeable,
    {
        let mut pos = if region.contains_point(&shape.centroid()) {
            shape.centroid()
        } else {
            region.center()
        };
        let step = shape.sweep_step();
        while region.contains_point(&pos) {
            if !self.covers_point(&pos) {
                *shape = shape.translated_to(pos);
                self.insert(shape.clone());
                return true;
            }
            if step <= 0.0 {
                return false;
            }
            pos.x += step;
        }
        false
    }

    /// Whether any indexed entity's bounding box strictly contains `p`.
    fn covers_point(&self, p: &Point3D) -> bool {
        let Some(root) = self.root else { return false };
        let mut stack = vec![root];
        while let Some(ni) = stack.pop() {
            let node = &self.nodes[ni];
            if !node.bbox.contains_point(p) {
                continue;
            }
            for child in &node.children {
                match child {
                    Child::Node(ci) => stack.push(*ci),
                    Child::Entry { bbox, .. } => {
                        if bbox.strictly_contains_point(p) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    fn insert_node(nodes: &mut Vec<Node>, node_idx: usize, entry: Child, entry_bbox: Box3D) -> Option<usize> {
        if nodes[node_idx].leaf {
            {
                let node = &mut nodes[node_idx];
                node.children.push(entry);
                node.bbox = node.bbox.union(&entry_bbox);
                if node.children.len() <= MAX_FANOUT {
                    return None;
                }
            }
            let overflowing = std::mem::take(&mut nodes[node_idx].children);
            let (left, right) = linear_split(overflowing, &|c| child_bbox(nodes, c));
            let left_bbox = children_bbox(nodes, &left);
            let right_bbox = children_bbox(nodes, &right);
            let node = &mut nodes[node_idx];
            node.children = left;
            node.bbox = left_bbox;
            let right_idx = nodes.len();
            nodes.push(Node {
                bbox: right_bbox,
                leaf: true,
                children: right,
            });
            Some(right_idx)
        } else {
            let target = {
                let children = &nodes[node_idx].children;
                choose_child(nodes, children, &entry_bbox)
            };
            let child_idx = match nodes[node_idx].children[target] {
                Child::Node(ci) => ci,
                Child::Entry { .. } => unreachable!("inner node holds an entry child"),
            };
            let split = Self::insert_node(nodes, child_idx, entry, entry_bbox);
            nodes[node_idx].bbox = nodes[node_idx].bbox.union(&entry_bbox);
            if let Some(new_right) = split {
                nodes[node_idx]
                    .children
                    .insert(target + 1, Child::Node(new_right));
                if nodes[node_idx].children.len() > MAX_FANOUT {
                    let overflowing = std::mem::take(&mut nodes[node_idx].children);
                    let (left, right) = linear_split(overflowing, &|c| child_bbox(nodes, c));
                    let left_bbox = children_bbox(nodes, &left);
                    let right_bbox = children_bbox(nodes, &right);
                    let node = &mut nodes[node_idx];
                    node.children = left;
                    node.bbox = left_bbox;
                    let right_idx = nodes.len();
                    nodes.push(Node {
                        bbox: right_bbox,
                        leaf: false,
                        children: right,
                    });
                    return Some(right_idx);
                }
            }
            None
        }
    }

    /// Pack all entities into nodes with a Sort-Tile-Recursion pass over
    /// x, then y, then z.
    pub(crate) fn bulk_load(&mut self) {
        self.nodes.clear();
        self.root = None;
        let n = self.entries.len();
        if n == 0 {
            return;
        }
        let mut items: Vec<(usize, Box3D, Point3D)> = Vec::with_capacity(n);
        for (i, entry) in self.entries.iter().enumerate() {
            items.push((i, entry.bounding_box(), entry.centroid()));
        }

        let mut level = build_leaf_level(&mut self.nodes, &mut items);
        while level.len() > 1 {
            level = build_upper_level(&mut self.nodes, level);
        }
        self.root = Some(level[0]);
    }
}

impl<T: TreeShape + Record + Indexed> IndexTree<T> {
    /// Ids of the matching entities, in traversal order.
    pub fn find_intersecting_ids<Q: TreeShape>(&self, shape: &Q, mode: GeometryMode) -> Vec<u64> {
        let mut out = Vec::new();
        self.find_intersecting(shape, mode, |e| out.push(e.id()));
        out
    }

    /// Decoded (gid, section, segment) triples of the matching entities.
    pub fn find_intersecting_gid_segm<Q: TreeShape>(
        &self,
        shape: &Q,
        mode: GeometryMode,
    ) -> Vec<GidSegm> {
        let mut out = Vec::new();
        self.find_intersecting(shape, mode, |e| out.push(e.gid_segm()));
        out
    }

    /// Full result records (ids, centroid, kind) of the matching entities.
    pub fn find_intersecting_records<Q: TreeShape>(
        &self,
        shape: &Q,
        mode: GeometryMode,
    ) -> Vec<EntryRecord> {
        let mut out = Vec::new();
        self.find_intersecting(shape, mode, |e| out.push(e.record()));
        out
    }

    /// Per-gid hit counts. The values sum to `count_intersecting`.
    pub fn count_intersecting_agg_gid<Q: TreeShape>(
        &self,
        shape: &Q,
        mode: GeometryMode,
    ) -> HashMap<u64, usize> {
        let mut out = HashMap::new();
        self.find_intersecting(shape, mode, |e| *out.entry(e.gid()).or_insert(0) += 1);
        out
    }

    /// Ids of every indexed entity, in storage order.
    pub fn all_ids(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.id()).collect()
    }
}

impl<T: TreeShape + Record> std::fmt::Debug for IndexTree<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexTree")
            .field("entries", &self.entries.len())
            .field("nodes", &self.nodes.len())
            .field("has_root", &self.root.is_some())
            .finish_non_exhaustive()
    }
}

fn child_bbox(nodes: &[Node], child: &Child) -> Box3D {
    match child {
        Child::Node(ci) => nodes[*ci].bbox,
        Child::Entry { bbox, .. } => *bbox,
    }
}

fn children_bbox(nodes: &[Node], children: &[Child]) -> Box3D {
    let mut it = children.iter();
    let first = child_bbox(
        nodes,
        it.next().expect("split produced an empty child group"),
    );
    it.fold(first, |acc, c| acc.union(&child_bbox(nodes, c)))
}

fn volume(b: &Box3D) -> f64 {
    let dx = (b.max.x - b.min.x) as f64;
    let dy = (b.max.y - b.min.y) as f64;
    let dz = (b.max.z - b.min.z) as f64;
    dx * dy * dz
}

fn enlargement(group: &Box3D, bbox: &Box3D) -> f64 {
    volume(&group.union(bbox)) - volume(group)
}

/// Least-enlargement child selection, ties by smaller volume then position.
fn choose_child(nodes: &[Node], children: &[Child], bbox: &Box3D) -> usize {
    let mut best = 0;
    let mut best_cost = f64::INFINITY;
    let mut best_volume = f64::INFINITY;
    for (i, child) in children.iter().enumerate() {
        let cb = child_bbox(nodes, child);
        let cost = enlargement(&cb, bbox);
        let vol = volume(&cb);
        if cost < best_cost || (cost == best_cost && vol < best_volume) {
            best = i;
            best_cost = cost;
            best_volume = vol;
        }
    }
    best
}

/// Guttman's linear split: seed the two groups with the pair of children
/// showing the greatest normalized separation on any axis, then assign the
/// rest by least enlargement.
fn linear_split(children: Vec<Child>, bbox_of: &dyn Fn(&Child) -> Box3D) -> (Vec<Child>, Vec<Child>) {
    let n = children.len();
    let boxes: Vec<Box3D> = children.iter().map(bbox_of).collect();

    let mut best_sep = f64::NEG_INFINITY;
    let mut seeds = (0, n - 1);
    for axis in 0..3 {
        let lo = |b: &Box3D| b.min[axis];
        let hi = |b: &Box3D| b.max[axis];
        let mut lowest_hi = 0;
        let mut highest_lo = 0;
        let mut min_lo = lo(&boxes[0]);
        let mut max_hi = hi(&boxes[0]);
        for (i, b) in boxes.iter().enumerate() {
            if hi(b) < hi(&boxes[lowest_hi]) {
                lowest_hi = i;
            }
            if lo(b) > lo(&boxes[highest_lo]) {
                highest_lo = i;
            }
            min_lo = min_lo.min(lo(b));
            max_hi = max_hi.max(hi(b));
        }
        let extent = (max_hi - min_lo) as f64;
        if extent <= 0.0 || lowest_hi == highest_lo {
            continue;
        }
        let sep = (lo(&boxes[highest_lo]) - hi(&boxes[lowest_hi])) as f64 / extent;
        if sep > best_sep {
            best_sep = sep;
            seeds = (lowest_hi, highest_lo);
        }
    }
    let (seed_a, seed_b) = seeds;

    let mut left = vec![children[seed_a]];
    let mut right = vec![children[seed_b]];
    let mut left_bbox = boxes[seed_a];
    let mut right_bbox = boxes[seed_b];

    let remaining: Vec<usize> = (0..n).filter(|&i| i != seed_a && i != seed_b).collect();
    for (done, &i) in remaining.iter().enumerate() {
        let left_to_assign = remaining.len() - done;
        // Force-feed a group that cannot otherwise reach the minimum fill.
        if left.len() + left_to_assign <= MIN_FANOUT {
            left.push(children[i]);
            left_bbox = left_bbox.union(&boxes[i]);
            continue;
        }
        if right.len() + left_to_assign <= MIN_FANOUT {
            right.push(children[i]);
            right_bbox = right_bbox.union(&boxes[i]);
            continue;
        }
        let grow_left = enlargement(&left_bbox, &boxes[i]);
        let grow_right = enlargement(&right_bbox, &boxes[i]);
        let go_left = match grow_left.partial_cmp(&grow_right) {
            Some(std::cmp::Ordering::Less) => true,
            Some(std::cmp::Ordering::Greater) => false,
            _ => match volume(&left_bbox).partial_cmp(&volume(&right_bbox)) {
                Some(std::cmp::Ordering::Less) => true,
                Some(std::cmp::Ordering::Greater) => false,
                _ => left.len() <= right.len(),
            },
        };
        if go_left {
            left.push(children[i]);
            left_bbox = left_bbox.union(&boxes[i]);
        } else {
            right.push(children[i]);
            right_bbox = right_bbox.union(&boxes[i]);
        }
    }
    (left, right)
}

/// Smallest `g` with `g^3 >= k`.
fn cube_side(k: usize) -> usize {
    let mut g = 1;
    while g * g * g < k {
        g += 1;
    }
    g
}

fn build_leaf_level(nodes: &mut Vec<Node>, items: &mut [(usize, Box3D, Point3D)]) -> Vec<usize> {
    let n = items.len();
    let n_groups = n.div_ceil(MAX_FANOUT);
    let g = cube_side(n_groups);
    let mut leaves = Vec::with_capacity(n_groups);

    items.sort_by(|a, b| a.2.x.total_cmp(&b.2.x));
    let x_slice = n.div_ceil(g);
    for xs in items.chunks_mut(x_slice) {
        xs.sort_by(|a, b| a.2.y.total_cmp(&b.2.y));
        let y_slice = xs.len().div_ceil(g);
        for ys in xs.chunks_mut(y_slice) {
            ys.sort_by(|a, b| a.2.z.total_cmp(&b.2.z));
            for group in ys.chunks(MAX_FANOUT) {
                let children: Vec<Child> = group
                    .iter()
                    .map(|(index, bbox, _)| Child::Entry {
                        index: *index,
                        bbox: *bbox,
                    })
                    .collect();
                let bbox = children_bbox(nodes, &children);
                let idx = nodes.len();
                nodes.push(Node {
                    bbox,
                    leaf: true,
                    children,
                });
                leaves.push(idx);
            }
        }
    }
    leaves
}

fn build_upper_level(nodes: &mut Vec<Node>, level: Vec<usize>) -> Vec<usize> {
    let n = level.len();
    let n_groups = n.div_ceil(MAX_FANOUT);
    let g = cube_side(n_groups);
    let mut items: Vec<(usize, Box3D, Point3D)> = level
        .into_iter()
        .map(|i| (i, nodes[i].bbox, nodes[i].bbox.center()))
        .collect();
    let mut parents = Vec::with_capacity(n_groups);

    items.sort_by(|a, b| a.2.x.total_cmp(&b.2.x));
    let x_slice = n.div_ceil(g);
    for xs in items.chunks_mut(x_slice) {
        xs.sort_by(|a, b| a.2.y.total_cmp(&b.2.y));
        let y_slice = xs.len().div_ceil(g);
        for ys in xs.chunks_mut(y_slice) {
            ys.sort_by(|a, b| a.2.z.total_cmp(&b.2.z));
            for group in ys.chunks(MAX_FANOUT) {
                let children: Vec<Child> =
                    group.iter().map(|(index, _, _)| Child::Node(*index)).collect();
                let bbox = children_bbox(nodes, &children);
                let idx = nodes.len();
                nodes.push(Node {
                    bbox,
                    leaf: false,
                    children,
                });
                parents.push(idx);
            }
        }
    }
    parents
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_geometry::{
        Cylinder, GeometryEntry, IndexedSphere, MorphoEntry, Segment, Soma, Sphere, Synapse,
    };

    fn sphere(x: CoordType, y: CoordType, z: CoordType, r: CoordType) -> Sphere {
        Sphere::new(Point3D::new(x, y, z), r).unwrap()
    }

    fn test_spheres() -> Vec<Sphere> {
        vec![
            sphere(0.0, 0.0, 0.0, 2.0),
            sphere(10.0, 0.0, 0.0, 2.5),
            sphere(20.0, 0.0, 0.0, 4.0),
        ]
    }

    fn test_cylinders() -> Vec<Cylinder> {
        [
            ([0.0, 0.0, 0.0], [0.0, 5.0, 0.0], 2.0),
            ([10.0, 0.0, 0.0], [10.0, 5.0, 0.0], 2.5),
            ([20.0, 0.0, 0.0], [20.0, 5.0, 0.0], 4.0),
        ]
        .into_iter()
        .map(|(p1, p2, r): ([CoordType; 3], [CoordType; 3], CoordType)| {
            Cylinder::new(
                Point3D::new(p1[0], p1[1], p1[2]),
                Point3D::new(p2[0], p2[1], p2[2]),
                r,
            )
            .unwrap()
        })
        .collect()
    }

    fn probes() -> [Sphere; 4] {
        [
            sphere(15.0, 0.0, 0.0, 2.0),
            sphere(5.0, 0.0, 0.0, 2.0),
            sphere(0.0, -3.0, 0.0, 2.0),
            sphere(0.0, 6.0, 0.0, 2.0),
        ]
    }

    #[test]
    fn basic_sphere_tree() {
        let tree = IndexTree::from_entries(test_spheres());
        let expected = [true, false, true, false];
        for (probe, expect) in probes().iter().zip(expected) {
            assert_eq!(tree.is_intersecting(probe, GeometryMode::BestEffort), expect);
            assert_eq!(tree.is_intersecting(probe, GeometryMode::BoundingBox), expect);
        }
    }

    #[test]
    fn basic_cylinder_tree() {
        let tree = IndexTree::from_entries(test_cylinders());
        // The second probe grazes only past flat caps, the last one reaches
        // a cap disk.
        let expected = [true, false, false, true];
        for (probe, expect) in probes().iter().zip(expected) {
            assert_eq!(tree.is_intersecting(probe, GeometryMode::BestEffort), expect);
        }
    }

    #[test]
    fn indexed_sphere_ids() {
        let entries: Vec<IndexedSphere> = test_spheres()
            .into_iter()
            .enumerate()
            .map(|(i, s)| IndexedSphere {
                id: i as u64,
                sphere: s,
            })
            .collect();
        let tree = IndexTree::from_entries(entries);
        let ids = |probe: &Sphere| tree.find_intersecting_ids(probe, GeometryMode::BestEffort);
        let p = probes();
        assert_eq!(ids(&p[0]), vec![2]);
        assert_eq!(ids(&p[1]), Vec::<u64>::new());
        assert_eq!(ids(&p[2]), vec![0]);
        assert_eq!(ids(&p[3]), Vec::<u64>::new());
        let mut all = tree.all_ids();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2]);
    }

    #[test]
    fn synapse_aggregation_by_post_gid() {
        let centers = [0.0, 10.0, 20.0];
        let post_gids = [1u64, 2, 2];
        let synapses: Vec<Synapse> = centers
            .iter()
            .zip(post_gids)
            .enumerate()
            .map(|(i, (&x, post))| Synapse::new(i as u64, post, 0, Point3D::new(x, 0.0, 0.0)))
            .collect();
        let tree = IndexTree::from_entries(synapses);

        let narrow = Box3D::new(Point3D::new(-1.0, -1.0, -1.0), Point3D::new(11.0, 1.0, 1.0))
            .unwrap();
        assert_eq!(tree.count_intersecting(&narrow, GeometryMode::BoundingBox), 2);
        let agg = tree.count_intersecting_agg_gid(&narrow, GeometryMode::BoundingBox);
        assert_eq!(agg.get(&1), Some(&1));
        assert_eq!(agg.get(&2), Some(&1));

        let wide = Box3D::new(Point3D::new(-1.0, -1.0, -1.0), Point3D::new(21.0, 1.0, 1.0))
            .unwrap();
        let agg = tree.count_intersecting_agg_gid(&wide, GeometryMode::BoundingBox);
        assert_eq!(agg.get(&1), Some(&1));
        assert_eq!(agg.get(&2), Some(&2));
        let total: usize = agg.values().sum();
        assert_eq!(total, tree.count_intersecting(&wide, GeometryMode::BoundingBox));
    }

    #[test]
    fn count_matches_find_for_every_mode() {
        let tree = IndexTree::from_entries(test_cylinders());
        for probe in probes() {
            for mode in [GeometryMode::BoundingBox, GeometryMode::BestEffort] {
                let found = tree.find_intersecting_objs(&probe, mode).len();
                assert_eq!(tree.count_intersecting(&probe, mode), found);
            }
        }
    }

    #[test]
    fn morpho_variant_tree_with_insert() {
        let soma = Soma::new(0, Point3D::new(0.0, 0.0, 0.0), 2.0).unwrap();
        let mut tree = IndexTree::from_entries(vec![MorphoEntry::Soma(soma)]);
        tree.insert(MorphoEntry::Segment(
            Segment::new(
                10,
                0,
                0,
                Point3D::new(0.0, 0.0, 0.0),
                Point3D::new(0.0, 5.0, 0.0),
                2.0,
            )
            .unwrap(),
        ));

        // Above the segment cap: only the segment reaches.
        let probe = sphere(0.0, 6.0, 0.0, 2.0);
        let ids = tree.find_intersecting_ids(&probe, GeometryMode::BestEffort);
        assert_eq!(ids.len(), 1);
        let records = tree.find_intersecting_records(&probe, GeometryMode::BestEffort);
        assert_eq!(records[0].gid, 10);
        assert_eq!(records[0].kind, arbor_geometry::EntryKind::Segment);
    }

    #[test]
    fn inserted_entities_are_queryable_after_splits() {
        let mut tree: IndexTree<IndexedSphere> = IndexTree::new();
        for i in 0..100u64 {
            tree.insert(IndexedSphere {
                id: i,
                sphere: sphere(i as CoordType, 0.0, 0.0, 0.4),
            });
        }
        assert_eq!(tree.len(), 100);
        for i in [0u64, 17, 63, 99] {
            let probe = Sphere::point(Point3D::new(i as CoordType, 0.0, 0.0));
            let ids = tree.find_intersecting_ids(&probe, GeometryMode::BestEffort);
            assert_eq!(ids, vec![i]);
        }
        let all = tree.count_intersecting(
            &Box3D::new(Point3D::new(-1.0, -1.0, -1.0), Point3D::new(100.0, 1.0, 1.0)).unwrap(),
            GeometryMode::BoundingBox,
        );
        assert_eq!(all, 100);
    }

    #[test]
    fn query_matches_linear_scan() {
        // A slab of segments plus a layer of somas, checked against a brute
        // force filter with the same predicates.
        let mut entries = Vec::new();
        for i in 0..8 {
            for j in 0..8 {
                let x = i as CoordType * 3.0;
                let y = j as CoordType * 3.0;
                entries.push(MorphoEntry::Segment(
                    Segment::new(
                        (i * 8 + j) as u64,
                        1,
                        0,
                        Point3D::new(x, y, 0.0),
                        Point3D::new(x + 2.0, y, 0.0),
                        0.5,
                    )
                    .unwrap(),
                ));
                entries.push(MorphoEntry::Soma(
                    Soma::new((i * 8 + j) as u64, Point3D::new(x, y, 5.0), 1.0).unwrap(),
                ));
            }
        }
        let tree = IndexTree::from_entries(entries.clone());
        for probe in [
            sphere(5.0, 5.0, 0.0, 3.0),
            sphere(10.0, 10.0, 5.0, 2.0),
            sphere(-5.0, -5.0, -5.0, 1.0),
        ] {
            for mode in [GeometryMode::BoundingBox, GeometryMode::BestEffort] {
                let mut expected: Vec<u64> = entries
                    .iter()
                    .filter(|e| shape_matches(&probe, *e, mode))
                    .map(|e| e.id())
                    .collect();
                let mut got = tree.find_intersecting_ids(&probe, mode);
                expected.sort_unstable();
                got.sort_unstable();
                assert_eq!(got, expected);
            }
        }
    }

    #[test]
    fn nearest_orders_by_box_distance() {
        let entries: Vec<IndexedSphere> = (0..10u64)
            .map(|i| IndexedSphere {
                id: i + 5,
                sphere: sphere(i as CoordType, 0.0, 0.0, 1.0),
            })
            .collect();
        let tree = IndexTree::from_entries(entries);
        let near = tree.find_nearest(&Sphere::point(Point3D::new(5.0, 0.0, 0.0)), 3);
        let mut ids: Vec<u64> = near.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![9, 10, 11]);
    }

    #[test]
    fn nearest_breaks_ties_by_insertion_order() {
        // Four identical spheres: the first k inserted win.
        let entries: Vec<IndexedSphere> = (0..4u64)
            .map(|i| IndexedSphere {
                id: i,
                sphere: sphere(0.0, 0.0, 0.0, 1.0),
            })
            .collect();
        let tree = IndexTree::from_entries(entries);
        let near = tree.find_nearest(&Sphere::point(Point3D::new(10.0, 0.0, 0.0)), 2);
        let ids: Vec<u64> = near.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn placement_sweeps_past_occupied_rows() {
        let mut tree = IndexTree::from_entries(test_spheres());
        let region = Box3D::new(Point3D::new(0.0, 0.0, -2.0), Point3D::new(20.0, 5.0, 2.0))
            .unwrap();

        let mut first = sphere(0.0, 0.0, 0.0, 2.0);
        assert!(tree.place(&region, &mut first));
        assert!(first.centroid.x > 1.0);
        assert!(region.contains_point(&first.centroid));

        let mut second = sphere(0.0, 0.0, 0.0, 2.0);
        assert!(tree.place(&region, &mut second));
        assert!(second.centroid.x > first.centroid.x);
    }

    #[test]
    fn geometry_entry_tree_mixes_shapes() {
        let mut tree = IndexTree::from_entries(
            test_spheres()
                .into_iter()
                .map(GeometryEntry::Sphere)
                .collect::<Vec<_>>(),
        );
        tree.insert(GeometryEntry::Cylinder(
            Cylinder::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(0.0, 5.0, 0.0), 2.0)
                .unwrap(),
        ));
        let expected = [true, false, true, true];
        for (probe, expect) in probes().iter().zip(expected) {
            assert_eq!(tree.is_intersecting(probe, GeometryMode::BestEffort), expect);
        }
    }

    #[test]
    fn traversal_order_is_stable() {
        let entries: Vec<IndexedSphere> = (0..50u64)
            .map(|i| IndexedSphere {
                id: i,
                sphere: sphere((i % 10) as CoordType, (i / 10) as CoordType, 0.0, 0.6),
            })
            .collect();
        let a = IndexTree::from_entries(entries.clone());
        let b = IndexTree::from_entries(entries);
        let probe = sphere(4.0, 2.0, 0.0, 3.0);
        assert_eq!(
            a.find_intersecting_ids(&probe, GeometryMode::BestEffort),
            b.find_intersecting_ids(&probe, GeometryMode::BestEffort)
        );
    }
}
