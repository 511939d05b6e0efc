// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two-level Sort-Tile-Recursion bulk loading.
//!
//! Level one runs across ranks: for each axis in x, y, z order, a
//! distributed sort-and-balance lines the population up along that axis,
//! then the communicator splits into one slice per grid coordinate and the
//! next axis recurses inside the slice. After the z round every rank holds
//! the contiguous shard of one cell of an `(Rx, Ry, Rz)` rank grid.
//!
//! Level two is the serial STR on each rank's shard: the same
//! sort-and-slice scheme partitions the shard into tiles of bounded size,
//! each tile becomes a saved subtree, and rank 0 builds a top-level tree
//! over the gathered subtree bounding boxes.

use tracing::{debug, info};

use arbor_geometry::{IndexedSubtreeBox, TreeShape};
use arbor_index::Record;

use crate::cancel::check_signals;
use crate::comm::Communicator;
use crate::error::LoadError;
use crate::storage::Storage;

/// Parameters of a serial STR pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerialStrParams {
    /// Number of elements being partitioned.
    pub n_elements: usize,
    /// Partitions per axis, x, y, z.
    pub n_parts_per_dim: [usize; 3],
}

impl SerialStrParams {
    /// Choose a cubic partition grid so no partition holds more than about
    /// `max_elements_per_part` elements.
    pub fn from_heuristic(n_elements: usize, max_elements_per_part: usize) -> Self {
        let n_parts = n_elements.div_ceil(max_elements_per_part.max(1)).max(1);
        let g = cube_side(n_parts);
        Self {
            n_elements,
            n_parts_per_dim: [g, g, g],
        }
    }

    /// Total number of partitions.
    pub fn n_parts(&self) -> usize {
        self.n_parts_per_dim.iter().product()
    }

    /// Start offsets of every partition, plus the end offset; the slice
    /// `boundaries[k]..boundaries[k + 1]` is partition `k`. Matches the
    /// nested even splits of [`serial_sort_tile_recursion`].
    pub fn partition_boundaries(&self) -> Vec<usize> {
        let [px, py, pz] = self.n_parts_per_dim;
        let n = self.n_elements;
        let mut out = Vec::with_capacity(px * py * pz + 1);
        out.push(0);
        for i in 0..px {
            let xa = i * n / px;
            let nx = (i + 1) * n / px - xa;
            for j in 0..py {
                let ya = j * nx / py;
                let ny = (j + 1) * nx / py - ya;
                for k in 0..pz {
                    out.push(xa + ya + (k + 1) * ny / pz);
                }
            }
        }
        out
    }
}

/// Rank-grid shape of the distributed level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributedStrParams {
    /// Ranks per axis, x, y, z. The product is the communicator size.
    pub n_ranks_per_dim: [usize; 3],
}

impl DistributedStrParams {
    /// Number of ranks inside one slice along `dim`, which is the divisor
    /// turning a rank into its slice color.
    pub fn ranks_in_subslice(&self, dim: usize) -> usize {
        self.n_ranks_per_dim[dim + 1..].iter().product()
    }
}

/// Per-rank partition counts of the serial level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalStrParams {
    /// Partitions per axis on each rank.
    pub n_parts_per_dim: [usize; 3],
}

/// Parameters of both levels together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TwoLevelStrParams {
    /// The rank-grid level.
    pub distributed: DistributedStrParams,
    /// The per-rank serial level.
    pub local: LocalStrParams,
}

/// Smallest `g` with `g^3 >= k`.
fn cube_side(k: usize) -> usize {
    let mut g = 1;
    while g * g * g < k {
        g += 1;
    }
    g
}

/// Spread `comm_size` ranks over a 3D grid, allocating factors of two
/// round-robin over x, y, z. The size must be a power of two.
pub fn rank_distribution(comm_size: usize) -> [usize; 3] {
    assert!(
        comm_size.is_power_of_two(),
        "communicator size must be a power of two, got {comm_size}"
    );
    let mut exponents = [0u32; 3];
    for k in 0..comm_size.trailing_zeros() {
        exponents[(k % 3) as usize] += 1;
    }
    let dist = [
        1usize << exponents[0],
        1usize << exponents[1],
        1usize << exponents[2],
    ];
    debug_assert_eq!(dist[0] * dist[1] * dist[2], comm_size);
    dist
}

/// Per-rank serial partition counts: the overall partition grid divided by
/// the rank grid, rounded up.
pub fn infer_local_str_params(
    overall: &SerialStrParams,
    distributed: &DistributedStrParams,
) -> LocalStrParams {
    let mut parts = [0; 3];
    for d in 0..3 {
        parts[d] = overall.n_parts_per_dim[d].div_ceil(distributed.n_ranks_per_dim[d]);
    }
    LocalStrParams {
        n_parts_per_dim: parts,
    }
}

/// Combine the rank grid with the partition heuristic for `n_elements`
/// elements in total.
pub fn two_level_str_heuristic(
    n_elements: usize,
    max_elements_per_part: usize,
    comm_size: usize,
) -> TwoLevelStrParams {
    let distributed = DistributedStrParams {
        n_ranks_per_dim: rank_distribution(comm_size),
    };
    let overall = SerialStrParams::from_heuristic(n_elements, max_elements_per_part);
    let local = infer_local_str_params(&overall, &distributed);
    TwoLevelStrParams { distributed, local }
}

/// Serial STR: sort by x and slice, sort each slice by y and slice, sort
/// each cell by z. Sorting is stable throughout.
pub fn serial_sort_tile_recursion<T: TreeShape>(values: &mut [T], params: &SerialStrParams) {
    serial_str_dim(values, &params.n_parts_per_dim, 0);
}

fn serial_str_dim<T: TreeShape>(values: &mut [T], parts: &[usize; 3], dim: usize) {
    values.sort_by(|a, b| a.centroid()[dim].total_cmp(&b.centroid()[dim]));
    if dim == 2 {
        return;
    }
    let n = values.len();
    let p = parts[dim].max(1);
    for i in 0..p {
        let (a, b) = (i * n / p, (i + 1) * n / p);
        serial_str_dim(&mut values[a..b], parts, dim + 1);
    }
}

/// Distributed STR over the full rank grid, starting at the x axis.
pub fn distributed_sort_tile_recursion<T, C>(
    values: &mut Vec<T>,
    params: &DistributedStrParams,
    comm: &C,
) -> Result<(), LoadError>
where
    T: TreeShape + Record,
    C: Communicator,
{
    distributed_str_dim(values, params, comm, 0)
}

fn distributed_str_dim<T, C>(
    values: &mut Vec<T>,
    params: &DistributedStrParams,
    comm: &C,
    dim: usize,
) -> Result<(), LoadError>
where
    T: TreeShape + Record,
    C: Communicator,
{
    check_signals()?;
    comm.sort_balance_by_key(values, |v: &T| v.centroid()[dim])?;

    // An empty shard would starve the serial level; surface it on every
    // rank so collectives stay aligned.
    let shard_sizes = comm.all_gather_count(values.len())?;
    if let Some(rank) = shard_sizes.iter().position(|&n| n == 0) {
        return Err(LoadError::EmptyPartition { rank });
    }

    if dim == 2 {
        return Ok(());
    }
    let color = comm.rank() / params.ranks_in_subslice(dim);
    let sub = comm.split(color, comm.rank())?;
    distributed_str_dim(values, params, &sub, dim + 1)
}

/// Gather every rank's subtree bounding boxes on rank 0, ordered by rank.
/// Counts are exchanged first and checked against the substrate's 32-bit
/// limit.
pub fn gather_subtree_boxes<C: Communicator>(
    local_boxes: &[IndexedSubtreeBox],
    comm: &C,
) -> Result<Option<Vec<IndexedSubtreeBox>>, LoadError> {
    if local_boxes.len() > i32::MAX as usize {
        return Err(LoadError::IntegerOverflow(local_boxes.len()));
    }
    let counts = comm.all_gather_count(local_boxes.len())?;
    if let Some(&too_big) = counts.iter().find(|&&c| c > i32::MAX as usize) {
        return Err(LoadError::IntegerOverflow(too_big));
    }
    comm.gather_to_root(local_boxes)
}

/// Run the whole two-level bulk load over this rank's `values`.
///
/// After the distributed STR, the rank's shard is tiled by the serial STR;
/// each tile is built into a subtree and saved under `rank * parts + k`,
/// and rank 0 saves a top-level tree over all subtree bounding boxes.
/// Fails with [`LoadError::InsufficientElements`] when the local input
/// cannot feed the rank grid.
pub fn distributed_partition<T, C, S>(
    values: &mut Vec<T>,
    max_elements_per_part: usize,
    storage: &S,
    comm: &C,
) -> Result<(), LoadError>
where
    T: TreeShape + Record,
    C: Communicator,
    S: Storage<T>,
{
    if values.len() < 10 * comm.size() {
        return Err(LoadError::InsufficientElements {
            count: values.len(),
            ranks: comm.size(),
        });
    }
    let n_global: usize = comm.all_gather_count(values.len())?.iter().sum();
    let params = two_level_str_heuristic(n_global, max_elements_per_part, comm.size());
    info!(
        rank = comm.rank(),
        local = values.len(),
        global = n_global,
        rank_grid = ?params.distributed.n_ranks_per_dim,
        "starting two-level bulk load"
    );

    distributed_sort_tile_recursion(values, &params.distributed, comm)?;

    let serial = SerialStrParams {
        n_elements: values.len(),
        n_parts_per_dim: params.local.n_parts_per_dim,
    };
    serial_sort_tile_recursion(values, &serial);

    let boundaries = serial.partition_boundaries();
    let n_parts = serial.n_parts();
    let mut local_boxes = Vec::with_capacity(n_parts);
    for k in 0..n_parts {
        check_signals()?;
        let slice = &values[boundaries[k]..boundaries[k + 1]];
        if slice.is_empty() {
            continue;
        }
        let subtree = storage.build_subtree(slice.to_vec());
        let key = comm.rank() * n_parts + k;
        storage.save_subtree(&subtree, key)?;
        let bounds = subtree.bounds().expect("non-empty subtree has bounds");
        local_boxes.push(IndexedSubtreeBox::new(
            key as u64,
            subtree.len() as u64,
            bounds,
        ));
        debug!(rank = comm.rank(), key, elements = subtree.len(), "saved subtree");
    }

    check_signals()?;
    if let Some(boxes) = gather_subtree_boxes(&local_boxes, comm)? {
        let top = storage.build_top_tree(boxes);
        storage.save_top_tree(&top)?;
        info!(subtrees = top.len(), "saved top-level tree");
    }
    Ok(())
}
