// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors surfaced by the distributed bulk loader.

use thiserror::Error;

use arbor_index::IndexError;

/// Failures of the two-level bulk load. Every error propagates to the
/// caller immediately; nothing is retried.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The local input is too small for the rank count; the partition
    /// heuristic needs a minimum density to avoid empty shards.
    #[error("{count} local elements are too few for {ranks} ranks (need at least 10 per rank)")]
    InsufficientElements { count: usize, ranks: usize },
    /// The distributed sort left a rank without elements.
    #[error("distributed sort produced an empty shard on rank {rank}")]
    EmptyPartition { rank: usize },
    /// A count crossing a collective boundary exceeds the substrate's
    /// 32-bit limit.
    #[error("count {0} exceeds the collective substrate's 32-bit limit")]
    IntegerOverflow(usize),
    /// A termination signal was observed at a checkpoint.
    #[error("bulk load cancelled by a termination signal")]
    Cancelled,
    /// Saving or building an index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}
