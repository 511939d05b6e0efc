// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The collective substrate the loader runs on.
//!
//! The loader needs only a handful of collectives: rank and size, a
//! communicator split, an all-gather of one count, a variable-length gather
//! to rank 0, and a stable sort-and-balance of keyed values. The transport
//! is injected through the [`Communicator`] trait; this module ships the
//! trivial single-rank [`SelfComm`] and the in-process [`ThreadComm`],
//! which runs a whole rank group inside one process on threads. The latter
//! backs single-node multi-shard builds and the loader tests.
//!
//! [`ThreadComm`] endpoints are wired as a mesh of bounded
//! `crossbeam-channel` mailboxes, one inbox per rank. Payloads cross the
//! channels as [`Record`]-encoded bytes, so the same fixed wire format that
//! backs the persistent files serves as the collective datatype. Each
//! collective carries a sequence number; a packet arriving from a rank that
//! is already one collective ahead is parked until its round comes up.
//!
//! All collectives are symmetric: every rank of a communicator must enter
//! the same sequence of calls, and errors surface on every rank. A rank
//! abandoning a collective early would leave its peers blocked, exactly as
//! on any message-passing substrate.

use std::cell::{Cell, RefCell};

use byteorder::{ByteOrder, LittleEndian};
use crossbeam_channel::{Receiver, Sender, bounded};

use arbor_geometry::CoordType;
use arbor_index::Record;

use crate::error::LoadError;

/// Collective operations the distributed loader requires.
pub trait Communicator: Sized {
    /// This process's rank within the communicator, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the communicator.
    fn size(&self) -> usize;

    /// Partition the communicator: ranks passing the same `color` form a
    /// new communicator, ordered by `key`.
    fn split(&self, color: usize, key: usize) -> Result<Self, LoadError>;

    /// Gather one count from every rank, ordered by rank.
    fn all_gather_count(&self, count: usize) -> Result<Vec<usize>, LoadError>;

    /// Gather variable-length data to rank 0, ordered by rank. Returns
    /// `Some` on rank 0 and `None` elsewhere.
    fn gather_to_root<T>(&self, items: &[T]) -> Result<Option<Vec<T>>, LoadError>
    where
        T: Record + Clone;

    /// Globally sort `values` by `key` and rebalance them so every rank
    /// holds `floor(N / size)` or `ceil(N / size)` of them. The sort is
    /// stable: equal keys keep the relative order they had on their
    /// originating ranks, in rank order.
    fn sort_balance_by_key<T, K>(&self, values: &mut Vec<T>, key: K) -> Result<(), LoadError>
    where
        T: Record + Clone,
        K: Fn(&T) -> CoordType;
}

/// The trivial communicator of a lone rank.
#[derive(Copy, Clone, Debug, Default)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn split(&self, _color: usize, _key: usize) -> Result<Self, LoadError> {
        Ok(SelfComm)
    }

    fn all_gather_count(&self, count: usize) -> Result<Vec<usize>, LoadError> {
        Ok(vec![count])
    }

    fn gather_to_root<T>(&self, items: &[T]) -> Result<Option<Vec<T>>, LoadError>
    where
        T: Record + Clone,
    {
        Ok(Some(items.to_vec()))
    }

    fn sort_balance_by_key<T, K>(&self, values: &mut Vec<T>, key: K) -> Result<(), LoadError>
    where
        T: Record + Clone,
        K: Fn(&T) -> CoordType,
    {
        values.sort_by(|a, b| key(a).total_cmp(&key(b)));
        Ok(())
    }
}

/// One collective's payload from one rank.
struct Packet {
    from: usize,
    seq: u64,
    bytes: Vec<u8>,
}

/// A rank of an in-process communicator group running on threads.
///
/// [`ThreadComm::cluster`] hands out one endpoint per rank; each endpoint
/// is moved onto its own thread, which then drives the loader exactly as a
/// separate process would.
pub struct ThreadComm {
    rank: usize,
    size: usize,
    seq: Cell<u64>,
    peers: Vec<Sender<Packet>>,
    inbox: Receiver<Packet>,
    handoff_peers: Vec<Sender<ThreadComm>>,
    handoff: Receiver<ThreadComm>,
    parked: RefCell<Vec<Packet>>,
}

impl ThreadComm {
    /// Create a group of `size` connected endpoints.
    pub fn cluster(size: usize) -> Vec<ThreadComm> {
        Self::mesh(size)
    }

    /// Build the channel mesh of a fresh group: one packet inbox per rank
    /// plus one handoff lane for delivering split endpoints.
    fn mesh(size: usize) -> Vec<ThreadComm> {
        let mut packet_senders = Vec::with_capacity(size);
        let mut packet_receivers = Vec::with_capacity(size);
        for _ in 0..size {
            // A rank holds at most the current round and one round a fast
            // peer has raced ahead into.
            let (s, r) = bounded(2 * size);
            packet_senders.push(s);
            packet_receivers.push(r);
        }
        let mut handoff_senders = Vec::with_capacity(size);
        let mut handoff_receivers = Vec::with_capacity(size);
        for _ in 0..size {
            let (s, r) = bounded(1);
            handoff_senders.push(s);
            handoff_receivers.push(r);
        }
        packet_receivers
            .into_iter()
            .zip(handoff_receivers)
            .enumerate()
            .map(|(rank, (inbox, handoff))| ThreadComm {
                rank,
                size,
                seq: Cell::new(0),
                peers: packet_senders.clone(),
                inbox,
                handoff_peers: handoff_senders.clone(),
                handoff,
                parked: RefCell::new(Vec::new()),
            })
            .collect()
    }

    /// All-to-all exchange of one byte payload per rank, returned in rank
    /// order.
    fn exchange(&self, payload: Vec<u8>) -> Vec<Vec<u8>> {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        for peer in &self.peers {
            peer.send(Packet {
                from: self.rank,
                seq,
                bytes: payload.clone(),
            })
            .expect("peer endpoint dropped mid-collective");
        }

        let mut slots: Vec<Option<Vec<u8>>> = (0..self.size).map(|_| None).collect();
        let mut received = 0;
        {
            let mut parked = self.parked.borrow_mut();
            let mut i = 0;
            while i < parked.len() {
                if parked[i].seq == seq {
                    let packet = parked.swap_remove(i);
                    slots[packet.from] = Some(packet.bytes);
                    received += 1;
                } else {
                    i += 1;
                }
            }
        }
        while received < self.size {
            let packet = self
                .inbox
                .recv()
                .expect("peer endpoint dropped mid-collective");
            if packet.seq == seq {
                slots[packet.from] = Some(packet.bytes);
                received += 1;
            } else {
                self.parked.borrow_mut().push(packet);
            }
        }
        slots
            .into_iter()
            .map(|s| s.expect("collective round completed with a missing rank"))
            .collect()
    }

    /// All-to-all exchange of record slices, decoded back per rank.
    fn exchange_records<T: Record>(&self, items: &[T]) -> Result<Vec<Vec<T>>, LoadError> {
        let mut payload = vec![0u8; items.len() * T::SIZE];
        for (chunk, item) in payload.chunks_exact_mut(T::SIZE).zip(items) {
            item.write_record(chunk);
        }
        self.exchange(payload)
            .into_iter()
            .map(|bytes| decode_records(&bytes))
            .collect()
    }
}

fn decode_records<T: Record>(bytes: &[u8]) -> Result<Vec<T>, LoadError> {
    bytes
        .chunks_exact(T::SIZE)
        .map(|chunk| Ok(T::read_record(chunk)?))
        .collect()
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn split(&self, color: usize, key: usize) -> Result<Self, LoadError> {
        let mut payload = [0u8; 16];
        LittleEndian::write_u64(&mut payload[..8], color as u64);
        LittleEndian::write_u64(&mut payload[8..], key as u64);
        let assignments: Vec<(usize, usize)> = self
            .exchange(payload.to_vec())
            .into_iter()
            .map(|bytes| {
                (
                    LittleEndian::read_u64(&bytes[..8]) as usize,
                    LittleEndian::read_u64(&bytes[8..]) as usize,
                )
            })
            .collect();

        let mut members: Vec<(usize, usize)> = assignments
            .iter()
            .enumerate()
            .filter(|(_, (c, _))| *c == color)
            .map(|(rank, (_, k))| (*k, rank))
            .collect();
        members.sort_unstable();
        let leader = members[0].1;

        // The leader of each group builds the new mesh and hands every
        // member its endpoint, ordered by key.
        if self.rank == leader {
            let endpoints = Self::mesh(members.len());
            for ((_, old_rank), endpoint) in members.iter().zip(endpoints) {
                self.handoff_peers[*old_rank]
                    .send(endpoint)
                    .expect("split member dropped before receiving its endpoint");
            }
        }
        Ok(self
            .handoff
            .recv()
            .expect("split leader dropped before delivering the new communicator"))
    }

    fn all_gather_count(&self, count: usize) -> Result<Vec<usize>, LoadError> {
        let mut payload = [0u8; 8];
        LittleEndian::write_u64(&mut payload, count as u64);
        Ok(self
            .exchange(payload.to_vec())
            .into_iter()
            .map(|bytes| LittleEndian::read_u64(&bytes) as usize)
            .collect())
    }

    fn gather_to_root<T>(&self, items: &[T]) -> Result<Option<Vec<T>>, LoadError>
    where
        T: Record + Clone,
    {
        // Counts travel first, as on a wire transport.
        let counts = self.all_gather_count(items.len())?;
        let shards = self.exchange_records(items)?;
        if self.rank == 0 {
            let mut out = Vec::with_capacity(counts.iter().sum());
            for shard in shards {
                out.extend(shard);
            }
            Ok(Some(out))
        } else {
            Ok(None)
        }
    }

    fn sort_balance_by_key<T, K>(&self, values: &mut Vec<T>, key: K) -> Result<(), LoadError>
    where
        T: Record + Clone,
        K: Fn(&T) -> CoordType,
    {
        let local = std::mem::take(values);
        let shards = self.exchange_records(&local)?;
        let total: usize = shards.iter().map(Vec::len).sum();
        let mut merged = Vec::with_capacity(total);
        for shard in shards {
            merged.extend(shard);
        }
        // Stable, so equal keys keep their rank-order position.
        merged.sort_by(|a, b| key(a).total_cmp(&key(b)));

        let start = self.rank * total / self.size;
        let end = (self.rank + 1) * total / self.size;
        *values = merged[start..end].to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_geometry::{IndexedSphere, Point3D};

    fn run_on_cluster<F>(size: usize, f: F)
    where
        F: Fn(ThreadComm) + Send + Sync,
    {
        let comms = ThreadComm::cluster(size);
        std::thread::scope(|scope| {
            for comm in comms {
                scope.spawn(|| f(comm));
            }
        });
    }

    fn sphere_at(id: u64, x: CoordType) -> IndexedSphere {
        IndexedSphere::new(id, Point3D::new(x, 0.0, 0.0), 0.1).unwrap()
    }

    #[test]
    fn self_comm_sort_is_stable() {
        let comm = SelfComm;
        let mut values = vec![sphere_at(0, 2.0), sphere_at(1, 1.0), sphere_at(2, 2.0)];
        comm.sort_balance_by_key(&mut values, |s| s.sphere.centroid.x)
            .unwrap();
        let ids: Vec<u64> = values.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 0, 2]);
    }

    #[test]
    fn all_gather_orders_by_rank() {
        run_on_cluster(4, |comm| {
            let counts = comm.all_gather_count(comm.rank() * 10).unwrap();
            assert_eq!(counts, vec![0, 10, 20, 30]);
        });
    }

    #[test]
    fn gather_concatenates_in_rank_order() {
        run_on_cluster(3, |comm| {
            let local: Vec<IndexedSphere> = (0..=comm.rank() as u64)
                .map(|i| sphere_at(comm.rank() as u64 * 10 + i, 0.0))
                .collect();
            let gathered = comm.gather_to_root(&local).unwrap();
            if comm.rank() == 0 {
                let ids: Vec<u64> = gathered.unwrap().iter().map(|s| s.id).collect();
                assert_eq!(ids, vec![0, 10, 11, 20, 21, 22]);
            } else {
                assert!(gathered.is_none());
            }
        });
    }

    #[test]
    fn sort_balance_is_globally_sorted_and_balanced() {
        let total = 23;
        run_on_cluster(4, |comm| {
            // Rank r starts with every fourth element, descending.
            let mut values: Vec<IndexedSphere> = (0..total)
                .filter(|i| (*i as usize) % 4 == comm.rank())
                .map(|i| sphere_at(i, (total - i) as CoordType))
                .collect();
            comm.sort_balance_by_key(&mut values, |s| s.sphere.centroid.x)
                .unwrap();

            let quota = total as usize / 4;
            assert!(values.len() == quota || values.len() == quota + 1);
            assert!(
                values
                    .windows(2)
                    .all(|w| w[0].sphere.centroid.x <= w[1].sphere.centroid.x)
            );

            let shards = comm.gather_to_root(&values).unwrap();
            if let Some(all) = shards {
                assert_eq!(all.len(), total as usize);
                assert!(
                    all.windows(2)
                        .all(|w| w[0].sphere.centroid.x <= w[1].sphere.centroid.x)
                );
            }
        });
    }

    #[test]
    fn sort_balance_keeps_rank_order_on_ties() {
        run_on_cluster(2, |comm| {
            // Identical keys everywhere: order must stay (rank 0's values,
            // then rank 1's), each rank keeping its local order.
            let mut values: Vec<IndexedSphere> = (0..4)
                .map(|i| sphere_at(comm.rank() as u64 * 100 + i, 5.0))
                .collect();
            comm.sort_balance_by_key(&mut values, |s| s.sphere.centroid.x)
                .unwrap();
            let ids: Vec<u64> = values.iter().map(|s| s.id).collect();
            if comm.rank() == 0 {
                assert_eq!(ids, vec![0, 1, 2, 3]);
            } else {
                assert_eq!(ids, vec![100, 101, 102, 103]);
            }
        });
    }

    #[test]
    fn split_renumbers_ranks_within_color() {
        run_on_cluster(4, |comm| {
            let color = comm.rank() / 2;
            let sub = comm.split(color, comm.rank()).unwrap();
            assert_eq!(sub.size(), 2);
            assert_eq!(sub.rank(), comm.rank() % 2);

            // The subcommunicator works on its own.
            let counts = sub.all_gather_count(sub.rank() + 1).unwrap();
            assert_eq!(counts, vec![1, 2]);
        });
    }

    #[test]
    fn staggered_ranks_keep_collective_rounds_apart() {
        // Rank 0 sleeps between collectives so its peers race one round
        // ahead; the sequence tags must keep the rounds from mixing.
        run_on_cluster(3, |comm| {
            for round in 0..5usize {
                if comm.rank() == 0 {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                let counts = comm.all_gather_count(round * 10 + comm.rank()).unwrap();
                assert_eq!(counts, vec![round * 10, round * 10 + 1, round * 10 + 2]);
            }
        });
    }
}
