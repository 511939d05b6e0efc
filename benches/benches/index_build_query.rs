// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};

use arbor_geometry::{CoordType, MorphoEntry, Point3D, Segment, Soma, Sphere};
use arbor_index::{GeometryMode, IndexTree, MorphVoxelGrid};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_coord(&mut self, span: CoordType) -> CoordType {
        let v = self.next_u64() >> 11;
        (v as CoordType) / ((1u64 << 53) as CoordType) * span
    }
}

fn gen_morphology(n_neurons: u64, segments_per_neuron: u32) -> Vec<MorphoEntry> {
    let mut out = Vec::with_capacity((n_neurons * (segments_per_neuron as u64 + 1)) as usize);
    let mut rng = Rng::new(0xA5B3_17C9_42D8_6E01);
    for gid in 0..n_neurons {
        let mut p = Point3D::new(
            rng.next_coord(500.0),
            rng.next_coord(500.0),
            rng.next_coord(500.0),
        );
        out.push(MorphoEntry::Soma(Soma::new(gid, p, 4.0).unwrap()));
        for seg in 0..segments_per_neuron {
            let q = Point3D::new(
                p.x + rng.next_coord(6.0) - 3.0,
                p.y + rng.next_coord(6.0) - 3.0,
                p.z + rng.next_coord(6.0) - 3.0,
            );
            out.push(MorphoEntry::Segment(
                Segment::new(gid, 1, seg, p, q, 0.8).unwrap(),
            ));
            p = q;
        }
    }
    out
}

fn bench_bulk_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_build");
    for &n_neurons in &[100u64, 1000] {
        let entries = gen_morphology(n_neurons, 20);
        group.throughput(Throughput::Elements(entries.len() as u64));
        group.bench_function(format!("morphology_n{}", entries.len()), |b| {
            b.iter_batched(
                || entries.clone(),
                |entries| black_box(IndexTree::from_entries(entries)),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_query_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_modes");
    let tree = IndexTree::from_entries(gen_morphology(1000, 20));
    let mut rng = Rng::new(0x5EED_5EED_5EED_5EED);
    let probes: Vec<Sphere> = (0..256)
        .map(|_| {
            Sphere::new(
                Point3D::new(
                    rng.next_coord(500.0),
                    rng.next_coord(500.0),
                    rng.next_coord(500.0),
                ),
                10.0,
            )
            .unwrap()
        })
        .collect();
    for (label, mode) in [
        ("bounding_box", GeometryMode::BoundingBox),
        ("best_effort", GeometryMode::BestEffort),
    ] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let mut total = 0usize;
                for probe in &probes {
                    total += tree.count_intersecting(probe, mode);
                }
                black_box(total);
            })
        });
    }
    group.finish();
}

fn bench_nearest(c: &mut Criterion) {
    let mut group = c.benchmark_group("nearest");
    let tree = IndexTree::from_entries(gen_morphology(1000, 20));
    group.bench_function("k8_sweep", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for i in 0..64 {
                let probe = Sphere::point(Point3D::new(
                    (i * 7 % 500) as CoordType,
                    (i * 13 % 500) as CoordType,
                    (i * 29 % 500) as CoordType,
                ));
                total += tree.find_nearest(&probe, 8).len();
            }
            black_box(total);
        })
    });
    group.finish();
}

fn bench_grid_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("voxel_grid");
    let entries = gen_morphology(500, 20);
    group.throughput(Throughput::Elements(entries.len() as u64));
    group.bench_function("stream_insert", |b| {
        b.iter_batched(
            MorphVoxelGrid::<10>::new,
            |mut grid| {
                for e in entries.iter().cloned() {
                    grid.insert(e);
                }
                black_box(grid.size());
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_bulk_build,
    bench_query_modes,
    bench_nearest,
    bench_grid_stream,
);
criterion_main!(benches);
