// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Index a small synthetic neuron and run a few queries against it.

use arbor_geometry::{CoordType, Point3D, Sphere};
use arbor_index::{GeometryMode, IndexTree};

fn main() {
    // A soma at the origin and one neurite arcing away from it.
    let points: Vec<Point3D> = (0..20)
        .map(|i| {
            let t = i as CoordType;
            Point3D::new(t, (t * 0.5).sin() * 3.0, 0.0)
        })
        .collect();
    let radii: Vec<CoordType> = (0..20).map(|i| 1.0 - i as CoordType * 0.03).collect();

    let mut tree = IndexTree::new();
    tree.add_soma(1, Point3D::new(0.0, 0.0, 0.0), 3.0).unwrap();
    tree.add_neuron(1, &points, &radii, &[]).unwrap();
    println!("indexed {} morphology pieces", tree.len());

    let probe = Sphere::new(Point3D::new(10.0, 0.0, 0.0), 2.0).unwrap();
    let hits = tree.find_intersecting_records(&probe, GeometryMode::BestEffort);
    println!("{} pieces intersect the probe:", hits.len());
    for hit in hits {
        println!(
            "  gid {} section {} segment {} at {:?}",
            hit.gid, hit.section_id, hit.segment_id, hit.centroid
        );
    }

    let nearest = tree.find_nearest(&Sphere::point(Point3D::new(5.0, 5.0, 0.0)), 3);
    println!("3 nearest pieces to (5, 5, 0):");
    for e in nearest {
        use arbor_geometry::Indexed;
        let g = e.gid_segm();
        println!("  section {} segment {}", g.section_id, g.segment_id);
    }
}
