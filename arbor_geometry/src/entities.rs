// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Indexed entities: geometry paired with a packed identifier.
//!
//! Heterogeneous populations are stored as tagged unions ([`MorphoEntry`],
//! [`GeometryEntry`]) and dispatched by exhaustive match, so the kernel
//! predicates stay free of dynamic calls. The capability traits
//! ([`TreeShape`], [`Indexed`]) are the only interface the index crates need.

use crate::ids::{MorphPartId, SubtreeId, SynapseId};
use crate::shapes::{Cylinder, Sphere};
use crate::{Box3D, CoordType, GeometryError, Point3D};

/// Borrowed view of an entity's geometry, used for exact-predicate dispatch.
#[derive(Copy, Clone, Debug)]
pub enum GeometryRef<'a> {
    /// A sphere.
    Sphere(&'a Sphere),
    /// A capped cylinder.
    Cylinder(&'a Cylinder),
    /// An axis-aligned box.
    Box(&'a Box3D),
}

/// Exact intersection between two geometry views, where a predicate exists.
///
/// Returns `None` for pairs without an exact test (anything involving a box
/// against a cylinder); callers fall back to bounding boxes there.
pub fn geometries_intersect(a: GeometryRef<'_>, b: GeometryRef<'_>) -> Option<bool> {
    match (a, b) {
        (GeometryRef::Sphere(x), GeometryRef::Sphere(y)) => Some(x.intersects_sphere(y)),
        (GeometryRef::Sphere(x), GeometryRef::Cylinder(y))
        | (GeometryRef::Cylinder(y), GeometryRef::Sphere(x)) => Some(x.intersects_cylinder(y)),
        (GeometryRef::Cylinder(x), GeometryRef::Cylinder(y)) => Some(x.intersects_cylinder(y)),
        (GeometryRef::Box(x), GeometryRef::Box(y)) => Some(x.intersects(y)),
        (GeometryRef::Sphere(x), GeometryRef::Box(y))
        | (GeometryRef::Box(y), GeometryRef::Sphere(x)) => Some(x.intersects_box(y)),
        _ => None,
    }
}

/// Spatial capabilities every indexed value provides.
pub trait TreeShape: Clone {
    /// The tight axis-aligned bounding box.
    fn bounding_box(&self) -> Box3D;
    /// The point used as sort key by the bulk loaders.
    fn centroid(&self) -> Point3D;
    /// A view of the geometry for exact-predicate dispatch.
    fn geometry(&self) -> GeometryRef<'_>;
}

/// Identity capabilities of entities that carry an id.
pub trait Indexed {
    /// The raw 64-bit identifier.
    fn id(&self) -> u64;
    /// The gid used by per-neuron aggregation.
    fn gid(&self) -> u64;
    /// The decoded (gid, section, segment) triple.
    fn gid_segm(&self) -> GidSegm;
    /// The full result record.
    fn record(&self) -> EntryRecord;
}

/// Decoded composite identifier of a hit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GidSegm {
    /// Neuron gid.
    pub gid: u64,
    /// Section id, zero when not applicable.
    pub section_id: u32,
    /// Segment id, zero when not applicable.
    pub segment_id: u32,
}

/// What kind of entity produced a hit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    /// A soma sphere.
    Soma = 0,
    /// A dendrite or axon segment.
    Segment = 1,
    /// A synapse point.
    Synapse = 2,
    /// A bare indexed sphere.
    Sphere = 3,
    /// The bounding box of a saved subtree.
    SubtreeBox = 4,
}

/// Full per-hit record handed to result consumers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EntryRecord {
    /// Neuron gid.
    pub gid: u64,
    /// Section id.
    pub section_id: u32,
    /// Segment id.
    pub segment_id: u32,
    /// Centroid of the entity.
    pub centroid: Point3D,
    /// Entity kind.
    pub kind: EntryKind,
}

/// A soma: a sphere with a morphology-piece identifier.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Soma {
    /// Packed identifier, section and segment are zero.
    pub id: MorphPartId,
    /// Soma geometry.
    pub sphere: Sphere,
}

impl Soma {
    /// A soma for neuron `gid` at `centroid`.
    pub fn new(gid: u64, centroid: Point3D, radius: CoordType) -> Result<Self, GeometryError> {
        Ok(Self {
            id: MorphPartId::new(gid, 0, 0)?,
            sphere: Sphere::new(centroid, radius)?,
        })
    }
}

/// A dendrite or axon segment: a capped cylinder with a packed identifier.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Segment {
    /// Packed (gid, section, segment) identifier.
    pub id: MorphPartId,
    /// Segment geometry.
    pub cylinder: Cylinder,
}

impl Segment {
    /// A segment of neuron `gid` between `p1` and `p2`.
    pub fn new(
        gid: u64,
        section_id: u32,
        segment_id: u32,
        p1: Point3D,
        p2: Point3D,
        radius: CoordType,
    ) -> Result<Self, GeometryError> {
        Ok(Self {
            id: MorphPartId::new(gid, section_id, segment_id)?,
            cylinder: Cylinder::new(p1, p2, radius)?,
        })
    }
}

/// A synapse: a zero-radius sphere with endpoint gids.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Synapse {
    /// Synapse identifier with both endpoint gids.
    pub id: SynapseId,
    /// Synapse position as a zero-radius sphere.
    pub sphere: Sphere,
}

impl Synapse {
    /// A synapse `id` between `pre_gid` and `post_gid` at `point`.
    pub fn new(id: u64, post_gid: u64, pre_gid: u64, point: Point3D) -> Self {
        Self {
            id: SynapseId::new(id, post_gid, pre_gid),
            sphere: Sphere::point(point),
        }
    }
}

/// A sphere tagged with a plain numeric id.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IndexedSphere {
    /// Plain identifier.
    pub id: u64,
    /// Sphere geometry.
    pub sphere: Sphere,
}

impl IndexedSphere {
    /// An id-tagged sphere.
    pub fn new(id: u64, centroid: Point3D, radius: CoordType) -> Result<Self, GeometryError> {
        Ok(Self {
            id,
            sphere: Sphere::new(centroid, radius)?,
        })
    }
}

/// The bounding box of one saved subtree, indexed by the top-level tree.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IndexedSubtreeBox {
    /// Storage key and element count of the subtree.
    pub id: SubtreeId,
    /// Bounding box of everything the subtree holds.
    pub bbox: Box3D,
}

impl IndexedSubtreeBox {
    /// Tag a subtree bounding box with its storage key and size.
    pub fn new(id: u64, n_elements: u64, bbox: Box3D) -> Self {
        Self {
            id: SubtreeId::new(id, n_elements),
            bbox,
        }
    }
}

/// A morphology piece: either a soma or a segment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MorphoEntry {
    /// A soma sphere.
    Soma(Soma),
    /// A segment cylinder.
    Segment(Segment),
}

/// A bare geometric primitive without identity.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GeometryEntry {
    /// A sphere.
    Sphere(Sphere),
    /// A capped cylinder.
    Cylinder(Cylinder),
}

impl From<Soma> for MorphoEntry {
    fn from(s: Soma) -> Self {
        Self::Soma(s)
    }
}

impl From<Segment> for MorphoEntry {
    fn from(s: Segment) -> Self {
        Self::Segment(s)
    }
}

impl From<Sphere> for GeometryEntry {
    fn from(s: Sphere) -> Self {
        Self::Sphere(s)
    }
}

impl From<Cylinder> for GeometryEntry {
    fn from(c: Cylinder) -> Self {
        Self::Cylinder(c)
    }
}

impl TreeShape for Sphere {
    fn bounding_box(&self) -> Box3D {
        Sphere::bounding_box(self)
    }
    fn centroid(&self) -> Point3D {
        self.centroid
    }
    fn geometry(&self) -> GeometryRef<'_> {
        GeometryRef::Sphere(self)
    }
}

impl TreeShape for Cylinder {
    fn bounding_box(&self) -> Box3D {
        Cylinder::bounding_box(self)
    }
    fn centroid(&self) -> Point3D {
        Cylinder::centroid(self)
    }
    fn geometry(&self) -> GeometryRef<'_> {
        GeometryRef::Cylinder(self)
    }
}

impl TreeShape for Box3D {
    fn bounding_box(&self) -> Box3D {
        *self
    }
    fn centroid(&self) -> Point3D {
        self.center()
    }
    fn geometry(&self) -> GeometryRef<'_> {
        GeometryRef::Box(self)
    }
}

impl TreeShape for Soma {
    fn bounding_box(&self) -> Box3D {
        self.sphere.bounding_box()
    }
    fn centroid(&self) -> Point3D {
        self.sphere.centroid
    }
    fn geometry(&self) -> GeometryRef<'_> {
        GeometryRef::Sphere(&self.sphere)
    }
}

impl TreeShape for Segment {
    fn bounding_box(&self) -> Box3D {
        self.cylinder.bounding_box()
    }
    fn centroid(&self) -> Point3D {
        self.cylinder.centroid()
    }
    fn geometry(&self) -> GeometryRef<'_> {
        GeometryRef::Cylinder(&self.cylinder)
    }
}

impl TreeShape for Synapse {
    fn bounding_box(&self) -> Box3D {
        self.sphere.bounding_box()
    }
    fn centroid(&self) -> Point3D {
        self.sphere.centroid
    }
    fn geometry(&self) -> GeometryRef<'_> {
        GeometryRef::Sphere(&self.sphere)
    }
}

impl TreeShape for IndexedSphere {
    fn bounding_box(&self) -> Box3D {
        self.sphere.bounding_box()
    }
    fn centroid(&self) -> Point3D {
        self.sphere.centroid
    }
    fn geometry(&self) -> GeometryRef<'_> {
        GeometryRef::Sphere(&self.sphere)
    }
}

impl TreeShape for IndexedSubtreeBox {
    fn bounding_box(&self) -> Box3D {
        self.bbox
    }
    fn centroid(&self) -> Point3D {
        self.bbox.center()
    }
    fn geometry(&self) -> GeometryRef<'_> {
        GeometryRef::Box(&self.bbox)
    }
}

impl TreeShape for MorphoEntry {
    fn bounding_box(&self) -> Box3D {
        match self {
            Self::Soma(s) => s.bounding_box(),
            Self::Segment(s) => s.bounding_box(),
        }
    }
    fn centroid(&self) -> Point3D {
        match self {
            Self::Soma(s) => s.centroid(),
            Self::Segment(s) => s.centroid(),
        }
    }
    fn geometry(&self) -> GeometryRef<'_> {
        match self {
            Self::Soma(s) => s.geometry(),
            Self::Segment(s) => s.geometry(),
        }
    }
}

impl TreeShape for GeometryEntry {
    fn bounding_box(&self) -> Box3D {
        match self {
            Self::Sphere(s) => s.bounding_box(),
            Self::Cylinder(c) => c.bounding_box(),
        }
    }
    fn centroid(&self) -> Point3D {
        match self {
            Self::Sphere(s) => s.centroid,
            Self::Cylinder(c) => c.centroid(),
        }
    }
    fn geometry(&self) -> GeometryRef<'_> {
        match self {
            Self::Sphere(s) => GeometryRef::Sphere(s),
            Self::Cylinder(c) => GeometryRef::Cylinder(c),
        }
    }
}

impl Indexed for Soma {
    fn id(&self) -> u64 {
        self.id.raw()
    }
    fn gid(&self) -> u64 {
        self.id.gid()
    }
    fn gid_segm(&self) -> GidSegm {
        GidSegm {
            gid: self.id.gid(),
            section_id: self.id.section_id(),
            segment_id: self.id.segment_id(),
        }
    }
    fn record(&self) -> EntryRecord {
        let GidSegm {
            gid,
            section_id,
            segment_id,
        } = self.gid_segm();
        EntryRecord {
            gid,
            section_id,
            segment_id,
            centroid: self.sphere.centroid,
            kind: EntryKind::Soma,
        }
    }
}

impl Indexed for Segment {
    fn id(&self) -> u64 {
        self.id.raw()
    }
    fn gid(&self) -> u64 {
        self.id.gid()
    }
    fn gid_segm(&self) -> GidSegm {
        GidSegm {
            gid: self.id.gid(),
            section_id: self.id.section_id(),
            segment_id: self.id.segment_id(),
        }
    }
    fn record(&self) -> EntryRecord {
        let GidSegm {
            gid,
            section_id,
            segment_id,
        } = self.gid_segm();
        EntryRecord {
            gid,
            section_id,
            segment_id,
            centroid: self.cylinder.centroid(),
            kind: EntryKind::Segment,
        }
    }
}

impl Indexed for Synapse {
    fn id(&self) -> u64 {
        self.id.id
    }
    fn gid(&self) -> u64 {
        self.id.post_gid
    }
    fn gid_segm(&self) -> GidSegm {
        GidSegm {
            gid: self.id.post_gid,
            section_id: 0,
            segment_id: 0,
        }
    }
    fn record(&self) -> EntryRecord {
        EntryRecord {
            gid: self.id.post_gid,
            section_id: 0,
            segment_id: 0,
            centroid: self.sphere.centroid,
            kind: EntryKind::Synapse,
        }
    }
}

impl Indexed for IndexedSphere {
    fn id(&self) -> u64 {
        self.id
    }
    fn gid(&self) -> u64 {
        self.id
    }
    fn gid_segm(&self) -> GidSegm {
        GidSegm {
            gid: self.id,
            section_id: 0,
            segment_id: 0,
        }
    }
    fn record(&self) -> EntryRecord {
        EntryRecord {
            gid: self.id,
            section_id: 0,
            segment_id: 0,
            centroid: self.sphere.centroid,
            kind: EntryKind::Sphere,
        }
    }
}

impl Indexed for IndexedSubtreeBox {
    fn id(&self) -> u64 {
        self.id.id
    }
    fn gid(&self) -> u64 {
        self.id.id
    }
    fn gid_segm(&self) -> GidSegm {
        GidSegm {
            gid: self.id.id,
            section_id: 0,
            segment_id: 0,
        }
    }
    fn record(&self) -> EntryRecord {
        EntryRecord {
            gid: self.id.id,
            section_id: 0,
            segment_id: 0,
            centroid: self.bbox.center(),
            kind: EntryKind::SubtreeBox,
        }
    }
}

impl Indexed for MorphoEntry {
    fn id(&self) -> u64 {
        match self {
            Self::Soma(s) => s.id(),
            Self::Segment(s) => s.id(),
        }
    }
    fn gid(&self) -> u64 {
        match self {
            Self::Soma(s) => s.gid(),
            Self::Segment(s) => s.gid(),
        }
    }
    fn gid_segm(&self) -> GidSegm {
        match self {
            Self::Soma(s) => s.gid_segm(),
            Self::Segment(s) => s.gid_segm(),
        }
    }
    fn record(&self) -> EntryRecord {
        match self {
            Self::Soma(s) => s.record(),
            Self::Segment(s) => s.record(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_record_decodes_packed_id() {
        let seg = Segment::new(
            7,
            3,
            2,
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(2.0, 0.0, 0.0),
            1.0,
        )
        .unwrap();
        let rec = seg.record();
        assert_eq!(rec.gid, 7);
        assert_eq!(rec.section_id, 3);
        assert_eq!(rec.segment_id, 2);
        assert_eq!(rec.kind, EntryKind::Segment);
        assert_eq!(rec.centroid, Point3D::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn synapse_aggregates_by_post_gid() {
        let syn = Synapse::new(11, 42, 9, Point3D::new(1.0, 2.0, 3.0));
        assert_eq!(syn.gid(), 42);
        assert_eq!(syn.id(), 11);
        assert_eq!(syn.sphere.radius, 0.0);
        let bbox = syn.bounding_box();
        assert_eq!(bbox.min, bbox.max);
    }

    #[test]
    fn morpho_entry_dispatches_by_variant() {
        let soma: MorphoEntry = Soma::new(1, Point3D::new(0.0, 0.0, 0.0), 2.0).unwrap().into();
        let seg: MorphoEntry = Segment::new(
            2,
            1,
            0,
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(0.0, 5.0, 0.0),
            1.0,
        )
        .unwrap()
        .into();
        assert!(matches!(soma.geometry(), GeometryRef::Sphere(_)));
        assert!(matches!(seg.geometry(), GeometryRef::Cylinder(_)));
        assert_eq!(soma.record().kind, EntryKind::Soma);
        assert_eq!(seg.record().kind, EntryKind::Segment);
        assert_eq!(seg.bounding_box().max.y, 6.0);
    }

    #[test]
    fn exact_dispatch_covers_kernel_pairs() {
        let s = Sphere::new(Point3D::new(0.0, 0.0, 0.0), 1.0).unwrap();
        let c = Cylinder::new(Point3D::new(0.5, 0.0, 0.0), Point3D::new(3.0, 0.0, 0.0), 0.5)
            .unwrap();
        let b = Box3D::new(Point3D::new(-1.0, -1.0, -1.0), Point3D::new(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(
            geometries_intersect(GeometryRef::Sphere(&s), GeometryRef::Cylinder(&c)),
            Some(true)
        );
        assert_eq!(
            geometries_intersect(GeometryRef::Box(&b), GeometryRef::Box(&b)),
            Some(true)
        );
        // No exact cylinder-box predicate: callers fall back to boxes.
        assert_eq!(
            geometries_intersect(GeometryRef::Cylinder(&c), GeometryRef::Box(&b)),
            None
        );
    }
}
