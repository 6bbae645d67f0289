//! Fixed-radius accident buffers.
//!
//! Each accident gets a disk of [`BufferBuilder::radius`] in the projected
//! coordinate system. Overlapping disks are unioned and the union is split
//! into its connected components. A component carries the highest severity
//! weight among the accidents inside it: the score answers "how close did
//! you get to the worst nearby accident", not "how many".

use std::f64::consts::TAU;

use geo::{BooleanOps, Coord, Intersects, LineString, MapCoords, MultiPolygon, Point, Polygon};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree, RTreeObject};
use walk_safe_accident_models::AccidentRecord;

use crate::projection::CoordinateTransform;
use crate::{SpatialError, compute_envelope};

/// Default buffer radius, in projected units (meters for LV95).
pub const DEFAULT_BUFFER_RADIUS: f64 = 7.0;

/// Number of vertices used to approximate a disk.
pub const DEFAULT_DISK_SEGMENTS: usize = 64;

/// One connected component of the buffer union.
#[derive(Debug, Clone, PartialEq)]
pub struct AccidentBuffer {
    /// The buffer outline.
    pub polygon: Polygon<f64>,
    /// Highest severity weight among the accidents inside this buffer.
    pub weight: u8,
    /// Number of accidents inside this buffer.
    pub accident_count: usize,
}

/// Builds unioned accident buffers.
#[derive(Debug, Clone, Copy)]
pub struct BufferBuilder {
    radius: f64,
    segments: usize,
}

impl Default for BufferBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_RADIUS)
    }
}

impl BufferBuilder {
    /// Creates a builder with the given radius.
    #[must_use]
    pub const fn new(radius: f64) -> Self {
        Self {
            radius,
            segments: DEFAULT_DISK_SEGMENTS,
        }
    }

    /// Overrides the number of vertices per disk (minimum 8).
    #[must_use]
    pub const fn with_segments(mut self, segments: usize) -> Self {
        self.segments = if segments < 8 { 8 } else { segments };
        self
    }

    /// The buffer radius.
    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }

    /// Approximates the disk around `center` as a regular polygon.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn disk(&self, center: Coord<f64>) -> Polygon<f64> {
        let mut ring: Vec<Coord<f64>> = (0..self.segments)
            .map(|i| {
                let angle = TAU * i as f64 / self.segments as f64;
                Coord {
                    x: self.radius.mul_add(angle.cos(), center.x),
                    y: self.radius.mul_add(angle.sin(), center.y),
                }
            })
            .collect();
        ring.push(ring[0]);

        Polygon::new(LineString::new(ring), vec![])
    }

    /// Builds buffers in the accidents' own projected coordinate system.
    ///
    /// Returns an empty collection when there are no accidents.
    #[must_use]
    pub fn build(&self, accidents: &[AccidentRecord]) -> Vec<AccidentBuffer> {
        let centers: Vec<Coord<f64>> = accidents
            .iter()
            .map(|a| Coord {
                x: a.easting,
                y: a.northing,
            })
            .collect();

        let mut buffers = Vec::new();

        for cluster in self.candidate_clusters(&centers) {
            let mut disks = cluster.iter().map(|&i| self.disk(centers[i]));
            let Some(first) = disks.next() else {
                continue;
            };
            let merged = disks.fold(MultiPolygon::new(vec![first]), |acc, disk| acc.union(&disk));

            let cluster_max = cluster
                .iter()
                .map(|&i| accidents[i].weight())
                .max()
                .unwrap_or(0);

            for polygon in merged.0 {
                let members: Vec<u8> = cluster
                    .iter()
                    .filter(|&&i| polygon.intersects(&Point::from(centers[i])))
                    .map(|&i| accidents[i].weight())
                    .collect();

                buffers.push(AccidentBuffer {
                    polygon,
                    weight: members.iter().copied().max().unwrap_or(cluster_max),
                    accident_count: members.len(),
                });
            }
        }

        log::debug!(
            "Built {} buffer(s) from {} accident(s) at radius {}",
            buffers.len(),
            accidents.len(),
            self.radius
        );

        buffers
    }

    /// Builds buffers and reprojects them with `transform`.
    ///
    /// The union is computed in the projected system so the radius keeps
    /// its distance meaning; only the finished outlines are reprojected.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Projection`] if an outline vertex cannot be
    /// reprojected.
    pub fn build_geographic(
        &self,
        accidents: &[AccidentRecord],
        transform: &dyn CoordinateTransform,
    ) -> Result<Vec<AccidentBuffer>, SpatialError> {
        self.build(accidents)
            .into_iter()
            .map(|buffer| {
                Ok(AccidentBuffer {
                    polygon: buffer
                        .polygon
                        .try_map_coords(|c| transform.to_geographic(c))?,
                    ..buffer
                })
            })
            .collect()
    }

    /// Groups accident indices whose disks may overlap (centers within two
    /// radii), using an R-tree for the neighbor search and a union-find to
    /// collect transitive groups.
    fn candidate_clusters(&self, centers: &[Coord<f64>]) -> Vec<Vec<usize>> {
        let tree = RTree::bulk_load(
            centers
                .iter()
                .enumerate()
                .map(|(i, c)| GeomWithData::new([c.x, c.y], i))
                .collect(),
        );

        let reach = 2.0 * self.radius;
        let mut sets = DisjointSets::new(centers.len());

        for (i, c) in centers.iter().enumerate() {
            for neighbor in tree.locate_within_distance([c.x, c.y], reach * reach) {
                sets.union(i, neighbor.data);
            }
        }

        sets.groups()
    }
}

/// Array-backed union-find with path halving and union by size.
struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }

    /// Members of each set, in ascending index order, sets ordered by their
    /// smallest member.
    fn groups(mut self) -> Vec<Vec<usize>> {
        let mut by_root: Vec<Option<usize>> = vec![None; self.parent.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for i in 0..self.parent.len() {
            let root = self.find(i);
            let slot = *by_root[root].get_or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(i);
        }

        groups
    }
}

/// A buffer stored in the R-tree.
struct BufferEntry {
    envelope: AABB<[f64; 2]>,
    buffer: AccidentBuffer,
}

impl RTreeObject for BufferEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over buffer polygons for point lookups.
pub struct BufferIndex {
    tree: RTree<BufferEntry>,
}

impl BufferIndex {
    /// Indexes the given buffers.
    #[must_use]
    pub fn new(buffers: Vec<AccidentBuffer>) -> Self {
        let entries = buffers
            .into_iter()
            .map(|buffer| BufferEntry {
                envelope: compute_envelope(&buffer.polygon),
                buffer,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no buffers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Highest weight among the buffers containing `(x, y)`, boundary
    /// included. `None` if no buffer contains the point.
    #[must_use]
    pub fn max_weight_at(&self, x: f64, y: f64) -> Option<u8> {
        let point = Point::new(x, y);

        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([x, y]))
            .filter(|entry| entry.buffer.polygon.intersects(&point))
            .map(|entry| entry.buffer.weight)
            .max()
    }

    /// Iterates over all indexed buffers in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &AccidentBuffer> {
        self.tree.iter().map(|entry| &entry.buffer)
    }

    /// Renders the buffers as a `GeoJSON` feature collection with `severity`
    /// and `accidentCount` properties.
    #[must_use]
    pub fn to_feature_collection(&self) -> geojson::FeatureCollection {
        let features = self
            .iter()
            .map(|buffer| {
                let mut properties = geojson::JsonObject::new();
                properties.insert("severity".to_string(), buffer.weight.into());
                properties.insert("accidentCount".to_string(), buffer.accident_count.into());

                geojson::Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(
                        &buffer.polygon,
                    ))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use geo::Area;
    use walk_safe_accident_models::AccidentSeverity;

    use super::*;
    use crate::projection::{Identity, Lv95ToWgs84};

    fn accident(x: f64, y: f64, severity: AccidentSeverity) -> AccidentRecord {
        AccidentRecord::new(x, y, severity)
    }

    #[test]
    fn no_accidents_means_no_buffers() {
        let buffers = BufferBuilder::default().build(&[]);
        assert!(buffers.is_empty());
        assert_eq!(BufferIndex::new(buffers).max_weight_at(0.0, 0.0), None);
    }

    #[test]
    fn disk_area_is_close_to_circle() {
        let disk = BufferBuilder::default().disk(Coord { x: 0.0, y: 0.0 });
        let circle = std::f64::consts::PI * 49.0;
        assert!((disk.unsigned_area() - circle).abs() / circle < 0.01);
    }

    #[test]
    fn overlapping_accidents_merge_with_max_weight() {
        let buffers = BufferBuilder::default().build(&[
            accident(0.0, 0.0, AccidentSeverity::Minor),
            accident(10.0, 0.0, AccidentSeverity::Severe),
        ]);

        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].weight, 3);
        assert_eq!(buffers[0].accident_count, 2);
    }

    #[test]
    fn distant_accidents_stay_disjoint() {
        let buffers = BufferBuilder::default().build(&[
            accident(0.0, 0.0, AccidentSeverity::Fatal),
            accident(100.0, 0.0, AccidentSeverity::Minor),
        ]);

        assert_eq!(buffers.len(), 2);
        let mut weights: Vec<u8> = buffers.iter().map(|b| b.weight).collect();
        weights.sort_unstable();
        assert_eq!(weights, vec![1, 4]);
    }

    #[test]
    fn chain_of_overlaps_forms_one_component() {
        let buffers = BufferBuilder::default().build(&[
            accident(0.0, 0.0, AccidentSeverity::Minor),
            accident(12.0, 0.0, AccidentSeverity::Minor),
            accident(24.0, 0.0, AccidentSeverity::Fatal),
        ]);

        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].weight, 4);
    }

    #[test]
    fn index_returns_max_of_containing_buffers() {
        let buffers = BufferBuilder::default()
            .build_geographic(
                &[
                    accident(0.0, 0.0, AccidentSeverity::Fatal),
                    accident(100.0, 0.0, AccidentSeverity::Minor),
                ],
                &Identity,
            )
            .unwrap();
        let index = BufferIndex::new(buffers);

        assert_eq!(index.len(), 2);
        assert_eq!(index.max_weight_at(0.0, 0.0), Some(4));
        assert_eq!(index.max_weight_at(103.0, 2.0), Some(1));
        assert_eq!(index.max_weight_at(50.0, 0.0), None);
        assert_eq!(index.max_weight_at(1000.0, 1000.0), None);
    }

    #[test]
    fn buffer_vertices_are_inclusive() {
        let index = BufferIndex::new(
            BufferBuilder::default().build(&[accident(0.0, 0.0, AccidentSeverity::Moderate)]),
        );

        assert_eq!(index.max_weight_at(7.0, 0.0), Some(2));
    }

    #[test]
    fn geographic_buffers_contain_the_projected_accident() {
        let (e, n) = (2_683_000.0, 1_248_000.0);
        let transform = Lv95ToWgs84::new().unwrap();
        let index = BufferIndex::new(
            BufferBuilder::default()
                .build_geographic(&[accident(e, n, AccidentSeverity::Severe)], &transform)
                .unwrap(),
        );

        let Coord { x: lng, y: lat } = transform.to_geographic(Coord { x: e, y: n }).unwrap();
        assert_eq!(index.max_weight_at(lng, lat), Some(3));
        // Roughly 100 m east is well outside a 7 m buffer.
        assert_eq!(index.max_weight_at(lng + 0.0013, lat), None);
    }

    #[test]
    fn feature_collection_carries_severity() {
        let index = BufferIndex::new(
            BufferBuilder::default().build(&[accident(0.0, 0.0, AccidentSeverity::Fatal)]),
        );

        let collection = index.to_feature_collection();
        assert_eq!(collection.features.len(), 1);
        let severity = collection.features[0]
            .properties
            .as_ref()
            .and_then(|p| p.get("severity"))
            .and_then(geojson::JsonValue::as_u64);
        assert_eq!(severity, Some(4));
    }
}
