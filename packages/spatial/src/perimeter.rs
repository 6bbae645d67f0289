//! The study-area perimeter and the perimeter filter.

use std::path::Path;

use geo::{Intersects, MultiPolygon, Point, Polygon};
use rstar::AABB;

use crate::{Located, SpatialError, compute_envelope, parse_geojson_polygons};

/// Minimum share of a trajectory's points that must fall inside the
/// perimeter for the trajectory to be scored.
pub const DEFAULT_MIN_INSIDE_FRACTION: f64 = 0.9;

/// The study area, in WGS84 `(lng, lat)`.
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Perimeter {
    area: MultiPolygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl Perimeter {
    /// Creates a perimeter from already-parsed polygons.
    #[must_use]
    pub fn new(area: MultiPolygon<f64>) -> Self {
        let envelope = compute_envelope(&area);
        Self { area, envelope }
    }

    /// Creates a perimeter from a single polygon.
    #[must_use]
    pub fn from_polygon(polygon: Polygon<f64>) -> Self {
        Self::new(MultiPolygon::new(vec![polygon]))
    }

    /// Loads the perimeter from a `GeoJSON` file.
    ///
    /// All polygon geometries in the file are combined into the study area.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the file cannot be read or parsed, or if
    /// it contains no polygon.
    pub fn load(path: &Path) -> Result<Self, SpatialError> {
        let text = std::fs::read_to_string(path)?;
        let area = parse_geojson_polygons(&text)?;

        if area.0.is_empty() {
            return Err(SpatialError::NoPolygon {
                source_name: path.display().to_string(),
            });
        }

        log::info!(
            "Loaded perimeter with {} polygon(s) from {}",
            area.0.len(),
            path.display()
        );

        Ok(Self::new(area))
    }

    /// The study-area geometry.
    #[must_use]
    pub const fn area(&self) -> &MultiPolygon<f64> {
        &self.area
    }

    /// Whether `(lng, lat)` lies inside the perimeter or on its boundary.
    #[must_use]
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        let [min_x, min_y] = self.envelope.lower();
        let [max_x, max_y] = self.envelope.upper();
        if lng < min_x || lng > max_x || lat < min_y || lat > max_y {
            return false;
        }

        self.area.intersects(&Point::new(lng, lat))
    }

    /// Splits `points` into those inside and outside the perimeter.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyPointSet`] if `points` is empty; an
    /// empty trajectory has no meaningful inside-fraction.
    pub fn filter<P: Located + Clone>(
        &self,
        points: &[P],
    ) -> Result<PerimeterReport<P>, SpatialError> {
        if points.is_empty() {
            return Err(SpatialError::EmptyPointSet);
        }

        let inside = points
            .iter()
            .filter(|p| {
                let (lng, lat) = p.lng_lat();
                self.contains(lng, lat)
            })
            .cloned()
            .collect();

        Ok(PerimeterReport {
            total_points: points.len(),
            inside,
        })
    }
}

/// Result of running a trajectory through the perimeter filter.
#[derive(Debug, Clone)]
pub struct PerimeterReport<P> {
    /// Number of points tested.
    pub total_points: usize,
    /// Points inside the perimeter, in their original order.
    pub inside: Vec<P>,
}

impl<P> PerimeterReport<P> {
    /// Share of points inside the perimeter, in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn inside_fraction(&self) -> f64 {
        if self.total_points == 0 {
            return 0.0;
        }
        self.inside.len() as f64 / self.total_points as f64
    }

    /// Whether enough points are inside for the trajectory to be scored.
    #[must_use]
    pub fn is_in_scope(&self, min_inside_fraction: f64) -> bool {
        self.inside_fraction() >= min_inside_fraction
    }
}
