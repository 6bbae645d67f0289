#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Spatial building blocks for danger scoring.
//!
//! - [`projection`]: Swiss LV95 → WGS84 reprojection.
//! - [`perimeter`]: the study-area polygon and the perimeter filter that
//!   decides whether a trajectory is in scope.
//! - [`buffer`]: fixed-radius accident buffers, unioned into connected
//!   components and indexed in an R-tree for point lookups.
//!
//! All containment tests are boundary-inclusive: a point lying exactly on a
//! polygon edge counts as inside.

pub mod buffer;
pub mod perimeter;
pub mod projection;

use geo::{BoundingRect, MultiPolygon, Polygon};
use geojson::GeoJson;
use rstar::AABB;
use walk_safe_database_models::TrajectoryPointRow;

pub use buffer::{AccidentBuffer, BufferBuilder, BufferIndex};
pub use perimeter::{Perimeter, PerimeterReport};
pub use projection::{CoordinateTransform, Identity, Lv95ToWgs84};

/// Errors that can occur while loading or evaluating geometry.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// Reading a geometry file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The `GeoJSON` could not be parsed or converted.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The `GeoJSON` contained no polygon geometry.
    #[error("No polygon found in {source_name}")]
    NoPolygon {
        /// File name or description of the input.
        source_name: String,
    },

    /// A coordinate could not be reprojected.
    #[error("Projection error: {0}")]
    Projection(#[from] proj4rs::errors::Error),

    /// A perimeter test was requested for an empty point set.
    #[error("Cannot evaluate an empty point set")]
    EmptyPointSet,
}

/// Anything with a WGS84 longitude/latitude.
pub trait Located {
    /// Returns `(longitude, latitude)`.
    fn lng_lat(&self) -> (f64, f64);
}

impl Located for TrajectoryPointRow {
    fn lng_lat(&self) -> (f64, f64) {
        (self.lng, self.lat)
    }
}

impl Located for geo::Point<f64> {
    fn lng_lat(&self) -> (f64, f64) {
        (self.x(), self.y())
    }
}

/// Parses a `GeoJSON` document and collects every polygon it contains.
///
/// Accepts a bare geometry, a feature, or a feature collection. Polygons
/// and multi-polygons (also nested in geometry collections) are merged into
/// one [`MultiPolygon`]; other geometry types are ignored.
///
/// # Errors
///
/// Returns [`SpatialError::GeoJson`] if the text is not valid `GeoJSON`.
pub fn parse_geojson_polygons(geojson_str: &str) -> Result<MultiPolygon<f64>, SpatialError> {
    let geojson: GeoJson = geojson_str.parse()?;

    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::Geometry(geom) => vec![geom],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    };

    let mut polygons = Vec::new();
    for geom in geometries {
        let geo_geom: geo::Geometry<f64> = geom.try_into()?;
        collect_polygons(geo_geom, &mut polygons);
    }

    Ok(MultiPolygon::new(polygons))
}

fn collect_polygons(geometry: geo::Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        geo::Geometry::Polygon(p) => out.push(p),
        geo::Geometry::MultiPolygon(mp) => out.extend(mp.0),
        geo::Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}

/// Computes the R-tree envelope of a geometry.
fn compute_envelope<G: BoundingRect<f64, Output = Option<geo::Rect<f64>>>>(
    geometry: &G,
) -> AABB<[f64; 2]> {
    geometry.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
