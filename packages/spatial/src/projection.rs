//! Reprojection from Swiss LV95 (EPSG:2056) to WGS84 (EPSG:4326).

use geo::Coord;
use proj4rs::proj::Proj;

use crate::SpatialError;

/// PROJ definition of EPSG:2056 (CH1903+ / LV95).
pub const LV95_PROJ_STRING: &str = "+proj=somerc +lat_0=46.9524055555556 +lon_0=7.43958333333333 \
     +k_0=1 +x_0=2600000 +y_0=1200000 +ellps=bessel \
     +towgs84=674.374,15.056,405.346,0,0,0,0 +units=m +no_defs";

/// PROJ definition of EPSG:4326.
pub const WGS84_PROJ_STRING: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Maps coordinates from a projected system into geographic `(lng, lat)`.
pub trait CoordinateTransform: Send + Sync {
    /// Converts one projected coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Projection`] if the coordinate cannot be
    /// transformed.
    fn to_geographic(&self, coord: Coord<f64>) -> Result<Coord<f64>, SpatialError>;
}

/// Swiss LV95 meters to WGS84 degrees, including the CH1903+ datum shift.
pub struct Lv95ToWgs84 {
    lv95: Proj,
    wgs84: Proj,
}

impl Lv95ToWgs84 {
    /// Builds the EPSG:2056 → EPSG:4326 transform.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Projection`] if a projection definition is
    /// rejected.
    pub fn new() -> Result<Self, SpatialError> {
        Ok(Self {
            lv95: Proj::from_proj_string(LV95_PROJ_STRING)?,
            wgs84: Proj::from_proj_string(WGS84_PROJ_STRING)?,
        })
    }
}

impl CoordinateTransform for Lv95ToWgs84 {
    fn to_geographic(&self, coord: Coord<f64>) -> Result<Coord<f64>, SpatialError> {
        let mut point = (coord.x, coord.y, 0.0);
        proj4rs::transform::transform(&self.lv95, &self.wgs84, &mut point)?;

        // Geographic output is in radians.
        Ok(Coord {
            x: point.0.to_degrees(),
            y: point.1.to_degrees(),
        })
    }
}

/// Leaves coordinates untouched. For data that is already in the frame the
/// trajectory points use.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl CoordinateTransform for Identity {
    fn to_geographic(&self, coord: Coord<f64>) -> Result<Coord<f64>, SpatialError> {
        Ok(coord)
    }
}
