#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Database row types.
//!
//! These types represent the shapes of data as stored in and retrieved from
//! the database. They are distinct from the API response types in
//! `walk_safe_server_models`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use walk_safe_accident_models::{AccidentRecord, AccidentSeverity, UnknownSeverityError};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    /// Primary key.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// Hex-encoded SHA-256 of the password.
    pub password_hash: String,
}

/// A recorded trajectory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryRow {
    /// Primary key.
    pub id: i64,
    /// Owning user, if the trajectory was recorded while logged in.
    pub user_id: Option<i64>,
    /// When recording started.
    pub started_at: Option<NaiveDateTime>,
    /// When recording stopped.
    pub ended_at: Option<NaiveDateTime>,
}

/// A single GPS fix belonging to a trajectory (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPointRow {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// When the fix was taken.
    pub recorded_at: NaiveDateTime,
}

/// An accident as stored, before its severity category is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccidentRow {
    /// LV95 easting.
    pub easting: f64,
    /// LV95 northing.
    pub northing: f64,
    /// Raw severity category code (`as1`..`as4`), if present.
    pub severity_category: Option<String>,
}

impl TryFrom<&AccidentRow> for AccidentRecord {
    type Error = UnknownSeverityError;

    fn try_from(row: &AccidentRow) -> Result<Self, Self::Error> {
        let category = row.severity_category.as_deref().unwrap_or_default();
        let severity = AccidentSeverity::from_category(category)?;
        Ok(Self::new(row.easting, row.northing, severity))
    }
}

/// A cached danger-index result for one trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DangerCacheRow {
    /// Trajectory the score belongs to (unique).
    pub trajectory_id: i64,
    /// Severity-weighted exposure score.
    pub danger_index: f64,
    /// Number of points in the trajectory when it was scored.
    pub total_points: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accident_row_with_missing_category_is_rejected() {
        let row = AccidentRow {
            easting: 2_683_000.0,
            northing: 1_248_000.0,
            severity_category: None,
        };
        assert!(AccidentRecord::try_from(&row).is_err());
    }

    #[test]
    fn accident_row_converts_to_record() {
        let row = AccidentRow {
            easting: 2_683_000.0,
            northing: 1_248_000.0,
            severity_category: Some("as2".to_string()),
        };
        let record = AccidentRecord::try_from(&row).unwrap();
        assert_eq!(record.severity, AccidentSeverity::Severe);
        assert_eq!(record.weight(), 3);
    }
}
