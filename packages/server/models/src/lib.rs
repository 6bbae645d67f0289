#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the walk_safe server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the database row types to allow independent evolution of the API
//! contract.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use walk_safe_danger::{DangerAverage, DangerScore, HeatPoint, ScoreOutcome};
use walk_safe_database_models::{TrajectoryPointRow, TrajectoryRow, UserRow};

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable description of the failure.
    pub error: String,
}

impl ApiError {
    /// Creates an error body.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Body of the register and login endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsRequest {
    /// Login name.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

/// A user as returned by the API. Never includes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
    /// User ID.
    pub id: i64,
    /// Login name.
    pub username: String,
}

impl From<UserRow> for ApiUser {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
        }
    }
}

/// Query parameters for the trajectory listing endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryQueryParams {
    /// Only list trajectories of this user.
    pub user_id: Option<i64>,
}

/// A trajectory as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTrajectory {
    /// Trajectory ID.
    pub id: i64,
    /// Owning user.
    pub user_id: Option<i64>,
    /// When recording started.
    pub started_at: Option<NaiveDateTime>,
    /// When recording stopped.
    pub ended_at: Option<NaiveDateTime>,
    /// Share of points inside the perimeter, on perimeter-filtered
    /// endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inside_fraction: Option<f64>,
}

impl From<TrajectoryRow> for ApiTrajectory {
    fn from(row: TrajectoryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            started_at: row.started_at,
            ended_at: row.ended_at,
            inside_fraction: None,
        }
    }
}

/// A single trajectory point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTrajectoryPoint {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// When the fix was taken.
    pub timestamp: NaiveDateTime,
}

impl From<TrajectoryPointRow> for ApiTrajectoryPoint {
    fn from(row: TrajectoryPointRow) -> Self {
        Self {
            lat: row.lat,
            lng: row.lng,
            timestamp: row.recorded_at,
        }
    }
}

/// A trajectory together with its points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTrajectoryDetail {
    /// Trajectory metadata.
    #[serde(flatten)]
    pub trajectory: ApiTrajectory,
    /// Number of points in the trajectory.
    pub total_points: usize,
    /// Points in timestamp order.
    pub points: Vec<ApiTrajectoryPoint>,
}

/// Whether a danger-index request produced a real score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerStatus {
    /// The trajectory was scored.
    Ok,
    /// Too few points inside the perimeter; the index is 0.
    OutsidePerimeter,
}

/// Response of the danger-index compute and save endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDangerIndex {
    /// Scored trajectory.
    pub trajectory_id: i64,
    /// Danger index.
    pub danger_index: f64,
    /// All points of the trajectory.
    pub total_points: usize,
    /// Points inside the perimeter.
    pub points_in_perimeter: usize,
    /// Share of points inside the perimeter.
    pub inside_fraction: f64,
    /// Outcome.
    pub status: DangerStatus,
    /// Explanation for non-`ok` outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Whether the result was written to the cache.
    pub saved: bool,
}

impl ApiDangerIndex {
    /// Builds the response for a scoring outcome.
    #[must_use]
    pub fn from_outcome(outcome: &ScoreOutcome, saved: bool) -> Self {
        let DangerScore {
            trajectory_id,
            danger_index,
            total_points,
            points_in_perimeter,
            inside_fraction,
        } = *outcome.score();

        let (status, warning) = match outcome {
            ScoreOutcome::Scored(_) => (DangerStatus::Ok, None),
            ScoreOutcome::OutsidePerimeter(_) => (
                DangerStatus::OutsidePerimeter,
                Some(format!(
                    "Only {:.1}% of the trajectory lies inside the perimeter; danger index set to 0",
                    inside_fraction * 100.0
                )),
            ),
        };

        Self {
            trajectory_id,
            danger_index,
            total_points,
            points_in_perimeter,
            inside_fraction,
            status,
            warning,
            saved,
        }
    }
}

/// Response of the danger-index average endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApiDangerAverage {
    /// Mean danger index over qualifying trajectories.
    pub average: f64,
    /// Number of qualifying trajectories.
    pub count: usize,
}

impl From<DangerAverage> for ApiDangerAverage {
    fn from(value: DangerAverage) -> Self {
        Self {
            average: value.average,
            count: value.count,
        }
    }
}

/// One heatmap point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApiHeatPoint {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// Severity weight 1-4.
    pub weight: u8,
}

impl From<HeatPoint> for ApiHeatPoint {
    fn from(value: HeatPoint) -> Self {
        Self {
            lat: value.lat,
            lon: value.lon,
            weight: value.weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_perimeter_carries_warning() {
        let outcome = ScoreOutcome::OutsidePerimeter(DangerScore {
            trajectory_id: 4,
            danger_index: 0.0,
            total_points: 10,
            points_in_perimeter: 5,
            inside_fraction: 0.5,
        });

        let api = ApiDangerIndex::from_outcome(&outcome, true);
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["status"], "outside_perimeter");
        assert_eq!(json["trajectoryId"], 4);
        assert!(json["warning"].as_str().unwrap().contains("50.0%"));
    }

    #[test]
    fn scored_outcome_omits_warning() {
        let outcome = ScoreOutcome::Scored(DangerScore {
            trajectory_id: 1,
            danger_index: 2.0,
            total_points: 2,
            points_in_perimeter: 2,
            inside_fraction: 1.0,
        });

        let json = serde_json::to_value(ApiDangerIndex::from_outcome(&outcome, false)).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json.get("warning").is_none());
    }
}
