#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Danger-index scoring.
//!
//! A trajectory's danger index is the mean, over its points inside the
//! study-area perimeter, of the highest severity weight of any accident
//! buffer containing the point (0 when none does). Trajectories with less
//! than [`DangerConfig::min_inside_fraction`] of their points inside the
//! perimeter are not scored and are cached with an index of 0.

pub mod engine;
mod locks;

use serde::Serialize;
use walk_safe_database::DbError;
use walk_safe_spatial::SpatialError;
use walk_safe_spatial::buffer::DEFAULT_BUFFER_RADIUS;
use walk_safe_spatial::perimeter::DEFAULT_MIN_INSIDE_FRACTION;

pub use engine::{DangerIndexEngine, score_points};

/// Errors that can occur while scoring.
#[derive(Debug, thiserror::Error)]
pub enum DangerError {
    /// The trajectory does not exist.
    #[error("Trajectory {trajectory_id} not found")]
    NotFound {
        /// Requested trajectory.
        trajectory_id: i64,
    },

    /// The trajectory exists but has no points.
    #[error("Trajectory {trajectory_id} has no points")]
    EmptyTrajectory {
        /// Requested trajectory.
        trajectory_id: i64,
    },

    /// The store failed.
    #[error(transparent)]
    Store(#[from] DbError),

    /// Accident geometry could not be built or reprojected.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

/// Scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DangerConfig {
    /// Accident buffer radius in projected units.
    pub buffer_radius: f64,
    /// Minimum share of points inside the perimeter for a trajectory to be
    /// scored.
    pub min_inside_fraction: f64,
}

impl Default for DangerConfig {
    fn default() -> Self {
        Self {
            buffer_radius: DEFAULT_BUFFER_RADIUS,
            min_inside_fraction: DEFAULT_MIN_INSIDE_FRACTION,
        }
    }
}

/// The numbers behind one scoring run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DangerScore {
    /// Scored trajectory.
    pub trajectory_id: i64,
    /// Mean exposure over the scored points; 0 when out of scope.
    pub danger_index: f64,
    /// All points of the trajectory.
    pub total_points: usize,
    /// Points inside the perimeter (the denominator of the index).
    pub points_in_perimeter: usize,
    /// `points_in_perimeter / total_points`.
    pub inside_fraction: f64,
}

/// Result of scoring a trajectory.
///
/// `OutsidePerimeter` is a defined outcome, not a failure: the trajectory
/// was evaluated and found to lie mostly outside the study area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    /// The trajectory was in scope and scored.
    Scored(DangerScore),
    /// Too few points inside the perimeter; the index is 0.
    OutsidePerimeter(DangerScore),
}

impl ScoreOutcome {
    /// The score, whichever way it was reached.
    #[must_use]
    pub const fn score(&self) -> &DangerScore {
        match self {
            Self::Scored(score) | Self::OutsidePerimeter(score) => score,
        }
    }

    /// Whether the trajectory was in scope.
    #[must_use]
    pub const fn is_scored(&self) -> bool {
        matches!(self, Self::Scored(_))
    }
}

/// Average of all cached scores that still pass the perimeter check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DangerAverage {
    /// Mean danger index; 0 when `count` is 0.
    pub average: f64,
    /// Number of trajectories averaged.
    pub count: usize,
}

/// One accident for the heatmap layer, in WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatPoint {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// Severity weight 1-4.
    pub weight: u8,
}
