//! Raw SQL queries for users, trajectories, accidents and the danger-index
//! cache.
//!
//! All functions take a borrowed `&dyn Database`; the connection is only
//! held for the duration of the call.

use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};
use walk_safe_database_models::{
    AccidentRow, DangerCacheRow, TrajectoryPointRow, TrajectoryRow, UserRow,
};

use crate::DbError;

fn conversion(what: &str, e: impl std::fmt::Display) -> DbError {
    DbError::Conversion {
        message: format!("Failed to parse {what}: {e}"),
    }
}

fn trajectory_from_row(row: &Row) -> Result<TrajectoryRow, DbError> {
    Ok(TrajectoryRow {
        id: row.to_value("id").map_err(|e| conversion("trajectory id", e))?,
        user_id: row.to_value("user_id").unwrap_or(None),
        started_at: row.to_value("started_at").unwrap_or(None),
        ended_at: row.to_value("ended_at").unwrap_or(None),
    })
}

fn point_from_row(row: &Row) -> Result<TrajectoryPointRow, DbError> {
    Ok(TrajectoryPointRow {
        lat: row.to_value("lat").map_err(|e| conversion("point lat", e))?,
        lng: row.to_value("lng").map_err(|e| conversion("point lng", e))?,
        recorded_at: row
            .to_value("recorded_at")
            .map_err(|e| conversion("point timestamp", e))?,
    })
}

fn accident_from_row(row: &Row) -> Result<AccidentRow, DbError> {
    Ok(AccidentRow {
        easting: row
            .to_value("easting")
            .map_err(|e| conversion("accident easting", e))?,
        northing: row
            .to_value("northing")
            .map_err(|e| conversion("accident northing", e))?,
        severity_category: row.to_value("severity_category").unwrap_or(None),
    })
}

fn danger_cache_from_row(row: &Row) -> Result<DangerCacheRow, DbError> {
    Ok(DangerCacheRow {
        trajectory_id: row
            .to_value("trajectory_id")
            .map_err(|e| conversion("cached trajectory id", e))?,
        danger_index: row
            .to_value("danger_index")
            .map_err(|e| conversion("danger index", e))?,
        total_points: row
            .to_value("total_points")
            .map_err(|e| conversion("total points", e))?,
    })
}

fn user_from_row(row: &Row) -> Result<UserRow, DbError> {
    Ok(UserRow {
        id: row.to_value("id").map_err(|e| conversion("user id", e))?,
        username: row
            .to_value("username")
            .map_err(|e| conversion("username", e))?,
        password_hash: row
            .to_value("password_hash")
            .map_err(|e| conversion("password hash", e))?,
    })
}

/// Returns every accident with both coordinates present.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn get_accidents(db: &dyn Database) -> Result<Vec<AccidentRow>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT easting, northing, severity_category
             FROM accidents
             WHERE easting IS NOT NULL AND northing IS NOT NULL",
            &[],
        )
        .await?;

    rows.iter().map(accident_from_row).collect()
}

/// Looks up a single trajectory.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn get_trajectory(
    db: &dyn Database,
    trajectory_id: i64,
) -> Result<Option<TrajectoryRow>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT id, user_id, started_at, ended_at FROM trajectories WHERE id = $1",
            &[DatabaseValue::Int64(trajectory_id)],
        )
        .await?;

    rows.first().map(trajectory_from_row).transpose()
}

/// Lists trajectories, newest first, optionally for a single user.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn get_trajectories(
    db: &dyn Database,
    user_id: Option<i64>,
) -> Result<Vec<TrajectoryRow>, DbError> {
    let rows = match user_id {
        Some(user_id) => {
            db.query_raw_params(
                "SELECT id, user_id, started_at, ended_at FROM trajectories
                 WHERE user_id = $1
                 ORDER BY started_at DESC NULLS LAST, id DESC",
                &[DatabaseValue::Int64(user_id)],
            )
            .await?
        }
        None => {
            db.query_raw_params(
                "SELECT id, user_id, started_at, ended_at FROM trajectories
                 ORDER BY started_at DESC NULLS LAST, id DESC",
                &[],
            )
            .await?
        }
    };

    rows.iter().map(trajectory_from_row).collect()
}

/// Returns the points of a trajectory ordered by timestamp ascending.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn get_trajectory_points(
    db: &dyn Database,
    trajectory_id: i64,
) -> Result<Vec<TrajectoryPointRow>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT lat, lng, recorded_at FROM trajectory_points
             WHERE trajectory_id = $1
             ORDER BY recorded_at ASC, id ASC",
            &[DatabaseValue::Int64(trajectory_id)],
        )
        .await?;

    rows.iter().map(point_from_row).collect()
}

/// Inserts or overwrites the cached danger index of a trajectory.
///
/// A single `ON CONFLICT` statement, so concurrent writers never leave two
/// rows for the same trajectory.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn upsert_danger_index(db: &dyn Database, entry: &DangerCacheRow) -> Result<(), DbError> {
    db.exec_raw_params(
        "INSERT INTO danger_index_cache (trajectory_id, danger_index, total_points, computed_at)
         VALUES ($1, $2, $3, NOW())
         ON CONFLICT (trajectory_id) DO UPDATE SET
             danger_index = EXCLUDED.danger_index,
             total_points = EXCLUDED.total_points,
             computed_at = EXCLUDED.computed_at",
        &[
            DatabaseValue::Int64(entry.trajectory_id),
            DatabaseValue::Real64(entry.danger_index),
            DatabaseValue::Int64(entry.total_points),
        ],
    )
    .await?;

    Ok(())
}

/// Returns every cached danger index with at least one point.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn get_danger_indices(db: &dyn Database) -> Result<Vec<DangerCacheRow>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT trajectory_id, danger_index, total_points
             FROM danger_index_cache
             WHERE total_points > 0
             ORDER BY trajectory_id",
            &[],
        )
        .await?;

    rows.iter().map(danger_cache_from_row).collect()
}

/// Inserts a new user.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the username is already taken, or
/// [`DbError`] if the database operation fails.
pub async fn insert_user(
    db: &dyn Database,
    username: &str,
    password_hash: &str,
) -> Result<UserRow, DbError> {
    let rows = db
        .query_raw_params(
            "INSERT INTO users (username, password_hash)
             VALUES ($1, $2)
             ON CONFLICT (username) DO NOTHING
             RETURNING id, username, password_hash",
            &[
                DatabaseValue::String(username.to_string()),
                DatabaseValue::String(password_hash.to_string()),
            ],
        )
        .await?;

    let row = rows.first().ok_or_else(|| DbError::Conflict {
        message: format!("Username {username:?} is already registered"),
    })?;

    user_from_row(row)
}

/// Looks up a user by name.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn get_user_by_name(db: &dyn Database, username: &str) -> Result<Option<UserRow>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
            &[DatabaseValue::String(username.to_string())],
        )
        .await?;

    rows.first().map(user_from_row).transpose()
}
