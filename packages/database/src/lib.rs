#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Database connection, queries, and migrations for walk_safe.
//!
//! Uses `switchy_database` with raw SQL via `query_raw_params()` and
//! `switchy_schema` for embedded SQL migrations. The [`Store`] trait is the
//! seam the danger-index engine and the HTTP server talk to; it is
//! implemented over a live database by [`DatabaseStore`] and, behind the
//! `memory-store` feature, in memory by `MemoryStore`.

pub mod db;
#[cfg(any(test, feature = "memory-store"))]
pub mod memory;
pub mod queries;
pub mod store;

use async_trait::async_trait;
use include_dir::{Dir, include_dir};
use switchy_database::Database;
use switchy_schema::discovery::embedded::EmbeddedMigrationSource;
use switchy_schema::runner::MigrationRunner;
use walk_safe_database_models::{
    AccidentRow, DangerCacheRow, TrajectoryPointRow, TrajectoryRow, UserRow,
};

#[cfg(any(test, feature = "memory-store"))]
pub use memory::MemoryStore;
pub use store::DatabaseStore;

/// Embedded SQL migrations from the `migrations/` directory.
static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/../../migrations");

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] switchy_schema::MigrationError),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// A unique key already exists.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflicting record.
        message: String,
    },
}

/// Runs all pending database migrations.
///
/// # Errors
///
/// Returns [`DbError`] if any migration fails to apply.
pub async fn run_migrations(db: &dyn Database) -> Result<(), DbError> {
    let source = EmbeddedMigrationSource::new(&MIGRATIONS_DIR);
    let runner = MigrationRunner::new(Box::new(source));
    runner.run(db).await?;
    log::info!("Database migrations completed successfully");
    Ok(())
}

/// Storage operations needed by danger scoring and the HTTP API.
///
/// Implementations must treat `upsert_danger_cache` as a unique-key upsert
/// on `trajectory_id`: saving twice for the same trajectory leaves exactly
/// one entry holding the latest values.
#[async_trait]
pub trait Store: Send + Sync {
    /// All accidents with a known location.
    async fn fetch_accidents(&self) -> Result<Vec<AccidentRow>, DbError>;

    /// A single trajectory, or `None` if it does not exist.
    async fn fetch_trajectory(&self, trajectory_id: i64) -> Result<Option<TrajectoryRow>, DbError>;

    /// All trajectories, optionally restricted to one user, newest first.
    async fn fetch_trajectories(&self, user_id: Option<i64>) -> Result<Vec<TrajectoryRow>, DbError>;

    /// Points of a trajectory ordered by timestamp ascending.
    async fn fetch_trajectory_points(
        &self,
        trajectory_id: i64,
    ) -> Result<Vec<TrajectoryPointRow>, DbError>;

    /// Inserts or overwrites the cached score for a trajectory.
    async fn upsert_danger_cache(&self, entry: DangerCacheRow) -> Result<(), DbError>;

    /// All cached scores with `total_points > 0`.
    async fn fetch_danger_cache(&self) -> Result<Vec<DangerCacheRow>, DbError>;

    /// Creates a user.
    ///
    /// Returns [`DbError::Conflict`] if the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRow, DbError>;

    /// Looks up a user by name.
    async fn find_user(&self, username: &str) -> Result<Option<UserRow>, DbError>;
}
