//! [`Store`] implementation over a live `switchy_database` connection.

use std::sync::Arc;

use async_trait::async_trait;
use switchy_database::Database;
use walk_safe_database_models::{
    AccidentRow, DangerCacheRow, TrajectoryPointRow, TrajectoryRow, UserRow,
};

use crate::{DbError, Store, queries};

/// A [`Store`] backed by a shared database connection.
#[derive(Clone)]
pub struct DatabaseStore {
    db: Arc<dyn Database>,
}

impl DatabaseStore {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// The underlying connection.
    #[must_use]
    pub fn database(&self) -> &dyn Database {
        self.db.as_ref()
    }
}

#[async_trait]
impl Store for DatabaseStore {
    async fn fetch_accidents(&self) -> Result<Vec<AccidentRow>, DbError> {
        queries::get_accidents(self.database()).await
    }

    async fn fetch_trajectory(&self, trajectory_id: i64) -> Result<Option<TrajectoryRow>, DbError> {
        queries::get_trajectory(self.database(), trajectory_id).await
    }

    async fn fetch_trajectories(&self, user_id: Option<i64>) -> Result<Vec<TrajectoryRow>, DbError> {
        queries::get_trajectories(self.database(), user_id).await
    }

    async fn fetch_trajectory_points(
        &self,
        trajectory_id: i64,
    ) -> Result<Vec<TrajectoryPointRow>, DbError> {
        queries::get_trajectory_points(self.database(), trajectory_id).await
    }

    async fn upsert_danger_cache(&self, entry: DangerCacheRow) -> Result<(), DbError> {
        queries::upsert_danger_index(self.database(), &entry).await
    }

    async fn fetch_danger_cache(&self) -> Result<Vec<DangerCacheRow>, DbError> {
        queries::get_danger_indices(self.database()).await
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRow, DbError> {
        queries::insert_user(self.database(), username, password_hash).await
    }

    async fn find_user(&self, username: &str) -> Result<Option<UserRow>, DbError> {
        queries::get_user_by_name(self.database(), username).await
    }
}
