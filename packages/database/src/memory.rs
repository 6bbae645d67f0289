//! In-memory [`Store`] used by tests and local experiments.
//!
//! Only compiled with the `memory-store` feature; production servers use
//! [`crate::DatabaseStore`].

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use walk_safe_database_models::{
    AccidentRow, DangerCacheRow, TrajectoryPointRow, TrajectoryRow, UserRow,
};

use crate::{DbError, Store};

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, UserRow>,
    trajectories: BTreeMap<i64, TrajectoryRow>,
    points: BTreeMap<i64, Vec<TrajectoryPointRow>>,
    accidents: Vec<AccidentRow>,
    danger_cache: BTreeMap<i64, DangerCacheRow>,
}

/// A [`Store`] holding all tables in process memory.
///
/// The danger-index cache is keyed by trajectory id, so upserts have the
/// same one-row-per-trajectory semantics as the SQL table.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds (or replaces) a trajectory together with its points.
    pub fn insert_trajectory(&self, trajectory: TrajectoryRow, points: Vec<TrajectoryPointRow>) {
        let mut tables = self.tables();
        tables.points.insert(trajectory.id, points);
        tables.trajectories.insert(trajectory.id, trajectory);
    }

    /// Adds an accident.
    pub fn insert_accident(&self, accident: AccidentRow) {
        self.tables().accidents.push(accident);
    }

    /// Number of cached danger-index entries, including empty trajectories.
    #[must_use]
    pub fn danger_cache_len(&self) -> usize {
        self.tables().danger_cache.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_accidents(&self) -> Result<Vec<AccidentRow>, DbError> {
        Ok(self.tables().accidents.clone())
    }

    async fn fetch_trajectory(&self, trajectory_id: i64) -> Result<Option<TrajectoryRow>, DbError> {
        Ok(self.tables().trajectories.get(&trajectory_id).cloned())
    }

    async fn fetch_trajectories(&self, user_id: Option<i64>) -> Result<Vec<TrajectoryRow>, DbError> {
        let mut rows: Vec<TrajectoryRow> = self
            .tables()
            .trajectories
            .values()
            .filter(|t| user_id.is_none() || t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn fetch_trajectory_points(
        &self,
        trajectory_id: i64,
    ) -> Result<Vec<TrajectoryPointRow>, DbError> {
        let mut points = self
            .tables()
            .points
            .get(&trajectory_id)
            .cloned()
            .unwrap_or_default();
        points.sort_by_key(|p| p.recorded_at);
        Ok(points)
    }

    async fn upsert_danger_cache(&self, entry: DangerCacheRow) -> Result<(), DbError> {
        self.tables().danger_cache.insert(entry.trajectory_id, entry);
        Ok(())
    }

    async fn fetch_danger_cache(&self) -> Result<Vec<DangerCacheRow>, DbError> {
        Ok(self
            .tables()
            .danger_cache
            .values()
            .filter(|e| e.total_points > 0)
            .copied()
            .collect())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRow, DbError> {
        let mut tables = self.tables();
        if tables.users.contains_key(username) {
            return Err(DbError::Conflict {
                message: format!("Username {username:?} is already registered"),
            });
        }

        let id = i64::try_from(tables.users.len()).unwrap_or(i64::MAX - 1) + 1;
        let user = UserRow {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };
        tables.users.insert(username.to_string(), user.clone());
        Ok(user)
    }

    async fn find_user(&self, username: &str) -> Result<Option<UserRow>, DbError> {
        Ok(self.tables().users.get(username).cloned())
    }
}
