//! The danger-index engine.

use std::sync::Arc;

use geo::Coord;
use walk_safe_accident_models::AccidentRecord;
use walk_safe_database::{DbError, Store};
use walk_safe_database_models::{DangerCacheRow, TrajectoryPointRow, TrajectoryRow};
use walk_safe_spatial::{
    BufferBuilder, BufferIndex, CoordinateTransform, Located, Perimeter, PerimeterReport,
    SpatialError,
};

use crate::locks::TrajectoryLocks;
use crate::{DangerAverage, DangerConfig, DangerError, DangerScore, HeatPoint, ScoreOutcome};

/// Scores trajectories against accident buffers and caches the results.
///
/// Reference data is injected: the perimeter is loaded once by the caller,
/// accidents are read from the store on every call and reprojected into the
/// trajectory frame with `transform`.
pub struct DangerIndexEngine {
    store: Arc<dyn Store>,
    perimeter: Arc<Perimeter>,
    transform: Arc<dyn CoordinateTransform>,
    config: DangerConfig,
    locks: TrajectoryLocks,
}

impl DangerIndexEngine {
    /// Creates an engine with the default configuration.
    ///
    /// Production servers pass a `Lv95ToWgs84` transform; planar setups
    /// pass `Identity`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        perimeter: Arc<Perimeter>,
        transform: Arc<dyn CoordinateTransform>,
    ) -> Self {
        Self {
            store,
            perimeter,
            transform,
            config: DangerConfig::default(),
            locks: TrajectoryLocks::default(),
        }
    }

    /// Replaces the scoring configuration.
    #[must_use]
    pub const fn with_config(mut self, config: DangerConfig) -> Self {
        self.config = config;
        self
    }

    /// The store this engine reads from.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// The study-area perimeter.
    #[must_use]
    pub fn perimeter(&self) -> &Perimeter {
        &self.perimeter
    }

    /// The scoring configuration.
    #[must_use]
    pub const fn config(&self) -> &DangerConfig {
        &self.config
    }

    /// Loads accidents with a recognized severity.
    ///
    /// Records with a missing or unknown category are left out of buffer
    /// construction rather than given a default weight.
    ///
    /// # Errors
    ///
    /// Returns [`DangerError::Store`] if the store query fails.
    pub async fn accidents(&self) -> Result<Vec<AccidentRecord>, DangerError> {
        let rows = self.store.fetch_accidents().await?;
        let total = rows.len();

        let mut accidents = Vec::with_capacity(total);
        let mut skipped = 0usize;
        for row in &rows {
            match AccidentRecord::try_from(row) {
                Ok(record) => accidents.push(record),
                Err(e) => {
                    skipped += 1;
                    log::debug!("Skipping accident at ({}, {}): {e}", row.easting, row.northing);
                }
            }
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} of {total} accident(s) with unknown severity");
        }

        Ok(accidents)
    }

    /// Builds the accident buffers in trajectory coordinates.
    ///
    /// # Errors
    ///
    /// * [`DangerError::Store`] if the accidents cannot be loaded
    /// * [`DangerError::Spatial`] if a buffer cannot be reprojected
    pub async fn buffers(&self) -> Result<BufferIndex, DangerError> {
        let accidents = self.accidents().await?;
        let buffers = BufferBuilder::new(self.config.buffer_radius)
            .build_geographic(&accidents, self.transform.as_ref())?;
        Ok(BufferIndex::new(buffers))
    }

    /// Accident locations with their weights, restricted to the perimeter.
    ///
    /// # Errors
    ///
    /// * [`DangerError::Store`] if the accidents cannot be loaded
    /// * [`DangerError::Spatial`] if an accident cannot be reprojected
    pub async fn heatmap(&self) -> Result<Vec<HeatPoint>, DangerError> {
        let accidents = self.accidents().await?;
        let mut points = Vec::with_capacity(accidents.len());

        for a in &accidents {
            let c = self.transform.to_geographic(Coord {
                x: a.easting,
                y: a.northing,
            })?;
            if self.perimeter.contains(c.x, c.y) {
                points.push(HeatPoint {
                    lat: c.y,
                    lon: c.x,
                    weight: a.weight(),
                });
            }
        }

        Ok(points)
    }

    /// Loads a trajectory and runs its points through the perimeter filter.
    ///
    /// # Errors
    ///
    /// * [`DangerError::NotFound`] if the trajectory does not exist
    /// * [`DangerError::EmptyTrajectory`] if it has no points
    /// * [`DangerError::Store`] if the store fails
    pub async fn perimeter_report(
        &self,
        trajectory_id: i64,
    ) -> Result<(TrajectoryRow, PerimeterReport<TrajectoryPointRow>), DangerError> {
        let trajectory = self
            .store
            .fetch_trajectory(trajectory_id)
            .await?
            .ok_or(DangerError::NotFound { trajectory_id })?;

        let points = self.store.fetch_trajectory_points(trajectory_id).await?;
        let report = self.filter(trajectory_id, &points)?;

        Ok((trajectory, report))
    }

    fn filter(
        &self,
        trajectory_id: i64,
        points: &[TrajectoryPointRow],
    ) -> Result<PerimeterReport<TrajectoryPointRow>, DangerError> {
        // The filter only fails on an empty point set.
        self.perimeter
            .filter(points)
            .map_err(|_: SpatialError| DangerError::EmptyTrajectory { trajectory_id })
    }

    /// Scores a trajectory without touching the cache.
    ///
    /// # Errors
    ///
    /// See [`Self::perimeter_report`].
    pub async fn compute(&self, trajectory_id: i64) -> Result<ScoreOutcome, DangerError> {
        let (_, report) = self.perimeter_report(trajectory_id).await?;
        let total_points = report.total_points;
        let points_in_perimeter = report.inside.len();
        let inside_fraction = report.inside_fraction();

        if !report.is_in_scope(self.config.min_inside_fraction) {
            log::info!(
                "Trajectory {trajectory_id} is outside the perimeter ({:.1}% inside)",
                inside_fraction * 100.0
            );
            return Ok(ScoreOutcome::OutsidePerimeter(DangerScore {
                trajectory_id,
                danger_index: 0.0,
                total_points,
                points_in_perimeter,
                inside_fraction,
            }));
        }

        let index = self.buffers().await?;
        let danger_index = score_points(&index, &report.inside);

        log::info!(
            "Trajectory {trajectory_id}: danger index {danger_index:.3} over {points_in_perimeter} point(s), {} buffer(s)",
            index.len()
        );

        Ok(ScoreOutcome::Scored(DangerScore {
            trajectory_id,
            danger_index,
            total_points,
            points_in_perimeter,
            inside_fraction,
        }))
    }

    /// Scores a trajectory and writes the result to the cache.
    ///
    /// Out-of-scope trajectories are cached with an index of 0. The cached
    /// `total_points` is the full point count, even though the index only
    /// averages over the points inside the perimeter. Calls for the same
    /// trajectory are serialized so the cached index and point count always
    /// come from the same computation.
    ///
    /// # Errors
    ///
    /// See [`Self::perimeter_report`].
    pub async fn save(&self, trajectory_id: i64) -> Result<ScoreOutcome, DangerError> {
        let _guard = self.locks.lock(trajectory_id).await;

        let outcome = self.compute(trajectory_id).await?;
        self.store
            .upsert_danger_cache(cache_entry(outcome.score())?)
            .await?;

        log::debug!("Cached danger index for trajectory {trajectory_id}");

        Ok(outcome)
    }

    /// Averages the cached danger indices of trajectories that currently
    /// pass the perimeter check.
    ///
    /// Every cached trajectory is re-checked against the live perimeter
    /// instead of trusting the cached value; trajectories that no longer
    /// exist or have lost their points are left out.
    ///
    /// # Errors
    ///
    /// Returns [`DangerError::Store`] if the store fails.
    pub async fn average_danger_index(&self) -> Result<DangerAverage, DangerError> {
        let entries = self.store.fetch_danger_cache().await?;

        let mut sum = 0.0;
        let mut count = 0usize;

        for entry in entries {
            let points = self
                .store
                .fetch_trajectory_points(entry.trajectory_id)
                .await?;

            let report = match self.filter(entry.trajectory_id, &points) {
                Ok(report) => report,
                Err(DangerError::EmptyTrajectory { .. }) => {
                    log::debug!(
                        "Cached trajectory {} has no points, skipping",
                        entry.trajectory_id
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            if report.is_in_scope(self.config.min_inside_fraction) {
                sum += entry.danger_index;
                count += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let average = if count == 0 { 0.0 } else { sum / count as f64 };

        Ok(DangerAverage { average, count })
    }
}

/// The cache row for `score`.
fn cache_entry(score: &DangerScore) -> Result<DangerCacheRow, DangerError> {
    let total_points = i64::try_from(score.total_points).map_err(|e| DbError::Conversion {
        message: format!(
            "Point count {} of trajectory {} does not fit the cache: {e}",
            score.total_points, score.trajectory_id
        ),
    })?;

    Ok(DangerCacheRow {
        trajectory_id: score.trajectory_id,
        danger_index: score.danger_index,
        total_points,
    })
}

/// Mean over `points` of the highest weight of any buffer containing the
/// point, counting 0 for points outside every buffer.
///
/// Returns 0 for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score_points<P: Located>(index: &BufferIndex, points: &[P]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }

    let sum: u64 = points
        .iter()
        .map(|p| {
            let (lng, lat) = p.lng_lat();
            u64::from(index.max_weight_at(lng, lat).unwrap_or(0))
        })
        .sum();

    sum as f64 / points.len() as f64
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use geo::{Rect, coord};
    use walk_safe_database::MemoryStore;
    use walk_safe_database_models::AccidentRow;
    use walk_safe_spatial::{Identity, Lv95ToWgs84};

    use super::*;

    fn point(x: f64, y: f64, second: u32) -> TrajectoryPointRow {
        TrajectoryPointRow {
            lat: y,
            lng: x,
            recorded_at: NaiveDate::from_ymd_opt(2025, 5, 1)
                .unwrap()
                .and_hms_opt(12, 0, second)
                .unwrap(),
        }
    }

    fn trajectory(id: i64) -> TrajectoryRow {
        TrajectoryRow {
            id,
            user_id: Some(1),
            started_at: None,
            ended_at: None,
        }
    }

    fn accident(x: f64, y: f64, category: Option<&str>) -> AccidentRow {
        AccidentRow {
            easting: x,
            northing: y,
            severity_category: category.map(str::to_string),
        }
    }

    /// Planar test world: the perimeter is a 2000 x 2000 square at the
    /// origin and accident coordinates are used as-is.
    fn engine(store: &Arc<MemoryStore>) -> DangerIndexEngine {
        let perimeter = Perimeter::from_polygon(
            Rect::new(coord! { x: -1000.0, y: -1000.0 }, coord! { x: 1000.0, y: 1000.0 })
                .to_polygon(),
        );
        DangerIndexEngine::new(store.clone(), Arc::new(perimeter), Arc::new(Identity))
    }

    fn seed_two_accidents(store: &MemoryStore) {
        store.insert_accident(accident(0.0, 0.0, Some("as1")));
        store.insert_accident(accident(100.0, 0.0, Some("as4")));
    }

    #[tokio::test]
    async fn mean_of_max_weights_over_points() {
        let store = Arc::new(MemoryStore::new());
        seed_two_accidents(&store);
        store.insert_trajectory(
            trajectory(1),
            vec![point(0.0, 0.0, 0), point(500.0, 500.0, 1)],
        );

        let outcome = engine(&store).compute(1).await.unwrap();
        assert!(outcome.is_scored());
        assert!((outcome.score().danger_index - 2.0).abs() < 1e-12);
        assert_eq!(outcome.score().total_points, 2);
    }

    #[tokio::test]
    async fn two_disjoint_buffers_score_four_and_zero() {
        let store = Arc::new(MemoryStore::new());
        seed_two_accidents(&store);
        let index = engine(&store).buffers().await.unwrap();

        let points = vec![
            geo::Point::new(0.0, 0.0),
            geo::Point::new(1000.0, 1000.0),
        ];
        assert_eq!(index.len(), 2);
        assert!((score_points(&index, &points) - 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn denominator_uses_only_points_inside_perimeter() {
        let store = Arc::new(MemoryStore::new());
        seed_two_accidents(&store);

        // 10 points at the fatal accident, 1 far outside the perimeter:
        // 10/11 inside, so the index is 40 / 10 = 4.
        let mut points: Vec<TrajectoryPointRow> = (0..10).map(|s| point(0.0, 0.0, s)).collect();
        points.push(point(5000.0, 5000.0, 10));
        store.insert_trajectory(trajectory(2), points);

        let outcome = engine(&store).save(2).await.unwrap();
        let score = outcome.score();
        assert!(outcome.is_scored());
        assert!((score.danger_index - 4.0).abs() < 1e-12);
        assert_eq!(score.points_in_perimeter, 10);

        let cache = store.fetch_danger_cache().await.unwrap();
        assert_eq!(cache[0].total_points, 11);
    }

    #[tokio::test]
    async fn outside_perimeter_is_cached_as_zero() {
        let store = Arc::new(MemoryStore::new());
        seed_two_accidents(&store);
        store.insert_trajectory(
            trajectory(3),
            vec![
                point(0.0, 0.0, 0),
                point(5000.0, 0.0, 1),
                point(5000.0, 10.0, 2),
            ],
        );

        let outcome = engine(&store).save(3).await.unwrap();
        assert!(matches!(outcome, ScoreOutcome::OutsidePerimeter(_)));
        assert!(outcome.score().danger_index.abs() < f64::EPSILON);

        let cache = store.fetch_danger_cache().await.unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache[0].danger_index.abs() < f64::EPSILON);
        assert_eq!(cache[0].total_points, 3);
    }

    #[tokio::test]
    async fn saving_twice_keeps_one_entry_with_latest_values() {
        let store = Arc::new(MemoryStore::new());
        store.insert_accident(accident(0.0, 0.0, Some("as2")));
        store.insert_trajectory(trajectory(4), vec![point(0.0, 0.0, 0)]);

        let engine = engine(&store);
        engine.save(4).await.unwrap();

        store.insert_trajectory(
            trajectory(4),
            vec![point(0.0, 0.0, 0), point(300.0, 300.0, 1)],
        );
        engine.save(4).await.unwrap();

        let cache = store.fetch_danger_cache().await.unwrap();
        assert_eq!(cache.len(), 1);
        assert!((cache[0].danger_index - 1.5).abs() < 1e-12);
        assert_eq!(cache[0].total_points, 2);
    }

    #[tokio::test]
    async fn concurrent_saves_of_one_trajectory_agree() {
        let store = Arc::new(MemoryStore::new());
        seed_two_accidents(&store);
        store.insert_trajectory(trajectory(5), vec![point(0.0, 0.0, 0)]);

        let engine = Arc::new(engine(&store));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.save(5).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.danger_cache_len(), 1);
    }

    #[tokio::test]
    async fn unknown_severities_are_left_out() {
        let store = Arc::new(MemoryStore::new());
        store.insert_accident(accident(0.0, 0.0, Some("as9")));
        store.insert_accident(accident(0.0, 0.0, None));
        store.insert_trajectory(trajectory(6), vec![point(0.0, 0.0, 0)]);

        let engine = engine(&store);
        assert!(engine.accidents().await.unwrap().is_empty());

        let outcome = engine.compute(6).await.unwrap();
        assert!(outcome.is_scored());
        assert!(outcome.score().danger_index.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn missing_and_empty_trajectories_are_errors() {
        let store = Arc::new(MemoryStore::new());
        store.insert_trajectory(trajectory(7), vec![]);
        let engine = engine(&store);

        assert!(matches!(
            engine.compute(99).await,
            Err(DangerError::NotFound { trajectory_id: 99 })
        ));
        assert!(matches!(
            engine.save(7).await,
            Err(DangerError::EmptyTrajectory { trajectory_id: 7 })
        ));
        assert_eq!(store.danger_cache_len(), 0);
    }

    #[tokio::test]
    async fn average_rechecks_perimeter_at_read_time() {
        let store = Arc::new(MemoryStore::new());
        seed_two_accidents(&store);
        store.insert_trajectory(trajectory(10), vec![point(0.0, 0.0, 0)]);
        store.insert_trajectory(trajectory(11), vec![point(100.0, 0.0, 0)]);

        let engine = engine(&store);
        engine.save(10).await.unwrap();
        engine.save(11).await.unwrap();

        // Trajectory 11 moves outside the perimeter after being cached with
        // a non-zero index; the average must ignore it.
        store.insert_trajectory(trajectory(11), vec![point(5000.0, 0.0, 0)]);

        let average = engine.average_danger_index().await.unwrap();
        assert_eq!(average.count, 1);
        assert!((average.average - 4.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn average_of_nothing_is_zero() {
        let store = Arc::new(MemoryStore::new());
        let average = engine(&store).average_danger_index().await.unwrap();
        assert_eq!(
            average,
            DangerAverage {
                average: 0.0,
                count: 0
            }
        );
    }

    #[tokio::test]
    async fn heatmap_keeps_accidents_inside_perimeter() {
        let store = Arc::new(MemoryStore::new());
        seed_two_accidents(&store);
        store.insert_accident(accident(5000.0, 0.0, Some("as2")));
        store.insert_accident(accident(10.0, 10.0, Some("bogus")));

        let heat = engine(&store).heatmap().await.unwrap();
        assert_eq!(heat.len(), 2);
        assert_eq!(heat[0].weight, 4);
        assert!((heat[1].lon - 100.0).abs() < f64::EPSILON);
    }

    struct FailingTransform;

    impl CoordinateTransform for FailingTransform {
        fn to_geographic(&self, _coord: Coord<f64>) -> Result<Coord<f64>, SpatialError> {
            Err(proj4rs::errors::Error::LatOrLongExceedLimit.into())
        }
    }

    #[tokio::test]
    async fn projection_failures_surface_as_spatial_errors() {
        let store = Arc::new(MemoryStore::new());
        seed_two_accidents(&store);
        store.insert_trajectory(trajectory(1), vec![point(0.0, 0.0, 0)]);

        let perimeter = Perimeter::from_polygon(
            Rect::new(coord! { x: -1000.0, y: -1000.0 }, coord! { x: 1000.0, y: 1000.0 })
                .to_polygon(),
        );
        let engine =
            DangerIndexEngine::new(store.clone(), Arc::new(perimeter), Arc::new(FailingTransform));

        assert!(matches!(
            engine.compute(1).await,
            Err(DangerError::Spatial(SpatialError::Projection(_)))
        ));
        assert!(matches!(
            engine.heatmap().await,
            Err(DangerError::Spatial(_))
        ));
        assert_eq!(store.danger_cache_len(), 0);
    }

    #[tokio::test]
    async fn scores_wgs84_points_against_lv95_accidents() {
        let (e, n) = (2_683_000.0, 1_248_000.0);
        let transform = Lv95ToWgs84::new().unwrap();
        let at_accident = transform.to_geographic(Coord { x: e, y: n }).unwrap();
        let far_away = transform
            .to_geographic(Coord {
                x: e + 100.0,
                y: n,
            })
            .unwrap();

        let store = Arc::new(MemoryStore::new());
        store.insert_accident(accident(e, n, Some("as1")));
        store.insert_trajectory(
            trajectory(1),
            vec![
                point(at_accident.x, at_accident.y, 0),
                point(far_away.x, far_away.y, 1),
            ],
        );

        let perimeter = Perimeter::from_polygon(
            Rect::new(coord! { x: 8.51, y: 47.36 }, coord! { x: 8.56, y: 47.39 }).to_polygon(),
        );
        let engine = DangerIndexEngine::new(store.clone(), Arc::new(perimeter), Arc::new(transform));

        let outcome = engine.compute(1).await.unwrap();
        assert!(outcome.is_scored());
        assert!((outcome.score().danger_index - 2.0).abs() < 1e-12);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_point_count_is_a_conversion_error() {
        let score = DangerScore {
            trajectory_id: 9,
            danger_index: 1.0,
            total_points: usize::MAX,
            points_in_perimeter: 0,
            inside_fraction: 0.0,
        };

        assert!(matches!(
            cache_entry(&score),
            Err(DangerError::Store(DbError::Conversion { .. }))
        ));
    }

    #[test]
    fn cache_entry_keeps_full_point_count() {
        let score = DangerScore {
            trajectory_id: 9,
            danger_index: 1.5,
            total_points: 11,
            points_in_perimeter: 10,
            inside_fraction: 10.0 / 11.0,
        };

        let row = cache_entry(&score).unwrap();
        assert_eq!(row.total_points, 11);
        assert_eq!(row.trajectory_id, 9);
    }
}
