//! HTTP handler functions for the walk_safe API.

use actix_web::{HttpResponse, web};
use walk_safe_danger::DangerError;
use walk_safe_database::DbError;
use walk_safe_server_models::{
    ApiDangerAverage, ApiDangerIndex, ApiError, ApiHealth, ApiHeatPoint, ApiTrajectory,
    ApiTrajectoryDetail, ApiTrajectoryPoint, ApiUser, CredentialsRequest, TrajectoryQueryParams,
};

use crate::AppState;
use crate::auth::{hash_password, verify_password};

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /api/register`
///
/// Creates a user. Usernames are unique.
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<CredentialsRequest>,
) -> HttpResponse {
    let CredentialsRequest { username, password } = body.into_inner();
    let username = username.trim();

    if username.is_empty() || password.is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiError::new("Username and password are required"));
    }

    match state
        .store
        .create_user(username, &hash_password(&password))
        .await
    {
        Ok(user) => {
            log::info!("Registered user {} ({})", user.username, user.id);
            HttpResponse::Created().json(ApiUser::from(user))
        }
        Err(DbError::Conflict { .. }) => HttpResponse::Conflict()
            .json(ApiError::new(format!("Username '{username}' is already taken"))),
        Err(e) => {
            log::error!("Failed to register user: {e}");
            HttpResponse::InternalServerError().json(ApiError::new(e.to_string()))
        }
    }
}

/// `POST /api/login`
///
/// Checks credentials and returns the user on success.
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<CredentialsRequest>,
) -> HttpResponse {
    match state.store.find_user(body.username.trim()).await {
        Ok(Some(user)) if verify_password(&body.password, &user.password_hash) => {
            HttpResponse::Ok().json(ApiUser::from(user))
        }
        Ok(_) => HttpResponse::Unauthorized().json(ApiError::new("Invalid username or password")),
        Err(e) => {
            log::error!("Failed to look up user: {e}");
            HttpResponse::InternalServerError().json(ApiError::new(e.to_string()))
        }
    }
}

/// `GET /api/trajectories`
///
/// Lists trajectories, optionally only those of `userId`.
pub async fn trajectories(
    state: web::Data<AppState>,
    params: web::Query<TrajectoryQueryParams>,
) -> HttpResponse {
    match state.store.fetch_trajectories(params.user_id).await {
        Ok(rows) => {
            let api: Vec<ApiTrajectory> = rows.into_iter().map(ApiTrajectory::from).collect();
            HttpResponse::Ok().json(api)
        }
        Err(e) => {
            log::error!("Failed to query trajectories: {e}");
            HttpResponse::InternalServerError().json(ApiError::new(e.to_string()))
        }
    }
}

/// `GET /api/trajectories/perimeter`
///
/// Lists trajectories with enough of their points inside the perimeter.
/// Trajectories without points are left out.
pub async fn trajectories_in_perimeter(
    state: web::Data<AppState>,
    params: web::Query<TrajectoryQueryParams>,
) -> HttpResponse {
    let rows = match state.store.fetch_trajectories(params.user_id).await {
        Ok(rows) => rows,
        Err(e) => {
            log::error!("Failed to query trajectories: {e}");
            return HttpResponse::InternalServerError().json(ApiError::new(e.to_string()));
        }
    };

    let min_inside_fraction = state.engine.config().min_inside_fraction;
    let mut api = Vec::with_capacity(rows.len());

    for row in rows {
        match state.engine.perimeter_report(row.id).await {
            Ok((trajectory, report)) if report.is_in_scope(min_inside_fraction) => {
                let mut item = ApiTrajectory::from(trajectory);
                item.inside_fraction = Some(report.inside_fraction());
                api.push(item);
            }
            Ok(_) | Err(DangerError::EmptyTrajectory { .. } | DangerError::NotFound { .. }) => {}
            Err(e) => return danger_error_response(&e),
        }
    }

    HttpResponse::Ok().json(api)
}

/// `GET /api/trajectories/{id}`
///
/// Returns a trajectory with all of its points.
pub async fn trajectory(state: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    let trajectory_id = path.into_inner();

    let row = match state.store.fetch_trajectory(trajectory_id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return danger_error_response(&DangerError::NotFound { trajectory_id });
        }
        Err(e) => return danger_error_response(&e.into()),
    };

    match state.store.fetch_trajectory_points(trajectory_id).await {
        Ok(points) => HttpResponse::Ok().json(ApiTrajectoryDetail {
            trajectory: ApiTrajectory::from(row),
            total_points: points.len(),
            points: points.into_iter().map(ApiTrajectoryPoint::from).collect(),
        }),
        Err(e) => danger_error_response(&e.into()),
    }
}

/// `GET /api/trajectories/{id}/perimeter`
///
/// Returns a trajectory with only its points inside the perimeter, or 403
/// if too few of them are.
pub async fn trajectory_in_perimeter(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> HttpResponse {
    let trajectory_id = path.into_inner();

    match state.engine.perimeter_report(trajectory_id).await {
        Ok((row, report)) => {
            let fraction = report.inside_fraction();
            if !report.is_in_scope(state.engine.config().min_inside_fraction) {
                return HttpResponse::Forbidden().json(ApiError::new(format!(
                    "Only {:.1}% of trajectory {trajectory_id} lies inside the perimeter",
                    fraction * 100.0
                )));
            }

            let mut trajectory = ApiTrajectory::from(row);
            trajectory.inside_fraction = Some(fraction);

            HttpResponse::Ok().json(ApiTrajectoryDetail {
                trajectory,
                total_points: report.total_points,
                points: report
                    .inside
                    .into_iter()
                    .map(ApiTrajectoryPoint::from)
                    .collect(),
            })
        }
        Err(e) => danger_error_response(&e),
    }
}

/// `GET /api/buffers`
///
/// Returns the accident buffers as a GeoJSON `FeatureCollection`.
pub async fn buffers(state: web::Data<AppState>) -> HttpResponse {
    match state.engine.buffers().await {
        Ok(index) => HttpResponse::Ok().json(index.to_feature_collection()),
        Err(e) => danger_error_response(&e),
    }
}

/// `GET /api/heatmap`
pub async fn heatmap(state: web::Data<AppState>) -> HttpResponse {
    match state.engine.heatmap().await {
        Ok(points) => {
            let api: Vec<ApiHeatPoint> = points.into_iter().map(ApiHeatPoint::from).collect();
            HttpResponse::Ok().json(api)
        }
        Err(e) => danger_error_response(&e),
    }
}

/// `GET /api/danger-index/average`
pub async fn danger_index_average(state: web::Data<AppState>) -> HttpResponse {
    match state.engine.average_danger_index().await {
        Ok(average) => HttpResponse::Ok().json(ApiDangerAverage::from(average)),
        Err(e) => danger_error_response(&e),
    }
}

/// `GET /api/danger-index/{id}`
///
/// Scores a trajectory without caching the result.
pub async fn compute_danger_index(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> HttpResponse {
    match state.engine.compute(path.into_inner()).await {
        Ok(outcome) => HttpResponse::Ok().json(ApiDangerIndex::from_outcome(&outcome, false)),
        Err(e) => danger_error_response(&e),
    }
}

/// `POST /api/danger-index/{id}`
///
/// Scores a trajectory and caches the result.
pub async fn save_danger_index(state: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    match state.engine.save(path.into_inner()).await {
        Ok(outcome) => HttpResponse::Ok().json(ApiDangerIndex::from_outcome(&outcome, true)),
        Err(e) => danger_error_response(&e),
    }
}

/// Maps a scoring failure to its HTTP status.
fn danger_error_response(e: &DangerError) -> HttpResponse {
    let body = ApiError::new(e.to_string());
    match e {
        DangerError::NotFound { .. } => HttpResponse::NotFound().json(body),
        DangerError::EmptyTrajectory { .. } => HttpResponse::BadRequest().json(body),
        DangerError::Store(_) | DangerError::Spatial(_) => {
            log::error!("Request failed: {e}");
            HttpResponse::InternalServerError().json(body)
        }
    }
}
