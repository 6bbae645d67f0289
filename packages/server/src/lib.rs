#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for walk_safe.
//!
//! Serves user registration and login, trajectory queries, the accident
//! buffer and heatmap layers, and danger-index scoring. The study-area
//! perimeter is loaded once at startup and shared with the
//! [`DangerIndexEngine`].

pub mod auth;
mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use walk_safe_danger::DangerIndexEngine;
use walk_safe_database::{DatabaseStore, Store, db, run_migrations};
use walk_safe_spatial::{Lv95ToWgs84, Perimeter};

/// Shared application state.
pub struct AppState {
    /// Storage for users, trajectories, accidents and cached scores.
    pub store: Arc<dyn Store>,
    /// Danger-index scoring over the same store.
    pub engine: Arc<DangerIndexEngine>,
}

impl AppState {
    /// Builds the state around an engine scoring against `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, engine: DangerIndexEngine) -> Self {
        Self {
            store,
            engine: Arc::new(engine),
        }
    }
}

/// Startup options of the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: String,
    /// Port to listen on.
    pub port: u16,
    /// GeoJSON file holding the study-area perimeter.
    pub perimeter_path: PathBuf,
}

/// Registers the `/api` routes.
///
/// Literal segments (`perimeter`, `average`) are registered before the
/// `{id}` routes they would otherwise be captured by.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/register", web::post().to(handlers::register))
            .route("/login", web::post().to(handlers::login))
            .route("/trajectories", web::get().to(handlers::trajectories))
            .route(
                "/trajectories/perimeter",
                web::get().to(handlers::trajectories_in_perimeter),
            )
            .route("/trajectories/{id}", web::get().to(handlers::trajectory))
            .route(
                "/trajectories/{id}/perimeter",
                web::get().to(handlers::trajectory_in_perimeter),
            )
            .route("/buffers", web::get().to(handlers::buffers))
            .route("/heatmap", web::get().to(handlers::heatmap))
            .route(
                "/danger-index/average",
                web::get().to(handlers::danger_index_average),
            )
            .route(
                "/danger-index/{id}",
                web::get().to(handlers::compute_danger_index),
            )
            .route(
                "/danger-index/{id}",
                web::post().to(handlers::save_danger_index),
            ),
    );
}

/// Starts the walk_safe API server.
///
/// Connects to the database, runs migrations, loads the perimeter, sets up
/// LV95 → WGS84 reprojection of accident data and starts the Actix-Web HTTP
/// server. The caller is responsible for providing the async runtime (e.g.
/// via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the database connection,
/// migrations, perimeter loading or projection setup fail, or if the HTTP
/// server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    log::info!("Connecting to database...");
    let db_conn = db::connect_from_env()
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to connect to database: {e}")))?;

    log::info!("Running migrations...");
    run_migrations(db_conn.as_ref())
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to run migrations: {e}")))?;

    log::info!("Loading perimeter from {}...", config.perimeter_path.display());
    let perimeter = Perimeter::load(&config.perimeter_path)
        .map_err(|e| std::io::Error::other(format!("Failed to load perimeter: {e}")))?;

    let transform = Lv95ToWgs84::new()
        .map_err(|e| std::io::Error::other(format!("Failed to set up LV95 reprojection: {e}")))?;

    let store: Arc<dyn Store> = Arc::new(DatabaseStore::new(Arc::from(db_conn)));
    let engine = DangerIndexEngine::new(store.clone(), Arc::new(perimeter), Arc::new(transform));
    let state = web::Data::new(AppState::new(store, engine));

    let ServerConfig {
        bind_addr, port, ..
    } = config;

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
