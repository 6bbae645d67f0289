#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! walk_safe API server binary.
//!
//! The database is selected with `DATABASE_URL` (or a `DB_LOGIN_PATH`
//! credentials file); everything else is configured with the flags below.

use std::path::PathBuf;

use clap::Parser;
use walk_safe_server::{ServerConfig, run_server};

#[derive(Parser)]
#[command(name = "walk_safe_server", about = "Pedestrian accident and danger-index API")]
struct Cli {
    /// Address to bind
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1")]
    bind_addr: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8989")]
    port: u16,

    /// GeoJSON file with the study-area perimeter
    #[arg(long, env = "PERIMETER_PATH", default_value = "data/project_area.geojson")]
    perimeter: PathBuf,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    run_server(ServerConfig {
        bind_addr: cli.bind_addr,
        port: cli.port,
        perimeter_path: cli.perimeter,
    })
    .await
}
