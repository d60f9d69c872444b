//! Survey Intake Backend
//!
//! - Axum HTTP API for question authoring and response ingestion
//! - SQLite record store (file path or ":memory:")
//! - Structured tracing logs
//!
//! Important env variables:
//!   SURVEY_CONFIG_PATH : path to TOML config ([server], [database])
//!   PORT               : u16, overrides server.port (default 3000)
//!   HOST               : overrides server.host (default "0.0.0.0")
//!   DATABASE_PATH      : overrides database.path (default "survey.sqlite3")
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod config;
mod domain;
mod category;
mod error;
mod store;
mod options;
mod normalize;
mod ingest;
mod protocol;
mod state;
mod routes;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use crate::config::load_config_from_env;
use crate::routes::build_router;
use crate::state::AppState;

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "survey_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "survey_backend", "Shutdown signal received");
}

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = load_config_from_env();
  let addr = config.socket_addr()?;

  // Open the record store and build shared state.
  let state = Arc::new(AppState::from_config(config)?);

  let app = build_router(state.clone());

  let listener = TcpListener::bind(addr).await?;
  info!(target: "survey_backend", %addr, db = %state.config.database.path, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}
