//! TestPrep · Timed Attempt Backend
//!
//! - Axum HTTP + WebSocket API
//! - File-backed attempt snapshots and reports under DATA_DIR
//! - Optional remote scoring endpoint (local scoring otherwise)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   DATA_DIR              : snapshot + report root (default "./data")
//!   TICK_MILLIS           : countdown period in ms (default 1000)
//!   REPORT_ENDPOINT       : remote scoring URL; local scoring if unset
//!   TESTPREP_CONFIG_PATH  : path to TOML config (server/storage + optional test bank)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use testprep_backend::{build_router, telemetry, AppState};

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Catalog, file stores and report sink, all from config + env.
  let state = Arc::new(AppState::new());
  info!(target: "testprep_backend", tests = state.catalog.len(), "Catalog loaded");

  let app = build_router(state.clone());

  let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "testprep_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
