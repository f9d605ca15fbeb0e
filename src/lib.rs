//! Timed multiple-choice test attempts: catalog, attempt state machine,
//! countdown, crash-safe snapshots, guarded submission and scoring, served
//! over Axum HTTP + WebSocket.

pub mod attempt;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod logic;
pub mod navigation;
pub mod notebook;
pub mod protocol;
pub mod routes;
pub mod scoring;
pub mod seeds;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod status;
pub mod submission;
pub mod telemetry;
pub mod timer;
pub mod util;

pub use routes::build_router;
pub use state::AppState;
