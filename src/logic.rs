//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Starting / resuming an attempt and accepting its instructions
//!   - Applying user events and returning the refreshed view
//!   - Manual submission and abandonment
//!   - Report lookup for the results view (owner only)

use tracing::{info, instrument, warn};

use crate::attempt::AttemptEvent;
use crate::error::{AppError, AttemptError};
use crate::protocol::AttemptView;
use crate::scoring::TestReport;
use crate::session::SubmitTrigger;
use crate::state::AppState;
use crate::submission::ReportRef;

#[instrument(level = "info", skip(state))]
pub async fn start_attempt(state: &AppState, user_id: &str, test_id: &str) -> Result<AttemptView, AppError> {
  let session = state.start_or_resume(user_id, test_id).await?;
  Ok(session.view().await)
}

#[instrument(level = "info", skip(state))]
pub async fn attempt_view(state: &AppState, user_id: &str, attempt_id: &str) -> Result<AttemptView, AppError> {
  let session = state.session_for(user_id, attempt_id).await?;
  Ok(session.view().await)
}

#[instrument(level = "info", skip(state))]
pub async fn begin_attempt(state: &AppState, user_id: &str, attempt_id: &str) -> Result<AttemptView, AppError> {
  let session = state.session_for(user_id, attempt_id).await?;
  if session.begin().await? {
    session.ensure_timer(state.tick);
  }
  Ok(session.view().await)
}

#[instrument(level = "debug", skip(state))]
pub async fn apply_event(
  state: &AppState,
  user_id: &str,
  attempt_id: &str,
  event: &AttemptEvent,
) -> Result<AttemptView, AppError> {
  let session = state.session_for(user_id, attempt_id).await?;
  session.apply(event).await?;
  Ok(session.view().await)
}

#[instrument(level = "info", skip(state))]
pub async fn submit_attempt(state: &AppState, user_id: &str, attempt_id: &str) -> Result<ReportRef, AppError> {
  let session = state.session_for(user_id, attempt_id).await?;
  match session.submit(SubmitTrigger::Manual).await {
    Ok(report) => Ok(report),
    Err(e) => {
      warn!(target: "attempt", %attempt_id, error = %e, retryable = e.is_retryable(), "Manual submission failed");
      Err(e.into())
    }
  }
}

#[instrument(level = "info", skip(state))]
pub async fn abandon_attempt(state: &AppState, user_id: &str, attempt_id: &str) -> Result<(), AppError> {
  let session = state.session_for(user_id, attempt_id).await?;
  session.abandon().await?;
  state.forget(&session).await;
  info!(target: "attempt", %attempt_id, %user_id, "Attempt dropped");
  Ok(())
}

#[instrument(level = "info", skip(state))]
pub async fn get_report(state: &AppState, user_id: &str, report_id: &str) -> Result<TestReport, AppError> {
  let report = state
    .reports
    .get(report_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("unknown report: {}", report_id)))?;
  if report.user_id != user_id {
    return Err(AttemptError::NotOwner.into());
  }
  Ok(report)
}
