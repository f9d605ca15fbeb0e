//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::attempt::AttemptEvent;
use crate::error::AppError;
use crate::logic::*;
use crate::notebook::QuestionRef;
use crate::protocol::*;
use crate::state::AppState;
use crate::util::user_from_headers;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_list_tests(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let tests: Vec<TestSummaryOut> = state.catalog.list().map(|t| test_summary(t)).collect();
  Json(tests)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_test(
  State(state): State<Arc<AppState>>,
  Path(test_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let test = state
    .catalog
    .get(&test_id)
    .ok_or_else(|| AppError::NotFound(format!("unknown test: {}", test_id)))?;
  if test.question_count() == 0 {
    return Err(AppError::Unprocessable(format!("test {} has no questions", test_id)));
  }
  Ok(Json(test_out(&test)))
}

#[instrument(level = "info", skip(state, headers), fields(test_id = %body.test_id))]
pub async fn http_start_attempt(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<StartAttemptIn>,
) -> Result<impl IntoResponse, AppError> {
  let user_id = user_from_headers(&headers)?;
  let view = start_attempt(&state, &user_id, &body.test_id).await?;
  info!(target: "attempt", attempt_id = %view.attempt_id, %user_id, resumed = view.resumed, "HTTP attempt started");
  Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_attempt(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let user_id = user_from_headers(&headers)?;
  Ok(Json(attempt_view(&state, &user_id, &attempt_id).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_begin_attempt(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let user_id = user_from_headers(&headers)?;
  Ok(Json(begin_attempt(&state, &user_id, &attempt_id).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_post_event(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(attempt_id): Path<String>,
  Json(event): Json<AttemptEvent>,
) -> Result<impl IntoResponse, AppError> {
  let user_id = user_from_headers(&headers)?;
  Ok(Json(apply_event(&state, &user_id, &attempt_id, &event).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_submit_attempt(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let user_id = user_from_headers(&headers)?;
  let report = submit_attempt(&state, &user_id, &attempt_id).await?;
  info!(target: "attempt", %attempt_id, report_id = %report.report_id, "HTTP submit accepted");
  Ok(Json(report))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_abandon_attempt(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let user_id = user_from_headers(&headers)?;
  abandon_attempt(&state, &user_id, &attempt_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_report(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(report_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let user_id = user_from_headers(&headers)?;
  Ok(Json(get_report(&state, &user_id, &report_id).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_notebook(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
  let user_id = user_from_headers(&headers)?;
  Ok(Json(state.notebook.list(&user_id).await))
}

#[instrument(level = "info", skip(state, headers, body), fields(test_id = %body.test_id, question_id = %body.question_id))]
pub async fn http_save_to_notebook(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<NotebookIn>,
) -> Result<impl IntoResponse, AppError> {
  let user_id = user_from_headers(&headers)?;
  let test = state
    .catalog
    .get(&body.test_id)
    .ok_or_else(|| AppError::NotFound(format!("unknown test: {}", body.test_id)))?;
  if test.question(&body.question_id).is_none() {
    return Err(AppError::NotFound(format!("unknown question: {}", body.question_id)));
  }
  let item = QuestionRef { test_id: body.test_id, question_id: body.question_id };
  Ok(Json(state.notebook.save(&user_id, body.collection.as_deref(), item).await))
}

#[instrument(level = "info", skip(state, headers, body), fields(test_id = %body.test_id, question_id = %body.question_id))]
pub async fn http_remove_from_notebook(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<NotebookIn>,
) -> Result<impl IntoResponse, AppError> {
  let user_id = user_from_headers(&headers)?;
  let item = QuestionRef { test_id: body.test_id, question_id: body.question_id };
  Ok(Json(state.notebook.remove(&user_id, body.collection.as_deref(), &item).await))
}
