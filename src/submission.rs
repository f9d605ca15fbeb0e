//! Submission pipeline: the ordered answer list handed to the scoring
//! collaborator, the collaborator trait and its two implementations.
//!
//! - `LocalReportSink` scores in-process and keeps reports as JSON files.
//! - `HttpReportSink` posts the submission to a remote scoring service when
//!   `REPORT_ENDPOINT` (or `[report].endpoint`) is configured.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::attempt::Attempt;
use crate::catalog::TestCatalog;
use crate::domain::{OptionKey, QuestionStatus};
use crate::error::{StoreError, SubmitError};
use crate::scoring::{score_submission, TestReport};
use crate::snapshot::KeyValueStore;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub selected: Option<OptionKey>,
    pub status: QuestionStatus,
    pub time_spent_secs: u64,
}

/// Everything the scoring collaborator receives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub attempt_id: String,
    pub user_id: String,
    pub test_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// One entry per question, in delivery order.
    pub answers: Vec<SubmittedAnswer>,
}

impl Submission {
    pub fn from_attempt(attempt: &Attempt, attempt_id: &str, ended_at: DateTime<Utc>) -> Self {
        Self {
            attempt_id: attempt_id.to_string(),
            user_id: attempt.user_id().to_string(),
            test_id: attempt.test_id().to_string(),
            started_at: attempt.started_at(),
            ended_at,
            answers: attempt
                .ordered_records()
                .map(|(id, r)| SubmittedAnswer {
                    question_id: id.to_string(),
                    selected: r.selected,
                    status: r.status,
                    time_spent_secs: r.time_spent_secs,
                })
                .collect(),
        }
    }
}

/// Where the results view lives once a submission is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRef {
    pub report_id: String,
    pub results_url: String,
}

/// Scoring / report-persistence collaborator.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn submit(&self, submission: &Submission) -> Result<ReportRef, SubmitError>;
}

/// Reports kept in memory and mirrored to a key/value store.
pub struct ReportStore {
    cache: RwLock<HashMap<String, TestReport>>,
    backing: Arc<dyn KeyValueStore>,
}

impl ReportStore {
    pub fn new(backing: Arc<dyn KeyValueStore>) -> Self {
        Self { cache: RwLock::new(HashMap::new()), backing }
    }

    pub async fn save(&self, report: &TestReport) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(report)?;
        self.backing.put(&report.report_id, body).await?;
        self.cache.write().await.insert(report.report_id.clone(), report.clone());
        Ok(())
    }

    pub async fn get(&self, report_id: &str) -> Result<Option<TestReport>, StoreError> {
        if let Some(r) = self.cache.read().await.get(report_id).cloned() {
            return Ok(Some(r));
        }
        let Some(raw) = self.backing.get(report_id).await? else {
            return Ok(None);
        };
        let report: TestReport = serde_json::from_str(&raw)?;
        self.cache.write().await.insert(report_id.to_string(), report.clone());
        Ok(Some(report))
    }
}

pub struct LocalReportSink {
    catalog: Arc<TestCatalog>,
    reports: Arc<ReportStore>,
}

impl LocalReportSink {
    pub fn new(catalog: Arc<TestCatalog>, reports: Arc<ReportStore>) -> Self {
        Self { catalog, reports }
    }
}

#[async_trait]
impl ReportSink for LocalReportSink {
    #[instrument(level = "info", skip(self, submission), fields(attempt_id = %submission.attempt_id, test_id = %submission.test_id))]
    async fn submit(&self, submission: &Submission) -> Result<ReportRef, SubmitError> {
        let test = self
            .catalog
            .get(&submission.test_id)
            .ok_or_else(|| SubmitError::Rejected(format!("unknown test {}", submission.test_id)))?;

        let report_id = Uuid::new_v4().to_string();
        let report = score_submission(&test, submission, report_id.clone());
        self.reports.save(&report).await?;

        info!(target: "attempt", %report_id, score = report.score, max = report.max_score, "Report stored");
        Ok(ReportRef { results_url: format!("/api/v1/reports/{}", report_id), report_id })
    }
}

#[derive(Clone)]
pub struct HttpReportSink {
    pub client: reqwest::Client,
    pub endpoint: String,
}

impl HttpReportSink {
    /// Build the client; `None` if reqwest cannot be initialized.
    pub fn new(endpoint: String) -> Option<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .ok()?;
        Some(Self { client, endpoint })
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    #[instrument(level = "info", skip(self, submission), fields(endpoint = %self.endpoint, attempt_id = %submission.attempt_id))]
    async fn submit(&self, submission: &Submission) -> Result<ReportRef, SubmitError> {
        let t0 = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, "testprep-backend/0.1")
            .json(submission)
            .send()
            .await
            .map_err(|e| {
                error!(target: "attempt", error = %e, "Report endpoint unreachable");
                SubmitError::Unavailable(e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(target: "attempt", %status, body = %crate::util::trunc_for_log(&body, 200), "Report endpoint rejected submission");
            return Err(if status.is_server_error() {
                SubmitError::Unavailable(format!("status {}", status))
            } else {
                SubmitError::Rejected(format!("status {}", status))
            });
        }

        let out: ReportRef = resp
            .json()
            .await
            .map_err(|e| SubmitError::Rejected(format!("bad response body: {}", e)))?;
        info!(target: "attempt", report_id = %out.report_id, elapsed_ms = t0.elapsed().as_millis() as u64, "Remote report accepted");
        Ok(out)
    }
}
