//! Application state: catalog, live attempt sessions, snapshot and report
//! stores, the scoring collaborator and the notebook.
//!
//! This module owns:
//!   - the test catalog (config bank + seeds)
//!   - live sessions by attempt id, and the (user, test) -> attempt index
//!   - the snapshot adapter and report store (file-backed in production)
//!   - the report sink (remote endpoint when configured, local scoring otherwise)
//!
//! Starting an attempt prefers, in order: the live session for the same
//! (user, test), a stored snapshot, a fresh attempt.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::attempt::{Attempt, Phase};
use crate::catalog::TestCatalog;
use crate::config::{load_app_config_from_env, AppConfig};
use crate::error::AttemptError;
use crate::notebook::Notebook;
use crate::session::AttemptSession;
use crate::snapshot::{snapshot_key, FileStore, KeyValueStore, SnapshotAdapter};
use crate::submission::{HttpReportSink, LocalReportSink, ReportSink, ReportStore};

pub struct AppState {
    pub config: AppConfig,
    pub catalog: Arc<TestCatalog>,
    pub sessions: RwLock<HashMap<String, Arc<AttemptSession>>>,
    /// snapshot key -> attempt id of the newest session for that pair
    pub by_owner: RwLock<HashMap<String, String>>,
    pub snapshots: SnapshotAdapter,
    pub reports: Arc<ReportStore>,
    pub sink: Arc<dyn ReportSink>,
    pub notebook: Notebook,
    pub tick: Duration,
}

impl AppState {
    /// Build state from env: load config, build the catalog, open file stores.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_app_config_from_env();
        let snapshots: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.snapshots_dir()));
        let reports: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.reports_dir()));
        info!(target: "testprep_backend", data_dir = %config.storage.data_dir.display(), "File stores ready");
        Self::with_stores(config, snapshots, reports)
    }

    pub fn with_stores(
        config: AppConfig,
        snapshot_store: Arc<dyn KeyValueStore>,
        report_store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let catalog = Arc::new(TestCatalog::build(&config.tests));
        let reports = Arc::new(ReportStore::new(report_store));

        let sink: Arc<dyn ReportSink> = match config.report.endpoint.clone().and_then(HttpReportSink::new) {
            Some(remote) => {
                info!(target: "testprep_backend", endpoint = %remote.endpoint, "Remote scoring enabled.");
                Arc::new(remote)
            }
            None => {
                info!(target: "testprep_backend", "No report endpoint configured. Scoring locally.");
                Arc::new(LocalReportSink::new(catalog.clone(), reports.clone()))
            }
        };

        let tick = Duration::from_millis(config.timer.tick_millis.max(1));
        Self {
            config,
            catalog,
            sessions: RwLock::new(HashMap::new()),
            by_owner: RwLock::new(HashMap::new()),
            snapshots: SnapshotAdapter::new(snapshot_store),
            reports,
            sink,
            notebook: Notebook::default(),
            tick,
        }
    }

    /// Live session, stored snapshot, or a fresh attempt for `(user_id, test_id)`.
    #[instrument(level = "info", skip(self))]
    pub async fn start_or_resume(&self, user_id: &str, test_id: &str) -> Result<Arc<AttemptSession>, AttemptError> {
        let test = self
            .catalog
            .get(test_id)
            .ok_or_else(|| AttemptError::UnknownTest(test_id.to_string()))?;
        if test.question_count() == 0 {
            return Err(AttemptError::EmptyTest(test.id.clone()));
        }

        let key = snapshot_key(user_id, test_id);
        let mut by_owner = self.by_owner.write().await;

        if let Some(id) = by_owner.get(&key).cloned() {
            let live = { self.sessions.read().await.get(&id).cloned() };
            if let Some(session) = live {
                if session.phase().await != Phase::Submitted {
                    info!(target: "attempt", attempt_id = %session.id(), "Reusing live session");
                    return Ok(session);
                }
                // Its report lives on in the report store.
                self.sessions.write().await.remove(&id);
                debug!(target: "attempt", attempt_id = %id, "Evicted submitted session");
            }
        }

        let (attempt, attempt_id, resumed) = match self.snapshots.load(user_id, &test).await {
            Some((attempt, stored_id)) => {
                let id = stored_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                info!(target: "attempt", attempt_id = %id, time_left = attempt.time_left_secs(), position = attempt.position(), "Resumed from snapshot");
                (attempt, id, true)
            }
            None => {
                let attempt = Attempt::new(&test, user_id, Utc::now())?;
                let id = Uuid::new_v4().to_string();
                info!(target: "attempt", attempt_id = %id, "Fresh attempt created");
                (attempt, id, false)
            }
        };

        let session = AttemptSession::new(
            attempt_id.clone(),
            test,
            attempt,
            resumed,
            self.snapshots.clone(),
            self.sink.clone(),
        );
        if resumed {
            session.ensure_timer(self.tick);
        }

        self.sessions.write().await.insert(attempt_id.clone(), session.clone());
        by_owner.insert(key, attempt_id);
        Ok(session)
    }

    /// Look up a session and check that `user_id` owns it.
    pub async fn session_for(&self, user_id: &str, attempt_id: &str) -> Result<Arc<AttemptSession>, AttemptError> {
        let session = self
            .sessions
            .read()
            .await
            .get(attempt_id)
            .cloned()
            .ok_or_else(|| AttemptError::UnknownAttempt(attempt_id.to_string()))?;
        session.check_owner(user_id)?;
        Ok(session)
    }

    /// Drop a session from both indices.
    pub async fn forget(&self, session: &AttemptSession) {
        let key = snapshot_key(session.user_id(), &session.test().id);
        let mut by_owner = self.by_owner.write().await;
        if by_owner.get(&key).map(|id| id == session.id()).unwrap_or(false) {
            by_owner.remove(&key);
        }
        self.sessions.write().await.remove(session.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::AttemptEvent;
    use crate::domain::{OptionKey, QuestionStatus};
    use crate::snapshot::{AttemptSnapshot, MemoryStore};

    fn state_with(store: Arc<MemoryStore>) -> AppState {
        let mut config = AppConfig::default();
        config.tests = toml::from_str::<AppConfig>(
            r#"
[[tests]]
id = "no-questions"
duration_secs = 60
"#,
        )
        .unwrap()
        .tests;
        AppState::with_stores(config, store, Arc::new(MemoryStore::default()))
    }

    #[tokio::test]
    async fn same_user_and_test_reuses_the_live_session() {
        let state = state_with(Arc::new(MemoryStore::default()));
        let a = state.start_or_resume("U1", "demo-quick").await.unwrap();
        let b = state.start_or_resume("U1", "demo-quick").await.unwrap();
        let c = state.start_or_resume("U2", "demo-quick").await.unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(state.session_for("U2", a.id()).await.err(), Some(AttemptError::NotOwner));
    }

    #[tokio::test]
    async fn restart_resumes_from_snapshot() {
        let store = Arc::new(MemoryStore::default());
        let first = state_with(store.clone());
        let s = first.start_or_resume("U1", "demo-quick").await.unwrap();
        s.begin().await.unwrap();
        s.apply(&AttemptEvent::Select { option: OptionKey::D }).await.unwrap();
        s.apply(&AttemptEvent::Navigate { index: 3 }).await.unwrap();

        // A new process sharing the same store.
        let second = state_with(store);
        let resumed = second.start_or_resume("U1", "demo-quick").await.unwrap();
        let view = resumed.view().await;
        assert!(view.resumed);
        assert_eq!(resumed.id(), s.id());
        assert_eq!(view.position, 3);
        assert_eq!(view.palette[0].status, QuestionStatus::Answered);
        assert_eq!(view.phase, Phase::Active);
    }

    #[tokio::test]
    async fn mismatched_snapshot_starts_fresh() {
        let store = Arc::new(MemoryStore::default());
        let test = seed_quick();
        let mut other = Attempt::new(&test, "U2", Utc::now()).unwrap();
        other.begin().unwrap();
        other.apply(&AttemptEvent::Select { option: OptionKey::A }).unwrap();
        let body = serde_json::to_string(&AttemptSnapshot::capture(&other, "u2-attempt")).unwrap();
        store.put(&snapshot_key("U1", "demo-quick"), body).await.unwrap();

        let state = state_with(store);
        let s = state.start_or_resume("U1", "demo-quick").await.unwrap();
        assert_ne!(s.id(), "u2-attempt");
        s.begin().await.unwrap();
        let view = s.view().await;
        assert!(!view.resumed);
        assert_eq!(view.palette[0].status, QuestionStatus::Unanswered);
        assert!(view.palette[1..].iter().all(|p| p.status == QuestionStatus::NotVisited));
    }

    #[tokio::test]
    async fn unknown_and_empty_tests_are_errors() {
        let state = state_with(Arc::new(MemoryStore::default()));
        assert_eq!(
            state.start_or_resume("U1", "missing").await.err(),
            Some(AttemptError::UnknownTest("missing".into()))
        );
        assert_eq!(
            state.start_or_resume("U1", "no-questions").await.err(),
            Some(AttemptError::EmptyTest("no-questions".into()))
        );
    }

    #[tokio::test]
    async fn submitted_session_is_replaced_by_a_new_attempt() {
        let state = state_with(Arc::new(MemoryStore::default()));
        let s = state.start_or_resume("U1", "demo-quick").await.unwrap();
        s.begin().await.unwrap();
        s.submit(crate::session::SubmitTrigger::Manual).await.unwrap();
        let next = state.start_or_resume("U1", "demo-quick").await.unwrap();
        assert_ne!(next.id(), s.id());
        assert_eq!(next.phase().await, Phase::Instructions);
    }

    #[tokio::test]
    async fn submitted_sessions_do_not_accumulate() {
        let state = state_with(Arc::new(MemoryStore::default()));
        let mut reports = Vec::new();
        for _ in 0..5 {
            let s = state.start_or_resume("U1", "demo-quick").await.unwrap();
            s.begin().await.unwrap();
            reports.push(s.submit(crate::session::SubmitTrigger::Manual).await.unwrap());
        }
        assert_eq!(state.sessions.read().await.len(), 1);
        assert_eq!(state.by_owner.read().await.len(), 1);

        let _ = state.start_or_resume("U1", "demo-quick").await.unwrap();
        assert_eq!(state.sessions.read().await.len(), 1);
        for r in reports {
            assert!(state.reports.get(&r.report_id).await.unwrap().is_some());
        }
    }

    fn seed_quick() -> crate::domain::TestDefinition {
        crate::seeds::seed_tests().into_iter().find(|t| t.id == "demo-quick").unwrap()
    }
}
