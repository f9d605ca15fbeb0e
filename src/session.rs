//! Live attempt session: the adapter between callers (HTTP, WebSocket, the
//! countdown task) and an `Attempt`.
//!
//! Every mutation takes the session lock, applies the change to the attempt,
//! writes a fresh snapshot and broadcasts a notice. Submission is guarded by
//! an atomic flag so only one collaborator call can be in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::attempt::{Attempt, AttemptEvent, Phase, Tick};
use crate::domain::TestDefinition;
use crate::error::{AttemptError, SubmitError};
use crate::protocol::AttemptView;
use crate::snapshot::{AttemptSnapshot, SnapshotAdapter};
use crate::submission::{ReportRef, ReportSink, Submission};

const NOTICE_CAPACITY: usize = 64;

/// Pushed to watchers of an attempt.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptNotice {
    Tick { time_left_secs: u64 },
    Expired,
    Submitted { report: ReportRef },
    SubmitFailed { message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    TimeUp,
}

struct Inner {
    attempt: Attempt,
    report: Option<ReportRef>,
}

pub struct AttemptSession {
    id: String,
    user_id: String,
    test: Arc<TestDefinition>,
    resumed: bool,
    inner: Mutex<Inner>,
    submitting: AtomicBool,
    finalized: AtomicBool,
    abandoned: AtomicBool,
    notices: broadcast::Sender<AttemptNotice>,
    snapshots: SnapshotAdapter,
    sink: Arc<dyn ReportSink>,
    timer: StdMutex<Option<JoinHandle<()>>>,
}

impl AttemptSession {
    pub fn new(
        id: String,
        test: Arc<TestDefinition>,
        attempt: Attempt,
        resumed: bool,
        snapshots: SnapshotAdapter,
        sink: Arc<dyn ReportSink>,
    ) -> Arc<Self> {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Arc::new(Self {
            id,
            user_id: attempt.user_id().to_string(),
            test,
            resumed,
            inner: Mutex::new(Inner { attempt, report: None }),
            submitting: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
            notices,
            snapshots,
            sink,
            timer: StdMutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn test(&self) -> &Arc<TestDefinition> {
        &self.test
    }

    pub fn check_owner(&self, user_id: &str) -> Result<(), AttemptError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            Err(AttemptError::NotOwner)
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttemptNotice> {
        self.notices.subscribe()
    }

    pub async fn phase(&self) -> Phase {
        self.inner.lock().await.attempt.phase()
    }

    pub async fn view(&self) -> AttemptView {
        let inner = self.inner.lock().await;
        AttemptView::build(&self.id, &self.test, &inner.attempt, inner.report.as_ref(), self.resumed)
    }

    /// Accept the instructions. Returns true when this call started the clock.
    #[instrument(level = "info", skip(self), fields(attempt_id = %self.id))]
    pub async fn begin(&self) -> Result<bool, AttemptError> {
        let mut inner = self.inner.lock().await;
        let was_waiting = inner.attempt.phase() == Phase::Instructions;
        inner.attempt.begin()?;
        if was_waiting {
            self.persist(&inner.attempt).await;
            info!(target: "attempt", attempt_id = %self.id, user_id = %self.user_id, test_id = %self.test.id, "Attempt begun");
        }
        Ok(was_waiting)
    }

    #[instrument(level = "debug", skip(self), fields(attempt_id = %self.id))]
    pub async fn apply(&self, event: &AttemptEvent) -> Result<(), AttemptError> {
        // Checked under the lock: `submit` raises the flag before it captures.
        let mut inner = self.inner.lock().await;
        self.ensure_not_submitting()?;
        inner.attempt.apply(event)?;
        self.persist(&inner.attempt).await;
        Ok(())
    }

    /// One countdown step, driven by the timer task.
    pub async fn tick(&self) -> Tick {
        let mut inner = self.inner.lock().await;
        let tick = inner.attempt.tick();
        match tick {
            Tick::Idle => {}
            Tick::Running { time_left_secs } => {
                self.persist(&inner.attempt).await;
                let _ = self.notices.send(AttemptNotice::Tick { time_left_secs });
            }
            Tick::Expired => {
                self.persist(&inner.attempt).await;
                let _ = self.notices.send(AttemptNotice::Tick { time_left_secs: 0 });
                let _ = self.notices.send(AttemptNotice::Expired);
                info!(target: "attempt", attempt_id = %self.id, "Time is up");
            }
        }
        tick
    }

    /// Hand the attempt to the scoring collaborator. At most one call is in
    /// flight; on failure the snapshot is kept and the call can be retried.
    #[instrument(level = "info", skip(self), fields(attempt_id = %self.id))]
    pub async fn submit(&self, trigger: SubmitTrigger) -> Result<ReportRef, SubmitError> {
        if self
            .submitting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(if self.finalized.load(Ordering::Acquire) {
                SubmitError::AlreadySubmitted
            } else {
                SubmitError::InFlight
            });
        }

        let submission = {
            let inner = self.inner.lock().await;
            match inner.attempt.phase() {
                Phase::Active | Phase::TimeUp => {}
                Phase::Instructions => {
                    self.submitting.store(false, Ordering::Release);
                    return Err(SubmitError::NotStarted);
                }
                Phase::Submitted => {
                    return Err(SubmitError::AlreadySubmitted);
                }
            }
            Submission::from_attempt(&inner.attempt, &self.id, Utc::now())
        };

        match self.sink.submit(&submission).await {
            Ok(report) => {
                let mut inner = self.inner.lock().await;
                inner.attempt.mark_submitted();
                inner.report = Some(report.clone());
                self.finalized.store(true, Ordering::Release);
                if let Err(e) = self.snapshots.clear(&self.user_id, &self.test.id).await {
                    warn!(target: "attempt", attempt_id = %self.id, error = %e, "Failed to clear snapshot after submission");
                }
                info!(target: "attempt", attempt_id = %self.id, ?trigger, report_id = %report.report_id, "Attempt submitted");
                let _ = self.notices.send(AttemptNotice::Submitted { report: report.clone() });
                Ok(report)
            }
            Err(e) => {
                self.submitting.store(false, Ordering::Release);
                warn!(target: "attempt", attempt_id = %self.id, ?trigger, error = %e, "Submission failed; snapshot kept");
                let _ = self.notices.send(AttemptNotice::SubmitFailed { message: e.to_string() });
                Err(e)
            }
        }
    }

    /// Drop the attempt without a report. Clears the snapshot.
    #[instrument(level = "info", skip(self), fields(attempt_id = %self.id))]
    pub async fn abandon(&self) -> Result<(), AttemptError> {
        let _inner = self.inner.lock().await;
        if self.submitting.load(Ordering::Acquire) {
            return Err(AttemptError::SubmissionInFlight);
        }
        self.abandoned.store(true, Ordering::Release);
        self.stop_timer();
        if let Err(e) = self.snapshots.clear(&self.user_id, &self.test.id).await {
            warn!(target: "attempt", attempt_id = %self.id, error = %e, "Failed to clear snapshot on abandon");
        }
        info!(target: "attempt", attempt_id = %self.id, "Attempt abandoned");
        Ok(())
    }

    fn ensure_not_submitting(&self) -> Result<(), AttemptError> {
        if !self.submitting.load(Ordering::Acquire) {
            return Ok(());
        }
        Err(if self.finalized.load(Ordering::Acquire) {
            AttemptError::AlreadySubmitted
        } else {
            AttemptError::SubmissionInFlight
        })
    }

    /// Start the countdown task unless one is already running.
    pub fn ensure_timer(self: &Arc<Self>, period: Duration) {
        let mut slot = match self.timer.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let running = slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        if !running && !self.abandoned.load(Ordering::Acquire) {
            *slot = Some(crate::timer::spawn_countdown(self.clone(), period));
        }
    }

    fn stop_timer(&self) {
        let mut slot = match self.timer.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    async fn persist(&self, attempt: &Attempt) {
        if self.abandoned.load(Ordering::Acquire) {
            return;
        }
        let snapshot = AttemptSnapshot::capture(attempt, &self.id);
        if let Err(e) = self.snapshots.save(&snapshot).await {
            warn!(target: "attempt", attempt_id = %self.id, error = %e, "Snapshot write failed");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;

    /// Counts calls; optionally blocks each call until released, and can be
    /// told to fail.
    #[derive(Default)]
    pub struct ScriptedSink {
        pub calls: AtomicUsize,
        pub gated: AtomicBool,
        pub fail: AtomicBool,
        pub entered: Notify,
        pub release: Notify,
    }

    #[async_trait]
    impl ReportSink for ScriptedSink {
        async fn submit(&self, submission: &Submission) -> Result<ReportRef, SubmitError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.gated.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SubmitError::Unavailable("scripted failure".into()));
            }
            Ok(ReportRef {
                report_id: format!("{}-{}", submission.attempt_id, n),
                results_url: format!("/results/{}", n),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedSink;
    use super::*;
    use crate::domain::{OptionKey, QuestionStatus};
    use crate::seeds::seed_tests;
    use crate::snapshot::{snapshot_key, KeyValueStore, MemoryStore};

    struct Fixture {
        session: Arc<AttemptSession>,
        sink: Arc<ScriptedSink>,
        store: Arc<MemoryStore>,
    }

    fn fixture(duration_secs: u64) -> Fixture {
        let mut test = seed_tests().into_iter().find(|t| t.id == "demo-quick").unwrap();
        test.duration_secs = duration_secs;
        let test = Arc::new(test);
        let store = Arc::new(MemoryStore::default());
        let sink = Arc::new(ScriptedSink::default());
        let attempt = Attempt::new(&test, "U1", Utc::now()).unwrap();
        let session = AttemptSession::new(
            "att-1".into(),
            test,
            attempt,
            false,
            SnapshotAdapter::new(store.clone()),
            sink.clone(),
        );
        Fixture { session, sink, store }
    }

    async fn stored(f: &Fixture) -> Option<String> {
        f.store.get(&snapshot_key("U1", "demo-quick")).await.unwrap()
    }

    #[tokio::test]
    async fn every_change_is_snapshotted() {
        let f = fixture(60);
        assert!(stored(&f).await.is_none());
        assert!(f.session.begin().await.unwrap());
        assert!(!f.session.begin().await.unwrap());
        assert!(stored(&f).await.is_some());

        f.session.apply(&AttemptEvent::Select { option: OptionKey::C }).await.unwrap();
        let raw = stored(&f).await.unwrap();
        let snap: AttemptSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(snap.attempt_id.as_deref(), Some("att-1"));
        assert_eq!(snap.time_left, 60);

        f.session.tick().await;
        let snap: AttemptSnapshot = serde_json::from_str(&stored(&f).await.unwrap()).unwrap();
        assert_eq!(snap.time_left, 59);
    }

    #[tokio::test]
    async fn double_submit_calls_the_collaborator_once() {
        let f = fixture(60);
        f.session.begin().await.unwrap();
        let first = f.session.submit(SubmitTrigger::Manual).await;
        let second = f.session.submit(SubmitTrigger::Manual).await;
        assert!(first.is_ok());
        assert_eq!(second, Err(SubmitError::AlreadySubmitted));
        assert_eq!(f.sink.calls.load(Ordering::SeqCst), 1);
        assert!(stored(&f).await.is_none());
        assert_eq!(f.session.phase().await, Phase::Submitted);
    }

    #[tokio::test]
    async fn expiry_during_manual_submit_submits_once() {
        let f = fixture(2);
        f.sink.gated.store(true, Ordering::SeqCst);
        f.session.begin().await.unwrap();

        let manual = {
            let session = f.session.clone();
            tokio::spawn(async move { session.submit(SubmitTrigger::Manual).await })
        };
        f.sink.entered.notified().await;

        assert_eq!(f.session.tick().await, Tick::Running { time_left_secs: 1 });
        assert_eq!(f.session.tick().await, Tick::Expired);
        assert_eq!(f.session.submit(SubmitTrigger::TimeUp).await, Err(SubmitError::InFlight));

        f.sink.release.notify_one();
        let report = manual.await.unwrap().unwrap();
        assert_eq!(report.report_id, "att-1-1");
        assert_eq!(f.sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.session.tick().await, Tick::Idle);
    }

    #[tokio::test]
    async fn failed_submission_keeps_snapshot_and_can_retry() {
        let f = fixture(60);
        f.session.begin().await.unwrap();
        f.session.apply(&AttemptEvent::Select { option: OptionKey::A }).await.unwrap();
        let mut notices = f.session.subscribe();

        f.sink.fail.store(true, Ordering::SeqCst);
        let err = f.session.submit(SubmitTrigger::Manual).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(stored(&f).await.is_some());
        assert_eq!(f.session.phase().await, Phase::Active);
        assert!(matches!(notices.recv().await.unwrap(), AttemptNotice::SubmitFailed { .. }));

        f.sink.fail.store(false, Ordering::SeqCst);
        f.session.submit(SubmitTrigger::Manual).await.unwrap();
        assert_eq!(f.sink.calls.load(Ordering::SeqCst), 2);
        assert!(stored(&f).await.is_none());
    }

    #[tokio::test]
    async fn events_are_rejected_while_submitting_and_after() {
        let f = fixture(60);
        f.sink.gated.store(true, Ordering::SeqCst);
        f.session.begin().await.unwrap();
        let manual = {
            let session = f.session.clone();
            tokio::spawn(async move { session.submit(SubmitTrigger::Manual).await })
        };
        f.sink.entered.notified().await;
        assert_eq!(
            f.session.apply(&AttemptEvent::Next).await,
            Err(AttemptError::SubmissionInFlight)
        );
        f.sink.release.notify_one();
        manual.await.unwrap().unwrap();
        assert_eq!(
            f.session.apply(&AttemptEvent::Next).await,
            Err(AttemptError::AlreadySubmitted)
        );
    }

    #[tokio::test]
    async fn event_queued_behind_the_lock_loses_to_a_submit() {
        let f = fixture(60);
        f.session.begin().await.unwrap();

        // Hold the attempt lock so the event queues first and the submit
        // raises its flag while the event is still waiting.
        let guard = f.session.inner.lock().await;
        let event = {
            let session = f.session.clone();
            tokio::spawn(async move { session.apply(&AttemptEvent::Select { option: OptionKey::D }).await })
        };
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        let manual = {
            let session = f.session.clone();
            tokio::spawn(async move { session.submit(SubmitTrigger::Manual).await })
        };
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert!(f.session.submitting.load(Ordering::SeqCst));
        drop(guard);

        assert_eq!(event.await.unwrap(), Err(AttemptError::SubmissionInFlight));
        manual.await.unwrap().unwrap();
        assert_eq!(f.sink.calls.load(Ordering::SeqCst), 1);
        let view = f.session.view().await;
        assert_eq!(view.current.selected, None);
        assert_eq!(view.phase, Phase::Submitted);
    }

    #[tokio::test]
    async fn submit_before_begin_is_rejected_without_calling_out() {
        let f = fixture(60);
        assert_eq!(f.session.submit(SubmitTrigger::Manual).await, Err(SubmitError::NotStarted));
        assert_eq!(f.sink.calls.load(Ordering::SeqCst), 0);
        // the guard was released
        f.session.begin().await.unwrap();
        assert!(f.session.submit(SubmitTrigger::Manual).await.is_ok());
    }

    #[tokio::test]
    async fn abandon_clears_snapshot_and_stops_persisting() {
        let f = fixture(60);
        f.session.begin().await.unwrap();
        assert!(stored(&f).await.is_some());
        f.session.abandon().await.unwrap();
        assert!(stored(&f).await.is_none());
        f.session.tick().await;
        assert!(stored(&f).await.is_none());
    }

    #[tokio::test]
    async fn view_reflects_state() {
        let f = fixture(60);
        f.session.begin().await.unwrap();
        f.session.apply(&AttemptEvent::Navigate { index: 2 }).await.unwrap();
        f.session.apply(&AttemptEvent::Select { option: OptionKey::B }).await.unwrap();
        let view = f.session.view().await;
        assert_eq!(view.position, 2);
        assert_eq!(view.current.question.id, "q3");
        assert_eq!(view.current.selected, Some(OptionKey::B));
        assert_eq!(view.palette[2].status, QuestionStatus::Answered);
        assert_eq!(view.counts.answered, 1);
    }
}
