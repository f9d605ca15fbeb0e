//! Attempt snapshots and the key/value stores they live in.
//!
//! A snapshot mirrors everything needed to rebuild a running attempt after a
//! restart or reload. It is keyed by `(user, test)` and rewritten after every
//! change. Anything that does not decode into a valid snapshot for the pair
//! being restored is treated as absent and removed.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::attempt::Attempt;
use crate::domain::{AnswerRecord, OptionKey, QuestionStatus, TestDefinition};
use crate::error::StoreError;

/// Bumped whenever the stored layout changes; older blobs are discarded.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Persistent string store addressed by key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// One JSON file per key in a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", crate::util::file_safe(key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// An answer as stored: either the full record or just the chosen option.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredAnswer {
    Record(AnswerRecord),
    Choice(OptionKey),
}

impl StoredAnswer {
    fn into_record(self) -> AnswerRecord {
        match self {
            StoredAnswer::Record(r) => r,
            StoredAnswer::Choice(option) => AnswerRecord {
                selected: Some(option),
                status: QuestionStatus::Answered,
                time_spent_secs: 0,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSnapshot {
    pub version: u32,
    #[serde(default)]
    pub attempt_id: Option<String>,
    pub test_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub time_left: u64,
    pub position: usize,
    pub answers: BTreeMap<String, StoredAnswer>,
}

impl AttemptSnapshot {
    pub fn capture(attempt: &Attempt, attempt_id: &str) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            attempt_id: Some(attempt_id.to_string()),
            test_id: attempt.test_id().to_string(),
            user_id: attempt.user_id().to_string(),
            started_at: attempt.started_at(),
            time_left: attempt.time_left_secs(),
            position: attempt.position(),
            answers: attempt
                .answers()
                .iter()
                .map(|(id, r)| (id.clone(), StoredAnswer::Record(r.clone())))
                .collect(),
        }
    }

    /// Rebuild the attempt, or `None` when the snapshot cannot belong to
    /// `(user_id, test)`.
    pub fn restore(self, test: &TestDefinition, user_id: &str) -> Option<Attempt> {
        if self.version != SNAPSHOT_VERSION {
            debug!(target: "attempt", version = self.version, "Snapshot version mismatch");
            return None;
        }
        if self.user_id != user_id || self.test_id != test.id {
            debug!(target: "attempt", stored_user = %self.user_id, stored_test = %self.test_id, "Snapshot owner mismatch");
            return None;
        }
        if self.answers.keys().any(|id| test.question(id).is_none()) {
            debug!(target: "attempt", test_id = %test.id, "Snapshot references unknown questions");
            return None;
        }
        let answers: HashMap<String, AnswerRecord> = self
            .answers
            .into_iter()
            .map(|(id, a)| (id, a.into_record()))
            .collect();
        // A selection exists exactly when the status says answered.
        if let Some((id, record)) = answers
            .iter()
            .find(|(_, r)| r.selected.is_some() != r.status.has_answer())
        {
            debug!(target: "attempt", question_id = %id, status = ?record.status, selected = ?record.selected, "Snapshot record contradicts itself");
            return None;
        }
        Attempt::resume(test, user_id, self.started_at, self.time_left, self.position, answers).ok()
    }
}

pub fn snapshot_key(user_id: &str, test_id: &str) -> String {
    format!("attempt:{}:{}", user_id, test_id)
}

/// Serializes attempts into a `KeyValueStore` and back.
#[derive(Clone)]
pub struct SnapshotAdapter {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    #[instrument(level = "debug", skip(self, snapshot), fields(user_id = %snapshot.user_id, test_id = %snapshot.test_id))]
    pub async fn save(&self, snapshot: &AttemptSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_string(snapshot)?;
        self.store.put(&snapshot_key(&snapshot.user_id, &snapshot.test_id), body).await
    }

    /// Restore the stored attempt for `(user_id, test)`, discarding anything
    /// unusable. Returns the attempt and the attempt id it was saved under.
    #[instrument(level = "debug", skip(self, test), fields(test_id = %test.id))]
    pub async fn load(&self, user_id: &str, test: &TestDefinition) -> Option<(Attempt, Option<String>)> {
        let key = snapshot_key(user_id, &test.id);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(target: "attempt", %key, error = %e, "Snapshot read failed; starting fresh");
                return None;
            }
        };

        let restored = match serde_json::from_str::<AttemptSnapshot>(&raw) {
            Ok(snapshot) => {
                let attempt_id = snapshot.attempt_id.clone();
                snapshot.restore(test, user_id).map(|a| (a, attempt_id))
            }
            Err(e) => {
                warn!(target: "attempt", %key, error = %e, "Corrupt snapshot");
                None
            }
        };

        if restored.is_none() {
            warn!(target: "attempt", %key, "Discarding unusable snapshot");
            if let Err(e) = self.store.remove(&key).await {
                warn!(target: "attempt", %key, error = %e, "Failed to remove snapshot");
            }
        }
        restored
    }

    pub async fn clear(&self, user_id: &str, test_id: &str) -> Result<(), StoreError> {
        self.store.remove(&snapshot_key(user_id, test_id)).await
    }
}
