//! Saved-question notebook: per-user named collections of question references.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

pub const DEFAULT_COLLECTION: &str = "Saved";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRef {
    pub test_id: String,
    pub question_id: String,
}

/// Collection name -> saved references, in insertion order.
pub type Collections = BTreeMap<String, Vec<QuestionRef>>;

#[derive(Default)]
pub struct Notebook {
    by_user: RwLock<HashMap<String, Collections>>,
}

impl Notebook {
    /// Save a reference. Saving the same reference twice is a no-op.
    #[instrument(level = "debug", skip(self))]
    pub async fn save(&self, user_id: &str, collection: Option<&str>, item: QuestionRef) -> Collections {
        let name = collection.map(str::trim).filter(|c| !c.is_empty()).unwrap_or(DEFAULT_COLLECTION);
        let mut by_user = self.by_user.write().await;
        let collections = by_user.entry(user_id.to_string()).or_default();
        let items = collections.entry(name.to_string()).or_default();
        if !items.contains(&item) {
            items.push(item);
        } else {
            debug!(target: "testprep_backend", %user_id, collection = %name, "Question already saved");
        }
        collections.clone()
    }

    /// Remove a reference from one collection, or from every collection when
    /// `collection` is `None`. Empty collections are dropped.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove(&self, user_id: &str, collection: Option<&str>, item: &QuestionRef) -> Collections {
        let mut by_user = self.by_user.write().await;
        let Some(collections) = by_user.get_mut(user_id) else {
            return Collections::new();
        };
        for (name, items) in collections.iter_mut() {
            if collection.map(|c| c == name.as_str()).unwrap_or(true) {
                items.retain(|i| i != item);
            }
        }
        collections.retain(|_, items| !items.is_empty());
        collections.clone()
    }

    pub async fn list(&self, user_id: &str) -> Collections {
        self.by_user.read().await.get(user_id).cloned().unwrap_or_default()
    }
}
