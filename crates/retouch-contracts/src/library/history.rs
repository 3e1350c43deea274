use serde::{Deserialize, Serialize};

use crate::store::LocalStore;

pub const HISTORY_KEY: &str = "restoration-history";

/// One completed restoration. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorationResult {
    pub id: String,
    pub original_url: String,
    pub restored_urls: Vec<String>,
    pub prompt: String,
    pub model_text: String,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// Restoration history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: Vec<RestorationResult>,
}

impl History {
    pub fn load(store: &LocalStore) -> Self {
        store.load(HISTORY_KEY)
    }

    pub fn save(&self, store: &mut LocalStore) {
        store.save(HISTORY_KEY, self);
    }

    pub fn entries(&self) -> &[RestorationResult] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RestorationResult> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Puts `results` ahead of every existing entry, keeping their order.
    pub fn prepend(&mut self, results: Vec<RestorationResult>) {
        let mut merged = results;
        merged.append(&mut self.entries);
        self.entries = merged;
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Entries ordered by timestamp, newest first; ties keep stored order.
    pub fn newest_first(&self) -> Vec<&RestorationResult> {
        let mut sorted = self.entries.iter().collect::<Vec<&RestorationResult>>();
        sorted.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
        sorted
    }
}
