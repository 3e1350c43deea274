use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::store::LocalStore;

pub const SAVED_PROMPTS_KEY: &str = "saved-prompts";
pub const EXPORT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SavedPrompts {
    entries: Vec<String>,
}

impl SavedPrompts {
    pub fn load(store: &LocalStore) -> Self {
        store.load(SAVED_PROMPTS_KEY)
    }

    pub fn save(&self, store: &mut LocalStore) {
        store.save(SAVED_PROMPTS_KEY, self);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn contains(&self, prompt: &str) -> bool {
        self.entries.iter().any(|entry| entry == prompt)
    }

    /// Returns false when the prompt is empty or already saved.
    pub fn insert(&mut self, prompt: &str) -> bool {
        if prompt.is_empty() || self.contains(prompt) {
            return false;
        }
        self.entries.push(prompt.to_string());
        true
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    pub fn export_text(&self) -> String {
        self.entries.join(EXPORT_SEPARATOR)
    }

    pub fn export_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.export_text())
            .with_context(|| format!("failed writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::{SavedPrompts, EXPORT_SEPARATOR};
    use crate::store::LocalStore;

    #[test]
    fn insert_dedupes_and_keeps_order() {
        let mut saved = SavedPrompts::default();
        assert!(saved.insert("restore color"));
        assert!(saved.insert("reduce noise, warm tones"));
        assert!(!saved.insert("restore color"));
        assert!(!saved.insert(""));
        assert_eq!(
            saved.entries(),
            &["restore color".to_string(), "reduce noise, warm tones".to_string()]
        );
        assert_eq!(saved.get(1), Some("reduce noise, warm tones"));
    }

    #[test]
    fn export_joins_with_separator_line() -> anyhow::Result<()> {
        let mut saved = SavedPrompts::default();
        saved.insert("one");
        saved.insert("two");
        assert_eq!(saved.export_text(), format!("one{EXPORT_SEPARATOR}two"));

        let temp = tempfile::tempdir()?;
        let path = temp.path().join("exports").join("prompts.txt");
        saved.export_to(&path)?;
        assert_eq!(std::fs::read_to_string(path)?, "one\n\n---\n\ntwo");
        Ok(())
    }

    #[test]
    fn saved_prompts_persist_through_store() {
        let mut store = LocalStore::in_memory();
        let mut saved = SavedPrompts::load(&store);
        saved.insert("sharpen details");
        saved.save(&mut store);
        assert_eq!(SavedPrompts::load(&store), saved);
    }
}
