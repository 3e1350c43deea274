mod history;
mod saved_prompts;

pub use history::{History, RestorationResult, HISTORY_KEY};
pub use saved_prompts::{SavedPrompts, EXPORT_SEPARATOR, SAVED_PROMPTS_KEY};
