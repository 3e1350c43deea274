use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use retouch_contracts::events::{payload, EventKind, EventWriter};
use retouch_contracts::library::{History, RestorationResult, SavedPrompts};
use retouch_contracts::prompt::PromptState;
use retouch_contracts::store::LocalStore;
use serde_json::json;
use uuid::Uuid;

use crate::camera::CameraSession;
use crate::client::RestorationClient;
use crate::media::{
    extension_for_mime, ingest_file, parse_data_url, write_data_url, ImageCollection,
    ImageHandle, MediaFile, PreviewRegistry, DEFAULT_MAX_SOURCE_FILES,
};

pub const VALIDATION_MESSAGE: &str = "Please upload at least one image and provide a prompt.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rejected before any request was sent.
    Validation,
    Api,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RunFailure {}

/// Source and reference images, the prompt, and the restoration run that
/// turns them into history entries.
pub struct Workbench {
    client: RestorationClient,
    store: LocalStore,
    history: History,
    saved_prompts: SavedPrompts,
    previews: PreviewRegistry,
    sources: ImageCollection,
    reference: ImageCollection,
    prompt: PromptState,
    state: RunState,
    progress: f64,
    current_results: Vec<RestorationResult>,
    error: Option<String>,
    events: Option<EventWriter>,
}

impl Workbench {
    pub fn new(client: RestorationClient, store: LocalStore, events: Option<EventWriter>) -> Self {
        let history = History::load(&store);
        let saved_prompts = SavedPrompts::load(&store);
        let previews = PreviewRegistry::new();
        Self {
            client,
            store,
            history,
            saved_prompts,
            sources: ImageCollection::multiple(previews.clone(), DEFAULT_MAX_SOURCE_FILES),
            reference: ImageCollection::single(previews.clone()),
            previews,
            prompt: PromptState::default(),
            state: RunState::Idle,
            progress: 0.0,
            current_results: Vec::new(),
            error: None,
            events,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Percent of source images restored in the current run.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn current_results(&self) -> &[RestorationResult] {
        &self.current_results
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn saved_prompts(&self) -> &SavedPrompts {
        &self.saved_prompts
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn sources(&self) -> &ImageCollection {
        &self.sources
    }

    pub fn reference(&self) -> Option<&ImageHandle> {
        self.reference.first()
    }

    pub fn prompt(&self) -> &PromptState {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: PromptState) {
        self.prompt = prompt;
    }

    pub fn add_source_files(&mut self, files: Vec<MediaFile>) -> Vec<String> {
        self.sources.add(files)
    }

    /// Reads every path before adding any, so one bad file adds nothing.
    pub fn add_source_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<Vec<String>> {
        let files = paths
            .iter()
            .map(|path| ingest_file(path.as_ref()))
            .collect::<Result<Vec<MediaFile>>>()?;
        Ok(self.sources.add(files))
    }

    /// Adds the camera's current frame as a source image; the stream ends
    /// either way.
    pub fn capture_source(&mut self, camera: &mut CameraSession) -> Result<String> {
        if self.sources.remaining_capacity() == 0 {
            camera.close();
            bail!("Source images are full ({DEFAULT_MAX_SOURCE_FILES} max).");
        }
        let file = camera.capture()?;
        match self.sources.add(vec![file]).into_iter().next() {
            Some(id) => Ok(id),
            None => bail!("failed to add camera capture"),
        }
    }

    pub fn remove_source(&mut self, id: &str) -> bool {
        self.sources.remove(id).is_some()
    }

    pub fn set_reference_file(&mut self, file: MediaFile) -> Option<String> {
        self.reference.add(vec![file]).into_iter().next()
    }

    pub fn set_reference_path(&mut self, path: &Path) -> Result<String> {
        let file = ingest_file(path)?;
        match self.set_reference_file(file) {
            Some(id) => Ok(id),
            None => bail!("failed to set reference image {}", path.display()),
        }
    }

    pub fn clear_reference(&mut self) {
        self.reference.clear();
    }

    /// Restores every source image in order with the current prompt. History
    /// only changes when the whole batch succeeds.
    pub fn restore(&mut self) -> Result<&[RestorationResult], RunFailure> {
        if self.sources.is_empty() || self.prompt.is_empty() {
            self.error = Some(VALIDATION_MESSAGE.to_string());
            return Err(RunFailure {
                kind: FailureKind::Validation,
                message: VALIDATION_MESSAGE.to_string(),
            });
        }

        self.state = RunState::Running;
        self.error = None;
        self.current_results.clear();
        self.progress = 0.0;

        let prompt = self.prompt.text().to_string();
        let sources = self.sources.handles().to_vec();
        let reference = self.reference.first().cloned();
        let total = sources.len();
        self.record(
            EventKind::RestoreStarted,
            json!({
                "images": total,
                "prompt": prompt,
                "has_reference": reference.is_some(),
                "backend": self.client.backend_name(),
                "model": self.client.model(),
            }),
        );

        for (idx, source) in sources.iter().enumerate() {
            let output = match self.client.restore(source, &prompt, reference.as_ref()) {
                Ok(output) => output,
                Err(err) => {
                    let message = format!("Failed on image {}/{}: {err:#}", idx + 1, total);
                    self.state = RunState::Failed;
                    self.error = Some(message.clone());
                    self.record(
                        EventKind::RestoreFailed,
                        json!({
                            "image": idx + 1,
                            "images": total,
                            "error": message,
                        }),
                    );
                    return Err(RunFailure {
                        kind: FailureKind::Api,
                        message,
                    });
                }
            };

            let now = chrono::Utc::now().timestamp_millis();
            self.current_results.push(RestorationResult {
                id: format!("result-{}", Uuid::new_v4().simple()),
                original_url: source.preview_url.clone(),
                restored_urls: output.restored_urls,
                prompt: prompt.clone(),
                model_text: output.model_text,
                timestamp: now,
            });
            self.progress = (idx + 1) as f64 / total as f64 * 100.0;
            self.record(
                EventKind::RestoreProgress,
                json!({
                    "image": idx + 1,
                    "images": total,
                    "progress": self.progress,
                }),
            );
        }

        self.history.prepend(self.current_results.clone());
        self.history.save(&mut self.store);
        self.state = RunState::Succeeded;
        self.progress = 100.0;
        self.record(
            EventKind::RestoreSucceeded,
            json!({
                "results": self
                    .current_results
                    .iter()
                    .map(|result| result.id.as_str())
                    .collect::<Vec<&str>>(),
            }),
        );
        Ok(&self.current_results)
    }

    pub fn delete_history(&mut self, id: &str) -> bool {
        let removed = self.history.delete(id);
        if removed {
            self.history.save(&mut self.store);
        }
        removed
    }

    /// Saves the current prompt; false when it is empty or already saved.
    pub fn save_prompt(&mut self) -> bool {
        let inserted = self.saved_prompts.insert(self.prompt.text());
        if inserted {
            self.saved_prompts.save(&mut self.store);
        }
        inserted
    }

    /// Replaces the prompt text with a saved prompt (0-based index).
    pub fn use_saved_prompt(&mut self, index: usize) -> Result<()> {
        let Some(text) = self.saved_prompts.get(index) else {
            bail!(
                "No saved prompt #{} ({} saved).",
                index + 1,
                self.saved_prompts.entries().len()
            );
        };
        self.prompt = self.prompt.edit_raw(text);
        Ok(())
    }

    pub fn export_saved_prompts(&self, path: &Path) -> Result<()> {
        self.saved_prompts.export_to(path)
    }

    /// Looks a result up among the current run first, then history.
    pub fn find_result(&self, id: &str) -> Option<&RestorationResult> {
        self.current_results
            .iter()
            .find(|result| result.id == id)
            .or_else(|| self.history.get(id))
    }

    /// Feeds a restored variant (1-based) back in as a source image.
    pub fn promote_result(&mut self, result_id: &str, variant: usize) -> Result<String> {
        let Some(result) = self.find_result(result_id) else {
            bail!("No restoration result with id {result_id}.");
        };
        let Some(url) = variant
            .checked_sub(1)
            .and_then(|idx| result.restored_urls.get(idx))
        else {
            bail!(
                "Result {result_id} has no variant {variant} ({} available).",
                result.restored_urls.len()
            );
        };
        let (mime_type, _) = parse_data_url(url)?;
        let file_name = format!(
            "restored-{result_id}-{variant}.{}",
            extension_for_mime(&mime_type)
        );
        let file = MediaFile::from_data_url(url, file_name)?;
        match self.sources.add(vec![file]).into_iter().next() {
            Some(id) => Ok(id),
            None => bail!("Source images are full ({DEFAULT_MAX_SOURCE_FILES} max)."),
        }
    }

    /// Writes each restored variant as `restored-{id}-{n}.{ext}` under `dir`.
    pub fn download_result(&self, result_id: &str, dir: &Path) -> Result<Vec<PathBuf>> {
        let Some(result) = self.find_result(result_id) else {
            bail!("No restoration result with id {result_id}.");
        };
        download_restored(result, dir)
    }

    pub fn download_current(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for result in &self.current_results {
            written.extend(download_restored(result, dir)?);
        }
        Ok(written)
    }

    fn record(&self, kind: EventKind, value: serde_json::Value) {
        if let Some(events) = &self.events {
            events.record(kind, payload(value));
        }
    }
}

pub fn download_restored(result: &RestorationResult, dir: &Path) -> Result<Vec<PathBuf>> {
    result
        .restored_urls
        .iter()
        .enumerate()
        .map(|(idx, url)| {
            write_data_url(dir, &format!("restored-{}-{}", result.id, idx + 1), url)
        })
        .collect()
}
