use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Result};
use retouch_contracts::events::{payload, EventKind, EventWriter};
use serde_json::json;

use crate::backend::{GenerationBackend, GenerationRequest, GenerationResponse, RequestPart};
use crate::media::ImageHandle;

pub const RESTORED_VARIANTS: usize = 2;
pub const NO_MODEL_TEXT: &str = "No text response from model.";
const RESPONSE_MODALITIES: [&str; 2] = ["IMAGE", "TEXT"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorationOutput {
    pub restored_urls: Vec<String>,
    pub model_text: String,
}

/// Sends one source image (plus an optional style reference) to the
/// generation backend and collects two restored variants.
pub struct RestorationClient {
    backend: Arc<dyn GenerationBackend>,
    model: String,
    events: Option<EventWriter>,
}

impl RestorationClient {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        model: impl Into<String>,
        events: Option<EventWriter>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            events,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build_request(
        &self,
        source: &ImageHandle,
        prompt: &str,
        reference: Option<&ImageHandle>,
    ) -> GenerationRequest {
        let mut parts = vec![image_part(source)];
        if let Some(reference) = reference {
            parts.push(image_part(reference));
        }
        parts.push(RequestPart::Text(build_instruction(prompt, reference.is_some())));
        GenerationRequest {
            model: self.model.clone(),
            parts,
            response_modalities: RESPONSE_MODALITIES.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Issues two identical requests at once. The first failure is returned
    /// without waiting for the other call; a response without an image
    /// fails the whole restoration.
    pub fn restore(
        &self,
        source: &ImageHandle,
        prompt: &str,
        reference: Option<&ImageHandle>,
    ) -> Result<RestorationOutput> {
        if prompt.trim().is_empty() {
            bail!("Restoration prompt must not be empty.");
        }
        let request = Arc::new(self.build_request(source, prompt, reference));
        if let Some(events) = &self.events {
            events.record(
                EventKind::GenerationRequest,
                payload(json!({
                    "backend": self.backend.name(),
                    "model": self.model,
                    "source": source.fingerprint(),
                    "reference": reference.map(ImageHandle::fingerprint),
                    "calls": RESTORED_VARIANTS,
                })),
            );
        }

        let (tx, rx) = mpsc::channel::<(usize, Result<GenerationResponse>)>();
        for idx in 0..RESTORED_VARIANTS {
            let backend = self.backend.clone();
            let request = request.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let result = backend.generate(&request);
                // The receiver is gone once a sibling call has failed.
                let _ = tx.send((idx, result));
            });
        }
        drop(tx);

        let mut responses: Vec<Option<GenerationResponse>> = vec![None; RESTORED_VARIANTS];
        for _ in 0..RESTORED_VARIANTS {
            let (idx, result) = rx
                .recv()
                .map_err(|_| anyhow!("generation worker exited without a response"))?;
            let response = result.map_err(|err| {
                err.context(format!(
                    "{} generation call {} failed",
                    self.backend.name(),
                    idx + 1
                ))
            })?;
            responses[idx] = Some(response);
        }

        let responses = responses.into_iter().flatten().collect::<Vec<_>>();
        collect_output(&responses)
    }
}

/// Restoration instruction sent after the image parts.
pub fn build_instruction(prompt: &str, has_reference: bool) -> String {
    let mut text = String::from(
        "This is a photo restoration task. Do not add any watermarks, text, logos, or \
         signatures to the output image.",
    );
    if has_reference {
        text.push_str(&format!(
            " Image 1 is the photo to restore and the only source of content for the output. \
             Image 2 is a style reference only: use it solely for color palette, lighting, \
             and mood. Never transfer people, objects, text, or composition from image 2 \
             into the output. Additional instruction for image 1: \"{prompt}\"."
        ));
    } else {
        text.push_str(&format!(
            " Restore the image: remove scratches, dust, and tears, and correct color \
             balance, lighting, and contrast while preserving the original content. \
             The user's specific instruction is: \"{prompt}\"."
        ));
    }
    text
}

fn image_part(handle: &ImageHandle) -> RequestPart {
    RequestPart::InlineImage {
        mime_type: handle.mime_type.clone(),
        data: handle.bytes.as_ref().clone(),
    }
}

fn collect_output(responses: &[GenerationResponse]) -> Result<RestorationOutput> {
    let restored_urls = responses
        .iter()
        .filter_map(GenerationResponse::first_image_data_url)
        .collect::<Vec<String>>();
    if restored_urls.len() < RESTORED_VARIANTS {
        bail!(
            "Expected {RESTORED_VARIANTS} restored images but received {}.",
            restored_urls.len()
        );
    }
    let model_text = responses
        .iter()
        .map(GenerationResponse::text)
        .find(|text| !text.trim().is_empty())
        .unwrap_or_else(|| NO_MODEL_TEXT.to_string());
    Ok(RestorationOutput {
        restored_urls,
        model_text,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::{bail, Result};

    use super::{build_instruction, RestorationClient, NO_MODEL_TEXT};
    use crate::backend::{
        GenerationBackend, GenerationRequest, GenerationResponse, RequestPart, ResponsePart,
    };
    use crate::media::{ImageCollection, MediaFile, PreviewRegistry};

    enum Reply {
        Image(&'static str, Option<&'static str>),
        TextOnly(&'static str),
        Fail(&'static str),
        SlowFail(u64),
    }

    struct ScriptedBackend {
        replies: Vec<Reply>,
        calls: AtomicUsize,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            match &self.replies[call % self.replies.len()] {
                Reply::Image(data, text) => {
                    let mut parts = vec![ResponsePart::InlineImage {
                        mime_type: "image/png".to_string(),
                        data: data.to_string(),
                    }];
                    if let Some(text) = text {
                        parts.push(ResponsePart::Text(text.to_string()));
                    }
                    Ok(GenerationResponse { parts })
                }
                Reply::TextOnly(text) => Ok(GenerationResponse {
                    parts: vec![ResponsePart::Text(text.to_string())],
                }),
                Reply::Fail(message) => bail!("{message}"),
                Reply::SlowFail(millis) => {
                    thread::sleep(Duration::from_millis(*millis));
                    bail!("slow failure")
                }
            }
        }
    }

    fn handles() -> (ImageCollection, ImageCollection) {
        let previews = PreviewRegistry::new();
        let mut sources = ImageCollection::multiple(previews.clone(), 10);
        sources.add(vec![MediaFile::original("old.jpg", "image/jpeg", vec![1, 2, 3])]);
        let mut reference = ImageCollection::single(previews);
        reference.add(vec![MediaFile::original("style.png", "image/png", vec![9])]);
        (sources, reference)
    }

    #[test]
    fn request_orders_source_reference_then_text() {
        let (sources, reference) = handles();
        let client = RestorationClient::new(ScriptedBackend::new(vec![]), "model-x", None);
        let request = client.build_request(&sources.handles()[0], "keep grain", reference.first());
        assert_eq!(request.model, "model-x");
        assert_eq!(request.response_modalities, vec!["IMAGE", "TEXT"]);
        assert_eq!(request.parts.len(), 3);
        assert_eq!(
            request.parts[0],
            RequestPart::InlineImage {
                mime_type: "image/jpeg".to_string(),
                data: vec![1, 2, 3],
            }
        );
        assert_eq!(
            request.parts[1],
            RequestPart::InlineImage {
                mime_type: "image/png".to_string(),
                data: vec![9],
            }
        );
        assert_eq!(
            request.parts[2],
            RequestPart::Text(build_instruction("keep grain", true))
        );

        let without = client.build_request(&sources.handles()[0], "keep grain", None);
        assert_eq!(without.parts.len(), 2);
    }

    #[test]
    fn instruction_scopes_reference_to_style() {
        let with_ref = build_instruction("warm tones", true);
        assert!(with_ref.starts_with("This is a photo restoration task."));
        assert!(with_ref.contains("watermarks"));
        assert!(with_ref.contains("Image 2 is a style reference only"));
        assert!(with_ref.contains("\"warm tones\""));

        let plain = build_instruction("warm tones", false);
        assert!(plain.contains("remove scratches, dust, and tears"));
        assert!(!plain.contains("Image 2"));
        assert!(plain.contains("\"warm tones\""));
    }

    #[test]
    fn two_images_with_first_non_empty_text() -> Result<()> {
        let (sources, _) = handles();
        let backend = ScriptedBackend::new(vec![
            Reply::Image("AAAA", Some("  ")),
            Reply::Image("BBBB", Some("Fixed the tear.")),
        ]);
        let client = RestorationClient::new(backend.clone(), "m", None);
        let output = client.restore(&sources.handles()[0], "restore color", None)?;
        let mut urls = output.restored_urls.clone();
        urls.sort();
        assert_eq!(
            urls,
            vec!["data:image/png;base64,AAAA", "data:image/png;base64,BBBB"]
        );
        assert_eq!(output.model_text, "Fixed the tear.");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        let seen = backend.seen.lock().map(|seen| seen.clone()).unwrap_or_default();
        assert_eq!(seen[0], seen[1]);
        Ok(())
    }

    #[test]
    fn missing_text_uses_default_message() -> Result<()> {
        let (sources, _) = handles();
        let backend = ScriptedBackend::new(vec![Reply::Image("AAAA", None)]);
        let client = RestorationClient::new(backend, "m", None);
        let output = client.restore(&sources.handles()[0], "p", None)?;
        assert_eq!(output.model_text, NO_MODEL_TEXT);
        Ok(())
    }

    #[test]
    fn one_missing_image_fails_whole_request() {
        let (sources, _) = handles();
        let backend = ScriptedBackend::new(vec![
            Reply::Image("AAAA", None),
            Reply::TextOnly("I cannot do that."),
        ]);
        let client = RestorationClient::new(backend, "m", None);
        let err = client
            .restore(&sources.handles()[0], "p", None)
            .err()
            .map(|err| err.to_string());
        assert_eq!(
            err.as_deref(),
            Some("Expected 2 restored images but received 1.")
        );
    }

    #[test]
    fn first_failure_returns_without_waiting() {
        let (sources, _) = handles();
        let backend = ScriptedBackend::new(vec![
            Reply::Fail("quota exceeded"),
            Reply::SlowFail(3_000),
        ]);
        let client = RestorationClient::new(backend, "m", None);
        let started = Instant::now();
        let err = client
            .restore(&sources.handles()[0], "p", None)
            .err()
            .map(|err| format!("{err:#}"));
        assert!(started.elapsed() < Duration::from_secs(2));
        let Some(err) = err else {
            panic!("restore should fail");
        };
        assert!(err.starts_with("scripted generation call"));
        assert!(err.ends_with("quota exceeded"));
    }

    #[test]
    fn empty_prompt_is_rejected_before_any_call() {
        let (sources, _) = handles();
        let backend = ScriptedBackend::new(vec![Reply::Image("AAAA", None)]);
        let client = RestorationClient::new(backend.clone(), "m", None);
        assert!(client.restore(&sources.handles()[0], "  ", None).is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
