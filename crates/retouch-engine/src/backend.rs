use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::RetouchConfig;
use crate::dryrun::DryrunBackend;
use crate::gemini::GeminiBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    InlineImage { mime_type: String, data: Vec<u8> },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub parts: Vec<RequestPart>,
    pub response_modalities: Vec<String>,
}

/// Response parts keep image data base64 encoded, as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    InlineImage { mime_type: String, data: String },
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResponse {
    pub parts: Vec<ResponsePart>,
}

impl GenerationResponse {
    pub fn first_image_data_url(&self) -> Option<String> {
        self.parts.iter().find_map(|part| match part {
            ResponsePart::InlineImage { mime_type, data } if !data.is_empty() => {
                Some(format!("data:{mime_type};base64,{data}"))
            }
            _ => None,
        })
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<String>()
    }
}

pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Gemini,
    Dryrun,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::Dryrun => "dryrun",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(BackendKind::Gemini),
            "dryrun" => Ok(BackendKind::Dryrun),
            other => bail!("unknown backend '{other}' (expected gemini or dryrun)"),
        }
    }
}

/// Builds the backend for `kind`. Gemini fails here, before any request,
/// when no API key is configured.
pub fn build_backend(
    kind: BackendKind,
    config: &RetouchConfig,
) -> Result<Arc<dyn GenerationBackend>> {
    match kind {
        BackendKind::Gemini => Ok(Arc::new(GeminiBackend::from_config(config)?)),
        BackendKind::Dryrun => Ok(Arc::new(DryrunBackend::new())),
    }
}
