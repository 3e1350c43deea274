use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use crate::backend::{
    GenerationBackend, GenerationRequest, GenerationResponse, RequestPart, ResponsePart,
};
use crate::config::RetouchConfig;

pub struct GeminiBackend {
    api_base: String,
    api_key: String,
    request_timeout_s: f64,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn from_config(config: &RetouchConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key,
            request_timeout_s: config.request_timeout_s,
            http: HttpClient::new(),
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let endpoint = self.endpoint_for_model(&request.model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(Duration::from_secs_f64(self.request_timeout_s))
            .json(&build_payload(request))
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let payload = response_json_or_error("Gemini", response)?;
        parse_response(&payload)
    }
}

pub(crate) fn build_payload(request: &GenerationRequest) -> Value {
    let parts = request
        .parts
        .iter()
        .map(|part| match part {
            RequestPart::InlineImage { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": BASE64.encode(data),
                }
            }),
            RequestPart::Text(text) => json!({ "text": text }),
        })
        .collect::<Vec<Value>>();
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "responseModalities": request.response_modalities,
        },
    })
}

/// Flattens every candidate's parts, in order, into one response.
pub(crate) fn parse_response(payload: &Value) -> Result<GenerationResponse> {
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if candidates.is_empty() {
        if let Some(reason) = payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            bail!("Gemini blocked the request ({reason})");
        }
    }

    let mut parts = Vec::new();
    for candidate in candidates {
        let rows = candidate
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in rows {
            if let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            {
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                parts.push(ResponsePart::InlineImage {
                    mime_type: mime_type.to_string(),
                    data: data.to_string(),
                });
            } else if let Some(text) = part.get("text").and_then(Value::as_str) {
                parts.push(ResponsePart::Text(text.to_string()));
            }
        }
    }
    Ok(GenerationResponse { parts })
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
