use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::backend::{
    GenerationBackend, GenerationRequest, GenerationResponse, RequestPart, ResponsePart,
};

const DRYRUN_SIZE: u32 = 64;

/// Offline backend: answers every request with a solid PNG tinted by the
/// instruction text and a call counter, plus a short text note.
#[derive(Debug, Default)]
pub struct DryrunBackend {
    calls: AtomicU64,
}

impl DryrunBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GenerationBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let instruction = request
            .parts
            .iter()
            .filter_map(|part| match part {
                RequestPart::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<&str>>()
            .join("\n");
        let images = request
            .parts
            .iter()
            .filter(|part| matches!(part, RequestPart::InlineImage { .. }))
            .count();

        let (r, g, b) = color_from_prompt(&instruction, call);
        let png = solid_png(r, g, b)?;
        Ok(GenerationResponse {
            parts: vec![
                ResponsePart::InlineImage {
                    mime_type: "image/png".to_string(),
                    data: BASE64.encode(png),
                },
                ResponsePart::Text(format!(
                    "Dryrun restoration #{} from {images} input image(s) with {}.",
                    call + 1,
                    request.model
                )),
            ],
        })
    }
}

fn solid_png(r: u8, g: u8, b: u8) -> Result<Vec<u8>> {
    let mut image = RgbImage::new(DRYRUN_SIZE, DRYRUN_SIZE);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("failed encoding dryrun image")?;
    Ok(out.into_inner())
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
