use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const DEFAULT_MAX_SOURCE_FILES: usize = 10;
const PREVIEW_SCHEME: &str = "blob:retouch/";

/// Image bytes that have not been placed into a collection yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub is_original: bool,
}

impl MediaFile {
    pub fn original(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
            is_original: true,
        }
    }

    /// Wraps a restored image so it can be fed back in as a source.
    pub fn from_data_url(data_url: &str, file_name: impl Into<String>) -> Result<Self> {
        let (mime_type, bytes) = parse_data_url(data_url)?;
        Ok(Self {
            file_name: file_name.into(),
            mime_type,
            bytes,
            is_original: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<Vec<u8>>,
    pub preview_url: String,
    pub is_original: bool,
}

impl ImageHandle {
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            BASE64.encode(self.bytes.as_slice())
        )
    }

    /// Short content digest, used to correlate log lines with inputs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.bytes.as_slice());
        hex::encode(&digest[..6])
    }
}

/// Hands out preview URLs and tracks which ones are still live.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<Mutex<BTreeSet<String>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> String {
        let url = format!("{PREVIEW_SCHEME}{}", Uuid::new_v4());
        self.lock().insert(url.clone());
        url
    }

    /// Returns true only for the call that actually released the URL.
    pub fn release(&self, url: &str) -> bool {
        self.lock().remove(url)
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Multiple { max_files: usize },
    Single,
}

/// Owns its image handles; removing a handle releases its preview.
#[derive(Debug)]
pub struct ImageCollection {
    kind: CollectionKind,
    handles: Vec<ImageHandle>,
    previews: PreviewRegistry,
}

impl ImageCollection {
    pub fn multiple(previews: PreviewRegistry, max_files: usize) -> Self {
        Self {
            kind: CollectionKind::Multiple { max_files },
            handles: Vec::new(),
            previews,
        }
    }

    pub fn single(previews: PreviewRegistry) -> Self {
        Self {
            kind: CollectionKind::Single,
            handles: Vec::new(),
            previews,
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn handles(&self) -> &[ImageHandle] {
        &self.handles
    }

    pub fn get(&self, id: &str) -> Option<&ImageHandle> {
        self.handles.iter().find(|handle| handle.id == id)
    }

    pub fn first(&self) -> Option<&ImageHandle> {
        self.handles.first()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn remaining_capacity(&self) -> usize {
        match self.kind {
            CollectionKind::Multiple { max_files } => {
                max_files.saturating_sub(self.handles.len())
            }
            CollectionKind::Single => 1,
        }
    }

    /// Adds files and returns the ids that made it in. A multiple collection
    /// ignores files beyond its capacity; a single collection replaces its
    /// content with the first file.
    pub fn add(&mut self, files: Vec<MediaFile>) -> Vec<String> {
        let accepted = match self.kind {
            CollectionKind::Multiple { .. } => files
                .into_iter()
                .take(self.remaining_capacity())
                .collect::<Vec<MediaFile>>(),
            CollectionKind::Single => {
                let first = files.into_iter().take(1).collect::<Vec<MediaFile>>();
                if !first.is_empty() {
                    self.clear();
                }
                first
            }
        };

        let mut ids = Vec::new();
        for file in accepted {
            let handle = ImageHandle {
                id: format!("{}-{}", file.file_name, Uuid::new_v4().simple()),
                file_name: file.file_name,
                mime_type: file.mime_type,
                bytes: Arc::new(file.bytes),
                preview_url: self.previews.create(),
                is_original: file.is_original,
            };
            ids.push(handle.id.clone());
            self.handles.push(handle);
        }
        ids
    }

    pub fn remove(&mut self, id: &str) -> Option<ImageHandle> {
        let idx = self.handles.iter().position(|handle| handle.id == id)?;
        let handle = self.handles.remove(idx);
        self.previews.release(&handle.preview_url);
        Some(handle)
    }

    pub fn clear(&mut self) {
        for handle in self.handles.drain(..) {
            self.previews.release(&handle.preview_url);
        }
    }
}

impl Drop for ImageCollection {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Reads an image file. The MIME type is sniffed from the content and falls
/// back to the extension; anything that is neither is rejected.
pub fn ingest_file(path: &Path) -> Result<MediaFile> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let mime_type = image::guess_format(&bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
        .or_else(|| mime_for_path(path).map(str::to_string));
    let Some(mime_type) = mime_type else {
        bail!("{} is not a supported image file", path.display());
    };
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("image")
        .to_string();
    Ok(MediaFile::original(file_name, mime_type, bytes))
}

pub fn parse_data_url(data_url: &str) -> Result<(String, Vec<u8>)> {
    let Some(rest) = data_url.strip_prefix("data:") else {
        bail!("not a data URL");
    };
    let Some((header, data)) = rest.split_once(',') else {
        bail!("data URL has no payload");
    };
    let Some(mime_type) = header.strip_suffix(";base64") else {
        bail!("data URL is not base64 encoded");
    };
    let bytes = BASE64
        .decode(data.trim().as_bytes())
        .context("data URL base64 decode failed")?;
    Ok((mime_type.to_string(), bytes))
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let lowered = mime_type.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "png"
}

/// Writes a restored data URL to `dir` and returns the file path.
pub fn write_data_url(dir: &Path, stem: &str, data_url: &str) -> Result<PathBuf> {
    let (mime_type, bytes) = parse_data_url(data_url)?;
    fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;
    let path = dir.join(format!("{stem}.{}", extension_for_mime(&mime_type)));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{
        ingest_file, parse_data_url, write_data_url, ImageCollection, MediaFile, PreviewRegistry,
    };

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];

    fn file(name: &str) -> MediaFile {
        MediaFile::original(name, "image/png", PNG_MAGIC.to_vec())
    }

    #[test]
    fn multiple_collection_ignores_files_past_capacity() {
        let previews = PreviewRegistry::new();
        let mut sources = ImageCollection::multiple(previews.clone(), 3);
        assert_eq!(sources.add(vec![file("a.png"), file("b.png")]).len(), 2);
        let ids = sources.add(vec![file("c.png"), file("d.png")]);
        assert_eq!(ids.len(), 1);
        assert_eq!(sources.len(), 3);
        assert_eq!(sources.remaining_capacity(), 0);
        assert!(sources.add(vec![file("e.png")]).is_empty());
        assert_eq!(previews.live_count(), 3);
    }

    #[test]
    fn single_collection_replaces_and_releases_previous() {
        let previews = PreviewRegistry::new();
        let mut reference = ImageCollection::single(previews.clone());
        reference.add(vec![file("first.png")]);
        let old_preview = reference.handles()[0].preview_url.clone();

        reference.add(vec![file("second.png"), file("third.png")]);
        assert_eq!(reference.len(), 1);
        assert_eq!(reference.handles()[0].file_name, "second.png");
        assert!(!previews.is_live(&old_preview));
        assert_eq!(previews.live_count(), 1);
    }

    #[test]
    fn handles_get_unique_ids_even_for_same_file() {
        let mut sources = ImageCollection::multiple(PreviewRegistry::new(), 10);
        let ids = sources.add(vec![file("same.png"), file("same.png")]);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn remove_releases_preview_exactly_once() {
        let previews = PreviewRegistry::new();
        let mut sources = ImageCollection::multiple(previews.clone(), 10);
        let ids = sources.add(vec![file("a.png"), file("b.png")]);
        let removed = sources.remove(&ids[0]);
        let Some(removed) = removed else {
            panic!("handle should have been removed");
        };
        assert!(!previews.is_live(&removed.preview_url));
        assert!(!previews.release(&removed.preview_url));
        assert!(sources.remove(&ids[0]).is_none());
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn dropping_collection_releases_all_previews() {
        let previews = PreviewRegistry::new();
        {
            let mut sources = ImageCollection::multiple(previews.clone(), 10);
            sources.add(vec![file("a.png"), file("b.png")]);
            assert_eq!(previews.live_count(), 2);
        }
        assert_eq!(previews.live_count(), 0);
    }

    #[test]
    fn ingest_sniffs_content_then_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let sniffed = temp.path().join("scan.bin");
        fs::write(&sniffed, PNG_MAGIC)?;
        let by_content = ingest_file(&sniffed)?;
        assert_eq!(by_content.mime_type, "image/png");
        assert_eq!(by_content.file_name, "scan.bin");
        assert!(by_content.is_original);

        let by_extension = temp.path().join("photo.jpeg");
        fs::write(&by_extension, b"not really a jpeg")?;
        assert_eq!(ingest_file(&by_extension)?.mime_type, "image/jpeg");

        let text = temp.path().join("notes.txt");
        fs::write(&text, b"hello")?;
        assert!(ingest_file(&text).is_err());
        Ok(())
    }

    #[test]
    fn data_urls_decode_and_write_with_matching_extension() -> anyhow::Result<()> {
        let (mime_type, bytes) = parse_data_url("data:image/jpeg;base64,AQID")?;
        assert_eq!(mime_type, "image/jpeg");
        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(parse_data_url("blob:retouch/123").is_err());
        assert!(parse_data_url("data:image/png,plain").is_err());

        let temp = tempfile::tempdir()?;
        let path = write_data_url(temp.path(), "restored-r1-1", "data:image/jpeg;base64,AQID")?;
        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some("restored-r1-1.jpg")
        );
        assert_eq!(fs::read(path)?, vec![1, 2, 3]);

        let promoted = MediaFile::from_data_url("data:image/png;base64,AQID", "restored.png")?;
        assert!(!promoted.is_original);
        Ok(())
    }
}
