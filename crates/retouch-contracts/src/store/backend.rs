use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};

/// Raw persistent storage. Values are JSON documents addressed by key.
pub trait KeyValueBackend {
    fn read(&self, key: &str) -> anyhow::Result<Option<Value>>;
    fn write(&self, key: &str, value: &Value) -> anyhow::Result<()>;
}

/// All keys live in one pretty-printed JSON object on disk. Writes merge the
/// key into whatever is on disk at the time, so two handles on the same file
/// do not clobber each other's keys.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueBackend for JsonFileBackend {
    fn read(&self, key: &str) -> anyhow::Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let payload = read_json_object(&self.path)?;
        Ok(payload.get(key).cloned())
    }

    fn write(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        if on_disk.get(key) == Some(value) {
            return Ok(());
        }
        on_disk.insert(key.to_string(), value.clone());
        write_json_object(&self.path, &on_disk)
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: RefCell<BTreeMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn read(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn write(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

fn read_json_object(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} does not hold a JSON object", path.display()),
    }
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )
    .with_context(|| format!("failed writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{JsonFileBackend, KeyValueBackend, MemoryBackend};

    #[test]
    fn missing_file_reads_as_absent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = JsonFileBackend::new(temp.path().join("store.json"));
        assert_eq!(backend.read("saved-prompts")?, None);
        Ok(())
    }

    #[test]
    fn write_then_read_from_fresh_handle() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("data").join("store.json");
        JsonFileBackend::new(&path).write("key", &json!(["a", "b"]))?;
        assert_eq!(
            JsonFileBackend::new(&path).read("key")?,
            Some(json!(["a", "b"]))
        );
        Ok(())
    }

    #[test]
    fn writers_merge_keys_on_disk() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("store.json");
        let first = JsonFileBackend::new(&path);
        let second = JsonFileBackend::new(&path);

        first.write("a", &json!(1))?;
        second.write("b", &json!(2))?;
        first.write("a", &json!(3))?;

        let reloaded = JsonFileBackend::new(&path);
        assert_eq!(reloaded.read("a")?, Some(json!(3)));
        assert_eq!(reloaded.read("b")?, Some(json!(2)));
        Ok(())
    }

    #[test]
    fn corrupt_file_is_a_read_error_and_is_replaced_on_write() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("store.json");
        std::fs::write(&path, "{not json")?;
        let backend = JsonFileBackend::new(&path);

        assert!(backend.read("a").is_err());
        backend.write("a", &json!("fresh"))?;
        assert_eq!(backend.read("a")?, Some(json!("fresh")));
        Ok(())
    }

    #[test]
    fn memory_backend_round_trips() -> anyhow::Result<()> {
        let backend = MemoryBackend::new();
        backend.write("k", &json!({"v": 1}))?;
        assert_eq!(backend.read("k")?, Some(json!({"v": 1})));
        assert_eq!(backend.read("missing")?, None);
        Ok(())
    }
}
