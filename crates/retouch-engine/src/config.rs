use std::env;
use std::path::PathBuf;

use anyhow::{bail, Result};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_DATA_DIR: &str = ".retouch";
const API_KEY_VARS: [&str; 3] = ["API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, Clone, PartialEq)]
pub struct RetouchConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub request_timeout_s: f64,
    pub data_dir: PathBuf,
}

impl Default for RetouchConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl RetouchConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            api_key: API_KEY_VARS.iter().find_map(|key| non_empty(*key)),
            api_base: non_empty("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: non_empty("RETOUCH_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            request_timeout_s: non_empty("RETOUCH_REQUEST_TIMEOUT")
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|value| value.is_finite())
                .unwrap_or(90.0)
                .clamp(15.0, 300.0),
            data_dir: non_empty("RETOUCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("API_KEY, GEMINI_API_KEY or GOOGLE_API_KEY not set"),
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::{RetouchConfig, DEFAULT_API_BASE, DEFAULT_MODEL};

    fn config_from(pairs: &[(&str, &str)]) -> RetouchConfig {
        let vars = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<String, String>>();
        RetouchConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config_from(&[]);
        assert_eq!(config.api_key, None);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.request_timeout_s, 90.0);
        assert_eq!(config.data_dir, PathBuf::from(".retouch"));
        assert_eq!(
            config.require_api_key().map_err(|err| err.to_string()),
            Err("API_KEY, GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string())
        );
    }

    #[test]
    fn api_key_prefers_first_non_empty_variable() {
        let config = config_from(&[
            ("API_KEY", "  "),
            ("GEMINI_API_KEY", "g-key"),
            ("GOOGLE_API_KEY", "x"),
        ]);
        assert_eq!(config.require_api_key().ok(), Some("g-key"));
    }

    #[test]
    fn overrides_are_trimmed_and_clamped() {
        let config = config_from(&[
            ("GEMINI_API_BASE", "http://localhost:8080/v1/"),
            ("RETOUCH_MODEL", "gemini-test"),
            ("RETOUCH_REQUEST_TIMEOUT", "2"),
            ("RETOUCH_DATA_DIR", "/tmp/retouch-data"),
        ]);
        assert_eq!(config.api_base, "http://localhost:8080/v1");
        assert_eq!(config.model, "gemini-test");
        assert_eq!(config.request_timeout_s, 15.0);
        assert_eq!(
            config.store_path(),
            PathBuf::from("/tmp/retouch-data/store.json")
        );
        assert_eq!(
            config.events_path(),
            PathBuf::from("/tmp/retouch-data/events.jsonl")
        );
    }

    #[test]
    fn non_finite_timeout_falls_back_to_default() {
        for raw in ["nan", "inf", "-inf", "soon"] {
            let config = config_from(&[("RETOUCH_REQUEST_TIMEOUT", raw)]);
            assert_eq!(config.request_timeout_s, 90.0, "timeout {raw}");
        }
    }
}
