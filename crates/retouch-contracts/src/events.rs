use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Every event a Retouch session can append to its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStarted,
    GenerationRequest,
    RestoreStarted,
    RestoreProgress,
    RestoreFailed,
    RestoreSucceeded,
    CameraOpened,
    CameraOpenFailed,
    CameraReleased,
    StoreReadFailed,
    StoreWriteFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::SessionStarted,
        EventKind::GenerationRequest,
        EventKind::RestoreStarted,
        EventKind::RestoreProgress,
        EventKind::RestoreFailed,
        EventKind::RestoreSucceeded,
        EventKind::CameraOpened,
        EventKind::CameraOpenFailed,
        EventKind::CameraReleased,
        EventKind::StoreReadFailed,
        EventKind::StoreWriteFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session_started",
            EventKind::GenerationRequest => "generation_request",
            EventKind::RestoreStarted => "restore_started",
            EventKind::RestoreProgress => "restore_progress",
            EventKind::RestoreFailed => "restore_failed",
            EventKind::RestoreSucceeded => "restore_succeeded",
            EventKind::CameraOpened => "camera_opened",
            EventKind::CameraOpenFailed => "camera_open_failed",
            EventKind::CameraReleased => "camera_released",
            EventKind::StoreReadFailed => "store_read_failed",
            EventKind::StoreWriteFailed => "store_write_failed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Failure kinds are the ones worth surfacing when scanning a log.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            EventKind::RestoreFailed
                | EventKind::CameraOpenFailed
                | EventKind::StoreReadFailed
                | EventKind::StoreWriteFailed
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RESERVED_KEYS: [&str; 4] = ["type", "session_id", "seq", "ts"];

/// Append-only JSONL log for one Retouch session.
///
/// Each line carries `type`, `session_id`, a per-session `seq` starting at 1
/// and an RFC 3339 `ts`. Payload keys that collide with those are dropped, so
/// `seq` order always matches line order.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    next_seq: AtomicU64,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                next_seq: AtomicU64::new(1),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> anyhow::Result<Value> {
        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);

        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("seq".to_string(), Value::from(seq));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                event.insert(key, value);
            }
        }

        let line = serde_json::to_string(&event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }

    /// Emits without failing the caller; a broken log only reaches stderr.
    pub fn record(&self, kind: EventKind, payload: EventPayload) {
        if let Err(err) = self.emit(kind, payload) {
            eprintln!("retouch: failed to record {kind} event: {err:#}");
        }
    }
}

pub fn payload(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
