use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::backend::{KeyValueBackend, MemoryBackend};
use crate::events::{payload, EventKind, EventWriter};

/// Typed get/set over a [`KeyValueBackend`].
///
/// Nothing here returns an error: unreadable or corrupt values load as the
/// type's default, and failed writes are logged while the value stays
/// available from the in-memory copy for the rest of the session.
pub struct LocalStore {
    backend: Box<dyn KeyValueBackend>,
    memory: BTreeMap<String, Value>,
    events: Option<EventWriter>,
}

impl LocalStore {
    pub fn new(backend: impl KeyValueBackend + 'static, events: Option<EventWriter>) -> Self {
        Self {
            backend: Box::new(backend),
            memory: BTreeMap::new(),
            events,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new(), None)
    }

    pub fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let raw = match self.memory.get(key) {
            Some(value) => Some(value.clone()),
            None => match self.backend.read(key) {
                Ok(value) => value,
                Err(err) => {
                    self.report(EventKind::StoreReadFailed, key, &err);
                    None
                }
            },
        };
        let Some(raw) = raw else {
            return T::default();
        };
        match serde_json::from_value::<T>(raw) {
            Ok(value) => value,
            Err(err) => {
                self.report(EventKind::StoreReadFailed, key, &err.into());
                T::default()
            }
        }
    }

    pub fn save<T: Serialize>(&mut self, key: &str, value: &T) {
        let snapshot = match serde_json::to_value(value) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.report(EventKind::StoreWriteFailed, key, &err.into());
                return;
            }
        };
        self.memory.insert(key.to_string(), snapshot.clone());
        if let Err(err) = self.backend.write(key, &snapshot) {
            self.report(EventKind::StoreWriteFailed, key, &err);
        }
    }

    fn report(&self, kind: EventKind, key: &str, err: &anyhow::Error) {
        match &self.events {
            Some(events) => events.record(
                kind,
                payload(json!({
                    "key": key,
                    "error": format!("{err:#}"),
                })),
            ),
            None => eprintln!("retouch: {kind} ({key}): {err:#}"),
        }
    }
}
