//! Participant id persistence.
//!
//! The participant id is entered on one page and read back on every later
//! page. Stores are plain string key-value maps; the id lives under
//! [`PARTICIPANT_KEY`].

use crate::recorder::ParticipantId;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Key under which the participant id is stored.
pub const PARTICIPANT_KEY: &str = "participantId";

/// Errors from a participant store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store file is not a JSON object: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A string key-value store that outlives page loads.
pub trait ParticipantStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    fn participant(&self) -> Result<Option<ParticipantId>, StoreError> {
        Ok(self.get(PARTICIPANT_KEY)?.map(ParticipantId::from))
    }

    fn set_participant(&mut self, id: &ParticipantId) -> Result<(), StoreError> {
        self.set(PARTICIPANT_KEY, id.as_str())
    }

    fn clear_participant(&mut self) -> Result<(), StoreError> {
        self.remove(PARTICIPANT_KEY)
    }
}

/// Read the participant id, treating store failures as "unset".
pub fn load_participant(store: &dyn ParticipantStore) -> Option<ParticipantId> {
    match store.participant() {
        Ok(id) => id,
        Err(e) => {
            warn!("Could not read participant id: {e}");
            None
        }
    }
}

/// In-memory store, for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MemoryParticipantStore {
    entries: HashMap<String, String>,
}

impl MemoryParticipantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParticipantStore for MemoryParticipantStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object on disk. Unrelated keys are preserved.
#[derive(Debug, Clone)]
pub struct FileParticipantStore {
    path: PathBuf,
}

impl FileParticipantStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read(&self) -> Result<Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl ParticipantStore for FileParticipantStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .read()?
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut map = self.read()?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write(&map)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut map = self.read()?;
        if map.remove(key).is_some() {
            self.write(&map)?;
        }
        Ok(())
    }
}
