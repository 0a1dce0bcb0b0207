//! Registry of locally known model handles (Ollama tags, HF repos, voices).

use super::{read_json, write_json_atomic};
use crate::error::AftpError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Current schema version of the model registry file.
pub const MODEL_REGISTRY_SCHEMA: u32 = 1;

/// One registered model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelHandle {
    /// Backend kind: `ollama`, `hf`, `tts`, `stt` or `custom`
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub license_url: String,
    #[serde(default)]
    pub notes: String,
}

impl ModelHandle {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            source: String::new(),
            license_url: String::new(),
            notes: String::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_license_url(mut self, url: impl Into<String>) -> Self {
        self.license_url = url.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// On-disk document: `{"schema": 1, "models": {handle: ModelHandle}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRegistryDocument {
    #[serde(default = "default_schema")]
    pub schema: u32,
    #[serde(default)]
    pub models: BTreeMap<String, ModelHandle>,
}

fn default_schema() -> u32 {
    MODEL_REGISTRY_SCHEMA
}

impl Default for ModelRegistryDocument {
    fn default() -> Self {
        Self {
            schema: MODEL_REGISTRY_SCHEMA,
            models: BTreeMap::new(),
        }
    }
}

/// File-backed model handle registry.
#[derive(Debug)]
pub struct ModelHandleRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ModelHandleRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry; missing or malformed files read as empty.
    pub fn read(&self) -> ModelRegistryDocument {
        read_json(&self.path).unwrap_or_default()
    }

    /// Replace the whole registry.
    pub fn write(&self, doc: &ModelRegistryDocument) -> Result<(), AftpError> {
        let _guard = self.write_lock.lock();
        write_json_atomic(&self.path, doc)
    }

    /// Insert or replace a handle.
    pub fn upsert(&self, handle: impl Into<String>, model: ModelHandle) -> Result<(), AftpError> {
        let _guard = self.write_lock.lock();
        let mut doc = self.read();
        doc.models.insert(handle.into(), model);
        write_json_atomic(&self.path, &doc)
    }

    /// Remove a handle. Returns whether it was present.
    pub fn remove(&self, handle: &str) -> Result<bool, AftpError> {
        let _guard = self.write_lock.lock();
        let mut doc = self.read();
        if doc.models.remove(handle).is_none() {
            return Ok(false);
        }
        write_json_atomic(&self.path, &doc)?;
        Ok(true)
    }

    /// Registered handles, optionally filtered by kind.
    pub fn list(&self, kind: Option<&str>) -> BTreeMap<String, ModelHandle> {
        let models = self.read().models;
        match kind {
            Some(kind) => models.into_iter().filter(|(_, m)| m.kind == kind).collect(),
            None => models,
        }
    }
}
