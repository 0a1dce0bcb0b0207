//! Persistent JSON stores.
//!
//! Every store rewrites its file wholesale through [`write_json_atomic`]
//! (temp sibling, then rename), so a concurrent reader sees either the old
//! document or the new one, never a torn write. Reads are tolerant: a
//! missing or malformed file yields `None` and the caller falls back to an
//! empty default.

pub mod conversation;
pub mod models;

pub use conversation::{ConversationStore, DEFAULT_CONVERSATION};
pub use models::{ModelHandle, ModelHandleRegistry, ModelRegistryDocument};

use crate::error::AftpError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Read and decode a JSON file, or `None` when it is missing or malformed.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("ignoring malformed JSON in {}: {}", path.display(), e);
            None
        }
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AftpError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');

    let tmp = temp_sibling(path);
    std::fs::write(&tmp, &bytes)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_atomic_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("doc.json");

        let mut doc = BTreeMap::new();
        doc.insert("b".to_string(), 2);
        doc.insert("a".to_string(), 1);
        write_json_atomic(&path, &doc).unwrap();

        let back: BTreeMap<String, i32> = read_json(&path).unwrap();
        assert_eq!(back, doc);
        assert!(!temp_sibling(&path).exists());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());
    }

    #[test]
    fn test_read_missing_or_malformed_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.json");
        assert!(read_json::<serde_json::Value>(&missing).is_none());

        let bad = tmp.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(read_json::<serde_json::Value>(&bad).is_none());
    }
}
