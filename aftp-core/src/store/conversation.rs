//! Durable multi-turn conversations, one JSON file per id.

use super::{read_json, write_json_atomic};
use crate::error::AftpError;
use crate::types::{ChatMessage, Conversation, Role};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Id of the conversation created when none exist.
pub const DEFAULT_CONVERSATION: &str = "default";

/// File-backed conversation store.
///
/// Each conversation lives in `<dir>/<id>.json`. Mutations of one id are
/// serialized by a per-id lock; other processes writing the same file race
/// with last-writer-wins semantics.
#[derive(Debug)]
pub struct ConversationStore {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConversationStore {
    /// Create a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    /// Directory holding the conversation files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Conversation ids in lexicographic order.
    ///
    /// Creates [`DEFAULT_CONVERSATION`] when the store is empty, so the
    /// result is never empty.
    pub fn list(&self) -> Result<Vec<String>, AftpError> {
        std::fs::create_dir_all(&self.dir)?;

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }

        if ids.is_empty() {
            self.create(DEFAULT_CONVERSATION)?;
            ids.push(DEFAULT_CONVERSATION.to_string());
        }

        ids.sort();
        Ok(ids)
    }

    /// Create an empty conversation. Succeeds without change if it exists.
    pub fn create(&self, id: &str) -> Result<(), AftpError> {
        let path = self.path_for(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock();

        if path.exists() {
            return Ok(());
        }
        tracing::debug!("creating conversation {}", id);
        write_json_atomic(&path, &Conversation::new(id))
    }

    /// Whether a conversation file exists
    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.exists()).unwrap_or(false)
    }

    /// Load a conversation, creating an empty one on first reference.
    ///
    /// A malformed file loads as an empty conversation; it is replaced on the
    /// next write.
    pub fn load(&self, id: &str) -> Result<Conversation, AftpError> {
        let path = self.path_for(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock();
        self.load_locked(id, &path)
    }

    /// Append one message and rewrite the file.
    pub fn append_message(
        &self,
        id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> Result<Conversation, AftpError> {
        self.append_messages(
            id,
            vec![ChatMessage {
                role,
                content: content.into(),
            }],
        )
    }

    /// Append several messages in order with a single rewrite.
    pub fn append_messages(
        &self,
        id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<Conversation, AftpError> {
        let path = self.path_for(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock();

        let mut conversation = self.load_locked(id, &path)?;
        conversation.messages.extend(messages);
        write_json_atomic(&path, &conversation)?;
        Ok(conversation)
    }

    /// Overwrite a conversation with the caller's copy.
    pub fn save(&self, id: &str, conversation: &Conversation) -> Result<(), AftpError> {
        let path = self.path_for(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock();

        if conversation.id == id {
            write_json_atomic(&path, conversation)
        } else {
            let mut renamed = conversation.clone();
            renamed.id = id.to_string();
            write_json_atomic(&path, &renamed)
        }
    }

    /// Delete a conversation. Deleting an unknown id succeeds.
    pub fn delete(&self, id: &str) -> Result<(), AftpError> {
        let path = self.path_for(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock();

        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("deleted conversation {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load_locked(&self, id: &str, path: &Path) -> Result<Conversation, AftpError> {
        if !path.exists() {
            let conversation = Conversation::new(id);
            write_json_atomic(path, &conversation)?;
            return Ok(conversation);
        }

        let mut conversation =
            read_json::<Conversation>(path).unwrap_or_else(|| Conversation::new(id));
        conversation.id = id.to_string();
        Ok(conversation)
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(id.to_string()).or_default().clone()
    }

    /// File path for an id. Ids that could escape the directory are rejected.
    pub fn path_for(&self, id: &str) -> Result<PathBuf, AftpError> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

fn validate_id(id: &str) -> Result<(), AftpError> {
    let invalid = id.trim().is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\', ':'])
        || id.chars().any(char::is_control);
    if invalid {
        return Err(AftpError::configuration(format!(
            "invalid conversation id '{}'",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConversationStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(tmp.path().join("conversations"));
        (tmp, store)
    }

    #[test]
    fn test_load_unknown_id_auto_creates() {
        let (_tmp, store) = store();
        let conv = store.load("x").unwrap();
        assert_eq!(conv, Conversation::new("x"));

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path_for("x").unwrap()).unwrap())
                .unwrap();
        assert_eq!(
            on_disk,
            serde_json::json!({"id": "x", "model": null, "messages": []})
        );
        assert!(store.list().unwrap().contains(&"x".to_string()));
    }

    #[test]
    fn test_list_creates_default_when_empty() {
        let (_tmp, store) = store();
        assert_eq!(store.list().unwrap(), vec![DEFAULT_CONVERSATION.to_string()]);
        assert!(store.exists(DEFAULT_CONVERSATION));
    }

    #[test]
    fn test_list_is_lexicographic() {
        let (_tmp, store) = store();
        store.create("beta").unwrap();
        store.create("alpha").unwrap();
        store.create("Gamma").unwrap();
        assert_eq!(store.list().unwrap(), vec!["Gamma", "alpha", "beta"]);
    }

    #[test]
    fn test_create_is_idempotent() {
        let (_tmp, store) = store();
        store.append_message("a", Role::User, "keep me").unwrap();
        store.create("a").unwrap();
        assert_eq!(store.load("a").unwrap().messages.len(), 1);
    }

    #[test]
    fn test_append_round_trip_preserves_order() {
        let (_tmp, store) = store();
        store.append_message("chat", Role::User, "hi").unwrap();

        let conv = store.load("chat").unwrap();
        assert_eq!(conv.messages, vec![ChatMessage::user("hi")]);

        store.append_message("chat", Role::Assistant, "hello").unwrap();
        let conv = store.load("chat").unwrap();
        assert_eq!(
            conv.messages,
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]
        );
    }

    #[test]
    fn test_save_overwrites_and_binds_model() {
        let (_tmp, store) = store();
        let mut conv = store.load("bound").unwrap();
        conv.model = Some("llama3:8b".to_string());
        store.save("bound", &conv).unwrap();
        assert_eq!(
            store.load("bound").unwrap().model.as_deref(),
            Some("llama3:8b")
        );
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let (_tmp, store) = store();
        store.delete("never-existed").unwrap();
        store.create("gone").unwrap();
        store.delete("gone").unwrap();
        assert!(!store.exists("gone"));
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let (_tmp, store) = store();
        let path = store.path_for("broken").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{{{").unwrap();

        assert_eq!(store.load("broken").unwrap(), Conversation::new("broken"));
        store.append_message("broken", Role::User, "fresh").unwrap();
        assert_eq!(store.load("broken").unwrap().messages.len(), 1);
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let (_tmp, store) = store();
        assert!(store.load("../escape").is_err());
        assert!(store.load("").is_err());
        assert!(store.load(".hidden").is_err());
    }
}
