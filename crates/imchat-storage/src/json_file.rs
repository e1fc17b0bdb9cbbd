//! File-backed message log: one JSON document shared by every client
//! pointed at the same path.
//!
//! Layout (top-level keys carry the format version):
//!
//! ```json
//! {
//!   "imchat_db_v2":        { "<conversation id>": [ <envelope>, ... ] },
//!   "imchat_profiles_v2":  { "<identity>": { "name": "...", "avatar": "..." } },
//!   "imchat_friends_list": [ "<identity>", ... ]
//! }
//! ```
//!
//! Every operation re-reads the file, so appends made by another process
//! become visible on the next read. Writes are atomic:
//! serialize, write tmp, fsync, rename. A reader never observes a
//! half-written document.
//!
//! Writers in the same process are serialized. Two processes appending
//! at the same instant can still lose one append (last rename wins);
//! the shared store is a stand-in for a real replicated log.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use imchat_protocol::message::MessageEnvelope;
use imchat_types::{ConversationId, Identity, ImchatError, Profile, Result};
use serde::{Deserialize, Serialize};

use crate::log::MessageLog;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(rename = "imchat_db_v2", default)]
    conversations: BTreeMap<ConversationId, Vec<MessageEnvelope>>,
    #[serde(rename = "imchat_profiles_v2", default)]
    profiles: BTreeMap<Identity, Profile>,
    #[serde(rename = "imchat_friends_list", default)]
    contacts: Vec<Identity>,
}

// ---------------------------------------------------------------------------
// StoreFile (blocking I/O, internal)
// ---------------------------------------------------------------------------

/// The file and its in-process write gate. Every method blocks and runs
/// on tokio's blocking pool, never on a runtime worker.
#[derive(Debug)]
struct StoreFile {
    path: PathBuf,
    write_gate: Mutex<()>,
}

impl StoreFile {
    /// Loads the document. A missing or empty file is an empty store.
    fn load(&self) -> Result<StoreDocument> {
        if !self.path.exists() {
            return Ok(StoreDocument::default());
        }

        let raw = fs::read(&self.path).map_err(|e| ImchatError::StorageError {
            reason: format!("failed to read store {}: {e}", self.path.display()),
        })?;

        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(StoreDocument::default());
        }

        serde_json::from_slice(&raw).map_err(|e| ImchatError::StorageError {
            reason: format!("failed to parse store {}: {e}", self.path.display()),
        })
    }

    /// Writes the document atomically via a sibling temp file.
    fn save(&self, doc: &StoreDocument) -> Result<()> {
        let output = serde_json::to_vec_pretty(doc).map_err(|e| ImchatError::StorageError {
            reason: format!("failed to serialize store: {e}"),
        })?;

        let tmp_path = self.tmp_path()?;

        {
            let mut file = fs::File::create(&tmp_path).map_err(|e| ImchatError::StorageError {
                reason: format!("failed to create temp store file: {e}"),
            })?;

            file.write_all(&output).map_err(|e| ImchatError::StorageError {
                reason: format!("failed to write temp store file: {e}"),
            })?;

            file.sync_all().map_err(|e| ImchatError::StorageError {
                reason: format!("failed to fsync temp store file: {e}"),
            })?;
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            ImchatError::StorageError {
                reason: format!("failed to rename temp store file: {e}"),
            }
        })?;

        Ok(())
    }

    fn tmp_path(&self) -> Result<PathBuf> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if !parent.exists() {
            fs::create_dir_all(&parent).map_err(|e| ImchatError::StorageError {
                reason: format!("failed to create store directory: {e}"),
            })?;
        }

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("imchat-store.json");

        Ok(parent.join(format!(".{file_name}.tmp")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_gate.lock().map_err(|e| ImchatError::StorageError {
            reason: format!("store write lock poisoned: {e}"),
        })
    }

    /// Read-modify-write under the in-process write gate.
    fn update(&self, apply: impl FnOnce(&mut StoreDocument)) -> Result<()> {
        let _guard = self.lock()?;
        let mut doc = self.load()?;
        apply(&mut doc);
        self.save(&doc)
    }
}

// ---------------------------------------------------------------------------
// JsonFileLog
// ---------------------------------------------------------------------------

/// [`MessageLog`] persisted as a single JSON file.
///
/// File access runs under `spawn_blocking`, so a slow disk stalls only
/// the operation waiting on it. Must be used within a tokio runtime.
#[derive(Clone, Debug)]
pub struct JsonFileLog {
    file: Arc<StoreFile>,
}

impl JsonFileLog {
    /// Opens (lazily) the store at `path`. The file and its parent
    /// directory are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Arc::new(StoreFile {
                path: path.into(),
                write_gate: Mutex::new(()),
            }),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&StoreFile) -> Result<T> + Send + 'static,
    {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || op(&file))
            .await
            .map_err(|e| ImchatError::StorageError {
                reason: format!("store task failed: {e}"),
            })?
    }
}

#[async_trait]
impl MessageLog for JsonFileLog {
    async fn append(
        &self,
        conversation: &ConversationId,
        envelope: MessageEnvelope,
    ) -> Result<()> {
        tracing::debug!(%conversation, id = envelope.id, "appending envelope");
        let conversation = conversation.clone();
        self.blocking(move |file| {
            file.update(|doc| {
                doc.conversations
                    .entry(conversation)
                    .or_default()
                    .push(envelope);
            })
        })
        .await
    }

    async fn list(&self, conversation: &ConversationId) -> Result<Vec<MessageEnvelope>> {
        let conversation = conversation.clone();
        self.blocking(move |file| {
            Ok(file
                .load()?
                .conversations
                .remove(&conversation)
                .unwrap_or_default())
        })
        .await
    }

    async fn get_profile(&self, identity: &Identity) -> Result<Option<Profile>> {
        let identity = identity.clone();
        self.blocking(move |file| Ok(file.load()?.profiles.remove(&identity)))
            .await
    }

    async fn put_profile(&self, identity: &Identity, profile: Profile) -> Result<()> {
        let identity = identity.clone();
        self.blocking(move |file| {
            file.update(|doc| {
                doc.profiles.insert(identity, profile);
            })
        })
        .await
    }

    async fn list_contacts(&self) -> Result<Vec<Identity>> {
        self.blocking(|file| Ok(file.load()?.contacts)).await
    }

    async fn add_contact(&self, identity: &Identity) -> Result<()> {
        let identity = identity.clone();
        self.blocking(move |file| {
            file.update(|doc| {
                if !doc.contacts.contains(&identity) {
                    doc.contacts.push(identity);
                }
            })
        })
        .await
    }
}
