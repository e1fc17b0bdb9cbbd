use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use imchat_protocol::message::MessageEnvelope;
use imchat_types::{ConversationId, Identity, ImchatError, Profile, Result};

use crate::log::MessageLog;

/// In-memory message log. Clones share the same underlying state, so a
/// clone handed to a second session behaves like a shared store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    inner: Arc<RwLock<MemoryLogInner>>,
}

#[derive(Debug, Default)]
struct MemoryLogInner {
    /// conversation -> envelopes in append order
    conversations: HashMap<ConversationId, Vec<MessageEnvelope>>,
    profiles: HashMap<Identity, Profile>,
    contacts: Vec<Identity>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryLogInner>> {
        self.inner.read().map_err(|e| ImchatError::StorageError {
            reason: format!("failed to acquire read lock: {e}"),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryLogInner>> {
        self.inner.write().map_err(|e| ImchatError::StorageError {
            reason: format!("failed to acquire write lock: {e}"),
        })
    }
}

#[async_trait]
impl MessageLog for MemoryLog {
    async fn append(
        &self,
        conversation: &ConversationId,
        envelope: MessageEnvelope,
    ) -> Result<()> {
        self.write()?
            .conversations
            .entry(conversation.clone())
            .or_default()
            .push(envelope);
        Ok(())
    }

    async fn list(&self, conversation: &ConversationId) -> Result<Vec<MessageEnvelope>> {
        Ok(self
            .read()?
            .conversations
            .get(conversation)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_profile(&self, identity: &Identity) -> Result<Option<Profile>> {
        Ok(self.read()?.profiles.get(identity).cloned())
    }

    async fn put_profile(&self, identity: &Identity, profile: Profile) -> Result<()> {
        self.write()?.profiles.insert(identity.clone(), profile);
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Identity>> {
        Ok(self.read()?.contacts.clone())
    }

    async fn add_contact(&self, identity: &Identity) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.contacts.contains(identity) {
            inner.contacts.push(identity.clone());
        }
        Ok(())
    }
}
