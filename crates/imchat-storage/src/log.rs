use std::sync::Arc;

use async_trait::async_trait;
use imchat_protocol::message::MessageEnvelope;
use imchat_types::{ConversationId, Identity, Profile, Result};

/// Shared append-only message log plus the profile and contact tables.
///
/// Implementations must:
/// - never mutate or remove an appended envelope,
/// - return a conversation's envelopes in append order,
/// - key profiles by canonical [`Identity`],
/// - keep contacts in insertion order without duplicates.
///
/// Every failure surfaces as [`imchat_types::ImchatError::StorageError`].
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Appends `envelope` to the end of `conversation`'s log.
    async fn append(&self, conversation: &ConversationId, envelope: MessageEnvelope)
        -> Result<()>;

    /// Snapshot of `conversation`'s log. Empty if nothing was appended.
    async fn list(&self, conversation: &ConversationId) -> Result<Vec<MessageEnvelope>>;

    /// Saved profile for `identity`, if any.
    async fn get_profile(&self, identity: &Identity) -> Result<Option<Profile>>;

    /// Replaces the whole profile record for `identity`.
    async fn put_profile(&self, identity: &Identity, profile: Profile) -> Result<()>;

    /// Contact identities in the order they were added.
    async fn list_contacts(&self) -> Result<Vec<Identity>>;

    /// Appends `identity` to the contact list. No-op if already present.
    async fn add_contact(&self, identity: &Identity) -> Result<()>;
}

#[async_trait]
impl<T: MessageLog + ?Sized> MessageLog for Arc<T> {
    async fn append(
        &self,
        conversation: &ConversationId,
        envelope: MessageEnvelope,
    ) -> Result<()> {
        (**self).append(conversation, envelope).await
    }

    async fn list(&self, conversation: &ConversationId) -> Result<Vec<MessageEnvelope>> {
        (**self).list(conversation).await
    }

    async fn get_profile(&self, identity: &Identity) -> Result<Option<Profile>> {
        (**self).get_profile(identity).await
    }

    async fn put_profile(&self, identity: &Identity, profile: Profile) -> Result<()> {
        (**self).put_profile(identity, profile).await
    }

    async fn list_contacts(&self) -> Result<Vec<Identity>> {
        (**self).list_contacts().await
    }

    async fn add_contact(&self, identity: &Identity) -> Result<()> {
        (**self).add_contact(identity).await
    }
}
