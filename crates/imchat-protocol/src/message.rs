//! Persisted and displayed message shapes.
//!
//! A [`MessageEnvelope`] is what the log stores: the payload is sealed
//! and the rest travels in the clear. A [`ChatMessage`] is what a view
//! shows: the same record with the payload opened under the session key,
//! or replaced by the undecryptable sentinel.

use chrono::{DateTime, TimeZone, Utc};
use imchat_crypto::aead;
use imchat_crypto::kdf::SessionKey;
use imchat_types::{Identity, MessageKind, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MessageEnvelope
// ---------------------------------------------------------------------------

/// One encrypted record in a conversation log. Immutable once appended.
///
/// Serializes as `{ "id", "sender", "content", "type", "timestamp" }`,
/// the layout shared with browser clients.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Epoch-millisecond identifier, unique within the sender's session.
    pub id: i64,
    /// Canonical identity of the sender.
    pub sender: Identity,
    /// Sealed payload: `base64(nonce || ciphertext || tag)`.
    pub content: String,
    /// Payload classification.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Epoch milliseconds at send time.
    pub timestamp: i64,
}

impl MessageEnvelope {
    /// Seals `plaintext` under `key` into a new envelope.
    ///
    /// # Errors
    ///
    /// Propagates any failure from [`aead::encrypt`].
    pub fn seal(
        id: i64,
        sender: Identity,
        plaintext: &str,
        kind: MessageKind,
        timestamp: i64,
        key: &SessionKey,
    ) -> Result<Self> {
        Ok(Self {
            id,
            sender,
            content: aead::encrypt(plaintext, key)?,
            kind,
            timestamp,
        })
    }

    /// Opens the envelope for display. Never fails: an envelope sealed
    /// under another key keeps its place with the sentinel text.
    pub fn open(&self, key: &SessionKey) -> ChatMessage {
        ChatMessage {
            id: self.id,
            sender: self.sender.clone(),
            text: aead::decrypt(&self.content, key).into_text(),
            kind: self.kind,
            timestamp: self.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// Decrypted view entry: `{id, sender, text, type, timestamp}`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Id of the envelope this message was opened from.
    pub id: i64,
    /// Canonical identity of the sender.
    pub sender: Identity,
    /// Plaintext, or the undecryptable sentinel. For audio messages this
    /// is the clip's base64 representation.
    pub text: String,
    /// Payload classification, copied from the envelope.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Epoch milliseconds at send time.
    pub timestamp: i64,
}

impl ChatMessage {
    /// Builds the local echo of a message this session just sent.
    pub fn local_echo(envelope: &MessageEnvelope, plaintext: impl Into<String>) -> Self {
        Self {
            id: envelope.id,
            sender: envelope.sender.clone(),
            text: plaintext.into(),
            kind: envelope.kind,
            timestamp: envelope.timestamp,
        }
    }

    /// Returns `true` if the payload did not decrypt under the held key.
    pub fn is_undecryptable(&self) -> bool {
        self.text == aead::UNDECRYPTABLE_TEXT
    }

    /// Send time as a UTC datetime, or `None` if the timestamp is out of
    /// range.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

// ---------------------------------------------------------------------------
// AudioClip
// ---------------------------------------------------------------------------

/// MIME type recorded clips use unless the capture side says otherwise.
pub const DEFAULT_AUDIO_MIME: &str = "audio/webm";

/// Recorded audio handed over by the capture side.
///
/// Only `data_base64` is sealed and stored; the MIME type is a hint for
/// the local player and is not persisted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AudioClip {
    /// Recording bytes, base64 encoded. This string is the message content.
    pub data_base64: String,
    /// Container format, e.g. `audio/webm`.
    pub mime_type: String,
}

impl AudioClip {
    /// Clip with the default MIME type.
    pub fn new(data_base64: impl Into<String>) -> Self {
        Self {
            data_base64: data_base64.into(),
            mime_type: DEFAULT_AUDIO_MIME.into(),
        }
    }

    pub fn with_mime(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}
