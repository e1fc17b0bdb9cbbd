//! Core shared types for the imchat end-to-end encrypted chat core.
//!
//! This crate defines the fundamental types used across the workspace.
//! Types shared by more than one crate live here and nowhere else.

pub mod config;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Case-insensitive wallet address identifying a chat participant.
///
/// Always held in canonical (lowercase) form, so equality, hashing,
/// and storage keys never depend on how the wallet reported the
/// address. Construction does not validate the address shape; use
/// `imchat_protocol::validation::parse_address` for untrusted input.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Creates an `Identity`, canonicalizing to lowercase.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().to_lowercase())
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first `n` characters, used for display fallbacks.
    pub fn prefix(&self, n: usize) -> &str {
        match self.0.char_indices().nth(n) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl From<String> for Identity {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for Identity {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ConversationId
// ---------------------------------------------------------------------------

/// Separator placed between the two sorted identities of a conversation.
pub const CONVERSATION_SEPARATOR: char = '_';

/// Deterministic identifier of a two-party conversation.
///
/// Computed as `min(a, b) + "_" + max(a, b)` over canonical identities,
/// so both participants derive the same id regardless of who initiates.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Computes the conversation id shared by `a` and `b`.
    ///
    /// Order-independent: `between(a, b) == between(b, a)`. Defined for
    /// equal inputs too (self-chat).
    pub fn between(a: &Identity, b: &Identity) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}{CONVERSATION_SEPARATOR}{hi}"))
    }

    /// Wraps an id read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// Classifies the content carried by a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// UTF-8 text typed by the sender.
    Text,
    /// Recorded audio, carried as its base64 representation.
    Audio,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Display metadata for an identity. Never used cryptographically.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name.
    pub name: String,
    /// Opaque avatar reference, typically a data URI. Empty if unset.
    #[serde(default)]
    pub avatar: String,
}

impl Profile {
    /// Placeholder profile shown for an identity that never saved one:
    /// `"{prefix} {first six chars}"` with no avatar.
    pub fn placeholder(identity: &Identity, prefix: &str) -> Self {
        Self {
            name: format!("{prefix} {}", identity.prefix(6)),
            avatar: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle state of the authenticated session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// No identity, no key.
    Disconnected,
    /// Signature obtained; key derivation in progress.
    Authenticating,
    /// Key derived and held in memory.
    Authenticated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Authenticated => write!(f, "authenticated"),
        }
    }
}

// ---------------------------------------------------------------------------
// ImchatError
// ---------------------------------------------------------------------------

/// Central error type for the imchat core.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum.
#[derive(Debug, Error)]
pub enum ImchatError {
    /// The key derivation primitive failed or is unavailable.
    #[error("key derivation failed: {reason}")]
    DerivationError {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// The external signing step was rejected or unavailable.
    #[error("authentication failed: {reason}")]
    AuthenticationError {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// A single envelope could not be decoded or authenticated.
    #[error("message could not be decrypted: {reason}")]
    DecryptionFailure {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// Caller input was malformed or violates a uniqueness rule.
    #[error("validation error: {reason}")]
    ValidationError {
        /// Human-readable description of what was rejected.
        reason: String,
    },

    /// Reading or writing the message log or profile table failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },

    /// The operation is not allowed in the current session state.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Human-readable description including the current state.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`ImchatError`].
pub type Result<T> = std::result::Result<T, ImchatError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
