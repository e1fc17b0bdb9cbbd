//! AES-256-GCM sealing of message payloads.
//!
//! An envelope is the printable string
//! `base64(nonce[12] || ciphertext || tag[16])`. The nonce is drawn
//! from OS entropy on every call and travels inside the envelope, so
//! the envelope is self-describing and two encryptions of the same
//! plaintext never produce the same envelope.
//!
//! Decryption fails closed. [`decrypt`] never errors: anything that
//! does not authenticate under the held key comes back as
//! [`Decrypted::Undecryptable`], whose display text is
//! [`UNDECRYPTABLE_TEXT`]. Use [`try_decrypt`] when the cause matters.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use imchat_types::{ImchatError, Result};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::kdf::SessionKey;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// AES-GCM nonce length (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Text shown in place of a message that cannot be decrypted.
pub const UNDECRYPTABLE_TEXT: &str = "🔒 [Decryption Error]";

// ---------------------------------------------------------------------------
// Decrypted
// ---------------------------------------------------------------------------

/// Result of a fail-closed decryption.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Decrypted {
    /// The envelope authenticated; this is the original plaintext.
    Plaintext(String),
    /// The envelope was malformed, tampered with, or sealed under a
    /// different key.
    Undecryptable,
}

impl Decrypted {
    /// Returns `true` for [`Decrypted::Undecryptable`].
    pub fn is_undecryptable(&self) -> bool {
        matches!(self, Self::Undecryptable)
    }

    /// Returns the plaintext, or [`UNDECRYPTABLE_TEXT`].
    pub fn into_text(self) -> String {
        match self {
            Self::Plaintext(text) => text,
            Self::Undecryptable => UNDECRYPTABLE_TEXT.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Encrypt
// ---------------------------------------------------------------------------

/// Seals `plaintext` under `key` with a fresh random nonce.
///
/// # Errors
///
/// Returns [`ImchatError::DerivationError`] if the key cannot initialise
/// the cipher. This does not happen for a well-formed [`SessionKey`].
pub fn encrypt(plaintext: &str, key: &SessionKey) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    encrypt_with_nonce(plaintext, key, &nonce)
}

/// Seals `plaintext` under an explicit nonce. Reusing a nonce under the
/// same key breaks GCM; only [`encrypt`] and known-vector tests call this.
pub(crate) fn encrypt_with_nonce(
    plaintext: &str,
    key: &SessionKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| {
        ImchatError::DerivationError {
            reason: format!("AES-256-GCM key setup failed: {e}"),
        }
    })?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext.as_bytes())
        .map_err(|e| ImchatError::DerivationError {
            reason: format!("AES-256-GCM encryption failed: {e}"),
        })?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(nonce);
    combined.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(combined))
}

// ---------------------------------------------------------------------------
// Decrypt
// ---------------------------------------------------------------------------

/// Opens an envelope produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`ImchatError::DecryptionFailure`] if the envelope is not
/// valid base64, is too short to hold a nonce and tag, fails tag
/// verification, or does not decode to UTF-8.
pub fn try_decrypt(envelope: &str, key: &SessionKey) -> Result<String> {
    let combined = STANDARD
        .decode(envelope.trim())
        .map_err(|e| ImchatError::DecryptionFailure {
            reason: format!("envelope is not valid base64: {e}"),
        })?;

    if combined.len() < NONCE_LEN + TAG_LEN {
        return Err(ImchatError::DecryptionFailure {
            reason: format!(
                "envelope too short: expected at least {} bytes, got {}",
                NONCE_LEN + TAG_LEN,
                combined.len()
            ),
        });
    }

    let (nonce, ciphertext) = combined.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| {
        ImchatError::DecryptionFailure {
            reason: format!("AES-256-GCM key setup failed: {e}"),
        }
    })?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| ImchatError::DecryptionFailure {
            reason: "authentication tag mismatch (wrong key or tampered envelope)".into(),
        })?;

    String::from_utf8(plaintext).map_err(|e| ImchatError::DecryptionFailure {
        reason: format!("plaintext is not UTF-8: {e}"),
    })
}

/// Opens an envelope, folding every failure into
/// [`Decrypted::Undecryptable`].
pub fn decrypt(envelope: &str, key: &SessionKey) -> Decrypted {
    match try_decrypt(envelope, key) {
        Ok(text) => Decrypted::Plaintext(text),
        Err(e) => {
            tracing::debug!(%e, "envelope did not decrypt under the session key");
            Decrypted::Undecryptable
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
