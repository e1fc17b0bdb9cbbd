//! Session key derivation from a wallet signature.
//!
//! The wallet signature over the login message is the only secret the
//! session ever sees. It is stretched with PBKDF2-HMAC-SHA256 under a
//! fixed application salt and iteration count, so the same signature
//! yields the same 256-bit key on every device, with no randomness.
//!
//! Anyone able to reproduce the exact signature can reproduce the key.
//! Custody of the wallet private key is the root of trust; the login
//! message template being unique to this application keeps the key
//! from colliding with signatures collected by other services.

use hmac::Hmac;
use imchat_types::{ImchatError, Result};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Application salt mixed into every derivation.
pub const KDF_SALT: &[u8] = b"imchat-production-salt";

/// PBKDF2 iteration count.
pub const KDF_ITERATIONS: u32 = 100_000;

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// 256-bit AES-GCM key derived from a wallet signature.
///
/// Zeroized when dropped. Does not implement `Clone` or `Debug`;
/// share it behind an `Arc` instead of copying key material around.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Fixed byte length of the key.
    pub const LEN: usize = 32;

    /// Returns the raw key material.
    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derives the session key for `signature`.
///
/// Pure and deterministic: the same signature always produces the same
/// key. This call is CPU-heavy (100 000 HMAC rounds); async callers
/// should run it on a blocking thread.
///
/// # Errors
///
/// Returns [`ImchatError::DerivationError`] if the signature is empty
/// or the PBKDF2 primitive rejects its inputs. Never partially succeeds.
pub fn derive_session_key(signature: &str) -> Result<SessionKey> {
    if signature.is_empty() {
        return Err(ImchatError::DerivationError {
            reason: "signature must not be empty".into(),
        });
    }

    let mut output = [0u8; SessionKey::LEN];
    if let Err(e) =
        pbkdf2::pbkdf2::<Hmac<Sha256>>(signature.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut output)
    {
        output.zeroize();
        return Err(ImchatError::DerivationError {
            reason: format!("PBKDF2-HMAC-SHA256 failed: {e}"),
        });
    }

    Ok(SessionKey(output))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
