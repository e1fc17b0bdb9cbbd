//! Wallet signing port.

use async_trait::async_trait;
use imchat_types::{Identity, ImchatError, Result};
use zeroize::Zeroizing;

/// External wallet able to report its account and sign a message.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Account currently selected in the wallet.
    ///
    /// Returns [`ImchatError::AuthenticationError`] if the wallet is
    /// locked or exposes no account.
    async fn current_identity(&self) -> Result<Identity>;

    /// Signs `message` with the current account.
    ///
    /// Returns [`ImchatError::AuthenticationError`] if the user rejects
    /// the request or the wallet is unavailable.
    async fn sign_message(&self, message: &str) -> Result<String>;
}

/// Signer with a fixed identity and a precomputed signature.
///
/// Used where the signature was obtained out of band (CLI, tests).
/// The signature is returned for any message.
pub struct StaticSigner {
    identity: Identity,
    signature: Option<Zeroizing<String>>,
}

impl StaticSigner {
    pub fn new(identity: impl AsRef<str>, signature: impl Into<String>) -> Self {
        Self {
            identity: Identity::new(identity),
            signature: Some(Zeroizing::new(signature.into())),
        }
    }

    /// A signer whose user declines every signature request.
    pub fn rejecting(identity: impl AsRef<str>) -> Self {
        Self {
            identity: Identity::new(identity),
            signature: None,
        }
    }
}

#[async_trait]
impl WalletSigner for StaticSigner {
    async fn current_identity(&self) -> Result<Identity> {
        if self.identity.as_str().is_empty() {
            return Err(ImchatError::AuthenticationError {
                reason: "wallet exposes no account".into(),
            });
        }
        Ok(self.identity.clone())
    }

    async fn sign_message(&self, _message: &str) -> Result<String> {
        match &self.signature {
            Some(sig) => Ok(sig.as_str().to_owned()),
            None => Err(ImchatError::AuthenticationError {
                reason: "signature request rejected".into(),
            }),
        }
    }
}
