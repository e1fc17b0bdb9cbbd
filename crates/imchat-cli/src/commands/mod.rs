//! Command handlers and the session plumbing they share.

pub mod contact;
pub mod message;
pub mod profile;

use std::sync::Arc;

use imchat_protocol::validation::parse_address;
use imchat_session::{SessionManager, StaticSigner};
use imchat_storage::{JsonFileLog, MessageLog};
use imchat_types::{Identity, ImchatError, Result};

use crate::GlobalOpts;

/// Opens a disconnected session over the store.
pub async fn open_session(opts: &GlobalOpts) -> Result<SessionManager> {
    let log: Arc<dyn MessageLog> = Arc::new(JsonFileLog::new(&opts.store));
    SessionManager::open(log, opts.config.clone()).await
}

/// Opens a session and logs in with `--address` and `--signature`.
pub async fn signed_in_session(opts: &GlobalOpts) -> Result<SessionManager> {
    let identity = own_address(opts)?;
    let signature = opts
        .signature
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ImchatError::AuthenticationError {
            reason: "missing wallet signature (--signature or IMCHAT_SIGNATURE); \
                     sign the output of `imchat login-message`"
                .into(),
        })?;

    let mut session = open_session(opts).await?;
    session
        .connect(&StaticSigner::new(identity.as_str(), signature))
        .await?;
    Ok(session)
}

/// The local wallet address, validated.
pub fn own_address(opts: &GlobalOpts) -> Result<Identity> {
    match opts.address.as_deref() {
        Some(raw) => parse_address(raw),
        None => Err(ImchatError::AuthenticationError {
            reason: "missing wallet address (--address or IMCHAT_ADDRESS)".into(),
        }),
    }
}
