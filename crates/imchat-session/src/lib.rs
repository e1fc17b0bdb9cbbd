//! Session runtime for the imchat core.
//!
//! [`SessionManager`] owns the authenticated identity and session key
//! and gates every operation on them. [`SyncEngine`] keeps the active
//! conversation's decrypted view in step with the shared log. Callers
//! observe results through `tokio::sync::watch` receivers.

pub mod session;
pub mod signer;
pub mod sync;
pub mod view;

pub use session::SessionManager;
pub use signer::{StaticSigner, WalletSigner};
pub use sync::{SyncEngine, SyncHandle, SyncOutcome};
pub use view::{ConversationView, MessageView};
