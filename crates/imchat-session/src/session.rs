//! Session lifecycle and state machine.
//!
//! The [`SessionManager`] is the public entry point of the core. It
//! owns the authenticated identity and the session key, and every
//! read or write of a conversation goes through it.
//!
//! # State machine
//!
//! ```text
//! Disconnected ──authenticate()──▶ Authenticating ──▶ Authenticated
//!      ▲                                 │                  │
//!      └──────────── on failure ─────────┘     disconnect() │
//!      └────────────────────────────────────────────────────┘
//! ```
//!
//! - `Disconnected`: no identity, no key, no active conversation.
//! - `Authenticating`: signature in hand, key derivation running on a
//!   blocking thread.
//! - `Authenticated`: key held; conversations can be selected and
//!   messages sent.
//!
//! Authenticating twice without disconnecting is rejected with
//! `ImchatError::InvalidState`.

use std::sync::Arc;

use chrono::Utc;
use imchat_crypto::kdf::{derive_session_key, SessionKey};
use imchat_protocol::login::login_message;
use imchat_protocol::message::{AudioClip, ChatMessage, MessageEnvelope};
use imchat_protocol::validation::validate_new_contact;
use imchat_storage::MessageLog;
use imchat_types::config::AppConfig;
use imchat_types::{
    ConversationId, Identity, ImchatError, MessageKind, Profile, Result, SessionState,
};
use tokio::sync::watch;
use zeroize::Zeroizing;

use crate::signer::WalletSigner;
use crate::sync::{SyncEngine, SyncHandle, SyncOutcome};
use crate::view::{ConversationView, MessageView};

// ---------------------------------------------------------------------------
// IdClock (internal)
// ---------------------------------------------------------------------------

/// Epoch-millisecond message ids, strictly increasing per session.
#[derive(Debug, Default)]
struct IdClock {
    last: i64,
}

impl IdClock {
    fn next(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let id = if now > self.last { now } else { self.last + 1 };
        self.last = id;
        id
    }
}

// ---------------------------------------------------------------------------
// ActiveConversation (internal)
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ActiveConversation {
    peer: Identity,
    sync: SyncHandle,
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Owns the session and gates the core on it.
///
/// Construct with [`SessionManager::open`], then [`connect`] through a
/// wallet or [`authenticate`] with a signature obtained elsewhere.
/// Observe results through [`subscribe_messages`] and
/// [`subscribe_contacts`].
///
/// [`connect`]: SessionManager::connect
/// [`authenticate`]: SessionManager::authenticate
/// [`subscribe_messages`]: SessionManager::subscribe_messages
/// [`subscribe_contacts`]: SessionManager::subscribe_contacts
pub struct SessionManager {
    log: Arc<dyn MessageLog>,
    config: AppConfig,
    state: SessionState,
    identity: Option<Identity>,
    key: Option<Arc<SessionKey>>,
    profile: Option<Profile>,
    active: Option<ActiveConversation>,
    view: MessageView,
    engine: SyncEngine,
    contacts: watch::Sender<Vec<Identity>>,
    ids: IdClock,
}

impl SessionManager {
    /// Validates `config`, loads the contact list and returns a
    /// disconnected session.
    ///
    /// # Errors
    ///
    /// - [`ImchatError::ConfigError`] if `config` is invalid.
    /// - [`ImchatError::StorageError`] if the contact list cannot be read.
    pub async fn open(log: Arc<dyn MessageLog>, config: AppConfig) -> Result<Self> {
        config.validate()?;

        let contacts = log.list_contacts().await?;
        let (contacts_tx, _rx) = watch::channel(contacts);

        let view = MessageView::new();
        let engine = SyncEngine::new(Arc::clone(&log), view.clone(), config.poll_interval());

        Ok(Self {
            log,
            config,
            state: SessionState::Disconnected,
            identity: None,
            key: None,
            profile: None,
            active: None,
            view,
            engine,
            contacts: contacts_tx,
            ids: IdClock::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Asks `signer` for its account and a signature over the login
    /// message, then authenticates with them.
    ///
    /// # Errors
    ///
    /// [`ImchatError::AuthenticationError`] if the wallet has no account
    /// or rejects the request; otherwise as [`authenticate`].
    ///
    /// [`authenticate`]: SessionManager::authenticate
    pub async fn connect(&mut self, signer: &dyn WalletSigner) -> Result<()> {
        self.require_state(SessionState::Disconnected, "connect")?;

        let identity = signer.current_identity().await?;
        let message = login_message(
            &self.config.app_name,
            &identity,
            Utc::now().timestamp_millis(),
        );
        let signature = Zeroizing::new(signer.sign_message(&message).await?);

        self.authenticate(identity.as_str(), &signature).await
    }

    /// Derives the session key from `signature` and enters
    /// `Authenticated`. Creates a placeholder profile for `identity` if
    /// it has none.
    ///
    /// On any failure the session stays `Disconnected`.
    ///
    /// # Errors
    ///
    /// - [`ImchatError::InvalidState`] if not `Disconnected`.
    /// - [`ImchatError::AuthenticationError`] if the identity or
    ///   signature is missing.
    /// - [`ImchatError::DerivationError`] if key derivation fails.
    /// - [`ImchatError::StorageError`] if the profile cannot be loaded
    ///   or created.
    pub async fn authenticate(&mut self, identity: &str, signature: &str) -> Result<()> {
        self.require_state(SessionState::Disconnected, "authenticate")?;

        let identity = Identity::new(identity.trim());
        if identity.as_str().is_empty() {
            return Err(ImchatError::AuthenticationError {
                reason: "no identity reported by the wallet".into(),
            });
        }
        if signature.trim().is_empty() {
            return Err(ImchatError::AuthenticationError {
                reason: "no signature provided".into(),
            });
        }

        self.state = SessionState::Authenticating;
        tracing::info!(%identity, "deriving session key");

        match self.establish(&identity, signature).await {
            Ok((key, profile)) => {
                self.identity = Some(identity);
                self.key = Some(Arc::new(key));
                self.profile = Some(profile);
                self.ids = IdClock::default();
                self.state = SessionState::Authenticated;
                tracing::info!(identity = %self.identity_str(), "session authenticated");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                tracing::warn!(%identity, %e, "authentication failed");
                Err(e)
            }
        }
    }

    async fn establish(&self, identity: &Identity, signature: &str) -> Result<(SessionKey, Profile)> {
        let signature = Zeroizing::new(signature.to_owned());
        let key = tokio::task::spawn_blocking(move || derive_session_key(&signature))
            .await
            .map_err(|e| ImchatError::DerivationError {
                reason: format!("key derivation task failed: {e}"),
            })??;

        let profile = match self.log.get_profile(identity).await? {
            Some(profile) => profile,
            None => {
                let profile =
                    Profile::placeholder(identity, &self.config.default_display_name_prefix);
                self.log.put_profile(identity, profile.clone()).await?;
                profile
            }
        };

        Ok((key, profile))
    }

    /// Drops the key, the active conversation and its decrypted view.
    /// Idempotent.
    pub fn disconnect(&mut self) {
        self.stop_sync();
        self.view.reset(None);
        self.key = None;
        self.profile = None;
        if let Some(identity) = self.identity.take() {
            tracing::info!(%identity, "session disconnected");
        }
        self.state = SessionState::Disconnected;
    }

    /// Reacts to the wallet reporting a (possibly different) account.
    ///
    /// `None` means the wallet exposes no account. Disconnects unless the
    /// reported account is the current identity. Returns `true` if the
    /// session was disconnected.
    pub fn on_identity_changed(&mut self, reported: Option<&str>) -> bool {
        if self.state == SessionState::Disconnected {
            return false;
        }

        let same = match (reported, &self.identity) {
            (Some(raw), Some(current)) => Identity::new(raw.trim()) == *current,
            _ => false,
        };

        if same {
            return false;
        }

        tracing::info!("wallet account changed, disconnecting");
        self.disconnect();
        true
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    /// Makes the conversation with `peer` active and starts syncing it.
    /// The view holds the conversation's messages when this returns.
    ///
    /// # Errors
    ///
    /// - [`ImchatError::InvalidState`] if not `Authenticated`.
    /// - [`ImchatError::ValidationError`] if `peer` is empty.
    pub async fn select_conversation(&mut self, peer: &str) -> Result<ConversationId> {
        let (me, key) = self.authenticated("select a conversation")?;

        let peer = Identity::new(peer.trim());
        if peer.as_str().is_empty() {
            return Err(ImchatError::ValidationError {
                reason: "peer identity must not be empty".into(),
            });
        }

        let conversation = ConversationId::between(&me, &peer);

        // The previous loop must be dead before the view changes hands.
        self.stop_sync();

        let sync = self.engine.start(conversation.clone(), key).await;
        tracing::debug!(%conversation, "conversation selected");
        self.active = Some(ActiveConversation { peer, sync });

        Ok(conversation)
    }

    /// Stops syncing and clears the view.
    pub fn close_conversation(&mut self) {
        self.stop_sync();
        self.view.reset(None);
    }

    /// Runs a sync pass of the active conversation now.
    ///
    /// # Errors
    ///
    /// - [`ImchatError::InvalidState`] if no conversation is active.
    /// - [`ImchatError::StorageError`] if the log cannot be read.
    pub async fn refresh(&self) -> Result<SyncOutcome> {
        match &self.active {
            Some(active) => active.sync.refresh().await,
            None => Err(ImchatError::InvalidState {
                reason: "no conversation selected".into(),
            }),
        }
    }

    fn stop_sync(&mut self) {
        if let Some(active) = self.active.take() {
            active.sync.cancel();
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Encrypts `content`, appends it to the conversation with
    /// `recipient`, and echoes the plaintext into the view if that
    /// conversation is on screen.
    ///
    /// # Errors
    ///
    /// - [`ImchatError::InvalidState`] if not `Authenticated`.
    /// - [`ImchatError::ValidationError`] if `content` is blank or the
    ///   recipient is empty. Nothing is encrypted or written.
    /// - [`ImchatError::StorageError`] if the append fails. The view is
    ///   left untouched.
    pub async fn send_message(
        &mut self,
        recipient: &Identity,
        content: &str,
        kind: MessageKind,
    ) -> Result<ChatMessage> {
        let (me, key) = self.authenticated("send a message")?;

        if recipient.as_str().is_empty() {
            return Err(ImchatError::ValidationError {
                reason: "recipient must not be empty".into(),
            });
        }
        if content.trim().is_empty() {
            return Err(ImchatError::ValidationError {
                reason: format!("refusing to send an empty {kind} message"),
            });
        }

        let id = self.ids.next();
        let envelope = MessageEnvelope::seal(id, me.clone(), content, kind, id, &key)?;
        let conversation = ConversationId::between(&me, recipient);

        self.log.append(&conversation, envelope.clone()).await?;
        tracing::debug!(%conversation, id, %kind, "message appended");

        let echo = ChatMessage::local_echo(&envelope, content);
        self.view.push_local(&conversation, echo.clone());
        Ok(echo)
    }

    /// Sends `text` to the active conversation's peer.
    pub async fn send_text(&mut self, text: &str) -> Result<ChatMessage> {
        let peer = self.active_peer_required()?;
        self.send_message(&peer, text, MessageKind::Text).await
    }

    /// Sends a recorded clip to the active conversation's peer.
    pub async fn send_audio(&mut self, clip: &AudioClip) -> Result<ChatMessage> {
        let peer = self.active_peer_required()?;
        tracing::debug!(mime = %clip.mime_type, bytes = clip.data_base64.len(), "sending audio clip");
        self.send_message(&peer, &clip.data_base64, MessageKind::Audio)
            .await
    }

    fn active_peer_required(&self) -> Result<Identity> {
        self.active
            .as_ref()
            .map(|a| a.peer.clone())
            .ok_or_else(|| ImchatError::InvalidState {
                reason: "no conversation selected".into(),
            })
    }

    // -----------------------------------------------------------------------
    // Contacts
    // -----------------------------------------------------------------------

    /// Validates and stores a new contact. When authenticated, the new
    /// contact's conversation becomes active.
    ///
    /// # Errors
    ///
    /// - [`ImchatError::ValidationError`] if the address is malformed,
    ///   is the session's own identity, or is already a contact. The
    ///   contact list is unchanged.
    /// - [`ImchatError::StorageError`] if the list cannot be read or
    ///   written.
    pub async fn add_contact(&mut self, raw: &str) -> Result<Identity> {
        let existing = self.log.list_contacts().await?;
        let contact = validate_new_contact(raw, self.identity.as_ref(), &existing)?;

        self.log.add_contact(&contact).await?;
        tracing::info!(%contact, "contact added");
        self.reload_contacts().await?;

        if self.state == SessionState::Authenticated {
            self.select_conversation(contact.as_str()).await?;
        }

        Ok(contact)
    }

    /// Re-reads the contact list from the log and publishes it.
    pub async fn reload_contacts(&self) -> Result<Vec<Identity>> {
        let contacts = self.log.list_contacts().await?;
        self.contacts.send_if_modified(|current| {
            if *current == contacts {
                return false;
            }
            current.clone_from(&contacts);
            true
        });
        Ok(contacts)
    }

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    /// Replaces the authenticated identity's profile.
    ///
    /// # Errors
    ///
    /// [`ImchatError::InvalidState`] if not `Authenticated`;
    /// [`ImchatError::StorageError`] if the write fails.
    pub async fn update_profile(&mut self, profile: Profile) -> Result<()> {
        let (me, _key) = self.authenticated("update the profile")?;
        self.log.put_profile(&me, profile.clone()).await?;
        self.profile = Some(profile);
        Ok(())
    }

    /// Profile of any identity, or its placeholder if none was saved.
    pub async fn profile(&self, identity: &Identity) -> Result<Profile> {
        Ok(self.log.get_profile(identity).await?.unwrap_or_else(|| {
            Profile::placeholder(identity, &self.config.default_display_name_prefix)
        }))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Profile of the authenticated identity.
    pub fn own_profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn active_peer(&self) -> Option<&Identity> {
        self.active.as_ref().map(|a| &a.peer)
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref().map(|a| a.sync.conversation())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Receiver for the active conversation's message list.
    pub fn subscribe_messages(&self) -> watch::Receiver<ConversationView> {
        self.view.subscribe()
    }

    /// Current messages of the active conversation.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.view.snapshot().messages
    }

    /// Receiver for the contact list.
    pub fn subscribe_contacts(&self) -> watch::Receiver<Vec<Identity>> {
        self.contacts.subscribe()
    }

    pub fn contacts(&self) -> Vec<Identity> {
        self.contacts.borrow().clone()
    }

    // -----------------------------------------------------------------------
    // Guards
    // -----------------------------------------------------------------------

    fn require_state(&self, expected: SessionState, action: &str) -> Result<()> {
        if self.state != expected {
            return Err(ImchatError::InvalidState {
                reason: format!("cannot {action} while {}", self.state),
            });
        }
        Ok(())
    }

    fn authenticated(&self, action: &str) -> Result<(Identity, Arc<SessionKey>)> {
        match (&self.state, &self.identity, &self.key) {
            (SessionState::Authenticated, Some(identity), Some(key)) => {
                Ok((identity.clone(), Arc::clone(key)))
            }
            _ => Err(ImchatError::InvalidState {
                reason: format!("cannot {action} while {}", self.state),
            }),
        }
    }

    fn identity_str(&self) -> &str {
        self.identity.as_ref().map(Identity::as_str).unwrap_or_default()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state)
            .field("identity", &self.identity)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
