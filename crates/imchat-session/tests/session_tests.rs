//! Integration tests for the session manager and sync engine.
//!
//! Two `SessionManager`s over clones of one `MemoryLog` stand in for two
//! clients sharing a store. Polling tests run on tokio's paused clock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use imchat_crypto::aead::UNDECRYPTABLE_TEXT;
use imchat_protocol::message::{AudioClip, MessageEnvelope};
use imchat_session::{SessionManager, StaticSigner, SyncOutcome};
use imchat_storage::{MemoryLog, MessageLog};
use imchat_types::config::AppConfig;
use imchat_types::{
    ConversationId, Identity, ImchatError, MessageKind, Profile, Result, SessionState,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const CAROL: &str = "0xcccccccccccccccccccccccccccccccccccccccc";
const SHARED_SIG: &str = "0xshared-signature";

type TestResult = std::result::Result<(), ImchatError>;

/// Memory log that can be switched into failing every operation.
#[derive(Clone, Default)]
struct FlakyLog {
    inner: MemoryLog,
    failing: Arc<AtomicBool>,
}

impl FlakyLog {
    fn set_failing(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ImchatError::StorageError {
                reason: "store unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageLog for FlakyLog {
    async fn append(&self, conversation: &ConversationId, envelope: MessageEnvelope) -> Result<()> {
        self.check()?;
        self.inner.append(conversation, envelope).await
    }

    async fn list(&self, conversation: &ConversationId) -> Result<Vec<MessageEnvelope>> {
        self.check()?;
        self.inner.list(conversation).await
    }

    async fn get_profile(&self, identity: &Identity) -> Result<Option<Profile>> {
        self.check()?;
        self.inner.get_profile(identity).await
    }

    async fn put_profile(&self, identity: &Identity, profile: Profile) -> Result<()> {
        self.check()?;
        self.inner.put_profile(identity, profile).await
    }

    async fn list_contacts(&self) -> Result<Vec<Identity>> {
        self.check()?;
        self.inner.list_contacts().await
    }

    async fn add_contact(&self, identity: &Identity) -> Result<()> {
        self.check()?;
        self.inner.add_contact(identity).await
    }
}

/// Memory log whose `list` takes `delay` of (paused) tokio time and
/// records how many reads were in flight at once.
#[derive(Clone)]
struct SlowLog {
    inner: MemoryLog,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl SlowLog {
    fn new(inner: MemoryLog, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Decrements the in-flight count even when the read is aborted.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageLog for SlowLog {
    async fn append(&self, conversation: &ConversationId, envelope: MessageEnvelope) -> Result<()> {
        self.inner.append(conversation, envelope).await
    }

    async fn list(&self, conversation: &ConversationId) -> Result<Vec<MessageEnvelope>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(Arc::clone(&self.in_flight));

        tokio::time::sleep(self.delay).await;
        self.inner.list(conversation).await
    }

    async fn get_profile(&self, identity: &Identity) -> Result<Option<Profile>> {
        self.inner.get_profile(identity).await
    }

    async fn put_profile(&self, identity: &Identity, profile: Profile) -> Result<()> {
        self.inner.put_profile(identity, profile).await
    }

    async fn list_contacts(&self) -> Result<Vec<Identity>> {
        self.inner.list_contacts().await
    }

    async fn add_contact(&self, identity: &Identity) -> Result<()> {
        self.inner.add_contact(identity).await
    }
}

async fn session_on(log: Arc<dyn MessageLog>) -> Result<SessionManager> {
    SessionManager::open(log, AppConfig::default()).await
}

async fn signed_in(log: &MemoryLog, identity: &str, signature: &str) -> Result<SessionManager> {
    let mut session = session_on(Arc::new(log.clone())).await?;
    session.authenticate(identity, signature).await?;
    Ok(session)
}

fn conv(a: &str, b: &str) -> ConversationId {
    ConversationId::between(&Identity::new(a), &Identity::new(b))
}

fn texts(session: &SessionManager) -> Vec<String> {
    session.messages().into_iter().map(|m| m.text).collect()
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hello_reaches_peer_through_shared_log() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    let mut bob = signed_in(&log, BOB, SHARED_SIG).await?;

    let id = alice.select_conversation(BOB).await?;
    assert_eq!(id.as_str(), format!("{ALICE}_{BOB}"));

    let echo = alice.send_text("hello").await?;
    assert_eq!(echo.text, "hello");
    assert_eq!(echo.sender.as_str(), ALICE);
    assert_eq!(texts(&alice), vec!["hello"]);

    let stored = log.list(&id).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, MessageKind::Text);
    assert_ne!(stored[0].content, "hello");
    assert_eq!(stored[0].id, echo.id);

    bob.select_conversation(ALICE).await?;
    assert_eq!(texts(&bob), vec!["hello"]);
    Ok(())
}

#[tokio::test]
async fn reconnect_with_other_signature_shows_sentinel() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, "0xfirst-signature").await?;
    alice.select_conversation(BOB).await?;
    alice.send_text("under the old key").await?;

    alice.disconnect();
    alice.authenticate(ALICE, "0xsecond-signature").await?;
    alice.select_conversation(BOB).await?;

    let messages = alice.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, UNDECRYPTABLE_TEXT);
    assert!(messages[0].is_undecryptable());

    // New messages under the new key sit next to the undecryptable one.
    alice.send_text("under the new key").await?;
    assert_eq!(texts(&alice), vec![UNDECRYPTABLE_TEXT, "under the new key"]);
    Ok(())
}

#[tokio::test]
async fn audio_clip_round_trips() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    let mut bob = signed_in(&log, BOB, SHARED_SIG).await?;

    alice.select_conversation(BOB).await?;
    let clip = AudioClip::new("GkXfo59ChoEBQveBAULygQRC84EIQoKEd2VibUKHgQRChYEC");
    assert_eq!(clip.mime_type, "audio/webm");
    alice.send_audio(&clip).await?;

    bob.select_conversation(ALICE).await?;
    let received = bob.messages();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].kind, MessageKind::Audio);
    assert_eq!(received[0].text, clip.data_base64);
    Ok(())
}

// ---------------------------------------------------------------------------
// Log and sync properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sends_append_in_order_without_touching_history() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    alice.select_conversation(BOB).await?;

    let mut snapshots = Vec::new();
    for i in 0..5 {
        alice.send_text(&format!("message {i}")).await?;
        snapshots.push(log.list(&conv(ALICE, BOB)).await?);
    }

    let final_log = log.list(&conv(ALICE, BOB)).await?;
    assert_eq!(final_log.len(), 5);
    for (n, snapshot) in snapshots.iter().enumerate() {
        assert_eq!(snapshot.len(), n + 1);
        assert_eq!(snapshot[..], final_log[..=n]);
    }
    assert!(final_log.windows(2).all(|w| w[0].id < w[1].id));

    let expected: Vec<String> = (0..5).map(|i| format!("message {i}")).collect();
    assert_eq!(texts(&alice), expected);
    Ok(())
}

#[tokio::test]
async fn repeated_pass_leaves_view_identical() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    alice.select_conversation(BOB).await?;
    alice.send_text("one").await?;
    alice.send_text("two").await?;

    // The local echo already matches the log.
    assert_eq!(alice.refresh().await?, SyncOutcome::Unchanged);
    let first = alice.messages();
    assert_eq!(alice.refresh().await?, SyncOutcome::Unchanged);
    assert_eq!(alice.messages(), first);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn polling_picks_up_foreign_appends() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    let mut bob = signed_in(&log, BOB, SHARED_SIG).await?;

    bob.select_conversation(ALICE).await?;
    let mut updates = bob.subscribe_messages();
    updates.borrow_and_update();

    alice.select_conversation(BOB).await?;
    alice.send_text("are you there?").await?;
    assert!(bob.messages().is_empty());

    tokio::time::sleep(Duration::from_millis(1_600)).await;

    assert!(updates.has_changed().unwrap_or(false));
    assert_eq!(texts(&bob), vec!["are you there?"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn switching_conversation_drops_old_view() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    let mut bob = signed_in(&log, BOB, SHARED_SIG).await?;

    alice.select_conversation(BOB).await?;
    alice.send_text("for bob").await?;

    alice.select_conversation(CAROL).await?;
    assert_eq!(alice.active_conversation(), Some(&conv(ALICE, CAROL)));
    assert!(alice.messages().is_empty());

    // Activity in the old conversation must not leak into the new view.
    bob.select_conversation(ALICE).await?;
    bob.send_text("reply to alice").await?;
    tokio::time::sleep(Duration::from_millis(5_000)).await;

    assert!(alice.messages().is_empty());
    assert_eq!(
        alice.subscribe_messages().borrow().conversation,
        Some(conv(ALICE, CAROL))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn no_pass_after_disconnect() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    let mut bob = signed_in(&log, BOB, SHARED_SIG).await?;

    alice.select_conversation(BOB).await?;
    alice.disconnect();
    let mut updates = alice.subscribe_messages();
    updates.borrow_and_update();

    bob.select_conversation(ALICE).await?;
    bob.send_text("late message").await?;
    tokio::time::sleep(Duration::from_millis(10_000)).await;

    assert!(!updates.has_changed().unwrap_or(true));
    assert!(alice.messages().is_empty());
    assert!(!alice.has_key());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn storage_failure_skips_cycle_then_recovers() -> TestResult {
    let flaky = FlakyLog::default();
    let shared: Arc<dyn MessageLog> = Arc::new(flaky.clone());
    let mut alice = session_on(Arc::clone(&shared)).await?;
    alice.authenticate(ALICE, SHARED_SIG).await?;
    alice.select_conversation(BOB).await?;
    alice.send_text("before outage").await?;

    flaky.set_failing(true);

    let failed_send = alice.send_text("during outage").await;
    assert!(matches!(failed_send, Err(ImchatError::StorageError { .. })));
    assert_eq!(texts(&alice), vec!["before outage"]);

    assert!(matches!(
        alice.refresh().await,
        Err(ImchatError::StorageError { .. })
    ));

    // Scheduled passes fail quietly and the loop keeps running.
    tokio::time::sleep(Duration::from_millis(4_000)).await;
    assert_eq!(texts(&alice), vec!["before outage"]);

    flaky.set_failing(false);
    let mut bob = session_on(Arc::clone(&shared)).await?;
    bob.authenticate(BOB, SHARED_SIG).await?;
    bob.select_conversation(ALICE).await?;
    bob.send_text("after outage").await?;

    tokio::time::sleep(Duration::from_millis(1_600)).await;
    assert_eq!(texts(&alice), vec!["before outage", "after outage"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_refreshes_never_overlap() -> TestResult {
    let slow = SlowLog::new(MemoryLog::new(), Duration::from_secs(3));
    let mut alice = session_on(Arc::new(slow.clone())).await?;
    alice.authenticate(ALICE, SHARED_SIG).await?;
    alice.select_conversation(BOB).await?;

    slow.peak.store(0, Ordering::SeqCst);
    let reads_before = slow.reads.load(Ordering::SeqCst);

    let (first, second) = tokio::join!(alice.refresh(), alice.refresh());
    first?;
    second?;

    assert!(slow.reads.load(Ordering::SeqCst) >= reads_before + 2);
    assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pass_in_flight_during_switch_is_discarded() -> TestResult {
    let log = MemoryLog::new();
    let mut bob = signed_in(&log, BOB, SHARED_SIG).await?;
    bob.select_conversation(ALICE).await?;
    bob.send_text("for alice").await?;

    let slow = SlowLog::new(log.clone(), Duration::from_secs(3));
    let mut alice = session_on(Arc::new(slow.clone())).await?;
    alice.authenticate(ALICE, SHARED_SIG).await?;
    alice.select_conversation(BOB).await?;
    assert_eq!(texts(&alice), vec!["for alice"]);

    // First scheduled tick fires at 1.5 s and then sits in `list` for 3 s.
    tokio::time::sleep(Duration::from_millis(1_600)).await;
    assert_eq!(slow.in_flight.load(Ordering::SeqCst), 1);

    alice.select_conversation(CAROL).await?;
    assert!(alice.messages().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;

    let view = alice.subscribe_messages().borrow().clone();
    assert_eq!(view.conversation, Some(conv(ALICE, CAROL)));
    assert!(view.messages.is_empty());
    Ok(())
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_through_signer() -> TestResult {
    let log = MemoryLog::new();
    let mut session = session_on(Arc::new(log.clone())).await?;
    assert_eq!(session.state(), SessionState::Disconnected);

    session
        .connect(&StaticSigner::new(ALICE.to_uppercase().replacen("0X", "0x", 1), SHARED_SIG))
        .await?;
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.identity(), Some(&Identity::new(ALICE)));
    assert!(session.has_key());
    Ok(())
}

#[tokio::test]
async fn rejected_signature_stays_disconnected() -> TestResult {
    let mut session = session_on(Arc::new(MemoryLog::new())).await?;
    let result = session.connect(&StaticSigner::rejecting(ALICE)).await;
    assert!(matches!(result, Err(ImchatError::AuthenticationError { .. })));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.has_key());

    let empty = session.authenticate(ALICE, "  ").await;
    assert!(matches!(empty, Err(ImchatError::AuthenticationError { .. })));
    assert_eq!(session.state(), SessionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn double_authenticate_is_invalid_state() -> TestResult {
    let log = MemoryLog::new();
    let mut session = signed_in(&log, ALICE, SHARED_SIG).await?;
    let again = session.authenticate(ALICE, SHARED_SIG).await;
    assert!(matches!(again, Err(ImchatError::InvalidState { .. })));
    assert_eq!(session.state(), SessionState::Authenticated);
    Ok(())
}

#[tokio::test]
async fn disconnect_clears_key_and_view() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    alice.select_conversation(BOB).await?;
    alice.send_text("secret").await?;

    alice.disconnect();
    assert_eq!(alice.state(), SessionState::Disconnected);
    assert!(!alice.has_key());
    assert!(alice.identity().is_none());
    assert!(alice.own_profile().is_none());
    assert!(alice.active_conversation().is_none());
    assert!(alice.messages().is_empty());

    let send = alice.send_message(&Identity::new(BOB), "x", MessageKind::Text).await;
    assert!(matches!(send, Err(ImchatError::InvalidState { .. })));
    Ok(())
}

#[tokio::test]
async fn identity_change_forces_disconnect() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;

    let alice_upper = ALICE.to_uppercase().replacen("0X", "0x", 1);
    assert!(!alice.on_identity_changed(Some(alice_upper.as_str())));
    assert_eq!(alice.state(), SessionState::Authenticated);

    assert!(alice.on_identity_changed(Some(BOB)));
    assert_eq!(alice.state(), SessionState::Disconnected);

    alice.authenticate(ALICE, SHARED_SIG).await?;
    assert!(alice.on_identity_changed(None));
    assert_eq!(alice.state(), SessionState::Disconnected);

    // Already disconnected: nothing to do.
    assert!(!alice.on_identity_changed(None));
    Ok(())
}

#[tokio::test]
async fn blank_text_is_rejected_before_any_write() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    alice.select_conversation(BOB).await?;

    let result = alice.send_text(" \n\t ").await;
    assert!(matches!(result, Err(ImchatError::ValidationError { .. })));
    assert!(log.list(&conv(ALICE, BOB)).await?.is_empty());
    assert!(alice.messages().is_empty());
    Ok(())
}

#[tokio::test]
async fn send_text_requires_selected_conversation() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    let result = alice.send_text("hi").await;
    assert!(matches!(result, Err(ImchatError::InvalidState { .. })));
    Ok(())
}

// ---------------------------------------------------------------------------
// Contacts and profiles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_contact_leaves_list_unchanged() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    alice.add_contact(BOB).await?;
    let before = alice.contacts();

    let bob_upper = BOB.to_uppercase().replacen("0X", "0x", 1);
    for bad in ["not-an-address", ALICE, BOB, bob_upper.as_str()] {
        let result = alice.add_contact(bad).await;
        assert!(
            matches!(result, Err(ImchatError::ValidationError { .. })),
            "accepted {bad}"
        );
    }

    assert_eq!(alice.contacts(), before);
    assert_eq!(log.list_contacts().await?, before);
    Ok(())
}

#[tokio::test]
async fn added_contact_becomes_active_conversation() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    let mut contacts = alice.subscribe_contacts();

    let added = alice.add_contact(&CAROL.to_uppercase().replacen("0X", "0x", 1)).await?;
    assert_eq!(added, Identity::new(CAROL));
    assert_eq!(alice.active_peer(), Some(&added));
    assert!(contacts.has_changed().unwrap_or(false));
    assert_eq!(*contacts.borrow_and_update(), vec![added]);
    Ok(())
}

#[tokio::test]
async fn profiles_default_and_update() -> TestResult {
    let log = MemoryLog::new();
    let mut alice = signed_in(&log, ALICE, SHARED_SIG).await?;

    let placeholder = Profile {
        name: "User 0xaaaa".into(),
        avatar: String::new(),
    };
    assert_eq!(alice.own_profile(), Some(&placeholder));
    assert_eq!(log.get_profile(&Identity::new(ALICE)).await?, Some(placeholder));

    let updated = Profile {
        name: "Alice".into(),
        avatar: "data:image/png;base64,AAAA".into(),
    };
    alice.update_profile(updated.clone()).await?;
    assert_eq!(alice.own_profile(), Some(&updated));

    let bob = signed_in(&log, BOB, SHARED_SIG).await?;
    assert_eq!(bob.profile(&Identity::new(ALICE)).await?, updated);
    assert_eq!(bob.profile(&Identity::new(CAROL)).await?.name, "User 0xcccc");
    Ok(())
}

#[tokio::test]
async fn existing_profile_survives_login() -> TestResult {
    let log = MemoryLog::new();
    let saved = Profile {
        name: "Returning".into(),
        avatar: String::new(),
    };
    log.put_profile(&Identity::new(ALICE), saved.clone()).await?;

    let alice = signed_in(&log, ALICE, SHARED_SIG).await?;
    assert_eq!(alice.own_profile(), Some(&saved));
    Ok(())
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let config = AppConfig {
        poll_interval_ms: 0,
        ..AppConfig::default()
    };
    let result = SessionManager::open(Arc::new(MemoryLog::new()), config).await;
    assert!(matches!(result, Err(ImchatError::ConfigError { .. })));
}
