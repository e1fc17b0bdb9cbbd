//! Polling sync of the active conversation.
//!
//! [`SyncEngine::start`] points the view at a conversation, runs one
//! pass inline, then spawns a tokio interval loop that repeats the pass
//! every poll interval. A pass is read, decrypt, compare:
//!
//! 1. List the conversation's envelopes from the [`MessageLog`].
//! 2. Open each one under the session key. Envelopes that fail keep
//!    their slot with the sentinel text.
//! 3. Publish only if the id sequence differs from what is shown.
//!
//! Passes for one conversation are serialized by a per-handle gate.
//! Cancelling a [`SyncHandle`] (or dropping it) stops the loop, and no
//! pass publishes after cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use imchat_crypto::kdf::SessionKey;
use imchat_protocol::message::ChatMessage;
use imchat_storage::MessageLog;
use imchat_types::{ConversationId, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::view::MessageView;

// ---------------------------------------------------------------------------
// SyncOutcome
// ---------------------------------------------------------------------------

/// What a single pass did to the view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncOutcome {
    /// The id sequence changed; the view now holds `count` messages.
    Replaced { count: usize },
    /// Same ids as already shown; nothing published.
    Unchanged,
    /// The pass was cancelled or the view moved to another conversation.
    Stale,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replaced { count } => write!(f, "replaced ({count} messages)"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

// ---------------------------------------------------------------------------
// SyncTask (internal)
// ---------------------------------------------------------------------------

/// State shared by the interval loop and on-demand refreshes.
struct SyncTask {
    log: Arc<dyn MessageLog>,
    view: MessageView,
    conversation: ConversationId,
    key: Arc<SessionKey>,
    epoch: u64,
    gate: Mutex<()>,
    cancelled: AtomicBool,
}

impl SyncTask {
    async fn pass(&self) -> Result<SyncOutcome> {
        let _gate = self.gate.lock().await;

        if self.cancelled.load(Ordering::Acquire) {
            return Ok(SyncOutcome::Stale);
        }

        let envelopes = self.log.list(&self.conversation).await?;
        let messages: Vec<ChatMessage> = envelopes.iter().map(|e| e.open(&self.key)).collect();

        let undecryptable = messages.iter().filter(|m| m.is_undecryptable()).count();

        let outcome = self.view.publish(self.epoch, messages, &self.cancelled);

        if let SyncOutcome::Replaced { count } = outcome {
            if undecryptable > 0 {
                tracing::warn!(
                    conversation = %self.conversation,
                    undecryptable,
                    total = count,
                    "some envelopes did not decrypt under the session key"
                );
            }
        }

        tracing::debug!(conversation = %self.conversation, %outcome, "sync pass");
        Ok(outcome)
    }

    async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if self.cancelled.load(Ordering::Acquire) {
                break;
            }

            if let Err(e) = self.pass().await {
                tracing::warn!(
                    conversation = %self.conversation,
                    %e,
                    "sync pass failed, retrying on next tick"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SyncHandle
// ---------------------------------------------------------------------------

/// Lifecycle handle for one conversation's sync loop.
///
/// Dropping the handle cancels the loop.
pub struct SyncHandle {
    task: Arc<SyncTask>,
    join: JoinHandle<()>,
}

impl SyncHandle {
    /// Conversation this handle syncs.
    pub fn conversation(&self) -> &ConversationId {
        &self.task.conversation
    }

    /// Runs a pass now, queued behind any pass already in flight.
    ///
    /// Unlike scheduled passes, storage errors are returned to the caller.
    pub async fn refresh(&self) -> Result<SyncOutcome> {
        self.task.pass().await
    }

    /// Stops the loop. Idempotent. After this returns no pass of this
    /// handle can change the view.
    pub fn cancel(&self) {
        if !self.task.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!(conversation = %self.task.conversation, "sync cancelled");
        }
        self.join.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHandle")
            .field("conversation", &self.task.conversation)
            .field("epoch", &self.task.epoch)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SyncEngine
// ---------------------------------------------------------------------------

/// Starts sync loops for conversations, publishing into one view.
#[derive(Clone)]
pub struct SyncEngine {
    log: Arc<dyn MessageLog>,
    view: MessageView,
    interval: Duration,
}

impl SyncEngine {
    pub fn new(log: Arc<dyn MessageLog>, view: MessageView, interval: Duration) -> Self {
        Self {
            log,
            view,
            interval,
        }
    }

    /// Switches the view to `conversation` and starts syncing it.
    ///
    /// Callers must cancel the previous handle first. The first pass
    /// has completed (or been skipped on a storage error) by the time
    /// this returns. Must be called within a tokio runtime.
    pub async fn start(&self, conversation: ConversationId, key: Arc<SessionKey>) -> SyncHandle {
        let epoch = self.view.reset(Some(conversation.clone()));

        let task = Arc::new(SyncTask {
            log: Arc::clone(&self.log),
            view: self.view.clone(),
            conversation,
            key,
            epoch,
            gate: Mutex::new(()),
            cancelled: AtomicBool::new(false),
        });

        if let Err(e) = task.pass().await {
            tracing::warn!(
                conversation = %task.conversation,
                %e,
                "initial sync pass failed, retrying on next tick"
            );
        }

        let join = tokio::spawn(Arc::clone(&task).run(self.interval));

        SyncHandle { task, join }
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
