//! Observable conversation state.
//!
//! A [`MessageView`] wraps a `watch` channel over [`ConversationView`].
//! Every conversation switch bumps the view's `epoch`; a sync pass only
//! publishes into the epoch it started under, so a slow pass for the
//! previous conversation can never overwrite the new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use imchat_protocol::message::ChatMessage;
use imchat_types::ConversationId;
use tokio::sync::watch;

use crate::sync::SyncOutcome;

/// Snapshot of the active conversation as shown to the user.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConversationView {
    /// Incremented on every conversation switch or reset.
    pub epoch: u64,
    /// Active conversation, `None` when idle.
    pub conversation: Option<ConversationId>,
    /// Decrypted messages in log order.
    pub messages: Vec<ChatMessage>,
}

impl ConversationView {
    fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.messages.iter().map(|m| m.id)
    }
}

/// Shared handle on the observable conversation view.
#[derive(Clone, Debug)]
pub struct MessageView {
    tx: Arc<watch::Sender<ConversationView>>,
}

impl Default for MessageView {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageView {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConversationView::default());
        Self { tx: Arc::new(tx) }
    }

    /// New receiver for change notifications.
    pub fn subscribe(&self) -> watch::Receiver<ConversationView> {
        self.tx.subscribe()
    }

    /// Clone of the current view.
    pub fn snapshot(&self) -> ConversationView {
        self.tx.borrow().clone()
    }

    /// Clears messages, points the view at `conversation` and starts a
    /// new epoch. Returns that epoch.
    pub(crate) fn reset(&self, conversation: Option<ConversationId>) -> u64 {
        let mut epoch = 0;
        self.tx.send_modify(|view| {
            view.epoch = view.epoch.wrapping_add(1);
            view.conversation = conversation;
            view.messages.clear();
            epoch = view.epoch;
        });
        epoch
    }

    /// Replaces the message list if `epoch` is still current, the pass
    /// was not cancelled, and the id sequence changed.
    pub(crate) fn publish(
        &self,
        epoch: u64,
        messages: Vec<ChatMessage>,
        cancelled: &AtomicBool,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::Stale;
        self.tx.send_if_modified(|view| {
            if view.epoch != epoch || cancelled.load(Ordering::Acquire) {
                return false;
            }
            if view.ids().eq(messages.iter().map(|m| m.id)) {
                outcome = SyncOutcome::Unchanged;
                return false;
            }
            outcome = SyncOutcome::Replaced {
                count: messages.len(),
            };
            view.messages = messages;
            true
        });
        outcome
    }

    /// Appends a locally sent message if `conversation` is on screen.
    pub(crate) fn push_local(&self, conversation: &ConversationId, message: ChatMessage) -> bool {
        self.tx.send_if_modified(|view| {
            if view.conversation.as_ref() != Some(conversation) {
                return false;
            }
            view.messages.push(message);
            true
        })
    }
}
