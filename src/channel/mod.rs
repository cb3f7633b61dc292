//! Conversation channel seams.
//!
//! `MessageSink` is the outbound half (alerts, prompts, replies) and
//! `ConversationChannel` adds waiting for an owner's next message, which the
//! onboarding wizard needs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::utils::error::Result;

pub mod console;
pub mod discord;
pub mod memory;

pub use console::ConsoleChannel;
pub use discord::DiscordWebhook;
pub use memory::{MemoryChannel, SentMessage};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Sends `text` to a channel or owner identity.
    async fn send(&self, target: &str, text: &str) -> Result<()>;
}

#[async_trait]
pub trait ConversationChannel: MessageSink {
    /// Next message from `owner_id`, or `None` once `deadline` passes.
    async fn await_next_message(&self, owner_id: &str, deadline: Instant) -> Option<String>;

    /// Drops queued messages from `owner_id` that no one has read yet.
    fn discard_pending(&self, owner_id: &str);
}

type Queue = (mpsc::UnboundedSender<String>, Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>);

/// Per-owner FIFO of inbound messages.
#[derive(Clone, Default)]
pub struct Inbox {
    queues: Arc<Mutex<HashMap<String, Queue>>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, owner_id: &str, text: impl Into<String>) {
        let sender = self.queue(owner_id).0;
        // The receiver lives in the same map entry, so the send cannot fail.
        let _ = sender.send(text.into());
    }

    pub async fn next(&self, owner_id: &str, deadline: Instant) -> Option<String> {
        let receiver = self.queue(owner_id).1;
        let mut receiver = tokio::time::timeout_at(deadline, receiver.lock()).await.ok()?;
        tokio::time::timeout_at(deadline, receiver.recv()).await.ok().flatten()
    }

    /// Drops anything the owner sent that nobody consumed.
    pub fn clear(&self, owner_id: &str) {
        if let Ok(mut queues) = self.queues.lock() {
            queues.remove(owner_id);
        }
    }

    fn queue(&self, owner_id: &str) -> Queue {
        let mut queues = self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (sender, receiver) = queues.entry(owner_id.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            (tx, Arc::new(tokio::sync::Mutex::new(rx)))
        });
        (sender.clone(), Arc::clone(receiver))
    }
}
