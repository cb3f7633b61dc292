use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;

use super::{ConversationChannel, Inbox, MessageSink};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub target: String,
    pub text: String,
}

/// In-process channel: outbound messages are recorded, inbound ones queued.
#[derive(Default)]
pub struct MemoryChannel {
    inbox: Inbox,
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message as if `owner_id` had typed it.
    pub fn push_reply(&self, owner_id: &str, text: impl Into<String>) {
        self.inbox.deliver(owner_id, text);
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Makes every subsequent `send` fail with a delivery error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn messages_to(&self, target: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| m.target == target)
            .map(|m| m.text)
            .collect()
    }

    pub fn last_message_to(&self, target: &str) -> Option<String> {
        self.messages_to(target).pop()
    }
}

#[async_trait]
impl MessageSink for MemoryChannel {
    async fn send(&self, target: &str, text: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Delivery(format!("channel '{}' is unavailable", target)));
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| AppError::Internal("memory channel lock poisoned".to_string()))?;
        sent.push(SentMessage {
            target: target.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl ConversationChannel for MemoryChannel {
    async fn await_next_message(&self, owner_id: &str, deadline: Instant) -> Option<String> {
        self.inbox.next(owner_id, deadline).await
    }

    fn discard_pending(&self, owner_id: &str) {
        self.inbox.clear(owner_id);
    }
}
