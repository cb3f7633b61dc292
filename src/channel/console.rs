use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{ConversationChannel, Inbox, MessageSink};
use crate::utils::error::Result;

/// Terminal channel for the console binary.
///
/// Output goes to stdout. Input is read by the binary's command loop, which
/// hands lines to [`ConsoleChannel::deliver`] while a wizard is waiting.
pub struct ConsoleChannel {
    inbox: Inbox,
    stdout: Mutex<Stdout>,
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self {
            inbox: Inbox::new(),
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }

    pub fn deliver(&self, owner_id: &str, line: impl Into<String>) {
        self.inbox.deliver(owner_id, line);
    }
}

#[async_trait]
impl MessageSink for ConsoleChannel {
    async fn send(&self, target: &str, text: &str) -> Result<()> {
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(format!("[{}] {}\n", target, text).as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationChannel for ConsoleChannel {
    async fn await_next_message(&self, owner_id: &str, deadline: Instant) -> Option<String> {
        self.inbox.next(owner_id, deadline).await
    }

    fn discard_pending(&self, owner_id: &str) {
        self.inbox.clear(owner_id);
    }
}
