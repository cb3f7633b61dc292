//! Guided product setup.
//!
//! The dialogue itself is the pure state machine in [`state`]; this module
//! drives it against a conversation channel, the price fetcher and the
//! product store.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::channel::ConversationChannel;
use crate::models::Product;
use crate::product_store::ProductStore;
use crate::scraper::PriceFetcher;
use crate::selectors::SelectorRegistry;
use crate::utils::error::Result;

pub mod session;
pub mod state;

pub use session::{SessionGuard, SessionRegistry};
pub use state::{PendingProduct, StoreChoice, Transition, WizardEvent, WizardState};

#[derive(Debug, Clone, PartialEq)]
pub enum WizardOutcome {
    Completed(Product),
    Cancelled,
    Failed(String),
}

#[derive(Clone)]
pub struct OnboardingWizard {
    channel: Arc<dyn ConversationChannel>,
    store: Arc<dyn ProductStore>,
    registry: Arc<SelectorRegistry>,
    fetcher: PriceFetcher,
    sessions: SessionRegistry,
    step_timeout: Duration,
}

impl OnboardingWizard {
    pub fn new(
        channel: Arc<dyn ConversationChannel>,
        store: Arc<dyn ProductStore>,
        registry: Arc<SelectorRegistry>,
        fetcher: PriceFetcher,
        sessions: SessionRegistry,
        step_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            store,
            registry,
            fetcher,
            sessions,
            step_timeout,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Claims the owner's session. Fails immediately when one is already active.
    pub fn begin(&self, owner_id: &str) -> Result<SessionGuard> {
        self.sessions.try_begin(owner_id)
    }

    /// Runs a whole dialogue for `owner_id`.
    pub async fn run(&self, owner_id: &str) -> Result<WizardOutcome> {
        let guard = self.begin(owner_id)?;
        Ok(self.drive(guard).await)
    }

    /// Drives a session claimed with [`begin`](Self::begin) to a terminal state.
    /// The session is released when this returns, whatever the outcome, and
    /// anything the owner sent that the session never read is discarded.
    pub async fn drive(&self, guard: SessionGuard) -> WizardOutcome {
        let owner_id = guard.owner_id().to_string();
        tracing::info!("Starting product setup for {}", owner_id);

        let mut state = WizardState::Store;
        self.announce(&owner_id, &state).await;
        let mut deadline = Instant::now() + self.step_timeout;

        while !state.is_terminal() {
            let event = self.next_event(&owner_id, &state, deadline).await;

            state = match state.on_event(event, &self.registry) {
                Transition::Advance(next) => {
                    self.announce(&owner_id, &next).await;
                    deadline = Instant::now() + self.step_timeout;
                    next
                }
                Transition::Rejected { state, reason } => {
                    // The step keeps its original deadline
                    let prompt = state.prompt().unwrap_or_default();
                    self.say(&owner_id, &format!("{}\n{}", reason, prompt)).await;
                    state
                }
                Transition::Ignored(state) => state,
            };
        }

        let outcome = match state {
            WizardState::Complete { product, .. } => WizardOutcome::Completed(product),
            WizardState::Failed(reason) => WizardOutcome::Failed(reason),
            _ => WizardOutcome::Cancelled,
        };

        match &outcome {
            WizardOutcome::Completed(product) => {
                tracing::info!("{} is now tracking '{}'", owner_id, product.product_name)
            }
            WizardOutcome::Cancelled => tracing::info!("Product setup for {} cancelled", owner_id),
            WizardOutcome::Failed(reason) => tracing::warn!("Product setup for {} failed: {}", owner_id, reason),
        }

        drop(guard);
        // Lines typed while fetching or saving belong to this session only
        self.channel.discard_pending(&owner_id);
        outcome
    }

    async fn next_event(&self, owner_id: &str, state: &WizardState, deadline: Instant) -> WizardEvent {
        match state {
            WizardState::Fetching(pending) => {
                let result = self.fetcher.fetch(&pending.url, Some(&pending.store.price_selector)).await;
                WizardEvent::Fetched(result)
            }
            WizardState::Saving { pending, .. } => {
                WizardEvent::Saved(self.store.create(pending.to_new_product(owner_id)).await)
            }
            _ => match self.channel.await_next_message(owner_id, deadline).await {
                Some(text) => WizardEvent::Reply(text),
                None => WizardEvent::TimedOut,
            },
        }
    }

    async fn announce(&self, owner_id: &str, state: &WizardState) {
        if let Some(prompt) = state.prompt() {
            self.say(owner_id, &prompt).await;
        }
    }

    async fn say(&self, owner_id: &str, text: &str) {
        if let Err(e) = self.channel.send(owner_id, text).await {
            tracing::error!("Could not message {} during product setup: {}", owner_id, e);
        }
    }
}
