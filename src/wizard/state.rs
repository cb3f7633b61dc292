use rust_decimal::Decimal;

use crate::models::{format_price, parse_http_url, parse_target_price, NewProduct, Product};
use crate::scraper::FetchResult;
use crate::selectors::{normalize_store, SelectorRegistry};
use crate::utils::error::{AppError, Result};

const CANCEL_WORD: &str = "cancel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChoice {
    pub store: String,
    pub price_selector: String,
}

/// Everything the owner has answered, ready to fetch and persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProduct {
    pub store: StoreChoice,
    pub product_name: String,
    pub url: String,
    pub target_price: Decimal,
}

impl PendingProduct {
    pub fn to_new_product(&self, owner_id: &str) -> NewProduct {
        NewProduct {
            owner_id: owner_id.to_string(),
            store: self.store.store.clone(),
            product_name: self.product_name.clone(),
            url: self.url.clone(),
            price_selector: self.store.price_selector.clone(),
            target_price: Some(self.target_price),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WizardState {
    Store,
    Name {
        store: StoreChoice,
    },
    Url {
        store: StoreChoice,
        product_name: String,
    },
    Target {
        store: StoreChoice,
        product_name: String,
        url: String,
    },
    Fetching(PendingProduct),
    Saving {
        pending: PendingProduct,
        price: Decimal,
    },
    Complete {
        product: Product,
        price: Decimal,
    },
    Cancelled,
    Failed(String),
}

#[derive(Debug)]
pub enum WizardEvent {
    Reply(String),
    TimedOut,
    Fetched(FetchResult),
    Saved(Result<Product>),
}

#[derive(Debug, PartialEq)]
pub enum Transition {
    Advance(WizardState),
    /// The reply was not acceptable; the state is unchanged.
    Rejected { state: WizardState, reason: String },
    /// The event does not apply to this state.
    Ignored(WizardState),
}

impl Transition {
    pub fn into_state(self) -> WizardState {
        match self {
            Transition::Advance(state) | Transition::Ignored(state) => state,
            Transition::Rejected { state, .. } => state,
        }
    }
}

impl WizardState {
    pub fn awaits_reply(&self) -> bool {
        matches!(
            self,
            WizardState::Store | WizardState::Name { .. } | WizardState::Url { .. } | WizardState::Target { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WizardState::Complete { .. } | WizardState::Cancelled | WizardState::Failed(_))
    }

    /// Message shown on entering this state.
    pub fn prompt(&self) -> Option<String> {
        match self {
            WizardState::Store => Some("Which store is the product from? (e.g. example.com)".to_string()),
            WizardState::Name { .. } => Some("What should I call this product?".to_string()),
            WizardState::Url { .. } => Some("Paste the product's URL.".to_string()),
            WizardState::Target { .. } => Some("What is your target price? (e.g. 19.99)".to_string()),
            WizardState::Fetching(pending) => Some(format!("Fetching the current price of '{}'...", pending.product_name)),
            WizardState::Saving { .. } => None,
            WizardState::Complete { product, price } => Some(format!(
                "Now tracking '{}' from {}. Current price: {}, target: {}.",
                product.product_name,
                product.store,
                format_price(*price),
                product.target_display()
            )),
            WizardState::Cancelled => Some("Product setup cancelled. Nothing was saved.".to_string()),
            WizardState::Failed(reason) => Some(format!("Product setup failed: {}", reason)),
        }
    }

    pub fn on_event(self, event: WizardEvent, registry: &SelectorRegistry) -> Transition {
        match event {
            WizardEvent::TimedOut if self.awaits_reply() => Transition::Advance(WizardState::Cancelled),
            WizardEvent::Reply(text) if self.awaits_reply() => {
                if text.trim().eq_ignore_ascii_case(CANCEL_WORD) {
                    return Transition::Advance(WizardState::Cancelled);
                }
                self.on_reply(&text, registry)
            }
            WizardEvent::Fetched(result) => match self {
                WizardState::Fetching(pending) => match result {
                    FetchResult::Price(price) => Transition::Advance(WizardState::Saving { pending, price }),
                    FetchResult::Unavailable(reason) => Transition::Advance(WizardState::Failed(format!(
                        "could not fetch the price for '{}' ({})",
                        pending.product_name, reason
                    ))),
                },
                other => Transition::Ignored(other),
            },
            WizardEvent::Saved(saved) => match self {
                WizardState::Saving { pending, price } => match saved {
                    Ok(product) => Transition::Advance(WizardState::Complete { product, price }),
                    Err(AppError::Duplicate { .. }) => Transition::Advance(WizardState::Failed(format!(
                        "you already track a product named '{}'",
                        pending.product_name
                    ))),
                    Err(e) if e.is_user_facing() => Transition::Advance(WizardState::Failed(e.to_string())),
                    Err(_) => Transition::Advance(WizardState::Failed("the product could not be saved".to_string())),
                },
                other => Transition::Ignored(other),
            },
            WizardEvent::TimedOut | WizardEvent::Reply(_) => Transition::Ignored(self),
        }
    }

    /// Names are kept exactly as typed; every other answer is trimmed first.
    fn on_reply(self, raw: &str, registry: &SelectorRegistry) -> Transition {
        let text = raw.trim();
        match self {
            WizardState::Store => match registry.lookup(text) {
                Ok(entry) => Transition::Advance(WizardState::Name {
                    store: StoreChoice {
                        store: normalize_store(text),
                        price_selector: entry.price.clone(),
                    },
                }),
                Err(_) => {
                    let known: Vec<&str> = registry.stores().collect();
                    let reason = if known.is_empty() {
                        format!("I don't know how to read prices from '{}'.", text)
                    } else {
                        format!(
                            "I don't know how to read prices from '{}'. Supported stores: {}",
                            text,
                            known.join(", ")
                        )
                    };
                    Transition::Rejected { state: WizardState::Store, reason }
                }
            },
            WizardState::Name { store } => {
                if text.is_empty() {
                    return Transition::Rejected {
                        state: WizardState::Name { store },
                        reason: "The name cannot be empty.".to_string(),
                    };
                }
                Transition::Advance(WizardState::Url {
                    store,
                    product_name: raw.to_string(),
                })
            }
            WizardState::Url { store, product_name } => match parse_http_url(text) {
                Ok(_) => Transition::Advance(WizardState::Target {
                    store,
                    product_name,
                    url: text.to_string(),
                }),
                Err(e) => Transition::Rejected {
                    state: WizardState::Url { store, product_name },
                    reason: user_reason(e),
                },
            },
            WizardState::Target {
                store,
                product_name,
                url,
            } => match parse_target_price(text) {
                Ok(target_price) => Transition::Advance(WizardState::Fetching(PendingProduct {
                    store,
                    product_name,
                    url,
                    target_price,
                })),
                Err(e) => Transition::Rejected {
                    state: WizardState::Target {
                        store,
                        product_name,
                        url,
                    },
                    reason: user_reason(e),
                },
            },
            other => Transition::Ignored(other),
        }
    }
}

fn user_reason(err: AppError) -> String {
    match err {
        AppError::Validation(message) => message,
        other => other.to_string(),
    }
}
