use rust_decimal::Decimal;
use std::sync::Arc;

use crate::channel::MessageSink;
use crate::models::{format_price, Product};
use crate::price::meets_target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Price above target, or no target set.
    NotTriggered,
    Sent,
    /// Predicate held but the sink rejected the message. Never retried.
    DeliveryFailed,
}

/// Decides whether a fetched price warrants an alert and delivers it to the
/// product's owner.
///
/// There is no memory of earlier alerts: a product that stays at or below its
/// target alerts on every evaluation.
#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn MessageSink>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    pub fn should_alert(price: Decimal, target: Option<Decimal>) -> bool {
        meets_target(price, target)
    }

    pub async fn evaluate(&self, product: &Product, price: Decimal) -> AlertOutcome {
        if !Self::should_alert(price, product.target_price) {
            return AlertOutcome::NotTriggered;
        }

        let text = alert_text(product, price);
        match self.sink.send(&product.owner_id, &text).await {
            Ok(()) => {
                metrics::counter!("price_watch_alerts_total").increment(1);
                tracing::info!(
                    "Alert sent for '{}' of {}: {} <= {}",
                    product.product_name,
                    product.owner_id,
                    format_price(price),
                    product.target_display()
                );
                AlertOutcome::Sent
            }
            Err(e) => {
                metrics::counter!("price_watch_alert_failures_total").increment(1);
                tracing::error!("Failed to deliver alert for '{}' to {}: {}", product.product_name, product.owner_id, e);
                AlertOutcome::DeliveryFailed
            }
        }
    }
}

pub fn alert_text(product: &Product, price: Decimal) -> String {
    format!(
        "🔥 Price Drop Alert! 🔥\n{} is now {}!\nTarget Price: {}\nURL: {}",
        product.product_name,
        format_price(price),
        product.target_display(),
        product.url
    )
}
