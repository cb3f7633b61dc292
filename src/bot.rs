use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::models::{format_price, parse_target_price, Product};
use crate::product_store::ProductStore;
use crate::scraper::{FetchResult, PriceFetcher};
use crate::utils::error::{AppError, Result};
use crate::wizard::{OnboardingWizard, WizardOutcome};

pub const HELP_TEXT: &str = "Commands:
  track                          set up a new product
  check <name>                   fetch the current price now
  list                           show your tracked products
  target <name> <price|none>     change or clear a target price
  remove <name>                  stop tracking a product
  help                           show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Track,
    Check(String),
    List,
    Target { name: String, target: Option<Decimal> },
    Remove(String),
    Help,
}

impl Command {
    /// Parses one line of owner input. A leading `!` is accepted.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim().trim_start_matches('!');
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_lowercase().as_str() {
            "track" | "add" => Ok(Command::Track),
            "check" => Ok(Command::Check(required_name(rest, "check <name>")?)),
            "list" => Ok(Command::List),
            "remove" | "delete" => Ok(Command::Remove(required_name(rest, "remove <name>")?)),
            "target" => {
                let usage = || AppError::Validation("Usage: target <name> <price|none>".to_string());
                let (name, value) = rest.rsplit_once(char::is_whitespace).ok_or_else(usage)?;
                let name = required_name(name, "target <name> <price|none>")?;
                let target = match value.trim().to_lowercase().as_str() {
                    "none" | "clear" => None,
                    other => Some(parse_target_price(other)?),
                };
                Ok(Command::Target { name, target })
            }
            "help" | "" => Ok(Command::Help),
            other => Err(AppError::Validation(format!(
                "Unknown command '{}'. Type 'help' for a list of commands.",
                other
            ))),
        }
    }
}

fn required_name(rest: &str, usage: &str) -> Result<String> {
    let name = rest.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("Usage: {}", usage)));
    }
    Ok(name.to_string())
}

/// Owner-facing operations behind the conversation surface.
#[derive(Clone)]
pub struct PriceBot {
    store: Arc<dyn ProductStore>,
    fetcher: PriceFetcher,
    wizard: OnboardingWizard,
}

impl PriceBot {
    pub fn new(store: Arc<dyn ProductStore>, fetcher: PriceFetcher, wizard: OnboardingWizard) -> Self {
        Self { store, fetcher, wizard }
    }

    /// Fetches the current price of one of the owner's products.
    pub async fn check(&self, owner_id: &str, product_name: &str) -> Result<(Product, Decimal)> {
        let product = self.store.get(owner_id, product_name).await?;
        match self.fetcher.fetch(&product.url, Some(&product.price_selector)).await {
            FetchResult::Price(price) => Ok((product, price)),
            FetchResult::Unavailable(reason) => {
                tracing::warn!("Manual check of '{}' for {} failed: {}", product_name, owner_id, reason);
                Err(AppError::FetchUnavailable(reason))
            }
        }
    }

    pub async fn check_price(&self, owner_id: &str, product_name: &str) -> Result<String> {
        match self.check(owner_id, product_name).await {
            Ok((product, price)) => Ok(format!(
                "{}\nCurrent Price: {}\nTarget Price: {}\nURL: {}",
                product.product_name,
                format_price(price),
                product.target_display(),
                product.url
            )),
            Err(AppError::FetchUnavailable(_)) => {
                Ok(format!("Could not fetch the price for '{}'.", product_name))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self, owner_id: &str) -> Result<String> {
        let products = self.store.list(owner_id).await?;
        if products.is_empty() {
            return Ok("You are not tracking any products yet. Type 'track' to add one.".to_string());
        }

        let lines: Vec<String> = products
            .iter()
            .map(|p| format!("- {} ({}) target {} {}", p.product_name, p.store, p.target_display(), p.url))
            .collect();
        Ok(format!("Tracked products:\n{}", lines.join("\n")))
    }

    pub async fn set_target(&self, owner_id: &str, product_name: &str, target: Option<Decimal>) -> Result<String> {
        let product = self.store.update_target(owner_id, product_name, target).await?;
        Ok(match product.target_price {
            Some(target) => format!("Target for '{}' set to {}.", product.product_name, format_price(target)),
            None => format!("Target for '{}' cleared.", product.product_name),
        })
    }

    pub async fn remove(&self, owner_id: &str, product_name: &str) -> Result<String> {
        self.store.delete(owner_id, product_name).await?;
        tracing::info!("{} stopped tracking '{}'", owner_id, product_name);
        Ok(format!("Stopped tracking '{}'.", product_name))
    }

    /// Starts a wizard in the background. Rejected when the owner already has one.
    pub fn start_wizard(&self, owner_id: &str) -> Result<JoinHandle<WizardOutcome>> {
        let guard = self.wizard.begin(owner_id)?;
        let wizard = self.wizard.clone();
        Ok(tokio::spawn(async move { wizard.drive(guard).await }))
    }

    pub fn is_wizard_active(&self, owner_id: &str) -> bool {
        self.wizard.sessions().is_active(owner_id)
    }

    /// Runs a parsed command and returns the reply for the owner, if any.
    pub async fn handle(&self, owner_id: &str, command: Command) -> Option<String> {
        let (result, product_name) = match &command {
            Command::Track => {
                return match self.start_wizard(owner_id) {
                    Ok(_) => None,
                    Err(e) => Some(e.to_string()),
                };
            }
            Command::Help => return Some(HELP_TEXT.to_string()),
            Command::List => (self.list(owner_id).await, None),
            Command::Check(name) => (self.check_price(owner_id, name).await, Some(name)),
            Command::Target { name, target } => (self.set_target(owner_id, name, *target).await, Some(name)),
            Command::Remove(name) => (self.remove(owner_id, name).await, Some(name)),
        };

        Some(match result {
            Ok(reply) => reply,
            Err(AppError::NotFound { .. }) if product_name.is_some() => {
                format!("Product '{}' not found.", product_name.map(String::as_str).unwrap_or_default())
            }
            Err(e) if e.is_user_facing() => e.to_string(),
            Err(e) => {
                tracing::error!("Command {:?} from {} failed: {}", command, owner_id, e);
                "Something went wrong, please try again.".to_string()
            }
        })
    }
}
