use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::Url;
use validator::Validate;

use crate::models::generate_id;
use crate::utils::error::{AppError, Result};

/// A tracked item belonging to one owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub owner_id: String,
    pub store: String,
    pub product_name: String,
    pub url: String,

    // Copied from the selector registry when the product is created
    pub price_selector: String,
    pub target_price: Option<Decimal>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, message = "owner must not be empty"))]
    pub owner_id: String,
    #[validate(length(min = 1, message = "store must not be empty"))]
    pub store: String,
    #[validate(length(min = 1, max = 200, message = "product name must be 1-200 characters"))]
    pub product_name: String,
    #[validate(url(message = "url must be an absolute URL"))]
    pub url: String,
    #[validate(length(min = 1, message = "price selector must not be empty"))]
    pub price_selector: String,
    pub target_price: Option<Decimal>,
}

impl NewProduct {
    /// Field checks plus the rules the derive cannot express.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        parse_http_url(&self.url)?;
        if let Some(target) = self.target_price {
            ensure_non_negative(target)?;
        }
        Ok(())
    }
}

impl Product {
    pub fn new(new_product: NewProduct) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            owner_id: new_product.owner_id,
            store: new_product.store,
            product_name: new_product.product_name,
            url: new_product.url,
            price_selector: new_product.price_selector,
            target_price: new_product.target_price,
            created_at: now,
            updated_at: now,
        }
    }

    /// Target formatted for messages, e.g. `$20.00`.
    pub fn target_display(&self) -> String {
        match self.target_price {
            Some(target) => format_price(target),
            None => "not set".to_string(),
        }
    }
}

pub fn format_price(price: Decimal) -> String {
    format!("${:.2}", price)
}

/// Accepts only absolute `http`/`https` URLs with a host.
pub fn parse_http_url(input: &str) -> Result<Url> {
    let url = Url::parse(input.trim())
        .map_err(|_| AppError::Validation(format!("'{}' is not a valid URL", input.trim())))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(url),
        _ => Err(AppError::Validation(format!(
            "'{}' must be an absolute http or https URL",
            input.trim()
        ))),
    }
}

/// Parses a user-entered target price. A leading currency sign is tolerated.
pub fn parse_target_price(input: &str) -> Result<Decimal> {
    let cleaned = input.trim().trim_start_matches('$').trim();
    if cleaned.is_empty() {
        return Err(AppError::Validation("Please enter a price, e.g. 19.99".to_string()));
    }

    let value = Decimal::from_str(cleaned)
        .map_err(|_| AppError::Validation(format!("'{}' is not a valid price", input.trim())))?;
    ensure_non_negative(value)?;
    Ok(value.round_dp(2))
}

fn ensure_non_negative(value: Decimal) -> Result<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::Validation("Price must not be negative".to_string()));
    }
    Ok(())
}
