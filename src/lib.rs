pub mod alerts;
pub mod bot;
pub mod channel;
pub mod config;
pub mod models;
pub mod price;
pub mod product_store;
pub mod scheduler;
pub mod scraper;
pub mod selectors;
pub mod utils;
pub mod wizard;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
