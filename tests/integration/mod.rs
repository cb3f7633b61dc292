// Integration tests for Price Watch
// These tests wire the real store, fetcher, scheduler and wizard together.
// Pages are served by a static renderer so no browser is needed.

pub mod product_lifecycle_tests;
pub mod scheduler_tests;
pub mod wizard_tests;

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use price_watch::{
    AppConfig,
    alerts::AlertDispatcher,
    bot::PriceBot,
    channel::MemoryChannel,
    config::{
        DatabaseConfig, FetcherConfig, MetricsConfig, NotificationsConfig, SchedulerConfig,
        SelectorsConfig, WizardConfig,
    },
    models::NewProduct,
    product_store::{ProductStore, SqliteProductStore},
    scheduler::PriceScheduler,
    scraper::{FetchTimeouts, PriceFetcher, StaticPageRenderer},
    selectors::SelectorRegistry,
    wizard::{OnboardingWizard, SessionRegistry},
};

pub const OWNER: &str = "alice";
pub const LAPTOP_URL: &str = "https://example.com/laptop";
pub const UNREACHABLE_URL: &str = "https://unreachable.invalid/item";

pub const SELECTORS: &str = r#"
[stores."example.com"]
price = ".price"
"#;

pub fn price_page(text: &str) -> String {
    format!(
        r#"<html><body><h1>Item</h1><span class="price">{}</span></body></html>"#,
        text
    )
}

/// Test configuration for integration tests
pub fn get_test_config() -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        scheduler: SchedulerConfig {
            interval_secs: 1800,
            max_concurrent_checks: 2,
        },
        fetcher: FetcherConfig {
            navigation_timeout_secs: 2,
            element_timeout_secs: 1,
            ..FetcherConfig::default()
        },
        wizard: WizardConfig {
            step_timeout_secs: 5,
        },
        notifications: NotificationsConfig::default(),
        selectors: SelectorsConfig {
            path: "config/selectors.toml".into(),
        },
        metrics: MetricsConfig {
            enabled: false,
            port: 9001,
        },
    }
}

/// Every component of a running instance, sharing one in-memory database.
#[derive(Clone)]
pub struct TestApp {
    pub store: Arc<SqliteProductStore>,
    pub channel: Arc<MemoryChannel>,
    pub renderer: Arc<StaticPageRenderer>,
    pub scheduler: PriceScheduler,
    pub wizard: OnboardingWizard,
    pub bot: PriceBot,
}

pub async fn create_test_app(renderer: StaticPageRenderer) -> anyhow::Result<TestApp> {
    create_test_app_with(renderer, Duration::from_secs(5)).await
}

pub async fn create_test_app_with(
    renderer: StaticPageRenderer,
    step_timeout: Duration,
) -> anyhow::Result<TestApp> {
    let config = get_test_config();
    config.validate()?;

    let store = Arc::new(
        SqliteProductStore::connect(&config.database.url, config.database.max_connections).await?,
    );
    let channel = Arc::new(MemoryChannel::new());
    let renderer = Arc::new(renderer);
    let fetcher = PriceFetcher::new(renderer.clone(), FetchTimeouts::from(&config.fetcher));
    let registry = Arc::new(SelectorRegistry::parse(SELECTORS)?);

    let scheduler = PriceScheduler::new(
        store.clone(),
        fetcher.clone(),
        AlertDispatcher::new(channel.clone()),
        &config.scheduler,
    );
    let wizard = OnboardingWizard::new(
        channel.clone(),
        store.clone(),
        registry,
        fetcher.clone(),
        SessionRegistry::new(),
        step_timeout,
    );
    let bot = PriceBot::new(store.clone(), fetcher, wizard.clone());

    Ok(TestApp {
        store,
        channel,
        renderer,
        scheduler,
        wizard,
        bot,
    })
}

pub async fn track(
    app: &TestApp,
    name: &str,
    url: &str,
    target: Option<Decimal>,
) -> anyhow::Result<()> {
    app.store
        .create(NewProduct {
            owner_id: OWNER.to_string(),
            store: "example.com".to_string(),
            product_name: name.to_string(),
            url: url.to_string(),
            price_selector: ".price".to_string(),
            target_price: target,
        })
        .await?;
    Ok(())
}

/// Price alerts delivered to `owner`, leaving out wizard prompts and replies.
pub fn alerts_to(app: &TestApp, owner: &str) -> Vec<String> {
    app.channel
        .messages_to(owner)
        .into_iter()
        .filter(|m| m.contains("Price Drop Alert"))
        .collect()
}

/// Helper to wait for async operations
pub async fn wait_for_condition<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
