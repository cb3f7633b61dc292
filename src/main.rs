use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use price_watch::alerts::AlertDispatcher;
use price_watch::bot::{Command, PriceBot, HELP_TEXT};
use price_watch::channel::{ConsoleChannel, DiscordWebhook, MessageSink};
use price_watch::product_store::SqliteProductStore;
use price_watch::scheduler::PriceScheduler;
use price_watch::scraper::PriceFetcher;
use price_watch::selectors::SelectorRegistry;
use price_watch::wizard::{OnboardingWizard, SessionRegistry};
use price_watch::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "price-watch", version, about = "Watch product prices and get alerted when they drop")]
struct Cli {
    /// Directory holding default.toml and friends
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Owner identity used for console commands
    #[arg(long, default_value = "owner")]
    owner: String,

    /// Run a single price check over all products and exit
    #[arg(long)]
    check_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr so they don't interleave with the console conversation
    let (writer, _log_guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("price_watch=info")))
        .with_writer(writer)
        .init();

    info!("Starting Price Watch...");

    let config = AppConfig::from_dir(&cli.config_dir)
        .with_context(|| format!("Failed to load configuration from {}", cli.config_dir.display()))?;

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()
            .context("Failed to start metrics exporter")?;
        info!("Metrics exporter listening on port {}", config.metrics.port);
    }

    let store = Arc::new(
        SqliteProductStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to open product store")?,
    );
    let registry = Arc::new(SelectorRegistry::load(&config.selectors.path));
    let fetcher = PriceFetcher::chrome(&config.fetcher);
    let console = Arc::new(ConsoleChannel::new());

    let alert_sink: Arc<dyn MessageSink> = match &config.notifications.discord_webhook_url {
        Some(url) => Arc::new(DiscordWebhook::new(url.as_str())?),
        None => console.clone(),
    };
    let dispatcher = AlertDispatcher::new(alert_sink);
    let scheduler = PriceScheduler::new(store.clone(), fetcher.clone(), dispatcher, &config.scheduler);

    if cli.check_once {
        let summary = scheduler.run_once().await;
        info!(?summary, "Single check finished");
        store.close().await;
        return Ok(());
    }

    let mut jobs = scheduler.start().await?;

    let wizard = OnboardingWizard::new(
        console.clone(),
        store.clone(),
        registry,
        fetcher.clone(),
        SessionRegistry::new(),
        config.wizard.step_timeout(),
    );
    let bot = PriceBot::new(store.clone(), fetcher, wizard);

    console.send(&cli.owner, HELP_TEXT).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    // While a setup is in progress every line is an answer to it
                    if bot.is_wizard_active(&cli.owner) {
                        console.deliver(&cli.owner, line);
                        continue;
                    }

                    if matches!(line.trim().to_lowercase().as_str(), "quit" | "exit") {
                        break;
                    }

                    let reply = match Command::parse(&line) {
                        Ok(command) => bot.handle(&cli.owner, command).await,
                        Err(e) => Some(e.to_string()),
                    };
                    if let Some(reply) = reply {
                        console.send(&cli.owner, &reply).await?;
                    }
                }
                None => {
                    info!("Console input closed, running until interrupted");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down...");
    PriceScheduler::shutdown(&mut jobs).await?;
    store.close().await;

    Ok(())
}
