use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub fetcher: FetcherConfig,
    pub wizard: WizardConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    pub selectors: SelectorsConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub max_concurrent_checks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    pub navigation_timeout_secs: u64,
    pub element_timeout_secs: u64,
    pub user_agent: String,
    pub chrome_path: Option<String>,
    pub headless: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    pub step_timeout_secs: u64,
}

/// Alerts go to the product owner; a webhook, when set, replaces the console.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub discord_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorsConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl FetcherConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }
}

impl WizardConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: 90,
            element_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chrome_path: None,
            headless: true,
        }
    }
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

impl AppConfig {
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("database.max_connections", 5_i64)?
            .set_default("scheduler.interval_secs", 1800_i64)?
            .set_default("scheduler.max_concurrent_checks", 1_i64)?
            .set_default("fetcher.navigation_timeout_secs", 90_i64)?
            .set_default("fetcher.element_timeout_secs", 30_i64)?
            .set_default("fetcher.user_agent", DEFAULT_USER_AGENT)?
            .set_default("fetcher.headless", true)?
            .set_default("wizard.step_timeout_secs", 30_i64)?
            .set_default("selectors.path", "config/selectors.toml")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.port", 9001_i64)?
            .add_source(File::from(dir.join("default")).required(false))
            .add_source(File::from(dir.join(&run_mode)).required(false))
            // Local overrides, ignored by git
            .add_source(File::from(dir.join("local")).required(false))
            .add_source(
                Environment::with_prefix("PRICE_WATCH")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.fetcher.chrome_path.is_none() {
            config.fetcher.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Message("database.url must be set".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Message("Scheduler interval_secs must be greater than 0".into()));
        }

        if self.scheduler.max_concurrent_checks == 0 {
            return Err(ConfigError::Message("Scheduler max_concurrent_checks must be greater than 0".into()));
        }

        if self.fetcher.navigation_timeout_secs == 0 || self.fetcher.element_timeout_secs == 0 {
            return Err(ConfigError::Message("Fetcher timeouts must be greater than 0".into()));
        }

        if self.wizard.step_timeout_secs == 0 {
            return Err(ConfigError::Message("Wizard step_timeout_secs must be greater than 0".into()));
        }

        if let Some(webhook) = &self.notifications.discord_webhook_url {
            if Url::parse(webhook).is_err() {
                return Err(ConfigError::Message("Invalid Discord webhook URL format".into()));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }
}
