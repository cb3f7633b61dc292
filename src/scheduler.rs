use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::alerts::{AlertDispatcher, AlertOutcome};
use crate::config::SchedulerConfig;
use crate::models::Product;
use crate::product_store::ProductStore;
use crate::scraper::{FetchResult, PriceFetcher};
use crate::utils::error::Result;

/// Counts from one complete polling run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub checked: usize,
    pub priced: usize,
    pub unavailable: usize,
    pub alerts_sent: usize,
    pub delivery_failures: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: CheckOutcome) {
        self.checked += 1;
        match outcome {
            CheckOutcome::Unavailable => self.unavailable += 1,
            CheckOutcome::Priced(alert) => {
                self.priced += 1;
                match alert {
                    AlertOutcome::Sent => self.alerts_sent += 1,
                    AlertOutcome::DeliveryFailed => self.delivery_failures += 1,
                    AlertOutcome::NotTriggered => {}
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CheckOutcome {
    Priced(AlertOutcome),
    Unavailable,
}

/// Clears the running flag however the run ends.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically fetches every tracked product and dispatches alerts.
///
/// At most one run is in flight; a tick that finds one running is skipped.
#[derive(Clone)]
pub struct PriceScheduler {
    store: Arc<dyn ProductStore>,
    fetcher: PriceFetcher,
    dispatcher: AlertDispatcher,
    interval: Duration,
    max_concurrent_checks: usize,
    running: Arc<AtomicBool>,
    completed_runs: Arc<AtomicU64>,
}

impl PriceScheduler {
    pub fn new(
        store: Arc<dyn ProductStore>,
        fetcher: PriceFetcher,
        dispatcher: AlertDispatcher,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            dispatcher,
            interval: config.interval(),
            max_concurrent_checks: config.max_concurrent_checks.max(1),
            running: Arc::new(AtomicBool::new(false)),
            completed_runs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn completed_runs(&self) -> u64 {
        self.completed_runs.load(Ordering::Relaxed)
    }

    /// Registers the repeating job and starts ticking. The first run happens
    /// one interval after start.
    pub async fn start(&self) -> Result<JobScheduler> {
        let job_scheduler = JobScheduler::new().await?;

        let scheduler = self.clone();
        let job = Job::new_repeated_async(self.interval, move |_uuid, _l| {
            let scheduler = scheduler.clone();
            Box::pin(async move {
                scheduler.run_once().await;
            })
        })?;

        job_scheduler.add(job).await?;
        job_scheduler.start().await?;

        tracing::info!(
            "Price scheduler started: every {}s, up to {} concurrent checks",
            self.interval.as_secs(),
            self.max_concurrent_checks
        );
        Ok(job_scheduler)
    }

    pub async fn shutdown(job_scheduler: &mut JobScheduler) -> Result<()> {
        job_scheduler.shutdown().await?;
        tracing::info!("Price scheduler shutdown");
        Ok(())
    }

    /// Checks every product once. Returns `None` when another run is still in
    /// progress or the product list could not be read.
    pub async fn run_once(&self) -> Option<RunSummary> {
        let Some(_guard) = RunGuard::try_acquire(&self.running) else {
            tracing::warn!("Previous price check run still in progress, skipping this tick");
            return None;
        };

        let start_time = tokio::time::Instant::now();
        let products = match self.store.scan_all().await {
            Ok(products) => products,
            Err(e) => {
                tracing::error!("Could not load tracked products, skipping run: {}", e);
                return None;
            }
        };

        tracing::debug!("Checking {} tracked products", products.len());

        let summary = Arc::new(std::sync::Mutex::new(RunSummary::default()));
        stream::iter(products)
            .for_each_concurrent(self.max_concurrent_checks, |product| {
                let summary = Arc::clone(&summary);
                async move {
                    let outcome = self.check_product(&product).await;
                    if let Ok(mut summary) = summary.lock() {
                        summary.record(outcome);
                    }
                }
            })
            .await;

        let summary = summary.lock().map(|s| s.clone()).unwrap_or_default();
        self.completed_runs.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            checked = summary.checked,
            priced = summary.priced,
            unavailable = summary.unavailable,
            alerts = summary.alerts_sent,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Price check run complete"
        );
        Some(summary)
    }

    async fn check_product(&self, product: &Product) -> CheckOutcome {
        metrics::counter!("price_watch_checks_total").increment(1);

        match self.fetcher.fetch(&product.url, Some(&product.price_selector)).await {
            FetchResult::Price(price) => {
                tracing::debug!("'{}' of {} is {}", product.product_name, product.owner_id, price);
                CheckOutcome::Priced(self.dispatcher.evaluate(product, price).await)
            }
            FetchResult::Unavailable(reason) => {
                tracing::warn!(
                    "Price unavailable for '{}' of {} ({}): {}",
                    product.product_name,
                    product.owner_id,
                    product.url,
                    reason
                );
                CheckOutcome::Unavailable
            }
        }
    }
}
