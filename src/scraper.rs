use headless_chrome::{Browser, LaunchOptions};
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::FetcherConfig;
use crate::price::parse_price;

/// Extra time allowed on top of the page timeouts before the caller gives up on a render.
const RENDER_GRACE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnavailableReason {
    Timeout,
    NoMatch,
    Unparseable(String),
    Browser(String),
}

impl UnavailableReason {
    pub fn kind(&self) -> &'static str {
        match self {
            UnavailableReason::Timeout => "timeout",
            UnavailableReason::NoMatch => "no_match",
            UnavailableReason::Unparseable(_) => "unparseable",
            UnavailableReason::Browser(_) => "browser",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::Timeout => write!(f, "navigation timed out"),
            UnavailableReason::NoMatch => write!(f, "no element matched the price selector"),
            UnavailableReason::Unparseable(raw) => write!(f, "could not read a price from '{}'", raw),
            UnavailableReason::Browser(message) => write!(f, "browser error: {}", message),
        }
    }
}

/// Outcome of one render-and-extract attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchResult {
    Price(Decimal),
    Unavailable(UnavailableReason),
}

impl FetchResult {
    pub fn price(&self) -> Option<Decimal> {
        match self {
            FetchResult::Price(price) => Some(*price),
            FetchResult::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTimeouts {
    pub navigation: Duration,
    pub element: Duration,
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(90),
            element: Duration::from_secs(30),
        }
    }
}

impl From<&FetcherConfig> for FetchTimeouts {
    fn from(config: &FetcherConfig) -> Self {
        Self {
            navigation: config.navigation_timeout(),
            element: config.element_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Timeout,
    NoMatch,
    Browser(String),
}

/// Renders a page in a session of its own and returns the text of the first
/// element matching `locator`.
///
/// Implementations block; `PriceFetcher` runs them on the blocking pool. The
/// session must be torn down before `render` returns, whatever the outcome.
pub trait PageRenderer: Send + Sync + 'static {
    fn render(&self, url: &str, locator: &str, timeouts: FetchTimeouts) -> Result<String, RenderError>;
}

/// Headless Chrome, one browser process per render.
pub struct ChromeRenderer {
    config: FetcherConfig,
}

impl ChromeRenderer {
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    fn launch(&self, timeouts: FetchTimeouts) -> Result<Browser, RenderError> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(self.config.headless)
            .sandbox(false) // Often needed in containerized environments
            .idle_browser_timeout(timeouts.navigation + timeouts.element + RENDER_GRACE)
            .args(vec![
                std::ffi::OsStr::new("--disable-dev-shm-usage"),
                std::ffi::OsStr::new("--disable-gpu"),
                std::ffi::OsStr::new("--disable-extensions"),
            ])
            .build()
            .map_err(|e| RenderError::Browser(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &self.config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        Browser::new(launch_options).map_err(|e| RenderError::Browser(format!("Failed to launch browser: {}", e)))
    }
}

impl PageRenderer for ChromeRenderer {
    fn render(&self, url: &str, locator: &str, timeouts: FetchTimeouts) -> Result<String, RenderError> {
        // The browser lives until the end of this call; dropping it kills the
        // Chrome process on every return path.
        let browser = self.launch(timeouts)?;

        let tab = browser
            .new_tab()
            .map_err(|e| RenderError::Browser(format!("Failed to create tab: {}", e)))?;

        tab.set_user_agent(&self.config.user_agent, None, None)
            .map_err(|e| RenderError::Browser(format!("Failed to set user agent: {}", e)))?;
        tab.set_default_timeout(timeouts.navigation);

        tab.navigate_to(url).map_err(navigation_error)?;
        tab.wait_until_navigated().map_err(navigation_error)?;

        tab.wait_for_element_with_custom_timeout(locator, timeouts.element)
            .map_err(|e| {
                if is_timeout(&e) {
                    RenderError::NoMatch
                } else {
                    RenderError::Browser(format!("Wait for selector '{}' failed: {}", locator, e))
                }
            })?;

        let html = tab
            .get_content()
            .map_err(|e| RenderError::Browser(format!("Failed to get page content: {}", e)))?;

        extract_text(&html, locator)?.ok_or(RenderError::NoMatch)
    }
}

fn is_timeout(error: &anyhow::Error) -> bool {
    error.downcast_ref::<headless_chrome::util::Timeout>().is_some()
}

fn navigation_error(error: anyhow::Error) -> RenderError {
    if is_timeout(&error) {
        RenderError::Timeout
    } else {
        RenderError::Browser(format!("Navigation failed: {}", error))
    }
}

/// Text of the first element in `html` matching the CSS `locator`.
pub fn extract_text(html: &str, locator: &str) -> Result<Option<String>, RenderError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(locator)
        .map_err(|e| RenderError::Browser(format!("Invalid CSS selector '{}': {:?}", locator, e)))?;

    Ok(document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<Vec<_>>().join(" ").trim().to_string()))
}

/// Serves fixed HTML per URL through the same extraction path as Chrome.
///
/// Unknown URLs behave like unreachable hosts and time out.
#[derive(Default)]
pub struct StaticPageRenderer {
    pages: HashMap<String, String>,
    delay: Duration,
    open_sessions: Arc<AtomicUsize>,
    renders: AtomicUsize,
}

impl StaticPageRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    /// Simulated render latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

struct SessionLease(Arc<AtomicUsize>);

impl SessionLease {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PageRenderer for StaticPageRenderer {
    fn render(&self, url: &str, locator: &str, _timeouts: FetchTimeouts) -> Result<String, RenderError> {
        let _lease = SessionLease::acquire(&self.open_sessions);
        self.renders.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let html = self.pages.get(url).ok_or(RenderError::Timeout)?;
        extract_text(html, locator)?.ok_or(RenderError::NoMatch)
    }
}

/// Fetches and parses prices. Cheap to clone.
#[derive(Clone)]
pub struct PriceFetcher {
    renderer: Arc<dyn PageRenderer>,
    timeouts: FetchTimeouts,
}

impl PriceFetcher {
    pub fn new(renderer: Arc<dyn PageRenderer>, timeouts: FetchTimeouts) -> Self {
        Self { renderer, timeouts }
    }

    pub fn chrome(config: &FetcherConfig) -> Self {
        Self::new(Arc::new(ChromeRenderer::new(config.clone())), FetchTimeouts::from(config))
    }

    pub fn timeouts(&self) -> FetchTimeouts {
        self.timeouts
    }

    pub async fn fetch(&self, url: &str, locator: Option<&str>) -> FetchResult {
        let start_time = Instant::now();
        let result = self.fetch_inner(url, locator).await;

        match &result {
            FetchResult::Price(price) => {
                tracing::debug!(url, %price, elapsed_ms = start_time.elapsed().as_millis() as u64, "Fetched price");
            }
            FetchResult::Unavailable(reason) => {
                metrics::counter!("price_watch_fetch_unavailable_total", "reason" => reason.kind()).increment(1);
                tracing::debug!(url, %reason, elapsed_ms = start_time.elapsed().as_millis() as u64, "Price unavailable");
            }
        }

        result
    }

    async fn fetch_inner(&self, url: &str, locator: Option<&str>) -> FetchResult {
        let Some(locator) = locator.filter(|l| !l.trim().is_empty()) else {
            return FetchResult::Unavailable(UnavailableReason::NoMatch);
        };

        let renderer = Arc::clone(&self.renderer);
        let timeouts = self.timeouts;
        let owned_url = url.to_string();
        let owned_locator = locator.to_string();

        let mut render = tokio::task::spawn_blocking(move || renderer.render(&owned_url, &owned_locator, timeouts));
        let bound = timeouts.navigation + timeouts.element + RENDER_GRACE;

        let text = match tokio::time::timeout(bound, &mut render).await {
            Err(_) => {
                // A blocking render cannot be aborted. Hold on until its browser
                // is gone so callers never have more sessions open than they allow.
                tracing::warn!(url, "Render exceeded {:?}, waiting for the browser to close", bound);
                let _ = render.await;
                return FetchResult::Unavailable(UnavailableReason::Timeout);
            }
            Ok(Err(join_error)) => {
                return FetchResult::Unavailable(UnavailableReason::Browser(format!(
                    "render task failed: {}",
                    join_error
                )));
            }
            Ok(Ok(Err(RenderError::Timeout))) => return FetchResult::Unavailable(UnavailableReason::Timeout),
            Ok(Ok(Err(RenderError::NoMatch))) => return FetchResult::Unavailable(UnavailableReason::NoMatch),
            Ok(Ok(Err(RenderError::Browser(message)))) => {
                return FetchResult::Unavailable(UnavailableReason::Browser(message));
            }
            Ok(Ok(Ok(text))) => text,
        };

        match parse_price(&text) {
            Some(price) => FetchResult::Price(price),
            None => FetchResult::Unavailable(UnavailableReason::Unparseable(text)),
        }
    }
}
