use super::detail::DetailScraper;
use super::listing::ListingScraper;
use super::network::NetworkMonitor;
use super::session::PageSession;
use super::traits::SiteScraper;
use super::types::{CompiledSelectors, SiteSelectors};
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{Category, ObjectLink, ObjectRecord};
use async_trait::async_trait;
use headless_chrome::Tab;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

const IDLE_POLL: Duration = Duration::from_millis(50);

/// Headless-Chrome backed scraper. Both listing and detail fetches share one
/// [`PageSession`], and all browser work runs on the blocking pool.
pub struct BrowserScraper {
    session: Arc<PageSession>,
    listing: Arc<ListingScraper>,
    detail: Arc<DetailScraper>,
    /// Blocking browser jobs still running, including ones whose caller
    /// has gone away
    in_flight: Arc<AtomicUsize>,
}

/// Counts one blocking job; moved into the job so it drops when the work
/// ends, not when the awaiting future does
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BrowserScraper {
    pub fn new(
        session: Arc<PageSession>,
        base_url: Url,
        selectors: &SiteSelectors,
        settle_delay: Duration,
    ) -> ScrapeResult<Self> {
        let compiled = Arc::new(CompiledSelectors::compile(selectors)?);

        Ok(Self {
            session,
            listing: Arc::new(ListingScraper::new(
                base_url,
                compiled.clone(),
                selectors,
                settle_delay,
            )),
            detail: Arc::new(DetailScraper::new(
                compiled,
                selectors.description.clone(),
                selectors.cookie_button.clone(),
                settle_delay,
            )),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait for running browser jobs to return, up to `timeout`.
    ///
    /// Returns false if some job was still running when time ran out.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut announced = false;

        loop {
            let running = self.in_flight();
            if running == 0 {
                return true;
            }
            if !announced {
                info!(running, "Waiting for in-flight browser work...");
                announced = true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(running, "Browser work still running, releasing anyway");
                return false;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    fn track(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self.in_flight.clone())
    }

    async fn blocking<T, F>(&self, work: F) -> ScrapeResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> ScrapeResult<T> + Send + 'static,
    {
        let guard = self.track();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            work()
        })
        .await
        .map_err(|e| ScrapeError::Task(e.to_string()))?
    }
}

#[async_trait]
impl SiteScraper for BrowserScraper {
    async fn prepare(&self) -> ScrapeResult<()> {
        let session = self.session.clone();
        self.blocking(move || session.acquire().map(|_| ())).await
    }

    async fn fetch_links(&self, category: Category) -> ScrapeResult<Vec<ObjectLink>> {
        let session = self.session.clone();
        let listing = self.listing.clone();
        self.blocking(move || listing.fetch_links(&session, category)).await
    }

    async fn fetch_detail(&self, link: &ObjectLink) -> ScrapeResult<ObjectRecord> {
        let session = self.session.clone();
        let detail = self.detail.clone();
        let link = link.clone();
        self.blocking(move || detail.fetch_detail(&session, &link)).await
    }

    fn source_name(&self) -> &'static str {
        "headless-chrome"
    }
}

/// Navigate, wait for the network to settle, then dismiss the cookie overlay.
///
/// Returns true when an overlay was clicked away; the network is awaited a
/// second time in that case since the click may load more content.
pub(super) fn load_page(
    tab: &Tab,
    url: &str,
    cookie_button: &str,
    timeout: Duration,
) -> ScrapeResult<bool> {
    let monitor = NetworkMonitor::attach(tab, url)?;
    let deadline = Instant::now() + timeout;

    tab.navigate_to(url)
        .map_err(|e| ScrapeError::navigation(url, format!("{e:#}")))?;
    tab.wait_until_navigated()
        .map_err(|e| ScrapeError::navigation(url, format!("{e:#}")))?;
    monitor.wait_idle(url, deadline, timeout)?;

    let dismissed = dismiss_cookie_overlay(tab, cookie_button);
    if dismissed {
        monitor.wait_idle(url, Instant::now() + timeout, timeout)?;
    }
    Ok(dismissed)
}

/// Click the consent button if the page shows one
fn dismiss_cookie_overlay(tab: &Tab, cookie_button: &str) -> bool {
    let Ok(selector) = serde_json::to_string(cookie_button) else {
        return false;
    };
    let script = format!(
        "(() => {{ const b = document.querySelector({selector}); \
         if (b) {{ b.click(); return true; }} return false; }})()"
    );

    match tab.evaluate(&script, false) {
        Ok(result) => {
            let clicked = result.value.and_then(|v| v.as_bool()).unwrap_or(false);
            debug!(clicked, "Cookie overlay checked");
            clicked
        }
        Err(e) => {
            debug!("Cookie overlay dismissal failed: {e:#}");
            false
        }
    }
}

pub(super) fn page_html(tab: &Tab, url: &str) -> ScrapeResult<String> {
    let result = tab
        .evaluate("document.documentElement.outerHTML", false)
        .map_err(|e| ScrapeError::navigation(url, format!("{e:#}")))?;

    match result.value.as_ref().and_then(|v| v.as_str()) {
        Some(html) => Ok(html.to_string()),
        None => Err(ScrapeError::navigation(url, "page returned no document")),
    }
}
