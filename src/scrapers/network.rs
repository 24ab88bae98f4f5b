//! Network-idle detection from CDP `Network` events.
//!
//! A page counts as settled once no more than [`IDLE_ALLOWANCE`] requests
//! have been in flight for [`QUIET_WINDOW`].

use crate::error::{ScrapeError, ScrapeResult};
use headless_chrome::browser::tab::EventListener;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Network;
use headless_chrome::Tab;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const QUIET_WINDOW: Duration = Duration::from_millis(500);
/// Open connections tolerated on a settled page (long-polling, analytics)
pub const IDLE_ALLOWANCE: usize = 2;

type Listener = dyn EventListener<Event> + Send + Sync;

/// Request ids that were sent but have not finished or failed
#[derive(Debug, Default)]
pub struct InFlight {
    requests: Mutex<HashSet<String>>,
}

impl InFlight {
    pub fn started(&self, request_id: &str) {
        self.lock().insert(request_id.to_string());
    }

    pub fn ended(&self, request_id: &str) {
        self.lock().remove(request_id);
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Decides when a sequence of in-flight samples has stayed quiet long enough
#[derive(Debug, Default)]
pub struct IdleTracker {
    quiet_since: Option<Instant>,
}

impl IdleTracker {
    pub fn observe(&mut self, in_flight: usize, now: Instant) -> bool {
        if in_flight > IDLE_ALLOWANCE {
            self.quiet_since = None;
            return false;
        }
        let since = *self.quiet_since.get_or_insert(now);
        now.duration_since(since) >= QUIET_WINDOW
    }
}

/// Counts a tab's open requests while attached. Attach before navigating so
/// the document request itself is seen.
pub struct NetworkMonitor<'a> {
    tab: &'a Tab,
    in_flight: Arc<InFlight>,
    listener: Weak<Listener>,
}

impl<'a> NetworkMonitor<'a> {
    pub fn attach(tab: &'a Tab, url: &str) -> ScrapeResult<Self> {
        // Every field of Network.enable is optional
        let enable: Network::Enable = serde_json::from_value(serde_json::json!({}))
            .map_err(|e| ScrapeError::navigation(url, format!("network domain: {e}")))?;
        tab.call_method(enable)
            .map_err(|e| ScrapeError::navigation(url, format!("network domain: {e:#}")))?;

        let in_flight = Arc::new(InFlight::default());
        let sink = in_flight.clone();
        let listener: Arc<Listener> = Arc::new(move |event: &Event| match event {
            Event::NetworkRequestWillBeSent(e) => sink.started(&e.params.request_id),
            Event::NetworkLoadingFinished(e) => sink.ended(&e.params.request_id),
            Event::NetworkLoadingFailed(e) => sink.ended(&e.params.request_id),
            _ => {}
        });
        let listener = tab
            .add_event_listener(listener)
            .map_err(|e| ScrapeError::navigation(url, format!("network listener: {e:#}")))?;

        Ok(Self {
            tab,
            in_flight,
            listener,
        })
    }

    /// Block until the page is settled or `deadline` passes
    pub fn wait_idle(&self, url: &str, deadline: Instant, timeout: Duration) -> ScrapeResult<()> {
        let mut tracker = IdleTracker::default();

        loop {
            let now = Instant::now();
            let open = self.in_flight.count();
            if tracker.observe(open, now) {
                debug!(url, open, "Network settled");
                return Ok(());
            }
            if now >= deadline {
                return Err(ScrapeError::Timeout {
                    url: url.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for NetworkMonitor<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.tab.remove_event_listener(&self.listener) {
            debug!("Removing network listener failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_tracks_open_requests() {
        let requests = InFlight::default();
        requests.started("1");
        requests.started("2");
        // redirects reuse the request id
        requests.started("2");
        assert_eq!(requests.count(), 2);

        requests.ended("1");
        requests.ended("unknown");
        assert_eq!(requests.count(), 1);
    }

    #[test]
    fn slow_requests_keep_page_busy() {
        let mut tracker = IdleTracker::default();
        let start = Instant::now();

        // five requests that each take two seconds
        for ms in (0..2000).step_by(100) {
            assert!(!tracker.observe(5, start + Duration::from_millis(ms)));
        }

        assert!(!tracker.observe(0, start + Duration::from_millis(2000)));
        assert!(tracker.observe(0, start + Duration::from_millis(2500)));
    }

    #[test]
    fn allowance_counts_as_quiet() {
        let mut tracker = IdleTracker::default();
        let start = Instant::now();

        assert!(!tracker.observe(IDLE_ALLOWANCE, start));
        assert!(!tracker.observe(IDLE_ALLOWANCE, start + Duration::from_millis(400)));
        assert!(tracker.observe(1, start + QUIET_WINDOW));
    }

    #[test]
    fn burst_restarts_quiet_window() {
        let mut tracker = IdleTracker::default();
        let start = Instant::now();

        tracker.observe(0, start);
        assert!(!tracker.observe(3, start + Duration::from_millis(400)));
        assert!(!tracker.observe(0, start + Duration::from_millis(600)));
        assert!(tracker.observe(0, start + Duration::from_millis(1100)));
    }
}
