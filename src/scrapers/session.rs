use crate::error::{ScrapeError, ScrapeResult};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the browser process is launched
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub sandbox: bool,
    pub executable: Option<PathBuf>,
    /// Default timeout applied to every page opened in the session
    pub navigation_timeout: Duration,
    /// Chrome's connection is dropped after this long without activity
    pub idle_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            sandbox: false,
            executable: None,
            navigation_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60 * 60),
        }
    }
}

/// Owns at most one headless Chrome process, launched lazily and reused
/// until [`PageSession::release`] is called.
///
/// All methods block; call them from `spawn_blocking`.
pub struct PageSession {
    options: SessionOptions,
    browser: Mutex<Option<Browser>>,
}

impl PageSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            browser: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Return the running browser, launching one if there is none or the
    /// previous one stopped responding.
    pub fn acquire(&self) -> ScrapeResult<Browser> {
        let mut slot = self.slot();

        if let Some(browser) = slot.as_ref() {
            if browser.get_version().is_ok() {
                return Ok(browser.clone());
            }
            warn!("Browser stopped responding, relaunching");
            slot.take();
        }

        let browser = self.launch()?;
        *slot = Some(browser.clone());
        Ok(browser)
    }

    /// Open a fresh tab. The tab closes when the returned handle is dropped.
    ///
    /// Only a failed launch is a session error; a tab that will not open is a
    /// navigation failure for the page that asked for it.
    pub fn new_page(&self) -> ScrapeResult<PageHandle> {
        let browser = self.acquire()?;
        let tab = browser.new_tab().map_err(|e| {
            ScrapeError::navigation("about:blank", format!("could not open tab: {e:#}"))
        })?;
        tab.set_default_timeout(self.options.navigation_timeout);
        Ok(PageHandle { tab })
    }

    /// Shut the browser down. Returns false when nothing was running.
    pub fn release(&self) -> bool {
        match self.slot().take() {
            Some(browser) => {
                info!("Releasing headless Chrome");
                drop(browser);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    fn launch(&self) -> ScrapeResult<Browser> {
        info!(
            sandbox = self.options.sandbox,
            executable = ?self.options.executable,
            "Launching headless Chrome..."
        );

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(self.options.sandbox)
            .path(self.options.executable.clone())
            .idle_browser_timeout(self.options.idle_timeout)
            .build()
            .map_err(|e| ScrapeError::Session(format!("invalid launch options: {e}")))?;

        Browser::new(options).map_err(|e| ScrapeError::Session(format!("{e:#}")))
    }

    fn slot(&self) -> MutexGuard<'_, Option<Browser>> {
        // A panic while holding the lock leaves the Option itself consistent
        self.browser.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// A tab owned by one fetch
pub struct PageHandle {
    tab: Arc<Tab>,
}

impl Deref for PageHandle {
    type Target = Tab;

    fn deref(&self) -> &Tab {
        &self.tab
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            debug!("Closing tab failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_without_browser_is_noop() {
        let session = PageSession::new(SessionOptions::default());
        assert!(!session.is_active());
        assert!(!session.release());
        assert!(!session.release());
    }

    #[test]
    fn launch_failure_is_session_error() {
        let session = PageSession::new(SessionOptions {
            executable: Some(PathBuf::from("/nonexistent/chrome-binary")),
            ..SessionOptions::default()
        });
        match session.acquire() {
            Err(ScrapeError::Session(_)) => {}
            Err(other) => panic!("expected session error, got {other}"),
            Ok(_) => panic!("launch should fail without a browser binary"),
        }
        assert!(!session.is_active());
    }

    #[test]
    #[ignore = "needs a local Chrome install"]
    fn acquire_reuses_and_relaunches_after_release() {
        let session = PageSession::new(SessionOptions::default());
        let first = session.acquire().unwrap();
        let pid = first.get_process_id();
        assert_eq!(session.acquire().unwrap().get_process_id(), pid);

        {
            let page = session.new_page().unwrap();
            page.navigate_to("about:blank").unwrap();
        }

        assert!(session.release());
        drop(first);
        assert!(session.acquire().is_ok());
        assert!(session.is_active());
    }
}
