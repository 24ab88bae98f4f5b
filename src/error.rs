use thiserror::Error;

/// Failures raised while driving the browser
#[derive(Error, Debug, Clone)]
pub enum ScrapeError {
    #[error("failed to launch browser: {0}")]
    Session(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {seconds}s waiting for {url} to settle")]
    Timeout { url: String, seconds: u64 },

    #[error("invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("browser task aborted: {0}")]
    Task(String),
}

impl ScrapeError {
    pub fn navigation(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ScrapeError::Navigation {
            url: url.into(),
            reason: err.to_string(),
        }
    }
}

/// A notification the sink could not deliver
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("request to notification service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
