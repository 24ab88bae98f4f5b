use crate::models::Category;
use crate::notify::ScanStickers;
use crate::scrapers::{SessionOptions, SiteSelectors};
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://wahlinfastigheter.se/";

pub struct TelegramConfig {
    pub token: String,
    pub chat_id: i64,
    pub stickers: ScanStickers,
}

pub struct Config {
    pub base_url: Url,
    pub executable: Option<PathBuf>,
    pub sandbox: bool,
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    pub categories: Vec<Category>,
    pub scan_interval: Duration,
    /// `None` when heartbeats are switched off
    pub heartbeat_interval: Option<Duration>,
    pub selectors: SiteSelectors,
    pub telegram: Option<TelegramConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = get("SITE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_url).context("SITE_BASE_URL is not a valid URL")?;

        let executable = get("CHROME_EXECUTABLE")
            .or_else(|| get("PUPPETEER_EXECUTABLE"))
            .map(PathBuf::from);

        let categories = match get("SCAN_CATEGORIES") {
            Some(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(Category::from_str)
                .collect::<Result<Vec<_>, _>>()
                .context("SCAN_CATEGORIES")?,
            None => vec![Category::Parking],
        };
        if categories.is_empty() {
            anyhow::bail!("SCAN_CATEGORIES names no category");
        }

        let telegram = match (get("TELEGRAM_TOKEN"), get("CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig {
                token,
                chat_id: parse_key("CHAT_ID", &chat_id)?,
                stickers: ScanStickers {
                    success: get("SUCCESS_STICKER_ID"),
                    failed: get("FAILED_STICKER_ID"),
                },
            }),
            _ => None,
        };

        let heartbeat_secs: u64 = parse_or(&get, "HEARTBEAT_INTERVAL_SECS", 30 * 60)?;
        let heartbeat_interval = (heartbeat_secs > 0).then(|| Duration::from_secs(heartbeat_secs));

        let selectors = match get("SITE_SELECTORS_FILE") {
            Some(path) => load_selectors(Path::new(&path))
                .with_context(|| format!("SITE_SELECTORS_FILE '{path}'"))?,
            None => SiteSelectors::default(),
        };

        Ok(Self {
            base_url,
            executable,
            sandbox: parse_or(&get, "BROWSER_SANDBOX", false)?,
            navigation_timeout: Duration::from_secs(parse_or(&get, "NAVIGATION_TIMEOUT_SECS", 30)?),
            settle_delay: Duration::from_millis(parse_or(&get, "SETTLE_DELAY_MS", 500)?),
            categories,
            scan_interval: Duration::from_secs(parse_or(&get, "SCAN_INTERVAL_SECS", 300)?),
            heartbeat_interval,
            selectors,
            telegram,
        })
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            sandbox: self.sandbox,
            executable: self.executable.clone(),
            navigation_timeout: self.navigation_timeout,
            // Outlive the gap between scans so the browser is reused
            idle_timeout: self.scan_interval * 2 + self.navigation_timeout,
        }
    }
}

fn load_selectors(path: &Path) -> Result<SiteSelectors> {
    let raw = fs::read_to_string(path).context("Failed to read selectors file")?;
    serde_json::from_str(&raw).context("Failed to parse selectors file")
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_key(key, &raw),
        None => Ok(default),
    }
}

fn parse_key<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} has invalid value '{raw}'"))
}
