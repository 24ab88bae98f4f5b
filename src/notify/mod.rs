pub mod log;
pub mod telegram;

use crate::error::NotifyError;
use crate::models::{Category, ObjectLink, ObjectRecord, ScanResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use self::log::LogSink;
pub use self::telegram::{ScanStickers, TelegramSink};

/// Where scan results are delivered
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Announce how many unseen objects a scan is about to fetch
    async fn publish_preview(&self, category: Category, count: usize) -> Result<(), NotifyError>;

    async fn publish_record(&self, record: &ObjectRecord) -> Result<(), NotifyError>;

    /// Report an object whose details could not be delivered.
    ///
    /// Best-effort: implementations log and swallow their own errors. The
    /// same holds for every method below.
    async fn publish_failure(&self, link: &ObjectLink);

    /// A scan ran to completion, whatever its per-object failures
    async fn publish_scan_finished(&self, result: &ScanResult);

    /// A scan could not run. Only the category is reported; the cause stays
    /// in the log.
    async fn publish_scan_failed(&self, category: Category);

    /// Periodic sign of life, independent of scans
    async fn publish_heartbeat(&self, at: DateTime<Utc>);
}
