use super::NotificationSink;
use crate::error::NotifyError;
use crate::models::{Category, ObjectLink, ObjectRecord, ScanResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};

/// Writes notifications to the log; used when no chat is configured
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn publish_preview(&self, category: Category, count: usize) -> Result<(), NotifyError> {
        info!(%category, count, "New objects found");
        Ok(())
    }

    async fn publish_record(&self, record: &ObjectRecord) -> Result<(), NotifyError> {
        info!(
            name = %record.name,
            link = %record.link,
            facts = record.facts.len(),
            screenshot = record.screenshot.as_ref().map(Vec::len).unwrap_or(0),
            "New object"
        );
        for fact in &record.facts {
            info!("   {}: {}", fact.key, fact.value);
        }
        Ok(())
    }

    async fn publish_failure(&self, link: &ObjectLink) {
        warn!(name = %link.name, link = %link.link, "Object details unavailable");
    }

    async fn publish_scan_finished(&self, result: &ScanResult) {
        info!(
            category = %result.category,
            new = result.new_count,
            failed = result.failures.len(),
            "✅ Scan complete"
        );
    }

    async fn publish_scan_failed(&self, category: Category) {
        warn!(%category, "❌ Scan failed");
    }

    async fn publish_heartbeat(&self, at: DateTime<Utc>) {
        info!("💓 {}", at.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
}
