use super::NotificationSink;
use crate::error::NotifyError;
use crate::models::{Category, ObjectLink, ObjectRecord, ScanResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const API_BASE: &str = "https://api.telegram.org";

/// Posts notifications to one Telegram chat through the Bot API
pub struct TelegramSink {
    client: Client,
    api_url: String,
    chat_id: i64,
    stickers: ScanStickers,
}

/// Sticker file ids sent after a scan; text is sent where one is missing
#[derive(Debug, Clone, Default)]
pub struct ScanStickers {
    pub success: Option<String>,
    pub failed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramSink {
    pub fn new(token: &str, chat_id: i64) -> Result<Self> {
        Self::with_api_base(API_BASE, token, chat_id)
    }

    pub fn with_api_base(api_base: &str, token: &str, chat_id: i64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            chat_id,
            stickers: ScanStickers::default(),
        })
    }

    pub fn with_stickers(mut self, stickers: ScanStickers) -> Self {
        self.stickers = stickers;
        self
    }

    async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/sendMessage", self.api_url))
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await?;
        check(response).await
    }

    async fn send_sticker(&self, file_id: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/sendSticker", self.api_url))
            .json(&json!({ "chat_id": self.chat_id, "sticker": file_id }))
            .send()
            .await?;
        check(response).await
    }

    /// Sticker when configured, otherwise `text`
    async fn send_outcome(&self, sticker: Option<&str>, text: &str) -> Result<(), NotifyError> {
        match sticker {
            Some(file_id) => self.send_sticker(file_id).await,
            None => self.send_message(text).await,
        }
    }

    async fn send_photo(&self, png: Vec<u8>, caption: &str) -> Result<(), NotifyError> {
        let photo = Part::bytes(png)
            .file_name("object.png")
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", self.chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let response = self
            .client
            .post(format!("{}/sendPhoto", self.api_url))
            .multipart(form)
            .send()
            .await?;
        check(response).await
    }
}

async fn check(response: reqwest::Response) -> Result<(), NotifyError> {
    let status = response.status();
    let body: ApiResponse = response.json().await?;
    if body.ok {
        Ok(())
    } else {
        Err(NotifyError::Rejected(format!(
            "{}: {}",
            status,
            body.description.unwrap_or_default()
        )))
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn publish_preview(&self, category: Category, count: usize) -> Result<(), NotifyError> {
        debug!(%category, count, "Sending preview");
        self.send_message(&count.to_string()).await
    }

    async fn publish_record(&self, record: &ObjectRecord) -> Result<(), NotifyError> {
        match &record.screenshot {
            Some(png) => self.send_photo(png.clone(), record.link.as_str()).await,
            None => self.send_message(record.link.as_str()).await,
        }
    }

    async fn publish_failure(&self, link: &ObjectLink) {
        if let Err(e) = self.send_message(link.link.as_str()).await {
            warn!(link = %link.link, error = %e, "Failure notice not delivered");
        }
    }

    async fn publish_scan_finished(&self, result: &ScanResult) {
        let text = finished_text(result);
        if let Err(e) = self.send_outcome(self.stickers.success.as_deref(), &text).await {
            warn!(category = %result.category, error = %e, "Scan outcome not delivered");
        }
    }

    async fn publish_scan_failed(&self, category: Category) {
        let text = format!("❌ {category}");
        if let Err(e) = self.send_outcome(self.stickers.failed.as_deref(), &text).await {
            warn!(%category, error = %e, "Scan outcome not delivered");
        }
    }

    async fn publish_heartbeat(&self, at: DateTime<Utc>) {
        if let Err(e) = self.send_message(&heartbeat_text(at)).await {
            warn!(error = %e, "Heartbeat not delivered");
        }
    }
}

fn finished_text(result: &ScanResult) -> String {
    format!("✅ {}: {}", result.category, result.new_count)
}

fn heartbeat_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_includes_token() {
        let sink = TelegramSink::with_api_base("http://localhost:8081/", "123:abc", 42).unwrap();
        assert_eq!(sink.api_url, "http://localhost:8081/bot123:abc");
    }

    #[test]
    fn api_error_body_parses() {
        let raw = r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#;
        let body: ApiResponse = serde_json::from_str(raw).unwrap();
        assert!(!body.ok);
        assert_eq!(body.description.as_deref(), Some("Bad Request: chat not found"));
    }

    #[tokio::test]
    async fn unreachable_api_does_not_panic_on_failure_notice() {
        let sink = TelegramSink::with_api_base("http://127.0.0.1:9", "t", 1).unwrap();
        let link = ObjectLink {
            name: "A".into(),
            link: url::Url::parse("https://example.se/a").unwrap(),
        };
        sink.publish_failure(&link).await;
        sink.publish_scan_failed(Category::Parking).await;
        sink.publish_heartbeat(Utc::now()).await;
        assert!(sink.publish_preview(Category::Parking, 1).await.is_err());
    }

    #[test]
    fn heartbeat_is_iso_timestamp() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T13:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(heartbeat_text(at), "2024-03-05T13:30:00.000Z");
    }

    #[test]
    fn finished_text_names_category_and_count() {
        let result = ScanResult {
            category: Category::Storage,
            candidates: 3,
            new_count: 2,
            failures: vec![],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        assert_eq!(finished_text(&result), "✅ storage: 2");
    }

    #[test]
    fn stickers_default_to_text() {
        let sink = TelegramSink::with_api_base(API_BASE, "t", 1).unwrap();
        assert!(sink.stickers.success.is_none());

        let sink = sink.with_stickers(ScanStickers {
            success: Some("CAACAgI".into()),
            failed: None,
        });
        assert_eq!(sink.stickers.success.as_deref(), Some("CAACAgI"));
        assert!(sink.stickers.failed.is_none());
    }
}
