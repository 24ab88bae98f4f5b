mod config;
mod error;
mod models;
mod notify;
mod pipeline;
mod scrapers;
mod store;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use config::Config;
use notify::{LogSink, NotificationSink, TelegramSink};
use pipeline::PublishPipeline;
use scrapers::{BrowserScraper, PageSession};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = Config::from_env().context("Failed to load configuration")?;

    info!("🏠 Rental Watch");
    info!(
        site = %cfg.base_url,
        categories = ?cfg.categories,
        interval_secs = cfg.scan_interval.as_secs(),
        "Watching for new objects"
    );

    let session = Arc::new(PageSession::new(cfg.session_options()));
    let scraper = Arc::new(
        BrowserScraper::new(
            session.clone(),
            cfg.base_url.clone(),
            &cfg.selectors,
            cfg.settle_delay,
        )
        .context("Failed to set up scraper")?,
    );

    let sink: Arc<dyn NotificationSink> = match &cfg.telegram {
        Some(telegram) => Arc::new(
            TelegramSink::new(&telegram.token, telegram.chat_id)?
                .with_stickers(telegram.stickers.clone()),
        ),
        None => {
            warn!("TELEGRAM_TOKEN or CHAT_ID not set, notifications go to the log only");
            Arc::new(LogSink)
        }
    };

    let pipeline = PublishPipeline::new(scraper.clone(), sink);

    tokio::select! {
        _ = scan_loop(&pipeline, &cfg) => {}
        _ = heartbeat_loop(&pipeline, cfg.heartbeat_interval) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        }
    }

    // A cancelled scan leaves its blocking browser job running
    scraper.wait_until_idle(cfg.navigation_timeout * 2).await;

    if session.is_active() {
        let released = tokio::task::spawn_blocking(move || session.release())
            .await
            .context("Failed to release browser")?;
        info!(released, "Browser session closed");
    }

    Ok(())
}

/// Scan every configured category on each tick; forget published objects
/// once the local date changes.
async fn scan_loop(pipeline: &PublishPipeline, cfg: &Config) {
    let mut ticker = tokio::time::interval(cfg.scan_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut day: NaiveDate = Local::now().date_naive();

    loop {
        ticker.tick().await;

        let today = Local::now().date_naive();
        if today != day {
            pipeline.clear().await;
            day = today;
        }

        for &category in &cfg.categories {
            if let Some(result) = pipeline.run_and_report(category).await {
                info!(
                    %category,
                    new = result.new_count,
                    failed = result.failures.len(),
                    known = pipeline.size().await,
                    "Scan recorded"
                );
            }
        }
    }
}

/// Send a heartbeat on every tick after the first; never returns when
/// heartbeats are off.
async fn heartbeat_loop(pipeline: &PublishPipeline, every: Option<Duration>) {
    let Some(every) = every else {
        return std::future::pending().await;
    };

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        pipeline.heartbeat().await;
    }
}
