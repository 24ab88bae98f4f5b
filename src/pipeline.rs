use crate::error::ScrapeResult;
use crate::models::{Category, ObjectLink, ScanResult};
use crate::notify::NotificationSink;
use crate::scrapers::SiteScraper;
use crate::store::DedupStore;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Scrape, filter against the dedup store, publish what is new.
///
/// Scans are serialized: the store lock is held for the whole of [`run`],
/// so two scans never share the browser session at the same time.
///
/// [`run`]: PublishPipeline::run
pub struct PublishPipeline {
    scraper: Arc<dyn SiteScraper>,
    sink: Arc<dyn NotificationSink>,
    store: Mutex<DedupStore>,
}

impl PublishPipeline {
    pub fn new(scraper: Arc<dyn SiteScraper>, sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_store(scraper, sink, DedupStore::new())
    }

    pub fn with_store(
        scraper: Arc<dyn SiteScraper>,
        sink: Arc<dyn NotificationSink>,
        store: DedupStore,
    ) -> Self {
        Self {
            scraper,
            sink,
            store: Mutex::new(store),
        }
    }

    /// Run one scan of `category`.
    ///
    /// Fails only when the session cannot be brought up or the listing page
    /// cannot be read. Once links are known, any detail fetch error is
    /// reported to the sink, left out of the store so the next scan retries
    /// it, and the scan moves on to the next link.
    pub async fn run(&self, category: Category) -> ScrapeResult<ScanResult> {
        let mut store = self.store.lock().await;
        let started_at = Utc::now();
        info!(%category, source = self.scraper.source_name(), "Starting scan");

        self.scraper.prepare().await?;
        let links = self.scraper.fetch_links(category).await?;
        let listed = links.len();

        let fresh: Vec<ObjectLink> = links
            .into_iter()
            .filter(|link| !store.has(&link.link))
            .collect();
        info!(%category, listed, new = fresh.len(), "Filtered known objects");

        if let Err(e) = self.sink.publish_preview(category, fresh.len()).await {
            warn!(%category, error = %e, "Preview notification failed");
        }

        let mut new_count = 0;
        let mut failures = Vec::new();

        for link in &fresh {
            let record = match self.scraper.fetch_detail(link).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(link = %link.link, error = %e, "Detail fetch failed");
                    self.sink.publish_failure(link).await;
                    failures.push(link.clone());
                    continue;
                }
            };

            match self.sink.publish_record(&record).await {
                Ok(()) => {
                    store.insert(link.link.clone(), record);
                    new_count += 1;
                }
                Err(e) => {
                    warn!(link = %link.link, error = %e, "Publishing record failed");
                    self.sink.publish_failure(link).await;
                    failures.push(link.clone());
                }
            }
        }

        info!(
            %category,
            new = new_count,
            failed = failures.len(),
            known = store.size(),
            "Scan finished"
        );

        Ok(ScanResult {
            category,
            candidates: fresh.len(),
            new_count,
            failures,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Run one scan and tell the sink how it ended
    pub async fn run_and_report(&self, category: Category) -> Option<ScanResult> {
        match self.run(category).await {
            Ok(result) => {
                self.sink.publish_scan_finished(&result).await;
                Some(result)
            }
            Err(e) => {
                error!(%category, error = %e, "Scan failed");
                self.sink.publish_scan_failed(category).await;
                None
            }
        }
    }

    /// Send a sign of life. Does not wait for a running scan.
    pub async fn heartbeat(&self) {
        self.sink.publish_heartbeat(Utc::now()).await;
    }

    /// Forget every published object. Waits for a running scan to finish.
    pub async fn clear(&self) -> usize {
        let removed = self.store.lock().await.clear();
        info!(removed, "Cleared dedup store");
        removed
    }

    pub async fn size(&self) -> usize {
        self.store.lock().await.size()
    }
}
