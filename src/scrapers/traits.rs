use crate::error::ScrapeResult;
use crate::models::{Category, ObjectLink, ObjectRecord};
use async_trait::async_trait;

/// Source of listings and object details for the publish pipeline
#[async_trait]
pub trait SiteScraper: Send + Sync {
    /// Make sure the underlying session is up before a scan starts.
    /// An error here aborts the scan.
    async fn prepare(&self) -> ScrapeResult<()> {
        Ok(())
    }

    /// Links currently listed for a category, in page order
    async fn fetch_links(&self, category: Category) -> ScrapeResult<Vec<ObjectLink>>;

    /// Full record for one listed object
    async fn fetch_detail(&self, link: &ObjectLink) -> ScrapeResult<ObjectRecord>;

    /// Get the name of the scraper source
    fn source_name(&self) -> &'static str;
}
