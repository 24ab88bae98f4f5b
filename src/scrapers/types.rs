use crate::error::{ScrapeError, ScrapeResult};
use scraper::Selector;
use serde::Deserialize;

/// CSS selectors describing the target site's markup.
///
/// Loadable from JSON; omitted fields keep their default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    /// Anchors on an index page that point at detail pages
    pub listing_link: String,
    /// Consent overlay button, clicked if present
    pub cookie_button: String,
    /// Detail page description region, also the screenshot target
    pub description: String,
    /// Heading inside the description region
    pub title: String,
    pub fact_key: String,
    pub fact_value: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            listing_link: r#"h3 > a[href*="/lediga-objekt/"]"#.to_string(),
            cookie_button: ".new-cookies-button".to_string(),
            description: "div.fastighet".to_string(),
            title: "div.fastighet > div > h2".to_string(),
            fact_key: "div.fastighet .fakta dt".to_string(),
            fact_value: "div.fastighet .fakta dd".to_string(),
        }
    }
}

/// Parsed form of [`SiteSelectors`]
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub listing_link: Selector,
    pub description: Selector,
    pub title: Selector,
    pub fact_key: Selector,
    pub fact_value: Selector,
}

impl CompiledSelectors {
    pub fn compile(selectors: &SiteSelectors) -> ScrapeResult<Self> {
        Ok(Self {
            listing_link: parse(&selectors.listing_link)?,
            description: parse(&selectors.description)?,
            title: parse(&selectors.title)?,
            fact_key: parse(&selectors.fact_key)?,
            fact_value: parse(&selectors.fact_value)?,
        })
    }
}

fn parse(selector: &str) -> ScrapeResult<Selector> {
    Selector::parse(selector).map_err(|e| ScrapeError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}
