use super::browser::{load_page, page_html};
use super::listing::collapse_whitespace;
use super::session::{PageHandle, PageSession};
use super::types::CompiledSelectors;
use crate::error::ScrapeResult;
use crate::models::{Fact, ObjectLink, ObjectRecord};
use chrono::Utc;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use scraper::Html;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What could be read from a detail page's HTML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPage {
    pub name: String,
    pub facts: Vec<Fact>,
    pub has_description: bool,
}

/// Fetches one object's detail page: title, fact table and a screenshot of
/// the description region.
pub struct DetailScraper {
    selectors: Arc<CompiledSelectors>,
    description_selector: String,
    cookie_button: String,
    settle_delay: Duration,
}

impl DetailScraper {
    pub fn new(
        selectors: Arc<CompiledSelectors>,
        description_selector: String,
        cookie_button: String,
        settle_delay: Duration,
    ) -> Self {
        Self {
            selectors,
            description_selector,
            cookie_button,
            settle_delay,
        }
    }

    /// Blocking. The tab is closed on every return path when `page` drops.
    pub fn fetch_detail(
        &self,
        session: &PageSession,
        link: &ObjectLink,
    ) -> ScrapeResult<ObjectRecord> {
        debug!(link = %link.link, "Opening detail page...");
        let page = session.new_page()?;
        load_page(
            &page,
            link.link.as_str(),
            &self.cookie_button,
            session.options().navigation_timeout,
        )?;

        // Fact tables are filled in by scripts after the network goes quiet
        thread::sleep(self.settle_delay);

        let html = page_html(&page, link.link.as_str())?;
        let detail = self.parse_detail(&html, &link.name);

        let screenshot = if detail.has_description {
            self.capture_description(&page, link)
        } else {
            info!(link = %link.link, "No description on page, skipping screenshot");
            None
        };

        Ok(ObjectRecord {
            name: detail.name,
            link: link.link.clone(),
            screenshot,
            facts: detail.facts,
            scraped_at: Utc::now(),
        })
    }

    /// Read title and facts from detail page HTML. Never fails: a missing
    /// heading falls back to `fallback_name`, missing facts give an empty list.
    pub fn parse_detail(&self, html: &str, fallback_name: &str) -> DetailPage {
        let document = Html::parse_document(html);

        let name = document
            .select(&self.selectors.title)
            .next()
            .map(|h| collapse_whitespace(&h.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_name.to_string());

        let keys: Vec<String> = document
            .select(&self.selectors.fact_key)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect();
        let values: Vec<String> = document
            .select(&self.selectors.fact_value)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect();

        let has_description = document.select(&self.selectors.description).next().is_some();

        DetailPage {
            name,
            facts: pair_facts(keys, values),
            has_description,
        }
    }

    fn capture_description(&self, page: &PageHandle, link: &ObjectLink) -> Option<Vec<u8>> {
        let shot = page
            .find_element(&self.description_selector)
            .and_then(|element| element.capture_screenshot(CaptureScreenshotFormatOption::Png));

        match shot {
            Ok(png) => {
                debug!(link = %link.link, bytes = png.len(), "Captured description screenshot");
                Some(png)
            }
            Err(e) => {
                warn!(link = %link.link, error = %e, "Description screenshot failed");
                None
            }
        }
    }
}

/// Pair keys and values by position. Extra entries on either side are dropped.
pub fn pair_facts(keys: Vec<String>, values: Vec<String>) -> Vec<Fact> {
    if keys.len() != values.len() {
        warn!(
            keys = keys.len(),
            values = values.len(),
            "Fact table has mismatched key/value counts, truncating"
        );
    }

    keys.into_iter()
        .zip(values)
        .map(|(key, value)| Fact { key, value })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::types::SiteSelectors;

    fn fact(key: &str, value: &str) -> Fact {
        Fact {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn scraper() -> DetailScraper {
        let site = SiteSelectors::default();
        let selectors = CompiledSelectors::compile(&site).unwrap();
        DetailScraper::new(
            Arc::new(selectors),
            site.description,
            site.cookie_button,
            Duration::from_millis(0),
        )
    }

    #[test]
    fn reads_title_and_facts_in_order() {
        let html = r#"
            <div class="fastighet">
              <div><h2> Garage Hornsgatan 12 </h2></div>
              <dl class="fakta">
                <dt> Storlek </dt><dd> 14 m² </dd>
                <dt>Hyra</dt><dd>1 450 kr/mån</dd>
                <dt>Våning</dt><dd>-1</dd>
              </dl>
            </div>
        "#;

        let page = scraper().parse_detail(html, "fallback");

        assert_eq!(page.name, "Garage Hornsgatan 12");
        assert!(page.has_description);
        let facts: Vec<_> = page
            .facts
            .iter()
            .map(|f| (f.key.as_str(), f.value.as_str()))
            .collect();
        assert_eq!(
            facts,
            vec![("Storlek", "14 m²"), ("Hyra", "1 450 kr/mån"), ("Våning", "-1")]
        );
    }

    #[test]
    fn extra_key_is_dropped() {
        let html = r#"
            <div class="fastighet"><dl class="fakta">
              <dt>Storlek</dt><dt>Hyra</dt><dt>Våning</dt>
              <dd>14 m²</dd><dd>1 450 kr</dd>
            </dl></div>
        "#;

        let page = scraper().parse_detail(html, "P-plats 3");

        assert_eq!(page.facts.len(), 2);
        assert_eq!(page.facts[0], fact("Storlek", "14 m²"));
        assert_eq!(page.facts[1], fact("Hyra", "1 450 kr"));
    }

    #[test]
    fn missing_description_degrades() {
        let html = "<html><body><h1>Objektet är uthyrt</h1></body></html>";

        let page = scraper().parse_detail(html, "P-plats 3");

        assert_eq!(page.name, "P-plats 3");
        assert!(page.facts.is_empty());
        assert!(!page.has_description);
    }

    #[test]
    fn blank_heading_uses_fallback_name() {
        let html = r#"<div class="fastighet"><div><h2>   </h2></div></div>"#;

        let page = scraper().parse_detail(html, "Förråd 7");

        assert_eq!(page.name, "Förråd 7");
        assert!(page.has_description);
    }

    #[test]
    fn pair_facts_truncates_to_shorter_side() {
        let facts = pair_facts(vec!["a".into()], vec!["1".into(), "2".into()]);
        assert_eq!(facts, vec![fact("a", "1")]);
    }
}
