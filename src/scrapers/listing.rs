use super::browser::{load_page, page_html};
use super::session::PageSession;
use super::types::{CompiledSelectors, SiteSelectors};
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{Category, ObjectLink};
use headless_chrome::Tab;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Reads a category index page into object links
pub struct ListingScraper {
    base_url: Url,
    selectors: Arc<CompiledSelectors>,
    listing_selector: String,
    cookie_button: String,
    /// Longest wait for links to render after the cookie overlay is dismissed
    render_wait: Duration,
}

impl ListingScraper {
    pub fn new(
        base_url: Url,
        selectors: Arc<CompiledSelectors>,
        site: &SiteSelectors,
        render_wait: Duration,
    ) -> Self {
        Self {
            base_url,
            selectors,
            listing_selector: site.listing_link.clone(),
            cookie_button: site.cookie_button.clone(),
            render_wait,
        }
    }

    /// Navigate to the category index and collect its detail links. Blocking.
    pub fn fetch_links(
        &self,
        session: &PageSession,
        category: Category,
    ) -> ScrapeResult<Vec<ObjectLink>> {
        let index = category
            .index_url(&self.base_url)
            .map_err(|e| ScrapeError::navigation(self.base_url.as_str(), e))?;

        info!(%category, url = %index, "Opening listing page...");
        let page = session.new_page()?;
        let links = self.read_index(&page, &index, session.options().navigation_timeout)?;
        info!(%category, count = links.len(), "Found listing links");
        Ok(links)
    }

    fn read_index(
        &self,
        page: &Tab,
        index: &Url,
        timeout: Duration,
    ) -> ScrapeResult<Vec<ObjectLink>> {
        let dismissed = load_page(page, index.as_str(), &self.cookie_button, timeout)?;

        // Some index pages render their list only once consent is given
        if dismissed {
            if let Err(e) =
                page.wait_for_element_with_custom_timeout(&self.listing_selector, self.render_wait)
            {
                debug!(url = %index, error = %e, "No listing links rendered after consent");
            }
        }

        let html = page_html(page, index.as_str())?;
        Ok(self.parse_links(&html, index))
    }

    /// Extract detail links from index page HTML, resolving relative hrefs
    /// against `page_url`. Duplicate links keep their first position.
    pub fn parse_links(&self, html: &str, page_url: &Url) -> Vec<ObjectLink> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for anchor in document.select(&self.selectors.listing_link) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let link = match page_url.join(href.trim()) {
                Ok(link) => link,
                Err(e) => {
                    debug!(href, error = %e, "Skipping unparsable listing href");
                    continue;
                }
            };
            if !seen.insert(link.clone()) {
                continue;
            }

            links.push(ObjectLink {
                name: display_name(&anchor),
                link,
            });
        }

        links
    }
}

/// The anchor's `title`, or its heading text when the title is missing
fn display_name(anchor: &ElementRef<'_>) -> String {
    if let Some(title) = anchor.value().attr("title").map(str::trim) {
        if !title.is_empty() {
            return title.to_string();
        }
    }

    let heading = anchor
        .parent()
        .and_then(ElementRef::wrap)
        .unwrap_or(*anchor);
    collapse_whitespace(&heading.text().collect::<String>())
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::session::{PageSession, SessionOptions};

    fn scraper() -> ListingScraper {
        let site = SiteSelectors::default();
        let selectors = CompiledSelectors::compile(&site).unwrap();
        ListingScraper::new(
            Url::parse("https://wahlinfastigheter.se/").unwrap(),
            Arc::new(selectors),
            &site,
            Duration::from_secs(3),
        )
    }

    fn index_url() -> Url {
        Url::parse("https://wahlinfastigheter.se/lediga-objekt/parkering/").unwrap()
    }

    #[test]
    fn extracts_links_in_document_order() {
        let html = r#"
            <html><body>
              <nav><a href="/lediga-objekt/">All objects</a></nav>
              <h3><a href="/lediga-objekt/parkering/garage-12/" title="Garage 12">Garage 12</a></h3>
              <h3><a href="https://wahlinfastigheter.se/lediga-objekt/parkering/p-plats-3/"
                     title="P-plats 3">x</a></h3>
              <h3><a href="/om-oss/" title="About">About</a></h3>
            </body></html>
        "#;

        let links = scraper().parse_links(html, &index_url());

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].name, "Garage 12");
        assert_eq!(
            links[0].link.as_str(),
            "https://wahlinfastigheter.se/lediga-objekt/parkering/garage-12/"
        );
        assert_eq!(links[1].name, "P-plats 3");
    }

    #[test]
    fn falls_back_to_heading_text_without_title() {
        let html = r#"<h3><a href="/lediga-objekt/forrad/f1/">  Förråd
            Sveavägen 1 </a></h3>"#;

        let links = scraper().parse_links(html, &index_url());

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name, "Förråd Sveavägen 1");
    }

    #[test]
    fn repeated_links_are_reported_once() {
        let html = r#"
            <h3><a href="/lediga-objekt/a/" title="A">A</a></h3>
            <h3><a href="/lediga-objekt/b/" title="B">B</a></h3>
            <h3><a href="/lediga-objekt/a/" title="A again">A</a></h3>
        "#;

        let names: Vec<_> = scraper()
            .parse_links(html, &index_url())
            .into_iter()
            .map(|l| l.name)
            .collect();

        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn empty_listing_is_not_an_error() {
        let html = "<html><body><p>Inga lediga objekt just nu.</p></body></html>";
        assert!(scraper().parse_links(html, &index_url()).is_empty());
    }

    #[test]
    #[ignore = "needs a local Chrome install"]
    fn waits_for_links_rendered_after_consent() {
        let html = r#"<html><body>
            <button class="new-cookies-button" onclick="setTimeout(() => {
                document.body.insertAdjacentHTML('beforeend',
                  '<h3><a href=\'https://wahlinfastigheter.se' +
                  '/lediga-objekt/parkering/p1/\' title=\'P1\'>P1</a></h3>');
            }, 1000)">OK</button>
        </body></html>"#;
        let index = Url::parse(&format!("data:text/html,{}", html.replace('\n', " "))).unwrap();

        let session = PageSession::new(SessionOptions::default());
        let page = session.new_page().unwrap();
        let links = scraper()
            .read_index(&page, &index, Duration::from_secs(30))
            .unwrap();

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name, "P1");
    }
}
