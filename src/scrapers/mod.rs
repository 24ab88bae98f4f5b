pub mod browser;
pub mod detail;
pub mod listing;
pub mod network;
pub mod session;
pub mod traits;
pub mod types;

pub use browser::BrowserScraper;
pub use session::{PageSession, SessionOptions};
pub use traits::SiteScraper;
pub use types::SiteSelectors;
