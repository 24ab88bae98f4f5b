use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Kind of rentable object the site lists
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Apartment,
    Storage,
    Parking,
    Commercial,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Apartment,
        Category::Storage,
        Category::Parking,
        Category::Commercial,
    ];

    /// Path of the category's listing index, relative to the site root
    pub fn index_path(self) -> &'static str {
        match self {
            Category::Apartment => "lediga-objekt/lagenheter/",
            Category::Storage => "lediga-objekt/forrad/",
            Category::Parking => "lediga-objekt/parkering/",
            Category::Commercial => "lediga-objekt/lokaler/",
        }
    }

    pub fn index_url(self, base: &Url) -> Result<Url, url::ParseError> {
        base.join(self.index_path())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Apartment => "apartment",
            Category::Storage => "storage",
            Category::Parking => "parking",
            Category::Commercial => "commercial",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        write!(
            f,
            "unknown category '{}', expected one of: {}",
            self.0,
            known.join(", ")
        )
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apartment" | "apartments" | "lagenheter" => Ok(Category::Apartment),
            "storage" | "forrad" => Ok(Category::Storage),
            "parking" | "parkering" => Ok(Category::Parking),
            "commercial" | "lokaler" => Ok(Category::Commercial),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// A listing entry discovered on a category index page.
/// `link` is the object's identity for the rest of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ObjectLink {
    pub name: String,
    pub link: Url,
}

/// One row of the detail page's attribute table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fact {
    pub key: String,
    pub value: String,
}

/// Details fetched for one object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub name: String,
    pub link: Url,
    /// PNG of the description container, `None` when the container was missing
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    pub facts: Vec<Fact>,
    pub scraped_at: DateTime<Utc>,
}

/// Summary of one scan
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub category: Category,
    /// Listed links that were not in the dedup store when the scan started
    pub candidates: usize,
    /// Records fetched and published successfully
    pub new_count: usize,
    pub failures: Vec<ObjectLink>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
