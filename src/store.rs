//! In-memory record of objects already published.
//!
//! A link is present exactly when its record was published since the last
//! [`DedupStore::clear`]. There is no per-entry expiry; the store only
//! shrinks through a full clear.

use crate::models::ObjectRecord;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Default)]
pub struct DedupStore {
    records: HashMap<Url, ObjectRecord>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, link: &Url) -> bool {
        self.records.contains_key(link)
    }

    /// Store the record for `link`, replacing any previous one
    pub fn insert(&mut self, link: Url, record: ObjectRecord) {
        self.records.insert(link, record);
    }

    #[cfg(test)]
    pub fn get(&self, link: &Url) -> Option<&ObjectRecord> {
        self.records.get(link)
    }

    /// Drop every entry, returning how many there were
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }
}
