//! Bounded, url-keyed cache of history records.

use std::collections::HashMap;

use tabhive_core::history::HistoryRecord;

/// Default number of records kept.
pub const DEFAULT_CAPACITY: usize = 240;

/// Url-keyed history cache that keeps the most recently visited records.
#[derive(Debug, Clone)]
pub struct HistoryCache {
    entries: HashMap<String, HistoryRecord>,
    capacity: usize,
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl HistoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or merge a record, then evict down to capacity.
    ///
    /// Merging keeps the newest visit time, the larger counters and the
    /// incoming title unless it is empty. Returns whether the cache changed.
    pub fn upsert(&mut self, record: HistoryRecord) -> bool {
        if record.url.is_empty() {
            return false;
        }
        let changed = match self.entries.get_mut(&record.url) {
            Some(existing) => {
                let before = existing.clone();
                existing.last_visit_time = existing.last_visit_time.max(record.last_visit_time);
                existing.visit_count = existing.visit_count.max(record.visit_count);
                existing.typed_count = existing.typed_count.max(record.typed_count);
                if !record.title.is_empty() {
                    existing.title = record.title;
                }
                *existing != before
            }
            None => {
                self.entries.insert(record.url.clone(), record);
                true
            }
        };
        if self.entries.len() > self.capacity {
            self.evict();
        }
        changed
    }

    /// Merge many records at once. Returns how many changed the cache.
    pub fn prime(&mut self, records: impl IntoIterator<Item = HistoryRecord>) -> usize {
        records
            .into_iter()
            .map(|record| self.upsert(record))
            .filter(|changed| *changed)
            .count()
    }

    pub fn get(&self, url: &str) -> Option<&HistoryRecord> {
        self.entries.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn remove(&mut self, url: &str) -> Option<HistoryRecord> {
        self.entries.remove(url)
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Most recent records first, at most `limit` of them.
    pub fn recent(&self, limit: usize) -> Vec<HistoryRecord> {
        let mut records = self.sorted();
        records.truncate(limit);
        records
    }

    fn sorted(&self) -> Vec<HistoryRecord> {
        let mut records: Vec<HistoryRecord> = self.entries.values().cloned().collect();
        records.sort_by(|a, b| {
            b.last_visit_time
                .cmp(&a.last_visit_time)
                .then_with(|| a.url.cmp(&b.url))
        });
        records
    }

    fn evict(&mut self) {
        let keep = self.recent(self.capacity);
        let evicted = self.entries.len() - keep.len();
        self.entries = keep.into_iter().map(|r| (r.url.clone(), r)).collect();
        tracing::debug!(evicted, capacity = self.capacity, "History cache evicted records");
    }
}
