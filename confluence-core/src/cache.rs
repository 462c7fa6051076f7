//! TTL cache of bar series keyed by (symbol, timeframe).
//!
//! Phase 1 of a cycle fills it from the terminal; phase 2 only reads it. An
//! entry older than the TTL is treated as absent and refetched.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{Bar, Timeframe};
use crate::error::DataError;

#[derive(Debug, Clone)]
struct Entry {
    bars: Arc<Vec<Bar>>,
    fetched_at: DateTime<Utc>,
}

/// Summary for logs and the cycle report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub entries: usize,
    pub fresh: usize,
}

#[derive(Debug)]
pub struct DataCache {
    ttl: Duration,
    entries: RwLock<HashMap<(String, Timeframe), Entry>>,
}

impl DataCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached series if it was fetched less than one TTL ago.
    pub fn get_fresh(&self, symbol: &str, timeframe: Timeframe, now: DateTime<Utc>) -> Option<Arc<Vec<Bar>>> {
        let entries = self.entries.read();
        let entry = entries.get(&(symbol.to_string(), timeframe))?;
        (now - entry.fetched_at < self.ttl).then(|| Arc::clone(&entry.bars))
    }

    pub fn insert(&self, symbol: &str, timeframe: Timeframe, bars: Vec<Bar>, now: DateTime<Utc>) -> Arc<Vec<Bar>> {
        let bars = Arc::new(bars);
        self.entries
            .write()
            .insert((symbol.to_string(), timeframe), Entry { bars: Arc::clone(&bars), fetched_at: now });
        bars
    }

    /// Fresh cached series, or `fetch` it and cache the result.
    ///
    /// An empty fetch is `DataError::Unavailable` and is not cached.
    pub fn get_or_fetch<F>(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
        fetch: F,
    ) -> Result<Arc<Vec<Bar>>, DataError>
    where
        F: FnOnce() -> Result<Vec<Bar>, DataError>,
    {
        if let Some(bars) = self.get_fresh(symbol, timeframe, now) {
            return Ok(bars);
        }
        let bars = fetch()?;
        if bars.is_empty() {
            return Err(DataError::Unavailable { symbol: symbol.to_string(), timeframe });
        }
        Ok(self.insert(symbol, timeframe, bars, now))
    }

    pub fn invalidate(&self, symbol: &str) {
        self.entries.write().retain(|(s, _), _| s != symbol);
    }

    /// Drop everything past its TTL. Returns how many entries went.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| now - e.fetched_at < self.ttl);
        before - entries.len()
    }

    pub fn status(&self, now: DateTime<Utc>) -> CacheStatus {
        let entries = self.entries.read();
        CacheStatus {
            entries: entries.len(),
            fresh: entries.values().filter(|e| now - e.fetched_at < self.ttl).count(),
        }
    }
}
