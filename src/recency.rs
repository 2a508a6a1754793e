//! # Recency Ledger
//! Process-wide memory of links already surfaced to callers (default TTL 48h).
//!
//! Entries are only evicted opportunistically: once the ledger grows past the sweep
//! threshold, the next `mark_seen` drops everything older than the TTL. An expired entry
//! that has not been swept yet stays in the map but no longer suppresses its link.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use metrics::gauge;

use crate::clock::SharedClock;
use crate::ingest::types::RawItem;

pub const DEFAULT_TTL_HOURS: i64 = 48;
pub const DEFAULT_SWEEP_THRESHOLD: usize = 2048;

/// Thread-safe link -> last-seen map.
pub struct RecencyLedger {
    inner: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
    sweep_threshold: usize,
    clock: SharedClock,
}

impl std::fmt::Debug for RecencyLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecencyLedger")
            .field("ttl", &self.ttl)
            .field("sweep_threshold", &self.sweep_threshold)
            .field("len", &self.len())
            .finish()
    }
}

impl RecencyLedger {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_settings(
            clock,
            Duration::hours(DEFAULT_TTL_HOURS),
            DEFAULT_SWEEP_THRESHOLD,
        )
    }

    pub fn with_settings(clock: SharedClock, ttl: Duration, sweep_threshold: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
            sweep_threshold,
            clock,
        }
    }

    /// True when `link` was surfaced within the TTL.
    pub fn is_recent(&self, link: &str) -> bool {
        let now = self.clock.now();
        let inner = self.inner.lock().expect("recency ledger mutex poisoned");
        inner
            .get(link)
            .map(|seen| now.signed_duration_since(*seen) <= self.ttl)
            .unwrap_or(false)
    }

    /// Drop items whose link was surfaced within the TTL. Order is preserved.
    pub fn filter_fresh(&self, items: &[RawItem]) -> Vec<RawItem> {
        let now = self.clock.now();
        let inner = self.inner.lock().expect("recency ledger mutex poisoned");
        items
            .iter()
            .filter(|it| match inner.get(it.link.as_str()) {
                Some(seen) => now.signed_duration_since(*seen) > self.ttl,
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Stamp every real link with the current time. `#` and empty links are ignored.
    pub fn mark_seen<'a, I>(&self, links: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let now = self.clock.now();
        let mut inner = self.inner.lock().expect("recency ledger mutex poisoned");
        let mut marks = 0usize;
        for link in links {
            let link = link.trim();
            if link.is_empty() || link == "#" {
                continue;
            }
            inner.insert(link.to_string(), now);
            marks += 1;
        }

        if marks > 0 && inner.len() > self.sweep_threshold {
            let ttl = self.ttl;
            let before = inner.len();
            inner.retain(|_, seen| now.signed_duration_since(*seen) <= ttl);
            tracing::debug!(evicted = before - inner.len(), "recency ledger swept");
        }
        gauge!("discovery_recency_ledger_size").set(inner.len() as f64);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("recency ledger mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("recency ledger mutex poisoned")
            .clear();
    }
}
