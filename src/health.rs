//! health.rs: per-source fetch bookkeeping, kept for the life of the process.
//!
//! Records are created lazily on the first attempt and never removed. They feed status
//! reporting only; nothing here gates a future fetch.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::SharedClock;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealthEntry {
    pub id: String,
    #[serde(flatten)]
    pub health: SourceHealth,
}

pub struct SourceHealthBook {
    inner: Mutex<HashMap<String, SourceHealth>>,
    clock: SharedClock,
}

impl SourceHealthBook {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn record_success(&self, source_id: &str) -> SourceHealth {
        let now = self.clock.now();
        let mut map = self.inner.lock().expect("health mutex poisoned");
        let entry = map.entry(source_id.to_string()).or_default();
        entry.last_success_at = Some(now);
        entry.last_error = None;
        entry.consecutive_failures = 0;
        entry.clone()
    }

    pub fn record_failure(&self, source_id: &str, error: Option<&str>) -> SourceHealth {
        let now = self.clock.now();
        let mut map = self.inner.lock().expect("health mutex poisoned");
        let entry = map.entry(source_id.to_string()).or_default();
        entry.last_failure_at = Some(now);
        entry.last_error = error.map(str::to_string);
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.clone()
    }

    pub fn get(&self, source_id: &str) -> Option<SourceHealth> {
        self.inner
            .lock()
            .expect("health mutex poisoned")
            .get(source_id)
            .cloned()
    }

    /// All records, sorted by source id.
    pub fn snapshot(&self) -> Vec<SourceHealthEntry> {
        let map = self.inner.lock().expect("health mutex poisoned");
        let mut out: Vec<_> = map
            .iter()
            .map(|(id, h)| SourceHealthEntry {
                id: id.clone(),
                health: h.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
