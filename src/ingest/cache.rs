// src/ingest/cache.rs
//! Best-effort result cache with a per-entry TTL.
//!
//! Not authoritative: a miss just means another network call. Expired entries are dropped
//! lazily when an insert pushes the map past its sweep threshold.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;

use crate::clock::SharedClock;

const DEFAULT_SWEEP_THRESHOLD: usize = 512;

pub struct TtlCache<V> {
    name: &'static str,
    inner: Mutex<HashMap<String, (DateTime<Utc>, V)>>,
    ttl: Duration,
    sweep_threshold: usize,
    clock: SharedClock,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, ttl: StdDuration, clock: SharedClock) -> Self {
        Self {
            name,
            inner: Mutex::new(HashMap::new()),
            ttl: to_chrono(ttl),
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            clock,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_with_ttl(key, self.ttl)
    }

    /// Lookup with a caller-supplied TTL (per-source overrides).
    pub fn get_fresh(&self, key: &str, ttl: StdDuration) -> Option<V> {
        self.get_with_ttl(key, to_chrono(ttl))
    }

    fn get_with_ttl(&self, key: &str, ttl: Duration) -> Option<V> {
        let now = self.clock.now();
        let map = self.inner.lock().expect("cache mutex poisoned");
        let hit = map
            .get(key)
            .filter(|(at, _)| now.signed_duration_since(*at) < ttl)
            .map(|(_, v)| v.clone());
        if hit.is_some() {
            counter!("discovery_cache_hits_total", "cache" => self.name).increment(1);
        }
        hit
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let now = self.clock.now();
        let mut map = self.inner.lock().expect("cache mutex poisoned");
        map.insert(key.into(), (now, value));
        if map.len() > self.sweep_threshold {
            let ttl = self.ttl;
            map.retain(|_, (at, _)| now.signed_duration_since(*at) < ttl);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn to_chrono(d: StdDuration) -> Duration {
    Duration::from_std(d).unwrap_or_else(|_| Duration::days(3650))
}
