// src/ingest/orchestrator.rs
//! Per-source fetch: strategy dispatch, fallback substitution, health bookkeeping.
//!
//! [`SourceFetcher::fetch`] never fails. Every strategy error, empty result, or missing
//! strategy ends up as a [`FetchOutcome`] with status `ok`, `fallback` or `error`.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};

use crate::clock::SharedClock;
use crate::health::SourceHealthBook;
use crate::ingest::ensure_metrics_described;
use crate::ingest::providers::StrategyTable;
use crate::ingest::types::{FetchOutcome, FetchStatus, RawItem, SourceStatus};
use crate::registry::SourceDefinition;

/// Reason attached to preset items served in place of a failing source.
pub fn fallback_reason(source_title: &str) -> String {
    format!("Preset content: source \"{source_title}\" is temporarily unavailable")
}

pub struct SourceFetcher {
    strategies: StrategyTable,
    health: Arc<SourceHealthBook>,
    clock: SharedClock,
}

impl SourceFetcher {
    pub fn new(strategies: StrategyTable, health: Arc<SourceHealthBook>, clock: SharedClock) -> Self {
        Self {
            strategies,
            health,
            clock,
        }
    }

    pub fn health(&self) -> &Arc<SourceHealthBook> {
        &self.health
    }

    /// Fetch one source with a per-source item budget of `limit`.
    ///
    /// Live results are capped at `2 * limit`, preset fallback items at `limit`.
    pub async fn fetch(&self, source: &SourceDefinition, limit: usize) -> FetchOutcome {
        ensure_metrics_described();
        let t0 = Instant::now();

        let live = match self.strategies.get(source.strategy) {
            Some(strategy) => match strategy.execute(source, limit).await {
                Ok(batch) if !batch.items.is_empty() => Ok(batch),
                Ok(_) => Err(strategy.empty_message().to_string()),
                Err(e) => {
                    let msg = format!("{e:#}");
                    tracing::warn!(
                        source = %source.id,
                        strategy = strategy.name(),
                        error = %msg,
                        "source fetch failed"
                    );
                    Err(msg)
                }
            },
            None => Err(format!("Unsupported strategy {}", source.strategy.as_str())),
        };
        histogram!("discovery_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let outcome = match live {
            Ok(mut batch) => {
                self.health.record_success(&source.id);
                batch.items.truncate(limit * 2);
                FetchOutcome {
                    status: FetchStatus::Ok,
                    items: batch.items,
                    used_fallback: false,
                    from_cache: batch.from_cache,
                    message: None,
                    fetched_at: self.clock.now(),
                }
            }
            Err(message) => {
                self.health.record_failure(&source.id, Some(&message));
                if source.fallback_items.is_empty() {
                    FetchOutcome {
                        status: FetchStatus::Error,
                        items: Vec::new(),
                        used_fallback: false,
                        from_cache: false,
                        message: Some(message),
                        fetched_at: self.clock.now(),
                    }
                } else {
                    let reason = fallback_reason(&source.title);
                    FetchOutcome {
                        status: FetchStatus::Fallback,
                        items: source
                            .fallback_items
                            .iter()
                            .take(limit)
                            .map(|fb| RawItem::from_fallback(source, fb, &reason))
                            .collect(),
                        used_fallback: true,
                        from_cache: false,
                        message: Some(message),
                        fetched_at: self.clock.now(),
                    }
                }
            }
        };

        counter!("discovery_source_fetch_total", "status" => outcome.status.as_str()).increment(1);
        tracing::debug!(
            source = %source.id,
            status = outcome.status.as_str(),
            items = outcome.items.len(),
            from_cache = outcome.from_cache,
            "source fetched"
        );
        outcome
    }

    /// Status row for a finished fetch, stamped with the current health record.
    pub fn status_for(&self, source: &SourceDefinition, outcome: &FetchOutcome) -> SourceStatus {
        let health = self.health.get(&source.id).unwrap_or_default();
        SourceStatus {
            id: source.id.clone(),
            title: source.title.clone(),
            status: outcome.status,
            used_fallback: outcome.used_fallback,
            from_cache: outcome.from_cache,
            last_success_at: health.last_success_at,
            last_failure_at: health.last_failure_at,
            message: outcome.message.clone(),
        }
    }

    /// Status row for a fetch task that died before producing an outcome.
    pub fn status_for_crash(&self, source: &SourceDefinition, reason: &str) -> SourceStatus {
        let health = self.health.record_failure(&source.id, Some(reason));
        counter!("discovery_source_fetch_total", "status" => FetchStatus::Error.as_str())
            .increment(1);
        SourceStatus {
            id: source.id.clone(),
            title: source.title.clone(),
            status: FetchStatus::Error,
            used_fallback: false,
            from_cache: false,
            last_success_at: health.last_success_at,
            last_failure_at: health.last_failure_at,
            message: Some(reason.to_string()),
        }
    }
}
