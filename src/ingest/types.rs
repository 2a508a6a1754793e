// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::{FallbackItem, SourceDefinition};

/// Candidate item produced by one source fetch. Lives for one aggregation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source_id: String,
    pub source_name: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub used_fallback: bool,
}

impl RawItem {
    /// Live item attributed to `source`.
    pub fn from_source(
        source: &SourceDefinition,
        title: impl Into<String>,
        link: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            summary: summary.into(),
            source_id: source.id.clone(),
            source_name: source.title.clone(),
            language: source.language.clone(),
            reason: None,
            used_fallback: false,
        }
    }

    /// Preset item with a disclosure reason.
    pub fn from_fallback(source: &SourceDefinition, item: &FallbackItem, reason: &str) -> Self {
        Self {
            title: item.title.clone(),
            link: item.link.clone(),
            summary: item.summary.clone(),
            source_id: source.id.clone(),
            source_name: source.title.clone(),
            language: source.language.clone(),
            reason: Some(reason.to_string()),
            used_fallback: true,
        }
    }

    /// Identity used for dedupe: link, or title when the link is absent or `#`.
    pub fn dedupe_key(&self) -> &str {
        let link = self.link.trim();
        if link.is_empty() || link == "#" {
            self.title.trim()
        } else {
            link
        }
    }
}

/// What a strategy hands back: items plus whether they came out of a cache.
#[derive(Debug, Clone, Default)]
pub struct FetchedBatch {
    pub items: Vec<RawItem>,
    pub from_cache: bool,
}

impl FetchedBatch {
    pub fn live(items: Vec<RawItem>) -> Self {
        Self {
            items,
            from_cache: false,
        }
    }

    pub fn cached(items: Vec<RawItem>) -> Self {
        Self {
            items,
            from_cache: true,
        }
    }
}

/// One retrieval mechanism. Errors are hard failures; the orchestrator turns them into outcomes.
#[async_trait::async_trait]
pub trait FetchStrategy: Send + Sync {
    async fn execute(&self, source: &SourceDefinition, limit: usize) -> Result<FetchedBatch>;
    fn name(&self) -> &'static str;

    /// Outcome message when a call succeeds but yields nothing usable.
    fn empty_message(&self) -> &'static str {
        "Source returned no items"
    }
}

/// Ordered by severity: `Ok < Fallback < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Ok,
    Fallback,
    Error,
}

impl FetchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchStatus::Ok => "ok",
            FetchStatus::Fallback => "fallback",
            FetchStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: FetchStatus,
    pub items: Vec<RawItem>,
    pub used_fallback: bool,
    pub from_cache: bool,
    pub message: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Per-source outcome summary attached to a discovery result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub id: String,
    pub title: String,
    pub status: FetchStatus,
    pub used_fallback: bool,
    pub from_cache: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
