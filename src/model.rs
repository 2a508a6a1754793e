//! Response types handed back to callers. Plain data, JSON-serializable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::types::{RawItem, SourceStatus};

/// Final output unit. `link` is an absolute http(s) URL or `#`; `title` and `summary` are
/// never empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CuratedItem {
    pub title: String,
    pub summary: String,
    pub link: String,
    pub category_id: String,
    pub category_name: String,
    pub source_id: String,
    pub source_name: String,
    pub language: String,
    pub reason: String,
}

impl CuratedItem {
    /// Deterministic formatting of a raw candidate at position `index` (0-based).
    pub fn from_raw(item: &RawItem, index: usize, category_id: &str, category_name: &str) -> Self {
        Self {
            title: non_empty(&item.title)
                .unwrap_or_else(|| format!("{category_name} Insight {}", index + 1)),
            summary: non_empty(&item.summary)
                .unwrap_or_else(|| default_summary(&item.source_name)),
            link: sanitize_link(&item.link),
            category_id: category_id.to_string(),
            category_name: category_name.to_string(),
            source_id: item.source_id.clone(),
            source_name: item.source_name.clone(),
            language: item.language.clone(),
            reason: item
                .reason
                .as_deref()
                .and_then(non_empty)
                .unwrap_or_else(|| default_reason(&item.source_name)),
        }
    }
}

pub fn default_summary(source_name: &str) -> String {
    format!("Latest discussion from {source_name}.")
}

pub fn default_reason(source_name: &str) -> String {
    format!("From {source_name}")
}

/// Absolute http(s) link, or `#`.
pub fn sanitize_link(link: &str) -> String {
    let trimmed = link.trim();
    if is_http_link(trimmed) {
        trimmed.to_string()
    } else {
        "#".to_string()
    }
}

pub fn is_http_link(link: &str) -> bool {
    (link.starts_with("http://") || link.starts_with("https://"))
        && url::Url::parse(link).is_ok()
}

pub(crate) fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMeta {
    pub fetched_source_count: usize,
    pub raw_item_count: usize,
    #[serde(rename = "usedAI")]
    pub used_ai: bool,
    pub source_statuses: Vec<SourceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub id: String,
    pub title: String,
    pub description: String,
    pub items: Vec<CuratedItem>,
    pub retrieved_at: DateTime<Utc>,
    pub meta: DiscoveryMeta,
}

/// One category of a cross-category request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategorySpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str, link: &str, summary: &str, reason: Option<&str>) -> RawItem {
        RawItem {
            title: title.into(),
            link: link.into(),
            summary: summary.into(),
            source_id: "hn".into(),
            source_name: "Hacker News".into(),
            language: "en".into(),
            reason: reason.map(str::to_string),
            used_fallback: false,
        }
    }

    #[test]
    fn deterministic_format_fills_every_blank() {
        let it = CuratedItem::from_raw(&raw("", "", "  ", None), 2, "tech", "Tech");
        assert_eq!(it.title, "Tech Insight 3");
        assert_eq!(it.summary, "Latest discussion from Hacker News.");
        assert_eq!(it.link, "#");
        assert_eq!(it.reason, "From Hacker News");
        assert_eq!(it.category_id, "tech");
    }

    #[test]
    fn links_must_be_absolute_http() {
        assert_eq!(sanitize_link(" https://a.example/x "), "https://a.example/x");
        assert_eq!(sanitize_link("/relative/path"), "#");
        assert_eq!(sanitize_link("ftp://a.example"), "#");
        assert_eq!(sanitize_link("https://"), "#");
    }

    #[test]
    fn meta_serializes_used_ai_key() {
        let meta = DiscoveryMeta {
            fetched_source_count: 1,
            raw_item_count: 2,
            used_ai: true,
            source_statuses: vec![],
        };
        let v = serde_json::to_value(&meta).unwrap();
        assert_eq!(v["usedAI"], true);
        assert_eq!(v["fetchedSourceCount"], 1);
    }
}
