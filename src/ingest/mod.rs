// src/ingest/mod.rs
pub mod cache;
pub mod http;
pub mod orchestrator;
pub mod providers;
pub mod types;

use crate::ingest::types::RawItem;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

/// Longest summary kept from a provider payload, in chars.
pub const SUMMARY_MAX_CHARS: usize = 600;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "discovery_source_fetch_total",
            "Source fetch attempts by outcome status."
        );
        describe_counter!(
            "discovery_cache_hits_total",
            "Strategy results served from a result cache."
        );
        describe_counter!(
            "discovery_curation_total",
            "Curation attempts by outcome (used, fallback, skipped)."
        );
        describe_histogram!(
            "discovery_fetch_ms",
            "Wall time of one source fetch in milliseconds."
        );
        describe_histogram!(
            "discovery_feed_parse_ms",
            "Feed document parse time in milliseconds."
        );
        describe_gauge!(
            "discovery_recency_ledger_size",
            "Links currently held by the recency ledger."
        );
    });
}

/// Normalize provider text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 4) Length cap
    if out.chars().count() > SUMMARY_MAX_CHARS {
        out = out.chars().take(SUMMARY_MAX_CHARS).collect::<String>();
        out.push('…');
    }

    out
}

/// Keep the first item per link (title when the link is empty or `#`). Order is preserved.
pub fn dedupe_by_link(items: Vec<RawItem>) -> Vec<RawItem> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|it| seen.insert(it.dedupe_key().to_string()))
        .collect()
}
