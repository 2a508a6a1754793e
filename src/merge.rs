//! Cross-category merge into the single "all" envelope.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::ingest::types::SourceStatus;
use crate::model::{CuratedItem, DiscoveryMeta, DiscoveryResult};

pub const ALL_ID: &str = "all";
pub const ALL_TITLE: &str = "AI Highlights";
pub const ALL_DESCRIPTION: &str = "AI generated picks merged from every category you follow";

fn item_key(item: &CuratedItem) -> &str {
    let link = item.link.trim();
    if link.is_empty() || link == "#" {
        item.title.trim()
    } else {
        link
    }
}

/// One status per source id. A later status replaces an earlier one when it is at least as
/// severe; the id keeps the position of its first appearance.
pub fn merge_source_statuses(results: &[DiscoveryResult]) -> Vec<SourceStatus> {
    let mut out: Vec<SourceStatus> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for status in results.iter().flat_map(|r| r.meta.source_statuses.iter()) {
        match index.get(&status.id) {
            Some(&i) => {
                if status.status >= out[i].status {
                    out[i] = status.clone();
                }
            }
            None => {
                index.insert(status.id.clone(), out.len());
                out.push(status.clone());
            }
        }
    }
    out
}

/// Concatenate per-category items in input order, dedupe by link, cap at
/// `max(limit * category_count, limit * 2)`.
pub fn merge_results(
    results: Vec<DiscoveryResult>,
    limit: usize,
    category_count: usize,
    now: DateTime<Utc>,
) -> DiscoveryResult {
    let cap = (limit * category_count).max(limit * 2);

    let mut seen: HashSet<String> = HashSet::new();
    let mut unique: Vec<CuratedItem> = Vec::new();
    for item in results.iter().flat_map(|r| r.items.iter()) {
        if seen.insert(item_key(item).to_string()) {
            unique.push(item.clone());
        }
    }
    let raw_item_count = unique.len();
    unique.truncate(cap);

    DiscoveryResult {
        id: ALL_ID.to_string(),
        title: ALL_TITLE.to_string(),
        description: ALL_DESCRIPTION.to_string(),
        items: unique,
        retrieved_at: now,
        meta: DiscoveryMeta {
            fetched_source_count: results.iter().map(|r| r.meta.fetched_source_count).sum(),
            raw_item_count,
            used_ai: results.iter().any(|r| r.meta.used_ai),
            source_statuses: merge_source_statuses(&results),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::FetchStatus;

    fn status(id: &str, s: FetchStatus, msg: &str) -> SourceStatus {
        SourceStatus {
            id: id.into(),
            title: id.into(),
            status: s,
            used_fallback: s == FetchStatus::Fallback,
            from_cache: false,
            last_success_at: None,
            last_failure_at: None,
            message: Some(msg.into()),
        }
    }

    fn item(title: &str, link: &str, cat: &str) -> CuratedItem {
        CuratedItem {
            title: title.into(),
            summary: "s".into(),
            link: link.into(),
            category_id: cat.into(),
            category_name: cat.into(),
            source_id: "src".into(),
            source_name: "Src".into(),
            language: "en".into(),
            reason: "r".into(),
        }
    }

    fn result(id: &str, items: Vec<CuratedItem>, statuses: Vec<SourceStatus>, used_ai: bool) -> DiscoveryResult {
        DiscoveryResult {
            id: id.into(),
            title: id.into(),
            description: String::new(),
            items,
            retrieved_at: Utc::now(),
            meta: DiscoveryMeta {
                fetched_source_count: statuses.len(),
                raw_item_count: 0,
                used_ai,
                source_statuses: statuses,
            },
        }
    }

    #[test]
    fn statuses_keep_first_position_and_worst_status() {
        let a = result(
            "a",
            vec![],
            vec![status("hn", FetchStatus::Ok, "a1"), status("gh", FetchStatus::Error, "a2")],
            false,
        );
        let b = result(
            "b",
            vec![],
            vec![
                status("gh", FetchStatus::Error, "b2"),
                status("hn", FetchStatus::Fallback, "b1"),
                status("ph", FetchStatus::Ok, "b3"),
            ],
            false,
        );
        let merged = merge_source_statuses(&[a, b]);
        let view: Vec<_> = merged
            .iter()
            .map(|s| (s.id.as_str(), s.status, s.message.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(
            view,
            vec![
                ("hn", FetchStatus::Fallback, "b1"),
                ("gh", FetchStatus::Error, "b2"),
                ("ph", FetchStatus::Ok, "b3"),
            ]
        );
    }

    #[test]
    fn ok_does_not_replace_error() {
        let a = result("a", vec![], vec![status("hn", FetchStatus::Error, "boom")], false);
        let b = result("b", vec![], vec![status("hn", FetchStatus::Ok, "")], false);
        let merged = merge_source_statuses(&[a, b]);
        assert_eq!(merged[0].status, FetchStatus::Error);
    }

    #[test]
    fn merge_dedupes_caps_and_sums() {
        let a = result(
            "ai",
            vec![
                item("one", "https://x.example/1", "ai"),
                item("two", "https://x.example/2", "ai"),
                item("hash", "#", "ai"),
            ],
            vec![status("hn", FetchStatus::Ok, "")],
            false,
        );
        let b = result(
            "tech",
            vec![
                item("one again", "https://x.example/1", "tech"),
                item("hash", "#", "tech"),
                item("three", "https://x.example/3", "tech"),
                item("four", "https://x.example/4", "tech"),
                item("five", "https://x.example/5", "tech"),
                item("six", "https://x.example/6", "tech"),
                item("seven", "https://x.example/7", "tech"),
            ],
            vec![status("v2", FetchStatus::Ok, ""), status("gh", FetchStatus::Ok, "")],
            true,
        );

        let now = Utc::now();
        let merged = merge_results(vec![a, b], 3, 2, now);
        assert_eq!(merged.id, "all");
        assert_eq!(merged.title, "AI Highlights");
        assert_eq!(merged.retrieved_at, now);
        assert_eq!(merged.meta.raw_item_count, 8);
        assert_eq!(merged.items.len(), 6);
        assert_eq!(merged.items[0].category_id, "ai");
        assert_eq!(merged.items[3].title, "three");
        assert_eq!(merged.meta.fetched_source_count, 3);
        assert!(merged.meta.used_ai);
    }

    #[test]
    fn single_category_cap_is_twice_the_limit() {
        let items: Vec<_> = (0..10)
            .map(|n| item(&format!("t{n}"), &format!("https://x.example/{n}"), "ai"))
            .collect();
        let merged = merge_results(vec![result("ai", items, vec![], false)], 3, 1, Utc::now());
        assert_eq!(merged.items.len(), 6);
        assert!(!merged.meta.used_ai);
    }
}
