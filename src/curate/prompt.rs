//! Chat messages for the curation call.

use serde::Serialize;

use crate::ingest::types::RawItem;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// System instruction for a category that is not in the catalog.
pub fn generic_system_prompt(category_name: &str) -> String {
    format!(
        "You are a research scout tasked with surfacing timely, high-quality knowledge for the following theme: {category_name}. \
Use the supplied source excerpts to identify the most novel, high-signal updates. Return JSON results, keep tone factual, include original links, and avoid speculation."
    )
}

pub fn build_user_prompt(
    category_name: &str,
    focus: &str,
    limit: usize,
    source_hints: &[String],
    feed: &[RawItem],
) -> String {
    let serialized = feed
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let summary = item.summary.split_whitespace().collect::<Vec<_>>().join(" ");
            format!(
                "{}. Title: {}\n   Source: {}\n   Link: {}\n   Summary: {}",
                i + 1,
                item.title,
                item.source_name,
                item.link,
                summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Category: {category_name}\nFocus: {focus}\nSource hints: {hints}\n\n\
You must return {limit} items as a JSON array. Each object must include: title, summary (max 2 sentences), link, categoryId, categoryName, sourceName, reason.\n\
Use the original link from the feed whenever possible.\n\n\
Input feed:\n{serialized}",
        hints = source_hints.join(", ")
    )
}
