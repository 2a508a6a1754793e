//! Turning a model reply into curated items.

use serde_json::Value;

use crate::ingest::types::RawItem;
use crate::model::{default_reason, default_summary, is_http_link, non_empty, CuratedItem};

/// Text of `choices[0].message.content`: a string, an array of parts, or `{text}`.
pub fn extract_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|part| match part {
                Value::String(s) => s.as_str(),
                Value::Object(_) => part
                    .get("text")
                    .and_then(Value::as_str)
                    .or_else(|| part.get("content").and_then(Value::as_str))
                    .unwrap_or(""),
                _ => "",
            })
            .collect(),
        Value::Object(_) => content
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    }
}

/// A JSON array directly, under `items`, or as the outermost `[...]` span of the text.
pub fn parse_json_array(raw: &str) -> Option<Vec<Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => Some(items),
        Ok(v) => match v.get("items") {
            Some(Value::Array(items)) => Some(items.clone()),
            _ => None,
        },
        Err(_) => {
            let start = trimmed.find('[')?;
            let end = trimmed.rfind(']')?;
            if end <= start {
                return None;
            }
            match serde_json::from_str::<Value>(&trimmed[start..=end]) {
                Ok(Value::Array(items)) => Some(items),
                _ => None,
            }
        }
    }
}

/// Map the first `limit` model entries to items, defaulting each field from the raw
/// candidate at the same index (or the first candidate).
pub fn shape_items(
    parsed: &[Value],
    raw: &[RawItem],
    limit: usize,
    category_id: &str,
    category_name: &str,
) -> Vec<CuratedItem> {
    parsed
        .iter()
        .take(limit)
        .enumerate()
        .map(|(index, entry)| {
            let fallback = raw.get(index).or_else(|| raw.first());
            let field = |key: &str| {
                entry
                    .get(key)
                    .and_then(Value::as_str)
                    .and_then(non_empty)
            };
            let fb_source_name = fallback
                .map(|f| f.source_name.clone())
                .unwrap_or_else(|| category_name.to_string());

            let title = field("title")
                .or_else(|| fallback.and_then(|f| non_empty(&f.title)))
                .unwrap_or_else(|| format!("Untitled insight {}", index + 1));
            let summary = field("summary")
                .or_else(|| fallback.and_then(|f| non_empty(&f.summary)))
                .unwrap_or_else(|| default_summary(&fb_source_name));
            let link = field("link")
                .filter(|l| is_http_link(l))
                .or_else(|| {
                    fallback
                        .map(|f| f.link.trim().to_string())
                        .filter(|l| is_http_link(l))
                })
                .unwrap_or_else(|| "#".to_string());
            let source_id = field("sourceId")
                .or_else(|| fallback.map(|f| f.source_id.clone()))
                .unwrap_or_else(|| category_id.to_string());
            let source_name = field("sourceName").unwrap_or_else(|| fb_source_name.clone());
            let reason = field("reason").unwrap_or_else(|| default_reason(&fb_source_name));

            CuratedItem {
                title,
                summary,
                link,
                category_id: category_id.to_string(),
                category_name: category_name.to_string(),
                source_id,
                source_name,
                language: fallback
                    .map(|f| f.language.clone())
                    .unwrap_or_else(|| "en".to_string()),
                reason,
            }
        })
        .collect()
}
