//! Search-results API. One concrete provider (`serpapi`), selected by the `provider` option.
//!
//! Results are cached in their own long-lived cache; queries cost money.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::clock::SharedClock;
use crate::config::fetch::FetchSettings;
use crate::ingest::cache::TtlCache;
use crate::ingest::http::{send_with_retry, RetryPolicy};
use crate::ingest::providers::json_text;
use crate::ingest::types::{FetchStrategy, FetchedBatch, RawItem};
use crate::registry::SourceDefinition;

const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";
const RESULT_ARRAYS: [&str; 3] = ["news_results", "organic_results", "articles_results"];

pub struct SearchStrategy {
    client: Client,
    policy: RetryPolicy,
    api_key: Option<String>,
    cache: TtlCache<Vec<RawItem>>,
}

/// Resolved request for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub endpoint: String,
    pub query: String,
    pub engine: String,
    pub num: usize,
    pub gl: Option<String>,
    pub hl: Option<String>,
}

impl SearchRequest {
    /// `want` is how many items the caller needs; `num` is clamped into [10, 20].
    pub fn for_source(source: &SourceDefinition, want: usize) -> Self {
        let endpoint = if source.url.starts_with("https://") || source.url.starts_with("http://") {
            source.url.clone()
        } else {
            SERPAPI_ENDPOINT.to_string()
        };
        let default_num = (want * 2) as f64;
        let num = source
            .option_f64("num")
            .unwrap_or(default_num)
            .round()
            .clamp(10.0, 20.0) as usize;

        Self {
            endpoint,
            query: source
                .option_str("query")
                .map(str::to_string)
                .unwrap_or_else(|| source.title.clone()),
            engine: source
                .option_str("engine")
                .unwrap_or("google_news")
                .to_string(),
            num,
            gl: source.option_str("gl").map(str::to_string),
            hl: source.option_str("hl").map(str::to_string),
        }
    }

    pub fn cache_key(&self, source_id: &str) -> String {
        json!({
            "id": source_id,
            "query": self.query,
            "engine": self.engine,
            "gl": self.gl,
            "hl": self.hl,
            "num": self.num,
        })
        .to_string()
    }
}

impl SearchStrategy {
    pub fn new(client: Client, settings: &FetchSettings, clock: SharedClock) -> Self {
        Self {
            client,
            policy: RetryPolicy::new(settings, settings.search_timeout),
            api_key: settings.serpapi_key.clone(),
            cache: TtlCache::new("search", settings.search_cache_ttl, clock),
        }
    }

    async fn serpapi(&self, source: &SourceDefinition, want: usize) -> Result<FetchedBatch> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("SERPAPI_API_KEY not configured"))?;

        let req = SearchRequest::for_source(source, want);
        let key = req.cache_key(&source.id);
        let cached = match source.option_f64("cacheTtlMs").filter(|ms| *ms > 0.0) {
            Some(ms) => self.cache.get_fresh(&key, Duration::from_millis(ms as u64)),
            None => self.cache.get(&key),
        };
        if let Some(mut items) = cached {
            items.truncate(want);
            return Ok(FetchedBatch::cached(items));
        }

        let mut params: Vec<(&str, String)> = vec![
            ("api_key", api_key.to_string()),
            ("engine", req.engine.clone()),
            ("q", req.query.clone()),
            ("output", "json".to_string()),
            ("num", req.num.to_string()),
        ];
        if let Some(gl) = &req.gl {
            params.push(("gl", gl.clone()));
        }
        if let Some(hl) = &req.hl {
            params.push(("hl", hl.clone()));
        }

        let resp = send_with_retry(
            || self.client.get(&req.endpoint).query(&params),
            self.policy,
            "SerpAPI",
        )
        .await?;
        let payload: Value = resp.json().await.context("SerpAPI .json()")?;
        let items = parse_search_payload(&payload, source);

        if !items.is_empty() {
            self.cache.insert(key, items.clone());
        }
        let mut items = items;
        items.truncate(want);
        Ok(FetchedBatch::live(items))
    }
}

/// Merge every known result array into items, first occurrence per link wins.
pub fn parse_search_payload(payload: &Value, source: &SourceDefinition) -> Vec<RawItem> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    let candidates = RESULT_ARRAYS
        .iter()
        .filter_map(|k| payload.get(*k).and_then(Value::as_array))
        .flatten();

    for entry in candidates {
        let title = json_text(entry, &["title", "name"]).unwrap_or_default();
        let link = json_text(entry, &["link", "url"]).unwrap_or_default();
        let summary = json_text(entry, &["snippet", "description", "content"]).unwrap_or_default();
        let (title, link, summary) = (title.trim(), link.trim(), summary.trim());

        if title.is_empty() || link.is_empty() || !seen.insert(link.to_string()) {
            continue;
        }
        let summary = if summary.is_empty() { title } else { summary };
        out.push(RawItem::from_source(source, title, link, summary));
    }
    out
}

#[async_trait]
impl FetchStrategy for SearchStrategy {
    async fn execute(&self, source: &SourceDefinition, limit: usize) -> Result<FetchedBatch> {
        let provider = source.option_str("provider").unwrap_or("serpapi");
        match provider {
            "serpapi" => self.serpapi(source, limit * 2).await,
            other => bail!("Unsupported search provider: {other}"),
        }
    }

    fn name(&self) -> &'static str {
        "search"
    }

    fn empty_message(&self) -> &'static str {
        "Search provider returned no articles"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StrategyKind;
    use std::collections::BTreeMap;

    fn source(options: Value) -> SourceDefinition {
        let options: BTreeMap<String, Value> = serde_json::from_value(options).unwrap();
        SourceDefinition {
            id: "ai-news-search".into(),
            title: "AI News Search".into(),
            strategy: StrategyKind::Search,
            url: "serpapi".into(),
            language: "en".into(),
            categories: vec![],
            weight: 0.5,
            options,
            fallback_items: vec![],
        }
    }

    #[test]
    fn request_defaults_and_num_clamp() {
        let r = SearchRequest::for_source(&source(json!({})), 3);
        assert_eq!(r.endpoint, SERPAPI_ENDPOINT);
        assert_eq!(r.query, "AI News Search");
        assert_eq!(r.engine, "google_news");
        assert_eq!(r.num, 10);

        let r = SearchRequest::for_source(&source(json!({"num": 50, "query": "rust async", "gl": "us"})), 3);
        assert_eq!(r.num, 20);
        assert_eq!(r.query, "rust async");
        assert_eq!(r.gl.as_deref(), Some("us"));
    }

    #[test]
    fn cache_key_changes_with_query() {
        let a = SearchRequest::for_source(&source(json!({"query": "a"})), 4);
        let b = SearchRequest::for_source(&source(json!({"query": "b"})), 4);
        assert_ne!(a.cache_key("x"), b.cache_key("x"));
        assert_eq!(a.cache_key("x"), a.clone().cache_key("x"));
    }

    #[test]
    fn payload_shapes_are_merged_and_deduped() {
        let payload = json!({
            "news_results": [
                {"title": "One", "link": "https://n.example/1", "snippet": "first"},
                {"title": "", "link": "https://n.example/skip"}
            ],
            "organic_results": [
                {"name": "Two", "url": "https://n.example/2", "description": "second"},
                {"title": "Dup", "link": "https://n.example/1"}
            ],
            "articles_results": [
                {"title": "Three", "link": "https://n.example/3"}
            ],
            "other": [{"title": "ignored", "link": "https://n.example/x"}]
        });
        let items = parse_search_payload(&payload, &source(json!({})));
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
        assert_eq!(items[2].summary, "Three");
    }

    #[tokio::test]
    async fn unknown_provider_and_missing_key_fail_fast() {
        let s = SearchStrategy::new(
            Client::new(),
            &FetchSettings::default(),
            crate::clock::system_clock(),
        );
        let err = s.execute(&source(json!({"provider": "bing"})), 3).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported search provider"));
        let err = s.execute(&source(json!({})), 3).await.unwrap_err();
        assert!(err.to_string().contains("SERPAPI_API_KEY"));
    }
}
