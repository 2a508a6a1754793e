use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::fetch::FetchSettings;
use crate::ingest::http::{send_with_retry, RetryPolicy};
use crate::ingest::providers::json_text;
use crate::ingest::types::{FetchStrategy, FetchedBatch, RawItem};
use crate::registry::SourceDefinition;

/// Hard cap on how many repositories are requested in one call.
pub const MAX_REPOS: usize = 100;
const DEFAULT_REPOS: usize = 25;

/// Trending-repositories API (`GET url?since=..&limit=..&language=..`).
pub struct GithubTrendingStrategy {
    client: Client,
    policy: RetryPolicy,
}

impl GithubTrendingStrategy {
    pub fn new(client: Client, settings: &FetchSettings) -> Self {
        Self {
            client,
            policy: RetryPolicy::new(settings, settings.api_timeout),
        }
    }
}

/// Query parameters for one call; `count` of 0 means "provider default".
pub fn trending_query(source: &SourceDefinition, count: usize) -> Vec<(&'static str, String)> {
    let since = source.option_str("since").unwrap_or("daily");
    let capped = if count > 0 {
        count.min(MAX_REPOS)
    } else {
        DEFAULT_REPOS
    };
    let mut params = vec![("since", since.to_string()), ("limit", capped.to_string())];
    if let Some(lang) = source.option_str("language") {
        params.push(("language", lang.to_string()));
    }
    params
}

/// Map a trending payload to items. Anything but a JSON array is an error.
pub fn parse_trending(payload: &Value, source: &SourceDefinition, count: usize) -> Result<Vec<RawItem>> {
    let Some(repos) = payload.as_array() else {
        bail!("Unexpected GitHub trending payload");
    };

    Ok(repos
        .iter()
        .take(count)
        .map(|repo| {
            let author = json_text(repo, &["author"]).unwrap_or_else(|| "unknown".into());
            let name = json_text(repo, &["name"]).unwrap_or_else(|| "unknown".into());
            let link = json_text(repo, &["url"]).unwrap_or_else(|| "#".into());
            let description =
                json_text(repo, &["description"]).unwrap_or_else(|| "No description".into());
            let stars = json_text(repo, &["stars", "currentPeriodStars"]).unwrap_or_else(|| "0".into());
            let language = json_text(repo, &["language"]).unwrap_or_else(|| "n/a".into());

            let mut item = RawItem::from_source(
                source,
                format!("{author}/{name}"),
                link,
                format!("{description} ⭐ {stars} | {language}").trim().to_string(),
            );
            item.language = "en".into();
            item
        })
        .collect())
}

#[async_trait]
impl FetchStrategy for GithubTrendingStrategy {
    async fn execute(&self, source: &SourceDefinition, limit: usize) -> Result<FetchedBatch> {
        let count = limit * 2;
        let params = trending_query(source, count);
        let resp = send_with_retry(
            || {
                self.client
                    .get(&source.url)
                    .query(&params)
                    .header(reqwest::header::ACCEPT, "application/json")
            },
            self.policy,
            "GitHub trending API",
        )
        .await?;
        let payload: Value = resp.json().await.context("GitHub trending .json()")?;
        Ok(FetchedBatch::live(parse_trending(&payload, source, count)?))
    }

    fn name(&self) -> &'static str {
        "github_trending"
    }

    fn empty_message(&self) -> &'static str {
        "GitHub trending returned no repositories"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StrategyKind;
    use serde_json::json;

    fn source() -> SourceDefinition {
        let mut options = std::collections::BTreeMap::new();
        options.insert("language".to_string(), json!("rust"));
        SourceDefinition {
            id: "gh".into(),
            title: "GitHub Trending".into(),
            strategy: StrategyKind::GithubTrending,
            url: "https://trending.example/repositories".into(),
            language: "en".into(),
            categories: vec![],
            weight: 1.0,
            options,
            fallback_items: vec![],
        }
    }

    #[test]
    fn query_caps_and_defaults() {
        let s = source();
        assert_eq!(
            trending_query(&s, 500),
            vec![
                ("since", "daily".to_string()),
                ("limit", "100".to_string()),
                ("language", "rust".to_string())
            ]
        );
        assert_eq!(trending_query(&s, 0)[1].1, "25");
    }

    #[test]
    fn repo_summary_is_composed_with_defaults() {
        let payload = json!([
            {"author": "tokio-rs", "name": "axum", "url": "https://github.com/tokio-rs/axum",
             "description": "Web framework", "stars": 120, "language": "Rust"},
            {"author": "someone", "name": "thing", "currentPeriodStars": "15", "description": null}
        ]);
        let items = parse_trending(&payload, &source(), 10).unwrap();
        assert_eq!(items[0].title, "tokio-rs/axum");
        assert_eq!(items[0].summary, "Web framework ⭐ 120 | Rust");
        assert_eq!(items[1].link, "#");
        assert_eq!(items[1].summary, "No description ⭐ 15 | n/a");
    }

    #[test]
    fn non_array_payload_is_rejected() {
        let err = parse_trending(&json!({"message": "rate limited"}), &source(), 5).unwrap_err();
        assert!(err.to_string().contains("Unexpected"));
    }
}
