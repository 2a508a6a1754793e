use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::fetch::FetchSettings;
use crate::ingest::http::{send_with_retry, RetryPolicy};
use crate::ingest::providers::json_text_nonempty;
use crate::ingest::types::{FetchStrategy, FetchedBatch, RawItem};
use crate::registry::SourceDefinition;

const MAX_POSTS: usize = 100;
const DEFAULT_POSTS: usize = 25;
const HOMEPAGE: &str = "https://www.producthunt.com";

/// Product-launch GraphQL API, top posts by votes. Needs a bearer token.
pub struct ProductHuntStrategy {
    client: Client,
    policy: RetryPolicy,
    token: Option<String>,
}

impl ProductHuntStrategy {
    pub fn new(client: Client, settings: &FetchSettings) -> Self {
        Self {
            client,
            policy: RetryPolicy::new(settings, settings.graphql_timeout),
            token: settings.producthunt_token.clone(),
        }
    }
}

pub fn posts_query(count: usize) -> String {
    let first = if count > 0 {
        count.min(MAX_POSTS)
    } else {
        DEFAULT_POSTS
    };
    format!(
        "query {{ posts(first: {first}, order: VOTES) {{ edges {{ node {{ id name tagline description url votesCount makers {{ name }} topics {{ edges {{ node {{ name }} }} }} }} }} }} }}"
    )
}

/// Map a GraphQL response to items. A top-level `errors` array is an error.
pub fn parse_posts(payload: &Value, source: &SourceDefinition, count: usize) -> Result<Vec<RawItem>> {
    if let Some(errors) = payload.get("errors").filter(|e| !e.is_null()) {
        let joined = errors
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_else(|| errors.to_string());
        bail!("ProductHunt GraphQL error: {joined}");
    }

    let edges = payload
        .pointer("/data/posts/edges")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(edges
        .iter()
        .take(count)
        .map(|edge| {
            let post = edge.get("node").unwrap_or(&Value::Null);
            let makers = post
                .get("makers")
                .and_then(Value::as_array)
                .map(|m| {
                    m.iter()
                        .filter_map(|x| x.get("name").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Unknown".to_string());
            let topics = post
                .pointer("/topics/edges")
                .and_then(Value::as_array)
                .map(|t| {
                    t.iter()
                        .take(3)
                        .filter_map(|x| x.pointer("/node/name").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            let votes = post.get("votesCount").and_then(Value::as_i64).unwrap_or(0);
            let pitch = json_text_nonempty(post, &["tagline", "description"])
                .unwrap_or_else(|| "No description".to_string());

            let mut summary = format!("{pitch} 🚀 {votes} votes | By {makers}");
            if !topics.is_empty() {
                summary.push_str(" | ");
                summary.push_str(&topics);
            }

            let mut item = RawItem::from_source(
                source,
                json_text_nonempty(post, &["name"]).unwrap_or_else(|| "Untitled Product".into()),
                json_text_nonempty(post, &["url"]).unwrap_or_else(|| HOMEPAGE.into()),
                summary,
            );
            item.language = "en".into();
            item
        })
        .collect())
}

#[async_trait]
impl FetchStrategy for ProductHuntStrategy {
    async fn execute(&self, source: &SourceDefinition, limit: usize) -> Result<FetchedBatch> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("PRODUCTHUNT_API_TOKEN not configured"))?;
        let count = limit * 2;
        let body = json!({ "query": posts_query(count) });

        let resp = send_with_retry(
            || {
                self.client
                    .post(&source.url)
                    .bearer_auth(token)
                    .json(&body)
            },
            self.policy,
            "ProductHunt API",
        )
        .await?;
        let payload: Value = resp.json().await.context("ProductHunt .json()")?;
        Ok(FetchedBatch::live(parse_posts(&payload, source, count)?))
    }

    fn name(&self) -> &'static str {
        "producthunt"
    }

    fn empty_message(&self) -> &'static str {
        "ProductHunt API returned no products"
    }
}
