//! Pages without a feed, read through a markdown rendering proxy.
//!
//! The rendered page is scanned for `[text](https://...)` links that stay on the source's own
//! host (with or without `www.`) and whose path looks like an article. Precision is traded for
//! coverage here; navigation links that slip through are usually thinned out by curation.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;
use url::Url;

use crate::config::fetch::FetchSettings;
use crate::ingest::http::{send_with_retry, RetryPolicy};
use crate::ingest::types::{FetchStrategy, FetchedBatch, RawItem};
use crate::registry::SourceDefinition;

pub struct ProxyRenderStrategy {
    client: Client,
    policy: RetryPolicy,
    proxy_base: String,
}

impl ProxyRenderStrategy {
    pub fn new(client: Client, settings: &FetchSettings) -> Self {
        Self {
            client,
            policy: RetryPolicy::new(settings, settings.feed_timeout),
            proxy_base: settings.proxy_base.clone(),
        }
    }

    fn proxied_url(&self, target: &str) -> String {
        format!("{}{}", self.proxy_base, target)
    }
}

#[async_trait]
impl FetchStrategy for ProxyRenderStrategy {
    async fn execute(&self, source: &SourceDefinition, limit: usize) -> Result<FetchedBatch> {
        let url = self.proxied_url(&source.url);
        let resp = send_with_retry(
            || {
                self.client.get(&url).header(
                    reqwest::header::ACCEPT,
                    "text/markdown, text/plain;q=0.9, */*;q=0.8",
                )
            },
            self.policy,
            "render proxy",
        )
        .await?;
        let markdown = resp.text().await.context("render proxy .text()")?;
        Ok(FetchedBatch::live(extract_article_links(
            &markdown,
            source,
            limit * 3,
        )))
    }

    fn name(&self) -> &'static str {
        "proxy_render"
    }

    fn empty_message(&self) -> &'static str {
        "Render proxy returned no items"
    }
}

/// Pull up to `max` article-looking, same-site links out of rendered markdown.
pub fn extract_article_links(markdown: &str, source: &SourceDefinition, max: usize) -> Vec<RawItem> {
    static RE_LINK: OnceCell<Regex> = OnceCell::new();
    let re_link = RE_LINK
        .get_or_init(|| Regex::new(r"\[([^\]]+?)\]\((https?://[^\s)]+)\)").unwrap());
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let allowed = allowed_hosts(&source.url);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    for caps in re_link.captures_iter(markdown) {
        if out.len() >= max {
            break;
        }
        let (Some(whole), Some(text), Some(link)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        // Image embeds: `![alt](src)`
        if markdown[..whole.start()].ends_with('!') {
            continue;
        }
        let link = link.as_str();
        let raw_text = re_ws.replace_all(text.as_str(), " ");
        let raw_text = raw_text.trim();
        if raw_text.is_empty() || raw_text.starts_with('!') {
            continue;
        }
        if seen.contains(link) || link.contains('#') {
            continue;
        }
        let Ok(parsed) = Url::parse(link) else {
            continue;
        };
        if let Some(allowed) = &allowed {
            match parsed.host_str() {
                Some(h) if allowed.contains(&h.to_ascii_lowercase()) => {}
                _ => continue,
            }
        }
        if !looks_like_article(parsed.path()) {
            continue;
        }
        seen.insert(link);

        let title = raw_text.trim_start_matches("###").trim();
        if !is_headline(title) {
            continue;
        }

        out.push(RawItem::from_source(source, title, link, title));
    }

    out
}

/// The source host plus its `www.`-toggled twin. `None` when the source URL is unparsable.
fn allowed_hosts(source_url: &str) -> Option<HashSet<String>> {
    let host = Url::parse(source_url).ok()?.host_str()?.to_ascii_lowercase();
    let twin = match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => format!("www.{host}"),
    };
    Some([host, twin].into_iter().collect())
}

/// Content keyword or year in the path, plus a slug separator or 4-digit run.
pub fn looks_like_article(path: &str) -> bool {
    static RE_KEYWORD: OnceCell<Regex> = OnceCell::new();
    let re_keyword = RE_KEYWORD.get_or_init(|| {
        Regex::new(r"(news|index|blog|research|article|stories|posts|insights|20[0-9]{2})").unwrap()
    });
    static RE_SLUG: OnceCell<Regex> = OnceCell::new();
    let re_slug = RE_SLUG.get_or_init(|| Regex::new(r"[-_]|\d{4}").unwrap());

    let path = path.to_ascii_lowercase();
    re_keyword.is_match(&path) && re_slug.is_match(&path)
}

/// At least two words and some letters or digits.
fn is_headline(text: &str) -> bool {
    text.contains(' ') && text.chars().any(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StrategyKind;

    fn source(url: &str) -> SourceDefinition {
        SourceDefinition {
            id: "blog".into(),
            title: "Blog".into(),
            strategy: StrategyKind::ProxyRender,
            url: url.into(),
            language: "en".into(),
            categories: vec![],
            weight: 1.0,
            options: Default::default(),
            fallback_items: vec![],
        }
    }

    #[test]
    fn article_heuristic() {
        assert!(looks_like_article("/news/new-model-launch"));
        assert!(looks_like_article("/blog/2024/roadmap"));
        assert!(looks_like_article("/Research/Scaling_Laws"));
        assert!(!looks_like_article("/about"));
        assert!(!looks_like_article("/news"));
        assert!(!looks_like_article("/careers/open-roles"));
    }

    #[test]
    fn www_twin_is_accepted_and_foreign_hosts_are_not() {
        let md = "\
[Launching a new research model](https://www.example.com/research/new-model)\n\
[Partner story about things](https://partner.example.org/news/partner-story)\n\
[Same link again here](https://www.example.com/research/new-model)\n";
        let items = extract_article_links(md, &source("https://example.com/news"), 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://www.example.com/research/new-model");
        assert_eq!(items[0].summary, items[0].title);
    }

    #[test]
    fn noise_is_dropped() {
        let md = "\
![Hero image shot](https://example.com/news/hero-image.png)\n\
[Read](https://example.com/news/short-one)\n\
[--- ---](https://example.com/news/punct-only)\n\
[Jump to section heading](https://example.com/news/page-a#section)\n\
[### A real headline here](https://example.com/news/a-real-headline)\n";
        let items = extract_article_links(md, &source("https://example.com"), 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "A real headline here");
    }

    #[test]
    fn respects_max() {
        let md: String = (0..10)
            .map(|i| format!("[Story number {i}](https://example.com/news/story-{i})\n"))
            .collect();
        assert_eq!(extract_article_links(&md, &source("https://example.com"), 4).len(), 4);
    }
}
