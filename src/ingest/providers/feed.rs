use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use reqwest::Client;
use serde::Deserialize;

use crate::clock::SharedClock;
use crate::config::fetch::FetchSettings;
use crate::ingest::cache::TtlCache;
use crate::ingest::http::{send_with_retry, RetryPolicy};
use crate::ingest::normalize_text;
use crate::ingest::types::{FetchStrategy, FetchedBatch, RawItem};
use crate::registry::SourceDefinition;

/// Feeds are always asked for at least this many entries.
const MIN_FEED_ENTRIES: usize = 6;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}
#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Atom {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}
#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<TextNode>,
    content: Option<TextNode>,
}
#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: Option<String>,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: Option<String>,
}

impl AtomEntry {
    fn alternate_link(&self) -> Option<String> {
        self.links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.links.first())
            .and_then(|l| l.href.clone())
    }
}

/// Entry as read from a feed document, before source attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
}

impl FeedEntry {
    /// Entries without a title or link are dropped before attribution.
    pub fn is_usable(&self) -> bool {
        !self.title.is_empty() && !self.link.is_empty()
    }
}

/// Parse an RSS 2.0 or Atom document. Entries keep document order.
pub fn parse_feed(s: &str) -> Result<Vec<FeedEntry>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(s);
    if !xml_clean.trim_start().starts_with('<') {
        return Err(anyhow!("feed body is not xml"));
    }

    let entries = if let Ok(rss) = from_str::<Rss>(&xml_clean) {
        rss.channel
            .item
            .into_iter()
            .map(|it| FeedEntry {
                title: normalize_text(it.title.as_deref().unwrap_or_default()),
                link: it.link.unwrap_or_default().trim().to_string(),
                summary: normalize_text(it.description.as_deref().unwrap_or_default()),
            })
            .collect::<Vec<_>>()
    } else {
        let atom: Atom = from_str(&xml_clean)
            .map_err(|e| anyhow!(e))
            .context("parsing feed xml (neither rss nor atom)")?;
        atom.entry
            .into_iter()
            .map(|e| {
                let link = e.alternate_link().unwrap_or_default().trim().to_string();
                let body = e
                    .summary
                    .and_then(|t| t.text)
                    .or_else(|| e.content.and_then(|t| t.text))
                    .unwrap_or_default();
                FeedEntry {
                    title: normalize_text(&e.title.and_then(|t| t.text).unwrap_or_default()),
                    link,
                    summary: normalize_text(&body),
                }
            })
            .collect()
    };

    histogram!("discovery_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(entries)
}

/// Syndication feed at `source.url`. Parsed entries are cached per (url, count).
pub struct FeedStrategy {
    client: Client,
    policy: RetryPolicy,
    cache: TtlCache<Vec<FeedEntry>>,
}

impl FeedStrategy {
    pub fn new(client: Client, settings: &FetchSettings, clock: SharedClock) -> Self {
        Self {
            client,
            policy: RetryPolicy::new(settings, settings.feed_timeout),
            cache: TtlCache::new("feed", settings.feed_cache_ttl, clock),
        }
    }

    async fn load(&self, url: &str, count: usize) -> Result<(Vec<FeedEntry>, bool)> {
        let key = format!("{url}|{count}");
        if let Some(hit) = self.cache.get(&key) {
            return Ok((hit, true));
        }

        let resp = send_with_retry(
            || {
                self.client.get(url).header(
                    reqwest::header::ACCEPT,
                    "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8",
                )
            },
            self.policy,
            "feed",
        )
        .await?;
        let body = resp.text().await.context("feed http .text()")?;
        let mut entries = parse_feed(&body)?;
        entries.truncate(count);

        // An empty feed is retried on the next call rather than served from cache.
        if entries.iter().any(FeedEntry::is_usable) {
            self.cache.insert(key, entries.clone());
        }
        Ok((entries, false))
    }
}

#[async_trait]
impl FetchStrategy for FeedStrategy {
    async fn execute(&self, source: &SourceDefinition, limit: usize) -> Result<FetchedBatch> {
        let count = limit.max(MIN_FEED_ENTRIES);
        let (entries, from_cache) = self.load(&source.url, count).await?;
        let items = entries
            .into_iter()
            .filter(FeedEntry::is_usable)
            .map(|e| RawItem::from_source(source, e.title, e.link, e.summary))
            .collect();
        Ok(FetchedBatch { items, from_cache })
    }

    fn name(&self) -> &'static str {
        "feed"
    }

    fn empty_message(&self) -> &'static str {
        "Feed returned no items"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
