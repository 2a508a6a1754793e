// src/config/fetch.rs
//! Network knobs shared by the fetch strategies.
//!
//! Every value has a default and can be overridden through `DISCOVERY_*` env vars.
//! Provider credentials are read from their conventional names.

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "discovery-aggregator/0.1 (+https://discovery.local)";
pub const DEFAULT_PROXY_BASE: &str = "https://r.jina.ai/";
/// Upper bound for the backoff unit taken from the environment.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Linear backoff unit: attempt `n` waits `backoff * n`.
    pub backoff: Duration,
    pub feed_timeout: Duration,
    pub api_timeout: Duration,
    pub graphql_timeout: Duration,
    pub search_timeout: Duration,
    pub feed_cache_ttl: Duration,
    pub search_cache_ttl: Duration,
    pub proxy_base: String,
    pub serpapi_key: Option<String>,
    pub producthunt_token: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retries: 2,
            backoff: Duration::from_millis(1000),
            feed_timeout: Duration::from_secs(12),
            api_timeout: Duration::from_secs(10),
            graphql_timeout: Duration::from_secs(15),
            search_timeout: Duration::from_secs(12),
            feed_cache_ttl: Duration::from_secs(10 * 60),
            search_cache_ttl: Duration::from_secs(24 * 60 * 60),
            proxy_base: DEFAULT_PROXY_BASE.to_string(),
            serpapi_key: None,
            producthunt_token: None,
        }
    }
}

impl FetchSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Build from any key lookup; unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let num = |k: &str| get(k).and_then(|v| parse::<u64>(&v));
        let ms = |k: &str, def: Duration| num(k).map(Duration::from_millis).unwrap_or(def);
        let secs = |k: &str, def: Duration| num(k).map(Duration::from_secs).unwrap_or(def);

        Self {
            user_agent: get("DISCOVERY_USER_AGENT").unwrap_or(d.user_agent),
            retries: get("DISCOVERY_FETCH_RETRIES")
                .and_then(|v| parse::<u32>(&v))
                .map(|r| r.min(10))
                .unwrap_or(d.retries),
            backoff: ms("DISCOVERY_BACKOFF_MS", d.backoff).min(MAX_BACKOFF),
            feed_timeout: ms("DISCOVERY_FEED_TIMEOUT_MS", d.feed_timeout),
            api_timeout: ms("DISCOVERY_API_TIMEOUT_MS", d.api_timeout),
            graphql_timeout: ms("DISCOVERY_GRAPHQL_TIMEOUT_MS", d.graphql_timeout),
            search_timeout: ms("DISCOVERY_SEARCH_TIMEOUT_MS", d.search_timeout),
            feed_cache_ttl: secs("DISCOVERY_FEED_CACHE_TTL_SECS", d.feed_cache_ttl),
            search_cache_ttl: secs("DISCOVERY_SEARCH_CACHE_TTL_SECS", d.search_cache_ttl),
            proxy_base: get("DISCOVERY_PROXY_BASE").unwrap_or(d.proxy_base),
            serpapi_key: get("SERPAPI_API_KEY"),
            producthunt_token: get("PRODUCTHUNT_API_TOKEN"),
        }
    }
}

fn parse<T: FromStr>(v: &str) -> Option<T> {
    v.parse::<T>().ok()
}
