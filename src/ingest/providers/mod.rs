// src/ingest/providers/mod.rs
//! Fetch strategies and the lookup table the orchestrator dispatches through.

pub mod feed;
pub mod github_trending;
pub mod producthunt;
pub mod proxy_render;
pub mod search;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::clock::SharedClock;
use crate::config::fetch::FetchSettings;
use crate::ingest::http::build_client;
use crate::ingest::types::FetchStrategy;
use crate::registry::StrategyKind;

pub use feed::FeedStrategy;
pub use github_trending::GithubTrendingStrategy;
pub use producthunt::ProductHuntStrategy;
pub use proxy_render::ProxyRenderStrategy;
pub use search::SearchStrategy;

/// Strategy tag -> implementation. New strategies are added by registering, not branching.
#[derive(Clone, Default)]
pub struct StrategyTable {
    map: HashMap<StrategyKind, Arc<dyn FetchStrategy>>,
}

impl StrategyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The five network-backed strategies sharing one HTTP client.
    pub fn standard(settings: &FetchSettings, clock: SharedClock) -> Result<Self> {
        let client = build_client(settings)?;
        Ok(Self::empty()
            .with(
                StrategyKind::Feed,
                Arc::new(FeedStrategy::new(client.clone(), settings, clock.clone())),
            )
            .with(
                StrategyKind::ProxyRender,
                Arc::new(ProxyRenderStrategy::new(client.clone(), settings)),
            )
            .with(
                StrategyKind::GithubTrending,
                Arc::new(GithubTrendingStrategy::new(client.clone(), settings)),
            )
            .with(
                StrategyKind::ProductHunt,
                Arc::new(ProductHuntStrategy::new(client.clone(), settings)),
            )
            .with(
                StrategyKind::Search,
                Arc::new(SearchStrategy::new(client, settings, clock)),
            ))
    }

    pub fn with(mut self, kind: StrategyKind, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.register(kind, strategy);
        self
    }

    pub fn register(&mut self, kind: StrategyKind, strategy: Arc<dyn FetchStrategy>) {
        self.map.insert(kind, strategy);
    }

    pub fn get(&self, kind: StrategyKind) -> Option<Arc<dyn FetchStrategy>> {
        self.map.get(&kind).cloned()
    }
}

/// First present, non-null field rendered as text (numbers included). Empty strings count.
pub(crate) fn json_text(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match v.get(*k) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Like [`json_text`] but skips blank strings, trimming the result.
pub(crate) fn json_text_nonempty(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        json_text(v, &[k])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}
