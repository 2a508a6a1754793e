// tests/common/mod.rs
//
// Shared fixtures for integration tests: a scripted fetch strategy (no network),
// small registries/catalogs, and a counting curator.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::bail;
use chrono::{TimeZone, Utc};

use discovery_aggregator::clock::{ManualClock, SharedClock};
use discovery_aggregator::curate::{CurateFuture, CurationRequest, Curator, DynCurator};
use discovery_aggregator::engine::DiscoveryEngine;
use discovery_aggregator::ingest::providers::StrategyTable;
use discovery_aggregator::ingest::types::{FetchStrategy, FetchedBatch, RawItem};
use discovery_aggregator::model::CuratedItem;
use discovery_aggregator::registry::{
    CategoryCatalog, CategoryDefinition, FallbackItem, SourceDefinition, SourceRegistry,
    StrategyKind,
};

/// What a scripted source does when fetched.
#[derive(Clone)]
pub enum Script {
    Items(Vec<(String, String)>),
    Fail(String),
    Empty,
    Panic,
}

/// Items as `(title, link)` pairs: `<prefix> 0..n` at `https://<prefix>.example/<i>`.
pub fn items(prefix: &str, n: usize) -> Script {
    Script::Items(
        (0..n)
            .map(|i| (format!("{prefix} {i}"), format!("https://{prefix}.example/{i}")))
            .collect(),
    )
}

#[derive(Default)]
pub struct ScriptedStrategy {
    scripts: HashMap<String, Script>,
    calls: AtomicUsize,
}

impl ScriptedStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, source_id: &str, script: Script) -> Self {
        self.scripts.insert(source_id.to_string(), script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl FetchStrategy for ScriptedStrategy {
    async fn execute(&self, source: &SourceDefinition, _limit: usize) -> anyhow::Result<FetchedBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(&source.id) {
            Some(Script::Items(list)) => Ok(FetchedBatch::live(
                list.iter()
                    .map(|(t, l)| RawItem::from_source(source, t.clone(), l.clone(), format!("about {t}")))
                    .collect(),
            )),
            Some(Script::Fail(msg)) => bail!("{msg}"),
            Some(Script::Empty) => Ok(FetchedBatch::default()),
            Some(Script::Panic) => panic!("scripted panic for {}", source.id),
            None => bail!("no script for {}", source.id),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn fallback(title: &str, link: &str) -> FallbackItem {
    FallbackItem {
        title: title.to_string(),
        summary: format!("{title} (preset)"),
        link: link.to_string(),
    }
}

pub fn source(id: &str, weight: f64, categories: &[&str], fallbacks: Vec<FallbackItem>) -> SourceDefinition {
    SourceDefinition {
        id: id.to_string(),
        title: format!("{id} title"),
        strategy: StrategyKind::Feed,
        url: format!("https://{id}.example/feed"),
        language: "en".to_string(),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        weight,
        options: Default::default(),
        fallback_items: fallbacks,
    }
}

pub fn category(id: &str, name: &str, seeds: &[&str]) -> CategoryDefinition {
    CategoryDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("{name} description"),
        prompt: format!("{name} default prompt"),
        focus: format!("Focus on {name}."),
        seed_source_ids: seeds.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn catalog() -> CategoryCatalog {
    CategoryCatalog::new(
        "You are a curator.",
        vec![
            category("ai", "AI", &["alpha"]),
            category("tech", "Tech", &[]),
            category("github", "GitHub", &[]),
        ],
    )
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap()))
}

pub fn engine_with(
    sources: Vec<SourceDefinition>,
    strategy: Arc<ScriptedStrategy>,
    curator: DynCurator,
    clock: SharedClock,
) -> DiscoveryEngine {
    let table = StrategyTable::empty().with(StrategyKind::Feed, strategy);
    DiscoveryEngine::new(SourceRegistry::new(sources), catalog(), table, curator, clock)
}

/// Curator returning fixed picks (or nothing) and counting invocations.
pub struct CountingCurator {
    pub picks: Option<Vec<CuratedItem>>,
    pub calls: AtomicUsize,
    pub last_hints: std::sync::Mutex<Vec<String>>,
}

impl CountingCurator {
    pub fn returning(picks: Option<Vec<CuratedItem>>) -> Arc<Self> {
        Arc::new(Self {
            picks,
            calls: AtomicUsize::new(0),
            last_hints: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Curator for CountingCurator {
    fn curate<'a>(&'a self, req: &'a CurationRequest) -> CurateFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_hints.lock().unwrap() = req.source_hints.clone();
        let picks = self.picks.clone();
        Box::pin(async move { picks })
    }

    fn provider_name(&self) -> &'static str {
        "counting"
    }
}

pub fn pick(title: &str, link: &str) -> CuratedItem {
    CuratedItem {
        title: title.to_string(),
        summary: "picked".to_string(),
        link: link.to_string(),
        category_id: "ai".to_string(),
        category_name: "AI".to_string(),
        source_id: "alpha".to_string(),
        source_name: "alpha title".to_string(),
        language: "en".to_string(),
        reason: "picked by model".to_string(),
    }
}
