//! # Discovery Engine
//! Category -> candidate sources -> concurrent fetch -> dedupe -> recency filter ->
//! round-robin rebalance -> curation (or deterministic formatting) -> result.
//!
//! No call ever fails because a source failed. The worst case is a result built entirely
//! from preset fallback content, or an empty but well-formed result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use metrics::counter;
use serde_json::json;
use url::Url;

use crate::clock::{system_clock, SharedClock};
use crate::config::ai::CurationConfig;
use crate::config::fetch::FetchSettings;
use crate::curate::{build_curator, CurationRequest, DynCurator};
use crate::curate::prompt::generic_system_prompt;
use crate::health::SourceHealthBook;
use crate::ingest::orchestrator::SourceFetcher;
use crate::ingest::providers::StrategyTable;
use crate::ingest::types::{RawItem, SourceStatus};
use crate::ingest::{dedupe_by_link, ensure_metrics_described};
use crate::merge::merge_results;
use crate::model::{CategorySpec, CuratedItem, DiscoveryMeta, DiscoveryResult};
use crate::recency::RecencyLedger;
use crate::registry::{
    slugify, sort_by_weight, CategoryCatalog, CategoryDefinition, CategorySummary, SourceDefinition,
    SourceRegistry, StrategyKind,
};

pub const DEFAULT_LIMIT: usize = 6;
pub const MIN_LIMIT: usize = 3;
pub const MAX_LIMIT: usize = 16;
/// Size of the generic pool used for unknown or empty categories.
pub const GENERIC_POOL_SIZE: usize = 12;
/// Sources fetched per aggregation, highest weight first.
pub const MAX_FANOUT: usize = 8;
pub const MIN_PER_SOURCE: usize = 4;
/// Categories whose origin APIs are already ranked; curation is skipped for them.
pub const DIRECT_CATEGORIES: [&str; 2] = ["github", "producthunt"];

pub const RECENT_CONTENT_NOTE: &str = "recent content";
pub const LAST_RESORT_REASON: &str = "Preset content (no live sources available)";

const DYNAMIC_SITE_WEIGHT: f64 = 1.0;
const DYNAMIC_SEARCH_WEIGHT: f64 = 0.9;
const SEARCH_ENDPOINT: &str = "https://serpapi.com/search.json";

/// Clamp a requested item count into `[3, 16]`. Missing, non-finite or zero means 6.
pub fn clamp_limit(value: Option<f64>) -> usize {
    match value {
        Some(v) if v.is_finite() && v != 0.0 => {
            v.round().clamp(MIN_LIMIT as f64, MAX_LIMIT as f64) as usize
        }
        _ => DEFAULT_LIMIT,
    }
}

/// Round-robin across per-source buckets, in `source_order`, until `desired` items.
///
/// Sources missing from `source_order` take their turn after the listed ones, in
/// first-seen order. Within a bucket, pool order is kept.
pub fn rebalance_by_source(items: &[RawItem], source_order: &[String], desired: usize) -> Vec<RawItem> {
    let mut buckets: HashMap<&str, Vec<&RawItem>> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    let mut listed: HashSet<&str> = HashSet::new();

    for id in source_order {
        if listed.insert(id.as_str()) {
            order.push(id.as_str());
        }
    }
    for it in items {
        let id = it.source_id.as_str();
        if listed.insert(id) {
            order.push(id);
        }
        buckets.entry(id).or_default().push(it);
    }

    let mut out = Vec::with_capacity(desired.min(items.len()));
    let mut round = 0usize;
    while out.len() < desired {
        let mut added = false;
        for id in &order {
            if let Some(item) = buckets.get(id).and_then(|b| b.get(round)) {
                out.push((*item).clone());
                added = true;
                if out.len() >= desired {
                    break;
                }
            }
        }
        if !added {
            break;
        }
        round += 1;
    }
    out
}

/// Deterministic formatting of the first `limit` candidates.
pub fn format_candidates(
    items: &[RawItem],
    limit: usize,
    category_id: &str,
    category_name: &str,
) -> Vec<CuratedItem> {
    items
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, it)| CuratedItem::from_raw(it, i, category_id, category_name))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct CategoryRequest {
    pub category_id: String,
    pub category_name: String,
    pub user_prompt: String,
    pub limit: Option<f64>,
}

/// Ad-hoc category, not in the catalog.
#[derive(Debug, Clone, Default)]
pub struct DynamicCategoryRequest {
    pub category_name: String,
    pub user_prompt: String,
    pub limit: Option<f64>,
    pub related_sites: Vec<String>,
}

/// Resolved inputs of one aggregation run.
struct Aggregation<'a> {
    id: String,
    name: String,
    definition: Option<&'a CategoryDefinition>,
    user_prompt: String,
    limit: usize,
    candidates: Vec<SourceDefinition>,
}

pub struct DiscoveryEngine {
    registry: Arc<SourceRegistry>,
    catalog: Arc<CategoryCatalog>,
    fetcher: Arc<SourceFetcher>,
    curator: DynCurator,
    recency: Arc<RecencyLedger>,
    clock: SharedClock,
}

impl DiscoveryEngine {
    pub fn new(
        registry: SourceRegistry,
        catalog: CategoryCatalog,
        strategies: StrategyTable,
        curator: DynCurator,
        clock: SharedClock,
    ) -> Self {
        let health = Arc::new(SourceHealthBook::new(clock.clone()));
        Self {
            registry: Arc::new(registry),
            catalog: Arc::new(catalog),
            fetcher: Arc::new(SourceFetcher::new(strategies, health, clock.clone())),
            curator,
            recency: Arc::new(RecencyLedger::new(clock.clone())),
            clock,
        }
    }

    /// Production wiring: registry/catalog/curation/fetch settings from files and env.
    pub fn from_env() -> Result<Self> {
        let clock = system_clock();
        let registry = SourceRegistry::load_default()?;
        let catalog = CategoryCatalog::load_default()?;
        let settings = FetchSettings::from_env();
        let strategies = StrategyTable::standard(&settings, clock.clone())?;
        let curation = CurationConfig::load_default()?;
        tracing::info!(
            sources = registry.len(),
            categories = catalog.all().len(),
            curation_provider = %curation.provider,
            curation_enabled = curation.is_usable(),
            key_len = curation.api_key.len(),
            "discovery engine configured"
        );
        let curator = build_curator(&curation);
        Ok(Self::new(registry, catalog, strategies, curator, clock))
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    pub fn health(&self) -> &Arc<SourceHealthBook> {
        self.fetcher.health()
    }

    pub fn recency(&self) -> &Arc<RecencyLedger> {
        &self.recency
    }

    pub fn categories_snapshot(&self) -> Vec<CategorySummary> {
        self.catalog.snapshot()
    }

    pub fn curator_name(&self) -> &'static str {
        self.curator.provider_name()
    }

    /// Built-in category or, for unknown ids, the generic pool.
    pub async fn fetch_category_insights(&self, req: CategoryRequest) -> DiscoveryResult {
        let definition = self.catalog.get(&req.category_id);
        let mut candidates = match definition {
            Some(_) => self.registry.by_category(&req.category_id),
            None => Vec::new(),
        };
        if candidates.is_empty() {
            candidates = self.registry.top_weighted(GENERIC_POOL_SIZE);
        }

        let name = match (req.category_name.trim(), definition) {
            ("", Some(d)) => d.name.clone(),
            ("", None) => req.category_id.clone(),
            (n, _) => n.to_string(),
        };
        let user_prompt = match (req.user_prompt.trim(), definition) {
            ("", Some(d)) => d.prompt.clone(),
            (p, _) => p.to_string(),
        };

        self.aggregate(Aggregation {
            id: req.category_id,
            name,
            definition,
            user_prompt,
            limit: clamp_limit(req.limit),
            candidates,
        })
        .await
    }

    /// Ad-hoc category: related sites and a topic search go first, the generic pool fills in.
    pub async fn fetch_dynamic_category_insights(&self, req: DynamicCategoryRequest) -> DiscoveryResult {
        let name = match req.category_name.trim() {
            "" => "Custom".to_string(),
            n => n.to_string(),
        };
        let slug = match slugify(&name) {
            s if s.is_empty() => "custom".to_string(),
            s => s,
        };

        let mut candidates = dynamic_sources(&slug, &name, &req.user_prompt, &req.related_sites);
        let mut ids: HashSet<String> = candidates.iter().map(|s| s.id.clone()).collect();
        for s in self.registry.top_weighted(GENERIC_POOL_SIZE) {
            if ids.insert(s.id.clone()) {
                candidates.push(s);
            }
        }

        self.aggregate(Aggregation {
            id: slug,
            name,
            definition: None,
            user_prompt: req.user_prompt,
            limit: clamp_limit(req.limit),
            candidates,
        })
        .await
    }

    /// Every category concurrently, merged. An empty list means every built-in category.
    pub async fn fetch_aggregated_insights(&self, categories: &[CategorySpec], limit: Option<f64>) -> DiscoveryResult {
        let specs: Vec<CategorySpec> = if categories.is_empty() {
            self.categories_snapshot()
                .into_iter()
                .map(|c| CategorySpec {
                    id: c.id,
                    name: c.name,
                    prompt: c.prompt,
                })
                .collect()
        } else {
            categories.to_vec()
        };

        let results = join_all(specs.iter().map(|c| {
            self.fetch_category_insights(CategoryRequest {
                category_id: c.id.clone(),
                category_name: c.name.clone(),
                user_prompt: c.prompt.clone(),
                limit,
            })
        }))
        .await;

        merge_results(results, clamp_limit(limit), specs.len(), self.clock.now())
    }

    async fn aggregate(&self, agg: Aggregation<'_>) -> DiscoveryResult {
        ensure_metrics_described();
        let limit = agg.limit;
        let mut sources = sort_by_weight(&agg.candidates);
        sources.truncate(MAX_FANOUT);
        let per_source = limit.max(MIN_PER_SOURCE);

        // Fan out; every task settles on its own budget.
        let handles = sources.iter().map(|source| {
            let fetcher = self.fetcher.clone();
            let source = source.clone();
            tokio::spawn(async move { fetcher.fetch(&source, per_source).await })
        });
        let settled = join_all(handles).await;

        let mut raw: Vec<RawItem> = Vec::new();
        let mut statuses: Vec<SourceStatus> = Vec::with_capacity(sources.len());
        for (source, res) in sources.iter().zip(settled) {
            match res {
                Ok(outcome) => {
                    statuses.push(self.fetcher.status_for(source, &outcome));
                    raw.extend(outcome.items);
                }
                Err(join_err) => {
                    let reason = if join_err.is_panic() {
                        "Fetch task panicked".to_string()
                    } else {
                        format!("Fetch task failed: {join_err}")
                    };
                    tracing::warn!(source = %source.id, error = %reason, "source fetch task did not complete");
                    statuses.push(self.fetcher.status_for_crash(source, &reason));
                }
            }
        }

        let deduped = dedupe_by_link(raw);
        let fresh = self.recency.filter_fresh(&deduped);
        let pool: Vec<RawItem> = if !fresh.is_empty() {
            fresh
        } else {
            deduped
                .into_iter()
                .map(|mut it| {
                    it.reason = Some(match it.reason.take() {
                        Some(r) if !r.trim().is_empty() => format!("{r} · {RECENT_CONTENT_NOTE}"),
                        _ => RECENT_CONTENT_NOTE.to_string(),
                    });
                    it
                })
                .collect()
        };

        let description = |direct: bool| {
            agg.definition
                .map(|d| d.description.clone())
                .unwrap_or_else(|| {
                    if direct {
                        format!("Direct API results for {}", agg.name)
                    } else {
                        format!("AI curated stories for {}", agg.name)
                    }
                })
        };

        if pool.is_empty() {
            let last_resort: Vec<RawItem> = sources
                .iter()
                .flat_map(|s| {
                    s.fallback_items
                        .iter()
                        .map(move |fb| RawItem::from_fallback(s, fb, LAST_RESORT_REASON))
                })
                .collect();
            let items = format_candidates(&last_resort, limit, &agg.id, &agg.name);
            self.mark_surfaced(&items);
            tracing::warn!(
                category = %agg.id,
                sources = statuses.len(),
                items = items.len(),
                "no live or fallback candidates; served last-resort presets"
            );
            return DiscoveryResult {
                id: agg.id.clone(),
                title: agg.name.clone(),
                description: description(false),
                items,
                retrieved_at: self.clock.now(),
                meta: DiscoveryMeta {
                    fetched_source_count: statuses.len(),
                    raw_item_count: 0,
                    used_ai: false,
                    source_statuses: statuses,
                },
            };
        }

        let order: Vec<String> = sources.iter().map(|s| s.id.clone()).collect();
        let slice = rebalance_by_source(&pool, &order, limit * 3);

        let direct = DIRECT_CATEGORIES.contains(&agg.id.as_str());
        let (items, used_ai) = if direct {
            counter!("discovery_curation_total", "outcome" => "skipped").increment(1);
            (format_candidates(&slice, limit, &agg.id, &agg.name), false)
        } else {
            let req = CurationRequest {
                category_id: agg.id.clone(),
                category_name: agg.name.clone(),
                system_prompt: match agg.definition {
                    Some(d) => self.catalog.system_prompt_for(d),
                    None => generic_system_prompt(&agg.name),
                },
                focus: agg.user_prompt.clone(),
                source_hints: agg
                    .definition
                    .map(|d| d.seed_source_ids.clone())
                    .unwrap_or_default(),
                limit,
                candidates: slice.clone(),
            };
            match self.curator.curate(&req).await {
                Some(items) => {
                    counter!("discovery_curation_total", "outcome" => "used").increment(1);
                    (items, true)
                }
                None => {
                    counter!("discovery_curation_total", "outcome" => "fallback").increment(1);
                    (format_candidates(&slice, limit, &agg.id, &agg.name), false)
                }
            }
        };

        self.mark_surfaced(&items);
        tracing::info!(
            category = %agg.id,
            sources = sources.len(),
            pool = pool.len(),
            items = items.len(),
            used_ai,
            "discovery aggregated"
        );

        DiscoveryResult {
            id: agg.id.clone(),
            title: agg.name.clone(),
            description: description(direct),
            items,
            retrieved_at: self.clock.now(),
            meta: DiscoveryMeta {
                fetched_source_count: sources.len(),
                raw_item_count: pool.len(),
                used_ai,
                source_statuses: statuses,
            },
        }
    }

    fn mark_surfaced(&self, items: &[CuratedItem]) {
        self.recency.mark_seen(items.iter().map(|i| i.link.as_str()));
    }
}

/// Synthetic sources for an ad-hoc category: one render-proxy source per related site
/// and one topic search.
pub fn dynamic_sources(
    slug: &str,
    name: &str,
    user_prompt: &str,
    related_sites: &[String],
) -> Vec<SourceDefinition> {
    let mut out: Vec<SourceDefinition> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for site in related_sites {
        let Some(url) = normalize_site(site) else {
            tracing::debug!(site = %site, "skipping unparsable related site");
            continue;
        };
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            continue;
        };
        let id = format!("site-{host}");
        if !seen.insert(id.clone()) {
            continue;
        }
        out.push(SourceDefinition {
            id,
            title: host,
            strategy: StrategyKind::ProxyRender,
            url: url.to_string(),
            language: "en".to_string(),
            categories: vec![slug.to_string()],
            weight: DYNAMIC_SITE_WEIGHT,
            options: Default::default(),
            fallback_items: Vec::new(),
        });
    }

    let query = format!("{} {}", name.trim(), user_prompt.trim()).trim().to_string();
    let mut options = std::collections::BTreeMap::new();
    options.insert("provider".to_string(), json!("serpapi"));
    options.insert("engine".to_string(), json!("google_news"));
    options.insert("query".to_string(), json!(query));
    out.push(SourceDefinition {
        id: format!("search-{slug}"),
        title: format!("{name} News Search"),
        strategy: StrategyKind::Search,
        url: SEARCH_ENDPOINT.to_string(),
        language: "en".to_string(),
        categories: vec![slug.to_string()],
        weight: DYNAMIC_SEARCH_WEIGHT,
        options,
        fallback_items: Vec::new(),
    });
    out
}

/// `example.com/x` -> `https://example.com/x`; only http(s) with a host is accepted.
fn normalize_site(site: &str) -> Option<Url> {
    let trimmed = site.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&with_scheme).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
