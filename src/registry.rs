// src/registry.rs
//! Static source registry and category catalog.
//!
//! Both tables ship embedded (TOML under `config/`) and can be replaced at startup:
//! 1) `$DISCOVERY_SOURCES_PATH` / `$DISCOVERY_CATEGORIES_PATH` (TOML or JSON)
//! 2) the embedded defaults
//!
//! Definitions are immutable once loaded.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SOURCES_PATH: &str = "DISCOVERY_SOURCES_PATH";
pub const ENV_CATEGORIES_PATH: &str = "DISCOVERY_CATEGORIES_PATH";

pub const DEFAULT_SOURCE_WEIGHT: f64 = 0.5;

const BUILTIN_SOURCES: &str = include_str!("../config/discovery_sources.toml");
const BUILTIN_CATEGORIES: &str = include_str!("../config/discovery_categories.toml");

/// Which fetch mechanism serves a source. The serialized tags match the config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    #[serde(rename = "rss", alias = "feed")]
    Feed,
    #[serde(rename = "jina", alias = "proxy_render")]
    ProxyRender,
    #[serde(rename = "github_trending_api")]
    GithubTrending,
    #[serde(rename = "producthunt_api")]
    ProductHunt,
    #[serde(rename = "search")]
    Search,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Feed => "rss",
            StrategyKind::ProxyRender => "jina",
            StrategyKind::GithubTrending => "github_trending_api",
            StrategyKind::ProductHunt => "producthunt_api",
            StrategyKind::Search => "search",
        }
    }
}

/// Hand-authored item served when a source cannot be fetched live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackItem {
    pub title: String,
    pub summary: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub id: String,
    pub title: String,
    pub strategy: StrategyKind,
    pub url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Strategy-specific knobs (`since`, `language`, `query`, `engine`, `num`, ...).
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
    #[serde(default, alias = "fallbackItems")]
    pub fallback_items: Vec<FallbackItem>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_weight() -> f64 {
    DEFAULT_SOURCE_WEIGHT
}

impl SourceDefinition {
    /// Non-empty, trimmed string option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Numeric option; accepts numbers and numeric strings.
    pub fn option_f64(&self, key: &str) -> Option<f64> {
        match self.options.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|v| v.is_finite())
    }

    pub fn has_category(&self, category_id: &str) -> bool {
        self.categories.iter().any(|c| c == category_id)
    }
}

/// Stable weight-descending order. Equal weights keep their configured order.
pub fn sort_by_weight(sources: &[SourceDefinition]) -> Vec<SourceDefinition> {
    let mut out = sources.to_vec();
    out.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    out
}

#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceDefinition>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceDefinition>) -> Self {
        Self {
            sources: clean_sources(sources),
        }
    }

    pub fn builtin() -> Result<Self> {
        parse_sources(BUILTIN_SOURCES, "toml").map(Self::new)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading sources from {}", path.display()))?;
        parse_sources(&content, &extension_of(path)).map(Self::new)
    }

    /// `$DISCOVERY_SOURCES_PATH` when set, otherwise the embedded table.
    pub fn load_default() -> Result<Self> {
        match std::env::var(ENV_SOURCES_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_SOURCES_PATH} points to non-existent path"));
                }
                Self::load_from(&pb)
            }
            Err(_) => Self::builtin(),
        }
    }

    pub fn all(&self) -> &[SourceDefinition] {
        &self.sources
    }

    pub fn get(&self, id: &str) -> Option<&SourceDefinition> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn by_category(&self, category_id: &str) -> Vec<SourceDefinition> {
        self.sources
            .iter()
            .filter(|s| s.has_category(category_id))
            .cloned()
            .collect()
    }

    /// Globally highest-weighted sources, used as the generic pool.
    pub fn top_weighted(&self, n: usize) -> Vec<SourceDefinition> {
        let mut sorted = sort_by_weight(&self.sources);
        sorted.truncate(n);
        sorted
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn clean_sources(items: Vec<SourceDefinition>) -> Vec<SourceDefinition> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for mut s in items {
        s.id = s.id.trim().to_string();
        s.url = s.url.trim().to_string();
        if s.id.is_empty() || !seen.insert(s.id.clone()) {
            tracing::warn!(source = %s.id, "skipping empty or duplicate source id");
            continue;
        }
        if !s.weight.is_finite() {
            s.weight = DEFAULT_SOURCE_WEIGHT;
        }
        out.push(s);
    }
    out
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceDefinition>> {
    #[derive(Deserialize)]
    struct Root {
        #[serde(default)]
        sources: Vec<SourceDefinition>,
    }

    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(v) = toml::from_str::<Root>(s) {
            return Ok(v.sources);
        }
    }
    if let Ok(v) = serde_json::from_str::<Vec<SourceDefinition>>(s) {
        return Ok(v);
    }
    if let Ok(v) = serde_json::from_str::<Root>(s) {
        return Ok(v.sources);
    }
    if !try_toml {
        if let Ok(v) = toml::from_str::<Root>(s) {
            return Ok(v.sources);
        }
    }
    // Re-run TOML to surface a useful error message.
    toml::from_str::<Root>(s)
        .map(|v| v.sources)
        .context("unsupported sources format")
}

/* ----------------------------
Categories
---------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Default focus prompt used when the caller does not supply one.
    pub prompt: String,
    /// Category-specific curation instruction appended to the base prompt.
    #[serde(default)]
    pub focus: String,
    #[serde(default, alias = "seedSourceIds")]
    pub seed_source_ids: Vec<String>,
}

/// Public view of a category for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    base_system_prompt: String,
    categories: Vec<CategoryDefinition>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default, alias = "baseSystemPrompt")]
    base_system_prompt: String,
    #[serde(default)]
    categories: Vec<CategoryDefinition>,
}

impl CategoryCatalog {
    pub fn new(base_system_prompt: impl Into<String>, categories: Vec<CategoryDefinition>) -> Self {
        Self {
            base_system_prompt: base_system_prompt.into(),
            categories,
        }
    }

    pub fn builtin() -> Result<Self> {
        let f: CatalogFile =
            toml::from_str(BUILTIN_CATEGORIES).context("parsing embedded categories")?;
        Ok(Self::new(f.base_system_prompt, f.categories))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading categories from {}", path.display()))?;
        let f: CatalogFile = if extension_of(path) == "json" {
            serde_json::from_str(&content).context("parsing categories json")?
        } else {
            toml::from_str(&content).context("parsing categories toml")?
        };
        Ok(Self::new(f.base_system_prompt, f.categories))
    }

    pub fn load_default() -> Result<Self> {
        match std::env::var(ENV_CATEGORIES_PATH) {
            Ok(p) => Self::load_from(Path::new(&p)),
            Err(_) => Self::builtin(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&CategoryDefinition> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn all(&self) -> &[CategoryDefinition] {
        &self.categories
    }

    pub fn system_prompt_for(&self, category: &CategoryDefinition) -> String {
        if category.focus.trim().is_empty() {
            self.base_system_prompt.clone()
        } else {
            format!("{}\n{}", self.base_system_prompt.trim_end(), category.focus.trim())
        }
    }

    pub fn snapshot(&self) -> Vec<CategorySummary> {
        self.categories
            .iter()
            .map(|c| CategorySummary {
                id: c.id.clone(),
                name: c.name.clone(),
                description: c.description.clone(),
                prompt: c.prompt.clone(),
            })
            .collect()
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Lowercase, whitespace to `-`, drop anything outside `[a-z0-9-]`.
pub fn slugify(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let dashed = lowered.split_whitespace().collect::<Vec<_>>().join("-");
    dashed
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}
