use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::engine::{CategoryRequest, DiscoveryEngine, DynamicCategoryRequest};
use crate::health::SourceHealthEntry;
use crate::merge::ALL_ID;
use crate::metrics::Metrics;
use crate::model::{CategorySpec, DiscoveryResult};
use crate::registry::CategorySummary;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DiscoveryEngine>,
}

impl AppState {
    pub fn new(engine: DiscoveryEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(DiscoveryEngine::from_env()?))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/categories", get(list_categories))
        .route("/api/discovery", get(discover))
        .route("/debug/sources", get(debug_sources))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Service router plus `/metrics` from the installed Prometheus recorder.
pub fn router_with_metrics(state: AppState, metrics: &Metrics) -> Router {
    router(state).merge(metrics.router())
}

/// Query string of `/api/discovery`. Every field is optional text; parsing is lenient.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryQuery {
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    /// JSON array of `{id, name, prompt}` for the `all` view.
    #[serde(default)]
    pub categories: Option<String>,
    /// Comma separated related sites for ad-hoc categories.
    #[serde(default)]
    pub sites: Option<String>,
}

/// Non-numeric text yields `None`, which the engine maps to the default limit.
pub fn parse_limit(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
}

/// Invalid JSON is treated as "no selection" (every built-in category).
pub fn parse_categories(raw: Option<&str>) -> Vec<CategorySpec> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => serde_json::from_str(s).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "ignoring malformed categories parameter");
            Vec::new()
        }),
        None => Vec::new(),
    }
}

pub fn parse_sites(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn list_categories(State(state): State<AppState>) -> Json<Vec<CategorySummary>> {
    Json(state.engine.categories_snapshot())
}

async fn debug_sources(State(state): State<AppState>) -> Json<Vec<SourceHealthEntry>> {
    Json(state.engine.health().snapshot())
}

async fn discover(State(state): State<AppState>, Query(q): Query<DiscoveryQuery>) -> Response {
    let category_id = q.category_id.as_deref().map(str::trim).unwrap_or_default().to_string();
    let title = q
        .category_name
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| category_id.clone());

    let engine = state.engine.clone();
    let task = tokio::spawn(async move { run_discovery(&engine, q).await });

    match task.await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            tracing::error!(category = %category_id, error = %e, "discovery task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "id": "discovery_error",
                    "title": title,
                    "error": "Discovery failed",
                    "items": [],
                })),
            )
                .into_response()
        }
    }
}

async fn run_discovery(engine: &DiscoveryEngine, q: DiscoveryQuery) -> DiscoveryResult {
    let limit = parse_limit(q.limit.as_deref());
    let category_id = q.category_id.unwrap_or_default().trim().to_string();
    let category_name = q.category_name.unwrap_or_default();
    let prompt = q.prompt.unwrap_or_default();

    if category_id == ALL_ID {
        let specs = parse_categories(q.categories.as_deref());
        return engine.fetch_aggregated_insights(&specs, limit).await;
    }

    if engine.catalog().get(&category_id).is_some() {
        return engine
            .fetch_category_insights(CategoryRequest {
                category_id,
                category_name,
                user_prompt: prompt,
                limit,
            })
            .await;
    }

    let name = if category_name.trim().is_empty() {
        category_id
    } else {
        category_name
    };
    engine
        .fetch_dynamic_category_insights(DynamicCategoryRequest {
            category_name: name,
            user_prompt: prompt,
            limit,
            related_sites: parse_sites(q.sites.as_deref()),
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_parsing_is_lenient() {
        assert_eq!(parse_limit(Some(" 9 ")), Some(9.0));
        assert_eq!(parse_limit(Some("7.6")), Some(7.6));
        assert_eq!(parse_limit(Some("lots")), None);
        assert_eq!(parse_limit(None), None);
    }

    #[test]
    fn categories_parameter() {
        let specs = parse_categories(Some(r#"[{"id":"ai","name":"AI"},{"id":"tech","name":"Tech","prompt":"chips"}]"#));
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].prompt, "");
        assert_eq!(specs[1].prompt, "chips");
        assert!(parse_categories(Some("{not json")).is_empty());
        assert!(parse_categories(Some("  ")).is_empty());
    }

    #[test]
    fn sites_parameter() {
        assert_eq!(
            parse_sites(Some(" a.com, ,https://b.org/x ,")),
            vec!["a.com".to_string(), "https://b.org/x".to_string()]
        );
        assert!(parse_sites(None).is_empty());
    }
}
