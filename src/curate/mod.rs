//! Curation: optional language-model selection and rewriting of the candidate pool.
//!
//! Always advisory. Any failure (no key, transport, non-2xx, unparsable reply, empty
//! selection) yields `None` and the engine formats the pool deterministically instead.

pub mod client;
pub mod parse;
pub mod prompt;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::config::ai::CurationConfig;
use crate::curate::client::{ChatProvider, MockProvider, OpenRouterProvider};
use crate::curate::parse::{parse_json_array, shape_items};
use crate::curate::prompt::{build_user_prompt, ChatMessage};
use crate::ingest::types::RawItem;
use crate::model::CuratedItem;

/// Everything the model needs for one category.
#[derive(Debug, Clone)]
pub struct CurationRequest {
    pub category_id: String,
    pub category_name: String,
    pub system_prompt: String,
    pub focus: String,
    pub source_hints: Vec<String>,
    pub limit: usize,
    pub candidates: Vec<RawItem>,
}

impl CurationRequest {
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(build_user_prompt(
                &self.category_name,
                &self.focus,
                self.limit,
                &self.source_hints,
                &self.candidates,
            )),
        ]
    }
}

pub type CurateFuture<'a> = Pin<Box<dyn Future<Output = Option<Vec<CuratedItem>>> + Send + 'a>>;

/// Trait object used by the engine (and swapped out in tests).
pub trait Curator: Send + Sync {
    fn curate<'a>(&'a self, req: &'a CurationRequest) -> CurateFuture<'a>;
    fn provider_name(&self) -> &'static str;
}

pub type DynCurator = Arc<dyn Curator>;

/// Always `None`; used when no credentials are configured.
pub struct DisabledCurator;

impl Curator for DisabledCurator {
    fn curate<'a>(&'a self, _req: &'a CurationRequest) -> CurateFuture<'a> {
        Box::pin(async { None })
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Prompt -> provider -> parse -> shape.
pub struct ModelCurator<P: ChatProvider> {
    provider: P,
}

impl<P: ChatProvider> ModelCurator<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    async fn curate_impl(&self, req: &CurationRequest) -> Option<Vec<CuratedItem>> {
        if req.candidates.is_empty() || req.limit == 0 {
            return None;
        }
        let messages = req.messages();
        let prompt_id = prompt_hash(&messages);

        let content = match self.provider.complete(&messages).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    prompt = %prompt_id,
                    error = %format!("{e:#}"),
                    "curation call failed"
                );
                return None;
            }
        };

        let Some(parsed) = parse_json_array(&content) else {
            tracing::warn!(
                provider = self.provider.name(),
                prompt = %prompt_id,
                content_len = content.len(),
                "curation reply is not a JSON array"
            );
            return None;
        };

        let items = shape_items(
            &parsed,
            &req.candidates,
            req.limit,
            &req.category_id,
            &req.category_name,
        );
        if items.is_empty() {
            tracing::info!(prompt = %prompt_id, "curation returned an empty selection");
            return None;
        }
        tracing::debug!(prompt = %prompt_id, items = items.len(), "curation succeeded");
        Some(items)
    }
}

impl<P: ChatProvider> Curator for ModelCurator<P> {
    fn curate<'a>(&'a self, req: &'a CurationRequest) -> CurateFuture<'a> {
        Box::pin(self.curate_impl(req))
    }

    fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

/// Short stable id of a prompt for log correlation; the prompt itself is never logged.
fn prompt_hash(messages: &[ChatMessage]) -> String {
    let mut hasher = Sha256::new();
    for m in messages {
        hasher.update(m.role.as_bytes());
        hasher.update(b"\n");
        hasher.update(m.content.as_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

/// Reply used by the mock provider: one pick whose link and source come from the pool.
pub const MOCK_REPLY: &str =
    r#"[{"title": "Mock pick", "summary": "Deterministic mock curation.", "reason": "Selected by mock curator"}]"#;

/// Factory: build a curator according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock curator.
/// * Else if the config has no usable key (or is disabled), returns a disabled curator.
/// * Else builds the OpenRouter-backed curator.
pub fn build_curator(cfg: &CurationConfig) -> DynCurator {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(ModelCurator::new(MockProvider::new(MOCK_REPLY)));
    }

    if !cfg.is_usable() {
        return Arc::new(DisabledCurator);
    }

    match cfg.provider.as_str() {
        "openrouter" => match OpenRouterProvider::new(cfg) {
            Ok(p) => Arc::new(ModelCurator::new(p)),
            Err(e) => {
                tracing::warn!(error = %e, "curation client unavailable; curation disabled");
                Arc::new(DisabledCurator)
            }
        },
        other => {
            tracing::warn!(provider = other, "unsupported curation provider; curation disabled");
            Arc::new(DisabledCurator)
        }
    }
}
