//! Chat-completion providers used by the curator.
//!
//! Split the same way as the curator itself: a provider only performs the remote call and
//! hands back the raw text content, so the mock and the real client share parsing.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::config::ai::CurationConfig;
use crate::curate::parse::extract_content;
use crate::curate::prompt::ChatMessage;

pub type ChatFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Low-level provider: one chat completion, returns `choices[0].message.content` as text.
pub trait ChatProvider: Send + Sync + 'static {
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> ChatFuture<'a>;
    fn name(&self) -> &'static str;
}

/// OpenRouter chat completions (OpenAI-compatible wire format).
pub struct OpenRouterProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    referer: String,
    app_title: String,
}

impl OpenRouterProvider {
    pub fn new(cfg: &CurationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building curation http client")?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            referer: cfg.referer.clone(),
            app_title: cfg.app_title.clone(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

impl ChatProvider for OpenRouterProvider {
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> ChatFuture<'a> {
        Box::pin(async move {
            let req = ChatRequest {
                model: &self.model,
                messages,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };

            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .header("HTTP-Referer", &self.referer)
                .header("X-Title", &self.app_title)
                .json(&req)
                .send()
                .await
                .context("curation request failed")?;

            let status = resp.status();
            if !status.is_success() {
                return Err(anyhow!("curation endpoint status {}", status.as_u16()));
            }

            let body: Value = resp.json().await.context("curation response .json()")?;
            let content = body
                .pointer("/choices/0/message/content")
                .map(extract_content)
                .unwrap_or_default();
            Ok(content)
        })
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}

/// Returns a fixed reply; for tests and `AI_TEST_MODE=mock`.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl MockProvider {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self {
            fixed: fixed.into(),
        }
    }
}

impl ChatProvider for MockProvider {
    fn complete<'a>(&'a self, _messages: &'a [ChatMessage]) -> ChatFuture<'a> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
