// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const ENV_CURATION_CONFIG: &str = "DISCOVERY_AI_CONFIG";
pub const DEFAULT_MODEL: &str = "x-ai/grok-4-fast:free";
pub const OPENROUTER_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

fn default_enabled() -> bool {
    true
}
fn default_provider() -> String {
    "openrouter".to_string()
}
fn default_model() -> String {
    env::var("OPENROUTER_MODEL")
        .ok()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}
fn default_endpoint() -> String {
    OPENROUTER_ENDPOINT.to_string()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.5
}
fn default_timeout_secs() -> u64 {
    45
}
fn default_referer() -> String {
    "https://discovery.local".to_string()
}
fn default_app_title() -> String {
    "Discovery Aggregator".to_string()
}

/// Language-model curation settings. An empty `api_key` disables curation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// "openrouter" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENROUTER_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_app_title")]
    pub app_title: String,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            referer: default_referer(),
            app_title: default_app_title(),
        }
    }
}

impl CurationConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: CurationConfig = serde_json::from_str(&data)?;

        cfg.provider = cfg.provider.to_lowercase();

        // Resolve api key if "ENV"
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openrouter" => env::var("OPENROUTER_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENROUTER_API_KEY env var"))?,
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        cfg.sanitize();
        Ok(cfg)
    }

    /// Environment only: `OPENROUTER_API_KEY`, `OPENROUTER_MODEL`.
    pub fn from_env() -> Self {
        let mut cfg = Self {
            api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            ..Self::default()
        };
        cfg.sanitize();
        cfg
    }

    /// `$DISCOVERY_AI_CONFIG` when set, otherwise the environment.
    pub fn load_default() -> anyhow::Result<Self> {
        match env::var(ENV_CURATION_CONFIG) {
            Ok(p) => Self::load_from_file(p),
            Err(_) => Ok(Self::from_env()),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty()
    }

    fn sanitize(&mut self) {
        self.api_key = self.api_key.trim().to_string();
        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        if self.model.trim().is_empty() {
            self.model = DEFAULT_MODEL.to_string();
        }
    }
}
