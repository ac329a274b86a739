//! Configuration management for the completion router
//!
//! Supports configuration via:
//! 1. Config file (~/.config/completion-router/config.toml)
//! 2. Environment variables (OPENAI_API_KEY, GROQ_BASE_URL, SARVAM_MODEL, ...)
//! 3. CLI arguments (override file/env settings)

use crate::api::ProviderId;
use crate::metrics::{Pricing, DEFAULT_USAGE_CAPACITY};
use crate::optimization::OptimizationConfig;
use crate::orchestrator::RouterConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-provider connection settings
    pub providers: ProvidersSettings,

    /// Routing, fallback and timeout settings
    pub router: RouterConfig,

    /// Prompt budgeting and usage accounting
    pub optimization: OptimizationSettings,
}

/// Connection settings for one provider; unset fields use the provider profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// API key (can also use <ID>_API_KEY env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL for the provider API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Maximum tokens for responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether the provider is available to the router
    pub enabled: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: None,
            max_tokens: None,
            enabled: true,
        }
    }
}

impl ProviderSettings {
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// One section per known provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSettings {
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub gemini: ProviderSettings,
    pub deepseek: ProviderSettings,
    pub sarvam: ProviderSettings,
    pub groq: ProviderSettings,
}

impl ProvidersSettings {
    pub fn get(&self, id: ProviderId) -> &ProviderSettings {
        match id {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Gemini => &self.gemini,
            ProviderId::DeepSeek => &self.deepseek,
            ProviderId::Sarvam => &self.sarvam,
            ProviderId::Groq => &self.groq,
        }
    }

    pub fn get_mut(&mut self, id: ProviderId) -> &mut ProviderSettings {
        match id {
            ProviderId::OpenAi => &mut self.openai,
            ProviderId::Anthropic => &mut self.anthropic,
            ProviderId::Gemini => &mut self.gemini,
            ProviderId::DeepSeek => &mut self.deepseek,
            ProviderId::Sarvam => &mut self.sarvam,
            ProviderId::Groq => &mut self.groq,
        }
    }
}

/// Optimization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationSettings {
    /// Token budget for conversation history in a prompt
    pub history_token_budget: usize,

    /// Character cap per history line
    pub history_line_chars: usize,

    /// Summarize histories longer than this many messages
    pub summarize_after: usize,

    /// Messages kept verbatim after summarizing
    pub keep_recent: usize,

    /// Usage records kept for statistics
    pub usage_capacity: usize,

    /// Input price per 1K tokens for providers without a profile
    pub default_input_price: f64,

    /// Output price per 1K tokens for providers without a profile
    pub default_output_price: f64,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        let pricing = Pricing::default();
        Self {
            history_token_budget: 500,
            history_line_chars: 200,
            summarize_after: 20,
            keep_recent: 10,
            usage_capacity: DEFAULT_USAGE_CAPACITY,
            default_input_price: pricing.input_per_1k,
            default_output_price: pricing.output_per_1k,
        }
    }
}

impl OptimizationSettings {
    pub fn to_optimization_config(&self) -> OptimizationConfig {
        OptimizationConfig {
            history_token_budget: self.history_token_budget,
            history_line_chars: self.history_line_chars,
            summarize_after: self.summarize_after,
            keep_recent: self.keep_recent,
            default_pricing: Pricing::new(self.default_input_price, self.default_output_price),
        }
    }
}

/// Env var prefix for a provider, e.g. `GROQ` for `GROQ_API_KEY`
fn env_prefix(id: ProviderId) -> &'static str {
    let credential = id.profile().credential_env;
    credential.strip_suffix("_API_KEY").unwrap_or(credential)
}

impl Config {
    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("completion-router")
            .join("config.toml")
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from specific path; a missing file means defaults
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default().with_env_overrides());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config.with_env_overrides())
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for id in ProviderId::ALL {
            let prefix = env_prefix(id);
            let settings = self.providers.get_mut(id);

            if let Some(key) = lookup(&format!("{}_API_KEY", prefix)) {
                settings.api_key = Some(key);
            }
            if let Some(url) = lookup(&format!("{}_BASE_URL", prefix)) {
                settings.base_url = Some(url);
            }
            if let Some(model) = lookup(&format!("{}_MODEL", prefix)) {
                settings.model = Some(model);
            }
        }
        self
    }

    /// Save config to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path())
    }

    /// Save config to specific path
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ready = ProviderId::ALL.iter().any(|&id| {
            let settings = self.providers.get(id);
            settings.enabled && settings.has_api_key()
        });
        if !ready {
            let names: Vec<&str> = ProviderId::ALL
                .iter()
                .map(|id| id.profile().credential_env)
                .collect();
            return Err(ConfigError::MissingRequired(format!(
                "At least one provider needs a credential ({})",
                names.join(", ")
            )));
        }

        let tools = self.router.routes.tools;
        if !tools.profile().is_tool_capable() {
            return Err(ConfigError::Invalid(format!(
                "router.routes.tools is {}, which cannot call tools",
                tools
            )));
        }

        if self.router.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "router.timeout_secs must be positive".to_string(),
            ));
        }

        if self.optimization.keep_recent > self.optimization.summarize_after {
            return Err(ConfigError::Invalid(
                "optimization.keep_recent must not exceed summarize_after".to_string(),
            ));
        }

        Ok(())
    }

    /// Providers that are enabled but have no credential
    pub fn missing_credentials(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|&id| {
                let settings = self.providers.get(id);
                settings.enabled && !settings.has_api_key()
            })
            .collect()
    }

    /// Generate example config content
    pub fn example() -> String {
        let example = Config::default();
        toml::to_string_pretty(&example).unwrap_or_default()
    }
}

/// Builder for creating Config programmatically
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn api_key(mut self, id: ProviderId, key: impl Into<String>) -> Self {
        self.config.providers.get_mut(id).api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, id: ProviderId, url: impl Into<String>) -> Self {
        self.config.providers.get_mut(id).base_url = Some(url.into());
        self
    }

    pub fn model(mut self, id: ProviderId, model: impl Into<String>) -> Self {
        self.config.providers.get_mut(id).model = Some(model.into());
        self
    }

    pub fn disable(mut self, id: ProviderId) -> Self {
        self.config.providers.get_mut(id).enabled = false;
        self
    }

    pub fn fallback(mut self, primary: ProviderId, fallback: Option<ProviderId>) -> Self {
        self.config.router.fallbacks.set(primary, fallback);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.router.timeout_secs = secs;
        self
    }

    pub fn response_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.router.response_cache_ttl_secs = secs;
        self
    }

    pub fn history_token_budget(mut self, tokens: usize) -> Self {
        self.config.optimization.history_token_budget = tokens;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
