//! Request routing with one-hop fallback
//!
//! The [`Router`] is the single entry point. For each request it:
//! - Picks a provider (explicit override, or the auto-mode rules)
//! - Decides between the tool round trip and a direct completion
//! - Retries a failed direct completion once against the configured fallback
//! - Computes and records usage for the answer

pub mod selection;

pub use selection::{
    preferred_tool_provider, select_provider, tool_gate, FallbackTable, RouteDecision, RouteRule,
    RouteTable,
};

use crate::api::{
    with_timeout, ApiError, ChatRequest, ChatResponse, Completion, CompletionOptions, HttpProvider,
    ProviderAdapter, ProviderId, TokenUsage,
};
use crate::cache::{cache_key, CacheCounters, TtlCache};
use crate::config::Config;
use crate::error::OrchestratorError;
use crate::metrics::{UsageStats, UsageTracker, DEFAULT_USAGE_CAPACITY};
use crate::optimization::{count_tokens, OptimizationConfig, PromptParts, TokenOptimizer};
use crate::tools::{ToolCaller, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// State shared by every request: the usage ring buffer and the result cache
pub struct OrchestratorState {
    pub usage: UsageTracker,
    pub cache: TtlCache<String>,
}

impl OrchestratorState {
    pub fn new(usage_capacity: usize) -> Self {
        Self {
            usage: UsageTracker::new(usage_capacity),
            cache: TtlCache::new(),
        }
    }
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self::new(DEFAULT_USAGE_CAPACITY)
    }
}

/// Router configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per provider call
    pub timeout_secs: u64,
    /// Prompts longer than this (in characters) count as long
    pub long_prompt_chars: usize,
    /// Lifetime of cached direct-path answers; 0 disables the cache
    pub response_cache_ttl_secs: u64,
    pub routes: RouteTable,
    pub fallbacks: FallbackTable,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            long_prompt_chars: 500,
            response_cache_ttl_secs: 60,
            routes: RouteTable::default(),
            fallbacks: FallbackTable::default(),
        }
    }
}

/// Which path a request takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePath {
    Direct,
    Tools,
}

/// Routing outcome, computed without touching the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    pub decision: RouteDecision,
    pub tool_gate: bool,
    pub path: RoutePath,
    /// Provider the chosen path talks to
    pub provider: ProviderId,
    pub fallback: Option<ProviderId>,
}

/// Builds a [`Router`] from adapters, tools and settings
pub struct RouterBuilder {
    config: RouterConfig,
    optimization: OptimizationConfig,
    usage_capacity: usize,
    adapters: BTreeMap<ProviderId, Arc<dyn ProviderAdapter>>,
    registry: ToolRegistry,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            config: RouterConfig::default(),
            optimization: OptimizationConfig::default(),
            usage_capacity: DEFAULT_USAGE_CAPACITY,
            adapters: BTreeMap::new(),
            registry: ToolRegistry::new(),
        }
    }

    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn optimization(mut self, optimization: OptimizationConfig) -> Self {
        self.optimization = optimization;
        self
    }

    pub fn usage_capacity(mut self, capacity: usize) -> Self {
        self.usage_capacity = capacity;
        self
    }

    /// Register an adapter; a later adapter for the same id replaces it
    pub fn adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.id(), adapter);
        self
    }

    pub fn tools(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> Router {
        let state = Arc::new(OrchestratorState::new(self.usage_capacity));
        let optimizer = Arc::new(TokenOptimizer::new(self.optimization, Arc::clone(&state)));
        let tool_caller = ToolCaller::new(
            Arc::clone(&optimizer),
            Arc::new(self.registry),
            Duration::from_secs(self.config.timeout_secs),
        );

        info!(
            providers = self.adapters.len(),
            tools = tool_caller.registry().len(),
            "Router ready"
        );

        Router {
            config: self.config,
            adapters: self.adapters,
            optimizer,
            tool_caller,
            state,
        }
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes chat requests to provider adapters
pub struct Router {
    config: RouterConfig,
    adapters: BTreeMap<ProviderId, Arc<dyn ProviderAdapter>>,
    optimizer: Arc<TokenOptimizer>,
    tool_caller: ToolCaller,
    state: Arc<OrchestratorState>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// HTTP adapters for every enabled provider in `config`
    pub fn from_config(config: &Config, registry: ToolRegistry) -> Self {
        let mut builder = RouterBuilder::new()
            .config(config.router.clone())
            .optimization(config.optimization.to_optimization_config())
            .usage_capacity(config.optimization.usage_capacity)
            .tools(registry);

        for id in ProviderId::ALL {
            let settings = config.providers.get(id);
            if settings.enabled {
                builder = builder.adapter(Arc::new(HttpProvider::new(id, settings)));
            } else {
                debug!(provider = %id, "Provider disabled in config");
            }
        }

        builder.build()
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &TokenOptimizer {
        &self.optimizer
    }

    pub fn providers(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.adapters.keys().copied()
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Decide provider and path for `request` without calling anything
    pub fn plan(&self, request: &ChatRequest) -> Result<RoutePlan, OrchestratorError> {
        let exposed = self.tool_caller.registry().select(&request.tools)?.len();
        let decision = select_provider(request, &self.config.routes, self.config.long_prompt_chars);
        let gate = tool_gate(&request.prompt);

        let tool_provider = if gate && exposed > 0 {
            let candidate = match request.provider.explicit() {
                Some(explicit) => explicit,
                None => preferred_tool_provider(&request.prompt, &self.config.routes),
            };
            let capable = candidate.profile().is_tool_capable()
                && self
                    .adapters
                    .get(&candidate)
                    .map_or(true, |adapter| adapter.supports_tools());
            capable.then_some(candidate)
        } else {
            None
        };

        Ok(match tool_provider {
            Some(provider) => RoutePlan {
                decision,
                tool_gate: gate,
                path: RoutePath::Tools,
                provider,
                fallback: None,
            },
            None => RoutePlan {
                decision,
                tool_gate: gate,
                path: RoutePath::Direct,
                provider: decision.provider,
                fallback: self.config.fallbacks.get(decision.provider),
            },
        })
    }

    /// Answer a chat request
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, OrchestratorError> {
        validate(&request)?;

        let plan = self.plan(&request)?;
        info!(
            provider = %plan.provider,
            rule = %plan.decision.rule,
            path = ?plan.path,
            "Routing request"
        );

        let adapter = self.ready_adapter(plan.provider)?;
        let options = CompletionOptions {
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        };

        match plan.path {
            RoutePath::Tools => self.chat_with_tools(adapter, &request, &options).await,
            RoutePath::Direct => self.chat_direct(adapter, &request, &options).await,
        }
    }

    async fn chat_with_tools(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        request: &ChatRequest,
        options: &CompletionOptions,
    ) -> Result<ChatResponse, OrchestratorError> {
        let provider = adapter.id();
        let available = self.available_tokens(adapter.as_ref(), options);
        let required = count_tokens(&request.prompt);
        if required > available {
            return Err(OrchestratorError::BudgetExceeded {
                provider,
                required,
                available,
            });
        }

        let outcome = self
            .tool_caller
            .call_with_tools(
                adapter.as_ref(),
                &request.prompt,
                &request.context,
                &request.tools,
                options,
            )
            .await?;

        let prompt_text = format!("{}\n\n{}", outcome.system_prompt, request.prompt);
        let usage = self
            .optimizer
            .calculate_usage(&prompt_text, &outcome.response_text, provider.as_str());
        self.optimizer.track_usage(usage);

        info!(
            provider = %provider,
            tools = outcome.tools_used.len(),
            tokens = usage.total,
            cost = usage.cost,
            "Tool request complete"
        );

        Ok(ChatResponse {
            provider: provider.to_string(),
            response: outcome.response_text,
            tools_used: outcome.tools_used,
            usage,
            provider_usage: outcome.usage,
            fallback_from: None,
            cached: false,
        })
    }

    async fn chat_direct(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        request: &ChatRequest,
        options: &CompletionOptions,
    ) -> Result<ChatResponse, OrchestratorError> {
        let provider = adapter.id();
        let parts = self.fit_prompt(adapter.as_ref(), request, options)?;
        let key = self.response_key(provider, options, &parts);

        if self.config.response_cache_ttl_secs > 0 {
            if let Some(text) = self.optimizer.get_cached(&key) {
                info!(provider = %provider, "Serving cached response");
                let usage = self
                    .optimizer
                    .calculate_usage(&parts.text(), &text, provider.as_str());
                return Ok(ChatResponse {
                    provider: provider.to_string(),
                    response: text,
                    tools_used: Vec::new(),
                    usage,
                    provider_usage: TokenUsage::default(),
                    fallback_from: None,
                    cached: true,
                });
            }
        }

        let primary_err = match self.complete(adapter, &parts, options).await {
            Ok(completion) => return Ok(self.finish(provider, None, &parts, key, completion)),
            Err(err) => err,
        };

        warn!(provider = %provider, error = %primary_err, "Provider call failed");

        let Some(fallback) = self.config.fallbacks.get(provider) else {
            return Err(OrchestratorError::provider(provider, &primary_err, false));
        };
        let fallback_adapter = match self.adapters.get(&fallback) {
            Some(adapter) if adapter.has_credential() => adapter,
            _ => {
                warn!(provider = %provider, fallback = %fallback, "Fallback provider unavailable");
                return Err(OrchestratorError::provider(provider, &primary_err, false));
            }
        };

        let fallback_parts = match self.fit_prompt(fallback_adapter.as_ref(), request, options) {
            Ok(parts) => parts,
            Err(err) => {
                warn!(
                    provider = %provider,
                    fallback = %fallback,
                    error = %err,
                    "Prompt does not fit the fallback provider"
                );
                return Err(OrchestratorError::provider(provider, &primary_err, false));
            }
        };
        info!(from = %provider, to = %fallback, "Falling back");
        match self.complete(fallback_adapter, &fallback_parts, options).await {
            Ok(completion) => {
                let key = self.response_key(fallback, options, &fallback_parts);
                Ok(self.finish(fallback, Some(provider), &fallback_parts, key, completion))
            }
            Err(err) => {
                warn!(provider = %fallback, error = %err, "Fallback provider failed");
                Err(OrchestratorError::provider(fallback, &err, true))
            }
        }
    }

    async fn complete(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        parts: &PromptParts,
        options: &CompletionOptions,
    ) -> Result<Completion, ApiError> {
        with_timeout(
            self.timeout(),
            adapter.complete(&parts.system, &parts.user, options),
        )
        .await
    }

    fn finish(
        &self,
        provider: ProviderId,
        fallback_from: Option<ProviderId>,
        parts: &PromptParts,
        key: String,
        completion: Completion,
    ) -> ChatResponse {
        let usage = self
            .optimizer
            .calculate_usage(&parts.text(), &completion.text, provider.as_str());
        self.optimizer.track_usage(usage);

        if self.config.response_cache_ttl_secs > 0 {
            self.optimizer.cache_result(
                &key,
                completion.text.clone(),
                self.config.response_cache_ttl_secs,
            );
        }

        info!(
            provider = %provider,
            tokens = usage.total,
            cost = usage.cost,
            "Request complete"
        );

        ChatResponse {
            provider: provider.to_string(),
            response: completion.text,
            tools_used: Vec::new(),
            usage,
            provider_usage: completion.usage,
            fallback_from: fallback_from.map(|id| id.to_string()),
            cached: false,
        }
    }

    /// Adapter for `provider`, checked for a credential before any network call
    fn ready_adapter(
        &self,
        provider: ProviderId,
    ) -> Result<&Arc<dyn ProviderAdapter>, OrchestratorError> {
        let adapter = self.adapters.get(&provider).ok_or_else(|| {
            OrchestratorError::Configuration(format!("provider {} is not configured", provider))
        })?;

        if !adapter.has_credential() {
            return Err(OrchestratorError::MissingCredential {
                provider,
                credential: provider.profile().credential_env.to_string(),
            });
        }
        Ok(adapter)
    }

    /// Prompt tokens left once the adapter's output reservation is taken from the window
    fn available_tokens(&self, adapter: &dyn ProviderAdapter, options: &CompletionOptions) -> usize {
        let max_output = options.max_tokens.unwrap_or_else(|| adapter.max_output_tokens()) as usize;
        adapter.id().profile().context_window.saturating_sub(max_output)
    }

    /// Assembled prompt that fits the provider's window, dropping history if needed
    fn fit_prompt(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &ChatRequest,
        options: &CompletionOptions,
    ) -> Result<PromptParts, OrchestratorError> {
        let provider = adapter.id();
        let available = self.available_tokens(adapter, options);

        let parts = self.optimizer.build_prompt_parts(
            &request.prompt,
            &request.context,
            &request.context.conversation_history,
        );
        if count_tokens(&parts.text()) <= available {
            return Ok(parts);
        }

        let bare = self
            .optimizer
            .build_prompt_parts(&request.prompt, &request.context, &[]);
        let required = count_tokens(&bare.text());
        if required <= available {
            warn!(provider = %provider, "Prompt over budget, dropped history");
            return Ok(bare);
        }

        Err(OrchestratorError::BudgetExceeded {
            provider,
            required,
            available,
        })
    }

    fn response_key(
        &self,
        provider: ProviderId,
        options: &CompletionOptions,
        parts: &PromptParts,
    ) -> String {
        let temperature = format!("{:.2}", options.temperature);
        let max_tokens = options.max_tokens.map(|t| t.to_string()).unwrap_or_default();
        cache_key(&[
            provider.as_str(),
            &temperature,
            &max_tokens,
            &parts.system,
            &parts.user,
        ])
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.optimizer.usage_stats()
    }

    pub fn cache_counters(&self) -> CacheCounters {
        self.state.cache.counters()
    }
}

fn validate(request: &ChatRequest) -> Result<(), OrchestratorError> {
    if request.prompt.trim().is_empty() {
        return Err(OrchestratorError::InvalidRequest(
            "prompt must not be empty".to_string(),
        ));
    }
    if !(0.0..=2.0).contains(&request.temperature) {
        return Err(OrchestratorError::InvalidRequest(format!(
            "temperature {} is outside 0.0..=2.0",
            request.temperature
        )));
    }
    if request.max_output_tokens == Some(0) {
        return Err(OrchestratorError::InvalidRequest(
            "maxOutputTokens must be positive".to_string(),
        ));
    }
    Ok(())
}
