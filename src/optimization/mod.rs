//! Token accounting and prompt budgeting
//!
//! [`count_tokens`] is a reproducible approximation, not a real tokenizer: it
//! averages a character-based and a word-based estimate. Everything else here
//! (history trimming, prompt assembly, usage math) is measured with it.

pub mod history;
pub mod summary;

pub use history::{assemble_parts, assemble_prompt, optimize_history, truncate_chars, PromptParts};
pub use summary::{summarize_conversation, ConversationSummary, ExtractedContext};

use crate::api::{Message, ProviderId, RequestContext};
use crate::metrics::{Pricing, UsageRecord, UsageStats};
use crate::orchestrator::OrchestratorState;
use crate::tools::ToolCategory;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const SYSTEM_PREAMBLE: &str = "You are an operations assistant for manufacturing and procurement teams. \
Answer precisely and concisely, and say so when you do not know.";

/// Approximate token count: mean of ceil(chars / 4) and ceil(words * 1.33)
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count();
    let words = text.split_whitespace().count();

    let char_tokens = chars.div_ceil(4);
    let word_tokens = (words as f64 * 1.33).ceil() as usize;
    (char_tokens + word_tokens).div_ceil(2)
}

/// Configuration for prompt budgeting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Token budget for the history section of an assembled prompt
    pub history_token_budget: usize,
    /// Per-line character cap for history lines
    pub history_line_chars: usize,
    /// Histories longer than this are summarized first
    pub summarize_after: usize,
    /// Messages left verbatim after summarizing
    pub keep_recent: usize,
    /// Pricing used for provider ids without a profile
    pub default_pricing: Pricing,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            history_token_budget: 500,
            history_line_chars: 200,
            summarize_after: 20,
            keep_recent: 10,
            default_pricing: Pricing::default(),
        }
    }
}

/// Token estimation, prompt assembly and usage accounting
pub struct TokenOptimizer {
    config: OptimizationConfig,
    state: Arc<OrchestratorState>,
}

impl TokenOptimizer {
    pub fn new(config: OptimizationConfig, state: Arc<OrchestratorState>) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        count_tokens(text)
    }

    pub fn pricing_for(&self, provider_id: &str) -> Pricing {
        match provider_id.parse::<ProviderId>() {
            Ok(id) => {
                let (input, output) = id.profile().pricing();
                Pricing::new(input, output)
            }
            Err(_) => self.config.default_pricing,
        }
    }

    pub fn calculate_usage(&self, prompt: &str, completion: &str, provider_id: &str) -> UsageRecord {
        UsageRecord::new(
            count_tokens(prompt),
            count_tokens(completion),
            self.pricing_for(provider_id),
        )
    }

    pub fn optimize_history(&self, messages: &[Message], token_budget: usize) -> Vec<Message> {
        optimize_history(messages, token_budget)
    }

    pub fn summarize_conversation(&self, messages: &[Message]) -> ConversationSummary {
        summarize_conversation(messages)
    }

    /// Essential context fields as prompt lines
    pub fn context_lines(&self, context: &RequestContext) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(tenant) = &context.tenant {
            lines.push(format!("Company: {}", tenant));
        }
        if let Some(user) = &context.acting_user {
            lines.push(format!("User: {}", user));
        }
        if let Some(scope) = &context.scope {
            lines.push(format!("Scope: {}", scope));
        }
        lines
    }

    /// Summarize long histories, then trim to the history budget
    pub fn prepare_history(&self, history: &[Message]) -> Vec<Message> {
        if history.len() > self.config.summarize_after {
            let split = history.len().saturating_sub(self.config.keep_recent);
            let (older, recent) = history.split_at(split);
            let summary = summarize_conversation(older);
            debug!(
                summarized = older.len(),
                kept = recent.len(),
                "Compressed long history"
            );

            let mut compressed = Vec::with_capacity(recent.len() + 1);
            compressed.push(summary.to_message());
            compressed.extend_from_slice(recent);
            return optimize_history(&compressed, self.config.history_token_budget);
        }
        optimize_history(history, self.config.history_token_budget)
    }

    /// Prompt for the direct completion path
    pub fn build_prompt(
        &self,
        user_query: &str,
        context: &RequestContext,
        history: &[Message],
    ) -> String {
        self.build_prompt_parts(user_query, context, history).text()
    }

    /// Same as [`build_prompt`](Self::build_prompt), split for adapters that
    /// take a separate system prompt
    pub fn build_prompt_parts(
        &self,
        user_query: &str,
        context: &RequestContext,
        history: &[Message],
    ) -> PromptParts {
        let history = self.prepare_history(history);
        assemble_parts(
            SYSTEM_PREAMBLE,
            &self.context_lines(context),
            &history,
            self.config.history_line_chars,
            user_query,
        )
    }

    /// Fuller system section used on the tool path
    pub fn build_tool_system_prompt(
        &self,
        context: &RequestContext,
        categories: &[ToolCategory],
    ) -> String {
        let mut sections = vec![format!(
            "{} You can call tools to fetch live business data.",
            SYSTEM_PREAMBLE
        )];

        if !categories.is_empty() {
            let guidance: Vec<&str> = categories.iter().map(ToolCategory::guidance).collect();
            sections.push(guidance.join("\n"));
        }

        let context_lines = self.context_lines(context);
        if !context_lines.is_empty() {
            sections.push(context_lines.join("\n"));
        }

        let history = self.prepare_history(&context.conversation_history);
        if let Some(section) = history::history_section(&history, self.config.history_line_chars) {
            sections.push(section);
        }

        sections.join("\n\n")
    }

    pub fn track_usage(&self, record: UsageRecord) {
        self.state.usage.track(record);
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.state.usage.stats()
    }

    pub fn cache_result(&self, key: &str, value: String, ttl_secs: u64) {
        self.state.cache.insert_secs(key, value, ttl_secs);
    }

    pub fn get_cached(&self, key: &str) -> Option<String> {
        self.state.cache.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizer() -> TokenOptimizer {
        TokenOptimizer::new(
            OptimizationConfig::default(),
            Arc::new(OrchestratorState::default()),
        )
    }

    #[test]
    fn test_count_tokens_formula() {
        assert_eq!(count_tokens(""), 0);
        // 11 chars -> 3, 2 words -> ceil(2.66) = 3, mean 3
        assert_eq!(count_tokens("hello world"), 3);
        // 4 chars -> 1, 1 word -> 2, ceil(1.5) = 2
        assert_eq!(count_tokens("test"), 2);
        assert_eq!(count_tokens("   "), 1);
    }

    #[test]
    fn test_count_tokens_monotonic_under_concatenation() {
        let samples = [
            "a",
            " ",
            "status",
            "check line 4 output",
            "₹1,25,000 GST",
            "\n\n",
            "a very long sentence about production efficiency and vendor quotations",
        ];
        for a in samples {
            for b in samples {
                let joined = format!("{}{}", a, b);
                assert!(
                    count_tokens(&joined) >= count_tokens(a),
                    "count({:?}) < count({:?})",
                    joined,
                    a
                );
            }
        }
    }

    #[test]
    fn test_calculate_usage_known_provider() {
        let optimizer = optimizer();
        let prompt = "Compare the vendor quotations for M8 bolts";
        let completion = "Vendor B is cheaper by 4 percent.";
        let usage = optimizer.calculate_usage(prompt, completion, "anthropic");

        let expected = crate::metrics::round_cost(
            usage.prompt_tokens as f64 * 0.003 / 1000.0
                + usage.completion_tokens as f64 * 0.015 / 1000.0,
        );
        assert_eq!(usage.prompt_tokens, count_tokens(prompt));
        assert_eq!(usage.completion_tokens, count_tokens(completion));
        assert_eq!(usage.total, usage.prompt_tokens + usage.completion_tokens);
        assert_eq!(usage.cost, expected);
    }

    #[test]
    fn test_calculate_usage_unknown_provider_uses_default_pricing() {
        let optimizer = optimizer();
        let text = "word ".repeat(4000);
        let usage = optimizer.calculate_usage(&text, &text, "mistral");

        let pricing = Pricing::default();
        assert_eq!(usage.cost, pricing.cost(usage.prompt_tokens, usage.completion_tokens));
        assert!(usage.cost > 0.0);
    }

    #[test]
    fn test_build_prompt_includes_context_and_query() {
        let optimizer = optimizer();
        let context = RequestContext {
            tenant: Some("Acme Forge".to_string()),
            ..Default::default()
        };
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let prompt = optimizer.build_prompt("What is the OEE of line 2?", &context, &history);

        assert!(prompt.starts_with(SYSTEM_PREAMBLE));
        assert!(prompt.contains("Company: Acme Forge"));
        assert!(prompt.contains("user: hi\nassistant: hello"));
        assert!(prompt.ends_with("User: What is the OEE of line 2?"));
    }

    #[test]
    fn test_long_history_is_summarized_first() {
        let optimizer = optimizer();
        let history: Vec<Message> = (0..30)
            .map(|i| Message::user(format!("Update {} on vendor payment", i)))
            .collect();

        let prepared = optimizer.prepare_history(&history);
        assert!(prepared
            .iter()
            .any(|m| m.content.starts_with("Earlier conversation: 20 messages covering")));
        assert_eq!(prepared.last(), history.last());
    }

    #[test]
    fn test_tool_system_prompt_sections() {
        let optimizer = optimizer();
        let context = RequestContext {
            tenant: Some("Acme Forge".to_string()),
            acting_user: Some("priya".to_string()),
            scope: Some("Pune plant".to_string()),
            ..Default::default()
        };
        let prompt = optimizer.build_tool_system_prompt(
            &context,
            &[ToolCategory::Production, ToolCategory::Procurement],
        );

        assert!(prompt.contains("call tools"));
        assert!(prompt.contains(ToolCategory::Production.guidance()));
        assert!(prompt.contains(ToolCategory::Procurement.guidance()));
        assert!(prompt.contains("User: priya"));
        assert!(prompt.contains("Scope: Pune plant"));
    }

    #[test]
    fn test_usage_and_cache_go_through_shared_state() {
        let state = Arc::new(OrchestratorState::default());
        let optimizer = TokenOptimizer::new(OptimizationConfig::default(), Arc::clone(&state));

        optimizer.track_usage(optimizer.calculate_usage("a b c", "d e", "groq"));
        assert_eq!(state.usage.len(), 1);
        assert_eq!(optimizer.usage_stats().request_count, 1);

        optimizer.cache_result("k", "v".to_string(), 60);
        assert_eq!(optimizer.get_cached("k").as_deref(), Some("v"));
        assert_eq!(state.cache.len(), 1);
    }
}
