//! Provider replies and the normalized chat response

use crate::metrics::UsageRecord;
use crate::tools::ToolInvocation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token counts as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the response
    pub completion_tokens: u32,
    /// Total tokens used
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Sum of two usages, e.g. both halves of a tool round trip
    pub fn combine(self, other: TokenUsage) -> Self {
        Self::new(
            self.prompt_tokens + other.prompt_tokens,
            self.completion_tokens + other.completion_tokens,
        )
    }
}

/// Plain text completion
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    /// Model that generated the response
    pub model: String,
    /// Whether the response hit the output limit
    pub truncated: bool,
}

impl Completion {
    pub fn new(text: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            text: text.into(),
            usage,
            model: String::new(),
            truncated: false,
        }
    }
}

/// A provider's request to run a tool, in provider-neutral form
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Provider-issued call id (`tool_call_id` / `tool_use_id`)
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Outcome of a tool-enabled completion call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolTurn {
    /// The provider answered directly
    Text(Completion),
    /// The provider wants a tool invoked before answering
    ToolCall {
        call: ToolCallRequest,
        usage: TokenUsage,
    },
}

impl ToolTurn {
    pub fn usage(&self) -> TokenUsage {
        match self {
            ToolTurn::Text(completion) => completion.usage,
            ToolTurn::ToolCall { usage, .. } => *usage,
        }
    }
}

/// Normalized response returned by the router
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Provider that actually produced the answer
    pub provider: String,
    pub response: String,
    pub tools_used: Vec<ToolInvocation>,
    pub usage: UsageRecord,
    /// Raw usage reported upstream, summed over every provider call
    pub provider_usage: TokenUsage,
    /// Primary provider when the fallback hop answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_combine() {
        let first = TokenUsage::new(120, 30);
        let second = TokenUsage::new(200, 80);
        let total = first.combine(second);

        assert_eq!(total.prompt_tokens, 320);
        assert_eq!(total.completion_tokens, 110);
        assert_eq!(total.total_tokens, 430);
    }
}
