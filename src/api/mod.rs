//! Provider adapter layer
//!
//! Every backend sits behind [`ProviderAdapter`]. Tool-capable adapters also
//! implement the two tool calls used by the round trip; the defaults reject
//! them so plain adapters only need `complete`.

mod client;
pub mod profile;
mod request;
mod response;

pub use client::HttpProvider;
pub use profile::{Capability, ProviderId, ProviderProfile, UnknownProvider, WireFormat};
pub use request::{Attachment, ChatRequest, Message, ProviderSelector, RequestContext, Role};
pub use response::{ChatResponse, Completion, TokenUsage, ToolCallRequest, ToolTurn};

use crate::tools::ToolSchema;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Tool calling is not supported by {0}")]
    ToolsUnsupported(ProviderId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Await a provider call, giving up after `limit`
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout(limit.as_secs())),
    }
}

/// Per-call generation options
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// The first half of a tool round trip, replayed on the follow-up call
#[derive(Debug, Clone)]
pub struct ToolExchange {
    pub system: String,
    pub user: String,
    pub tools: Vec<ToolSchema>,
    pub call: ToolCallRequest,
}

/// Narrow interface to one completion backend
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Whether the credential is present (never validated upstream)
    fn has_credential(&self) -> bool;

    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ApiError>;

    /// Output tokens requested when the caller leaves `max_tokens` unset
    fn max_output_tokens(&self) -> u32 {
        self.id().profile().default_max_tokens
    }

    fn supports_tools(&self) -> bool {
        self.id().profile().is_tool_capable()
    }

    async fn complete_with_tools(
        &self,
        _system: &str,
        _user: &str,
        _tools: &[ToolSchema],
        _options: &CompletionOptions,
    ) -> Result<ToolTurn, ApiError> {
        Err(ApiError::ToolsUnsupported(self.id()))
    }

    /// Send the prior exchange plus the tool result and get the final answer
    async fn complete_tool_follow_up(
        &self,
        _exchange: &ToolExchange,
        _result: &Value,
        _options: &CompletionOptions,
    ) -> Result<Completion, ApiError> {
        Err(ApiError::ToolsUnsupported(self.id()))
    }
}
