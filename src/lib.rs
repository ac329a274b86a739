//! completion_router - route chat requests across completion providers
//!
//! One entry point, [`Router::chat`], takes a prompt with optional context and
//! returns a normalized response with usage and cost attached.
//!
//! ## Key Features
//!
//! - **Provider Selection**: explicit override, or keyword and context rules in auto mode
//! - **Tool Calling**: one ask/tool/ask round trip against tool-capable providers
//! - **Token Budgeting**: history trimming and summarization before prompts go out
//! - **Fallback**: one extra attempt against a fixed fallback provider
//! - **Usage Tracking**: bounded usage history with aggregate statistics

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod optimization;
pub mod orchestrator;
pub mod tools;

pub use api::{
    ChatRequest, ChatResponse, HttpProvider, Message, ProviderAdapter, ProviderId,
    ProviderSelector, RequestContext,
};
pub use config::{Config, ConfigBuilder, ConfigError};
pub use error::{ErrorKind, ErrorResponse, OrchestratorError};
pub use metrics::{UsageRecord, UsageStats};
pub use optimization::{count_tokens, TokenOptimizer};
pub use orchestrator::{OrchestratorState, Router, RouterBuilder, RouterConfig};
pub use tools::{ParamType, ParameterSpec, ToolCategory, ToolDefinition, ToolRegistry};
