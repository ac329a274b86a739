//! Error taxonomy surfaced to callers of the router

use crate::api::{ApiError, ProviderId};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a provider call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    RateLimited,
    Auth,
    Transport,
    Upstream,
    MalformedResponse,
    Unsupported,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::RateLimited => "rate limited",
            FailureReason::Auth => "authentication",
            FailureReason::Transport => "transport",
            FailureReason::Upstream => "upstream error",
            FailureReason::MalformedResponse => "malformed response",
            FailureReason::Unsupported => "unsupported",
        };
        f.write_str(text)
    }
}

impl From<&ApiError> for FailureReason {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Timeout(_) => FailureReason::Timeout,
            ApiError::RateLimited { .. } => FailureReason::RateLimited,
            ApiError::Auth(_) => FailureReason::Auth,
            ApiError::Http(e) if e.is_timeout() => FailureReason::Timeout,
            ApiError::Http(_) => FailureReason::Transport,
            ApiError::Provider(_) => FailureReason::Upstream,
            ApiError::MalformedResponse(_) | ApiError::Serialization(_) => {
                FailureReason::MalformedResponse
            }
            ApiError::ToolsUnsupported(_) => FailureReason::Unsupported,
        }
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing credential {credential} for provider {provider}")]
    MissingCredential {
        provider: ProviderId,
        credential: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider {provider} failed ({reason}): {message}")]
    Provider {
        provider: ProviderId,
        reason: FailureReason,
        message: String,
        fallback_attempted: bool,
    },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Tool '{name}' failed: {message}")]
    ToolExecution { name: String, message: String },

    #[error("Prompt needs {required} tokens but {provider} allows {available}")]
    BudgetExceeded {
        provider: ProviderId,
        required: usize,
        available: usize,
    },
}

/// Coarse error kind callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    Configuration,
    Provider,
    ToolNotFound,
    ToolExecution,
    BudgetExceeded,
}

/// Structured error body for the transport layer
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub message: String,
}

impl OrchestratorError {
    pub fn provider(provider: ProviderId, err: &ApiError, fallback_attempted: bool) -> Self {
        OrchestratorError::Provider {
            provider,
            reason: FailureReason::from(err),
            message: err.to_string(),
            fallback_attempted,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            OrchestratorError::MissingCredential { .. } | OrchestratorError::Configuration(_) => {
                ErrorKind::Configuration
            }
            OrchestratorError::Provider { .. } => ErrorKind::Provider,
            OrchestratorError::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            OrchestratorError::ToolExecution { .. } => ErrorKind::ToolExecution,
            OrchestratorError::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
        }
    }

    /// Provider involved in the failure, if any
    pub fn provider_id(&self) -> Option<ProviderId> {
        match self {
            OrchestratorError::MissingCredential { provider, .. }
            | OrchestratorError::Provider { provider, .. }
            | OrchestratorError::BudgetExceeded { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind(),
            provider: self.provider_id().map(|id| id.to_string()),
            message: self.to_string(),
        }
    }
}
