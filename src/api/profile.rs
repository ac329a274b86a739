//! Static capability profiles for the known providers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known completion providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Gemini,
    DeepSeek,
    Sarvam,
    Groq,
}

/// Capability tags used by routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Multimodal,
    Reasoning,
    CodeSpecialized,
    ToolCapable,
    CostEfficient,
    LocaleAware,
    General,
}

/// Wire protocol spoken by a provider's HTTP endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `/chat/completions` with bearer auth
    OpenAi,
    /// `/messages` with `x-api-key`
    Anthropic,
}

/// Immutable routing and pricing metadata for one provider
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProviderProfile {
    pub id: ProviderId,
    pub capabilities: &'static [Capability],
    /// Cost per 1K input tokens (USD)
    pub input_cost_per_1k: f64,
    /// Cost per 1K output tokens (USD)
    pub output_cost_per_1k: f64,
    /// Maximum context window in tokens
    pub context_window: usize,
    pub default_model: &'static str,
    pub default_max_tokens: u32,
    pub default_base_url: &'static str,
    /// Environment variable holding the credential
    pub credential_env: &'static str,
    #[serde(skip)]
    pub wire: WireFormat,
}

impl ProviderProfile {
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn is_tool_capable(&self) -> bool {
        self.has(Capability::ToolCapable)
    }

    /// (input, output) cost per 1K tokens
    pub fn pricing(&self) -> (f64, f64) {
        (self.input_cost_per_1k, self.output_cost_per_1k)
    }
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::OpenAi,
        ProviderId::Anthropic,
        ProviderId::Gemini,
        ProviderId::DeepSeek,
        ProviderId::Sarvam,
        ProviderId::Groq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Gemini => "gemini",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Sarvam => "sarvam",
            ProviderId::Groq => "groq",
        }
    }

    pub fn profile(&self) -> ProviderProfile {
        match self {
            ProviderId::OpenAi => ProviderProfile {
                id: *self,
                capabilities: &[
                    Capability::Multimodal,
                    Capability::ToolCapable,
                    Capability::General,
                ],
                input_cost_per_1k: 0.0025,
                output_cost_per_1k: 0.01,
                context_window: 128_000,
                default_model: "gpt-4o",
                default_max_tokens: 4096,
                default_base_url: "https://api.openai.com/v1",
                credential_env: "OPENAI_API_KEY",
                wire: WireFormat::OpenAi,
            },
            ProviderId::Anthropic => ProviderProfile {
                id: *self,
                capabilities: &[
                    Capability::Reasoning,
                    Capability::ToolCapable,
                    Capability::CodeSpecialized,
                ],
                input_cost_per_1k: 0.003,
                output_cost_per_1k: 0.015,
                context_window: 200_000,
                default_model: "claude-sonnet-4-20250514",
                default_max_tokens: 4096,
                default_base_url: "https://api.anthropic.com/v1",
                credential_env: "ANTHROPIC_API_KEY",
                wire: WireFormat::Anthropic,
            },
            ProviderId::Gemini => ProviderProfile {
                id: *self,
                capabilities: &[Capability::Multimodal, Capability::CostEfficient],
                input_cost_per_1k: 0.0001,
                output_cost_per_1k: 0.0004,
                context_window: 1_000_000,
                default_model: "gemini-2.0-flash",
                default_max_tokens: 8192,
                default_base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
                credential_env: "GEMINI_API_KEY",
                wire: WireFormat::OpenAi,
            },
            ProviderId::DeepSeek => ProviderProfile {
                id: *self,
                capabilities: &[Capability::CodeSpecialized, Capability::CostEfficient],
                input_cost_per_1k: 0.00027,
                output_cost_per_1k: 0.0011,
                context_window: 64_000,
                default_model: "deepseek-chat",
                default_max_tokens: 4096,
                default_base_url: "https://api.deepseek.com/v1",
                credential_env: "DEEPSEEK_API_KEY",
                wire: WireFormat::OpenAi,
            },
            ProviderId::Sarvam => ProviderProfile {
                id: *self,
                capabilities: &[Capability::LocaleAware],
                input_cost_per_1k: 0.0005,
                output_cost_per_1k: 0.0015,
                context_window: 32_000,
                default_model: "sarvam-m",
                default_max_tokens: 2048,
                default_base_url: "https://api.sarvam.ai/v1",
                credential_env: "SARVAM_API_KEY",
                wire: WireFormat::OpenAi,
            },
            ProviderId::Groq => ProviderProfile {
                id: *self,
                capabilities: &[Capability::CostEfficient, Capability::General],
                input_cost_per_1k: 0.00005,
                output_cost_per_1k: 0.00008,
                context_window: 131_072,
                default_model: "llama-3.1-8b-instant",
                default_max_tokens: 2048,
                default_base_url: "https://api.groq.com/openai/v1",
                credential_env: "GROQ_API_KEY",
                wire: WireFormat::OpenAi,
            },
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAi),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            "gemini" => Ok(ProviderId::Gemini),
            "deepseek" => Ok(ProviderId::DeepSeek),
            "sarvam" => Ok(ProviderId::Sarvam),
            "groq" => Ok(ProviderId::Groq),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}
