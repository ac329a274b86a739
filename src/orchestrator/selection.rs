//! Auto-mode provider selection and the tool-usage gate
//!
//! Everything here is a pure function of the request text and context flags,
//! so the same request always routes the same way.

use crate::api::{ChatRequest, ProviderId};
use crate::optimization::summary::{GSTIN_RE, PAN_RE};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

const CODE_KEYWORDS: &[&str] = &["implement", "function", "code", "refactor", "debug", "script"];

const REASONING_KEYWORDS: &[&str] = &["analyze", "analyse", "explain", "compare", "evaluate"];

const TOOL_GATE_KEYWORDS: &[&str] = &[
    "status",
    "production",
    "efficiency",
    "forecast",
    "analyze",
    "show me",
    "what is",
    "how much",
    "calculate",
    "check",
    "monitor",
    "report",
];

static LOCALE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)₹|\binr\b|\brs\.|\blakhs?\b|\bcrores?\b|\bgst(?:in)?\b").expect("valid locale regex")
});

/// Which selection rule produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteRule {
    Override,
    Multimodal,
    Locale,
    Code,
    Reasoning,
    Tools,
    LongPrompt,
    Default,
}

impl fmt::Display for RouteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RouteRule::Override => "explicit override",
            RouteRule::Multimodal => "binary attachment",
            RouteRule::Locale => "locale markers",
            RouteRule::Code => "code keywords",
            RouteRule::Reasoning => "reasoning keywords",
            RouteRule::Tools => "tool list",
            RouteRule::LongPrompt => "long prompt",
            RouteRule::Default => "default",
        };
        f.write_str(text)
    }
}

/// Target provider for each auto-mode rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTable {
    pub multimodal: ProviderId,
    pub locale: ProviderId,
    pub code: ProviderId,
    pub reasoning: ProviderId,
    pub tools: ProviderId,
    pub long_prompt: ProviderId,
    pub default: ProviderId,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            multimodal: ProviderId::Gemini,
            locale: ProviderId::Sarvam,
            code: ProviderId::DeepSeek,
            reasoning: ProviderId::Anthropic,
            tools: ProviderId::OpenAi,
            long_prompt: ProviderId::Gemini,
            default: ProviderId::Groq,
        }
    }
}

/// One-hop fallback target per primary provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackTable {
    pub openai: Option<ProviderId>,
    pub anthropic: Option<ProviderId>,
    pub gemini: Option<ProviderId>,
    pub deepseek: Option<ProviderId>,
    pub sarvam: Option<ProviderId>,
    pub groq: Option<ProviderId>,
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self {
            openai: Some(ProviderId::Anthropic),
            anthropic: Some(ProviderId::OpenAi),
            gemini: Some(ProviderId::OpenAi),
            deepseek: Some(ProviderId::Groq),
            sarvam: Some(ProviderId::OpenAi),
            groq: Some(ProviderId::DeepSeek),
        }
    }
}

impl FallbackTable {
    /// No fallback at all
    pub fn none() -> Self {
        Self {
            openai: None,
            anthropic: None,
            gemini: None,
            deepseek: None,
            sarvam: None,
            groq: None,
        }
    }

    /// Fallback for `primary`; a mapping back to itself counts as none
    pub fn get(&self, primary: ProviderId) -> Option<ProviderId> {
        let target = match primary {
            ProviderId::OpenAi => self.openai,
            ProviderId::Anthropic => self.anthropic,
            ProviderId::Gemini => self.gemini,
            ProviderId::DeepSeek => self.deepseek,
            ProviderId::Sarvam => self.sarvam,
            ProviderId::Groq => self.groq,
        };
        target.filter(|&id| id != primary)
    }

    pub fn set(&mut self, primary: ProviderId, fallback: Option<ProviderId>) {
        let slot = match primary {
            ProviderId::OpenAi => &mut self.openai,
            ProviderId::Anthropic => &mut self.anthropic,
            ProviderId::Gemini => &mut self.gemini,
            ProviderId::DeepSeek => &mut self.deepseek,
            ProviderId::Sarvam => &mut self.sarvam,
            ProviderId::Groq => &mut self.groq,
        };
        *slot = fallback;
    }
}

/// Outcome of provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub provider: ProviderId,
    pub rule: RouteRule,
}

impl RouteDecision {
    fn new(provider: ProviderId, rule: RouteRule) -> Self {
        Self { provider, rule }
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|keyword| lower.contains(keyword))
}

pub fn has_locale_markers(prompt: &str) -> bool {
    LOCALE_RE.is_match(prompt) || GSTIN_RE.is_match(prompt) || PAN_RE.is_match(prompt)
}

pub fn has_code_keywords(prompt: &str) -> bool {
    contains_any(prompt, CODE_KEYWORDS)
}

pub fn has_reasoning_keywords(prompt: &str) -> bool {
    contains_any(prompt, REASONING_KEYWORDS)
}

/// Whether the request should go through the tool round trip at all
pub fn tool_gate(prompt: &str) -> bool {
    contains_any(prompt, TOOL_GATE_KEYWORDS)
}

/// Pick a provider for `request`; the first matching rule wins
pub fn select_provider(request: &ChatRequest, routes: &RouteTable, long_prompt_chars: usize) -> RouteDecision {
    if let Some(provider) = request.provider.explicit() {
        return RouteDecision::new(provider, RouteRule::Override);
    }

    let prompt = request.prompt.as_str();

    if request.context.has_binary_content() {
        RouteDecision::new(routes.multimodal, RouteRule::Multimodal)
    } else if has_locale_markers(prompt) {
        RouteDecision::new(routes.locale, RouteRule::Locale)
    } else if has_code_keywords(prompt) {
        RouteDecision::new(routes.code, RouteRule::Code)
    } else if has_reasoning_keywords(prompt) {
        RouteDecision::new(routes.reasoning, RouteRule::Reasoning)
    } else if !request.tools.is_empty() {
        RouteDecision::new(routes.tools, RouteRule::Tools)
    } else if prompt.chars().count() > long_prompt_chars {
        RouteDecision::new(routes.long_prompt, RouteRule::LongPrompt)
    } else {
        RouteDecision::new(routes.default, RouteRule::Default)
    }
}

/// Tool-capable provider to use for the tool path in auto mode
pub fn preferred_tool_provider(prompt: &str, routes: &RouteTable) -> ProviderId {
    if has_reasoning_keywords(prompt) && routes.reasoning.profile().is_tool_capable() {
        routes.reasoning
    } else {
        routes.tools
    }
}
