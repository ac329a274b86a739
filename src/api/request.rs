//! Inbound chat request structures

use super::profile::{ProviderId, UnknownProvider};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Explicit provider choice or automatic routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderSelector {
    #[default]
    Auto,
    Explicit(ProviderId),
}

impl ProviderSelector {
    pub fn explicit(&self) -> Option<ProviderId> {
        match self {
            ProviderSelector::Auto => None,
            ProviderSelector::Explicit(id) => Some(*id),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, ProviderSelector::Auto)
    }
}

impl FromStr for ProviderSelector {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(ProviderSelector::Auto)
        } else {
            s.parse().map(ProviderSelector::Explicit)
        }
    }
}

impl TryFrom<String> for ProviderSelector {
    type Error = UnknownProvider;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProviderSelector> for String {
    fn from(selector: ProviderSelector) -> Self {
        match selector {
            ProviderSelector::Auto => "auto".to_string(),
            ProviderSelector::Explicit(id) => id.as_str().to_string(),
        }
    }
}

impl From<ProviderId> for ProviderSelector {
    fn from(id: ProviderId) -> Self {
        ProviderSelector::Explicit(id)
    }
}

/// A file or inline blob attached to the request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    /// Base64 payload or a URL, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Attachment {
    /// Anything that is not plain text counts as image/binary content
    pub fn is_binary(&self) -> bool {
        let mime = self.mime_type.to_lowercase();
        !(mime.starts_with("text/") || mime == "application/json")
    }
}

/// Optional request metadata and conversation history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Tenant or company the request is made for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acting_user: Option<String>,
    /// Data scope the user is allowed to see (plant, region, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<Message>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Anything else the caller wants to carry along
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl RequestContext {
    pub fn has_binary_content(&self) -> bool {
        self.attachments.iter().any(Attachment::is_binary)
    }
}

/// Request accepted by the router
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub context: RequestContext,
    #[serde(default)]
    pub provider: ProviderSelector,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Falls back to the provider's configured limit when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Names of registered tools to expose; empty exposes all of them
    #[serde(default)]
    pub tools: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: RequestContext::default(),
            provider: ProviderSelector::Auto,
            temperature: default_temperature(),
            max_output_tokens: None,
            tools: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<ProviderSelector>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.context.conversation_history = history;
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_tokens);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults_from_json() {
        let request: ChatRequest = serde_json::from_value(json!({
            "prompt": "What is the production status?"
        }))
        .unwrap();

        assert_eq!(request.provider, ProviderSelector::Auto);
        assert_eq!(request.temperature, 0.7);
        assert!(request.tools.is_empty());
        assert!(request.context.conversation_history.is_empty());
    }

    #[test]
    fn test_request_with_explicit_provider_and_context() {
        let request: ChatRequest = serde_json::from_value(json!({
            "prompt": "hello",
            "provider": "anthropic",
            "context": {
                "tenant": "Acme Forge",
                "actingUser": "priya",
                "conversationHistory": [{"role": "user", "content": "hi"}],
                "attachments": [{"name": "defect.png", "mimeType": "image/png"}],
                "plant": "Pune"
            }
        }))
        .unwrap();

        assert_eq!(request.provider, ProviderSelector::Explicit(ProviderId::Anthropic));
        assert_eq!(request.context.tenant.as_deref(), Some("Acme Forge"));
        assert_eq!(request.context.acting_user.as_deref(), Some("priya"));
        assert_eq!(request.context.conversation_history.len(), 1);
        assert_eq!(request.context.metadata["plant"], json!("Pune"));
        assert_eq!(request.context.attachments[0].mime_type, "image/png");
        assert!(request.context.has_binary_content());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result: Result<ChatRequest, _> =
            serde_json::from_value(json!({"prompt": "x", "provider": "mistral"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_binary_attachment_detection() {
        let mut context = RequestContext::default();
        context.attachments.push(Attachment {
            name: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
            data: None,
        });
        assert!(!context.has_binary_content());

        context.attachments.push(Attachment {
            name: "defect.png".to_string(),
            mime_type: "image/png".to_string(),
            data: None,
        });
        assert!(context.has_binary_content());
    }
}
