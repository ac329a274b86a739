//! HTTP adapter speaking the OpenAI-compatible and Anthropic wire formats

use super::profile::{ProviderId, WireFormat};
use super::{
    ApiError, Completion, CompletionOptions, ProviderAdapter, TokenUsage, ToolCallRequest,
    ToolExchange, ToolTurn,
};
use crate::config::ProviderSettings;
use crate::tools::ToolSchema;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Generic HTTP provider; the wire format comes from the provider profile
pub struct HttpProvider {
    id: ProviderId,
    wire: WireFormat,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
    client: Client,
}

impl HttpProvider {
    pub fn new(id: ProviderId, settings: &ProviderSettings) -> Self {
        let profile = id.profile();
        Self {
            id,
            wire: profile.wire,
            api_key: settings.api_key.clone().filter(|key| !key.trim().is_empty()),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| profile.default_base_url.to_string()),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| profile.default_model.to_string()),
            max_tokens: settings.max_tokens.unwrap_or(profile.default_max_tokens),
            client: Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.wire {
            WireFormat::OpenAi => format!("{}/chat/completions", base),
            WireFormat::Anthropic => format!("{}/messages", base),
        }
    }

    fn body(&self, messages: Vec<Value>, system: &str, options: &CompletionOptions) -> Value {
        let max_tokens = options.max_tokens.unwrap_or(self.max_output_tokens());
        match self.wire {
            WireFormat::OpenAi => {
                let mut all = vec![json!({ "role": "system", "content": system })];
                all.extend(messages);
                json!({
                    "model": self.model,
                    "messages": all,
                    "max_tokens": max_tokens,
                    "temperature": options.temperature,
                })
            }
            WireFormat::Anthropic => json!({
                "model": self.model,
                "system": system,
                "messages": messages,
                "max_tokens": max_tokens,
                "temperature": options.temperature,
            }),
        }
    }

    async fn post(&self, body: &Value) -> Result<Value, ApiError> {
        let key = self.api_key.as_deref().unwrap_or_default();
        let mut request = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");

        request = match self.wire {
            WireFormat::OpenAi => request.header("Authorization", format!("Bearer {}", key)),
            WireFormat::Anthropic => request
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        debug!(provider = %self.id, model = %self.model, "Sending completion request");
        let response = request.json(body).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(match status.as_u16() {
                401 | 403 => ApiError::Auth(format!("{}: {}", status, error_text)),
                429 => ApiError::RateLimited {
                    retry_after_secs: 60,
                },
                _ => ApiError::Provider(format!("{}: {}", status, error_text)),
            })
        }
    }

    fn parse_completion(&self, json: &Value) -> Result<Completion, ApiError> {
        match self.wire {
            WireFormat::OpenAi => parse_openai_completion(json, &self.model),
            WireFormat::Anthropic => parse_anthropic_completion(json, &self.model),
        }
    }
}

#[async_trait]
impl ProviderAdapter for HttpProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn max_output_tokens(&self) -> u32 {
        self.max_tokens
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ApiError> {
        let messages = vec![json!({ "role": "user", "content": user })];
        let body = self.body(messages, system, options);
        let json = self.post(&body).await?;
        self.parse_completion(&json)
    }

    async fn complete_with_tools(
        &self,
        system: &str,
        user: &str,
        tools: &[ToolSchema],
        options: &CompletionOptions,
    ) -> Result<ToolTurn, ApiError> {
        if !self.supports_tools() {
            return Err(ApiError::ToolsUnsupported(self.id));
        }

        let messages = vec![json!({ "role": "user", "content": user })];
        let mut body = self.body(messages, system, options);
        body["tools"] = tool_payload(self.wire, tools);

        let json = self.post(&body).await?;
        match self.wire {
            WireFormat::OpenAi => parse_openai_tool_turn(&json, &self.model),
            WireFormat::Anthropic => parse_anthropic_tool_turn(&json, &self.model),
        }
    }

    async fn complete_tool_follow_up(
        &self,
        exchange: &ToolExchange,
        result: &Value,
        options: &CompletionOptions,
    ) -> Result<Completion, ApiError> {
        if !self.supports_tools() {
            return Err(ApiError::ToolsUnsupported(self.id));
        }

        let messages = follow_up_messages(self.wire, exchange, result)?;
        let mut body = self.body(messages, &exchange.system, options);
        body["tools"] = tool_payload(self.wire, &exchange.tools);

        let json = self.post(&body).await?;
        self.parse_completion(&json)
    }
}

fn tool_payload(wire: WireFormat, tools: &[ToolSchema]) -> Value {
    let tools: Vec<Value> = tools
        .iter()
        .map(|tool| match wire {
            WireFormat::OpenAi => json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            }),
            WireFormat::Anthropic => json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters,
            }),
        })
        .collect();
    Value::Array(tools)
}

fn follow_up_messages(
    wire: WireFormat,
    exchange: &ToolExchange,
    result: &Value,
) -> Result<Vec<Value>, ApiError> {
    let result_text = serde_json::to_string(result)?;
    let call = &exchange.call;

    Ok(match wire {
        WireFormat::OpenAi => vec![
            json!({ "role": "user", "content": exchange.user }),
            json!({
                "role": "assistant",
                "content": Value::Null,
                "tool_calls": [{
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": serde_json::to_string(&call.arguments)?,
                    }
                }]
            }),
            json!({
                "role": "tool",
                "tool_call_id": call.id,
                "content": result_text,
            }),
        ],
        WireFormat::Anthropic => vec![
            json!({ "role": "user", "content": exchange.user }),
            json!({
                "role": "assistant",
                "content": [{
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.arguments,
                }]
            }),
            json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": result_text,
                }]
            }),
        ],
    })
}

fn parse_openai_usage(json: &Value) -> TokenUsage {
    TokenUsage::new(
        json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    )
}

fn parse_anthropic_usage(json: &Value) -> TokenUsage {
    TokenUsage::new(
        json["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
        json["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
    )
}

fn parse_openai_completion(json: &Value, model: &str) -> Result<Completion, ApiError> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| ApiError::MalformedResponse("response has no choices".to_string()))?;

    Ok(Completion {
        text: choice["message"]["content"].as_str().unwrap_or("").to_string(),
        usage: parse_openai_usage(json),
        model: json["model"].as_str().unwrap_or(model).to_string(),
        truncated: choice["finish_reason"].as_str() == Some("length"),
    })
}

fn parse_anthropic_completion(json: &Value, model: &str) -> Result<Completion, ApiError> {
    let blocks = json["content"]
        .as_array()
        .ok_or_else(|| ApiError::MalformedResponse("response has no content".to_string()))?;

    let text = blocks
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    Ok(Completion {
        text,
        usage: parse_anthropic_usage(json),
        model: json["model"].as_str().unwrap_or(model).to_string(),
        truncated: json["stop_reason"].as_str() == Some("max_tokens"),
    })
}

fn parse_openai_tool_turn(json: &Value, model: &str) -> Result<ToolTurn, ApiError> {
    let call = &json["choices"][0]["message"]["tool_calls"][0];
    if call.is_null() {
        return parse_openai_completion(json, model).map(ToolTurn::Text);
    }

    let name = call["function"]["name"]
        .as_str()
        .ok_or_else(|| ApiError::MalformedResponse("tool call without a name".to_string()))?;

    // Arguments arrive as a JSON-encoded string
    let arguments = match &call["function"]["arguments"] {
        Value::String(raw) if raw.trim().is_empty() => json!({}),
        Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
            ApiError::MalformedResponse(format!("tool arguments for '{}': {}", name, e))
        })?,
        Value::Null => json!({}),
        other => other.clone(),
    };

    Ok(ToolTurn::ToolCall {
        call: ToolCallRequest {
            id: call["id"].as_str().unwrap_or_default().to_string(),
            name: name.to_string(),
            arguments,
        },
        usage: parse_openai_usage(json),
    })
}

fn parse_anthropic_tool_turn(json: &Value, model: &str) -> Result<ToolTurn, ApiError> {
    let tool_use = json["content"]
        .as_array()
        .and_then(|blocks| blocks.iter().find(|block| block["type"] == "tool_use"));

    let Some(block) = tool_use else {
        return parse_anthropic_completion(json, model).map(ToolTurn::Text);
    };

    let name = block["name"]
        .as_str()
        .ok_or_else(|| ApiError::MalformedResponse("tool_use without a name".to_string()))?;

    Ok(ToolTurn::ToolCall {
        call: ToolCallRequest {
            id: block["id"].as_str().unwrap_or_default().to_string(),
            name: name.to_string(),
            arguments: block["input"].clone(),
        },
        usage: parse_anthropic_usage(json),
    })
}
