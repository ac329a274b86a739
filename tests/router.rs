//! End-to-end routing behavior against scripted in-memory providers

use async_trait::async_trait;
use completion_router::api::{
    ApiError, ChatRequest, Completion, CompletionOptions, ProviderAdapter, ProviderId,
    TokenUsage, ToolCallRequest, ToolExchange, ToolTurn,
};
use completion_router::error::{ErrorKind, FailureReason};
use completion_router::metrics::round_cost;
use completion_router::orchestrator::{FallbackTable, Router, RouterConfig};
use completion_router::tools::{ParamType, ParameterSpec, ToolCategory, ToolDefinition, ToolRegistry, ToolSchema};
use completion_router::OrchestratorError;
use futures_util::FutureExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[derive(Clone)]
enum Script {
    Answer(&'static str),
    Fail,
    Stall(Duration),
    CallTool { name: &'static str, arguments: Value },
}

struct StubProvider {
    id: ProviderId,
    script: Script,
    calls: AtomicUsize,
    follow_ups: AtomicUsize,
    tool_result: Mutex<Option<Value>>,
}

impl StubProvider {
    fn new(id: ProviderId, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id,
            script,
            calls: AtomicUsize::new(0),
            follow_ups: AtomicUsize::new(0),
            tool_result: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn follow_ups(&self) -> usize {
        self.follow_ups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StubProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn has_credential(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        _system: &str,
        _user: &str,
        _options: &CompletionOptions,
    ) -> Result<Completion, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Answer(text) => Ok(Completion::new(*text, TokenUsage::new(40, 10))),
            Script::Fail => Err(ApiError::Provider("500: internal error".to_string())),
            Script::Stall(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Completion::new("too late", TokenUsage::default()))
            }
            Script::CallTool { .. } => Ok(Completion::new("direct answer", TokenUsage::new(40, 10))),
        }
    }

    async fn complete_with_tools(
        &self,
        _system: &str,
        _user: &str,
        _tools: &[ToolSchema],
        _options: &CompletionOptions,
    ) -> Result<ToolTurn, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::CallTool { name, arguments } => Ok(ToolTurn::ToolCall {
                call: ToolCallRequest {
                    id: "toolu_01".to_string(),
                    name: name.to_string(),
                    arguments: arguments.clone(),
                },
                usage: TokenUsage::new(120, 15),
            }),
            Script::Answer(text) => Ok(ToolTurn::Text(Completion::new(*text, TokenUsage::new(60, 8)))),
            Script::Fail | Script::Stall(_) => Err(ApiError::Provider("500: internal error".to_string())),
        }
    }

    async fn complete_tool_follow_up(
        &self,
        exchange: &ToolExchange,
        result: &Value,
        _options: &CompletionOptions,
    ) -> Result<Completion, ApiError> {
        self.follow_ups.fetch_add(1, Ordering::SeqCst);
        *self.tool_result.lock().unwrap() = Some(result.clone());
        Ok(Completion::new(
            format!("{} reports line {} {}", exchange.call.name, result["line"], result["state"]),
            TokenUsage::new(180, 25),
        ))
    }
}

/// Registry with one production tool; returns the handler's call log
fn factory_tools() -> (ToolRegistry, Arc<Mutex<Vec<Value>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler_log = Arc::clone(&log);

    let mut registry = ToolRegistry::new();
    registry
        .register_fn(
            "get_factory_status",
            "Live status of a production line",
            vec![ParameterSpec::required("line", ParamType::Integer, "Line number")],
            move |args: Value| {
                let log = Arc::clone(&handler_log);
                async move {
                    log.lock().unwrap().push(args.clone());
                    Ok::<_, anyhow::Error>(json!({ "line": args["line"], "state": "running" }))
                }
                .boxed()
            },
        )
        .unwrap();
    (registry, log)
}

fn uncached() -> RouterConfig {
    RouterConfig {
        response_cache_ttl_secs: 0,
        ..RouterConfig::default()
    }
}

#[tokio::test]
async fn explicit_override_wins_on_direct_path() {
    let sarvam = StubProvider::new(ProviderId::Sarvam, Script::Answer("namaste"));
    let deepseek = StubProvider::new(ProviderId::DeepSeek, Script::Answer("fn main() {}"));
    let router = Router::builder()
        .adapter(sarvam.clone())
        .adapter(deepseek.clone())
        .build();

    // Would route to deepseek in auto mode
    let request = ChatRequest::new("Implement a function that totals invoices").with_provider(ProviderId::Sarvam);
    let response = assert_ok!(router.chat(request).await);

    assert_eq!(response.provider, "sarvam");
    assert_eq!(sarvam.calls(), 1);
    assert_eq!(deepseek.calls(), 0);
}

#[tokio::test]
async fn explicit_override_wins_on_tool_path() {
    let (registry, log) = factory_tools();
    let anthropic = StubProvider::new(
        ProviderId::Anthropic,
        Script::CallTool {
            name: "get_factory_status",
            arguments: json!({ "line": 4 }),
        },
    );
    let openai = StubProvider::new(ProviderId::OpenAi, Script::Answer("unused"));
    let router = Router::builder()
        .tools(registry)
        .adapter(anthropic.clone())
        .adapter(openai.clone())
        .build();

    let request = ChatRequest::new("What is the production status of line 4?").with_provider(ProviderId::Anthropic);
    let response = assert_ok!(router.chat(request).await);

    assert_eq!(response.provider, "anthropic");
    assert_eq!(response.tools_used.len(), 1);
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(openai.calls(), 0);
}

#[tokio::test]
async fn auto_tool_path_prefers_reasoning_provider_for_analysis() {
    let (registry, _log) = factory_tools();
    let anthropic = StubProvider::new(ProviderId::Anthropic, Script::Answer("analysis"));
    let openai = StubProvider::new(ProviderId::OpenAi, Script::Answer("status"));
    let router = Router::builder()
        .tools(registry)
        .adapter(anthropic.clone())
        .adapter(openai.clone())
        .build();

    let analysis = assert_ok!(router.chat(ChatRequest::new("Analyze efficiency on line 2")).await);
    assert_eq!(analysis.provider, "anthropic");

    let status = assert_ok!(router.chat(ChatRequest::new("Check the status of line 2")).await);
    assert_eq!(status.provider, "openai");
    assert_eq!(anthropic.calls(), 1);
    assert_eq!(openai.calls(), 1);
}

#[tokio::test]
async fn tool_round_trip_uses_second_call_text() {
    let (registry, log) = factory_tools();
    let openai = StubProvider::new(
        ProviderId::OpenAi,
        Script::CallTool {
            name: "get_factory_status",
            arguments: json!({ "line": 4 }),
        },
    );
    let router = Router::builder().tools(registry).adapter(openai.clone()).build();

    let response = assert_ok!(router.chat(ChatRequest::new("Show me line 4 status")).await);

    assert_eq!(*log.lock().unwrap(), vec![json!({ "line": 4 })]);
    assert_eq!(openai.calls(), 1);
    assert_eq!(openai.follow_ups(), 1);
    assert_eq!(
        openai.tool_result.lock().unwrap().clone(),
        Some(json!({ "line": 4, "state": "running" }))
    );
    assert_eq!(response.response, "get_factory_status reports line 4 \"running\"");
    assert_eq!(response.tools_used[0].name, "get_factory_status");
    assert_eq!(response.provider_usage, TokenUsage::new(300, 40));
    assert!(response.usage.total > 0);
}

#[tokio::test]
async fn unregistered_tool_from_provider_stops_round_trip() {
    let (registry, log) = factory_tools();
    let openai = StubProvider::new(
        ProviderId::OpenAi,
        Script::CallTool {
            name: "shutdown_line",
            arguments: json!({ "line": 4 }),
        },
    );
    let router = Router::builder().tools(registry).adapter(openai.clone()).build();

    let err = assert_err!(router.chat(ChatRequest::new("Check line 4")).await);

    assert!(matches!(err, OrchestratorError::ToolNotFound { ref name } if name == "shutdown_line"));
    assert_eq!(err.kind(), ErrorKind::ToolNotFound);
    assert_eq!(openai.follow_ups(), 0);
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_requested_tool_fails_before_network() {
    let (registry, _log) = factory_tools();
    let openai = StubProvider::new(ProviderId::OpenAi, Script::Answer("unused"));
    let router = Router::builder().tools(registry).adapter(openai.clone()).build();

    let request = ChatRequest::new("Forecast demand").with_tools(vec!["forecast_demand".to_string()]);
    let err = assert_err!(router.chat(request).await);

    assert!(matches!(err, OrchestratorError::ToolNotFound { .. }));
    assert_eq!(openai.calls(), 0);
}

#[tokio::test]
async fn failing_handler_aborts_without_follow_up() {
    let mut registry = ToolRegistry::new();
    registry
        .add(
            ToolDefinition::new(
                "compare_quotes",
                "Compare vendor quotations",
                vec![],
                Arc::new(completion_router::tools::FnHandler(|_args: Value| {
                    async { Err::<Value, _>(anyhow::anyhow!("ERP timeout")) }.boxed()
                })),
            )
            .with_category(ToolCategory::Procurement),
        )
        .unwrap();
    let openai = StubProvider::new(
        ProviderId::OpenAi,
        Script::CallTool {
            name: "compare_quotes",
            arguments: json!({}),
        },
    );
    let router = Router::builder().tools(registry).adapter(openai.clone()).build();

    let err = assert_err!(router.chat(ChatRequest::new("How much cheaper is vendor B?")).await);

    assert_eq!(err.kind(), ErrorKind::ToolExecution);
    assert!(err.to_string().contains("ERP timeout"));
    assert_eq!(openai.follow_ups(), 0);
}

#[tokio::test]
async fn fallback_is_attempted_exactly_once() {
    let openai = StubProvider::new(ProviderId::OpenAi, Script::Fail);
    let anthropic = StubProvider::new(ProviderId::Anthropic, Script::Fail);
    let router = Router::builder()
        .config(uncached())
        .adapter(openai.clone())
        .adapter(anthropic.clone())
        .build();

    let request = ChatRequest::new("Write a haiku about lathes").with_provider(ProviderId::OpenAi);
    let err = assert_err!(router.chat(request).await);

    match &err {
        OrchestratorError::Provider {
            provider,
            reason,
            fallback_attempted,
            ..
        } => {
            assert_eq!(*provider, ProviderId::Anthropic);
            assert_eq!(*reason, FailureReason::Upstream);
            assert!(*fallback_attempted);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(openai.calls(), 1);
    assert_eq!(anthropic.calls(), 1);

    let body = err.to_response();
    assert_eq!(body.provider.as_deref(), Some("anthropic"));
    assert_eq!(router.usage_stats().request_count, 0);
}

#[tokio::test]
async fn no_fallback_when_unmapped() {
    let openai = StubProvider::new(ProviderId::OpenAi, Script::Fail);
    let anthropic = StubProvider::new(ProviderId::Anthropic, Script::Answer("unused"));
    let router = Router::builder()
        .config(RouterConfig {
            fallbacks: FallbackTable::none(),
            ..uncached()
        })
        .adapter(openai.clone())
        .adapter(anthropic.clone())
        .build();

    let request = ChatRequest::new("Write a haiku about lathes").with_provider(ProviderId::OpenAi);
    let err = assert_err!(router.chat(request).await);

    assert!(matches!(
        err,
        OrchestratorError::Provider {
            provider: ProviderId::OpenAi,
            fallback_attempted: false,
            ..
        }
    ));
    assert_eq!(anthropic.calls(), 0);
}

#[tokio::test]
async fn tool_path_failures_do_not_fall_back() {
    let (registry, _log) = factory_tools();
    let openai = StubProvider::new(ProviderId::OpenAi, Script::Fail);
    let anthropic = StubProvider::new(ProviderId::Anthropic, Script::Answer("unused"));
    let router = Router::builder()
        .tools(registry)
        .adapter(openai.clone())
        .adapter(anthropic.clone())
        .build();

    let err = assert_err!(router.chat(ChatRequest::new("Check line 4 status")).await);

    assert!(matches!(
        err,
        OrchestratorError::Provider {
            provider: ProviderId::OpenAi,
            fallback_attempted: false,
            ..
        }
    ));
    assert_eq!(anthropic.calls(), 0);
}

#[tokio::test]
async fn timeout_triggers_fallback() {
    let groq = StubProvider::new(ProviderId::Groq, Script::Stall(Duration::from_secs(5)));
    let deepseek = StubProvider::new(ProviderId::DeepSeek, Script::Answer("fallback answer"));
    let router = Router::builder()
        .config(RouterConfig {
            timeout_secs: 1,
            ..uncached()
        })
        .adapter(groq.clone())
        .adapter(deepseek.clone())
        .build();

    let response = assert_ok!(router.chat(ChatRequest::new("Hello there")).await);

    assert_eq!(response.provider, "deepseek");
    assert_eq!(response.fallback_from.as_deref(), Some("groq"));
    assert_eq!(response.response, "fallback answer");
}

#[tokio::test]
async fn usage_stats_sum_tracked_records() {
    let groq = StubProvider::new(ProviderId::Groq, Script::Answer("Fine, thanks."));
    let router = Router::builder().config(uncached()).adapter(groq.clone()).build();

    let mut costs = Vec::new();
    let mut tokens = 0;
    for prompt in ["Hello there", "Good morning", "Any news today?"] {
        let response = assert_ok!(router.chat(ChatRequest::new(prompt)).await);
        costs.push(response.usage.cost);
        tokens += response.usage.total;
    }

    let stats = router.usage_stats();
    assert_eq!(stats.request_count, 3);
    assert_eq!(stats.total_tokens, tokens);
    assert_eq!(stats.total_cost, round_cost(costs.iter().sum()));
    assert_eq!(groq.calls(), 3);
}

#[tokio::test]
async fn response_serializes_camel_case() {
    let groq = StubProvider::new(ProviderId::Groq, Script::Answer("Fine, thanks."));
    let router = Router::builder().adapter(groq).build();

    let response = assert_ok!(router.chat(ChatRequest::new("Hello there")).await);
    let body = serde_json::to_value(&response).unwrap();

    assert_eq!(body["provider"], "groq");
    assert_eq!(body["toolsUsed"], json!([]));
    assert!(body["usage"]["promptTokens"].as_u64().unwrap() > 0);
    assert!(body.get("fallbackFrom").is_none());
    assert!(body.get("cached").is_none());
}
