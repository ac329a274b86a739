//! Two-phase tool round trip: ask, run one tool, ask again

use super::{ToolCategory, ToolInvocation, ToolRegistry};
use crate::api::{
    with_timeout, CompletionOptions, ProviderAdapter, RequestContext, TokenUsage, ToolExchange,
    ToolTurn,
};
use crate::error::OrchestratorError;
use crate::optimization::TokenOptimizer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a completed round trip
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub response_text: String,
    pub tools_used: Vec<ToolInvocation>,
    /// Provider-reported usage, summed over both calls
    pub usage: TokenUsage,
    /// System section sent with the request, used for usage accounting
    pub system_prompt: String,
}

pub struct ToolCaller {
    optimizer: Arc<TokenOptimizer>,
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolCaller {
    pub fn new(optimizer: Arc<TokenOptimizer>, registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self {
            optimizer,
            registry,
            timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one tool-enabled exchange against `adapter`.
    ///
    /// `tool_names` selects the exposed tools; empty exposes the registry.
    /// Errors propagate unchanged: provider failures are reported with
    /// `fallback_attempted = false` and a failing handler aborts the exchange
    /// before the follow-up call.
    pub async fn call_with_tools(
        &self,
        adapter: &dyn ProviderAdapter,
        prompt: &str,
        context: &RequestContext,
        tool_names: &[String],
        options: &CompletionOptions,
    ) -> Result<ToolCallOutcome, OrchestratorError> {
        let provider = adapter.id();
        let exposed = self.registry.select(tool_names)?;

        let mut categories: Vec<ToolCategory> = exposed.iter().map(|t| t.category).collect();
        categories.sort();
        categories.dedup();

        let system = self.optimizer.build_tool_system_prompt(context, &categories);
        let schemas: Vec<_> = exposed.iter().map(|t| t.schema()).collect();

        info!(
            provider = %provider,
            tools = schemas.len(),
            "Starting tool-enabled completion"
        );

        let turn = with_timeout(
            self.timeout,
            adapter.complete_with_tools(&system, prompt, &schemas, options),
        )
        .await
        .map_err(|e| OrchestratorError::provider(provider, &e, false))?;

        let (call, first_usage) = match turn {
            ToolTurn::Text(completion) => {
                debug!(provider = %provider, "Provider answered without a tool");
                return Ok(ToolCallOutcome {
                    response_text: completion.text,
                    tools_used: Vec::new(),
                    usage: completion.usage,
                    system_prompt: system,
                });
            }
            ToolTurn::ToolCall { call, usage } => (call, usage),
        };

        let tool = exposed
            .iter()
            .find(|t| t.name == call.name)
            .ok_or_else(|| OrchestratorError::ToolNotFound {
                name: call.name.clone(),
            })?;

        tool.validate(&call.arguments)
            .map_err(|message| OrchestratorError::ToolExecution {
                name: call.name.clone(),
                message,
            })?;

        info!(tool = %call.name, provider = %provider, "Invoking tool");
        let result = tool.invoke(call.arguments.clone()).await.map_err(|e| {
            warn!(tool = %call.name, error = %e, "Tool handler failed");
            OrchestratorError::ToolExecution {
                name: call.name.clone(),
                message: format!("{:#}", e),
            }
        })?;

        let exchange = ToolExchange {
            system: system.clone(),
            user: prompt.to_string(),
            tools: schemas,
            call,
        };

        let completion = with_timeout(
            self.timeout,
            adapter.complete_tool_follow_up(&exchange, &result, options),
        )
        .await
        .map_err(|e| OrchestratorError::provider(provider, &e, false))?;

        Ok(ToolCallOutcome {
            response_text: completion.text,
            tools_used: vec![ToolInvocation {
                name: exchange.call.name,
                arguments: exchange.call.arguments,
                result,
            }],
            usage: first_usage.combine(completion.usage),
            system_prompt: system,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, Completion, ProviderId, ToolCallRequest};
    use crate::optimization::OptimizationConfig;
    use crate::orchestrator::OrchestratorState;
    use crate::tools::{ParamType, ParameterSpec, ToolSchema};
    use async_trait::async_trait;
    use futures_util::FutureExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies with a fixed first turn; records what the follow-up received
    struct ScriptedAdapter {
        first: ToolTurn,
        calls: AtomicUsize,
        follow_up_result: Mutex<Option<Value>>,
    }

    impl ScriptedAdapter {
        fn new(first: ToolTurn) -> Self {
            Self {
                first,
                calls: AtomicUsize::new(0),
                follow_up_result: Mutex::new(None),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn id(&self) -> ProviderId {
            ProviderId::OpenAi
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
            Err(ApiError::Provider("unexpected direct call".to_string()))
        }

        async fn complete_with_tools(
            &self,
            _system: &str,
            _user: &str,
            _tools: &[ToolSchema],
            _options: &CompletionOptions,
        ) -> Result<ToolTurn, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.first.clone())
        }

        async fn complete_tool_follow_up(
            &self,
            _exchange: &ToolExchange,
            result: &Value,
            _options: &CompletionOptions,
        ) -> Result<Completion, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.follow_up_result.lock().unwrap() = Some(result.clone());
            Ok(Completion::new(
                format!("Line 4 is {}", result["state"].as_str().unwrap_or("unknown")),
                TokenUsage::new(200, 20),
            ))
        }
    }

    fn caller(handler_calls: Arc<AtomicUsize>, fail: bool) -> ToolCaller {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn(
                "get_factory_status",
                "Current status of a production line",
                vec![ParameterSpec::required("line", ParamType::Integer, "Line number")],
                move |args: Value| {
                    let handler_calls = Arc::clone(&handler_calls);
                    async move {
                        handler_calls.fetch_add(1, Ordering::SeqCst);
                        if fail {
                            anyhow::bail!("MES unreachable");
                        }
                        Ok(json!({ "line": args["line"], "state": "running" }))
                    }
                    .boxed()
                },
            )
            .unwrap();

        let optimizer = TokenOptimizer::new(
            OptimizationConfig::default(),
            Arc::new(OrchestratorState::default()),
        );
        ToolCaller::new(Arc::new(optimizer), Arc::new(registry), Duration::from_secs(5))
    }

    fn tool_call(name: &str, arguments: Value) -> ToolTurn {
        ToolTurn::ToolCall {
            call: ToolCallRequest {
                id: "call_1".to_string(),
                name: name.to_string(),
                arguments,
            },
            usage: TokenUsage::new(150, 10),
        }
    }

    #[tokio::test]
    async fn test_plain_text_returns_directly() {
        let adapter = ScriptedAdapter::new(ToolTurn::Text(Completion::new(
            "All lines nominal",
            TokenUsage::new(80, 5),
        )));
        let caller = caller(Arc::new(AtomicUsize::new(0)), false);

        let outcome = caller
            .call_with_tools(&adapter, "check status", &RequestContext::default(), &[], &CompletionOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.response_text, "All lines nominal");
        assert!(outcome.tools_used.is_empty());
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_round_trip_invokes_handler_once() {
        let adapter = ScriptedAdapter::new(tool_call("get_factory_status", json!({ "line": 4 })));
        let handler_calls = Arc::new(AtomicUsize::new(0));
        let caller = caller(Arc::clone(&handler_calls), false);

        let outcome = caller
            .call_with_tools(
                &adapter,
                "What is the status of line 4?",
                &RequestContext::default(),
                &[],
                &CompletionOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.calls(), 2);
        assert_eq!(outcome.response_text, "Line 4 is running");
        assert_eq!(outcome.tools_used.len(), 1);
        assert_eq!(outcome.tools_used[0].arguments, json!({ "line": 4 }));
        assert_eq!(outcome.usage, TokenUsage::new(350, 30));
        assert_eq!(
            adapter.follow_up_result.lock().unwrap().clone(),
            Some(json!({ "line": 4, "state": "running" }))
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_stops_before_follow_up() {
        let adapter = ScriptedAdapter::new(tool_call("delete_everything", json!({})));
        let caller = caller(Arc::new(AtomicUsize::new(0)), false);

        let err = caller
            .call_with_tools(&adapter, "check status", &RequestContext::default(), &[], &CompletionOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::ToolNotFound { ref name } if name == "delete_everything"));
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_aborts() {
        let adapter = ScriptedAdapter::new(tool_call("get_factory_status", json!({ "line": 4 })));
        let handler_calls = Arc::new(AtomicUsize::new(0));
        let caller = caller(Arc::clone(&handler_calls), true);

        let err = caller
            .call_with_tools(&adapter, "check status", &RequestContext::default(), &[], &CompletionOptions::default())
            .await
            .unwrap_err();

        match err {
            OrchestratorError::ToolExecution { name, message } => {
                assert_eq!(name, "get_factory_status");
                assert!(message.contains("MES unreachable"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_handler() {
        let adapter = ScriptedAdapter::new(tool_call("get_factory_status", json!({ "line": "four" })));
        let handler_calls = Arc::new(AtomicUsize::new(0));
        let caller = caller(Arc::clone(&handler_calls), false);

        let err = caller
            .call_with_tools(&adapter, "check status", &RequestContext::default(), &[], &CompletionOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::ToolExecution { .. }));
        assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_requested_tool_makes_no_call() {
        let adapter = ScriptedAdapter::new(tool_call("get_factory_status", json!({ "line": 4 })));
        let caller = caller(Arc::new(AtomicUsize::new(0)), false);

        let err = caller
            .call_with_tools(
                &adapter,
                "check status",
                &RequestContext::default(),
                &["forecast_demand".to_string()],
                &CompletionOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::ToolNotFound { .. }));
        assert_eq!(adapter.calls(), 0);
    }
}
