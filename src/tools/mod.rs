//! Tool registry: parameter specs, handlers and name-keyed lookup
//!
//! Tools are supplied by the embedding application at startup. A tool's
//! [`ParameterSpec`] list is the single source for both argument validation and
//! the JSON schema sent to providers.

pub mod caller;

pub use caller::{ToolCallOutcome, ToolCaller};

use crate::error::OrchestratorError;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// JSON type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// One named, typed tool parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamType,
    pub required: bool,
    pub description: String,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Business area a tool belongs to, used for prompt guidance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Production,
    Procurement,
    Finance,
    Analytics,
    #[default]
    General,
}

impl ToolCategory {
    pub fn guidance(&self) -> &'static str {
        match self {
            ToolCategory::Production => {
                "Production tools: use them for live line, machine and output status instead of guessing."
            }
            ToolCategory::Procurement => {
                "Procurement tools: use them to look up vendors and compare quotations before recommending a supplier."
            }
            ToolCategory::Finance => {
                "Finance tools: use them for invoices, payments and tax figures; quote amounts exactly as returned."
            }
            ToolCategory::Analytics => {
                "Analytics tools: use them for forecasts, efficiency metrics and trend reports."
            }
            ToolCategory::General => "General tools: use them when the question needs data you do not have.",
        }
    }
}

/// Provider-neutral tool description sent to adapters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema object for the arguments
    pub parameters: Value,
}

/// Implementation behind a registered tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> anyhow::Result<Value>;
}

/// Adapts an async closure into a [`ToolHandler`]
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync,
{
    async fn call(&self, arguments: Value) -> anyhow::Result<Value> {
        (self.0)(arguments).await
    }
}

/// A registered tool
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    pub category: ToolCategory,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ParameterSpec>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            category: ToolCategory::default(),
            handler,
        }
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    /// JSON schema built from the parameter specs
    pub fn schema(&self) -> ToolSchema {
        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.kind.as_str(),
                    "description": param.description,
                }),
            );
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    /// Check provider-supplied arguments against the parameter specs
    pub fn validate(&self, arguments: &Value) -> Result<(), String> {
        let object = match arguments {
            Value::Object(map) => map,
            Value::Null if self.parameters.iter().all(|p| !p.required) => return Ok(()),
            _ => return Err("arguments must be a JSON object".to_string()),
        };

        for param in &self.parameters {
            match object.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(format!("missing required parameter '{}'", param.name));
                }
                Some(value) if !value.is_null() && !param.kind.accepts(value) => {
                    return Err(format!(
                        "parameter '{}' must be of type {}",
                        param.name,
                        param.kind.as_str()
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub async fn invoke(&self, arguments: Value) -> anyhow::Result<Value> {
        self.handler.call(arguments).await
    }
}

/// Record of one tool call made during a round trip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
    pub result: Value,
}

/// Name-keyed tool registry, read-only once the router is built
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; duplicate names are a configuration error
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ParameterSpec>,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), OrchestratorError> {
        self.add(ToolDefinition::new(name, description, parameters, handler))
    }

    /// Register an async closure as a tool handler
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ParameterSpec>,
        handler: F,
    ) -> Result<(), OrchestratorError>
    where
        F: Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync + 'static,
    {
        self.register(name, description, parameters, Arc::new(FnHandler(handler)))
    }

    /// Register a fully built definition
    pub fn add(&mut self, tool: ToolDefinition) -> Result<(), OrchestratorError> {
        if self.tools.contains_key(&tool.name) {
            return Err(OrchestratorError::Configuration(format!(
                "tool '{}' is registered more than once",
                tool.name
            )));
        }
        debug!(tool = %tool.name, category = ?tool.category, "Registered tool");
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Tools exposed for a request: the named subset, or everything when empty.
    /// Repeated names are exposed once, in first-mention order.
    pub fn select(&self, names: &[String]) -> Result<Vec<&ToolDefinition>, OrchestratorError> {
        if names.is_empty() {
            return Ok(self.tools.values().collect());
        }
        let mut selected: Vec<&ToolDefinition> = Vec::with_capacity(names.len());
        for name in names {
            let tool = self
                .get(name)
                .ok_or_else(|| OrchestratorError::ToolNotFound { name: name.clone() })?;
            if !selected.iter().any(|t| t.name == tool.name) {
                selected.push(tool);
            }
        }
        Ok(selected)
    }
}
