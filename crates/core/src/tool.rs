//! Tool contract — the abstraction over agent capabilities.
//!
//! A tool is a named, schema-described unit of external capability the model
//! can request mid-conversation: arithmetic, text transforms, HTTP fetches.
//! The schema declares the parameter contract; the executor enforces it
//! before any tool body runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorCode, RegistryError, ValidationError};

/// Argument maps are plain JSON objects end to end.
pub type InputMap = serde_json::Map<String, serde_json::Value>;

// ── Schema ────────────────────────────────────────────────────────────────

/// The declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        write!(f, "{s}")
    }
}

/// A single parameter in a tool's contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParameterType,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    /// Default value filled in by sanitization when the parameter is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Allowed values, for string parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,

    /// Inclusive lower bound, for number parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    /// Inclusive upper bound, for number parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    /// Regex the value must match, for string parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Parameter {
    /// A required parameter of the given type.
    pub fn required(name: impl Into<String>, param_type: ParameterType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
            enum_values: Vec::new(),
            minimum: None,
            maximum: None,
            pattern: None,
        }
    }

    /// An optional parameter of the given type.
    pub fn optional(name: impl Into<String>, param_type: ParameterType, description: impl Into<String>) -> Self {
        let mut p = Self::required(name, param_type, description);
        p.required = false;
        p
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = values.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// A worked example attached to a schema, surfaced in tool listings and
/// usage prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    pub description: String,
    pub input: InputMap,
    pub output: serde_json::Value,
}

/// A tool's full parameter contract.
///
/// Invariant: parameter names are unique within a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Example>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_example(mut self, example: Example) -> Self {
        self.examples.push(example);
        self
    }

    /// Find a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Render this schema as a JSON-Schema-shaped tool definition for
    /// provider requests.
    pub fn to_definition(&self) -> ToolDefinition {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = serde_json::Map::new();
            prop.insert("type".into(), serde_json::json!(param.param_type));
            prop.insert("description".into(), serde_json::json!(param.description));
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            if !param.enum_values.is_empty() {
                prop.insert("enum".into(), serde_json::json!(param.enum_values));
            }
            if let Some(min) = param.minimum {
                prop.insert("minimum".into(), serde_json::json!(min));
            }
            if let Some(max) = param.maximum {
                prop.insert("maximum".into(), serde_json::json!(max));
            }
            if let Some(pattern) = &param.pattern {
                prop.insert("pattern".into(), serde_json::json!(pattern));
            }
            properties.insert(param.name.clone(), serde_json::Value::Object(prop));

            if param.required {
                required.push(param.name.clone());
            }
        }

        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

// ── Execution types ───────────────────────────────────────────────────────

/// Per-invocation execution context.
///
/// Created fresh for every tool call and discarded afterwards; never
/// persisted. Carries the deadline and the cancellation token a
/// well-behaved tool body should observe.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub session_id: String,
    pub agent_id: String,
    pub request_id: String,
    pub timeout: Duration,
    /// Cancelled by the executor on timeout or caller cancellation.
    /// Bodies that ignore it are abandoned, not killed.
    pub cancel: CancellationToken,
    pub metadata: InputMap,
}

impl ExecutionContext {
    pub fn new(session_id: impl Into<String>, agent_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
            timeout,
            cancel: CancellationToken::new(),
            metadata: InputMap::new(),
        }
    }
}

/// The immutable result of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: InputMap,

    /// Elapsed wall-clock time, recorded by the executor on every result.
    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolResult {
    /// A successful result carrying a payload.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
            metadata: InputMap::new(),
            duration_ms: 0,
        }
    }

    /// A failed result with a machine-readable code.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            error_code: Some(code),
            metadata: InputMap::new(),
            duration_ms: 0,
        }
    }

    /// A failed result from a validation error.
    pub fn validation_error(err: &ValidationError) -> Self {
        Self::error(ErrorCode::ValidationError, err.to_string())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// One requested tool invocation in a batch.
///
/// The call id is the correlation key between the batch request and its
/// result map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInfo {
    pub tool_name: String,

    #[serde(default)]
    pub arguments: InputMap,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub call_id: String,
}

// ── Trait & registry ──────────────────────────────────────────────────────

/// The core Tool trait.
///
/// Every built-in or external tool implements this. Tools are registered in
/// the [`ToolRegistry`] at startup and invoked through the executor, which
/// validates and sanitizes input before `execute` ever runs.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "calculator").
    fn name(&self) -> &str;

    /// The tool's full parameter contract.
    fn schema(&self) -> ToolSchema;

    /// Validate raw input against the schema.
    fn validate(&self, input: &InputMap) -> Result<(), ValidationError>;

    /// Run the tool body. Input has already been validated and sanitized.
    async fn execute(&self, ctx: ExecutionContext, input: InputMap) -> ToolResult;

    /// Whether this tool can currently execute (e.g. backing service up).
    fn is_available(&self) -> bool {
        true
    }

    /// Convert this tool into a definition for provider requests.
    fn to_definition(&self) -> ToolDefinition {
        self.schema().to_definition()
    }
}

/// A name-keyed collection of tools.
///
/// The registry is an explicitly constructed, injected service object. It is
/// populated during startup wiring and treated as read-only for the lifetime
/// of the process; it carries no interior locking, so mutation after the
/// registry has been shared is out of contract. Unsynchronized concurrent
/// reads are safe.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Fails if the name is empty or already taken.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyToolName);
        }
        if self.tools.contains_key(&name) {
            return Err(RegistryError::ToolAlreadyExists(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All registered tool names, sorted for deterministic listings.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for the named tools, or all tools when `names` is empty.
    pub fn schemas(&self, names: &[String]) -> Vec<ToolSchema> {
        if names.is_empty() {
            self.list()
                .iter()
                .filter_map(|n| self.tools.get(n))
                .map(|t| t.schema())
                .collect()
        } else {
            names
                .iter()
                .filter_map(|n| self.tools.get(n))
                .map(|t| t.schema())
                .collect()
        }
    }

    /// Definitions for the named tools that are currently available, or all
    /// available tools when `names` is empty.
    pub fn definitions(&self, names: &[String]) -> Vec<ToolDefinition> {
        let selected: Vec<String> = if names.is_empty() { self.list() } else { names.to_vec() };
        selected
            .iter()
            .filter_map(|n| self.tools.get(n))
            .filter(|t| t.is_available())
            .map(|t| t.to_definition())
            .collect()
    }

    /// Remove a tool. Returns whether it existed. Startup wiring only.
    pub fn remove(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Remove all tools. Startup wiring only.
    pub fn clear(&mut self) {
        self.tools.clear();
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema::new("echo", "Echoes back the input").with_parameter(Parameter::required(
                "text",
                ParameterType::String,
                "Text to echo",
            ))
        }

        fn validate(&self, input: &InputMap) -> Result<(), ValidationError> {
            if input.contains_key("text") {
                Ok(())
            } else {
                Err(ValidationError::new("text", "required parameter missing", None))
            }
        }

        async fn execute(&self, _ctx: ExecutionContext, input: InputMap) -> ToolResult {
            let text = input.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            ToolResult::ok(serde_json::json!({"echo": text}))
        }
    }

    struct NamelessTool;

    #[async_trait]
    impl Tool for NamelessTool {
        fn name(&self) -> &str {
            ""
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("", "")
        }
        fn validate(&self, _input: &InputMap) -> Result<(), ValidationError> {
            Ok(())
        }
        async fn execute(&self, _ctx: ExecutionContext, _input: InputMap) -> ToolResult {
            ToolResult::ok(serde_json::Value::Null)
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn registry_rejects_duplicate_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let err = registry.register(Box::new(EchoTool)).unwrap_err();
        assert_eq!(err, RegistryError::ToolAlreadyExists("echo".into()));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn registry_rejects_empty_name() {
        let mut registry = ToolRegistry::new();
        let err = registry.register(Box::new(NamelessTool)).unwrap_err();
        assert_eq!(err, RegistryError::EmptyToolName);
    }

    #[test]
    fn registry_remove_and_clear() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        assert!(registry.remove("echo"));
        assert!(!registry.remove("echo"));
        registry.register(Box::new(EchoTool)).unwrap();
        registry.clear();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn schema_to_definition_is_json_schema_shaped() {
        let schema = ToolSchema::new("calc", "Does math")
            .with_parameter(
                Parameter::required("expression", ParameterType::String, "The expression")
                    .with_pattern(r"^[0-9+\-*/().\s^%a-z,]+$"),
            )
            .with_parameter(
                Parameter::optional("precision", ParameterType::Number, "Digits")
                    .with_default(serde_json::json!(2))
                    .with_range(0.0, 10.0),
            );

        let def = schema.to_definition();
        assert_eq!(def.name, "calc");
        assert_eq!(def.parameters["type"], "object");
        assert_eq!(def.parameters["required"], serde_json::json!(["expression"]));
        assert_eq!(def.parameters["properties"]["expression"]["type"], "string");
        assert_eq!(def.parameters["properties"]["precision"]["default"], 2);
        assert_eq!(def.parameters["properties"]["precision"]["maximum"], 10.0);
    }

    #[test]
    fn tool_result_wire_shape() {
        let result = ToolResult::error(ErrorCode::Timeout, "execution timeout");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "TIMEOUT");
        assert_eq!(json["duration_ms"], 0);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn call_info_deserializes_without_call_id() {
        let call: CallInfo =
            serde_json::from_str(r#"{"tool_name":"calc","arguments":{"expression":"1+1"}}"#)
                .unwrap();
        assert_eq!(call.tool_name, "calc");
        assert!(call.call_id.is_empty());
    }

    #[test]
    fn definitions_skip_unavailable_tools() {
        struct DownTool;

        #[async_trait]
        impl Tool for DownTool {
            fn name(&self) -> &str {
                "down"
            }
            fn schema(&self) -> ToolSchema {
                ToolSchema::new("down", "Always offline")
            }
            fn validate(&self, _input: &InputMap) -> Result<(), ValidationError> {
                Ok(())
            }
            async fn execute(&self, _ctx: ExecutionContext, _input: InputMap) -> ToolResult {
                ToolResult::ok(serde_json::Value::Null)
            }
            fn is_available(&self) -> bool {
                false
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        registry.register(Box::new(DownTool)).unwrap();

        let defs = registry.definitions(&[]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }
}
