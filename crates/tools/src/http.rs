//! HTTP tools — GET and POST requests against external endpoints.
//!
//! Both tools honor the execution context's cancellation token: an in-flight
//! request is dropped as soon as the executor signals cancellation or the
//! deadline passes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use agentry_core::error::{ErrorCode, ValidationError};
use agentry_core::tool::{
    Example, ExecutionContext, InputMap, Parameter, ParameterType, Tool, ToolResult, ToolSchema,
};

use crate::validate::validate_input;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .unwrap_or_default()
}

fn url_parameter() -> Parameter {
    Parameter::required("url", ParameterType::String, "The URL to send the request to")
        .with_pattern("^https?://.*")
}

fn timeout_parameter() -> Parameter {
    Parameter::optional(
        "timeout",
        ParameterType::Number,
        "Request timeout in seconds (default: 30)",
    )
    .with_default(serde_json::json!(DEFAULT_TIMEOUT_SECS))
    .with_range(1.0, 300.0)
}

fn headers_from_input(input: &InputMap) -> HashMap<String, String> {
    input
        .get("headers")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn timeout_from_input(input: &InputMap) -> Duration {
    let secs = input
        .get("timeout")
        .and_then(|v| v.as_f64())
        .unwrap_or(DEFAULT_TIMEOUT_SECS as f64);
    Duration::from_secs_f64(secs)
}

/// Send a built request, racing it against the context's cancellation token.
async fn send_request(
    ctx: &ExecutionContext,
    request: reqwest::RequestBuilder,
    url: &str,
    method: &str,
) -> ToolResult {
    let response = tokio::select! {
        response = request.send() => response,
        _ = ctx.cancel.cancelled() => {
            return ToolResult::error(ErrorCode::Cancelled, "execution cancelled");
        }
    };

    let response = match response {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            return ToolResult::error(ErrorCode::Timeout, format!("HTTP request timed out: {e}"));
        }
        Err(e) => {
            return ToolResult::error(
                ErrorCode::ExecutionError,
                format!("HTTP request failed: {e}"),
            );
        }
    };

    let status_code = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut response_headers = HashMap::new();
    for (key, value) in response.headers() {
        if let Ok(v) = value.to_str() {
            response_headers.insert(key.to_string(), v.to_string());
        }
    }

    let body = match response.text().await {
        Ok(b) => b,
        Err(e) => {
            return ToolResult::error(
                ErrorCode::ExecutionError,
                format!("failed to read response: {e}"),
            );
        }
    };

    // Parse JSON bodies so the model receives structured data.
    let data: serde_json::Value = if content_type.contains("application/json") {
        serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body))
    } else {
        serde_json::Value::String(body)
    };

    ToolResult::ok(serde_json::json!({
        "status_code": status_code,
        "data": data,
        "headers": response_headers,
        "content_type": content_type,
    }))
    .with_metadata("url", serde_json::json!(url))
    .with_metadata("method", serde_json::json!(method))
}

// ── HTTP GET ──────────────────────────────────────────────────────────────

pub struct HttpGetTool {
    client: reqwest::Client,
}

impl HttpGetTool {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for HttpGetTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        "http_get"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("http_get", "Performs an HTTP GET request to retrieve data from a URL")
            .with_parameter(url_parameter())
            .with_parameter(Parameter::optional(
                "headers",
                ParameterType::Object,
                "Optional HTTP headers to include in the request",
            ))
            .with_parameter(timeout_parameter())
            .with_example(Example {
                description: "Get JSON data from an API".into(),
                input: serde_json::json!({
                    "url": "https://api.example.com/data",
                    "headers": {"Accept": "application/json"},
                })
                .as_object()
                .cloned()
                .unwrap_or_default(),
                output: serde_json::json!({"status_code": 200, "data": "response body"}),
            })
    }

    fn validate(&self, input: &InputMap) -> Result<(), ValidationError> {
        validate_input(&self.schema(), input)
    }

    async fn execute(&self, ctx: ExecutionContext, input: InputMap) -> ToolResult {
        let url = input.get("url").and_then(|v| v.as_str()).unwrap_or_default();

        let mut request = self.client.get(url).timeout(timeout_from_input(&input));
        for (key, value) in headers_from_input(&input) {
            request = request.header(key, value);
        }

        send_request(&ctx, request, url, "GET").await
    }
}

// ── HTTP POST ─────────────────────────────────────────────────────────────

pub struct HttpPostTool {
    client: reqwest::Client,
}

impl HttpPostTool {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for HttpPostTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpPostTool {
    fn name(&self) -> &str {
        "http_post"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("http_post", "Performs an HTTP POST request to send data to a URL")
            .with_parameter(url_parameter())
            .with_parameter(Parameter::optional(
                "data",
                ParameterType::Object,
                "JSON data to send in the request body",
            ))
            .with_parameter(Parameter::optional(
                "headers",
                ParameterType::Object,
                "Optional HTTP headers to include in the request",
            ))
            .with_parameter(
                Parameter::optional(
                    "content_type",
                    ParameterType::String,
                    "Content type of the request body",
                )
                .with_default(serde_json::json!("application/json")),
            )
            .with_parameter(timeout_parameter())
    }

    fn validate(&self, input: &InputMap) -> Result<(), ValidationError> {
        validate_input(&self.schema(), input)
    }

    async fn execute(&self, ctx: ExecutionContext, input: InputMap) -> ToolResult {
        let url = input.get("url").and_then(|v| v.as_str()).unwrap_or_default();
        let content_type = input
            .get("content_type")
            .and_then(|v| v.as_str())
            .unwrap_or("application/json")
            .to_string();

        let mut request = self
            .client
            .post(url)
            .timeout(timeout_from_input(&input))
            .header(reqwest::header::CONTENT_TYPE, &content_type);

        for (key, value) in headers_from_input(&input) {
            request = request.header(key, value);
        }

        if let Some(data) = input.get("data") {
            if content_type.contains("application/json") {
                request = request.json(data);
            } else {
                request = request.body(data.to_string());
            }
        }

        send_request(&ctx, request, url, "POST").await
    }
}
