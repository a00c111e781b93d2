//! HTTP requests through the AI Pipe proxy
//!
//! The proxy injects upstream authentication, so the tool only needs the
//! target URL and method. Responses are passed through the content
//! extractor before they reach the model.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::agent::tools::types::{Tool, ToolError, ToolResult};
use crate::config::schema::DEFAULT_PROXY_BASE_URL;
use crate::extractor;

const PROXY_TIMEOUT_SECS: u64 = 30;

/// `ai_pipe_request`: fetches `{proxy_base}/{url}`
pub struct ProxyRequestTool {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ProxyRequestTool {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROXY_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        }
    }

    /// Full proxied URL for `target`
    pub fn proxied_url(&self, target: &str) -> String {
        format!("{}/{}", self.base_url, target.trim())
    }

    fn parse_method(&self, method: &str) -> ToolResult<Method> {
        let upper = method.trim().to_ascii_uppercase();
        match Method::from_bytes(upper.as_bytes()) {
            Ok(m) if is_supported(&m) => Ok(m),
            _ => Err(ToolError::invalid_arguments(
                self.name(),
                format!("Unsupported HTTP method '{}'", method),
            )),
        }
    }
}

impl Default for ProxyRequestTool {
    fn default() -> Self {
        Self::new(DEFAULT_PROXY_BASE_URL, None)
    }
}

fn is_supported(method: &Method) -> bool {
    [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::HEAD,
        Method::OPTIONS,
    ]
    .contains(method)
}

/// JSON when the body parses, raw text otherwise
fn parse_body(body: String) -> Value {
    serde_json::from_str(&body).unwrap_or(Value::String(body))
}

#[async_trait::async_trait]
impl Tool for ProxyRequestTool {
    fn name(&self) -> &str {
        "ai_pipe_request"
    }

    fn description(&self) -> &str {
        "Make a request through AI Pipe proxy"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to request"
                },
                "method": {
                    "type": "string",
                    "description": "HTTP method (GET, POST, etc.)",
                    "default": "GET"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: HashMap<String, Value>) -> ToolResult<String> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::invalid_arguments(self.name(), "Missing required parameter 'url'"))?;

        let method = self.parse_method(args.get("method").and_then(|v| v.as_str()).unwrap_or("GET"))?;
        let proxied = self.proxied_url(url);

        tracing::debug!(method = %method, url = %url, "Sending proxied request");

        let mut request = self.client.request(method.clone(), &proxied);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::Network(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Network(format!("Request failed: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Network(format!("Failed to read response body: {}", e)))?;

        tracing::info!(method = %method, status = status.as_u16(), bytes = body.len(), "Proxied request completed");

        let extracted = extractor::extract(&parse_body(body), url);
        serde_json::to_string(&extracted)
            .map_err(|e| ToolError::Network(format!("Failed to encode response: {}", e)))
    }
}
