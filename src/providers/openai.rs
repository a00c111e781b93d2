//! Generic OpenAI-compatible provider implementation
//!
//! This module implements `LlmProvider` for any endpoint speaking the
//! OpenAI chat-completions protocol (OpenAI, OpenRouter, AI Pipe).
//!
//! One chat call is one HTTP request. Failures are mapped to
//! [`ProviderError`] and returned; the caller decides what to do with them.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[cfg(test)]
use serde_json::json;

use crate::config::AgentConfig;
use crate::providers::{LlmMessage, LlmProvider, LlmResponse, LlmToolCall, ModelInfo, ProviderError};

/// OpenAI API request body format
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    /// Model to use for completion
    model: String,
    /// Messages in the conversation
    messages: Vec<OpenAiMessage>,
    /// Available tools for the model to use
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    /// Tool choice strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

/// OpenAI message format
#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    /// Role of the message sender
    role: String,
    /// Content of the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    /// Tool call ID for tool result messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

/// OpenAI tool call format
#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

/// OpenAI function call format
#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAiFunctionCall {
    name: String,
    /// Arguments as JSON string
    #[serde(default)]
    arguments: String,
}

/// OpenAI API response format
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    /// Error information if request failed
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// OpenAI API response for listing models
#[derive(Debug, Deserialize)]
struct OpenAiModelsResponse {
    data: Vec<OpenAiModelInfo>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelInfo {
    id: String,
    /// Whether the model is deprecated (not always present)
    #[serde(default)]
    deprecated: bool,
}

/// OpenAI-compatible chat-completions client
#[derive(Debug, Clone)]
pub struct GenericOpenAiProvider {
    api_key: String,
    /// Base URL without trailing slash, e.g. `https://api.openai.com/v1`
    base_url: String,
    default_model: String,
    provider_name: &'static str,
    timeout_seconds: u64,
    client: Client,
}

impl GenericOpenAiProvider {
    /// Creates a new provider, failing if the HTTP client cannot be built
    pub fn try_new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
        provider_name: &'static str,
        timeout_seconds: u64,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ProviderError::config("API key is required"));
        }

        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ProviderError::config("Base URL cannot be empty"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url,
            default_model: default_model.into(),
            provider_name,
            timeout_seconds,
            client,
        })
    }

    /// Creates a provider for the endpoint described by `config`
    pub fn from_agent_config(config: &AgentConfig, timeout_seconds: u64) -> Result<Self, ProviderError> {
        Self::try_new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.model.clone(),
            provider_name_for(&config.base_url),
            timeout_seconds,
        )
    }

    /// Returns the base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds the OpenAI API request body from messages and tools
    fn build_request(
        &self,
        messages: Vec<LlmMessage>,
        tools: Vec<serde_json::Value>,
        model: &str,
    ) -> OpenAiRequest {
        let openai_messages: Vec<OpenAiMessage> = messages
            .into_iter()
            .map(|msg| OpenAiMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content,
                tool_calls: msg.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .map(|call| OpenAiToolCall {
                            id: call.id,
                            call_type: function_type(),
                            function: OpenAiFunctionCall {
                                name: call.name,
                                arguments: call.arguments,
                            },
                        })
                        .collect()
                }),
                tool_call_id: msg.tool_call_id,
            })
            .collect();

        let tool_choice = if tools.is_empty() {
            None
        } else {
            Some("auto".to_string())
        };

        OpenAiRequest {
            model: model.to_string(),
            messages: openai_messages,
            tools,
            tool_choice,
        }
    }

    /// Parses the first choice of an OpenAI response into LlmResponse
    fn parse_response(&self, response: OpenAiResponse) -> Result<LlmResponse, ProviderError> {
        if let Some(error) = response.error {
            let code = error
                .code
                .map(|c| match c {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .or(error.error_type);
            return Err(ProviderError::provider(error.message, code));
        }

        let choice =
            response.choices.into_iter().next().ok_or_else(|| {
                ProviderError::provider("No response choices returned", None::<&str>)
            })?;

        let message = choice.message;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| LlmToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        let mut llm_response = LlmResponse {
            content: message.content.unwrap_or_default(),
            tool_calls,
            prompt_tokens: None,
            completion_tokens: None,
        };

        if let Some(usage) = response.usage {
            llm_response.prompt_tokens = usage.prompt_tokens;
            llm_response.completion_tokens = usage.completion_tokens;
        }

        Ok(llm_response)
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        error!(error = %e, provider = %self.provider_name, "Request failed");
        if e.is_timeout() {
            ProviderError::timeout(self.timeout_seconds)
        } else {
            ProviderError::from(e)
        }
    }

    async fn send_request(&self, request: &OpenAiRequest) -> Result<OpenAiResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, provider = %self.provider_name, "Making OpenAI-compatible API request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        debug!(status = %status, "Received response");

        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &error_text));
        }

        resp.json::<OpenAiResponse>()
            .await
            .map_err(|e| ProviderError::serialization(format!("Failed to parse response: {}", e)))
    }
}

/// Maps a non-success HTTP status to a typed provider error
fn status_error(status: StatusCode, body: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::auth(format!("Authentication failed ({}): {}", status, body))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::rate_limit(format!("Rate limit exceeded ({}): {}", status, body))
        }
        status if status.is_client_error() => {
            ProviderError::invalid_request(format!("Client error ({}): {}", status, body))
        }
        status if status.is_server_error() => ProviderError::provider(
            format!("Server error ({}): {}", status, body),
            Some(status.as_u16().to_string()),
        ),
        _ => ProviderError::provider(
            format!("Unexpected status ({}): {}", status, body),
            Some(status.as_u16().to_string()),
        ),
    }
}

/// Derives a short provider label from the base URL, for logs
fn provider_name_for(base_url: &str) -> &'static str {
    if base_url.contains("aipipe.org") {
        "aipipe"
    } else if base_url.contains("openrouter") {
        "openrouter"
    } else if base_url.contains("api.openai.com") {
        "openai"
    } else {
        "openai-compatible"
    }
}

#[async_trait::async_trait]
impl LlmProvider for GenericOpenAiProvider {
    async fn chat(
        &self,
        messages: Vec<LlmMessage>,
        tools: Vec<serde_json::Value>,
        model: &str,
    ) -> Result<LlmResponse, ProviderError> {
        info!(
            model = model,
            provider = %self.provider_name,
            message_count = messages.len(),
            tool_count = tools.len(),
            "Sending chat request to {}",
            self.provider_name
        );

        let request = self.build_request(messages, tools, model);
        let response = self.send_request(&request).await?;
        let llm_response = self.parse_response(response)?;

        info!(
            content_length = llm_response.content.len(),
            tool_calls = llm_response.tool_calls.len(),
            prompt_tokens = ?llm_response.prompt_tokens,
            completion_tokens = ?llm_response.completion_tokens,
            "Received response from {}",
            self.provider_name
        );

        Ok(llm_response)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let url = format!("{}/models", self.base_url);

        info!(url = %url, provider = %self.provider_name, "Listing models");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_text));
        }

        let models_response: OpenAiModelsResponse = response.json().await.map_err(|e| {
            ProviderError::serialization(format!("Failed to parse models response: {}", e))
        })?;

        let mut models: Vec<ModelInfo> = models_response
            .data
            .into_iter()
            .map(|m| ModelInfo::new(m.id, m.deprecated))
            .collect();

        models.sort_by(|a, b| a.id.cmp(&b.id));

        info!(count = models.len(), provider = %self.provider_name, "Listed models");

        Ok(models)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn provider_name(&self) -> &'static str {
        self.provider_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LlmRole;

    fn create_test_provider(base_url: &str) -> GenericOpenAiProvider {
        GenericOpenAiProvider::try_new("test-api-key", base_url, "gpt-4.1-mini", "test", 5).unwrap()
    }

    #[test]
    fn test_try_new_rejects_empty_key() {
        let result = GenericOpenAiProvider::try_new("", "https://api.openai.com/v1", "m", "t", 5);
        assert!(matches!(result, Err(ProviderError::Config { .. })));
    }

    #[test]
    fn test_from_agent_config_trims_base_url() {
        let config = AgentConfig {
            base_url: "https://openrouter.ai/api/v1/".to_string(),
            api_key: "key".to_string(),
            model: "gpt-5".to_string(),
        };
        let provider = GenericOpenAiProvider::from_agent_config(&config, 30).unwrap();
        assert_eq!(provider.base_url(), "https://openrouter.ai/api/v1");
        assert_eq!(provider.provider_name(), "openrouter");
        assert_eq!(provider.default_model(), "gpt-5");
    }

    #[test]
    fn test_build_request_basic() {
        let provider = create_test_provider("https://api.example.com/v1");
        let messages = vec![LlmMessage::system("You are helpful"), LlmMessage::user("Hello")];

        let request = provider.build_request(messages, vec![], "test-model");

        assert_eq!(request.model, "test-model");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].content, Some("Hello".to_string()));
        assert!(request.tools.is_empty());
        assert!(request.tool_choice.is_none());
    }

    #[test]
    fn test_build_request_with_tools_sets_auto_choice() {
        let provider = create_test_provider("https://api.example.com/v1");
        let tools = vec![json!({"type": "function", "function": {"name": "t"}})];

        let request = provider.build_request(vec![LlmMessage::user("Use a tool")], tools, "m");

        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tool_choice, Some("auto".to_string()));
    }

    #[test]
    fn test_request_wire_format_omits_absent_fields() {
        let provider = create_test_provider("https://api.example.com/v1");
        let call = LlmToolCall::new("call_1", "execute_javascript", r#"{"code":"2+2"}"#);
        let messages = vec![
            LlmMessage::assistant("", std::slice::from_ref(&call)),
            LlmMessage::tool_result("call_1", r#"{"result":4}"#),
        ];

        let request = provider.build_request(messages, vec![], "m");
        let wire = serde_json::to_value(&request).unwrap();

        let assistant = &wire["messages"][0];
        assert!(assistant.get("content").is_none());
        assert_eq!(assistant["tool_calls"][0]["type"], "function");
        assert_eq!(assistant["tool_calls"][0]["function"]["name"], "execute_javascript");

        let tool = &wire["messages"][1];
        assert_eq!(tool["tool_call_id"], "call_1");
        assert!(tool.get("tool_calls").is_none());
    }

    #[test]
    fn test_parse_response_defaults_missing_fields() {
        let provider = create_test_provider("https://api.example.com/v1");
        let response: OpenAiResponse =
            serde_json::from_value(json!({"choices": [{"message": {"role": "assistant"}}]})).unwrap();

        let result = provider.parse_response(response).unwrap();
        assert_eq!(result.content, "");
        assert!(result.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let provider = create_test_provider("https://api.example.com/v1");
        let response: OpenAiResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "google_search", "arguments": "{\"query\":\"rust\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
        }))
        .unwrap();

        let result = provider.parse_response(response).unwrap();

        assert_eq!(result.content, "");
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].id, "call_1");
        assert_eq!(result.tool_calls[0].name, "google_search");
        assert_eq!(result.tool_calls[0].arguments, r#"{"query":"rust"}"#);
        assert_eq!(result.total_tokens(), Some(30));
    }

    #[test]
    fn test_parse_response_with_partial_usage() {
        let provider = create_test_provider("https://api.example.com/v1");
        let response: OpenAiResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            "usage": {"prompt_tokens": 12}
        }))
        .unwrap();

        let result = provider.parse_response(response).unwrap();

        assert_eq!(result.content, "hi");
        assert_eq!(result.prompt_tokens, Some(12));
        assert_eq!(result.completion_tokens, None);
        assert_eq!(result.total_tokens(), Some(12));
    }

    #[test]
    fn test_parse_response_api_error() {
        let provider = create_test_provider("https://api.example.com/v1");
        let response: OpenAiResponse = serde_json::from_value(json!({
            "error": {"message": "Invalid API key", "type": "authentication_error", "code": 401}
        }))
        .unwrap();

        let err = provider.parse_response(response).unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));
        assert!(matches!(err, ProviderError::Provider { code: Some(ref c), .. } if c == "401"));
    }

    #[test]
    fn test_parse_response_no_choices() {
        let provider = create_test_provider("https://api.example.com/v1");
        let response: OpenAiResponse = serde_json::from_value(json!({"choices": []})).unwrap();

        let err = provider.parse_response(response).unwrap_err();
        assert!(err.to_string().contains("No response choices returned"));
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(status_error(StatusCode::UNAUTHORIZED, "").is_auth_error());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_rate_limit());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad"),
            ProviderError::InvalidRequest { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            ProviderError::Provider { code: Some(ref c), .. } if c == "500"
        ));
    }

    #[tokio::test]
    async fn test_chat_posts_transcript_and_tools() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-api-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "gpt-4.1-mini",
                "tool_choice": "auto",
                "messages": [{"role": "user", "content": "What is 2+2?"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"4"}}]}"#)
            .create_async()
            .await;

        let provider = create_test_provider(&server.url());
        let tools = vec![json!({"type": "function", "function": {"name": "t", "parameters": {"type": "object"}}})];
        let response = provider
            .chat(vec![LlmMessage::new(LlmRole::User, "What is 2+2?")], tools, "gpt-4.1-mini")
            .await
            .unwrap();

        assert_eq!(response.content, "4");
        assert!(!response.has_tool_calls());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_server_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .expect(1)
            .create_async()
            .await;

        let provider = create_test_provider(&server.url());
        let err = provider
            .chat(vec![LlmMessage::user("Hi")], vec![], "m")
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Provider { .. }));
        assert!(err.to_string().contains("upstream exploded"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_models_sorted() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/models")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"id":"gpt-5"},{"id":"gpt-4.1"},{"id":"gpt-4o"}]}"#)
            .create_async()
            .await;

        let provider = create_test_provider(&server.url());
        let models = provider.list_models().await.unwrap();
        let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["gpt-4.1", "gpt-4o", "gpt-5"]);
    }
}
