//! Web search tool backed by the Google Custom Search JSON API

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::tools::types::{Tool, ToolError, ToolResult};
use crate::credentials::CredentialStore;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Results kept from a search response
pub const MAX_SEARCH_RESULTS: usize = 5;

const SEARCH_TIMEOUT_SECS: u64 = 30;

const NOT_CONFIGURED: &str = "Google Search not configured. \
    Run `toolchat search-credentials` to set an API key and search engine ID.";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchOutput {
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// `google_search`: runs a query and returns the top results
pub struct SearchTool {
    credentials: Arc<dyn CredentialStore>,
    endpoint: String,
    client: reqwest::Client,
}

impl SearchTool {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self::with_endpoint(credentials, DEFAULT_SEARCH_ENDPOINT)
    }

    /// Uses `endpoint` in place of the Google API
    pub fn with_endpoint(credentials: Arc<dyn CredentialStore>, endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            credentials,
            endpoint: endpoint.into(),
            client,
        }
    }

    async fn search(&self, query: &str) -> ToolResult<SearchOutput> {
        let credentials = self
            .credentials
            .load()
            .map_err(|e| {
                tracing::warn!(error = %e, "Failed to read search credentials");
                ToolError::Configuration(format!("{} ({})", NOT_CONFIGURED, e))
            })?
            .ok_or_else(|| ToolError::Configuration(NOT_CONFIGURED.to_string()))?;

        tracing::debug!(query = %query, "Running web search");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", credentials.api_key.as_str()),
                ("cx", credentials.search_engine_id.as_str()),
                ("q", query),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Network(format!("Search failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Network(format!("Search failed: {}", status)));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Network(format!("Search failed: invalid response ({})", e)))?;

        let results: Vec<SearchResult> = body
            .items
            .into_iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|item| SearchResult {
                title: item.title,
                snippet: item.snippet,
                link: item.link,
            })
            .collect();

        tracing::info!(results = results.len(), "Web search completed");

        Ok(SearchOutput {
            query: query.to_string(),
            results,
        })
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "google_search"
    }

    fn description(&self) -> &str {
        "Search Google for information"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: HashMap<String, Value>) -> ToolResult<String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::invalid_arguments(self.name(), "Missing required parameter 'query'"))?;

        let output = self.search(query).await?;
        serde_json::to_string(&output)
            .map_err(|e| ToolError::Network(format!("Failed to encode search results: {}", e)))
    }
}
