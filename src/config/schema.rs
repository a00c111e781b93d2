use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::loader::ConfigError;

/// Base URLs offered when configuring the provider
pub const CANDIDATE_BASE_URLS: [&str; 3] = [
    "https://aipipe.org/openai/v1",
    "https://openrouter.ai/api/v1",
    "https://api.openai.com/v1",
];

pub const DEFAULT_PROXY_BASE_URL: &str = "https://aipipe.org/proxy";

/// The resolved provider settings a turn runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Limits for the JavaScript sandbox
///
/// Each evaluation runs in a child process; `timeout_ms` is enforced by
/// killing it and `memory_limit_mb` caps its address space (0 disables).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxSettings {
    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_loop_iteration_limit")]
    pub loop_iteration_limit: u64,
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    /// Binary that serves `sandbox-eval`; the running executable when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
}

fn default_sandbox_timeout_ms() -> u64 {
    5_000
}

fn default_loop_iteration_limit() -> u64 {
    1_000_000
}

fn default_recursion_limit() -> usize {
    512
}

fn default_memory_limit_mb() -> u64 {
    512
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_proxy_base_url() -> String {
    DEFAULT_PROXY_BASE_URL.to_string()
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_sandbox_timeout_ms(),
            loop_iteration_limit: default_loop_iteration_limit(),
            recursion_limit: default_recursion_limit(),
            memory_limit_mb: default_memory_limit_mb(),
            executable: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_proxy_base_url")]
    pub proxy_base_url: String,

    /// Token forwarded to the request proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_token: Option<String>,

    /// HTTP timeout for LLM requests
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub sandbox: SandboxSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: None,
            proxy_base_url: default_proxy_base_url(),
            proxy_token: None,
            timeout_seconds: default_timeout_seconds(),
            sandbox: SandboxSettings::default(),
        }
    }
}

/// Non-secret view of a config, safe to log
#[derive(Debug, Clone)]
pub struct SafeConfigSummary {
    pub base_url: Option<String>,
    pub api_key_configured: bool,
    pub model: Option<String>,
    pub proxy_token_configured: bool,
}

impl Config {
    /// Resolves the provider settings, naming the first missing field
    pub fn agent_config(&self) -> Result<AgentConfig, ConfigError> {
        let base_url = non_empty(&self.base_url).ok_or(ConfigError::Missing("base_url"))?;
        let api_key = non_empty(&self.api_key).ok_or(ConfigError::Missing("api_key"))?;
        let model = non_empty(&self.model).ok_or(ConfigError::Missing("model"))?;

        Ok(AgentConfig {
            base_url,
            api_key,
            model,
        })
    }

    /// True when base URL and API key are both present
    pub fn has_credentials(&self) -> bool {
        non_empty(&self.base_url).is_some() && non_empty(&self.api_key).is_some()
    }

    pub fn get_safe_summary(&self) -> SafeConfigSummary {
        SafeConfigSummary {
            base_url: self.base_url.clone(),
            api_key_configured: non_empty(&self.api_key).is_some(),
            model: self.model.clone(),
            proxy_token_configured: self.proxy_token.is_some(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
