use crate::config::{Config, load_file_config, save_config};
use crate::providers::{GenericOpenAiProvider, LlmProvider, ModelInfo, filter_supported_models};
use anyhow::{Context, Result};
use inquire::{Confirm, Password, PasswordDisplayMode, Select, Text};
use std::path::Path;

/// Model used when the provider lists nothing usable
pub const FALLBACK_MODEL: &str = "gpt-4o";

const CUSTOM_URL_OPTION: &str = "Other (enter a base URL)";

/// Provider endpoint chosen during configuration, with its supported models
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: String,
    pub models: Vec<ModelInfo>,
    /// True when the base URL and API key were typed in at the prompt
    pub entered: bool,
}

impl ProviderSettings {
    pub fn has_models(&self) -> bool {
        !self.models.is_empty()
    }
}

/// Resolves the provider endpoint and lists its supported models.
///
/// With `show = false` and a config that already has a base URL and API
/// key, no prompt is shown. Otherwise the user picks a base URL from
/// `candidates` (or types one) and enters an API key.
pub async fn configure_provider(
    candidates: &[&str],
    show: bool,
    existing: &Config,
) -> Result<ProviderSettings> {
    let (base_url, api_key, entered) =
        match (show, existing.base_url.as_deref(), existing.api_key.as_deref()) {
            (false, Some(url), Some(key)) if existing.has_credentials() => {
                tracing::debug!(base_url = %url, "Using configured provider without prompting");
                (url.trim().to_string(), key.trim().to_string(), false)
            }
            _ => {
                let (url, key) = prompt_credentials(candidates, existing)?;
                (url, key, true)
            }
        };

    let provider = GenericOpenAiProvider::try_new(
        api_key.clone(),
        base_url.clone(),
        existing.model.clone().unwrap_or_else(|| FALLBACK_MODEL.to_string()),
        "configure",
        existing.timeout_seconds,
    )?;

    let models = provider
        .list_models()
        .await
        .with_context(|| format!("Failed to list models from {}", base_url))?;
    let total = models.len();
    let models = filter_supported_models(models);

    tracing::info!(total, supported = models.len(), "Fetched provider models");

    Ok(ProviderSettings {
        base_url,
        api_key,
        models,
        entered,
    })
}

/// Interactive configure flow: endpoint, model, confirmation, save.
///
/// Returns the effective config, or the existing one unchanged when the
/// user cancels. Only the file's own values and what was chosen here are
/// written; values that came from the environment stay out of the file.
pub async fn run_configure(existing: &Config, show: bool, config_path: &Path) -> Result<Config> {
    let settings = configure_provider(&crate::config::CANDIDATE_BASE_URLS, show, existing).await?;

    if !settings.has_models() {
        println!("No compatible models found. Only GPT-4.1* and GPT-5* models are supported.");
    }

    let current = existing.model.as_deref();
    let model = if show || current.is_none() {
        prompt_model(&settings.models, current)?
    } else {
        default_model_choice(&settings.models, current)
    };

    let config = Config {
        base_url: Some(settings.base_url.clone()),
        api_key: Some(settings.api_key.clone()),
        model: Some(model),
        ..existing.clone()
    };

    if show && !confirm_configuration(&config)? {
        println!("Configuration cancelled. No changes were made.");
        return Ok(existing.clone());
    }

    let stored = persisted_config(&settings, &config, config_path);
    save_config(&stored, config_path).context("Failed to save configuration")?;
    println!("LLM configured successfully!");
    println!("{}", format_provider_summary(&config));

    Ok(config)
}

/// The config file contents after configuring: the current file layer with
/// the chosen model, plus the endpoint when it was typed in
fn persisted_config(settings: &ProviderSettings, effective: &Config, config_path: &Path) -> Config {
    let mut stored = load_file_config(config_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Replacing unreadable config file");
        Config::default()
    });

    if settings.entered {
        stored.base_url = effective.base_url.clone();
        stored.api_key = effective.api_key.clone();
    }
    stored.model = effective.model.clone();
    stored
}

fn prompt_credentials(candidates: &[&str], existing: &Config) -> Result<(String, String)> {
    println!();
    println!("LLM Provider Configuration");
    println!("Use AI Pipe for serverless LLM access, or configure your own provider.");

    let mut options: Vec<&str> = candidates.to_vec();
    options.push(CUSTOM_URL_OPTION);

    let starting = existing
        .base_url
        .as_deref()
        .and_then(|url| options.iter().position(|o| *o == url))
        .unwrap_or(0);

    let selection = Select::new("Select base URL:", options)
        .with_starting_cursor(starting)
        .with_help_message("Use arrow keys to navigate, Enter to select")
        .prompt()?;

    let base_url = if selection == CUSTOM_URL_OPTION {
        Text::new("Base URL:")
            .with_validator(|input: &str| {
                if is_http_url(input) {
                    Ok(inquire::validator::Validation::Valid)
                } else {
                    Ok(inquire::validator::Validation::Invalid(
                        "Base URL must start with http:// or https://".into(),
                    ))
                }
            })
            .prompt()?
    } else {
        selection.to_string()
    };

    let api_key = Password::new("API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_validator(|input: &str| {
            if input.trim().is_empty() {
                Ok(inquire::validator::Validation::Invalid(
                    "API key cannot be empty".into(),
                ))
            } else {
                Ok(inquire::validator::Validation::Valid)
            }
        })
        .prompt()?;

    Ok((base_url.trim().to_string(), api_key.trim().to_string()))
}

fn prompt_model(models: &[ModelInfo], current: Option<&str>) -> Result<String> {
    if models.is_empty() {
        return Ok(default_model_choice(models, current));
    }

    let ids: Vec<String> = models.iter().map(|m| m.id.clone()).collect();
    let starting = current
        .and_then(|c| ids.iter().position(|id| id == c))
        .unwrap_or(0);

    let model = Select::new("Select model:", ids)
        .with_starting_cursor(starting)
        .prompt()?;

    Ok(model)
}

/// Keeps the current model when the provider still offers it, otherwise
/// the first supported model, otherwise [`FALLBACK_MODEL`]
pub fn default_model_choice(models: &[ModelInfo], current: Option<&str>) -> String {
    if let Some(current) = current.filter(|c| models.iter().any(|m| m.id == *c)) {
        return current.to_string();
    }

    models
        .first()
        .map(|m| m.id.clone())
        .unwrap_or_else(|| FALLBACK_MODEL.to_string())
}

fn confirm_configuration(config: &Config) -> Result<bool> {
    println!();
    println!("Please review your configuration:");
    println!("{}", format_provider_summary(config));
    println!();

    let confirmed = Confirm::new("Save this configuration?")
        .with_default(true)
        .with_help_message("Press 'y' to save, 'n' to cancel")
        .prompt()?;

    Ok(confirmed)
}

fn is_http_url(input: &str) -> bool {
    let input = input.trim();
    input.starts_with("http://") || input.starts_with("https://")
}

/// Human-readable provider summary with the API key masked
pub fn format_provider_summary(config: &Config) -> String {
    format!(
        "  Base URL: {}\n  API key: {}\n  Model: {}",
        config.base_url.as_deref().unwrap_or("(not set)"),
        config
            .api_key
            .as_deref()
            .map(mask_secret)
            .unwrap_or_else(|| "(not set)".to_string()),
        config.model.as_deref().unwrap_or("(not set)")
    )
}

fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 10 {
        "***".to_string()
    } else {
        let chars: Vec<char> = secret.chars().collect();
        let start: String = chars[..6].iter().collect();
        let end: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", start, end)
    }
}
