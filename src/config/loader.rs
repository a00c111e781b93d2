use crate::config::schema::Config;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
pub(crate) static CONFIG_TEST_ENV_LOCK: Mutex<()> = Mutex::new(());

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file contains invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("LLM provider is not configured: missing {0}. Run 'toolchat configure' first.")]
    Missing(&'static str),
}

pub fn load_config(cli_model: Option<String>, cli_config_path: Option<PathBuf>) -> Result<Config> {
    tracing::debug!("Loading configuration");

    // Layer 1: config file (~/.toolchat/config.json)
    let file_layer = match cli_config_path.or_else(get_default_config_path) {
        Some(path) => load_file_config(&path).inspect_err(|e| {
            if matches!(e, ConfigError::InvalidJson(_)) {
                eprintln!("Error: Configuration file contains invalid JSON.");
                eprintln!("Suggestion: Run 'toolchat configure' to recreate the configuration file.");
            }
        })?,
        None => Config::default(),
    };

    Ok(apply_overrides(file_layer, cli_model))
}

/// Same layering as [`load_config`], but a config file that is not valid
/// JSON is replaced by defaults so it can be rewritten.
pub fn load_config_or_defaults(
    cli_model: Option<String>,
    cli_config_path: Option<PathBuf>,
) -> Result<Config> {
    let file_layer = match cli_config_path.or_else(get_default_config_path) {
        Some(path) => match load_file_config(&path) {
            Ok(config) => config,
            Err(ConfigError::InvalidJson(e)) => {
                tracing::warn!(
                    config_path = %path.display(),
                    error = %e,
                    "Config file is not valid JSON, starting from defaults"
                );
                Config::default()
            }
            Err(e) => return Err(e.into()),
        },
        None => Config::default(),
    };

    Ok(apply_overrides(file_layer, cli_model))
}

/// The config file alone, without environment or CLI overrides
///
/// A missing file, or one without 0600 permissions, yields defaults.
pub fn load_file_config(path: &Path) -> Result<Config, ConfigError> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(config_path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }
        Err(e) => return Err(e.into()),
    };

    let mode = metadata.permissions().mode() & 0o777;
    if mode != 0o600 {
        tracing::error!(
            "Config file {:?} has permissions {:o}, expected 0600 - skipping for security",
            path,
            mode
        );
        return Ok(Config::default());
    }

    tracing::debug!(config_path = %path.display(), "Loading configuration from file");
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Layers 2 and 3: environment variables, then the CLI model flag
fn apply_overrides(config: Config, cli_model: Option<String>) -> Config {
    let mut config = merge_env_variables(config);

    if let Some(model) = cli_model.filter(|m| !m.trim().is_empty()) {
        tracing::debug!(model = %model, "Applying CLI model override");
        config.model = Some(model);
    }

    let summary = config.get_safe_summary();
    tracing::debug!(
        base_url = ?summary.base_url,
        api_key_configured = summary.api_key_configured,
        model = ?summary.model,
        proxy_token_configured = summary.proxy_token_configured,
        "Configuration loaded successfully"
    );

    config
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".toolchat").join("config.json"))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn merge_env_variables(config: Config) -> Config {
    Config {
        base_url: env_value("TOOLCHAT_BASE_URL").or(config.base_url),
        api_key: env_value("TOOLCHAT_API_KEY")
            .or_else(|| env_value("OPENAI_API_KEY"))
            .or(config.api_key),
        model: env_value("TOOLCHAT_MODEL").or(config.model),
        proxy_token: env_value("AIPIPE_TOKEN").or(config.proxy_token),
        ..config
    }
}

pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let json = serde_json::to_string_pretty(config)?;

    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create config file: {:?}", path))?;

    file.write_all(json.as_bytes())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    // Owner read/write only: the file holds the API key
    let mut permissions = file.metadata()?.permissions();
    permissions.set_mode(0o600);
    fs::set_permissions(path, permissions)
        .with_context(|| format!("Failed to set permissions on config file: {:?}", path))?;

    tracing::info!("Configuration saved to {:?}", path);
    Ok(())
}

pub fn get_config_path() -> Option<PathBuf> {
    get_default_config_path()
}

#[cfg(test)]
pub(crate) fn clear_config_env() {
    unsafe {
        std::env::remove_var("TOOLCHAT_BASE_URL");
        std::env::remove_var("TOOLCHAT_API_KEY");
        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("TOOLCHAT_MODEL");
        std::env::remove_var("AIPIPE_TOKEN");
    }
}
