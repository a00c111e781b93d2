use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use toolchat::agent::tools::ToolRegistry;
use toolchat::agent::tools::javascript::{self, SANDBOX_SUBCOMMAND};
use toolchat::agent::{AgentError, AgentEvent, AgentLoop, EventReceiver, TurnOutcome, event_channel};
use toolchat::config::{self, Config};
use toolchat::credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, SearchCredentials,
};
use toolchat::extractor::truncate_chars;
use toolchat::providers::{GenericOpenAiProvider, LlmProvider, filter_supported_models};

/// Longest tool result shown in the terminal
const MAX_DISPLAYED_RESULT_CHARS: usize = 800;

#[derive(Parser)]
#[command(name = "toolchat")]
#[command(about = "toolchat - chat with an LLM that can search, run JavaScript and fetch URLs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Model to use, overriding config and environment
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Path to the config file (default: ~/.toolchat/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Ask a single question and print the answer
    Ask {
        /// The question to send
        message: String,
    },
    /// Choose the LLM provider, API key and model
    Configure,
    /// List the supported models offered by the configured provider
    Models,
    /// Store the Google Search API key and search engine ID
    SearchCredentials,
    /// Display version information
    Version,
    /// Evaluates one JavaScript request from stdin (internal)
    #[command(name = SANDBOX_SUBCOMMAND, hide = true)]
    SandboxEval,
}

/// Where tool and status lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    /// Everything on stdout
    Interactive,
    /// Only the reply on stdout
    OneShot,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => config::get_config_path().context("Could not determine home directory")?,
    };

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Configure => {
            let existing = config::load_config_or_defaults(cli.model, Some(config_path.clone()))?;
            require_terminal("configure")?;
            config::run_configure(&existing, true, &config_path).await?;
            Ok(())
        }
        Commands::SandboxEval => serve_sandbox(),
        Commands::SearchCredentials => {
            require_terminal("search-credentials")?;
            configure_search_credentials()
        }
        Commands::Models => {
            let config = config::load_config(cli.model, Some(config_path))?;
            list_models(&config).await
        }
        Commands::Ask { message } => {
            let config = config::load_config(cli.model, Some(config_path))?;
            ask(&config, &message).await
        }
        Commands::Chat => {
            let config = config::load_config(cli.model, Some(config_path.clone()))?;
            chat(config, &config_path).await
        }
    }
}

pub fn extract_command_from_error(error_msg: &str) -> String {
    // e.g. "error: unrecognized subcommand 'invalid_command'"
    error_msg
        .find('\'')
        .and_then(|start| {
            let rest = &error_msg[start + 1..];
            rest.find('\'').map(|end| rest[..end].to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Child side of `execute_javascript`
///
/// Runs without logging or an async runtime; `main` dispatches here before
/// either is set up.
pub fn serve_sandbox() -> Result<()> {
    javascript::serve_evaluation(std::io::stdin().lock(), std::io::stdout().lock())
        .context("sandbox evaluation failed")
}

/// Interactive commands prompt on the terminal and cannot read piped input
fn require_terminal(command: &str) -> Result<()> {
    if !std::io::stdin().is_terminal() {
        bail!("'toolchat {}' needs an interactive terminal", command);
    }
    Ok(())
}

/// Next step for provider failures the user can fix
fn provider_hint(error: &AgentError) -> Option<&'static str> {
    let AgentError::Provider(error) = error else {
        return None;
    };

    if error.is_auth_error() {
        Some("Check the API key with /configure or 'toolchat configure'.")
    } else if error.is_rate_limit() {
        Some("The provider is rate limiting requests. Wait a moment and try again.")
    } else if error.is_transport() {
        Some("Could not reach the provider. Check the base URL and your network.")
    } else {
        None
    }
}

fn print_version() {
    println!("toolchat {}", env!("CARGO_PKG_VERSION"));
}

fn credential_store() -> Arc<dyn CredentialStore> {
    match FileCredentialStore::default_location() {
        Some(store) => Arc::new(store),
        None => {
            tracing::warn!("No home directory, search credentials will not persist");
            Arc::new(MemoryCredentialStore::new())
        }
    }
}

fn build_provider(config: &Config) -> Result<(Arc<dyn LlmProvider>, String)> {
    let agent_config = config.agent_config()?;
    let provider = GenericOpenAiProvider::from_agent_config(&agent_config, config.timeout_seconds)?;
    Ok((Arc::new(provider), agent_config.model))
}

fn build_agent(config: &Config) -> Result<(AgentLoop, EventReceiver)> {
    let (provider, model) = build_provider(config)?;
    let registry = ToolRegistry::with_default_tools(config, credential_store());
    let (tx, rx) = event_channel();

    tracing::info!(
        provider = provider.provider_name(),
        model = %model,
        tools = ?registry.names(),
        "Agent ready"
    );

    let agent = AgentLoop::new(provider, model, Arc::new(registry)).with_events(tx);
    Ok((agent, rx))
}

/// Runs one turn while rendering its events as they arrive
async fn drive_turn(
    agent: &AgentLoop,
    events: &mut EventReceiver,
    input: &str,
    output: Output,
) -> Result<TurnOutcome, AgentError> {
    let turn = agent.submit(input);
    tokio::pin!(turn);

    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            Some(event) = events.recv() => render_event(&event, output),
        }
    };

    while let Ok(event) = events.try_recv() {
        render_event(&event, output);
    }

    result
}

fn render_event(event: &AgentEvent, output: Output) {
    let line = format_event(event);
    match (event, output) {
        (_, Output::Interactive) => println!("{}", line),
        (AgentEvent::Reply { text }, Output::OneShot) => println!("{}", text),
        (_, Output::OneShot) => eprintln!("{}", line),
    }
}

fn format_event(event: &AgentEvent) -> String {
    match event {
        AgentEvent::ToolStarted { name, .. } => format!("🔧 Executing tool: {}", name),
        AgentEvent::ToolFinished {
            content, is_error, ..
        } => {
            if *is_error {
                format!("❌ Tool error: {}", content.trim_start_matches("Error: "))
            } else {
                format!("✅ Tool result: {}", display_result(content))
            }
        }
        AgentEvent::Reply { text } => format!("🤖 Agent: {}", text),
        AgentEvent::Error { message } => format!("❌ Error: {}", message),
    }
}

/// Pretty-prints JSON results and caps their length
fn display_result(content: &str) -> String {
    let pretty = serde_json::from_str::<serde_json::Value>(content)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| content.to_string());

    if pretty.chars().count() > MAX_DISPLAYED_RESULT_CHARS {
        format!("{}...", truncate_chars(&pretty, MAX_DISPLAYED_RESULT_CHARS))
    } else {
        pretty
    }
}

async fn ask(config: &Config, message: &str) -> Result<()> {
    let (agent, mut events) = build_agent(config)?;

    let outcome = drive_turn(&agent, &mut events, message, Output::OneShot)
        .await
        .inspect_err(|e| {
            if let Some(hint) = provider_hint(e) {
                eprintln!("{}", hint);
            }
        })?;

    match outcome {
        TurnOutcome::Replied(_) => Ok(()),
        TurnOutcome::Ignored => bail!("Nothing to ask: the message is empty"),
    }
}

async fn chat(mut config: Config, config_path: &std::path::Path) -> Result<()> {
    if config.agent_config().is_err() {
        println!("The LLM provider is not configured yet.");
        config = config::run_configure(&config, !config.has_credentials(), config_path).await?;
    }

    let (agent, mut events) = build_agent(&config)?;

    println!("🚀 LLM Agent ready! Ask me anything.");
    println!("Commands: /configure, /reset, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print_prompt();

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                agent.reset()?;
                println!("Conversation cleared.");
            }
            "/configure" => match config::run_configure(&config, true, config_path).await {
                Ok(updated) => {
                    let (provider, model) = build_provider(&updated)?;
                    agent.reconfigure(provider, model.clone())?;
                    config = updated;
                    println!("Now using model {}", model);
                }
                Err(e) => println!("❌ Configuration failed: {:#}", e),
            },
            input => {
                if let Err(e) = drive_turn(&agent, &mut events, input, Output::Interactive).await {
                    tracing::debug!(error = %e, "Turn ended with error");
                    if let Some(hint) = provider_hint(&e) {
                        println!("{}", hint);
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_prompt() {
    use std::io::Write;

    print!("> ");
    // Prompt still works if flushing fails
    let _ = std::io::stdout().flush();
}

async fn list_models(config: &Config) -> Result<()> {
    let (Some(base_url), Some(api_key)) = (config.base_url.as_deref(), config.api_key.as_deref())
    else {
        bail!("LLM provider is not configured. Run 'toolchat configure' first.");
    };

    let provider = GenericOpenAiProvider::try_new(
        api_key,
        base_url,
        config.model.clone().unwrap_or_default(),
        "models",
        config.timeout_seconds,
    )?;

    let models = filter_supported_models(provider.list_models().await?);
    if models.is_empty() {
        println!("No compatible models found.");
        return Ok(());
    }

    for model in models {
        let marker = if config.model.as_deref() == Some(model.id.as_str()) {
            "*"
        } else {
            " "
        };
        let note = if model.deprecated { " (deprecated)" } else { "" };
        println!("{} {}{}", marker, model.id, note);
    }

    Ok(())
}

fn configure_search_credentials() -> Result<()> {
    let store = FileCredentialStore::default_location().context("Could not determine home directory")?;

    println!("Google Search Configuration");
    println!("Create an API key at https://console.cloud.google.com/apis/credentials");
    println!("and a search engine at https://programmablesearchengine.google.com");

    let api_key = Password::new("Google Search API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;
    let search_engine_id = Text::new("Search engine ID:").prompt()?;

    let credentials = SearchCredentials::new(api_key.trim(), search_engine_id.trim());
    if !credentials.is_complete() {
        bail!("Both the API key and the search engine ID are required");
    }

    store.save(&credentials)?;
    println!("Search credentials saved to {}", store.path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolchat::providers::ProviderError;

    #[test]
    fn test_version_string_format() {
        let version = env!("CARGO_PKG_VERSION");
        let parts: Vec<&str> = version.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.parse::<u32>().is_ok()));
    }

    #[test]
    fn test_extract_command_from_error() {
        let msg = "error: unrecognized subcommand 'foo_bar'";
        assert_eq!(extract_command_from_error(msg), "foo_bar");
        assert_eq!(extract_command_from_error("no quotes"), "unknown");
    }

    #[test]
    fn test_format_tool_events() {
        let started = AgentEvent::ToolStarted {
            id: "c1".to_string(),
            name: "google_search".to_string(),
        };
        assert_eq!(format_event(&started), "🔧 Executing tool: google_search");

        let failed = AgentEvent::ToolFinished {
            id: "c1".to_string(),
            name: "google_search".to_string(),
            content: "Error: Google Search not configured".to_string(),
            is_error: true,
        };
        assert_eq!(
            format_event(&failed),
            "❌ Tool error: Google Search not configured"
        );
    }

    #[test]
    fn test_display_result_pretty_and_capped() {
        let shown = display_result(r#"{"result":4}"#);
        assert!(shown.contains("\n"));

        let long = "x".repeat(2000);
        let shown = display_result(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), MAX_DISPLAYED_RESULT_CHARS + 3);
    }

    #[test]
    fn test_provider_hints() {
        let auth = AgentError::Provider(ProviderError::auth("bad key"));
        assert!(provider_hint(&auth).unwrap().contains("API key"));

        let limited = AgentError::Provider(ProviderError::rate_limit("slow down"));
        assert!(provider_hint(&limited).unwrap().contains("rate limiting"));

        let offline = AgentError::Provider(ProviderError::network("refused"));
        assert!(provider_hint(&offline).unwrap().contains("base URL"));

        let other = AgentError::Provider(ProviderError::invalid_request("bad"));
        assert_eq!(provider_hint(&other), None);
        assert_eq!(provider_hint(&AgentError::Busy), None);
    }

    #[test]
    fn test_sandbox_subcommand_is_hidden() {
        let cli = Cli::try_parse_from(["toolchat", SANDBOX_SUBCOMMAND]).unwrap();
        assert!(matches!(cli.command, Some(Commands::SandboxEval)));

        let help = <Cli as clap::CommandFactory>::command().render_help().to_string();
        assert!(!help.contains(SANDBOX_SUBCOMMAND));
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from(["toolchat", "ask", "hi", "--model", "gpt-5", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.model.as_deref(), Some("gpt-5"));
        assert!(matches!(cli.command, Some(Commands::Ask { ref message }) if message == "hi"));
    }
}
