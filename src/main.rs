mod cli;

use clap::Parser;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// How long blocking tasks (such as a pending stdin read) may delay exit
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn init_logging(verbose: bool) {
    let filter_level = if verbose { Level::DEBUG } else { Level::INFO };

    // stdout carries the conversation, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(filter_level.into()))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::time())
        .init();
}

fn exit_on_parse_error(e: clap::Error) -> ! {
    use clap::error::ErrorKind;

    match e.kind() {
        ErrorKind::DisplayVersion | ErrorKind::DisplayHelp => {
            e.print().ok();
            std::process::exit(0);
        }
        ErrorKind::InvalidSubcommand => {
            let cmd = cli::extract_command_from_error(&e.to_string());
            eprintln!("error: unknown command: {}", cmd);
            eprintln!(
                "\nValid commands are: chat, ask, configure, models, search-credentials, version"
            );
            std::process::exit(1);
        }
        _ => {
            e.print().ok();
            std::process::exit(2);
        }
    }
}

fn main() {
    let cli = cli::Cli::try_parse().unwrap_or_else(|e| exit_on_parse_error(e));

    // The sandbox child stays single-threaded so its address-space cap holds
    if matches!(cli.command, Some(cli::Commands::SandboxEval)) {
        if let Err(e) = cli::serve_sandbox() {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    init_logging(cli.verbose);

    tracing::debug!("Verbose mode enabled");
    tracing::debug!("Starting toolchat v{}", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(cli::run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
