pub mod loader;
pub mod onboard;
pub mod schema;

pub use loader::{
    ConfigError, get_config_path, load_config, load_config_or_defaults, load_file_config,
    save_config,
};
pub use onboard::{ProviderSettings, configure_provider, run_configure};
pub use schema::{AgentConfig, CANDIDATE_BASE_URLS, Config, SandboxSettings};
