//! Persistent storage for the search API credentials
//!
//! The search tool reads `{ api_key, search_engine_id }` through the
//! [`CredentialStore`] trait. The file store keeps a single JSON record at
//! `~/.toolchat/search.json` with owner-only permissions.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to access credential file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file contains invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Google Programmable Search credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchCredentials {
    pub api_key: String,
    pub search_engine_id: String,
}

impl SearchCredentials {
    pub fn new(api_key: impl Into<String>, search_engine_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            search_engine_id: search_engine_id.into(),
        }
    }

    /// Both values present and non-blank
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.search_engine_id.trim().is_empty()
    }
}

/// Source of search credentials
pub trait CredentialStore: Send + Sync {
    /// Returns the stored credentials, or `None` when nothing usable is stored
    fn load(&self) -> Result<Option<SearchCredentials>, CredentialError>;

    fn save(&self, credentials: &SearchCredentials) -> Result<(), CredentialError>;
}

/// JSON file store, written with 0600 permissions
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `~/.toolchat/search.json`, if a home directory exists
    pub fn default_location() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".toolchat").join("search.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<SearchCredentials>, CredentialError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No search credentials stored");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let credentials: SearchCredentials = serde_json::from_str(&content)?;
        Ok(Some(credentials).filter(SearchCredentials::is_complete))
    }

    fn save(&self, credentials: &SearchCredentials) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(credentials)?;
        let mut file = fs::File::create(&self.path)?;
        file.write_all(json.as_bytes())?;

        let mut permissions = file.metadata()?.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(&self.path, permissions)?;

        tracing::info!(path = %self.path.display(), "Search credentials saved");
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<Option<SearchCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: SearchCredentials) -> Self {
        Self {
            credentials: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<SearchCredentials>, CredentialError> {
        let guard = self.credentials.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.clone().filter(SearchCredentials::is_complete))
    }

    fn save(&self, credentials: &SearchCredentials) -> Result<(), CredentialError> {
        *self.credentials.lock().unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
        Ok(())
    }
}
