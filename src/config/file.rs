//! TOML configuration file loading
//!
//! Supports `~/.config/remo/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RemoConfigFile {
    /// Backend connection
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Assistant identity and activation phrases
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Listening mode
    #[serde(default)]
    pub listening: ListeningFileConfig,

    /// Chat requests
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Backend connection configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Base URL (e.g. `http://localhost:8000`)
    pub url: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// Name the assistant answers to
    pub name: Option<String>,

    /// Activation phrases, checked case-insensitively
    pub wake_phrases: Option<Vec<String>>,
}

/// Listening mode configuration
#[derive(Debug, Default, Deserialize)]
pub struct ListeningFileConfig {
    /// Length of each recording window in milliseconds
    pub window_ms: Option<u64>,

    /// Credential sent with every listening segment
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Stream flag forwarded to `/chat`
    pub stream: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `RemoConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> RemoConfigFile {
    config_file_path().map_or_else(RemoConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> RemoConfigFile {
    if !path.exists() {
        return RemoConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                RemoConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RemoConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/remo/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("remo").join("config.toml"))
}
