//! Configuration management for the Remo client

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

use crate::voice::WakeWordRouter;
use crate::{Error, Result};
use file::RemoConfigFile;

/// Default backend base URL
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default assistant name
pub const DEFAULT_ASSISTANT_NAME: &str = "remo";

/// Default listening window in milliseconds
pub const DEFAULT_WINDOW_MS: u64 = 30_000;

/// Remo client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL
    pub backend_url: String,

    /// Per-request HTTP timeout
    pub timeout: Duration,

    /// Name the assistant answers to
    pub assistant_name: String,

    /// Activation phrases, in match priority order
    pub wake_phrases: Vec<String>,

    /// Length of each listening window
    pub window: Duration,

    /// Credential for listening-mode processing, if configured locally
    pub notification_key: Option<SecretString>,

    /// Stream flag forwarded to `/chat`
    pub stream: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            assistant_name: DEFAULT_ASSISTANT_NAME.to_string(),
            wake_phrases: WakeWordRouter::default_phrases(DEFAULT_ASSISTANT_NAME),
            window: Duration::from_millis(DEFAULT_WINDOW_MS),
            notification_key: None,
            stream: true,
        }
    }
}

/// Values given on the command line, highest priority
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend_url: Option<String>,
    pub window_ms: Option<u64>,
}

impl Config {
    /// Load configuration (cli > env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a numeric setting does not parse or is zero
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok(), overrides)
    }

    /// Merge the config file, an environment lookup and overrides
    ///
    /// # Errors
    ///
    /// Returns error if a numeric setting does not parse or is zero
    pub fn resolve(
        fc: RemoConfigFile,
        env: impl Fn(&str) -> Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let backend_url = overrides
            .backend_url
            .clone()
            .or_else(|| env("REMO_BACKEND_URL"))
            .or(fc.backend.url)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let timeout_secs = parse_env(&env, "REMO_HTTP_TIMEOUT")?
            .or(fc.backend.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(Error::Config("request timeout must be non-zero".to_string()));
        }

        let assistant_name = env("REMO_ASSISTANT_NAME")
            .or(fc.assistant.name)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_ASSISTANT_NAME.to_string());

        let wake_phrases = fc
            .assistant
            .wake_phrases
            .filter(|phrases| phrases.iter().any(|p| !p.trim().is_empty()))
            .unwrap_or_else(|| WakeWordRouter::default_phrases(&assistant_name));

        let window_ms = match overrides.window_ms {
            Some(ms) => ms,
            None => parse_env(&env, "REMO_WINDOW_MS")?
                .or(fc.listening.window_ms)
                .unwrap_or(DEFAULT_WINDOW_MS),
        };
        if window_ms == 0 {
            return Err(Error::Config("listening window must be non-zero".to_string()));
        }

        let notification_key = env("REMO_NOTIFICATION_KEY")
            .or(fc.listening.api_key)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        Ok(Self {
            backend_url,
            timeout: Duration::from_secs(timeout_secs),
            assistant_name,
            wake_phrases,
            window: Duration::from_millis(window_ms),
            notification_key,
            stream: fc.chat.stream.unwrap_or(true),
        })
    }
}

fn parse_env(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
