use std::path::PathBuf;
use std::time::Duration;

use enhance_core::wire::DEFAULT_COMPLETION_EVENT;
use enhance_engine::provider::{
    ProviderConfig, DEFAULT_PRESET, DEFAULT_PROVIDER_URL, DEFAULT_WEBHOOK_URL,
};
use enhance_relay::session::RelayConfig;

/// Hosted relay the client connects to by default.
pub const DEFAULT_RELAY_URL: &str = "wss://socket-server-lcbd.onrender.com";

const DEFAULT_TRACK_TITLE: &str = "test-track";
const DEFAULT_OUTPUT_FILE: &str = "enhanced.mp3";
const DEFAULT_SESSION_WAIT_SECS: u64 = 30;

/// Errors raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relay_url: String,
    pub completion_event: String,
    pub provider: ProviderConfig,
    pub input_file: PathBuf,
    pub track_title: String,
    pub output_file: PathBuf,
    /// How long to wait for the relay to assign a session id.
    pub session_wait: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default                                                        |
    /// |---------------------|----------------------------------------------------------------|
    /// | `RELAY_URL`         | `wss://socket-server-lcbd.onrender.com`                        |
    /// | `PROVIDER_URL`      | `https://auphonic.com/api/simple/productions.json`             |
    /// | `PROVIDER_PRESET`   | `ZAoTrRzrkYUQMwAAqjm6JR`                                       |
    /// | `WEBHOOK_URL`       | `https://socket-server-lcbd.onrender.com/auphonic-enhance-audio` |
    /// | `COMPLETION_EVENT`  | `enhanceAudioComplete`                                         |
    /// | `INPUT_FILE`        | required                                                       |
    /// | `TRACK_TITLE`       | `test-track`                                                   |
    /// | `OUTPUT_FILE`       | `enhanced.mp3`                                                 |
    /// | `SESSION_WAIT_SECS` | `30`                                                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let input_file = lookup("INPUT_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("INPUT_FILE"))?;

        let wait_raw = var("SESSION_WAIT_SECS", &DEFAULT_SESSION_WAIT_SECS.to_string());
        let session_wait_secs: u64 = wait_raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: "SESSION_WAIT_SECS",
            expected: "a whole number of seconds",
            value: wait_raw.clone(),
        })?;

        Ok(Self {
            relay_url: var("RELAY_URL", DEFAULT_RELAY_URL),
            completion_event: var("COMPLETION_EVENT", DEFAULT_COMPLETION_EVENT),
            provider: ProviderConfig {
                url: var("PROVIDER_URL", DEFAULT_PROVIDER_URL),
                preset: var("PROVIDER_PRESET", DEFAULT_PRESET),
                webhook_url: var("WEBHOOK_URL", DEFAULT_WEBHOOK_URL),
                request_timeout: None,
            },
            input_file,
            track_title: var("TRACK_TITLE", DEFAULT_TRACK_TITLE),
            output_file: PathBuf::from(var("OUTPUT_FILE", DEFAULT_OUTPUT_FILE)),
            session_wait: Duration::from_secs(session_wait_secs),
        })
    }

    /// Relay settings with the default reconnect policy.
    pub fn relay_config(&self) -> RelayConfig {
        let mut relay = RelayConfig::new(self.relay_url.clone());
        relay.completion_event = self.completion_event.clone();
        relay
    }
}
