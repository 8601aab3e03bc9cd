//! Configuration management for StreamChat
//!
//! Configuration is read from a YAML file, then overridden by environment
//! variables and finally by CLI flags.

use crate::error::{Result, StreamChatError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Chat service location and HTTP timeouts
    #[serde(default)]
    pub server: ServerConfig,
    /// Controller behavior
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Chat service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// API base URL; endpoint paths are appended to it
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for persistence requests
    ///
    /// Does not apply to the chat stream, which stays open until it ends or
    /// is stopped.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Connect timeout for every request, stream included
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

impl ServerConfig {
    /// Parses the base URL
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unparseable URLs and for schemes
    /// other than http and https.
    pub fn base(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            StreamChatError::Config(format!("Invalid base_url '{}': {}", self.base_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(StreamChatError::Config(format!(
                "base_url must use http or https, got '{}'",
                url.scheme()
            ))
            .into());
        }
        Ok(url)
    }

    /// Builds the URL of an endpoint below the base URL
    ///
    /// `path` is relative (`"sessions/3/messages"`); a trailing slash on the
    /// base URL is optional.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.base()?;
        let joined = format!(
            "{}/{}",
            base.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        base.set_path(&joined);
        Ok(base)
    }
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    /// Sessions fetched by a list refresh
    #[serde(default = "default_session_page_size")]
    pub session_page_size: u32,

    /// Messages fetched when a session is selected
    #[serde(default = "default_message_page_size")]
    pub message_page_size: u32,

    /// Maximum search results
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,

    /// Commands that may queue up in front of the controller
    #[serde(default = "default_command_queue_depth")]
    pub command_queue_depth: usize,
}

fn default_session_page_size() -> u32 {
    50
}

fn default_message_page_size() -> u32 {
    100
}

fn default_search_limit() -> u32 {
    20
}

fn default_command_queue_depth() -> usize {
    32
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            session_page_size: default_session_page_size(),
            message_page_size: default_message_page_size(),
            search_limit: default_search_limit(),
            command_queue_depth: default_command_queue_depth(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// When `path` does not exist the per-user file from
    /// [`user_config_path`] is tried; if that is missing too, defaults are
    /// used.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let user_config = user_config_path().filter(|p| p.exists());
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else if let Some(user_config) = user_config {
            tracing::debug!("Using per-user config at {}", user_config.display());
            Self::from_file(&user_config)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StreamChatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| StreamChatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("STREAMCHAT_BASE_URL") {
            self.server.base_url = base_url;
        }

        apply_numeric_env(
            "STREAMCHAT_REQUEST_TIMEOUT_SECONDS",
            &mut self.server.request_timeout_seconds,
        );
        apply_numeric_env(
            "STREAMCHAT_CONNECT_TIMEOUT_SECONDS",
            &mut self.server.connect_timeout_seconds,
        );
        apply_numeric_env(
            "STREAMCHAT_SESSION_PAGE_SIZE",
            &mut self.chat.session_page_size,
        );
        apply_numeric_env(
            "STREAMCHAT_MESSAGE_PAGE_SIZE",
            &mut self.chat.message_page_size,
        );
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.base_url {
            tracing::debug!(%base_url, "Base URL overridden from command line");
            self.server.base_url = base_url.clone();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        self.server.base()?;

        if self.server.request_timeout_seconds == 0 {
            return Err(StreamChatError::Config(
                "server.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.connect_timeout_seconds == 0 {
            return Err(StreamChatError::Config(
                "server.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if !(1..=50).contains(&self.chat.session_page_size) {
            return Err(StreamChatError::Config(
                "chat.session_page_size must be between 1 and 50".to_string(),
            )
            .into());
        }

        if !(1..=100).contains(&self.chat.message_page_size) {
            return Err(StreamChatError::Config(
                "chat.message_page_size must be between 1 and 100".to_string(),
            )
            .into());
        }

        if !(1..=50).contains(&self.chat.search_limit) {
            return Err(StreamChatError::Config(
                "chat.search_limit must be between 1 and 50".to_string(),
            )
            .into());
        }

        if self.chat.command_queue_depth == 0 {
            return Err(StreamChatError::Config(
                "chat.command_queue_depth must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

/// Location of the per-user config file, if the platform has one
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "streamchat")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}

fn apply_numeric_env<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Invalid {}: {}", name, raw),
        }
    }
}
