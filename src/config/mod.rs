//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{StoredToken, TokenStore};
use crate::chat::{Destinations, ReconnectPolicy};
use crate::models::Participant;

const DEFAULT_API_BASE: &str = "http://localhost:8080/api";
const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws/websocket";

/// Application configuration
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST API base URL (history, mark-read, chat users)
    pub api_base: String,
    /// STOMP WebSocket endpoint
    pub ws_url: String,
    /// Heartbeat interval in milliseconds, both directions
    pub heartbeat_ms: u64,
    /// The fixed admin identity every shopper talks to
    pub admin: Participant,
    /// Shopper identity used by the user surface
    pub user: Option<Participant>,
    pub reconnect: ReconnectPolicy,
    pub destinations: Destinations,
    /// Stored bearer token for the storefront backend
    pub access_token: Option<StoredToken>,

    /// Where this config was loaded from.
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            heartbeat_ms: 4000,
            admin: Participant::new(1, "Admin"),
            user: None,
            reconnect: ReconnectPolicy::default(),
            destinations: Destinations::default(),
            access_token: None,
            path: None,
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "storefront-chat", "storefront-chat")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, or the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Self::default()
        };
        config.path = Some(path);
        Ok(config)
    }

    /// Parse TOML content; absent keys take their defaults.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration back to where it was loaded from.
    pub fn save(&self) -> Result<()> {
        let path = match self.path {
            Some(ref p) => p.clone(),
            None => Self::default_path()?,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// The bearer token, unless missing or expired.
    pub fn bearer_token(&self) -> Option<String> {
        self.get_access_token()
            .filter(|t| !t.is_expired())
            .map(|t| t.token)
    }

    /// Shopper identity, required by the user surface.
    pub fn user_identity(&self) -> Result<Participant> {
        self.user
            .clone()
            .context("No shopper identity configured. Set [user] id/name in the config file.")
    }
}

impl TokenStore for Config {
    fn get_access_token(&self) -> Option<StoredToken> {
        self.access_token.clone()
    }

    fn set_access_token(&mut self, token: String, expires_in: Option<u64>) {
        self.access_token = Some(StoredToken::new(token, expires_in));
    }

    fn clear_tokens(&mut self) {
        self.access_token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.admin.id, 1);
        assert_eq!(config.heartbeat(), Duration::from_secs(4));
        assert_eq!(config.reconnect, ReconnectPolicy::Fixed { delay_secs: 5 });
        assert!(config.user_identity().is_err());
        assert!(config.bearer_token().is_none());
    }

    #[test]
    fn test_partial_config() {
        let config = Config::parse(
            r#"
            ws_url = "wss://shop.example.com/ws/websocket"

            [user]
            id = 9
            name = "Ana"

            [reconnect]
            policy = "exponential"
            initial_secs = 1
            max_delay_secs = 64

            [destinations]
            send = "/app/chat"
            "#,
        )
        .unwrap();
        assert_eq!(config.ws_url, "wss://shop.example.com/ws/websocket");
        assert_eq!(config.user_identity().unwrap(), Participant::new(9, "Ana"));
        assert_eq!(
            config.reconnect,
            ReconnectPolicy::Exponential {
                initial_secs: 1,
                max_delay_secs: 64
            }
        );
        assert_eq!(config.destinations.send, "/app/chat");
        assert_eq!(config.destinations.broadcast, "/topic/public");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("storefront-chat-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let mut config = Config::load(Some(path.as_path())).unwrap();
        config.set_access_token("jwt".into(), Some(3600));
        config.save().unwrap();

        let reloaded = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(reloaded.bearer_token().as_deref(), Some("jwt"));

        fs::remove_dir_all(&dir).unwrap();
    }
}
