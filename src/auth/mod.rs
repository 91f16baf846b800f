//! Credential handling for the storefront backend
//!
//! The backend issues bearer tokens out of band; these commands store,
//! clear and report the one the client presents.

pub mod tokens;

use std::path::Path;

use anyhow::{ensure, Result};
use chrono::{TimeZone, Utc};

use crate::config::Config;

pub use tokens::{StoredToken, TokenStore};

/// Store `token` as the bearer token for REST and WebSocket requests.
pub async fn login(config_path: Option<&Path>, token: &str, expires_in: Option<u64>) -> Result<()> {
    let token = token.trim();
    ensure!(!token.is_empty(), "Token must not be empty");

    let mut config = Config::load(config_path)?;
    config.set_access_token(token.to_string(), expires_in);
    config.save()?;

    tracing::debug!("Stored access token (expires_in={:?})", expires_in);
    println!("Login successful.");
    Ok(())
}

/// Log out and clear cached credentials
pub async fn logout(config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load(config_path)?;
    config.clear_tokens();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Show current authentication status
pub async fn status(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    match config.get_access_token() {
        Some(token) if !token.is_expired() => {
            println!("Access token: valid");
            if let Some(exp) = token.expires_at.and_then(|t| Utc.timestamp_opt(t, 0).single()) {
                println!("  expires_at: {}", exp.to_rfc3339());
            }
        }
        Some(_) => println!("Access token: expired"),
        None => println!("Access token: none"),
    }

    match config.user {
        Some(ref user) => println!("Shopper:      {} (#{})", user.name, user.id),
        None => println!("Shopper:      not configured"),
    }
    println!("Admin:        {} (#{})", config.admin.name, config.admin.id);
    println!("API:          {}", config.api_base);
    println!("WebSocket:    {}", config.ws_url);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("storefront-chat-auth-{}", uuid::Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn test_login_then_logout() {
        let path = temp_config();

        tokio_test::block_on(login(Some(path.as_path()), "  jwt-token \n", Some(3600))).unwrap();
        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.bearer_token().as_deref(), Some("jwt-token"));

        tokio_test::block_on(logout(Some(path.as_path()))).unwrap();
        let config = Config::load(Some(path.as_path())).unwrap();
        assert!(config.get_access_token().is_none());

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).unwrap();
        }
    }

    #[test]
    fn test_login_rejects_blank_token() {
        let path = temp_config();
        assert!(tokio_test::block_on(login(Some(path.as_path()), "   ", None)).is_err());
        assert!(!path.exists());
    }
}
