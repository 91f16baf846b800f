//! REST API client for the storefront chat backend

pub mod chat;
pub mod client;

use anyhow::Result;

use crate::config::Config;
use crate::models::ParticipantId;

pub use client::ChatApi;

/// Print the admin's conversation list
pub async fn list_users(config: &Config) -> Result<()> {
    chat::print_users(config).await
}

/// Print the history between a shopper and the admin
pub async fn show_history(config: &Config, user_id: ParticipantId) -> Result<()> {
    chat::print_history(config, user_id).await
}
