//! Chat REST endpoints: history, mark-read and the admin's user list.

use anyhow::{Context, Result};
use futures::future::join_all;

use super::client::ChatApi;
use crate::chat::selector::ConversationSelector;
use crate::config::Config;
use crate::models::{ChatMessage, ChatUser, ChatUserSummary, ParticipantId, WireMessage};

/// Full message history between a shopper and the admin, oldest first.
///
/// Entries that fail to convert are skipped rather than failing the load.
pub async fn history(
    api: &ChatApi,
    user_id: ParticipantId,
    admin_id: ParticipantId,
) -> Result<Vec<ChatMessage>> {
    let resp = api
        .get(&format!("/chat/history/{}/{}", user_id, admin_id))
        .await?;
    let wire: Vec<WireMessage> = resp
        .json()
        .await
        .context("Failed to parse chat history response")?;

    let mut messages = Vec::with_capacity(wire.len());
    for entry in wire {
        match entry.into_message() {
            Ok(m) => messages.push(m),
            Err(e) => tracing::warn!("Skipping history entry: {}", e),
        }
    }
    messages.sort_by_key(|m| m.sent_at);
    Ok(messages)
}

/// Mark every message from `counterparty` to `reader` as read.
pub async fn mark_read(
    api: &ChatApi,
    reader: ParticipantId,
    counterparty: ParticipantId,
) -> Result<()> {
    api.post(&format!("/chat/mark-read/{}/{}", reader, counterparty))
        .await?;
    Ok(())
}

/// Users who have chatted with `admin_id`.
pub async fn chat_users(api: &ChatApi, admin_id: ParticipantId) -> Result<Vec<ChatUser>> {
    let resp = api.get(&format!("/chat/users/{}", admin_id)).await?;
    resp.json()
        .await
        .context("Failed to parse chat users response")
}

/// Latest message between the pair, `None` if they never talked.
pub async fn last_message(
    api: &ChatApi,
    user_id: ParticipantId,
    admin_id: ParticipantId,
) -> Result<Option<ChatMessage>> {
    let resp = api
        .get(&format!("/chat/last-message/{}/{}", user_id, admin_id))
        .await?;
    let body = resp
        .text()
        .await
        .context("Failed to read last message response")?;
    parse_optional_message(&body)
}

/// Number of unread messages from `sender_id` to `reader_id`.
pub async fn unread_count(
    api: &ChatApi,
    reader_id: ParticipantId,
    sender_id: ParticipantId,
) -> Result<u32> {
    let resp = api
        .get(&format!("/chat/unread-count/{}/{}", reader_id, sender_id))
        .await?;
    resp.json()
        .await
        .context("Failed to parse unread count response")
}

/// Chat users with their last message and unread count, fetched concurrently.
///
/// A failed per-user lookup leaves that user without a preview or badge.
pub async fn chat_user_summaries(
    api: &ChatApi,
    admin_id: ParticipantId,
) -> Result<Vec<ChatUserSummary>> {
    let users = chat_users(api, admin_id).await?;

    let lookups = users.into_iter().map(|user| async move {
        let (last, unread) = futures::join!(
            last_message(api, user.id, admin_id),
            unread_count(api, admin_id, user.id)
        );
        let last_message = last.unwrap_or_else(|e| {
            tracing::debug!("Last message for user {} unavailable: {:#}", user.id, e);
            None
        });
        let unread = unread.unwrap_or_else(|e| {
            tracing::debug!("Unread count for user {} unavailable: {:#}", user.id, e);
            0
        });
        ChatUserSummary {
            user,
            last_message,
            unread,
        }
    });

    Ok(join_all(lookups).await)
}

fn parse_optional_message(body: &str) -> Result<Option<ChatMessage>> {
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Ok(None);
    }
    ChatMessage::from_json(body)
        .map(Some)
        .context("Failed to parse last message response")
}

// ---------------------------------------------------------------------------
// CLI output
// ---------------------------------------------------------------------------

/// Print the history between `user_id` and the configured admin.
pub async fn print_history(config: &Config, user_id: ParticipantId) -> Result<()> {
    let api = ChatApi::from_config(config);
    let messages = history(&api, user_id, config.admin.id).await?;

    if messages.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    for msg in &messages {
        let sender = if msg.sender_name.is_empty() {
            format!("#{}", msg.sender_id)
        } else {
            msg.sender_name.clone()
        };
        let read = if msg.is_read { "" } else { " *" };
        println!(
            "[{}] {}: {}{}",
            msg.sent_at.format("%Y-%m-%d %H:%M"),
            sender,
            msg.body,
            read
        );
    }

    Ok(())
}

/// Print the admin's conversation list, most recent first.
pub async fn print_users(config: &Config) -> Result<()> {
    let api = ChatApi::from_config(config);
    let summaries = chat_user_summaries(&api, config.admin.id).await?;

    let mut selector = ConversationSelector::new(config.admin.id);
    for summary in &summaries {
        selector.upsert_user(&summary.user, summary.last_message.as_ref(), summary.unread);
    }

    println!("\nConversations:");
    println!("{:-<60}", "");

    if selector.is_empty() {
        println!("  (no conversations)");
        return Ok(());
    }

    for conv in selector.ordered() {
        let badge = if conv.unread_count > 0 {
            format!(" ({} unread)", conv.unread_count)
        } else {
            String::new()
        };
        println!("{}{}", conv.counterparty_name, badge);
        println!("  ID: {}", conv.counterparty_id);
        if let Some(at) = conv.last_message_at {
            println!("  Last: {}", at.format("%Y-%m-%d %H:%M"));
        }
        if let Some(ref preview) = conv.last_message_preview {
            println!("  {}", preview);
        }
        println!();
    }

    Ok(())
}
