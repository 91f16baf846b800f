//! One-shot command-line flows on top of a [`SessionHandle`].

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::time;

use super::connection::ConnectionState;
use super::driver::{SessionEvent, SessionHandle};
use super::session::{AdminSurface, ChatSession, UserSurface};
use crate::api::ChatApi;
use crate::config::Config;
use crate::models::ParticipantId;
use crate::stomp::ConnectOptions;

/// How long `send` waits for the connection before giving up.
const CONNECT_WAIT: Duration = Duration::from_secs(15);

/// Start the shopper or admin chat described by `config`.
pub fn open_session(config: &Config, admin: bool) -> Result<SessionHandle> {
    let api = ChatApi::from_config(config);
    let opts = ConnectOptions {
        url: config.ws_url.clone(),
        token: config.bearer_token(),
        heartbeat: config.heartbeat(),
    };

    let handle = if admin {
        let session = ChatSession::new(
            config.admin.clone(),
            AdminSurface::new(config.admin.id),
            config.destinations.clone(),
            config.reconnect,
        );
        SessionHandle::spawn(session, api, opts)
    } else {
        let session = ChatSession::new(
            config.user_identity()?,
            UserSurface::new(config.admin.clone()),
            config.destinations.clone(),
            config.reconnect,
        );
        SessionHandle::spawn(session, api, opts)
    };
    Ok(handle)
}

/// Send one message and wait until it is on the wire.
///
/// With `to`, the message goes out from the admin to that shopper;
/// otherwise from the configured shopper to the admin.
pub async fn send_message(config: &Config, to: Option<ParticipantId>, text: &str) -> Result<()> {
    let mut handle = open_session(config, to.is_some())?;
    let result = deliver(&mut handle, to, text).await;
    handle.close().await?;
    result
}

async fn deliver(handle: &mut SessionHandle, to: Option<ParticipantId>, text: &str) -> Result<()> {
    time::timeout(CONNECT_WAIT, wait_connected(handle))
        .await
        .context("Timed out waiting for the chat connection")??;

    if let Some(id) = to {
        handle.select(id);
    }
    handle.send(text);

    let sent = loop {
        match handle.next_event().await {
            Some(SessionEvent::Sent(msg)) => break msg,
            Some(SessionEvent::Rejected(reason)) => bail!("Message not sent: {}", reason),
            Some(SessionEvent::Closed) | None => bail!("Chat session ended before sending"),
            Some(_) => {}
        }
    };

    // The snapshot after the send reflects whether publishing succeeded.
    while let Some(event) = handle.next_event().await {
        if let SessionEvent::Snapshot(view) = event {
            let failed = view
                .messages
                .iter()
                .any(|m| m.correlation_id == sent.correlation_id && m.failed);
            if failed {
                bail!("Message could not be published");
            }
            if sent.receiver_name.is_empty() {
                println!("Message sent to #{}", sent.receiver_id);
            } else {
                println!("Message sent to {}", sent.receiver_name);
            }
            return Ok(());
        }
    }
    bail!("Chat session ended before sending")
}

async fn wait_connected(handle: &mut SessionHandle) -> Result<()> {
    while let Some(event) = handle.next_event().await {
        match event {
            SessionEvent::Snapshot(view) if view.state == ConnectionState::Connected => {
                return Ok(())
            }
            SessionEvent::Closed => break,
            _ => {}
        }
    }
    bail!("Chat session ended before connecting")
}

/// Print incoming messages until Ctrl-C.
pub async fn listen(config: &Config, admin: bool) -> Result<()> {
    let mut handle = open_session(config, admin)?;
    let mut last_state = None;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = handle.next_event() => match event {
                Some(SessionEvent::Message(msg)) => {
                    let sender = if msg.sender_name.is_empty() {
                        format!("#{}", msg.sender_id)
                    } else {
                        msg.sender_name.clone()
                    };
                    println!("[{}] {}: {}", msg.sent_at.format("%H:%M:%S"), sender, msg.body);
                }
                Some(SessionEvent::Snapshot(view)) => {
                    if last_state != Some(view.state) {
                        tracing::info!("Chat {}", view.state);
                        last_state = Some(view.state);
                    }
                }
                Some(SessionEvent::Closed) | None => break,
                Some(_) => {}
            },
        }
    }

    handle.close().await
}
