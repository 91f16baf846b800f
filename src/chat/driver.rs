//! Async driver: runs a [`ChatSession`] against the live STOMP socket and
//! the REST API.
//!
//! One tokio task owns the session and the socket. Front ends talk to it
//! through a [`SessionHandle`]: commands go in over an mpsc channel and
//! [`SessionEvent`]s come back. Effects the session returns are executed in
//! order. REST calls and connect attempts run as child tasks whose results
//! re-enter the session as events, so nothing blocks the loop.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Interval, MissedTickBehavior, Sleep};

use super::composer::SendRejection;
use super::session::{ChatSession, Effect, SessionView, Surface};
use crate::api::{chat as chat_api, ChatApi};
use crate::models::{ChatMessage, ChatUserSummary, ParticipantId};
use crate::stomp::{Command, ConnectOptions, Frame, StompSocket};

/// Requests from a front end.
#[derive(Debug)]
enum Request {
    Send(String),
    Select(ParticipantId),
    Close,
}

/// Notifications to a front end.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// State after the latest change.
    Snapshot(SessionView),
    /// A new inbound message for this surface.
    Message(ChatMessage),
    /// A submitted draft was accepted and is being published.
    Sent(ChatMessage),
    /// A submitted draft was refused; nothing was sent.
    Rejected(SendRejection),
    /// The session has torn down. No further events follow.
    Closed,
}

/// Results of child tasks.
enum Completion {
    Connected(Result<StompSocket>),
    History {
        epoch: u64,
        result: Result<Vec<ChatMessage>>,
    },
    MarkRead {
        counterparty: ParticipantId,
        result: Result<()>,
    },
    ChatUsers(Result<Vec<ChatUserSummary>>),
}

/// Handle to a running chat session.
///
/// Dropping the handle closes the session.
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<Request>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Start `session` on a background task.
    pub fn spawn<S>(session: ChatSession<S>, api: ChatApi, opts: ConnectOptions) -> Self
    where
        S: Surface + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, events) = mpsc::unbounded_channel();

        let driver = Driver {
            session,
            api,
            opts,
            commands: cmd_rx,
            events: evt_tx,
            socket: None,
            connected_at: None,
            heartbeat: None,
            reconnect: None,
            tasks: JoinSet::new(),
            finished: false,
        };
        let task = tokio::spawn(driver.run());

        Self {
            cmd_tx,
            events,
            task,
        }
    }

    /// Submit a draft. The outcome arrives as `Sent` or `Rejected`.
    pub fn send(&self, text: impl Into<String>) {
        self.command(Request::Send(text.into()));
    }

    /// Switch the visible conversation (admin surface).
    pub fn select(&self, counterparty: ParticipantId) {
        self.command(Request::Select(counterparty));
    }

    /// Next event, or `None` once the session task is gone.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Close the session and wait for teardown to finish.
    pub async fn close(self) -> Result<()> {
        self.command(Request::Close);
        self.task.await.context("Chat session task failed")
    }

    fn command(&self, cmd: Request) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::debug!("Chat session already stopped -- command dropped");
        }
    }
}

struct Driver<S: Surface> {
    session: ChatSession<S>,
    api: ChatApi,
    opts: ConnectOptions,
    commands: mpsc::UnboundedReceiver<Request>,
    events: mpsc::UnboundedSender<SessionEvent>,
    socket: Option<StompSocket>,
    connected_at: Option<Instant>,
    heartbeat: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
    tasks: JoinSet<Completion>,
    finished: bool,
}

impl<S: Surface> Driver<S> {
    async fn run(mut self) {
        let effects = self.session.start();
        self.apply(effects).await;
        self.snapshot();

        while !self.finished {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let effects = self.on_command(cmd.unwrap_or(Request::Close));
                    self.apply(effects).await;
                }
                Some(joined) = self.tasks.join_next() => {
                    match joined {
                        Ok(completion) => {
                            let effects = self.on_completion(completion).await;
                            self.apply(effects).await;
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => tracing::error!("Chat background task failed: {}", e),
                    }
                }
                frame = next_frame(&mut self.socket) => {
                    let effects = self.on_socket(frame);
                    self.apply(effects).await;
                }
                _ = next_tick(&mut self.heartbeat) => {
                    let effects = self.on_heartbeat().await;
                    self.apply(effects).await;
                }
                _ = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    let effects = self.session.on_reconnect_due();
                    self.apply(effects).await;
                }
            }
            self.snapshot();
        }

        self.emit(SessionEvent::Closed);
    }

    fn on_command(&mut self, cmd: Request) -> Vec<Effect> {
        match cmd {
            Request::Send(text) => {
                let (result, effects) = self.session.submit(&text);
                match result {
                    Ok(msg) => self.emit(SessionEvent::Sent(msg)),
                    Err(rejection) => self.emit(SessionEvent::Rejected(rejection)),
                }
                effects
            }
            Request::Select(counterparty) => self.session.select(counterparty),
            Request::Close => self.session.close(),
        }
    }

    async fn on_completion(&mut self, completion: Completion) -> Vec<Effect> {
        match completion {
            Completion::Connected(Ok(socket)) => {
                if self.session.is_closed() {
                    if let Err(e) = socket.disconnect().await {
                        tracing::debug!("Disconnect after close failed: {:#}", e);
                    }
                    return Vec::new();
                }
                self.heartbeat = socket.heartbeat_interval().map(|every| {
                    let mut iv = time::interval_at(time::Instant::now() + every, every);
                    iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    iv
                });
                self.socket = Some(socket);
                self.connected_at = Some(Instant::now());
                self.session.on_connected()
            }
            Completion::Connected(Err(e)) => {
                self.session.on_connection_lost(None, &format!("{:#}", e))
            }
            Completion::History { epoch, result } => self.session.on_history(epoch, result),
            Completion::MarkRead {
                counterparty,
                result,
            } => {
                self.session.on_mark_read(counterparty, result);
                Vec::new()
            }
            Completion::ChatUsers(result) => {
                self.session.on_chat_users(result);
                Vec::new()
            }
        }
    }

    fn on_socket(&mut self, frame: Result<Option<Frame>>) -> Vec<Effect> {
        match frame {
            Ok(Some(frame)) => match frame.command {
                Command::Message => self.session.on_frame(&frame.body),
                other => {
                    tracing::debug!("Ignoring STOMP {} frame", other);
                    Vec::new()
                }
            },
            Ok(None) => self.lost("WebSocket closed by server"),
            Err(e) => self.lost(&format!("{:#}", e)),
        }
    }

    async fn on_heartbeat(&mut self) -> Vec<Effect> {
        let Some(socket) = self.socket.as_mut() else {
            return Vec::new();
        };
        if socket.is_stale() {
            return self.lost("no heartbeat from server");
        }
        match socket.send_heartbeat().await {
            Ok(()) => Vec::new(),
            Err(e) => self.lost(&format!("{:#}", e)),
        }
    }

    /// Drop the live connection and let the session decide what follows.
    fn lost(&mut self, reason: &str) -> Vec<Effect> {
        let uptime = self.drop_socket();
        self.session.on_connection_lost(uptime, reason)
    }

    fn drop_socket(&mut self) -> Option<Duration> {
        self.socket = None;
        self.heartbeat = None;
        self.connected_at.take().map(|at| at.elapsed())
    }

    /// Execute effects in order, including any they trigger.
    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            queue.extend(self.execute(effect).await);
        }
    }

    async fn execute(&mut self, effect: Effect) -> Vec<Effect> {
        match effect {
            Effect::Connect => {
                let opts = self.opts.clone();
                self.tasks.spawn(async move {
                    Completion::Connected(StompSocket::connect(&opts).await)
                });
                Vec::new()
            }
            Effect::Subscribe(destinations) => {
                let Some(socket) = self.socket.as_mut() else {
                    return Vec::new();
                };
                for destination in &destinations {
                    if let Err(e) = socket.subscribe(destination).await {
                        return self.lost(&format!("{:#}", e));
                    }
                }
                tracing::info!("Subscribed to {} destinations", destinations.len());
                Vec::new()
            }
            Effect::Publish {
                destination,
                message,
                correlation_id,
            } => {
                let result = match self.socket.as_mut() {
                    Some(socket) => match serde_json::to_value(&message) {
                        Ok(body) => socket.send_json(&destination, &body).await,
                        Err(e) => Err(e.into()),
                    },
                    None => Err(anyhow::anyhow!("not connected")),
                };
                match result {
                    Ok(()) => {
                        tracing::debug!("Published message {}", correlation_id);
                        Vec::new()
                    }
                    Err(e) => {
                        let uptime = self.drop_socket();
                        self.session
                            .on_publish_failed(&correlation_id, uptime, &format!("{:#}", e))
                    }
                }
            }
            Effect::FetchHistory {
                user_id,
                admin_id,
                epoch,
            } => {
                let api = self.api.clone();
                self.tasks.spawn(async move {
                    let result = chat_api::history(&api, user_id, admin_id).await;
                    Completion::History { epoch, result }
                });
                Vec::new()
            }
            Effect::MarkRead {
                reader,
                counterparty,
            } => {
                let api = self.api.clone();
                self.tasks.spawn(async move {
                    let result = chat_api::mark_read(&api, reader, counterparty).await;
                    Completion::MarkRead {
                        counterparty,
                        result,
                    }
                });
                Vec::new()
            }
            Effect::FetchChatUsers { admin_id } => {
                let api = self.api.clone();
                self.tasks.spawn(async move {
                    Completion::ChatUsers(chat_api::chat_user_summaries(&api, admin_id).await)
                });
                Vec::new()
            }
            Effect::Notify(msg) => {
                self.emit(SessionEvent::Message(msg));
                Vec::new()
            }
            Effect::ScheduleReconnect(delay) => {
                self.drop_socket();
                self.reconnect = Some(Box::pin(time::sleep(delay)));
                Vec::new()
            }
            Effect::Teardown => {
                self.teardown().await;
                Vec::new()
            }
        }
    }

    async fn teardown(&mut self) {
        self.tasks.abort_all();
        self.reconnect = None;
        self.heartbeat = None;
        self.connected_at = None;
        if let Some(socket) = self.socket.take() {
            match socket.disconnect().await {
                Ok(()) => tracing::info!("Chat connection closed"),
                Err(e) => tracing::debug!("Disconnect failed: {:#}", e),
            }
        }
        self.finished = true;
    }

    fn snapshot(&self) {
        if !self.finished {
            self.emit(SessionEvent::Snapshot(self.session.view()));
        }
    }

    fn emit(&self, event: SessionEvent) {
        // A front end that stopped listening is not an error.
        let _ = self.events.send(event);
    }
}

/// Next frame from the socket, or pending forever while disconnected.
async fn next_frame(socket: &mut Option<StompSocket>) -> Result<Option<Frame>> {
    match socket {
        Some(s) => s.recv_frame().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn reconnect_due(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(s) => s.as_mut().await,
        None => std::future::pending().await,
    }
}
