//! STOMP session over a WebSocket connection.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::frame::{Command, Frame, Incoming, StompError};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// How long to wait for CONNECTED after sending CONNECT.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters for opening a STOMP session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub url: String,
    /// Bearer token sent on the upgrade request and in CONNECT.
    pub token: Option<String>,
    /// Desired heartbeat interval in both directions.
    pub heartbeat: Duration,
}

/// A live STOMP session with its subscriptions.
pub struct StompSocket {
    stream: WsStream,
    /// `(subscription id, destination)` of every active subscription.
    subscriptions: Vec<(String, String)>,
    next_subscription: u64,
    /// Negotiated outgoing heartbeat, `None` if disabled.
    send_heartbeat: Option<Duration>,
    /// Negotiated incoming heartbeat, `None` if disabled.
    recv_heartbeat: Option<Duration>,
    last_inbound: Instant,
}

impl StompSocket {
    /// Open the WebSocket and complete the CONNECT/CONNECTED handshake.
    pub async fn connect(opts: &ConnectOptions) -> Result<Self> {
        let mut request = opts
            .url
            .as_str()
            .into_client_request()
            .with_context(|| format!("Invalid WebSocket URL {}", opts.url))?;
        if let Some(ref token) = opts.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Access token is not a valid header value")?;
            request.headers_mut().insert("Authorization", value);
        }
        let host = request
            .uri()
            .host()
            .map(String::from)
            .unwrap_or_else(|| "localhost".to_string());

        tracing::info!("Connecting WebSocket to {}", opts.url);
        let (stream, response) = connect_async(request)
            .await
            .context("WebSocket connection failed")?;
        tracing::info!("WebSocket connected (status={})", response.status());

        let mut socket = Self {
            stream,
            subscriptions: Vec::new(),
            next_subscription: 0,
            send_heartbeat: None,
            recv_heartbeat: None,
            last_inbound: Instant::now(),
        };

        let hb = opts.heartbeat.as_millis().to_string();
        let mut connect = Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1")
            .header("host", host)
            .header("heart-beat", format!("{},{}", hb, hb));
        if let Some(ref token) = opts.token {
            connect = connect.header("Authorization", format!("Bearer {}", token));
        }
        socket.send_frame(&connect).await?;

        let connected = tokio::time::timeout(CONNECT_TIMEOUT, socket.recv_frame())
            .await
            .context("Timed out waiting for CONNECTED")??
            .context("Connection closed during STOMP handshake")?;

        match connected.command {
            Command::Connected => {
                let (send, recv) =
                    negotiate_heartbeat(opts.heartbeat, connected.get("heart-beat"));
                socket.send_heartbeat = send;
                socket.recv_heartbeat = recv;
                tracing::info!(
                    "STOMP connected (version={}, heartbeat out={:?} in={:?})",
                    connected.get("version").unwrap_or("1.0"),
                    send,
                    recv
                );
                Ok(socket)
            }
            Command::Error => Err(server_error(&connected).into()),
            other => bail!("Expected CONNECTED, got {}", other),
        }
    }

    /// How often to call [`send_heartbeat`](Self::send_heartbeat) and
    /// [`is_stale`](Self::is_stale); `None` when heartbeating is off both ways.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match (self.send_heartbeat, self.recv_heartbeat) {
            (Some(out), Some(inb)) => Some(out.min(inb)),
            (out, inb) => out.or(inb),
        }
    }

    /// Whether the server has been silent past twice its heartbeat interval.
    pub fn is_stale(&self) -> bool {
        self.recv_heartbeat
            .is_some_and(|every| self.last_inbound.elapsed() > every * 2)
    }

    /// Subscribe to `destination`, returning the subscription id.
    pub async fn subscribe(&mut self, destination: &str) -> Result<String> {
        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;
        let frame = Frame::new(Command::Subscribe)
            .header("id", id.clone())
            .header("destination", destination)
            .header("ack", "auto");
        self.send_frame(&frame)
            .await
            .with_context(|| format!("Failed to subscribe to {}", destination))?;
        tracing::debug!("Subscribed {} -> {}", id, destination);
        self.subscriptions.push((id.clone(), destination.to_string()));
        Ok(id)
    }

    /// Publish a JSON body to `destination`.
    pub async fn send_json(&mut self, destination: &str, body: &serde_json::Value) -> Result<()> {
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(body.to_string());
        self.send_frame(&frame)
            .await
            .with_context(|| format!("Failed to publish to {}", destination))
    }

    /// Send an EOL heartbeat, if outgoing heartbeats were negotiated.
    pub async fn send_heartbeat(&mut self) -> Result<()> {
        if self.send_heartbeat.is_none() {
            return Ok(());
        }
        self.stream
            .send(Message::Text("\n".to_string()))
            .await
            .context("Failed to send heartbeat")
    }

    /// Receive the next frame, skipping heartbeats and WebSocket pings.
    ///
    /// Returns `Ok(None)` when the server closes the connection. ERROR frames
    /// are returned as errors.
    pub async fn recv_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.last_inbound = Instant::now();
                    match Frame::decode(&text) {
                        Ok(Incoming::Heartbeat) => {
                            tracing::trace!("STOMP heartbeat from server");
                        }
                        Ok(Incoming::Frame(frame)) if frame.command == Command::Error => {
                            return Err(server_error(&frame).into());
                        }
                        Ok(Incoming::Frame(frame)) => {
                            tracing::debug!("STOMP recv: {}", frame.command);
                            return Ok(Some(frame));
                        }
                        Err(e) => {
                            tracing::warn!("Discarding undecodable STOMP frame: {}", e);
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    self.last_inbound = Instant::now();
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    self.last_inbound = Instant::now();
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }

    /// Unsubscribe everything, send DISCONNECT and close the socket.
    pub async fn disconnect(mut self) -> Result<()> {
        for (id, destination) in std::mem::take(&mut self.subscriptions) {
            let frame = Frame::new(Command::Unsubscribe).header("id", id);
            if let Err(e) = self.send_frame(&frame).await {
                tracing::debug!("Unsubscribe from {} failed: {:#}", destination, e);
            }
        }
        if let Err(e) = self.send_frame(&Frame::new(Command::Disconnect)).await {
            tracing::debug!("DISCONNECT failed: {:#}", e);
        }
        self.stream
            .close(None)
            .await
            .context("Failed to close WebSocket")
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        tracing::debug!("STOMP send: {}", frame.command);
        self.stream
            .send(Message::Text(frame.encode()))
            .await
            .context("Failed to send STOMP frame")
    }
}

fn server_error(frame: &Frame) -> StompError {
    let summary = frame
        .get("message")
        .map(String::from)
        .unwrap_or_else(|| frame.body.trim().to_string());
    StompError::Server(summary)
}

/// Combine our desired heartbeat with the server's `heart-beat` header.
///
/// Per STOMP: outgoing is `max(ours, server's wanted-in)` unless either is 0,
/// incoming is `max(ours, server's sending)` unless either is 0.
pub fn negotiate_heartbeat(
    ours: Duration,
    server_header: Option<&str>,
) -> (Option<Duration>, Option<Duration>) {
    let ours_ms = ours.as_millis() as u64;
    let (sx, sy) = server_header
        .and_then(|h| h.split_once(','))
        .map(|(x, y)| {
            (
                x.trim().parse::<u64>().unwrap_or(0),
                y.trim().parse::<u64>().unwrap_or(0),
            )
        })
        .unwrap_or((0, 0));

    let pick = |a: u64, b: u64| {
        if a == 0 || b == 0 {
            None
        } else {
            Some(Duration::from_millis(a.max(b)))
        }
    };
    (pick(ours_ms, sy), pick(ours_ms, sx))
}
