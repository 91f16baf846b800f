//! Chat session state machine shared by the shopper and admin surfaces.
//!
//! A [`ChatSession`] never performs I/O. Every event handler mutates state to
//! completion and returns the [`Effect`]s the driver must carry out. Results
//! of those effects come back in as further events. The two surfaces differ
//! only in their [`Surface`] implementation.

use std::time::Duration;

use chrono::Utc;

use super::composer::{OutboundComposer, SendRejection, SendResult};
use super::connection::{ConnectionManager, ConnectionState, ReconnectPolicy};
use super::selector::{Conversation, ConversationSelector};
use super::store::{InsertOutcome, MessageStore};
use super::subscriber::{self, Destinations};
use crate::models::{ChatMessage, ChatUserSummary, Participant, ParticipantId, WireMessage};

/// Work the driver must perform on behalf of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open the transport.
    Connect,
    /// Subscribe to every listed destination on the live connection.
    Subscribe(Vec<String>),
    /// Publish a message; report failure back with its correlation id.
    Publish {
        destination: String,
        message: WireMessage,
        correlation_id: String,
    },
    /// Load a conversation's history, tagged with the selection epoch.
    FetchHistory {
        user_id: ParticipantId,
        admin_id: ParticipantId,
        epoch: u64,
    },
    /// Tell the backend `reader` has read `counterparty`'s messages.
    MarkRead {
        reader: ParticipantId,
        counterparty: ParticipantId,
    },
    /// Load the admin's chat-user list.
    FetchChatUsers { admin_id: ParticipantId },
    /// A new message arrived for this surface; front ends may announce it.
    Notify(ChatMessage),
    /// Call `on_reconnect_due` after the delay.
    ScheduleReconnect(Duration),
    /// Unsubscribe, disconnect and stop.
    Teardown,
}

/// Where an inbound message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Into the visible message store, optionally followed by a mark-read.
    Display { mark_read: bool },
    /// Ours, but for a conversation that is not on screen.
    Background,
    /// Not for this surface.
    Discard,
}

/// What distinguishes the shopper's chat from the admin's.
pub trait Surface {
    /// Short label for logs.
    fn label(&self) -> &'static str;

    /// Destinations to subscribe after every connect.
    fn destinations(&self, me: ParticipantId, routes: &Destinations) -> Vec<String>;

    /// The participant outgoing messages go to, if one is resolved.
    fn resolve_counterparty(&self) -> Option<Participant>;

    /// Classify an inbound message, updating any surface bookkeeping.
    fn on_inbound(&mut self, me: ParticipantId, msg: &ChatMessage) -> Routing;

    /// `(user_id, admin_id)` key of the history endpoint.
    fn history_key(
        &self,
        me: ParticipantId,
        counterparty: ParticipantId,
    ) -> (ParticipantId, ParticipantId);

    /// The server confirmed `counterparty`'s messages are read.
    fn on_read_confirmed(&mut self, _counterparty: ParticipantId) {}

    /// Change the active conversation. Returns false if the surface has a
    /// fixed counterparty.
    fn select(&mut self, _counterparty: ParticipantId) -> bool {
        false
    }

    /// Whether the chat-user list is loaded on connect.
    fn wants_user_list(&self) -> bool {
        false
    }

    fn on_users(&mut self, _users: Vec<ChatUserSummary>) {}

    /// Conversation list in display order.
    fn conversations(&self) -> Vec<Conversation> {
        Vec::new()
    }
}

/// Shopper side: one fixed counterparty, the admin.
#[derive(Debug)]
pub struct UserSurface {
    admin: Participant,
}

impl UserSurface {
    pub fn new(admin: Participant) -> Self {
        Self { admin }
    }
}

impl Surface for UserSurface {
    fn label(&self) -> &'static str {
        "user"
    }

    fn destinations(&self, me: ParticipantId, routes: &Destinations) -> Vec<String> {
        routes.for_user(me, self.admin.id)
    }

    fn resolve_counterparty(&self) -> Option<Participant> {
        Some(self.admin.clone())
    }

    fn on_inbound(&mut self, me: ParticipantId, msg: &ChatMessage) -> Routing {
        if !subscriber::is_relevant(msg, me, self.admin.id) {
            return Routing::Discard;
        }
        Routing::Display {
            mark_read: msg.sender_id == self.admin.id && !msg.is_read,
        }
    }

    fn history_key(
        &self,
        me: ParticipantId,
        counterparty: ParticipantId,
    ) -> (ParticipantId, ParticipantId) {
        (me, counterparty)
    }
}

/// Admin side: many counterparties, one selected at a time.
#[derive(Debug)]
pub struct AdminSurface {
    selector: ConversationSelector,
}

impl AdminSurface {
    pub fn new(admin_id: ParticipantId) -> Self {
        Self {
            selector: ConversationSelector::new(admin_id),
        }
    }

    pub fn selector(&self) -> &ConversationSelector {
        &self.selector
    }
}

impl Surface for AdminSurface {
    fn label(&self) -> &'static str {
        "admin"
    }

    fn destinations(&self, me: ParticipantId, routes: &Destinations) -> Vec<String> {
        routes.for_admin(me)
    }

    fn resolve_counterparty(&self) -> Option<Participant> {
        self.selector
            .active_conversation()
            .map(|c| Participant::new(c.counterparty_id, c.counterparty_name.clone()))
    }

    fn on_inbound(&mut self, _me: ParticipantId, msg: &ChatMessage) -> Routing {
        match self.selector.observe(msg) {
            Some(obs) if obs.is_active => Routing::Display {
                mark_read: msg.sender_id == obs.counterparty && !msg.is_read,
            },
            Some(_) => Routing::Background,
            None => Routing::Discard,
        }
    }

    fn history_key(
        &self,
        me: ParticipantId,
        counterparty: ParticipantId,
    ) -> (ParticipantId, ParticipantId) {
        (counterparty, me)
    }

    fn on_read_confirmed(&mut self, counterparty: ParticipantId) {
        self.selector.read_confirmed(counterparty);
    }

    fn select(&mut self, counterparty: ParticipantId) -> bool {
        self.selector.select(counterparty);
        true
    }

    fn wants_user_list(&self) -> bool {
        true
    }

    fn on_users(&mut self, users: Vec<ChatUserSummary>) {
        for summary in &users {
            self.selector
                .upsert_user(&summary.user, summary.last_message.as_ref(), summary.unread);
        }
    }

    fn conversations(&self) -> Vec<Conversation> {
        self.selector.ordered().into_iter().cloned().collect()
    }
}

/// Read-only snapshot handed to front ends after every event.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub state: ConnectionState,
    pub me: Participant,
    pub counterparty: Option<Participant>,
    pub messages: Vec<ChatMessage>,
    pub conversations: Vec<Conversation>,
}

/// One chat surface's complete in-memory state.
#[derive(Debug)]
pub struct ChatSession<S: Surface> {
    me: Participant,
    surface: S,
    routes: Destinations,
    connection: ConnectionManager,
    store: MessageStore,
    composer: OutboundComposer,
    /// Bumped whenever a history fetch is issued; older results are stale.
    epoch: u64,
}

impl<S: Surface> ChatSession<S> {
    pub fn new(me: Participant, surface: S, routes: Destinations, policy: ReconnectPolicy) -> Self {
        let composer = OutboundComposer::new(routes.send.clone());
        Self {
            me,
            surface,
            routes,
            connection: ConnectionManager::new(policy),
            store: MessageStore::new(),
            composer,
            epoch: 0,
        }
    }

    pub fn me(&self) -> &Participant {
        &self.me
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn counterparty(&self) -> Option<Participant> {
        self.surface.resolve_counterparty()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.state(),
            me: self.me.clone(),
            counterparty: self.counterparty(),
            messages: self.store.messages().to_vec(),
            conversations: self.surface.conversations(),
        }
    }

    /// Open the chat surface.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.connection.begin_connect() {
            tracing::info!("{} chat connecting", self.surface.label());
            vec![Effect::Connect]
        } else {
            Vec::new()
        }
    }

    /// The transport is up: resubscribe and reload what may have been missed.
    pub fn on_connected(&mut self) -> Vec<Effect> {
        if self.is_closed() {
            return Vec::new();
        }
        self.connection.connected();
        tracing::info!("{} chat connected", self.surface.label());

        let mut effects = vec![Effect::Subscribe(
            self.surface.destinations(self.me.id, &self.routes),
        )];
        if self.surface.wants_user_list() {
            effects.push(Effect::FetchChatUsers {
                admin_id: self.me.id,
            });
        }
        effects.extend(self.history_effect());
        effects
    }

    /// A connect attempt failed or the live connection dropped.
    pub fn on_connection_lost(&mut self, uptime: Option<Duration>, reason: &str) -> Vec<Effect> {
        match self.connection.connection_lost(uptime) {
            Some(delay) => {
                tracing::warn!(
                    "{} chat disconnected: {}. Reconnecting in {}s...",
                    self.surface.label(),
                    reason,
                    delay.as_secs()
                );
                vec![Effect::ScheduleReconnect(delay)]
            }
            None => Vec::new(),
        }
    }

    pub fn on_reconnect_due(&mut self) -> Vec<Effect> {
        self.start()
    }

    /// Intake for every inbound MESSAGE frame body.
    pub fn on_frame(&mut self, body: &str) -> Vec<Effect> {
        if self.is_closed() {
            return Vec::new();
        }
        let msg = match subscriber::parse_inbound(body) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Discarding malformed chat frame: {}", e);
                return Vec::new();
            }
        };

        match self.surface.on_inbound(self.me.id, &msg) {
            Routing::Discard => {
                tracing::debug!(
                    "Frame {}->{} not for this surface",
                    msg.sender_id,
                    msg.receiver_id
                );
                Vec::new()
            }
            Routing::Background => vec![Effect::Notify(msg)],
            Routing::Display { mark_read } => {
                let counterparty = msg.other_party(self.me.id);
                let mut effects = Vec::new();
                match self.store.insert_if_new(msg.clone()) {
                    InsertOutcome::Inserted => effects.push(Effect::Notify(msg)),
                    InsertOutcome::Merged => {}
                    InsertOutcome::Duplicate => tracing::debug!("Duplicate chat frame ignored"),
                }
                match counterparty {
                    Some(counterparty) if mark_read => effects.push(Effect::MarkRead {
                        reader: self.me.id,
                        counterparty,
                    }),
                    _ => {}
                }
                effects
            }
        }
    }

    /// Send `draft` to the resolved counterparty.
    ///
    /// On success the message is already in the store (pending) and a
    /// publish effect is returned. On rejection nothing changes.
    pub fn submit(&mut self, draft: &str) -> (SendResult, Vec<Effect>) {
        if self.is_closed() {
            return (Err(SendRejection::Closed), Vec::new());
        }
        let counterparty = self.counterparty();
        let msg = match self.composer.compose(
            draft,
            &self.me,
            counterparty.as_ref(),
            self.state(),
            Utc::now(),
        ) {
            Ok(m) => m,
            Err(rejection) => {
                tracing::debug!("Send rejected: {}", rejection);
                return (Err(rejection), Vec::new());
            }
        };

        let correlation_id = msg.correlation_id.clone().unwrap_or_default();
        let effect = Effect::Publish {
            destination: self.composer.destination().to_string(),
            message: WireMessage::from(&msg),
            correlation_id,
        };
        self.store.insert_if_new(msg.clone());
        (Ok(msg), vec![effect])
    }

    /// Publishing a message failed: mark it visibly and treat the connection
    /// as lost.
    pub fn on_publish_failed(
        &mut self,
        correlation_id: &str,
        uptime: Option<Duration>,
        reason: &str,
    ) -> Vec<Effect> {
        if self.is_closed() {
            return Vec::new();
        }
        tracing::warn!("Failed to publish chat message: {}", reason);
        if let Some(msg) = self.store.find_by_correlation_mut(correlation_id) {
            msg.pending = false;
            msg.failed = true;
        }
        self.on_connection_lost(uptime, reason)
    }

    /// History for the conversation selected at `epoch` arrived.
    pub fn on_history(
        &mut self,
        epoch: u64,
        result: anyhow::Result<Vec<ChatMessage>>,
    ) -> Vec<Effect> {
        if self.is_closed() {
            return Vec::new();
        }
        if epoch != self.epoch {
            tracing::debug!("Dropping stale history (epoch {} != {})", epoch, self.epoch);
            return Vec::new();
        }
        let history = match result {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!("Failed to load chat history: {:#}", e);
                return Vec::new();
            }
        };

        tracing::debug!("Loaded {} history messages", history.len());
        self.store.replace_all(history);
        match self.counterparty() {
            Some(cp) => vec![Effect::MarkRead {
                reader: self.me.id,
                counterparty: cp.id,
            }],
            None => Vec::new(),
        }
    }

    /// Result of a mark-read round trip.
    pub fn on_mark_read(&mut self, counterparty: ParticipantId, result: anyhow::Result<()>) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = result {
            tracing::warn!("Failed to mark messages from {} read: {:#}", counterparty, e);
            return;
        }
        if self.counterparty().map(|c| c.id) != Some(counterparty) {
            // Messages that arrived after the switch are still unread.
            tracing::debug!("Ignoring mark-read for {}, no longer selected", counterparty);
            return;
        }
        self.store.mark_read(|m| m.sender_id == counterparty);
        self.surface.on_read_confirmed(counterparty);
    }

    /// The admin's chat-user list arrived.
    pub fn on_chat_users(&mut self, result: anyhow::Result<Vec<ChatUserSummary>>) {
        if self.is_closed() {
            return;
        }
        match result {
            Ok(users) => {
                tracing::debug!("Loaded {} chat users", users.len());
                self.surface.on_users(users);
            }
            Err(e) => tracing::warn!("Failed to load chat users: {:#}", e),
        }
    }

    /// Switch the visible conversation and load its history.
    pub fn select(&mut self, counterparty: ParticipantId) -> Vec<Effect> {
        if self.is_closed() || !self.surface.select(counterparty) {
            return Vec::new();
        }
        tracing::info!("Selected conversation with {}", counterparty);
        self.store.clear();
        self.history_effect().into_iter().collect()
    }

    /// Close the surface. Only the first call produces a teardown.
    pub fn close(&mut self) -> Vec<Effect> {
        if self.connection.close() {
            tracing::info!("{} chat closing", self.surface.label());
            vec![Effect::Teardown]
        } else {
            Vec::new()
        }
    }

    fn history_effect(&mut self) -> Option<Effect> {
        let counterparty = self.counterparty()?;
        self.epoch += 1;
        let (user_id, admin_id) = self.surface.history_key(self.me.id, counterparty.id);
        Some(Effect::FetchHistory {
            user_id,
            admin_id,
            epoch: self.epoch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    const ADMIN: ParticipantId = 1;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn user_session() -> ChatSession<UserSurface> {
        ChatSession::new(
            Participant::new(9, "Ana"),
            UserSurface::new(Participant::new(ADMIN, "Admin")),
            Destinations::default(),
            ReconnectPolicy::default(),
        )
    }

    fn admin_session() -> ChatSession<AdminSurface> {
        ChatSession::new(
            Participant::new(ADMIN, "Admin"),
            AdminSurface::new(ADMIN),
            Destinations::default(),
            ReconnectPolicy::default(),
        )
    }

    fn connect<S: Surface>(session: &mut ChatSession<S>) -> Vec<Effect> {
        assert_eq!(session.start(), vec![Effect::Connect]);
        session.on_connected()
    }

    fn frame(from: ParticipantId, to: ParticipantId, body: &str, id: i64) -> String {
        format!(
            r#"{{"id":{},"senderId":{},"receiverId":{},"senderName":"u{}","receiverName":"u{}",
                "message":"{}","sentAt":"2024-05-01T10:00:{:02}Z","isRead":false}}"#,
            id,
            from,
            to,
            from,
            to,
            body,
            id % 60
        )
    }

    fn history_epoch(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::FetchHistory { epoch, .. } => Some(*epoch),
                _ => None,
            })
            .expect("history fetch")
    }

    #[test]
    fn test_user_connect_subscribes_and_loads_history() {
        let mut s = user_session();
        let effects = connect(&mut s);
        assert_eq!(s.state(), ConnectionState::Connected);
        assert_eq!(
            effects[0],
            Effect::Subscribe(vec![
                "/user/9/queue/messages".into(),
                "/user/1/queue/messages".into(),
                "/topic/public".into(),
            ])
        );
        assert!(matches!(
            effects[1],
            Effect::FetchHistory {
                user_id: 9,
                admin_id: ADMIN,
                ..
            }
        ));
    }

    #[test]
    fn test_optimistic_then_confirmed_convergence() {
        let mut s = user_session();
        connect(&mut s);

        let (result, effects) = s.submit("Hello");
        let sent = result.unwrap();
        let cid = sent.correlation_id.clone().unwrap();
        assert_eq!(s.store().len(), 1);
        assert!(s.store().messages()[0].pending);
        match &effects[..] {
            [Effect::Publish {
                destination,
                message,
                correlation_id,
            }] => {
                assert_eq!(destination, "/app/chat.sendMessage");
                assert_eq!(message.local_id.as_deref(), Some(cid.as_str()));
                assert_eq!(message.sent_at, crate::models::format_timestamp(&sent.sent_at));
                assert_eq!(correlation_id, &cid);
            }
            other => panic!("unexpected effects {:?}", other),
        }

        let echo = format!(
            r#"{{"id":501,"senderId":9,"receiverId":1,"message":"Hello","sentAt":"{}","localId":"{}"}}"#,
            crate::models::format_timestamp(&sent.sent_at),
            cid
        );
        // Delivered twice through overlapping subscriptions.
        assert!(s.on_frame(&echo).is_empty());
        assert!(s.on_frame(&echo).is_empty());

        assert_eq!(s.store().len(), 1);
        let only = &s.store().messages()[0];
        assert_eq!(only.server_id, Some(501));
        assert_eq!(only.correlation_id.as_deref(), Some(cid.as_str()));
        assert_eq!(only.sent_at, sent.sent_at);
        assert!(sent.sent_at >= t0());
        assert!(!only.pending);
        assert_eq!(s.view().counterparty.map(|p| p.id), Some(ADMIN));
    }

    #[test]
    fn test_live_frame_during_history_load_survives() {
        let mut s = user_session();
        let effects = connect(&mut s);
        let epoch = history_epoch(&effects);

        s.on_frame(&frame(ADMIN, 9, "live", 17));
        assert_eq!(s.store().len(), 1);

        let old = vec![ChatMessage::from_json(&frame(ADMIN, 9, "old", 10)).unwrap()];
        s.on_history(epoch, Ok(old));

        let bodies: Vec<&str> = s.store().messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["old", "live"]);
    }

    #[test]
    fn test_user_marks_admin_messages_read() {
        let mut s = user_session();
        connect(&mut s);

        let effects = s.on_frame(&frame(ADMIN, 9, "hi there", 3));
        assert!(matches!(effects[0], Effect::Notify(ref m) if m.body == "hi there"));
        assert_eq!(
            effects[1..],
            [Effect::MarkRead {
                reader: 9,
                counterparty: ADMIN
            }]
        );
        assert_eq!(s.store().unread_from(ADMIN), 1);
        s.on_mark_read(ADMIN, Ok(()));
        assert_eq!(s.store().unread_from(ADMIN), 0);
    }

    #[test]
    fn test_user_discards_unrelated_frames() {
        let mut s = user_session();
        connect(&mut s);
        assert!(s.on_frame(&frame(5, ADMIN, "other shopper", 1)).is_empty());
        assert!(s.on_frame(&frame(ADMIN, 5, "to other shopper", 2)).is_empty());
        assert!(s.on_frame("not json at all").is_empty());
        assert!(s.store().is_empty());
    }

    #[test]
    fn test_send_rejected_while_reconnecting() {
        let mut s = user_session();
        connect(&mut s);
        let effects = s.on_connection_lost(None, "socket closed");
        assert_eq!(
            effects,
            vec![Effect::ScheduleReconnect(Duration::from_secs(5))]
        );

        let (result, effects) = s.submit("hello?");
        assert_eq!(
            result,
            Err(SendRejection::NotConnected(ConnectionState::Reconnecting))
        );
        assert!(effects.is_empty());
        assert!(s.store().is_empty());
    }

    #[test]
    fn test_reconnect_resubscribes_and_reloads_history() {
        let mut s = user_session();
        let first = connect(&mut s);
        let first_epoch = history_epoch(&first);
        s.on_history(first_epoch, Ok(Vec::new()));

        s.on_connection_lost(Some(Duration::from_secs(3)), "heartbeat timeout");
        assert_eq!(s.on_reconnect_due(), vec![Effect::Connect]);
        let second = s.on_connected();

        assert_eq!(second[0], first[0]);
        let second_epoch = history_epoch(&second);
        assert!(second_epoch > first_epoch);

        // A message delivered only while down comes back with the history.
        let missed = ChatMessage::from_json(&frame(ADMIN, 9, "while you were away", 7)).unwrap();
        let effects = s.on_history(second_epoch, Ok(vec![missed]));
        assert_eq!(s.store().len(), 1);
        assert_eq!(s.store().messages()[0].body, "while you were away");
        assert!(matches!(effects[..], [Effect::MarkRead { .. }]));
    }

    #[test]
    fn test_publish_failure_marks_message() {
        let mut s = user_session();
        connect(&mut s);
        let (result, _) = s.submit("Hello");
        let cid = result.unwrap().correlation_id.unwrap();

        let effects = s.on_publish_failed(&cid, None, "broken pipe");
        assert!(matches!(effects[..], [Effect::ScheduleReconnect(_)]));
        let msg = &s.store().messages()[0];
        assert!(msg.failed);
        assert!(!msg.pending);
        assert_eq!(s.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn test_admin_unread_accounting() {
        const A: ParticipantId = 10;
        const B: ParticipantId = 20;
        let mut s = admin_session();
        let effects = connect(&mut s);
        assert!(effects.contains(&Effect::FetchChatUsers { admin_id: ADMIN }));

        let select = s.select(B);
        assert!(matches!(
            select[..],
            [Effect::FetchHistory {
                user_id: B,
                admin_id: ADMIN,
                ..
            }]
        ));

        for i in 0..3 {
            let effects = s.on_frame(&frame(A, ADMIN, "from a", 10 + i));
            assert!(matches!(effects[..], [Effect::Notify(_)]));
        }
        let effects = s.on_frame(&frame(B, ADMIN, "from b", 20));
        assert_eq!(effects.len(), 2);
        assert_eq!(
            effects[1],
            Effect::MarkRead {
                reader: ADMIN,
                counterparty: B
            }
        );

        let sel = s.surface().selector();
        assert_eq!(sel.get(A).unwrap().unread_count, 3);
        assert_eq!(sel.get(B).unwrap().unread_count, 0);
        // Only the active conversation reaches the store.
        assert_eq!(s.store().len(), 1);
        assert_eq!(s.store().messages()[0].body, "from b");
    }

    #[test]
    fn test_admin_stale_history_discarded() {
        const A: ParticipantId = 10;
        const B: ParticipantId = 20;
        let mut s = admin_session();
        connect(&mut s);

        let epoch_a = history_epoch(&s.select(A));
        let epoch_b = history_epoch(&s.select(B));

        let a_history = vec![ChatMessage::from_json(&frame(A, ADMIN, "old a", 1)).unwrap()];
        assert!(s.on_history(epoch_a, Ok(a_history)).is_empty());
        assert!(s.store().is_empty());

        let b_history = vec![ChatMessage::from_json(&frame(B, ADMIN, "b", 2)).unwrap()];
        let effects = s.on_history(epoch_b, Ok(b_history));
        assert_eq!(s.store().messages()[0].body, "b");
        assert_eq!(
            effects,
            vec![Effect::MarkRead {
                reader: ADMIN,
                counterparty: B
            }]
        );
    }

    #[test]
    fn test_admin_select_resets_unread_after_mark_read() {
        const A: ParticipantId = 10;
        let mut s = admin_session();
        connect(&mut s);
        s.on_frame(&frame(A, ADMIN, "1", 1));
        s.on_frame(&frame(A, ADMIN, "2", 2));

        let epoch = history_epoch(&s.select(A));
        assert_eq!(s.surface().selector().get(A).unwrap().unread_count, 2);

        s.on_mark_read(A, Err(anyhow::anyhow!("HTTP 500")));
        assert_eq!(s.surface().selector().get(A).unwrap().unread_count, 2);

        let history = vec![
            ChatMessage::from_json(&frame(A, ADMIN, "1", 1)).unwrap(),
            ChatMessage::from_json(&frame(A, ADMIN, "2", 2)).unwrap(),
        ];
        s.on_history(epoch, Ok(history));
        s.on_mark_read(A, Ok(()));
        assert_eq!(s.surface().selector().get(A).unwrap().unread_count, 0);
        assert_eq!(s.store().unread_from(A), 0);
    }

    #[test]
    fn test_admin_send_requires_selection() {
        let mut s = admin_session();
        connect(&mut s);
        let (result, effects) = s.submit("hello");
        assert_eq!(result, Err(SendRejection::NoCounterparty));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_close_is_idempotent_and_silences_events() {
        let mut s = user_session();
        let effects = connect(&mut s);
        let epoch = history_epoch(&effects);

        assert_eq!(s.close(), vec![Effect::Teardown]);
        assert!(s.close().is_empty());

        assert!(s.on_frame(&frame(ADMIN, 9, "late", 1)).is_empty());
        let late = vec![ChatMessage::from_json(&frame(ADMIN, 9, "late", 1)).unwrap()];
        assert!(s.on_history(epoch, Ok(late)).is_empty());
        assert!(s.on_connection_lost(None, "closed").is_empty());
        assert!(s.on_connected().is_empty());
        assert!(s.store().is_empty());
        assert_eq!(s.submit("hi").0, Err(SendRejection::Closed));
    }

    #[test]
    fn test_late_mark_read_keeps_newer_unread() {
        const A: ParticipantId = 10;
        const B: ParticipantId = 20;
        let mut s = admin_session();
        connect(&mut s);

        let epoch = history_epoch(&s.select(A));
        let effects = s.on_history(epoch, Ok(Vec::new()));
        assert_eq!(
            effects,
            vec![Effect::MarkRead {
                reader: ADMIN,
                counterparty: A
            }]
        );

        s.select(B);
        s.on_frame(&frame(A, ADMIN, "are you there?", 30));
        s.on_frame(&frame(A, ADMIN, "hello?", 31));
        assert_eq!(s.surface().selector().get(A).unwrap().unread_count, 2);

        // A's request completes after the switch.
        s.on_mark_read(A, Ok(()));
        assert_eq!(s.surface().selector().get(A).unwrap().unread_count, 2);
    }
}
