//! TUI Application state and main event loop

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::{FutureExt, StreamExt};
use ratatui::DefaultTerminal;

use super::compose::ComposeState;
use super::debug_log::DebugLogState;
use super::log_capture::LogBuffer;
use super::messages::MessagesState;
use super::sidebar::SidebarState;
use super::ui;
use crate::chat::{ConnectionState, SessionEvent, SessionHandle, SessionView};
use crate::models::ParticipantId;

/// Target frame rate for UI updates (~30 fps)
const FRAME_DURATION_MS: u64 = 33;

/// Active pane in the TUI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Sidebar,
    Messages,
    Compose,
}

impl Pane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pane::Sidebar => "sidebar",
            Pane::Messages => "messages",
            Pane::Compose => "compose",
        }
    }

    /// Next pane in Tab order. The sidebar only exists for the admin.
    fn next(self, with_sidebar: bool) -> Self {
        match self {
            Pane::Sidebar => Pane::Messages,
            Pane::Messages => Pane::Compose,
            Pane::Compose if with_sidebar => Pane::Sidebar,
            Pane::Compose => Pane::Messages,
        }
    }
}

/// What a key press asks the session to do.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    None,
    Send(String),
    Select(ParticipantId),
}

/// Application state
pub struct App {
    pub should_exit: bool,
    pub is_admin: bool,
    pub state: ConnectionState,
    pub user_name: String,
    me: Option<ParticipantId>,
    /// Name of whoever a sent message goes to.
    counterparty: Option<String>,
    pub active_pane: Pane,
    pub sidebar: SidebarState,
    pub messages: MessagesState,
    pub compose: ComposeState,
    pub debug_log: DebugLogState,
    pub status_message: Option<String>,
    pub status_is_error: bool,
}

impl App {
    pub fn new(is_admin: bool, log_buffer: LogBuffer) -> Self {
        Self {
            should_exit: false,
            is_admin,
            state: ConnectionState::Disconnected,
            user_name: String::new(),
            me: None,
            counterparty: None,
            active_pane: if is_admin { Pane::Sidebar } else { Pane::Compose },
            sidebar: SidebarState::default(),
            messages: MessagesState::default(),
            compose: ComposeState::default(),
            debug_log: DebugLogState::new(log_buffer),
            status_message: None,
            status_is_error: false,
        }
    }

    pub fn recipient(&self) -> Option<&str> {
        self.counterparty.as_deref()
    }

    fn set_status(&mut self, msg: impl Into<String>, is_error: bool) {
        self.status_message = Some(msg.into());
        self.status_is_error = is_error;
    }

    /// Fold a session event into the view state.
    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Snapshot(view) => self.apply_view(view),
            SessionEvent::Message(msg) => {
                let mine = self.me == Some(msg.sender_id);
                let shown = self.sidebar.active == Some(msg.sender_id);
                if self.is_admin && !mine && !shown {
                    let from = if msg.sender_name.is_empty() {
                        format!("user #{}", msg.sender_id)
                    } else {
                        msg.sender_name.clone()
                    };
                    self.set_status(format!("New message from {}", from), false);
                }
            }
            SessionEvent::Sent(_) => {
                self.compose.accepted();
                self.status_message = None;
            }
            SessionEvent::Rejected(reason) => {
                self.compose.rejected();
                self.set_status(format!("Not sent: {}", reason), true);
            }
            SessionEvent::Closed => self.should_exit = true,
        }
    }

    fn apply_view(&mut self, view: SessionView) {
        if self.state != ConnectionState::Connected && view.state == ConnectionState::Connected {
            self.sidebar.loading = false;
        }
        self.state = view.state;
        self.user_name = view.me.name.clone();
        self.counterparty = view.counterparty.as_ref().map(|p| p.name.clone());

        if self.me.is_none() {
            self.me = Some(view.me.id);
            self.messages = MessagesState::new(view.me.id);
        }
        let header = self
            .counterparty
            .clone()
            .unwrap_or_else(|| "Select a conversation".to_string());
        self.messages.update(header, view.messages);

        let active = view.counterparty.map(|p| p.id);
        self.sidebar.update(view.conversations, active);
    }

    /// Handle one key press, returning the session request it triggers.
    fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.kind != KeyEventKind::Press {
            return Action::None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Char('c') if ctrl => {
                self.should_exit = true;
                return Action::None;
            }
            KeyCode::F(12) => {
                self.debug_log.toggle();
                return Action::None;
            }
            KeyCode::PageUp if self.debug_log.visible => {
                self.debug_log.scroll_up(5);
                return Action::None;
            }
            KeyCode::PageDown if self.debug_log.visible => {
                self.debug_log.scroll_down(5);
                return Action::None;
            }
            KeyCode::Tab => {
                self.active_pane = self.active_pane.next(self.is_admin);
                return Action::None;
            }
            KeyCode::Esc => {
                self.status_message = None;
                return Action::None;
            }
            _ => {}
        }

        match self.active_pane {
            Pane::Sidebar => match key.code {
                KeyCode::Char('q') => self.should_exit = true,
                KeyCode::Up | KeyCode::Char('k') => self.sidebar.move_up(),
                KeyCode::Down | KeyCode::Char('j') => self.sidebar.move_down(),
                KeyCode::Enter => {
                    if let Some(id) = self.sidebar.selected_id() {
                        self.active_pane = Pane::Compose;
                        return Action::Select(id);
                    }
                }
                _ => {}
            },
            Pane::Messages => match key.code {
                KeyCode::Char('q') => self.should_exit = true,
                KeyCode::Up | KeyCode::Char('k') => self.messages.select_previous(),
                KeyCode::Down | KeyCode::Char('j') => self.messages.select_next(),
                KeyCode::End | KeyCode::Char('G') => self.messages.select_last(),
                _ => {}
            },
            Pane::Compose => match key.code {
                KeyCode::Enter if alt => self.compose.insert_newline(),
                KeyCode::Enter => {
                    let text = self.compose.submit();
                    return Action::Send(text);
                }
                KeyCode::Char('u') if ctrl => self.compose.clear(),
                KeyCode::Char(c) if !ctrl => self.compose.insert_char(c),
                KeyCode::Backspace => self.compose.backspace(),
                KeyCode::Delete => self.compose.delete(),
                KeyCode::Left => self.compose.move_left(),
                KeyCode::Right => self.compose.move_right(),
                KeyCode::Home => self.compose.move_home(),
                KeyCode::End => self.compose.move_end(),
                _ => {}
            },
        }
        Action::None
    }

    /// Render the UI
    pub fn render(&self, frame: &mut ratatui::Frame) {
        ui::render(frame, self);
    }
}

/// Run the TUI application with panic-safe terminal restore
pub async fn run(handle: SessionHandle, is_admin: bool, log_buffer: LogBuffer) -> Result<()> {
    let mut terminal = ratatui::init();
    let result = AssertUnwindSafe(run_app(&mut terminal, handle, is_admin, log_buffer))
        .catch_unwind()
        .await;
    ratatui::restore();

    match result {
        Ok(r) => r,
        Err(e) => std::panic::resume_unwind(e),
    }
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    mut handle: SessionHandle,
    is_admin: bool,
    log_buffer: LogBuffer,
) -> Result<()> {
    let mut app = App::new(is_admin, log_buffer);
    let mut input = EventStream::new();
    let mut frame_tick = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));

    while !app.should_exit {
        terminal.draw(|frame| app.render(frame))?;

        tokio::select! {
            maybe_event = input.next() => match maybe_event {
                Some(Ok(Event::Key(key))) => match app.handle_key(key) {
                    Action::Send(text) => handle.send(text),
                    Action::Select(id) => handle.select(id),
                    Action::None => {}
                },
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => app.should_exit = true,
            },
            event = handle.next_event() => match event {
                Some(event) => app.handle_session_event(event),
                None => app.should_exit = true,
            },
            _ = frame_tick.tick() => app.debug_log.refresh(),
        }
    }

    handle.close().await
}
