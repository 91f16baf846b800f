//! UI rendering for the TUI

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};

use super::app::{App, Pane};
use super::compose;
use super::debug_log;
use super::messages;
use super::sidebar;
use crate::chat::ConnectionState;

/// Width of the admin conversation list.
const SIDEBAR_WIDTH: u16 = 28;

/// Status symbol and color for a connection state.
fn state_indicator(state: ConnectionState) -> (&'static str, Color) {
    match state {
        ConnectionState::Connected => ("*", Color::Green),
        ConnectionState::Connecting | ConnectionState::Reconnecting => ("~", Color::Yellow),
        ConnectionState::Disconnected => ("o", Color::Red),
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let log_height = if app.debug_log.visible {
        debug_log::DEBUG_LOG_HEIGHT
    } else {
        0
    };
    let [header_area, main_area, log_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(log_height),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), app);

    let content_area = if app.is_admin {
        let [sidebar_area, content_area] =
            Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Fill(1)])
                .areas(main_area);
        sidebar::render(
            sidebar_area,
            frame.buffer_mut(),
            &app.sidebar,
            app.active_pane == Pane::Sidebar,
        );
        content_area
    } else {
        main_area
    };

    let [messages_area, compose_area] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
    ])
    .areas(content_area);

    messages::render(
        messages_area,
        frame.buffer_mut(),
        &app.messages,
        app.active_pane == Pane::Messages,
    );

    compose::render(
        compose_area,
        frame,
        &app.compose,
        app.recipient(),
        app.active_pane == Pane::Compose,
    );

    if app.debug_log.visible {
        debug_log::render(log_area, frame.buffer_mut(), &app.debug_log);
    }

    render_status(status_area, frame.buffer_mut(), app);
}

fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = if app.is_admin {
        " Storefront Chat (admin)"
    } else {
        " Storefront Chat"
    };
    let (symbol, color) = state_indicator(app.state);
    let right = format!(" {} {}  {} ", symbol, app.state, app.user_name);
    let padding = (area.width as usize).saturating_sub(title.len() + right.len());

    let line = Line::from(vec![
        Span::styled(
            title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(padding)),
        Span::styled(format!(" {} {} ", symbol, app.state), Style::default().fg(color)),
        Span::styled(
            format!(" {} ", app.user_name),
            Style::default().fg(Color::Cyan),
        ),
    ]);

    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    if let Some(ref msg) = app.status_message {
        let style = if app.status_is_error {
            Style::default().fg(Color::Red).bg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Green).bg(Color::DarkGray)
        };
        Paragraph::new(Line::from(Span::styled(format!(" {} ", msg), style)))
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let sep = || Span::styled(" | ", Style::default().fg(Color::Gray));
    let (symbol, color) = state_indicator(app.state);

    let mut spans = vec![
        Span::styled(format!(" {} {} ", symbol, app.state), Style::default().fg(color)),
        sep(),
        Span::styled(
            app.recipient().unwrap_or("(none)").to_string(),
            Style::default().fg(Color::Yellow),
        ),
        sep(),
        Span::styled(
            format!("Tab: {}", app.active_pane.as_str()),
            Style::default().fg(Color::Cyan),
        ),
    ];
    if app.is_admin {
        let unread = app.sidebar.total_unread();
        if unread > 0 {
            spans.push(sep());
            spans.push(Span::styled(
                format!("{} unread", unread),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ));
        }
    }
    spans.push(sep());
    spans.push(Span::styled(
        "F12: log  Ctrl-C: quit",
        Style::default().fg(Color::Gray),
    ));

    Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}
