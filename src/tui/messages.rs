//! Messages pane: the visible conversation as bordered cards.

use chrono::Local;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::models::{ChatMessage, ParticipantId};

/// State for the messages pane.
#[derive(Default)]
pub struct MessagesState {
    pub header: String,
    pub messages: Vec<ChatMessage>,
    me: ParticipantId,
    /// Index of the highlighted message.
    pub selected: usize,
    /// Follow new messages while the newest one is selected.
    follow: bool,
}

impl MessagesState {
    pub fn new(me: ParticipantId) -> Self {
        Self {
            me,
            follow: true,
            ..Self::default()
        }
    }

    /// Replace the shown messages after a session update.
    pub fn update(&mut self, header: String, messages: Vec<ChatMessage>) {
        self.header = header;
        self.messages = messages;
        if self.follow || self.selected >= self.messages.len() {
            self.selected = self.messages.len().saturating_sub(1);
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
        self.follow = self.is_at_end();
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.messages.len() {
            self.selected += 1;
        }
        self.follow = self.is_at_end();
    }

    pub fn select_last(&mut self) {
        self.selected = self.messages.len().saturating_sub(1);
        self.follow = true;
    }

    fn is_at_end(&self) -> bool {
        self.selected + 1 >= self.messages.len()
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub fn render(area: Rect, buf: &mut Buffer, state: &MessagesState, focused: bool) {
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let border_type = if focused {
        BorderType::Double
    } else {
        BorderType::Plain
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style);

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let header_area = Rect::new(inner.x, inner.y, inner.width, 1);
    render_header(header_area, buf, &state.header);

    let messages_area = Rect::new(
        inner.x,
        inner.y + 1,
        inner.width,
        inner.height.saturating_sub(1),
    );
    if messages_area.height == 0 {
        return;
    }

    if state.messages.is_empty() {
        let line = Line::from(Span::styled(
            " No messages yet",
            Style::default().fg(Color::DarkGray),
        ));
        let row = Rect::new(messages_area.x, messages_area.y, messages_area.width, 1);
        Paragraph::new(line).render(row, buf);
        return;
    }

    let (all_lines, ranges) = build_message_lines(state, messages_area.width as usize);
    let total_lines = all_lines.len();
    let visible_height = messages_area.height as usize;
    let scroll = compute_scroll(state.selected, &ranges, visible_height, total_lines);

    let visible = all_lines.into_iter().skip(scroll).take(visible_height);
    for (row, line) in visible.enumerate() {
        let y = messages_area.y + row as u16;
        let line_area = Rect::new(messages_area.x, y, messages_area.width, 1);
        Paragraph::new(line).render(line_area, buf);
    }

    if total_lines > visible_height {
        let indicator_x = messages_area.x + messages_area.width.saturating_sub(1);
        if scroll > 0 {
            let cell = &mut buf[(indicator_x, messages_area.y)];
            cell.set_char('^');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
        if scroll + visible_height < total_lines {
            let bottom_y = messages_area.y + messages_area.height.saturating_sub(1);
            let cell = &mut buf[(indicator_x, bottom_y)];
            cell.set_char('v');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
    }
}

fn render_header(area: Rect, buf: &mut Buffer, header: &str) {
    let line = Line::from(Span::styled(
        format!(" {} ", header),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    ));
    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

/// Delivery marker shown on the sender line.
fn status_label(msg: &ChatMessage, me: ParticipantId) -> Option<(&'static str, Style)> {
    if msg.failed {
        let style = Style::default().fg(Color::Red).add_modifier(Modifier::BOLD);
        Some(("not sent", style))
    } else if msg.pending {
        Some(("sending...", Style::default().fg(Color::DarkGray)))
    } else if msg.sender_id == me && msg.is_read {
        Some(("read", Style::default().fg(Color::Green)))
    } else if msg.sender_id != me && !msg.is_read {
        let style = Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD);
        Some(("new", style))
    } else {
        None
    }
}

/// Flat line buffer plus the `(start, end)` line range of each message.
fn build_message_lines(
    state: &MessagesState,
    width: usize,
) -> (Vec<Line<'static>>, Vec<(usize, usize)>) {
    let mut lines = Vec::new();
    let mut ranges = Vec::with_capacity(state.messages.len());

    for (idx, msg) in state.messages.iter().enumerate() {
        let start = lines.len();
        render_card(&mut lines, msg, state.me, width, idx == state.selected);
        ranges.push((start, lines.len()));
    }

    (lines, ranges)
}

/// One message as a card; own messages are indented to the right.
fn render_card(
    lines: &mut Vec<Line<'static>>,
    msg: &ChatMessage,
    me: ParticipantId,
    width: usize,
    is_selected: bool,
) {
    let mine = msg.sender_id == me;
    let indent = if mine { width / 4 } else { 0 };
    let card_width = width.saturating_sub(indent).saturating_sub(1);
    if card_width < 12 {
        return;
    }
    let inner_width = card_width - 4;
    let pad: String = " ".repeat(indent);

    let border_style = if is_selected {
        Style::default().fg(Color::Yellow)
    } else if mine {
        Style::default().fg(Color::Blue)
    } else {
        Style::default().fg(Color::Gray)
    };

    let rule = format!("{}+{}+", pad, "-".repeat(card_width - 2));
    lines.push(Line::from(Span::styled(rule.clone(), border_style)));

    let sender = if mine {
        "You".to_string()
    } else if msg.sender_name.is_empty() {
        format!("User #{}", msg.sender_id)
    } else {
        msg.sender_name.clone()
    };
    let time = msg.sent_at.with_timezone(&Local).format("%H:%M").to_string();
    let status = status_label(msg, me);
    let right_len = time.len() + status.map_or(0, |(label, _)| label.len() + 2);
    let gap = inner_width.saturating_sub(sender.chars().count() + right_len);

    let mut head = vec![
        Span::raw(pad.clone()),
        Span::styled("| ", border_style),
        Span::styled(
            sender,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(gap)),
    ];
    if let Some((label, style)) = status {
        head.push(Span::styled(label, style));
        head.push(Span::raw("  "));
    }
    head.push(Span::styled(time, Style::default().fg(Color::DarkGray)));
    head.push(Span::styled(" |", border_style));
    lines.push(Line::from(head));

    for text in wrap_text(&msg.body, inner_width) {
        let fill = inner_width.saturating_sub(text.chars().count());
        lines.push(Line::from(vec![
            Span::raw(pad.clone()),
            Span::styled("| ", border_style),
            Span::raw(format!("{}{}", text, " ".repeat(fill))),
            Span::styled(" |", border_style),
        ]));
    }

    lines.push(Line::from(Span::styled(rule, border_style)));
}

/// Split on newlines, then word-wrap lines longer than `max_width` characters.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![];
    }
    let mut result = Vec::new();
    for line in text.lines() {
        if line.chars().count() <= max_width {
            result.push(line.to_string());
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            let word_len = word.chars().count();
            let current_len = current.chars().count();
            if current.is_empty() {
                current = word.to_string();
            } else if current_len + 1 + word_len <= max_width {
                current.push(' ');
                current.push_str(word);
            } else {
                result.push(std::mem::take(&mut current));
                current = word.to_string();
            }
            // Hard-break words longer than a whole line.
            while current.chars().count() > max_width {
                let head: String = current.chars().take(max_width).collect();
                current = current.chars().skip(max_width).collect();
                result.push(head);
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
    }
    result
}

/// Scroll offset keeping the selected message visible, bottom-aligned.
fn compute_scroll(
    selected: usize,
    ranges: &[(usize, usize)],
    visible_height: usize,
    total_lines: usize,
) -> usize {
    if total_lines <= visible_height {
        return 0;
    }
    let Some(&(start, end)) = ranges.get(selected) else {
        return total_lines - visible_height;
    };
    let scroll = if end - start >= visible_height {
        start
    } else {
        end.saturating_sub(visible_height)
    };
    scroll.min(total_lines - visible_height)
}
