//! Sidebar widget: the admin's conversation list with unread badges.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::chat::Conversation;
use crate::models::ParticipantId;

/// Sidebar state: the conversations in display order and the cursor.
pub struct SidebarState {
    pub conversations: Vec<Conversation>,
    /// Cursor row.
    pub selected: usize,
    /// Conversation whose messages are on screen.
    pub active: Option<ParticipantId>,
    /// No list received yet.
    pub loading: bool,
}

impl Default for SidebarState {
    fn default() -> Self {
        Self {
            conversations: Vec::new(),
            selected: 0,
            active: None,
            loading: true,
        }
    }
}

impl SidebarState {
    /// Replace the list, keeping the cursor on the same conversation when it
    /// moved because of reordering.
    pub fn update(&mut self, conversations: Vec<Conversation>, active: Option<ParticipantId>) {
        let cursor_id = self.selected_id();
        self.conversations = conversations;
        self.active = active;
        if !self.conversations.is_empty() {
            self.loading = false;
        }
        if let Some(pos) = cursor_id.and_then(|id| self.position(id)) {
            self.selected = pos;
        }
        self.clamp_selection();
    }

    /// Conversation under the cursor.
    pub fn selected_id(&self) -> Option<ParticipantId> {
        self.conversations
            .get(self.selected)
            .map(|c| c.counterparty_id)
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        if self.selected + 1 < self.conversations.len() {
            self.selected += 1;
        }
    }

    /// Total unread messages across all conversations.
    pub fn total_unread(&self) -> u32 {
        self.conversations.iter().map(|c| c.unread_count).sum()
    }

    fn position(&self, id: ParticipantId) -> Option<usize> {
        self.conversations
            .iter()
            .position(|c| c.counterparty_id == id)
    }

    fn clamp_selection(&mut self) {
        self.selected = self
            .selected
            .min(self.conversations.len().saturating_sub(1));
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub fn render(area: Rect, buf: &mut Buffer, state: &SidebarState, focused: bool) {
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
        .border_style(border_style)
        .title(Span::styled(
            " Conversations ",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    if state.conversations.is_empty() {
        let text = if state.loading {
            " Loading..."
        } else {
            " No conversations"
        };
        let line = Line::from(Span::styled(text, Style::default().fg(Color::DarkGray)));
        Paragraph::new(line).render(Rect::new(inner.x, inner.y, inner.width, 1), buf);
        return;
    }

    // Two rows per conversation: name and preview.
    let per_page = (inner.height as usize / 2).max(1);
    let offset = compute_scroll_offset(state.selected, per_page, state.conversations.len());

    for (slot, (idx, conv)) in state
        .conversations
        .iter()
        .enumerate()
        .skip(offset)
        .take(per_page)
        .enumerate()
    {
        let y = inner.y + (slot * 2) as u16;
        let selected = idx == state.selected;
        let is_active = state.active == Some(conv.counterparty_id);

        let cursor = if selected && focused { "\u{25BA}" } else { " " };
        let marker = if is_active { "*" } else { " " };
        let label = format!("{}{} {}", cursor, marker, conv.counterparty_name);
        let badge = if conv.unread_count > 0 {
            conv.unread_count.to_string()
        } else {
            String::new()
        };
        let style = item_style(selected, conv.unread_count > 0);
        let bstyle = if conv.unread_count > 0 {
            badge_style(selected)
        } else {
            style
        };
        render_row(
            buf,
            Rect::new(inner.x, y, inner.width, 1),
            &label,
            &badge,
            style,
            bstyle,
        );

        if y + 1 < inner.y + inner.height {
            let preview = conv.last_message_preview.as_deref().unwrap_or("");
            let preview_style = Style::default().fg(Color::DarkGray);
            render_row(
                buf,
                Rect::new(inner.x, y + 1, inner.width, 1),
                &format!("    {}", preview),
                "",
                preview_style,
                preview_style,
            );
        }
    }
}

/// Keep the selected item visible.
fn compute_scroll_offset(selected: usize, height: usize, total: usize) -> usize {
    if total <= height || selected < height {
        return 0;
    }
    let max_offset = total.saturating_sub(height);
    selected.saturating_sub(height - 1).min(max_offset)
}

fn item_style(selected: bool, has_unread: bool) -> Style {
    if selected {
        Style::default()
            .fg(Color::White)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    } else if has_unread {
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    }
}

fn badge_style(selected: bool) -> Style {
    let style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    if selected {
        style.bg(Color::DarkGray)
    } else {
        style
    }
}

/// Left-aligned text with an optional right-aligned badge.
fn render_row(
    buf: &mut Buffer,
    area: Rect,
    left: &str,
    badge: &str,
    text_style: Style,
    badge_style: Style,
) {
    let width = area.width as usize;
    if width == 0 {
        return;
    }

    let badge_len = badge.len();
    let max_left = if badge_len > 0 {
        width.saturating_sub(badge_len + 1)
    } else {
        width
    };
    let left_truncated: String = left.chars().take(max_left).collect();
    let pad = width.saturating_sub(left_truncated.chars().count() + badge_len);

    let line = Line::from(vec![
        Span::styled(left_truncated, text_style),
        Span::styled(" ".repeat(pad), text_style),
        Span::styled(badge.to_string(), badge_style),
    ]);
    Paragraph::new(line).render(area, buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(id: ParticipantId, unread: u32) -> Conversation {
        Conversation {
            counterparty_id: id,
            counterparty_name: format!("User #{}", id),
            last_message_preview: None,
            last_message_at: None,
            unread_count: unread,
        }
    }

    #[test]
    fn test_cursor_follows_conversation_on_reorder() {
        let mut state = SidebarState::default();
        state.update(vec![conv(10, 0), conv(20, 0), conv(30, 0)], None);
        assert!(!state.loading);
        state.move_down();
        assert_eq!(state.selected_id(), Some(20));

        // 30 got a new message and moved to the top.
        state.update(vec![conv(30, 1), conv(10, 0), conv(20, 0)], None);
        assert_eq!(state.selected_id(), Some(20));
        assert_eq!(state.total_unread(), 1);
    }

    #[test]
    fn test_navigation_bounds() {
        let mut state = SidebarState::default();
        state.move_down();
        assert_eq!(state.selected_id(), None);

        state.update(vec![conv(10, 0), conv(20, 0)], Some(10));
        state.move_up();
        assert_eq!(state.selected, 0);
        state.move_down();
        state.move_down();
        assert_eq!(state.selected, 1);
    }

    #[test]
    fn test_scroll_offset() {
        assert_eq!(compute_scroll_offset(0, 5, 3), 0);
        assert_eq!(compute_scroll_offset(7, 5, 10), 3);
        assert_eq!(compute_scroll_offset(9, 5, 10), 5);
    }
}
