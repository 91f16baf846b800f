//! Compose box: single-line text input addressed to the current counterparty.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthChar;

/// State for the compose box.
///
/// The draft survives a rejected send; it is cleared only once the session
/// accepts it.
#[derive(Default)]
pub struct ComposeState {
    pub input: String,
    /// Cursor position (character offset into `input`).
    pub cursor_pos: usize,
    /// Draft handed to the session and not yet accepted or rejected.
    submitted: Option<String>,
}

impl ComposeState {
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert(byte_pos, c);
        self.cursor_pos += 1;
    }

    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    /// Delete the character before the cursor.
    pub fn backspace(&mut self) {
        if self.cursor_pos > 0 {
            let byte_pos = self.char_to_byte(self.cursor_pos);
            let prev_byte_pos = self.char_to_byte(self.cursor_pos - 1);
            self.input.drain(prev_byte_pos..byte_pos);
            self.cursor_pos -= 1;
        }
    }

    /// Delete the character at the cursor.
    pub fn delete(&mut self) {
        if self.cursor_pos < self.input.chars().count() {
            let byte_pos = self.char_to_byte(self.cursor_pos);
            let next_byte_pos = self.char_to_byte(self.cursor_pos + 1);
            self.input.drain(byte_pos..next_byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor_pos < self.input.chars().count() {
            self.cursor_pos += 1;
        }
    }

    pub fn move_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_pos = self.input.chars().count();
    }

    /// Clear all input text (Ctrl+U).
    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
    }

    /// Hand the current draft over for sending. The text stays in the box.
    pub fn submit(&mut self) -> String {
        self.submitted = Some(self.input.clone());
        self.input.clone()
    }

    /// The session accepted the submitted draft.
    ///
    /// The box is cleared unless the user kept typing in the meantime.
    pub fn accepted(&mut self) {
        if self.submitted.take().as_deref() == Some(self.input.as_str()) {
            self.clear();
        }
    }

    /// The session refused the submitted draft; keep it for another try.
    pub fn rejected(&mut self) {
        self.submitted = None;
    }

    fn char_to_byte(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Border + input line + border.
pub const COMPOSE_HEIGHT: u16 = 3;

/// Render the compose box; places the terminal cursor when focused.
pub fn render(
    area: Rect,
    frame: &mut Frame,
    state: &ComposeState,
    recipient: Option<&str>,
    focused: bool,
) {
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

    let title = match recipient {
        Some(name) => format!(" To: {} ", name),
        None => " No conversation selected ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style)
        .title(Span::styled(title, border_style));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }
    let input_area = Rect::new(inner.x, inner.y, inner.width, 1);
    let width = input_area.width as usize;

    if state.input.is_empty() {
        let placeholder = match recipient {
            Some(name) => format!(" Type a message to {}...", name),
            None => " Select a conversation first".to_string(),
        };
        let truncated: String = placeholder.chars().take(width).collect();
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                truncated,
                Style::default().fg(Color::DarkGray),
            ))),
            input_area,
        );
        if focused {
            frame.set_cursor_position((input_area.x + 1, input_area.y));
        }
        return;
    }

    let display = compose_display_text(&state.input, state.cursor_pos, width);
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            format!(" {}", display.visible),
            Style::default().fg(Color::White),
        ))),
        input_area,
    );
    if focused {
        let x = input_area.x + 1 + display.cursor_offset as u16;
        frame.set_cursor_position((x, input_area.y));
    }
}

/// Visible slice of the input and the cursor column within it.
struct DisplayText {
    visible: String,
    cursor_offset: usize,
}

/// Flatten newlines to " | " and scroll horizontally to keep the cursor in
/// view. Offsets are display columns, so wide characters count double.
fn compose_display_text(input: &str, cursor_pos: usize, width: usize) -> DisplayText {
    let mut cells: Vec<(char, usize)> = Vec::with_capacity(input.len());
    let mut cursor_cell = None;
    for (idx, ch) in input.chars().enumerate() {
        if idx == cursor_pos {
            cursor_cell = Some(cells.len());
        }
        if ch == '\n' {
            cells.extend([(' ', 1), ('|', 1), (' ', 1)]);
        } else {
            cells.push((ch, ch.width().unwrap_or(0)));
        }
    }
    let cursor_cell = cursor_cell.unwrap_or(cells.len());

    // One column of left margin.
    let avail = width.saturating_sub(1);
    if avail == 0 {
        return DisplayText {
            visible: String::new(),
            cursor_offset: 0,
        };
    }

    // Drop leading cells until the cursor fits.
    let mut start = 0;
    let cols = |from: usize, to: usize| cells[from..to].iter().map(|(_, w)| w).sum::<usize>();
    while start < cursor_cell && cols(start, cursor_cell) >= avail {
        start += 1;
    }

    let mut visible = String::new();
    let mut used = 0;
    for &(ch, w) in &cells[start..] {
        if used + w > avail {
            break;
        }
        visible.push(ch);
        used += w;
    }

    DisplayText {
        visible,
        cursor_offset: cols(start, cursor_cell),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(text: &str) -> ComposeState {
        let mut state = ComposeState::default();
        for c in text.chars() {
            state.insert_char(c);
        }
        state
    }

    #[test]
    fn test_editing_multibyte() {
        let mut state = typed("héllo");
        state.move_left();
        state.move_left();
        state.backspace();
        assert_eq!(state.input, "hélo");
        state.move_home();
        state.delete();
        assert_eq!(state.input, "élo");
        state.move_end();
        state.insert_char('!');
        assert_eq!(state.input, "élo!");
    }

    #[test]
    fn test_draft_kept_until_accepted() {
        let mut state = typed("Hello");
        assert_eq!(state.submit(), "Hello");
        state.rejected();
        assert_eq!(state.input, "Hello");

        state.submit();
        state.accepted();
        assert!(state.input.is_empty());
        assert_eq!(state.cursor_pos, 0);
    }

    #[test]
    fn test_accept_keeps_newer_typing() {
        let mut state = typed("Hello");
        state.submit();
        state.insert_char('?');
        state.accepted();
        assert_eq!(state.input, "Hello?");
    }

    #[test]
    fn test_display_scrolls_to_cursor() {
        let short = compose_display_text("hi\nthere", 8, 40);
        assert_eq!(short.visible, "hi | there");
        assert_eq!(short.cursor_offset, 10);

        let long = "abcdefghijklmnopqrstuvwxyz";
        let display = compose_display_text(long, 26, 11);
        assert_eq!(display.visible, "rstuvwxyz");
        assert_eq!(display.cursor_offset, 9);
    }
}
