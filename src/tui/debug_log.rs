//! Debug log pane showing captured tracing output.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use tracing::Level;

use super::log_capture::{LogBuffer, LogLine};

/// Scroll history kept for display; larger than the capture ring.
const MAX_ACCUMULATED_LINES: usize = 1000;

/// Height of the pane when visible, borders included.
pub const DEBUG_LOG_HEIGHT: u16 = 10;

pub struct DebugLogState {
    buffer: LogBuffer,
    lines: Vec<LogLine>,
    pub visible: bool,
    /// 0 = pinned to the newest line.
    scroll_offset: usize,
}

impl DebugLogState {
    pub fn new(buffer: LogBuffer) -> Self {
        Self {
            buffer,
            lines: Vec::new(),
            visible: false,
            scroll_offset: 0,
        }
    }

    /// Pull new lines from the capture buffer. Call once per frame.
    pub fn refresh(&mut self) {
        let new_lines = self.buffer.drain();
        if new_lines.is_empty() {
            return;
        }
        self.lines.extend(new_lines);
        if self.lines.len() > MAX_ACCUMULATED_LINES {
            let excess = self.lines.len() - MAX_ACCUMULATED_LINES;
            self.lines.drain(..excess);
            self.scroll_offset = self.scroll_offset.saturating_sub(excess);
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        if self.visible {
            self.scroll_offset = 0;
        }
    }

    pub fn scroll_up(&mut self, n: usize) {
        let max_offset = self.lines.len().saturating_sub(1);
        self.scroll_offset = self.scroll_offset.saturating_add(n).min(max_offset);
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
    }
}

pub fn render(area: Rect, buf: &mut Buffer, state: &DebugLogState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Debug Log (F12) ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let end = state.lines.len().saturating_sub(state.scroll_offset);
    let start = end.saturating_sub(inner.height as usize);

    let lines: Vec<Line> = state.lines[start..end].iter().map(colorize).collect();
    Paragraph::new(lines).render(inner, buf);
}

fn colorize(line: &LogLine) -> Line<'static> {
    let color = match line.level {
        Some(Level::ERROR) => Color::Red,
        Some(Level::WARN) => Color::Yellow,
        Some(Level::INFO) => Color::Green,
        Some(_) => Color::DarkGray,
        None => Color::White,
    };
    Line::from(Span::styled(line.text.clone(), Style::default().fg(color)))
}
