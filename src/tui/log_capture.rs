//! Log capture for TUI mode
//!
//! A ring buffer implementing `MakeWriter`, so tracing-subscriber writes log
//! lines here instead of stderr while ratatui owns the alternate screen.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Lines kept between two drains; older ones are dropped.
const RING_BUFFER_CAPACITY: usize = 500;

/// One captured log line with the level parsed from its prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: Option<Level>,
    pub text: String,
}

impl LogLine {
    fn parse(text: String) -> Self {
        // fmt output: "<timestamp>  INFO message"
        let level = text
            .split_whitespace()
            .take(2)
            .find_map(|word| word.parse::<Level>().ok());
        Self { level, text }
    }
}

/// A thread-safe ring buffer for log lines.
#[derive(Clone, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<LogLine>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a log line, evicting the oldest when full.
    pub fn push(&self, line: String) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() >= RING_BUFFER_CAPACITY {
            guard.pop_front();
        }
        guard.push_back(LogLine::parse(line));
    }

    /// Take all accumulated lines, oldest first.
    pub fn drain(&self) -> Vec<LogLine> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.drain(..).collect()
    }
}

/// Buffers bytes and forwards complete lines to a [`LogBuffer`].
pub struct BufferWriter {
    buffer: LogBuffer,
    pending: Vec<u8>,
}

impl BufferWriter {
    fn new(buffer: LogBuffer) -> Self {
        Self {
            buffer,
            pending: Vec::new(),
        }
    }

    fn flush_lines(&mut self) {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let s = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            self.buffer.push(s);
        }
    }
}

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.flush_lines();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.pending.is_empty() {
            let s = String::from_utf8_lossy(&self.pending).into_owned();
            self.buffer.push(s);
            self.pending.clear();
        }
        Ok(())
    }
}

impl Drop for BufferWriter {
    fn drop(&mut self) {
        let _ = Write::flush(self);
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: Vec<LogLine>) -> Vec<String> {
        lines.into_iter().map(|l| l.text).collect()
    }

    #[test]
    fn test_log_buffer_capacity() {
        let buf = LogBuffer::new();
        for i in 0..600 {
            buf.push(format!("line {}", i));
        }

        let lines = texts(buf.drain());
        assert_eq!(lines.len(), 500);
        assert_eq!(lines[0], "line 100");
        assert_eq!(lines[499], "line 599");
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn test_level_parsed_from_prefix() {
        let buf = LogBuffer::new();
        buf.push("2024-05-01T10:00:00.000000Z  WARN chat disconnected".to_string());
        buf.push("2024-05-01T10:00:00.000000Z DEBUG STOMP send: SEND".to_string());
        buf.push("continuation without level".to_string());

        let lines = buf.drain();
        assert_eq!(lines[0].level, Some(Level::WARN));
        assert_eq!(lines[1].level, Some(Level::DEBUG));
        assert_eq!(lines[2].level, None);
    }

    #[test]
    fn test_buffer_writer_lines_and_partial() {
        let buf = LogBuffer::new();
        {
            let mut writer = BufferWriter::new(buf.clone());
            write!(writer, "hello\nworld\npartial").unwrap();
            assert_eq!(texts(buf.drain()), vec!["hello", "world"]);
        }
        assert_eq!(texts(buf.drain()), vec!["partial"]);
    }
}
