//! STOMP 1.2 frame encoding and decoding.
//!
//! One WebSocket text message carries one frame:
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! ...\n
//! \n
//! body\0
//! ```
//!
//! A message consisting only of EOLs is a heartbeat.

use std::fmt;

/// Errors decoding a STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StompError {
    #[error("empty frame")]
    Empty,
    #[error("unknown STOMP command {0:?}")]
    UnknownCommand(String),
    #[error("malformed header line {0:?}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header {0:?}")]
    BadEscape(String),
    #[error("missing NUL terminator")]
    Unterminated,
    #[error("content-length {declared} exceeds body of {actual} bytes")]
    ContentLength { declared: usize, actual: usize },
    #[error("server error: {0}")]
    Server(String),
}

/// STOMP frame commands used by the chat client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(s: &str) -> Result<Self, StompError> {
        Ok(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            other => return Err(StompError::UnknownCommand(other.to_string())),
        })
    }

    /// CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected | Command::Stomp)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// What one inbound WebSocket text message decoded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Heartbeat,
    Frame(Frame),
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Builder: append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Builder: set the body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name`; repeated headers keep the first.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire text, NUL-terminated.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (k, v) in &self.headers {
            if escape {
                out.push_str(&escape_header(k));
                out.push(':');
                out.push_str(&escape_header(v));
            } else {
                out.push_str(k);
                out.push(':');
                out.push_str(v);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one WebSocket text message.
    pub fn decode(text: &str) -> Result<Incoming, StompError> {
        if text.chars().all(|c| c == '\n' || c == '\r') {
            return if text.is_empty() {
                Err(StompError::Empty)
            } else {
                Ok(Incoming::Heartbeat)
            };
        }

        // Heartbeat EOLs may precede a frame.
        let text = text.trim_start_matches(['\r', '\n']);

        let (head, rest) = match text.find("\n\n") {
            Some(pos) => (&text[..pos], &text[pos + 2..]),
            None => match text.find("\r\n\r\n") {
                Some(pos) => (&text[..pos], &text[pos + 4..]),
                None => return Err(StompError::Unterminated),
            },
        };

        let mut lines = head.lines();
        let command_line = lines.next().ok_or(StompError::Empty)?;
        let command = Command::parse(command_line.trim_end_matches('\r'))?;
        let escape = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (k, v) = line
                .split_once(':')
                .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
            if escape {
                headers.push((unescape_header(k)?, unescape_header(v)?));
            } else {
                headers.push((k.to_string(), v.to_string()));
            }
        }

        let declared = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .and_then(|(_, v)| v.trim().parse::<usize>().ok());

        let body = match declared {
            Some(len) => {
                if rest.len() < len || !rest.is_char_boundary(len) {
                    return Err(StompError::ContentLength {
                        declared: len,
                        actual: rest.len(),
                    });
                }
                rest[..len].to_string()
            }
            None => {
                let end = rest.find('\0').ok_or(StompError::Unterminated)?;
                rest[..end].to_string()
            }
        };

        Ok(Incoming::Frame(Frame {
            command,
            headers,
            body,
        }))
    }
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::BadEscape(s.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_send_frame() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/chat.sendMessage")
            .header("content-type", "application/json")
            .body(r#"{"message":"hi"}"#);
        let text = frame.encode();
        assert_eq!(
            text,
            "SEND\ndestination:/app/chat.sendMessage\ncontent-type:application/json\n\
             content-length:16\n\n{\"message\":\"hi\"}\0"
        );
    }

    #[test]
    fn test_connect_headers_not_escaped() {
        let text = Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1")
            .header("heart-beat", "4000,4000")
            .header("host", "localhost:8080")
            .encode();
        assert!(text.contains("host:localhost:8080\n"));
        assert!(text.ends_with("\n\n\0"));
    }

    #[test]
    fn test_decode_message_frame() {
        let text = "MESSAGE\ndestination:/user/9/queue/messages\nsubscription:sub-0\n\
                    message-id:abc\\c1\ncontent-type:application/json\n\n{\"x\":1}\0\n";
        let Incoming::Frame(frame) = Frame::decode(text).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("destination"), Some("/user/9/queue/messages"));
        assert_eq!(frame.get("message-id"), Some("abc:1"));
        assert_eq!(frame.body, "{\"x\":1}");
    }

    #[test]
    fn test_decode_respects_content_length() {
        let text = "MESSAGE\ncontent-length:5\n\na\0bcd\0";
        let Incoming::Frame(frame) = Frame::decode(text).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.body, "a\0bcd");

        let short = "MESSAGE\ncontent-length:50\n\nabc\0";
        assert!(matches!(
            Frame::decode(short),
            Err(StompError::ContentLength { declared: 50, .. })
        ));
    }

    #[test]
    fn test_decode_connected_and_heartbeat() {
        assert_eq!(Frame::decode("\n").unwrap(), Incoming::Heartbeat);
        assert_eq!(Frame::decode("\r\n\n").unwrap(), Incoming::Heartbeat);

        let Incoming::Frame(frame) =
            Frame::decode("\nCONNECTED\nversion:1.2\nheart-beat:4000,4000\n\n\0").unwrap()
        else {
            panic!("expected frame");
        };
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.get("heart-beat"), Some("4000,4000"));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Frame::decode(""), Err(StompError::Empty));
        assert!(matches!(
            Frame::decode("BOGUS\n\n\0"),
            Err(StompError::UnknownCommand(_))
        ));
        assert!(matches!(
            Frame::decode("MESSAGE\nno-colon\n\n\0"),
            Err(StompError::MalformedHeader(_))
        ));
        assert!(matches!(
            Frame::decode("MESSAGE\nk:bad\\x\n\n\0"),
            Err(StompError::BadEscape(_))
        ));
        assert_eq!(
            Frame::decode("MESSAGE\nk:v\n\nbody"),
            Err(StompError::Unterminated)
        );
    }

    #[test]
    fn test_header_escaping_survives_decode() {
        let frame = Frame::new(Command::Send)
            .header("x-note", "a:b\nc\\d")
            .body("x");
        let Incoming::Frame(back) = Frame::decode(&frame.encode()).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(back.get("x-note"), Some("a:b\nc\\d"));
        assert_eq!(back.body, "x");
    }
}
