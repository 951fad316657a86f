//! Node feed protocol: topic naming for the three push families and the
//! STOMP 1.2 frame codec the node speaks over its WebSocket endpoint.

use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// STOMP protocol version negotiated on connect.
pub const STOMP_VERSION: &str = "1.2";

/// Heart-beats are disabled; liveness is detected through socket errors.
pub const HEART_BEAT: &str = "0,0";

/// The three topic families the node publishes per address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicKind {
    /// One-shot "address seen" notification for a not-yet-used address.
    Propagation,
    /// Balance / pre-balance updates for a known address.
    Balance,
    /// Transaction updates touching a known address.
    Transaction,
}

impl TopicKind {
    pub const ALL: [TopicKind; 3] = [
        TopicKind::Propagation,
        TopicKind::Balance,
        TopicKind::Transaction,
    ];

    /// Destination for this topic family and address.
    pub fn topic(self, address_hex: &str) -> String {
        match self {
            TopicKind::Propagation => format!("/topic/address/{}", address_hex),
            TopicKind::Balance => format!("/topic/{}", address_hex),
            TopicKind::Transaction => format!("/topic/addressTransactions/{}", address_hex),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TopicKind::Propagation => "propagation",
            TopicKind::Balance => "balance",
            TopicKind::Transaction => "transaction",
        }
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// STOMP commands used by the feed client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl StompCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Send => "SEND",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
            StompCommand::Disconnect => "DISCONNECT",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim (STOMP 1.2 §Value Encoding).
    fn escapes_headers(self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl FromStr for StompCommand {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" | "STOMP" => StompCommand::Connect,
            "CONNECTED" => StompCommand::Connected,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "SEND" => StompCommand::Send,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            "DISCONNECT" => StompCommand::Disconnect,
            other => {
                return Err(TransportError::Protocol(format!(
                    "unknown STOMP command '{}'",
                    other
                )))
            }
        })
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// First value for `key`; repeated headers after the first are ignored.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame with caller supplied headers appended.
    pub fn connect(host: &str, extra: &[(String, String)]) -> Self {
        let mut frame = StompFrame::new(StompCommand::Connect)
            .header("accept-version", STOMP_VERSION)
            .header("host", host)
            .header("heart-beat", HEART_BEAT);
        for (key, value) in extra {
            frame = frame.header(key.clone(), value.clone());
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        StompFrame::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        StompFrame::new(StompCommand::Unsubscribe).header("id", id)
    }

    pub fn disconnect() -> Self {
        StompFrame::new(StompCommand::Disconnect)
    }

    /// Serialize to wire text, including the trailing NUL.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(32 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (key, value) in &self.headers {
            if self.command.escapes_headers() {
                out.push_str(&escape(key));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(key);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text.
    ///
    /// Returns `Ok(None)` for a bare heart-beat (only EOLs).
    pub fn decode(raw: &str) -> Result<Option<Self>, TransportError> {
        let raw = raw.trim_start_matches(|c: char| c == '\r' || c == '\n');
        if raw.is_empty() || raw == "\0" {
            return Ok(None);
        }

        let mut offset = 0;
        let mut lines = Vec::new();
        let mut terminated = false;
        for line in raw.split_inclusive('\n') {
            offset += line.len();
            if !line.ends_with('\n') {
                break;
            }
            let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
            if trimmed.is_empty() {
                terminated = true;
                break;
            }
            lines.push(trimmed);
        }
        if !terminated {
            return Err(TransportError::Protocol(
                "frame has no header terminator".to_string(),
            ));
        }

        let mut lines = lines.into_iter();
        let command: StompCommand = lines
            .next()
            .ok_or_else(|| TransportError::Protocol("frame has no command".to_string()))?
            .parse()?;

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in lines {
            let (key, value) = line.split_once(':').ok_or_else(|| {
                TransportError::Protocol(format!("malformed header line '{}'", line))
            })?;
            let (key, value) = if command.escapes_headers() {
                (unescape(key)?, unescape(value)?)
            } else {
                (key.to_string(), value.to_string())
            };
            if !headers.iter().any(|(k, _)| *k == key) {
                headers.push((key, value));
            }
        }

        let rest = &raw[offset..];
        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .and_then(|(_, v)| v.trim().parse::<usize>().ok());
        let body = match content_length {
            Some(len) => rest.get(..len).ok_or_else(|| {
                TransportError::Protocol(format!(
                    "content-length {} exceeds frame body of {} bytes",
                    len,
                    rest.len()
                ))
            })?,
            None => rest.split('\0').next().unwrap_or_default(),
        };

        Ok(Some(StompFrame {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, TransportError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(TransportError::Protocol(format!(
                    "undefined header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
