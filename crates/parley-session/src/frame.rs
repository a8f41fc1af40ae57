//! STOMP 1.2 frame codec.
//!
//! A frame is a command line, header lines, a blank line, a body and a NUL
//! terminator. One transport message may carry several frames, and a bare
//! EOL between frames is a heart-beat. Header values are escaped except on
//! `CONNECT` and `CONNECTED`.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use parley_core::{AuthToken, SubscriptionId, TopicPath};
use thiserror::Error;

/// Protocol version offered on CONNECT.
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Why a transport message could not be decoded.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The command line is not a STOMP command.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    /// A header line has no colon.
    #[error("header line without colon: {0:?}")]
    InvalidHeader(String),
    /// A header uses an escape sequence STOMP does not define.
    #[error("undefined escape sequence in header {0:?}")]
    InvalidEscape(String),
    /// The frame ended before its NUL terminator.
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,
    /// `content-length` is not a number or overruns the message.
    #[error("bad content-length {0:?}")]
    ContentLength(String),
    /// Command or headers are not UTF-8.
    #[error("frame head is not UTF-8")]
    Utf8,
}

// ─────────────────────────────────────────────────────────────────────────────
// Command
// ─────────────────────────────────────────────────────────────────────────────

/// STOMP frame command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client: open a session.
    Connect,
    /// Client: open a session (1.2 alias).
    Stomp,
    /// Server: session accepted.
    Connected,
    /// Client: publish.
    Send,
    /// Client: start a subscription.
    Subscribe,
    /// Client: end a subscription.
    Unsubscribe,
    /// Client: acknowledge a message.
    Ack,
    /// Client: reject a message.
    Nack,
    /// Client: begin a transaction.
    Begin,
    /// Client: commit a transaction.
    Commit,
    /// Client: abort a transaction.
    Abort,
    /// Client: close the session.
    Disconnect,
    /// Server: subscription delivery.
    Message,
    /// Server: receipt for a client frame.
    Receipt,
    /// Server: error, usually followed by close.
    Error,
}

impl Command {
    /// Wire spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame
// ─────────────────────────────────────────────────────────────────────────────

/// One STOMP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; the first wins.
    pub headers: Vec<(String, String)>,
    /// Raw body.
    pub body: Bytes,
}

impl Frame {
    /// Frame with no headers and an empty body.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // ── Client frames ───────────────────────────────────────────────

    /// CONNECT carrying the bearer credential and our heart-beat offer.
    #[must_use]
    pub fn connect(token: &AuthToken, heart_beat: (u64, u64)) -> Self {
        Self::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("heart-beat", format!("{},{}", heart_beat.0, heart_beat.1))
            .header("Authorization", token.bearer())
    }

    /// SUBSCRIBE `topic` under subscription `id`.
    #[must_use]
    pub fn subscribe(id: &SubscriptionId, topic: &TopicPath) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id.as_str())
            .header("destination", topic.as_str())
            .header("ack", "auto")
    }

    /// UNSUBSCRIBE subscription `id`.
    #[must_use]
    pub fn unsubscribe(id: &SubscriptionId) -> Self {
        Self::new(Command::Unsubscribe).header("id", id.as_str())
    }

    /// SEND a JSON body to `destination`.
    #[must_use]
    pub fn send_json(destination: &TopicPath, json: String) -> Self {
        Self::new(Command::Send)
            .header("destination", destination.as_str())
            .header("content-type", "application/json")
            .header("content-length", json.len().to_string())
            .body(json)
    }

    /// DISCONNECT.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    // ── Encoding ────────────────────────────────────────────────────

    /// Serialize to wire bytes, NUL terminator included.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let escape = self.command.escapes_headers();
        let mut buf = BytesMut::with_capacity(64 + self.body.len());
        buf.put_slice(self.command.as_str().as_bytes());
        buf.put_u8(b'\n');
        for (name, value) in &self.headers {
            if escape {
                put_escaped(&mut buf, name);
                buf.put_u8(b':');
                put_escaped(&mut buf, value);
            } else {
                buf.put_slice(name.as_bytes());
                buf.put_u8(b':');
                buf.put_slice(value.as_bytes());
            }
            buf.put_u8(b'\n');
        }
        buf.put_u8(b'\n');
        buf.put_slice(&self.body);
        buf.put_u8(0);
        buf.freeze()
    }
}

/// Heart-beat frame (a single EOL).
#[must_use]
pub fn heartbeat() -> Bytes {
    Bytes::from_static(b"\n")
}

/// Parse a `heart-beat` header value `"<x>,<y>"`.
pub fn parse_heart_beat(value: &str) -> Option<(u64, u64)> {
    let (x, y) = value.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Decode every frame in one transport message.
///
/// Bare EOLs are heart-beats and yield nothing, so a pure heart-beat message
/// decodes to an empty vec. Any malformed frame fails the whole message; see
/// [`decode_partial`] to keep the frames before it.
pub fn decode(data: &Bytes) -> Result<Vec<Frame>, FrameError> {
    match decode_partial(data) {
        (frames, None) => Ok(frames),
        (_, Some(err)) => Err(err),
    }
}

/// Decode frames up to the first malformed one.
///
/// Returns the frames before the failure together with the error, if any.
/// Nothing after a malformed frame is decoded.
pub fn decode_partial(data: &Bytes) -> (Vec<Frame>, Option<FrameError>) {
    let mut frames = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        match data[pos] {
            b'\n' => pos += 1,
            b'\r' if data.get(pos + 1) == Some(&b'\n') => pos += 2,
            _ => match decode_one(data, pos) {
                Ok((frame, next)) => {
                    frames.push(frame);
                    pos = next;
                }
                Err(err) => return (frames, Some(err)),
            },
        }
    }

    (frames, None)
}

fn decode_one(data: &Bytes, start: usize) -> Result<(Frame, usize), FrameError> {
    let mut pos = start;
    let command_line = read_line(data, &mut pos)?;
    let command: Command = command_line.parse()?;
    let escaped = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let line = read_line(data, &mut pos)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::InvalidHeader(line.to_string()))?;
        if escaped {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| FrameError::ContentLength(v.clone()))
        })
        .transpose()?;

    let body_end = match content_length {
        Some(len) => {
            let end = pos
                .checked_add(len)
                .filter(|&end| end < data.len())
                .ok_or_else(|| FrameError::ContentLength(len.to_string()))?;
            if data[end] != 0 {
                return Err(FrameError::MissingTerminator);
            }
            end
        }
        None => {
            pos + data[pos..]
                .iter()
                .position(|&b| b == 0)
                .ok_or(FrameError::MissingTerminator)?
        }
    };

    let frame = Frame {
        command,
        headers,
        body: data.slice(pos..body_end),
    };
    Ok((frame, body_end + 1))
}

/// Read up to the next LF, dropping an optional trailing CR.
fn read_line<'a>(data: &'a Bytes, pos: &mut usize) -> Result<&'a str, FrameError> {
    let rest = &data[*pos..];
    let len = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(FrameError::MissingTerminator)?;
    *pos += len + 1;
    let line = rest[..len].strip_suffix(b"\r").unwrap_or(&rest[..len]);
    std::str::from_utf8(line).map_err(|_| FrameError::Utf8)
}

fn put_escaped(buf: &mut BytesMut, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '\\' => buf.put_slice(b"\\\\"),
            '\n' => buf.put_slice(b"\\n"),
            '\r' => buf.put_slice(b"\\r"),
            ':' => buf.put_slice(b"\\c"),
            other => {
                let mut tmp = [0u8; 4];
                buf.put_slice(other.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn bytes(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn encode_connect_is_unescaped() {
        let frame = Frame::connect(&AuthToken::new("abc:def"), (4000, 4000));
        let wire = frame.encode();
        assert_eq!(
            wire,
            bytes("CONNECT\naccept-version:1.2,1.1,1.0\nheart-beat:4000,4000\nAuthorization:Bearer abc:def\n\n\0")
        );
    }

    #[test]
    fn encode_subscribe() {
        let id = SubscriptionId::from("sub-1");
        let wire = Frame::subscribe(&id, &TopicPath::new("/topic/room/42")).encode();
        assert_eq!(
            wire,
            bytes("SUBSCRIBE\nid:sub-1\ndestination:/topic/room/42\nack:auto\n\n\0")
        );
    }

    #[test]
    fn encode_send_carries_content_length() {
        let wire = Frame::send_json(&TopicPath::new("/app/send"), r#"{"a":1}"#.to_string()).encode();
        let frames = decode(&wire).unwrap();
        assert_eq!(frames[0].command, Command::Send);
        assert_eq!(frames[0].get("content-length"), Some("7"));
        assert_eq!(frames[0].body, bytes(r#"{"a":1}"#));
    }

    #[test]
    fn header_escaping_on_message_frames() {
        let frame = Frame::new(Command::Send).header("note", "a:b\\c\nd");
        let wire = frame.encode();
        assert_eq!(wire, bytes("SEND\nnote:a\\cb\\\\c\\nd\n\n\0"));
        assert_eq!(decode(&wire).unwrap()[0].get("note"), Some("a:b\\c\nd"));
    }

    #[test]
    fn decode_connected() {
        let frames = decode(&bytes("CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0")).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::Connected);
        assert_eq!(frames[0].get("version"), Some("1.2"));
        assert!(frames[0].body.is_empty());
    }

    #[test]
    fn decode_message_with_crlf_and_trailing_eols() {
        let raw = "MESSAGE\r\ndestination:/topic/room/1\r\nsubscription:s\r\n\r\n{\"content\":\"hi\"}\0\n\n";
        let frames = decode(&bytes(raw)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].get("destination"), Some("/topic/room/1"));
        assert_eq!(frames[0].body, bytes("{\"content\":\"hi\"}"));
    }

    #[test]
    fn decode_multiple_frames() {
        let raw = "RECEIPT\nreceipt-id:1\n\n\0\nMESSAGE\ndestination:/x\n\nbody\0";
        let frames = decode(&bytes(raw)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::Receipt);
        assert_eq!(frames[1].command, Command::Message);
    }

    #[test]
    fn decode_heartbeat_only() {
        assert!(decode(&bytes("\n")).unwrap().is_empty());
        assert!(decode(&bytes("\r\n\n")).unwrap().is_empty());
        assert!(decode(&heartbeat()).unwrap().is_empty());
    }

    #[test]
    fn content_length_allows_embedded_nul() {
        let raw = b"MESSAGE\ndestination:/x\ncontent-length:3\n\na\0b\0";
        let frames = decode(&Bytes::from_static(raw)).unwrap();
        assert_eq!(frames[0].body, Bytes::from_static(b"a\0b"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let frames = decode(&bytes("MESSAGE\nfoo:1\nfoo:2\n\n\0")).unwrap();
        assert_eq!(frames[0].get("foo"), Some("1"));
    }

    #[test]
    fn decode_errors() {
        assert_matches!(decode(&bytes("HELLO\n\n\0")), Err(FrameError::UnknownCommand(c)) if c == "HELLO");
        assert_matches!(decode(&bytes("MESSAGE\nnocolon\n\n\0")), Err(FrameError::InvalidHeader(_)));
        assert_matches!(decode(&bytes("MESSAGE\n\nbody")), Err(FrameError::MissingTerminator));
        assert_matches!(decode(&bytes("MESSAGE")), Err(FrameError::MissingTerminator));
        assert_matches!(decode(&bytes("MESSAGE\nx:\\t\n\n\0")), Err(FrameError::InvalidEscape(_)));
        assert_matches!(
            decode(&bytes("MESSAGE\ncontent-length:99\n\nab\0")),
            Err(FrameError::ContentLength(_))
        );
        assert_matches!(
            decode(&bytes("MESSAGE\ncontent-length:x\n\nab\0")),
            Err(FrameError::ContentLength(_))
        );
    }

    #[test]
    fn frames_before_a_bad_one_survive() {
        let wire = bytes("MESSAGE\ndestination:/a\n\none\0\nMESSAGE\ndestination:/b\n\ntwo\0HELLO\n\n\0");
        let (frames, err) = decode_partial(&wire);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].get("destination"), Some("/b"));
        assert_matches!(err, Some(FrameError::UnknownCommand(c)) if c == "HELLO");
        assert_matches!(decode(&wire), Err(FrameError::UnknownCommand(_)));

        let (frames, err) = decode_partial(&bytes("\nMESSAGE\n\nok\0\n"));
        assert_eq!(frames.len(), 1);
        assert!(err.is_none());
    }

    #[test]
    fn command_round_trip() {
        for cmd in [Command::Connect, Command::Message, Command::Error, Command::Unsubscribe] {
            assert_eq!(cmd.as_str().parse::<Command>().unwrap(), cmd);
        }
    }

    #[test]
    fn parse_heart_beat_header() {
        assert_eq!(parse_heart_beat("4000,4000"), Some((4000, 4000)));
        assert_eq!(parse_heart_beat("0, 10000"), Some((0, 10_000)));
        assert_eq!(parse_heart_beat("fast"), None);
    }
}
