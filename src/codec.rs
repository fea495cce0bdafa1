use thiserror::Error;

use crate::frame::{Command, Frame};

/// Byte that terminates every non-heart-beat frame on the wire.
pub const NUL: char = '\0';

/// Errors produced while decoding an inbound transport message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The message contained no command line.
    #[error("frame does not contain a command")]
    NoCommand,
    /// The command is not part of the inbound vocabulary.
    #[error("undefined frame: command {command:?}, headers {headers:?}, body {body:?}")]
    UndefinedFrame {
        command: String,
        headers: Vec<(String, String)>,
        body: Option<String>,
    },
    /// A binary message could not be read as UTF-8 text.
    #[error("message is not valid utf-8")]
    InvalidUtf8,
}

/// Encode a frame into STOMP wire text.
///
/// Layout is `COMMAND\nkey:value\n...\n\n[body]\0`. Header values are not
/// escaped. The heart-beat frame encodes to a single LF with no terminator.
pub fn encode(frame: &Frame) -> String {
    if frame.is_ping() {
        return Command::Ping.as_str().to_string();
    }

    let body_len = frame.body.as_ref().map_or(0, |b| b.len());
    let mut out = String::with_capacity(64 + body_len);
    out.push_str(frame.command.as_str());
    out.push('\n');
    for (k, v) in &frame.headers {
        out.push_str(k);
        out.push(':');
        out.push_str(v);
        out.push('\n');
    }
    out.push('\n');
    if let Some(body) = &frame.body {
        out.push_str(body);
    }
    out.push(NUL);
    out
}

/// Decode one transport message into an inbound frame.
///
/// A message that is exactly one EOL (LF or CRLF) is the heart-beat.
/// Otherwise the text is split on LF: an optional leading empty line is
/// dropped, the next line is the command, non-empty lines up to the first
/// blank line are headers (split on the first colon; lines without a colon
/// are ignored), and the rest is the body. A trailing CR is stripped from the
/// command and header lines. Repeated header names keep their first value.
///
/// An empty body decodes as `None`, so a frame built with `Some("")` comes
/// back without a body.
pub fn decode(text: &str) -> Result<Frame, DecodeError> {
    if text == Command::Ping.as_str() || text == "\r\n" {
        return Ok(Frame::ping());
    }

    let text = strip_terminator(text);
    let mut lines = text.split('\n').peekable();
    if lines.peek() == Some(&"") {
        lines.next();
    }
    let command = lines.next().ok_or(DecodeError::NoCommand)?;
    let command = command.strip_suffix('\r').unwrap_or(command);

    let mut headers: Vec<(String, String)> = Vec::new();
    let mut has_body = false;
    for line in lines.by_ref() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            has_body = true;
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            if !headers.iter().any(|(k, _)| k == key) {
                headers.push((key.to_string(), value.to_string()));
            }
        }
    }

    let body = if has_body {
        let rest = lines.collect::<Vec<_>>().join("\n");
        if rest.is_empty() { None } else { Some(rest) }
    } else {
        None
    };

    match Command::from_inbound(command) {
        Some(command) => Ok(Frame {
            command,
            headers,
            body,
        }),
        None => Err(DecodeError::UndefinedFrame {
            command: command.to_string(),
            headers,
            body,
        }),
    }
}

/// Decode a binary transport message, rejecting non UTF-8 payloads.
pub fn decode_bytes(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    decode(text)
}

// Drop the NUL terminator plus any EOLs a broker sends after it.
fn strip_terminator(text: &str) -> &str {
    match text.rfind(NUL) {
        Some(pos) if text[pos + 1..].chars().all(|c| c == '\n' || c == '\r') => &text[..pos],
        _ => text,
    }
}
