use std::fmt;

use crate::heartbeat::Heartbeat;

/// Well-known STOMP header names.
pub mod header {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const ACK: &str = "ack";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const DESTINATION: &str = "destination";
    pub const DISCONNECTED: &str = "disconnected";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const HOST: &str = "host";
    pub const ID: &str = "id";
    pub const LOGIN: &str = "login";
    pub const PASSCODE: &str = "passcode";
    pub const RECEIPT: &str = "receipt";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const TRANSACTION: &str = "transaction";
}

/// Content type applied to SEND frames that do not carry one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// STOMP commands known to the client.
///
/// The outbound vocabulary is what the client sends (CONNECT through
/// DISCONNECT), the inbound vocabulary is what a broker sends (CONNECTED,
/// MESSAGE, RECEIPT, ERROR). `Ping` belongs to both: it is the bare newline
/// heart-beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Send,
    Subscribe,
    Unsubscribe,
    Begin,
    Commit,
    Abort,
    Ack,
    Disconnect,
    Connected,
    Message,
    Receipt,
    Error,
    Ping,
}

impl Command {
    /// Wire literal for this command. `Ping` is a single LF.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Ack => "ACK",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Ping => "\n",
        }
    }

    /// Resolve a command string against the inbound (broker to client)
    /// vocabulary. Outbound-only commands return `None`.
    pub fn from_inbound(command: &str) -> Option<Self> {
        match command {
            "CONNECTED" => Some(Command::Connected),
            "MESSAGE" => Some(Command::Message),
            "RECEIPT" => Some(Command::Receipt),
            "ERROR" => Some(Command::Error),
            "\n" => Some(Command::Ping),
            _ => None,
        }
    }

    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            Command::Connected
                | Command::Message
                | Command::Receipt
                | Command::Error
                | Command::Ping
        )
    }

    pub fn is_outbound(&self) -> bool {
        !self.is_inbound() || *self == Command::Ping
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ping => f.write_str("PING"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Subscription acknowledgement modes as defined by STOMP 1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    #[default]
    Auto,
    Client,
    ClientIndividual,
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
            AckMode::Client => "client",
            AckMode::ClientIndividual => "client-individual",
        }
    }
}

/// A single STOMP frame.
///
/// `Frame` contains the command, an ordered list of headers with unique
/// names, and an optional UTF-8 body. Header order is kept so encoding is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// STOMP command
    pub command: Command,
    /// Ordered headers as (key, value) pairs; keys are unique
    pub headers: Vec<(String, String)>,
    /// Optional text body
    pub body: Option<String>,
}

impl Frame {
    /// Create a new frame with the given command and empty headers/body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Set a header (builder style).
    ///
    /// If a header with the same name exists its value is replaced in place,
    /// otherwise the header is appended.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set a header on an existing frame. See [`Frame::header`].
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((key, value)),
        }
    }

    /// Set the frame body (builder style).
    pub fn set_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Get the value of a header by name (case-sensitive).
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Request a RECEIPT from the broker for this frame.
    pub fn receipt(self, receipt_id: impl Into<String>) -> Self {
        self.header(header::RECEIPT, receipt_id)
    }

    /// CONNECT frame with only the version and optional heart-beat declaration.
    pub fn connect(accept_version: impl Into<String>, heartbeat: Option<Heartbeat>) -> Self {
        let frame = Frame::new(Command::Connect).header(header::ACCEPT_VERSION, accept_version);
        match heartbeat {
            Some(hb) => frame.header(header::HEART_BEAT, hb.to_string()),
            None => frame,
        }
    }

    /// CONNECT frame carrying credentials and a virtual host.
    pub fn connect_with_login(
        accept_version: impl Into<String>,
        login: impl Into<String>,
        passcode: impl Into<String>,
        host: impl Into<String>,
        heartbeat: Option<Heartbeat>,
    ) -> Self {
        let frame = Frame::new(Command::Connect)
            .header(header::ACCEPT_VERSION, accept_version)
            .header(header::LOGIN, login)
            .header(header::PASSCODE, passcode)
            .header(header::HOST, host);
        match heartbeat {
            Some(hb) => frame.header(header::HEART_BEAT, hb.to_string()),
            None => frame,
        }
    }

    /// SEND frame with a `text/plain` body.
    pub fn send(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self::send_with_headers(
            destination,
            body,
            std::iter::empty::<(String, String)>(),
            None,
        )
    }

    /// SEND frame with caller-supplied headers.
    ///
    /// Custom headers pass through unchanged except `destination` and
    /// `content-length`, which are always overwritten, and `content-type`,
    /// which defaults to `text/plain` only when absent.
    pub fn send_with_headers<I, K, V>(
        destination: impl Into<String>,
        body: impl Into<String>,
        headers: I,
        transaction: Option<&str>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let body = body.into();
        let mut frame = Frame::new(Command::Send);
        for (k, v) in headers {
            frame.set_header(k, v);
        }
        if let Some(tx) = transaction {
            frame.set_header(header::TRANSACTION, tx);
        }
        if frame.get_header(header::CONTENT_TYPE).is_none() {
            frame.set_header(header::CONTENT_TYPE, DEFAULT_CONTENT_TYPE);
        }
        frame.set_header(header::DESTINATION, destination);
        frame.set_header(header::CONTENT_LENGTH, body.len().to_string());
        frame.body = Some(body);
        frame
    }

    /// SUBSCRIBE frame with an explicit subscription id and ack mode.
    pub fn subscribe(destination: impl Into<String>, id: impl Into<String>, ack: AckMode) -> Self {
        Frame::new(Command::Subscribe)
            .header(header::DESTINATION, destination)
            .header(header::ID, id)
            .header(header::ACK, ack.as_str())
    }

    /// SUBSCRIBE frame built from caller headers; `destination` is always
    /// set from the argument.
    pub fn subscribe_with_headers<I, K, V>(destination: impl Into<String>, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut frame = Frame::new(Command::Subscribe);
        for (k, v) in headers {
            frame.set_header(k, v);
        }
        frame.header(header::DESTINATION, destination)
    }

    pub fn unsubscribe(id: impl Into<String>) -> Self {
        Frame::new(Command::Unsubscribe).header(header::ID, id)
    }

    /// ACK frame. The message id travels in the `id` header.
    pub fn ack(message_id: impl Into<String>, subscription: Option<&str>) -> Self {
        let frame = Frame::new(Command::Ack).header(header::ID, message_id);
        match subscription {
            Some(sub) => frame.header(header::SUBSCRIPTION, sub),
            None => frame,
        }
    }

    pub fn begin(transaction: impl Into<String>) -> Self {
        Frame::new(Command::Begin).header(header::TRANSACTION, transaction)
    }

    pub fn commit(transaction: impl Into<String>) -> Self {
        Frame::new(Command::Commit).header(header::TRANSACTION, transaction)
    }

    pub fn abort(transaction: impl Into<String>) -> Self {
        Frame::new(Command::Abort).header(header::TRANSACTION, transaction)
    }

    /// DISCONNECT frame stamped with the current Unix time (seconds) in the
    /// `disconnected` header.
    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect).header(
            header::DISCONNECTED,
            chrono::Utc::now().timestamp().to_string(),
        )
    }

    /// The heart-beat frame: no headers, no body.
    pub fn ping() -> Self {
        Frame::new(Command::Ping)
    }

    pub fn is_ping(&self) -> bool {
        self.command == Command::Ping
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Command: {}", self.command)?;
        for (k, v) in &self.headers {
            writeln!(f, "{}: {}", k, v)?;
        }
        let len = self.body.as_ref().map_or(0, |b| b.len());
        writeln!(f, "Body ({} bytes)", len)
    }
}
