//! Transport contract the STOMP engine runs over.
//!
//! The engine needs a message-oriented, full-duplex channel (a WebSocket in
//! practice). Each inbound message carries one STOMP frame or heart-beat.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// WebSocket close code for a normal, intentional closure.
pub const NORMAL_CLOSURE: u16 = 1000;
/// WebSocket close code reported when the channel dropped without a close.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Errors reported by a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The channel could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),
    /// A message could not be written.
    #[error("send failed: {0}")]
    Send(String),
    /// No channel is open.
    #[error("transport is not connected")]
    NotConnected,
    /// The channel was closed underneath the caller.
    #[error("transport closed")]
    Closed,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(Box::new(err))
    }
}

/// Payload of one inbound transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    Text(String),
    Binary(Bytes),
}

/// Events produced by an open transport, in arrival order.
#[derive(Debug)]
pub enum TransportEvent {
    /// The channel is open.
    Connected,
    /// The peer closed the channel.
    Disconnected { code: u16, reason: Option<String> },
    /// One inbound message.
    Message(TransportMessage),
    /// The channel failed; no further events follow.
    Error(TransportError),
}

/// Stream of events for one opened channel.
pub type EventStream = BoxStream<'static, TransportEvent>;

/// A full-duplex message channel.
///
/// A `Transport` value represents a single channel lifetime: the engine
/// creates a fresh one through a [`TransportFactory`] on every connect and
/// reconnect, and drops it after `close`.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Open the channel and return its event stream. The stream is expected
    /// to yield [`TransportEvent::Connected`] once the channel is usable.
    async fn connect(&mut self) -> Result<EventStream, TransportError>;

    /// Write one text message.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the channel with a WebSocket-style close code.
    async fn close(&mut self, code: u16, reason: Option<String>) -> Result<(), TransportError>;
}

/// Creates a fresh [`Transport`] for each connection attempt.
///
/// Implemented for any `FnMut() -> T` closure where `T: Transport`.
pub trait TransportFactory: Send + 'static {
    fn create(&mut self) -> Box<dyn Transport>;
}

impl<F, T> TransportFactory for F
where
    F: FnMut() -> T + Send + 'static,
    T: Transport,
{
    fn create(&mut self) -> Box<dyn Transport> {
        Box::new(self())
    }
}
