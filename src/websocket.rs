//! WebSocket transport built on `tokio-tungstenite`.

use async_trait::async_trait;
use futures::stream::{self, SplitSink};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::transport::{EventStream, Transport, TransportError, TransportEvent, TransportMessage};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Close code used when the peer sent a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// A [`Transport`] over a single WebSocket connection.
///
/// Create one per connection attempt, typically from a factory closure:
///
/// ```no_run
/// use iridium_stomp_ws::{Connection, ConnectionConfig, WebSocketTransport};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let template = WebSocketTransport::new("ws://127.0.0.1:15674/ws")?;
/// let conn = Connection::new(move || template.fresh(), ConnectionConfig::default())?;
/// conn.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct WebSocketTransport {
    url: Url,
    sink: Option<WsSink>,
}

impl WebSocketTransport {
    /// Validate `url` (must be `ws://` or `wss://`).
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url, sink: None }),
            other => Err(TransportError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                other
            ))),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// A new, unopened transport for the same URL.
    pub fn fresh(&self) -> Self {
        Self {
            url: self.url.clone(),
            sink: None,
        }
    }
}

fn to_event(message: Result<Message, tungstenite::Error>) -> Option<TransportEvent> {
    match message {
        Ok(Message::Text(text)) => Some(TransportEvent::Message(TransportMessage::Text(
            text.as_str().to_owned(),
        ))),
        Ok(Message::Binary(data)) => Some(TransportEvent::Message(TransportMessage::Binary(data))),
        Ok(Message::Close(frame)) => {
            let (code, reason) = match frame {
                Some(frame) => {
                    let reason = frame.reason.as_str();
                    (
                        u16::from(frame.code),
                        (!reason.is_empty()).then(|| reason.to_owned()),
                    )
                }
                None => (NO_STATUS_RECEIVED, None),
            };
            Some(TransportEvent::Disconnected { code, reason })
        }
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(TransportEvent::Error(e.into())),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<EventStream, TransportError> {
        debug!(url = %self.url, "opening websocket");
        let (ws, _response) = connect_async(self.url.as_str()).await?;
        let (sink, stream) = ws.split();
        self.sink = Some(sink);

        let events = stream::once(async { TransportEvent::Connected })
            .chain(stream.filter_map(|message| async move { to_event(message) }));
        Ok(events.boxed())
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let sink = self.sink.as_mut().ok_or(TransportError::NotConnected)?;
        trace!(bytes = text.len(), "websocket send");
        sink.send(Message::text(text)).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: Option<String>) -> Result<(), TransportError> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.unwrap_or_default().into(),
        };
        sink.send(Message::Close(Some(frame))).await?;
        sink.close().await?;
        Ok(())
    }
}
