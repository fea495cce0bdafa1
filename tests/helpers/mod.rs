//! In-memory transport for driving a `Connection` from tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc as fmpsc;
use futures::stream;
use iridium_stomp_ws::transport::{
    EventStream, Transport, TransportError, TransportEvent, TransportMessage,
};
use iridium_stomp_ws::{Connection, StompEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

type CloseLog = Arc<Mutex<Option<(u16, Option<String>)>>>;

/// Transports handed out by a `FakeBroker`, in creation order.
pub type Links = mpsc::UnboundedReceiver<Link>;

/// Test side of one transport instance.
pub struct Link {
    inbound: Option<fmpsc::UnboundedSender<TransportEvent>>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: CloseLog,
    fail_sends: Arc<AtomicBool>,
}

impl Link {
    pub fn push(&self, event: TransportEvent) {
        if let Some(tx) = &self.inbound {
            tx.unbounded_send(event).expect("transport stream dropped");
        }
    }

    /// Deliver one text message from the "broker".
    pub fn receive(&self, text: &str) {
        self.push(TransportEvent::Message(TransportMessage::Text(text.to_string())));
    }

    pub fn receive_binary(&self, data: &[u8]) {
        self.push(TransportEvent::Message(TransportMessage::Binary(
            Bytes::copy_from_slice(data),
        )));
    }

    /// End the event stream without a close frame.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Next text written by the connection.
    pub async fn next_sent(&mut self) -> String {
        timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for an outbound message")
            .expect("transport dropped")
    }

    pub fn try_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    pub fn closed(&self) -> Option<(u16, Option<String>)> {
        self.closed.lock().clone()
    }
}

pub struct FakeTransport {
    inbound: Option<fmpsc::UnboundedReceiver<TransportEvent>>,
    sent: mpsc::UnboundedSender<String>,
    closed: CloseLog,
    fail_sends: Arc<AtomicBool>,
    refuse: bool,
    open: bool,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<EventStream, TransportError> {
        if self.refuse {
            return Err(TransportError::Connect("connection refused".into()));
        }
        let inbound = self.inbound.take().ok_or(TransportError::Closed)?;
        self.open = true;
        Ok(stream::once(async { TransportEvent::Connected })
            .chain(inbound)
            .boxed())
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("broken pipe".into()));
        }
        self.sent.send(text).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, code: u16, reason: Option<String>) -> Result<(), TransportError> {
        self.open = false;
        *self.closed.lock() = Some((code, reason));
        Ok(())
    }
}

/// Hands out fake transports and publishes the matching `Link`s.
#[derive(Clone)]
pub struct FakeBroker {
    links: mpsc::UnboundedSender<Link>,
    refuse: Arc<AtomicBool>,
}

impl FakeBroker {
    pub fn new() -> (Self, Links) {
        let (links, rx) = mpsc::unbounded_channel();
        let broker = Self {
            links,
            refuse: Arc::new(AtomicBool::new(false)),
        };
        (broker, rx)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn create(&self) -> FakeTransport {
        let (inbound_tx, inbound_rx) = fmpsc::unbounded();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closed = CloseLog::default();
        let fail_sends = Arc::new(AtomicBool::new(false));
        let _ = self.links.send(Link {
            inbound: Some(inbound_tx),
            sent: sent_rx,
            closed: closed.clone(),
            fail_sends: fail_sends.clone(),
        });
        FakeTransport {
            inbound: Some(inbound_rx),
            sent: sent_tx,
            closed,
            fail_sends,
            refuse: self.refuse.load(Ordering::SeqCst),
            open: false,
        }
    }
}

pub async fn next_link(links: &mut Links) -> Link {
    timeout(WAIT, links.recv())
        .await
        .expect("timed out waiting for a transport")
        .expect("broker dropped")
}

pub async fn next_event(conn: &Connection) -> StompEvent {
    timeout(WAIT, conn.next_event())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}
