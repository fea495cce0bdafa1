use futures::{StreamExt, future};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, DecodeError};
use crate::frame::{AckMode, Frame};
use crate::heartbeat::{Heartbeat, HeartbeatCoordinator, HeartbeatError, HeartbeatSignal};
use crate::transport::{
    ABNORMAL_CLOSURE, EventStream, NORMAL_CLOSURE, Transport, TransportError, TransportEvent,
    TransportFactory, TransportMessage,
};

/// Errors returned by `Connection` operations.
#[derive(Error, Debug)]
pub enum ConnError {
    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Invalid heart-beat configuration
    #[error("heart-beat configuration error: {0}")]
    Heartbeat(#[from] HeartbeatError),
    /// `connect` was called while a transport is already open
    #[error("already connected")]
    AlreadyConnected,
    /// A pending reconnect was superseded or the connection was closed
    #[error("reconnect cancelled")]
    Cancelled,
    /// The background task is gone (the connection was closed)
    #[error("connection closed")]
    Closed,
}

/// Failures reported asynchronously through [`StompEvent::Error`].
///
/// None of these close the process; decode and heart-beat errors do not
/// close the connection either.
#[derive(Error, Debug)]
pub enum StompError {
    #[error("transport error: {0}")]
    Transport(TransportError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("heart-beat error: {0}")]
    Heartbeat(#[from] HeartbeatError),
    #[error("heart-beat ping failed: {0}")]
    Ping(TransportError),
    #[error("sending DISCONNECT after heart-beat timeout failed: {0}")]
    WatchdogDisconnect(TransportError),
}

/// Lifecycle of the underlying transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed { code: u16, reason: Option<String> },
}

/// Events delivered to the application, in the order they happened.
#[derive(Debug)]
pub enum StompEvent {
    /// The transport is open. Send a CONNECT frame next.
    Connected,
    /// A frame arrived from the broker.
    Frame(Frame),
    /// The transport closed.
    Disconnected { code: u16, reason: Option<String> },
    /// A non-fatal failure.
    Error(StompError),
}

/// Configuration for a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Heart-beat declared in CONNECT.
    pub heartbeat: Heartbeat,
    /// How much earlier than the negotiated interval pings are sent.
    pub send_leeway: Duration,
    /// Close code used when the heart-beat watchdog tears the session down.
    pub watchdog_close_code: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat: Heartbeat::default(),
            send_leeway: Duration::ZERO,
            watchdog_close_code: NORMAL_CLOSURE,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn send_leeway(mut self, leeway: Duration) -> Self {
        self.send_leeway = leeway;
        self
    }

    pub fn watchdog_close_code(mut self, code: u16) -> Self {
        self.watchdog_close_code = code;
        self
    }
}

type Reply = oneshot::Sender<Result<(), ConnError>>;

enum Control {
    Connect { reply: Reply },
    Reconnect { delay: Duration, reply: Reply },
    Disconnect { code: u16, reason: Option<String>, reply: Reply },
    Send { frame: Frame, reply: Reply },
}

/// Handle to a STOMP session running over a [`Transport`].
///
/// `Connection::new` spawns a background task that owns the transport,
/// decodes inbound messages, feeds the heart-beat coordinator and turns its
/// timers into PING and DISCONNECT frames. All writes go through that task,
/// so they are serialized. The handle is cheap to clone.
///
/// The engine never reconnects on its own: watch for
/// [`StompEvent::Disconnected`] / [`StompEvent::Error`] and call
/// [`Connection::reconnect`] with whatever backoff suits the application.
#[derive(Clone)]
pub struct Connection {
    control_tx: mpsc::Sender<Control>,
    /// Shared behind a mutex so clones can call `next_event` concurrently.
    events_rx: Arc<Mutex<mpsc::UnboundedReceiver<StompEvent>>>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    heartbeat: Heartbeat,
}

impl Connection {
    /// Create a connection. Nothing is opened until [`Connection::connect`].
    ///
    /// Must be called from within a tokio runtime. Fails when the heart-beat
    /// configuration is invalid (send leeway not below the declared send
    /// interval).
    pub fn new<F>(factory: F, config: ConnectionConfig) -> Result<Self, ConnError>
    where
        F: TransportFactory,
    {
        let heartbeat = HeartbeatCoordinator::new(config.heartbeat, config.send_leeway)?;

        let (control_tx, control_rx) = mpsc::channel::<Control>(32);
        let (events_tx, events_rx) = mpsc::unbounded_channel::<StompEvent>();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let shutdown = CancellationToken::new();

        let driver = Driver {
            factory: Box::new(factory),
            transport: None,
            inbound: None,
            heartbeat,
            heartbeat_rx: None,
            pending_reconnect: None,
            control_rx,
            events_tx,
            state_tx,
            shutdown: shutdown.clone(),
            watchdog_close_code: config.watchdog_close_code,
        };
        tokio::spawn(driver.run());

        Ok(Connection {
            control_tx,
            events_rx: Arc::new(Mutex::new(events_rx)),
            state_rx,
            shutdown,
            heartbeat: config.heartbeat,
        })
    }

    /// Open a fresh transport. Resolves once the transport's connect
    /// operation succeeded; [`StompEvent::Connected`] follows when the
    /// channel reports itself open.
    pub async fn connect(&self) -> Result<(), ConnError> {
        self.request(|reply| Control::Connect { reply }).await
    }

    /// Tear down the current transport, wait `delay`, then connect again.
    ///
    /// The wait does not block the connection: it is cancelled by
    /// `disconnect`, `connect`, `close` or a newer `reconnect`, in which case
    /// this returns [`ConnError::Cancelled`].
    pub async fn reconnect(&self, delay: Duration) -> Result<(), ConnError> {
        self.request(|reply| Control::Reconnect { delay, reply }).await
    }

    /// Close the transport with the given close code and reason.
    pub async fn disconnect(&self, code: u16, reason: Option<String>) -> Result<(), ConnError> {
        self.request(|reply| Control::Disconnect {
            code,
            reason,
            reply,
        })
        .await
    }

    /// Encode `frame` and hand it to the transport. The transport's result
    /// is the only delivery feedback.
    pub async fn send_frame(&self, frame: Frame) -> Result<(), ConnError> {
        self.request(|reply| Control::Send { frame, reply }).await
    }

    /// Receive the next event. Returns `None` once the connection is closed
    /// and every event has been drained.
    pub async fn next_event(&self) -> Option<StompEvent> {
        self.events_rx.lock().await.recv().await
    }

    /// Current transport state.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Wait until the state changes and return the new value.
    pub async fn state_changed(&mut self) -> Result<ConnectionState, ConnError> {
        self.state_rx
            .changed()
            .await
            .map_err(|_| ConnError::Closed)?;
        Ok(self.state_rx.borrow_and_update().clone())
    }

    /// CONNECT frame declaring this connection's heart-beat configuration.
    pub fn connect_frame(&self, accept_version: &str) -> Frame {
        Frame::connect(accept_version, Some(self.heartbeat))
    }

    /// Send a `text/plain` message to `destination`.
    pub async fn send(&self, destination: &str, body: &str) -> Result<(), ConnError> {
        self.send_frame(Frame::send(destination, body)).await
    }

    pub async fn subscribe(
        &self,
        destination: &str,
        id: &str,
        ack: AckMode,
    ) -> Result<(), ConnError> {
        self.send_frame(Frame::subscribe(destination, id, ack)).await
    }

    pub async fn unsubscribe(&self, id: &str) -> Result<(), ConnError> {
        self.send_frame(Frame::unsubscribe(id)).await
    }

    pub async fn ack(&self, message_id: &str, subscription: Option<&str>) -> Result<(), ConnError> {
        self.send_frame(Frame::ack(message_id, subscription)).await
    }

    /// Begin a transaction.
    pub async fn begin(&self, transaction_id: &str) -> Result<(), ConnError> {
        self.send_frame(Frame::begin(transaction_id)).await
    }

    /// Commit a transaction.
    pub async fn commit(&self, transaction_id: &str) -> Result<(), ConnError> {
        self.send_frame(Frame::commit(transaction_id)).await
    }

    /// Abort a transaction.
    pub async fn abort(&self, transaction_id: &str) -> Result<(), ConnError> {
        self.send_frame(Frame::abort(transaction_id)).await
    }

    /// Stop the background task. An open transport is closed normally and a
    /// final [`StompEvent::Disconnected`] is emitted.
    pub async fn close(self) {
        self.shutdown.cancel();
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Control) -> Result<(), ConnError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(make(tx))
            .await
            .map_err(|_| ConnError::Closed)?;
        rx.await.map_err(|_| ConnError::Closed)?
    }
}

struct PendingReconnect {
    deadline: Instant,
    reply: Reply,
}

/// Background task owning the transport.
struct Driver {
    factory: Box<dyn TransportFactory>,
    transport: Option<Box<dyn Transport>>,
    inbound: Option<EventStream>,
    heartbeat: HeartbeatCoordinator,
    heartbeat_rx: Option<mpsc::UnboundedReceiver<HeartbeatSignal>>,
    pending_reconnect: Option<PendingReconnect>,
    control_rx: mpsc::Receiver<Control>,
    events_tx: mpsc::UnboundedSender<StompEvent>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    watchdog_close_code: u16,
}

async fn next_inbound(inbound: &mut Option<EventStream>) -> Option<TransportEvent> {
    match inbound {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}

async fn next_signal(
    rx: &mut Option<mpsc::UnboundedReceiver<HeartbeatSignal>>,
) -> Option<HeartbeatSignal> {
    match rx {
        Some(rx) => rx.recv().await,
        None => future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

impl Driver {
    async fn run(mut self) {
        loop {
            let deadline = self.pending_reconnect.as_ref().map(|p| p.deadline);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                control = self.control_rx.recv() => match control {
                    Some(control) => self.handle_control(control).await,
                    None => break,
                },
                event = next_inbound(&mut self.inbound) => self.handle_transport_event(event).await,
                signal = next_signal(&mut self.heartbeat_rx) => self.handle_heartbeat(signal).await,
                _ = wait_until(deadline) => self.fire_reconnect().await,
            }
        }

        debug!("connection task shutting down");
        self.cancel_pending_reconnect();
        self.close_transport(NORMAL_CLOSURE, None).await;
    }

    fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        trace!(?state, "state change");
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: StompEvent) {
        if self.events_tx.send(event).is_err() {
            trace!("event dropped: no receiver");
        }
    }

    async fn handle_control(&mut self, control: Control) {
        match control {
            Control::Connect { reply } => {
                let result = match self.state() {
                    ConnectionState::Connecting
                    | ConnectionState::Open
                    | ConnectionState::Closing => Err(ConnError::AlreadyConnected),
                    ConnectionState::Idle | ConnectionState::Closed { .. } => {
                        self.cancel_pending_reconnect();
                        self.open().await
                    }
                };
                let _ = reply.send(result);
            }
            Control::Reconnect { delay, reply } => {
                self.cancel_pending_reconnect();
                self.close_transport(NORMAL_CLOSURE, None).await;
                debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                self.pending_reconnect = Some(PendingReconnect {
                    deadline: Instant::now() + delay,
                    reply,
                });
            }
            Control::Disconnect {
                code,
                reason,
                reply,
            } => {
                self.cancel_pending_reconnect();
                self.close_transport(code, reason).await;
                let _ = reply.send(Ok(()));
            }
            Control::Send { frame, reply } => {
                let result = self.write(&frame).await.map_err(ConnError::from);
                let _ = reply.send(result);
            }
        }
    }

    async fn fire_reconnect(&mut self) {
        if let Some(pending) = self.pending_reconnect.take() {
            let result = self.open().await;
            let _ = pending.reply.send(result);
        }
    }

    fn cancel_pending_reconnect(&mut self) {
        if let Some(pending) = self.pending_reconnect.take() {
            debug!("pending reconnect cancelled");
            let _ = pending.reply.send(Err(ConnError::Cancelled));
        }
    }

    /// Create a fresh transport and run its connect operation.
    async fn open(&mut self) -> Result<(), ConnError> {
        let mut transport = self.factory.create();
        self.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            result = transport.connect() => result,
            _ = self.shutdown.cancelled() => Err(TransportError::Closed),
        };
        match connected {
            Ok(stream) => {
                debug!("transport connect succeeded");
                self.transport = Some(transport);
                self.inbound = Some(stream);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "transport connect failed");
                self.set_state(ConnectionState::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: Some(e.to_string()),
                });
                Err(e.into())
            }
        }
    }

    async fn write(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::NotConnected)?;
        trace!(command = %frame.command, "sending frame");
        transport.send(codec::encode(frame)).await
    }

    /// Forget the transport and stop the receive loop and the timers.
    fn release(&mut self) -> Option<Box<dyn Transport>> {
        self.heartbeat.cancel_all();
        self.heartbeat_rx = None;
        self.inbound = None;
        self.transport.take()
    }

    /// Locally initiated close. Emits `Disconnected` if a transport was open.
    async fn close_transport(&mut self, code: u16, reason: Option<String>) {
        let Some(mut transport) = self.release() else {
            return;
        };
        self.set_state(ConnectionState::Closing);
        if let Err(e) = transport.close(code, reason.clone()).await {
            debug!(error = %e, "transport close reported an error");
        }
        info!(code, ?reason, "disconnected");
        self.set_state(ConnectionState::Closed {
            code,
            reason: reason.clone(),
        });
        self.emit(StompEvent::Disconnected { code, reason });
    }

    async fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Connected) => {
                info!("transport connected");
                self.set_state(ConnectionState::Open);
                // Fresh channel per session: signals queued by an earlier
                // session are dropped with the old receiver.
                let (tx, rx) = mpsc::unbounded_channel();
                self.heartbeat.register(tx);
                self.heartbeat_rx = Some(rx);
                self.emit(StompEvent::Connected);
            }
            Some(TransportEvent::Message(TransportMessage::Text(text))) => {
                self.dispatch(codec::decode(&text));
            }
            Some(TransportEvent::Message(TransportMessage::Binary(data))) => {
                self.dispatch(codec::decode_bytes(&data));
            }
            Some(TransportEvent::Disconnected { code, reason }) => {
                info!(code, ?reason, "transport closed by peer");
                self.release();
                self.set_state(ConnectionState::Closed {
                    code,
                    reason: reason.clone(),
                });
                self.emit(StompEvent::Disconnected { code, reason });
            }
            Some(TransportEvent::Error(e)) => {
                warn!(error = %e, "transport error");
                self.release();
                self.set_state(ConnectionState::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: Some(e.to_string()),
                });
                self.emit(StompEvent::Error(StompError::Transport(e)));
            }
            None => {
                info!("transport stream ended");
                self.release();
                self.set_state(ConnectionState::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: None,
                });
                self.emit(StompEvent::Disconnected {
                    code: ABNORMAL_CLOSURE,
                    reason: None,
                });
            }
        }
    }

    fn dispatch(&mut self, decoded: Result<Frame, DecodeError>) {
        match decoded {
            Ok(frame) => {
                trace!(command = %frame.command, "frame received");
                self.emit(StompEvent::Frame(frame.clone()));
                if let Err(e) = self.heartbeat.on_frame(&frame) {
                    warn!(error = %e, "heart-beat negotiation failed");
                    self.emit(StompEvent::Error(StompError::Heartbeat(e)));
                }
            }
            Err(e) => {
                debug!(error = %e, "dropping undecodable message");
                self.emit(StompEvent::Error(StompError::Decode(e)));
            }
        }
    }

    async fn handle_heartbeat(&mut self, signal: Option<HeartbeatSignal>) {
        match signal {
            // sink dropped by cancel_all
            None => self.heartbeat_rx = None,
            Some(HeartbeatSignal::Ping) => {
                if let Err(e) = self.write(&Frame::ping()).await {
                    warn!(error = %e, "heart-beat ping failed");
                    self.emit(StompEvent::Error(StompError::Ping(e)));
                }
            }
            Some(HeartbeatSignal::WatchdogExpired) => {
                // Inbound messages still queued behind the expiry are dropped
                // with the stream.
                if let Err(e) = self.write(&Frame::disconnect()).await {
                    warn!(error = %e, "DISCONNECT after heart-beat timeout failed");
                    self.emit(StompEvent::Error(StompError::WatchdogDisconnect(e)));
                }
                self.close_transport(
                    self.watchdog_close_code,
                    Some("heart-beat timeout".to_string()),
                )
                .await;
            }
        }
    }
}
