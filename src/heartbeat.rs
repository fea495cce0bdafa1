use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::frame::{Command, Frame, header};

/// Errors raised while reading or applying `heart-beat` declarations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatError {
    #[error("client heart-beat declaration has no comma")]
    NoClientComma,
    #[error("server heart-beat declaration has no comma")]
    NoServerComma,
    #[error("can not parse client heart-beat declaration {0:?}")]
    CantParseClient(String),
    #[error("can not parse server heart-beat declaration {0:?}")]
    CantParseServer(String),
    #[error("send leeway {leeway_ms}ms must be smaller than the ping interval {ping_ms}ms")]
    LeewayTooLarge { leeway_ms: u128, ping_ms: u64 },
}

/// A `heart-beat` declaration: `"<send_ms>,<receive_ms>"`.
///
/// For the client, `send_ms` is the smallest interval at which it can send
/// heart-beats and `receive_ms` the interval at which it wants to receive
/// them. A value of 0 means "cannot" / "do not want".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub send_ms: u32,
    pub receive_ms: u32,
}

impl Heartbeat {
    pub fn new(send_ms: u32, receive_ms: u32) -> Self {
        Self {
            send_ms,
            receive_ms,
        }
    }

    /// Heart-beats disabled in both directions (`0,0`).
    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    /// The same interval in both directions. Saturates at `u32::MAX` ms.
    pub fn from_duration(interval: Duration) -> Self {
        let ms = u32::try_from(interval.as_millis()).unwrap_or(u32::MAX);
        Self::new(ms, ms)
    }

    /// Parse a declaration received from the broker.
    pub fn parse_server(value: &str) -> Result<Self, HeartbeatError> {
        parse_pair(value).map_err(|e| match e {
            PairError::NoComma => HeartbeatError::NoServerComma,
            PairError::NotNumeric => HeartbeatError::CantParseServer(value.to_string()),
        })
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(10000, 10000)
    }
}

impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.send_ms, self.receive_ms)
    }
}

/// Parses the client side of a declaration.
impl FromStr for Heartbeat {
    type Err = HeartbeatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_pair(value).map_err(|e| match e {
            PairError::NoComma => HeartbeatError::NoClientComma,
            PairError::NotNumeric => HeartbeatError::CantParseClient(value.to_string()),
        })
    }
}

enum PairError {
    NoComma,
    NotNumeric,
}

fn parse_pair(value: &str) -> Result<Heartbeat, PairError> {
    let (x, y) = value.split_once(',').ok_or(PairError::NoComma)?;
    let x = x.trim().parse::<u32>().map_err(|_| PairError::NotNumeric)?;
    let y = y.trim().parse::<u32>().map_err(|_| PairError::NotNumeric)?;
    Ok(Heartbeat::new(x, y))
}

/// Negotiate heartbeat intervals between client and server.
///
/// Returns `(outgoing, incoming)`. A direction is disabled (`None`) when
/// either side declares 0 for it; otherwise the larger of the two values
/// wins.
pub fn negotiate_heartbeats(
    client_out: u64,
    client_in: u64,
    server_out: u64,
    server_in: u64,
) -> (Option<Duration>, Option<Duration>) {
    fn direction(ours: u64, theirs: u64) -> Option<Duration> {
        if ours == 0 || theirs == 0 {
            None
        } else {
            Some(Duration::from_millis(ours.max(theirs)))
        }
    }
    (
        direction(client_out, server_in),
        direction(client_in, server_out),
    )
}

/// Effective periods after negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedHeartbeat {
    /// How often the client must send a heart-beat.
    pub ping: Option<Duration>,
    /// How long the client tolerates silence from the broker.
    pub watchdog: Option<Duration>,
}

impl NegotiatedHeartbeat {
    pub fn between(client: Heartbeat, server: Heartbeat) -> Self {
        let (ping, watchdog) = negotiate_heartbeats(
            client.send_ms.into(),
            client.receive_ms.into(),
            server.send_ms.into(),
            server.receive_ms.into(),
        );
        Self { ping, watchdog }
    }
}

/// Parse both declarations and negotiate them.
pub fn negotiate(client: &str, server: &str) -> Result<NegotiatedHeartbeat, HeartbeatError> {
    let client: Heartbeat = client.parse()?;
    let server = Heartbeat::parse_server(server)?;
    Ok(NegotiatedHeartbeat::between(client, server))
}

/// Signals raised by the heart-beat timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatSignal {
    /// The ping timer fired; a heart-beat frame should be sent.
    Ping,
    /// Nothing arrived from the broker within the negotiated window.
    WatchdogExpired,
}

#[derive(Default)]
struct Timers {
    sink: Option<mpsc::UnboundedSender<HeartbeatSignal>>,
    ping: Option<CancellationToken>,
    watchdog: Option<CancellationToken>,
    watchdog_interval: Option<Duration>,
}

impl Timers {
    fn cancel_all(&mut self) {
        self.sink = None;
        if let Some(token) = self.ping.take() {
            token.cancel();
        }
        if let Some(token) = self.watchdog.take() {
            token.cancel();
        }
        self.watchdog_interval = None;
    }
}

/// Runs the outgoing ping timer and the incoming-activity watchdog.
///
/// The coordinator never touches the transport. It reports through the sink
/// registered with [`HeartbeatCoordinator::register`]; whoever owns the
/// transport turns signals into frames. All timer state lives behind one
/// mutex, and a timer only reports while holding it after checking its own
/// cancellation token, so a fire that races [`cancel_all`] is suppressed.
///
/// Timers are spawned on the current tokio runtime.
///
/// [`cancel_all`]: HeartbeatCoordinator::cancel_all
#[derive(Clone)]
pub struct HeartbeatCoordinator {
    client: Heartbeat,
    leeway: Duration,
    timers: Arc<Mutex<Timers>>,
}

impl HeartbeatCoordinator {
    /// Create a coordinator for the client's declaration.
    ///
    /// `leeway` shortens the ping period so the heart-beat leaves slightly
    /// before the deadline. The negotiated ping interval is never below the
    /// client's `send_ms`, so `leeway` must be smaller than it.
    pub fn new(client: Heartbeat, leeway: Duration) -> Result<Self, HeartbeatError> {
        if client.send_ms > 0 && leeway.as_millis() >= u128::from(client.send_ms) {
            return Err(HeartbeatError::LeewayTooLarge {
                leeway_ms: leeway.as_millis(),
                ping_ms: client.send_ms.into(),
            });
        }
        Ok(Self {
            client,
            leeway,
            timers: Arc::new(Mutex::new(Timers::default())),
        })
    }

    /// Same as [`HeartbeatCoordinator::new`] from a `"cx,cy"` declaration.
    pub fn from_declaration(declaration: &str, leeway: Duration) -> Result<Self, HeartbeatError> {
        Self::new(declaration.parse()?, leeway)
    }

    pub fn client(&self) -> Heartbeat {
        self.client
    }

    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Register the sink that receives timer signals.
    pub fn register(&self, sink: mpsc::UnboundedSender<HeartbeatSignal>) {
        self.timers.lock().sink = Some(sink);
    }

    /// True while either timer is scheduled.
    pub fn is_armed(&self) -> bool {
        let timers = self.timers.lock();
        timers.ping.is_some() || timers.watchdog.is_some()
    }

    /// React to an inbound frame: CONNECTED arms the timers, MESSAGE,
    /// RECEIPT and heart-beats count as broker activity.
    pub fn on_frame(&self, frame: &Frame) -> Result<(), HeartbeatError> {
        match frame.command {
            Command::Connected => match frame.get_header(header::HEART_BEAT) {
                Some(value) => self.on_connected(value).map(|_| ()),
                None => Ok(()),
            },
            Command::Message | Command::Receipt | Command::Ping => {
                self.on_activity();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Negotiate against the broker's declaration and (re)arm the timers.
    pub fn on_connected(&self, server: &str) -> Result<NegotiatedHeartbeat, HeartbeatError> {
        let server = Heartbeat::parse_server(server)?;
        let negotiated = NegotiatedHeartbeat::between(self.client, server);

        if let Some(ping) = negotiated.ping.filter(|ping| self.leeway >= *ping) {
            return Err(HeartbeatError::LeewayTooLarge {
                leeway_ms: self.leeway.as_millis(),
                ping_ms: ping.as_millis() as u64,
            });
        }

        let mut timers = self.timers.lock();
        if let Some(token) = timers.ping.take() {
            token.cancel();
        }
        if let Some(token) = timers.watchdog.take() {
            token.cancel();
        }
        timers.watchdog_interval = negotiated.watchdog;

        if let Some(ping) = negotiated.ping {
            let period = ping - self.leeway;
            let token = CancellationToken::new();
            spawn_ping(self.timers.clone(), period, token.clone());
            timers.ping = Some(token);
            debug!(period_ms = period.as_millis() as u64, "ping timer armed");
        }
        if let Some(window) = negotiated.watchdog {
            let token = CancellationToken::new();
            spawn_watchdog(self.timers.clone(), window, token.clone());
            timers.watchdog = Some(token);
            debug!(window_ms = window.as_millis() as u64, "watchdog armed");
        }
        Ok(negotiated)
    }

    /// Restart the watchdog window from now. No-op while disarmed.
    pub fn on_activity(&self) {
        let mut timers = self.timers.lock();
        let Some(window) = timers.watchdog_interval else {
            return;
        };
        let Some(old) = timers.watchdog.take() else {
            return;
        };
        old.cancel();
        let token = CancellationToken::new();
        spawn_watchdog(self.timers.clone(), window, token.clone());
        timers.watchdog = Some(token);
        trace!("watchdog reset");
    }

    /// Cancel both timers and drop the sink. Idempotent.
    pub fn cancel_all(&self) {
        self.timers.lock().cancel_all();
    }
}

fn spawn_ping(timers: Arc<Mutex<Timers>>, period: Duration, token: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let timers = timers.lock();
                    if token.is_cancelled() {
                        break;
                    }
                    if let Some(sink) = &timers.sink {
                        let _ = sink.send(HeartbeatSignal::Ping);
                    }
                }
            }
        }
    });
}

fn spawn_watchdog(timers: Arc<Mutex<Timers>>, window: Duration, token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(window) => {
                let mut timers = timers.lock();
                if token.is_cancelled() {
                    return;
                }
                warn!(
                    window_ms = window.as_millis() as u64,
                    "no broker activity within heart-beat window"
                );
                if let Some(sink) = timers.sink.take() {
                    let _ = sink.send(HeartbeatSignal::WatchdogExpired);
                }
                // the connection is assumed dead
                timers.cancel_all();
            }
        }
    });
}
