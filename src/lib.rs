//! STOMP 1.2 client engine for message-oriented transports.
//!
//! Frames are encoded to and decoded from text, heart-beats are negotiated
//! from the CONNECTED frame and kept alive with timers, and a [`Connection`]
//! drives one transport at a time through connect, disconnect and
//! caller-driven reconnect. Enable the `websocket` feature for a
//! `tokio-tungstenite` transport.

pub mod codec;
pub mod connection;
pub mod frame;
pub mod heartbeat;
pub mod transport;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use codec::{DecodeError, decode, encode};
pub use connection::{
    ConnError, Connection, ConnectionConfig, ConnectionState, StompError, StompEvent,
};
pub use frame::{AckMode, Command, Frame};
pub use heartbeat::{
    Heartbeat, HeartbeatCoordinator, HeartbeatError, HeartbeatSignal, NegotiatedHeartbeat,
    negotiate_heartbeats,
};
pub use transport::{
    Transport, TransportError, TransportEvent, TransportFactory, TransportMessage,
};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
