//! Transport layer for Conquest.
//!
//! A browser connection is accepted by a [`Transport`] and then split into
//! two halves: a [`FrameSink`] that pushes frames to the client and a
//! [`FrameSource`] that yields frames from it. The gateway drives each
//! half from its own task, so a broadcast from a session never waits
//! behind a read that is parked on a quiet socket.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    WebSocketConnection, WebSocketReader, WebSocketTransport,
    WebSocketWriter,
};

use std::fmt;

/// Identifier for one transport-level connection.
///
/// A connection id names a socket, not a player: the same member may be
/// seen behind several connection ids over the life of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw counter value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw counter value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener handing out upgraded connections.
pub trait Transport: Send + Sync + 'static {
    /// What [`accept`](Self::accept) yields.
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client. A failed upgrade is an `Err`; the
    /// listener itself stays usable.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}

/// An accepted connection, not yet split into halves.
pub trait Connection: Send + 'static {
    /// Outgoing half.
    type Sink: FrameSink;
    /// Incoming half.
    type Source: FrameSource;

    /// Process-unique id assigned at accept time.
    fn id(&self) -> ConnectionId;

    /// Splits the connection so reads and writes can proceed
    /// independently.
    fn split(self) -> (Self::Sink, Self::Source);
}

/// The writing half of a connection.
pub trait FrameSink: Send + 'static {
    /// The error type for write operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the peer.
    async fn send(&mut self, data: Vec<u8>) -> Result<(), Self::Error>;

    /// Sends a close frame and flushes.
    async fn close(&mut self) -> Result<(), Self::Error>;
}

/// The reading half of a connection.
pub trait FrameSource: Send + 'static {
    /// The error type for read operations.
    type Error: std::error::Error + Send + Sync;

    /// Receives the next frame from the peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, Self::Error>;
}
