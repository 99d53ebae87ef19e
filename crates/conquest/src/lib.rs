//! # Conquest
//!
//! Session and turn authority for multiplayer turn-based territory games.
//!
//! Conquest runs lobbies, seats players, decides whose turn it is, and
//! keeps one canonical, versioned game state per session. A game plugs in
//! by implementing [`RuleEngine`](conquest_turn::RuleEngine); everything
//! else (WebSocket transport, join codes, reconnects, suspension, expiry)
//! is handled here.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conquest::prelude::*;
//!
//! // Implement RuleEngine for your game, then:
//! // init_tracing();
//! // let server = ConquestServer::builder()
//! //     .bind("0.0.0.0:8080")
//! //     .build::<MyGame>(MyGameConfig::default())
//! //     .await?;
//! // server.run().await
//! ```

mod config;
mod error;
mod gateway;
mod http;
mod server;
mod telemetry;

pub use config::{ConfigError, ServerConfig};
pub use error::ConquestError;
pub use server::{ConquestServer, ConquestServerBuilder, PROTOCOL_VERSION};
pub use telemetry::{DEFAULT_FILTER, init_tracing};

pub use conquest_protocol as protocol;
pub use conquest_runtime as runtime;
pub use conquest_session as session;
pub use conquest_transport as transport;
pub use conquest_turn as turn;

/// Everything a game server binary usually needs.
pub mod prelude {
    pub use crate::{
        ConfigError, ConquestError, ConquestServer, ConquestServerBuilder, PROTOCOL_VERSION,
        ServerConfig, init_tracing,
    };
    pub use conquest_protocol::{
        ClientMessage, Codec, Envelope, JsonCodec, MemberId, RejectReason, ServerMessage,
        SessionCode, SessionPhase, SessionSummary,
    };
    pub use conquest_session::{SessionConfig, SessionError};
    pub use conquest_turn::{Applied, RuleEngine, TurnProgress};
}
