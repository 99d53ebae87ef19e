//! Unified error type for the Conquest server.

use conquest_protocol::ProtocolError;
use conquest_session::SessionError;
use conquest_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attributes let `?` convert sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum ConquestError {
    /// Connection accept/send/receive failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session rejected a request.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Bad server configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Binding a listener failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
