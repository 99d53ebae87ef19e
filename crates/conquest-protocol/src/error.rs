//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding or validating wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or a
    /// message type the server does not know.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but breaks a protocol rule, such as a second
    /// handshake on the same connection.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A session code that is not six ASCII letters or digits.
    #[error("invalid session code: {0:?}")]
    InvalidSessionCode(String),
}
