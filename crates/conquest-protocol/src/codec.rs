//! Byte encoding for envelopes and the game payloads inside them.
//!
//! The gateway never calls `serde_json` directly. It goes through a
//! [`Codec`], which is used twice per outbound message: once to encode
//! the game payload (delta, snapshot, sub-phase) into bytes, and once to
//! encode the framed [`Envelope`](crate::Envelope) that carries it.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts values to bytes and back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Turns `value` into a frame body.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Reads a `T` out of a frame body.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do
    /// not match `T`.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`. Output is always valid UTF-8, so
/// the transport sends it as text frames.
///
/// ```rust
/// use conquest_protocol::{ClientMessage, Codec, Envelope, JsonCodec};
///
/// let frame = br#"{"seq":0,"timestamp":0,"payload":{"type":"SetReady","ready":true}}"#;
/// let env: Envelope<ClientMessage> = JsonCodec.decode(frame).unwrap();
/// assert_eq!(env.payload, ClientMessage::SetReady { ready: true });
///
/// let text = String::from_utf8(JsonCodec.encode(&env.payload).unwrap()).unwrap();
/// assert_eq!(text, r#"{"type":"SetReady","ready":true}"#);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
