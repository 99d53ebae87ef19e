//! Wire protocol for Conquest.
//!
//! Everything a browser client and the server exchange is defined here:
//! the identities that name sessions and members, the client and server
//! message sets, the [`Envelope`] that frames each message, and the
//! [`Codec`] used to turn them into bytes.

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{ClientMessage, Envelope, ServerMessage};
pub use types::{
    Identity, MemberId, MemberInfo, MemberRole, RejectReason, SESSION_CODE_ALPHABET,
    SESSION_CODE_LEN, SessionCode, SessionPhase, SessionSummary,
};
