//! Identities and summaries that appear inside wire messages.
//!
//! A session is named by a short [`SessionCode`] that players read aloud
//! or paste into a lobby screen. Inside a session each player is a
//! [`MemberId`], and behind every member sits an [`Identity`]: the token
//! a browser keeps across page reloads so a new socket can reattach to
//! the same seat.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identifier for a member within one session.
///
/// Assigned in join order and never reused inside the session, so it
/// stays valid across disconnects and reconnects. Serializes as a bare
/// number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

/// Number of characters in a session code.
pub const SESSION_CODE_LEN: usize = 6;

/// Characters used when generating codes. Look-alikes (`0`/`O`, `1`/`I`)
/// are left out so codes survive being read over voice chat.
pub const SESSION_CODE_ALPHABET: &[u8; 32] =
    b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A six-character, case-insensitive session code such as `K7QX2M`.
///
/// Codes are normalized to upper case on parse, so `k7qx2m` and `K7QX2M`
/// name the same session. The inner string is private: every
/// `SessionCode` in the program has passed [`SessionCode::parse`].
///
/// On the wire a code is a plain JSON string; deserializing goes through
/// the same validation as `parse`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Validates and normalizes a user-supplied code.
    ///
    /// Surrounding whitespace is ignored. Any ASCII letter or digit is
    /// accepted so a mistyped code yields "not found" rather than a
    /// format error.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let code = raw.trim().to_ascii_uppercase();
        let well_formed = code.len() == SESSION_CODE_LEN
            && code.bytes().all(|b| b.is_ascii_alphanumeric());
        if !well_formed {
            return Err(ProtocolError::InvalidSessionCode(raw.to_string()));
        }
        Ok(Self(code))
    }

    /// Builds a fresh code from [`SESSION_CODE_ALPHABET`]. `pick(n)` is
    /// asked for an index below `n` once per character; out-of-range
    /// answers wrap.
    pub fn generate(mut pick: impl FnMut(usize) -> usize) -> Self {
        let alphabet = SESSION_CODE_ALPHABET;
        let code = (0..SESSION_CODE_LEN)
            .map(|_| alphabet[pick(alphabet.len()) % alphabet.len()] as char)
            .collect();
        Self(code)
    }

    /// Returns the normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

/// The token a client presents to prove it is the same logical player.
///
/// Issued by the server in `HandshakeAck` when the client has none, and
/// stored by the browser. Presenting it again on a fresh socket is how a
/// dropped player gets back into their seat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Longest identity accepted from a client.
    pub const MAX_LEN: usize = 64;

    /// Wraps a client-supplied identity after checking it is 1..=64
    /// printable ASCII characters.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let valid = !raw.is_empty()
            && raw.len() <= Self::MAX_LEN
            && raw.bytes().all(|b| b.is_ascii_graphic());
        if !valid {
            return Err(ProtocolError::InvalidMessage(
                "identity must be 1-64 printable ASCII characters".into(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Server-issued identities are 128 random bits rendered as 32 hex
/// characters.
impl From<[u8; 16]> for Identity {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }
}

/// Only a prefix is shown so logs never carry a full reattach token.
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "id-{prefix}")
    }
}

// ---------------------------------------------------------------------------
// Session summaries
// ---------------------------------------------------------------------------

/// Coarse lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    /// Gathering players; joins and ready toggles allowed.
    Lobby,
    /// Game running; membership frozen, turns enforced.
    InProgress,
    /// Game over or aborted by the host.
    Ended,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "LOBBY"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Ended => write!(f, "ENDED"),
        }
    }
}

/// A member's role. Exactly one member of a non-empty session is host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Host,
    Player,
}

/// Public view of one member, as broadcast in `SessionUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: MemberId,
    pub display_name: String,
    pub role: MemberRole,
    pub connected: bool,
    pub ready: bool,
}

/// Membership and phase of a session. Never contains game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub code: SessionCode,
    pub phase: SessionPhase,
    /// `None` only for a session whose last lobby member has left.
    pub host: Option<MemberId>,
    /// Members in join order, which is also turn order.
    pub members: Vec<MemberInfo>,
    /// Whose turn it is, while a game is running and not suspended.
    pub active_member: Option<MemberId>,
    /// 1 for the first turn of a game, 0 before the game starts.
    pub turn_number: u64,
    /// Every member is disconnected; no turn will be issued until one
    /// comes back.
    pub suspended: bool,
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Why a client request was refused.
///
/// Rejections go only to the client that sent the request; they never
/// affect the session or other members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// No live session has that code, or the member is unknown.
    NotFound,
    /// The request is not allowed right now: session full, duplicate
    /// join, wrong phase, not the host, not everyone ready.
    Rejected,
    /// An action arrived from someone other than the active member.
    NotYourTurn,
    /// The rules refuse the action in the current sub-phase.
    IllegalAction,
    /// The session timed out and was removed.
    SessionExpired,
    /// The message could not be decoded.
    Malformed,
    /// A session-scoped request from a connection that is not in a
    /// session.
    Unauthenticated,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
