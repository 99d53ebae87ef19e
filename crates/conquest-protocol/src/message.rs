//! Client and server message sets and the envelope that frames them.
//!
//! Both enums are internally tagged, so a message on the wire looks like
//! `{"type":"JoinSession","code":"K7QX2M","display_name":"Ana"}`. Game
//! payloads (actions, deltas, snapshots, turn sub-phases) are opaque to
//! this layer and travel as codec-encoded bytes.

use serde::{Deserialize, Serialize};

use crate::{MemberId, RejectReason, SessionCode, SessionSummary};

/// A framed message. `seq` increases by one per message the server sends
/// on a connection; `timestamp` is milliseconds since the sender started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<M> {
    pub seq: u64,
    pub timestamp: u64,
    pub payload: M,
}

/// Everything a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    // -- Connection lifecycle --
    /// Must be the first message on a connection. `identity` is the token
    /// from an earlier `HandshakeAck`; omit it to be issued a new one.
    Handshake {
        version: u32,
        #[serde(default)]
        identity: Option<String>,
    },

    /// Keep-alive. Echoed back in `HeartbeatAck`.
    Heartbeat { client_time: u64 },

    /// Polite close.
    Disconnect { reason: String },

    // -- Membership --
    /// Start a new session with the sender as host.
    CreateSession { display_name: String },

    /// Join a lobby by code. An identity that is already a disconnected
    /// member of the session is reattached instead.
    JoinSession {
        code: SessionCode,
        display_name: String,
    },

    /// Reattach this connection's identity to a session it belongs to.
    Reconnect { code: SessionCode },

    /// Toggle readiness in the lobby.
    SetReady { ready: bool },

    /// Leave the current session. Mid-game this keeps the seat and only
    /// marks the member disconnected.
    LeaveSession,

    // -- Game flow --
    /// Host only: move the lobby into the game.
    StartGame,

    /// Host only: end the session for everyone.
    AbortGame,

    /// A game action, encoded with the session's codec.
    SubmitAction { action: Vec<u8> },

    /// Ask for a `FullState`, e.g. after spotting a gap in delta
    /// versions.
    RequestFullState,
}

/// Everything the server may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    // -- Connection lifecycle --
    /// Handshake accepted. Store `identity` to reconnect later.
    HandshakeAck { identity: String, server_time: u64 },

    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Connection-level failure (bad handshake, unsupported version).
    /// `code` follows HTTP conventions.
    Error { code: u16, message: String },

    // -- Membership --
    /// The sender is now (again) a member of `code`.
    SessionJoined { code: SessionCode, member_id: MemberId },

    /// Membership or phase changed.
    SessionUpdate { session: SessionSummary },

    MemberDisconnected { member_id: MemberId },

    MemberReconnected { member_id: MemberId },

    /// Reply to `LeaveSession`.
    SessionLeft,

    /// The session is over for this connection: game over, host abort,
    /// or expiry.
    SessionEnded { reason: String },

    // -- Game flow --
    /// A new turn began or the active member moved to another sub-phase.
    TurnChanged {
        active_member_id: MemberId,
        turn_number: u64,
        phase: Vec<u8>,
    },

    /// Result of one applied action. `version` grows by exactly one per
    /// delta within a session.
    StateDelta { version: u64, delta: Vec<u8> },

    /// Complete game state at `version`. Replaces whatever the client
    /// held.
    FullState { version: u64, state: Vec<u8> },

    /// The request was refused; nothing changed.
    ActionRejected {
        reason: RejectReason,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemberInfo, MemberRole, SessionPhase};

    #[test]
    fn test_client_message_join_session_wire_shape() {
        let json = r#"{"type":"JoinSession","code":"abc234","display_name":"Ana"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinSession {
                code: SessionCode::parse("ABC234").unwrap(),
                display_name: "Ana".into(),
            }
        );
    }

    #[test]
    fn test_client_message_handshake_identity_optional() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"Handshake","version":1}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Handshake {
                version: 1,
                identity: None
            }
        );
    }

    #[test]
    fn test_client_message_unit_variant_wire_shape() {
        let json = serde_json::to_string(&ClientMessage::StartGame).unwrap();
        assert_eq!(json, r#"{"type":"StartGame"}"#);
    }

    #[test]
    fn test_client_message_unknown_type_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"StealTurn"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_client_message_bad_code_rejected_at_decode() {
        let result: Result<ClientMessage, _> = serde_json::from_str(
            r#"{"type":"Reconnect","code":"??"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_action_rejected_wire_shape() {
        let msg = ServerMessage::ActionRejected {
            reason: RejectReason::NotYourTurn,
            message: "it is M-1's turn".into(),
        };
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "ActionRejected");
        assert_eq!(value["reason"], "NotYourTurn");
    }

    #[test]
    fn test_server_message_session_update_carries_summary() {
        let summary = SessionSummary {
            code: SessionCode::parse("QWERTY").unwrap(),
            phase: SessionPhase::Lobby,
            host: Some(MemberId(1)),
            members: vec![MemberInfo {
                id: MemberId(1),
                display_name: "Ana".into(),
                role: MemberRole::Host,
                connected: true,
                ready: false,
            }],
            active_member: None,
            turn_number: 0,
            suspended: false,
        };
        let env = Envelope {
            seq: 4,
            timestamp: 120,
            payload: ServerMessage::SessionUpdate { session: summary },
        };
        let value: serde_json::Value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["seq"], 4);
        assert_eq!(value["payload"]["type"], "SessionUpdate");
        assert_eq!(value["payload"]["session"]["code"], "QWERTY");
        assert_eq!(value["payload"]["session"]["phase"], "LOBBY");
        assert_eq!(
            value["payload"]["session"]["members"][0]["role"],
            "HOST"
        );
    }
}
