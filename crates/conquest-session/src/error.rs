use conquest_protocol::{
    Identity, MemberId, RejectReason, SessionCode, SessionPhase,
};

/// Everything that can refuse a session-level request.
///
/// None of these tear a session down: the request is dropped, the
/// session is unchanged, and only the requester is told. Each variant
/// collapses onto one wire-level [`RejectReason`] via
/// [`SessionError::reason`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No live session has this code.
    #[error("session {0} not found")]
    NotFound(SessionCode),

    /// The session outlived its expiry window and was removed.
    #[error("session {0} has expired")]
    Expired(SessionCode),

    /// The member id does not belong to this session.
    #[error("{0} is not a member of this session")]
    UnknownMember(MemberId),

    /// The identity has never joined this session.
    #[error("{0} is not a member of this session")]
    UnknownIdentity(Identity),

    /// The lobby is at its member cap.
    #[error("session is full ({max} members)")]
    SessionFull { max: usize },

    /// The identity is already seated and still connected.
    #[error("{0} is already connected to this session")]
    AlreadyJoined(MemberId),

    /// The request is not legal in the session's current phase.
    #[error("not allowed while the session is {actual}")]
    WrongPhase { actual: SessionPhase },

    /// A host-only request from someone else.
    #[error("{0} is not the host")]
    NotHost(MemberId),

    /// `startGame` while someone in the lobby is not ready.
    #[error("not every member is ready")]
    NotAllReady,

    /// `startGame` with too few members.
    #[error("need at least {required} members to start, have {present}")]
    NotEnoughMembers { required: usize, present: usize },

    /// Display name empty or too long after trimming.
    #[error("display name must be 1 to {max} characters")]
    InvalidDisplayName { max: usize },

    /// An action from someone other than the active member.
    #[error("it is {active}'s turn")]
    NotYourTurn { active: MemberId },

    /// The rule engine refused the action.
    #[error("illegal action: {0}")]
    IllegalAction(String),

    /// Every member is disconnected; no turn is being played.
    #[error("session is suspended until a member reconnects")]
    Suspended,

    /// The member is now reached through another connection, or through
    /// none; the old one no longer speaks for it.
    #[error("{0} is no longer attached to this connection")]
    Superseded(MemberId),
}

impl SessionError {
    /// Maps the error onto the taxonomy clients understand.
    pub fn reason(&self) -> RejectReason {
        match self {
            Self::NotFound(_)
            | Self::UnknownMember(_)
            | Self::UnknownIdentity(_) => RejectReason::NotFound,
            Self::Expired(_) => RejectReason::SessionExpired,
            Self::Superseded(_) => RejectReason::Unauthenticated,
            Self::NotYourTurn { .. } => RejectReason::NotYourTurn,
            Self::IllegalAction(_) => RejectReason::IllegalAction,
            Self::SessionFull { .. }
            | Self::AlreadyJoined(_)
            | Self::WrongPhase { .. }
            | Self::NotHost(_)
            | Self::NotAllReady
            | Self::NotEnoughMembers { .. }
            | Self::InvalidDisplayName { .. }
            | Self::Suspended => RejectReason::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> SessionCode {
        SessionCode::parse("ABC234").unwrap()
    }

    #[test]
    fn test_reason_join_failures_are_rejected() {
        assert_eq!(
            SessionError::SessionFull { max: 6 }.reason(),
            RejectReason::Rejected
        );
        assert_eq!(
            SessionError::AlreadyJoined(MemberId(1)).reason(),
            RejectReason::Rejected
        );
        assert_eq!(
            SessionError::WrongPhase {
                actual: SessionPhase::InProgress
            }
            .reason(),
            RejectReason::Rejected
        );
    }

    #[test]
    fn test_reason_turn_and_rule_failures_keep_their_own_kind() {
        assert_eq!(
            SessionError::NotYourTurn {
                active: MemberId(2)
            }
            .reason(),
            RejectReason::NotYourTurn
        );
        assert_eq!(
            SessionError::IllegalAction("no".into()).reason(),
            RejectReason::IllegalAction
        );
    }

    #[test]
    fn test_reason_lookup_failures() {
        assert_eq!(
            SessionError::NotFound(code()).reason(),
            RejectReason::NotFound
        );
        assert_eq!(
            SessionError::Expired(code()).reason(),
            RejectReason::SessionExpired
        );
    }

    #[test]
    fn test_reason_superseded_connection_is_unauthenticated() {
        assert_eq!(
            SessionError::Superseded(MemberId(3)).reason(),
            RejectReason::Unauthenticated
        );
    }

    #[test]
    fn test_display_mentions_active_member() {
        let err = SessionError::NotYourTurn {
            active: MemberId(4),
        };
        assert_eq!(err.to_string(), "it is M-4's turn");
    }
}
