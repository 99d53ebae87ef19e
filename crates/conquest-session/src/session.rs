use conquest_protocol::{
    Identity, MemberId, MemberInfo, MemberRole, SessionCode, SessionPhase,
    SessionSummary,
};

use crate::{SessionConfig, SessionError};

/// Longest display name, in characters, after trimming.
pub const MAX_DISPLAY_NAME: usize = 24;

/// A logical player inside one session.
///
/// A member outlives the sockets it is reached through. Its id and seat
/// are fixed at join time; only `connected`, `ready` and (in the lobby)
/// `role` change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub(crate) id: MemberId,
    pub(crate) identity: Identity,
    pub(crate) display_name: String,
    pub(crate) connected: bool,
    pub(crate) ready: bool,
    pub(crate) role: MemberRole,
}

impl Member {
    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Only meaningful while the session is in the lobby.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn role(&self) -> MemberRole {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == MemberRole::Host
    }

    /// Public view for broadcasts.
    pub fn info(&self) -> MemberInfo {
        MemberInfo {
            id: self.id,
            display_name: self.display_name.clone(),
            role: self.role,
            connected: self.connected,
            ready: self.ready,
        }
    }
}

/// One shared game, identified by its code.
///
/// ```text
///  create ──→ LOBBY ──start──→ IN_PROGRESS ──game over──→ ENDED
///               │                   │                      ▲
///               └──────abort────────┴──────────────────────┘
/// ```
///
/// Invariants kept by every method:
/// - `members` is in join order and is never reordered;
/// - while `members` is non-empty exactly one of them is host;
/// - members are only ever removed in the lobby;
/// - `code` never changes.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) code: SessionCode,
    pub(crate) phase: SessionPhase,
    pub(crate) members: Vec<Member>,
    pub(crate) next_member_id: u64,
    pub(crate) config: SessionConfig,
}

impl Session {
    /// Creates an empty lobby. The first member to join becomes host.
    pub fn new(code: SessionCode, config: SessionConfig) -> Self {
        Self {
            code,
            phase: SessionPhase::Lobby,
            members: Vec::new(),
            next_member_id: 1,
            config,
        }
    }

    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Members in join order. A member's index here is its seat in turn
    /// order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn member_by_identity(&self, identity: &Identity) -> Option<&Member> {
        self.members.iter().find(|m| &m.identity == identity)
    }

    /// Position of the member in turn order.
    pub fn seat_of(&self, id: MemberId) -> Option<usize> {
        self.members.iter().position(|m| m.id == id)
    }

    /// The member seated at `seat`, if any.
    pub fn at_seat(&self, seat: usize) -> Option<&Member> {
        self.members.get(seat)
    }

    pub fn host(&self) -> Option<&Member> {
        self.members.iter().find(|m| m.is_host())
    }

    pub fn connected_count(&self) -> usize {
        self.members.iter().filter(|m| m.connected).count()
    }

    /// Moves the lobby into the game. Readiness and size checks belong to
    /// the caller; this only guards the phase edge.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::WrongPhase { actual: self.phase });
        }
        self.phase = SessionPhase::InProgress;
        Ok(())
    }

    /// Ends the session. Idempotent.
    pub fn end(&mut self) {
        if self.phase != SessionPhase::Ended {
            tracing::info!(code = %self.code, from = %self.phase, "session ended");
        }
        self.phase = SessionPhase::Ended;
    }

    /// Membership and phase, without turn information.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            code: self.code.clone(),
            phase: self.phase,
            host: self.host().map(Member::id),
            members: self.members.iter().map(Member::info).collect(),
            active_member: None,
            turn_number: 0,
            suspended: false,
        }
    }
}
