//! `GameTable`: one session's membership, turn authority and game state
//! behind a single synchronous API.
//!
//! Each method is one complete request. The runtime calls them strictly
//! one after another for a given session, which is what keeps the history
//! of a session linear.

use std::fmt;

use conquest_protocol::{
    Identity, MemberId, SessionCode, SessionPhase, SessionSummary,
};
use conquest_session::{Admission, Departure, Session, SessionConfig, SessionError};

use crate::rules::{RuleEngine, TurnProgress};
use crate::sync::{Snapshot, StateDelta, StateSynchronizer};
use crate::turn::{Advance, TurnAuthority, TurnChange};

/// How a member came through [`GameTable::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival<P> {
    Joined(MemberId),
    /// The identity already had a seat; it was reattached.
    Rejoined(Reattach<P>),
}

/// A member reattached to its seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reattach<P> {
    pub member: MemberId,
    /// Set when this reconnect ended a suspension.
    pub resumed: Option<TurnChange<P>>,
}

/// What a request did to the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEffect<P> {
    Unchanged,
    Changed(TurnChange<P>),
    Suspended,
    GameOver,
}

/// Result of [`GameTable::leave`] / [`GameTable::disconnect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exit<P> {
    pub member: MemberId,
    pub departure: Departure,
    pub turn: TurnEffect<P>,
}

/// Result of a successful [`GameTable::submit_action`].
pub struct ActionOutcome<G: RuleEngine> {
    pub delta: StateDelta<G>,
    pub turn: TurnEffect<G::Phase>,
}

impl<G: RuleEngine> fmt::Debug for ActionOutcome<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionOutcome")
            .field("delta", &self.delta)
            .field("turn", &self.turn)
            .finish()
    }
}

pub struct GameTable<G: RuleEngine> {
    session: Session,
    turns: TurnAuthority<G::Phase>,
    sync: StateSynchronizer<G>,
}

impl<G: RuleEngine> GameTable<G> {
    pub fn new(code: SessionCode, config: SessionConfig, game: G::Config) -> Self {
        Self {
            session: Session::new(code, config),
            turns: TurnAuthority::new(),
            sync: StateSynchronizer::new(game),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn turns(&self) -> &TurnAuthority<G::Phase> {
        &self.turns
    }

    pub fn sync(&self) -> &StateSynchronizer<G> {
        &self.sync
    }

    pub fn code(&self) -> &SessionCode {
        self.session.code()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Membership plus turn information.
    pub fn summary(&self) -> SessionSummary {
        let mut summary = self.session.summary();
        if let Some(pointer) = self.turns.pointer() {
            summary.turn_number = pointer.turn_number;
            summary.suspended = self.turns.is_suspended();
        }
        summary.active_member = self
            .turns
            .active_seat()
            .and_then(|seat| self.session.at_seat(seat))
            .map(|m| m.id());
        summary
    }

    /// Seats `identity`, or reattaches it if it already holds a seat whose
    /// connection dropped.
    pub fn join(
        &mut self,
        identity: Identity,
        display_name: &str,
    ) -> Result<Arrival<G::Phase>, SessionError> {
        match self.session.join(identity.clone(), display_name)? {
            Admission::Joined(id) => Ok(Arrival::Joined(id)),
            Admission::Returning(_) => self.reconnect(&identity).map(Arrival::Rejoined),
        }
    }

    /// Marks the identity's member connected. If the session was
    /// suspended this hands out the turn again.
    ///
    /// # Errors
    /// [`SessionError::WrongPhase`] once the session has ended, and
    /// [`SessionError::UnknownIdentity`] for identities without a seat.
    pub fn reconnect(
        &mut self,
        identity: &Identity,
    ) -> Result<Reattach<G::Phase>, SessionError> {
        if self.session.phase() == SessionPhase::Ended {
            return Err(SessionError::WrongPhase {
                actual: SessionPhase::Ended,
            });
        }
        let member = self.session.reconnect(identity)?;
        let resumed = match self.sync.state() {
            Some(state) if self.turns.is_suspended() => self
                .turns
                .resume(&self.session, |seat| G::opening_phase(state, seat)),
            _ => None,
        };
        Ok(Reattach { member, resumed })
    }

    pub fn set_ready(&mut self, member: MemberId, ready: bool) -> Result<(), SessionError> {
        self.session.set_ready(member, ready)
    }

    /// Starts the game: host only, everyone ready, at least
    /// `min_members` seated. Seat 0 gets the first turn.
    pub fn start_game(
        &mut self,
        requester: MemberId,
    ) -> Result<TurnChange<G::Phase>, SessionError> {
        self.turns.check_start(&self.session, requester)?;
        let state = self.sync.start(self.session.members().len());
        let opening = G::opening_phase(state, 0);
        self.turns.start(&mut self.session, opening)
    }

    /// Whose-turn check followed by the rule engine's legality check.
    /// Returns the sender's seat. Changes nothing.
    pub fn validate_action(
        &self,
        member: MemberId,
        action: &G::Action,
    ) -> Result<usize, SessionError> {
        let seat = self.turns.authorize(&self.session, member)?;
        let phase = self.current_phase()?;
        self.sync.check(phase, seat, action)?;
        Ok(seat)
    }

    /// Validates and applies an action, then moves the turn as the rule
    /// engine asks. On error nothing changed.
    pub fn submit_action(
        &mut self,
        member: MemberId,
        action: G::Action,
    ) -> Result<ActionOutcome<G>, SessionError> {
        let seat = self.validate_action(member, &action)?;
        let phase = self.current_phase()?.clone();
        let (delta, progress) = self.sync.apply_action(&phase, seat, action)?;

        let turn = match progress {
            TurnProgress::Continue(next) => self
                .turns
                .set_phase(&self.session, next)
                .map_or(TurnEffect::Unchanged, TurnEffect::Changed),
            TurnProgress::EndTurn => self.advance(),
            TurnProgress::GameOver => {
                self.turns.finish(&mut self.session);
                TurnEffect::GameOver
            }
        };
        Ok(ActionOutcome { delta, turn })
    }

    /// An explicit leave. In the lobby the seat is removed (and the
    /// session ends if that empties it); afterwards it is a disconnect.
    pub fn leave(&mut self, member: MemberId) -> Result<Exit<G::Phase>, SessionError> {
        let was_active = self.turns.active_seat().is_some()
            && self.turns.active_seat() == self.session.seat_of(member);
        let departure = self.session.leave(member)?;

        let turn = match departure {
            Departure::Removed { emptied: true, .. } => {
                self.session.end();
                TurnEffect::Unchanged
            }
            Departure::Removed { .. } => TurnEffect::Unchanged,
            Departure::Disconnected { changed: true } if was_active => self.advance(),
            Departure::Disconnected { .. } => TurnEffect::Unchanged,
        };
        Ok(Exit {
            member,
            departure,
            turn,
        })
    }

    /// A dropped connection. Lobby disconnects are treated as leaves, so
    /// this is the same transition as [`leave`](Self::leave).
    pub fn disconnect(&mut self, member: MemberId) -> Result<Exit<G::Phase>, SessionError> {
        self.leave(member)
    }

    /// Host-only. Ends a lobby or running game.
    pub fn abort(&mut self, requester: MemberId) -> Result<(), SessionError> {
        if self.session.phase() == SessionPhase::Ended {
            return Err(SessionError::WrongPhase {
                actual: SessionPhase::Ended,
            });
        }
        let member = self
            .session
            .member(requester)
            .ok_or(SessionError::UnknownMember(requester))?;
        if !member.is_host() {
            return Err(SessionError::NotHost(requester));
        }
        self.turns.finish(&mut self.session);
        tracing::info!(code = %self.session.code(), host = %requester, "game aborted");
        Ok(())
    }

    /// Shuts the session down from outside (expiry, server shutdown).
    pub fn end(&mut self) {
        self.turns.finish(&mut self.session);
    }

    pub fn snapshot(&self) -> Option<Snapshot<G>> {
        self.sync.snapshot()
    }

    pub fn current_turn(&self) -> Option<TurnChange<G::Phase>> {
        self.turns.current(&self.session)
    }

    fn current_phase(&self) -> Result<&G::Phase, SessionError> {
        self.turns
            .pointer()
            .map(|p| &p.phase)
            .ok_or(SessionError::WrongPhase {
                actual: self.session.phase(),
            })
    }

    fn advance(&mut self) -> TurnEffect<G::Phase> {
        let Some(state) = self.sync.state() else {
            return TurnEffect::Unchanged;
        };
        match self
            .turns
            .advance_turn(&self.session, |seat| G::opening_phase(state, seat))
        {
            Ok(Advance::Next(change)) => TurnEffect::Changed(change),
            Ok(Advance::Suspended) => TurnEffect::Suspended,
            Err(e) => {
                tracing::warn!(code = %self.session.code(), error = %e, "turn not advanced");
                TurnEffect::Unchanged
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
