//! The turn authority: a per-session state machine deciding whose action
//! is currently legal.
//!
//! ```text
//!                    start_game
//!  AwaitingStart ──────────────→ Active(seat, turn, phase) ◄─┐
//!                                  │   │    ▲                │ resume
//!                       game over  │   │    │ advance_turn   │
//!                                  ▼   │    └────────────────┤
//!                             GameOver │  nobody connected   │
//!                                      └──────────────→ Suspended
//! ```
//!
//! The authority only tracks *which seat* is active and the sub-phase of
//! the turn. The sub-phase values themselves come from the rule engine
//! and are opaque here.

use conquest_protocol::{MemberId, SessionPhase};
use conquest_session::{Session, SessionError};

/// Where the game currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnPointer<P> {
    /// Index into the session's member list.
    pub seat: usize,
    /// 1 for the first turn of the game, +1 every time the turn moves.
    pub turn_number: u64,
    /// Sub-phase within the turn, as defined by the rule engine.
    pub phase: P,
}

/// States of the turn state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnState<P> {
    AwaitingStart,
    Active(TurnPointer<P>),
    /// Every member is disconnected. The pointer is where the game
    /// stopped; no turn is issued until someone reconnects.
    Suspended(TurnPointer<P>),
    GameOver,
}

/// The turn moved, or its sub-phase did. Broadcast as `TurnChanged`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnChange<P> {
    pub member: MemberId,
    pub seat: usize,
    pub turn_number: u64,
    pub phase: P,
}

/// Result of [`TurnAuthority::advance_turn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance<P> {
    /// The next connected seat now holds the turn.
    Next(TurnChange<P>),
    /// Nobody is connected; the session is suspended.
    Suspended,
}

/// Enforces turn order for one session.
#[derive(Debug, Clone)]
pub struct TurnAuthority<P> {
    state: TurnState<P>,
}

impl<P: Clone + PartialEq> TurnAuthority<P> {
    pub fn new() -> Self {
        Self {
            state: TurnState::AwaitingStart,
        }
    }

    pub fn state(&self) -> &TurnState<P> {
        &self.state
    }

    /// The pointer, whether active or suspended.
    pub fn pointer(&self) -> Option<&TurnPointer<P>> {
        match &self.state {
            TurnState::Active(p) | TurnState::Suspended(p) => Some(p),
            TurnState::AwaitingStart | TurnState::GameOver => None,
        }
    }

    /// The seat that may act right now.
    pub fn active_seat(&self) -> Option<usize> {
        match &self.state {
            TurnState::Active(p) => Some(p.seat),
            _ => None,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.state, TurnState::Suspended(_))
    }

    /// The current turn as a `TurnChange`, for resyncing a client.
    pub fn current(&self, session: &Session) -> Option<TurnChange<P>> {
        match &self.state {
            TurnState::Active(p) => change_for(session, p),
            _ => None,
        }
    }

    /// Checks every precondition of starting the game without changing
    /// anything.
    ///
    /// # Errors
    /// - [`SessionError::WrongPhase`]: not in the lobby
    /// - [`SessionError::UnknownMember`] / [`SessionError::NotHost`]
    /// - [`SessionError::NotEnoughMembers`]: below `min_members`
    /// - [`SessionError::NotAllReady`]
    pub fn check_start(
        &self,
        session: &Session,
        requester: MemberId,
    ) -> Result<(), SessionError> {
        if session.phase() != SessionPhase::Lobby
            || self.state != TurnState::AwaitingStart
        {
            return Err(SessionError::WrongPhase {
                actual: session.phase(),
            });
        }
        let member = session
            .member(requester)
            .ok_or(SessionError::UnknownMember(requester))?;
        if !member.is_host() {
            return Err(SessionError::NotHost(requester));
        }
        let required = session.config().min_members;
        let present = session.members().len();
        if present < required {
            return Err(SessionError::NotEnoughMembers { required, present });
        }
        if !session.all_ready() {
            return Err(SessionError::NotAllReady);
        }
        Ok(())
    }

    /// Moves the session into the game with seat 0 to act. Callers run
    /// [`check_start`](Self::check_start) first.
    pub fn start(
        &mut self,
        session: &mut Session,
        opening: P,
    ) -> Result<TurnChange<P>, SessionError> {
        let first = session
            .at_seat(0)
            .map(|m| m.id())
            .ok_or(SessionError::NotEnoughMembers {
                required: session.config().min_members,
                present: 0,
            })?;
        session.begin()?;
        let pointer = TurnPointer {
            seat: 0,
            turn_number: 1,
            phase: opening,
        };
        let change = TurnChange {
            member: first,
            seat: 0,
            turn_number: 1,
            phase: pointer.phase.clone(),
        };
        self.state = TurnState::Active(pointer);
        tracing::info!(code = %session.code(), active = %first, "game started");
        Ok(change)
    }

    /// The whose-turn half of action validation. Returns the sender's
    /// seat.
    ///
    /// # Errors
    /// - [`SessionError::WrongPhase`]: no game running
    /// - [`SessionError::Suspended`]
    /// - [`SessionError::UnknownMember`]
    /// - [`SessionError::NotYourTurn`]: sender's seat is not the active one
    pub fn authorize(
        &self,
        session: &Session,
        member: MemberId,
    ) -> Result<usize, SessionError> {
        if session.phase() != SessionPhase::InProgress {
            return Err(SessionError::WrongPhase {
                actual: session.phase(),
            });
        }
        let pointer = match &self.state {
            TurnState::Active(p) => p,
            TurnState::Suspended(_) => return Err(SessionError::Suspended),
            TurnState::AwaitingStart | TurnState::GameOver => {
                return Err(SessionError::WrongPhase {
                    actual: session.phase(),
                });
            }
        };
        let seat = session
            .seat_of(member)
            .ok_or(SessionError::UnknownMember(member))?;
        if seat != pointer.seat {
            let active = session
                .at_seat(pointer.seat)
                .map(|m| m.id())
                .unwrap_or(member);
            return Err(SessionError::NotYourTurn { active });
        }
        Ok(seat)
    }

    /// Moves the active seat into another sub-phase of the same turn.
    /// Returns `None` when the phase is unchanged or no turn is active.
    pub fn set_phase(
        &mut self,
        session: &Session,
        phase: P,
    ) -> Option<TurnChange<P>> {
        let TurnState::Active(pointer) = &mut self.state else {
            return None;
        };
        if pointer.phase == phase {
            return None;
        }
        pointer.phase = phase;
        change_for(session, pointer)
    }

    /// Hands the turn to the next seat whose member is connected,
    /// wrapping around. The current seat is considered last, so a lone
    /// connected player keeps getting turns. If nobody is connected the
    /// session is suspended at the current pointer.
    ///
    /// `opening` supplies the first sub-phase for the chosen seat.
    pub fn advance_turn(
        &mut self,
        session: &Session,
        opening: impl FnOnce(usize) -> P,
    ) -> Result<Advance<P>, SessionError> {
        let pointer = match &self.state {
            TurnState::Active(p) | TurnState::Suspended(p) => p.clone(),
            TurnState::AwaitingStart | TurnState::GameOver => {
                return Err(SessionError::WrongPhase {
                    actual: session.phase(),
                });
            }
        };

        match next_connected(session, pointer.seat, 1) {
            Some(seat) => {
                let next = TurnPointer {
                    seat,
                    turn_number: pointer.turn_number + 1,
                    phase: opening(seat),
                };
                let change = change_for(session, &next);
                self.state = TurnState::Active(next);
                tracing::debug!(
                    code = %session.code(),
                    seat,
                    turn = pointer.turn_number + 1,
                    "turn advanced"
                );
                Ok(change.map_or(Advance::Suspended, Advance::Next))
            }
            None => {
                tracing::info!(
                    code = %session.code(),
                    seat = pointer.seat,
                    "all members disconnected, session suspended"
                );
                self.state = TurnState::Suspended(pointer);
                Ok(Advance::Suspended)
            }
        }
    }

    /// Leaves suspension once someone is connected again. The scan starts
    /// at the seat where the game stopped, so that member gets the turn
    /// back if they are among the returners. Returns `None` if the
    /// session is not suspended or still has nobody connected.
    pub fn resume(
        &mut self,
        session: &Session,
        opening: impl FnOnce(usize) -> P,
    ) -> Option<TurnChange<P>> {
        let TurnState::Suspended(pointer) = &self.state else {
            return None;
        };
        let seat = next_connected(session, pointer.seat, 0)?;
        let next = TurnPointer {
            seat,
            turn_number: pointer.turn_number + 1,
            phase: opening(seat),
        };
        let change = change_for(session, &next);
        self.state = TurnState::Active(next);
        tracing::info!(code = %session.code(), seat, "session resumed");
        change
    }

    /// Ends the game and the session.
    pub fn finish(&mut self, session: &mut Session) {
        self.state = TurnState::GameOver;
        session.end();
    }
}

impl<P: Clone + PartialEq> Default for TurnAuthority<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// First seat at or after `from + offset` (wrapping, at most one lap)
/// whose member is connected.
fn next_connected(session: &Session, from: usize, offset: usize) -> Option<usize> {
    let n = session.members().len();
    if n == 0 {
        return None;
    }
    (0..n)
        .map(|step| (from + offset + step) % n)
        .find(|&seat| session.at_seat(seat).is_some_and(|m| m.is_connected()))
}

fn change_for<P: Clone>(
    session: &Session,
    pointer: &TurnPointer<P>,
) -> Option<TurnChange<P>> {
    session.at_seat(pointer.seat).map(|m| TurnChange {
        member: m.id(),
        seat: pointer.seat,
        turn_number: pointer.turn_number,
        phase: pointer.phase.clone(),
    })
}

// =========================================================================
// Tests
// =========================================================================
