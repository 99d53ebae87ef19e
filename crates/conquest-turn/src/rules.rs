//! The `RuleEngine` trait: where a concrete game plugs in.
//!
//! The session core decides *whose* turn it is. Everything about *what*
//! a player may do during their turn (placing armies, attacking,
//! fortifying, who wins) is delegated to the rule engine. The core keeps
//! the game state as an opaque value and only ever touches it through
//! these functions.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};

/// What the turn should do after an action has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnProgress<P> {
    /// Same player keeps the turn, now in sub-phase `P`.
    Continue(P),
    /// The active player is done; hand the turn to the next connected
    /// seat.
    EndTurn,
    /// The game has been decided.
    GameOver,
}

/// The outcome of a successful [`RuleEngine::apply_action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<D, P> {
    /// Smallest change that lets a client holding the previous state
    /// reach the new one.
    pub delta: D,
    pub next: TurnProgress<P>,
}

/// Rules of a turn-based game.
///
/// Players are addressed by *seat*: their position in turn order, fixed
/// when the game starts. Seats never shift, even when players drop out.
///
/// All functions are synchronous and must return promptly; they run
/// inside the session's serial processing loop.
pub trait RuleEngine: Send + Sync + 'static {
    /// Game-specific settings (map, starting armies, ...).
    type Config: Send + Sync + Clone + Default;

    /// Full game state. Sent to clients as a snapshot on resync.
    type State: Send + Sync + Clone + Serialize + DeserializeOwned;

    /// What a client submits during its turn.
    type Action: Send + Sync + Clone + Serialize + DeserializeOwned;

    /// Per-action change broadcast to every member.
    type Delta: Send + Sync + Clone + Serialize + DeserializeOwned;

    /// Sub-phase within a turn, e.g. reinforce → attack → fortify.
    type Phase: Send
        + Sync
        + Clone
        + PartialEq
        + fmt::Debug
        + Serialize
        + DeserializeOwned;

    /// Builds the starting state for `seats` players.
    fn init(config: &Self::Config, seats: usize) -> Self::State;

    /// The sub-phase a turn begins in for `seat`.
    fn opening_phase(state: &Self::State, seat: usize) -> Self::Phase;

    /// Cheap legality check run before `apply_action`. Default: accept.
    ///
    /// Returning `Err` rejects the action with an explanation for the
    /// sender; nothing is applied or broadcast.
    fn check_action(
        _state: &Self::State,
        _phase: &Self::Phase,
        _seat: usize,
        _action: &Self::Action,
    ) -> Result<(), String> {
        Ok(())
    }

    /// Applies an action for `seat`.
    ///
    /// On `Err` the caller discards `state`, so an implementation may
    /// bail out half way through without cleaning up.
    fn apply_action(
        state: &mut Self::State,
        phase: &Self::Phase,
        seat: usize,
        action: Self::Action,
    ) -> Result<Applied<Self::Delta, Self::Phase>, String>;
}
