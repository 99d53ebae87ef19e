//! Canonical game state and its versioned deltas.
//!
//! The synchronizer is the only writer of the game state. Every applied
//! action bumps `version` by exactly one, so a client that sees a delta
//! whose version is not `last + 1` knows it missed something and should
//! ask for a snapshot.

use std::fmt;

use conquest_session::SessionError;

use crate::rules::{Applied, RuleEngine, TurnProgress};

/// One broadcast change. `version` is the state version *after* applying.
pub struct StateDelta<G: RuleEngine> {
    pub version: u64,
    pub delta: G::Delta,
}

impl<G: RuleEngine> Clone for StateDelta<G> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            delta: self.delta.clone(),
        }
    }
}

impl<G: RuleEngine> fmt::Debug for StateDelta<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDelta")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// The full state at `version`, for members that (re)join mid-game.
pub struct Snapshot<G: RuleEngine> {
    pub version: u64,
    pub state: G::State,
}

impl<G: RuleEngine> Clone for Snapshot<G> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            state: self.state.clone(),
        }
    }
}

impl<G: RuleEngine> fmt::Debug for Snapshot<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Owns the authoritative game state for one session.
pub struct StateSynchronizer<G: RuleEngine> {
    config: G::Config,
    state: Option<G::State>,
    version: u64,
}

impl<G: RuleEngine> StateSynchronizer<G> {
    pub fn new(config: G::Config) -> Self {
        Self {
            config,
            state: None,
            version: 0,
        }
    }

    /// Builds the opening state. Version 0 is the state before any
    /// action.
    pub fn start(&mut self, seats: usize) -> &G::State {
        self.version = 0;
        self.state.insert(G::init(&self.config, seats))
    }

    /// `None` until the game has started.
    pub fn state(&self) -> Option<&G::State> {
        self.state.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_started(&self) -> bool {
        self.state.is_some()
    }

    /// Runs the rule engine's legality check.
    pub fn check(
        &self,
        phase: &G::Phase,
        seat: usize,
        action: &G::Action,
    ) -> Result<(), SessionError> {
        let state = self.started()?;
        G::check_action(state, phase, seat, action).map_err(SessionError::IllegalAction)
    }

    /// Applies an action. The rule engine works on a copy; the canonical
    /// state and version only move if it succeeds.
    pub fn apply_action(
        &mut self,
        phase: &G::Phase,
        seat: usize,
        action: G::Action,
    ) -> Result<(StateDelta<G>, TurnProgress<G::Phase>), SessionError> {
        let mut next = self.started()?.clone();
        let Applied { delta, next: progress } =
            G::apply_action(&mut next, phase, seat, action)
                .map_err(SessionError::IllegalAction)?;

        self.state = Some(next);
        self.version += 1;
        Ok((
            StateDelta {
                version: self.version,
                delta,
            },
            progress,
        ))
    }

    pub fn snapshot(&self) -> Option<Snapshot<G>> {
        self.state.as_ref().map(|state| Snapshot {
            version: self.version,
            state: state.clone(),
        })
    }

    /// Opening sub-phase for `seat`. `None` before the game starts.
    pub fn opening_phase(&self, seat: usize) -> Option<G::Phase> {
        self.state.as_ref().map(|s| G::opening_phase(s, seat))
    }

    fn started(&self) -> Result<&G::State, SessionError> {
        self.state
            .as_ref()
            .ok_or_else(|| SessionError::IllegalAction("game has not started".into()))
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    /// Adds to a shared total. Zero is illegal; negative fails mid-apply.
    struct Adder;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Total {
        sum: i64,
        touched: u32,
    }

    impl RuleEngine for Adder {
        type Config = ();
        type State = Total;
        type Action = i64;
        type Delta = i64;
        type Phase = ();

        fn init(_: &(), _: usize) -> Total {
            Total { sum: 0, touched: 0 }
        }

        fn opening_phase(_: &Total, _: usize) {}

        fn check_action(_: &Total, _: &(), _: usize, action: &i64) -> Result<(), String> {
            if *action == 0 {
                Err("zero does nothing".into())
            } else {
                Ok(())
            }
        }

        fn apply_action(
            state: &mut Total,
            _: &(),
            _: usize,
            action: i64,
        ) -> Result<Applied<i64, ()>, String> {
            state.touched += 1;
            if action < 0 {
                return Err("no subtracting".into());
            }
            state.sum += action;
            Ok(Applied {
                delta: action,
                next: TurnProgress::EndTurn,
            })
        }
    }

    fn started() -> StateSynchronizer<Adder> {
        let mut sync = StateSynchronizer::<Adder>::new(());
        sync.start(2);
        sync
    }

    #[test]
    fn test_apply_action_before_start_rejected() {
        let mut sync = StateSynchronizer::<Adder>::new(());
        assert!(!sync.is_started());
        assert!(matches!(
            sync.apply_action(&(), 0, 5),
            Err(SessionError::IllegalAction(_))
        ));
        assert!(sync.snapshot().is_none());
    }

    #[test]
    fn test_apply_action_versions_increase_by_one() {
        let mut sync = started();
        assert_eq!(sync.version(), 0);
        let versions: Vec<u64> = (1..=4)
            .map(|n| sync.apply_action(&(), 0, n).unwrap().0.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
        assert_eq!(sync.state().unwrap().sum, 10);
    }

    #[test]
    fn test_apply_action_failure_leaves_state_untouched() {
        let mut sync = started();
        sync.apply_action(&(), 0, 3).unwrap();
        let before = sync.state().unwrap().clone();

        let err = sync.apply_action(&(), 0, -1).unwrap_err();
        assert_eq!(err, SessionError::IllegalAction("no subtracting".into()));
        assert_eq!(sync.state().unwrap(), &before);
        assert_eq!(sync.version(), 1);
    }

    #[test]
    fn test_check_surfaces_rule_engine_message() {
        let sync = started();
        assert_eq!(
            sync.check(&(), 0, &0),
            Err(SessionError::IllegalAction("zero does nothing".into()))
        );
        assert_eq!(sync.check(&(), 0, &1), Ok(()));
    }

    #[test]
    fn test_snapshot_matches_state_and_version() {
        let mut sync = started();
        sync.apply_action(&(), 1, 7).unwrap();
        let snap = sync.snapshot().unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.state.sum, 7);
    }

    #[test]
    fn test_start_resets_version() {
        let mut sync = started();
        sync.apply_action(&(), 0, 2).unwrap();
        sync.start(3);
        assert!(sync.is_started());
        assert_eq!(sync.version(), 0);
        assert_eq!(sync.state().unwrap().sum, 0);
    }
}
