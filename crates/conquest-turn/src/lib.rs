//! Turn authority and state synchronization for Conquest sessions.
//!
//! This crate is the synchronous core of a running game:
//!
//! - [`RuleEngine`]: the seam where a concrete game plugs in its rules
//! - [`TurnAuthority`]: whose turn it is, and what happens when they drop
//! - [`StateSynchronizer`]: the canonical state, versioned deltas, snapshots
//! - [`GameTable`]: one session's membership, turns and state composed
//!   behind validate/apply calls
//!
//! Nothing here blocks or performs I/O. The runtime owns one `GameTable`
//! per session and feeds it one request at a time.

mod rules;
mod sync;
mod table;
mod turn;

pub use rules::{Applied, RuleEngine, TurnProgress};
pub use sync::{Snapshot, StateDelta, StateSynchronizer};
pub use table::{ActionOutcome, Arrival, Exit, GameTable, Reattach, TurnEffect};
pub use turn::{Advance, TurnAuthority, TurnChange, TurnPointer, TurnState};
