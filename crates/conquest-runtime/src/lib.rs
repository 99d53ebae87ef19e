//! Async runtime for Conquest sessions.
//!
//! Each live session is an actor: a Tokio task that owns the session's
//! [`GameTable`](conquest_turn::GameTable) and processes one command at a
//! time from a bounded channel. That single consumer is the per-session
//! lock; different sessions run concurrently with no shared state.
//!
//! # Key types
//!
//! - [`SessionHandle`]: send commands to a running session actor
//! - [`SessionStore`]: creates sessions, looks them up by code, expires
//!   them
//! - [`Outbound`]: what a session actor pushes to a member's connection

mod actor;
mod outbound;
mod store;

pub use actor::{SessionHandle, spawn_session};
pub use outbound::{MemberSender, Outbound};
pub use store::SessionStore;
