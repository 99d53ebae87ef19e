//! Session model and membership rules for Conquest.
//!
//! A [`Session`] is one shared game: a code, an ordered list of
//! [`Member`]s (join order is turn order) and a coarse phase. This crate
//! owns the membership rules of that model (who may join, who is host,
//! what leaving means in each phase) and nothing else. It performs no
//! I/O and holds no locks; the runtime serializes access to each session.

mod code;
mod config;
mod error;
mod membership;
mod session;

pub use code::{generate_code, issue_identity, unique_code};
pub use config::SessionConfig;
pub use error::SessionError;
pub use membership::{Admission, Departure};
pub use session::{MAX_DISPLAY_NAME, Member, Session};
