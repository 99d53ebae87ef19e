//! Session store: creates sessions, finds them by code, expires them.
//!
//! The store is the only state shared between sessions. It is meant to
//! sit behind one lock so creation and removal go through a single
//! mutation path and two sessions can never be handed the same code.

use std::collections::HashMap;
use std::time::Instant;

use conquest_protocol::{Identity, MemberId, SessionCode};
use conquest_session::{SessionConfig, SessionError, unique_code};
use conquest_transport::ConnectionId;
use conquest_turn::RuleEngine;

use crate::actor::spawn_session;
use crate::{MemberSender, SessionHandle};

/// Default command channel size for session actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

struct Entry<G: RuleEngine> {
    handle: SessionHandle<G>,
    created_at: Instant,
    last_activity: Instant,
}

/// All live sessions, keyed by code.
pub struct SessionStore<G: RuleEngine> {
    sessions: HashMap<SessionCode, Entry<G>>,
    config: SessionConfig,
    game_config: G::Config,
}

impl<G: RuleEngine> SessionStore<G> {
    pub fn new(config: SessionConfig, game_config: G::Config) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
            game_config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates a session under a fresh code with `identity` as host.
    ///
    /// Nothing is registered if the host cannot join (for example an
    /// invalid display name).
    pub async fn create_session(
        &mut self,
        identity: Identity,
        display_name: &str,
        connection: ConnectionId,
        outbox: MemberSender<G>,
        now: Instant,
    ) -> Result<(SessionHandle<G>, MemberId), SessionError> {
        let code = unique_code(&mut rand::rng(), |c| self.sessions.contains_key(c));
        let handle = spawn_session::<G>(
            code.clone(),
            self.config.clone(),
            self.game_config.clone(),
            DEFAULT_CHANNEL_SIZE,
        );
        let host = handle
            .join(identity, display_name, connection, outbox)
            .await?;

        self.sessions.insert(
            code.clone(),
            Entry {
                handle: handle.clone(),
                created_at: now,
                last_activity: now,
            },
        );
        tracing::info!(%code, %host, sessions = self.sessions.len(), "session created");
        Ok((handle, host))
    }

    /// Read-only lookup. Does not refresh activity; a session past its
    /// expiry window is reported as not found.
    pub fn get(&self, code: &SessionCode, now: Instant) -> Result<SessionHandle<G>, SessionError> {
        match self.sessions.get(code) {
            Some(entry) if !self.is_expired(entry, now) && !entry.handle.is_closed() => {
                Ok(entry.handle.clone())
            }
            _ => Err(SessionError::NotFound(code.clone())),
        }
    }

    /// Lookup for a state-changing request: refreshes the session's
    /// activity time.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: unknown code or a stopped session
    /// - [`SessionError::Expired`]: found past its expiry window; it is
    ///   removed on the spot
    pub async fn checkout(
        &mut self,
        code: &SessionCode,
        now: Instant,
    ) -> Result<SessionHandle<G>, SessionError> {
        let Some(entry) = self.sessions.get(code) else {
            return Err(SessionError::NotFound(code.clone()));
        };
        if entry.handle.is_closed() {
            self.sessions.remove(code);
            return Err(SessionError::NotFound(code.clone()));
        }
        if self.is_expired(entry, now) {
            if let Some(entry) = self.sessions.remove(code) {
                let _ = entry.handle.shutdown("expired").await;
                tracing::info!(%code, "session expired on lookup");
            }
            return Err(SessionError::Expired(code.clone()));
        }

        let entry = self
            .sessions
            .get_mut(code)
            .ok_or_else(|| SessionError::NotFound(code.clone()))?;
        entry.last_activity = now;
        Ok(entry.handle.clone())
    }

    /// Removes every session idle past the expiry window (whatever its
    /// phase) and every session whose actor has stopped. Expired sessions
    /// tell their connected members why. Returns the removed codes.
    pub async fn remove_expired(&mut self, now: Instant) -> Vec<SessionCode> {
        let doomed: Vec<SessionCode> = self
            .sessions
            .iter()
            .filter(|(_, entry)| entry.handle.is_closed() || self.is_expired(entry, now))
            .map(|(code, _)| code.clone())
            .collect();

        for code in &doomed {
            let Some(entry) = self.sessions.remove(code) else {
                continue;
            };
            if entry.handle.is_closed() {
                tracing::debug!(%code, "reaped stopped session");
            } else {
                let _ = entry.handle.shutdown("expired").await;
                tracing::info!(
                    %code,
                    age_secs = now.saturating_duration_since(entry.created_at).as_secs(),
                    "session expired"
                );
            }
        }
        doomed
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_expired(&self, entry: &Entry<G>, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_activity) > self.config.expiry
    }
}
