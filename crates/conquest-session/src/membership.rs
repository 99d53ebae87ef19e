//! Membership rules: join, ready, leave, disconnect, reconnect.
//!
//! ## What leaving means
//!
//! ```text
//!              LOBBY                     IN_PROGRESS / ENDED
//! leave()      remove, promote host      mark disconnected (seat kept)
//! disconnect   (runtime calls leave)     mark disconnected (seat kept)
//! reconnect    n/a (nobody is kept)      mark connected
//! ```
//!
//! Seats are never removed once a game has started, so a member's index
//! stays its turn position for the whole game.

use conquest_protocol::{Identity, MemberId, MemberRole, SessionPhase};

use crate::session::{MAX_DISPLAY_NAME, Member, Session};
use crate::SessionError;

/// Result of a successful [`Session::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new seat was appended.
    Joined(MemberId),
    /// The identity already holds a seat whose connection dropped. The
    /// caller should reattach it with [`Session::reconnect`].
    Returning(MemberId),
}

/// Result of a successful [`Session::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The seat is gone (lobby only).
    Removed {
        /// Set when the leaver was host and someone was left to inherit.
        promoted: Option<MemberId>,
        /// The lobby is now empty.
        emptied: bool,
    },
    /// The seat is kept and marked disconnected. `changed` is false if
    /// the member was already disconnected.
    Disconnected { changed: bool },
}

impl Session {
    /// Seats a new member, or reports that the identity already has a
    /// seat it can return to.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyJoined`]: identity seated and connected
    /// - [`SessionError::WrongPhase`]: new seats only in the lobby
    /// - [`SessionError::SessionFull`]: at `max_members`
    /// - [`SessionError::InvalidDisplayName`]
    pub fn join(
        &mut self,
        identity: Identity,
        display_name: &str,
    ) -> Result<Admission, SessionError> {
        if let Some(existing) = self.member_by_identity(&identity) {
            if existing.connected {
                return Err(SessionError::AlreadyJoined(existing.id));
            }
            return Ok(Admission::Returning(existing.id));
        }
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::WrongPhase { actual: self.phase });
        }
        if self.members.len() >= self.config.max_members {
            return Err(SessionError::SessionFull {
                max: self.config.max_members,
            });
        }
        let display_name = normalize_display_name(display_name)?;

        let id = MemberId(self.next_member_id);
        self.next_member_id += 1;
        let role = if self.members.is_empty() {
            MemberRole::Host
        } else {
            MemberRole::Player
        };
        self.members.push(Member {
            id,
            identity,
            display_name,
            connected: true,
            ready: false,
            role,
        });

        tracing::info!(
            code = %self.code,
            member = %id,
            ?role,
            members = self.members.len(),
            "member joined"
        );
        Ok(Admission::Joined(id))
    }

    /// Sets a member's ready flag. Lobby only.
    pub fn set_ready(
        &mut self,
        member: MemberId,
        ready: bool,
    ) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::WrongPhase { actual: self.phase });
        }
        let entry = self.member_mut(member)?;
        entry.ready = ready;
        tracing::debug!(code = %self.code, %member, ready, "ready changed");
        Ok(())
    }

    /// True when the lobby is non-empty and every member is ready.
    pub fn all_ready(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|m| m.ready)
    }

    /// Leaves the session.
    ///
    /// In the lobby the seat is erased and, if the leaver was host, the
    /// next member in seat order (wrapping) becomes host. Once a game has
    /// started this only marks the member disconnected: removing a seat
    /// would shift every later member's turn position.
    pub fn leave(&mut self, member: MemberId) -> Result<Departure, SessionError> {
        if self.phase != SessionPhase::Lobby {
            let changed = self.mark_disconnected(member)?;
            return Ok(Departure::Disconnected { changed });
        }

        let seat = self
            .seat_of(member)
            .ok_or(SessionError::UnknownMember(member))?;
        let removed = self.members.remove(seat);
        let emptied = self.members.is_empty();

        let promoted = if removed.is_host() && !emptied {
            let len = self.members.len();
            let heir = &mut self.members[seat % len];
            heir.role = MemberRole::Host;
            Some(heir.id)
        } else {
            None
        };

        tracing::info!(
            code = %self.code,
            %member,
            promoted = ?promoted,
            members = self.members.len(),
            "member left lobby"
        );
        Ok(Departure::Removed { promoted, emptied })
    }

    /// Marks a member's connection as lost without touching its seat.
    /// Returns whether anything changed.
    pub fn mark_disconnected(
        &mut self,
        member: MemberId,
    ) -> Result<bool, SessionError> {
        let code = self.code.clone();
        let entry = self.member_mut(member)?;
        let changed = entry.connected;
        entry.connected = false;
        if changed {
            tracing::info!(%code, %member, "member disconnected");
        }
        Ok(changed)
    }

    /// Reattaches the member behind `identity`. A member that still looks
    /// connected is taken over by the new connection.
    ///
    /// # Errors
    /// [`SessionError::UnknownIdentity`] if the identity has no seat.
    pub fn reconnect(
        &mut self,
        identity: &Identity,
    ) -> Result<MemberId, SessionError> {
        let code = self.code.clone();
        let entry = self
            .members
            .iter_mut()
            .find(|m| &m.identity == identity)
            .ok_or_else(|| SessionError::UnknownIdentity(identity.clone()))?;
        let was_connected = entry.connected;
        entry.connected = true;
        tracing::info!(
            %code,
            member = %entry.id,
            takeover = was_connected,
            "member reconnected"
        );
        Ok(entry.id)
    }

    fn member_mut(
        &mut self,
        member: MemberId,
    ) -> Result<&mut Member, SessionError> {
        self.members
            .iter_mut()
            .find(|m| m.id == member)
            .ok_or(SessionError::UnknownMember(member))
    }
}

fn normalize_display_name(raw: &str) -> Result<String, SessionError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_DISPLAY_NAME {
        return Err(SessionError::InvalidDisplayName {
            max: MAX_DISPLAY_NAME,
        });
    }
    Ok(name.to_string())
}

// =========================================================================
// Tests
// =========================================================================
