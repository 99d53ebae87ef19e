//! Session actor: an isolated Tokio task that owns one session.
//!
//! Every request for a session is a [`SessionCommand`] on the actor's
//! channel. The actor runs each command to completion, broadcasts
//! included, before taking the next, so no two requests for the same
//! session ever interleave.

use std::collections::HashMap;

use conquest_protocol::{Identity, MemberId, ServerMessage, SessionCode, SessionSummary};
use conquest_session::{Departure, SessionConfig, SessionError};
use conquest_transport::ConnectionId;
use conquest_turn::{Arrival, Exit, GameTable, Reattach, RuleEngine, TurnEffect};
use tokio::sync::{mpsc, oneshot};

use crate::{MemberSender, Outbound};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Commands sent to a session actor through its channel.
///
/// Member-scoped commands carry the connection they arrived on. Only the
/// member's current connection may act for it.
pub(crate) enum SessionCommand<G: RuleEngine> {
    Join {
        identity: Identity,
        display_name: String,
        connection: ConnectionId,
        outbox: MemberSender<G>,
        reply: Reply<MemberId>,
    },
    Reconnect {
        identity: Identity,
        connection: ConnectionId,
        outbox: MemberSender<G>,
        reply: Reply<MemberId>,
    },
    SetReady {
        member: MemberId,
        connection: ConnectionId,
        ready: bool,
        reply: Reply<()>,
    },
    Start {
        member: MemberId,
        connection: ConnectionId,
        reply: Reply<()>,
    },
    Submit {
        member: MemberId,
        connection: ConnectionId,
        action: G::Action,
        reply: Reply<()>,
    },
    Leave {
        member: MemberId,
        connection: ConnectionId,
        reply: Reply<()>,
    },
    /// The transport noticed `connection` closing. Ignored if the member
    /// has since been reattached through another connection.
    Disconnect {
        member: MemberId,
        connection: ConnectionId,
    },
    Resync {
        member: MemberId,
        connection: ConnectionId,
        reply: Reply<()>,
    },
    Abort {
        member: MemberId,
        connection: ConnectionId,
        reply: Reply<()>,
    },
    Summary {
        reply: oneshot::Sender<SessionSummary>,
    },
    Shutdown {
        reason: String,
    },
}

/// Handle to a running session actor.
///
/// Cheap to clone. Once the actor has stopped every call fails with
/// [`SessionError::Expired`].
pub struct SessionHandle<G: RuleEngine> {
    code: SessionCode,
    sender: mpsc::Sender<SessionCommand<G>>,
}

impl<G: RuleEngine> Clone for SessionHandle<G> {
    fn clone(&self) -> Self {
        Self {
            code: self.code.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<G: RuleEngine> SessionHandle<G> {
    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    /// True once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Joins (or rejoins) the session. `outbox` receives everything the
    /// session sends this member from now on.
    pub async fn join(
        &self,
        identity: Identity,
        display_name: impl Into<String>,
        connection: ConnectionId,
        outbox: MemberSender<G>,
    ) -> Result<MemberId, SessionError> {
        let display_name = display_name.into();
        self.request(|reply| SessionCommand::Join {
            identity,
            display_name,
            connection,
            outbox,
            reply,
        })
        .await
    }

    /// Reattaches an identity that already holds a seat.
    pub async fn reconnect(
        &self,
        identity: Identity,
        connection: ConnectionId,
        outbox: MemberSender<G>,
    ) -> Result<MemberId, SessionError> {
        self.request(|reply| SessionCommand::Reconnect {
            identity,
            connection,
            outbox,
            reply,
        })
        .await
    }

    pub async fn set_ready(
        &self,
        member: MemberId,
        connection: ConnectionId,
        ready: bool,
    ) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SetReady {
            member,
            connection,
            ready,
            reply,
        })
        .await
    }

    pub async fn start(
        &self,
        member: MemberId,
        connection: ConnectionId,
    ) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Start {
            member,
            connection,
            reply,
        })
        .await
    }

    /// Submits an action. `Ok` means it was applied and broadcast; an
    /// error is for the sender alone.
    pub async fn submit(
        &self,
        member: MemberId,
        connection: ConnectionId,
        action: G::Action,
    ) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Submit {
            member,
            connection,
            action,
            reply,
        })
        .await
    }

    pub async fn leave(
        &self,
        member: MemberId,
        connection: ConnectionId,
    ) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Leave {
            member,
            connection,
            reply,
        })
        .await
    }

    /// Reports a closed connection (fire-and-forget).
    pub async fn disconnect(
        &self,
        member: MemberId,
        connection: ConnectionId,
    ) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Disconnect { member, connection })
            .await
            .map_err(|_| SessionError::Expired(self.code.clone()))
    }

    /// Re-sends the full state and current turn to `member`.
    pub async fn resync(
        &self,
        member: MemberId,
        connection: ConnectionId,
    ) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Resync {
            member,
            connection,
            reply,
        })
        .await
    }

    pub async fn abort(
        &self,
        member: MemberId,
        connection: ConnectionId,
    ) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Abort {
            member,
            connection,
            reply,
        })
        .await
    }

    pub async fn summary(&self) -> Result<SessionSummary, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Summary { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Expired(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Expired(self.code.clone()))
    }

    /// Ends the session, tells every connected member why, and stops the
    /// actor.
    pub async fn shutdown(&self, reason: impl Into<String>) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Shutdown {
                reason: reason.into(),
            })
            .await
            .map_err(|_| SessionError::Expired(self.code.clone()))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand<G>,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Expired(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Expired(self.code.clone()))?
    }
}

/// Whether the actor keeps running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct SessionActor<G: RuleEngine> {
    table: GameTable<G>,
    /// The connection each member is currently reached through.
    outboxes: HashMap<MemberId, (ConnectionId, MemberSender<G>)>,
    receiver: mpsc::Receiver<SessionCommand<G>>,
}

impl<G: RuleEngine> SessionActor<G> {
    async fn run(mut self) {
        let code = self.table.code().clone();
        tracing::info!(%code, "session actor started");

        while let Some(cmd) = self.receiver.recv().await {
            if self.handle(cmd) == Flow::Stop {
                break;
            }
        }

        tracing::info!(%code, "session actor stopped");
    }

    fn handle(&mut self, cmd: SessionCommand<G>) -> Flow {
        match cmd {
            SessionCommand::Join {
                identity,
                display_name,
                connection,
                outbox,
                reply,
            } => {
                let result = match self.table.join(identity, &display_name) {
                    Ok(Arrival::Joined(member)) => {
                        self.attach(member, connection, outbox);
                        self.send_joined(member);
                        self.broadcast_update();
                        Ok(member)
                    }
                    Ok(Arrival::Rejoined(reattach)) => {
                        Ok(self.reattached(reattach, connection, outbox))
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Reconnect {
                identity,
                connection,
                outbox,
                reply,
            } => {
                let result = self
                    .table
                    .reconnect(&identity)
                    .map(|reattach| self.reattached(reattach, connection, outbox));
                let _ = reply.send(result);
            }
            SessionCommand::SetReady {
                member,
                connection,
                ready,
                reply,
            } => {
                let result = self
                    .authorize(member, connection)
                    .and_then(|()| self.table.set_ready(member, ready));
                if result.is_ok() {
                    self.broadcast_update();
                }
                let _ = reply.send(result);
            }
            SessionCommand::Start {
                member,
                connection,
                reply,
            } => {
                let result = self
                    .authorize(member, connection)
                    .and_then(|()| self.table.start_game(member))
                    .map(|change| {
                        self.broadcast_update();
                        if let Some(snapshot) = self.table.snapshot() {
                            self.broadcast(Outbound::FullState(snapshot));
                        }
                        self.broadcast(Outbound::TurnChanged(change));
                    });
                let _ = reply.send(result);
            }
            SessionCommand::Submit {
                member,
                connection,
                action,
                reply,
            } => {
                let result = self
                    .authorize(member, connection)
                    .and_then(|()| self.table.submit_action(member, action))
                    .map(|outcome| {
                        self.broadcast(Outbound::Delta(outcome.delta));
                        self.apply_turn_effect(outcome.turn);
                    });
                if let Err(e) = &result {
                    tracing::debug!(
                        code = %self.table.code(),
                        %member,
                        error = %e,
                        "action rejected"
                    );
                }
                let _ = reply.send(result);
            }
            SessionCommand::Leave {
                member,
                connection,
                reply,
            } => {
                match self
                    .authorize(member, connection)
                    .and_then(|()| self.table.leave(member))
                {
                    Ok(exit) => {
                        self.send_to(member, Outbound::Message(ServerMessage::SessionLeft));
                        self.outboxes.remove(&member);
                        let flow = self.after_exit(exit);
                        let _ = reply.send(Ok(()));
                        return flow;
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            SessionCommand::Disconnect { member, connection } => {
                let current = self.outboxes.get(&member).map(|(conn, _)| *conn);
                if current != Some(connection) {
                    tracing::debug!(
                        code = %self.table.code(),
                        %member,
                        %connection,
                        "stale disconnect ignored"
                    );
                    return Flow::Continue;
                }
                self.outboxes.remove(&member);
                match self.table.disconnect(member) {
                    Ok(exit) => return self.after_exit(exit),
                    Err(e) => {
                        tracing::warn!(
                            code = %self.table.code(),
                            %member,
                            error = %e,
                            "disconnect for unknown member"
                        );
                    }
                }
            }
            SessionCommand::Resync {
                member,
                connection,
                reply,
            } => {
                let result = self.authorize(member, connection).map(|()| {
                    self.send_state(member);
                });
                let _ = reply.send(result);
            }
            SessionCommand::Abort {
                member,
                connection,
                reply,
            } => {
                let result = self
                    .authorize(member, connection)
                    .and_then(|()| self.table.abort(member))
                    .map(|()| {
                        self.broadcast_update();
                        self.broadcast_ended("aborted by host");
                    });
                let _ = reply.send(result);
            }
            SessionCommand::Summary { reply } => {
                let _ = reply.send(self.table.summary());
            }
            SessionCommand::Shutdown { reason } => {
                tracing::info!(code = %self.table.code(), %reason, "session shutting down");
                self.table.end();
                self.broadcast_ended(&reason);
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Checks that `connection` is the one `member` is reached through.
    /// A connection replaced by a takeover, or one whose member has since
    /// dropped, no longer speaks for the member.
    fn authorize(&self, member: MemberId, connection: ConnectionId) -> Result<(), SessionError> {
        if self.table.session().member(member).is_none() {
            return Err(SessionError::UnknownMember(member));
        }
        match self.outboxes.get(&member) {
            Some((current, _)) if *current == connection => Ok(()),
            _ => {
                tracing::debug!(
                    code = %self.table.code(),
                    %member,
                    %connection,
                    "request from superseded connection"
                );
                Err(SessionError::Superseded(member))
            }
        }
    }

    fn attach(&mut self, member: MemberId, connection: ConnectionId, outbox: MemberSender<G>) {
        if let Some((previous, _)) = self.outboxes.insert(member, (connection, outbox)) {
            if previous != connection {
                tracing::debug!(
                    code = %self.table.code(),
                    %member,
                    %previous,
                    %connection,
                    "connection taken over"
                );
            }
        }
    }

    /// Wires a returning member back in: membership news for everyone,
    /// full state and turn for the returner.
    fn reattached(
        &mut self,
        reattach: Reattach<G::Phase>,
        connection: ConnectionId,
        outbox: MemberSender<G>,
    ) -> MemberId {
        let member = reattach.member;
        self.attach(member, connection, outbox);
        self.send_joined(member);
        self.broadcast_except(
            member,
            Outbound::Message(ServerMessage::MemberReconnected { member_id: member }),
        );
        self.broadcast_update();
        match reattach.resumed {
            Some(change) => {
                if let Some(snapshot) = self.table.snapshot() {
                    self.send_to(member, Outbound::FullState(snapshot));
                }
                self.broadcast(Outbound::TurnChanged(change));
            }
            None => self.send_game(member),
        }
        member
    }

    fn after_exit(&mut self, exit: Exit<G::Phase>) -> Flow {
        if let Departure::Disconnected { changed: true } = exit.departure {
            self.broadcast(Outbound::Message(ServerMessage::MemberDisconnected {
                member_id: exit.member,
            }));
        }
        self.broadcast_update();
        self.apply_turn_effect(exit.turn);

        if let Departure::Removed { emptied: true, .. } = exit.departure {
            tracing::info!(code = %self.table.code(), "lobby emptied");
            return Flow::Stop;
        }
        Flow::Continue
    }

    fn apply_turn_effect(&mut self, effect: TurnEffect<G::Phase>) {
        match effect {
            TurnEffect::Unchanged => {}
            TurnEffect::Changed(change) => self.broadcast(Outbound::TurnChanged(change)),
            TurnEffect::Suspended => self.broadcast_update(),
            TurnEffect::GameOver => {
                self.broadcast_update();
                self.broadcast_ended("game over");
            }
        }
    }

    fn send_joined(&self, member: MemberId) {
        self.send_to(
            member,
            Outbound::Message(ServerMessage::SessionJoined {
                code: self.table.code().clone(),
                member_id: member,
            }),
        );
    }

    /// Summary, then full state and current turn if a game is running.
    fn send_state(&self, member: MemberId) {
        self.send_to(
            member,
            Outbound::Message(ServerMessage::SessionUpdate {
                session: self.table.summary(),
            }),
        );
        self.send_game(member);
    }

    fn send_game(&self, member: MemberId) {
        if let Some(snapshot) = self.table.snapshot() {
            self.send_to(member, Outbound::FullState(snapshot));
        }
        if let Some(change) = self.table.current_turn() {
            self.send_to(member, Outbound::TurnChanged(change));
        }
    }

    fn broadcast_update(&self) {
        self.broadcast(Outbound::Message(ServerMessage::SessionUpdate {
            session: self.table.summary(),
        }));
    }

    fn broadcast_ended(&self, reason: &str) {
        self.broadcast(Outbound::Message(ServerMessage::SessionEnded {
            reason: reason.to_string(),
        }));
    }

    fn broadcast(&self, msg: Outbound<G>) {
        for (_, outbox) in self.outboxes.values() {
            let _ = outbox.send(msg.clone());
        }
    }

    fn broadcast_except(&self, excluded: MemberId, msg: Outbound<G>) {
        for (member, (_, outbox)) in &self.outboxes {
            if *member != excluded {
                let _ = outbox.send(msg.clone());
            }
        }
    }

    /// Silently drops the message if the member has no live connection.
    fn send_to(&self, member: MemberId, msg: Outbound<G>) {
        if let Some((_, outbox)) = self.outboxes.get(&member) {
            let _ = outbox.send(msg);
        }
    }
}

/// Spawns a session actor and returns a handle to it.
///
/// `channel_size` bounds the command queue; callers wait when it is full.
pub fn spawn_session<G: RuleEngine>(
    code: SessionCode,
    config: SessionConfig,
    game_config: G::Config,
    channel_size: usize,
) -> SessionHandle<G> {
    let (tx, rx) = mpsc::channel(channel_size);

    let actor = SessionActor::<G> {
        table: GameTable::new(code.clone(), config, game_config),
        outboxes: HashMap::new(),
        receiver: rx,
    };

    tokio::spawn(actor.run());

    SessionHandle { code, sender: tx }
}
