//! Connection gateway: one task pair per accepted connection.
//!
//! The flow is:
//!   1. Receive `Handshake` → check version, settle the identity
//!   2. Send `HandshakeAck`
//!   3. Split off a writer task that drains the connection's outbox
//!   4. Loop: receive envelopes → dispatch to the session store or to the
//!      session this connection is bound to
//!
//! Session actors never see a socket. They push [`Outbound`] values into
//! the connection's outbox, and the writer task encodes and frames them.
//! Replies that concern only this connection (heartbeats, rejections) go
//! through the same outbox so `seq` stays monotonic.

use std::sync::Arc;
use std::time::Instant;

use conquest_protocol::{
    ClientMessage, Codec, Envelope, Identity, MemberId, ProtocolError, RejectReason,
    ServerMessage, SessionCode, SessionPhase,
};
use conquest_runtime::{MemberSender, Outbound, SessionHandle};
use conquest_session::{SessionError, issue_identity};
use conquest_transport::{
    Connection, ConnectionId, FrameSink, FrameSource, WebSocketConnection, WebSocketReader,
    WebSocketWriter,
};
use conquest_turn::RuleEngine;
use tokio::sync::mpsc;

use crate::server::{PROTOCOL_VERSION, ServerState};
use crate::ConquestError;

/// The session this connection currently speaks for.
struct Binding<G: RuleEngine> {
    code: SessionCode,
    member: MemberId,
    handle: SessionHandle<G>,
}

/// Holds the connection's binding and reports the disconnect to the
/// session when the handler exits, even on early return.
///
/// `Drop` is synchronous, so the notification is a spawned
/// fire-and-forget task.
struct BindingGuard<G: RuleEngine> {
    connection: ConnectionId,
    binding: Option<Binding<G>>,
}

impl<G: RuleEngine> Drop for BindingGuard<G> {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.take() {
            let connection = self.connection;
            tokio::spawn(async move {
                let _ = binding
                    .handle
                    .disconnect(binding.member, connection)
                    .await;
            });
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<G, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<G, C>>,
) -> Result<(), ConquestError>
where
    G: RuleEngine,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");
    let (mut sink, mut source) = conn.split();

    // --- Step 1: Handshake ---
    let identity = match perform_handshake(&mut sink, &mut source, &state).await {
        Ok(identity) => identity,
        Err(e) => {
            let _ = sink.close().await;
            return Err(e);
        }
    };
    tracing::info!(%conn_id, %identity, "connection identified");

    // --- Step 2: Writer task ---
    let (outbox, inbox) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(sink, inbox, Arc::clone(&state)));

    // --- Step 3: Message loop ---
    let mut gateway = Gateway {
        conn_id,
        identity,
        state: Arc::clone(&state),
        outbox,
        guard: BindingGuard {
            connection: conn_id,
            binding: None,
        },
    };

    loop {
        let data = match tokio::time::timeout(state.config.idle_timeout, source.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%conn_id, "connection timed out");
                break;
            }
        };

        let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode envelope");
                gateway.reject(RejectReason::Malformed, e.to_string());
                continue;
            }
        };

        if gateway.dispatch(envelope.payload).await == Flow::Close {
            break;
        }
    }

    // The guard drops with the gateway → session disconnect fires, the
    // outbox closes and the writer task ends.
    Ok(())
}

/// Receives the first frame and answers it. Returns the connection's
/// identity.
async fn perform_handshake<G, C>(
    sink: &mut WebSocketWriter,
    source: &mut WebSocketReader,
    state: &ServerState<G, C>,
) -> Result<Identity, ConquestError>
where
    G: RuleEngine,
    C: Codec,
{
    let data = match tokio::time::timeout(state.config.handshake_timeout, source.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before handshake".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(ConquestError::Transport(e)),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            send_error(sink, state, 400, "expected Handshake").await?;
            return Err(e.into());
        }
    };

    let (version, identity) = match envelope.payload {
        ClientMessage::Handshake { version, identity } => (version, identity),
        _ => {
            send_error(sink, state, 400, "expected Handshake").await?;
            return Err(
                ProtocolError::InvalidMessage("first message must be Handshake".into()).into(),
            );
        }
    };

    if version != PROTOCOL_VERSION {
        send_error(
            sink,
            state,
            400,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let identity = match identity {
        Some(raw) => match Identity::parse(&raw) {
            Ok(identity) => identity,
            Err(e) => {
                send_error(sink, state, 400, &e.to_string()).await?;
                return Err(e.into());
            }
        },
        None => issue_identity(),
    };

    let ack = Envelope {
        seq: 0,
        timestamp: state.clock(),
        payload: ServerMessage::HandshakeAck {
            identity: identity.as_str().to_string(),
            server_time: state.clock(),
        },
    };
    sink.send(state.codec.encode(&ack)?).await?;
    Ok(identity)
}

/// Sends a connection-level `Error` before the writer task exists.
async fn send_error<G, C>(
    sink: &mut WebSocketWriter,
    state: &ServerState<G, C>,
    code: u16,
    message: &str,
) -> Result<(), ConquestError>
where
    G: RuleEngine,
    C: Codec,
{
    let envelope = Envelope {
        seq: 0,
        timestamp: state.clock(),
        payload: ServerMessage::Error {
            code,
            message: message.to_string(),
        },
    };
    sink.send(state.codec.encode(&envelope)?).await?;
    Ok(())
}

/// Drains the outbox into the socket, framing each message with the next
/// `seq`. Ends when every sender is gone or the socket fails.
async fn write_loop<G, C>(
    mut sink: WebSocketWriter,
    mut inbox: mpsc::UnboundedReceiver<Outbound<G>>,
    state: Arc<ServerState<G, C>>,
) where
    G: RuleEngine,
    C: Codec,
{
    let conn_id = sink.id();
    let mut seq: u64 = 1;

    while let Some(outbound) = inbox.recv().await {
        let bytes = match encode_outbound(&state.codec, outbound).and_then(|payload| {
            state.codec.encode(&Envelope {
                seq,
                timestamp: state.clock(),
                payload,
            })
        }) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "dropping unencodable message");
                continue;
            }
        };
        seq += 1;

        if let Err(e) = sink.send(bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, writer stopping");
            return;
        }
    }

    let _ = sink.close().await;
}

/// Turns a session actor's typed message into a wire message, encoding
/// game payloads with the codec.
fn encode_outbound<G: RuleEngine, C: Codec>(
    codec: &C,
    outbound: Outbound<G>,
) -> Result<ServerMessage, ProtocolError> {
    Ok(match outbound {
        Outbound::Message(msg) => msg,
        Outbound::TurnChanged(change) => ServerMessage::TurnChanged {
            active_member_id: change.member,
            turn_number: change.turn_number,
            phase: codec.encode(&change.phase)?,
        },
        Outbound::Delta(delta) => ServerMessage::StateDelta {
            version: delta.version,
            delta: codec.encode(&delta.delta)?,
        },
        Outbound::FullState(snapshot) => ServerMessage::FullState {
            version: snapshot.version,
            state: codec.encode(&snapshot.state)?,
        },
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Why a client request was refused.
#[derive(Debug)]
enum Refusal {
    /// The session said no.
    Session(SessionError),
    /// A session-scoped request before create/join/reconnect.
    Unbound,
    /// The request could not be understood.
    Malformed(String),
}

impl From<SessionError> for Refusal {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

/// Per-connection dispatch state.
struct Gateway<G: RuleEngine, C: Codec> {
    conn_id: ConnectionId,
    identity: Identity,
    state: Arc<ServerState<G, C>>,
    outbox: MemberSender<G>,
    guard: BindingGuard<G>,
}

impl<G: RuleEngine, C: Codec> Gateway<G, C> {
    async fn dispatch(&mut self, msg: ClientMessage) -> Flow {
        let conn_id = self.conn_id;
        let result = match msg {
            ClientMessage::Handshake { .. } => {
                Err(Refusal::Malformed("handshake already completed".into()))
            }
            ClientMessage::Heartbeat { client_time } => {
                self.send(ServerMessage::HeartbeatAck {
                    client_time,
                    server_time: self.state.clock(),
                });
                Ok(())
            }
            ClientMessage::Disconnect { reason } => {
                tracing::info!(%conn_id, %reason, "client disconnected");
                return Flow::Close;
            }
            ClientMessage::CreateSession { display_name } => {
                self.create_session(&display_name).await
            }
            ClientMessage::JoinSession { code, display_name } => {
                self.join_session(code, &display_name).await
            }
            ClientMessage::Reconnect { code } => self.reconnect(code).await,
            ClientMessage::SetReady { ready } => self.set_ready(ready).await,
            ClientMessage::StartGame => self.start().await,
            ClientMessage::AbortGame => self.abort().await,
            ClientMessage::SubmitAction { action } => self.submit(&action).await,
            ClientMessage::RequestFullState => self.resync().await,
            ClientMessage::LeaveSession => self.leave().await,
        };

        if let Err(refusal) = result {
            let (reason, message) = match refusal {
                Refusal::Session(e) => {
                    if self.is_bound_to(&e) {
                        // The bound session is gone, or another connection
                        // took the seat over; nothing to disconnect from.
                        self.guard.binding = None;
                    }
                    (e.reason(), e.to_string())
                }
                Refusal::Unbound => (
                    RejectReason::Unauthenticated,
                    "create, join or reconnect to a session first".to_string(),
                ),
                Refusal::Malformed(message) => (RejectReason::Malformed, message),
            };
            tracing::debug!(%conn_id, ?reason, %message, "request rejected");
            self.reject(reason, message);
        }
        Flow::Continue
    }

    async fn create_session(&mut self, display_name: &str) -> Result<(), Refusal> {
        self.ensure_unbound().await?;
        let (handle, member) = self
            .state
            .store
            .lock()
            .await
            .create_session(
                self.identity.clone(),
                display_name,
                self.conn_id,
                self.outbox.clone(),
                Instant::now(),
            )
            .await?;
        self.bind(handle, member);
        Ok(())
    }

    async fn join_session(
        &mut self,
        code: SessionCode,
        display_name: &str,
    ) -> Result<(), Refusal> {
        self.ensure_unbound().await?;
        let handle = self.lookup(&code).await?;
        let member = handle
            .join(
                self.identity.clone(),
                display_name,
                self.conn_id,
                self.outbox.clone(),
            )
            .await?;
        self.bind(handle, member);
        Ok(())
    }

    async fn reconnect(&mut self, code: SessionCode) -> Result<(), Refusal> {
        if self
            .guard
            .binding
            .as_ref()
            .is_some_and(|binding| binding.code != code)
        {
            self.ensure_unbound().await?;
        }
        let handle = self.lookup(&code).await?;
        let member = handle
            .reconnect(self.identity.clone(), self.conn_id, self.outbox.clone())
            .await?;
        self.bind(handle, member);
        Ok(())
    }

    async fn set_ready(&mut self, ready: bool) -> Result<(), Refusal> {
        let (handle, member) = self.checkout().await?;
        Ok(handle.set_ready(member, self.conn_id, ready).await?)
    }

    async fn start(&mut self) -> Result<(), Refusal> {
        let (handle, member) = self.checkout().await?;
        Ok(handle.start(member, self.conn_id).await?)
    }

    async fn abort(&mut self) -> Result<(), Refusal> {
        let (handle, member) = self.checkout().await?;
        Ok(handle.abort(member, self.conn_id).await?)
    }

    async fn submit(&mut self, raw: &[u8]) -> Result<(), Refusal> {
        let (handle, member) = self.checkout().await?;
        let action: G::Action = self
            .state
            .codec
            .decode(raw)
            .map_err(|e| Refusal::Malformed(format!("invalid action: {e}")))?;
        Ok(handle.submit(member, self.conn_id, action).await?)
    }

    async fn resync(&mut self) -> Result<(), Refusal> {
        let binding = self.guard.binding.as_ref().ok_or(Refusal::Unbound)?;
        Ok(binding.handle.resync(binding.member, self.conn_id).await?)
    }

    async fn leave(&mut self) -> Result<(), Refusal> {
        let (handle, member) = self.checkout().await?;
        handle.leave(member, self.conn_id).await?;
        // Left on purpose: no disconnect to report later.
        self.guard.binding = None;
        Ok(())
    }

    /// Finds a session through the store, which refreshes its activity
    /// time. The store lock is released before the caller talks to the
    /// session.
    async fn lookup(&self, code: &SessionCode) -> Result<SessionHandle<G>, SessionError> {
        let mut store = self.state.store.lock().await;
        store.checkout(code, Instant::now()).await
    }

    /// The bound session's handle and this connection's member in it.
    async fn checkout(&self) -> Result<(SessionHandle<G>, MemberId), Refusal> {
        let binding = self.guard.binding.as_ref().ok_or(Refusal::Unbound)?;
        let handle = self.lookup(&binding.code).await?;
        Ok((handle, binding.member))
    }

    /// A connection speaks for one session at a time. A binding to a
    /// session that has ended (or whose actor is gone) is released.
    async fn ensure_unbound(&mut self) -> Result<(), Refusal> {
        let Some(binding) = &self.guard.binding else {
            return Ok(());
        };
        let member = binding.member;
        let over = match binding.handle.summary().await {
            Ok(summary) => summary.phase == SessionPhase::Ended,
            Err(_) => true,
        };
        if !over {
            return Err(SessionError::AlreadyJoined(member).into());
        }
        if let Some(stale) = self.guard.binding.take() {
            let _ = stale.handle.disconnect(member, self.conn_id).await;
        }
        Ok(())
    }

    /// True if `err` means this connection's binding is no longer valid.
    fn is_bound_to(&self, err: &SessionError) -> bool {
        let Some(binding) = &self.guard.binding else {
            return false;
        };
        match err {
            SessionError::Expired(code) | SessionError::NotFound(code) => &binding.code == code,
            SessionError::Superseded(member) => binding.member == *member,
            _ => false,
        }
    }

    fn bind(&mut self, handle: SessionHandle<G>, member: MemberId) {
        tracing::debug!(conn_id = %self.conn_id, code = %handle.code(), %member, "connection bound");
        self.guard.binding = Some(Binding {
            code: handle.code().clone(),
            member,
            handle,
        });
    }

    fn reject(&self, reason: RejectReason, message: impl Into<String>) {
        self.send(ServerMessage::ActionRejected {
            reason,
            message: message.into(),
        });
    }

    fn send(&self, msg: ServerMessage) {
        let _ = self.outbox.send(Outbound::Message(msg));
    }
}
