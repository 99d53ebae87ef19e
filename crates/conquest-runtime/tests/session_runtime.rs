//! Integration tests for session actors and the store using a mock game.

use std::time::{Duration, Instant};

use conquest_protocol::{Identity, MemberId, ServerMessage, SessionPhase};
use conquest_runtime::{MemberSender, Outbound, SessionHandle, SessionStore};
use conquest_session::{SessionConfig, SessionError};
use conquest_transport::ConnectionId;
use conquest_turn::{Applied, RuleEngine, TurnProgress};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// =========================================================================
// Mock game: every turn adds to a shared tally.
// =========================================================================

struct Tally;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct TallyState {
    total: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum TallyAction {
    /// Adds and ends the turn. Zero is illegal.
    Add(u32),
    Finish,
}

impl RuleEngine for Tally {
    type Config = ();
    type State = TallyState;
    type Action = TallyAction;
    type Delta = u32;
    type Phase = ();

    fn init(_: &(), _seats: usize) -> TallyState {
        TallyState { total: 0 }
    }

    fn opening_phase(_: &TallyState, _: usize) {}

    fn apply_action(
        state: &mut TallyState,
        _: &(),
        _: usize,
        action: TallyAction,
    ) -> Result<Applied<u32, ()>, String> {
        match action {
            TallyAction::Add(0) => Err("zero is not a move".into()),
            TallyAction::Add(n) => {
                state.total += n;
                Ok(Applied {
                    delta: n,
                    next: TurnProgress::EndTurn,
                })
            }
            TallyAction::Finish => Ok(Applied {
                delta: 0,
                next: TurnProgress::GameOver,
            }),
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

type Inbox = mpsc::UnboundedReceiver<Outbound<Tally>>;

struct Client {
    identity: Identity,
    connection: ConnectionId,
    member: MemberId,
    inbox: Inbox,
}

fn outbox() -> (MemberSender<Tally>, Inbox) {
    mpsc::unbounded_channel()
}

fn ident(name: &str) -> Identity {
    Identity::parse(name).unwrap()
}

fn store() -> SessionStore<Tally> {
    SessionStore::new(SessionConfig::default(), ())
}

/// Everything already queued for this client.
fn drain(inbox: &mut Inbox) -> Vec<Outbound<Tally>> {
    let mut out = Vec::new();
    while let Ok(msg) = inbox.try_recv() {
        out.push(msg);
    }
    out
}

async fn host(
    store: &mut SessionStore<Tally>,
    name: &str,
    now: Instant,
) -> (SessionHandle<Tally>, Client) {
    let (tx, inbox) = outbox();
    let connection = ConnectionId::new(1);
    let (handle, member) = store
        .create_session(ident(name), name, connection, tx, now)
        .await
        .unwrap();
    let client = Client {
        identity: ident(name),
        connection,
        member,
        inbox,
    };
    (handle, client)
}

async fn join(handle: &SessionHandle<Tally>, name: &str, conn: u64) -> Client {
    let (tx, inbox) = outbox();
    let connection = ConnectionId::new(conn);
    let member = handle
        .join(ident(name), name, connection, tx)
        .await
        .unwrap();
    Client {
        identity: ident(name),
        connection,
        member,
        inbox,
    }
}

/// A running game with `n` players; inboxes drained.
async fn running(n: usize) -> (SessionStore<Tally>, SessionHandle<Tally>, Vec<Client>) {
    let mut store = store();
    let (handle, first) = host(&mut store, "p0", Instant::now()).await;
    let mut clients = vec![first];
    for i in 1..n {
        clients.push(join(&handle, &format!("p{i}"), i as u64 + 1).await);
    }
    for c in &clients {
        handle.set_ready(c.member, c.connection, true).await.unwrap();
    }
    handle.start(clients[0].member, clients[0].connection).await.unwrap();
    for c in &mut clients {
        drain(&mut c.inbox);
    }
    (store, handle, clients)
}

fn deltas(msgs: &[Outbound<Tally>]) -> Vec<(u64, u32)> {
    msgs.iter()
        .filter_map(|m| match m {
            Outbound::Delta(d) => Some((d.version, d.delta)),
            _ => None,
        })
        .collect()
}

fn turn_holders(msgs: &[Outbound<Tally>]) -> Vec<MemberId> {
    msgs.iter()
        .filter_map(|m| match m {
            Outbound::TurnChanged(c) => Some(c.member),
            _ => None,
        })
        .collect()
}

fn has_message(msgs: &[Outbound<Tally>], pred: impl Fn(&ServerMessage) -> bool) -> bool {
    msgs.iter().any(|m| matches!(m, Outbound::Message(msg) if pred(msg)))
}

// =========================================================================
// Create / join / start
// =========================================================================

#[tokio::test]
async fn test_create_session_host_gets_code_and_update() {
    let mut store = store();
    let (handle, mut alice) = host(&mut store, "alice", Instant::now()).await;

    assert_eq!(handle.code().as_str().len(), 6);
    assert_eq!(store.len(), 1);

    let msgs = drain(&mut alice.inbox);
    assert!(has_message(&msgs, |m| matches!(
        m,
        ServerMessage::SessionJoined { member_id, .. } if *member_id == alice.member
    )));
    assert!(has_message(&msgs, |m| matches!(
        m,
        ServerMessage::SessionUpdate { session } if session.members.len() == 1
    )));
}

#[tokio::test]
async fn test_create_session_invalid_name_registers_nothing() {
    let mut store = store();
    let (tx, _inbox) = outbox();
    let result = store
        .create_session(ident("x"), "   ", ConnectionId::new(1), tx, Instant::now())
        .await;
    assert!(matches!(result, Err(SessionError::InvalidDisplayName { .. })));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_start_sends_initial_state_and_turn_to_everyone() {
    let mut store = store();
    let (handle, mut alice) = host(&mut store, "alice", Instant::now()).await;
    let mut bob = join(&handle, "bob", 2).await;

    handle.set_ready(alice.member, alice.connection, true).await.unwrap();
    handle.set_ready(bob.member, bob.connection, true).await.unwrap();
    drain(&mut alice.inbox);
    drain(&mut bob.inbox);

    let first = alice.member;
    handle.start(first, alice.connection).await.unwrap();

    for client in [&mut alice, &mut bob] {
        let msgs = drain(&mut client.inbox);
        assert!(msgs.iter().any(|m| matches!(m, Outbound::FullState(s) if s.version == 0)));
        assert_eq!(turn_holders(&msgs), vec![first]);
    }
    let summary = handle.summary().await.unwrap();
    assert_eq!(summary.phase, SessionPhase::InProgress);
    assert_eq!(summary.active_member, Some(first));
}

#[tokio::test]
async fn test_start_by_guest_rejected() {
    let mut store = store();
    let (handle, alice) = host(&mut store, "alice", Instant::now()).await;
    let bob = join(&handle, "bob", 2).await;
    handle.set_ready(alice.member, alice.connection, true).await.unwrap();
    handle.set_ready(bob.member, bob.connection, true).await.unwrap();

    assert_eq!(
        handle.start(bob.member, bob.connection).await,
        Err(SessionError::NotHost(bob.member))
    );
}

// =========================================================================
// Actions
// =========================================================================

#[tokio::test]
async fn test_submit_non_active_rejected_and_nothing_broadcast() {
    let (_store, handle, mut clients) = running(2).await;
    let err = handle
        .submit(clients[1].member, clients[1].connection, TallyAction::Add(3))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SessionError::NotYourTurn {
            active: clients[0].member
        }
    );
    for c in &mut clients {
        assert!(drain(&mut c.inbox).is_empty());
    }
}

#[tokio::test]
async fn test_submit_deltas_arrive_in_apply_order_for_everyone() {
    let (_store, handle, mut clients) = running(3).await;
    for (i, n) in [4, 1, 7, 2].into_iter().enumerate() {
        let active = &clients[i % 3];
        handle
            .submit(active.member, active.connection, TallyAction::Add(n))
            .await
            .unwrap();
    }

    let expected = vec![(1, 4), (2, 1), (3, 7), (4, 2)];
    for c in &mut clients {
        assert_eq!(deltas(&drain(&mut c.inbox)), expected);
    }
}

#[tokio::test]
async fn test_submit_rule_error_goes_only_to_sender() {
    let (_store, handle, mut clients) = running(2).await;
    let err = handle
        .submit(clients[0].member, clients[0].connection, TallyAction::Add(0))
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::IllegalAction("zero is not a move".into()));
    for c in &mut clients {
        assert!(drain(&mut c.inbox).is_empty());
    }
}

#[tokio::test]
async fn test_submit_game_over_broadcasts_session_ended() {
    let (_store, handle, mut clients) = running(2).await;
    handle
        .submit(clients[0].member, clients[0].connection, TallyAction::Finish)
        .await
        .unwrap();
    for c in &mut clients {
        let msgs = drain(&mut c.inbox);
        assert!(has_message(&msgs, |m| matches!(
            m,
            ServerMessage::SessionEnded { reason } if reason == "game over"
        )));
    }
    assert_eq!(handle.summary().await.unwrap().phase, SessionPhase::Ended);
}

// =========================================================================
// Disconnect / reconnect
// =========================================================================

#[tokio::test]
async fn test_disconnect_active_advances_and_rejoin_gets_full_state() {
    let (_store, handle, mut clients) = running(3).await;
    let (p0, p1) = (clients[0].member, clients[1].member);

    handle.disconnect(p0, clients[0].connection).await.unwrap();
    let summary = handle.summary().await.unwrap();
    assert_eq!(summary.active_member, Some(p1));

    let msgs = drain(&mut clients[2].inbox);
    assert!(has_message(&msgs, |m| matches!(
        m,
        ServerMessage::MemberDisconnected { member_id } if *member_id == p0
    )));
    assert_eq!(turn_holders(&msgs), vec![p1]);

    // Back through a new socket with the same identity.
    let (tx, mut inbox) = outbox();
    let member = handle
        .join(clients[0].identity.clone(), "p0", ConnectionId::new(40), tx)
        .await
        .unwrap();
    assert_eq!(member, p0);

    let msgs = drain(&mut inbox);
    assert!(msgs.iter().any(|m| matches!(m, Outbound::FullState(_))));
    assert_eq!(turn_holders(&msgs), vec![p1]);
    assert!(has_message(&drain(&mut clients[1].inbox), |m| matches!(
        m,
        ServerMessage::MemberReconnected { member_id } if *member_id == p0
    )));

    let summary = handle.summary().await.unwrap();
    assert_eq!(summary.active_member, Some(p1));
    assert!(summary.members[0].connected);
}

#[tokio::test]
async fn test_disconnect_stale_connection_ignored_after_takeover() {
    let (_store, handle, clients) = running(2).await;
    let p1 = &clients[1];

    let (tx, _inbox) = outbox();
    handle
        .reconnect(p1.identity.clone(), ConnectionId::new(99), tx)
        .await
        .unwrap();
    // The old socket's close arrives late.
    handle.disconnect(p1.member, p1.connection).await.unwrap();

    let summary = handle.summary().await.unwrap();
    assert!(summary.members[1].connected);
}

#[tokio::test]
async fn test_requests_from_replaced_connection_refused_after_takeover() {
    let (_store, handle, mut clients) = running(2).await;
    let (p0, p1) = (clients[0].member, clients[1].member);
    let old = clients[1].connection;

    let (tx, mut inbox) = outbox();
    handle
        .reconnect(clients[1].identity.clone(), ConnectionId::new(99), tx)
        .await
        .unwrap();
    drain(&mut inbox);

    // The old socket is still open and tries to act for the member.
    assert_eq!(
        handle.leave(p1, old).await,
        Err(SessionError::Superseded(p1))
    );
    assert_eq!(
        handle.resync(p1, old).await,
        Err(SessionError::Superseded(p1))
    );
    let summary = handle.summary().await.unwrap();
    assert!(summary.members[1].connected);
    assert!(drain(&mut inbox).is_empty());

    handle
        .submit(p0, clients[0].connection, TallyAction::Add(3))
        .await
        .unwrap();
    assert_eq!(
        handle.submit(p1, old, TallyAction::Add(2)).await,
        Err(SessionError::Superseded(p1))
    );
    drain(&mut clients[0].inbox);

    // The live socket still hears the game and can play.
    assert_eq!(deltas(&drain(&mut inbox)), vec![(1, 3)]);
    handle
        .submit(p1, ConnectionId::new(99), TallyAction::Add(2))
        .await
        .unwrap();
    assert_eq!(deltas(&drain(&mut inbox)), vec![(2, 2)]);
}

#[tokio::test]
async fn test_requests_after_disconnect_refused() {
    let (_store, handle, clients) = running(2).await;
    let p1 = &clients[1];
    handle.disconnect(p1.member, p1.connection).await.unwrap();

    assert_eq!(
        handle.resync(p1.member, p1.connection).await,
        Err(SessionError::Superseded(p1.member))
    );
}

#[tokio::test]
async fn test_everyone_disconnects_then_first_returner_resumes() {
    let (_store, handle, clients) = running(2).await;
    for c in &clients {
        handle.disconnect(c.member, c.connection).await.unwrap();
    }
    let summary = handle.summary().await.unwrap();
    assert!(summary.suspended);
    assert_eq!(summary.active_member, None);

    let (tx, mut inbox) = outbox();
    let member = handle
        .reconnect(clients[1].identity.clone(), ConnectionId::new(50), tx)
        .await
        .unwrap();
    assert_eq!(member, clients[1].member);

    let msgs = drain(&mut inbox);
    assert_eq!(turn_holders(&msgs), vec![clients[1].member]);
    let summary = handle.summary().await.unwrap();
    assert!(!summary.suspended);
    handle
        .submit(member, ConnectionId::new(50), TallyAction::Add(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_resync_sends_full_state_to_requester_only() {
    let (_store, handle, mut clients) = running(2).await;
    handle
        .submit(clients[0].member, clients[0].connection, TallyAction::Add(5))
        .await
        .unwrap();
    drain(&mut clients[0].inbox);
    drain(&mut clients[1].inbox);

    handle.resync(clients[1].member, clients[1].connection).await.unwrap();
    let msgs = drain(&mut clients[1].inbox);
    assert!(msgs.iter().any(|m| matches!(
        m,
        Outbound::FullState(s) if s.version == 1 && s.state.total == 5
    )));
    assert!(drain(&mut clients[0].inbox).is_empty());
}

// =========================================================================
// Lobby departures / abort
// =========================================================================

#[tokio::test]
async fn test_leave_last_lobby_member_stops_actor_and_store_reaps() {
    let mut store = store();
    let now = Instant::now();
    let (handle, mut alice) = host(&mut store, "alice", now).await;

    handle.leave(alice.member, alice.connection).await.unwrap();
    assert!(has_message(&drain(&mut alice.inbox), |m| matches!(
        m,
        ServerMessage::SessionLeft
    )));

    // The actor drops its receiver once the loop ends.
    for _ in 0..50 {
        if handle.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(handle.is_closed());

    let removed = store.remove_expired(now).await;
    assert_eq!(removed, vec![handle.code().clone()]);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_lobby_disconnect_of_host_promotes_guest() {
    let mut store = store();
    let (handle, alice) = host(&mut store, "alice", Instant::now()).await;
    let bob = join(&handle, "bob", 2).await;

    handle.disconnect(alice.member, alice.connection).await.unwrap();
    let summary = handle.summary().await.unwrap();
    assert_eq!(summary.host, Some(bob.member));
    assert_eq!(summary.members.len(), 1);
}

#[tokio::test]
async fn test_abort_by_host_ends_for_everyone() {
    let (_store, handle, mut clients) = running(2).await;
    assert_eq!(
        handle.abort(clients[1].member, clients[1].connection).await,
        Err(SessionError::NotHost(clients[1].member))
    );
    handle.abort(clients[0].member, clients[0].connection).await.unwrap();
    for c in &mut clients {
        assert!(has_message(&drain(&mut c.inbox), |m| matches!(
            m,
            ServerMessage::SessionEnded { .. }
        )));
    }
}

// =========================================================================
// Store lookups and expiry
// =========================================================================

#[tokio::test]
async fn test_checkout_unknown_code_not_found() {
    let mut store = store();
    let code = conquest_protocol::SessionCode::parse("ZZZZ22").unwrap();
    assert_eq!(
        store.checkout(&code, Instant::now()).await.err(),
        Some(SessionError::NotFound(code))
    );
}

#[tokio::test]
async fn test_checkout_refreshes_activity_but_get_does_not() {
    let expiry = SessionConfig::default().expiry;
    let mut store = store();
    let t0 = Instant::now();
    let (handle, _alice) = host(&mut store, "alice", t0).await;
    let code = handle.code().clone();

    // Looking at the session does not keep it alive.
    store.get(&code, t0 + expiry / 2).unwrap();
    assert!(store.get(&code, t0 + expiry + Duration::from_secs(1)).is_err());

    // Using it does.
    store.checkout(&code, t0 + expiry / 2).await.unwrap();
    store
        .checkout(&code, t0 + expiry + Duration::from_secs(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_checkout_expired_session_reports_expired_and_removes() {
    let expiry = SessionConfig::default().expiry;
    let mut store = store();
    let t0 = Instant::now();
    let (handle, mut alice) = host(&mut store, "alice", t0).await;
    let code = handle.code().clone();
    drain(&mut alice.inbox);

    let later = t0 + expiry + Duration::from_secs(1);
    assert_eq!(
        store.checkout(&code, later).await.err(),
        Some(SessionError::Expired(code.clone()))
    );
    assert!(store.is_empty());

    let msg = alice.inbox.recv().await.unwrap();
    assert!(matches!(
        msg,
        Outbound::Message(ServerMessage::SessionEnded { ref reason }) if reason == "expired"
    ));
}

#[tokio::test]
async fn test_remove_expired_removes_idle_sessions_in_any_phase() {
    let expiry = SessionConfig::default().expiry;
    let t0 = Instant::now();
    let (mut store, running_handle, _clients) = running(2).await;
    let (_lobby, _host) = host(&mut store, "lobbyhost", t0).await;
    assert_eq!(store.len(), 2);

    assert!(store.remove_expired(t0).await.is_empty());

    let removed = store
        .remove_expired(Instant::now() + expiry + Duration::from_secs(1))
        .await;
    assert_eq!(removed.len(), 2);
    assert!(store.is_empty());
    assert!(removed.contains(running_handle.code()));
}
