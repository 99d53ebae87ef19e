use conquest_protocol::ServerMessage;
use conquest_turn::{RuleEngine, Snapshot, StateDelta, TurnChange};
use tokio::sync::mpsc;

/// A message from a session actor to one member's connection.
///
/// Game payloads stay typed here; the gateway encodes them with its codec
/// on the way out.
pub enum Outbound<G: RuleEngine> {
    /// A protocol message that needs no encoding of game data.
    Message(ServerMessage),
    TurnChanged(TurnChange<G::Phase>),
    Delta(StateDelta<G>),
    FullState(Snapshot<G>),
}

impl<G: RuleEngine> Clone for Outbound<G> {
    fn clone(&self) -> Self {
        match self {
            Self::Message(m) => Self::Message(m.clone()),
            Self::TurnChanged(c) => Self::TurnChanged(c.clone()),
            Self::Delta(d) => Self::Delta(d.clone()),
            Self::FullState(s) => Self::FullState(s.clone()),
        }
    }
}

impl<G: RuleEngine> std::fmt::Debug for Outbound<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(m) => f.debug_tuple("Message").field(m).finish(),
            Self::TurnChanged(c) => f.debug_tuple("TurnChanged").field(c).finish(),
            Self::Delta(d) => f.debug_tuple("Delta").field(d).finish(),
            Self::FullState(s) => f.debug_tuple("FullState").field(s).finish(),
        }
    }
}

/// Channel for delivering outbound messages to a member's connection.
pub type MemberSender<G> = mpsc::UnboundedSender<Outbound<G>>;
