use conquest::prelude::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

/// Map size and starting garrison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkirmishConfig {
    /// Territories on the ring. Raised to the seat count (and at least 3)
    /// when the game starts.
    pub territories: usize,
    pub starting_armies: u32,
}

impl Default for SkirmishConfig {
    fn default() -> Self {
        Self {
            territories: 12,
            starting_armies: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Territory {
    pub owner: usize,
    pub armies: u32,
}

/// Territories sit on a ring: each one borders the one before and after.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub territories: Vec<Territory>,
}

impl Board {
    pub fn owned_by(&self, seat: usize) -> usize {
        self.territories.iter().filter(|t| t.owner == seat).count()
    }

    fn adjacent(&self, a: usize, b: usize) -> bool {
        let n = self.territories.len();
        (a + 1) % n == b || (b + 1) % n == a
    }

    fn territory(&self, index: usize) -> Result<&Territory, String> {
        self.territories
            .get(index)
            .ok_or_else(|| format!("no territory {index}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Place `available` more armies before attacking.
    Reinforce { available: u32 },
    Attack,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Reinforce { territory: usize, armies: u32 },
    /// Every army but one in `from` attacks `to`.
    Attack { from: usize, to: usize },
    EndTurn,
}

/// New contents of one territory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryUpdate {
    pub index: usize,
    pub owner: usize,
    pub armies: u32,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

pub struct Skirmish;

/// Armies granted at the start of a turn.
pub fn reinforcements(owned: usize) -> u32 {
    3 + u32::try_from(owned / 3).unwrap_or(u32::MAX - 3)
}

impl RuleEngine for Skirmish {
    type Config = SkirmishConfig;
    type State = Board;
    type Action = Order;
    type Delta = Vec<TerritoryUpdate>;
    type Phase = Phase;

    fn init(config: &SkirmishConfig, seats: usize) -> Board {
        let count = config.territories.max(seats).max(3);
        let seats = seats.max(1);
        Board {
            territories: (0..count)
                .map(|i| Territory {
                    owner: i % seats,
                    armies: config.starting_armies.max(1),
                })
                .collect(),
        }
    }

    /// A seat with no territory left can only pass.
    fn opening_phase(board: &Board, seat: usize) -> Phase {
        match board.owned_by(seat) {
            0 => Phase::Attack,
            owned => Phase::Reinforce {
                available: reinforcements(owned),
            },
        }
    }

    fn check_action(
        board: &Board,
        phase: &Phase,
        seat: usize,
        order: &Order,
    ) -> Result<(), String> {
        match (phase, order) {
            (Phase::Reinforce { available }, Order::Reinforce { territory, armies }) => {
                if board.territory(*territory)?.owner != seat {
                    return Err(format!("territory {territory} is not yours"));
                }
                if *armies == 0 || armies > available {
                    return Err(format!("place between 1 and {available} armies"));
                }
                Ok(())
            }
            (Phase::Reinforce { .. }, _) => Err("place your reinforcements first".into()),
            (Phase::Attack, Order::Attack { from, to }) => {
                let source = board.territory(*from)?;
                let target = board.territory(*to)?;
                if source.owner != seat {
                    return Err(format!("territory {from} is not yours"));
                }
                if target.owner == seat {
                    return Err(format!("territory {to} is already yours"));
                }
                if !board.adjacent(*from, *to) {
                    return Err(format!("territory {to} does not border {from}"));
                }
                if source.armies < 2 {
                    return Err("need at least two armies to attack".into());
                }
                Ok(())
            }
            (Phase::Attack, Order::EndTurn) => Ok(()),
            (Phase::Attack, Order::Reinforce { .. }) => {
                Err("reinforcements are over for this turn".into())
            }
        }
    }

    fn apply_action(
        board: &mut Board,
        phase: &Phase,
        seat: usize,
        order: Order,
    ) -> Result<Applied<Vec<TerritoryUpdate>, Phase>, String> {
        Self::check_action(board, phase, seat, &order)?;

        match order {
            Order::Reinforce { territory, armies } => {
                let t = &mut board.territories[territory];
                t.armies += armies;
                let update = TerritoryUpdate {
                    index: territory,
                    owner: t.owner,
                    armies: t.armies,
                };
                let next = match phase {
                    Phase::Reinforce { available } if *available > armies => {
                        Phase::Reinforce {
                            available: available - armies,
                        }
                    }
                    _ => Phase::Attack,
                };
                Ok(Applied {
                    delta: vec![update],
                    next: TurnProgress::Continue(next),
                })
            }
            Order::Attack { from, to } => {
                let delta = resolve_attack(board, seat, from, to);
                let next = if board.owned_by(seat) == board.territories.len() {
                    TurnProgress::GameOver
                } else {
                    TurnProgress::Continue(Phase::Attack)
                };
                Ok(Applied { delta, next })
            }
            Order::EndTurn => Ok(Applied {
                delta: Vec::new(),
                next: TurnProgress::EndTurn,
            }),
        }
    }
}

/// Deterministic battle: attackers win outright if they outnumber the
/// defenders and move in with the survivors. Otherwise the attackers are
/// lost and each one takes a defender with it, leaving at least one.
fn resolve_attack(board: &mut Board, seat: usize, from: usize, to: usize) -> Vec<TerritoryUpdate> {
    let attackers = board.territories[from].armies - 1;
    let defenders = board.territories[to].armies;
    board.territories[from].armies = 1;

    let target = &mut board.territories[to];
    if attackers > defenders {
        target.owner = seat;
        target.armies = attackers - defenders;
    } else {
        target.armies = defenders - attackers.min(defenders - 1);
    }

    [from, to]
        .into_iter()
        .map(|index| {
            let t = board.territories[index];
            TerritoryUpdate {
                index,
                owner: t.owner,
                armies: t.armies,
            }
        })
        .collect()
}
