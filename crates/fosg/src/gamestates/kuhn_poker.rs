use std::fmt::Display;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{Game, Move, Player, PlayerInformed, Stochasticity};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Card {
    Jack,
    Queen,
    King,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum KPAction {
    Check,
    Bet,
}

/// A chance outcome: `card` goes into `player`'s hand.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Deal {
    pub player: Player,
    pub card: Card,
}

/// Adapted from: https://github.com/deepmind/open_spiel/blob/master/open_spiel/games/kuhn_poker.cc
///
/// The deal is two sequential chance steps without replacement: the first draw
/// has probability 1/3 per card, the second 1/2 per remaining card. Both the
/// chance support and [`Game::chance_probability`] follow that two-step view.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct KPState {
    cards: [Option<Card>; 2],
    history: Vec<KPAction>,
}

impl KPState {
    pub fn card(&self, player: Player) -> Option<Card> {
        player.seat().and_then(|s| self.cards[s])
    }

    pub fn history(&self) -> &[KPAction] {
        &self.history
    }

    fn all_dealt(&self) -> bool {
        self.cards.iter().all(|c| c.is_some())
    }
}

impl Display for KPState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for card in self.cards.iter().flatten() {
            write!(f, "{:?}", card)?;
        }
        write!(f, "]")?;
        for action in &self.history {
            let c = match action {
                KPAction::Check => 'c',
                KPAction::Bet => 'b',
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// The rules of two-player Kuhn poker.
#[derive(Clone, Copy, Default, Debug)]
pub struct KuhnPoker;

impl KuhnPoker {
    const ALL_CARDS: [Card; 3] = [Card::Jack, Card::Queen, Card::King];

    /// Replays `moves` from the initial state. Test convenience.
    pub fn from_moves(moves: &[Move<KPAction, Deal>]) -> KPState {
        let game = KuhnPoker;
        let mut state = game.initial_world();
        for mv in moves {
            game.transition(&mut state, mv);
        }
        state
    }

    fn mover_of(&self, ply: usize) -> Player {
        if ply % 2 == 0 {
            Player::Alex
        } else {
            Player::Bob
        }
    }
}

impl Game for KuhnPoker {
    type World = KPState;
    type Action = KPAction;
    type ChanceOutcome = Deal;
    type Observation = String;

    const MAX_PLAYERS: usize = 2;
    const STOCHASTICITY: Stochasticity = Stochasticity::Chance;
    const SERIALIZED: bool = true;

    fn initial_world(&self) -> KPState {
        KPState::default()
    }

    fn players(&self, _world: &KPState) -> Vec<Player> {
        vec![Player::Chance, Player::Alex, Player::Bob]
    }

    fn active_player(&self, world: &KPState) -> Player {
        if !world.all_dealt() {
            Player::Chance
        } else {
            self.mover_of(world.history.len())
        }
    }

    fn actions(&self, _player: Player, world: &KPState) -> Vec<KPAction> {
        if !world.all_dealt() || self.is_terminal(world) {
            return Vec::new();
        }
        vec![KPAction::Check, KPAction::Bet]
    }

    fn chance_actions(&self, world: &KPState) -> Vec<Deal> {
        match world.cards {
            [None, _] => Self::ALL_CARDS
                .iter()
                .map(|&card| Deal {
                    player: Player::Alex,
                    card,
                })
                .collect_vec(),
            [Some(first), None] => Self::ALL_CARDS
                .iter()
                .filter(|&&card| card != first)
                .map(|&card| Deal {
                    player: Player::Bob,
                    card,
                })
                .collect_vec(),
            _ => Vec::new(),
        }
    }

    fn chance_probability(&self, world: &KPState, outcome: &Deal) -> f64 {
        match world.cards {
            [None, _] => 1.0 / 3.0,
            [Some(first), None] => {
                if outcome.card == first {
                    0.0
                } else {
                    0.5
                }
            }
            _ => 0.0,
        }
    }

    fn is_terminal(&self, world: &KPState) -> bool {
        use KPAction::{Bet, Check};
        matches!(
            world.history[..],
            [Check, Check] | [Bet, Bet] | [Bet, Check] | [Check, Bet, _]
        )
    }

    fn reward(&self, player: Player, world: &KPState) -> f64 {
        if player == Player::Chance {
            panic!("no payoff exists for the chance player");
        }
        if !self.is_terminal(world) {
            panic!("reward requested for non-terminal state {}", world);
        }

        let higher_first = world.cards[0] > world.cards[1];
        let n_bets = world
            .history
            .iter()
            .filter(|&&a| a == KPAction::Bet)
            .count();
        let stake = n_bets.max(1) as f64;
        let for_alex = if higher_first { stake } else { -stake };
        match player {
            Player::Alex => for_alex,
            Player::Bob => -for_alex,
            _ => 0.0,
        }
    }

    fn transition(&self, world: &mut KPState, mv: &Move<KPAction, Deal>) {
        match mv {
            Move::Chance(deal) => {
                let seat = deal
                    .player
                    .seat()
                    .expect("a card can only be dealt to a seated player");
                assert!(seat < 2 && world.cards[seat].is_none(), "seat already holds a card");
                assert!(
                    seat == 0 || world.cards[0] != Some(deal.card),
                    "card already dealt"
                );
                world.cards[seat] = Some(deal.card);
            }
            Move::Action(action) => {
                assert!(world.all_dealt(), "betting before the deal finished");
                assert!(!self.is_terminal(world), "betting on a finished game");
                world.history.push(*action);
            }
        }
    }

    fn private_observation(
        &self,
        observer: Player,
        _world: &KPState,
        mv: &Move<KPAction, Deal>,
        _next: &KPState,
    ) -> String {
        match mv {
            Move::Chance(deal) if deal.player == observer => format!("{:?}", deal.card),
            _ => "-".to_string(),
        }
    }

    fn public_observation(
        &self,
        _world: &KPState,
        mv: &Move<KPAction, Deal>,
        _next: &KPState,
    ) -> String {
        match mv {
            Move::Chance(deal) => format!("{}:?", deal.player.seat().unwrap_or(usize::MAX)),
            Move::Action(action) => format!("{:?}", action),
        }
    }

    fn private_history(
        &self,
        player: Player,
        world: &KPState,
    ) -> Vec<PlayerInformed<Option<Move<KPAction, Deal>>>> {
        let mut out = Vec::with_capacity(world.history.len() + 2);
        for (seat, card) in world.cards.iter().enumerate() {
            let Some(card) = *card else { break };
            let owner = Player::from_seat(seat).unwrap();
            let entry = (owner == player).then_some(Move::Chance(Deal {
                player: owner,
                card,
            }));
            out.push(PlayerInformed::new(Player::Chance, entry));
        }
        for (ply, action) in world.history.iter().enumerate() {
            out.push(PlayerInformed::new(
                self.mover_of(ply),
                Some(Move::Action(*action)),
            ));
        }
        out
    }

    fn public_history(
        &self,
        world: &KPState,
    ) -> Vec<PlayerInformed<Option<Move<KPAction, Deal>>>> {
        // no seat is privileged, so every deal comes out hidden
        self.private_history(Player::Unknown, world)
    }

    fn open_history(&self, world: &KPState) -> Vec<PlayerInformed<Move<KPAction, Deal>>> {
        let mut out = Vec::with_capacity(world.history.len() + 2);
        for (seat, card) in world.cards.iter().enumerate() {
            let Some(card) = *card else { break };
            out.push(PlayerInformed::new(
                Player::Chance,
                Move::Chance(Deal {
                    player: Player::from_seat(seat).unwrap(),
                    card,
                }),
            ));
        }
        for (ply, action) in world.history.iter().enumerate() {
            out.push(PlayerInformed::new(
                self.mover_of(ply),
                Move::Action(*action),
            ));
        }
        out
    }
}
