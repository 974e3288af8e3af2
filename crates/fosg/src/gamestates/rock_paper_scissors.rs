use serde::{Deserialize, Serialize};

use crate::{Game, Move, Player, PlayerInformed, Stochasticity};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Hand {
    Rock,
    Paper,
    Scissors,
}

impl Hand {
    fn beats(self, other: Hand) -> bool {
        matches!(
            (self, other),
            (Hand::Rock, Hand::Scissors) | (Hand::Paper, Hand::Rock) | (Hand::Scissors, Hand::Paper)
        )
    }
}

/// One-shot rock-paper-scissors, written as a two-ply sequential game: Alex
/// commits first, Bob second, and the commit is hidden until the game ends.
/// The hiding happens entirely in the observation functions, which is what
/// makes the sequential form equivalent to the simultaneous game.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct RpsState {
    picks: [Option<Hand>; 2],
}

impl RpsState {
    pub fn pick(&self, player: Player) -> Option<Hand> {
        player.seat().and_then(|s| self.picks[s])
    }
}

#[derive(Clone, Copy, Default, Debug)]
pub struct RockPaperScissors;

impl RockPaperScissors {
    const ALL_HANDS: [Hand; 3] = [Hand::Rock, Hand::Paper, Hand::Scissors];

    /// Replays `moves` from the initial state. Test convenience.
    pub fn from_moves(moves: &[Move<Hand, ()>]) -> RpsState {
        let game = RockPaperScissors;
        let mut state = game.initial_world();
        for mv in moves {
            game.transition(&mut state, mv);
        }
        state
    }
}

impl Game for RockPaperScissors {
    type World = RpsState;
    type Action = Hand;
    type ChanceOutcome = ();
    type Observation = String;

    const MAX_PLAYERS: usize = 2;
    const STOCHASTICITY: Stochasticity = Stochasticity::Deterministic;
    const SERIALIZED: bool = true;

    fn initial_world(&self) -> RpsState {
        RpsState::default()
    }

    fn players(&self, _world: &RpsState) -> Vec<Player> {
        vec![Player::Alex, Player::Bob]
    }

    fn active_player(&self, world: &RpsState) -> Player {
        if world.picks[0].is_none() {
            Player::Alex
        } else {
            Player::Bob
        }
    }

    fn actions(&self, _player: Player, world: &RpsState) -> Vec<Hand> {
        if self.is_terminal(world) {
            Vec::new()
        } else {
            Self::ALL_HANDS.to_vec()
        }
    }

    fn is_terminal(&self, world: &RpsState) -> bool {
        world.picks.iter().all(|p| p.is_some())
    }

    fn reward(&self, player: Player, world: &RpsState) -> f64 {
        if !self.is_terminal(world) {
            panic!("reward requested before both players committed");
        }
        let (alex, bob) = (world.picks[0].unwrap(), world.picks[1].unwrap());
        let for_alex = if alex.beats(bob) {
            1.0
        } else if bob.beats(alex) {
            -1.0
        } else {
            0.0
        };
        match player {
            Player::Alex => for_alex,
            Player::Bob => -for_alex,
            _ => 0.0,
        }
    }

    fn transition(&self, world: &mut RpsState, mv: &Move<Hand, ()>) {
        let hand = match mv {
            Move::Action(hand) => *hand,
            Move::Chance(()) => panic!("rock-paper-scissors has no chance moves"),
        };
        let seat = self
            .active_player(world)
            .seat()
            .expect("someone is always to move before the game ends");
        assert!(world.picks[seat].is_none(), "player already committed");
        world.picks[seat] = Some(hand);
    }

    fn private_observation(
        &self,
        observer: Player,
        world: &RpsState,
        mv: &Move<Hand, ()>,
        _next: &RpsState,
    ) -> String {
        match mv {
            Move::Action(hand) if self.active_player(world) == observer => format!("{:?}", hand),
            _ => "-".to_string(),
        }
    }

    fn public_observation(
        &self,
        world: &RpsState,
        _mv: &Move<Hand, ()>,
        _next: &RpsState,
    ) -> String {
        // everyone only learns that a commit happened, never which
        format!("{}:?", self.active_player(world).seat().unwrap_or(usize::MAX))
    }

    fn private_history(
        &self,
        player: Player,
        world: &RpsState,
    ) -> Vec<PlayerInformed<Option<Move<Hand, ()>>>> {
        let mut out = Vec::new();
        for (seat, pick) in world.picks.iter().enumerate() {
            let Some(hand) = *pick else { break };
            let owner = Player::from_seat(seat).unwrap();
            let entry = (owner == player).then_some(Move::Action(hand));
            out.push(PlayerInformed::new(owner, entry));
        }
        out
    }

    fn public_history(
        &self,
        world: &RpsState,
    ) -> Vec<PlayerInformed<Option<Move<Hand, ()>>>> {
        self.private_history(Player::Unknown, world)
    }

    fn open_history(&self, world: &RpsState) -> Vec<PlayerInformed<Move<Hand, ()>>> {
        let mut out = Vec::new();
        for (seat, pick) in world.picks.iter().enumerate() {
            let Some(hand) = *pick else { break };
            out.push(PlayerInformed::new(
                Player::from_seat(seat).unwrap(),
                Move::Action(hand),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rps_payoff_matrix() {
        let game = RockPaperScissors;
        let cases = [
            (Hand::Rock, Hand::Scissors, 1.0),
            (Hand::Rock, Hand::Paper, -1.0),
            (Hand::Rock, Hand::Rock, 0.0),
            (Hand::Paper, Hand::Rock, 1.0),
            (Hand::Scissors, Hand::Paper, 1.0),
            (Hand::Scissors, Hand::Rock, -1.0),
        ];
        for (alex, bob, expected) in cases {
            let state =
                RockPaperScissors::from_moves(&[Move::Action(alex), Move::Action(bob)]);
            assert!(game.is_terminal(&state));
            assert_eq!(game.reward(Player::Alex, &state), expected);
            assert_eq!(game.reward(Player::Bob, &state), -expected);
        }
    }

    #[test]
    fn test_rps_commit_is_hidden_from_opponent() {
        let game = RockPaperScissors;
        let before = game.initial_world();

        // whatever Alex commits, Bob observes the same thing
        let observed = RockPaperScissors::ALL_HANDS.map(|hand| {
            let mv = Move::Action(hand);
            let mut after = before.clone();
            game.transition(&mut after, &mv);
            (
                game.public_observation(&before, &mv, &after),
                game.private_observation(Player::Bob, &before, &mv, &after),
            )
        });
        assert!(observed.iter().all(|o| *o == observed[0]));

        // while Alex can tell their own commits apart
        let mv = Move::Action(Hand::Rock);
        let mut after = before.clone();
        game.transition(&mut after, &mv);
        assert_eq!(
            game.private_observation(Player::Alex, &before, &mv, &after),
            "Rock"
        );
    }

    #[test]
    fn test_rps_turn_order() {
        let game = RockPaperScissors;
        let mut state = game.initial_world();
        assert_eq!(game.active_player(&state), Player::Alex);
        game.transition(&mut state, &Move::Action(Hand::Paper));
        assert_eq!(game.active_player(&state), Player::Bob);
        assert!(!game.is_terminal(&state));
        game.transition(&mut state, &Move::Action(Hand::Rock));
        assert!(game.is_terminal(&state));
    }

    #[test]
    fn test_rps_histories_hide_the_right_entries() {
        let game = RockPaperScissors;
        let state =
            RockPaperScissors::from_moves(&[Move::Action(Hand::Rock), Move::Action(Hand::Paper)]);

        let alex = game.private_history(Player::Alex, &state);
        assert_eq!(alex[0].value, Some(Move::Action(Hand::Rock)));
        assert_eq!(alex[1].value, None);

        let public = game.public_history(&state);
        assert!(public.iter().all(|e| e.value.is_none()));

        let open = game.open_history(&state);
        assert_eq!(open.len(), 2);
        assert_eq!(open[1].value, Move::Action(Hand::Paper));
    }
}
