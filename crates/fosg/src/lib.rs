use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

pub mod gamestates;
pub mod istate;

/// Identity of an actor in a game.
///
/// `Chance` is the distinguished non-strategic player representing the
/// environment's random draws. `Unknown` is a sentinel for positions where no
/// player can be named (e.g. the mover of a terminal state). Up to ten
/// strategic identities are available; a game announces the subset it uses via
/// [`Game::players`].
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize, Default,
)]
pub enum Player {
    #[default]
    Unknown,
    Chance,
    Alex,
    Bob,
    Cedric,
    Dora,
    Emily,
    Fred,
    Georgia,
    Henry,
    Ida,
    Julia,
}

impl Player {
    const SEATS: [Player; 10] = [
        Player::Alex,
        Player::Bob,
        Player::Cedric,
        Player::Dora,
        Player::Emily,
        Player::Fred,
        Player::Georgia,
        Player::Henry,
        Player::Ida,
        Player::Julia,
    ];

    /// Seat number of a strategic player. `Chance` and `Unknown` hold no seat.
    pub fn seat(self) -> Option<usize> {
        Self::SEATS.iter().position(|&p| p == self)
    }

    /// The strategic player sitting at `seat`, if any.
    pub fn from_seat(seat: usize) -> Option<Player> {
        Self::SEATS.get(seat).copied()
    }

    pub fn is_chance(self) -> bool {
        self == Player::Chance
    }
}

impl Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Whether a game ever hands the move to the chance player.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Stochasticity {
    Deterministic,
    Chance,
}

/// A transition label: either a strategic action or a chance outcome.
///
/// Every API point that applies a transition takes this sum type, so dispatch
/// on `active_player == Chance` is total and chance outcomes never masquerade
/// as actions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Move<A, C> {
    Action(A),
    Chance(C),
}

/// The move type of a game, spelled through its associated types.
pub type GameMove<G> = Move<<G as Game>::Action, <G as Game>::ChanceOutcome>;

/// A history entry annotated with the player who produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct PlayerInformed<T> {
    pub player: Player,
    pub value: T,
}

impl<T> PlayerInformed<T> {
    pub fn new(player: Player, value: T) -> Self {
        Self { player, value }
    }
}

/// The contract between a factored-observation stochastic game and a solver.
///
/// A game supplies the complete world state, the legal moves of whoever is
/// active, the chance distribution where it declares [`Stochasticity::Chance`],
/// terminal rewards, and the observation factorization: after every transition
/// each player receives a private observation and everyone receives the same
/// public observation. Observations must be deterministic functions of
/// `(world_before, move, world_after)`; any nondeterminism breaks information
/// state identification.
///
/// Solvers mutate world states only through [`Game::transition`] and clone
/// them whenever a branch needs a state it does not own.
pub trait Game {
    /// The god's-eye snapshot of the game. Cloned along tree branches.
    type World: Clone + Debug;
    /// Opaque strategic action. The solver only hashes, compares and clones it.
    type Action: Clone + Eq + Hash + Debug;
    /// Opaque chance outcome, drawn from the game's distribution rather than
    /// chosen. Games declaring [`Stochasticity::Deterministic`] may use `()`.
    type ChanceOutcome: Clone + Eq + Hash + Debug;
    /// Opaque observation, public or private depending on the emitting method.
    type Observation: Clone + Eq + Hash + Debug;

    /// Upper bound on the number of strategic players this game seats.
    const MAX_PLAYERS: usize;
    /// Whether the chance player ever acts. Solvers branch on this to decide
    /// whether [`Game::chance_actions`] is consulted at all.
    const STOCHASTICITY: Stochasticity;
    /// Whether world states carry a stable serialized representation a host
    /// may persist.
    const SERIALIZED: bool = false;

    /// A fresh world state at the start of the game.
    fn initial_world(&self) -> Self::World;

    /// The currently partaking players, with `Chance` included for stochastic
    /// games.
    fn players(&self, world: &Self::World) -> Vec<Player>;

    /// Whose turn it is; `Chance` whenever the next transition is a draw.
    fn active_player(&self, world: &Self::World) -> Player;

    /// Legal moves of the active strategic player. Non-empty at every
    /// non-terminal decision state.
    fn actions(&self, player: Player, world: &Self::World) -> Vec<Self::Action>;

    /// Support of the current chance distribution. Stochastic games only.
    fn chance_actions(&self, _world: &Self::World) -> Vec<Self::ChanceOutcome> {
        Vec::new()
    }

    /// Probability of drawing `outcome` at `world`. Must sum to 1 over
    /// [`Game::chance_actions`]. Stochastic games only.
    fn chance_probability(&self, _world: &Self::World, _outcome: &Self::ChanceOutcome) -> f64 {
        0.0
    }

    fn is_terminal(&self, world: &Self::World) -> bool;

    /// Whether `player` still has live payoff exposure (e.g. has not folded).
    fn is_partaking(&self, _world: &Self::World, _player: Player) -> bool {
        true
    }

    /// Terminal payoff for `player`.
    fn reward(&self, player: Player, world: &Self::World) -> f64;

    /// Progress the world in place. Callers must only pass moves previously
    /// reported legal; games may panic on anything else.
    fn transition(&self, world: &mut Self::World, mv: &Move<Self::Action, Self::ChanceOutcome>);

    /// What `observer` privately learns from this transition.
    fn private_observation(
        &self,
        observer: Player,
        world: &Self::World,
        mv: &Move<Self::Action, Self::ChanceOutcome>,
        next: &Self::World,
    ) -> Self::Observation;

    /// What every player learns from this transition.
    fn public_observation(
        &self,
        world: &Self::World,
        mv: &Move<Self::Action, Self::ChanceOutcome>,
        next: &Self::World,
    ) -> Self::Observation;

    /// The move sequence so far as seen by `player`: opponents' chance draws
    /// are hidden behind `None`, everything else is revealed.
    fn private_history(
        &self,
        player: Player,
        world: &Self::World,
    ) -> Vec<PlayerInformed<Option<Move<Self::Action, Self::ChanceOutcome>>>>;

    /// The move sequence so far with every private component hidden.
    fn public_history(
        &self,
        world: &Self::World,
    ) -> Vec<PlayerInformed<Option<Move<Self::Action, Self::ChanceOutcome>>>>;

    /// The full move sequence, nothing hidden.
    fn open_history(
        &self,
        world: &Self::World,
    ) -> Vec<PlayerInformed<Move<Self::Action, Self::ChanceOutcome>>>;
}
