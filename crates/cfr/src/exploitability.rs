use std::hash::Hash;

use itertools::Itertools;
use log::debug;
use rustc_hash::FxHashMap;

use fosg::istate::InfoState;
use fosg::{Game, GameMove, Move, Player, Stochasticity};

use crate::policy::{ActionPolicy, DefaultStatePolicy, TabularPolicy};

/// A world state together with every player's infostate at it. Carrying the
/// infostates along is what lets the traversal query the opponent policy
/// without reconstructing observation histories per state.
struct SituatedState<G: Game> {
    world: G::World,
    infostates: FxHashMap<Player, InfoState<G::Observation>>,
}

impl<G: Game> Clone for SituatedState<G> {
    fn clone(&self) -> Self {
        Self {
            world: self.world.clone(),
            infostates: self.infostates.clone(),
        }
    }
}

/// A best response against a fixed state policy, by full enumeration.
///
/// Adaption of openspiel's best response algorithm:
///     https://github.com/deepmind/open_spiel/blob/master/open_spiel/python/algorithms/best_response.py
///
/// The opponent policy may be unnormalized (e.g. the raw average-strategy
/// table); entries are normalized per lookup, and infostates the table never
/// saw fall back to uniform play.
pub struct TabularBestResponse<'a, G, D>
where
    G: Game,
{
    env: &'a G,
    policy: &'a TabularPolicy<G::Observation, G::Action, D>,
    player: Player,
    root: SituatedState<G>,
    /// infostate of the responder -> its member states with counterfactual
    /// reach probabilities
    info_sets: FxHashMap<InfoState<G::Observation>, Vec<(SituatedState<G>, f64)>>,
    cut_threshold: f64,
}

impl<'a, G, D> TabularBestResponse<'a, G, D>
where
    G: Game,
    D: DefaultStatePolicy<G::Observation, G::Action>,
{
    pub fn new(
        env: &'a G,
        root: &G::World,
        policy: &'a TabularPolicy<G::Observation, G::Action, D>,
        player: Player,
        cut_threshold: f64,
    ) -> Self {
        let infostates = env
            .players(root)
            .into_iter()
            .filter(|p| !p.is_chance())
            .map(|p| (p, InfoState::new(p)))
            .collect();
        let root = SituatedState {
            world: root.clone(),
            infostates,
        };
        let mut response = Self {
            env,
            policy,
            player,
            root: root.clone(),
            info_sets: FxHashMap::default(),
            cut_threshold,
        };
        response.info_sets = response.info_sets(&root);
        response
    }

    /// Value of the game to the responder when they best-respond and everyone
    /// else follows the fixed policy.
    pub fn root_value(&mut self) -> f64 {
        let root = self.root.clone();
        self.value(&root)
    }

    /// The best response at `infostate`, by counterfactual-reach-weighted
    /// state value over the infostate's member states.
    pub fn best_response_action(&mut self, infostate: &InfoState<G::Observation>) -> G::Action {
        let infoset = self
            .info_sets
            .get(infostate)
            .expect("unknown infostate for the best responder")
            .clone();
        // every member state shares the responder's legal actions
        let actions = self.env.actions(self.player, &infoset[0].0.world);

        let mut best_action = actions[0].clone();
        let mut best_value = f64::NEG_INFINITY;
        for action in actions {
            let mut value = 0.0;
            for (state, cf_prob) in &infoset {
                let child = self.apply(state, &Move::Action(action.clone()));
                value += cf_prob * self.value(&child);
            }
            if value > best_value {
                best_value = value;
                best_action = action;
            }
        }
        best_action
    }

    /// Groups every descendant decision node of the responder by infostate.
    fn info_sets(
        &mut self,
        root: &SituatedState<G>,
    ) -> FxHashMap<InfoState<G::Observation>, Vec<(SituatedState<G>, f64)>> {
        let mut info_sets: FxHashMap<_, Vec<_>> = FxHashMap::default();
        for (state, cf_prob) in self.decision_nodes(root) {
            let key = state.infostates[&self.player].clone();
            info_sets.entry(key).or_default().push((state, cf_prob));
        }
        info_sets
    }

    /// Yields a (state, cf_prob) pair for each descendant decision node of
    /// the responder.
    fn decision_nodes(&mut self, parent: &SituatedState<G>) -> Vec<(SituatedState<G>, f64)> {
        let mut descendants = Vec::new();
        if self.env.is_terminal(&parent.world) {
            return descendants;
        }
        if self.env.active_player(&parent.world) == self.player {
            descendants.push((parent.clone(), 1.0));
        }
        for (mv, mv_prob) in self.transitions(parent) {
            let child = self.apply(parent, &mv);
            for (state, state_prob) in self.decision_nodes(&child) {
                descendants.push((state, state_prob * mv_prob));
            }
        }
        descendants
    }

    /// (move, cf_prob) pairs at `state`: chance by its declared distribution,
    /// the responder's own moves at probability 1 (counterfactual reach
    /// excludes their choices), everyone else by the fixed policy.
    fn transitions(&self, state: &SituatedState<G>) -> Vec<(GameMove<G>, f64)> {
        let active = self.env.active_player(&state.world);
        if G::STOCHASTICITY == Stochasticity::Chance && active == Player::Chance {
            return self
                .env
                .chance_actions(&state.world)
                .into_iter()
                .map(|outcome| {
                    let prob = self.env.chance_probability(&state.world, &outcome);
                    (Move::Chance(outcome), prob)
                })
                .collect_vec();
        }

        let actions = self.env.actions(active, &state.world);
        if active == self.player {
            actions
                .into_iter()
                .map(|action| (Move::Action(action), 1.0))
                .collect_vec()
        } else {
            let probs =
                normalized_probabilities(self.policy, &state.infostates[&active], &actions);
            actions
                .into_iter()
                .map(|action| {
                    let prob = probs.at(&action);
                    (Move::Action(action), prob)
                })
                .collect_vec()
        }
    }

    /// Value of `state` to the responder under (best response, fixed policy).
    fn value(&mut self, state: &SituatedState<G>) -> f64 {
        if self.env.is_terminal(&state.world) {
            return self.env.reward(self.player, &state.world);
        }
        if self.env.active_player(&state.world) == self.player {
            let key = state.infostates[&self.player].clone();
            let action = self.best_response_action(&key);
            let child = self.apply(state, &Move::Action(action));
            self.value(&child)
        } else {
            let mut value = 0.0;
            for (mv, prob) in self.transitions(state) {
                if prob > self.cut_threshold {
                    let child = self.apply(state, &mv);
                    value += prob * self.value(&child);
                }
            }
            value
        }
    }

    fn apply(&self, parent: &SituatedState<G>, mv: &GameMove<G>) -> SituatedState<G> {
        let mut world = parent.world.clone();
        self.env.transition(&mut world, mv);
        let public_obs = self.env.public_observation(&parent.world, mv, &world);
        let mut infostates = parent.infostates.clone();
        for (&p, istate) in infostates.iter_mut() {
            let private_obs = self.env.private_observation(p, &parent.world, mv, &world);
            istate.append(public_obs.clone(), private_obs);
        }
        SituatedState { world, infostates }
    }
}

/// The stored policy at `infostate` as a proper distribution: normalized per
/// lookup, uniform when the infostate is unknown or its weights sum to zero.
fn normalized_probabilities<O, A, D>(
    policy: &TabularPolicy<O, A, D>,
    infostate: &InfoState<O>,
    legal_actions: &[A],
) -> ActionPolicy<A>
where
    O: Clone + Eq + Hash,
    A: Clone + Eq + Hash,
    D: DefaultStatePolicy<O, A>,
{
    match policy.find(infostate) {
        Some(entry) if entry.sum() > 0.0 => {
            let mut probs = entry.clone();
            probs.normalize();
            probs
        }
        _ => ActionPolicy::uniform(legal_actions),
    }
}

/// Exploitability summary of a (possibly unnormalized) state policy on a
/// zero-sum game: `nash_conv` sums each player's best-response gain, and
/// `exploitability` is that sum averaged over the players. Both go to zero as
/// the policy approaches equilibrium.
#[derive(Clone, Copy, Debug)]
pub struct Exploitability {
    pub nash_conv: f64,
    pub exploitability: f64,
}

pub fn exploitability<G: Game, D>(
    env: &G,
    root: &G::World,
    policy: &TabularPolicy<G::Observation, G::Action, D>,
) -> Exploitability
where
    D: DefaultStatePolicy<G::Observation, G::Action>,
{
    let strategic = env
        .players(root)
        .into_iter()
        .filter(|p| !p.is_chance())
        .collect_vec();

    let mut nash_conv = 0.0;
    for &player in &strategic {
        let mut response = TabularBestResponse::new(env, root, policy, player, 0.0);
        let value = response.root_value();
        debug!("best response value for {}: {}", player, value);
        nash_conv += value;
    }

    Exploitability {
        nash_conv,
        exploitability: nash_conv / strategic.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::policy::UniformPolicy;
    use fosg::gamestates::rock_paper_scissors::{Hand, RockPaperScissors};

    type RpsPolicy = TabularPolicy<String, Hand, UniformPolicy>;

    #[test]
    fn test_uniform_rps_is_unexploitable() {
        let game = RockPaperScissors;
        let root = game.initial_world();
        // an empty table: every lookup falls back to uniform
        let policy = RpsPolicy::new(UniformPolicy);

        let result = exploitability(&game, &root, &policy);
        assert_relative_eq!(result.nash_conv, 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.exploitability, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pure_rps_commit_is_fully_exploitable() {
        let game = RockPaperScissors;
        let root = game.initial_world();

        // Alex always throws rock
        let mut policy = RpsPolicy::new(UniformPolicy);
        let alex_root = InfoState::new(Player::Alex);
        let entry = policy.lookup(&alex_root, &[Hand::Rock, Hand::Paper, Hand::Scissors]);
        *entry.weight_mut(Hand::Rock) = 1.0;
        *entry.weight_mut(Hand::Paper) = 0.0;
        *entry.weight_mut(Hand::Scissors) = 0.0;

        // Bob's only infostate: one hidden commit has happened
        let mv = Move::Action(Hand::Rock);
        let mut after = root.clone();
        game.transition(&mut after, &mv);
        let mut bob_istate = InfoState::new(Player::Bob);
        bob_istate.append(
            game.public_observation(&root, &mv, &after),
            game.private_observation(Player::Bob, &root, &mv, &after),
        );

        let mut response = TabularBestResponse::new(&game, &root, &policy, Player::Bob, 0.0);
        assert_eq!(response.best_response_action(&bob_istate), Hand::Paper);
        assert_relative_eq!(response.root_value(), 1.0);
    }
}
