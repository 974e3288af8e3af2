use std::collections::VecDeque;

use itertools::Itertools;
use log::{debug, trace};
use rustc_hash::FxHashMap;

use fosg::istate::{InfoState, PublicState};
use fosg::{Game, GameMove, Move, Player, Stochasticity};

use crate::error::CfrError;
use crate::policy::{DefaultStatePolicy, TabularPolicy, UniformPolicy, ZeroPolicy};
use crate::rm::{cf_reach_probability, regret_matching};
use crate::tree::{traverse, TreeVisitor};

/// Engine switches, fixed at construction.
#[derive(Clone, Copy, Debug)]
pub struct CfrConfig {
    /// Update one player's tables per iteration, cycling through the players,
    /// instead of every player's at once.
    pub alternating_updates: bool,
    /// Materialize the shared public state at every node. Off by default
    /// since the engine itself never reads it; it only serves analysis.
    pub store_public_states: bool,
}

impl Default for CfrConfig {
    fn default() -> Self {
        Self {
            alternating_updates: true,
            store_public_states: false,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum NodeKind {
    Chance,
    Decision,
    Terminal,
}

fn node_kind<G: Game>(env: &G, world: &G::World) -> NodeKind {
    if env.is_terminal(world) {
        NodeKind::Terminal
    } else if G::STOCHASTICITY == Stochasticity::Chance
        && env.active_player(world) == Player::Chance
    {
        NodeKind::Chance
    } else {
        NodeKind::Decision
    }
}

struct Edge<G: Game> {
    mv: GameMove<G>,
    child: usize,
    /// chance edges record their draw probability at expansion time
    chance_prob: Option<f64>,
}

/// One arena slot of the per-iteration game tree. Parent/child links are
/// plain indices into the arena, which lives only for the iteration; the
/// persistent learning state is keyed by infostate instead.
struct CfrNode<G: Game> {
    kind: NodeKind,
    /// active player; `Unknown` at terminals
    player: Player,
    /// the active player's infostate; decision nodes only
    infostate: Option<InfoState<G::Observation>>,
    /// legal actions of the active player; decision nodes only
    actions: Vec<G::Action>,
    publicstate: Option<PublicState<G::Observation>>,
    /// each player's compounded reach contribution, chance included
    reach: FxHashMap<Player, f64>,
    /// per-player state values, filled on the way back up
    values: FxHashMap<Player, f64>,
    edges: Vec<Edge<G>>,
}

/// Data threaded down one live branch of the forward traversal.
struct BranchData<G: Game> {
    node: usize,
    infostates: FxHashMap<Player, InfoState<G::Observation>>,
    publicstate: Option<PublicState<G::Observation>>,
    reach: FxHashMap<Player, f64>,
}

/// The forward pass: builds the iteration's arena, extends every player's
/// infostate with the transition observations, compounds reach
/// contributions, and records visited nodes for the delayed backward update.
struct ForwardPass<'a, G, D>
where
    G: Game,
    D: DefaultStatePolicy<G::Observation, G::Action>,
{
    env: &'a G,
    curr_policy: &'a mut TabularPolicy<G::Observation, G::Action, D>,
    strategic: &'a [Player],
    arena: Vec<CfrNode<G>>,
    /// Nodes in visitation (pre-)order. Draining it back to front hands every
    /// node its children's values before its own, i.e. post-order
    /// propagation. Terminal nodes never enter it; their values are final at
    /// expansion.
    update_stack: Vec<usize>,
}

impl<'a, G, D> ForwardPass<'a, G, D>
where
    G: Game,
    D: DefaultStatePolicy<G::Observation, G::Action>,
{
    fn make_node(
        &self,
        world: &G::World,
        infostates: &FxHashMap<Player, InfoState<G::Observation>>,
        publicstate: Option<PublicState<G::Observation>>,
        reach: FxHashMap<Player, f64>,
    ) -> CfrNode<G> {
        let kind = node_kind(self.env, world);
        let mut values = FxHashMap::default();
        let (player, infostate, actions) = match kind {
            NodeKind::Terminal => {
                for &p in self.strategic {
                    values.insert(p, self.env.reward(p, world));
                }
                (Player::Unknown, None, Vec::new())
            }
            NodeKind::Chance => (Player::Chance, None, Vec::new()),
            NodeKind::Decision => {
                let active = self.env.active_player(world);
                debug_assert!(
                    self.env.is_partaking(world, active),
                    "the active player must still be partaking"
                );
                let infostate = infostates
                    .get(&active)
                    .expect("every strategic player carries an infostate")
                    .clone();
                (active, Some(infostate), self.env.actions(active, world))
            }
        };
        CfrNode {
            kind,
            player,
            infostate,
            actions,
            publicstate,
            reach,
            values,
            edges: Vec::new(),
        }
    }
}

impl<'a, G, D> TreeVisitor<G> for ForwardPass<'a, G, D>
where
    G: Game,
    D: DefaultStatePolicy<G::Observation, G::Action>,
{
    type Data = BranchData<G>;

    fn pre_child(&mut self, _world: &G::World, data: &mut BranchData<G>) {
        self.update_stack.push(data.node);
    }

    fn child(
        &mut self,
        data: &mut BranchData<G>,
        mv: &GameMove<G>,
        parent: Option<&G::World>,
        child_world: &G::World,
    ) -> BranchData<G> {
        let parent_world = parent.expect("the engine always traverses by cloning");

        let public_obs = self.env.public_observation(parent_world, mv, child_world);
        let mut infostates = data.infostates.clone();
        for (&p, istate) in infostates.iter_mut() {
            let private_obs = self
                .env
                .private_observation(p, parent_world, mv, child_world);
            istate.append(public_obs.clone(), private_obs);
        }
        let publicstate = data.publicstate.clone().map(|mut ps| {
            ps.append(public_obs);
            ps
        });

        // compound the mover's contribution along this edge
        let mut reach = data.reach.clone();
        let chance_prob = match mv {
            Move::Chance(outcome) => {
                let p = self.env.chance_probability(parent_world, outcome);
                *reach.entry(Player::Chance).or_insert(1.0) *= p;
                Some(p)
            }
            Move::Action(action) => {
                let (mover, infostate, legal) = {
                    let parent_node = &self.arena[data.node];
                    (
                        parent_node.player,
                        parent_node
                            .infostate
                            .clone()
                            .expect("a decision node always has an infostate"),
                        parent_node.actions.clone(),
                    )
                };
                let pi = self.curr_policy.lookup(&infostate, &legal).at(action);
                *reach.entry(mover).or_insert(1.0) *= pi;
                None
            }
        };

        let node = self.make_node(child_world, &infostates, publicstate.clone(), reach.clone());
        let child = self.arena.len();
        self.arena.push(node);
        self.arena[data.node].edges.push(Edge {
            mv: mv.clone(),
            child,
            chance_prob,
        });

        BranchData {
            node: child,
            infostates,
            publicstate,
            reach,
        }
    }
}

/// Vanilla counterfactual regret minimization over a factored-observation
/// stochastic game.
///
/// Each iteration walks the full game tree depth-first, propagating reach
/// probabilities down and counterfactual values back up, then updates
/// cumulative regrets and the reach-weighted average strategy at every
/// decision node of the selected player (all players under simultaneous
/// updates), and regret-matches the next current policy.
///
/// The current policy chases per-iteration regret; the *average* policy is
/// the quantity that converges toward equilibrium. The average table stores
/// unnormalized realization-plan sums, so consumers call
/// [`TabularPolicy::normalize`] on a copy before treating it as a
/// distribution.
pub struct VanillaCfr<G, D = UniformPolicy, E = ZeroPolicy>
where
    G: Game,
    D: DefaultStatePolicy<G::Observation, G::Action>,
    E: DefaultStatePolicy<G::Observation, G::Action>,
{
    env: G,
    root: G::World,
    config: CfrConfig,
    players: Vec<Player>,
    curr_policy: TabularPolicy<G::Observation, G::Action, D>,
    avg_policy: TabularPolicy<G::Observation, G::Action, E>,
    /// cumulative regrets, keyed by infostate; created lazily on first visit
    /// and persistent across iterations
    regrets: FxHashMap<InfoState<G::Observation>, FxHashMap<G::Action, f64>>,
    /// alternating updates only: front of the queue is next in line
    update_schedule: VecDeque<Player>,
    iteration: usize,
    nodes_touched: usize,
    root_values: FxHashMap<Player, f64>,
}

/// Builds a [`VanillaCfr`] engine from explicit policy tables, which lets the
/// caller seed non-default starting strategies or default-policy behavior.
pub fn make_vanilla<G, D, E>(
    env: G,
    root: G::World,
    policy: TabularPolicy<G::Observation, G::Action, D>,
    avg_policy: TabularPolicy<G::Observation, G::Action, E>,
    config: CfrConfig,
) -> VanillaCfr<G, D, E>
where
    G: Game,
    D: DefaultStatePolicy<G::Observation, G::Action>,
    E: DefaultStatePolicy<G::Observation, G::Action>,
{
    VanillaCfr::with_policies(env, root, policy, avg_policy, config)
}

impl<G: Game> VanillaCfr<G> {
    /// An engine with the standard tables: uniform first-visit current
    /// policy, zero-initialized average policy.
    pub fn new(env: G, root: G::World, config: CfrConfig) -> Self {
        Self::with_policies(
            env,
            root,
            TabularPolicy::new(UniformPolicy),
            TabularPolicy::new(ZeroPolicy),
            config,
        )
    }
}

impl<G, D, E> VanillaCfr<G, D, E>
where
    G: Game,
    D: DefaultStatePolicy<G::Observation, G::Action>,
    E: DefaultStatePolicy<G::Observation, G::Action>,
{
    pub fn with_policies(
        env: G,
        root: G::World,
        policy: TabularPolicy<G::Observation, G::Action, D>,
        avg_policy: TabularPolicy<G::Observation, G::Action, E>,
        config: CfrConfig,
    ) -> Self {
        let players = env.players(&root);
        let update_schedule = if config.alternating_updates {
            players.iter().copied().filter(|p| !p.is_chance()).collect()
        } else {
            VecDeque::new()
        };
        Self {
            env,
            root,
            config,
            players,
            curr_policy: policy,
            avg_policy,
            regrets: FxHashMap::default(),
            update_schedule,
            iteration: 0,
            nodes_touched: 0,
            root_values: FxHashMap::default(),
        }
    }

    /// Run `n` iterations and return the current policy afterwards, so the
    /// caller can snapshot it per step if they want to.
    pub fn iterate(
        &mut self,
        n: usize,
    ) -> Result<&TabularPolicy<G::Observation, G::Action, D>, CfrError> {
        for _ in 0..n {
            debug!("iteration number: {}", self.iteration);
            let player = if self.config.alternating_updates {
                Some(self.cycle_player_to_update(None)?)
            } else {
                None
            };
            self.run_iteration(player)?;
            self.iteration += 1;
        }
        Ok(&self.curr_policy)
    }

    /// One iteration of alternating updates, optionally forcing which player
    /// is updated. Alternating-updates engines only.
    ///
    /// Passing `Some(player)` pulls that player to the front of the schedule
    /// and updates them, so back-to-back explicit calls can update the same
    /// player repeatedly. Passing `None` continues the regular cycle.
    pub fn iterate_player(
        &mut self,
        player_to_update: Option<Player>,
    ) -> Result<&TabularPolicy<G::Observation, G::Action, D>, CfrError> {
        if !self.config.alternating_updates {
            return Err(CfrError::InvalidArgument(
                "per-player iteration requires alternating updates".to_string(),
            ));
        }
        if let Some(player) = player_to_update {
            if player.is_chance() {
                return Err(CfrError::InvalidArgument(
                    "the chance player cannot be updated; did you forget to pass \
                     the player parameter?"
                        .to_string(),
                ));
            }
            if !self.update_schedule.contains(&player) {
                return Err(CfrError::InvalidArgument(format!(
                    "player {} is not part of this game",
                    player
                )));
            }
        }

        debug!("iteration number: {}", self.iteration);
        let player = self.cycle_player_to_update(player_to_update)?;
        self.run_iteration(Some(player))?;
        self.iteration += 1;
        Ok(&self.curr_policy)
    }

    /// The current (per-iteration) policy table.
    pub fn policy(&self) -> &TabularPolicy<G::Observation, G::Action, D> {
        &self.curr_policy
    }

    /// The unnormalized average policy table. This, not the current policy,
    /// converges toward equilibrium.
    pub fn average_policy(&self) -> &TabularPolicy<G::Observation, G::Action, E> {
        &self.avg_policy
    }

    /// Completed iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn nodes_touched(&self) -> usize {
        self.nodes_touched
    }

    /// Per-player root state values of the most recent iteration.
    pub fn root_values(&self) -> &FxHashMap<Player, f64> {
        &self.root_values
    }

    /// The cumulative regret tables, for external analysis.
    pub fn regrets(
        &self,
    ) -> &FxHashMap<InfoState<G::Observation>, FxHashMap<G::Action, f64>> {
        &self.regrets
    }

    /// The alternating-updates schedule; the front is next in line.
    pub fn update_schedule(&self) -> &VecDeque<Player> {
        &self.update_schedule
    }

    /// Advance the update schedule. A plain step pops the front player and
    /// requeues them at the back; an explicit request pulls that player to
    /// the front and leaves them there.
    fn cycle_player_to_update(&mut self, requested: Option<Player>) -> Result<Player, CfrError> {
        match requested {
            None => {
                let player = self.update_schedule.pop_front().ok_or_else(|| {
                    CfrError::LogicError("the player update schedule is empty".to_string())
                })?;
                self.update_schedule.push_back(player);
                Ok(player)
            }
            Some(player) => {
                if let Some(pos) = self.update_schedule.iter().position(|&p| p == player) {
                    self.update_schedule.remove(pos);
                }
                self.update_schedule.push_front(player);
                Ok(player)
            }
        }
    }

    fn run_iteration(&mut self, player_to_update: Option<Player>) -> Result<(), CfrError> {
        let strategic = self
            .players
            .iter()
            .copied()
            .filter(|p| !p.is_chance())
            .collect_vec();

        let infostates: FxHashMap<Player, InfoState<G::Observation>> = strategic
            .iter()
            .map(|&p| (p, InfoState::new(p)))
            .collect();
        let mut reach: FxHashMap<Player, f64> =
            self.players.iter().map(|&p| (p, 1.0)).collect();
        reach.entry(Player::Chance).or_insert(1.0);
        let publicstate = self.config.store_public_states.then(PublicState::new);

        let mut pass = ForwardPass {
            env: &self.env,
            curr_policy: &mut self.curr_policy,
            strategic: &strategic,
            arena: Vec::new(),
            update_stack: Vec::new(),
        };
        let root_node = pass.make_node(&self.root, &infostates, publicstate.clone(), reach.clone());
        pass.arena.push(root_node);
        let root_data = BranchData {
            node: 0,
            infostates,
            publicstate,
            reach,
        };
        traverse(&self.env, &self.root, &mut pass, root_data, false);
        let ForwardPass {
            mut arena,
            update_stack,
            ..
        } = pass;

        if update_stack.is_empty() {
            return Err(CfrError::LogicError(
                "the update stack is empty; it should have been filled by the tree traversal"
                    .to_string(),
            ));
        }

        self.nodes_touched += arena.len();
        self.backward_pass(&mut arena, update_stack, &strategic, player_to_update)?;
        self.root_values = arena[0].values.clone();
        if self.config.store_public_states {
            trace!(
                "materialized {} public states",
                arena.iter().filter(|n| n.publicstate.is_some()).count()
            );
        }
        trace!(
            "touched {} nodes, {} infostates in the current policy",
            arena.len(),
            self.curr_policy.len()
        );
        Ok(())
    }

    /// Drain the update stack back to front: children first, so every node
    /// folds finished child values, then update the learning tables where the
    /// schedule says so.
    fn backward_pass(
        &mut self,
        arena: &mut [CfrNode<G>],
        update_stack: Vec<usize>,
        strategic: &[Player],
        player_to_update: Option<Player>,
    ) -> Result<(), CfrError> {
        for idx in update_stack.into_iter().rev() {
            let values: FxHashMap<Player, f64> = match arena[idx].kind {
                // rewards were recorded at expansion; only a terminal root
                // ever shows up here
                NodeKind::Terminal => continue,
                NodeKind::Chance => {
                    let node = &arena[idx];
                    strategic
                        .iter()
                        .map(|&p| {
                            let v = node
                                .edges
                                .iter()
                                .map(|e| {
                                    let w = e
                                        .chance_prob
                                        .expect("chance edges record their probability");
                                    w * arena[e.child].values[&p]
                                })
                                .sum::<f64>();
                            (p, v)
                        })
                        .collect()
                }
                NodeKind::Decision => {
                    let (infostate, actions) = {
                        let node = &arena[idx];
                        (
                            node.infostate.clone().ok_or_else(|| {
                                CfrError::LogicError(
                                    "decision node without an infostate".to_string(),
                                )
                            })?,
                            node.actions.clone(),
                        )
                    };
                    // v(s) = sum_a pi(s, a) * v(s'(a)), under the policy as
                    // it stands right now
                    let policy = self.curr_policy.lookup(&infostate, &actions).clone();
                    let node = &arena[idx];
                    strategic
                        .iter()
                        .map(|&p| {
                            let v = node
                                .edges
                                .iter()
                                .map(|e| match &e.mv {
                                    Move::Action(a) => policy.at(a) * arena[e.child].values[&p],
                                    Move::Chance(_) => {
                                        debug_assert!(false, "chance edge under a decision node");
                                        0.0
                                    }
                                })
                                .sum::<f64>();
                            (p, v)
                        })
                        .collect()
                }
            };
            arena[idx].values = values;

            if arena[idx].kind == NodeKind::Decision {
                let update = match player_to_update {
                    Some(p) => arena[idx].player == p,
                    None => true,
                };
                if update {
                    self.update_regret_and_policy(arena, idx)?;
                }
            }
        }
        Ok(())
    }

    /// The per-infostate learning step: accumulate counterfactual regrets and
    /// the reach-weighted strategy sum, then regret-match the next current
    /// policy.
    fn update_regret_and_policy(
        &mut self,
        arena: &mut [CfrNode<G>],
        idx: usize,
    ) -> Result<(), CfrError> {
        let (player, infostate, actions) = {
            let node = &arena[idx];
            (
                node.player,
                node.infostate.clone().ok_or_else(|| {
                    CfrError::LogicError("decision node without an infostate".to_string())
                })?,
                node.actions.clone(),
            )
        };
        let node_value = *arena[idx].values.get(&player).ok_or_else(|| {
            CfrError::LogicError("missing node value for the update player".to_string())
        })?;
        let reach_self = *arena[idx].reach.get(&player).ok_or_else(|| {
            CfrError::LogicError("missing reach contribution for the update player".to_string())
        })?;
        let cf_reach = cf_reach_probability(&arena[idx].reach, player);

        let regrets = self
            .regrets
            .entry(infostate.clone())
            .or_insert_with(|| actions.iter().map(|a| (a.clone(), 0.0)).collect());
        for edge in &arena[idx].edges {
            let Move::Action(action) = &edge.mv else {
                continue;
            };
            let child_value = arena[edge.child].values[&player];
            *regrets
                .get_mut(action)
                .ok_or(CfrError::InconsistentKeys)? += cf_reach * (child_value - node_value);
        }

        let current = self.curr_policy.lookup(&infostate, &actions).clone();
        let average = self.avg_policy.lookup(&infostate, &actions);
        for action in &actions {
            *average.weight_mut(action.clone()) += reach_self * current.at(action);
        }

        let table = self
            .regrets
            .get(&infostate)
            .expect("the regret entry was created above");
        regret_matching(self.curr_policy.lookup(&infostate, &actions), table)
    }
}

#[cfg(test)]
mod tests {
    use fosg::gamestates::kuhn_poker::KuhnPoker;

    use super::*;

    fn kuhn_engine() -> VanillaCfr<KuhnPoker> {
        let game = KuhnPoker;
        VanillaCfr::new(game, game.initial_world(), CfrConfig::default())
    }

    #[test]
    fn test_schedule_plain_cycle() {
        let mut engine = kuhn_engine();
        assert_eq!(
            engine.update_schedule().iter().copied().collect_vec(),
            vec![Player::Alex, Player::Bob]
        );

        assert_eq!(engine.cycle_player_to_update(None).unwrap(), Player::Alex);
        assert_eq!(
            engine.update_schedule().iter().copied().collect_vec(),
            vec![Player::Bob, Player::Alex]
        );
    }

    #[test]
    fn test_schedule_explicit_request_stays_in_front() {
        let mut engine = kuhn_engine();

        assert_eq!(
            engine.cycle_player_to_update(Some(Player::Bob)).unwrap(),
            Player::Bob
        );
        assert_eq!(
            engine.update_schedule().iter().copied().collect_vec(),
            vec![Player::Bob, Player::Alex]
        );

        // the next plain step updates Bob again and cycles them to the back
        assert_eq!(engine.cycle_player_to_update(None).unwrap(), Player::Bob);
        assert_eq!(
            engine.update_schedule().iter().copied().collect_vec(),
            vec![Player::Alex, Player::Bob]
        );
    }

    #[test]
    fn test_chance_player_update_is_rejected() {
        let mut engine = kuhn_engine();
        let err = engine.iterate_player(Some(Player::Chance)).unwrap_err();
        assert!(matches!(err, CfrError::InvalidArgument(_)));
        assert_eq!(engine.iteration(), 0, "failed calls leave the engine alone");
    }

    #[test]
    fn test_foreign_player_update_is_rejected() {
        let mut engine = kuhn_engine();
        let err = engine.iterate_player(Some(Player::Cedric)).unwrap_err();
        assert!(matches!(err, CfrError::InvalidArgument(_)));
        assert_eq!(
            engine.update_schedule().iter().copied().collect_vec(),
            vec![Player::Alex, Player::Bob],
            "failed calls leave the schedule alone"
        );
    }

    #[test]
    fn test_simultaneous_engine_rejects_player_iteration() {
        let game = KuhnPoker;
        let config = CfrConfig {
            alternating_updates: false,
            ..CfrConfig::default()
        };
        let mut engine = VanillaCfr::new(game, game.initial_world(), config);
        assert!(matches!(
            engine.iterate_player(Some(Player::Alex)),
            Err(CfrError::InvalidArgument(_))
        ));
        assert!(engine.update_schedule().is_empty());
    }

    #[test]
    fn test_current_policies_stay_normalized() {
        let mut engine = kuhn_engine();
        engine.iterate(25).unwrap();

        for (_, policy) in engine.policy().iter() {
            let sum = policy.sum();
            assert!((sum - 1.0).abs() < 1e-9, "current policy sums to {}", sum);
        }
        assert!(engine.nodes_touched() > 0);
    }

    #[test]
    fn test_public_states_can_be_materialized() {
        let game = KuhnPoker;
        let config = CfrConfig {
            store_public_states: true,
            ..CfrConfig::default()
        };
        let mut engine = VanillaCfr::new(game, game.initial_world(), config);
        engine.iterate(1).unwrap();
        assert_eq!(engine.iteration(), 1);
    }
}
