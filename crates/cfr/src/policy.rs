use std::hash::Hash;

use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use fosg::istate::InfoState;

/// A finite weight table over the actions available at one infostate.
///
/// Normalized instances are probability distributions; the same type also
/// serves as the unnormalized accumulator behind the average strategy. Looking
/// up an action that was never inserted yields the default weight (zero).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionPolicy<A: Eq + Hash> {
    weights: FxHashMap<A, f64>,
    default_weight: f64,
}

impl<A: Eq + Hash> Default for ActionPolicy<A> {
    fn default() -> Self {
        Self {
            weights: FxHashMap::default(),
            default_weight: 0.0,
        }
    }
}

impl<A: Clone + Eq + Hash> ActionPolicy<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every action in `actions` at the same `weight`.
    pub fn from_actions(actions: &[A], weight: f64) -> Self {
        let mut policy = Self::new();
        for action in actions {
            policy.weights.insert(action.clone(), weight);
        }
        policy
    }

    /// The uniform distribution over `actions`.
    pub fn uniform(actions: &[A]) -> Self {
        debug_assert!(!actions.is_empty(), "uniform policy over no actions");
        Self::from_actions(actions, 1.0 / actions.len() as f64)
    }

    pub fn from_weights(weights: FxHashMap<A, f64>) -> Self {
        Self {
            weights,
            default_weight: 0.0,
        }
    }

    /// Weight of `action`, or the default weight if it was never inserted.
    pub fn at(&self, action: &A) -> f64 {
        self.weights
            .get(action)
            .copied()
            .unwrap_or(self.default_weight)
    }

    /// Mutable access, inserting the default weight if absent.
    pub fn weight_mut(&mut self, action: A) -> &mut f64 {
        self.weights.entry(action).or_insert(self.default_weight)
    }

    pub fn contains(&self, action: &A) -> bool {
        self.weights.contains_key(action)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &A> {
        self.weights.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&A, f64)> {
        self.weights.iter().map(|(a, w)| (a, *w))
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Divide every weight by the sum of weights. The sum must be positive;
    /// callers must not normalize an all-zero policy.
    pub fn normalize(&mut self) {
        let sum = self.sum();
        debug_assert!(sum > 0.0, "normalizing a policy with non-positive sum");
        for weight in self.weights.values_mut() {
            *weight /= sum;
        }
    }

    /// Draw an action with probability proportional to its weight. `None` when
    /// every weight is zero.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<A> {
        let entries = self.weights.iter().collect_vec();
        entries
            .choose_weighted(rng, |(_, w)| **w)
            .ok()
            .map(|(a, _)| (*a).clone())
    }
}

impl<A: Eq + Hash> PartialEq for ActionPolicy<A> {
    fn eq(&self, other: &Self) -> bool {
        self.weights == other.weights
    }
}

impl<A: Eq + Hash> std::ops::Index<&A> for ActionPolicy<A> {
    type Output = f64;

    fn index(&self, action: &A) -> &f64 {
        self.weights.get(action).unwrap_or(&self.default_weight)
    }
}

/// Synthesizes the entry a state policy hands out the first time an infostate
/// is queried.
pub trait DefaultStatePolicy<O, A: Clone + Eq + Hash> {
    fn synthesize(&self, infostate: &InfoState<O>, legal_actions: &[A]) -> ActionPolicy<A>;
}

/// First-visit entries are uniform over the legal actions.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct UniformPolicy;

impl<O, A: Clone + Eq + Hash> DefaultStatePolicy<O, A> for UniformPolicy {
    fn synthesize(&self, _infostate: &InfoState<O>, legal_actions: &[A]) -> ActionPolicy<A> {
        ActionPolicy::uniform(legal_actions)
    }
}

/// First-visit entries are all-zero. This is the required default for tables
/// that accumulate additively, like the average strategy: unseen entries must
/// start at 0, not at a distribution.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ZeroPolicy;

impl<O, A: Clone + Eq + Hash> DefaultStatePolicy<O, A> for ZeroPolicy {
    fn synthesize(&self, _infostate: &InfoState<O>, legal_actions: &[A]) -> ActionPolicy<A> {
        ActionPolicy::from_actions(legal_actions, 0.0)
    }
}

/// A state policy: infostate to action policy, with first-visit-lazy entry
/// synthesis. Infostates only materialize in the table once a traversal
/// actually reaches them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TabularPolicy<O, A, D>
where
    O: Eq + Hash,
    A: Clone + Eq + Hash,
{
    table: FxHashMap<InfoState<O>, ActionPolicy<A>>,
    default_policy: D,
}

impl<O, A, D> TabularPolicy<O, A, D>
where
    O: Clone + Eq + Hash,
    A: Clone + Eq + Hash,
    D: DefaultStatePolicy<O, A>,
{
    pub fn new(default_policy: D) -> Self {
        Self {
            table: FxHashMap::default(),
            default_policy,
        }
    }

    /// The stored entry for `infostate`, synthesizing (and keeping) one from
    /// the default policy on first visit.
    pub fn lookup(&mut self, infostate: &InfoState<O>, legal_actions: &[A]) -> &mut ActionPolicy<A> {
        if !self.table.contains_key(infostate) {
            let entry = self.default_policy.synthesize(infostate, legal_actions);
            self.table.insert(infostate.clone(), entry);
        }
        self.table
            .get_mut(infostate)
            .expect("entry was just inserted")
    }

    pub fn find(&self, infostate: &InfoState<O>) -> Option<&ActionPolicy<A>> {
        self.table.get(infostate)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InfoState<O>, &ActionPolicy<A>)> {
        self.table.iter()
    }

    /// The raw table, for hosts that want to serialize or inspect it.
    pub fn table(&self) -> &FxHashMap<InfoState<O>, ActionPolicy<A>> {
        &self.table
    }

    /// Normalize every entry in place. Entries whose weights sum to zero are
    /// left untouched: they belong to infostates that were never reached with
    /// positive probability and carry no distribution to recover.
    pub fn normalize(&mut self) {
        for policy in self.table.values_mut() {
            if policy.sum() > 0.0 {
                policy.normalize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use fosg::Player;

    fn istate(observations: &[&'static str]) -> InfoState<&'static str> {
        let mut istate = InfoState::new(Player::Alex);
        for obs in observations {
            istate.append(*obs, "-");
        }
        istate
    }

    #[test]
    fn test_action_policy_defaults_and_mutation() {
        let mut policy: ActionPolicy<u8> = ActionPolicy::new();
        assert_eq!(policy.at(&3), 0.0);
        assert_eq!(policy[&3], 0.0);
        assert!(policy.is_empty());

        *policy.weight_mut(3) += 1.5;
        assert_eq!(policy.at(&3), 1.5);
        assert_eq!(policy.len(), 1);
        assert!(policy.contains(&3));
        assert!(!policy.contains(&4));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut policy = ActionPolicy::from_weights(
            [(0u8, 1.0), (1, 3.0)].into_iter().collect(),
        );
        policy.normalize();
        assert_relative_eq!(policy.at(&0), 0.25);
        assert_relative_eq!(policy.at(&1), 0.75);

        let once = policy.clone();
        policy.normalize();
        assert_relative_eq!(policy.at(&0), once.at(&0));
        assert_relative_eq!(policy.at(&1), once.at(&1));
        assert_relative_eq!(policy.sum(), 1.0);
    }

    #[test]
    fn test_uniform_construction() {
        let policy = ActionPolicy::uniform(&[0u8, 1, 2, 3]);
        for action in 0..4u8 {
            assert_relative_eq!(policy.at(&action), 0.25);
        }
    }

    #[test]
    fn test_policy_equality_is_elementwise() {
        let a = ActionPolicy::from_weights([(0u8, 0.5), (1, 0.5)].into_iter().collect());
        let b = ActionPolicy::from_actions(&[0u8, 1], 0.5);
        let c = ActionPolicy::from_actions(&[0u8, 1], 0.4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sample_follows_weights() {
        let policy = ActionPolicy::from_weights([(0u8, 0.0), (1, 1.0)].into_iter().collect());
        let mut rng: StdRng = SeedableRng::seed_from_u64(42);
        for _ in 0..20 {
            assert_eq!(policy.sample(&mut rng), Some(1));
        }

        let dead: ActionPolicy<u8> = ActionPolicy::from_actions(&[0, 1], 0.0);
        assert_eq!(dead.sample(&mut rng), None);
    }

    #[test]
    fn test_tabular_uniform_first_visit() {
        let mut policy: TabularPolicy<&'static str, u8, UniformPolicy> =
            TabularPolicy::new(UniformPolicy);
        let key = istate(&["case1"]);
        let actions = [1u8, 2, 3, 4, 5];

        let entry = policy.lookup(&key, &actions);
        for action in &actions {
            assert_relative_eq!(entry.at(action), 0.2);
        }

        // the synthesized entry is stored, not recomputed
        *entry.weight_mut(3) += 5.0;
        assert_relative_eq!(policy.lookup(&key, &actions).at(&3), 5.2);
        assert_eq!(policy.len(), 1);
    }

    #[test]
    fn test_tabular_zero_default_for_averages() {
        let mut avg: TabularPolicy<&'static str, u8, ZeroPolicy> = TabularPolicy::new(ZeroPolicy);
        let key = istate(&["case1"]);
        let entry = avg.lookup(&key, &[1u8, 2, 3]);
        for action in 1..=3u8 {
            assert_eq!(entry.at(&action), 0.0);
        }
    }

    #[test]
    fn test_tabular_normalize_skips_unreached_entries() {
        let mut policy: TabularPolicy<&'static str, u8, ZeroPolicy> = TabularPolicy::new(ZeroPolicy);
        let reached = istate(&["reached"]);
        let unreached = istate(&["unreached"]);

        *policy.lookup(&reached, &[0u8, 1]).weight_mut(0) += 3.0;
        *policy.lookup(&reached, &[0u8, 1]).weight_mut(1) += 1.0;
        policy.lookup(&unreached, &[0u8, 1]);

        policy.normalize();
        assert_relative_eq!(policy.find(&reached).unwrap().at(&0), 0.75);
        assert_relative_eq!(policy.find(&unreached).unwrap().at(&0), 0.0);
    }
}
