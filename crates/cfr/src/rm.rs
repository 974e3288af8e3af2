use std::hash::Hash;

use rustc_hash::FxHashMap;

use fosg::Player;

use crate::error::CfrError;
use crate::policy::ActionPolicy;

/// Overwrite `policy` with the regret-matched distribution of
/// `cumulative_regret`: positive parts renormalized, or uniform when no
/// regret is positive.
///
/// The operator is pure with respect to the prior policy values; it only
/// requires both tables to agree on their action keys.
pub fn regret_matching<A: Clone + Eq + Hash>(
    policy: &mut ActionPolicy<A>,
    cumulative_regret: &FxHashMap<A, f64>,
) -> Result<(), CfrError> {
    if policy.len() != cumulative_regret.len()
        || !cumulative_regret.keys().all(|a| policy.contains(a))
    {
        return Err(CfrError::InconsistentKeys);
    }

    let positive_sum: f64 = cumulative_regret.values().map(|r| r.max(0.0)).sum();
    if positive_sum > 0.0 {
        for (action, regret) in cumulative_regret {
            *policy.weight_mut(action.clone()) = regret.max(0.0) / positive_sum;
        }
    } else {
        let uniform = 1.0 / cumulative_regret.len() as f64;
        for action in cumulative_regret.keys() {
            *policy.weight_mut(action.clone()) = uniform;
        }
    }
    Ok(())
}

/// Product of every player's compounded contribution: the probability of
/// reaching the node under the current profile, chance included.
pub fn reach_probability(contributions: &FxHashMap<Player, f64>) -> f64 {
    contributions.values().product()
}

/// The same product with `player`'s own contribution factored out.
pub fn cf_reach_probability(contributions: &FxHashMap<Player, f64>, player: Player) -> f64 {
    contributions
        .iter()
        .filter(|&(&p, _)| p != player)
        .map(|(_, contribution)| contribution)
        .product()
}
