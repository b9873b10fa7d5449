//! Value iteration against the interval adversary.

use thiserror::Error;
use tracing::debug;

use murina_ir::ipomdp::Edge;
use murina_ir::spec::Direction;
use murina_ir::state_set::StateSet;

use crate::idtmc::Idtmc;

#[derive(Debug, Error)]
pub enum ReachError {
    #[error("Set universe ({set}) does not match the chain ({chain} states)")]
    DimensionMismatch { set: usize, chain: usize },
    #[error("Reward vector length {rewards} does not match the chain ({chain} states)")]
    RewardDimensionMismatch { rewards: usize, chain: usize },
}

/// Iteration budget and convergence tolerance of one computation.
#[derive(Debug, Clone, Copy)]
pub struct ReachSettings {
    pub max_iters: usize,
    pub tolerance: f64,
}

impl Default for ReachSettings {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            tolerance: 1e-6,
        }
    }
}

impl ReachSettings {
    pub fn with_max_iters(max_iters: usize) -> Self {
        Self {
            max_iters,
            ..Self::default()
        }
    }
}

/// Probability of reaching `target` while staying in `remain`, per
/// state, with intervals resolved in the `adversary` direction.
///
/// States outside both sets are treated as losing. Non-convergence
/// within the budget returns the current iterate.
pub fn compute_reach_probs(
    chain: &Idtmc,
    remain: &StateSet,
    target: &StateSet,
    adversary: Direction,
    settings: ReachSettings,
) -> Result<Vec<f64>, ReachError> {
    let n = chain.num_states();
    check_universe(remain, n)?;
    check_universe(target, n)?;

    let mut values = vec![0.0; n];
    for state in target.iter() {
        values[state] = 1.0;
    }

    let mut converged = false;
    for iteration in 0..settings.max_iters {
        let mut delta: f64 = 0.0;
        for state in 0..n {
            if target.contains(state) || !remain.contains(state) {
                continue;
            }
            // Gauss-Seidel: the update lands immediately, so later states
            // in the same sweep already see it.
            let updated = resolve_row(chain.edges(state), &values, adversary).clamp(0.0, 1.0);
            delta = delta.max((updated - values[state]).abs());
            values[state] = updated;
        }
        if delta < settings.tolerance {
            debug!(iteration, "reachability value iteration converged");
            converged = true;
            break;
        }
    }
    if !converged {
        debug!(
            max_iters = settings.max_iters,
            "reachability value iteration hit its budget; returning current iterate"
        );
    }

    Ok(values)
}

/// Expected cumulated state reward until `target`, with intervals
/// resolved in the `adversary` direction.
///
/// If the target is not reached almost surely the iteration grows until
/// the budget runs out; whatever iterate is current is returned.
pub fn compute_reach_rewards(
    chain: &Idtmc,
    state_rewards: &[f64],
    target: &StateSet,
    adversary: Direction,
    settings: ReachSettings,
) -> Result<Vec<f64>, ReachError> {
    let n = chain.num_states();
    check_universe(target, n)?;
    if state_rewards.len() != n {
        return Err(ReachError::RewardDimensionMismatch {
            rewards: state_rewards.len(),
            chain: n,
        });
    }

    let mut values = vec![0.0; n];
    let mut converged = false;
    for iteration in 0..settings.max_iters {
        let mut delta: f64 = 0.0;
        for state in 0..n {
            if target.contains(state) {
                continue;
            }
            let updated =
                state_rewards[state] + resolve_row(chain.edges(state), &values, adversary);
            delta = delta.max((updated - values[state]).abs());
            values[state] = updated;
        }
        if delta < settings.tolerance {
            debug!(iteration, "reward value iteration converged");
            converged = true;
            break;
        }
    }
    if !converged {
        debug!(
            max_iters = settings.max_iters,
            "reward value iteration hit its budget; returning current iterate"
        );
    }

    Ok(values)
}

fn check_universe(set: &StateSet, chain: usize) -> Result<(), ReachError> {
    if set.universe_len() != chain {
        return Err(ReachError::DimensionMismatch {
            set: set.universe_len(),
            chain,
        });
    }
    Ok(())
}

/// Expected successor value of one interval distribution, resolved to
/// the extreme point of the interval polytope in the given direction.
///
/// Every edge starts at its lower bound; the remaining mass is poured
/// onto successors in value order (best first for `Maximise`, worst
/// first for `Minimise`), each up to its upper bound.
fn resolve_row(edges: &[Edge], values: &[f64], adversary: Direction) -> f64 {
    if edges.is_empty() {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..edges.len()).collect();
    match adversary {
        Direction::Maximise => order.sort_by(|&a, &b| {
            values[edges[b].successor].total_cmp(&values[edges[a].successor])
        }),
        Direction::Minimise => order.sort_by(|&a, &b| {
            values[edges[a].successor].total_cmp(&values[edges[b].successor])
        }),
    }

    let mut probabilities: Vec<f64> = edges.iter().map(|e| e.interval.lo()).collect();
    let mut budget = 1.0 - probabilities.iter().sum::<f64>();
    for &index in &order {
        if budget <= 0.0 {
            break;
        }
        let slack = edges[index].interval.width().min(budget);
        probabilities[index] += slack;
        budget -= slack;
    }

    edges
        .iter()
        .zip(&probabilities)
        .map(|(edge, p)| p * values[edge.successor])
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use murina_ir::interval::Interval;

    fn prob(lo: f64, hi: f64) -> Interval {
        Interval::probability(lo, hi).unwrap()
    }

    /// 0 -> {1 target, 2 sink} with interval mass [0.4, 0.6] each way.
    fn fork() -> Idtmc {
        let mut chain = Idtmc::new(3);
        chain.set_probability(0, 1, prob(0.4, 0.6));
        chain.set_probability(0, 2, prob(0.4, 0.6));
        chain.set_probability(1, 1, Interval::point(1.0));
        chain.set_probability(2, 2, Interval::point(1.0));
        chain
    }

    #[test]
    fn test_point_interval_chain() {
        let mut chain = Idtmc::new(3);
        chain.set_probability(0, 1, Interval::point(0.5));
        chain.set_probability(0, 2, Interval::point(0.5));
        chain.set_probability(1, 1, Interval::point(1.0));
        chain.set_probability(2, 2, Interval::point(1.0));

        let remain = StateSet::universe(3);
        let target = StateSet::from_members(3, [1]);
        let values = compute_reach_probs(
            &chain,
            &remain,
            &target,
            Direction::Maximise,
            ReachSettings::default(),
        )
        .unwrap();
        assert!((values[0] - 0.5).abs() < 1e-6);
        assert_eq!(values[1], 1.0);
        assert_eq!(values[2], 0.0);
    }

    #[test]
    fn test_adversary_picks_interval_extremes() {
        let chain = fork();
        let remain = StateSet::universe(3);
        let target = StateSet::from_members(3, [1]);

        let max = compute_reach_probs(
            &chain,
            &remain,
            &target,
            Direction::Maximise,
            ReachSettings::default(),
        )
        .unwrap();
        assert!((max[0] - 0.6).abs() < 1e-6);

        let min = compute_reach_probs(
            &chain,
            &remain,
            &target,
            Direction::Minimise,
            ReachSettings::default(),
        )
        .unwrap();
        assert!((min[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_unreachable_target_is_zero() {
        let mut chain = Idtmc::new(2);
        chain.set_probability(0, 0, Interval::point(1.0));
        chain.set_probability(1, 1, Interval::point(1.0));

        let remain = StateSet::universe(2);
        let target = StateSet::from_members(2, [1]);
        let values = compute_reach_probs(
            &chain,
            &remain,
            &target,
            Direction::Maximise,
            ReachSettings::default(),
        )
        .unwrap();
        assert_eq!(values[0], 0.0);
    }

    #[test]
    fn test_remain_constrains_the_path() {
        // 0 -> 1 -> 2 (target), but 1 is outside remain.
        let mut chain = Idtmc::new(3);
        chain.set_probability(0, 1, Interval::point(1.0));
        chain.set_probability(1, 2, Interval::point(1.0));
        chain.set_probability(2, 2, Interval::point(1.0));

        let remain = StateSet::from_members(3, [0]);
        let target = StateSet::from_members(3, [2]);
        let values = compute_reach_probs(
            &chain,
            &remain,
            &target,
            Direction::Maximise,
            ReachSettings::default(),
        )
        .unwrap();
        assert_eq!(values[0], 0.0);
        assert_eq!(values[1], 0.0);
        assert_eq!(values[2], 1.0);
    }

    #[test]
    fn test_expected_reward_geometric_loop() {
        // Stay at 0 with probability in [0.3, 0.5], else hit the target.
        // Reward 1 per visit of 0: worst case expects 1 / (1 - 0.5).
        let mut chain = Idtmc::new(2);
        chain.set_probability(0, 0, prob(0.3, 0.5));
        chain.set_probability(0, 1, prob(0.5, 0.7));
        chain.set_probability(1, 1, Interval::point(1.0));

        let target = StateSet::from_members(2, [1]);
        let rewards = vec![1.0, 0.0];
        let values = compute_reach_rewards(
            &chain,
            &rewards,
            &target,
            Direction::Maximise,
            ReachSettings::with_max_iters(5000),
        )
        .unwrap();
        assert!((values[0] - 2.0).abs() < 1e-4);

        let values = compute_reach_rewards(
            &chain,
            &rewards,
            &target,
            Direction::Minimise,
            ReachSettings::with_max_iters(5000),
        )
        .unwrap();
        assert!((values[0] - 1.0 / 0.7).abs() < 1e-4);
    }

    #[test]
    fn test_budget_exhaustion_returns_iterate() {
        // Reward 1 forever, target unreachable: no convergence, but the
        // call still returns a finite iterate.
        let mut chain = Idtmc::new(2);
        chain.set_probability(0, 0, Interval::point(1.0));
        chain.set_probability(1, 1, Interval::point(1.0));

        let target = StateSet::from_members(2, [1]);
        let rewards = vec![1.0, 0.0];
        let values = compute_reach_rewards(
            &chain,
            &rewards,
            &target,
            Direction::Maximise,
            ReachSettings::with_max_iters(50),
        )
        .unwrap();
        assert!(values[0].is_finite());
        assert!(values[0] >= 49.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let chain = fork();
        let remain = StateSet::universe(2);
        let target = StateSet::from_members(3, [1]);
        assert!(matches!(
            compute_reach_probs(
                &chain,
                &remain,
                &target,
                Direction::Maximise,
                ReachSettings::default(),
            ),
            Err(ReachError::DimensionMismatch { .. })
        ));
    }
}
