//! Evaluation of a policy through the induced interval chain.
//!
//! Fixing the branch probabilities of every policy split turns the
//! binarised model into an interval DTMC: splits get two point-interval
//! edges, uncertain states keep their interval distributions. The
//! chain's reach value is the ground truth the optimisation steers by;
//! the linearised program's value variables are only estimates.

use tracing::debug;

use murina_ir::interval::Interval;
use murina_ir::ipomdp::StateId;
use murina_ir::simple::SimpleIpomdp;
use murina_ir::spec::{SimpleSpec, UncertaintyQuantifier};
use murina_lp::solver::{ConstraintOp, LpError, LpProblem, OptimiseDirection};
use murina_prob::idtmc::Idtmc;
use murina_prob::reach::{self, ReachSettings};

use crate::EngineError;

/// Iteration budget of the chain oracle, as used for probability and
/// reward queries respectively.
pub const PROB_ORACLE_MAX_ITERS: usize = 2000;
pub const REWARD_ORACLE_MAX_ITERS: usize = 5000;

/// One point of the sequential convex programming loop.
#[derive(Debug, Clone)]
pub struct Iterate {
    /// Entries `2s` and `2s + 1` hold the branch probabilities of split
    /// `s`; entry `2s` of an uncertain state is pinned to one.
    pub policy: Vec<f64>,
    /// Oracle value per state under `policy`.
    pub values: Vec<f64>,
    /// For cooperatively quantified uncertain states, the interval
    /// probabilities that explain `values`; used to linearise the
    /// bilinear terms of the next step.
    pub witnesses: Vec<Option<Vec<f64>>>,
}

/// The uniform starting policy: an even coin on every split.
pub fn initial_policy(simple: &SimpleIpomdp) -> Vec<f64> {
    let mut policy = vec![0.0; 2 * simple.num_states()];
    for &state in &simple.uncertain_states {
        policy[2 * state] = 1.0;
    }
    for &state in &simple.action_states {
        policy[2 * state] = 0.5;
        policy[2 * state + 1] = 1.0 - policy[2 * state];
    }
    policy
}

/// Build the chain induced by `policy`.
pub fn induced_chain(simple: &SimpleIpomdp, policy: &[f64]) -> Idtmc {
    let mut chain = Idtmc::new(simple.num_states());
    for &state in &simple.uncertain_states {
        for edge in &simple.transitions[state] {
            chain.set_probability(state, edge.successor, edge.interval);
        }
    }
    for &state in &simple.action_states {
        for k in 0..=1 {
            let successor = simple.transitions[state][k].successor;
            chain.set_probability(state, successor, Interval::point(policy[2 * state + k]));
        }
    }
    chain
}

/// State rewards of the induced chain: split states fold their two edge
/// rewards in, weighted by the policy.
fn induced_state_rewards(simple: &SimpleIpomdp, policy: &[f64]) -> Vec<f64> {
    let mut rewards = simple.state_rewards.clone();
    for &state in &simple.action_states {
        for k in 0..=1 {
            rewards[state] += policy[2 * state + k] * simple.transition_rewards[2 * state + k];
        }
    }
    rewards
}

/// Evaluate `policy` through the chain oracle.
pub fn evaluate_policy(
    simple: &SimpleIpomdp,
    spec: &SimpleSpec,
    policy: &[f64],
) -> Result<Vec<f64>, EngineError> {
    let chain = induced_chain(simple, policy);
    // The chain has no choices left, so only the adversary's direction
    // is still in play.
    let values = if spec.is_reward {
        let rewards = induced_state_rewards(simple, policy);
        reach::compute_reach_rewards(
            &chain,
            &rewards,
            &spec.target,
            spec.uncertainty,
            ReachSettings::with_max_iters(REWARD_ORACLE_MAX_ITERS),
        )?
    } else {
        reach::compute_reach_probs(
            &chain,
            &spec.remain,
            &spec.target,
            spec.uncertainty,
            ReachSettings::with_max_iters(PROB_ORACLE_MAX_ITERS),
        )?
    };
    Ok(values)
}

/// Find interval probabilities under which the oracle's value at
/// `state` satisfies its own Bellman equation.
///
/// The equation is relaxed to a `±epsilon` bracket; on infeasibility
/// the bracket is doubled, which eventually succeeds because a loose
/// enough bracket constrains nothing.
pub fn recover_witness<B: LpProblem>(
    state: StateId,
    values: &[f64],
    simple: &SimpleIpomdp,
) -> Result<Vec<f64>, EngineError> {
    let edges = &simple.transitions[state];
    let expected = values[state] - simple.state_rewards[state];
    let mut epsilon = 1e-3;

    loop {
        let mut problem = B::new(OptimiseDirection::Minimise);
        let vars: Vec<_> = edges
            .iter()
            .map(|edge| problem.add_var(0.0, edge.interval.lo(), edge.interval.hi()))
            .collect();

        let recurrence: Vec<_> = vars
            .iter()
            .zip(edges)
            .map(|(&var, edge)| (var, values[edge.successor]))
            .collect();
        problem.add_constraint(&recurrence, ConstraintOp::GreaterEqual, expected - epsilon);
        problem.add_constraint(&recurrence, ConstraintOp::LessEqual, expected + epsilon);

        let mass: Vec<_> = vars.iter().map(|&var| (var, 1.0)).collect();
        problem.add_constraint(&mass, ConstraintOp::Equal, 1.0);

        match problem.solve() {
            Ok(solution) => {
                return Ok(vars.iter().map(|&var| solution.value(var)).collect());
            }
            Err(LpError::Infeasible) => {
                debug!(state, epsilon, "witness bracket infeasible, doubling");
                epsilon *= 2.0;
            }
            Err(other) => return Err(other.into()),
        }
    }
}

/// Witnesses for every uncertain state the linearisation will need one
/// for: cooperative quantifier, not a target, inside the remain set.
pub fn recover_witnesses<B: LpProblem>(
    simple: &SimpleIpomdp,
    spec: &SimpleSpec,
    values: &[f64],
) -> Result<Vec<Option<Vec<f64>>>, EngineError> {
    let mut witnesses = vec![None; simple.num_states()];
    if spec.quantifier == UncertaintyQuantifier::Forall {
        return Ok(witnesses);
    }
    for &state in &simple.uncertain_states {
        if !spec.is_interior(state) {
            continue;
        }
        witnesses[state] = Some(recover_witness::<B>(state, values, simple)?);
    }
    Ok(witnesses)
}

/// Evaluate the uniform starting policy and recover its witnesses.
pub fn initial_iterate<B: LpProblem>(
    simple: &SimpleIpomdp,
    spec: &SimpleSpec,
) -> Result<Iterate, EngineError> {
    let policy = initial_policy(simple);
    let values = evaluate_policy(simple, spec, &policy)?;
    let witnesses = recover_witnesses::<B>(simple, spec, &values)?;
    Ok(Iterate {
        policy,
        values,
        witnesses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use murina_ir::ipomdp::{Edge, Ipomdp};
    use murina_ir::state_set::StateSet;
    use murina_ir::product::FscProduct;
    use murina_ir::simple::binarise;
    use murina_ir::spec::MinMax;
    use murina_lp::backends::minilp_backend::MinilpProblem;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn prob(lo: f64, hi: f64) -> Interval {
        Interval::probability(lo, hi).unwrap()
    }

    /// Two choices at state 0: go to the target directly, or loop.
    fn simple_model() -> (murina_ir::simple::Binarised, SimpleSpec) {
        let mut m = Ipomdp::new(2, 0);
        m.add_choice(0, vec![Edge::new(1, Interval::point(1.0))])
            .unwrap();
        m.add_choice(0, vec![Edge::new(0, Interval::point(1.0))])
            .unwrap();
        m.add_choice(1, vec![Edge::new(1, Interval::point(1.0))])
            .unwrap();
        let product = FscProduct {
            ipomdp: m,
            rewards: None,
            remain: StateSet::universe(2),
            target: StateSet::from_members(2, [1]),
            initial_state: 0,
            memory: 1,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let binarised = binarise(&product, false, &mut rng);
        let spec = SimpleSpec::new(
            &binarised,
            &product.remain,
            &product.target,
            MinMax::max_max(),
            false,
        );
        (binarised, spec)
    }

    #[test]
    fn test_initial_policy_shape() {
        let (binarised, _) = simple_model();
        let policy = initial_policy(&binarised.simple);
        for &s in &binarised.simple.action_states {
            assert_eq!(policy[2 * s], 0.5);
            assert_eq!(policy[2 * s + 1], 0.5);
        }
        for &s in &binarised.simple.uncertain_states {
            assert_eq!(policy[2 * s], 1.0);
        }
    }

    #[test]
    fn test_dirac_policy_reproduces_deterministic_value() {
        let (binarised, spec) = simple_model();
        let simple = &binarised.simple;
        let root = binarised.gadget[0];
        assert!(simple.is_action_state(root));

        // Committing the split to the "go" leaf reaches the target
        // surely; committing to the "loop" leaf never does.
        for (commit, expected) in [(0, 1.0), (1, 0.0)] {
            let mut policy = initial_policy(simple);
            policy[2 * root] = if commit == 0 { 1.0 } else { 0.0 };
            policy[2 * root + 1] = 1.0 - policy[2 * root];
            let values = evaluate_policy(simple, &spec, &policy).unwrap();
            assert!(
                (values[simple.initial_state] - expected).abs() < 1e-6,
                "commit {commit}: got {}",
                values[simple.initial_state]
            );
        }
    }

    #[test]
    fn test_uniform_policy_value() {
        let (binarised, spec) = simple_model();
        let policy = initial_policy(&binarised.simple);
        let values = evaluate_policy(&binarised.simple, &spec, &policy).unwrap();
        // Half the mass commits to the target each round: reaches it
        // almost surely.
        assert!((values[binarised.simple.initial_state] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_witness_recovery_matches_oracle_value() {
        // One uncertain state with a genuine interval fork.
        let mut m = Ipomdp::new(3, 0);
        m.add_choice(
            0,
            vec![Edge::new(1, prob(0.4, 0.6)), Edge::new(2, prob(0.4, 0.6))],
        )
        .unwrap();
        m.add_choice(1, vec![Edge::new(1, Interval::point(1.0))])
            .unwrap();
        m.add_choice(2, vec![Edge::new(2, Interval::point(1.0))])
            .unwrap();
        let product = FscProduct {
            ipomdp: m,
            rewards: None,
            remain: StateSet::universe(3),
            target: StateSet::from_members(3, [1]),
            initial_state: 0,
            memory: 1,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let binarised = binarise(&product, false, &mut rng);
        let spec = SimpleSpec::new(
            &binarised,
            &product.remain,
            &product.target,
            MinMax::max_max(),
            false,
        );
        let simple = &binarised.simple;

        let iterate = initial_iterate::<MinilpProblem>(simple, &spec).unwrap();
        let state = binarised.gadget[0];
        let witness = iterate.witnesses[state].as_ref().expect("interior state");

        // The witness is a distribution inside the intervals whose
        // expectation reproduces the oracle's value.
        let total: f64 = witness.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        let expectation: f64 = simple.transitions[state]
            .iter()
            .zip(witness)
            .map(|(edge, p)| p * iterate.values[edge.successor])
            .sum();
        assert!((expectation - iterate.values[state]).abs() < 2e-3);

        // Target and non-interior states carry no witness.
        assert!(iterate.witnesses[binarised.gadget[1]].is_none());
    }
}
