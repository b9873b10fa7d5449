//! Binarisation of an interval POMDP.
//!
//! Every state with `n` choices is rewritten into a *gadget*: a chain of
//! `n - 1` binary policy splits ("action states") whose `n` leaves carry
//! the interval distributions of the original choices ("uncertain
//! states"). A state with a single choice collapses to a lone uncertain
//! state. The pass records the mapping from original states to gadget
//! roots, the creation order of the new states, and a relabelling of
//! observations under which two gadgets built from observation-equal
//! originals expose position-wise identical observation sequences. That
//! last property is what lets a policy constraint tie together the
//! branch probabilities of indistinguishable states.

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::interval::Interval;
use crate::ipomdp::{ChoiceId, Edge, MdpRewards, ObservationId, StateId};
use crate::product::FscProduct;
use crate::state_set::StateSet;

/// Role of a state in the binarised model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Two outgoing sentinel edges, resolved by the policy.
    Action,
    /// Outgoing interval distribution, resolved by the adversary.
    Uncertain,
}

/// The binary model produced by [`binarise`].
#[derive(Debug, Clone)]
pub struct SimpleIpomdp {
    /// States whose two outgoing edges are policy-controlled.
    pub action_states: Vec<StateId>,
    /// States whose outgoing edges carry probability intervals.
    pub uncertain_states: Vec<StateId>,
    /// Outgoing edges per state; action states have exactly two.
    pub transitions: Vec<Vec<Edge>>,
    pub observations: Vec<ObservationId>,
    /// Per-state reward; zero everywhere for probability queries.
    pub state_rewards: Vec<f64>,
    /// Reward of edge `k` of action state `s` at index `2 * s + k`.
    pub transition_rewards: Vec<f64>,
    pub initial_state: StateId,
    kind: Vec<StateKind>,
}

impl SimpleIpomdp {
    #[inline]
    pub fn num_states(&self) -> usize {
        self.transitions.len()
    }

    #[inline]
    pub fn kind(&self, state: StateId) -> StateKind {
        self.kind[state]
    }

    #[inline]
    pub fn is_action_state(&self, state: StateId) -> bool {
        self.kind[state] == StateKind::Action
    }
}

/// Output of the binarisation pass: the simple model plus the bookkeeping
/// needed to carry a query across the transformation.
#[derive(Debug, Clone)]
pub struct Binarised {
    pub simple: SimpleIpomdp,
    /// Maps each original state to its gadget root.
    pub gadget: Vec<StateId>,
    /// Simple states in order of creation.
    pub traversal: Vec<StateId>,
    /// The choice permutation each original state was expanded with.
    pub choice_order: Vec<Vec<ChoiceId>>,
}

impl Binarised {
    /// Lift a target set: the gadget root stands in for the original.
    pub fn lift_target(&self, target: &StateSet) -> StateSet {
        let mut lifted = StateSet::new(self.simple.num_states());
        for state in target.iter() {
            lifted.insert(self.gadget[state]);
        }
        lifted
    }

    /// Lift a remain set.
    ///
    /// Only gadget roots of states *outside* `remain` are excluded; the
    /// interior of every gadget stays allowed, otherwise the split of one
    /// original state would forbid its own machinery. The complement is
    /// taken over the full universe on both sides.
    pub fn lift_remain(&self, remain: &StateSet) -> StateSet {
        let bad = remain.complement();
        let mut lifted_bad = StateSet::new(self.simple.num_states());
        for state in bad.iter() {
            lifted_bad.insert(self.gadget[state]);
        }
        lifted_bad.complement()
    }
}

/// Rewrite the product model into its binary form.
///
/// Each observation fixes one permutation of its choice list the first
/// time a state with that observation is expanded (shuffled when
/// `shuffle` is set); every later state with the same observation reuses
/// it, which keeps observation-equal gadgets isomorphic.
pub fn binarise<R: Rng>(product: &FscProduct, shuffle: bool, rng: &mut R) -> Binarised {
    let ipomdp = &product.ipomdp;
    let num_states = ipomdp.num_states();

    let total: usize = (0..num_states)
        .map(|s| 2 * ipomdp.num_choices(s) - 1)
        .sum();

    let mut gadget: Vec<Option<StateId>> = vec![None; num_states];
    let mut traversal: Vec<StateId> = Vec::with_capacity(total);
    let mut action_states: Vec<StateId> = Vec::new();
    let mut uncertain_states: Vec<StateId> = Vec::new();
    let mut transitions: Vec<Vec<Edge>> = vec![Vec::new(); total];
    let mut choice_order: Vec<Vec<ChoiceId>> = vec![Vec::new(); num_states];
    let mut order_for_observation: IndexMap<ObservationId, Vec<ChoiceId>> = IndexMap::new();

    // Number of simple-state ids handed out so far, including roots
    // reserved ahead of time for successors of earlier gadgets.
    let mut next_state: usize = 0;

    for state in 0..num_states {
        if gadget[state].is_none() {
            gadget[state] = Some(next_state);
            next_state += 1;
        }
        let root = gadget[state].unwrap_or_default();
        let num_choices = ipomdp.num_choices(state);

        // Chain of binary splits: each one branches to the next split and
        // to one leaf of the remaining subtree.
        for position in 0..num_choices.saturating_sub(1) {
            let current = if position == 0 {
                root
            } else {
                let id = next_state;
                next_state += 1;
                id
            };
            traversal.push(current);
            action_states.push(current);
            transitions[current] = vec![
                Edge::new(next_state, Interval::policy_sentinel()),
                Edge::new(next_state - 1 + num_choices, Interval::policy_sentinel()),
            ];
        }

        let order = order_for_observation
            .entry(ipomdp.observation(state))
            .or_insert_with(|| {
                let mut order: Vec<ChoiceId> = (0..num_choices).collect();
                if shuffle {
                    order.shuffle(rng);
                }
                order
            })
            .clone();
        choice_order[state] = order.clone();

        // Ids past the current gadget's block, reserved for gadget roots
        // of successors seen for the first time.
        let mut next_future = if num_choices == 1 {
            next_state
        } else {
            next_state + num_choices
        };

        for choice in 0..num_choices {
            let current = if num_choices == 1 {
                root
            } else {
                let id = next_state;
                next_state += 1;
                id
            };
            traversal.push(current);
            uncertain_states.push(current);

            let mut edges = Vec::new();
            for edge in ipomdp.edges(state, order[choice]) {
                let successor_root = match gadget[edge.successor] {
                    Some(id) => id,
                    None => {
                        let id = next_future;
                        next_future += 1;
                        gadget[edge.successor] = Some(id);
                        id
                    }
                };
                edges.push(Edge::new(successor_root, edge.interval));
            }
            transitions[current] = edges;
        }

        next_state = next_future;
    }

    let gadget: Vec<StateId> = gadget.into_iter().map(Option::unwrap_or_default).collect();

    let observations = relabel_observations(ipomdp, &gadget, &traversal, total);
    let (state_rewards, transition_rewards) = attach_rewards(
        product,
        &gadget,
        &choice_order,
        &transitions,
        total,
    );

    let mut kind = vec![StateKind::Uncertain; total];
    for &state in &action_states {
        kind[state] = StateKind::Action;
    }

    let simple = SimpleIpomdp {
        action_states,
        uncertain_states,
        transitions,
        observations,
        state_rewards,
        transition_rewards,
        initial_state: gadget[product.initial_state],
        kind,
    };

    Binarised {
        simple,
        gadget,
        traversal,
        choice_order,
    }
}

/// Assign observations along the traversal order.
///
/// A gadget root takes a fresh label the first time its original
/// observation shows up and reuses that label afterwards; the states
/// following it in traversal order count upwards from the root's label.
/// Isomorphic gadgets therefore repeat the exact same label sequence.
fn relabel_observations(
    ipomdp: &crate::ipomdp::Ipomdp,
    gadget: &[StateId],
    traversal: &[StateId],
    total: usize,
) -> Vec<ObservationId> {
    let mut gadget_inv: Vec<Option<StateId>> = vec![None; total];
    for (original, &root) in gadget.iter().enumerate() {
        gadget_inv[root] = Some(original);
    }

    let max_observation = (0..ipomdp.num_states())
        .map(|s| ipomdp.observation(s))
        .max()
        .unwrap_or(0);
    let mut fresh: Vec<Option<ObservationId>> = vec![None; max_observation + 1];

    let mut observations = vec![0; total];
    // First label not yet taken by any root or interior state.
    let mut next_fresh: ObservationId = 0;
    let mut index_observation: ObservationId = 0;

    for &state in traversal {
        match gadget_inv[state] {
            None => {
                next_fresh = next_fresh.max(index_observation + 1);
                observations[state] = index_observation;
                index_observation += 1;
            }
            Some(original) => {
                let original_observation = ipomdp.observation(original);
                let base = match fresh[original_observation] {
                    Some(base) => base,
                    None => {
                        let base = next_fresh;
                        next_fresh += 1;
                        fresh[original_observation] = Some(base);
                        base
                    }
                };
                index_observation = base;
                observations[state] = index_observation;
                index_observation += 1;
            }
        }
    }

    observations
}

/// Place the original rewards onto the gadget.
///
/// State rewards land on the gadget root. The transition reward of the
/// choice at position `i` of the permutation attaches to the edge of the
/// split that commits to that choice: the right edge of each interior
/// split, and both edges of the deepest one. Single-choice gadgets fold
/// their only transition reward into the state reward.
fn attach_rewards(
    product: &FscProduct,
    gadget: &[StateId],
    choice_order: &[Vec<ChoiceId>],
    transitions: &[Vec<Edge>],
    total: usize,
) -> (Vec<f64>, Vec<f64>) {
    let mut state_rewards = vec![0.0; total];
    let mut transition_rewards = vec![0.0; 2 * total];

    let Some(rewards) = product.rewards.as_ref() else {
        return (state_rewards, transition_rewards);
    };

    let ipomdp = &product.ipomdp;
    for state in 0..ipomdp.num_states() {
        state_rewards[gadget[state]] = rewards.state_reward(state);
    }

    for state in 0..ipomdp.num_states() {
        let num_choices = ipomdp.num_choices(state);
        let order = &choice_order[state];
        if num_choices == 1 {
            state_rewards[gadget[state]] += rewards.transition_reward(state, order[0]);
        } else {
            let mut current = gadget[state];
            for position in 0..num_choices.saturating_sub(2) {
                transition_rewards[2 * current + 1] =
                    rewards.transition_reward(state, order[position + 1]);
                current = transitions[current][0].successor;
            }
            transition_rewards[2 * current] = rewards.transition_reward(state, order[0]);
            transition_rewards[2 * current + 1] =
                rewards.transition_reward(state, order[num_choices - 1]);
        }
    }

    (state_rewards, transition_rewards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipomdp::Ipomdp;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn prob(lo: f64, hi: f64) -> Interval {
        Interval::probability(lo, hi).unwrap()
    }

    /// State 0 has three choices over {0, 1, 2}; states 1 and 2 loop.
    fn three_choice_product(rewards: Option<MdpRewards>) -> FscProduct {
        let mut m = Ipomdp::new(3, 0);
        m.add_choice(
            0,
            vec![Edge::new(1, prob(0.4, 0.6)), Edge::new(0, prob(0.4, 0.6))],
        )
        .unwrap();
        m.add_choice(
            0,
            vec![Edge::new(1, prob(0.3, 0.7)), Edge::new(2, prob(0.3, 0.7))],
        )
        .unwrap();
        m.add_choice(
            0,
            vec![Edge::new(2, prob(0.2, 0.8)), Edge::new(0, prob(0.2, 0.8))],
        )
        .unwrap();
        m.add_choice(1, vec![Edge::new(1, Interval::point(1.0))])
            .unwrap();
        m.add_choice(2, vec![Edge::new(2, Interval::point(1.0))])
            .unwrap();
        FscProduct {
            ipomdp: m,
            rewards,
            remain: StateSet::universe(3),
            target: StateSet::from_members(3, [1]),
            initial_state: 0,
            memory: 1,
        }
    }

    #[test]
    fn test_state_count_formula() {
        let product = three_choice_product(None);
        let mut rng = StdRng::seed_from_u64(0);
        let binarised = binarise(&product, false, &mut rng);
        // (2*3 - 1) + 1 + 1
        assert_eq!(binarised.simple.num_states(), 7);
        assert_eq!(binarised.traversal.len(), 7);
        assert_eq!(binarised.simple.action_states, vec![0, 1]);
        assert_eq!(binarised.simple.uncertain_states, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_gadget_tree_shape() {
        let product = three_choice_product(None);
        let mut rng = StdRng::seed_from_u64(0);
        let binarised = binarise(&product, false, &mut rng);
        let simple = &binarised.simple;

        // Root split branches to the second split and to the middle leaf.
        let root_edges = &simple.transitions[0];
        assert_eq!(root_edges.len(), 2);
        assert_eq!(root_edges[0].successor, 1);
        assert_eq!(root_edges[1].successor, 3);
        assert!(!root_edges[0].interval.is_point());

        let second_edges = &simple.transitions[1];
        assert_eq!(second_edges[0].successor, 2);
        assert_eq!(second_edges[1].successor, 4);

        // Leaves carry the original distributions, rerouted to gadget roots.
        assert_eq!(binarised.gadget, vec![0, 5, 6]);
        let leaf_choice0 = &simple.transitions[2];
        assert_eq!(leaf_choice0[0].successor, 5);
        assert_eq!(leaf_choice0[0].interval, prob(0.4, 0.6));
        assert_eq!(leaf_choice0[1].successor, 0);

        // Single-choice gadgets collapse to their root.
        assert_eq!(simple.transitions[5].len(), 1);
        assert_eq!(simple.transitions[5][0].successor, 5);
    }

    #[test]
    fn test_binary_model_keeps_state_count() {
        // Every state has at most two choices: binarisation adds nothing
        // beyond one extra split per two-choice state.
        let mut m = Ipomdp::new(2, 0);
        m.add_choice(0, vec![Edge::new(1, Interval::point(1.0))])
            .unwrap();
        m.add_choice(1, vec![Edge::new(1, Interval::point(1.0))])
            .unwrap();
        let product = FscProduct {
            ipomdp: m,
            rewards: None,
            remain: StateSet::universe(2),
            target: StateSet::new(2),
            initial_state: 0,
            memory: 1,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let binarised = binarise(&product, false, &mut rng);
        assert_eq!(binarised.simple.num_states(), 2);
        assert!(binarised.simple.action_states.is_empty());
    }

    #[test]
    fn test_observation_sequences_match_for_equal_observations() {
        // Two states with the same observation and the same choice shape
        // must produce gadgets with identical observation sequences.
        let mut m = Ipomdp::new(4, 0);
        for state in [0, 1] {
            m.add_choice(state, vec![Edge::new(2, Interval::point(1.0))])
                .unwrap();
            m.add_choice(state, vec![Edge::new(3, Interval::point(1.0))])
                .unwrap();
            m.set_observation(state, 9);
        }
        m.add_choice(2, vec![Edge::new(2, Interval::point(1.0))])
            .unwrap();
        m.add_choice(3, vec![Edge::new(3, Interval::point(1.0))])
            .unwrap();
        m.set_observation(2, 1);
        m.set_observation(3, 2);
        m.validate().unwrap();

        let product = FscProduct {
            ipomdp: m,
            rewards: None,
            remain: StateSet::universe(4),
            target: StateSet::new(4),
            initial_state: 0,
            memory: 1,
        };
        let mut rng = StdRng::seed_from_u64(11);
        let binarised = binarise(&product, true, &mut rng);
        let simple = &binarised.simple;

        let sequence = |root: StateId| -> Vec<ObservationId> {
            // Gadget of a two-choice state: the split plus two leaves,
            // contiguous in creation order starting at the root.
            (root..root + 3).map(|s| simple.observations[s]).collect()
        };
        assert_eq!(
            sequence(binarised.gadget[0]),
            sequence(binarised.gadget[1])
        );
        // And the shared permutation makes the gadgets isomorphic.
        assert_eq!(binarised.choice_order[0], binarised.choice_order[1]);
    }

    #[test]
    fn test_transition_reward_attachment() {
        let mut rewards = MdpRewards::new(3);
        rewards.set_state_reward(0, 7.0);
        rewards.set_transition_reward(0, 0, 10.0);
        rewards.set_transition_reward(0, 1, 20.0);
        rewards.set_transition_reward(0, 2, 30.0);
        rewards.set_transition_reward(1, 0, 4.0);

        let product = three_choice_product(Some(rewards));
        let mut rng = StdRng::seed_from_u64(0);
        let binarised = binarise(&product, false, &mut rng);
        let simple = &binarised.simple;

        assert_eq!(simple.state_rewards[0], 7.0);
        // Single-choice gadget folds its transition reward into the state.
        assert_eq!(simple.state_rewards[5], 4.0);

        // Identity permutation: root's right edge commits to choice 1,
        // the deepest split's edges to choices 0 and 2.
        assert_eq!(simple.transition_rewards[2 * 0 + 1], 20.0);
        assert_eq!(simple.transition_rewards[2 * 1], 10.0);
        assert_eq!(simple.transition_rewards[2 * 1 + 1], 30.0);
    }

    #[test]
    fn test_shuffle_is_deterministic_per_seed() {
        let product = three_choice_product(None);
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a = binarise(&product, true, &mut rng_a);
        let b = binarise(&product, true, &mut rng_b);
        assert_eq!(a.choice_order, b.choice_order);
        for (x, y) in a.simple.transitions.iter().zip(&b.simple.transitions) {
            assert_eq!(x.len(), y.len());
        }
    }

    #[test]
    fn test_lift_target_and_remain() {
        let product = three_choice_product(None);
        let mut rng = StdRng::seed_from_u64(0);
        let binarised = binarise(&product, false, &mut rng);

        let target = binarised.lift_target(&product.target);
        assert!(target.contains(binarised.gadget[1]));
        assert_eq!(target.count(), 1);

        // State 2 is bad: only its gadget root leaves the remain set.
        let remain = StateSet::from_members(3, [0, 1]);
        let lifted = binarised.lift_remain(&remain);
        assert!(!lifted.contains(binarised.gadget[2]));
        for state in 0..binarised.simple.num_states() {
            if state != binarised.gadget[2] {
                assert!(lifted.contains(state), "state {state} should remain");
            }
        }
    }
}
