//! Product of an interval POMDP with a finite-state controller.
//!
//! The controller contributes a memory register with `k` states. A
//! product choice pairs a model action with the next memory value: choice
//! `a * k + m'` plays action `a` and moves the register to `m'`,
//! regardless of the current memory. Observations become
//! `obs(s) * k + m`, so the controller may condition on its own memory.

use crate::ipomdp::{Edge, Ipomdp, MdpRewards, ModelError, StateId};
use crate::state_set::StateSet;

/// The product model together with the lifted query ingredients.
#[derive(Debug, Clone)]
pub struct FscProduct {
    pub ipomdp: Ipomdp,
    /// `None` when the caller asked for pure reaching probabilities.
    pub rewards: Option<MdpRewards>,
    pub remain: StateSet,
    pub target: StateSet,
    pub initial_state: StateId,
    pub memory: usize,
}

impl FscProduct {
    /// Build the product of `ipomdp` with a `memory`-state controller.
    ///
    /// `remain` and `target` are lifted pointwise over the memory
    /// dimension; rewards live on the model dimension only.
    pub fn build(
        ipomdp: &Ipomdp,
        rewards: Option<&MdpRewards>,
        remain: &StateSet,
        target: &StateSet,
        memory: usize,
    ) -> Result<Self, ModelError> {
        let num_states = ipomdp.num_states();
        let num_product_states = num_states * memory;

        let mut product = Ipomdp::new(num_product_states, ipomdp.first_initial_state() * memory);
        let mut product_rewards = rewards.map(|_| MdpRewards::new(num_product_states));
        let mut product_remain = StateSet::new(num_product_states);
        let mut product_target = StateSet::new(num_product_states);

        for state in 0..num_states {
            for mem in 0..memory {
                let product_state = state * memory + mem;

                if remain.contains(state) {
                    product_remain.insert(product_state);
                }
                if target.contains(state) {
                    product_target.insert(product_state);
                }

                if let (Some(out), Some(src)) = (product_rewards.as_mut(), rewards) {
                    out.set_state_reward(product_state, src.state_reward(state));
                }

                for action in 0..ipomdp.num_choices(state) {
                    for next_mem in 0..memory {
                        // The choice decides the next memory value on its own.
                        let edges: Vec<Edge> = ipomdp
                            .edges(state, action)
                            .iter()
                            .map(|e| Edge::new(e.successor * memory + next_mem, e.interval))
                            .collect();
                        let product_choice = product.add_choice(product_state, edges)?;
                        debug_assert_eq!(product_choice, action * memory + next_mem);

                        if let (Some(out), Some(src)) = (product_rewards.as_mut(), rewards) {
                            out.add_to_transition_reward(
                                product_state,
                                product_choice,
                                src.transition_reward(state, action),
                            );
                        }
                    }
                }
            }
        }

        // Observations are assigned only after every transition exists, so
        // that observation-equal product states share their action sets.
        for state in 0..num_states {
            for mem in 0..memory {
                product.set_observation(
                    state * memory + mem,
                    ipomdp.observation(state) * memory + mem,
                );
            }
        }

        Ok(Self {
            ipomdp: product,
            rewards: product_rewards,
            remain: product_remain,
            target: product_target,
            initial_state: ipomdp.first_initial_state() * memory,
            memory,
        })
    }
}
