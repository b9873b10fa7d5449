//! The interval POMDP model.
//!
//! States carry an ordered list of choices; each choice is a distribution
//! whose edge probabilities are only known to lie in closed intervals.
//! States additionally carry an observation label: a controller cannot
//! distinguish two states with the same observation, and such states are
//! required to offer the same number of choices.

use serde::Serialize;
use thiserror::Error;

use crate::interval::{Interval, IntervalError};

/// Index of a state in a model.
pub type StateId = usize;
/// Index of a choice within a state.
pub type ChoiceId = usize;
/// Observation label.
pub type ObservationId = usize;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Interval error: {0}")]
    Interval(#[from] IntervalError),
    #[error("State index {state} out of range (model has {num_states} states)")]
    StateOutOfRange { state: StateId, num_states: usize },
    #[error("Choice for state {state} has no edges")]
    EmptyChoice { state: StateId },
    #[error(
        "Choice {choice} of state {state} admits no distribution: \
         lower bounds sum to {lower_sum}, upper bounds to {upper_sum}"
    )]
    InfeasibleChoice {
        state: StateId,
        choice: ChoiceId,
        lower_sum: f64,
        upper_sum: f64,
    },
    #[error("State {state} has no choices")]
    NoChoices { state: StateId },
    #[error(
        "States {first} and {second} share observation {observation} \
         but offer {first_choices} vs {second_choices} choices"
    )]
    ObservationChoiceMismatch {
        first: StateId,
        second: StateId,
        observation: ObservationId,
        first_choices: usize,
        second_choices: usize,
    },
}

/// One outgoing edge of a choice: a successor with its probability interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub successor: StateId,
    pub interval: Interval,
}

impl Edge {
    pub fn new(successor: StateId, interval: Interval) -> Self {
        Self {
            successor,
            interval,
        }
    }
}

/// An interval POMDP.
#[derive(Debug, Clone)]
pub struct Ipomdp {
    /// `choices[s][a]` is the edge list of choice `a` in state `s`.
    choices: Vec<Vec<Vec<Edge>>>,
    observations: Vec<ObservationId>,
    initial_state: StateId,
}

impl Ipomdp {
    /// A model with `num_states` states, no choices yet, every state
    /// observing its own index (fully observable until relabelled).
    pub fn new(num_states: usize, initial_state: StateId) -> Self {
        Self {
            choices: vec![Vec::new(); num_states],
            observations: (0..num_states).collect(),
            initial_state,
        }
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        self.choices.len()
    }

    #[inline]
    pub fn first_initial_state(&self) -> StateId {
        self.initial_state
    }

    #[inline]
    pub fn num_choices(&self, state: StateId) -> usize {
        self.choices[state].len()
    }

    #[inline]
    pub fn edges(&self, state: StateId, choice: ChoiceId) -> &[Edge] {
        &self.choices[state][choice]
    }

    #[inline]
    pub fn observation(&self, state: StateId) -> ObservationId {
        self.observations[state]
    }

    pub fn set_observation(&mut self, state: StateId, observation: ObservationId) {
        self.observations[state] = observation;
    }

    /// Append a choice to `state`, validating that the intervals admit at
    /// least one probability distribution. Edges naming the same
    /// successor twice are merged by summing their endpoints.
    pub fn add_choice(&mut self, state: StateId, edges: Vec<Edge>) -> Result<ChoiceId, ModelError> {
        let num_states = self.num_states();
        if state >= num_states {
            return Err(ModelError::StateOutOfRange { state, num_states });
        }
        if edges.is_empty() {
            return Err(ModelError::EmptyChoice { state });
        }
        let mut merged: Vec<Edge> = Vec::with_capacity(edges.len());
        for edge in edges {
            if edge.successor >= num_states {
                return Err(ModelError::StateOutOfRange {
                    state: edge.successor,
                    num_states,
                });
            }
            match merged.iter_mut().find(|e| e.successor == edge.successor) {
                Some(existing) => {
                    existing.interval = Interval::probability(
                        existing.interval.lo() + edge.interval.lo(),
                        existing.interval.hi() + edge.interval.hi(),
                    )?;
                }
                None => merged.push(edge),
            }
        }
        let edges = merged;
        for edge in &edges {
            // Re-validate as probability intervals; edges may have been
            // built from raw `Interval::new` values.
            Interval::probability(edge.interval.lo(), edge.interval.hi())?;
        }
        let lower_sum: f64 = edges.iter().map(|e| e.interval.lo()).sum();
        let upper_sum: f64 = edges.iter().map(|e| e.interval.hi()).sum();
        if lower_sum > 1.0 + 1e-12 || upper_sum < 1.0 - 1e-12 {
            return Err(ModelError::InfeasibleChoice {
                state,
                choice: self.choices[state].len(),
                lower_sum,
                upper_sum,
            });
        }
        self.choices[state].push(edges);
        Ok(self.choices[state].len() - 1)
    }

    /// Check global well-formedness: every state has a choice, and
    /// observation-equal states agree on their choice count.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut representative: Vec<Option<StateId>> = Vec::new();
        for state in 0..self.num_states() {
            if self.choices[state].is_empty() {
                return Err(ModelError::NoChoices { state });
            }
            let obs = self.observations[state];
            if obs >= representative.len() {
                representative.resize(obs + 1, None);
            }
            match representative[obs] {
                None => representative[obs] = Some(state),
                Some(first) => {
                    if self.num_choices(first) != self.num_choices(state) {
                        return Err(ModelError::ObservationChoiceMismatch {
                            first,
                            second: state,
                            observation: obs,
                            first_choices: self.num_choices(first),
                            second_choices: self.num_choices(state),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Reward structure over states and choices of an MDP-like model.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MdpRewards {
    state_rewards: Vec<f64>,
    transition_rewards: Vec<Vec<f64>>,
}

impl MdpRewards {
    pub fn new(num_states: usize) -> Self {
        Self {
            state_rewards: vec![0.0; num_states],
            transition_rewards: vec![Vec::new(); num_states],
        }
    }

    pub fn set_state_reward(&mut self, state: StateId, reward: f64) {
        self.state_rewards[state] = reward;
    }

    pub fn set_transition_reward(&mut self, state: StateId, choice: ChoiceId, reward: f64) {
        let row = &mut self.transition_rewards[state];
        if choice >= row.len() {
            row.resize(choice + 1, 0.0);
        }
        row[choice] = reward;
    }

    /// Accumulate onto an existing transition reward.
    pub fn add_to_transition_reward(&mut self, state: StateId, choice: ChoiceId, reward: f64) {
        let row = &mut self.transition_rewards[state];
        if choice >= row.len() {
            row.resize(choice + 1, 0.0);
        }
        row[choice] += reward;
    }

    #[inline]
    pub fn state_reward(&self, state: StateId) -> f64 {
        self.state_rewards[state]
    }

    #[inline]
    pub fn transition_reward(&self, state: StateId, choice: ChoiceId) -> f64 {
        self.transition_rewards[state]
            .get(choice)
            .copied()
            .unwrap_or(0.0)
    }
}
