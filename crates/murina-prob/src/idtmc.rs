//! The interval DTMC model.

use murina_ir::interval::Interval;
use murina_ir::ipomdp::{Edge, StateId};

/// A Markov chain whose edges carry probability intervals.
#[derive(Debug, Clone)]
pub struct Idtmc {
    transitions: Vec<Vec<Edge>>,
}

impl Idtmc {
    pub fn new(num_states: usize) -> Self {
        Self {
            transitions: vec![Vec::new(); num_states],
        }
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        self.transitions.len()
    }

    #[inline]
    pub fn edges(&self, state: StateId) -> &[Edge] {
        &self.transitions[state]
    }

    /// Set the probability interval of the edge `state -> successor`,
    /// replacing an existing edge to the same successor.
    pub fn set_probability(&mut self, state: StateId, successor: StateId, interval: Interval) {
        let row = &mut self.transitions[state];
        match row.iter_mut().find(|e| e.successor == successor) {
            Some(edge) => edge.interval = interval,
            None => row.push(Edge::new(successor, interval)),
        }
    }
}
