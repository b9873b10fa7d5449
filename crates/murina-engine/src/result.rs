use serde::Serialize;

/// Result of one value computation.
///
/// The vector is indexed by the states of the *input* model. The engine
/// only computes the value of the initial state; every other entry is
/// zero.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub values: Vec<f64>,
    pub initial_state: usize,
}

impl CheckResult {
    pub fn value_at_initial(&self) -> f64 {
        self.values[self.initial_state]
    }
}
