use thiserror::Error;

/// Handle to a variable of an [`LpProblem`].
///
/// Handles are dense indices in creation order; a solution is read back
/// through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LpVar(pub usize);

/// Sense of the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimiseDirection {
    Minimise,
    Maximise,
}

/// Relation of a linear row to its right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    LessEqual,
    GreaterEqual,
    Equal,
}

/// Why a solve produced no optimum.
#[derive(Debug, Error)]
pub enum LpError {
    #[error("Linear program is infeasible")]
    Infeasible,
    #[error("Linear program is unbounded")]
    Unbounded,
    #[error("LP backend failed: {0}")]
    Backend(String),
}

/// Optimal primal values of a solved program.
#[derive(Debug, Clone)]
pub struct LpSolution {
    values: Vec<f64>,
    objective: f64,
}

impl LpSolution {
    pub fn new(values: Vec<f64>, objective: f64) -> Self {
        Self { values, objective }
    }

    /// Optimal value of `var`.
    #[inline]
    pub fn value(&self, var: LpVar) -> f64 {
        self.values[var.0]
    }

    #[inline]
    pub fn objective(&self) -> f64 {
        self.objective
    }
}

/// Abstract linear program builder and solver.
///
/// One value of this type is one model: build it row by row, solve it
/// once, read the primal values back. Solving consumes the model; the
/// optimisation loop creates a fresh problem per step.
pub trait LpProblem: Sized {
    /// Start an empty program with the given objective sense.
    fn new(direction: OptimiseDirection) -> Self;

    /// Add a continuous variable with bounds `[lower, upper]` and the
    /// given objective coefficient.
    fn add_var(&mut self, objective: f64, lower: f64, upper: f64) -> LpVar;

    /// Add the row `sum(coef * var) op rhs`.
    fn add_constraint(&mut self, terms: &[(LpVar, f64)], op: ConstraintOp, rhs: f64);

    /// Solve and return optimal primal values.
    fn solve(self) -> Result<LpSolution, LpError>;
}
