//! Backend over the pure-Rust `minilp` simplex solver.

use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem, Variable};

use crate::solver::{ConstraintOp, LpError, LpProblem, LpSolution, LpVar, OptimiseDirection};

/// [`LpProblem`] implementation backed by [`minilp::Problem`].
pub struct MinilpProblem {
    problem: Problem,
    vars: Vec<Variable>,
}

impl LpProblem for MinilpProblem {
    fn new(direction: OptimiseDirection) -> Self {
        let direction = match direction {
            OptimiseDirection::Minimise => OptimizationDirection::Minimize,
            OptimiseDirection::Maximise => OptimizationDirection::Maximize,
        };
        Self {
            problem: Problem::new(direction),
            vars: Vec::new(),
        }
    }

    fn add_var(&mut self, objective: f64, lower: f64, upper: f64) -> LpVar {
        let var = self.problem.add_var(objective, (lower, upper));
        self.vars.push(var);
        LpVar(self.vars.len() - 1)
    }

    fn add_constraint(&mut self, terms: &[(LpVar, f64)], op: ConstraintOp, rhs: f64) {
        let mut expr = LinearExpr::empty();
        for &(var, coefficient) in terms {
            expr.add(self.vars[var.0], coefficient);
        }
        let op = match op {
            ConstraintOp::LessEqual => ComparisonOp::Le,
            ConstraintOp::GreaterEqual => ComparisonOp::Ge,
            ConstraintOp::Equal => ComparisonOp::Eq,
        };
        self.problem.add_constraint(expr, op, rhs);
    }

    fn solve(self) -> Result<LpSolution, LpError> {
        let solution = self.problem.solve().map_err(|e| match e {
            minilp::Error::Infeasible => LpError::Infeasible,
            minilp::Error::Unbounded => LpError::Unbounded,
        })?;
        let values = self.vars.iter().map(|&v| solution[v]).collect();
        Ok(LpSolution::new(values, solution.objective()))
    }
}
