//! Linear programming seam.
//!
//! The optimisation layer talks to an LP solver only through the
//! [`solver::LpProblem`] trait: continuous variables with box bounds,
//! linear rows, a linear objective, and optimal primal values back. The
//! concrete solver lives in [`backends`] and is replaceable.

pub mod backends;
pub mod solver;
