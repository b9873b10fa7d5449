//! Reachability analysis for interval discrete-time Markov chains.
//!
//! The chain's edge probabilities are intervals; reach probabilities and
//! expected rewards are computed against the best- or worst-case
//! resolution of those intervals, by value iteration with a bounded
//! budget. Non-convergence within the budget is tolerated: callers get
//! the best numerical answer available.

pub mod idtmc;
pub mod reach;
