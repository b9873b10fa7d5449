#![doc = include_str!("../README.md")]

use thiserror::Error;

use murina_ir::ipomdp::ModelError;
use murina_lp::solver::LpError;
use murina_prob::reach::ReachError;

pub mod checker;
pub mod induced;
pub mod point;
pub mod result;
pub mod scp;
pub mod search;

/// Errors surfaced by the engine.
///
/// LP and oracle failures inside one search candidate are handled by
/// abandoning the candidate; what reaches the caller is either a broken
/// input model or a failure outside any candidate (initial evaluation,
/// empty search configuration).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Linear programming failed: {0}")]
    Lp(#[from] LpError),
    #[error("Reachability oracle failed: {0}")]
    Reach(#[from] ReachError),
    #[error("No witness distribution recorded for uncertain state {state}")]
    MissingWitnesses { state: usize },
    #[error("Policy entry {index} has no variable in the step program")]
    MissingPolicyVariable { index: usize },
    #[error("Search configured with an empty candidate set")]
    NoCandidates,
}
