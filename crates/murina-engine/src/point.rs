//! Trust-region driver around the step program.
//!
//! A candidate keeps its own binarised model, its current iterate, and
//! a shrinking/expanding trust region. Steps that improve the oracle
//! value at the initial state are accepted and widen the region; steps
//! that do not are rejected and narrow it. The candidate is done when
//! the region collapses below its threshold or the step budget is
//! spent. A solver failure ends the candidate early but is not fatal to
//! the surrounding search.

use tracing::{debug, warn};

use murina_ir::simple::{Binarised, SimpleIpomdp};
use murina_ir::spec::SimpleSpec;
use murina_lp::solver::LpProblem;

use crate::induced::{self, Iterate};
use crate::scp;
use crate::EngineError;

/// Tuning of the sequential convex programming loop.
#[derive(Debug, Clone, Copy)]
pub struct Parameters {
    /// Weight of the soft-penalty terms in the objective.
    pub penalty_weight: f64,
    /// Current half-width of the multiplicative trust region; the box
    /// factor is `1 + trust_region`.
    pub trust_region: f64,
    /// Factor the region grows or shrinks by on accept/reject.
    pub region_change_factor: f64,
    /// The candidate stops once the region shrinks below this.
    pub region_threshold: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            penalty_weight: 1e4,
            trust_region: 1.5,
            region_change_factor: 1.5,
            region_threshold: 1e-4,
        }
    }
}

/// One local-search candidate.
#[derive(Debug)]
pub struct SolutionPoint {
    simple: SimpleIpomdp,
    spec: SimpleSpec,
    parameters: Parameters,
    iterate: Iterate,
    objective: f64,
    iterations_left: usize,
}

impl SolutionPoint {
    /// Evaluate the uniform starting policy of `binarised` and set up
    /// the candidate around it.
    pub fn new<B: LpProblem>(
        binarised: Binarised,
        spec: SimpleSpec,
        parameters: Parameters,
        iterations: usize,
    ) -> Result<Self, EngineError> {
        let simple = binarised.simple;
        let iterate = induced::initial_iterate::<B>(&simple, &spec)?;
        Ok(Self {
            objective: spec.worst_objective(),
            simple,
            spec,
            parameters,
            iterate,
            iterations_left: iterations,
        })
    }

    /// One accept/reject step. Returns false once the candidate is done.
    pub fn step<B: LpProblem>(&mut self) -> bool {
        if self.parameters.trust_region <= self.parameters.region_threshold
            || self.iterations_left == 0
        {
            return false;
        }
        self.iterations_left -= 1;

        let proposed =
            match scp::solve_step::<B>(&self.simple, &self.spec, &self.iterate, &self.parameters) {
                Ok(proposed) => proposed,
                Err(error) => {
                    warn!(%error, "abandoning candidate after failed step");
                    return false;
                }
            };

        let sign = self.spec.direction.comparison_sign();
        let proposed_objective = proposed.values[self.simple.initial_state];
        if sign * proposed_objective < sign * self.objective {
            debug!(
                objective = proposed_objective,
                trust_region = self.parameters.trust_region,
                "step accepted"
            );
            self.objective = proposed_objective;
            self.iterate = proposed;
            self.parameters.trust_region *= self.parameters.region_change_factor;
        } else {
            debug!(
                rejected = proposed_objective,
                trust_region = self.parameters.trust_region,
                "step rejected"
            );
            self.parameters.trust_region /= self.parameters.region_change_factor;
        }
        true
    }

    /// Drive the candidate until it reports done.
    pub fn converge<B: LpProblem>(&mut self) {
        while self.step::<B>() {}
    }

    /// Best accepted objective, or the worst representable value if no
    /// step was ever accepted.
    #[inline]
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Oracle value of the current iterate at the initial state.
    #[inline]
    pub fn value_at_initial(&self) -> f64 {
        self.iterate.values[self.simple.initial_state]
    }

    #[inline]
    pub fn iterate(&self) -> &Iterate {
        &self.iterate
    }

    #[inline]
    pub fn spec(&self) -> &SimpleSpec {
        &self.spec
    }

    #[inline]
    pub fn simple(&self) -> &SimpleIpomdp {
        &self.simple
    }
}
