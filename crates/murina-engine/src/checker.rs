//! Caller-facing entry points.
//!
//! Probability queries run with a memoryless controller and the restart
//! search; expected-reward queries get one extra bit of controller
//! memory and the generational search, which handles their rougher
//! objective landscape better.

use tracing::info;

use murina_ir::ipomdp::{Ipomdp, MdpRewards};
use murina_ir::product::FscProduct;
use murina_ir::spec::MinMax;
use murina_ir::state_set::StateSet;
use murina_lp::backends::minilp_backend::MinilpProblem;

use crate::point::Parameters;
use crate::result::CheckResult;
use crate::search::{self, SearchSettings};
use crate::EngineError;

/// Controller memory used for probability queries.
pub const PROB_MEMORY_STATES: usize = 1;
/// Controller memory used for reward queries.
pub const REWARD_MEMORY_STATES: usize = 2;

/// Knobs of a value computation. The defaults match the tuning the
/// engine was validated with; they are exposed mainly so tests and
/// callers with tight time budgets can shrink the searches.
#[derive(Debug, Clone, Copy)]
pub struct CheckerSettings {
    /// Base seed of the gadget shuffles.
    pub seed: u64,
    /// Candidates of the restart search.
    pub restarts: usize,
    /// Initial population of the generational search.
    pub population: usize,
    /// Steps every candidate advances between prunings.
    pub prune_iterations: usize,
    /// Step budget per candidate.
    pub scp_iterations: usize,
    pub parameters: Parameters,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            restarts: 10,
            population: 32,
            prune_iterations: 4,
            scp_iterations: 50,
            parameters: Parameters::default(),
        }
    }
}

/// The value-computation engine.
#[derive(Debug, Clone, Default)]
pub struct Checker {
    settings: CheckerSettings,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: CheckerSettings) -> Self {
        Self { settings }
    }

    fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            seed: self.settings.seed,
            scp_iterations: self.settings.scp_iterations,
            parameters: self.settings.parameters,
        }
    }

    /// Probability of reaching `target` while staying in `remain`
    /// (`None` means anywhere), optimised by an observation-based
    /// controller against the interval adversary of `min_max`.
    pub fn compute_reach_probs(
        &self,
        ipomdp: &Ipomdp,
        remain: Option<&StateSet>,
        target: &StateSet,
        min_max: MinMax,
    ) -> Result<CheckResult, EngineError> {
        ipomdp.validate()?;
        let everywhere;
        let remain = match remain {
            Some(remain) => remain,
            None => {
                everywhere = StateSet::universe(ipomdp.num_states());
                &everywhere
            }
        };

        info!(
            states = ipomdp.num_states(),
            memory = PROB_MEMORY_STATES,
            "computing reachability probabilities"
        );
        let product = FscProduct::build(ipomdp, None, remain, target, PROB_MEMORY_STATES)?;
        let value = search::multi_start::<MinilpProblem>(
            &product,
            min_max,
            self.settings.restarts,
            &self.search_settings(),
        )?;

        Ok(self.result_vector(ipomdp, value))
    }

    /// Until-probabilities are reach-probabilities with a remain set.
    pub fn compute_until_probs(
        &self,
        ipomdp: &Ipomdp,
        remain: Option<&StateSet>,
        target: &StateSet,
        min_max: MinMax,
    ) -> Result<CheckResult, EngineError> {
        self.compute_reach_probs(ipomdp, remain, target, min_max)
    }

    /// Expected cumulated reward until `target`.
    pub fn compute_reach_rewards(
        &self,
        ipomdp: &Ipomdp,
        rewards: &MdpRewards,
        target: &StateSet,
        min_max: MinMax,
    ) -> Result<CheckResult, EngineError> {
        ipomdp.validate()?;
        let remain = StateSet::universe(ipomdp.num_states());

        info!(
            states = ipomdp.num_states(),
            memory = REWARD_MEMORY_STATES,
            "computing reachability rewards"
        );
        let product =
            FscProduct::build(ipomdp, Some(rewards), &remain, target, REWARD_MEMORY_STATES)?;
        let value = search::generational::<MinilpProblem>(
            &product,
            min_max,
            self.settings.population,
            self.settings.prune_iterations,
            &self.search_settings(),
        )?;

        Ok(self.result_vector(ipomdp, value))
    }

    fn result_vector(&self, ipomdp: &Ipomdp, value: f64) -> CheckResult {
        let mut values = vec![0.0; ipomdp.num_states()];
        let initial_state = ipomdp.first_initial_state();
        values[initial_state] = value;
        CheckResult {
            values,
            initial_state,
        }
    }
}
