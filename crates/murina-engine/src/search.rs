//! Outer search strategies around the local optimisation.
//!
//! Sequential convex programming is a local method; both strategies
//! here exist to escape poor local optima, not for correctness. The
//! restart strategy converges independent candidates and keeps the
//! best. The generational strategy advances a population a few steps at
//! a time and halves it between bursts, spending most of the budget on
//! the candidates that look strongest.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use murina_ir::product::FscProduct;
use murina_ir::simple::binarise;
use murina_ir::spec::{MinMax, SimpleSpec};
use murina_lp::solver::LpProblem;

use crate::point::{Parameters, SolutionPoint};
use crate::EngineError;

/// Shared knobs of both strategies.
#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    /// Base seed; candidate `i` shuffles its gadgets with seed + i.
    pub seed: u64,
    /// Step budget of every candidate.
    pub scp_iterations: usize,
    pub parameters: Parameters,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            scp_iterations: 50,
            parameters: Parameters::default(),
        }
    }
}

fn spawn_candidate<B: LpProblem>(
    product: &FscProduct,
    min_max: MinMax,
    index: u64,
    settings: &SearchSettings,
) -> Result<SolutionPoint, EngineError> {
    let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(index));
    let binarised = binarise(product, true, &mut rng);
    let spec = SimpleSpec::new(
        &binarised,
        &product.remain,
        &product.target,
        min_max,
        product.rewards.is_some(),
    );
    SolutionPoint::new::<B>(binarised, spec, settings.parameters, settings.scp_iterations)
}

/// Converge `attempts` independent candidates, each with freshly
/// shuffled gadget permutations, and return the best initial-state
/// value.
pub fn multi_start<B: LpProblem>(
    product: &FscProduct,
    min_max: MinMax,
    attempts: usize,
    settings: &SearchSettings,
) -> Result<f64, EngineError> {
    let sign = min_max.strategy.comparison_sign();
    let mut best: Option<SolutionPoint> = None;

    for attempt in 0..attempts {
        let mut point = spawn_candidate::<B>(product, min_max, attempt as u64, settings)?;
        point.converge::<B>();
        info!(
            attempt,
            objective = point.objective(),
            "restart candidate converged"
        );

        let improves = match &best {
            None => true,
            Some(best) => sign * point.objective() < sign * best.objective(),
        };
        if improves {
            best = Some(point);
        }
    }

    best.map(|point| point.value_at_initial())
        .ok_or(EngineError::NoCandidates)
}

/// Population search: advance every candidate by `prune_iterations`
/// steps, drop the weaker half, repeat until one remains, and converge
/// that survivor.
pub fn generational<B: LpProblem>(
    product: &FscProduct,
    min_max: MinMax,
    population_size: usize,
    prune_iterations: usize,
    settings: &SearchSettings,
) -> Result<f64, EngineError> {
    let sign = min_max.strategy.comparison_sign();

    let mut population = Vec::with_capacity(population_size);
    for index in 0..population_size {
        population.push(spawn_candidate::<B>(
            product,
            min_max,
            index as u64,
            settings,
        )?);
    }

    while population.len() > 1 {
        for point in &mut population {
            for _ in 0..prune_iterations {
                point.step::<B>();
            }
        }

        population.sort_by(|a, b| (sign * a.objective()).total_cmp(&(sign * b.objective())));
        let to_remove = population.len().div_ceil(2);
        population.truncate(population.len() - to_remove);
        debug!(survivors = population.len(), "pruned generation");
    }

    let mut best = population.pop().ok_or(EngineError::NoCandidates)?;
    best.converge::<B>();
    info!(objective = best.objective(), "survivor converged");
    Ok(best.value_at_initial())
}
