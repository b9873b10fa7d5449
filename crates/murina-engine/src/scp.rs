//! One step of the sequential convex programming loop.
//!
//! The Bellman equations of the binarised model are bilinear: branch
//! probabilities multiply successor values, and so do the adversary's
//! interval probabilities. Each step expands those products to first
//! order around the current iterate, keeps the expansion honest with a
//! multiplicative trust region, softens the Bellman rows with penalty
//! variables, and hands the result to the LP backend. The solved policy
//! is then re-evaluated through the chain oracle, because the program's
//! value variables are only the linearised estimate.

use murina_ir::simple::SimpleIpomdp;
use murina_ir::spec::{InequalityDirection, SimpleSpec, UncertaintyQuantifier};
use murina_lp::solver::{ConstraintOp, LpProblem, LpSolution, LpVar, OptimiseDirection};

use crate::induced;
use crate::induced::Iterate;
use crate::point::Parameters;
use crate::EngineError;

const PENALTY_UPPER_BOUND: f64 = 1e9;
const DUAL_UPPER_BOUND: f64 = 1e9;
/// Branch probabilities never quite reach zero, so the induced chain
/// keeps the support graph of the model.
const POLICY_EPSILON: f64 = 1e-9;

/// Accumulates one linear row, merging repeated variables so that e.g.
/// a self-loop's value variable appears with a single coefficient.
#[derive(Default)]
struct Row {
    terms: Vec<(LpVar, f64)>,
}

impl Row {
    fn add(&mut self, var: LpVar, coefficient: f64) {
        match self.terms.iter_mut().find(|(v, _)| *v == var) {
            Some((_, c)) => *c += coefficient,
            None => self.terms.push((var, coefficient)),
        }
    }
}

fn op_for(direction: InequalityDirection) -> ConstraintOp {
    match direction {
        InequalityDirection::GreaterEqual => ConstraintOp::GreaterEqual,
        InequalityDirection::LessEqual => ConstraintOp::LessEqual,
    }
}

/// The linearised program around one iterate.
struct StepProgram<'a, B: LpProblem> {
    simple: &'a SimpleIpomdp,
    spec: &'a SimpleSpec,
    current: &'a Iterate,
    parameters: &'a Parameters,
    problem: B,
    value_vars: Vec<LpVar>,
    policy_vars: Vec<Option<LpVar>>,
}

impl<'a, B: LpProblem> StepProgram<'a, B> {
    fn new(
        simple: &'a SimpleIpomdp,
        spec: &'a SimpleSpec,
        current: &'a Iterate,
        parameters: &'a Parameters,
    ) -> Self {
        let n = simple.num_states();
        let direction = match spec.inequality() {
            InequalityDirection::GreaterEqual => OptimiseDirection::Maximise,
            InequalityDirection::LessEqual => OptimiseDirection::Minimise,
        };
        let mut problem = B::new(direction);

        let (value_lo, value_hi) = spec.value_bounds();
        let value_vars: Vec<LpVar> = (0..n)
            .map(|state| {
                let objective = if state == simple.initial_state { 1.0 } else { 0.0 };
                problem.add_var(objective, value_lo, value_hi)
            })
            .collect();

        let mut policy_vars: Vec<Option<LpVar>> = vec![None; 2 * n];
        for &state in &simple.uncertain_states {
            policy_vars[2 * state] = Some(problem.add_var(0.0, 0.0, 1.0));
        }
        for &state in &simple.action_states {
            policy_vars[2 * state] = Some(problem.add_var(0.0, POLICY_EPSILON, 1.0));
            policy_vars[2 * state + 1] = Some(problem.add_var(0.0, POLICY_EPSILON, 1.0));
        }

        Self {
            simple,
            spec,
            current,
            parameters,
            problem,
            value_vars,
            policy_vars,
        }
    }

    fn policy_var(&self, index: usize) -> Result<LpVar, EngineError> {
        self.policy_vars[index]
            .ok_or(EngineError::MissingPolicyVariable { index })
    }

    /// A fresh penalty variable: nonnegative, priced into the objective
    /// against the optimisation direction.
    fn add_penalty_var(&mut self) -> LpVar {
        let weight = -self.spec.penalty_sign() * self.parameters.penalty_weight;
        self.problem.add_var(weight, 0.0, PENALTY_UPPER_BOUND)
    }

    /// Tie every split's branch probabilities to those of the canonical
    /// state of its observation, making the policy observation-based.
    fn tie_policy_to_observations(&mut self) -> Result<(), EngineError> {
        let n = self.simple.num_states();
        let max_observation = self
            .simple
            .observations
            .iter()
            .copied()
            .max()
            .unwrap_or(0);
        let mut leader = vec![0; max_observation + 1];
        for state in 0..n {
            leader[self.simple.observations[state]] = state;
        }

        for &state in &self.simple.action_states {
            let canonical = leader[self.simple.observations[state]];
            if canonical == state {
                continue;
            }
            for k in 0..=1 {
                let mut row = Row::default();
                row.add(self.policy_var(2 * state + k)?, 1.0);
                row.add(self.policy_var(2 * canonical + k)?, -1.0);
                self.problem
                    .add_constraint(&row.terms, ConstraintOp::Equal, 0.0);
            }
        }
        Ok(())
    }

    /// Branch probabilities of a split sum to one; the policy entry of
    /// an uncertain state is fixed to one.
    fn require_valid_policy_rows(&mut self) -> Result<(), EngineError> {
        for &state in &self.simple.uncertain_states {
            let var = self.policy_var(2 * state)?;
            self.problem
                .add_constraint(&[(var, 1.0)], ConstraintOp::Equal, 1.0);
        }
        for &state in &self.simple.action_states {
            let first = self.policy_var(2 * state)?;
            let second = self.policy_var(2 * state + 1)?;
            self.problem
                .add_constraint(&[(first, 1.0), (second, 1.0)], ConstraintOp::Equal, 1.0);
        }
        Ok(())
    }

    /// Pin target states to their terminal value.
    fn pin_goal_states(&mut self) {
        let goal = self.spec.goal_value();
        for state in self.spec.target.iter() {
            self.problem
                .add_constraint(&[(self.value_vars[state], 1.0)], ConstraintOp::Equal, goal);
        }
    }

    /// Keep the next iterate inside a multiplicative box around the
    /// current one.
    fn bound_by_trust_region(&mut self) -> Result<(), EngineError> {
        let factor = self.parameters.trust_region + 1.0;

        for state in 0..self.simple.num_states() {
            let var = self.value_vars[state];
            let center = self.current.values[state];
            self.problem
                .add_constraint(&[(var, 1.0)], ConstraintOp::GreaterEqual, center / factor);
            self.problem
                .add_constraint(&[(var, 1.0)], ConstraintOp::LessEqual, center * factor);
        }

        for &state in &self.simple.action_states {
            for k in 0..=1 {
                let var = self.policy_var(2 * state + k)?;
                let center = self.current.policy[2 * state + k];
                self.problem.add_constraint(
                    &[(var, 1.0)],
                    ConstraintOp::GreaterEqual,
                    center / factor,
                );
                self.problem
                    .add_constraint(&[(var, 1.0)], ConstraintOp::LessEqual, center * factor);
            }
        }
        Ok(())
    }

    /// First-order expansion of
    /// `value[s] = sum_k policy[s,k] * (value[succ_k] + reward[s,k]) + reward[s]`
    /// around the current iterate, one row per interior split.
    fn linearise_action_states(&mut self) -> Result<(), EngineError> {
        let op = op_for(self.spec.inequality());
        for &state in &self.simple.action_states {
            if !self.spec.is_interior(state) {
                continue;
            }

            let penalty = self.add_penalty_var();
            let mut row = Row::default();
            row.add(self.value_vars[state], -1.0);
            row.add(penalty, self.spec.penalty_sign());

            let mut rhs = 0.0;
            for k in 0..=1 {
                let successor = self.simple.transitions[state][k].successor;
                let policy_bar = self.current.policy[2 * state + k];
                let value_bar = self.current.values[successor];

                row.add(self.value_vars[successor], policy_bar);
                row.add(
                    self.policy_var(2 * state + k)?,
                    value_bar + self.simple.transition_rewards[2 * state + k],
                );
                rhs += policy_bar * value_bar;
            }
            rhs -= self.simple.state_rewards[state];
            self.problem.add_constraint(&row.terms, op, rhs);
        }
        Ok(())
    }

    fn constrain_uncertain_states(&mut self) -> Result<(), EngineError> {
        match self.spec.quantifier {
            UncertaintyQuantifier::Exists => self.constrain_uncertain_cooperative(),
            UncertaintyQuantifier::Forall => {
                self.constrain_uncertain_adversarial();
                Ok(())
            }
        }
    }

    /// Cooperative adversary: its probabilities are decision variables,
    /// and the bilinear probability-times-value products are linearised
    /// around the recorded witnesses.
    fn constrain_uncertain_cooperative(&mut self) -> Result<(), EngineError> {
        let op = op_for(self.spec.inequality());
        for &state in &self.simple.uncertain_states {
            if !self.spec.is_interior(state) {
                continue;
            }
            let witness = self.current.witnesses[state]
                .as_ref()
                .ok_or(EngineError::MissingWitnesses { state })?
                .clone();
            let penalty = self.add_penalty_var();

            let edges = &self.simple.transitions[state];
            let interval_vars: Vec<LpVar> = edges
                .iter()
                .map(|edge| {
                    self.problem
                        .add_var(0.0, edge.interval.lo(), edge.interval.hi())
                })
                .collect();

            let mass: Vec<_> = interval_vars.iter().map(|&var| (var, 1.0)).collect();
            self.problem.add_constraint(&mass, ConstraintOp::Equal, 1.0);

            let mut row = Row::default();
            row.add(self.value_vars[state], -1.0);
            row.add(penalty, self.spec.penalty_sign());

            let mut rhs = 0.0;
            for (i, edge) in edges.iter().enumerate() {
                let value_bar = self.current.values[edge.successor];
                row.add(interval_vars[i], value_bar);
                row.add(self.value_vars[edge.successor], witness[i]);
                rhs += value_bar * witness[i];
            }
            rhs -= self.simple.state_rewards[state];
            self.problem.add_constraint(&row.terms, op, rhs);
        }
        Ok(())
    }

    /// Hostile adversary: its inner optimisation over the interval
    /// polytope `{x : l <= x <= u, sum x = 1}` is replaced by its LP
    /// dual, one nonnegative multiplier per polytope row.
    fn constrain_uncertain_adversarial(&mut self) {
        let op = op_for(self.spec.inequality());
        for &state in &self.simple.uncertain_states {
            if !self.spec.is_interior(state) {
                continue;
            }
            let edges = &self.simple.transitions[state];
            let n = edges.len();
            let rows = 2 * n + 2;

            let mut g = vec![0.0; rows];
            for (i, edge) in edges.iter().enumerate() {
                g[2 * i] = -edge.interval.lo();
                g[2 * i + 1] = edge.interval.hi();
            }
            g[2 * n] = -1.0;
            g[2 * n + 1] = 1.0;

            let dual_vars: Vec<LpVar> = (0..rows)
                .map(|_| self.problem.add_var(0.0, 0.0, DUAL_UPPER_BOUND))
                .collect();

            let mut inequality = Row::default();
            inequality.add(self.value_vars[state], -1.0);
            for (i, &dual) in dual_vars.iter().enumerate() {
                inequality.add(dual, g[i]);
            }
            self.problem.add_constraint(
                &inequality.terms,
                op,
                -self.simple.state_rewards[state],
            );

            for (i, edge) in edges.iter().enumerate() {
                let mut stationarity = Row::default();
                stationarity.add(self.value_vars[edge.successor], 1.0);
                stationarity.add(dual_vars[2 * i], 1.0);
                stationarity.add(dual_vars[2 * i + 1], -1.0);
                stationarity.add(dual_vars[2 * n], 1.0);
                stationarity.add(dual_vars[2 * n + 1], -1.0);
                self.problem
                    .add_constraint(&stationarity.terms, ConstraintOp::Equal, 0.0);
            }
        }
    }
}

fn extract_policy(
    simple: &SimpleIpomdp,
    policy_vars: &[Option<LpVar>],
    solution: &LpSolution,
) -> Result<Vec<f64>, EngineError> {
    let entry = |index: usize| -> Result<f64, EngineError> {
        let var = policy_vars[index].ok_or(EngineError::MissingPolicyVariable { index })?;
        Ok(solution.value(var))
    };

    let mut policy = vec![0.0; 2 * simple.num_states()];
    for &state in &simple.uncertain_states {
        policy[2 * state] = entry(2 * state)?;
    }
    for &state in &simple.action_states {
        for k in 0..=1 {
            policy[2 * state + k] = entry(2 * state + k)?;
        }
    }
    Ok(policy)
}

/// Build and solve the step program, then ground the proposed policy in
/// the chain oracle and refresh the linearisation witnesses.
pub fn solve_step<B: LpProblem>(
    simple: &SimpleIpomdp,
    spec: &SimpleSpec,
    current: &Iterate,
    parameters: &Parameters,
) -> Result<Iterate, EngineError> {
    let mut program = StepProgram::<B>::new(simple, spec, current, parameters);

    program.tie_policy_to_observations()?;
    program.require_valid_policy_rows()?;
    program.pin_goal_states();
    program.bound_by_trust_region()?;
    program.linearise_action_states()?;
    program.constrain_uncertain_states()?;

    let StepProgram {
        problem,
        policy_vars,
        ..
    } = program;
    let solution = problem.solve()?;
    let policy = extract_policy(simple, &policy_vars, &solution)?;

    let values = induced::evaluate_policy(simple, spec, &policy)?;
    let witnesses = induced::recover_witnesses::<B>(simple, spec, &values)?;

    Ok(Iterate {
        policy,
        values,
        witnesses,
    })
}
