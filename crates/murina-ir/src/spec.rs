//! Translation of a caller-level query into optimisation terms.
//!
//! A query fixes two directions: one for the controller (minimise or
//! maximise the reachability value) and one for the interval adversary.
//! When the two agree the adversary cooperates and its probabilities can
//! be chosen alongside the policy (existential); when they disagree the
//! adversary is hostile and its inner optimisation must be dualised
//! (universal).

use crate::simple::Binarised;
use crate::state_set::StateSet;

/// Optimisation direction of the controller or the adversary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Minimise,
    Maximise,
}

impl Direction {
    /// Sign under which "smaller is better": comparing
    /// `sign * a < sign * b` means `a` improves on `b` in this direction.
    #[inline]
    pub fn comparison_sign(self) -> f64 {
        match self {
            Direction::Minimise => 1.0,
            Direction::Maximise => -1.0,
        }
    }
}

/// The pair of quantifiers of a query, e.g. `Pmax,min=?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinMax {
    pub strategy: Direction,
    pub uncertainty: Direction,
}

impl MinMax {
    pub fn new(strategy: Direction, uncertainty: Direction) -> Self {
        Self {
            strategy,
            uncertainty,
        }
    }

    /// Best case for both controller and environment.
    pub fn max_max() -> Self {
        Self::new(Direction::Maximise, Direction::Maximise)
    }

    pub fn max_min() -> Self {
        Self::new(Direction::Maximise, Direction::Minimise)
    }

    pub fn min_max() -> Self {
        Self::new(Direction::Minimise, Direction::Maximise)
    }

    /// Worst case for both.
    pub fn min_min() -> Self {
        Self::new(Direction::Minimise, Direction::Minimise)
    }
}

/// How interval probabilities are quantified in the optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UncertaintyQuantifier {
    /// The adversary is aligned with the controller: interval
    /// probabilities appear as free variables.
    Exists,
    /// The adversary opposes the controller: its inner problem is
    /// replaced by its LP dual.
    Forall,
}

/// Direction of the Bellman inequality rows in the linearised program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InequalityDirection {
    GreaterEqual,
    LessEqual,
}

/// The query, carried over to the binarised state space.
#[derive(Debug, Clone)]
pub struct SimpleSpec {
    pub remain: StateSet,
    pub target: StateSet,
    /// Direction of the controller's objective.
    pub direction: Direction,
    /// Direction the interval adversary resolves its intervals in.
    pub uncertainty: Direction,
    pub quantifier: UncertaintyQuantifier,
    pub is_reward: bool,
}

impl SimpleSpec {
    pub fn new(
        binarised: &Binarised,
        remain: &StateSet,
        target: &StateSet,
        min_max: MinMax,
        is_reward: bool,
    ) -> Self {
        let quantifier = if min_max.strategy == min_max.uncertainty {
            UncertaintyQuantifier::Exists
        } else {
            UncertaintyQuantifier::Forall
        };
        Self {
            remain: binarised.lift_remain(remain),
            target: binarised.lift_target(target),
            direction: min_max.strategy,
            uncertainty: min_max.uncertainty,
            quantifier,
            is_reward,
        }
    }

    /// Inequality direction of the linearised Bellman rows.
    pub fn inequality(&self) -> InequalityDirection {
        match self.direction {
            Direction::Maximise => InequalityDirection::GreaterEqual,
            Direction::Minimise => InequalityDirection::LessEqual,
        }
    }

    /// Sign of the penalty terms in constraints and objective.
    pub fn penalty_sign(&self) -> f64 {
        match self.direction {
            Direction::Maximise => 1.0,
            Direction::Minimise => -1.0,
        }
    }

    /// Value pinned at target states: certainty for probabilities,
    /// nothing-left-to-collect for rewards.
    pub fn goal_value(&self) -> f64 {
        if self.is_reward {
            0.0
        } else {
            1.0
        }
    }

    /// Bounds of the value variables in the linearised program.
    pub fn value_bounds(&self) -> (f64, f64) {
        if self.is_reward {
            (-1e6, 1e6)
        } else {
            (0.0, 1.0)
        }
    }

    /// The objective every candidate starts from, i.e. the worst value
    /// expressible under the bounds, so the first solve always improves.
    pub fn worst_objective(&self) -> f64 {
        let extreme = if self.is_reward { 1e6 } else { 1.0 };
        match self.direction {
            Direction::Maximise => 1.0 - extreme,
            Direction::Minimise => extreme,
        }
    }

    /// A state the Bellman rows constrain: neither a target nor excluded
    /// by the remain set.
    #[inline]
    pub fn is_interior(&self, state: usize) -> bool {
        !self.target.contains(state) && self.remain.contains(state)
    }
}
