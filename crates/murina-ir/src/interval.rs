use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IntervalError {
    #[error("Inverted interval endpoints: [{lo}, {hi}]")]
    Inverted { lo: f64, hi: f64 },
    #[error("Probability interval [{lo}, {hi}] outside [0, 1]")]
    OutOfUnitRange { lo: f64, hi: f64 },
    #[error("Interval endpoint is not finite")]
    NonFinite,
}

/// A closed real interval `[lo, hi]`.
///
/// Transition uncertainty is expressed as a probability interval inside
/// `[0, 1]`. Edges out of policy-split states instead carry the sentinel
/// `[-1, 1]`, which has no probability content and only marks the edge
/// as policy-controlled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    lo: f64,
    hi: f64,
}

impl Interval {
    /// Construct an arbitrary closed interval with `lo <= hi`.
    pub fn new(lo: f64, hi: f64) -> Result<Self, IntervalError> {
        if !lo.is_finite() || !hi.is_finite() {
            return Err(IntervalError::NonFinite);
        }
        if lo > hi {
            return Err(IntervalError::Inverted { lo, hi });
        }
        Ok(Self { lo, hi })
    }

    /// Construct a probability interval, i.e. `[lo, hi]` within `[0, 1]`.
    pub fn probability(lo: f64, hi: f64) -> Result<Self, IntervalError> {
        let interval = Self::new(lo, hi)?;
        if lo < 0.0 || hi > 1.0 {
            return Err(IntervalError::OutOfUnitRange { lo, hi });
        }
        Ok(interval)
    }

    /// The degenerate interval `[p, p]`.
    pub fn point(p: f64) -> Self {
        Self { lo: p, hi: p }
    }

    /// The sentinel `[-1, 1]` carried by policy-controlled edges.
    pub fn policy_sentinel() -> Self {
        Self { lo: -1.0, hi: 1.0 }
    }

    #[inline]
    pub fn lo(&self) -> f64 {
        self.lo
    }

    #[inline]
    pub fn hi(&self) -> f64 {
        self.hi
    }

    /// True when both endpoints coincide.
    pub fn is_point(&self) -> bool {
        self.lo == self.hi
    }

    pub fn contains(&self, p: f64) -> bool {
        self.lo <= p && p <= self.hi
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}
