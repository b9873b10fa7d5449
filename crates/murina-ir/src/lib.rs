//! Model types and lowering passes for interval POMDP verification.
//!
//! The crate covers the static side of the verifier: the interval POMDP
//! model itself, the product with a finite-memory controller, the
//! binarisation pass that rewrites every multi-way choice into a gadget
//! of binary policy splits, and the translation of a caller-level
//! reachability query into the inequality directions and adversary
//! quantifier used by the optimisation layer.

pub mod interval;
pub mod ipomdp;
pub mod product;
pub mod simple;
pub mod spec;
pub mod state_set;
