//! Rating computations.
//!
//! Everything here is pure: scores are derived from review rows at read
//! time and nothing is updated incrementally.

pub mod aggregator;

pub use aggregator::*;
