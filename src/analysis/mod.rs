//! Analysis modules.
//!
//! Quantile math, swappable reducers, the ensemble aggregator and the
//! band comparison built on persisted tables.

pub mod aggregator;
pub mod comparison;
pub mod quantile;
pub mod reducer;

pub use aggregator::*;
pub use reducer::{Reducer, ReducerKind};
