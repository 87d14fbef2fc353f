//! The refinement loop: heights, migration and smoothing over a fixed
//! number of iterations.

mod refiner;

pub use refiner::{IterationReport, Refiner, RunSummary};
