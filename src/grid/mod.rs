//! The topographic grid: points, cells, lattice topology and heights.
//!
//! - **Datapoint**: one input row with its original and current placement (datapoint.rs)
//! - **Cell**: representative, ICV, local error, migration and smoothing (cell.rs)
//! - **Grid**: lattice construction, lookup, neighbourhood search, ranking (lattice.rs)
//! - **Heights**: cubic root finding for the error-minimizing height (height.rs)

mod cell;
mod datapoint;
mod height;
mod lattice;

pub use cell::{mean_and_icv, squared_distance, Cell, CellId, INTERPOLATION_EPSILON};
pub use datapoint::{Datapoint, PointId};
pub use height::real_roots;
pub use lattice::{Grid, RankBy};
