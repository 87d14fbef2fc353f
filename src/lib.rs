//! # Topogrid - Topographic Grid Refinement
//!
//! Topogrid turns a 2D embedding of high-dimensional data into a topographic
//! grid: a lattice of cells that own the embedded points, each carrying a
//! representative feature vector and an elevation. Heights are chosen so that
//! walking from one cell to its neighbour costs about as much as the
//! high-dimensional dissimilarity of their representatives.
//!
//! ## Overview
//!
//! An external reduction step (PCA, t-SNE, ...) produces a CSV with an index
//! column, the 2D coordinates and the original features. Topogrid places the
//! rows on a grid and refines it for a fixed number of iterations:
//!
//! 1. local errors for every cell
//! 2. new heights for the cells with the largest errors (cubic root finding)
//! 3. shortest-path neighbourhoods over the new terrain
//! 4. point migration out of the cells with the largest variance
//! 5. representative smoothing over each neighbourhood
//!
//! The refined grid is then evaluated with geodesic distances over the cell
//! graph, comparing ε-neighbourhoods with those of the original space.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use topogrid::{Config, Dataset, Grid, Refiner};
//!
//! let config = Config::default();
//! let dataset = Dataset::load_csv("reduced.csv")?;
//!
//! let mut grid = Grid::from_config(&config.grid, dataset.dimension())?;
//! grid.init_points_to_right_cell(&dataset)?;
//!
//! let summary = Refiner::new(config.refinement.clone()).run(&mut grid)?;
//! topogrid::storage::write_refined_csv(&grid, "refined.csv")?;
//! ```
//!
//! ## Evaluation
//!
//! ```rust,ignore
//! use topogrid::eval::{calc_neighborhood_preservation, floyd_warshall};
//!
//! let geodesic = floyd_warshall(&grid)?;
//! let before = dataset.to_datapoints();
//! let after = topogrid::storage::load_refined_points("refined.csv")?;
//! let report = calc_neighborhood_preservation(&geodesic, &grid, &before, &after)?;
//! ```
//!
//! ## Architecture
//!
//! - [`grid`] - Datapoints, cells, the lattice and height optimization
//! - [`refinement`] - The iteration loop and its diagnostics
//! - [`eval`] - Geodesic distances, neighbourhood preservation, distortion
//! - [`storage`] - CSV input/output, JSON snapshots, synthetic datasets
//! - [`config`] - Run configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod eval;
pub mod grid;
pub mod refinement;
pub mod storage;

// Re-export commonly used types
pub use config::{Config, GridConfig, IoConfig, RefinementConfig, DEFAULT_HEIGHT_FLOOR};
pub use error::{Result, TopoError};
pub use eval::{DistortionReport, PreservationReport};
pub use grid::{Cell, CellId, Datapoint, Grid, PointId, RankBy};
pub use refinement::{IterationReport, Refiner, RunSummary};
pub use storage::{Dataset, GridSnapshot, Record};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of grid rows.
pub const DEFAULT_ROWS: usize = 22;

/// Default number of refinement iterations.
pub const DEFAULT_ITERATIONS: usize = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_defaults_match_config() {
        let config = Config::default();
        assert_eq!(config.grid.rows, DEFAULT_ROWS);
        assert_eq!(config.refinement.iterations, DEFAULT_ITERATIONS);
        assert!((DEFAULT_HEIGHT_FLOOR + 0.1).abs() < 1e-12);
    }
}
