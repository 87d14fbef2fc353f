//! Iterative grid refinement.

use crate::config::RefinementConfig;
use crate::error::Result;
use crate::grid::{CellId, Grid, RankBy};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Diagnostics emitted at the end of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    /// Zero-based iteration number.
    pub iteration: usize,
    /// Sum of the local errors computed at the start of the iteration.
    pub global_error: f64,
    /// Sum of every cell's ICV after migration.
    pub global_icv: f64,
    /// Fraction of cells that own no points.
    pub sparsity: f64,
    /// Points moved during migration.
    pub shifts: usize,
    /// Cells whose height was re-optimized.
    pub heights_updated: usize,
}

/// Diagnostics of a full run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Neutral variance of the refined grid.
    pub neutral_variance: f64,
    /// One report per iteration, in order.
    pub iterations: Vec<IterationReport>,
}

impl RunSummary {
    /// Report of the last iteration, if any ran.
    pub fn last(&self) -> Option<&IterationReport> {
        self.iterations.last()
    }

    /// Points moved over the whole run.
    pub fn total_shifts(&self) -> usize {
        self.iterations.iter().map(|r| r.shifts).sum()
    }
}

/// Runs the refinement loop on a grid.
pub struct Refiner {
    config: RefinementConfig,
}

impl Refiner {
    /// Creates a refiner with the given configuration.
    pub fn new(config: RefinementConfig) -> Self {
        Self { config }
    }

    /// The refinement configuration.
    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Neighbourhood radius for a grid: `max_distance` cell widths.
    #[inline]
    pub fn search_radius(&self, grid: &Grid) -> f64 {
        self.config.max_distance * grid.cellwidth
    }

    /// Computes the initial representatives. Call once before iterating.
    pub fn prepare(&self, grid: &mut Grid) -> Result<()> {
        grid.calc_all_representatives()?;
        info!(
            "Prepared {}x{} grid: {} points, neutral variance {:.6}, sparsity {:.3}",
            grid.rows,
            grid.columns,
            grid.total_points(),
            grid.neutral_variance,
            grid.sparsity()
        );
        Ok(())
    }

    /// Runs one iteration. Every phase completes before the next starts.
    pub fn iterate(&self, grid: &mut Grid, iteration: usize) -> Result<IterationReport> {
        // Phase 1: local errors
        let errors: Vec<f64> = (0..grid.total_cells())
            .into_par_iter()
            .map(|id| grid.calc_localerror(id, None))
            .collect::<Result<Vec<f64>>>()?;
        for (cell, error) in grid.cells.iter_mut().zip(errors) {
            cell.local_error = error;
        }
        let global_error = grid.global_error();

        // Phase 2: heights of the worst cells, applied one by one
        let by_error = grid.sort_and_cut(self.config.cut_list_at, RankBy::LocalError);
        for &id in &by_error {
            let height = grid.calc_mountain_height(id, self.config.height_floor)?;
            grid.set_mountains([(id, height)])?;
        }
        debug!("Iteration {}: {} heights updated", iteration, by_error.len());

        // Phase 3: cells with the most spread
        let by_icv = grid.sort_and_cut(self.config.cut_list_at, RankBy::Icv);

        // Phase 4: neighbourhoods over the new terrain
        let radius = self.search_radius(grid);
        let hoods: Vec<Vec<(CellId, f64)>> = (0..grid.total_cells())
            .into_par_iter()
            .map(|id| grid.calc_neighbourhood(id, radius))
            .collect::<Result<Vec<_>>>()?;
        for (cell, hood) in grid.cells.iter_mut().zip(hoods) {
            cell.neighbourhood = hood;
        }

        // Phase 5: migration
        let mut shifts = 0;
        for &id in &by_icv {
            shifts += grid.shift_points(id)?;
        }

        // Phase 6: smoothing, collected before any update is applied
        let smoothed: Vec<(CellId, Vec<f64>)> = (0..grid.total_cells())
            .into_par_iter()
            .map(|id| grid.manipulate_representative(id))
            .collect::<Result<Vec<_>>>()?;
        for (id, representative) in smoothed {
            grid.cells[id].representative = representative;
        }

        // Phase 7: diagnostics
        let report = IterationReport {
            iteration,
            global_error,
            global_icv: grid.global_icv(),
            sparsity: grid.sparsity(),
            shifts,
            heights_updated: by_error.len(),
        };
        info!(
            "Iteration {}: error {:.6}, ICV {:.6}, sparsity {:.3}, {} shifts",
            iteration, report.global_error, report.global_icv, report.sparsity, report.shifts
        );
        Ok(report)
    }

    /// Prepares the grid and runs the configured number of iterations.
    pub fn run(&self, grid: &mut Grid) -> Result<RunSummary> {
        self.run_with_progress(grid, |_| {})
    }

    /// Like [`Refiner::run`], calling `on_iteration` after every iteration.
    pub fn run_with_progress<F>(&self, grid: &mut Grid, mut on_iteration: F) -> Result<RunSummary>
    where
        F: FnMut(&IterationReport),
    {
        self.prepare(grid)?;

        let mut summary = RunSummary {
            neutral_variance: grid.neutral_variance,
            iterations: Vec::with_capacity(self.config.iterations),
        };
        for iteration in 0..self.config.iterations {
            let report = self.iterate(grid, iteration)?;
            on_iteration(&report);
            summary.iterations.push(report);
        }

        info!(
            "Refinement complete: {} iterations, {} shifts",
            summary.iterations.len(),
            summary.total_shifts()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::mean_and_icv;
    use crate::storage::synthetic_blobs;

    fn test_config(iterations: usize) -> RefinementConfig {
        RefinementConfig {
            iterations,
            max_distance: 3.0,
            ..Default::default()
        }
    }

    fn blob_grid(rows: usize) -> Grid {
        let dataset = synthetic_blobs(80, 3, 5, 11).unwrap();
        let mut grid = Grid::autogenerated(rows, None, dataset.dimension(), None, None).unwrap();
        grid.init_points_to_right_cell(&dataset).unwrap();
        grid
    }

    fn owned_points(grid: &Grid) -> Vec<usize> {
        let mut owned: Vec<usize> = grid.cells.iter().flat_map(|c| c.points.iter().copied()).collect();
        owned.sort_unstable();
        owned
    }

    #[test]
    fn test_search_radius() {
        let grid = Grid::autogenerated(4, None, 1, None, None).unwrap();
        let refiner = Refiner::new(test_config(1));
        assert!((refiner.search_radius(&grid) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_prepare_sets_representatives() {
        let mut grid = blob_grid(6);
        Refiner::new(test_config(1)).prepare(&mut grid).unwrap();
        for cell in grid.cells.iter().filter(|c| !c.is_empty()) {
            assert_eq!(cell.representative.len(), 5);
            assert!(cell.icv >= 0.0);
        }
    }

    #[test]
    fn test_points_conserved() {
        let mut grid = blob_grid(6);
        let refiner = Refiner::new(test_config(4));
        refiner.run(&mut grid).unwrap();

        assert_eq!(owned_points(&grid), (0..80).collect::<Vec<_>>());
        for (cell_id, cell) in grid.cells.iter().enumerate() {
            for &p in &cell.points {
                assert_eq!(grid.points[p].owner, Some(cell_id));
            }
        }
    }

    #[test]
    fn test_icv_matches_owned_points_after_run() {
        let mut grid = blob_grid(7);
        Refiner::new(test_config(4)).run(&mut grid).unwrap();

        for cell in &grid.cells {
            let (_, expected) =
                mean_and_icv(cell.points.iter().map(|&p| grid.points[p].data.as_slice()));
            assert!(
                (cell.icv - expected).abs() < 1e-9,
                "cell {} icv {} expected {}",
                cell.id,
                cell.icv,
                expected
            );
            assert_eq!(cell.icv == 0.0, cell.point_count() <= 1, "cell {}", cell.id);
        }
    }

    #[test]
    fn test_fixed_iteration_count() {
        let mut grid = blob_grid(5);
        let mut seen = Vec::new();
        let summary = Refiner::new(test_config(3))
            .run_with_progress(&mut grid, |r| seen.push(r.iteration))
            .unwrap();

        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(summary.iterations.len(), 3);
        assert_eq!(summary.neutral_variance, grid.neutral_variance);
        let last = summary.last().unwrap();
        assert!(last.sparsity >= 0.0 && last.sparsity <= 1.0);
        assert!(last.global_icv >= 0.0);
        assert_eq!(last.heights_updated, 19);
    }

    #[test]
    fn test_zero_iterations_only_prepares() {
        let mut grid = blob_grid(4);
        let summary = Refiner::new(test_config(0)).run(&mut grid).unwrap();
        assert!(summary.iterations.is_empty());
        assert!(grid.cells.iter().all(|c| c.height == 0.0));
    }

    #[test]
    fn test_neighbourhoods_within_radius() {
        let mut grid = blob_grid(6);
        let refiner = Refiner::new(test_config(1));
        refiner.prepare(&mut grid).unwrap();
        refiner.iterate(&mut grid, 0).unwrap();

        let radius = refiner.search_radius(&grid);
        for cell in &grid.cells {
            assert!(cell.neighbourhood.iter().all(|&(n, d)| n != cell.id && d < radius));
        }
    }

    #[test]
    fn test_refinement_deterministic() {
        let mut a = blob_grid(5);
        let mut b = blob_grid(5);
        let refiner = Refiner::new(test_config(2));
        let ra = refiner.run(&mut a).unwrap();
        let rb = refiner.run(&mut b).unwrap();
        assert_eq!(ra.iterations, rb.iterations);
        for (ca, cb) in a.cells.iter().zip(b.cells.iter()) {
            assert_eq!(ca.height, cb.height);
            assert_eq!(ca.points, cb.points);
        }
    }
}
