//! All-pairs shortest paths over the cell graph.

use crate::error::Result;
use crate::grid::Grid;
use log::{debug, info};
use ndarray::parallel::prelude::*;
use ndarray::{Array2, Axis};

/// Distance of cell pairs that are not connected (yet).
pub const UNREACHABLE: f64 = 999_999.0;

/// Initial matrix: 0 on the diagonal, the planar distance between direct
/// neighbours and [`UNREACHABLE`] everywhere else.
pub fn seed_distances(grid: &Grid) -> Result<Array2<f64>> {
    let n = grid.total_cells();
    let mut dist = Array2::from_elem((n, n), UNREACHABLE);
    for cell in &grid.cells {
        dist[[cell.id, cell.id]] = 0.0;
        for &nb in &cell.direct_neighbours {
            dist[[cell.id, nb]] = grid.calc_distance_2d(cell.id, nb)?;
        }
    }
    Ok(dist)
}

/// Geodesic distance between every pair of cells (Floyd–Warshall).
pub fn floyd_warshall(grid: &Grid) -> Result<Array2<f64>> {
    floyd_warshall_with_progress(grid, |_| {})
}

/// Like [`floyd_warshall`], calling `on_pivot` with the number of finished
/// intermediate vertices.
pub fn floyd_warshall_with_progress<F>(grid: &Grid, mut on_pivot: F) -> Result<Array2<f64>>
where
    F: FnMut(usize),
{
    let mut dist = seed_distances(grid)?;
    let n = dist.nrows();
    info!("Computing geodesic distances for {} cells", n);

    for k in 0..n {
        let pivot = dist.row(k).to_owned();
        dist.axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut row| {
                let via = row[k];
                if via >= UNREACHABLE {
                    return;
                }
                for (d, p) in row.iter_mut().zip(pivot.iter()) {
                    let candidate = via + p;
                    if candidate < *d {
                        *d = candidate;
                    }
                }
            });
        on_pivot(k + 1);
    }

    let unreachable = dist.iter().filter(|d| **d >= UNREACHABLE).count();
    if unreachable > 0 {
        debug!("{} cell pairs remain unreachable", unreachable);
    }
    Ok(dist)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hilly_grid() -> Grid {
        let mut grid = Grid::autogenerated(3, Some(4), 1, None, None).unwrap();
        grid.set_mountains([(1, 0.4), (5, 1.0), (6, 0.2), (10, 0.7)]).unwrap();
        grid
    }

    #[test]
    fn test_seed_distances() {
        let grid = hilly_grid();
        let seed = seed_distances(&grid).unwrap();
        assert_eq!(seed[[0, 0]], 0.0);
        assert!((seed[[0, 1]] - (grid.cellwidth + 0.16)).abs() < 1e-12);
        assert_eq!(seed[[0, 2]], UNREACHABLE);
    }

    #[test]
    fn test_flat_grid_manhattan() {
        let grid = Grid::autogenerated(3, None, 1, None, None).unwrap();
        let dist = floyd_warshall(&grid).unwrap();
        let w = grid.cellwidth;
        // Opposite corners are four steps apart.
        assert!((dist[[0, 8]] - 4.0 * w).abs() < 1e-12);
        assert!((dist[[4, 5]] - w).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_and_triangle_inequality() {
        let grid = hilly_grid();
        let dist = floyd_warshall(&grid).unwrap();
        let n = dist.nrows();
        for i in 0..n {
            assert_eq!(dist[[i, i]], 0.0);
            for j in 0..n {
                assert!(dist[[i, j]] < UNREACHABLE);
                assert!((dist[[i, j]] - dist[[j, i]]).abs() < 1e-12);
                for k in 0..n {
                    assert!(dist[[i, j]] <= dist[[i, k]] + dist[[k, j]] + 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_agrees_with_neighbourhood_search() {
        let grid = hilly_grid();
        let dist = floyd_warshall(&grid).unwrap();
        for id in 0..grid.total_cells() {
            for (other, d) in grid.calc_neighbourhood(id, 100.0).unwrap() {
                assert!((dist[[id, other]] - d).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_progress_reports_every_pivot() {
        let grid = Grid::autogenerated(2, None, 1, None, None).unwrap();
        let mut calls = Vec::new();
        floyd_warshall_with_progress(&grid, |k| calls.push(k)).unwrap();
        assert_eq!(calls, vec![1, 2, 3, 4]);
    }
}
