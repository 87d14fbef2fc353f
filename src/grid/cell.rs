//! Grid cells and the per-cell operations of the refinement.
//!
//! Cells live in the [`Grid`] arena and refer to each other (and to their
//! points) by index. Operations that need more than one cell are therefore
//! implemented on `Grid` and take the id of the cell they act on.

use crate::error::{Result, TopoError};
use crate::grid::datapoint::{Datapoint, PointId};
use crate::grid::Grid;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Index of a cell in the grid's row-major cell table.
pub type CellId = usize;

/// Epsilon added to every dimension of an interpolated representative.
pub const INTERPOLATION_EPSILON: f64 = 1e-8;

/// A cell of the topographic grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Row-major index, stable for the lifetime of the grid.
    pub id: CellId,
    /// x coordinate of the lower-left corner.
    pub posx: f64,
    /// y coordinate of the lower-left corner.
    pub posy: f64,
    /// Elevation.
    pub height: f64,
    /// Points currently owned by this cell.
    pub points: Vec<PointId>,
    /// Mean feature vector of the owned points. Empty when unknown.
    pub representative: Vec<f64>,
    /// Intra-cell variance: summed per-dimension sample variance.
    pub icv: f64,
    /// Local error from the most recent error pass.
    pub local_error: f64,
    /// Lattice-adjacent cells (up, down, left, right where present).
    pub direct_neighbours: Vec<CellId>,
    /// Cells within the search radius with their shortest distance.
    pub neighbourhood: Vec<(CellId, f64)>,
}

impl Cell {
    /// Creates an empty flat cell at the given lower-left corner.
    pub fn new(id: CellId, posx: f64, posy: f64) -> Self {
        Self {
            id,
            posx,
            posy,
            height: 0.0,
            points: Vec::new(),
            representative: Vec::new(),
            icv: 0.0,
            local_error: 0.0,
            direct_neighbours: Vec::with_capacity(4),
            neighbourhood: Vec::new(),
        }
    }

    /// Returns true if the cell owns no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of owned points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Returns true once a representative has been computed or interpolated.
    #[inline]
    pub fn has_representative(&self) -> bool {
        !self.representative.is_empty()
    }

    /// Center of the cell for the given cell width.
    #[inline]
    pub fn center(&self, cellwidth: f64) -> (f64, f64) {
        (self.posx + cellwidth / 2.0, self.posy + cellwidth / 2.0)
    }

    /// Returns true if `other` is lattice-adjacent to this cell.
    #[inline]
    pub fn is_direct_neighbour(&self, other: CellId) -> bool {
        self.direct_neighbours.contains(&other)
    }

    /// Distance to `other` from the cached neighbourhood, if present.
    pub fn cached_distance(&self, other: CellId) -> Option<f64> {
        self.neighbourhood
            .iter()
            .find(|(id, _)| *id == other)
            .map(|(_, dist)| *dist)
    }

    /// Recomputes the representative and ICV from the owned points.
    ///
    /// Does nothing for an empty cell; see [`Grid::calc_representative`] for
    /// interpolation.
    pub fn update_representative(&mut self, points: &[Datapoint]) {
        if self.points.is_empty() {
            return;
        }
        let (mean, icv) = mean_and_icv(self.points.iter().map(|&p| points[p].data.as_slice()));
        self.representative = mean;
        self.icv = icv;
        debug!(
            "Cell {} has {} points, ICV = {}",
            self.id,
            self.points.len(),
            self.icv
        );
    }
}

/// Squared Euclidean distance. Only the overlapping prefix is compared, so
/// an empty vector is at distance 0 from everything.
#[inline]
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Per-dimension mean and summed sample variance (n - 1 denominator) of a set
/// of equally sized vectors. The variance of a single vector is 0.
pub fn mean_and_icv<'a, I>(vectors: I) -> (Vec<f64>, f64)
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let rows: Vec<&[f64]> = vectors.into_iter().collect();
    let Some(first) = rows.first() else {
        return (Vec::new(), 0.0);
    };

    let n = rows.len() as f64;
    let mut mean = vec![0.0; first.len()];
    for row in &rows {
        for (m, v) in mean.iter_mut().zip(row.iter()) {
            *m += v;
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    if rows.len() < 2 {
        return (mean, 0.0);
    }

    let mut icv = 0.0;
    for (d, m) in mean.iter().enumerate() {
        let ss: f64 = rows.iter().map(|row| (row[d] - m).powi(2)).sum();
        icv += ss / (n - 1.0);
    }
    (mean, icv)
}

impl Grid {
    /// Computes the representative of a cell.
    ///
    /// A populated cell takes the mean of its points. An empty cell takes the
    /// point-count weighted average of its direct neighbours' representatives
    /// plus a small epsilon, or stays unset if no neighbour can contribute.
    pub fn calc_representative(&mut self, id: CellId) -> Result<()> {
        let cell = self.get_cell(id)?;
        if !cell.is_empty() {
            let points = &self.points;
            self.cells[id].update_representative(points);
            return Ok(());
        }

        let interpolated = self.interpolate_representative(id)?;
        let cell = &mut self.cells[id];
        cell.representative = interpolated;
        cell.icv = 0.0;
        debug!(
            "Cell {} is empty, interpolated representative set = {}",
            id,
            cell.has_representative()
        );
        Ok(())
    }

    fn interpolate_representative(&self, id: CellId) -> Result<Vec<f64>> {
        let cell = self.get_cell(id)?;
        let mut sum: Vec<f64> = Vec::new();
        let mut weight = 0usize;

        for &n in &cell.direct_neighbours {
            let neighbour = &self.cells[n];
            if !neighbour.has_representative() || neighbour.is_empty() {
                continue;
            }
            let w = neighbour.point_count() as f64;
            if sum.is_empty() {
                sum = vec![0.0; neighbour.representative.len()];
            }
            for (s, r) in sum.iter_mut().zip(neighbour.representative.iter()) {
                *s += w * r;
            }
            weight += neighbour.point_count();
        }

        if weight == 0 {
            return Ok(Vec::new());
        }
        let weight = weight as f64;
        Ok(sum
            .into_iter()
            .map(|s| s / weight + INTERPOLATION_EPSILON)
            .collect())
    }

    /// Initializes every representative: populated cells first, then empty
    /// cells by interpolation, in grid order.
    pub fn calc_all_representatives(&mut self) -> Result<()> {
        for id in 0..self.cells.len() {
            if !self.cells[id].is_empty() {
                self.calc_representative(id)?;
            }
        }
        for id in 0..self.cells.len() {
            if self.cells[id].is_empty() {
                self.calc_representative(id)?;
            }
        }
        Ok(())
    }

    /// Error scale of a cell: `neutral_variance / max(neutral_variance, ICV)`.
    #[inline]
    pub fn error_scale(&self, cell: &Cell) -> f64 {
        self.neutral_variance / self.neutral_variance.max(cell.icv)
    }

    /// Planar distance between a cell and another cell.
    ///
    /// Direct neighbours are `cellwidth + (Δheight)²` apart. Any other pair
    /// must be in the cell's cached neighbourhood.
    pub fn calc_distance_2d(&self, cell: CellId, neighbour: CellId) -> Result<f64> {
        let c = self.get_cell(cell)?;
        let n = self.get_cell(neighbour)?;

        if c.is_direct_neighbour(neighbour) {
            return Ok(self.cellwidth + (c.height - n.height).powi(2));
        }

        c.cached_distance(neighbour)
            .ok_or(TopoError::DistanceNotCached {
                from: cell,
                to: neighbour,
            })
    }

    /// Local error of a cell, optionally evaluated at a hypothetical height.
    ///
    /// The cell is never modified; `height_to_test` only replaces the height
    /// inside this computation.
    pub fn calc_localerror(&self, id: CellId, height_to_test: Option<f64>) -> Result<f64> {
        let cell = self.get_cell(id)?;
        let height = height_to_test.unwrap_or(cell.height);
        let scale = self.error_scale(cell);

        let mut sum = 0.0;
        for &n in &cell.direct_neighbours {
            let neighbour = &self.cells[n];
            let target =
                (scale * squared_distance(&cell.representative, &neighbour.representative)).sqrt();
            let planar = self.cellwidth + (height - neighbour.height).powi(2);
            sum += (target - planar).powi(2);
        }
        Ok(sum)
    }

    /// Moves points of a cell to closer representatives in its neighbourhood.
    ///
    /// Only points whose origin cell is this cell or lies in its current
    /// neighbourhood are considered. The neighbourhood never contains the cell
    /// itself, so without the first case no point could leave the cell it
    /// started in. Moved points keep their offset from the cell center.
    /// Source and destination ICVs are recomputed. Returns the number of
    /// moved points.
    pub fn shift_points(&mut self, id: CellId) -> Result<usize> {
        let cellwidth = self.cellwidth;
        let cell = self.get_cell(id)?;
        let source_center = cell.center(cellwidth);

        let mut moves: Vec<(PointId, CellId)> = Vec::new();
        for &pid in &cell.points {
            let point = &self.points[pid];
            let eligible = match point.origin {
                Some(origin) => origin == id || cell.cached_distance(origin).is_some(),
                None => false,
            };
            if !eligible {
                continue;
            }

            let mut best = (
                id,
                if cell.has_representative() {
                    squared_distance(&cell.representative, &point.data)
                } else {
                    f64::INFINITY
                },
            );
            for &(n, _) in &cell.neighbourhood {
                let neighbour = &self.cells[n];
                if !neighbour.has_representative() {
                    continue;
                }
                let dist = squared_distance(&neighbour.representative, &point.data);
                if dist < best.1 {
                    best = (n, dist);
                }
            }

            if best.0 != id {
                moves.push((pid, best.0));
            }
        }

        if moves.is_empty() {
            return Ok(0);
        }

        for &(pid, dest) in &moves {
            let dest_center = self.cells[dest].center(cellwidth);
            self.cells[dest].points.push(pid);
            let point = &mut self.points[pid];
            point.owner = Some(dest);
            point.add_shift(dest_center, source_center);
            debug!("Point {} moved from cell {} to cell {}", pid, id, dest);
        }

        let moved: HashSet<PointId> = moves.iter().map(|(pid, _)| *pid).collect();
        let points = &self.points;
        let source = &mut self.cells[id];
        source.points.retain(|p| !moved.contains(p));
        if source.is_empty() {
            source.icv = 0.0;
        } else {
            source.update_representative(points);
        }

        // Destinations keep their representative until smoothing.
        let mut destinations: Vec<CellId> = moves.iter().map(|&(_, dest)| dest).collect();
        destinations.sort_unstable();
        destinations.dedup();
        for dest in destinations {
            let (_, icv) = mean_and_icv(
                self.cells[dest]
                    .points
                    .iter()
                    .map(|&p| self.points[p].data.as_slice()),
            );
            self.cells[dest].icv = icv;
        }

        Ok(moves.len())
    }

    /// Candidate representative pulled toward the neighbourhood.
    ///
    /// Each neighbour contributes its difference to this representative,
    /// weighted by `1 / (1 + distance)`; the sum is averaged over the
    /// neighbourhood. The cell is not modified.
    pub fn manipulate_representative(&self, id: CellId) -> Result<(CellId, Vec<f64>)> {
        let cell = self.get_cell(id)?;
        if cell.neighbourhood.is_empty() || !cell.has_representative() {
            return Ok((id, cell.representative.clone()));
        }

        let rep = &cell.representative;
        let mut delta = vec![0.0; rep.len()];
        for &(n, _) in &cell.neighbourhood {
            let neighbour = &self.cells[n];
            if neighbour.representative.len() != rep.len() {
                continue;
            }
            let weight = 1.0 / (1.0 + self.calc_distance_2d(id, n)?);
            for ((d, r), nr) in delta.iter_mut().zip(rep.iter()).zip(neighbour.representative.iter()) {
                *d += (nr - r) * weight;
            }
        }

        let count = cell.neighbourhood.len() as f64;
        let updated = rep.iter().zip(delta.iter()).map(|(r, d)| r + d / count).collect();
        Ok((id, updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_with_points(rows: usize, dimension: usize, points: &[(f64, f64, Vec<f64>)]) -> Grid {
        let mut grid = Grid::autogenerated(rows, None, dimension, None, None).unwrap();
        for (i, (x, y, data)) in points.iter().enumerate() {
            grid.add_point(Datapoint::new(i, i.to_string(), *x, *y, data.clone()))
                .unwrap();
        }
        grid
    }

    #[test]
    fn test_mean_and_icv() {
        let a = [1.0, 2.0];
        let b = [3.0, 6.0];
        let (mean, icv) = mean_and_icv([&a[..], &b[..]]);
        assert_eq!(mean, vec![2.0, 4.0]);
        // Sample variances: 2.0 and 8.0.
        assert!((icv - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_icv_singleton_is_zero() {
        let a = [1.0, 2.0];
        let (mean, icv) = mean_and_icv([&a[..]]);
        assert_eq!(mean, vec![1.0, 2.0]);
        assert_eq!(icv, 0.0);
    }

    #[test]
    fn test_squared_distance() {
        assert_eq!(squared_distance(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(squared_distance(&[], &[3.0, 4.0]), 0.0);
    }

    #[test]
    fn test_interpolated_representative() {
        // 1x3 lattice: left cell has two points, right cell one, middle empty.
        let mut grid = Grid::autogenerated(1, Some(3), 1, None, None).unwrap();
        grid.add_point(Datapoint::new(0, "0", 0.5, 0.5, vec![1.0])).unwrap();
        grid.add_point(Datapoint::new(1, "1", 0.5, 0.5, vec![1.0])).unwrap();
        grid.add_point(Datapoint::new(2, "2", 2.5, 0.5, vec![4.0])).unwrap();
        grid.calc_all_representatives().unwrap();

        let middle = grid.get_cell(1).unwrap();
        assert!(middle.is_empty());
        // (2 * 1 + 1 * 4) / 3 = 2, plus epsilon.
        assert!((middle.representative[0] - (2.0 + INTERPOLATION_EPSILON)).abs() < 1e-12);
        assert_eq!(middle.icv, 0.0);
    }

    #[test]
    fn test_isolated_empty_cell_has_no_representative() {
        let mut grid = grid_with_points(3, 1, &[(0.1, 0.1, vec![1.0])]);
        grid.calc_all_representatives().unwrap();
        // Opposite corner has no populated direct neighbour.
        assert!(!grid.get_cell(8).unwrap().has_representative());
    }

    #[test]
    fn test_flat_two_by_two_has_zero_error() {
        let grid_points = [
            (0.25, 0.25, vec![0.25, 0.25]),
            (0.75, 0.25, vec![0.75, 0.25]),
            (0.25, 0.75, vec![0.25, 0.75]),
            (0.75, 0.75, vec![0.75, 0.75]),
        ];
        let mut grid = grid_with_points(2, 2, &grid_points);
        grid.calc_all_representatives().unwrap();

        // Representative distance between neighbours is 0.25 (squared), scale
        // is 1 for singleton cells, so target = 0.5 = cellwidth.
        for id in 0..4 {
            let err = grid.calc_localerror(id, None).unwrap();
            assert!(err.abs() < 1e-12, "cell {} error {}", id, err);
        }
    }

    #[test]
    fn test_localerror_with_test_height_does_not_mutate() {
        let mut grid = grid_with_points(2, 1, &[(0.25, 0.25, vec![0.0]), (0.75, 0.25, vec![1.0])]);
        grid.calc_all_representatives().unwrap();

        let before = grid.calc_localerror(0, None).unwrap();
        let hypothetical = grid.calc_localerror(0, Some(2.0)).unwrap();
        let after = grid.calc_localerror(0, None).unwrap();

        assert_eq!(before, after);
        assert_ne!(before, hypothetical);
        assert_eq!(grid.get_cell(0).unwrap().height, 0.0);
    }

    #[test]
    fn test_distance_2d_direct_neighbour() {
        let mut grid = Grid::autogenerated(2, None, 1, None, None).unwrap();
        grid.set_mountains([(1, 0.5)]).unwrap();
        let dist = grid.calc_distance_2d(0, 1).unwrap();
        assert!((dist - (0.5 + 0.25)).abs() < 1e-12);
        assert!(dist >= grid.cellwidth);
        assert_eq!(dist, grid.calc_distance_2d(1, 0).unwrap());
    }

    #[test]
    fn test_distance_2d_uncached_pair_fails() {
        let grid = Grid::autogenerated(3, None, 1, None, None).unwrap();
        let result = grid.calc_distance_2d(0, 8);
        assert!(matches!(
            result,
            Err(TopoError::DistanceNotCached { from: 0, to: 8 })
        ));
    }

    #[test]
    fn test_distance_2d_cached_pair() {
        let mut grid = Grid::autogenerated(3, None, 1, None, None).unwrap();
        let hood = grid.calc_neighbourhood(0, 10.0).unwrap();
        grid.cells[0].neighbourhood = hood;
        let dist = grid.calc_distance_2d(0, 8).unwrap();
        // Four hops of one cell width each on flat terrain.
        assert!((dist - 4.0 * grid.cellwidth).abs() < 1e-12);
    }

    #[test]
    fn test_shift_points_moves_to_closer_representative() {
        // 1x2 lattice. The left cell holds a point that matches the right
        // cell's representative.
        let mut grid = Grid::autogenerated(1, Some(2), 1, None, None).unwrap();
        grid.add_point(Datapoint::new(0, "0", 0.5, 0.5, vec![0.0])).unwrap();
        grid.add_point(Datapoint::new(1, "1", 0.4, 0.6, vec![10.0])).unwrap();
        grid.add_point(Datapoint::new(2, "2", 1.5, 0.5, vec![10.0])).unwrap();
        grid.calc_all_representatives().unwrap();
        for id in 0..2 {
            let hood = grid.calc_neighbourhood(id, 5.0).unwrap();
            grid.cells[id].neighbourhood = hood;
        }

        let moved = grid.shift_points(0).unwrap();
        assert_eq!(moved, 1);

        assert_eq!(grid.get_cell(0).unwrap().points, vec![0]);
        assert_eq!(grid.get_cell(1).unwrap().points, vec![2, 1]);
        assert_eq!(grid.points[1].owner, Some(1));
        assert_eq!(grid.points[1].origin, Some(0));
        // Offset from the center (0.5, 0.5) is preserved around (1.5, 0.5).
        assert!((grid.points[1].x_axis - 1.4).abs() < 1e-12);
        assert!((grid.points[1].y_axis - 0.6).abs() < 1e-12);
        // Source is recomputed from its remaining point.
        assert_eq!(grid.get_cell(0).unwrap().representative, vec![0.0]);
        assert_eq!(grid.get_cell(0).unwrap().icv, 0.0);
    }

    #[test]
    fn test_shift_points_recomputes_destination_icv() {
        let mut grid = Grid::autogenerated(1, Some(2), 1, None, None).unwrap();
        grid.add_point(Datapoint::new(0, "0", 0.5, 0.5, vec![0.0])).unwrap();
        grid.add_point(Datapoint::new(1, "1", 0.5, 0.5, vec![8.0])).unwrap();
        grid.add_point(Datapoint::new(2, "2", 1.5, 0.5, vec![10.0])).unwrap();
        grid.calc_all_representatives().unwrap();
        assert_eq!(grid.get_cell(1).unwrap().icv, 0.0);
        for id in 0..2 {
            let hood = grid.calc_neighbourhood(id, 5.0).unwrap();
            grid.cells[id].neighbourhood = hood;
        }

        assert_eq!(grid.shift_points(0).unwrap(), 1);

        let dest = grid.get_cell(1).unwrap();
        assert_eq!(dest.points, vec![2, 1]);
        // Sample variance of {10, 8}.
        assert!((dest.icv - 2.0).abs() < 1e-12);
        assert_eq!(dest.representative, vec![10.0]);
        assert_eq!(grid.get_cell(0).unwrap().icv, 0.0);
    }

    #[test]
    fn test_shift_points_without_neighbourhood_is_noop() {
        let mut grid = Grid::autogenerated(1, Some(2), 1, None, None).unwrap();
        grid.add_point(Datapoint::new(0, "0", 0.5, 0.5, vec![0.0])).unwrap();
        grid.add_point(Datapoint::new(1, "1", 1.5, 0.5, vec![10.0])).unwrap();
        grid.calc_all_representatives().unwrap();
        assert_eq!(grid.shift_points(0).unwrap(), 0);
    }

    #[test]
    fn test_manipulate_representative_pulls_toward_neighbours() {
        let mut grid = Grid::autogenerated(1, Some(2), 1, None, None).unwrap();
        grid.add_point(Datapoint::new(0, "0", 0.5, 0.5, vec![0.0])).unwrap();
        grid.add_point(Datapoint::new(1, "1", 1.5, 0.5, vec![2.0])).unwrap();
        grid.calc_all_representatives().unwrap();
        for id in 0..2 {
            let hood = grid.calc_neighbourhood(id, 5.0).unwrap();
            grid.cells[id].neighbourhood = hood;
        }

        let (id, rep) = grid.manipulate_representative(0).unwrap();
        assert_eq!(id, 0);
        // cellwidth = 1, dist = 1, weight = 0.5, delta = 2 * 0.5 = 1.
        assert!((rep[0] - 1.0).abs() < 1e-12);
        // Not applied yet.
        assert_eq!(grid.get_cell(0).unwrap().representative, vec![0.0]);
    }

    #[test]
    fn test_manipulate_representative_empty_neighbourhood() {
        let mut grid = grid_with_points(2, 1, &[(0.25, 0.25, vec![3.0])]);
        grid.calc_all_representatives().unwrap();
        let (_, rep) = grid.manipulate_representative(0).unwrap();
        assert_eq!(rep, vec![3.0]);
    }
}
