//! The rectangular lattice of cells.

use crate::config::GridConfig;
use crate::error::{Result, TopoError};
use crate::grid::cell::{Cell, CellId};
use crate::grid::datapoint::{Datapoint, PointId};
use crate::storage::Dataset;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Key used to rank cells in [`Grid::sort_and_cut`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankBy {
    /// Most recent local error.
    #[default]
    LocalError,
    /// Intra-cell variance.
    Icv,
}

impl RankBy {
    /// Extracts the ranking key from a cell.
    #[inline]
    pub fn key(&self, cell: &Cell) -> f64 {
        match self {
            RankBy::LocalError => cell.local_error,
            RankBy::Icv => cell.icv,
        }
    }
}

/// Frontier entry for the neighbourhood search.
#[derive(Debug, Clone, Copy)]
struct Frontier {
    dist: f64,
    cell: CellId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smaller distance = higher priority
        other.dist.partial_cmp(&self.dist).unwrap_or(Ordering::Equal)
    }
}

/// A topographic grid over the 2D embedding.
///
/// Cells are stored row-major; cell `(row, col)` has id `row * columns + col`
/// and covers `[start_x + col*w, start_x + (col+1)*w) x [start_y + row*w, ...)`
/// where `w` is the cell width. Points are stored in an arena and referenced
/// by id from the cell that owns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub columns: usize,
    /// Side length of every cell (`1 / rows`).
    pub cellwidth: f64,
    /// x coordinate of the lattice origin.
    pub start_x: f64,
    /// y coordinate of the lattice origin.
    pub start_y: f64,
    /// Dimensionality of the feature vectors.
    pub dimension: usize,
    /// Normalization constant for the error scale; fixed after construction.
    pub neutral_variance: f64,
    /// The cells (row-major order).
    pub cells: Vec<Cell>,
    /// All points, indexed by [`PointId`].
    pub points: Vec<Datapoint>,
}

impl Grid {
    /// Builds a lattice of `rows x columns` flat, empty cells.
    ///
    /// `columns` defaults to `rows`, the origin defaults to `(0, 0)`.
    pub fn autogenerated(
        rows: usize,
        columns: Option<usize>,
        dimension: usize,
        start_x: Option<f64>,
        start_y: Option<f64>,
    ) -> Result<Self> {
        let columns = columns.unwrap_or(rows);
        if rows == 0 || columns == 0 {
            return Err(TopoError::Config(format!(
                "grid shape must be positive, got {}x{}",
                rows, columns
            )));
        }
        if dimension == 0 {
            return Err(TopoError::Config("dimension must be positive".to_string()));
        }

        let cellwidth = 1.0 / rows as f64;
        let start_x = start_x.unwrap_or(0.0);
        let start_y = start_y.unwrap_or(0.0);

        let mut cells: Vec<Cell> = (0..rows * columns)
            .map(|id| {
                let row = id / columns;
                let col = id % columns;
                Cell::new(
                    id,
                    start_x + col as f64 * cellwidth,
                    start_y + row as f64 * cellwidth,
                )
            })
            .collect();

        for cell in &mut cells {
            let row = cell.id / columns;
            let col = cell.id % columns;
            if row + 1 < rows {
                cell.direct_neighbours.push((row + 1) * columns + col);
            }
            if row > 0 {
                cell.direct_neighbours.push((row - 1) * columns + col);
            }
            if col > 0 {
                cell.direct_neighbours.push(row * columns + col - 1);
            }
            if col + 1 < columns {
                cell.direct_neighbours.push(row * columns + col + 1);
            }
        }

        let neutral_variance = Self::calc_neutral_variance(rows, columns, dimension);
        debug!(
            "Generated {}x{} grid, cellwidth = {}, neutral variance = {}",
            rows, columns, cellwidth, neutral_variance
        );

        Ok(Self {
            rows,
            columns,
            cellwidth,
            start_x,
            start_y,
            dimension,
            neutral_variance,
            cells,
            points: Vec::new(),
        })
    }

    /// Builds a lattice from a grid configuration.
    pub fn from_config(config: &GridConfig, dimension: usize) -> Result<Self> {
        Self::autogenerated(
            config.rows,
            config.columns,
            dimension,
            config.start_x,
            config.start_y,
        )
    }

    /// `dimension / 12 * (1 / (rows * columns))^(1 / dimension)`
    pub fn calc_neutral_variance(rows: usize, columns: usize, dimension: usize) -> f64 {
        let n = dimension as f64;
        n / 12.0 * (1.0 / (rows * columns) as f64).powf(1.0 / n)
    }

    /// Returns the total number of cells.
    #[inline]
    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns the total number of points.
    #[inline]
    pub fn total_points(&self) -> usize {
        self.points.len()
    }

    /// Converts 2D lattice coordinates to a cell id.
    #[inline]
    pub fn coords_to_index(&self, row: usize, col: usize) -> CellId {
        row * self.columns + col
    }

    /// Converts a cell id to `(row, col)`.
    #[inline]
    pub fn index_to_coords(&self, id: CellId) -> (usize, usize) {
        (id / self.columns, id % self.columns)
    }

    /// Gets a cell by id.
    #[inline]
    pub fn get_cell(&self, id: CellId) -> Result<&Cell> {
        self.cells.get(id).ok_or(TopoError::CellNotFound(id))
    }

    /// Gets a mutable cell by id.
    #[inline]
    pub fn get_cell_mut(&mut self, id: CellId) -> Result<&mut Cell> {
        self.cells.get_mut(id).ok_or(TopoError::CellNotFound(id))
    }

    /// Gets the cell that currently owns a point.
    pub fn get_cell_of_point(&self, point: PointId) -> Result<&Cell> {
        let p = self.points.get(point).ok_or(TopoError::IndexOutOfBounds {
            index: point,
            max: self.points.len(),
        })?;
        let owner = p.owner.ok_or(TopoError::PointWithoutOwner(point))?;
        self.get_cell(owner)
    }

    /// Returns true if the coordinate lies inside the lattice extent.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let width = self.columns as f64 * self.cellwidth;
        let height = self.rows as f64 * self.cellwidth;
        x >= self.start_x
            && x <= self.start_x + width
            && y >= self.start_y
            && y <= self.start_y + height
    }

    /// Finds the cell whose extent contains the coordinate.
    ///
    /// A coordinate on the edge shared by two cells belongs to the lower one.
    /// Coordinates outside the lattice are clamped to the border cells.
    pub fn locate(&self, x: f64, y: f64) -> CellId {
        let col = axis_index(x, self.start_x, self.cellwidth, self.columns);
        let row = axis_index(y, self.start_y, self.cellwidth, self.rows);
        self.coords_to_index(row, col)
    }

    /// Places a point into the cell containing its coordinate and returns its id.
    pub fn add_point(&mut self, mut point: Datapoint) -> Result<PointId> {
        if point.data.len() != self.dimension {
            return Err(TopoError::Config(format!(
                "point {} has {} features, grid dimension is {}",
                point.row,
                point.data.len(),
                self.dimension
            )));
        }
        if !self.contains(point.x_axis, point.y_axis) {
            warn!(
                "Point {} at ({}, {}) lies outside the grid, clamping to the border",
                point.row, point.x_axis, point.y_axis
            );
        }

        let cell = self.locate(point.x_axis, point.y_axis);
        let id = self.points.len();
        point.owner = Some(cell);
        point.origin = Some(cell);
        self.points.push(point);
        self.cells[cell].points.push(id);
        Ok(id)
    }

    /// Creates a point for every dataset row and assigns it to its cell.
    pub fn init_points_to_right_cell(&mut self, dataset: &Dataset) -> Result<()> {
        for point in dataset.to_datapoints() {
            self.add_point(point)?;
        }
        debug!(
            "Assigned {} points, {} cells occupied",
            self.points.len(),
            self.cells.iter().filter(|c| !c.is_empty()).count()
        );
        Ok(())
    }

    /// Shortest-path neighbourhood of a cell.
    ///
    /// Returns every other cell whose shortest distance over the lattice,
    /// with [`Grid::calc_distance_2d`] as edge weight, is below
    /// `max_distance`. Sorted by distance, then id.
    pub fn calc_neighbourhood(&self, id: CellId, max_distance: f64) -> Result<Vec<(CellId, f64)>> {
        self.get_cell(id)?;

        let mut best = vec![f64::INFINITY; self.cells.len()];
        let mut heap = BinaryHeap::new();
        best[id] = 0.0;
        heap.push(Frontier { dist: 0.0, cell: id });

        while let Some(Frontier { dist, cell }) = heap.pop() {
            if dist > best[cell] {
                continue;
            }
            let current = &self.cells[cell];
            for &n in &current.direct_neighbours {
                let step = self.cellwidth + (current.height - self.cells[n].height).powi(2);
                let candidate = dist + step;
                if candidate < max_distance && candidate < best[n] {
                    best[n] = candidate;
                    heap.push(Frontier {
                        dist: candidate,
                        cell: n,
                    });
                }
            }
        }

        let mut hood: Vec<(CellId, f64)> = best
            .into_iter()
            .enumerate()
            .filter(|(cell, dist)| *cell != id && dist.is_finite())
            .collect();
        hood.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(hood)
    }

    /// Ids of the top `percent`% cells ranked descending by `key`.
    ///
    /// At least one cell is returned for a non-empty grid. Ties keep grid order.
    pub fn sort_and_cut(&self, percent: f64, key: RankBy) -> Vec<CellId> {
        if self.cells.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(CellId, f64)> = self.cells.iter().map(|c| (c.id, key.key(c))).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let len = ranked.len();
        let count = ((len as f64 * percent / 100.0).round() as usize).clamp(1, len);
        ranked.truncate(count);
        ranked.into_iter().map(|(id, _)| id).collect()
    }

    /// Applies new heights to the named cells.
    pub fn set_mountains<I>(&mut self, heights: I) -> Result<()>
    where
        I: IntoIterator<Item = (CellId, f64)>,
    {
        for (id, height) in heights {
            self.get_cell_mut(id)?.height = height;
        }
        Ok(())
    }

    /// All points, in grid order and then in each cell's insertion order.
    pub fn get_all_points(&self) -> Vec<&Datapoint> {
        self.cells
            .iter()
            .flat_map(|c| c.points.iter().map(|&p| &self.points[p]))
            .collect()
    }

    /// All points in input row order.
    pub fn points_in_input_order(&self) -> Vec<&Datapoint> {
        let mut points: Vec<&Datapoint> = self.points.iter().collect();
        points.sort_by_key(|p| p.row);
        points
    }

    /// Sum of every cell's ICV.
    pub fn global_icv(&self) -> f64 {
        self.cells.iter().map(|c| c.icv).sum()
    }

    /// Sum of every cell's most recent local error.
    pub fn global_error(&self) -> f64 {
        self.cells.iter().map(|c| c.local_error).sum()
    }

    /// Fraction of cells that own no points.
    pub fn sparsity(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        let empty = self.cells.iter().filter(|c| c.is_empty()).count();
        empty as f64 / self.cells.len() as f64
    }
}

/// Lattice index along one axis with the lower-cell tie-break and clamping.
fn axis_index(value: f64, start: f64, width: f64, count: usize) -> usize {
    let idx = ((value - start) / width).ceil() - 1.0;
    if !idx.is_finite() || idx < 0.0 {
        0
    } else {
        (idx as usize).min(count - 1)
    }
}
