//! Neighbourhood preservation: do points that are close in feature space stay
//! close in the reduced plane and on the refined grid?
//!
//! Feature space is measured with the squared Euclidean distance, the plane
//! with the Euclidean distance and the grid with geodesic cell distances.

use crate::error::{Result, TopoError};
use crate::grid::{squared_distance, Datapoint, Grid};
use log::info;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Points closer than this fraction of a space's largest pairwise distance
/// are neighbours in that space.
pub const NEIGHBOURHOOD_FRACTION: f64 = 0.1;

/// Pairwise point distances in the three spaces being compared.
#[derive(Debug, Clone)]
pub struct PairwiseDistances {
    /// Squared Euclidean distance of the feature vectors.
    pub original: Array2<f64>,
    /// Euclidean distance of the initial 2D coordinates.
    pub reduced: Array2<f64>,
    /// Geodesic distance between the cells holding the refined coordinates.
    pub geodesic: Array2<f64>,
}

impl PairwiseDistances {
    /// Pairs `before` and `after` by input row and computes every distance.
    ///
    /// `before` supplies the features and the initial coordinates, `after`
    /// the refined coordinates, which are located on `grid`.
    pub fn compute(
        geodesic: &Array2<f64>,
        grid: &Grid,
        before: &[Datapoint],
        after: &[Datapoint],
    ) -> Result<Self> {
        if before.is_empty() {
            return Err(TopoError::EmptyInput("no points to evaluate".to_string()));
        }
        if before.len() != after.len() {
            return Err(TopoError::Config(format!(
                "point sets differ in size: {} before, {} after",
                before.len(),
                after.len()
            )));
        }
        let cells = grid.total_cells();
        if geodesic.dim() != (cells, cells) {
            return Err(TopoError::Config(format!(
                "geodesic matrix is {:?}, grid has {} cells",
                geodesic.dim(),
                cells
            )));
        }

        let mut before: Vec<&Datapoint> = before.iter().collect();
        let mut after: Vec<&Datapoint> = after.iter().collect();
        before.sort_by_key(|p| p.row);
        after.sort_by_key(|p| p.row);
        if let Some((b, a)) = before.iter().zip(after.iter()).find(|(b, a)| b.row != a.row) {
            return Err(TopoError::Config(format!(
                "point sets do not share rows: {} before, {} after",
                b.row, a.row
            )));
        }

        let owners: Vec<usize> = after.iter().map(|p| grid.locate(p.x_axis, p.y_axis)).collect();
        let n = before.len();

        let original = pairwise(n, |i, j| squared_distance(&before[i].data, &before[j].data));
        let reduced = pairwise(n, |i, j| before[i].planar_distance(before[j]));
        let geodesic = pairwise(n, |i, j| geodesic[[owners[i], owners[j]]]);

        Ok(Self {
            original,
            reduced,
            geodesic,
        })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.original.nrows()
    }

    /// Returns true if there are no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn pairwise<F>(n: usize, distance: F) -> Array2<f64>
where
    F: Fn(usize, usize) -> f64 + Sync,
{
    let mut matrix = Array2::zeros((n, n));
    Zip::indexed(&mut matrix).par_for_each(|(i, j), d| {
        if i != j {
            *d = distance(i, j);
        }
    });
    matrix
}

/// Distances divided by the largest one. All zeros stay zero.
pub(crate) fn normalized(matrix: &Array2<f64>) -> Array2<f64> {
    let max = matrix.iter().copied().fold(0.0, f64::max);
    if max > 0.0 {
        matrix / max
    } else {
        Array2::zeros(matrix.dim())
    }
}

/// ε-neighbourhood of every point. A point is always its own neighbour.
fn neighbourhoods(matrix: &Array2<f64>) -> Vec<Vec<usize>> {
    let scaled = normalized(matrix);
    scaled
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|&(_, d)| *d < NEIGHBOURHOOD_FRACTION)
                .map(|(j, _)| j)
                .collect()
        })
        .collect()
}

/// Averaged precision and recall of neighbourhoods against the original space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreservationReport {
    /// Share of 2D neighbours that are original neighbours.
    pub precision_reduced: f64,
    /// Share of grid neighbours that are original neighbours.
    pub precision_geodesic: f64,
    /// Share of original neighbours kept in 2D.
    pub recall_reduced: f64,
    /// Share of original neighbours kept on the grid.
    pub recall_geodesic: f64,
    /// Mean neighbourhood size in 2D.
    pub avg_size_reduced: f64,
    /// Mean neighbourhood size on the grid.
    pub avg_size_geodesic: f64,
    /// Mean neighbourhood size in feature space.
    pub avg_size_original: f64,
    /// Number of evaluated points.
    pub points: usize,
}

/// Precision and recall of one point's neighbourhood. Empty sets score 1.
fn precision_recall(reported: &[usize], truth: &[usize]) -> (f64, f64) {
    let hits = reported.iter().filter(|j| truth.contains(j)).count();
    let precision = if reported.is_empty() {
        1.0
    } else {
        1.0 - (reported.len() - hits) as f64 / reported.len() as f64
    };
    let recall = if truth.is_empty() {
        1.0
    } else {
        1.0 - (truth.len() - hits) as f64 / truth.len() as f64
    };
    (precision, recall)
}

/// Compares ε-neighbourhoods in feature space with those in the reduced plane
/// and on the refined grid.
pub fn calc_neighborhood_preservation(
    geodesic: &Array2<f64>,
    grid: &Grid,
    before: &[Datapoint],
    after: &[Datapoint],
) -> Result<PreservationReport> {
    let distances = PairwiseDistances::compute(geodesic, grid, before, after)?;
    let report = preservation_from(&distances);
    info!(
        "Neighbourhood preservation: reduced P={:.3} R={:.3}, geodesic P={:.3} R={:.3}",
        report.precision_reduced, report.recall_reduced, report.precision_geodesic, report.recall_geodesic
    );
    Ok(report)
}

/// Preservation metrics from precomputed distances.
pub fn preservation_from(distances: &PairwiseDistances) -> PreservationReport {
    let original = neighbourhoods(&distances.original);
    let reduced = neighbourhoods(&distances.reduced);
    let geodesic = neighbourhoods(&distances.geodesic);
    let n = distances.len();

    let mut sums = [0.0f64; 4];
    for i in 0..n {
        let (p_red, r_red) = precision_recall(&reduced[i], &original[i]);
        let (p_geo, r_geo) = precision_recall(&geodesic[i], &original[i]);
        sums[0] += p_red;
        sums[1] += p_geo;
        sums[2] += r_red;
        sums[3] += r_geo;
    }

    let mean_size = |sets: &[Vec<usize>]| sets.iter().map(Vec::len).sum::<usize>() as f64 / n as f64;
    let count = n as f64;
    PreservationReport {
        precision_reduced: sums[0] / count,
        precision_geodesic: sums[1] / count,
        recall_reduced: sums[2] / count,
        recall_geodesic: sums[3] / count,
        avg_size_reduced: mean_size(&reduced),
        avg_size_geodesic: mean_size(&geodesic),
        avg_size_original: mean_size(&original),
        points: n,
    }
}
