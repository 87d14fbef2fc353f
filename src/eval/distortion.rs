//! Global distance distortion between feature space, the reduced plane and
//! the refined grid. Feature distances are squared, as in the neighbourhood
//! comparison.

use crate::error::Result;
use crate::eval::preservation::{normalized, PairwiseDistances};
use crate::grid::{Datapoint, Grid};
use log::info;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Deviation of max-normalized pairwise distances from the original space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortionReport {
    /// Summed absolute deviation of the reduced plane.
    pub reduced_total: f64,
    /// Mean absolute deviation of the reduced plane per pair.
    pub reduced_mean: f64,
    /// Summed absolute deviation of the grid.
    pub geodesic_total: f64,
    /// Mean absolute deviation of the grid per pair.
    pub geodesic_mean: f64,
    /// Number of unordered point pairs.
    pub pairs: usize,
}

/// Sum of `|a - b|` over the strict upper triangle.
fn upper_deviation(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    let mut total = 0.0;
    Zip::indexed(a).and(b).for_each(|(i, j), x, y| {
        if j > i {
            total += (x - y).abs();
        }
    });
    total
}

/// Distortion report from precomputed distances.
pub fn distortion_from(distances: &PairwiseDistances) -> DistortionReport {
    let original = normalized(&distances.original);
    let reduced_total = upper_deviation(&original, &normalized(&distances.reduced));
    let geodesic_total = upper_deviation(&original, &normalized(&distances.geodesic));

    let n = distances.len();
    let pairs = n * n.saturating_sub(1) / 2;
    let per_pair = |total: f64| if pairs == 0 { 0.0 } else { total / pairs as f64 };

    DistortionReport {
        reduced_total,
        reduced_mean: per_pair(reduced_total),
        geodesic_total,
        geodesic_mean: per_pair(geodesic_total),
        pairs,
    }
}

/// Compares max-normalized distances of the reduced plane and of the grid
/// with those of the feature space.
pub fn distance_distortion(
    geodesic: &Array2<f64>,
    grid: &Grid,
    before: &[Datapoint],
    after: &[Datapoint],
) -> Result<DistortionReport> {
    let distances = PairwiseDistances::compute(geodesic, grid, before, after)?;
    let report = distortion_from(&distances);
    info!(
        "Distance distortion over {} pairs: reduced {:.4}, geodesic {:.4}",
        report.pairs, report.reduced_mean, report.geodesic_mean
    );
    Ok(report)
}
